//! End-to-end demo of the sync engine over the in-process store.
//!
//! Run with: cargo run --example sync_demo

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use divvy_client::{
    generate_user_id, new_entity_id, Connectivity, DeleteQueue, LocalCache, MemoryStorage,
    MemoryStore, NullUi, RealtimeListener, RemoteStore, SyncEngine, TabularStore, ViewState,
};
use divvy_engine::{Expense, Group, User};
use rust_decimal::Decimal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "divvy_client=debug".into()),
        )
        .init();

    // A remote store exposing the compact column spellings, so schema
    // discovery has something to find.
    let store = Arc::new(MemoryStore::empty());
    store.set_columns("users", &["id", "name", "createdat", "updatedat"]);
    store.set_columns(
        "groups",
        &[
            "id", "name", "createdby", "updated_by", "members", "participants",
            "total_expenses", "expense_count", "createdat", "updated_at",
        ],
    );
    store.set_columns(
        "expenses",
        &[
            "id", "groupid", "description", "amount", "paidby", "split_between",
            "created_by", "created_at", "updated_at", "per_person_amount",
        ],
    );

    let storage = Arc::new(MemoryStorage::new());
    let connectivity = Arc::new(Connectivity::new(true));
    let engine = Arc::new(
        SyncEngine::new(
            Some(Arc::new(RemoteStore::new(Arc::clone(&store)))),
            LocalCache::new(storage.clone()),
            DeleteQueue::new(storage),
            Arc::clone(&connectivity),
            Arc::new(NullUi),
        )
        .with_pacing(Duration::from_millis(50)),
    );

    // Claim an identity and create a group with one expense.
    let now = Utc::now();
    let user = User::new(generate_user_id("Alice", now), "Alice", now);
    engine.cache().set_current_user(&user);

    let mut group = Group::new(new_entity_id(), "Goa trip", user.id.clone(), now);
    let expense_id = new_entity_id();
    group.expenses.push(Expense::new(
        expense_id.clone(),
        group.id.clone(),
        "hotel",
        Decimal::from(300),
        user.id.clone(),
        vec![user.id.clone()],
        user.id.clone(),
        now,
    ));
    let group_id = group.id.clone();
    engine.cache().save(&mut [group]);

    // Full push: schema discovery, user, group, expense.
    let outcome = engine.push_all().await?;
    tracing::info!(?outcome, "initial push");

    // Watch for remote changes to the open group.
    let view = Arc::new(ViewState::new());
    view.set_open_group(Some(group_id.clone()));
    let listener = RealtimeListener::new(Arc::clone(&engine), view, 16);
    listener.start();

    // Another client edits the expense amount; the listener re-pulls.
    let mut row = store.raw_row("expenses", "id", &expense_id).expect("pushed row");
    row.insert("amount".into(), serde_json::json!(450));
    store.upsert("expenses", "id", row).await?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let cached = engine.cache().get_group(&group_id).expect("cached group");
    tracing::info!(total = %cached.total_expenses, "total after remote edit");

    // Offline delete: queued, then replayed when connectivity returns.
    // The optimistic local removal is the caller's job.
    let reconnect = Arc::clone(&engine).spawn_reconnect_task();
    connectivity.set_online(false);
    engine.delete_expense(&expense_id).await?;
    let mut groups = engine.cache().load();
    groups[0].expenses.retain(|e| e.id != expense_id);
    engine.cache().save(&mut groups);
    tracing::info!(queued = engine.delete_queue().len(), "delete queued offline");

    connectivity.set_online(true);
    tokio::time::sleep(Duration::from_millis(500)).await;
    tracing::info!(
        queued = engine.delete_queue().len(),
        remote_expenses = store.row_count("expenses"),
        "after reconnect replay"
    );

    listener.stop();
    reconnect.abort();
    Ok(())
}
