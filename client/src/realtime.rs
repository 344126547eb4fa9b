//! Realtime change application.
//!
//! One listener per process subscribes to the store's change feed and
//! applies relevant events to the local cache and the open view. Events
//! pass through a bounded queue and are processed strictly sequentially
//! by a single worker, so a burst of remote changes can never pile up
//! unbounded concurrent pulls; when the queue is full the event is
//! dropped with a warning (the next pull of that group recovers it).

use std::sync::{Arc, Mutex, RwLock};

use divvy_engine::{expense_row_group_id, group_members, group_row_id};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::store::{ChangeEvent, ChangeKind, TabularStore};
use crate::sync::SyncEngine;
use crate::ui::Severity;

/// What the UI collaborator is currently showing. The listener consults
/// this to decide whether a change affects anything on screen.
#[derive(Debug, Default)]
pub struct ViewState {
    inner: RwLock<ViewInner>,
}

#[derive(Debug, Default)]
struct ViewInner {
    open_group: Option<String>,
    list_active: bool,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the group open in the detail view, if any.
    pub fn open_group(&self) -> Option<String> {
        self.inner.read().expect("view lock poisoned").open_group.clone()
    }

    pub fn set_open_group(&self, group_id: Option<String>) {
        self.inner.write().expect("view lock poisoned").open_group = group_id;
    }

    /// Whether the "all groups" list view is showing.
    pub fn list_active(&self) -> bool {
        self.inner.read().expect("view lock poisoned").list_active
    }

    pub fn set_list_active(&self, active: bool) {
        self.inner.write().expect("view lock poisoned").list_active = active;
    }
}

struct ListenerTasks {
    forward: JoinHandle<()>,
    worker: JoinHandle<()>,
}

/// Applies remote change notifications to the cache and the open view.
pub struct RealtimeListener<S> {
    engine: Arc<SyncEngine<S>>,
    view: Arc<ViewState>,
    queue_depth: usize,
    active: Mutex<Option<ListenerTasks>>,
}

impl<S: TabularStore + 'static> RealtimeListener<S> {
    pub fn new(engine: Arc<SyncEngine<S>>, view: Arc<ViewState>, queue_depth: usize) -> Self {
        Self {
            engine,
            view,
            queue_depth: queue_depth.max(1),
            active: Mutex::new(None),
        }
    }

    /// Start listening. A no-op returning false while a subscription is
    /// already active, or when there is no remote store or current user.
    pub fn start(&self) -> bool {
        let mut active = self.active.lock().expect("listener lock poisoned");
        if active.is_some() {
            tracing::debug!("realtime listener already active");
            return false;
        }
        let Some(remote) = self.engine.remote() else {
            tracing::warn!("cannot start realtime sync: no remote store");
            return false;
        };
        let Some(user) = self.engine.cache().current_user() else {
            tracing::warn!("cannot start realtime sync: no current user");
            return false;
        };

        let mut events = remote.store().changes();
        let (tx, mut queue) = mpsc::channel::<ChangeEvent>(self.queue_depth);

        let forward = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => match tx.try_send(event) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(event)) => {
                            tracing::warn!(
                                table = %event.table,
                                "realtime queue full, dropping event"
                            );
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => break,
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "realtime stream lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        let engine = Arc::clone(&self.engine);
        let view = Arc::clone(&self.view);
        let worker = tokio::spawn(async move {
            while let Some(event) = queue.recv().await {
                handle_event(&engine, &view, &user.id, event).await;
            }
        });

        *active = Some(ListenerTasks { forward, worker });
        tracing::info!("realtime listener started");
        true
    }

    /// Tear down the subscription and clear the stored handle so a future
    /// `start` can succeed.
    pub fn stop(&self) {
        if let Some(tasks) = self.active.lock().expect("listener lock poisoned").take() {
            tasks.forward.abort();
            tasks.worker.abort();
            tracing::info!("realtime listener stopped");
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().expect("listener lock poisoned").is_some()
    }
}

impl<S> Drop for RealtimeListener<S> {
    fn drop(&mut self) {
        if let Ok(mut active) = self.active.lock() {
            if let Some(tasks) = active.take() {
                tasks.forward.abort();
                tasks.worker.abort();
            }
        }
    }
}

async fn handle_event<S: TabularStore>(
    engine: &SyncEngine<S>,
    view: &ViewState,
    user_id: &str,
    event: ChangeEvent,
) {
    match event.table.as_str() {
        "groups" => handle_group_change(engine, view, user_id, &event).await,
        "expenses" => handle_expense_change(engine, view, &event).await,
        other => tracing::trace!(table = other, "ignoring change on unwatched table"),
    }
}

async fn handle_group_change<S: TabularStore>(
    engine: &SyncEngine<S>,
    view: &ViewState,
    user_id: &str,
    event: &ChangeEvent,
) {
    let Some(remote) = engine.remote() else {
        return;
    };
    let mapping = remote.mapper().resolve().await;
    let Some(row) = event.row() else {
        return;
    };

    // Cheap local filter: not our group, no fetch, no notification.
    let members = group_members(mapping, row);
    if !members.iter().any(|m| m == user_id) {
        return;
    }
    if !matches!(event.kind, ChangeKind::Insert | ChangeKind::Update) {
        return;
    }
    let Some(group_id) = group_row_id(mapping, row) else {
        return;
    };

    if view.open_group().as_deref() == Some(group_id.as_str()) {
        match engine.pull_group(&group_id).await {
            Ok(Some(_)) => {
                engine
                    .ui()
                    .notify("Group updated by another user", Severity::Info);
                engine.ui().refresh_group_view();
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(group = %group_id, error = %e, "failed to apply group change");
            }
        }
    } else if view.list_active() {
        engine.ui().refresh_group_list();
    }
}

async fn handle_expense_change<S: TabularStore>(
    engine: &SyncEngine<S>,
    view: &ViewState,
    event: &ChangeEvent,
) {
    let Some(remote) = engine.remote() else {
        return;
    };
    let mapping = remote.mapper().resolve().await;
    let Some(row) = event.row() else {
        return;
    };
    let Some(group_id) = expense_row_group_id(mapping, row) else {
        return;
    };
    if view.open_group().as_deref() != Some(group_id.as_str()) {
        return;
    }

    match engine.refresh_group_expenses(&group_id).await {
        Ok(Some(_)) => {
            let action = match event.kind {
                ChangeKind::Insert => "added",
                ChangeKind::Update => "updated",
                ChangeKind::Delete => "deleted",
            };
            engine
                .ui()
                .notify(&format!("Expense {action} by another user"), Severity::Info);
            engine.ui().refresh_group_view();
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(group = %group_id, error = %e, "failed to apply expense change");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_state_tracks_open_group() {
        let view = ViewState::new();
        assert!(view.open_group().is_none());
        assert!(!view.list_active());

        view.set_open_group(Some("g1".into()));
        view.set_list_active(true);
        assert_eq!(view.open_group().as_deref(), Some("g1"));
        assert!(view.list_active());

        view.set_open_group(None);
        assert!(view.open_group().is_none());
    }
}
