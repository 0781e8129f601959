use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, warn};

use crate::http::ApiClient;
use crate::models::NotificationRecord;
use crate::session::Session;

/// Lifecycle of the feed relative to the current identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedPhase {
    /// No identity to sync for.
    Idle,
    /// First fetch for an identity is in flight.
    Loading,
    /// Collection is live; refreshes happen silently in the background.
    Ready,
}

/// The notification collection plus where the sync loop currently stands.
#[derive(Debug, Clone)]
pub struct FeedState {
    pub phase: FeedPhase,
    pub records: Vec<NotificationRecord>,
}

impl FeedState {
    fn idle() -> Self {
        Self {
            phase: FeedPhase::Idle,
            records: Vec::new(),
        }
    }

    /// Derived live, never stored: the badge can never drift from the
    /// records backing it.
    pub fn unread_count(&self) -> usize {
        self.records.iter().filter(|record| !record.read).count()
    }
}

#[derive(Deserialize)]
struct NotificationsEnvelope {
    #[serde(default)]
    notifications: Vec<NotificationRecord>,
}

/// Keeps the notification collection in sync with the backend for whatever
/// identity the session currently holds.
///
/// The background task idles while nobody is signed in, runs one visible
/// fetch when an identity appears, then refreshes silently on an interval.
/// Signing out clears the collection and parks the loop again.
#[derive(Clone)]
pub struct NotificationFeed {
    shared: Arc<FeedShared>,
    driver: Arc<Mutex<Option<JoinHandle<()>>>>,
}

struct FeedShared {
    client: ApiClient,
    state: watch::Sender<FeedState>,
}

impl NotificationFeed {
    /// Spawn the sync loop against `session_rx`. The task ends on its own
    /// when the session channel closes; call [`NotificationFeed::shutdown`]
    /// to stop it sooner.
    pub fn spawn(
        client: ApiClient,
        session_rx: watch::Receiver<Session>,
        refresh: Duration,
    ) -> Self {
        let (state, _) = watch::channel(FeedState::idle());
        let shared = Arc::new(FeedShared { client, state });
        let handle = tokio::spawn(drive(shared.clone(), session_rx, refresh));
        Self {
            shared,
            driver: Arc::new(Mutex::new(Some(handle))),
        }
    }

    pub fn snapshot(&self) -> FeedState {
        self.shared.state.borrow().clone()
    }

    pub fn records(&self) -> Vec<NotificationRecord> {
        self.shared.state.borrow().records.clone()
    }

    pub fn phase(&self) -> FeedPhase {
        self.shared.state.borrow().phase
    }

    pub fn unread_count(&self) -> usize {
        self.shared.state.borrow().unread_count()
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedState> {
        self.shared.state.subscribe()
    }

    /// Acknowledge one record. The local flip is optimistic: it applies to
    /// the freshest collection by id, and it stays even if the server call
    /// fails, because the next refresh reconciles anyway.
    pub async fn mark_read(&self, id: &str) {
        self.shared.state.send_modify(|state| {
            if let Some(record) = state.records.iter_mut().find(|record| record.id == id) {
                record.read = true;
            }
        });
        let path = format!("/notifications/{id}/read");
        if let Err(err) = self.shared.client.patch_empty(&path).await {
            warn!(%id, error = %err, "failed to persist read acknowledgement");
        }
    }

    pub async fn mark_all_read(&self) {
        self.shared.state.send_modify(|state| {
            for record in &mut state.records {
                record.read = true;
            }
        });
        if let Err(err) = self.shared.client.patch_empty("/notifications/read-all").await {
            warn!(error = %err, "failed to persist read-all acknowledgement");
        }
    }

    /// Stop the background task. Safe to call more than once.
    pub fn shutdown(&self) {
        if let Some(handle) = self.driver.lock().unwrap().take() {
            handle.abort();
        }
    }
}

async fn drive(shared: Arc<FeedShared>, mut session_rx: watch::Receiver<Session>, refresh: Duration) {
    loop {
        let identity = identity_of(&session_rx.borrow());
        match identity {
            None => {
                shared.state.send_modify(|state| *state = FeedState::idle());
                if session_rx.changed().await.is_err() {
                    return;
                }
            }
            Some(user_id) => {
                debug!(user = %user_id, "notification sync starting");
                shared.state.send_modify(|state| {
                    state.phase = FeedPhase::Loading;
                    state.records.clear();
                });
                refresh_records(&shared).await;

                let mut ticker = time::interval(refresh);
                ticker.tick().await; // the first tick completes immediately
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            refresh_records(&shared).await;
                        }
                        changed = session_rx.changed() => {
                            if changed.is_err() {
                                return;
                            }
                            if identity_of(&session_rx.borrow()).as_deref() != Some(user_id.as_str()) {
                                break;
                            }
                        }
                    }
                }
            }
        }
    }
}

fn identity_of(session: &Session) -> Option<String> {
    if session.loading || !session.authenticated {
        return None;
    }
    session.user.as_ref().map(|user| user.id.clone())
}

/// Fetch and wholesale-replace the collection. On failure the previous
/// records stay; the only transition is Loading settling into Ready so the
/// UI never hangs on a spinner.
async fn refresh_records(shared: &FeedShared) {
    match shared
        .client
        .get_json::<NotificationsEnvelope>("/notifications")
        .await
    {
        Ok(envelope) => {
            shared.state.send_modify(|state| {
                state.phase = FeedPhase::Ready;
                state.records = envelope.notifications;
            });
        }
        Err(err) => {
            warn!(error = %err, "notification refresh failed");
            shared.state.send_modify(|state| {
                if state.phase == FeedPhase::Loading {
                    state.phase = FeedPhase::Ready;
                }
            });
        }
    }
}
