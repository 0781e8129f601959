use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::join;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, warn};

use crate::files;
use crate::http::ApiClient;
use crate::models::{BorrowRequest, SearchResults};
use crate::requests;
use crate::session::Session;
use crate::users;

/// Fans one query out across files, borrow requests, and users, and merges
/// whatever comes back. The sections are isolated: one endpoint failing
/// empties its own section and nothing else.
///
/// Keystroke-driven input goes through [`SearchAggregator::submit`], which
/// debounces, and tags every fan-out with a sequence number so a slow
/// response can never overwrite a newer one.
#[derive(Clone)]
pub struct SearchAggregator {
    inner: Arc<SearchInner>,
}

struct SearchInner {
    client: ApiClient,
    session_rx: watch::Receiver<Session>,
    debounce: Duration,
    seq: AtomicU64,
    pending: Mutex<Option<JoinHandle<()>>>,
    results: watch::Sender<SearchResults>,
}

impl SearchAggregator {
    pub fn new(
        client: ApiClient,
        session_rx: watch::Receiver<Session>,
        debounce: Duration,
    ) -> Self {
        let (results, _) = watch::channel(SearchResults::default());
        Self {
            inner: Arc::new(SearchInner {
                client,
                session_rx,
                debounce,
                seq: AtomicU64::new(0),
                pending: Mutex::new(None),
                results,
            }),
        }
    }

    pub fn results(&self) -> SearchResults {
        self.inner.results.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchResults> {
        self.inner.results.subscribe()
    }

    /// Debounced entry point for live input. Each call cancels the
    /// previously scheduled query; a whitespace-only query clears the
    /// published results without touching the network.
    pub fn submit(&self, query: &str) {
        let trimmed = query.trim();
        let mut pending = self.inner.pending.lock().unwrap();
        if let Some(scheduled) = pending.take() {
            scheduled.abort();
        }
        if trimmed.is_empty() {
            // Invalidate anything already in flight so it cannot publish
            // over the cleared box.
            self.inner.seq.fetch_add(1, Ordering::SeqCst);
            self.inner.results.send_replace(SearchResults::default());
            return;
        }

        let shared = self.inner.clone();
        let query = trimmed.to_string();
        *pending = Some(tokio::spawn(async move {
            time::sleep(shared.debounce).await;
            // Past the debounce window the query is committed: it claims a
            // sequence number and runs to completion even if newer input
            // arrives. Staleness is handled at publish time instead.
            let seq = shared.seq.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::spawn(async move {
                let results = run_query(&shared, &query).await;
                if shared.seq.load(Ordering::SeqCst) == seq {
                    shared.results.send_replace(results);
                } else {
                    debug!(query = %query, "discarding stale search results");
                }
            });
        }));
    }

    /// Run a query immediately and hand the results back without touching
    /// the published state. The terminal client uses this path.
    pub async fn run(&self, query: &str) -> SearchResults {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return SearchResults::default();
        }
        run_query(&self.inner, trimmed).await
    }
}

async fn run_query(inner: &SearchInner, query: &str) -> SearchResults {
    let admin = inner.session_rx.borrow().is_admin();

    let files_section = files::search(&inner.client, query);
    let requests_section = async {
        let needle = query.to_lowercase();
        requests::list(&inner.client).await.map(|mut rows| {
            rows.retain(|row| request_matches(row, &needle));
            rows
        })
    };
    // Only administrators may read the user directory; for everyone else
    // the section is empty and the endpoint is never called.
    let users_section = async {
        if admin {
            users::list(&inner.client).await
        } else {
            Ok(Vec::new())
        }
    };

    let (files_out, requests_out, users_out) =
        join!(files_section, requests_section, users_section);

    SearchResults {
        query: query.to_string(),
        files: files_out.unwrap_or_else(|err| {
            warn!(error = %err, "file search failed");
            Vec::new()
        }),
        requests: requests_out.unwrap_or_else(|err| {
            warn!(error = %err, "request search failed");
            Vec::new()
        }),
        users: users_out.unwrap_or_else(|err| {
            warn!(error = %err, "user search failed");
            Vec::new()
        }),
    }
}

/// Requests have no search endpoint, so the whole list is fetched and
/// matched locally. `needle` must already be lowercased.
fn request_matches(request: &BorrowRequest, needle: &str) -> bool {
    let haystacks = [
        Some(request.id.as_str()),
        request.title.as_deref(),
        request.description.as_deref(),
    ];
    haystacks
        .iter()
        .flatten()
        .any(|text| text.to_lowercase().contains(needle))
}
