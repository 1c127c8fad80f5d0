//! Worker lifecycle owned by the host.
//!
//! The host drives the install event and only activates the worker once the
//! install future has resolved successfully. Fetch events are dispatched to
//! activated workers only.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::request::Request;
use crate::stats::InstallStats;
use crate::worker::{FetchOutcome, Worker};

/// Lifecycle state of a hosted worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Registered, install not yet started.
    Parsed,
    /// Install event dispatched, waiting on its future.
    Installing,
    /// Install succeeded.
    Installed,
    /// Receiving fetch events.
    Activated,
    /// Install failed; the worker will never activate.
    Redundant,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Parsed => "parsed",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activated => "activated",
            Self::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

/// Hosts a [`Worker`], dispatching events according to its lifecycle state.
pub struct WorkerHost<W: Worker> {
    worker: Arc<W>,
    state: watch::Sender<WorkerState>,
}

impl<W: Worker> WorkerHost<W> {
    /// Hosts `worker` in the [`WorkerState::Parsed`] state.
    #[must_use]
    pub fn new(worker: W) -> Self {
        let (state, _) = watch::channel(WorkerState::Parsed);
        Self {
            worker: Arc::new(worker),
            state,
        }
    }

    /// Returns the hosted worker.
    #[must_use]
    pub fn worker(&self) -> &W {
        &self.worker
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Subscribes to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    /// Dispatches the install event and waits for it to settle.
    ///
    /// On success the worker moves through `Installed` to `Activated` (there
    /// is no activate handler). On failure it becomes `Redundant`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Lifecycle`] if the worker is not `Parsed`, or the
    /// install handler's error.
    pub async fn install(&self) -> Result<InstallStats> {
        let mut started = false;
        self.state.send_if_modified(|state| {
            if *state == WorkerState::Parsed {
                *state = WorkerState::Installing;
                started = true;
            }
            started
        });
        if !started {
            return Err(Error::Lifecycle {
                expected: WorkerState::Parsed,
                actual: self.state(),
            });
        }

        match self.worker.on_install().await {
            Ok(stats) => {
                self.state.send_replace(WorkerState::Installed);
                self.state.send_replace(WorkerState::Activated);
                log::info!("Worker activated");
                Ok(stats)
            }
            Err(e) => {
                self.state.send_replace(WorkerState::Redundant);
                log::error!("Worker install failed, not activating: {e}");
                Err(e)
            }
        }
    }

    /// Waits until the worker is activated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotActive`] if the worker becomes redundant instead.
    pub async fn wait_until_activated(&self) -> Result<()> {
        let mut rx = self.subscribe();
        let state = rx
            .wait_for(|s| matches!(s, WorkerState::Activated | WorkerState::Redundant))
            .await
            .map_or(WorkerState::Redundant, |s| *s);
        if state == WorkerState::Activated {
            Ok(())
        } else {
            Err(Error::NotActive(state))
        }
    }

    /// Dispatches a fetch event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotActive`] unless the worker is activated, otherwise
    /// whatever the worker's fetch handler returns.
    pub async fn fetch(&self, request: &Request) -> Result<FetchOutcome> {
        match self.state() {
            WorkerState::Activated => self.worker.on_fetch(request).await,
            other => Err(Error::NotActive(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStorage, MemoryStorage};
    use crate::response::Response;
    use crate::worker::CacheFirstWorker;
    use crate::worker::tests::{MockFetcher, device, worker};

    type TestHost = WorkerHost<CacheFirstWorker<MemoryStorage, MockFetcher>>;

    fn index() -> Request {
        Request::get_str("http://device.local/index.html").unwrap()
    }

    #[test]
    fn state_display() {
        assert_eq!(WorkerState::Activated.to_string(), "activated");
        assert_eq!(WorkerState::Redundant.to_string(), "redundant");
    }

    #[tokio::test]
    async fn install_activates() {
        let host: TestHost = WorkerHost::new(worker(device()));
        assert_eq!(host.state(), WorkerState::Parsed);

        let stats = host.install().await.unwrap();
        assert_eq!(stats.assets_cached, 2);
        assert_eq!(host.state(), WorkerState::Activated);
        host.wait_until_activated().await.unwrap();
    }

    #[tokio::test]
    async fn failed_install_is_redundant() {
        let fetcher = MockFetcher::new()
            .route("http://device.local/index.html", 200, "x")
            .route("http://device.local/manifest.json", 404, "");
        let host: TestHost = WorkerHost::new(worker(fetcher));

        assert!(host.install().await.is_err());
        assert_eq!(host.state(), WorkerState::Redundant);
        assert!(matches!(
            host.wait_until_activated().await,
            Err(Error::NotActive(WorkerState::Redundant))
        ));
        assert!(matches!(
            host.fetch(&index()).await,
            Err(Error::NotActive(WorkerState::Redundant))
        ));
    }

    #[tokio::test]
    async fn fetch_before_install_is_rejected() {
        let host: TestHost = WorkerHost::new(worker(device()));
        assert!(matches!(
            host.fetch(&index()).await,
            Err(Error::NotActive(WorkerState::Parsed))
        ));
        assert_eq!(host.worker().storage().keys().await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn second_install_is_a_lifecycle_error() {
        let host: TestHost = WorkerHost::new(worker(device()));
        host.install().await.unwrap();
        assert!(matches!(
            host.install().await,
            Err(Error::Lifecycle {
                expected: WorkerState::Parsed,
                actual: WorkerState::Activated
            })
        ));
    }

    #[tokio::test]
    async fn activated_host_serves_cache_first() {
        let host: TestHost = WorkerHost::new(worker(device()));
        host.install().await.unwrap();

        let outcome = host.fetch(&index()).await.unwrap();
        assert_eq!(
            outcome,
            FetchOutcome::Cache(Response::new(
                "http://device.local/index.html",
                200,
                "<h1>relay</h1>"
            ))
        );
    }

    #[tokio::test]
    async fn waiter_is_released_by_install() {
        let host = Arc::new(WorkerHost::new(worker(device())));
        let waiter = {
            let host = Arc::clone(&host);
            tokio::spawn(async move { host.wait_until_activated().await })
        };
        tokio::task::yield_now().await;
        host.install().await.unwrap();
        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn subscribers_observe_transitions() {
        let host: TestHost = WorkerHost::new(worker(device()));
        let rx = host.subscribe();
        host.install().await.unwrap();
        assert_eq!(*rx.borrow(), WorkerState::Activated);
    }
}
