//! Shared state cell between a caller-owned request and its handle.
//!
//! The cell is the only place where the caller-visible state and the
//! outcome live. It supports two kinds of waiters: blocking threads (via a
//! condition variable) and async tasks (via [`Notify`]).

use std::time::{Duration, Instant};

use calbridge_domain::{RequestOutcome, RequestState};
use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;
use tracing::warn;

#[derive(Debug, Default)]
struct CellStatus {
    state: RequestState,
    outcome: Option<RequestOutcome>,
}

#[derive(Debug, Default)]
pub(crate) struct RequestCell {
    status: Mutex<CellStatus>,
    changed: Condvar,
    notify: Notify,
}

impl RequestCell {
    pub(crate) fn state(&self) -> RequestState {
        self.status.lock().state
    }

    pub(crate) fn outcome(&self) -> Option<RequestOutcome> {
        self.status.lock().outcome.clone()
    }

    /// Inactive -> Active. Returns false when the request was already started.
    pub(crate) fn activate(&self) -> bool {
        let mut status = self.status.lock();
        if status.state != RequestState::Inactive {
            return false;
        }
        status.state = RequestState::Active;
        drop(status);
        self.wake();
        true
    }

    /// Active -> `to`. No-op from any other state.
    pub(crate) fn leave_active(&self, to: RequestState) -> bool {
        let mut status = self.status.lock();
        if status.state != RequestState::Active {
            return false;
        }
        status.state = to;
        drop(status);
        self.wake();
        true
    }

    /// Store the outcome (once) and move an active request to `terminal`.
    pub(crate) fn publish(&self, outcome: RequestOutcome, terminal: RequestState) {
        let mut status = self.status.lock();
        if status.outcome.is_some() {
            warn!("request outcome already published; ignoring second publication");
            return;
        }
        status.outcome = Some(outcome);
        if status.state == RequestState::Active {
            status.state = terminal;
        }
        drop(status);
        self.wake();
    }

    /// Block while the request is active. `None` waits without limit.
    ///
    /// Returns true when the request left the active state.
    pub(crate) fn wait_while_active(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut status = self.status.lock();
        while status.state == RequestState::Active {
            match deadline {
                Some(deadline) => {
                    if self.changed.wait_until(&mut status, deadline).timed_out() {
                        return status.state != RequestState::Active;
                    }
                }
                None => self.changed.wait(&mut status),
            }
        }
        true
    }

    /// Block until an outcome is published. `None` waits without limit.
    pub(crate) fn wait_outcome(&self, timeout: Option<Duration>) -> Option<RequestOutcome> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut status = self.status.lock();
        while status.outcome.is_none() {
            match deadline {
                Some(deadline) => {
                    if self.changed.wait_until(&mut status, deadline).timed_out() {
                        break;
                    }
                }
                None => self.changed.wait(&mut status),
            }
        }
        status.outcome.clone()
    }

    /// Resolve once an outcome is published.
    pub(crate) async fn settled(&self) -> RequestOutcome {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let ready = self.outcome();
            if let Some(outcome) = ready {
                return outcome;
            }
            notified.await;
        }
    }

    fn wake(&self) {
        self.changed.notify_all();
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use calbridge_domain::ErrorKind;

    use super::*;

    #[test]
    fn activate_only_from_inactive() {
        let cell = RequestCell::default();
        assert!(cell.activate());
        assert!(!cell.activate());
        assert_eq!(cell.state(), RequestState::Active);
    }

    #[test]
    fn publish_keeps_cancelled_state() {
        let cell = RequestCell::default();
        cell.activate();
        assert!(cell.leave_active(RequestState::Cancelled));

        let outcome = RequestOutcome { error: ErrorKind::Cancelled, ..Default::default() };
        cell.publish(outcome.clone(), RequestState::Finished);
        assert_eq!(cell.state(), RequestState::Cancelled);
        assert_eq!(cell.outcome(), Some(outcome));
    }

    #[test]
    fn second_publication_is_ignored() {
        let cell = RequestCell::default();
        cell.activate();
        cell.publish(RequestOutcome::default(), RequestState::Finished);
        cell.publish(
            RequestOutcome { error: ErrorKind::Unspecified, ..Default::default() },
            RequestState::Finished,
        );
        assert_eq!(cell.outcome().map(|o| o.error), Some(ErrorKind::NoError));
    }

    #[test]
    fn wait_times_out_while_active() {
        let cell = RequestCell::default();
        cell.activate();
        assert!(!cell.wait_while_active(Some(Duration::from_millis(20))));
        assert!(cell.wait_outcome(Some(Duration::from_millis(5))).is_none());
    }

    #[test]
    fn blocked_waiter_wakes_on_publication() {
        let cell = Arc::new(RequestCell::default());
        cell.activate();

        let waiter = {
            let cell = Arc::clone(&cell);
            std::thread::spawn(move || cell.wait_while_active(None))
        };
        std::thread::sleep(Duration::from_millis(20));
        cell.publish(RequestOutcome::default(), RequestState::Finished);

        assert!(waiter.join().unwrap());
        assert_eq!(cell.state(), RequestState::Finished);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn settled_resolves_after_publication() {
        let cell = Arc::new(RequestCell::default());
        cell.activate();

        let task = {
            let cell = Arc::clone(&cell);
            tokio::spawn(async move { cell.settled().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        cell.publish(RequestOutcome::default(), RequestState::Finished);

        let outcome = task.await.unwrap();
        assert!(outcome.is_success());
    }

    #[test]
    fn settled_is_ready_once_published() {
        let cell = RequestCell::default();
        cell.activate();
        cell.publish(RequestOutcome::default(), RequestState::Finished);

        let outcome = tokio_test::block_on(cell.settled());
        assert_eq!(outcome, RequestOutcome::default());
    }
}
