//! Per-request operation handle.
//!
//! The handle is the backend-side record of an active request: it owns the
//! cancellation token, the store session reference, the finished flag and
//! the waiting guard. It is shared (`Arc`) between the lifecycle map, the
//! task driving the request, and any thread blocked in [`OperationHandle::wait`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use calbridge_domain::{ErrorKind, RequestOutcome, RequestState};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::lifecycle::LifecycleShared;
use super::{RequestCell, RequestId};
use crate::calendar_ports::SessionRef;

/// Where a handle is in its own teardown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlePhase {
    /// Registered, request running.
    Live,
    /// Cancelled; waiting for the driving task to report completion.
    AwaitingNativeCompletion,
    /// Finished while a waiter was blocked; the waiter releases.
    ReleasePending,
    /// Removed from the lifecycle map.
    Released,
}

#[derive(Debug)]
pub struct OperationHandle {
    request_id: RequestId,
    cell: Arc<RequestCell>,
    cancel: CancellationToken,
    session: Mutex<Option<SessionRef>>,
    finished: AtomicBool,
    waiting: Mutex<()>,
    phase: Mutex<HandlePhase>,
    lifecycle: Weak<LifecycleShared>,
}

impl OperationHandle {
    pub(crate) fn new(
        request_id: RequestId,
        cell: Arc<RequestCell>,
        lifecycle: Weak<LifecycleShared>,
    ) -> Self {
        Self {
            request_id,
            cell,
            cancel: CancellationToken::new(),
            session: Mutex::new(None),
            finished: AtomicBool::new(false),
            waiting: Mutex::new(()),
            phase: Mutex::new(HandlePhase::Live),
            lifecycle,
        }
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn state(&self) -> RequestState {
        self.cell.state()
    }

    pub fn phase(&self) -> HandlePhase {
        *self.phase.lock()
    }

    /// Token handed to every store call issued for this request.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn session(&self) -> Option<SessionRef> {
        self.session.lock().clone()
    }

    pub(crate) fn set_session(&self, session: SessionRef) {
        *self.session.lock() = Some(session);
    }

    /// True while some thread is blocked in [`wait`](Self::wait).
    pub fn is_waiting(&self) -> bool {
        self.waiting.try_lock().is_none()
    }

    /// Signal cancellation to the store and, if the request is still active,
    /// move it to `Cancelled`.
    ///
    /// Release is left to the driving task, which reports native completion
    /// once the in-flight store calls have returned. Returns true when this
    /// call moved the request to `Cancelled`.
    pub fn cancel(&self) -> bool {
        let mut phase = self.phase.lock();
        self.cancel.cancel();
        if *phase != HandlePhase::Live || !self.cell.leave_active(RequestState::Cancelled) {
            return false;
        }
        self.finished.store(true, Ordering::Release);
        *phase = HandlePhase::AwaitingNativeCompletion;
        debug!(request_id = %self.request_id, "request cancelled");
        true
    }

    /// Publish the outcome of a request that ran to completion and release
    /// the handle, unless a waiter is blocked (the waiter releases then).
    pub fn finish(&self, outcome: RequestOutcome) {
        let mut phase = self.phase.lock();
        if *phase != HandlePhase::Live {
            warn!(request_id = %self.request_id, phase = ?*phase, "finish on a handle that is not live");
            return;
        }
        self.finish_locked(&mut phase, outcome);
    }

    /// Called by the driving task once its last store call returned.
    ///
    /// Routes to [`finish`](Self::finish) for a request that was not
    /// cancelled. For a cancelled one it publishes the frozen outcome and
    /// releases the handle.
    pub fn complete(&self, outcome: RequestOutcome) {
        let mut phase = self.phase.lock();
        match *phase {
            HandlePhase::Live => self.finish_locked(&mut phase, outcome),
            HandlePhase::AwaitingNativeCompletion => {
                let outcome = RequestOutcome { error: ErrorKind::Cancelled, ..outcome };
                self.cell.publish(outcome, RequestState::Cancelled);
                self.release_unless_waiting(&mut phase);
            }
            other => {
                debug!(request_id = %self.request_id, phase = ?other, "late completion ignored");
            }
        }
    }

    /// Block the calling thread until the request leaves `Active`, or until
    /// `timeout` elapses. Returns true when the request left `Active`.
    ///
    /// A timed-out wait does not cancel anything; the request may still
    /// complete later.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let guard = self.waiting.lock();
        let left_active = self.cell.wait_while_active(timeout);

        let mut phase = self.phase.lock();
        drop(guard);
        if *phase == HandlePhase::ReleasePending {
            self.release_locked(&mut phase);
        }
        left_active
    }

    /// Release the handle from its lifecycle. Idempotent.
    pub fn release(&self) {
        let mut phase = self.phase.lock();
        self.release_locked(&mut phase);
    }

    fn finish_locked(&self, phase: &mut HandlePhase, outcome: RequestOutcome) {
        self.finished.store(true, Ordering::Release);
        self.cell.publish(outcome, RequestState::Finished);
        self.release_unless_waiting(phase);
    }

    fn release_unless_waiting(&self, phase: &mut HandlePhase) {
        if self.is_waiting() {
            *phase = HandlePhase::ReleasePending;
        } else {
            self.release_locked(phase);
        }
    }

    fn release_locked(&self, phase: &mut HandlePhase) {
        if *phase == HandlePhase::Released {
            return;
        }
        debug_assert!(!self.is_waiting(), "handle released while a waiter is blocked");
        *phase = HandlePhase::Released;
        match self.lifecycle.upgrade() {
            Some(lifecycle) => lifecycle.remove(self.request_id),
            None => debug!(request_id = %self.request_id, "lifecycle gone; nothing to release"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detached_handle() -> (Arc<RequestCell>, Arc<OperationHandle>) {
        let cell = Arc::new(RequestCell::default());
        assert!(cell.activate());
        let handle = Arc::new(OperationHandle::new(RequestId::new(), Arc::clone(&cell), Weak::new()));
        (cell, handle)
    }

    #[test]
    fn finish_publishes_and_releases() {
        let (cell, handle) = detached_handle();
        handle.finish(RequestOutcome::default());

        assert!(handle.is_finished());
        assert_eq!(cell.state(), RequestState::Finished);
        assert_eq!(handle.phase(), HandlePhase::Released);
    }

    #[test]
    fn cancel_defers_release_to_native_completion() {
        let (cell, handle) = detached_handle();
        assert!(handle.cancel());
        assert!(handle.is_cancelled());
        assert_eq!(cell.state(), RequestState::Cancelled);
        assert_eq!(handle.phase(), HandlePhase::AwaitingNativeCompletion);
        assert!(cell.outcome().is_none());

        handle.complete(RequestOutcome::default());
        assert_eq!(handle.phase(), HandlePhase::Released);
        assert_eq!(cell.state(), RequestState::Cancelled);
        assert_eq!(cell.outcome().map(|o| o.error), Some(ErrorKind::Cancelled));
    }

    #[test]
    fn cancel_after_finish_is_a_no_op() {
        let (cell, handle) = detached_handle();
        handle.finish(RequestOutcome::default());
        assert!(!handle.cancel());
        assert_eq!(cell.state(), RequestState::Finished);
    }

    #[test]
    fn waiter_releases_when_finish_races_it() {
        let (cell, handle) = detached_handle();

        let waiter = {
            let handle = Arc::clone(&handle);
            std::thread::spawn(move || handle.wait(None))
        };
        while !handle.is_waiting() {
            std::thread::yield_now();
        }
        handle.finish(RequestOutcome::default());

        assert!(waiter.join().unwrap());
        assert_eq!(cell.state(), RequestState::Finished);
        assert_eq!(handle.phase(), HandlePhase::Released);
        assert!(!handle.is_waiting());
    }

    #[test]
    fn timed_out_wait_leaves_request_active() {
        let (cell, handle) = detached_handle();
        assert!(!handle.wait(Some(Duration::from_millis(10))));
        assert_eq!(cell.state(), RequestState::Active);
        assert_eq!(handle.phase(), HandlePhase::Live);
    }

    #[test]
    fn release_is_idempotent() {
        let (_cell, handle) = detached_handle();
        handle.release();
        handle.release();
        assert_eq!(handle.phase(), HandlePhase::Released);
    }
}
