//! Registration table of live operation handles.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use calbridge_domain::{CalbridgeError, RequestState, Result, ShutdownPolicy};
use parking_lot::Mutex;
use tracing::{debug, error, info};

use super::handle::OperationHandle;
use super::{Request, RequestId};

/// Process-wide count of live handles, shared between lifecycles.
///
/// Only mutated while the owning lifecycle's table lock is held.
#[derive(Debug, Default)]
pub struct LiveHandleCounter(AtomicUsize);

impl LiveHandleCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    fn increment(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }

    fn decrement(&self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Debug, Default)]
struct LifecycleTable {
    handles: HashMap<RequestId, Arc<OperationHandle>>,
    draining: bool,
}

#[derive(Debug)]
pub(crate) struct LifecycleShared {
    table: Mutex<LifecycleTable>,
    counter: Option<Arc<LiveHandleCounter>>,
}

impl LifecycleShared {
    /// Drop the mapping for `id`, if still present.
    pub(crate) fn remove(&self, id: RequestId) {
        let mut table = self.table.lock();
        if table.handles.remove(&id).is_some() {
            if let Some(counter) = &self.counter {
                counter.decrement();
            }
            debug!(request_id = %id, live = table.handles.len(), "handle released");
        }
    }
}

/// Owns the request -> handle mapping and the draining flag.
#[derive(Debug, Clone)]
pub struct RequestLifecycle {
    shared: Arc<LifecycleShared>,
    policy: ShutdownPolicy,
}

impl RequestLifecycle {
    pub fn new(policy: ShutdownPolicy) -> Self {
        Self::build(policy, None)
    }

    /// Lifecycle reporting into a shared live-handle counter.
    pub fn with_counter(policy: ShutdownPolicy, counter: Arc<LiveHandleCounter>) -> Self {
        Self::build(policy, Some(counter))
    }

    fn build(policy: ShutdownPolicy, counter: Option<Arc<LiveHandleCounter>>) -> Self {
        let shared = LifecycleShared { table: Mutex::new(LifecycleTable::default()), counter };
        Self { shared: Arc::new(shared), policy }
    }

    pub fn policy(&self) -> ShutdownPolicy {
        self.policy
    }

    /// Create a handle for `request` and move the request to `Active`.
    ///
    /// Registering a request twice, or one that is not `Inactive`, is a
    /// contract violation. While draining, registration is refused or the
    /// handle is cancelled right away, depending on the shutdown policy.
    pub fn register(&self, request: &Request) -> Result<Arc<OperationHandle>> {
        let id = request.id();
        let (handle, cancel_now) = {
            let mut table = self.shared.table.lock();

            if table.draining && self.policy == ShutdownPolicy::Reject {
                info!(request_id = %id, "registration refused while draining");
                return Err(CalbridgeError::ShuttingDown(format!("request {id} refused")));
            }
            if table.handles.contains_key(&id) {
                return Err(contract_violation(format!("request {id} registered twice")));
            }
            if !request.cell().activate() {
                return Err(contract_violation(format!(
                    "request {id} started from state {}",
                    request.state()
                )));
            }

            let handle = Arc::new(OperationHandle::new(
                id,
                Arc::clone(request.cell()),
                Arc::downgrade(&self.shared),
            ));
            table.handles.insert(id, Arc::clone(&handle));
            if let Some(counter) = &self.shared.counter {
                counter.increment();
            }
            debug!(request_id = %id, live = table.handles.len(), "handle registered");
            (handle, table.draining)
        };

        if cancel_now {
            info!(request_id = %id, "registered while draining; cancelling");
            handle.cancel();
        }
        Ok(handle)
    }

    pub fn handle(&self, id: RequestId) -> Option<Arc<OperationHandle>> {
        self.shared.table.lock().handles.get(&id).cloned()
    }

    /// Remove the mapping for `id`. Returns false if it was not registered.
    ///
    /// Releasing while a waiter is blocked on the handle is a contract
    /// violation and leaves the mapping in place.
    pub fn release(&self, id: RequestId) -> Result<bool> {
        let Some(handle) = self.handle(id) else {
            return Ok(false);
        };
        if handle.is_waiting() {
            return Err(contract_violation(format!("request {id} released while a waiter is blocked")));
        }
        handle.release();
        Ok(true)
    }

    /// Number of registered, unreleased handles.
    pub fn live_count(&self) -> usize {
        self.shared.table.lock().handles.len()
    }

    pub fn is_draining(&self) -> bool {
        self.shared.table.lock().draining
    }

    /// Switch to draining and cancel every live handle.
    ///
    /// Cancellation happens outside the table lock; handles release
    /// themselves as their requests complete. Returns the number of requests
    /// this call cancelled.
    pub fn cancel_all(&self) -> usize {
        let handles: Vec<Arc<OperationHandle>> = {
            let mut table = self.shared.table.lock();
            table.draining = true;
            table.handles.values().cloned().collect()
        };

        let cancelled = handles
            .iter()
            .filter(|handle| handle.state() == RequestState::Active)
            .filter(|handle| handle.cancel())
            .count();
        info!(live = handles.len(), cancelled, "lifecycle draining");
        cancelled
    }
}

fn contract_violation(message: String) -> CalbridgeError {
    error!(%message, "request lifecycle contract violation");
    debug_assert!(false, "{message}");
    CalbridgeError::ContractViolation(message)
}
