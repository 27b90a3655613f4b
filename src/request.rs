//! Aperiodic request objects and their completion signalling.
//!
//! A [`Request<T>`] is owned by the application. Submitting it hands a
//! cheaply-cloneable handle to a slave's request queue; the FSM that
//! eventually services it never takes ownership away from the application,
//! it only borrows the shared payload for the duration of one transfer and
//! then wakes whoever is waiting - the same shape as a kernel
//! `wait_queue_head_t` / `wake_up` pair, built on `Condvar` instead.

use std::sync::{Arc, Condvar, Mutex};

/// Lifecycle of a [`Request`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum RequestState {
    /// Sitting in a slave's queue, not yet picked up.
    Queued,
    /// Claimed by the FSM; a sub-FSM or inline handler is driving it.
    InProgress,
    /// Completed successfully. `payload` holds the result.
    Success,
    /// Completed unsuccessfully.
    Failure,
}

struct RequestInner<T> {
    payload: Mutex<T>,
    state: Mutex<RequestState>,
    cond: Condvar,
}

/// A request of payload type `T`, shared between the application and
/// whichever [`crate::slave_fsm::SlaveRequestFsm`] services it.
///
/// Cloning a `Request` clones the handle, not the payload - all clones
/// observe the same underlying state and payload.
#[derive(Clone)]
pub struct Request<T> {
    inner: Arc<RequestInner<T>>,
}

impl<T> Request<T> {
    /// Construct a new request carrying `payload`, in state [`RequestState::Queued`].
    pub fn new(payload: T) -> Self {
        Self {
            inner: Arc::new(RequestInner {
                payload: Mutex::new(payload),
                state: Mutex::new(RequestState::Queued),
                cond: Condvar::new(),
            }),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RequestState {
        *self.inner.state.lock().unwrap()
    }

    /// Run `f` against the shared payload, returning its result.
    pub fn with_payload<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.payload.lock().unwrap();
        f(&mut guard)
    }

    /// Claim the request for servicing: transition `Queued` -> `InProgress`.
    /// Returns `false` (and leaves the state untouched) if it was not
    /// `Queued`, e.g. already claimed by another FSM.
    pub(crate) fn claim(&self) -> bool {
        let mut state = self.inner.state.lock().unwrap();
        if *state == RequestState::Queued {
            *state = RequestState::InProgress;
            true
        } else {
            false
        }
    }

    /// Mark the request `Success` or `Failure` and wake any waiter. Called
    /// exactly once by the FSM that claimed it, per request lifetime.
    pub(crate) fn complete(&self, success: bool) {
        let mut state = self.inner.state.lock().unwrap();
        *state = if success {
            RequestState::Success
        } else {
            RequestState::Failure
        };
        self.inner.cond.notify_all();
    }

    /// Block until the request reaches [`RequestState::Success`] or
    /// [`RequestState::Failure`], then return that terminal state.
    pub fn wait(&self) -> RequestState {
        let guard = self.inner.state.lock().unwrap();
        let guard = self
            .inner
            .cond
            .wait_while(guard, |s| matches!(s, RequestState::Queued | RequestState::InProgress))
            .unwrap();
        *guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_is_one_shot() {
        let r = Request::new(0u8);
        assert!(r.claim());
        assert!(!r.claim());
        assert_eq!(r.state(), RequestState::InProgress);
    }

    #[test]
    fn complete_wakes_and_carries_payload() {
        let r = Request::new(vec![1, 2, 3]);
        assert!(r.claim());
        r.with_payload(|p| p.push(4));
        r.complete(true);
        assert_eq!(r.wait(), RequestState::Success);
        r.with_payload(|p| assert_eq!(p, &vec![1, 2, 3, 4]));
    }

    #[test]
    fn failure_is_observable() {
        let r = Request::new(());
        r.claim();
        r.complete(false);
        assert_eq!(r.wait(), RequestState::Failure);
    }
}
