//! Native-callable trampolines.
//!
//! DAQmx calls these on a thread it owns. Each one resolves the
//! `(task, kind)` route and the opaque data pointer through the process-wide
//! [`HandleTable`] and invokes the host callback outside the table lock.
//! Events for routes that are no longer bound are dropped.
//!
//! Panics in host callbacks are caught here; unwinding into the driver is
//! undefined behaviour.

use std::ffi::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{debug, error, warn};

use crate::driver::{NativeDoneCallback, NativeEveryNSamplesCallback};
use crate::error::panic_message;
use crate::event::{DoneEvent, EventCallback, EventKind, SamplesEvent};
use crate::handles::{HandleTable, Route, Unresolved};
use crate::status::Status;
use crate::task::TaskHandle;

/// Return value used when a host callback panicked.
pub const CALLBACK_PANICKED: i32 = -1;

/// Native function pointer selected for an event kind.
#[derive(Debug, Clone, Copy)]
pub enum Trampoline {
    /// Passed to `DAQmxRegisterDoneEvent`.
    Done(NativeDoneCallback),
    /// Passed to `DAQmxRegisterEveryNSamplesEvent` with its native event type.
    EveryNSamples {
        callback: NativeEveryNSamplesCallback,
        event_type: i32,
    },
}

impl Trampoline {
    /// Select the trampoline for `kind`.
    ///
    /// Returns `None` if `callback` does not have the shape `kind` is
    /// delivered with; registration must not proceed in that case.
    pub fn resolve(kind: EventKind, callback: &EventCallback) -> Option<Self> {
        if !callback.matches(kind) {
            return None;
        }
        Some(match kind.every_n_samples_type() {
            None => Self::Done(Some(done_trampoline)),
            Some(event_type) => Self::EveryNSamples {
                callback: Some(every_n_samples_trampoline),
                event_type,
            },
        })
    }
}

/// Trampoline for `DAQmxRegisterDoneEvent`.
///
/// # Safety
///
/// `data` must be null or a token produced by [`crate::handles::Token::as_ptr`].
/// It is never dereferenced.
#[allow(unsafe_code)]
pub unsafe extern "C" fn done_trampoline(
    task: daqmx_sys::TaskHandle,
    status: i32,
    data: *mut c_void,
) -> i32 {
    dispatch_done(
        HandleTable::global(),
        TaskHandle::from_raw(task),
        status,
        data,
    )
}

/// Trampoline for `DAQmxRegisterEveryNSamplesEvent`.
///
/// # Safety
///
/// As for [`done_trampoline`].
#[allow(unsafe_code)]
pub unsafe extern "C" fn every_n_samples_trampoline(
    task: daqmx_sys::TaskHandle,
    event_type: i32,
    n_samples: u32,
    data: *mut c_void,
) -> i32 {
    dispatch_every_n_samples(
        HandleTable::global(),
        TaskHandle::from_raw(task),
        event_type,
        n_samples,
        data,
    )
}

/// Deliver a task-done event through `table`.
pub fn dispatch_done(table: &HandleTable, task: TaskHandle, status: i32, data: *mut c_void) -> i32 {
    let route = Route::new(task, EventKind::TaskDone);
    let resolved = match table.resolve(route, data) {
        Ok(resolved) => resolved,
        Err(reason) => {
            log_unresolved(route, reason);
            return 0;
        }
    };

    let EventCallback::Done(callback) = resolved.callback else {
        warn!(task = ?task, "Done route bound to a non-done callback; event dropped");
        return 0;
    };

    let event = DoneEvent {
        task,
        status: Status(status),
        user_data: resolved.user_data.as_ref(),
    };
    invoke(route, || callback(&event))
}

/// Deliver an every-N-samples event through `table`.
pub fn dispatch_every_n_samples(
    table: &HandleTable,
    task: TaskHandle,
    event_type: i32,
    n_samples: u32,
    data: *mut c_void,
) -> i32 {
    let Some(kind) = EventKind::from_every_n_samples_type(event_type) else {
        warn!(task = ?task, event_type, "Unknown every-N-samples event type; event dropped");
        return 0;
    };

    let route = Route::new(task, kind);
    let resolved = match table.resolve(route, data) {
        Ok(resolved) => resolved,
        Err(reason) => {
            log_unresolved(route, reason);
            return 0;
        }
    };

    let EventCallback::EveryNSamples(callback) = resolved.callback else {
        warn!(task = ?task, kind = %kind, "Samples route bound to a done callback; event dropped");
        return 0;
    };

    let event = SamplesEvent {
        task,
        kind,
        n_samples,
        user_data: resolved.user_data.as_ref(),
    };
    invoke(route, || callback(&event))
}

fn invoke(route: Route, f: impl FnOnce() -> i32) -> i32 {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(code) => code,
        Err(payload) => {
            error!(
                task = ?route.task,
                kind = %route.kind,
                "Event callback panicked: {}",
                panic_message(payload.as_ref())
            );
            CALLBACK_PANICKED
        }
    }
}

fn log_unresolved(route: Route, reason: Unresolved) {
    match reason {
        Unresolved::UnboundRoute => {
            debug!(task = ?route.task, kind = %route.kind, "No callback bound; event dropped")
        }
        Unresolved::StaleUserData => {
            warn!(task = ?route.task, kind = %route.kind, "User data handle already freed; event dropped")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_resolve_rejects_mismatched_shape() {
        let done = EventCallback::done(|_| 0);
        let samples = EventCallback::every_n_samples(|_| 0);

        assert!(matches!(
            Trampoline::resolve(EventKind::TaskDone, &done),
            Some(Trampoline::Done(Some(_)))
        ));
        assert!(matches!(
            Trampoline::resolve(EventKind::EveryNSamplesTransferred, &samples),
            Some(Trampoline::EveryNSamples {
                callback: Some(_),
                event_type: 2
            })
        ));
        assert!(Trampoline::resolve(EventKind::TaskDone, &samples).is_none());
        assert!(Trampoline::resolve(EventKind::EveryNSamplesAcquired, &done).is_none());
    }

    #[test]
    fn test_dispatch_done_passes_status_and_data() {
        let table = HandleTable::new();
        let task = TaskHandle::from_id(0x100);
        let seen = Arc::new(AtomicU32::new(0));
        let seen_cb = seen.clone();

        table
            .alloc_callback(
                Route::new(task, EventKind::TaskDone),
                EventCallback::done(move |event| {
                    assert_eq!(event.status.code(), -200279);
                    let tag = event.user_data::<u32>().copied().unwrap_or(0);
                    seen_cb.store(tag, Ordering::SeqCst);
                    5
                }),
            )
            .unwrap();
        let data = table.alloc_user_data(Arc::new(42u32));

        assert_eq!(dispatch_done(&table, task, -200279, data.as_ptr()), 5);
        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn test_dispatch_every_n_samples_routes_by_event_type() {
        let table = HandleTable::new();
        let task = TaskHandle::from_id(0x200);
        let acquired = Arc::new(AtomicU32::new(0));
        let acquired_cb = acquired.clone();

        table
            .alloc_callback(
                Route::new(task, EventKind::EveryNSamplesAcquired),
                EventCallback::every_n_samples(move |event| {
                    acquired_cb.fetch_add(event.n_samples, Ordering::SeqCst);
                    0
                }),
            )
            .unwrap();

        let acquired_type = EventKind::EveryNSamplesAcquired.every_n_samples_type().unwrap();
        let transferred_type = EventKind::EveryNSamplesTransferred
            .every_n_samples_type()
            .unwrap();

        dispatch_every_n_samples(&table, task, acquired_type, 1000, std::ptr::null_mut());
        dispatch_every_n_samples(&table, task, acquired_type, 1000, std::ptr::null_mut());
        // Transferred route is not bound
        dispatch_every_n_samples(&table, task, transferred_type, 1000, std::ptr::null_mut());
        // Unknown event type
        dispatch_every_n_samples(&table, task, 99, 1000, std::ptr::null_mut());

        assert_eq!(acquired.load(Ordering::SeqCst), 2000);
    }

    #[test]
    fn test_unbound_route_is_dropped() {
        let table = HandleTable::new();
        assert_eq!(
            dispatch_done(&table, TaskHandle::from_id(0x300), 0, std::ptr::null_mut()),
            0
        );
    }

    #[test]
    fn test_stale_user_data_is_dropped() {
        let table = HandleTable::new();
        let task = TaskHandle::from_id(0x400);
        let calls = Arc::new(AtomicU32::new(0));
        let calls_cb = calls.clone();
        table
            .alloc_callback(
                Route::new(task, EventKind::TaskDone),
                EventCallback::done(move |_| {
                    calls_cb.fetch_add(1, Ordering::SeqCst);
                    0
                }),
            )
            .unwrap();
        let data = table.alloc_user_data(Arc::new(()));
        table.free_user_data(data);

        dispatch_done(&table, task, 0, data.as_ptr());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panicking_callback_is_contained() {
        let table = HandleTable::new();
        let task = TaskHandle::from_id(0x500);
        table
            .alloc_callback(
                Route::new(task, EventKind::TaskDone),
                EventCallback::done(|_| panic!("callback failure")),
            )
            .unwrap();

        assert_eq!(
            dispatch_done(&table, task, 0, std::ptr::null_mut()),
            CALLBACK_PANICKED
        );
    }

    #[test]
    fn test_callback_may_reenter_table() {
        let table = Arc::new(HandleTable::new());
        let task = TaskHandle::from_id(0x600);
        let table_cb = table.clone();
        table
            .alloc_callback(
                Route::new(task, EventKind::TaskDone),
                EventCallback::done(move |event| {
                    // Would deadlock if the table lock were held here
                    table_cb.is_route_bound(Route::new(event.task, EventKind::TaskDone)) as i32
                }),
            )
            .unwrap();

        assert_eq!(dispatch_done(&table, task, 0, std::ptr::null_mut()), 1);
    }
}
