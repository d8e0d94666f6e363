//! Cross-boundary handle table.
//!
//! Native code only ever sees integer tokens, never host pointers. A token
//! is resolved back to the host object through this table, so an event that
//! fires after its handle was freed finds nothing instead of dangling memory.
//!
//! Two kinds of handle exist:
//!
//! - **Callback handles** hold the host callback and are bound to a route,
//!   the `(task, event kind)` pair the driver reports when the event fires.
//! - **User-data handles** hold the caller's payload. Their token travels
//!   through the native `void*` data slot.
//!
//! The lock is held only to insert, remove or clone `Arc`s; callbacks are
//! never invoked under it.

use std::collections::HashMap;
use std::ffi::c_void;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::event::{EventCallback, EventKind, UserData};
use crate::task::TaskHandle;

/// Process-wide table resolved by the native trampolines.
static GLOBAL: Lazy<Arc<HandleTable>> = Lazy::new(|| Arc::new(HandleTable::new()));

/// Identifies where a native event is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Route {
    /// Task the event belongs to.
    pub task: TaskHandle,
    /// Kind of event.
    pub kind: EventKind,
}

impl Route {
    /// Create a route.
    pub fn new(task: TaskHandle, kind: EventKind) -> Self {
        Self { task, kind }
    }
}

/// A non-zero handle token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(NonZeroU64);

impl Token {
    /// Raw token value.
    pub fn get(self) -> u64 {
        self.0.get()
    }

    /// Encode the token for the native `void*` data slot.
    pub fn as_ptr(self) -> *mut c_void {
        self.0.get() as usize as *mut c_void
    }

    /// Decode a native data pointer. Null yields `None`.
    pub fn from_ptr(ptr: *mut c_void) -> Option<Self> {
        NonZeroU64::new(ptr as usize as u64).map(Self)
    }
}

/// Errors reported by the handle table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandleError {
    /// The route already has a callback bound to it
    #[error("{kind} route on task {task:?} is already bound")]
    RouteInUse { task: TaskHandle, kind: EventKind },
}

struct CallbackSlot {
    route: Route,
    callback: EventCallback,
}

#[derive(Default)]
struct TableInner {
    callbacks: HashMap<Token, CallbackSlot>,
    user_data: HashMap<Token, UserData>,
    routes: HashMap<Route, Token>,
}

/// Host objects resolved for one native event.
#[derive(Debug, Clone)]
pub struct Resolved {
    /// Callback bound to the route.
    pub callback: EventCallback,
    /// User data decoded from the native data pointer.
    pub user_data: Option<UserData>,
}

/// Reasons a native event could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unresolved {
    /// No callback is bound to the route.
    UnboundRoute,
    /// The data pointer names a user-data handle that no longer exists.
    StaleUserData,
}

/// Table of live cross-boundary handles.
pub struct HandleTable {
    inner: Mutex<TableInner>,
    next_token: AtomicU64,
}

impl HandleTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TableInner::default()),
            next_token: AtomicU64::new(1),
        }
    }

    /// The process-wide table used by the native trampolines.
    pub fn global() -> &'static Arc<HandleTable> {
        &GLOBAL
    }

    fn next(&self) -> Token {
        loop {
            let raw = self.next_token.fetch_add(1, Ordering::Relaxed);
            if let Some(token) = NonZeroU64::new(raw) {
                return Token(token);
            }
        }
    }

    /// Allocate a callback handle and bind it to `route`.
    ///
    /// # Errors
    ///
    /// Returns [`HandleError::RouteInUse`] if another callback is bound to
    /// the route. The existing binding is left untouched.
    pub fn alloc_callback(&self, route: Route, callback: EventCallback) -> Result<Token, HandleError> {
        let mut inner = self.inner.lock();
        if inner.routes.contains_key(&route) {
            return Err(HandleError::RouteInUse {
                task: route.task,
                kind: route.kind,
            });
        }
        let token = self.next();
        inner.routes.insert(route, token);
        inner.callbacks.insert(token, CallbackSlot { route, callback });
        debug!(token = token.get(), task = ?route.task, kind = %route.kind, "Allocated callback handle");
        Ok(token)
    }

    /// Allocate a user-data handle.
    pub fn alloc_user_data(&self, data: UserData) -> Token {
        let token = self.next();
        self.inner.lock().user_data.insert(token, data);
        debug!(token = token.get(), "Allocated user-data handle");
        token
    }

    /// Free a callback handle and unbind its route.
    ///
    /// Returns `false` if the handle was not allocated.
    pub fn free_callback(&self, token: Token) -> bool {
        let mut inner = self.inner.lock();
        match inner.callbacks.remove(&token) {
            Some(slot) => {
                if inner.routes.get(&slot.route) == Some(&token) {
                    inner.routes.remove(&slot.route);
                }
                debug!(token = token.get(), "Freed callback handle");
                true
            }
            None => false,
        }
    }

    /// Free a user-data handle.
    ///
    /// Only the table's reference is dropped; the caller's object survives.
    /// Returns `false` if the handle was not allocated.
    pub fn free_user_data(&self, token: Token) -> bool {
        let freed = self.inner.lock().user_data.remove(&token).is_some();
        if freed {
            debug!(token = token.get(), "Freed user-data handle");
        }
        freed
    }

    /// Resolve a native event to its host callback and user data.
    pub fn resolve(&self, route: Route, data: *mut c_void) -> Result<Resolved, Unresolved> {
        let inner = self.inner.lock();
        let callback = inner
            .routes
            .get(&route)
            .and_then(|token| inner.callbacks.get(token))
            .map(|slot| slot.callback.clone())
            .ok_or(Unresolved::UnboundRoute)?;

        let user_data = match Token::from_ptr(data) {
            None => None,
            Some(token) => Some(
                inner
                    .user_data
                    .get(&token)
                    .cloned()
                    .ok_or(Unresolved::StaleUserData)?,
            ),
        };

        Ok(Resolved {
            callback,
            user_data,
        })
    }

    /// Check if a handle is allocated.
    pub fn contains(&self, token: Token) -> bool {
        let inner = self.inner.lock();
        inner.callbacks.contains_key(&token) || inner.user_data.contains_key(&token)
    }

    /// Check if a callback is bound to `route`.
    pub fn is_route_bound(&self, route: Route) -> bool {
        self.inner.lock().routes.contains_key(&route)
    }

    /// Number of allocated callback handles.
    pub fn callback_count(&self) -> usize {
        self.inner.lock().callbacks.len()
    }

    /// Number of allocated user-data handles.
    pub fn user_data_count(&self) -> usize {
        self.inner.lock().user_data.len()
    }

    /// Total number of allocated handles.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        inner.callbacks.len() + inner.user_data.len()
    }

    /// Check if no handle is allocated.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HandleTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("HandleTable")
            .field("callbacks", &inner.callbacks.len())
            .field("user_data", &inner.user_data.len())
            .field("routes", &inner.routes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn done_callback() -> EventCallback {
        EventCallback::done(|_| 0)
    }

    #[test]
    fn test_token_pointer_encoding() {
        assert_eq!(Token::from_ptr(std::ptr::null_mut()), None);

        let table = HandleTable::new();
        let token = table.alloc_user_data(Arc::new(1u32));
        assert!(!token.as_ptr().is_null());
        assert_eq!(Token::from_ptr(token.as_ptr()), Some(token));
    }

    #[test]
    fn test_alloc_and_free_counts() {
        let table = HandleTable::new();
        let route = Route::new(TaskHandle::from_id(0x10), EventKind::TaskDone);

        let cb = table.alloc_callback(route, done_callback()).unwrap();
        let data = table.alloc_user_data(Arc::new("payload"));
        assert_eq!(table.len(), 2);
        assert_eq!(table.callback_count(), 1);
        assert_eq!(table.user_data_count(), 1);
        assert!(table.is_route_bound(route));

        assert!(table.free_callback(cb));
        assert!(table.free_user_data(data));
        assert!(table.is_empty());
        assert!(!table.is_route_bound(route));

        // Second free is a no-op
        assert!(!table.free_callback(cb));
        assert!(!table.free_user_data(data));
    }

    #[test]
    fn test_route_in_use() {
        let table = HandleTable::new();
        let task = TaskHandle::from_id(0x20);
        let route = Route::new(task, EventKind::EveryNSamplesAcquired);

        let first = table
            .alloc_callback(route, EventCallback::every_n_samples(|_| 0))
            .unwrap();
        let err = table
            .alloc_callback(route, EventCallback::every_n_samples(|_| 0))
            .unwrap_err();
        assert_eq!(
            err,
            HandleError::RouteInUse {
                task,
                kind: EventKind::EveryNSamplesAcquired
            }
        );
        assert!(table.contains(first));
        assert_eq!(table.callback_count(), 1);

        // Same task, different kind is a different route
        table
            .alloc_callback(
                Route::new(task, EventKind::EveryNSamplesTransferred),
                EventCallback::every_n_samples(|_| 0),
            )
            .unwrap();
        assert_eq!(table.callback_count(), 2);
    }

    #[test]
    fn test_resolve() {
        let table = HandleTable::new();
        let route = Route::new(TaskHandle::from_id(0x30), EventKind::TaskDone);

        assert_eq!(
            table.resolve(route, std::ptr::null_mut()).unwrap_err(),
            Unresolved::UnboundRoute
        );

        let cb = table.alloc_callback(route, done_callback()).unwrap();
        let data = table.alloc_user_data(Arc::new(7u32));

        let resolved = table.resolve(route, std::ptr::null_mut()).unwrap();
        assert!(resolved.user_data.is_none());

        let resolved = table.resolve(route, data.as_ptr()).unwrap();
        let value = resolved.user_data.unwrap();
        assert_eq!(value.downcast_ref::<u32>(), Some(&7));

        table.free_user_data(data);
        assert_eq!(
            table.resolve(route, data.as_ptr()).unwrap_err(),
            Unresolved::StaleUserData
        );

        table.free_callback(cb);
        assert_eq!(
            table.resolve(route, std::ptr::null_mut()).unwrap_err(),
            Unresolved::UnboundRoute
        );
    }

    #[test]
    fn test_free_user_data_keeps_caller_object() {
        let table = HandleTable::new();
        let data: UserData = Arc::new(vec![1, 2, 3]);
        let token = table.alloc_user_data(data.clone());
        assert_eq!(Arc::strong_count(&data), 2);

        table.free_user_data(token);
        assert_eq!(Arc::strong_count(&data), 1);
        assert_eq!(data.downcast_ref::<Vec<i32>>(), Some(&vec![1, 2, 3]));
    }
}
