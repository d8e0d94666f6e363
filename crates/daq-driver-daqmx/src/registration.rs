//! RAII event registrations.
//!
//! A [`CallbackRegistration`] owns everything one native subscription needs:
//! the callback handle bound to the `(task, kind)` route, the optional
//! user-data handle whose token travels through the native data pointer,
//! and the knowledge of whether the driver accepted the subscription.
//!
//! Construction either yields a registered value or an error with every
//! handle already released. Teardown unregisters the native event first and
//! frees the handles afterwards, so a late event finds an unbound route
//! rather than freed memory.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::CallbackConfig;
use crate::driver::DaqmxDriver;
use crate::error::{panic_message, RegistrationError};
use crate::event::{EventCallback, EventKind, UserData};
use crate::handles::{HandleTable, Route, Token};
use crate::task::TaskHandle;
use crate::trampoline::Trampoline;

/// Parameters of one registration attempt.
#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    /// Task to subscribe on.
    pub task: TaskHandle,
    /// Event to subscribe to.
    pub kind: EventKind,
    /// Host callback; its shape must match `kind`.
    pub callback: EventCallback,
    /// Payload handed back to the callback.
    pub user_data: Option<UserData>,
    /// Sample count for every-N-samples events. Ignored for task-done.
    pub sample_threshold: u32,
}

impl RegistrationRequest {
    /// Request a task-done subscription.
    pub fn done(task: TaskHandle, callback: EventCallback) -> Self {
        Self {
            task,
            kind: EventKind::TaskDone,
            callback,
            user_data: None,
            sample_threshold: 0,
        }
    }

    /// Request an every-N-samples subscription.
    pub fn every_n_samples(
        task: TaskHandle,
        kind: EventKind,
        sample_threshold: u32,
        callback: EventCallback,
    ) -> Self {
        Self {
            task,
            kind,
            callback,
            user_data: None,
            sample_threshold,
        }
    }

    /// Attach user data.
    pub fn with_user_data(mut self, user_data: Option<UserData>) -> Self {
        self.user_data = user_data;
        self
    }
}

/// One native event subscription and the handles backing it.
///
/// Dropping the registration closes it.
pub struct CallbackRegistration {
    task: TaskHandle,
    kind: EventKind,
    sample_threshold: Option<u32>,
    callback_token: Option<Token>,
    data_token: Option<Token>,
    registered: bool,
    last_error: Option<String>,
    driver: Arc<dyn DaqmxDriver>,
    table: Arc<HandleTable>,
    config: CallbackConfig,
}

impl CallbackRegistration {
    /// Subscribe to a native event.
    ///
    /// # Errors
    ///
    /// - [`RegistrationError::MissingCallback`] if the callback shape does
    ///   not match the event kind
    /// - [`RegistrationError::InvalidThreshold`] for a zero sample count
    /// - [`RegistrationError::AlreadyRegistered`] if the route is taken
    /// - [`RegistrationError::Driver`] if the driver returns any non-zero
    ///   status, warnings included
    /// - [`RegistrationError::Setup`] if the driver call panics
    ///
    /// No handle and no native subscription outlives a failed attempt.
    pub fn register(
        driver: Arc<dyn DaqmxDriver>,
        config: &CallbackConfig,
        request: RegistrationRequest,
    ) -> Result<Self, RegistrationError> {
        Self::register_in(driver, HandleTable::global().clone(), config, request)
    }

    /// Register against `table`.
    ///
    /// The native trampolines only resolve through [`HandleTable::global`],
    /// so any other table is reachable only through the `dispatch_*`
    /// functions.
    pub(crate) fn register_in(
        driver: Arc<dyn DaqmxDriver>,
        table: Arc<HandleTable>,
        config: &CallbackConfig,
        request: RegistrationRequest,
    ) -> Result<Self, RegistrationError> {
        let RegistrationRequest {
            task,
            kind,
            callback,
            user_data,
            sample_threshold,
        } = request;

        let trampoline = Trampoline::resolve(kind, &callback).ok_or(
            RegistrationError::MissingCallback {
                kind,
                expected: expected_shape(kind),
            },
        )?;

        let sample_threshold = if kind.is_every_n_samples() {
            if sample_threshold == 0 {
                return Err(RegistrationError::InvalidThreshold {
                    kind,
                    threshold: sample_threshold,
                });
            }
            Some(sample_threshold)
        } else {
            None
        };

        // From here on, dropping `registration` releases whatever was allocated
        let mut registration = Self {
            task,
            kind,
            sample_threshold,
            callback_token: None,
            data_token: None,
            registered: false,
            last_error: None,
            driver,
            table,
            config: config.clone(),
        };

        registration.callback_token = Some(
            registration
                .table
                .alloc_callback(Route::new(task, kind), callback)?,
        );
        registration.data_token = user_data.map(|data| registration.table.alloc_user_data(data));

        let data = registration
            .data_token
            .map_or(std::ptr::null_mut(), Token::as_ptr);
        let options = registration.config.options();
        let driver = registration.driver.clone();

        let outcome = catch_unwind(AssertUnwindSafe(|| match trampoline {
            Trampoline::Done(callback) => driver.register_done_event(task, options, callback, data),
            Trampoline::EveryNSamples {
                callback,
                event_type,
            } => driver.register_every_n_samples_event(
                task,
                event_type,
                sample_threshold.unwrap_or_default(),
                options,
                callback,
                data,
            ),
        }));

        let code = match outcome {
            Ok(code) => code,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(task = ?task, kind = %kind, "Event registration panicked: {}", message);
                return Err(RegistrationError::Setup { message });
            }
        };

        if code != 0 {
            let message = describe_status(driver.as_ref(), code);
            warn!(task = ?task, kind = %kind, code, "Driver rejected event registration: {}", message);
            if code > 0 {
                // A warning status still installs the native subscription
                registration.unregister();
            }
            return Err(RegistrationError::Driver {
                kind,
                code,
                message,
            });
        }

        registration.registered = true;
        info!(
            task = ?task,
            kind = %kind,
            sample_threshold = ?sample_threshold,
            handles = registration.handle_count(),
            "Registered DAQmx event"
        );
        Ok(registration)
    }

    /// Check if the native subscription is active.
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Task the subscription is on.
    pub fn task(&self) -> TaskHandle {
        self.task
    }

    /// Subscribed event kind.
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Sample threshold, for every-N-samples events.
    pub fn sample_threshold(&self) -> Option<u32> {
        self.sample_threshold
    }

    /// Number of cross-boundary handles currently held.
    pub fn handle_count(&self) -> usize {
        usize::from(self.callback_token.is_some()) + usize::from(self.data_token.is_some())
    }

    /// Callback handle, while held.
    pub fn callback_token(&self) -> Option<Token> {
        self.callback_token
    }

    /// User-data handle, while held.
    pub fn user_data_token(&self) -> Option<Token> {
        self.data_token
    }

    /// Diagnostic from the most recent teardown failure.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Unregister the native event and release all handles.
    ///
    /// Idempotent. Unregistration failures are logged and kept in
    /// [`last_error`](Self::last_error); the handles are freed regardless.
    pub fn close(&mut self) {
        if self.registered {
            self.registered = false;
            if self.config.unregister_on_close {
                self.unregister();
            }
        }

        let mut released = 0;
        if let Some(token) = self.callback_token.take() {
            released += usize::from(self.table.free_callback(token));
        }
        if let Some(token) = self.data_token.take() {
            released += usize::from(self.table.free_user_data(token));
        }
        if released > 0 {
            debug!(task = ?self.task, kind = %self.kind, released, "Released event handles");
        }
    }

    fn unregister(&mut self) {
        let task = self.task;
        let options = self.config.options();
        let n_samples = self.sample_threshold.unwrap_or_default();
        let driver = self.driver.clone();

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            match self.kind.every_n_samples_type() {
                None => driver.register_done_event(task, options, None, std::ptr::null_mut()),
                Some(event_type) => driver.register_every_n_samples_event(
                    task,
                    event_type,
                    n_samples,
                    options,
                    None,
                    std::ptr::null_mut(),
                ),
            }
        }));

        let message = match outcome {
            Ok(0) => {
                info!(task = ?task, kind = %self.kind, "Unregistered DAQmx event");
                return;
            }
            Ok(code) => format!(
                "Unregister failed ({}): {}",
                code,
                describe_status(driver.as_ref(), code)
            ),
            Err(payload) => format!("Unregister panicked: {}", panic_message(payload.as_ref())),
        };
        warn!(task = ?task, kind = %self.kind, "{}", message);
        self.last_error = Some(message);
    }
}

impl Drop for CallbackRegistration {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for CallbackRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistration")
            .field("task", &self.task)
            .field("kind", &self.kind)
            .field("sample_threshold", &self.sample_threshold)
            .field("registered", &self.registered)
            .field("handles", &self.handle_count())
            .field("last_error", &self.last_error)
            .finish()
    }
}

fn expected_shape(kind: EventKind) -> &'static str {
    if kind.is_every_n_samples() {
        "every-N-samples"
    } else {
        "done"
    }
}

fn describe_status(driver: &dyn DaqmxDriver, code: i32) -> String {
    catch_unwind(AssertUnwindSafe(|| driver.error_string(code)))
        .unwrap_or_else(|_| format!("DAQmx status {}", code))
}
