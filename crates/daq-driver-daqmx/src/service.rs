//! Factory for event registrations.
//!
//! [`CallbackService`] offers one entry point per event kind. Each returns
//! either a fully registered [`CallbackRegistration`] or nothing; a failed
//! attempt leaves no handles and no native subscription behind.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use daq_driver_daqmx::{CallbackService, MockDriver, Task};
//!
//! let driver = Arc::new(MockDriver::new());
//! let service = CallbackService::new(driver.clone());
//! let mut task = Task::create(driver, "acquisition")?;
//!
//! if let Some(reg) = service.register_n_samples_read_event(
//!     task.handle(),
//!     |event| {
//!         println!("{} samples ready", event.n_samples);
//!         0
//!     },
//!     1000,
//!     None,
//! ) {
//!     task.adopt(reg);
//! }
//! task.start()?;
//! # Ok::<(), daq_driver_daqmx::DaqmxError>(())
//! ```

use std::sync::Arc;

use tracing::warn;

use crate::config::CallbackConfig;
use crate::driver::{DaqmxDriver, NativeDriver};
use crate::error::{RegistrationError, Result};
use crate::event::{DoneEvent, EventCallback, EventKind, SamplesEvent, UserData};
use crate::handles::HandleTable;
use crate::registration::{CallbackRegistration, RegistrationRequest};
use crate::task::TaskHandle;

/// Creates event registrations against one driver.
#[derive(Clone)]
pub struct CallbackService {
    driver: Arc<dyn DaqmxDriver>,
    table: Arc<HandleTable>,
    config: CallbackConfig,
}

impl CallbackService {
    /// Service over `driver` with default settings.
    ///
    /// Registrations are recorded in [`HandleTable::global`], the table the
    /// native trampolines resolve through.
    pub fn new(driver: Arc<dyn DaqmxDriver>) -> Self {
        Self {
            driver,
            table: HandleTable::global().clone(),
            config: CallbackConfig::default(),
        }
    }

    /// Service over the installed NI-DAQmx library.
    ///
    /// # Errors
    ///
    /// Returns [`crate::DaqmxError::SdkUnavailable`] without the `hardware` feature.
    pub fn native() -> Result<Self> {
        Ok(Self::new(Arc::new(NativeDriver::new()?)))
    }

    /// Replace the registration settings.
    pub fn with_config(mut self, config: CallbackConfig) -> Self {
        self.config = config;
        self
    }

    /// Record registrations in an isolated table.
    ///
    /// Native events never reach such a table; deliver them with
    /// [`crate::trampoline::dispatch_done`] and friends.
    #[cfg(test)]
    pub(crate) fn with_table(mut self, table: Arc<HandleTable>) -> Self {
        self.table = table;
        self
    }

    /// Driver used for registrations.
    pub fn driver(&self) -> &Arc<dyn DaqmxDriver> {
        &self.driver
    }

    /// Table registrations are recorded in.
    pub fn table(&self) -> &Arc<HandleTable> {
        &self.table
    }

    /// Active settings.
    pub fn config(&self) -> &CallbackConfig {
        &self.config
    }

    /// Register a task-done callback.
    pub fn try_register_done_event<F>(
        &self,
        task: TaskHandle,
        callback: F,
        user_data: Option<UserData>,
    ) -> std::result::Result<CallbackRegistration, RegistrationError>
    where
        F: Fn(&DoneEvent<'_>) -> i32 + Send + Sync + 'static,
    {
        self.try_register(
            RegistrationRequest::done(task, EventCallback::done(callback)).with_user_data(user_data),
        )
    }

    /// Register a callback for every `n_samples` samples transferred from the
    /// output buffer.
    pub fn try_register_n_samples_written_event<F>(
        &self,
        task: TaskHandle,
        callback: F,
        n_samples: u32,
        user_data: Option<UserData>,
    ) -> std::result::Result<CallbackRegistration, RegistrationError>
    where
        F: Fn(&SamplesEvent<'_>) -> i32 + Send + Sync + 'static,
    {
        self.try_register(
            RegistrationRequest::every_n_samples(
                task,
                EventKind::EveryNSamplesTransferred,
                n_samples,
                EventCallback::every_n_samples(callback),
            )
            .with_user_data(user_data),
        )
    }

    /// Register a callback for every `n_samples` samples acquired into the
    /// input buffer.
    pub fn try_register_n_samples_read_event<F>(
        &self,
        task: TaskHandle,
        callback: F,
        n_samples: u32,
        user_data: Option<UserData>,
    ) -> std::result::Result<CallbackRegistration, RegistrationError>
    where
        F: Fn(&SamplesEvent<'_>) -> i32 + Send + Sync + 'static,
    {
        self.try_register(
            RegistrationRequest::every_n_samples(
                task,
                EventKind::EveryNSamplesAcquired,
                n_samples,
                EventCallback::every_n_samples(callback),
            )
            .with_user_data(user_data),
        )
    }

    /// Register a prepared request.
    pub fn try_register(
        &self,
        request: RegistrationRequest,
    ) -> std::result::Result<CallbackRegistration, RegistrationError> {
        CallbackRegistration::register_in(
            self.driver.clone(),
            self.table.clone(),
            &self.config,
            request,
        )
    }

    /// Register a task-done callback.
    ///
    /// Returns `None` if nothing was registered; the reason is logged.
    pub fn register_done_event<F>(
        &self,
        task: TaskHandle,
        callback: F,
        user_data: Option<UserData>,
    ) -> Option<CallbackRegistration>
    where
        F: Fn(&DoneEvent<'_>) -> i32 + Send + Sync + 'static,
    {
        log_failure(task, self.try_register_done_event(task, callback, user_data))
    }

    /// Register a written-samples callback.
    ///
    /// Returns `None` if nothing was registered; the reason is logged.
    pub fn register_n_samples_written_event<F>(
        &self,
        task: TaskHandle,
        callback: F,
        n_samples: u32,
        user_data: Option<UserData>,
    ) -> Option<CallbackRegistration>
    where
        F: Fn(&SamplesEvent<'_>) -> i32 + Send + Sync + 'static,
    {
        log_failure(
            task,
            self.try_register_n_samples_written_event(task, callback, n_samples, user_data),
        )
    }

    /// Register a read-samples callback.
    ///
    /// Returns `None` if nothing was registered; the reason is logged.
    pub fn register_n_samples_read_event<F>(
        &self,
        task: TaskHandle,
        callback: F,
        n_samples: u32,
        user_data: Option<UserData>,
    ) -> Option<CallbackRegistration>
    where
        F: Fn(&SamplesEvent<'_>) -> i32 + Send + Sync + 'static,
    {
        log_failure(
            task,
            self.try_register_n_samples_read_event(task, callback, n_samples, user_data),
        )
    }
}

impl std::fmt::Debug for CallbackService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackService")
            .field("table", &self.table)
            .field("config", &self.config)
            .finish()
    }
}

fn log_failure(
    task: TaskHandle,
    result: std::result::Result<CallbackRegistration, RegistrationError>,
) -> Option<CallbackRegistration> {
    match result {
        Ok(registration) => Some(registration),
        Err(e) => {
            warn!(task = ?task, "Event registration failed: {}", e);
            None
        }
    }
}
