//! Error types for DAQmx operations.
//!
//! [`DaqmxError`] covers task control and driver access; [`RegistrationError`]
//! describes why an event registration did not take effect. Registration
//! failures are ordinary return values, never panics.

use thiserror::Error;

use crate::event::EventKind;
use crate::handles::HandleError;
use crate::task::TaskHandle;

/// Result type alias for DAQmx operations.
pub type Result<T> = std::result::Result<T, DaqmxError>;

/// Errors that can occur when working with DAQmx tasks.
#[derive(Error, Debug)]
pub enum DaqmxError {
    /// The driver returned a failing status code
    #[error("DAQmx error ({code}): {message}")]
    Status { code: i32, message: String },

    /// Crate was built without the `daqmx-sdk` feature
    #[error("NI-DAQmx driver not available: build with the `hardware` feature")]
    SdkUnavailable,

    /// Operation attempted on a task that has already been cleared
    #[error("Task '{name}' has already been cleared")]
    TaskCleared { name: String },

    /// Invalid configuration or parameter
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Event registration did not take effect
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    /// Configuration file could not be parsed
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl DaqmxError {
    /// Check if this error carries a driver status code.
    pub fn status_code(&self) -> Option<i32> {
        match self {
            Self::Status { code, .. } => Some(*code),
            Self::Registration(RegistrationError::Driver { code, .. }) => Some(*code),
            _ => None,
        }
    }
}

/// Reasons an event registration did not take effect.
///
/// Every variant is reported after all cross-boundary handles allocated for
/// the attempt have been released.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// The supplied callback shape does not match the event kind
    #[error("No {expected} callback supplied for {kind} event")]
    MissingCallback {
        kind: EventKind,
        expected: &'static str,
    },

    /// Every-N-samples events need a positive sample count
    #[error("Invalid sample threshold {threshold} for {kind} event")]
    InvalidThreshold { kind: EventKind, threshold: u32 },

    /// An event of this kind is already registered on the task
    #[error("{kind} event already registered on task {task:?}")]
    AlreadyRegistered { task: TaskHandle, kind: EventKind },

    /// The native registration call returned a non-zero status
    #[error("Driver rejected {kind} registration ({code}): {message}")]
    Driver {
        kind: EventKind,
        code: i32,
        message: String,
    },

    /// The native registration call panicked
    #[error("Registration setup failed: {message}")]
    Setup { message: String },
}

impl RegistrationError {
    /// Check if the native driver was reached and refused the registration.
    pub fn is_driver_failure(&self) -> bool {
        matches!(self, Self::Driver { .. })
    }

    /// Check if the request was rejected before reaching the driver.
    pub fn is_invalid_request(&self) -> bool {
        matches!(
            self,
            Self::MissingCallback { .. }
                | Self::InvalidThreshold { .. }
                | Self::AlreadyRegistered { .. }
        )
    }
}

impl From<HandleError> for RegistrationError {
    fn from(err: HandleError) -> Self {
        match err {
            HandleError::RouteInUse { task, kind } => Self::AlreadyRegistered { task, kind },
        }
    }
}

/// Render a panic payload caught with `catch_unwind` as a message.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RegistrationError::Driver {
            kind: EventKind::TaskDone,
            code: -200088,
            message: "Task specified is invalid".to_string(),
        };
        assert!(err.to_string().contains("-200088"));
        assert!(err.to_string().contains("Task specified is invalid"));
        assert!(err.is_driver_failure());
        assert!(!err.is_invalid_request());
    }

    #[test]
    fn test_status_code_passthrough() {
        let err: DaqmxError = RegistrationError::Driver {
            kind: EventKind::EveryNSamplesAcquired,
            code: -1,
            message: String::new(),
        }
        .into();
        assert_eq!(err.status_code(), Some(-1));

        let err = DaqmxError::SdkUnavailable;
        assert_eq!(err.status_code(), None);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(panic_message(payload.as_ref()), "owned boom");

        let payload: Box<dyn std::any::Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
