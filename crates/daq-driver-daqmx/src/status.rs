//! DAQmx status code classification.
//!
//! Every DAQmx entry point returns a signed 32-bit status: negative values
//! are errors, zero is success, positive values are warnings (the operation
//! completed but something deserves attention).

use std::fmt;

use crate::driver::DaqmxDriver;
use crate::error::{DaqmxError, Result};

/// Returns `true` if `code` reports an error.
#[inline]
pub fn failed(code: i32) -> bool {
    code < 0
}

/// Returns `true` if `code` reports a completed operation.
///
/// Warnings count as success here, matching how DAQmx callers usually test
/// results. Use [`Status::class`] to tell a clean success from a warning.
#[inline]
pub fn success(code: i32) -> bool {
    code >= 0
}

/// Returns `true` if `code` reports a warning.
#[inline]
pub fn warning(code: i32) -> bool {
    code > 0
}

/// Three-way classification of a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusClass {
    /// `code < 0`
    Failure,
    /// `code == 0`
    Success,
    /// `code > 0`
    Warning,
}

/// A raw DAQmx status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Status(pub i32);

impl Status {
    /// The zero status.
    pub const OK: Status = Status(0);

    /// Raw status value.
    pub fn code(self) -> i32 {
        self.0
    }

    /// Classify the status.
    pub fn class(self) -> StatusClass {
        match self.0 {
            c if c < 0 => StatusClass::Failure,
            0 => StatusClass::Success,
            _ => StatusClass::Warning,
        }
    }

    /// Check if the status reports an error.
    pub fn is_failed(self) -> bool {
        failed(self.0)
    }

    /// Check if the status reports a completed operation (including warnings).
    pub fn is_success(self) -> bool {
        success(self.0)
    }

    /// Check if the status reports a warning.
    pub fn is_warning(self) -> bool {
        warning(self.0)
    }

    /// Convert a failing status into an error carrying the driver's description.
    ///
    /// Warnings are passed through as `Ok` so the caller can decide whether to
    /// log them.
    pub fn check(code: i32, driver: &dyn DaqmxDriver) -> Result<Status> {
        if failed(code) {
            Err(DaqmxError::Status {
                code,
                message: driver.error_string(code),
            })
        } else {
            Ok(Status(code))
        }
    }
}

impl From<i32> for Status {
    fn from(code: i32) -> Self {
        Status(code)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.class() {
            StatusClass::Failure => write!(f, "error {}", self.0),
            StatusClass::Success => write!(f, "ok"),
            StatusClass::Warning => write!(f, "warning {}", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDriver;

    #[test]
    fn test_trichotomy() {
        for code in [i32::MIN, -200088, -1] {
            assert!(failed(code));
            assert!(!success(code));
            assert!(!warning(code));
            assert_eq!(Status(code).class(), StatusClass::Failure);
        }

        assert!(!failed(0));
        assert!(success(0));
        assert!(!warning(0));
        assert_eq!(Status(0).class(), StatusClass::Success);

        for code in [1, 200015, i32::MAX] {
            assert!(!failed(code));
            assert!(success(code));
            assert!(warning(code));
            assert_eq!(Status(code).class(), StatusClass::Warning);
        }
    }

    #[test]
    fn test_status_display() {
        assert_eq!(Status::OK.to_string(), "ok");
        assert_eq!(Status(-1).to_string(), "error -1");
        assert_eq!(Status(5).to_string(), "warning 5");
    }

    #[test]
    fn test_check_uses_driver_description() {
        let driver = MockDriver::new();
        driver.set_error_string(-200088, "Task specified is invalid or does not exist.");

        let err = Status::check(-200088, &driver).unwrap_err();
        assert_eq!(err.status_code(), Some(-200088));
        assert!(err.to_string().contains("does not exist"));

        assert_eq!(Status::check(0, &driver).unwrap(), Status::OK);
        assert_eq!(Status::check(7, &driver).unwrap().class(), StatusClass::Warning);
    }
}
