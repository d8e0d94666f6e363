//! Driver seam over the NI-DAQmx C ABI.
//!
//! [`DaqmxDriver`] mirrors the handful of native entry points this crate
//! needs. Status codes cross it unchanged; classification happens in
//! [`crate::status`]. [`NativeDriver`] forwards to `daqmx-sys`, and
//! [`crate::mock::MockDriver`] stands in for it in tests.

use std::ffi::{c_void, CStr};
use std::os::raw::c_char;

use tracing::debug;

use crate::error::{DaqmxError, Result};
use crate::task::TaskHandle;

/// Native done-event callback pointer (`None` unregisters).
pub type NativeDoneCallback = daqmx_sys::DAQmxDoneEventCallbackPtr;

/// Native every-N-samples callback pointer (`None` unregisters).
pub type NativeEveryNSamplesCallback = daqmx_sys::DAQmxEveryNSamplesEventCallbackPtr;

/// The native DAQmx entry points used by this crate.
///
/// Implementations must be callable from any thread. Event registration
/// functions receive raw trampolines and opaque data pointers that the
/// driver passes back verbatim when the event fires.
pub trait DaqmxDriver: Send + Sync {
    /// `DAQmxCreateTask`
    fn create_task(&self, name: &CStr, task: &mut TaskHandle) -> i32;

    /// `DAQmxStartTask`
    fn start_task(&self, task: TaskHandle) -> i32;

    /// `DAQmxStopTask`
    fn stop_task(&self, task: TaskHandle) -> i32;

    /// `DAQmxClearTask`
    fn clear_task(&self, task: TaskHandle) -> i32;

    /// `DAQmxTaskControl`
    fn task_control(&self, task: TaskHandle, action: i32) -> i32;

    /// `DAQmxWaitUntilTaskDone`
    fn wait_until_task_done(&self, task: TaskHandle, timeout_s: f64) -> i32;

    /// `DAQmxIsTaskDone`
    fn is_task_done(&self, task: TaskHandle, done: &mut bool) -> i32;

    /// `DAQmxRegisterDoneEvent`
    fn register_done_event(
        &self,
        task: TaskHandle,
        options: u32,
        callback: NativeDoneCallback,
        data: *mut c_void,
    ) -> i32;

    /// `DAQmxRegisterEveryNSamplesEvent`
    fn register_every_n_samples_event(
        &self,
        task: TaskHandle,
        event_type: i32,
        n_samples: u32,
        options: u32,
        callback: NativeEveryNSamplesCallback,
        data: *mut c_void,
    ) -> i32;

    /// `DAQmxGetErrorString`
    fn error_string(&self, code: i32) -> String;
}

/// Driver backed by the installed NI-DAQmx library.
#[derive(Debug)]
pub struct NativeDriver {
    _private: (),
}

impl NativeDriver {
    /// Create a native driver.
    ///
    /// # Errors
    ///
    /// Returns [`DaqmxError::SdkUnavailable`] if this build does not link
    /// against NI-DAQmx (the `hardware` feature is off).
    pub fn new() -> Result<Self> {
        if !daqmx_sys::SDK_AVAILABLE {
            return Err(DaqmxError::SdkUnavailable);
        }
        debug!("Using native NI-DAQmx driver");
        Ok(Self { _private: () })
    }
}

// Task handles are opaque values owned by the driver; DAQmx validates them
// and reports an invalid handle as a status code.
#[allow(unsafe_code)]
impl DaqmxDriver for NativeDriver {
    fn create_task(&self, name: &CStr, task: &mut TaskHandle) -> i32 {
        let mut raw: daqmx_sys::TaskHandle = std::ptr::null_mut();
        // SAFETY: name is a valid null-terminated string and raw is a valid out pointer
        let status = unsafe { daqmx_sys::DAQmxCreateTask(name.as_ptr(), &mut raw) };
        *task = TaskHandle::from_raw(raw);
        status
    }

    fn start_task(&self, task: TaskHandle) -> i32 {
        // SAFETY: takes the handle by value; no pointers are passed
        unsafe { daqmx_sys::DAQmxStartTask(task.as_raw()) }
    }

    fn stop_task(&self, task: TaskHandle) -> i32 {
        // SAFETY: takes the handle by value; no pointers are passed
        unsafe { daqmx_sys::DAQmxStopTask(task.as_raw()) }
    }

    fn clear_task(&self, task: TaskHandle) -> i32 {
        // SAFETY: the driver invalidates the handle; Task nulls its copy afterwards
        unsafe { daqmx_sys::DAQmxClearTask(task.as_raw()) }
    }

    fn task_control(&self, task: TaskHandle, action: i32) -> i32 {
        // SAFETY: action is a plain integer the driver range-checks
        unsafe { daqmx_sys::DAQmxTaskControl(task.as_raw(), action as _) }
    }

    fn wait_until_task_done(&self, task: TaskHandle, timeout_s: f64) -> i32 {
        // SAFETY: blocks inside the driver; no host memory is shared
        unsafe { daqmx_sys::DAQmxWaitUntilTaskDone(task.as_raw(), timeout_s) }
    }

    fn is_task_done(&self, task: TaskHandle, done: &mut bool) -> i32 {
        let mut raw: daqmx_sys::bool32 = 0;
        // SAFETY: raw is a valid out pointer
        let status = unsafe { daqmx_sys::DAQmxIsTaskDone(task.as_raw(), &mut raw) };
        *done = raw != 0;
        status
    }

    fn register_done_event(
        &self,
        task: TaskHandle,
        options: u32,
        callback: NativeDoneCallback,
        data: *mut c_void,
    ) -> i32 {
        // SAFETY: callback is either None or a trampoline with the native
        // signature; data is an opaque token the trampoline decodes.
        unsafe { daqmx_sys::DAQmxRegisterDoneEvent(task.as_raw(), options as _, callback, data) }
    }

    fn register_every_n_samples_event(
        &self,
        task: TaskHandle,
        event_type: i32,
        n_samples: u32,
        options: u32,
        callback: NativeEveryNSamplesCallback,
        data: *mut c_void,
    ) -> i32 {
        // SAFETY: as for register_done_event
        unsafe {
            daqmx_sys::DAQmxRegisterEveryNSamplesEvent(
                task.as_raw(),
                event_type as _,
                n_samples as _,
                options as _,
                callback,
                data,
            )
        }
    }

    fn error_string(&self, code: i32) -> String {
        let mut buffer = vec![0 as c_char; daqmx_sys::ERROR_BUFFER_SIZE];
        // SAFETY: buffer is writable for ERROR_BUFFER_SIZE bytes
        let status = unsafe {
            daqmx_sys::DAQmxGetErrorString(
                code as _,
                buffer.as_mut_ptr(),
                daqmx_sys::ERROR_BUFFER_SIZE as _,
            )
        };
        if status < 0 {
            return format!("Unknown DAQmx error {}", code);
        }
        // Guarantee termination even if the driver filled the whole buffer
        if let Some(last) = buffer.last_mut() {
            *last = 0;
        }
        // SAFETY: buffer is null-terminated
        unsafe { CStr::from_ptr(buffer.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(feature = "hardware"))]
    #[test]
    fn test_native_driver_requires_sdk() {
        let err = NativeDriver::new().unwrap_err();
        assert!(matches!(err, DaqmxError::SdkUnavailable));
    }
}
