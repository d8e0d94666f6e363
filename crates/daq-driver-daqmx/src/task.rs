//! Task handles and RAII task lifecycle.
//!
//! [`TaskHandle`] is the opaque pointer-sized identifier DAQmx hands out.
//! [`Task`] owns one, and tears down in the order the driver requires:
//! stop the task, release every adopted event registration, then clear the
//! task. Releasing a registration while the task still runs would let the
//! driver fire into a callback that is being torn down.

use std::ffi::{c_void, CString};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::driver::DaqmxDriver;
use crate::error::{DaqmxError, Result};
use crate::registration::CallbackRegistration;
use crate::status::{failed, Status};

/// Opaque NI-DAQmx task identifier.
///
/// Not owned: copying a handle does not extend the task's lifetime.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(daqmx_sys::TaskHandle);

// SAFETY: a task handle is an opaque token that is never dereferenced on the
// host side. DAQmx itself accepts task handles from any thread.
#[allow(unsafe_code)]
unsafe impl Send for TaskHandle {}
#[allow(unsafe_code)]
unsafe impl Sync for TaskHandle {}

impl TaskHandle {
    /// The null handle.
    pub const fn null() -> Self {
        Self(std::ptr::null_mut())
    }

    /// Wrap a raw driver handle.
    pub const fn from_raw(raw: daqmx_sys::TaskHandle) -> Self {
        Self(raw)
    }

    /// Raw driver handle.
    pub const fn as_raw(self) -> daqmx_sys::TaskHandle {
        self.0
    }

    /// Build a handle from an integer id (used by test doubles).
    pub fn from_id(id: usize) -> Self {
        Self(id as *mut c_void)
    }

    /// Integer value of the handle.
    pub fn id(self) -> usize {
        self.0 as usize
    }

    /// Check if this is the null handle.
    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

impl Default for TaskHandle {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskHandle({:#x})", self.id())
    }
}

/// Actions accepted by `DAQmxTaskControl`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum TaskAction {
    /// Start the task.
    Start = 0,
    /// Stop the task.
    Stop = 1,
    /// Check timing, triggering and channel attributes.
    Verify = 2,
    /// Program the hardware without starting.
    Commit = 3,
    /// Claim the hardware resources.
    Reserve = 4,
    /// Release reserved resources.
    Unreserve = 5,
    /// Stop immediately and return to the verified state.
    Abort = 6,
}

impl TaskAction {
    /// Raw native value.
    pub fn as_raw(self) -> i32 {
        self as i32
    }

    /// Convert from a raw native value.
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Start),
            1 => Some(Self::Stop),
            2 => Some(Self::Verify),
            3 => Some(Self::Commit),
            4 => Some(Self::Reserve),
            5 => Some(Self::Unreserve),
            6 => Some(Self::Abort),
            _ => None,
        }
    }
}

/// An owned DAQmx task.
///
/// Dropping a `Task` stops and clears it. Registrations handed to
/// [`Task::adopt`] are released between the two steps.
pub struct Task {
    handle: TaskHandle,
    name: String,
    driver: Arc<dyn DaqmxDriver>,
    registrations: Vec<CallbackRegistration>,
}

impl Task {
    /// Create a new task.
    ///
    /// # Errors
    ///
    /// Returns an error if the name contains a NUL byte or the driver
    /// refuses to create the task.
    pub fn create(driver: Arc<dyn DaqmxDriver>, name: &str) -> Result<Self> {
        let c_name = CString::new(name).map_err(|_| DaqmxError::InvalidConfig {
            message: format!("Invalid task name: {}", name),
        })?;

        let mut handle = TaskHandle::null();
        let code = driver.create_task(&c_name, &mut handle);
        Status::check(code, driver.as_ref())?;

        info!(task = %name, handle = ?handle, "Created DAQmx task");

        Ok(Self {
            handle,
            name: name.to_string(),
            driver,
            registrations: Vec::new(),
        })
    }

    /// Native handle, for registering events.
    pub fn handle(&self) -> TaskHandle {
        self.handle
    }

    /// Task name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if the task has been cleared.
    pub fn is_cleared(&self) -> bool {
        self.handle.is_null()
    }

    fn live_handle(&self) -> Result<TaskHandle> {
        if self.handle.is_null() {
            return Err(DaqmxError::TaskCleared {
                name: self.name.clone(),
            });
        }
        Ok(self.handle)
    }

    /// Start the task.
    pub fn start(&self) -> Result<Status> {
        let handle = self.live_handle()?;
        Status::check(self.driver.start_task(handle), self.driver.as_ref())
    }

    /// Stop the task.
    pub fn stop(&self) -> Result<Status> {
        let handle = self.live_handle()?;
        Status::check(self.driver.stop_task(handle), self.driver.as_ref())
    }

    /// Apply a state transition with `DAQmxTaskControl`.
    pub fn control(&self, action: TaskAction) -> Result<Status> {
        let handle = self.live_handle()?;
        Status::check(
            self.driver.task_control(handle, action.as_raw()),
            self.driver.as_ref(),
        )
    }

    /// Wait until the task finishes, up to `timeout` (`None` waits forever).
    pub fn wait_until_done(&self, timeout: Option<Duration>) -> Result<Status> {
        let handle = self.live_handle()?;
        let seconds = timeout.map_or(daqmx_sys::DAQmx_Val_WaitInfinitely, |t| t.as_secs_f64());
        Status::check(
            self.driver.wait_until_task_done(handle, seconds),
            self.driver.as_ref(),
        )
    }

    /// Check whether the task has finished.
    pub fn is_done(&self) -> Result<bool> {
        let handle = self.live_handle()?;
        let mut done = false;
        Status::check(
            self.driver.is_task_done(handle, &mut done),
            self.driver.as_ref(),
        )?;
        Ok(done)
    }

    /// Take ownership of an event registration on this task.
    ///
    /// The registration is released when the task is cleared, after the
    /// task has been stopped.
    pub fn adopt(&mut self, registration: CallbackRegistration) {
        debug!(
            task = %self.name,
            kind = %registration.kind(),
            "Task adopted event registration"
        );
        self.registrations.push(registration);
    }

    /// Number of registrations owned by this task.
    pub fn registration_count(&self) -> usize {
        self.registrations.len()
    }

    /// Stop the task, release its registrations and clear it.
    ///
    /// Clearing an already cleared task is a no-op.
    pub fn clear(&mut self) -> Result<()> {
        if self.handle.is_null() {
            return Ok(());
        }

        let code = self.driver.stop_task(self.handle);
        if failed(code) {
            warn!(
                task = %self.name,
                code,
                "Failed to stop task before clearing: {}",
                self.driver.error_string(code)
            );
        }

        for mut registration in self.registrations.drain(..) {
            registration.close();
        }

        Status::check(self.driver.clear_task(self.handle), self.driver.as_ref())?;
        info!(task = %self.name, "Cleared DAQmx task");
        self.handle = TaskHandle::null();
        Ok(())
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        if let Err(e) = self.clear() {
            warn!(task = %self.name, "Error clearing task on drop: {}", e);
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("handle", &self.handle)
            .field("registrations", &self.registrations.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCall, MockDriver};

    #[test]
    fn test_task_action_from_raw() {
        assert_eq!(TaskAction::from_raw(0), Some(TaskAction::Start));
        assert_eq!(TaskAction::from_raw(6), Some(TaskAction::Abort));
        assert_eq!(TaskAction::from_raw(7), None);
        assert_eq!(TaskAction::Commit.as_raw(), daqmx_sys::DAQmx_Val_Task_Commit as i32);
    }

    #[test]
    fn test_task_handle_null() {
        assert!(TaskHandle::null().is_null());
        assert!(TaskHandle::default().is_null());
        assert!(!TaskHandle::from_id(0x1000).is_null());
        assert_eq!(TaskHandle::from_id(0x1000).id(), 0x1000);
    }

    #[test]
    fn test_create_rejects_nul_in_name() {
        let driver = Arc::new(MockDriver::new());
        let err = Task::create(driver, "bad\0name").unwrap_err();
        assert!(matches!(err, DaqmxError::InvalidConfig { .. }));
    }

    #[test]
    fn test_clear_is_idempotent() {
        let driver = Arc::new(MockDriver::new());
        let mut task = Task::create(driver.clone(), "ai").unwrap();
        let handle = task.handle();

        task.start().unwrap();
        task.clear().unwrap();
        assert!(task.is_cleared());
        task.clear().unwrap();

        let clears = driver
            .calls()
            .into_iter()
            .filter(|c| matches!(c, MockCall::ClearTask { task } if *task == handle))
            .count();
        assert_eq!(clears, 1);
        assert!(matches!(task.start(), Err(DaqmxError::TaskCleared { .. })));
    }

    #[test]
    fn test_drop_stops_then_clears() {
        let driver = Arc::new(MockDriver::new());
        let handle = {
            let task = Task::create(driver.clone(), "ao").unwrap();
            task.start().unwrap();
            task.handle()
        };

        let calls = driver.calls_for(handle);
        let stop = calls
            .iter()
            .position(|c| matches!(c, MockCall::StopTask { .. }))
            .unwrap();
        let clear = calls
            .iter()
            .position(|c| matches!(c, MockCall::ClearTask { .. }))
            .unwrap();
        assert!(stop < clear);
    }

    #[test]
    fn test_wait_and_is_done() {
        let driver = Arc::new(MockDriver::new());
        let task = Task::create(driver.clone(), "ci").unwrap();
        task.start().unwrap();
        assert!(!task.is_done().unwrap());

        task.control(TaskAction::Stop).unwrap();
        assert!(task.is_done().unwrap());
        task.wait_until_done(Some(Duration::from_millis(10))).unwrap();
    }
}
