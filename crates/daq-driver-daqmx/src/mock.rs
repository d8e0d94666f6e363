//! In-process stand-in for the NI-DAQmx driver.
//!
//! [`MockDriver`] keeps a small task state machine, records every call and
//! stores the trampolines it is handed so tests can fire native events from
//! any thread. Task handles are unique across all mock instances in the
//! process, so concurrently running tests never share a route in the global
//! handle table.

use std::collections::HashMap;
use std::ffi::{c_void, CStr};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::driver::{DaqmxDriver, NativeDoneCallback, NativeEveryNSamplesCallback};
use crate::event::EventKind;
use crate::task::{TaskAction, TaskHandle};

static NEXT_TASK_ID: AtomicUsize = AtomicUsize::new(0x1000);

/// Status returned for calls on a handle the mock never created.
pub const MOCK_INVALID_TASK: i32 = -200088;

/// A call received by [`MockDriver`].
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    CreateTask {
        task: TaskHandle,
        name: String,
    },
    StartTask {
        task: TaskHandle,
    },
    StopTask {
        task: TaskHandle,
    },
    ClearTask {
        task: TaskHandle,
    },
    TaskControl {
        task: TaskHandle,
        action: i32,
    },
    WaitUntilDone {
        task: TaskHandle,
        timeout: f64,
    },
    IsTaskDone {
        task: TaskHandle,
    },
    /// `callback` is false for the unregister form.
    RegisterDone {
        task: TaskHandle,
        options: u32,
        callback: bool,
        data: usize,
    },
    /// `callback` is false for the unregister form.
    RegisterEveryN {
        task: TaskHandle,
        event_type: i32,
        n_samples: u32,
        options: u32,
        callback: bool,
        data: usize,
    },
}

impl MockCall {
    /// Task the call was made on.
    pub fn task(&self) -> TaskHandle {
        match self {
            Self::CreateTask { task, .. }
            | Self::StartTask { task }
            | Self::StopTask { task }
            | Self::ClearTask { task }
            | Self::TaskControl { task, .. }
            | Self::WaitUntilDone { task, .. }
            | Self::IsTaskDone { task }
            | Self::RegisterDone { task, .. }
            | Self::RegisterEveryN { task, .. } => *task,
        }
    }

    /// Check if this is a registration call (either form).
    pub fn is_registration(&self) -> bool {
        matches!(self, Self::RegisterDone { .. } | Self::RegisterEveryN { .. })
    }
}

#[derive(Clone, Copy)]
struct DoneSubscription {
    callback: unsafe extern "C" fn(daqmx_sys::TaskHandle, i32, *mut c_void) -> i32,
    data: usize,
}

#[derive(Clone, Copy)]
struct SamplesSubscription {
    callback: unsafe extern "C" fn(daqmx_sys::TaskHandle, i32, u32, *mut c_void) -> i32,
    n_samples: u32,
    data: usize,
}

#[derive(Default)]
struct MockTask {
    name: String,
    running: bool,
    done: Option<DoneSubscription>,
    every_n: HashMap<i32, SamplesSubscription>,
}

struct MockState {
    tasks: HashMap<TaskHandle, MockTask>,
    calls: Vec<MockCall>,
    error_strings: HashMap<i32, String>,
    registration_status: i32,
    unregister_status: i32,
    panic_on_register: bool,
}

/// Mock DAQmx driver for tests and demos.
pub struct MockDriver {
    state: Mutex<MockState>,
}

impl MockDriver {
    /// Create a mock driver whose calls all succeed.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                tasks: HashMap::new(),
                calls: Vec::new(),
                error_strings: HashMap::new(),
                registration_status: 0,
                unregister_status: 0,
                panic_on_register: false,
            }),
        }
    }

    /// Message returned by `error_string` for `code`.
    pub fn set_error_string(&self, code: i32, message: &str) {
        self.state
            .lock()
            .error_strings
            .insert(code, message.to_string());
    }

    /// Status returned by registration calls that carry a callback.
    pub fn set_registration_status(&self, code: i32) {
        self.state.lock().registration_status = code;
    }

    /// Status returned by registration calls with a null callback.
    pub fn set_unregister_status(&self, code: i32) {
        self.state.lock().unregister_status = code;
    }

    /// Panic inside registration calls that carry a callback.
    pub fn set_panic_on_register(&self, enabled: bool) {
        self.state.lock().panic_on_register = enabled;
    }

    /// Every call received so far.
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    /// Calls received for one task.
    pub fn calls_for(&self, task: TaskHandle) -> Vec<MockCall> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.task() == task)
            .cloned()
            .collect()
    }

    /// Registration calls (both forms) received for one task.
    pub fn registrations_for(&self, task: TaskHandle) -> Vec<MockCall> {
        self.calls_for(task)
            .into_iter()
            .filter(MockCall::is_registration)
            .collect()
    }

    /// Number of native subscriptions currently installed.
    pub fn active_registrations(&self) -> usize {
        self.state
            .lock()
            .tasks
            .values()
            .map(|t| usize::from(t.done.is_some()) + t.every_n.len())
            .sum()
    }

    /// Check if `kind` is subscribed on `task`.
    pub fn is_subscribed(&self, task: TaskHandle, kind: EventKind) -> bool {
        let state = self.state.lock();
        let Some(t) = state.tasks.get(&task) else {
            return false;
        };
        match kind.every_n_samples_type() {
            None => t.done.is_some(),
            Some(event_type) => t.every_n.contains_key(&event_type),
        }
    }

    /// Data pointer the driver holds for `kind` on `task`.
    pub fn subscribed_data(&self, task: TaskHandle, kind: EventKind) -> Option<*mut c_void> {
        let state = self.state.lock();
        let t = state.tasks.get(&task)?;
        let data = match kind.every_n_samples_type() {
            None => t.done?.data,
            Some(event_type) => t.every_n.get(&event_type)?.data,
        };
        Some(data as *mut c_void)
    }

    /// Name given to `task` at creation.
    pub fn task_name(&self, task: TaskHandle) -> Option<String> {
        self.state.lock().tasks.get(&task).map(|t| t.name.clone())
    }

    /// Raise the done event on `task` the way the driver would.
    ///
    /// Returns the trampoline's return value, or `None` if nothing is
    /// subscribed. The trampoline runs on the calling thread without any
    /// mock lock held.
    pub fn fire_done(&self, task: TaskHandle, status: i32) -> Option<i32> {
        let subscription = {
            let mut state = self.state.lock();
            let t = state.tasks.get_mut(&task)?;
            t.running = false;
            t.done?
        };
        // SAFETY: the pointer was handed to us as a trampoline with this
        // signature and the data pointer is passed back verbatim.
        #[allow(unsafe_code)]
        let code = unsafe {
            (subscription.callback)(task.as_raw(), status, subscription.data as *mut c_void)
        };
        Some(code)
    }

    /// Raise an every-N-samples event on `task` with the registered count.
    pub fn fire_every_n_samples(&self, task: TaskHandle, kind: EventKind) -> Option<i32> {
        let event_type = kind.every_n_samples_type()?;
        let subscription = {
            let state = self.state.lock();
            *state.tasks.get(&task)?.every_n.get(&event_type)?
        };
        // SAFETY: as for fire_done
        #[allow(unsafe_code)]
        let code = unsafe {
            (subscription.callback)(
                task.as_raw(),
                event_type,
                subscription.n_samples,
                subscription.data as *mut c_void,
            )
        };
        Some(code)
    }

    fn with_task<R>(
        &self,
        task: TaskHandle,
        call: MockCall,
        f: impl FnOnce(&mut MockState) -> R,
    ) -> Option<R> {
        let mut state = self.state.lock();
        state.calls.push(call);
        if !state.tasks.contains_key(&task) {
            return None;
        }
        Some(f(&mut state))
    }

    fn set_running(&self, task: TaskHandle, call: MockCall, running: bool) -> i32 {
        self.with_task(task, call, |state| {
            if let Some(t) = state.tasks.get_mut(&task) {
                t.running = running;
            }
            0
        })
        .unwrap_or(MOCK_INVALID_TASK)
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockDriver")
            .field("tasks", &state.tasks.len())
            .field("calls", &state.calls.len())
            .finish()
    }
}

// Panics are opt-in through `set_panic_on_register`.
#[allow(clippy::panic)]
impl DaqmxDriver for MockDriver {
    fn create_task(&self, name: &CStr, task: &mut TaskHandle) -> i32 {
        let handle = TaskHandle::from_id(NEXT_TASK_ID.fetch_add(0x10, Ordering::Relaxed));
        let name = name.to_string_lossy().into_owned();
        let mut state = self.state.lock();
        state.calls.push(MockCall::CreateTask {
            task: handle,
            name: name.clone(),
        });
        state.tasks.insert(
            handle,
            MockTask {
                name,
                ..MockTask::default()
            },
        );
        debug!(task = ?handle, "Mock task created");
        *task = handle;
        0
    }

    fn start_task(&self, task: TaskHandle) -> i32 {
        self.set_running(task, MockCall::StartTask { task }, true)
    }

    fn stop_task(&self, task: TaskHandle) -> i32 {
        self.set_running(task, MockCall::StopTask { task }, false)
    }

    fn clear_task(&self, task: TaskHandle) -> i32 {
        self.with_task(task, MockCall::ClearTask { task }, |state| {
            state.tasks.remove(&task);
            0
        })
        .unwrap_or(MOCK_INVALID_TASK)
    }

    fn task_control(&self, task: TaskHandle, action: i32) -> i32 {
        let call = MockCall::TaskControl { task, action };
        match TaskAction::from_raw(action) {
            Some(TaskAction::Start) => self.set_running(task, call, true),
            Some(TaskAction::Stop) | Some(TaskAction::Abort) => self.set_running(task, call, false),
            Some(_) => self.with_task(task, call, |_| 0).unwrap_or(MOCK_INVALID_TASK),
            None => {
                self.state.lock().calls.push(call);
                -200557
            }
        }
    }

    fn wait_until_task_done(&self, task: TaskHandle, timeout_s: f64) -> i32 {
        self.with_task(
            task,
            MockCall::WaitUntilDone {
                task,
                timeout: timeout_s,
            },
            |_| 0,
        )
        .unwrap_or(MOCK_INVALID_TASK)
    }

    fn is_task_done(&self, task: TaskHandle, done: &mut bool) -> i32 {
        match self.with_task(task, MockCall::IsTaskDone { task }, |state| {
            state.tasks.get(&task).map_or(true, |t| !t.running)
        }) {
            Some(value) => {
                *done = value;
                0
            }
            None => MOCK_INVALID_TASK,
        }
    }

    fn register_done_event(
        &self,
        task: TaskHandle,
        options: u32,
        callback: NativeDoneCallback,
        data: *mut c_void,
    ) -> i32 {
        let mut state = self.state.lock();
        state.calls.push(MockCall::RegisterDone {
            task,
            options,
            callback: callback.is_some(),
            data: data as usize,
        });

        if callback.is_some() && state.panic_on_register {
            drop(state);
            panic!("mock driver panicked in DAQmxRegisterDoneEvent");
        }
        let status = if callback.is_some() {
            state.registration_status
        } else {
            state.unregister_status
        };
        if status < 0 {
            return status;
        }

        let Some(t) = state.tasks.get_mut(&task) else {
            return MOCK_INVALID_TASK;
        };
        t.done = callback.map(|callback| DoneSubscription {
            callback,
            data: data as usize,
        });
        status
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
        let mut state = self.state.lock();
        state.calls.push(MockCall::RegisterEveryN {
            task,
            event_type,
            n_samples,
            options,
            callback: callback.is_some(),
            data: data as usize,
        });

        if callback.is_some() && state.panic_on_register {
            drop(state);
            panic!("mock driver panicked in DAQmxRegisterEveryNSamplesEvent");
        }
        let status = if callback.is_some() {
            state.registration_status
        } else {
            state.unregister_status
        };
        if status < 0 {
            return status;
        }

        let Some(t) = state.tasks.get_mut(&task) else {
            return MOCK_INVALID_TASK;
        };
        match callback {
            Some(callback) => {
                t.every_n.insert(
                    event_type,
                    SamplesSubscription {
                        callback,
                        n_samples,
                        data: data as usize,
                    },
                );
            }
            None => {
                t.every_n.remove(&event_type);
            }
        }
        status
    }

    fn error_string(&self, code: i32) -> String {
        self.state
            .lock()
            .error_strings
            .get(&code)
            .cloned()
            .unwrap_or_else(|| format!("Mock DAQmx status {}", code))
    }
}
