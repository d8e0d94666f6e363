//! Safe event-callback bridge for NI-DAQmx tasks.
//!
//! NI-DAQmx raises task events (task done, every N samples acquired or
//! transferred) on a thread it owns by calling a C function pointer with an
//! opaque data pointer. This crate connects those native events to ordinary
//! Rust closures without ever handing host pointers across the boundary.
//!
//! # Architecture
//!
//! ## Registration
//! - [`CallbackService`] - One entry point per event kind, returns a
//!   registration or nothing
//! - [`CallbackRegistration`] - RAII owner of one native subscription and the
//!   handles backing it
//! - [`CallbackConfig`] - Registration settings (TOML)
//!
//! ## Native Boundary
//! - [`trampoline`] - `extern "C"` entry points the driver calls
//! - [`HandleTable`] - Token table resolving native events to host callbacks
//! - [`DaqmxDriver`] - Driver seam; [`NativeDriver`] for hardware,
//!   [`MockDriver`] for tests
//!
//! ## Tasks and Status
//! - [`Task`] - RAII task that stops, releases its registrations, then clears
//! - [`Status`] / [`StatusClass`] - Status code classification
//!
//! # Teardown Order
//!
//! A registration must not be released while its task can still fire. Either
//! hand it to [`Task::adopt`], or stop the task before dropping it. Events
//! that race with teardown find an unbound route and are dropped.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use daq_driver_daqmx::{CallbackService, Task};
//!
//! # fn example() -> anyhow::Result<()> {
//! let service = CallbackService::native()?;
//! let mut task = Task::create(service.driver().clone(), "ai-task")?;
//!
//! let reg = service
//!     .try_register_done_event(
//!         task.handle(),
//!         |event| {
//!             println!("Task finished with status {}", event.status);
//!             0
//!         },
//!         Some(Arc::new("ai-task")),
//!     )?;
//! task.adopt(reg);
//!
//! task.start()?;
//! task.wait_until_done(None)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod event;
pub mod handles;
pub mod mock;
pub mod registration;
pub mod service;
pub mod status;
pub mod task;
pub mod trampoline;

pub use config::CallbackConfig;
pub use driver::{DaqmxDriver, NativeDriver};
pub use error::{DaqmxError, RegistrationError, Result};
pub use event::{DoneEvent, EventCallback, EventKind, SamplesEvent, UserData};
pub use handles::{HandleTable, Route, Token};
pub use mock::{MockCall, MockDriver};
pub use registration::{CallbackRegistration, RegistrationRequest};
pub use service::CallbackService;
pub use status::{failed, success, warning, Status, StatusClass};
pub use task::{Task, TaskAction, TaskHandle};
pub use trampoline::CALLBACK_PANICKED;
