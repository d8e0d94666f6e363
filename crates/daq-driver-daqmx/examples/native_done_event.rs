//! Done-event smoke test against a real NI-DAQmx installation.
//!
//! The task has no channels, so the driver rejects the start; the example
//! still exercises registration, teardown order and error descriptions.
//!
//! ```bash
//! cargo run -p daq-driver-daqmx --features hardware --example native_done_event
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use daq_driver_daqmx::{CallbackService, Task};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let service = CallbackService::native()?;
    let mut task = Task::create(service.driver().clone(), "native-done-demo")?;

    match service.try_register_done_event(
        task.handle(),
        |event| {
            println!("Task done: {} ({:?})", event.status, event.status.class());
            0
        },
        Some(Arc::new(task.name().to_string())),
    ) {
        Ok(reg) => task.adopt(reg),
        Err(e) => println!("Registration failed: {}", e),
    }

    if let Err(e) = task.start() {
        println!("Start failed as expected for an empty task: {}", e);
    } else {
        task.wait_until_done(Some(Duration::from_secs(5)))?;
    }

    task.clear()?;
    Ok(())
}
