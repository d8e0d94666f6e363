//! Event callback demo against the mock driver.
//!
//! Registers a done event and a read-samples event, fires them from a
//! separate thread the way NI-DAQmx would, then clears the task.
//!
//! ```bash
//! RUST_LOG=daq_driver_daqmx=debug cargo run -p daq-driver-daqmx --example done_event
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::Result;
use daq_driver_daqmx::{CallbackConfig, CallbackService, EventKind, MockDriver, Task};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("daq_driver_daqmx=info".parse()?),
        )
        .init();

    let config = CallbackConfig::from_toml_str(
        r#"
        synchronous_callbacks = false
        unregister_on_close = true
        "#,
    )?;

    let driver = Arc::new(MockDriver::new());
    let service = CallbackService::new(driver.clone()).with_config(config);
    let mut task = Task::create(driver.clone(), "demo-ai")?;

    let samples = Arc::new(AtomicU32::new(0));
    let samples_cb = samples.clone();

    let read = service.try_register_n_samples_read_event(
        task.handle(),
        move |event| {
            let total = samples_cb.fetch_add(event.n_samples, Ordering::SeqCst) + event.n_samples;
            println!("  read event: {} samples (total {})", event.n_samples, total);
            0
        },
        1000,
        None,
    )?;
    let done = service.try_register_done_event(
        task.handle(),
        |event| {
            let label = event.user_data::<String>().map(String::as_str).unwrap_or("?");
            println!("  done event for {}: status {}", label, event.status);
            0
        },
        Some(Arc::new(String::from("Dev1/ai0"))),
    )?;
    task.adopt(read);
    task.adopt(done);

    task.start()?;
    println!("Task '{}' started with {} registrations", task.name(), task.registration_count());

    let handle = task.handle();
    let firing = driver.clone();
    thread::spawn(move || {
        for _ in 0..3 {
            firing.fire_every_n_samples(handle, EventKind::EveryNSamplesAcquired);
        }
        firing.fire_done(handle, 0);
    })
    .join()
    .map_err(|_| anyhow::anyhow!("driver thread panicked"))?;

    task.clear()?;
    println!(
        "Cleared task; {} samples seen, {} native subscriptions left",
        samples.load(Ordering::SeqCst),
        driver.active_registrations()
    );
    Ok(())
}
