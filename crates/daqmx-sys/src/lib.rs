//! Low-level FFI bindings for the National Instruments NI-DAQmx C library.
//!
//! This crate provides raw, unsafe bindings to the subset of `NIDAQmx.h`
//! needed for task lifecycle control and asynchronous event registration.
//! Channel creation and typed read/write entry points are not bound here.
//!
//! # Event callbacks
//!
//! DAQmx invokes registered callbacks on a thread it owns. Two callback
//! shapes exist:
//!
//! - [`DAQmxDoneEventCallbackPtr`]: `(task, status, data) -> int32`
//! - [`DAQmxEveryNSamplesEventCallbackPtr`]: `(task, event_type, n_samples, data) -> int32`
//!
//! Registering with a `None` callback removes an existing registration.
//!
//! # Safety
//!
//! All functions in this crate are `unsafe` as they are direct FFI bindings.
//! For a safe wrapper, use the `daq-driver-daqmx` crate instead.
//!
//! # Features
//!
//! - `daqmx-sdk`: Generate bindings from the installed `NIDAQmx.h` and link
//!   against the driver. Without this feature, stub bindings with the same
//!   shape are used and every function panics when called.

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(dead_code)]
#![allow(missing_docs)]
#![allow(clippy::all)]

// Include the generated bindings
include!(concat!(env!("OUT_DIR"), "/bindings.rs"));

/// Whether this build links against the real NI-DAQmx driver.
pub const SDK_AVAILABLE: bool = cfg!(feature = "daqmx-sdk");

/// Buffer size used when reading driver error descriptions.
pub const ERROR_BUFFER_SIZE: usize = 2048;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_n_samples_constants() {
        assert_eq!(DAQmx_Val_Acquired_Into_Buffer, 1);
        assert_eq!(DAQmx_Val_Transferred_From_Buffer, 2);
        assert_ne!(
            DAQmx_Val_Acquired_Into_Buffer,
            DAQmx_Val_Transferred_From_Buffer
        );
    }

    #[test]
    fn test_task_action_constants() {
        assert_eq!(DAQmx_Val_Task_Start, 0);
        assert_eq!(DAQmx_Val_Task_Stop, 1);
        assert_eq!(DAQmx_Val_Task_Abort, 6);
    }

    #[test]
    fn test_callback_pointer_is_nullable() {
        let done: DAQmxDoneEventCallbackPtr = None;
        let every_n: DAQmxEveryNSamplesEventCallbackPtr = None;
        assert!(done.is_none());
        assert!(every_n.is_none());
        assert_eq!(
            std::mem::size_of::<DAQmxDoneEventCallbackPtr>(),
            std::mem::size_of::<usize>()
        );
    }
}
