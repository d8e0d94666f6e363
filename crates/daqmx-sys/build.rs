//! Build script for daqmx-sys FFI bindings.
//!
//! This script generates Rust FFI bindings from the NI-DAQmx C header
//! using bindgen. It supports two modes:
//!
//! 1. With `daqmx-sdk` feature: Generates bindings from `NIDAQmx.h` and links the driver
//! 2. Without feature: Writes stub bindings so the workspace builds without the driver

use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=wrapper.h");
    println!("cargo:rerun-if-env-changed=DAQMX_INCLUDE_DIR");
    println!("cargo:rerun-if-env-changed=DAQMX_LIB_DIR");

    #[cfg(feature = "daqmx-sdk")]
    generate_bindings();

    #[cfg(not(feature = "daqmx-sdk"))]
    generate_dummy_bindings();

    #[cfg(feature = "daqmx-sdk")]
    {
        if let Ok(dir) = env::var("DAQMX_LIB_DIR") {
            println!("cargo:rustc-link-search=native={}", dir);
        } else {
            // Default install locations of the NI-DAQmx C API
            let lib_paths = [
                "C:\\Program Files (x86)\\National Instruments\\Shared\\ExternalCompilerSupport\\C\\lib64\\msvc",
                "/usr/lib/x86_64-linux-gnu",
                "/usr/local/lib",
                "/usr/lib",
            ];
            for path in lib_paths {
                if std::path::Path::new(path).exists() {
                    println!("cargo:rustc-link-search=native={}", path);
                    break;
                }
            }
        }

        if env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("windows") {
            println!("cargo:rustc-link-lib=NIDAQmx");
        } else {
            println!("cargo:rustc-link-lib=nidaqmx");
        }
    }
}

#[cfg(feature = "daqmx-sdk")]
fn generate_bindings() {
    let include_dir = env::var("DAQMX_INCLUDE_DIR").unwrap_or_else(|_| {
        for path in [
            "C:\\Program Files (x86)\\National Instruments\\Shared\\ExternalCompilerSupport\\C\\include",
            "/usr/include",
            "/usr/local/include",
        ] {
            if std::path::Path::new(path).join("NIDAQmx.h").exists() {
                return path.to_string();
            }
        }
        "/usr/include".to_string()
    });

    println!("cargo:rerun-if-changed={}/NIDAQmx.h", include_dir);

    let bindings = bindgen::Builder::default()
        .header("wrapper.h")
        .clang_arg(format!("-I{}", include_dir))
        .allowlist_function("DAQmxCreateTask")
        .allowlist_function("DAQmxStartTask")
        .allowlist_function("DAQmxStopTask")
        .allowlist_function("DAQmxClearTask")
        .allowlist_function("DAQmxTaskControl")
        .allowlist_function("DAQmxWaitUntilTaskDone")
        .allowlist_function("DAQmxIsTaskDone")
        .allowlist_function("DAQmxRegisterDoneEvent")
        .allowlist_function("DAQmxRegisterEveryNSamplesEvent")
        .allowlist_function("DAQmxGetErrorString")
        .allowlist_type("TaskHandle")
        .allowlist_type("DAQmx.*CallbackPtr")
        .allowlist_type("int32")
        .allowlist_type("uInt32")
        .allowlist_type("bool32")
        .allowlist_type("float64")
        .allowlist_var("DAQmx_Val_Acquired_Into_Buffer")
        .allowlist_var("DAQmx_Val_Transferred_From_Buffer")
        .allowlist_var("DAQmx_Val_SynchronousEventCallbacks")
        .allowlist_var("DAQmx_Val_Task_.*")
        .allowlist_var("DAQmx_Val_WaitInfinitely")
        .generate_comments(true)
        .parse_callbacks(Box::new(bindgen::CargoCallbacks::new()))
        .generate()
        .expect("Unable to generate NI-DAQmx bindings");

    let out_path = PathBuf::from(env::var("OUT_DIR").unwrap());
    bindings
        .write_to_file(out_path.join("bindings.rs"))
        .expect("Couldn't write bindings!");
}

/// Generate stub bindings when the SDK is not available.
/// This allows the crate to compile on systems without NI-DAQmx installed.
#[cfg(not(feature = "daqmx-sdk"))]
fn generate_dummy_bindings() {
    let out_path = PathBuf::from(env::var("OUT_DIR").unwrap());
    let dummy = r#"
// Dummy bindings - daqmx-sdk feature not enabled
//
// These mirror the shape bindgen produces for NIDAQmx.h so that dependent
// crates compile unchanged. Enable the `daqmx-sdk` feature to generate real
// bindings and link against the driver.

use std::os::raw::{c_char, c_int, c_uint, c_void};

pub type int32 = c_int;
pub type uInt32 = c_uint;
pub type bool32 = uInt32;
pub type float64 = f64;

/// Opaque handle to a DAQmx task
pub type TaskHandle = *mut c_void;

pub type DAQmxDoneEventCallbackPtr = ::std::option::Option<
    unsafe extern "C" fn(taskHandle: TaskHandle, status: int32, callbackData: *mut c_void) -> int32,
>;

pub type DAQmxEveryNSamplesEventCallbackPtr = ::std::option::Option<
    unsafe extern "C" fn(
        taskHandle: TaskHandle,
        everyNsamplesEventType: int32,
        nSamples: uInt32,
        callbackData: *mut c_void,
    ) -> int32,
>;

// Every N samples event types
pub const DAQmx_Val_Acquired_Into_Buffer: u32 = 1;
pub const DAQmx_Val_Transferred_From_Buffer: u32 = 2;

// Event registration options
pub const DAQmx_Val_SynchronousEventCallbacks: u32 = 1;

// Task control actions
pub const DAQmx_Val_Task_Start: u32 = 0;
pub const DAQmx_Val_Task_Stop: u32 = 1;
pub const DAQmx_Val_Task_Verify: u32 = 2;
pub const DAQmx_Val_Task_Commit: u32 = 3;
pub const DAQmx_Val_Task_Reserve: u32 = 4;
pub const DAQmx_Val_Task_Unreserve: u32 = 5;
pub const DAQmx_Val_Task_Abort: u32 = 6;

pub const DAQmx_Val_WaitInfinitely: f64 = -1.0;

// Panic stubs - these let the workspace build and test without the driver
// while still catching accidental use at runtime. They are plain Rust
// functions, so the panic unwinds to the caller.

const DAQMX_SDK_PANIC_MSG: &str = "NI-DAQmx function called but daqmx-sdk feature is not enabled. \
    Enable the daqmx-sdk feature (or hardware in daq-driver-daqmx) to use the real driver.";

pub unsafe fn DAQmxCreateTask(_taskName: *const c_char, _taskHandle: *mut TaskHandle) -> int32 {
    panic!("{}", DAQMX_SDK_PANIC_MSG);
}

pub unsafe fn DAQmxStartTask(_taskHandle: TaskHandle) -> int32 {
    panic!("{}", DAQMX_SDK_PANIC_MSG);
}

pub unsafe fn DAQmxStopTask(_taskHandle: TaskHandle) -> int32 {
    panic!("{}", DAQMX_SDK_PANIC_MSG);
}

pub unsafe fn DAQmxClearTask(_taskHandle: TaskHandle) -> int32 {
    panic!("{}", DAQMX_SDK_PANIC_MSG);
}

pub unsafe fn DAQmxTaskControl(_taskHandle: TaskHandle, _action: int32) -> int32 {
    panic!("{}", DAQMX_SDK_PANIC_MSG);
}

pub unsafe fn DAQmxWaitUntilTaskDone(_taskHandle: TaskHandle, _timeToWait: float64) -> int32 {
    panic!("{}", DAQMX_SDK_PANIC_MSG);
}

pub unsafe fn DAQmxIsTaskDone(_taskHandle: TaskHandle, _isTaskDone: *mut bool32) -> int32 {
    panic!("{}", DAQMX_SDK_PANIC_MSG);
}

pub unsafe fn DAQmxRegisterDoneEvent(
    _task: TaskHandle,
    _options: uInt32,
    _callbackFunction: DAQmxDoneEventCallbackPtr,
    _callbackData: *mut c_void,
) -> int32 {
    panic!("{}", DAQMX_SDK_PANIC_MSG);
}

pub unsafe fn DAQmxRegisterEveryNSamplesEvent(
    _task: TaskHandle,
    _everyNsamplesEventType: int32,
    _nSamples: uInt32,
    _options: uInt32,
    _callbackFunction: DAQmxEveryNSamplesEventCallbackPtr,
    _callbackData: *mut c_void,
) -> int32 {
    panic!("{}", DAQMX_SDK_PANIC_MSG);
}

pub unsafe fn DAQmxGetErrorString(
    _errorCode: int32,
    _errorString: *mut c_char,
    _bufferSize: uInt32,
) -> int32 {
    panic!("{}", DAQMX_SDK_PANIC_MSG);
}

"#;

    std::fs::write(out_path.join("bindings.rs"), dummy).expect("Couldn't write dummy bindings!");
}
