//! Callback registration settings.
//!
//! # Example Configuration
//!
//! ```toml
//! synchronous_callbacks = false
//! unregister_on_close = true
//! ```

use serde::Deserialize;

use crate::error::Result;

/// Settings applied by [`crate::CallbackService`] to every registration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CallbackConfig {
    /// Deliver callbacks on the registering thread
    /// (`DAQmx_Val_SynchronousEventCallbacks`).
    #[serde(default)]
    pub synchronous_callbacks: bool,

    /// Unregister the native event (null callback) during teardown.
    #[serde(default = "default_unregister_on_close")]
    pub unregister_on_close: bool,
}

fn default_unregister_on_close() -> bool {
    true
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            synchronous_callbacks: false,
            unregister_on_close: default_unregister_on_close(),
        }
    }
}

impl CallbackConfig {
    /// Parse settings from TOML.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Native `options` bit field for the registration calls.
    pub fn options(&self) -> u32 {
        if self.synchronous_callbacks {
            daqmx_sys::DAQmx_Val_SynchronousEventCallbacks as u32
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CallbackConfig::default();
        assert!(!config.synchronous_callbacks);
        assert!(config.unregister_on_close);
        assert_eq!(config.options(), 0);

        assert_eq!(CallbackConfig::from_toml_str("").unwrap(), config);
    }

    #[test]
    fn test_parse_toml() {
        let config = CallbackConfig::from_toml_str(
            r#"
            synchronous_callbacks = true
            unregister_on_close = false
            "#,
        )
        .unwrap();
        assert!(config.synchronous_callbacks);
        assert!(!config.unregister_on_close);
        assert_eq!(config.options(), 1);
    }

    #[test]
    fn test_parse_error() {
        assert!(CallbackConfig::from_toml_str("synchronous_callbacks = \"yes\"").is_err());
    }
}
