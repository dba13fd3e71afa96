use thiserror::Error;

#[derive(Error, Debug)]
pub enum CamlinkError {
    #[error("Device open failed: {0}")]
    DeviceOpen(#[source] DeviceError),

    #[error("Frame fetch failed: {0}")]
    Fetch(#[source] DeviceError),

    #[error("Render dispatch failed: {reason}")]
    Dispatch { reason: String },

    /// The render context was torn down before the dispatch landed.
    #[error("Dispatch rejected: render context already stopped")]
    RejectedAfterStop,

    #[error("Configuration invalid: {reason}")]
    ConfigurationInvalid { reason: String },

    #[error("Invalid frame: {reason}")]
    InvalidFrame { reason: String },

    #[error("Invalid state transition: {from} → {to}")]
    InvalidTransition { from: String, to: String },

    #[error("No capture device available")]
    NoDevice,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Failed to open device '{device}': {reason}")]
    OpenFailed { device: String, reason: String },

    #[error("Device '{device}' refused to open")]
    OpenRejected { device: String },

    #[error("Device '{device}' is not open")]
    NotOpen { device: String },

    #[error("Failed to fetch frame: {reason}")]
    FetchFailed { reason: String },

    #[error("Device disconnected")]
    Disconnected,

    #[error("Capture backend error: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_open_error_names_the_device() {
        let err = CamlinkError::DeviceOpen(DeviceError::OpenRejected {
            device: "cam0".into(),
        });
        assert_eq!(
            err.to_string(),
            "Device open failed: Device 'cam0' refused to open"
        );
    }
}
