use std::fmt;

use crate::types::{EventType, FeatureId, VariantType};

/// Status code returned by every DsCam driver entry point.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(pub i32);

impl ErrorCode {
    pub const OK: Self = Self(0);
    pub const UNEXPECTED: Self = Self(-1);
    pub const NOT_IMPL: Self = Self(-2);
    pub const OUT_OF_MEMORY: Self = Self(-3);
    pub const INVALID_ARG: Self = Self(-4);
    pub const NO_INTERFACE: Self = Self(-5);
    pub const POINTER: Self = Self(-6);
    pub const HANDLE: Self = Self(-7);
    pub const ABORT: Self = Self(-8);
    pub const FAIL: Self = Self(-9);
    /// Also returned by event polling when no event is pending.
    pub const ACCESS_DENIED: Self = Self(-10);

    pub fn is_ok(self) -> bool {
        self == Self::OK
    }

    pub fn name(self) -> &'static str {
        match self.0 {
            0 => "OK",
            -1 => "ERR_UNEXPECTED",
            -2 => "ERR_NOTIMPL",
            -3 => "ERR_OUTOFMEMORY",
            -4 => "ERR_INVALIDARG",
            -5 => "ERR_NOINTERFACE",
            -6 => "ERR_POINTER",
            -7 => "ERR_HANDLE",
            -8 => "ERR_ABORT",
            -9 => "ERR_FAIL",
            -10 => "ERR_ACCESSDENIED",
            _ => "ERR_UNKNOWN",
        }
    }

    /// Map a status to `Ok(())` or a [`DsCamError::Driver`] naming the call.
    pub fn check(self, call: &'static str) -> crate::Result<()> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(DsCamError::Driver {
                call,
                code: self,
                message: String::new(),
            })
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.0)
    }
}

/// Errors that can occur when controlling a DsCam camera.
#[derive(Debug, thiserror::Error)]
pub enum DsCamError {
    #[error("Failed to load DsCam library: {0}")]
    Library(#[from] libloading::Error),

    #[error("Camera index {index} unavailable ({count} devices connected)")]
    Connection { index: u32, count: u32 },

    #[error("Feature {0} is not available on this camera")]
    FeatureNotAvailable(FeatureId),

    #[error("Feature {feature} expects {expected:?}, got {found}")]
    TypeMismatch {
        feature: FeatureId,
        expected: VariantType,
        found: &'static str,
    },

    #[error("Variant type is unknown")]
    UnknownVariant,

    #[error("Unsupported variant type tag {0}")]
    UnsupportedVariant(u32),

    #[error("Value for feature {0} is outside the device-reported bounds")]
    OutOfRange(FeatureId),

    #[error("Feature array holds {count} entries, capacity is {capacity}")]
    CapacityExceeded { count: usize, capacity: usize },

    #[error("Image buffer holds {used} bytes, frame needs {required}")]
    BufferTooSmall { used: usize, required: usize },

    #[error("Image fetch failed: {0}")]
    ImageFetchFailed(ErrorCode),

    #[error("{call} failed: {code}{}", detail(.message))]
    Driver {
        call: &'static str,
        code: ErrorCode,
        message: String,
    },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Timeout waiting for {0:?} event")]
    Timeout(EventType),

    #[error("Event wait cancelled")]
    Cancelled,
}

fn detail(message: &str) -> String {
    if message.is_empty() {
        String::new()
    } else {
        format!(": {}", message)
    }
}

/// Thread-safe last-error storage for the C FFI layer.
pub(crate) struct LastError {
    message: std::sync::Mutex<String>,
}

impl LastError {
    pub const fn new() -> Self {
        Self {
            message: std::sync::Mutex::new(String::new()),
        }
    }

    pub fn set(&self, err: &DsCamError) {
        if let Ok(mut msg) = self.message.lock() {
            *msg = fmt::format(format_args!("{}\0", err));
        }
    }

    pub fn set_message(&self, text: &str) {
        if let Ok(mut msg) = self.message.lock() {
            *msg = fmt::format(format_args!("{}\0", text));
        }
    }

    pub fn clear(&self) {
        if let Ok(mut msg) = self.message.lock() {
            msg.clear();
        }
    }

    pub fn as_ptr(&self) -> *const std::ffi::c_char {
        match self.message.lock() {
            Ok(msg) if !msg.is_empty() => msg.as_ptr() as *const std::ffi::c_char,
            _ => std::ptr::null(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_check() {
        assert!(ErrorCode::OK.check("CAM_Open").is_ok());
        let err = ErrorCode::HANDLE.check("CAM_Close").unwrap_err();
        match err {
            DsCamError::Driver { call, code, .. } => {
                assert_eq!(call, "CAM_Close");
                assert_eq!(code, ErrorCode::HANDLE);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::ACCESS_DENIED.to_string(), "ERR_ACCESSDENIED (-10)");
        assert_eq!(ErrorCode(-42).to_string(), "ERR_UNKNOWN (-42)");
    }

    #[test]
    fn test_driver_error_message() {
        let err = DsCamError::Driver {
            call: "CAM_Open",
            code: ErrorCode::FAIL,
            message: "camera busy".into(),
        };
        assert_eq!(err.to_string(), "CAM_Open failed: ERR_FAIL (-9): camera busy");
    }

    #[test]
    fn test_last_error_roundtrip() {
        let last = LastError::new();
        assert!(last.as_ptr().is_null());
        last.set(&DsCamError::Cancelled);
        let text = unsafe { std::ffi::CStr::from_ptr(last.as_ptr()) };
        assert_eq!(text.to_str().unwrap(), "Event wait cancelled");
        last.clear();
        assert!(last.as_ptr().is_null());
    }
}
