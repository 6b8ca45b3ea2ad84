//! Session settings.

use std::time::Duration;

use crate::capture::{Geometry, ImageWaitPolicy, PollPolicy, BUFFER_COUNT_RANGE};
use crate::types::{Format, FormatColor, FormatMode, TriggerMode};
use crate::{DsCamError, Result};

/// Format written after open when `apply_defaults` is set.
pub const DEFAULT_FORMAT: Format = Format::new(FormatColor::RGB24, FormatMode::H2880X2048);

/// Geometry assumed when the camera does not describe the current format.
pub const FALLBACK_GEOMETRY: Geometry = Geometry::new(2880, 2048, 3);

/// How a [`Session`](crate::Session) sets up and drives its camera.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub apply_defaults: bool,
    pub default_format: Format,
    pub trigger_mode: TriggerMode,
    /// Frame-transfer pipeline depth, 1 to 128.
    pub buffer_count: u32,
    pub poll: PollPolicy,
    pub image_wait: ImageWaitPolicy,
    pub fallback_geometry: Geometry,
    /// Ask the driver for the newest frame rather than the oldest queued.
    pub newest_required: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            apply_defaults: true,
            default_format: DEFAULT_FORMAT,
            trigger_mode: TriggerMode::Software,
            buffer_count: 1,
            poll: PollPolicy::default(),
            image_wait: ImageWaitPolicy::Proceed,
            fallback_geometry: FALLBACK_GEOMETRY,
            newest_required: true,
        }
    }
}

impl SessionConfig {
    /// Defaults overridden by `DSCAM_*` environment variables. Values that
    /// do not parse keep the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let strict = read_env_bool("DSCAM_STRICT_IMAGE_WAIT", false);
        Self {
            apply_defaults: read_env_bool("DSCAM_APPLY_DEFAULTS", defaults.apply_defaults),
            buffer_count: read_env_u32("DSCAM_BUFFER_COUNT", defaults.buffer_count),
            poll: PollPolicy {
                timeout: Duration::from_millis(read_env_u64(
                    "DSCAM_EVENT_TIMEOUT_MS",
                    defaults.poll.timeout.as_millis() as u64,
                )),
                interval: Duration::from_micros(read_env_u64(
                    "DSCAM_POLL_INTERVAL_US",
                    defaults.poll.interval.as_micros() as u64,
                )),
            },
            image_wait: if strict {
                ImageWaitPolicy::Fail
            } else {
                ImageWaitPolicy::Proceed
            },
            ..defaults
        }
    }

    pub fn with_apply_defaults(mut self, apply: bool) -> Self {
        self.apply_defaults = apply;
        self
    }

    pub fn with_default_format(mut self, format: Format) -> Self {
        self.default_format = format;
        self
    }

    pub fn with_trigger_mode(mut self, mode: TriggerMode) -> Self {
        self.trigger_mode = mode;
        self
    }

    pub fn with_buffer_count(mut self, count: u32) -> Self {
        self.buffer_count = count;
        self
    }

    pub fn with_event_timeout(mut self, timeout: Duration) -> Self {
        self.poll.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll.interval = interval;
        self
    }

    pub fn with_image_wait(mut self, policy: ImageWaitPolicy) -> Self {
        self.image_wait = policy;
        self
    }

    pub fn with_fallback_geometry(mut self, geometry: Geometry) -> Self {
        self.fallback_geometry = geometry;
        self
    }

    pub fn with_newest_required(mut self, newest: bool) -> Self {
        self.newest_required = newest;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !BUFFER_COUNT_RANGE.contains(&self.buffer_count) {
            return Err(DsCamError::InvalidArgument(format!(
                "buffer count {} outside {:?}",
                self.buffer_count, BUFFER_COUNT_RANGE
            )));
        }
        if self.fallback_geometry.frame_bytes() == 0 {
            return Err(DsCamError::InvalidArgument(
                "fallback geometry is empty".to_string(),
            ));
        }
        Ok(())
    }
}

pub(crate) fn read_env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .and_then(|v| {
            let v = v.trim().to_ascii_lowercase();
            match v.as_str() {
                "1" | "true" | "yes" | "on" => Some(true),
                "0" | "false" | "no" | "off" => Some(false),
                _ => None,
            }
        })
        .unwrap_or(default)
}

fn read_env_u32(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

fn read_env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

pub(crate) fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert!(config.apply_defaults);
        assert_eq!(config.default_format, DEFAULT_FORMAT);
        assert_eq!(config.trigger_mode, TriggerMode::Software);
        assert_eq!(config.buffer_count, 1);
        assert_eq!(config.poll.timeout, Duration::from_secs(10));
        assert_eq!(config.image_wait, ImageWaitPolicy::Proceed);
        assert_eq!(config.fallback_geometry.frame_bytes(), 2880 * 2048 * 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_buffer_count() {
        assert!(SessionConfig::default()
            .with_buffer_count(0)
            .validate()
            .is_err());
        assert!(SessionConfig::default()
            .with_buffer_count(129)
            .validate()
            .is_err());
        assert!(SessionConfig::default()
            .with_buffer_count(128)
            .validate()
            .is_ok());
    }

    // Each test uses its own variable names; the process environment is shared.
    #[test]
    fn test_read_env_helpers() {
        std::env::set_var("DSCAM_TEST_BOOL", " Yes ");
        assert!(read_env_bool("DSCAM_TEST_BOOL", false));
        std::env::set_var("DSCAM_TEST_BOOL", "maybe");
        assert!(read_env_bool("DSCAM_TEST_BOOL", true));
        assert!(!read_env_bool("DSCAM_TEST_BOOL", false));

        std::env::set_var("DSCAM_TEST_U64", "250");
        assert_eq!(read_env_u64("DSCAM_TEST_U64", 1), 250);
        std::env::set_var("DSCAM_TEST_U64", "-3");
        assert_eq!(read_env_u64("DSCAM_TEST_U64", 1), 1);

        std::env::set_var("DSCAM_TEST_STRING", "   ");
        assert_eq!(read_env_string("DSCAM_TEST_STRING"), None);
        assert_eq!(read_env_string("DSCAM_TEST_UNSET_STRING"), None);
    }
}
