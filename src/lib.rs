//! # dscam - host-side control for DS-series scientific cameras
//!
//! Drives cameras through the vendor's DsCam driver library, loaded at
//! runtime. Provides:
//! - Typed encoding of the driver's tagged feature values
//! - A feature cache validated against device-reported descriptors
//! - Software-triggered single-frame capture with channel reordering
//! - C FFI for integration with C/C++ consumers
//!
//! ## Quick Start
//! ```no_run
//! use dscam::FeatureId;
//!
//! let mut camera = dscam::open(0, true).unwrap();
//! camera.set(FeatureId::EXPOSURE_TIME, 20_000u32).unwrap();
//!
//! let frame = camera.get_image().unwrap();
//! println!("{}x{}x{}", frame.width(), frame.height(), frame.channels());
//! ```

pub mod error;
pub mod types;
pub mod sys;
pub mod variant;
pub mod descriptor;
pub mod driver;
pub mod library;
pub mod registry;
pub mod capture;
pub mod config;
pub mod session;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod ffi;

pub use capture::{
    CancelToken, CaptureController, CaptureState, Frame, FrameMetadata, Geometry, Image,
    ImageBuffer, ImageWaitPolicy, PollPolicy,
};
pub use config::SessionConfig;
pub use descriptor::{DescriptorBounds, FeatureDescriptor};
pub use driver::{CameraHandle, Command, Driver, DriverContext};
pub use error::{DsCamError, ErrorCode};
pub use library::DsCamLibrary;
pub use registry::FeatureRegistry;
pub use session::{open, PropertyUpdate, Session};
pub use types::*;
pub use variant::{FeatureValue, FeatureVector, Value, Variant};

/// Result type alias for dscam operations.
pub type Result<T> = std::result::Result<T, DsCamError>;
