//! Seam between the camera logic and the vendor driver.

use std::sync::Arc;

use crate::capture::ImageBuffer;
use crate::descriptor::FeatureDescriptor;
use crate::sys;
use crate::types::{DeviceInfo, Event, EventType, FeatureId, FrameSize};
use crate::variant::FeatureVector;
use crate::Result;

/// Driver-issued handle of one opened camera.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CameraHandle(pub u32);

/// Named string commands accepted by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SoftTrigger,
    TriggerCancel,
    OnePushAutoExposure,
    OnePushWhiteBalance,
    /// Start the frame-transfer pipeline with `buffers` driver-side buffers.
    StartFrameTransfer { buffers: u32 },
    StopFrameTransfer,
}

impl Command {
    pub fn name(self) -> &'static str {
        match self {
            Command::SoftTrigger => sys::CAM_CMD_ONEPUSH_SOFTTRIGGER,
            Command::TriggerCancel => sys::CAM_CMD_ONEPUSH_TRIGGERCANCEL,
            Command::OnePushAutoExposure => sys::CAM_CMD_ONEPUSH_AE,
            Command::OnePushWhiteBalance => sys::CAM_CMD_ONEPUSH_WHITEBALANCE,
            Command::StartFrameTransfer { .. } => sys::CAM_CMD_START_FRAMETRANSFER,
            Command::StopFrameTransfer => sys::CAM_CMD_STOP_FRAMETRANSFER,
        }
    }
}

/// Operations consumed from the vendor driver.
///
/// Feature arrays cross the seam in wire layout ([`FeatureVector`]) so that
/// every implementation exercises the same codec path. Descriptors and
/// events are decoded by the implementation.
pub trait Driver {
    /// Enumerate connected devices. Must precede any `open`.
    fn open_devices(&self) -> Result<Vec<DeviceInfo>>;

    /// Release the enumeration. Only valid once every camera is closed.
    fn close_devices(&self) -> Result<()>;

    fn open(&self, index: u32) -> Result<CameraHandle>;

    fn close(&self, handle: CameraHandle) -> Result<()>;

    /// Fill `features` with every feature the camera supports. Fails if the
    /// camera has more features than `features.capacity()`.
    fn get_all_features(&self, handle: CameraHandle, features: &mut FeatureVector) -> Result<()>;

    /// Write every entry of `features` in one transaction.
    fn set_features(&self, handle: CameraHandle, features: &mut FeatureVector) -> Result<()>;

    /// `Ok(None)` when the camera reports a descriptor of unknown shape.
    fn get_feature_desc(
        &self,
        handle: CameraHandle,
        id: FeatureId,
    ) -> Result<Option<FeatureDescriptor>>;

    fn frame_size(&self, handle: CameraHandle) -> Result<FrameSize>;

    fn command(&self, handle: CameraHandle, command: Command) -> Result<()>;

    /// Non-blocking poll. `Ok(None)` means no event of that type is pending.
    fn poll_event(&self, handle: CameraHandle, event_type: EventType) -> Result<Option<Event>>;

    /// Copy the next frame into `buffer`. Returns the number of frames still
    /// queued in the driver.
    fn get_image(
        &self,
        handle: CameraHandle,
        newest_required: bool,
        buffer: &mut ImageBuffer,
    ) -> Result<u32>;
}

/// Process-wide driver state: the loaded driver and its device enumeration.
///
/// Cloned into every open session. The enumeration is released once the
/// last clone is dropped, so it always outlives the sessions using it.
pub struct DriverContext<D: Driver> {
    shared: Arc<Shared<D>>,
}

struct Shared<D: Driver> {
    driver: D,
    devices: Vec<DeviceInfo>,
}

impl<D: Driver> DriverContext<D> {
    /// Enumerate devices through `driver`.
    pub fn open(driver: D) -> Result<Self> {
        let devices = driver.open_devices()?;
        log::info!("DsCam driver opened: {} device(s)", devices.len());
        for (index, info) in devices.iter().enumerate() {
            log::debug!(
                "  [{}] {} {:?} serial {} fw {}",
                index,
                info.camera_name,
                info.device_type,
                info.serial_number,
                info.firmware_version
            );
        }
        Ok(Self {
            shared: Arc::new(Shared { driver, devices }),
        })
    }

    pub fn driver(&self) -> &D {
        &self.shared.driver
    }

    pub fn devices(&self) -> &[DeviceInfo] {
        &self.shared.devices
    }

    pub fn device_count(&self) -> u32 {
        self.shared.devices.len() as u32
    }

    /// Number of live clones, this one included.
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.shared)
    }
}

impl<D: Driver> Clone for DriverContext<D> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<D: Driver> Drop for Shared<D> {
    fn drop(&mut self) {
        match self.driver.close_devices() {
            Ok(()) => log::info!("DsCam driver closed"),
            Err(e) => log::warn!("Failed to close DsCam device enumeration: {}", e),
        }
    }
}
