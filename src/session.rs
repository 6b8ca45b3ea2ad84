//! One opened camera: feature registry and capture controller around a
//! driver handle.

use std::time::SystemTime;

use crate::capture::{CancelToken, CaptureController, CaptureState, Frame, Geometry, ImageBuffer};
use crate::config::SessionConfig;
use crate::descriptor::FeatureDescriptor;
use crate::driver::{CameraHandle, Command, Driver, DriverContext};
use crate::library::DsCamLibrary;
use crate::registry::FeatureRegistry;
use crate::types::{DeviceInfo, FeatureId, FrameSize, Properties, TriggerMode};
use crate::variant::Value;
use crate::{DsCamError, Result};

/// Values written by [`Session::set_properties`]; `None` leaves a property
/// unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropertyUpdate {
    /// Exposure time in microseconds.
    pub exposure: Option<i64>,
    pub gain: Option<i64>,
    /// (red, blue).
    pub white_balance: Option<(i64, i64)>,
}

/// White balance green reported by [`Session::get_properties`]; the camera
/// does not expose it as adjustable.
pub const WHITE_BALANCE_GREEN: i64 = 100;

/// An open camera.
///
/// Opening refreshes the feature cache, sets the trigger mode, optionally
/// writes the default format, sizes the image buffer and starts frame
/// transfer. Dropping the session stops transfer, switches the trigger off
/// and closes the handle; failures along the way are logged, not raised.
pub struct Session<D: Driver> {
    ctx: DriverContext<D>,
    index: u32,
    handle: CameraHandle,
    config: SessionConfig,
    registry: FeatureRegistry,
    capture: CaptureController,
    frame_size: Option<FrameSize>,
    open: bool,
}

impl<D: Driver> Session<D> {
    pub fn open(ctx: &DriverContext<D>, index: u32, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let count = ctx.device_count();
        if index >= count {
            return Err(DsCamError::Connection { index, count });
        }

        let driver = ctx.driver();
        let handle = driver.open(index)?;
        if let Some(info) = ctx.devices().get(index as usize) {
            log::info!(
                "Opened camera {}: {} (serial {})",
                index,
                info.camera_name,
                info.serial_number
            );
        }

        let mut registry = FeatureRegistry::new(handle);
        let (frame_size, buffer) = match configure(driver, handle, &mut registry, &config) {
            Ok(prepared) => prepared,
            Err(e) => {
                release(driver, handle, &mut registry, index);
                return Err(e);
            }
        };

        let capture = CaptureController::new(handle, buffer, config.fallback_geometry)
            .with_poll_policy(config.poll)
            .with_image_wait(config.image_wait)
            .with_newest_required(config.newest_required);
        // From here on, Drop tears the camera down if setup fails.
        let mut session = Self {
            ctx: ctx.clone(),
            index,
            handle,
            registry,
            capture,
            frame_size: Some(frame_size),
            open: true,
            config,
        };
        session.update_geometry()?;
        session
            .capture
            .start_transfer(session.ctx.driver(), session.config.buffer_count)?;
        Ok(session)
    }

    /// Re-read the frame size and the current format's geometry. The image
    /// buffer keeps the size it was allocated with; a frame that no longer
    /// fits fails the next capture with `BufferTooSmall`.
    fn update_geometry(&mut self) -> Result<()> {
        let frame_size = self.ctx.driver().frame_size(self.handle)?;
        let capacity = self.capture.buffer().capacity();
        if frame_size.frame_size as usize > capacity {
            log::warn!(
                "Frame size {} exceeds the {} byte image buffer, captures will fail",
                frame_size.frame_size,
                capacity
            );
        }

        let geometry = self.format_geometry().unwrap_or_else(|| {
            log::debug!(
                "No format descriptor for the current format, assuming {:?}",
                self.config.fallback_geometry
            );
            self.config.fallback_geometry
        });
        if geometry.frame_bytes() > frame_size.frame_size as usize {
            log::warn!(
                "Frame size {} is smaller than {}x{}x{} pixels",
                frame_size.frame_size,
                geometry.width,
                geometry.height,
                geometry.pixel_size()
            );
        }
        self.capture.set_geometry(geometry);
        self.frame_size = Some(frame_size);
        Ok(())
    }

    fn format_geometry(&self) -> Option<Geometry> {
        let format = self.registry.get(FeatureId::FORMAT).ok()?.as_format()?;
        let desc = self.registry.descriptor(FeatureId::FORMAT)?.format(format)?;
        Some(Geometry::from_format(desc))
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn handle(&self) -> CameraHandle {
        self.handle
    }

    pub fn device_info(&self) -> Option<&DeviceInfo> {
        self.ctx.devices().get(self.index as usize)
    }

    pub fn context(&self) -> &DriverContext<D> {
        &self.ctx
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> CaptureState {
        self.capture.state()
    }

    pub fn geometry(&self) -> Geometry {
        self.capture.geometry()
    }

    pub fn frame_size(&self) -> Option<FrameSize> {
        self.frame_size
    }

    /// Token that aborts a capture blocked in an event wait.
    pub fn cancel_token(&self) -> CancelToken {
        self.capture.cancel_token()
    }

    /// Cached value; see [`refresh`](Self::refresh).
    pub fn get(&self, id: FeatureId) -> Result<Value> {
        self.registry.get(id)
    }

    pub fn get_integer(&self, id: FeatureId) -> Result<i64> {
        let value = self.get(id)?;
        value.as_integer().ok_or(DsCamError::TypeMismatch {
            feature: id,
            expected: id.variant_type(),
            found: value.kind(),
        })
    }

    /// Write one feature and return the value the device confirmed.
    pub fn set(&mut self, id: FeatureId, value: impl Into<Value>) -> Result<Value> {
        let confirmed = self.registry.set(self.ctx.driver(), id, &value.into())?;
        if id == FeatureId::FORMAT {
            self.update_geometry()?;
        }
        Ok(confirmed)
    }

    /// Write several features in one transaction; the cache takes the
    /// requested values as-is.
    pub fn set_many(&mut self, values: &[(FeatureId, Value)]) -> Result<()> {
        self.registry.set_many(self.ctx.driver(), values)?;
        if values.iter().any(|(id, _)| *id == FeatureId::FORMAT) {
            self.update_geometry()?;
        }
        Ok(())
    }

    pub fn refresh(&mut self) -> Result<()> {
        self.registry.refresh(self.ctx.driver())
    }

    pub fn descriptor(&self, id: FeatureId) -> Option<&FeatureDescriptor> {
        self.registry.descriptor(id)
    }

    pub fn feature_ids(&self) -> Vec<FeatureId> {
        self.registry.ids()
    }

    pub fn trigger_mode(&self) -> Result<TriggerMode> {
        let raw = self.get_integer(FeatureId::TRIGGER_MODE)?;
        TriggerMode::from_raw(raw).ok_or_else(|| {
            DsCamError::InvalidState(format!("camera reports unknown trigger mode {}", raw))
        })
    }

    pub fn set_trigger_mode(&mut self, mode: TriggerMode) -> Result<()> {
        self.registry
            .set(self.ctx.driver(), FeatureId::TRIGGER_MODE, &mode.into())?;
        log::info!("Trigger mode set to {:?}", mode);
        Ok(())
    }

    /// Software trigger mode, restarting frame transfer if it was stopped.
    pub fn trigger_on(&mut self) -> Result<()> {
        self.set_trigger_mode(TriggerMode::Software)?;
        if self.capture.state() == CaptureState::Idle {
            self.capture
                .start_transfer(self.ctx.driver(), self.config.buffer_count)?;
        }
        Ok(())
    }

    /// Stop frame transfer, then switch the trigger off.
    pub fn trigger_off(&mut self) -> Result<()> {
        if self.capture.state() == CaptureState::TransferActive {
            self.capture.stop_transfer(self.ctx.driver())?;
        }
        self.set_trigger_mode(TriggerMode::Off)
    }

    pub fn one_push_auto_exposure(&self) -> Result<()> {
        self.ctx
            .driver()
            .command(self.handle, Command::OnePushAutoExposure)
    }

    pub fn one_push_white_balance(&self) -> Result<()> {
        self.ctx
            .driver()
            .command(self.handle, Command::OnePushWhiteBalance)
    }

    pub fn cancel_trigger(&self) -> Result<()> {
        self.ctx
            .driver()
            .command(self.handle, Command::TriggerCancel)
    }

    /// Trigger and decode one frame. Requires software trigger mode and a
    /// frame size that fits the image buffer allocated at open.
    ///
    /// The frame borrows the session's image buffer; copy it with
    /// [`Frame::to_image`] to keep it across captures.
    pub fn get_image(&mut self) -> Result<Frame<'_>> {
        let mode = self.trigger_mode()?;
        if mode != TriggerMode::Software {
            return Err(DsCamError::InvalidState(format!(
                "capture needs software trigger mode, camera is in {:?}",
                mode
            )));
        }
        if let Some(frame_size) = self.frame_size {
            let capacity = self.capture.buffer().capacity();
            if frame_size.frame_size as usize > capacity {
                return Err(DsCamError::BufferTooSmall {
                    used: capacity,
                    required: frame_size.frame_size as usize,
                });
            }
        }
        self.capture.capture_once(self.ctx.driver())
    }

    /// Refresh the cache and report the common imaging properties.
    pub fn get_properties(&mut self) -> Result<Properties> {
        self.refresh()?;
        Ok(Properties {
            gain: self.get_integer(FeatureId::GAIN)?,
            exposure: self.get_integer(FeatureId::EXPOSURE_TIME)?,
            gamma: self.get_integer(FeatureId::BRIGHTNESS)?,
            white_balance: (
                self.get_integer(FeatureId::WHITE_BALANCE_RED)?,
                self.get_integer(FeatureId::WHITE_BALANCE_BLUE)?,
                WHITE_BALANCE_GREEN,
            ),
            timestamp: SystemTime::now(),
        })
    }

    /// Write each given property with a confirmed single-feature write.
    pub fn set_properties(&mut self, update: &PropertyUpdate) -> Result<()> {
        if let Some(exposure) = update.exposure {
            self.set(FeatureId::EXPOSURE_TIME, exposure)?;
        }
        if let Some(gain) = update.gain {
            self.set(FeatureId::GAIN, gain)?;
        }
        if let Some((red, blue)) = update.white_balance {
            self.set(FeatureId::WHITE_BALANCE_RED, red)?;
            self.set(FeatureId::WHITE_BALANCE_BLUE, blue)?;
        }
        Ok(())
    }

    /// Tear the camera down. Equivalent to dropping the session.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        let driver = self.ctx.driver();

        if self.capture.state() == CaptureState::TransferActive {
            if let Err(e) = self.capture.stop_transfer(driver) {
                log::warn!("Failed to stop frame transfer on camera {}: {}", self.index, e);
            }
        }
        release(driver, self.handle, &mut self.registry, self.index);
    }
}

/// Refresh the cache, set the trigger mode and optional default format,
/// then size the image buffer from the resulting frame size.
fn configure<D: Driver>(
    driver: &D,
    handle: CameraHandle,
    registry: &mut FeatureRegistry,
    config: &SessionConfig,
) -> Result<(FrameSize, ImageBuffer)> {
    registry.refresh(driver)?;
    registry.set(driver, FeatureId::TRIGGER_MODE, &config.trigger_mode.into())?;
    log::info!("Trigger mode set to {:?}", config.trigger_mode);
    if config.apply_defaults {
        registry.set(driver, FeatureId::FORMAT, &config.default_format.into())?;
    }
    let frame_size = driver.frame_size(handle)?;
    let buffer = ImageBuffer::new(frame_size.frame_size)?;
    log::debug!("Image buffer of {} bytes", buffer.capacity());
    Ok((frame_size, buffer))
}

/// Switch the trigger off and close the handle, logging failures.
fn release<D: Driver>(
    driver: &D,
    handle: CameraHandle,
    registry: &mut FeatureRegistry,
    index: u32,
) {
    if registry.contains(FeatureId::TRIGGER_MODE) {
        if let Err(e) = registry.set(driver, FeatureId::TRIGGER_MODE, &TriggerMode::Off.into()) {
            log::warn!("Failed to switch trigger off on camera {}: {}", index, e);
        }
    }
    match driver.close(handle) {
        Ok(()) => log::info!("Closed camera {}", index),
        Err(e) => log::warn!("Failed to close camera {}: {}", index, e),
    }
}

impl<D: Driver> Drop for Session<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Load the vendor driver and open camera `index` with default settings.
///
/// The driver context lives as long as the returned session.
pub fn open(index: u32, apply_defaults: bool) -> Result<Session<DsCamLibrary>> {
    let ctx = DriverContext::open(DsCamLibrary::load_default()?)?;
    let config = SessionConfig::from_env().with_apply_defaults(apply_defaults);
    Session::open(&ctx, index, config)
}
