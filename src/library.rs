//! [`Driver`] backed by the vendor's DsCam shared library, loaded at runtime.

use std::ffi::c_void;
use std::path::Path;

use libloading::Library;

use crate::capture::ImageBuffer;
use crate::config::read_env_string;
use crate::descriptor::FeatureDescriptor;
use crate::driver::{CameraHandle, Command, Driver};
use crate::sys::{
    self, CamCmdGetFrameSize, CamCmdStartFrameTransfer, CamDevice, CamEvent, CamFeatureDesc,
    CamImage, CloseDevicesFn, CloseFn, CommandFn, EventPollingFn, GetAllFeaturesFn,
    GetFeatureDescFn, GetImageFn, OpenDevicesFn, OpenFn, SetFeaturesFn, WChar, CAM_ERRMSG_MAX,
};
use crate::types::{DeviceInfo, DeviceType, Event, EventDetail, EventType, FeatureId, FrameSize};
use crate::variant::FeatureVector;
use crate::{DsCamError, ErrorCode, Result};

#[cfg(windows)]
pub const DEFAULT_LIBRARY: &str = "DsCam.dll";
#[cfg(not(windows))]
pub const DEFAULT_LIBRARY: &str = "libDsCam.so";

/// Resolved driver entry points.
struct Functions {
    open_devices: OpenDevicesFn,
    close_devices: CloseDevicesFn,
    open: OpenFn,
    close: CloseFn,
    get_all_features: GetAllFeaturesFn,
    set_features: SetFeaturesFn,
    get_feature_desc: GetFeatureDescFn,
    get_image: GetImageFn,
    command: CommandFn,
    event_polling: EventPollingFn,
}

/// The loaded vendor driver.
pub struct DsCamLibrary {
    fns: Functions,
    // Keeps the function pointers above valid.
    _library: Library,
}

/// # Safety
/// `T` must be the exact function pointer type of the exported symbol.
unsafe fn symbol<T: Copy>(library: &Library, name: &[u8]) -> Result<T> {
    Ok(*library.get::<T>(name)?)
}

impl DsCamLibrary {
    /// Load the driver from `path` and resolve every entry point.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        // SAFETY: loading runs the library's initialisers; the DsCam driver
        // has no load-time preconditions.
        let library = unsafe { Library::new(path)? };
        // SAFETY: the types in `sys` mirror the exported signatures.
        let fns = unsafe {
            Functions {
                open_devices: symbol(&library, b"CAM_OpenDevices\0")?,
                close_devices: symbol(&library, b"CAM_CloseDevices\0")?,
                open: symbol(&library, b"CAM_Open\0")?,
                close: symbol(&library, b"CAM_Close\0")?,
                get_all_features: symbol(&library, b"CAM_GetAllFeatures\0")?,
                set_features: symbol(&library, b"CAM_SetFeatures\0")?,
                get_feature_desc: symbol(&library, b"CAM_GetFeatureDesc\0")?,
                get_image: symbol(&library, b"CAM_GetImage\0")?,
                command: symbol(&library, b"CAM_Command\0")?,
                event_polling: symbol(&library, b"CAM_EventPolling\0")?,
            }
        };
        log::info!("Loaded DsCam driver from {}", path.display());
        Ok(Self {
            fns,
            _library: library,
        })
    }

    /// Load from `DSCAM_SDK_PATH`, or the platform library name.
    pub fn load_default() -> Result<Self> {
        let path = read_env_string("DSCAM_SDK_PATH").unwrap_or_else(|| DEFAULT_LIBRARY.to_string());
        Self::load(path)
    }

    fn send(&self, handle: CameraHandle, name: &str, data: *mut c_void) -> Result<()> {
        let wide = sys::to_wide(name);
        // SAFETY: `wide` is NUL-terminated and outlives the call; `data` is
        // either null or points at the struct the command expects.
        let status = unsafe { (self.fns.command)(handle.0, wide.as_ptr(), data) };
        ErrorCode(status).check("CAM_Command").map_err(|e| match e {
            DsCamError::Driver { call, code, .. } => DsCamError::Driver {
                call,
                code,
                message: name.to_string(),
            },
            other => other,
        })
    }
}

impl Driver for DsCamLibrary {
    fn open_devices(&self) -> Result<Vec<DeviceInfo>> {
        let mut count = 0u32;
        let mut devices: *mut CamDevice = std::ptr::null_mut();
        // SAFETY: both out-pointers are valid for writes.
        let status = unsafe { (self.fns.open_devices)(&mut count, &mut devices) };
        ErrorCode(status).check("CAM_OpenDevices")?;
        if devices.is_null() || count == 0 {
            return Ok(Vec::new());
        }
        // SAFETY: the driver returns `count` contiguous records that stay
        // valid until CAM_CloseDevices.
        let raw = unsafe { std::slice::from_raw_parts(devices, count as usize) };
        Ok(raw.iter().map(device_info_from_raw).collect())
    }

    fn close_devices(&self) -> Result<()> {
        // SAFETY: no arguments.
        ErrorCode(unsafe { (self.fns.close_devices)() }).check("CAM_CloseDevices")
    }

    fn open(&self, index: u32) -> Result<CameraHandle> {
        let mut handle = 0u32;
        let mut message = [0 as WChar; CAM_ERRMSG_MAX];
        // SAFETY: `message` holds CAM_ERRMSG_MAX wide chars as announced.
        let status = unsafe {
            (self.fns.open)(
                index,
                &mut handle,
                CAM_ERRMSG_MAX as u32,
                message.as_mut_ptr(),
            )
        };
        let code = ErrorCode(status);
        if !code.is_ok() {
            return Err(DsCamError::Driver {
                call: "CAM_Open",
                code,
                message: sys::from_wide(&message),
            });
        }
        Ok(CameraHandle(handle))
    }

    fn close(&self, handle: CameraHandle) -> Result<()> {
        // SAFETY: plain value argument.
        ErrorCode(unsafe { (self.fns.close)(handle.0) }).check("CAM_Close")
    }

    fn get_all_features(&self, handle: CameraHandle, features: &mut FeatureVector) -> Result<()> {
        let mut header = features.header();
        // SAFETY: the header points at `capacity` writable entries owned by
        // `features`, which is not touched until the call returns.
        let status = unsafe { (self.fns.get_all_features)(handle.0, &mut header) };
        ErrorCode(status).check("CAM_GetAllFeatures")?;
        features.update_from_header(&header)
    }

    fn set_features(&self, handle: CameraHandle, features: &mut FeatureVector) -> Result<()> {
        let mut header = features.header();
        // SAFETY: as in `get_all_features`.
        let status = unsafe { (self.fns.set_features)(handle.0, &mut header) };
        ErrorCode(status).check("CAM_SetFeatures")
    }

    fn get_feature_desc(
        &self,
        handle: CameraHandle,
        id: FeatureId,
    ) -> Result<Option<FeatureDescriptor>> {
        let mut desc = CamFeatureDesc::new_boxed();
        // SAFETY: `desc` is a zeroed, heap-allocated descriptor.
        let status = unsafe { (self.fns.get_feature_desc)(handle.0, id.0, &mut *desc) };
        ErrorCode(status).check("CAM_GetFeatureDesc")?;
        Ok(FeatureDescriptor::from_raw(&desc))
    }

    fn frame_size(&self, handle: CameraHandle) -> Result<FrameSize> {
        let mut reply = CamCmdGetFrameSize::default();
        self.send(
            handle,
            sys::CAM_CMD_GET_FRAMESIZE,
            &mut reply as *mut CamCmdGetFrameSize as *mut c_void,
        )?;
        Ok(FrameSize {
            frame_size: reply.frame_size,
            frame_interval: reply.frame_interval,
            shutter_delay_us: reply.rshutter_delay,
        })
    }

    fn command(&self, handle: CameraHandle, command: Command) -> Result<()> {
        match command {
            Command::StartFrameTransfer { buffers } => {
                let mut data = CamCmdStartFrameTransfer {
                    image_buffer_num: buffers,
                };
                self.send(
                    handle,
                    command.name(),
                    &mut data as *mut CamCmdStartFrameTransfer as *mut c_void,
                )
            }
            _ => self.send(handle, command.name(), std::ptr::null_mut()),
        }
    }

    fn poll_event(&self, handle: CameraHandle, event_type: EventType) -> Result<Option<Event>> {
        let mut raw = CamEvent::zeroed();
        // SAFETY: a null stop-event handle selects non-blocking polling;
        // `raw` is valid for writes.
        let status = unsafe {
            (self.fns.event_polling)(
                handle.0,
                std::ptr::null_mut(),
                event_type as i32,
                &mut raw,
            )
        };
        match ErrorCode(status) {
            ErrorCode::ACCESS_DENIED => Ok(None),
            code => {
                code.check("CAM_EventPolling")?;
                Ok(decode_event(&raw))
            }
        }
    }

    fn get_image(
        &self,
        handle: CameraHandle,
        newest_required: bool,
        buffer: &mut ImageBuffer,
    ) -> Result<u32> {
        let data = buffer.as_mut_slice();
        let mut image = CamImage {
            data_buffer: data.as_mut_ptr(),
            data_buffer_size: data.len() as u32,
            image_size: 0,
            end_time: 0,
            end_time64: 0,
            frame_count: 0,
            ref_count: 0,
        };
        let mut remained = 0u32;
        // SAFETY: `data_buffer` points at `data_buffer_size` writable bytes.
        let status =
            unsafe { (self.fns.get_image)(handle.0, newest_required, &mut image, &mut remained) };
        ErrorCode(status).check("CAM_GetImage")?;
        buffer.set_filled(image.image_size as usize, image.frame_count, image.end_time64);
        Ok(remained)
    }
}

fn device_info_from_raw(raw: &CamDevice) -> DeviceInfo {
    DeviceInfo {
        device_type: DeviceType::from_raw(raw.device_type),
        serial_number: raw.serial_no,
        camera_name: sys::from_wide(&raw.camera_name),
        firmware_version: sys::from_wide(&raw.fw_version),
        fpga_version: sys::from_wide(&raw.fpga_version),
        usb_dc_version: sys::from_wide(&raw.usb_dc_version),
        usb_version: sys::from_wide(&raw.usb_version),
        driver_version: sys::from_wide(&raw.driver_version),
    }
}

/// Decode a polled event; `None` for event types outside the known set.
fn decode_event(raw: &CamEvent) -> Option<Event> {
    let event_type = EventType::from_raw(raw.event_type.into())?;
    let e = &raw.event;
    // SAFETY: the event type selects the union member; all members are
    // plain data.
    let (tick, detail) = unsafe {
        match event_type {
            EventType::ImageReceived => (
                e.image_received.tick64,
                EventDetail::ImageReceived {
                    frame_no: e.image_received.frame_no,
                    remained: e.image_received.remained,
                },
            ),
            EventType::FeatureChanged => (
                e.feature_changed.tick64,
                EventDetail::FeatureChanged {
                    feature: FeatureId(e.feature_changed.feature_id),
                },
            ),
            EventType::TransError => (
                e.trans_error.tick64,
                EventDetail::TransError {
                    usb_error_code: e.trans_error.usb_error_code,
                    driver_error_code: e.trans_error.driver_error_code,
                    received_size: e.trans_error.received_size,
                    setting_size: e.trans_error.setting_size,
                },
            ),
            EventType::BusReset => (
                e.bus_reset.tick64,
                EventDetail::BusReset {
                    code: e.bus_reset.bus_reset_code,
                    image_cleared: e.bus_reset.image_cleared != 0,
                },
            ),
            _ => (e.signal.tick64, EventDetail::Signal),
        }
    };
    Some(Event {
        event_type,
        tick,
        detail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys::{CamEventBusReset, CamEventImageReceived, CamEventSignal};

    #[test]
    fn test_load_missing_library() {
        let err = DsCamLibrary::load("/nonexistent/libDsCam.so").err().unwrap();
        assert!(matches!(err, DsCamError::Library(_)));
    }

    #[test]
    fn test_decode_image_received() {
        let mut raw = CamEvent::zeroed();
        raw.event_type = EventType::ImageReceived as u32;
        raw.event.image_received = CamEventImageReceived {
            tick: 5,
            tick64: 5_000,
            frame_no: 12,
            remained: 3,
        };
        let event = decode_event(&raw).unwrap();
        assert_eq!(event.event_type, EventType::ImageReceived);
        assert_eq!(event.tick, 5_000);
        assert_eq!(
            event.detail,
            EventDetail::ImageReceived {
                frame_no: 12,
                remained: 3
            }
        );
    }

    #[test]
    fn test_decode_signal_and_bus_reset() {
        let mut raw = CamEvent::zeroed();
        raw.event_type = EventType::TriggerReady as u32;
        raw.event.signal = CamEventSignal {
            tick: 1,
            tick64: 10,
            event_type: EventType::TriggerReady as i32,
        };
        assert_eq!(decode_event(&raw).unwrap().detail, EventDetail::Signal);

        raw.event_type = EventType::BusReset as u32;
        raw.event.bus_reset = CamEventBusReset {
            tick: 1,
            tick64: 11,
            bus_reset_code: -2,
            image_cleared: 0xff,
        };
        assert_eq!(
            decode_event(&raw).unwrap().detail,
            EventDetail::BusReset {
                code: -2,
                image_cleared: true
            }
        );
    }

    #[test]
    fn test_decode_unknown_event() {
        let mut raw = CamEvent::zeroed();
        raw.event_type = 77;
        assert!(decode_event(&raw).is_none());
    }

    #[test]
    fn test_device_info_from_raw() {
        let raw = CamDevice {
            device_type: DeviceType::Qi2 as u32,
            serial_no: 4242,
            fw_version: sys::to_wide_fixed("2.10").unwrap(),
            fpga_version: sys::to_wide_fixed("1.03").unwrap(),
            usb_dc_version: sys::to_wide_fixed("1.00").unwrap(),
            usb_version: sys::to_wide_fixed("3.0").unwrap(),
            driver_version: sys::to_wide_fixed("5.1.0").unwrap(),
            camera_name: sys::to_wide_fixed("DS-Qi2").unwrap(),
        };
        let info = device_info_from_raw(&raw);
        assert_eq!(info.device_type, DeviceType::Qi2);
        assert_eq!(info.serial_number, 4242);
        assert_eq!(info.camera_name, "DS-Qi2");
        assert_eq!(info.driver_version, "5.1.0");
    }
}
