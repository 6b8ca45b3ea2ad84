//! `#[repr(C)]` mirror of the DsCam driver ABI.
//!
//! Field order, sizes and array bounds must match the vendor header exactly;
//! the driver writes into these structures through raw pointers.

use std::ffi::c_void;

/// Platform `wchar_t`.
#[cfg(windows)]
pub type WChar = u16;
#[cfg(not(windows))]
pub type WChar = u32;

pub const CAM_DEVICE_MAX: usize = 32;
pub const CAM_ERRMSG_MAX: usize = 256;
pub const CAM_VERSION_MAX: usize = 16;
pub const CAM_TEXT_MAX: usize = 256;
pub const CAM_NAME_MAX: usize = 32;
/// Fixed maximum number of features in one feature array.
pub const CAM_FEA_CAPACITY: usize = 64;
pub const CAM_FEA_VARIANT_MAX: usize = 256;
pub const CAM_FEA_COMMENT_MAX: usize = 64;
pub const CAM_FEA_DESC_LIST_MAX: usize = 256;
pub const CAM_FEA_MULTIEXPOSURETIME_MAX: usize = 15;
pub const CAM_FEA_FRAME_SIZE_MAX: u32 = 143_460_000;
pub const CAM_TRIGGER_LIST_MAX: usize = 3;
/// Size of the image info trailer appended to each frame.
pub const CAM_IMG_INFO_SIZE: usize = 256;

pub const CAM_CMD_ONEPUSH_AE: &str = "CAM_CMD_ONEPUSH_AE";
pub const CAM_CMD_ONEPUSH_WHITEBALANCE: &str = "CAM_CMD_ONEPUSH_WHITEBALANCE";
pub const CAM_CMD_ONEPUSH_SOFTTRIGGER: &str = "CAM_CMD_ONEPUSH_SOFTTRIGGER";
pub const CAM_CMD_ONEPUSH_TRIGGERCANCEL: &str = "CAM_CMD_ONEPUSH_TRIGGERCANCEL";
pub const CAM_CMD_GET_FRAMESIZE: &str = "CAM_CMD_GET_FRAMESIZE";
pub const CAM_CMD_START_FRAMETRANSFER: &str = "CAM_CMD_START_FRAMETRANSFER";
pub const CAM_CMD_STOP_FRAMETRANSFER: &str = "CAM_CMD_STOP_FRAMETRANSFER";

// -- Descriptor kinds --
pub const EDESC_UNKNOWN: u32 = 0;
pub const EDESC_ELEMENT_LIST: u32 = 1;
pub const EDESC_RANGE: u32 = 2;
pub const EDESC_AREA: u32 = 3;
pub const EDESC_POSITION: u32 = 4;
pub const EDESC_SIZE: u32 = 5;
pub const EDESC_TRIGGER_OPTION: u32 = 6;
pub const EDESC_FORMAT_LIST: u32 = 7;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CamArea {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CamPosition {
    pub x: u32,
    pub y: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CamSize {
    pub width: u32,
    pub height: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CamTriggerOption {
    pub frame_count: u32,
    pub delay_time: i32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CamMultiExposureTime {
    pub num: u32,
    pub exposure_time: [u32; CAM_FEA_MULTIEXPOSURETIME_MAX],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CamFormat {
    pub color: u32,
    pub mode: u32,
}

/// Payload of [`CamVariant`]. Only the member named by the tag is valid.
#[repr(C)]
#[derive(Clone, Copy)]
pub union CamVariantValue {
    pub i32_value: i32,
    pub u32_value: u32,
    pub i64_value: i64,
    pub u64_value: u64,
    pub f64_value: f64,
    /// C `bool`, kept as a byte: the driver may write any non-zero value.
    pub bool_value: u8,
    pub ptr_value: *mut c_void,
    pub wstr_value: [WChar; CAM_FEA_VARIANT_MAX],
    pub area: CamArea,
    pub position: CamPosition,
    pub size: CamSize,
    pub trigger_option: CamTriggerOption,
    pub multi_exposure_time: CamMultiExposureTime,
    pub format: CamFormat,
}

/// Tagged union: 4-byte type tag followed by the max-sized payload.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct CamVariant {
    pub var_type: u32,
    pub value: CamVariantValue,
}

impl CamVariant {
    pub fn zeroed() -> Self {
        // SAFETY: every union member is plain data for which all-zero bytes
        // are a valid value (null pointer, false, 0).
        unsafe { std::mem::zeroed() }
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct CamFeatureValue {
    pub feature_id: u32,
    pub variant: CamVariant,
    /// Transaction size, unused by the application.
    pub trans_size: u8,
}

impl CamFeatureValue {
    pub fn zeroed() -> Self {
        Self {
            feature_id: 0,
            variant: CamVariant::zeroed(),
            trans_size: 0,
        }
    }
}

/// Array header passed to get/set-features.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CamFeatureVector {
    pub count_used: u32,
    pub capacity: u32,
    pub pause_transfer: u32,
    pub values: *mut CamFeatureValue,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct CamFeatureDescElement {
    pub value: CamVariant,
    pub comment: [WChar; CAM_FEA_COMMENT_MAX],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct CamFeatureDescRange {
    pub min: CamVariant,
    pub max: CamVariant,
    pub res: CamVariant,
    pub def: CamVariant,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CamFeatureDescArea {
    pub min: CamArea,
    pub max: CamArea,
    pub res: CamArea,
    pub def: CamArea,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CamFeatureDescPosition {
    pub min: CamPosition,
    pub max: CamPosition,
    pub res: CamPosition,
    pub def: CamPosition,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CamFeatureDescSize {
    pub min: CamSize,
    pub max: CamSize,
    pub res: CamSize,
    pub def: CamSize,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct CamFeatureDescTriggerOption {
    pub range_frame_count: CamFeatureDescRange,
    pub range_delay_time: CamFeatureDescRange,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct CamFeatureDescFormat {
    pub format: CamFormat,
    pub image_width: u32,
    pub image_height: u32,
    pub bit_per_pixel: u32,
    pub comment: [WChar; CAM_FEA_COMMENT_MAX],
    pub trigger_list_count: u32,
    pub trigger_list: [CamFeatureDescElement; CAM_TRIGGER_LIST_MAX],
    pub desc_area: CamFeatureDescArea,
    pub desc_position: CamFeatureDescPosition,
    pub desc_size: CamFeatureDescSize,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union CamFeatureDescUnion {
    pub element_list: [CamFeatureDescElement; CAM_FEA_DESC_LIST_MAX],
    pub range: CamFeatureDescRange,
    pub area: CamFeatureDescArea,
    pub position: CamFeatureDescPosition,
    pub size: CamFeatureDescSize,
    pub trigger_option: CamFeatureDescTriggerOption,
    pub format_list: [CamFeatureDescFormat; CAM_FEA_DESC_LIST_MAX],
}

/// Feature descriptor. Several hundred kilobytes; allocate on the heap.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct CamFeatureDesc {
    pub feature_id: u32,
    pub list_count: u32,
    pub desc_type: u32,
    pub desc: CamFeatureDescUnion,
}

impl CamFeatureDesc {
    pub fn new_boxed() -> Box<Self> {
        // SAFETY: all-zero bytes are a valid descriptor (see CamVariant::zeroed).
        unsafe { Box::<Self>::new_zeroed().assume_init() }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CamImage {
    pub data_buffer: *mut u8,
    pub data_buffer_size: u32,
    pub image_size: u32,
    pub end_time: u32,
    pub end_time64: u64,
    pub frame_count: u64,
    pub ref_count: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CamDevice {
    pub device_type: u32,
    pub serial_no: u32,
    pub fw_version: [WChar; CAM_VERSION_MAX],
    pub fpga_version: [WChar; CAM_VERSION_MAX],
    pub usb_dc_version: [WChar; CAM_VERSION_MAX],
    pub usb_version: [WChar; CAM_VERSION_MAX],
    pub driver_version: [WChar; CAM_VERSION_MAX],
    pub camera_name: [WChar; CAM_NAME_MAX],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct CamCmdGetFrameSize {
    pub frame_size: u32,
    pub frame_interval: u32,
    pub rshutter_delay: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CamCmdStartFrameTransfer {
    /// 1 - 128, allocated by the driver.
    pub image_buffer_num: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CamEventImageReceived {
    pub tick: u32,
    pub tick64: u64,
    pub frame_no: u32,
    pub remained: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct CamEventFeatureChanged {
    pub tick: u32,
    pub tick64: u64,
    pub feature_id: u32,
    pub variant: CamVariant,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CamEventSignal {
    pub tick: u32,
    pub tick64: u64,
    pub event_type: i32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CamEventTransError {
    pub tick: u32,
    pub tick64: u64,
    pub usb_error_code: u32,
    pub driver_error_code: u32,
    pub received_size: u32,
    pub setting_size: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CamEventBusReset {
    pub tick: u32,
    pub tick64: u64,
    pub bus_reset_code: i32,
    /// C `bool`; non-zero means set.
    pub image_cleared: u8,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union CamEventUnion {
    pub image_received: CamEventImageReceived,
    pub feature_changed: CamEventFeatureChanged,
    pub signal: CamEventSignal,
    pub trans_error: CamEventTransError,
    pub bus_reset: CamEventBusReset,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct CamEvent {
    pub event_type: u32,
    pub event: CamEventUnion,
}

impl CamEvent {
    pub fn zeroed() -> Self {
        // SAFETY: plain data, all-zero is valid.
        unsafe { std::mem::zeroed() }
    }
}

// -- Entry points, resolved at runtime by `library::DsCamLibrary` --
pub type OpenDevicesFn = unsafe extern "system" fn(*mut u32, *mut *mut CamDevice) -> i32;
pub type CloseDevicesFn = unsafe extern "system" fn() -> i32;
pub type OpenFn = unsafe extern "system" fn(u32, *mut u32, u32, *mut WChar) -> i32;
pub type CloseFn = unsafe extern "system" fn(u32) -> i32;
pub type GetAllFeaturesFn = unsafe extern "system" fn(u32, *mut CamFeatureVector) -> i32;
pub type SetFeaturesFn = unsafe extern "system" fn(u32, *mut CamFeatureVector) -> i32;
pub type GetFeatureDescFn = unsafe extern "system" fn(u32, u32, *mut CamFeatureDesc) -> i32;
pub type GetImageFn = unsafe extern "system" fn(u32, bool, *mut CamImage, *mut u32) -> i32;
pub type CommandFn = unsafe extern "system" fn(u32, *const WChar, *mut c_void) -> i32;
pub type EventPollingFn =
    unsafe extern "system" fn(u32, *mut c_void, i32, *mut CamEvent) -> i32;

/// Encode `s` as a NUL-terminated wide string.
pub fn to_wide(s: &str) -> Vec<WChar> {
    #[cfg(windows)]
    let mut wide: Vec<WChar> = s.encode_utf16().collect();
    #[cfg(not(windows))]
    let mut wide: Vec<WChar> = s.chars().map(|c| c as WChar).collect();
    wide.push(0);
    wide
}

/// Copy `s` into a fixed wide buffer. Returns `None` if it does not fit
/// together with the terminating NUL.
pub fn to_wide_fixed<const N: usize>(s: &str) -> Option<[WChar; N]> {
    let wide = to_wide(s);
    if wide.len() > N {
        return None;
    }
    let mut buf = [0 as WChar; N];
    buf[..wide.len()].copy_from_slice(&wide);
    Some(buf)
}

/// Decode a NUL-terminated (or full-length) wide buffer.
pub fn from_wide(buf: &[WChar]) -> String {
    let end = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    #[cfg(windows)]
    {
        String::from_utf16_lossy(&buf[..end])
    }
    #[cfg(not(windows))]
    {
        buf[..end]
            .iter()
            .map(|&c| char::from_u32(c).unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()
    }
}
