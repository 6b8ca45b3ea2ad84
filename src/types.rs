use std::fmt;
use std::time::SystemTime;

/// Identifier of a readable/writable camera property.
///
/// Ids outside the catalogue below are valid: a device may report features
/// this crate has no name for, and they are carried through unchanged.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureId(pub u32);

impl FeatureId {
    pub const UNKNOWN: Self = Self(0);
    pub const EXPOSURE_MODE: Self = Self(1);
    pub const EXPOSURE_BIAS: Self = Self(2);
    /// Exposure time in microseconds.
    pub const EXPOSURE_TIME: Self = Self(3);
    /// Gain in logical units, 0 is normal gain.
    pub const GAIN: Self = Self(4);
    pub const METERING_MODE: Self = Self(5);
    pub const METERING_AREA: Self = Self(6);
    pub const EXPOSURE_TIME_LIMIT: Self = Self(7);
    pub const GAIN_LIMIT: Self = Self(8);
    pub const CAPTURE_MODE: Self = Self(9);
    /// Reported as gamma; 120 means 1.2.
    pub const BRIGHTNESS: Self = Self(13);
    pub const SHARPNESS: Self = Self(14);
    pub const HUE: Self = Self(15);
    pub const SATURATION: Self = Self(16);
    pub const TONE: Self = Self(17);
    pub const WHITE_BALANCE_RED: Self = Self(18);
    pub const WHITE_BALANCE_BLUE: Self = Self(19);
    pub const WHITE_BALANCE_GREEN: Self = Self(20);
    pub const WHITE_BALANCE: Self = Self(25);
    pub const PRESETS: Self = Self(26);
    pub const METERING_AIM: Self = Self(27);
    pub const TRIGGER_OPTION: Self = Self(33);
    pub const ONE_PUSH_SOFT_TRIGGER: Self = Self(34);
    pub const MULTI_EXPOSURE_TIME: Self = Self(35);
    pub const SIGNAL_EXPOSURE_END: Self = Self(36);
    pub const SIGNAL_TRIGGER_READY: Self = Self(37);
    pub const SIGNAL_DEVICE_CAPTURE: Self = Self(38);
    pub const EXPOSURE_OUTPUT: Self = Self(39);
    pub const ONE_PUSH_TRIGGER_CANCEL: Self = Self(40);
    pub const CIS_POWER: Self = Self(41);
    pub const IRCF_ADAPTOR: Self = Self(42);
    pub const FORMAT: Self = Self(80);
    pub const ROI_POSITION: Self = Self(81);
    pub const TRIGGER_MODE: Self = Self(82);
    pub const ROI_SIZE: Self = Self(83);

    /// Payload shape the driver uses for this feature.
    ///
    /// Returns [`VariantType::Unknown`] for ids missing from the catalogue.
    pub fn variant_type(self) -> VariantType {
        FEATURE_TABLE
            .iter()
            .find(|(id, _, _)| *id == self)
            .map_or(VariantType::Unknown, |&(_, _, ty)| ty)
    }

    pub fn name(self) -> Option<&'static str> {
        FEATURE_TABLE
            .iter()
            .find(|(id, _, _)| *id == self)
            .map(|&(_, name, _)| name)
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "Feature({})", self.0),
        }
    }
}

/// FeatureId → (name, wire type). Fixed by the driver contract.
const FEATURE_TABLE: &[(FeatureId, &str, VariantType)] = &[
    (FeatureId::EXPOSURE_MODE, "ExposureMode", VariantType::Int32),
    (FeatureId::EXPOSURE_BIAS, "ExposureBias", VariantType::Double),
    (FeatureId::EXPOSURE_TIME, "ExposureTime", VariantType::Int32),
    (FeatureId::GAIN, "Gain", VariantType::Int32),
    (FeatureId::METERING_MODE, "MeteringMode", VariantType::Int32),
    (FeatureId::METERING_AREA, "MeteringArea", VariantType::Area),
    (FeatureId::EXPOSURE_TIME_LIMIT, "ExposureTimeLimit", VariantType::Int32),
    (FeatureId::GAIN_LIMIT, "GainLimit", VariantType::Int32),
    (FeatureId::CAPTURE_MODE, "CaptureMode", VariantType::Int32),
    (FeatureId::BRIGHTNESS, "Brightness", VariantType::Int32),
    (FeatureId::SHARPNESS, "Sharpness", VariantType::Int32),
    (FeatureId::HUE, "Hue", VariantType::Int32),
    (FeatureId::SATURATION, "Saturation", VariantType::Int32),
    (FeatureId::TONE, "Tone", VariantType::Int32),
    (FeatureId::WHITE_BALANCE_RED, "WhiteBalanceRed", VariantType::Int32),
    (FeatureId::WHITE_BALANCE_BLUE, "WhiteBalanceBlue", VariantType::Int32),
    (FeatureId::WHITE_BALANCE_GREEN, "WhiteBalanceGreen", VariantType::Int32),
    (FeatureId::WHITE_BALANCE, "WhiteBalance", VariantType::Int32),
    (FeatureId::PRESETS, "Presets", VariantType::Int32),
    (FeatureId::METERING_AIM, "MeteringAim", VariantType::Position),
    (FeatureId::TRIGGER_OPTION, "TriggerOption", VariantType::TriggerOption),
    (FeatureId::ONE_PUSH_SOFT_TRIGGER, "OnePushSoftTrigger", VariantType::Pointer),
    (FeatureId::MULTI_EXPOSURE_TIME, "MultiExposureTime", VariantType::MultiExposureTime),
    (FeatureId::SIGNAL_EXPOSURE_END, "SignalExposureEnd", VariantType::Pointer),
    (FeatureId::SIGNAL_TRIGGER_READY, "SignalTriggerReady", VariantType::Pointer),
    (FeatureId::SIGNAL_DEVICE_CAPTURE, "SignalDeviceCapture", VariantType::Pointer),
    (FeatureId::EXPOSURE_OUTPUT, "ExposureOutput", VariantType::Int32),
    (FeatureId::ONE_PUSH_TRIGGER_CANCEL, "OnePushTriggerCancel", VariantType::Pointer),
    (FeatureId::CIS_POWER, "CisPower", VariantType::Int32),
    (FeatureId::IRCF_ADAPTOR, "IrcfAdaptor", VariantType::Int32),
    (FeatureId::FORMAT, "Format", VariantType::Format),
    (FeatureId::ROI_POSITION, "RoiPosition", VariantType::Position),
    (FeatureId::TRIGGER_MODE, "TriggerMode", VariantType::Int32),
    (FeatureId::ROI_SIZE, "RoiSize", VariantType::Size),
];

/// Tag of the driver's variant union.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariantType {
    Unknown = 0,
    Int32 = 1,
    UInt32 = 2,
    Int64 = 3,
    UInt64 = 4,
    Double = 5,
    Bool = 6,
    Pointer = 7,
    WString = 8,
    Area = 9,
    Position = 10,
    TriggerOption = 11,
    MultiExposureTime = 12,
    Format = 13,
    Size = 14,
}

impl VariantType {
    /// Every payload-carrying tag, in wire order.
    pub const ALL: [VariantType; 14] = [
        VariantType::Int32,
        VariantType::UInt32,
        VariantType::Int64,
        VariantType::UInt64,
        VariantType::Double,
        VariantType::Bool,
        VariantType::Pointer,
        VariantType::WString,
        VariantType::Area,
        VariantType::Position,
        VariantType::TriggerOption,
        VariantType::MultiExposureTime,
        VariantType::Format,
        VariantType::Size,
    ];

    pub fn from_tag(tag: u32) -> Option<Self> {
        if tag == 0 {
            return Some(VariantType::Unknown);
        }
        Self::ALL.get(tag as usize - 1).copied()
    }

    pub fn tag(self) -> u32 {
        self as u32
    }
}

/// Camera trigger mode, stored in the `TriggerMode` feature.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    Off = 0,
    Hardware = 1,
    Software = 2,
}

impl TriggerMode {
    pub fn from_raw(value: i64) -> Option<Self> {
        match value {
            0 => Some(TriggerMode::Off),
            1 => Some(TriggerMode::Hardware),
            2 => Some(TriggerMode::Software),
            _ => None,
        }
    }
}

/// Colour component of the `Format` feature.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FormatColor(pub u32);

impl FormatColor {
    pub const UNKNOWN: Self = Self(0);
    pub const RGB24: Self = Self(1);
    pub const YUV444: Self = Self(2);
    pub const MONO16: Self = Self(3);
    pub const RGB48: Self = Self(4);
    pub const Y16: Self = Self(5);
    pub const RAW16: Self = Self(6);

    /// Colour channels per pixel; unknown colours are treated as RGB.
    pub fn channels(self) -> u32 {
        match self {
            Self::MONO16 | Self::Y16 | Self::RAW16 => 1,
            _ => 3,
        }
    }
}

/// Size/mode component of the `Format` feature.
///
/// Mode numbers are reused across camera families, so the same value names
/// different resolutions on different models.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FormatMode(pub u32);

impl FormatMode {
    pub const UNKNOWN: Self = Self(0);
    pub const H2880X2048: Self = Self(1);
    pub const H1440X1024_ROI: Self = Self(2);
    pub const H1440X1024: Self = Self(3);
    pub const H3096X2088: Self = Self(4);
    pub const H1548X1044: Self = Self(5);
    pub const S4908X3264: Self = Self(1);
    pub const S2454X1632: Self = Self(2);
    pub const S1636X1088: Self = Self(3);
    pub const S818X544: Self = Self(4);
}

/// Image format: colour and size mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Format {
    pub color: FormatColor,
    pub mode: FormatMode,
}

impl Format {
    pub const fn new(color: FormatColor, mode: FormatMode) -> Self {
        Self { color, mode }
    }
}

/// Rectangle, used for the metering area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Area {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

/// ROI position or metering aim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub x: u32,
    pub y: u32,
}

/// ROI size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TriggerOption {
    pub frame_count: u32,
    pub delay_time: i32,
}

/// Up to [`MultiExposureTime::MAX`] exposure times in microseconds.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MultiExposureTime {
    pub times: Vec<u32>,
}

impl MultiExposureTime {
    pub const MAX: usize = crate::sys::CAM_FEA_MULTIEXPOSURETIME_MAX;
}

/// Asynchronous event kinds the driver can be polled for.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    ImageReceived = 0,
    FeatureChanged = 1,
    ExposureEnd = 2,
    TriggerReady = 3,
    DeviceCapture = 4,
    AeStay = 5,
    AeRunning = 6,
    AeDisable = 7,
    TransError = 8,
    BusReset = 9,
}

impl EventType {
    pub fn from_raw(value: i64) -> Option<Self> {
        Some(match value {
            0 => EventType::ImageReceived,
            1 => EventType::FeatureChanged,
            2 => EventType::ExposureEnd,
            3 => EventType::TriggerReady,
            4 => EventType::DeviceCapture,
            5 => EventType::AeStay,
            6 => EventType::AeRunning,
            7 => EventType::AeDisable,
            8 => EventType::TransError,
            9 => EventType::BusReset,
            _ => return None,
        })
    }
}

/// An event returned by a successful poll.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub event_type: EventType,
    /// Driver tick count at the time the event was raised.
    pub tick: u64,
    pub detail: EventDetail,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventDetail {
    ImageReceived { frame_no: u32, remained: u32 },
    FeatureChanged { feature: FeatureId },
    Signal,
    TransError {
        usb_error_code: u32,
        driver_error_code: u32,
        received_size: u32,
        setting_size: u32,
    },
    BusReset { code: i32, image_cleared: bool },
}

/// Camera model reported at enumeration.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    Unknown = 0,
    Ri2 = 1,
    Ri2Simulator = 2,
    Qi2 = 3,
    Qi2Simulator = 4,
    Fi3 = 5,
    Fi3Simulator = 6,
    Ds10 = 7,
    Ds10Simulator = 8,
}

impl DeviceType {
    pub fn from_raw(value: u32) -> Self {
        match value {
            1 => DeviceType::Ri2,
            2 => DeviceType::Ri2Simulator,
            3 => DeviceType::Qi2,
            4 => DeviceType::Qi2Simulator,
            5 => DeviceType::Fi3,
            6 => DeviceType::Fi3Simulator,
            7 => DeviceType::Ds10,
            8 => DeviceType::Ds10Simulator,
            _ => DeviceType::Unknown,
        }
    }

    pub fn is_simulator(self) -> bool {
        matches!(
            self,
            DeviceType::Ri2Simulator
                | DeviceType::Qi2Simulator
                | DeviceType::Fi3Simulator
                | DeviceType::Ds10Simulator
        )
    }
}

/// Device identification captured at enumeration.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub device_type: DeviceType,
    pub serial_number: u32,
    pub camera_name: String,
    pub firmware_version: String,
    pub fpga_version: String,
    pub usb_dc_version: String,
    pub usb_version: String,
    pub driver_version: String,
}

/// Reply to the frame-size command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSize {
    /// Bytes per frame, image info trailer included.
    pub frame_size: u32,
    pub frame_interval: u32,
    /// Rolling shutter delay in microseconds.
    pub shutter_delay_us: u32,
}

/// Snapshot of the commonly used imaging properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Properties {
    pub gain: i64,
    /// Exposure time in microseconds.
    pub exposure: i64,
    /// Gamma in hundredths (120 means 1.2).
    pub gamma: i64,
    /// (red, blue, green). Green is fixed at 100 by the camera.
    pub white_balance: (i64, i64, i64),
    pub timestamp: SystemTime,
}
