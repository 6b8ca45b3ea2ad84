//! Simulated DsCam driver for tests and the `simulate` demo.
//!
//! Models a small simulator camera: a fixed feature table with descriptors,
//! a format list with tiny frame geometries, soft-trigger events and a frame
//! generator filling the buffer with [`MockDriver::pattern_byte`]. Knobs on
//! the builder inject the failure modes the capture path has to survive.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::capture::{Geometry, ImageBuffer};
use crate::descriptor::{
    Bounds, DescriptorBounds, Element, FeatureDescriptor, FormatDescriptor, RangeDescriptor,
};
use crate::driver::{CameraHandle, Command, Driver};
use crate::sys::CAM_IMG_INFO_SIZE;
use crate::types::{
    Area, DeviceInfo, DeviceType, Event, EventDetail, EventType, FeatureId, Format, FormatColor,
    FormatMode, FrameSize, Position, Size, TriggerMode, TriggerOption,
};
use crate::variant::{FeatureValue, FeatureVector, Variant};
use crate::{DsCamError, ErrorCode, Result};

/// Geometry of the simulator's default format (RGB24, 2880x2048 mode).
pub const MOCK_GEOMETRY: Geometry = Geometry::new(8, 4, 3);

/// Exposure times are stored in steps of this many microseconds.
pub const EXPOSURE_STEP_US: i32 = 10;

const TRAILER_BYTE: u8 = 0xEE;
const HANDLE_BASE: u32 = 100;

/// Cloneable handle to one simulated driver; clones share state.
#[derive(Clone)]
pub struct MockDriver {
    inner: Arc<Mutex<MockState>>,
}

struct MockState {
    device_count: u32,
    devices_open: bool,
    close_devices_calls: usize,
    open: Vec<u32>,
    features: BTreeMap<FeatureId, Variant>,
    descriptors: HashMap<FeatureId, FeatureDescriptor>,
    formats: Vec<FormatDescriptor>,
    transfers: HashSet<u32>,
    pending: HashMap<u32, Instant>,
    frame_count: u64,
    soft_triggers: usize,
    set_calls: usize,
    commands: Vec<Command>,
    events: bool,
    event_delay: Duration,
    used_size: Option<usize>,
    fail_image: Option<ErrorCode>,
    fail_set: Option<ErrorCode>,
    fail_command: Option<ErrorCode>,
    started: Instant,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

fn int_range(min: i32, max: i32, default: i32) -> DescriptorBounds {
    DescriptorBounds::Range(RangeDescriptor {
        min: Variant::Int32(min),
        max: Variant::Int32(max),
        resolution: Variant::Int32(1),
        default: Variant::Int32(default),
    })
}

fn mock_formats() -> Vec<FormatDescriptor> {
    let entry = |color, mode, width, height, bits_per_pixel, comment: &str| FormatDescriptor {
        format: Format::new(color, mode),
        width,
        height,
        bits_per_pixel,
        comment: comment.to_string(),
    };
    vec![
        entry(FormatColor::RGB24, FormatMode::H2880X2048, 8, 4, 24, "RGB 2880x2048"),
        entry(FormatColor::RGB24, FormatMode::H1440X1024, 4, 2, 24, "RGB 1440x1024"),
        entry(FormatColor::MONO16, FormatMode::H1440X1024, 4, 2, 16, "Mono16 1440x1024"),
    ]
}

impl MockDriver {
    /// One simulator camera with its full feature table.
    pub fn new() -> Self {
        let mut features = BTreeMap::new();
        let mut descriptors = HashMap::new();
        let mut add = |id: FeatureId, value: Variant, bounds: Option<DescriptorBounds>| {
            features.insert(id, value);
            if let Some(bounds) = bounds {
                descriptors.insert(id, FeatureDescriptor { id, bounds });
            }
        };

        add(FeatureId::EXPOSURE_MODE, Variant::Int32(0), Some(int_range(0, 2, 0)));
        add(
            FeatureId::EXPOSURE_BIAS,
            Variant::Double(0.0),
            Some(DescriptorBounds::Range(RangeDescriptor {
                min: Variant::Double(-2.0),
                max: Variant::Double(2.0),
                resolution: Variant::Double(0.5),
                default: Variant::Double(0.0),
            })),
        );
        add(
            FeatureId::EXPOSURE_TIME,
            Variant::Int32(10_000),
            Some(int_range(100, 1_000_000, 10_000)),
        );
        add(FeatureId::GAIN, Variant::Int32(0), Some(int_range(0, 400, 0)));
        add(FeatureId::BRIGHTNESS, Variant::Int32(100), Some(int_range(0, 200, 100)));
        add(FeatureId::WHITE_BALANCE_RED, Variant::Int32(100), Some(int_range(0, 799, 100)));
        add(FeatureId::WHITE_BALANCE_BLUE, Variant::Int32(100), Some(int_range(0, 799, 100)));
        add(FeatureId::WHITE_BALANCE_GREEN, Variant::Int32(100), None);
        let sensor = Area {
            left: 0,
            top: 0,
            width: MOCK_GEOMETRY.width,
            height: MOCK_GEOMETRY.height,
        };
        add(
            FeatureId::METERING_AREA,
            Variant::Area(sensor),
            Some(DescriptorBounds::Area(Bounds {
                min: Area {
                    left: 0,
                    top: 0,
                    width: 1,
                    height: 1,
                },
                max: sensor,
                resolution: Area {
                    left: 1,
                    top: 1,
                    width: 1,
                    height: 1,
                },
                default: sensor,
            })),
        );
        add(
            FeatureId::TRIGGER_OPTION,
            Variant::TriggerOption(TriggerOption {
                frame_count: 1,
                delay_time: 0,
            }),
            Some(DescriptorBounds::TriggerOption {
                frame_count: RangeDescriptor {
                    min: Variant::UInt32(1),
                    max: Variant::UInt32(255),
                    resolution: Variant::UInt32(1),
                    default: Variant::UInt32(1),
                },
                delay_time: RangeDescriptor {
                    min: Variant::Int32(-1000),
                    max: Variant::Int32(1000),
                    resolution: Variant::Int32(1),
                    default: Variant::Int32(0),
                },
            }),
        );
        add(FeatureId::ONE_PUSH_SOFT_TRIGGER, Variant::Pointer(0), None);
        add(
            FeatureId::FORMAT,
            Variant::Format(Format::new(FormatColor::RGB24, FormatMode::H2880X2048)),
            Some(DescriptorBounds::FormatList(mock_formats())),
        );
        add(
            FeatureId::ROI_POSITION,
            Variant::Position(Position { x: 0, y: 0 }),
            Some(DescriptorBounds::Position(Bounds {
                min: Position { x: 0, y: 0 },
                max: Position {
                    x: MOCK_GEOMETRY.width - 1,
                    y: MOCK_GEOMETRY.height - 1,
                },
                resolution: Position { x: 1, y: 1 },
                default: Position { x: 0, y: 0 },
            })),
        );
        add(
            FeatureId::TRIGGER_MODE,
            Variant::Int32(TriggerMode::Off as i32),
            Some(DescriptorBounds::ElementList(
                [
                    ("Off", TriggerMode::Off),
                    ("Hard", TriggerMode::Hardware),
                    ("Soft", TriggerMode::Software),
                ]
                .into_iter()
                .map(|(comment, mode)| Element {
                    value: Variant::Int32(mode as i32),
                    comment: comment.to_string(),
                })
                .collect(),
            )),
        );
        add(
            FeatureId::ROI_SIZE,
            Variant::Size(Size {
                width: MOCK_GEOMETRY.width,
                height: MOCK_GEOMETRY.height,
            }),
            Some(DescriptorBounds::Size(Bounds {
                min: Size {
                    width: 1,
                    height: 1,
                },
                max: Size {
                    width: MOCK_GEOMETRY.width,
                    height: MOCK_GEOMETRY.height,
                },
                resolution: Size {
                    width: 1,
                    height: 1,
                },
                default: Size {
                    width: MOCK_GEOMETRY.width,
                    height: MOCK_GEOMETRY.height,
                },
            })),
        );

        Self {
            inner: Arc::new(Mutex::new(MockState {
                device_count: 1,
                devices_open: false,
                close_devices_calls: 0,
                open: Vec::new(),
                features,
                descriptors,
                formats: mock_formats(),
                transfers: HashSet::new(),
                pending: HashMap::new(),
                frame_count: 0,
                soft_triggers: 0,
                set_calls: 0,
                commands: Vec::new(),
                events: true,
                event_delay: Duration::ZERO,
                used_size: None,
                fail_image: None,
                fail_set: None,
                fail_command: None,
                started: Instant::now(),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn with_devices(self, count: u32) -> Self {
        self.state().device_count = count;
        self
    }

    /// Report `used` bytes for every fetched frame.
    pub fn with_used_size(self, used: usize) -> Self {
        self.state().used_size = Some(used);
        self
    }

    /// Never raise any event.
    pub fn without_events(self) -> Self {
        self.state().events = false;
        self
    }

    /// Delay between a soft trigger and its image-received event.
    pub fn with_event_delay(self, delay: Duration) -> Self {
        self.state().event_delay = delay;
        self
    }

    pub fn without_descriptors(self) -> Self {
        self.state().descriptors.clear();
        self
    }

    /// Add `count` uncatalogued Int32 features.
    pub fn with_extra_features(self, count: u32) -> Self {
        {
            let mut state = self.state();
            for n in 0..count {
                state.features.insert(FeatureId(1000 + n), Variant::Int32(n as i32));
            }
        }
        self
    }

    pub fn fail_next_image(&self, code: ErrorCode) {
        self.state().fail_image = Some(code);
    }

    pub fn fail_next_set(&self, code: ErrorCode) {
        self.state().fail_set = Some(code);
    }

    pub fn fail_next_command(&self, code: ErrorCode) {
        self.state().fail_command = Some(code);
    }

    /// Byte at `offset` of every generated frame, as delivered by the driver.
    pub fn pattern_byte(offset: usize) -> u8 {
        (offset.wrapping_mul(31).wrapping_add(7) % 251) as u8
    }

    /// Driver-order channels of pixel (x, y) in the default format.
    pub fn pattern_pixel(x: u32, y: u32) -> [u8; 3] {
        let base = (y as usize * MOCK_GEOMETRY.width as usize + x as usize) * 3;
        [
            Self::pattern_byte(base),
            Self::pattern_byte(base + 1),
            Self::pattern_byte(base + 2),
        ]
    }

    pub fn devices_open(&self) -> bool {
        self.state().devices_open
    }

    pub fn close_devices_calls(&self) -> usize {
        self.state().close_devices_calls
    }

    pub fn open_handles(&self) -> usize {
        self.state().open.len()
    }

    /// Whether any camera has frame transfer running.
    pub fn transfer_active(&self) -> bool {
        !self.state().transfers.is_empty()
    }

    pub fn soft_triggers(&self) -> usize {
        self.state().soft_triggers
    }

    pub fn set_calls(&self) -> usize {
        self.state().set_calls
    }

    pub fn commands(&self) -> Vec<Command> {
        self.state().commands.clone()
    }

    /// Device-side value of a feature.
    pub fn feature(&self, id: FeatureId) -> Option<Variant> {
        self.state().features.get(&id).cloned()
    }

    /// Change a feature behind the session's back.
    pub fn poke(&self, id: FeatureId, value: Variant) {
        self.state().features.insert(id, value);
    }
}

impl MockState {
    fn check_handle(&self, handle: CameraHandle, call: &'static str) -> Result<()> {
        if self.open.contains(&handle.0) {
            Ok(())
        } else {
            ErrorCode::HANDLE.check(call)
        }
    }

    fn current_format(&self) -> Option<&FormatDescriptor> {
        match self.features.get(&FeatureId::FORMAT) {
            Some(Variant::Format(format)) => self.formats.iter().find(|d| d.format == *format),
            _ => None,
        }
    }

    fn trigger_mode(&self) -> Option<TriggerMode> {
        match self.features.get(&FeatureId::TRIGGER_MODE) {
            Some(Variant::Int32(mode)) => TriggerMode::from_raw((*mode).into()),
            _ => None,
        }
    }

    /// Simulated device quirks applied on write.
    fn quantize(id: FeatureId, value: Variant) -> Variant {
        match (id, value) {
            (FeatureId::EXPOSURE_TIME, Variant::Int32(us)) => {
                Variant::Int32(us - us.rem_euclid(EXPOSURE_STEP_US))
            }
            (FeatureId::GAIN, Variant::Int32(gain)) => Variant::Int32(gain.clamp(0, 400)),
            (_, other) => other,
        }
    }

    fn tick(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

impl Driver for MockDriver {
    fn open_devices(&self) -> Result<Vec<DeviceInfo>> {
        let mut state = self.state();
        state.devices_open = true;
        Ok((0..state.device_count)
            .map(|n| DeviceInfo {
                device_type: DeviceType::Qi2Simulator,
                serial_number: 1000 + n,
                camera_name: "Qi2 Simulator".to_string(),
                firmware_version: "1.00".to_string(),
                fpga_version: "1.00".to_string(),
                usb_dc_version: "1.00".to_string(),
                usb_version: "3.0".to_string(),
                driver_version: "mock".to_string(),
            })
            .collect())
    }

    fn close_devices(&self) -> Result<()> {
        let mut state = self.state();
        state.close_devices_calls += 1;
        if !state.open.is_empty() {
            return ErrorCode::ACCESS_DENIED.check("CAM_CloseDevices");
        }
        state.devices_open = false;
        Ok(())
    }

    fn open(&self, index: u32) -> Result<CameraHandle> {
        let mut state = self.state();
        if !state.devices_open || index >= state.device_count {
            return Err(DsCamError::Driver {
                call: "CAM_Open",
                code: ErrorCode::INVALID_ARG,
                message: format!("no device at index {}", index),
            });
        }
        let handle = HANDLE_BASE + index;
        if state.open.contains(&handle) {
            return Err(DsCamError::Driver {
                call: "CAM_Open",
                code: ErrorCode::ACCESS_DENIED,
                message: "device already open".to_string(),
            });
        }
        state.open.push(handle);
        Ok(CameraHandle(handle))
    }

    fn close(&self, handle: CameraHandle) -> Result<()> {
        let mut state = self.state();
        state.check_handle(handle, "CAM_Close")?;
        state.open.retain(|&h| h != handle.0);
        state.transfers.remove(&handle.0);
        state.pending.remove(&handle.0);
        Ok(())
    }

    fn get_all_features(&self, handle: CameraHandle, features: &mut FeatureVector) -> Result<()> {
        let state = self.state();
        state.check_handle(handle, "CAM_GetAllFeatures")?;
        features.clear();
        for (id, value) in &state.features {
            features.push(&FeatureValue::new(*id, value.clone()))?;
        }
        Ok(())
    }

    fn set_features(&self, handle: CameraHandle, features: &mut FeatureVector) -> Result<()> {
        let mut state = self.state();
        state.check_handle(handle, "CAM_SetFeatures")?;
        state.set_calls += 1;
        if let Some(code) = state.fail_set.take() {
            return code.check("CAM_SetFeatures");
        }
        let requested: Vec<FeatureValue> = features.values().collect();
        for entry in &requested {
            match state.features.get(&entry.id) {
                Some(current) if current.tag() == entry.value.tag() => {}
                _ => return ErrorCode::INVALID_ARG.check("CAM_SetFeatures"),
            }
        }
        for entry in requested {
            let stored = MockState::quantize(entry.id, entry.value);
            state.features.insert(entry.id, stored);
        }
        Ok(())
    }

    fn get_feature_desc(
        &self,
        handle: CameraHandle,
        id: FeatureId,
    ) -> Result<Option<FeatureDescriptor>> {
        let state = self.state();
        state.check_handle(handle, "CAM_GetFeatureDesc")?;
        if !state.features.contains_key(&id) {
            return ErrorCode::INVALID_ARG.check("CAM_GetFeatureDesc").map(|()| None);
        }
        Ok(state.descriptors.get(&id).cloned())
    }

    fn frame_size(&self, handle: CameraHandle) -> Result<FrameSize> {
        let state = self.state();
        state.check_handle(handle, "CAM_Command")?;
        let geometry = state
            .current_format()
            .map(Geometry::from_format)
            .unwrap_or(MOCK_GEOMETRY);
        Ok(FrameSize {
            frame_size: (geometry.frame_bytes() + CAM_IMG_INFO_SIZE) as u32,
            frame_interval: 33,
            shutter_delay_us: 0,
        })
    }

    fn command(&self, handle: CameraHandle, command: Command) -> Result<()> {
        let mut state = self.state();
        state.check_handle(handle, "CAM_Command")?;
        state.commands.push(command);
        if let Some(code) = state.fail_command.take() {
            return code.check("CAM_Command");
        }
        match command {
            Command::SoftTrigger => {
                if !state.transfers.contains(&handle.0)
                    || state.trigger_mode() != Some(TriggerMode::Software)
                {
                    return ErrorCode::FAIL.check("CAM_Command");
                }
                state.soft_triggers += 1;
                state.pending.insert(handle.0, Instant::now());
            }
            Command::TriggerCancel => {
                state.pending.remove(&handle.0);
            }
            Command::OnePushAutoExposure => {
                state
                    .features
                    .insert(FeatureId::EXPOSURE_TIME, Variant::Int32(20_000));
            }
            Command::OnePushWhiteBalance => {
                state
                    .features
                    .insert(FeatureId::WHITE_BALANCE_RED, Variant::Int32(150));
                state
                    .features
                    .insert(FeatureId::WHITE_BALANCE_BLUE, Variant::Int32(120));
            }
            Command::StartFrameTransfer { .. } => {
                if !state.transfers.insert(handle.0) {
                    return ErrorCode::FAIL.check("CAM_Command");
                }
            }
            Command::StopFrameTransfer => {
                state.transfers.remove(&handle.0);
                state.pending.remove(&handle.0);
            }
        }
        Ok(())
    }

    fn poll_event(&self, handle: CameraHandle, event_type: EventType) -> Result<Option<Event>> {
        let state = self.state();
        state.check_handle(handle, "CAM_EventPolling")?;
        if !state.events {
            return Ok(None);
        }
        let detail = match event_type {
            EventType::ImageReceived => match state.pending.get(&handle.0) {
                Some(at) if at.elapsed() >= state.event_delay => EventDetail::ImageReceived {
                    frame_no: (state.frame_count + 1) as u32,
                    remained: 0,
                },
                _ => return Ok(None),
            },
            EventType::TriggerReady
                if state.transfers.contains(&handle.0) && !state.pending.contains_key(&handle.0) =>
            {
                EventDetail::Signal
            }
            _ => return Ok(None),
        };
        Ok(Some(Event {
            event_type,
            tick: state.tick(),
            detail,
        }))
    }

    fn get_image(
        &self,
        handle: CameraHandle,
        _newest_required: bool,
        buffer: &mut ImageBuffer,
    ) -> Result<u32> {
        let mut state = self.state();
        state.check_handle(handle, "CAM_GetImage")?;
        if let Some(code) = state.fail_image.take() {
            return code.check("CAM_GetImage").map(|()| 0);
        }
        if !state.transfers.contains(&handle.0) {
            return ErrorCode::FAIL.check("CAM_GetImage").map(|()| 0);
        }
        let geometry = state
            .current_format()
            .map(Geometry::from_format)
            .unwrap_or(MOCK_GEOMETRY);
        let frame = geometry.frame_bytes() + CAM_IMG_INFO_SIZE;
        if buffer.capacity() < frame {
            return ErrorCode::INVALID_ARG.check("CAM_GetImage").map(|()| 0);
        }

        let bytes = buffer.as_mut_slice();
        for (offset, byte) in bytes[..geometry.frame_bytes()].iter_mut().enumerate() {
            *byte = Self::pattern_byte(offset);
        }
        bytes[geometry.frame_bytes()..frame].fill(TRAILER_BYTE);

        state.pending.remove(&handle.0);
        state.frame_count += 1;
        let used = state.used_size.unwrap_or(frame);
        let tick = state.tick();
        buffer.set_filled(used, state.frame_count, tick);
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opened() -> (MockDriver, CameraHandle) {
        let mock = MockDriver::new();
        mock.open_devices().unwrap();
        let handle = mock.open(0).unwrap();
        (mock, handle)
    }

    #[test]
    fn test_open_requires_enumeration() {
        let mock = MockDriver::new();
        assert!(mock.open(0).is_err());
        mock.open_devices().unwrap();
        assert!(mock.open(1).is_err());
        let handle = mock.open(0).unwrap();
        assert!(matches!(
            mock.open(0),
            Err(DsCamError::Driver {
                code: ErrorCode::ACCESS_DENIED,
                ..
            })
        ));
        mock.close(handle).unwrap();
        assert!(mock.close(handle).is_err());
    }

    #[test]
    fn test_get_all_features_respects_capacity() {
        let (mock, handle) = opened();
        let mut small = FeatureVector::with_capacity(2);
        assert!(matches!(
            mock.get_all_features(handle, &mut small),
            Err(DsCamError::CapacityExceeded { .. })
        ));
        let mut full = FeatureVector::with_capacity(crate::sys::CAM_FEA_CAPACITY);
        mock.get_all_features(handle, &mut full).unwrap();
        assert!(full.values().any(|v| v.id == FeatureId::GAIN));
    }

    #[test]
    fn test_set_features_quantizes_exposure() {
        let (mock, handle) = opened();
        let entry = FeatureValue::new(FeatureId::EXPOSURE_TIME, Variant::Int32(70_005));
        let mut request = FeatureVector::from_values(&[entry]).unwrap();
        mock.set_features(handle, &mut request).unwrap();
        assert_eq!(mock.feature(FeatureId::EXPOSURE_TIME), Some(Variant::Int32(70_000)));
    }

    #[test]
    fn test_set_features_rejects_wrong_tag() {
        let (mock, handle) = opened();
        let entry = FeatureValue::new(FeatureId::GAIN, Variant::Double(1.0));
        let mut request = FeatureVector::from_values(&[entry]).unwrap();
        assert!(mock.set_features(handle, &mut request).is_err());
        assert_eq!(mock.feature(FeatureId::GAIN), Some(Variant::Int32(0)));
    }

    #[test]
    fn test_soft_trigger_needs_software_mode() {
        let (mock, handle) = opened();
        mock.command(handle, Command::StartFrameTransfer { buffers: 1 })
            .unwrap();
        assert!(mock.command(handle, Command::SoftTrigger).is_err());
        mock.poke(FeatureId::TRIGGER_MODE, Variant::Int32(2));
        mock.command(handle, Command::SoftTrigger).unwrap();
        assert!(mock
            .poll_event(handle, EventType::ImageReceived)
            .unwrap()
            .is_some());
        assert!(mock
            .poll_event(handle, EventType::TriggerReady)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_frame_size_follows_format() {
        let (mock, handle) = opened();
        let large = mock.frame_size(handle).unwrap().frame_size as usize;
        assert_eq!(large, MOCK_GEOMETRY.frame_bytes() + CAM_IMG_INFO_SIZE);
        mock.poke(
            FeatureId::FORMAT,
            Variant::Format(Format::new(FormatColor::MONO16, FormatMode::H1440X1024)),
        );
        let small = mock.frame_size(handle).unwrap().frame_size as usize;
        assert_eq!(small, 4 * 2 * 2 + CAM_IMG_INFO_SIZE);
    }
}
