//! Software-triggered frame capture.
//!
//! A capture issues a soft trigger, waits for the driver's "image received"
//! event, copies the frame into the session's single [`ImageBuffer`] and
//! returns a [`Frame`] borrowing that buffer. The borrow ends before the next
//! trigger can overwrite the storage.
//!
//! Event waits poll the driver's non-blocking primitive against a deadline,
//! sleeping [`PollPolicy::interval`] between polls. A [`CancelToken`] aborts
//! a wait from another thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::descriptor::FormatDescriptor;
use crate::driver::{CameraHandle, Command, Driver};
use crate::sys::CAM_FEA_FRAME_SIZE_MAX;
use crate::types::{Event, EventType};
use crate::{DsCamError, Result};

/// Driver-side buffers allowed for the frame-transfer pipeline.
pub const BUFFER_COUNT_RANGE: std::ops::RangeInclusive<u32> = 1..=128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    /// Frame transfer running; ready for a trigger.
    TransferActive,
    /// Soft trigger issued, waiting for the frame.
    TriggerArmed,
    /// Frame decoded, confirming the camera is ready for the next trigger.
    FrameReady,
}

/// Reusable frame storage, sized once from the driver's frame size.
pub struct ImageBuffer {
    data: Box<[u8]>,
    used: usize,
    frame_count: u64,
    end_time: u64,
}

impl ImageBuffer {
    pub fn new(size: u32) -> Result<Self> {
        if size == 0 || size > CAM_FEA_FRAME_SIZE_MAX {
            return Err(DsCamError::InvalidArgument(format!(
                "frame size {} outside 1..={}",
                size, CAM_FEA_FRAME_SIZE_MAX
            )));
        }
        Ok(Self {
            data: vec![0u8; size as usize].into_boxed_slice(),
            used: 0,
            frame_count: 0,
            end_time: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes written by the last fetch.
    pub fn used(&self) -> usize {
        self.used
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Driver timestamp of the end of exposure of the last frame.
    pub fn end_time(&self) -> u64 {
        self.end_time
    }

    pub fn filled(&self) -> &[u8] {
        &self.data[..self.used]
    }

    /// Whole storage, for the driver to write into.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }

    /// Record what the driver wrote. `used` is clamped to the capacity.
    pub fn set_filled(&mut self, used: usize, frame_count: u64, end_time: u64) {
        self.used = used.min(self.data.len());
        self.frame_count = frame_count;
        self.end_time = end_time;
    }
}

/// Pixel layout of the configured format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub bytes_per_channel: u32,
}

impl Geometry {
    pub const fn new(width: u32, height: u32, channels: u32) -> Self {
        Self {
            width,
            height,
            channels,
            bytes_per_channel: 1,
        }
    }

    pub fn from_format(desc: &FormatDescriptor) -> Self {
        let channels = desc.format.color.channels();
        let bytes_per_channel = (desc.bytes_per_pixel() / channels).max(1);
        Self {
            width: desc.width,
            height: desc.height,
            channels,
            bytes_per_channel,
        }
    }

    pub fn pixel_size(&self) -> usize {
        self.channels as usize * self.bytes_per_channel as usize
    }

    /// Bytes of pixel data in one frame, trailer excluded.
    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * self.pixel_size()
    }
}

/// Bounds of an event wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub timeout: Duration,
    /// Sleep between two polls.
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            interval: Duration::from_millis(1),
        }
    }
}

/// Shared flag that aborts event waits. Stays set until [`reset`](Self::reset).
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// What a capture does when "image received" does not arrive in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageWaitPolicy {
    /// Log and fetch whatever the driver holds.
    #[default]
    Proceed,
    /// Fail with [`DsCamError::Timeout`].
    Fail,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    Received(Event),
    TimedOut,
}

/// Poll for `event_type` until it arrives, the timeout elapses or `cancel`
/// is set. Driver errors end the wait.
pub fn wait_for_event<D: Driver + ?Sized>(
    driver: &D,
    handle: CameraHandle,
    event_type: EventType,
    policy: &PollPolicy,
    cancel: &CancelToken,
) -> Result<WaitOutcome> {
    let deadline = Instant::now() + policy.timeout;
    loop {
        if cancel.is_cancelled() {
            return Err(DsCamError::Cancelled);
        }
        match driver.poll_event(handle, event_type)? {
            Some(event) if event.event_type == event_type => {
                return Ok(WaitOutcome::Received(event));
            }
            Some(other) => log::trace!(
                "Skipping {:?} while waiting for {:?}",
                other.event_type,
                event_type
            ),
            None => {}
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(WaitOutcome::TimedOut);
        }
        std::thread::sleep(policy.interval.min(deadline - now));
    }
}

/// Per-frame information reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameMetadata {
    pub frame_count: u64,
    pub end_time: u64,
    /// Frames still queued in the driver after this one.
    pub remained: u32,
}

/// Decoded frame borrowing the session's image buffer.
#[derive(Debug)]
pub struct Frame<'a> {
    pixels: &'a [u8],
    geometry: Geometry,
    metadata: FrameMetadata,
}

impl<'a> Frame<'a> {
    pub fn width(&self) -> u32 {
        self.geometry.width
    }

    pub fn height(&self) -> u32 {
        self.geometry.height
    }

    pub fn channels(&self) -> u32 {
        self.geometry.channels
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn metadata(&self) -> FrameMetadata {
        self.metadata
    }

    /// Row-major pixels, `height × width × channels`.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.pixels
    }

    pub fn row(&self, y: u32) -> Option<&'a [u8]> {
        if y >= self.geometry.height {
            return None;
        }
        let stride = self.geometry.width as usize * self.geometry.pixel_size();
        let start = y as usize * stride;
        self.pixels.get(start..start + stride)
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<&'a [u8]> {
        if x >= self.geometry.width {
            return None;
        }
        let size = self.geometry.pixel_size();
        let start = x as usize * size;
        self.row(y)?.get(start..start + size)
    }

    pub fn to_image(&self) -> Image {
        Image {
            geometry: self.geometry,
            metadata: self.metadata,
            data: self.pixels.to_vec(),
        }
    }
}

/// Owned copy of a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub geometry: Geometry,
    pub metadata: FrameMetadata,
    pub data: Vec<u8>,
}

impl Image {
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.geometry.width || y >= self.geometry.height {
            return None;
        }
        let size = self.geometry.pixel_size();
        let start = (y as usize * self.geometry.width as usize + x as usize) * size;
        self.data.get(start..start + size)
    }
}

/// Reverse the channel order of every pixel, keeping byte order within a
/// channel.
fn invert_channels(pixels: &mut [u8], geometry: &Geometry) {
    if geometry.channels < 2 {
        return;
    }
    let channel = geometry.bytes_per_channel as usize;
    for px in pixels.chunks_exact_mut(geometry.pixel_size()) {
        px.reverse();
        if channel > 1 {
            for c in px.chunks_exact_mut(channel) {
                c.reverse();
            }
        }
    }
}

/// Trigger/transfer state machine around one camera handle.
pub struct CaptureController {
    handle: CameraHandle,
    state: CaptureState,
    buffer: ImageBuffer,
    geometry: Geometry,
    poll: PollPolicy,
    image_wait: ImageWaitPolicy,
    newest_required: bool,
    cancel: CancelToken,
}

impl CaptureController {
    pub fn new(handle: CameraHandle, buffer: ImageBuffer, geometry: Geometry) -> Self {
        Self {
            handle,
            state: CaptureState::Idle,
            buffer,
            geometry,
            poll: PollPolicy::default(),
            image_wait: ImageWaitPolicy::default(),
            newest_required: true,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_image_wait(mut self, policy: ImageWaitPolicy) -> Self {
        self.image_wait = policy;
        self
    }

    pub fn with_newest_required(mut self, newest_required: bool) -> Self {
        self.newest_required = newest_required;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn set_geometry(&mut self, geometry: Geometry) {
        self.geometry = geometry;
    }

    pub fn buffer(&self) -> &ImageBuffer {
        &self.buffer
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn start_transfer<D: Driver + ?Sized>(&mut self, driver: &D, buffers: u32) -> Result<()> {
        if self.state != CaptureState::Idle {
            return Err(DsCamError::InvalidState(format!(
                "start transfer while {:?}",
                self.state
            )));
        }
        if !BUFFER_COUNT_RANGE.contains(&buffers) {
            return Err(DsCamError::InvalidArgument(format!(
                "buffer count {} outside {:?}",
                buffers, BUFFER_COUNT_RANGE
            )));
        }
        driver.command(self.handle, Command::StartFrameTransfer { buffers })?;
        self.state = CaptureState::TransferActive;
        log::info!("Frame transfer started ({} buffer(s))", buffers);
        Ok(())
    }

    pub fn stop_transfer<D: Driver + ?Sized>(&mut self, driver: &D) -> Result<()> {
        if self.state != CaptureState::TransferActive {
            return Err(DsCamError::InvalidState(format!(
                "stop transfer while {:?}",
                self.state
            )));
        }
        driver.command(self.handle, Command::StopFrameTransfer)?;
        self.state = CaptureState::Idle;
        log::info!("Frame transfer stopped");
        Ok(())
    }

    /// Trigger one frame and decode it into the image buffer.
    ///
    /// Any failure leaves the controller in `TransferActive`, ready for the
    /// next attempt.
    pub fn capture_once<D: Driver + ?Sized>(&mut self, driver: &D) -> Result<Frame<'_>> {
        if self.state != CaptureState::TransferActive {
            return Err(DsCamError::InvalidState(format!(
                "capture while {:?}",
                self.state
            )));
        }
        let result = self.trigger_and_fetch(driver);
        self.state = CaptureState::TransferActive;
        let metadata = result?;

        let len = self.geometry.frame_bytes();
        Ok(Frame {
            pixels: &self.buffer.data[..len],
            geometry: self.geometry,
            metadata,
        })
    }

    fn trigger_and_fetch<D: Driver + ?Sized>(&mut self, driver: &D) -> Result<FrameMetadata> {
        let required = self.geometry.frame_bytes();
        if self.buffer.capacity() < required {
            return Err(DsCamError::BufferTooSmall {
                used: self.buffer.capacity(),
                required,
            });
        }
        driver.command(self.handle, Command::SoftTrigger)?;
        self.state = CaptureState::TriggerArmed;
        log::trace!("Soft trigger issued");

        match wait_for_event(
            driver,
            self.handle,
            EventType::ImageReceived,
            &self.poll,
            &self.cancel,
        )? {
            WaitOutcome::Received(event) => log::trace!("Image received: {:?}", event.detail),
            WaitOutcome::TimedOut => match self.image_wait {
                ImageWaitPolicy::Proceed => log::warn!(
                    "No image-received event within {:?}, fetching anyway",
                    self.poll.timeout
                ),
                ImageWaitPolicy::Fail => {
                    return Err(DsCamError::Timeout(EventType::ImageReceived));
                }
            },
        }

        let remained = driver
            .get_image(self.handle, self.newest_required, &mut self.buffer)
            .map_err(|e| match e {
                DsCamError::Driver { code, .. } => DsCamError::ImageFetchFailed(code),
                other => other,
            })?;

        if self.buffer.used() < required {
            return Err(DsCamError::BufferTooSmall {
                used: self.buffer.used(),
                required,
            });
        }
        invert_channels(&mut self.buffer.data[..required], &self.geometry);
        self.state = CaptureState::FrameReady;

        // Advisory only: the next trigger is not gated on this event.
        match wait_for_event(
            driver,
            self.handle,
            EventType::TriggerReady,
            &self.poll,
            &self.cancel,
        ) {
            Ok(WaitOutcome::Received(_)) => {}
            Ok(WaitOutcome::TimedOut) => {
                log::warn!("No trigger-ready event within {:?}", self.poll.timeout)
            }
            Err(e) => log::warn!("Waiting for trigger-ready failed: {}", e),
        }

        Ok(FrameMetadata {
            frame_count: self.buffer.frame_count(),
            end_time: self.buffer.end_time(),
            remained,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDriver, MOCK_GEOMETRY};
    use crate::descriptor::FeatureDescriptor;
    use crate::types::{
        DeviceInfo, EventDetail, FeatureId, Format, FormatColor, FormatMode, FrameSize,
        TriggerMode,
    };
    use crate::variant::{FeatureVector, Variant};

    /// Reports a feature change on every poll, whatever was asked for.
    struct StrayEvents(MockDriver);

    impl Driver for StrayEvents {
        fn open_devices(&self) -> Result<Vec<DeviceInfo>> {
            self.0.open_devices()
        }

        fn close_devices(&self) -> Result<()> {
            self.0.close_devices()
        }

        fn open(&self, index: u32) -> Result<CameraHandle> {
            self.0.open(index)
        }

        fn close(&self, handle: CameraHandle) -> Result<()> {
            self.0.close(handle)
        }

        fn get_all_features(&self, handle: CameraHandle, features: &mut FeatureVector) -> Result<()> {
            self.0.get_all_features(handle, features)
        }

        fn set_features(&self, handle: CameraHandle, features: &mut FeatureVector) -> Result<()> {
            self.0.set_features(handle, features)
        }

        fn get_feature_desc(
            &self,
            handle: CameraHandle,
            id: FeatureId,
        ) -> Result<Option<FeatureDescriptor>> {
            self.0.get_feature_desc(handle, id)
        }

        fn frame_size(&self, handle: CameraHandle) -> Result<FrameSize> {
            self.0.frame_size(handle)
        }

        fn command(&self, handle: CameraHandle, command: Command) -> Result<()> {
            self.0.command(handle, command)
        }

        fn poll_event(&self, _handle: CameraHandle, _event_type: EventType) -> Result<Option<Event>> {
            Ok(Some(Event {
                event_type: EventType::FeatureChanged,
                tick: 1,
                detail: EventDetail::FeatureChanged {
                    feature: FeatureId::GAIN,
                },
            }))
        }

        fn get_image(
            &self,
            handle: CameraHandle,
            newest_required: bool,
            buffer: &mut ImageBuffer,
        ) -> Result<u32> {
            self.0.get_image(handle, newest_required, buffer)
        }
    }

    fn fast_poll() -> PollPolicy {
        PollPolicy {
            timeout: Duration::from_millis(50),
            interval: Duration::from_millis(1),
        }
    }

    fn controller(mock: &MockDriver) -> CaptureController {
        mock.open_devices().unwrap();
        mock.poke(
            FeatureId::TRIGGER_MODE,
            Variant::Int32(TriggerMode::Software as i32),
        );
        let handle = mock.open(0).unwrap();
        let size = mock.frame_size(handle).unwrap().frame_size;
        CaptureController::new(handle, ImageBuffer::new(size).unwrap(), MOCK_GEOMETRY)
            .with_poll_policy(fast_poll())
    }

    #[test]
    fn test_image_buffer_bounds() {
        assert!(ImageBuffer::new(0).is_err());
        assert!(ImageBuffer::new(CAM_FEA_FRAME_SIZE_MAX + 1).is_err());
        let mut buffer = ImageBuffer::new(16).unwrap();
        buffer.set_filled(100, 1, 2);
        assert_eq!(buffer.used(), 16);
    }

    #[test]
    fn test_geometry_from_format() {
        let rgb48 = FormatDescriptor {
            format: Format::new(FormatColor::RGB48, FormatMode::H1440X1024),
            width: 1440,
            height: 1024,
            bits_per_pixel: 48,
            comment: String::new(),
        };
        let g = Geometry::from_format(&rgb48);
        assert_eq!((g.channels, g.bytes_per_channel, g.pixel_size()), (3, 2, 6));
        assert_eq!(g.frame_bytes(), 1440 * 1024 * 6);

        let mono = FormatDescriptor {
            format: Format::new(FormatColor::MONO16, FormatMode::H1440X1024),
            bits_per_pixel: 16,
            ..rgb48
        };
        let g = Geometry::from_format(&mono);
        assert_eq!((g.channels, g.bytes_per_channel), (1, 2));
    }

    #[test]
    fn test_invert_channels_wide() {
        let geometry = Geometry {
            width: 1,
            height: 1,
            channels: 3,
            bytes_per_channel: 2,
        };
        let mut px = [1, 2, 3, 4, 5, 6];
        invert_channels(&mut px, &geometry);
        assert_eq!(px, [5, 6, 3, 4, 1, 2]);
    }

    #[test]
    fn test_capture_requires_transfer() {
        let mock = MockDriver::new();
        let mut capture = controller(&mock);
        assert!(matches!(
            capture.capture_once(&mock),
            Err(DsCamError::InvalidState(_))
        ));
        assert!(matches!(
            capture.stop_transfer(&mock),
            Err(DsCamError::InvalidState(_))
        ));
    }

    #[test]
    fn test_start_transfer_validates_buffer_count() {
        let mock = MockDriver::new();
        let mut capture = controller(&mock);
        assert!(matches!(
            capture.start_transfer(&mock, 0),
            Err(DsCamError::InvalidArgument(_))
        ));
        assert!(matches!(
            capture.start_transfer(&mock, 129),
            Err(DsCamError::InvalidArgument(_))
        ));
        capture.start_transfer(&mock, 128).unwrap();
        assert_eq!(capture.state(), CaptureState::TransferActive);
        assert!(capture.start_transfer(&mock, 1).is_err());
    }

    #[test]
    fn test_capture_inverts_channel_order() {
        let mock = MockDriver::new();
        let mut capture = controller(&mock);
        capture.start_transfer(&mock, 1).unwrap();

        let frame = capture.capture_once(&mock).unwrap();
        assert_eq!(
            (frame.width(), frame.height(), frame.channels()),
            (MOCK_GEOMETRY.width, MOCK_GEOMETRY.height, 3)
        );
        let raw = MockDriver::pattern_pixel(0, 0);
        let expected = [raw[2], raw[1], raw[0]];
        assert_eq!(frame.pixel(0, 0).unwrap(), &expected);

        let raw = MockDriver::pattern_pixel(MOCK_GEOMETRY.width - 1, MOCK_GEOMETRY.height - 1);
        let last = frame
            .pixel(MOCK_GEOMETRY.width - 1, MOCK_GEOMETRY.height - 1)
            .unwrap();
        assert_eq!(last, &[raw[2], raw[1], raw[0]]);
        assert!(frame.pixel(MOCK_GEOMETRY.width, 0).is_none());
        assert_eq!(frame.metadata().frame_count, 1);
    }

    #[test]
    fn test_capture_buffer_too_small() {
        let mock = MockDriver::new().with_used_size(MOCK_GEOMETRY.frame_bytes() - 1);
        let mut capture = controller(&mock);
        capture.start_transfer(&mock, 1).unwrap();
        match capture.capture_once(&mock) {
            Err(DsCamError::BufferTooSmall { used, required }) => {
                assert_eq!(used, MOCK_GEOMETRY.frame_bytes() - 1);
                assert_eq!(required, MOCK_GEOMETRY.frame_bytes());
            }
            other => panic!("expected BufferTooSmall, got {:?}", other.map(|f| f.metadata())),
        }
        assert_eq!(capture.state(), CaptureState::TransferActive);
    }

    #[test]
    fn test_geometry_larger_than_buffer_fails_before_trigger() {
        let mock = MockDriver::new();
        let mut capture = controller(&mock);
        capture.start_transfer(&mock, 1).unwrap();
        let capacity = capture.buffer().capacity();
        capture.set_geometry(Geometry::new(MOCK_GEOMETRY.width * 4, MOCK_GEOMETRY.height, 3));
        match capture.capture_once(&mock) {
            Err(DsCamError::BufferTooSmall { used, required }) => {
                assert_eq!(used, capacity);
                assert_eq!(required, MOCK_GEOMETRY.frame_bytes() * 4);
            }
            other => panic!("expected BufferTooSmall, got {:?}", other.map(|f| f.metadata())),
        }
        assert_eq!(mock.soft_triggers(), 0);
        assert_eq!(capture.state(), CaptureState::TransferActive);
    }

    #[test]
    fn test_capture_fetch_failure() {
        let mock = MockDriver::new();
        mock.fail_next_image(crate::ErrorCode::FAIL);
        let mut capture = controller(&mock);
        capture.start_transfer(&mock, 1).unwrap();
        assert!(matches!(
            capture.capture_once(&mock).map(|f| f.metadata()),
            Err(DsCamError::ImageFetchFailed(crate::ErrorCode::FAIL))
        ));
        assert_eq!(capture.state(), CaptureState::TransferActive);
        assert!(capture.capture_once(&mock).is_ok());
    }

    #[test]
    fn test_repeated_captures_reuse_buffer() {
        let mock = MockDriver::new();
        let mut capture = controller(&mock);
        capture.start_transfer(&mock, 1).unwrap();
        let identity = capture.buffer().as_ptr();

        for n in 1..=5u64 {
            let frame = capture.capture_once(&mock).unwrap();
            assert_eq!(frame.metadata().frame_count, n);
            assert_eq!(frame.as_bytes().as_ptr(), identity);
            assert_eq!(capture.state(), CaptureState::TransferActive);
        }
        assert_eq!(mock.soft_triggers(), 5);
    }

    #[test]
    fn test_missing_event_proceeds_within_timeout() {
        let mock = MockDriver::new().without_events();
        let mut capture = controller(&mock);
        capture.start_transfer(&mock, 1).unwrap();

        let started = Instant::now();
        assert!(capture.capture_once(&mock).is_ok());
        // Two waits (image received, trigger ready), each bounded by the timeout.
        assert!(started.elapsed() < fast_poll().timeout * 2 + Duration::from_millis(500));
    }

    #[test]
    fn test_missing_event_fails_when_strict() {
        let mock = MockDriver::new().without_events();
        let mut capture = controller(&mock).with_image_wait(ImageWaitPolicy::Fail);
        capture.start_transfer(&mock, 1).unwrap();
        assert!(matches!(
            capture.capture_once(&mock).map(|f| f.metadata()),
            Err(DsCamError::Timeout(EventType::ImageReceived))
        ));
        assert_eq!(capture.state(), CaptureState::TransferActive);
    }

    #[test]
    fn test_delayed_event_is_awaited() {
        let mock = MockDriver::new().with_event_delay(Duration::from_millis(10));
        let mut capture = controller(&mock).with_image_wait(ImageWaitPolicy::Fail);
        capture.start_transfer(&mock, 1).unwrap();
        assert!(capture.capture_once(&mock).is_ok());
    }

    #[test]
    fn test_wait_skips_other_event_types() {
        let mock = MockDriver::new();
        let capture = controller(&mock);
        let driver = StrayEvents(mock);
        let outcome = wait_for_event(
            &driver,
            capture.handle,
            EventType::ImageReceived,
            &fast_poll(),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(outcome, WaitOutcome::TimedOut);
    }

    #[test]
    fn test_strict_capture_ignores_other_event_types() {
        let mock = MockDriver::new();
        let mut capture = controller(&mock).with_image_wait(ImageWaitPolicy::Fail);
        let driver = StrayEvents(mock);
        capture.start_transfer(&driver, 1).unwrap();
        assert!(matches!(
            capture.capture_once(&driver).map(|f| f.metadata()),
            Err(DsCamError::Timeout(EventType::ImageReceived))
        ));
        assert_eq!(driver.0.soft_triggers(), 1);
    }

    #[test]
    fn test_cancelled_wait() {
        let mock = MockDriver::new().without_events();
        let mut capture = controller(&mock);
        let token = capture.cancel_token();
        capture.start_transfer(&mock, 1).unwrap();

        token.cancel();
        assert!(matches!(
            capture.capture_once(&mock).map(|f| f.metadata()),
            Err(DsCamError::Cancelled)
        ));
        token.reset();
        assert!(capture.capture_once(&mock).is_ok());
    }

    #[test]
    fn test_stop_transfer_returns_to_idle() {
        let mock = MockDriver::new();
        let mut capture = controller(&mock);
        capture.start_transfer(&mock, 1).unwrap();
        capture.stop_transfer(&mock).unwrap();
        assert_eq!(capture.state(), CaptureState::Idle);
        assert!(!mock.transfer_active());
    }

    #[test]
    fn test_image_copy() {
        let mock = MockDriver::new();
        let mut capture = controller(&mock);
        capture.start_transfer(&mock, 1).unwrap();
        let image = capture.capture_once(&mock).unwrap().to_image();
        let again = capture.capture_once(&mock).unwrap();
        assert_eq!(image.pixel(1, 1), again.pixel(1, 1));
        assert_eq!(image.data.len(), MOCK_GEOMETRY.frame_bytes());
    }
}
