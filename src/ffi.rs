//! C FFI layer for dscam.
//!
//! Opaque handle-based API for C/C++ consumers. The generated C header is
//! written to `include/dscam.h` by cbindgen.

use std::ffi::{c_char, c_int, CStr};

use crate::config::SessionConfig;
use crate::driver::DriverContext;
use crate::error::LastError;
use crate::library::DsCamLibrary;
use crate::session::Session;
use crate::types::FeatureId;
use crate::DsCamError;

static LAST_ERROR: LastError = LastError::new();

/// Opaque handle to the loaded driver and its enumerated devices.
pub struct DsDriver(DriverContext<DsCamLibrary>);

/// Opaque handle to one open camera.
pub struct DsSession(Session<DsCamLibrary>);

/// Pixel layout of frames returned by `dscam_get_image`.
#[repr(C)]
#[derive(Debug, Default)]
pub struct DsGeometry {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub bytes_per_channel: u32,
}

/// Per-frame information in C-compatible layout.
#[repr(C)]
#[derive(Debug, Default)]
pub struct DsFrameInfo {
    pub geometry: DsGeometry,
    pub frame_count: u64,
    /// Driver timestamp at end of exposure.
    pub end_time: u64,
    /// Frames still queued in the driver.
    pub remained: u32,
    /// Bytes copied into the caller's buffer.
    pub bytes: usize,
}

fn fail(err: &DsCamError) -> c_int {
    LAST_ERROR.set(err);
    -1
}

/// Load the DsCam driver and enumerate devices.
///
/// `path` may be null to use `DSCAM_SDK_PATH` or the platform default.
/// Returns NULL on error (check `dscam_last_error()`).
///
/// # Safety
/// `path` must be a valid NUL-terminated string, or null.
#[no_mangle]
pub unsafe extern "C" fn dscam_driver_open(path: *const c_char) -> *mut DsDriver {
    let library = if path.is_null() {
        DsCamLibrary::load_default()
    } else {
        match CStr::from_ptr(path).to_str() {
            Ok(p) => DsCamLibrary::load(p),
            Err(_) => {
                LAST_ERROR.set_message("driver path is not valid UTF-8");
                return std::ptr::null_mut();
            }
        }
    };
    match library.and_then(DriverContext::open) {
        Ok(ctx) => {
            LAST_ERROR.clear();
            Box::into_raw(Box::new(DsDriver(ctx)))
        }
        Err(e) => {
            LAST_ERROR.set(&e);
            std::ptr::null_mut()
        }
    }
}

/// Release the driver handle. Devices are closed once every session
/// opened from it is closed too.
///
/// # Safety
/// `drv` must be a pointer returned by `dscam_driver_open`, or null.
#[no_mangle]
pub unsafe extern "C" fn dscam_driver_close(drv: *mut DsDriver) {
    if !drv.is_null() {
        drop(Box::from_raw(drv));
    }
}

/// Number of connected cameras, or -1 if `drv` is null.
///
/// # Safety
/// `drv` must be a valid driver pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn dscam_device_count(drv: *const DsDriver) -> c_int {
    if drv.is_null() {
        return -1;
    }
    (*drv).0.device_count() as c_int
}

/// Open camera `index`. Returns NULL on error.
///
/// # Safety
/// `drv` must be a valid driver pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn dscam_open(
    drv: *const DsDriver,
    index: u32,
    apply_defaults: bool,
) -> *mut DsSession {
    if drv.is_null() {
        LAST_ERROR.set_message("driver handle is null");
        return std::ptr::null_mut();
    }
    let config = SessionConfig::from_env().with_apply_defaults(apply_defaults);
    match Session::open(&(*drv).0, index, config) {
        Ok(session) => Box::into_raw(Box::new(DsSession(session))),
        Err(e) => {
            LAST_ERROR.set(&e);
            std::ptr::null_mut()
        }
    }
}

/// Stop transfer, release the trigger and close the camera.
///
/// # Safety
/// `sess` must be a pointer returned by `dscam_open`, or null.
#[no_mangle]
pub unsafe extern "C" fn dscam_close(sess: *mut DsSession) {
    if !sess.is_null() {
        Box::from_raw(sess).0.close();
    }
}

/// Read an integer-valued feature from the cache. Returns 0 on success.
///
/// # Safety
/// `sess` and `out` must be valid pointers, or null.
#[no_mangle]
pub unsafe extern "C" fn dscam_get_i64(sess: *const DsSession, feature: u32, out: *mut i64) -> c_int {
    if sess.is_null() || out.is_null() {
        return -1;
    }
    match (*sess).0.get_integer(FeatureId(feature)) {
        Ok(v) => {
            out.write(v);
            0
        }
        Err(e) => fail(&e),
    }
}

/// Write an integer-valued feature. Returns 0 on success.
///
/// # Safety
/// `sess` must be a valid session pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn dscam_set_i64(sess: *mut DsSession, feature: u32, value: i64) -> c_int {
    if sess.is_null() {
        return -1;
    }
    match (*sess).0.set(FeatureId(feature), value) {
        Ok(_) => 0,
        Err(e) => fail(&e),
    }
}

/// Read a numeric feature as a double. Returns 0 on success.
///
/// # Safety
/// `sess` and `out` must be valid pointers, or null.
#[no_mangle]
pub unsafe extern "C" fn dscam_get_f64(sess: *const DsSession, feature: u32, out: *mut f64) -> c_int {
    if sess.is_null() || out.is_null() {
        return -1;
    }
    let id = FeatureId(feature);
    let value = match (*sess).0.get(id) {
        Ok(v) => v,
        Err(e) => return fail(&e),
    };
    match value.as_f64() {
        Some(v) => {
            out.write(v);
            0
        }
        None => fail(&DsCamError::TypeMismatch {
            feature: id,
            expected: id.variant_type(),
            found: value.kind(),
        }),
    }
}

/// Write a double-valued feature. Returns 0 on success.
///
/// # Safety
/// `sess` must be a valid session pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn dscam_set_f64(sess: *mut DsSession, feature: u32, value: f64) -> c_int {
    if sess.is_null() {
        return -1;
    }
    match (*sess).0.set(FeatureId(feature), value) {
        Ok(_) => 0,
        Err(e) => fail(&e),
    }
}

/// Current frame geometry. Returns 0 on success.
///
/// # Safety
/// `sess` and `out` must be valid pointers, or null.
#[no_mangle]
pub unsafe extern "C" fn dscam_geometry(sess: *const DsSession, out: *mut DsGeometry) -> c_int {
    if sess.is_null() || out.is_null() {
        return -1;
    }
    let g = (*sess).0.geometry();
    out.write(DsGeometry {
        width: g.width,
        height: g.height,
        channels: g.channels,
        bytes_per_channel: g.bytes_per_channel,
    });
    0
}

/// Trigger one frame and copy its pixels into `buf`.
///
/// `buf` must hold at least width × height × channels × bytes_per_channel
/// bytes (see `dscam_geometry`). `info` may be null.
/// Returns 0 on success, -1 on error.
///
/// # Safety
/// `sess` must be a valid session pointer, or null. `buf` must point to
/// `len` writable bytes. `info` must be valid for writes, or null.
#[no_mangle]
pub unsafe extern "C" fn dscam_get_image(
    sess: *mut DsSession,
    buf: *mut u8,
    len: usize,
    info: *mut DsFrameInfo,
) -> c_int {
    if sess.is_null() || buf.is_null() {
        return -1;
    }
    let frame = match (*sess).0.get_image() {
        Ok(frame) => frame,
        Err(e) => return fail(&e),
    };
    let pixels = frame.as_bytes();
    if pixels.len() > len {
        return fail(&DsCamError::BufferTooSmall {
            used: len,
            required: pixels.len(),
        });
    }
    std::ptr::copy_nonoverlapping(pixels.as_ptr(), buf, pixels.len());
    if !info.is_null() {
        let g = frame.geometry();
        let meta = frame.metadata();
        info.write(DsFrameInfo {
            geometry: DsGeometry {
                width: g.width,
                height: g.height,
                channels: g.channels,
                bytes_per_channel: g.bytes_per_channel,
            },
            frame_count: meta.frame_count,
            end_time: meta.end_time,
            remained: meta.remained,
            bytes: pixels.len(),
        });
    }
    0
}

/// Get the last error message. Returns NULL if no error.
/// The returned pointer is valid until the next dscam API call.
#[no_mangle]
pub extern "C" fn dscam_last_error() -> *const c_char {
    LAST_ERROR.as_ptr()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    #[test]
    fn test_null_handles() {
        unsafe {
            assert_eq!(dscam_device_count(std::ptr::null()), -1);
            assert!(dscam_open(std::ptr::null(), 0, true).is_null());
            let mut v = 0i64;
            assert_eq!(dscam_get_i64(std::ptr::null(), 0, &mut v), -1);
            assert_eq!(dscam_set_i64(std::ptr::null_mut(), 0, 1), -1);
            let mut f = 0.0;
            assert_eq!(dscam_get_f64(std::ptr::null(), 0, &mut f), -1);
            assert_eq!(dscam_set_f64(std::ptr::null_mut(), 0, 1.0), -1);
            let mut g = DsGeometry::default();
            assert_eq!(dscam_geometry(std::ptr::null(), &mut g), -1);
            let mut buf = [0u8; 4];
            assert_eq!(
                dscam_get_image(std::ptr::null_mut(), buf.as_mut_ptr(), 4, std::ptr::null_mut()),
                -1
            );
            dscam_close(std::ptr::null_mut());
            dscam_driver_close(std::ptr::null_mut());
        }
    }

    #[test]
    fn test_driver_open_failure_sets_last_error() {
        let path = CString::new("/nonexistent/libDsCam.so").unwrap();
        let drv = unsafe { dscam_driver_open(path.as_ptr()) };
        assert!(drv.is_null());
        let msg = dscam_last_error();
        assert!(!msg.is_null());
        let text = unsafe { CStr::from_ptr(msg) }.to_str().unwrap();
        assert!(!text.is_empty());
    }
}
