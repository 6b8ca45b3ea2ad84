//! Conversion between typed feature values and the driver's tagged union.
//!
//! [`Variant`] is the safe image of [`CamVariant`]: the union payload is
//! only read in [`Variant::from_raw`], after the tag has selected the member.
//! [`Value`] is what callers work with; [`encode`] and [`decode`] move between
//! the two, enforcing the fixed feature → wire type pairing.

use crate::sys::{
    self, CamArea, CamFeatureValue, CamFeatureVector, CamFormat, CamMultiExposureTime,
    CamPosition, CamSize, CamTriggerOption, CamVariant, CAM_FEA_MULTIEXPOSURETIME_MAX,
    CAM_FEA_VARIANT_MAX,
};
use crate::types::{
    Area, FeatureId, Format, FormatColor, FormatMode, MultiExposureTime, Position, Size,
    TriggerMode, TriggerOption, VariantType,
};
use crate::{DsCamError, Result};

/// Wire-level feature value, one case per union member.
#[derive(Debug, Clone, PartialEq)]
pub enum Variant {
    /// The driver's explicit "unknown" tag; carries no payload.
    Unknown,
    /// A tag outside the known set; the payload is never read.
    Unsupported(u32),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Double(f64),
    Bool(bool),
    /// Opaque driver pointer, kept as an address and never dereferenced.
    Pointer(usize),
    WString(String),
    Area(Area),
    Position(Position),
    TriggerOption(TriggerOption),
    MultiExposureTime(MultiExposureTime),
    Format(Format),
    Size(Size),
}

impl Variant {
    /// Type tag as written on the wire.
    pub fn tag(&self) -> u32 {
        match self {
            Variant::Unsupported(tag) => *tag,
            other => other.variant_type().map_or(0, VariantType::tag),
        }
    }

    /// `None` for tags outside the known set.
    pub fn variant_type(&self) -> Option<VariantType> {
        Some(match self {
            Variant::Unknown => VariantType::Unknown,
            Variant::Unsupported(_) => return None,
            Variant::Int32(_) => VariantType::Int32,
            Variant::UInt32(_) => VariantType::UInt32,
            Variant::Int64(_) => VariantType::Int64,
            Variant::UInt64(_) => VariantType::UInt64,
            Variant::Double(_) => VariantType::Double,
            Variant::Bool(_) => VariantType::Bool,
            Variant::Pointer(_) => VariantType::Pointer,
            Variant::WString(_) => VariantType::WString,
            Variant::Area(_) => VariantType::Area,
            Variant::Position(_) => VariantType::Position,
            Variant::TriggerOption(_) => VariantType::TriggerOption,
            Variant::MultiExposureTime(_) => VariantType::MultiExposureTime,
            Variant::Format(_) => VariantType::Format,
            Variant::Size(_) => VariantType::Size,
        })
    }

    fn kind(&self) -> &'static str {
        match self {
            Variant::Unknown => "unknown",
            Variant::Unsupported(_) => "unsupported",
            Variant::Int32(_) => "int32",
            Variant::UInt32(_) => "uint32",
            Variant::Int64(_) => "int64",
            Variant::UInt64(_) => "uint64",
            Variant::Double(_) => "double",
            Variant::Bool(_) => "bool",
            Variant::Pointer(_) => "pointer",
            Variant::WString(_) => "wide string",
            Variant::Area(_) => "area",
            Variant::Position(_) => "position",
            Variant::TriggerOption(_) => "trigger option",
            Variant::MultiExposureTime(_) => "multi exposure time",
            Variant::Format(_) => "format",
            Variant::Size(_) => "size",
        }
    }

    /// Read the union member selected by the tag.
    pub fn from_raw(raw: &CamVariant) -> Self {
        let Some(ty) = VariantType::from_tag(raw.var_type) else {
            return Variant::Unsupported(raw.var_type);
        };
        let v = &raw.value;
        // SAFETY: each arm reads exactly the member named by `ty`, and every
        // member is plain data valid for any bit pattern the driver writes.
        unsafe {
            match ty {
                VariantType::Unknown => Variant::Unknown,
                VariantType::Int32 => Variant::Int32(v.i32_value),
                VariantType::UInt32 => Variant::UInt32(v.u32_value),
                VariantType::Int64 => Variant::Int64(v.i64_value),
                VariantType::UInt64 => Variant::UInt64(v.u64_value),
                VariantType::Double => Variant::Double(v.f64_value),
                VariantType::Bool => Variant::Bool(v.bool_value != 0),
                VariantType::Pointer => Variant::Pointer(v.ptr_value as usize),
                VariantType::WString => Variant::WString(sys::from_wide(&v.wstr_value)),
                VariantType::Area => Variant::Area(area_from_raw(&v.area)),
                VariantType::Position => Variant::Position(position_from_raw(&v.position)),
                VariantType::TriggerOption => Variant::TriggerOption(TriggerOption {
                    frame_count: v.trigger_option.frame_count,
                    delay_time: v.trigger_option.delay_time,
                }),
                VariantType::MultiExposureTime => {
                    let m = &v.multi_exposure_time;
                    let count = (m.num as usize).min(CAM_FEA_MULTIEXPOSURETIME_MAX);
                    Variant::MultiExposureTime(MultiExposureTime {
                        times: m.exposure_time[..count].to_vec(),
                    })
                }
                VariantType::Format => Variant::Format(Format {
                    color: FormatColor(v.format.color),
                    mode: FormatMode(v.format.mode),
                }),
                VariantType::Size => Variant::Size(size_from_raw(&v.size)),
            }
        }
    }

    /// Write the tag and the matching union member into a zeroed variant.
    pub fn to_raw(&self) -> Result<CamVariant> {
        let mut raw = CamVariant::zeroed();
        raw.var_type = self.tag();
        let v = &mut raw.value;
        match self {
            Variant::Unknown | Variant::Unsupported(_) => {}
            Variant::Int32(x) => v.i32_value = *x,
            Variant::UInt32(x) => v.u32_value = *x,
            Variant::Int64(x) => v.i64_value = *x,
            Variant::UInt64(x) => v.u64_value = *x,
            Variant::Double(x) => v.f64_value = *x,
            Variant::Bool(x) => v.bool_value = u8::from(*x),
            Variant::Pointer(x) => v.ptr_value = *x as *mut std::ffi::c_void,
            Variant::WString(s) => {
                v.wstr_value = sys::to_wide_fixed::<CAM_FEA_VARIANT_MAX>(s).ok_or_else(|| {
                    DsCamError::InvalidArgument(format!(
                        "text longer than {} wide characters",
                        CAM_FEA_VARIANT_MAX - 1
                    ))
                })?;
            }
            Variant::Area(a) => v.area = area_to_raw(a),
            Variant::Position(p) => v.position = position_to_raw(p),
            Variant::TriggerOption(t) => {
                v.trigger_option = CamTriggerOption {
                    frame_count: t.frame_count,
                    delay_time: t.delay_time,
                }
            }
            Variant::MultiExposureTime(m) => {
                if m.times.len() > CAM_FEA_MULTIEXPOSURETIME_MAX {
                    return Err(DsCamError::InvalidArgument(format!(
                        "{} exposure times, at most {} allowed",
                        m.times.len(),
                        CAM_FEA_MULTIEXPOSURETIME_MAX
                    )));
                }
                let mut raw_m = CamMultiExposureTime {
                    num: m.times.len() as u32,
                    ..Default::default()
                };
                raw_m.exposure_time[..m.times.len()].copy_from_slice(&m.times);
                v.multi_exposure_time = raw_m;
            }
            // Format is a (color, mode) pair written into its own two
            // sub-fields, not a scalar.
            Variant::Format(f) => {
                v.format = CamFormat {
                    color: f.color.0,
                    mode: f.mode.0,
                }
            }
            Variant::Size(s) => v.size = size_to_raw(s),
        }
        Ok(raw)
    }

    /// Integral payloads widened for bound checks.
    pub(crate) fn as_integer(&self) -> Option<i128> {
        match *self {
            Variant::Int32(x) => Some(x.into()),
            Variant::UInt32(x) => Some(x.into()),
            Variant::Int64(x) => Some(x.into()),
            Variant::UInt64(x) => Some(x.into()),
            _ => None,
        }
    }

    pub(crate) fn as_f64(&self) -> Option<f64> {
        match *self {
            Variant::Double(x) => Some(x),
            _ => self.as_integer().map(|x| x as f64),
        }
    }
}

pub(crate) fn area_from_raw(a: &CamArea) -> Area {
    Area {
        left: a.left,
        top: a.top,
        width: a.width,
        height: a.height,
    }
}

fn area_to_raw(a: &Area) -> CamArea {
    CamArea {
        left: a.left,
        top: a.top,
        width: a.width,
        height: a.height,
    }
}

pub(crate) fn position_from_raw(p: &CamPosition) -> Position {
    Position { x: p.x, y: p.y }
}

fn position_to_raw(p: &Position) -> CamPosition {
    CamPosition { x: p.x, y: p.y }
}

pub(crate) fn size_from_raw(s: &CamSize) -> Size {
    Size {
        width: s.width,
        height: s.height,
    }
}

fn size_to_raw(s: &Size) -> CamSize {
    CamSize {
        width: s.width,
        height: s.height,
    }
}

/// Caller-facing feature value.
///
/// All integral wire types are widened to `Integer`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Double(f64),
    Bool(bool),
    /// Opaque driver handle; signals only, never dereferenced.
    Handle(usize),
    Text(String),
    Area(Area),
    Position(Position),
    Size(Size),
    TriggerOption(TriggerOption),
    MultiExposureTime(MultiExposureTime),
    Format(Format),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Double(_) => "double",
            Value::Bool(_) => "bool",
            Value::Handle(_) => "handle",
            Value::Text(_) => "text",
            Value::Area(_) => "area",
            Value::Position(_) => "position",
            Value::Size(_) => "size",
            Value::TriggerOption(_) => "trigger option",
            Value::MultiExposureTime(_) => "multi exposure time",
            Value::Format(_) => "format",
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match *self {
            Value::Integer(x) => Some(x),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Double(x) => Some(x),
            Value::Integer(x) => Some(x as f64),
            _ => None,
        }
    }

    pub fn as_format(&self) -> Option<Format> {
        match *self {
            Value::Format(f) => Some(f),
            _ => None,
        }
    }

    /// Integral view used for integer wire types; whole doubles qualify.
    fn integral(&self) -> Option<i128> {
        match *self {
            Value::Integer(x) => Some(x.into()),
            Value::Double(x) if x.is_finite() && x.fract() == 0.0 => Some(x as i128),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<TriggerMode> for Value {
    fn from(mode: TriggerMode) -> Self {
        Value::Integer(mode as i64)
    }
}

impl From<Format> for Value {
    fn from(v: Format) -> Self {
        Value::Format(v)
    }
}

impl From<Area> for Value {
    fn from(v: Area) -> Self {
        Value::Area(v)
    }
}

impl From<Position> for Value {
    fn from(v: Position) -> Self {
        Value::Position(v)
    }
}

impl From<Size> for Value {
    fn from(v: Size) -> Self {
        Value::Size(v)
    }
}

impl From<TriggerOption> for Value {
    fn from(v: TriggerOption) -> Self {
        Value::TriggerOption(v)
    }
}

impl From<MultiExposureTime> for Value {
    fn from(v: MultiExposureTime) -> Self {
        Value::MultiExposureTime(v)
    }
}

/// One feature entry: id, wire value and the driver's transaction size.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureValue {
    pub id: FeatureId,
    pub value: Variant,
    pub trans_size: u8,
}

impl FeatureValue {
    pub fn new(id: FeatureId, value: Variant) -> Self {
        Self {
            id,
            value,
            trans_size: 0,
        }
    }

    pub fn from_raw(raw: &CamFeatureValue) -> Self {
        Self {
            id: FeatureId(raw.feature_id),
            value: Variant::from_raw(&raw.variant),
            trans_size: raw.trans_size,
        }
    }

    pub fn to_raw(&self) -> Result<CamFeatureValue> {
        Ok(CamFeatureValue {
            feature_id: self.id.0,
            variant: self.value.to_raw()?,
            trans_size: self.trans_size,
        })
    }
}

/// Encode `value` as the wire type the catalogue assigns to `id`.
pub fn encode(id: FeatureId, value: &Value) -> Result<Variant> {
    encode_variant(id, id.variant_type(), value)
}

/// Encode `value` as wire type `ty`; `feature` is only used for errors.
pub fn encode_variant(feature: FeatureId, ty: VariantType, value: &Value) -> Result<Variant> {
    let mismatch = || DsCamError::TypeMismatch {
        feature,
        expected: ty,
        found: value.kind(),
    };
    let int = || value.integral().ok_or_else(mismatch);

    let variant = match (ty, value) {
        (VariantType::Unknown, _) => return Err(DsCamError::UnknownVariant),
        (VariantType::Int32, _) => Variant::Int32(i32::try_from(int()?).map_err(|_| mismatch())?),
        (VariantType::UInt32, _) => {
            Variant::UInt32(u32::try_from(int()?).map_err(|_| mismatch())?)
        }
        (VariantType::Int64, _) => Variant::Int64(i64::try_from(int()?).map_err(|_| mismatch())?),
        (VariantType::UInt64, _) => {
            Variant::UInt64(u64::try_from(int()?).map_err(|_| mismatch())?)
        }
        (VariantType::Double, Value::Double(x)) => Variant::Double(*x),
        (VariantType::Double, Value::Integer(x)) => Variant::Double(*x as f64),
        (VariantType::Bool, Value::Bool(x)) => Variant::Bool(*x),
        (VariantType::Pointer, Value::Handle(x)) => Variant::Pointer(*x),
        (VariantType::WString, Value::Text(s)) => {
            if sys::to_wide(s).len() > CAM_FEA_VARIANT_MAX {
                return Err(mismatch());
            }
            Variant::WString(s.clone())
        }
        (VariantType::Area, Value::Area(a)) => Variant::Area(*a),
        (VariantType::Position, Value::Position(p)) => Variant::Position(*p),
        (VariantType::Size, Value::Size(s)) => Variant::Size(*s),
        (VariantType::TriggerOption, Value::TriggerOption(t)) => Variant::TriggerOption(*t),
        (VariantType::MultiExposureTime, Value::MultiExposureTime(m)) => {
            if m.times.len() > CAM_FEA_MULTIEXPOSURETIME_MAX {
                return Err(mismatch());
            }
            Variant::MultiExposureTime(m.clone())
        }
        (VariantType::Format, Value::Format(f)) => Variant::Format(*f),
        _ => return Err(mismatch()),
    };
    Ok(variant)
}

/// Decode a feature entry into a caller-facing value.
pub fn decode(feature: &FeatureValue) -> Result<Value> {
    let expected = feature.id.variant_type();
    if let Some(actual) = feature.value.variant_type() {
        if expected != VariantType::Unknown && actual != VariantType::Unknown && actual != expected
        {
            return Err(DsCamError::TypeMismatch {
                feature: feature.id,
                expected,
                found: feature.value.kind(),
            });
        }
    }

    let value = match &feature.value {
        Variant::Unknown => return Err(DsCamError::UnknownVariant),
        Variant::Unsupported(tag) => return Err(DsCamError::UnsupportedVariant(*tag)),
        Variant::Int32(x) => Value::Integer((*x).into()),
        Variant::UInt32(x) => Value::Integer((*x).into()),
        Variant::Int64(x) => Value::Integer(*x),
        Variant::UInt64(x) => Value::Integer(i64::try_from(*x).map_err(|_| {
            DsCamError::TypeMismatch {
                feature: feature.id,
                expected: VariantType::UInt64,
                found: "uint64 beyond the integer range",
            }
        })?),
        Variant::Double(x) => Value::Double(*x),
        Variant::Bool(x) => Value::Bool(*x),
        Variant::Pointer(x) => Value::Handle(*x),
        Variant::WString(s) => Value::Text(s.clone()),
        Variant::Area(a) => Value::Area(*a),
        Variant::Position(p) => Value::Position(*p),
        Variant::TriggerOption(t) => Value::TriggerOption(*t),
        Variant::MultiExposureTime(m) => Value::MultiExposureTime(m.clone()),
        Variant::Format(f) => Value::Format(*f),
        Variant::Size(s) => Value::Size(*s),
    };
    Ok(value)
}

/// Capacity-bounded feature array in driver layout.
///
/// Backs the `values` pointer of the [`CamFeatureVector`] header handed to
/// the driver.
pub struct FeatureVector {
    entries: Vec<CamFeatureValue>,
    count_used: usize,
    pause_transfer: bool,
}

impl FeatureVector {
    /// Empty array with `capacity` zeroed slots for the driver to fill.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: vec![CamFeatureValue::zeroed(); capacity],
            count_used: 0,
            pause_transfer: false,
        }
    }

    /// Full array holding exactly `values`, as sent to set-features.
    pub fn from_values(values: &[FeatureValue]) -> Result<Self> {
        let entries = values
            .iter()
            .map(FeatureValue::to_raw)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            count_used: entries.len(),
            entries,
            pause_transfer: false,
        })
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.count_used
    }

    pub fn is_empty(&self) -> bool {
        self.count_used == 0
    }

    pub fn pause_transfer(&self) -> bool {
        self.pause_transfer
    }

    /// Header pointing at this array. Valid while `self` is neither moved
    /// nor mutated through another path.
    pub fn header(&mut self) -> CamFeatureVector {
        CamFeatureVector {
            count_used: self.count_used as u32,
            capacity: self.entries.len() as u32,
            pause_transfer: self.pause_transfer.into(),
            values: self.entries.as_mut_ptr(),
        }
    }

    /// Adopt the used-count and pause flag the driver wrote back.
    pub fn update_from_header(&mut self, header: &CamFeatureVector) -> Result<()> {
        let count = header.count_used as usize;
        if count > self.entries.len() {
            return Err(DsCamError::CapacityExceeded {
                count,
                capacity: self.entries.len(),
            });
        }
        self.count_used = count;
        self.pause_transfer = header.pause_transfer != 0;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.count_used = 0;
    }

    /// Append an entry; fails once the fixed capacity is reached.
    pub fn push(&mut self, value: &FeatureValue) -> Result<()> {
        if self.count_used == self.entries.len() {
            return Err(DsCamError::CapacityExceeded {
                count: self.count_used + 1,
                capacity: self.entries.len(),
            });
        }
        self.entries[self.count_used] = value.to_raw()?;
        self.count_used += 1;
        Ok(())
    }

    /// Decoded view of the used entries.
    pub fn values(&self) -> impl Iterator<Item = FeatureValue> + '_ {
        self.entries[..self.count_used]
            .iter()
            .map(FeatureValue::from_raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNCATALOGUED: FeatureId = FeatureId(500);

    fn sample_values() -> Vec<(VariantType, Value)> {
        vec![
            (VariantType::Int32, Value::Integer(-70_000)),
            (VariantType::UInt32, Value::Integer(4_000_000_000)),
            (VariantType::Int64, Value::Integer(i64::MIN)),
            (VariantType::UInt64, Value::Integer(i64::MAX)),
            (VariantType::Double, Value::Double(0.25)),
            (VariantType::Bool, Value::Bool(true)),
            (VariantType::Pointer, Value::Handle(0xdead_beef)),
            (VariantType::WString, Value::Text("Qi2 sim".into())),
            (
                VariantType::Area,
                Value::Area(Area {
                    left: 1,
                    top: 2,
                    width: 300,
                    height: 200,
                }),
            ),
            (VariantType::Position, Value::Position(Position { x: 16, y: 32 })),
            (
                VariantType::TriggerOption,
                Value::TriggerOption(TriggerOption {
                    frame_count: 3,
                    delay_time: -5,
                }),
            ),
            (
                VariantType::MultiExposureTime,
                Value::MultiExposureTime(MultiExposureTime {
                    times: vec![100, 200, 300],
                }),
            ),
            (
                VariantType::Format,
                Value::Format(Format::new(FormatColor::RGB24, FormatMode::H2880X2048)),
            ),
            (
                VariantType::Size,
                Value::Size(Size {
                    width: 1440,
                    height: 1024,
                }),
            ),
        ]
    }

    #[test]
    fn test_roundtrip_every_variant_type_through_wire() {
        let samples = sample_values();
        assert_eq!(samples.len(), VariantType::ALL.len());
        for (ty, value) in samples {
            let variant = encode_variant(UNCATALOGUED, ty, &value).unwrap();
            assert_eq!(variant.variant_type(), Some(ty));

            let raw = FeatureValue::new(UNCATALOGUED, variant).to_raw().unwrap();
            let back = FeatureValue::from_raw(&raw);
            assert_eq!(decode(&back).unwrap(), value, "round trip for {:?}", ty);
        }
    }

    #[test]
    fn test_encode_uses_catalogue_type() {
        let variant = encode(FeatureId::GAIN, &Value::Integer(100)).unwrap();
        assert_eq!(variant, Variant::Int32(100));
        let variant = encode(FeatureId::EXPOSURE_BIAS, &Value::Integer(2)).unwrap();
        assert_eq!(variant, Variant::Double(2.0));
    }

    #[test]
    fn test_encode_whole_double_into_int32() {
        let variant = encode(FeatureId::EXPOSURE_TIME, &Value::Double(70000.0)).unwrap();
        assert_eq!(variant, Variant::Int32(70000));
    }

    #[test]
    fn test_encode_rejects_fractional_for_int32() {
        let err = encode(FeatureId::GAIN, &Value::Double(1.5)).unwrap_err();
        assert!(matches!(
            err,
            DsCamError::TypeMismatch {
                feature: FeatureId::GAIN,
                expected: VariantType::Int32,
                ..
            }
        ));
    }

    #[test]
    fn test_encode_rejects_out_of_range_integer() {
        let err = encode(FeatureId::GAIN, &Value::Integer(i64::from(i32::MAX) + 1)).unwrap_err();
        assert!(matches!(err, DsCamError::TypeMismatch { .. }));
        let err =
            encode_variant(UNCATALOGUED, VariantType::UInt32, &Value::Integer(-1)).unwrap_err();
        assert!(matches!(err, DsCamError::TypeMismatch { .. }));
    }

    #[test]
    fn test_encode_rejects_aggregate_for_scalar() {
        let format = Value::Format(Format::new(FormatColor::RGB24, FormatMode::H2880X2048));
        assert!(matches!(
            encode(FeatureId::GAIN, &format).unwrap_err(),
            DsCamError::TypeMismatch { .. }
        ));
        let size = Value::Size(Size {
            width: 1,
            height: 1,
        });
        assert!(matches!(
            encode(FeatureId::EXPOSURE_TIME, &size).unwrap_err(),
            DsCamError::TypeMismatch { .. }
        ));
    }

    #[test]
    fn test_encode_rejects_scalar_for_format() {
        let err = encode(FeatureId::FORMAT, &Value::Integer(1)).unwrap_err();
        assert!(matches!(
            err,
            DsCamError::TypeMismatch {
                expected: VariantType::Format,
                ..
            }
        ));
    }

    #[test]
    fn test_encode_unknown_feature() {
        let err = encode(FeatureId(999), &Value::Integer(1)).unwrap_err();
        assert!(matches!(err, DsCamError::UnknownVariant));
    }

    #[test]
    fn test_encode_bounds_text_and_exposures() {
        let long = "x".repeat(CAM_FEA_VARIANT_MAX);
        assert!(encode_variant(UNCATALOGUED, VariantType::WString, &Value::Text(long)).is_err());
        let fits = "x".repeat(CAM_FEA_VARIANT_MAX - 1);
        assert!(encode_variant(UNCATALOGUED, VariantType::WString, &Value::Text(fits)).is_ok());

        let too_many = MultiExposureTime {
            times: vec![1; CAM_FEA_MULTIEXPOSURETIME_MAX + 1],
        };
        assert!(encode(FeatureId::MULTI_EXPOSURE_TIME, &too_many.into()).is_err());
    }

    #[test]
    fn test_format_written_to_sub_fields() {
        let format = Format::new(FormatColor::MONO16, FormatMode::H1440X1024);
        let raw = encode(FeatureId::FORMAT, &format.into())
            .unwrap()
            .to_raw()
            .unwrap();
        assert_eq!(raw.var_type, VariantType::Format.tag());
        let sub = unsafe { raw.value.format };
        assert_eq!(sub.color, FormatColor::MONO16.0);
        assert_eq!(sub.mode, FormatMode::H1440X1024.0);
    }

    #[test]
    fn test_decode_unknown_and_unsupported_tags() {
        let mut raw = CamVariant::zeroed();
        assert_eq!(Variant::from_raw(&raw), Variant::Unknown);
        let unknown = FeatureValue::new(UNCATALOGUED, Variant::from_raw(&raw));
        assert!(matches!(decode(&unknown), Err(DsCamError::UnknownVariant)));

        raw.var_type = 42;
        let unsupported = FeatureValue::new(UNCATALOGUED, Variant::from_raw(&raw));
        assert!(matches!(
            decode(&unsupported),
            Err(DsCamError::UnsupportedVariant(42))
        ));
    }

    #[test]
    fn test_decode_rejects_tag_not_matching_catalogue() {
        let wrong = FeatureValue::new(FeatureId::GAIN, Variant::Bool(true));
        assert!(matches!(
            decode(&wrong),
            Err(DsCamError::TypeMismatch {
                feature: FeatureId::GAIN,
                ..
            })
        ));
    }

    #[test]
    fn test_decode_multi_exposure_respects_count() {
        let mut raw = CamVariant::zeroed();
        raw.var_type = VariantType::MultiExposureTime.tag();
        let mut m = CamMultiExposureTime {
            num: 2,
            ..Default::default()
        };
        m.exposure_time = [9; CAM_FEA_MULTIEXPOSURETIME_MAX];
        m.exposure_time[0] = 10;
        m.exposure_time[1] = 20;
        raw.value.multi_exposure_time = m;

        let value = decode(&FeatureValue::new(
            FeatureId::MULTI_EXPOSURE_TIME,
            Variant::from_raw(&raw),
        ))
        .unwrap();
        assert_eq!(
            value,
            Value::MultiExposureTime(MultiExposureTime {
                times: vec![10, 20]
            })
        );
    }

    #[test]
    fn test_bool_byte_any_non_zero_is_true() {
        let mut raw = CamVariant::zeroed();
        raw.var_type = VariantType::Bool.tag();
        assert_eq!(Variant::from_raw(&raw), Variant::Bool(false));
        raw.value.bool_value = 2;
        assert_eq!(Variant::from_raw(&raw), Variant::Bool(true));

        let written = Variant::Bool(true).to_raw().unwrap();
        assert_eq!(unsafe { written.value.bool_value }, 1);
    }

    #[test]
    fn test_decode_uint64_beyond_i64() {
        let big = FeatureValue::new(UNCATALOGUED, Variant::UInt64(u64::MAX));
        assert!(matches!(decode(&big), Err(DsCamError::TypeMismatch { .. })));
    }

    #[test]
    fn test_feature_vector_capacity() {
        let mut vector = FeatureVector::with_capacity(2);
        let entry = FeatureValue::new(FeatureId::GAIN, Variant::Int32(1));
        vector.push(&entry).unwrap();
        vector.push(&entry).unwrap();
        assert!(matches!(
            vector.push(&entry),
            Err(DsCamError::CapacityExceeded {
                count: 3,
                capacity: 2
            })
        ));
        assert_eq!(vector.values().count(), 2);
    }

    #[test]
    fn test_feature_vector_header_roundtrip() {
        let values = [
            FeatureValue::new(FeatureId::GAIN, Variant::Int32(7)),
            FeatureValue::new(FeatureId::EXPOSURE_TIME, Variant::Int32(1000)),
        ];
        let mut vector = FeatureVector::from_values(&values).unwrap();
        let mut header = vector.header();
        assert_eq!(header.count_used, 2);
        assert_eq!(header.capacity, 2);
        assert!(!header.values.is_null());

        header.count_used = 1;
        vector.update_from_header(&header).unwrap();
        assert_eq!(vector.values().collect::<Vec<_>>(), values[..1].to_vec());

        header.count_used = 3;
        assert!(vector.update_from_header(&header).is_err());
    }
}
