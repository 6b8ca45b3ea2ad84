//! Device-reported bounds for feature values.

use crate::sys::{
    self, CamFeatureDesc, CamFeatureDescElement, CamFeatureDescFormat, CamFeatureDescRange,
    CAM_FEA_DESC_LIST_MAX, EDESC_AREA, EDESC_ELEMENT_LIST, EDESC_FORMAT_LIST, EDESC_POSITION,
    EDESC_RANGE, EDESC_SIZE, EDESC_TRIGGER_OPTION,
};
use crate::types::{Area, FeatureId, Format, FormatColor, FormatMode, Position, Size};
use crate::variant::{area_from_raw, position_from_raw, size_from_raw, Variant};

/// Legal value space of one feature.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureDescriptor {
    pub id: FeatureId,
    pub bounds: DescriptorBounds,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DescriptorBounds {
    ElementList(Vec<Element>),
    Range(RangeDescriptor),
    Area(Bounds<Area>),
    Position(Bounds<Position>),
    Size(Bounds<Size>),
    TriggerOption {
        frame_count: RangeDescriptor,
        delay_time: RangeDescriptor,
    },
    FormatList(Vec<FormatDescriptor>),
}

/// One allowed value of an element list.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub value: Variant,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RangeDescriptor {
    pub min: Variant,
    pub max: Variant,
    pub resolution: Variant,
    pub default: Variant,
}

/// Per-component bounds of an aggregate value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds<T> {
    pub min: T,
    pub max: T,
    pub resolution: T,
    pub default: T,
}

/// One selectable image format and its geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatDescriptor {
    pub format: Format,
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u32,
    pub comment: String,
}

impl FormatDescriptor {
    /// Bytes per pixel, at least one.
    pub fn bytes_per_pixel(&self) -> u32 {
        (self.bits_per_pixel / 8).max(1)
    }
}

impl RangeDescriptor {
    /// Inclusive bounds; resolution is enforced when it is meaningful
    /// (integers above 1, floats above 0).
    pub fn contains(&self, value: &Variant) -> bool {
        if let (Some(v), Some(min), Some(max)) = (
            value.as_integer(),
            self.min.as_integer(),
            self.max.as_integer(),
        ) {
            if v < min || v > max {
                return false;
            }
            return match self.resolution.as_integer() {
                Some(res) if res > 1 => (v - min) % res == 0,
                _ => true,
            };
        }

        let (Some(v), Some(min), Some(max)) =
            (value.as_f64(), self.min.as_f64(), self.max.as_f64())
        else {
            return false;
        };
        if v < min || v > max {
            return false;
        }
        match self.resolution.as_f64() {
            Some(res) if res > 0.0 => {
                let steps = (v - min) / res;
                (steps - steps.round()).abs() < 1e-6
            }
            _ => true,
        }
    }
}

/// Numeric components compared against [`Bounds`].
pub trait Components: Copy {
    fn components(&self) -> Vec<u32>;
}

impl Components for Area {
    fn components(&self) -> Vec<u32> {
        vec![self.left, self.top, self.width, self.height]
    }
}

impl Components for Position {
    fn components(&self) -> Vec<u32> {
        vec![self.x, self.y]
    }
}

impl Components for Size {
    fn components(&self) -> Vec<u32> {
        vec![self.width, self.height]
    }
}

impl<T: Components> Bounds<T> {
    pub fn contains(&self, value: &T) -> bool {
        let min = self.min.components();
        let max = self.max.components();
        value
            .components()
            .iter()
            .zip(min.iter().zip(&max))
            .all(|(v, (lo, hi))| lo <= v && v <= hi)
    }
}

impl FeatureDescriptor {
    /// Whether `value` lies in the device-reported value space. A value of
    /// the wrong shape for this descriptor is never valid.
    pub fn validate(&self, value: &Variant) -> bool {
        match (&self.bounds, value) {
            (DescriptorBounds::ElementList(elements), v) => elements.iter().any(|e| {
                e.value == *v || (v.as_integer().is_some() && e.value.as_integer() == v.as_integer())
            }),
            (DescriptorBounds::Range(range), v) => range.contains(v),
            (DescriptorBounds::Area(bounds), Variant::Area(a)) => bounds.contains(a),
            (DescriptorBounds::Position(bounds), Variant::Position(p)) => bounds.contains(p),
            (DescriptorBounds::Size(bounds), Variant::Size(s)) => bounds.contains(s),
            (
                DescriptorBounds::TriggerOption {
                    frame_count,
                    delay_time,
                },
                Variant::TriggerOption(t),
            ) => {
                frame_count.contains(&Variant::UInt32(t.frame_count))
                    && delay_time.contains(&Variant::Int32(t.delay_time))
            }
            (DescriptorBounds::FormatList(formats), Variant::Format(f)) => {
                formats.iter().any(|d| d.format == *f)
            }
            _ => false,
        }
    }

    /// Format-list entry describing `format`, if this is a format list.
    pub fn format(&self, format: Format) -> Option<&FormatDescriptor> {
        match &self.bounds {
            DescriptorBounds::FormatList(formats) => formats.iter().find(|d| d.format == format),
            _ => None,
        }
    }

    /// Decode the driver's descriptor. `None` for an unknown descriptor kind.
    pub fn from_raw(raw: &CamFeatureDesc) -> Option<Self> {
        let count = (raw.list_count as usize).min(CAM_FEA_DESC_LIST_MAX);
        let d = &raw.desc;
        // SAFETY: `desc_type` selects the union member, and each member is
        // plain data valid for any bit pattern.
        let bounds = unsafe {
            match raw.desc_type {
                EDESC_ELEMENT_LIST => DescriptorBounds::ElementList(
                    d.element_list[..count].iter().map(element_from_raw).collect(),
                ),
                EDESC_RANGE => DescriptorBounds::Range(range_from_raw(&d.range)),
                EDESC_AREA => DescriptorBounds::Area(Bounds {
                    min: area_from_raw(&d.area.min),
                    max: area_from_raw(&d.area.max),
                    resolution: area_from_raw(&d.area.res),
                    default: area_from_raw(&d.area.def),
                }),
                EDESC_POSITION => DescriptorBounds::Position(Bounds {
                    min: position_from_raw(&d.position.min),
                    max: position_from_raw(&d.position.max),
                    resolution: position_from_raw(&d.position.res),
                    default: position_from_raw(&d.position.def),
                }),
                EDESC_SIZE => DescriptorBounds::Size(Bounds {
                    min: size_from_raw(&d.size.min),
                    max: size_from_raw(&d.size.max),
                    resolution: size_from_raw(&d.size.res),
                    default: size_from_raw(&d.size.def),
                }),
                EDESC_TRIGGER_OPTION => DescriptorBounds::TriggerOption {
                    frame_count: range_from_raw(&d.trigger_option.range_frame_count),
                    delay_time: range_from_raw(&d.trigger_option.range_delay_time),
                },
                EDESC_FORMAT_LIST => DescriptorBounds::FormatList(
                    d.format_list[..count].iter().map(format_from_raw).collect(),
                ),
                other => {
                    log::debug!(
                        "Feature {} has unknown descriptor kind {}",
                        FeatureId(raw.feature_id),
                        other
                    );
                    return None;
                }
            }
        };
        Some(Self {
            id: FeatureId(raw.feature_id),
            bounds,
        })
    }
}

/// Free-function form of [`FeatureDescriptor::validate`].
pub fn validate(descriptor: &FeatureDescriptor, value: &Variant) -> bool {
    descriptor.validate(value)
}

fn element_from_raw(e: &CamFeatureDescElement) -> Element {
    Element {
        value: Variant::from_raw(&e.value),
        comment: sys::from_wide(&e.comment),
    }
}

fn range_from_raw(r: &CamFeatureDescRange) -> RangeDescriptor {
    RangeDescriptor {
        min: Variant::from_raw(&r.min),
        max: Variant::from_raw(&r.max),
        resolution: Variant::from_raw(&r.res),
        default: Variant::from_raw(&r.def),
    }
}

fn format_from_raw(f: &CamFeatureDescFormat) -> FormatDescriptor {
    FormatDescriptor {
        format: Format::new(FormatColor(f.format.color), FormatMode(f.format.mode)),
        width: f.image_width,
        height: f.image_height,
        bits_per_pixel: f.bit_per_pixel,
        comment: sys::from_wide(&f.comment),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys::{CamFormat, CamVariant};
    use crate::types::{TriggerOption, VariantType};

    fn int_range(min: i32, max: i32, res: i32) -> RangeDescriptor {
        RangeDescriptor {
            min: Variant::Int32(min),
            max: Variant::Int32(max),
            resolution: Variant::Int32(res),
            default: Variant::Int32(min),
        }
    }

    fn range_desc(min: i32, max: i32, res: i32) -> FeatureDescriptor {
        FeatureDescriptor {
            id: FeatureId::GAIN,
            bounds: DescriptorBounds::Range(int_range(min, max, res)),
        }
    }

    #[test]
    fn test_range_inclusive_bounds() {
        let desc = range_desc(-100, 100, 1);
        assert!(desc.validate(&Variant::Int32(-100)));
        assert!(desc.validate(&Variant::Int32(100)));
        assert!(desc.validate(&Variant::Int32(0)));
        assert!(!desc.validate(&Variant::Int32(-101)));
        assert!(!desc.validate(&Variant::Int32(101)));
    }

    #[test]
    fn test_range_resolution_alignment() {
        let desc = range_desc(10, 100, 5);
        assert!(desc.validate(&Variant::Int32(10)));
        assert!(desc.validate(&Variant::Int32(15)));
        assert!(desc.validate(&Variant::Int32(100)));
        assert!(!desc.validate(&Variant::Int32(12)));
    }

    #[test]
    fn test_range_zero_resolution_ignored() {
        let desc = range_desc(0, 10, 0);
        assert!(desc.validate(&Variant::Int32(7)));
    }

    #[test]
    fn test_range_mixed_integer_widths() {
        let desc = range_desc(0, 1000, 1);
        assert!(desc.validate(&Variant::UInt32(1000)));
        assert!(!desc.validate(&Variant::Int64(1001)));
    }

    #[test]
    fn test_range_double() {
        let desc = FeatureDescriptor {
            id: FeatureId::EXPOSURE_BIAS,
            bounds: DescriptorBounds::Range(RangeDescriptor {
                min: Variant::Double(-2.0),
                max: Variant::Double(2.0),
                resolution: Variant::Double(0.5),
                default: Variant::Double(0.0),
            }),
        };
        assert!(desc.validate(&Variant::Double(1.5)));
        assert!(desc.validate(&Variant::Double(-2.0)));
        assert!(!desc.validate(&Variant::Double(1.25)));
        assert!(!desc.validate(&Variant::Double(2.5)));
        assert!(!desc.validate(&Variant::Bool(true)));
    }

    #[test]
    fn test_element_list() {
        let desc = FeatureDescriptor {
            id: FeatureId::TRIGGER_MODE,
            bounds: DescriptorBounds::ElementList(vec![
                Element {
                    value: Variant::Int32(0),
                    comment: "Off".into(),
                },
                Element {
                    value: Variant::Int32(2),
                    comment: "Soft".into(),
                },
            ]),
        };
        assert!(desc.validate(&Variant::Int32(2)));
        assert!(desc.validate(&Variant::Int64(0)));
        assert!(!desc.validate(&Variant::Int32(1)));
    }

    #[test]
    fn test_size_bounds_per_component() {
        let desc = FeatureDescriptor {
            id: FeatureId::ROI_SIZE,
            bounds: DescriptorBounds::Size(Bounds {
                min: Size {
                    width: 16,
                    height: 16,
                },
                max: Size {
                    width: 1440,
                    height: 1024,
                },
                resolution: Size {
                    width: 1,
                    height: 1,
                },
                default: Size {
                    width: 1440,
                    height: 1024,
                },
            }),
        };
        let ok = Size {
            width: 640,
            height: 480,
        };
        let too_tall = Size {
            width: 640,
            height: 2000,
        };
        assert!(desc.validate(&Variant::Size(ok)));
        assert!(!desc.validate(&Variant::Size(too_tall)));
        assert!(!desc.validate(&Variant::Position(Position { x: 0, y: 0 })));
    }

    #[test]
    fn test_trigger_option_both_ranges() {
        let desc = FeatureDescriptor {
            id: FeatureId::TRIGGER_OPTION,
            bounds: DescriptorBounds::TriggerOption {
                frame_count: int_range(1, 10, 1),
                delay_time: int_range(-50, 50, 1),
            },
        };
        let option = |frame_count, delay_time| {
            Variant::TriggerOption(TriggerOption {
                frame_count,
                delay_time,
            })
        };
        assert!(desc.validate(&option(5, -50)));
        assert!(!desc.validate(&option(11, 0)));
        assert!(!desc.validate(&option(5, 51)));
    }

    #[test]
    fn test_decode_range_descriptor() {
        let mut raw = CamFeatureDesc::new_boxed();
        raw.feature_id = FeatureId::GAIN.0;
        raw.desc_type = EDESC_RANGE;
        let int = |v: i32| {
            let mut var = CamVariant::zeroed();
            var.var_type = VariantType::Int32.tag();
            var.value.i32_value = v;
            var
        };
        raw.desc.range = CamFeatureDescRange {
            min: int(0),
            max: int(400),
            res: int(2),
            def: int(100),
        };

        let desc = FeatureDescriptor::from_raw(&raw).unwrap();
        assert_eq!(desc.id, FeatureId::GAIN);
        assert_eq!(desc.bounds, DescriptorBounds::Range(RangeDescriptor {
            min: Variant::Int32(0),
            max: Variant::Int32(400),
            resolution: Variant::Int32(2),
            default: Variant::Int32(100),
        }));
        assert!(!desc.validate(&Variant::Int32(101)));
    }

    #[test]
    fn test_decode_format_list_clamps_count() {
        let mut raw = CamFeatureDesc::new_boxed();
        raw.feature_id = FeatureId::FORMAT.0;
        raw.desc_type = EDESC_FORMAT_LIST;
        raw.list_count = 2;
        unsafe {
            raw.desc.format_list[0].format = CamFormat { color: 1, mode: 1 };
            raw.desc.format_list[0].image_width = 2880;
            raw.desc.format_list[0].image_height = 2048;
            raw.desc.format_list[0].bit_per_pixel = 24;
            raw.desc.format_list[0].comment = sys::to_wide_fixed("RGB 2880x2048").unwrap();
            raw.desc.format_list[1].format = CamFormat { color: 3, mode: 3 };
            raw.desc.format_list[1].image_width = 1440;
            raw.desc.format_list[1].image_height = 1024;
            raw.desc.format_list[1].bit_per_pixel = 16;
        }

        let desc = FeatureDescriptor::from_raw(&raw).unwrap();
        let rgb = desc
            .format(Format::new(FormatColor::RGB24, FormatMode::H2880X2048))
            .unwrap();
        assert_eq!((rgb.width, rgb.height, rgb.bytes_per_pixel()), (2880, 2048, 3));
        assert_eq!(rgb.comment, "RGB 2880x2048");
        assert!(desc.validate(&Variant::Format(Format::new(
            FormatColor::MONO16,
            FormatMode::H1440X1024
        ))));
        assert!(!desc.validate(&Variant::Format(Format::new(
            FormatColor::RGB48,
            FormatMode::H2880X2048
        ))));

        raw.list_count = u32::MAX;
        let DescriptorBounds::FormatList(all) = FeatureDescriptor::from_raw(&raw).unwrap().bounds
        else {
            panic!("expected a format list");
        };
        assert_eq!(all.len(), CAM_FEA_DESC_LIST_MAX);
    }

    #[test]
    fn test_decode_unknown_kind() {
        let mut raw = CamFeatureDesc::new_boxed();
        raw.desc_type = 99;
        assert!(FeatureDescriptor::from_raw(&raw).is_none());
    }
}
