use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use super::SendTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PropType {
    Int = 0,
    Float = 1,
    Vector = 2,
    VectorXY = 3,
    String = 4,
    Array = 5,
    Table = 6,
}

impl PropType {
    pub const COUNT: usize = 7;

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Vector => "vector",
            Self::VectorXY => "vectorxy",
            Self::String => "string",
            Self::Array => "array",
            Self::Table => "table",
        }
    }

    pub fn is_float_based(self) -> bool {
        matches!(self, Self::Float | Self::Vector | Self::VectorXY)
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct PropFlags: u32 {
        const UNSIGNED = 1 << 0;
        /// Float is a world coordinate: 14 integer bits, 5 fraction bits.
        const COORD = 1 << 1;
        /// Float is sent as raw IEEE-754 bits.
        const NO_SCALE = 1 << 2;
        const ROUND_DOWN = 1 << 3;
        const ROUND_UP = 1 << 4;
        /// Float is a unit-vector component in [-1, 1].
        const NORMAL = 1 << 5;
        /// Marker prop naming another table's prop to drop from the flattened schema.
        const EXCLUDE = 1 << 6;
        const INSIDE_ARRAY = 1 << 8;
        /// Set by the flattener on float props that address one component of a vector field.
        const VECTOR_ELEM = 1 << 9;
        const VARINT = 1 << 10;
        const COORD_MP = 1 << 12;
        const COORD_MP_LOW_PRECISION = 1 << 13;
    }
}

impl PropFlags {
    pub const FLOAT_ENCODINGS: Self = Self::COORD
        .union(Self::COORD_MP)
        .union(Self::COORD_MP_LOW_PRECISION)
        .union(Self::NORMAL)
        .union(Self::NO_SCALE);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatEncoding {
    Coord,
    CoordMp { low_precision: bool },
    Normal,
    NoScale,
    Ranged,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExcludeTarget {
    pub table: String,
    pub prop: String,
}

/// Descriptor of one networked field.
///
/// Built once at startup and shared immutably afterwards. The only interior
/// state is the one-shot flag used to report out-of-range float input.
#[derive(Debug)]
pub struct SendProp {
    name: String,
    prop_type: PropType,
    bits: u32,
    low: f32,
    high: f32,
    flags: PropFlags,
    offset: i32,
    data_table: Option<Arc<SendTable>>,
    array_element: Option<Arc<SendProp>>,
    max_elements: u32,
    exclude: Option<ExcludeTarget>,
    range_warned: AtomicBool,
}

impl SendProp {
    fn base(name: impl Into<String>, prop_type: PropType) -> Self {
        Self {
            name: name.into(),
            prop_type,
            bits: 0,
            low: 0.0,
            high: 0.0,
            flags: PropFlags::empty(),
            offset: 0,
            data_table: None,
            array_element: None,
            max_elements: 0,
            exclude: None,
            range_warned: AtomicBool::new(false),
        }
    }

    pub fn int(name: impl Into<String>, bits: u32, flags: PropFlags) -> Self {
        Self {
            bits,
            flags,
            ..Self::base(name, PropType::Int)
        }
    }

    pub fn float(name: impl Into<String>, bits: u32, low: f32, high: f32, flags: PropFlags) -> Self {
        Self::float_based(name, PropType::Float, bits, low, high, flags)
    }

    pub fn vector(name: impl Into<String>, bits: u32, low: f32, high: f32, flags: PropFlags) -> Self {
        Self::float_based(name, PropType::Vector, bits, low, high, flags)
    }

    pub fn vector_xy(
        name: impl Into<String>,
        bits: u32,
        low: f32,
        high: f32,
        flags: PropFlags,
    ) -> Self {
        Self::float_based(name, PropType::VectorXY, bits, low, high, flags)
    }

    fn float_based(
        name: impl Into<String>,
        prop_type: PropType,
        bits: u32,
        low: f32,
        high: f32,
        flags: PropFlags,
    ) -> Self {
        let mut flags = flags;
        let mut bits = bits;
        let mut low = low;
        let mut high = high;

        if (bits == 0 || bits >= 32) && !flags.intersects(PropFlags::FLOAT_ENCODINGS) {
            flags |= PropFlags::NO_SCALE;
        }
        if flags.contains(PropFlags::NO_SCALE) {
            bits = 32;
        }

        // Shift one end of the range by a step so that end encodes exactly.
        if !flags.intersects(PropFlags::FLOAT_ENCODINGS) && bits < 32 && high > low {
            let steps = ((1u64 << bits) - 1) as f32;
            let step = (high - low) / steps;
            if flags.contains(PropFlags::ROUND_DOWN) {
                high -= step;
            } else if flags.contains(PropFlags::ROUND_UP) {
                low += step;
            }
        }

        Self {
            bits,
            low,
            high,
            flags,
            ..Self::base(name, prop_type)
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::base(name, PropType::String)
    }

    /// An array of `max_elements` values described by `element`.
    pub fn array(name: impl Into<String>, element: SendProp, max_elements: u32) -> Self {
        let mut element = element;
        element.flags |= PropFlags::INSIDE_ARRAY;
        Self {
            array_element: Some(Arc::new(element)),
            max_elements,
            ..Self::base(name, PropType::Array)
        }
    }

    pub fn table(name: impl Into<String>, table: Arc<SendTable>) -> Self {
        Self {
            data_table: Some(table),
            ..Self::base(name, PropType::Table)
        }
    }

    pub fn exclude(table: impl Into<String>, prop: impl Into<String>) -> Self {
        let exclude = ExcludeTarget {
            table: table.into(),
            prop: prop.into(),
        };
        Self {
            flags: PropFlags::EXCLUDE,
            exclude: Some(exclude),
            ..Self::base("", PropType::Int)
        }
    }

    pub fn with_offset(mut self, offset: i32) -> Self {
        self.offset = offset;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prop_type(&self) -> PropType {
        self.prop_type
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn low(&self) -> f32 {
        self.low
    }

    pub fn high(&self) -> f32 {
        self.high
    }

    pub fn flags(&self) -> PropFlags {
        self.flags
    }

    pub fn offset(&self) -> i32 {
        self.offset
    }

    pub fn data_table(&self) -> Option<&Arc<SendTable>> {
        self.data_table.as_ref()
    }

    pub fn array_element(&self) -> Option<&SendProp> {
        self.array_element.as_deref()
    }

    pub fn max_elements(&self) -> u32 {
        self.max_elements
    }

    pub fn exclude_target(&self) -> Option<&ExcludeTarget> {
        self.exclude.as_ref()
    }

    pub fn is_exclude(&self) -> bool {
        self.flags.contains(PropFlags::EXCLUDE)
    }

    pub fn float_encoding(&self) -> FloatEncoding {
        let flags = self.flags;
        if flags.contains(PropFlags::COORD) {
            FloatEncoding::Coord
        } else if flags.contains(PropFlags::COORD_MP) {
            FloatEncoding::CoordMp {
                low_precision: false,
            }
        } else if flags.contains(PropFlags::COORD_MP_LOW_PRECISION) {
            FloatEncoding::CoordMp {
                low_precision: true,
            }
        } else if flags.contains(PropFlags::NORMAL) {
            FloatEncoding::Normal
        } else if flags.contains(PropFlags::NO_SCALE) {
            FloatEncoding::NoScale
        } else {
            FloatEncoding::Ranged
        }
    }

    /// Quantization step of a ranged float.
    pub fn range_step(&self) -> f32 {
        if self.bits == 0 || self.bits >= 32 {
            return 0.0;
        }
        (self.high - self.low) / ((1u64 << self.bits) - 1) as f32
    }

    pub(crate) fn warn_out_of_range<T: std::fmt::Display>(&self, value: T, low: T, high: T) {
        if !self.range_warned.swap(true, Ordering::Relaxed) {
            log::warn!(
                "prop '{}' got {} outside [{}, {}], clamping (further occurrences not reported)",
                self.name,
                value,
                low,
                high
            );
        }
    }

    pub fn range_warned(&self) -> bool {
        self.range_warned.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_width_float_is_unscaled() {
        let prop = SendProp::float("speed", 32, 0.0, 1.0, PropFlags::empty());
        assert_eq!(prop.float_encoding(), FloatEncoding::NoScale);

        let prop = SendProp::float("speed", 0, 0.0, 1.0, PropFlags::empty());
        assert_eq!(prop.bits(), 32);
        assert!(prop.flags().contains(PropFlags::NO_SCALE));
    }

    #[test]
    fn round_down_moves_high_by_one_step() {
        let prop = SendProp::float("yaw", 8, 0.0, 255.0, PropFlags::ROUND_DOWN);
        assert_eq!(prop.low(), 0.0);
        assert!((prop.high() - 254.0).abs() < 1e-4);
    }

    #[test]
    fn round_up_moves_low_by_one_step() {
        let prop = SendProp::float("yaw", 8, 0.0, 255.0, PropFlags::ROUND_UP);
        assert!((prop.low() - 1.0).abs() < 1e-4);
        assert_eq!(prop.high(), 255.0);
    }

    #[test]
    fn array_marks_element() {
        let prop = SendProp::array(
            "ammo",
            SendProp::int("ammo_element", 8, PropFlags::UNSIGNED),
            16,
        );
        let element = prop.array_element().unwrap();
        assert!(element.flags().contains(PropFlags::INSIDE_ARRAY));
        assert_eq!(prop.max_elements(), 16);
    }

    #[test]
    fn coord_takes_priority() {
        let prop = SendProp::vector("origin", 0, 0.0, 0.0, PropFlags::COORD);
        assert_eq!(prop.float_encoding(), FloatEncoding::Coord);
        assert!(!prop.flags().contains(PropFlags::NO_SCALE));
    }
}
