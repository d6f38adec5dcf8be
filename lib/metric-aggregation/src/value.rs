use std::fmt;

/// A value passed to the object-tracking path of an aggregator.
///
/// Instrumentation call sites do not always have a plain `f64` on hand: they may hold a small integer, a string pulled
/// out of a header, or nothing at all. `TrackedValue` carries those inputs as-is so that each aggregator can decide
/// how (and whether) to interpret them.
///
/// Values in the numeric family (every integer and floating-point variant) are "numeric-compatible": they can be
/// coerced to an `f64` via [`as_number`][Self::as_number]. All other variants are not.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TrackedValue<'a> {
    /// No value.
    Null,

    /// A boolean.
    Bool(bool),

    /// A single character.
    Char(char),

    /// A signed 8-bit integer.
    I8(i8),

    /// A signed 16-bit integer.
    I16(i16),

    /// A signed 32-bit integer.
    I32(i32),

    /// A signed 64-bit integer.
    I64(i64),

    /// An unsigned 8-bit integer.
    U8(u8),

    /// An unsigned 16-bit integer.
    U16(u16),

    /// An unsigned 32-bit integer.
    U32(u32),

    /// An unsigned 64-bit integer.
    U64(u64),

    /// A pointer-sized signed integer.
    Isize(isize),

    /// A pointer-sized unsigned integer.
    Usize(usize),

    /// A 32-bit float.
    F32(f32),

    /// A 64-bit float.
    F64(f64),

    /// A string.
    Str(&'a str),
}

impl TrackedValue<'_> {
    /// Returns the value coerced to an `f64`, if it is numeric-compatible.
    ///
    /// Strings are never coerced here, even when they contain a number: parsing is left to the aggregator.
    pub fn as_number(&self) -> Option<f64> {
        match *self {
            Self::I8(v) => Some(f64::from(v)),
            Self::I16(v) => Some(f64::from(v)),
            Self::I32(v) => Some(f64::from(v)),
            Self::I64(v) => Some(v as f64),
            Self::U8(v) => Some(f64::from(v)),
            Self::U16(v) => Some(f64::from(v)),
            Self::U32(v) => Some(f64::from(v)),
            Self::U64(v) => Some(v as f64),
            Self::Isize(v) => Some(v as f64),
            Self::Usize(v) => Some(v as f64),
            Self::F32(v) => Some(f64::from(v)),
            Self::F64(v) => Some(v),
            Self::Null | Self::Bool(_) | Self::Char(_) | Self::Str(_) => None,
        }
    }

    /// Returns `true` if this value is numeric-compatible.
    pub fn is_numeric(&self) -> bool {
        self.as_number().is_some()
    }

    /// Returns the name of the value's underlying type.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Char(_) => "char",
            Self::I8(_) => "i8",
            Self::I16(_) => "i16",
            Self::I32(_) => "i32",
            Self::I64(_) => "i64",
            Self::U8(_) => "u8",
            Self::U16(_) => "u16",
            Self::U32(_) => "u32",
            Self::U64(_) => "u64",
            Self::Isize(_) => "isize",
            Self::Usize(_) => "usize",
            Self::F32(_) => "f32",
            Self::F64(_) => "f64",
            Self::Str(_) => "string",
        }
    }
}

impl fmt::Display for TrackedValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(v) => write!(f, "{}", v),
            Self::Char(v) => write!(f, "{}", v),
            Self::Str(v) => f.write_str(v),
            // Numeric values render through their `f64` form, so that `I32(-42)` and `F64(-42.0)` display the same.
            other => match other.as_number() {
                Some(v) => write!(f, "{}", v),
                None => Ok(()),
            },
        }
    }
}

macro_rules! impl_from_primitive {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$ty> for TrackedValue<'_> {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }
        )+
    };
}

impl_from_primitive!(
    bool => Bool,
    char => Char,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    isize => Isize,
    usize => Usize,
    f32 => F32,
    f64 => F64,
);

impl<'a> From<&'a str> for TrackedValue<'a> {
    fn from(value: &'a str) -> Self {
        Self::Str(value)
    }
}

impl<'a> From<&'a String> for TrackedValue<'a> {
    fn from(value: &'a String) -> Self {
        Self::Str(value.as_str())
    }
}

impl<'a, T> From<Option<T>> for TrackedValue<'a>
where
    T: Into<TrackedValue<'a>>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}
