use serde_derive::{Deserialize, Serialize};

/// Width and alignment of a pointer on the target ABI. The typelib format
/// assumes the producing and consuming host agree (64-bit here).
pub const POINTER_SIZE: u32 = 8;
pub const POINTER_ALIGN: u32 = 8;

/// The closed, totally-ordered set of type tags. The first contiguous range
/// (`Void` through `Filename`) is "basic"; the rest are containers. The
/// numeric values are stored on disk and must never be reordered.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum TypeTag {
    Void = 0,
    Boolean = 1,
    Int8 = 2,
    UInt8 = 3,
    Int16 = 4,
    UInt16 = 5,
    Int32 = 6,
    UInt32 = 7,
    Int64 = 8,
    UInt64 = 9,
    Int = 10,
    UInt = 11,
    Long = 12,
    ULong = 13,
    SSize = 14,
    Size = 15,
    Float = 16,
    Double = 17,
    Time = 18,
    GType = 19,
    Utf8 = 20,
    Filename = 21,
    Array = 22,
    Interface = 23,
    GList = 24,
    GSList = 25,
    GHash = 26,
    Error = 27,
}

impl TypeTag {
    pub const LAST_BASIC: TypeTag = TypeTag::Filename;
    pub const LAST: TypeTag = TypeTag::Error;

    pub fn from_u8(value: u8) -> Option<TypeTag> {
        use TypeTag::*;
        Some(match value {
            0 => Void,
            1 => Boolean,
            2 => Int8,
            3 => UInt8,
            4 => Int16,
            5 => UInt16,
            6 => Int32,
            7 => UInt32,
            8 => Int64,
            9 => UInt64,
            10 => Int,
            11 => UInt,
            12 => Long,
            13 => ULong,
            14 => SSize,
            15 => Size,
            16 => Float,
            17 => Double,
            18 => Time,
            19 => GType,
            20 => Utf8,
            21 => Filename,
            22 => Array,
            23 => Interface,
            24 => GList,
            25 => GSList,
            26 => GHash,
            27 => Error,
            _ => return None,
        })
    }

    /// Basic tags are representable inline in a 32-bit type slot.
    pub fn is_basic(self) -> bool {
        self <= TypeTag::LAST_BASIC
    }

    pub fn is_container(self) -> bool {
        !self.is_basic()
    }

    /// The stable name used in canonical type text and diagnostics.
    pub fn name(self) -> &'static str {
        use TypeTag::*;
        match self {
            Void => "void",
            Boolean => "boolean",
            Int8 => "int8",
            UInt8 => "uint8",
            Int16 => "int16",
            UInt16 => "uint16",
            Int32 => "int32",
            UInt32 => "uint32",
            Int64 => "int64",
            UInt64 => "uint64",
            Int => "int",
            UInt => "uint",
            Long => "long",
            ULong => "ulong",
            SSize => "ssize",
            Size => "size",
            Float => "float",
            Double => "double",
            Time => "time",
            GType => "gtype",
            Utf8 => "utf8",
            Filename => "filename",
            Array => "array",
            Interface => "interface",
            GList => "glist",
            GSList => "gslist",
            GHash => "ghash",
            Error => "error",
        }
    }

    /// Storage footprint of a non-pointer value of this tag, or `None` when
    /// the tag has no defined inline layout (void and all containers).
    pub fn inline_layout(self) -> Option<(u32, u32)> {
        use TypeTag::*;
        Some(match self {
            Boolean => (4, 4),
            Int8 | UInt8 => (1, 1),
            Int16 | UInt16 => (2, 2),
            Int32 | UInt32 => (4, 4),
            Int64 | UInt64 => (8, 8),
            Int | UInt => (4, 4),
            Long | ULong => (POINTER_SIZE, POINTER_ALIGN),
            SSize | Size => (POINTER_SIZE, POINTER_ALIGN),
            Float => (4, 4),
            Double => (8, 8),
            Time => (8, 8),
            GType => (POINTER_SIZE, POINTER_ALIGN),
            // Pointer by convention even without an explicit star.
            Utf8 | Filename => (POINTER_SIZE, POINTER_ALIGN),
            Void | Array | Interface | GList | GSList | GHash | Error => return None,
        })
    }

    /// Byte size a constant of this tag occupies in the image, or `None`
    /// when constants of the tag are variable-size (strings) or illegal.
    pub fn constant_size(self) -> Option<u32> {
        use TypeTag::*;
        Some(match self {
            Boolean => 4,
            Int8 | UInt8 => 1,
            Int16 | UInt16 => 2,
            Int32 | UInt32 => 4,
            Int64 | UInt64 => 8,
            Int | UInt => 4,
            Long | ULong | SSize | Size | Time => 8,
            Float => 4,
            Double => 8,
            _ => return None,
        })
    }
}

/// Lifetime of a callback passed as an argument.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum ScopeKind {
    #[default]
    Invalid = 0,
    Call = 1,
    Async = 2,
    Notified = 3,
}

impl ScopeKind {
    pub fn from_u8(value: u8) -> Option<ScopeKind> {
        Some(match value {
            0 => ScopeKind::Invalid,
            1 => ScopeKind::Call,
            2 => ScopeKind::Async,
            3 => ScopeKind::Notified,
            _ => return None,
        })
    }
}

/// One row of the basic-name table: the spelling a GIR document may use,
/// the tag it maps to, and whether the name is pointer-by-convention.
pub struct BasicTypeInfo {
    pub name: &'static str,
    pub tag: TypeTag,
    pub pointer: bool,
}

/// Spellings accepted for basic types, checked by prefix in table order.
/// `ssize_t` must precede `ssize` for the prefix match to pick the longer
/// spelling first; likewise `size_t`.
pub const BASIC_TYPES: &[BasicTypeInfo] = &[
    BasicTypeInfo { name: "none", tag: TypeTag::Void, pointer: false },
    BasicTypeInfo { name: "any", tag: TypeTag::Void, pointer: true },
    BasicTypeInfo { name: "bool", tag: TypeTag::Boolean, pointer: false },
    BasicTypeInfo { name: "char", tag: TypeTag::Int8, pointer: false },
    BasicTypeInfo { name: "int8", tag: TypeTag::Int8, pointer: false },
    BasicTypeInfo { name: "uint8", tag: TypeTag::UInt8, pointer: false },
    BasicTypeInfo { name: "int16", tag: TypeTag::Int16, pointer: false },
    BasicTypeInfo { name: "uint16", tag: TypeTag::UInt16, pointer: false },
    BasicTypeInfo { name: "int32", tag: TypeTag::Int32, pointer: false },
    BasicTypeInfo { name: "uint32", tag: TypeTag::UInt32, pointer: false },
    BasicTypeInfo { name: "int64", tag: TypeTag::Int64, pointer: false },
    BasicTypeInfo { name: "uint64", tag: TypeTag::UInt64, pointer: false },
    BasicTypeInfo { name: "int", tag: TypeTag::Int, pointer: false },
    BasicTypeInfo { name: "uint", tag: TypeTag::UInt, pointer: false },
    BasicTypeInfo { name: "long", tag: TypeTag::Long, pointer: false },
    BasicTypeInfo { name: "ulong", tag: TypeTag::ULong, pointer: false },
    BasicTypeInfo { name: "ssize_t", tag: TypeTag::SSize, pointer: false },
    BasicTypeInfo { name: "ssize", tag: TypeTag::SSize, pointer: false },
    BasicTypeInfo { name: "size_t", tag: TypeTag::Size, pointer: false },
    BasicTypeInfo { name: "size", tag: TypeTag::Size, pointer: false },
    BasicTypeInfo { name: "float", tag: TypeTag::Float, pointer: false },
    BasicTypeInfo { name: "double", tag: TypeTag::Double, pointer: false },
    BasicTypeInfo { name: "time_t", tag: TypeTag::Time, pointer: false },
    BasicTypeInfo { name: "GType", tag: TypeTag::GType, pointer: false },
    BasicTypeInfo { name: "utf8", tag: TypeTag::Utf8, pointer: true },
    BasicTypeInfo { name: "filename", tag: TypeTag::Filename, pointer: true },
];

/// Look a spelling up in the basic-name table. Matches by prefix so that
/// `"utf8*"` and similar decorated spellings still resolve.
pub fn lookup_basic(name: &str) -> Option<&'static BasicTypeInfo> {
    BASIC_TYPES.iter().find(|info| name.starts_with(info.name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_values_are_stable() {
        assert_eq!(TypeTag::Void as u8, 0);
        assert_eq!(TypeTag::Boolean as u8, 1);
        assert_eq!(TypeTag::Int16 as u8, 4);
        assert_eq!(TypeTag::Filename as u8, 21);
        assert_eq!(TypeTag::Array as u8, 22);
        assert_eq!(TypeTag::Error as u8, 27);
    }

    #[test]
    fn from_u8_round_trips_every_tag() {
        for raw in 0..=27u8 {
            let tag = TypeTag::from_u8(raw).unwrap();
            assert_eq!(tag as u8, raw);
        }
        assert!(TypeTag::from_u8(28).is_none());
    }

    #[test]
    fn basic_and_container_ranges() {
        assert!(TypeTag::Void.is_basic());
        assert!(TypeTag::Filename.is_basic());
        assert!(!TypeTag::Array.is_basic());
        assert!(TypeTag::Error.is_container());
    }

    #[test]
    fn inline_layouts() {
        assert_eq!(TypeTag::Int8.inline_layout(), Some((1, 1)));
        assert_eq!(TypeTag::Int16.inline_layout(), Some((2, 2)));
        assert_eq!(TypeTag::Double.inline_layout(), Some((8, 8)));
        assert_eq!(TypeTag::Utf8.inline_layout(), Some((8, 8)));
        assert_eq!(TypeTag::Void.inline_layout(), None);
        assert_eq!(TypeTag::GHash.inline_layout(), None);
    }

    #[test]
    fn basic_lookup_prefers_longer_spelling() {
        assert_eq!(lookup_basic("ssize_t").unwrap().tag, TypeTag::SSize);
        assert_eq!(lookup_basic("size_t").unwrap().tag, TypeTag::Size);
        assert_eq!(lookup_basic("utf8").unwrap().pointer, true);
        assert!(lookup_basic("Gtk.Widget").is_none());
    }
}
