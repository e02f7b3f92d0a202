//! Typed views over a validated typelib image.
//!
//! Each `*Info` wraps the image and a blob offset and decodes fields on
//! demand; nothing is copied out of the buffer. The accessors assume the
//! image passed [`crate::validate`], and return `None` rather than panic
//! when a read falls outside the buffer.

use crate::format::{self, blob_type, type_head, type_slot};
use crate::read::Typelib;

/// A decoded type slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeInfo {
    /// Inline basic type: tag plus pointer flag.
    Simple { tag: u8, pointer: bool },
    Array {
        zero_terminated: bool,
        /// Index of the parameter holding the element count.
        length: Option<u16>,
        fixed_size: Option<u16>,
        element: Box<TypeInfo>,
    },
    /// Reference to a directory entry, by 1-based index.
    Interface { pointer: bool, entry: u16 },
    List { element: Box<TypeInfo> },
    SList { element: Box<TypeInfo> },
    HashTable {
        key: Box<TypeInfo>,
        value: Box<TypeInfo>,
    },
    Error { domains: Vec<u16> },
}

impl TypeInfo {
    /// Decode the 32-bit slot at `offset`.
    pub fn decode(typelib: &Typelib, offset: usize) -> Option<TypeInfo> {
        let slot = typelib.u32_at(offset)?;
        if type_slot::is_inline(slot) {
            return Some(TypeInfo::Simple {
                tag: type_slot::inline_tag(slot),
                pointer: type_slot::inline_pointer(slot),
            });
        }

        let pool = slot as usize;
        let head = typelib.u8_at(pool)?;
        match type_head::tag(head) {
            22 => {
                let bits = typelib.u16_at(pool)?;
                let dim = typelib.u16_at(pool + format::array_type::DIM)?;
                let element =
                    TypeInfo::decode(typelib, pool + format::array_type::ELEMENT)?;
                Some(TypeInfo::Array {
                    zero_terminated: bits & format::array_type::ZERO_TERMINATED_BIT != 0,
                    length: (bits & format::array_type::HAS_LENGTH_BIT != 0).then_some(dim),
                    fixed_size: (bits & format::array_type::HAS_SIZE_BIT != 0).then_some(dim),
                    element: Box::new(element),
                })
            }
            23 => Some(TypeInfo::Interface {
                pointer: type_head::pointer(head),
                entry: typelib.u16_at(pool + 2)?,
            }),
            tag @ (24 | 25) => {
                let element = TypeInfo::decode(typelib, pool + 4)?;
                Some(if tag == 24 {
                    TypeInfo::List {
                        element: Box::new(element),
                    }
                } else {
                    TypeInfo::SList {
                        element: Box::new(element),
                    }
                })
            }
            26 => Some(TypeInfo::HashTable {
                key: Box::new(TypeInfo::decode(typelib, pool + 4)?),
                value: Box::new(TypeInfo::decode(typelib, pool + 8)?),
            }),
            27 => {
                let n_domains = typelib.u16_at(pool + 2)?;
                let domains = (0..n_domains as usize)
                    .map(|i| typelib.u16_at(pool + 4 + i * 2))
                    .collect::<Option<Vec<u16>>>()?;
                Some(TypeInfo::Error { domains })
            }
            _ => None,
        }
    }
}

/// A constant's decoded payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue<'a> {
    Boolean(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(&'a str),
}

macro_rules! blob_view {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy)]
        pub struct $name<'a> {
            typelib: &'a Typelib,
            offset: usize,
        }

        impl<'a> $name<'a> {
            pub fn at(typelib: &'a Typelib, offset: usize) -> $name<'a> {
                $name { typelib, offset }
            }

            pub fn offset(&self) -> usize {
                self.offset
            }

            #[allow(dead_code)]
            fn str_field(&self, field: usize) -> Option<&'a str> {
                let offset = self.typelib.u32_at(self.offset + field)?;
                if offset == 0 {
                    return None;
                }
                self.typelib.string_at(offset as usize)
            }
        }
    };
}

blob_view!(FunctionInfo);
blob_view!(CallbackInfo);
blob_view!(SignatureInfo);
blob_view!(ArgInfo);
blob_view!(FieldInfo);
blob_view!(PropertyInfo);
blob_view!(SignalInfo);
blob_view!(VFuncInfo);
blob_view!(ValueInfo);
blob_view!(ConstantInfo);
blob_view!(EnumInfo);
blob_view!(StructInfo);
blob_view!(ObjectInfo);
blob_view!(InterfaceInfo);
blob_view!(UnionInfo);
blob_view!(ErrorDomainInfo);

impl<'a> FunctionInfo<'a> {
    pub fn name(&self) -> Option<&'a str> {
        self.str_field(format::function::NAME)
    }

    pub fn symbol(&self) -> Option<&'a str> {
        self.str_field(format::function::SYMBOL)
    }

    fn flag(&self, bit: u16) -> bool {
        self.typelib
            .u16_at(self.offset + format::function::FLAGS)
            .map(|flags| flags & bit != 0)
            .unwrap_or(false)
    }

    pub fn is_deprecated(&self) -> bool {
        self.flag(format::function::FLAG_DEPRECATED)
    }

    pub fn is_setter(&self) -> bool {
        self.flag(format::function::FLAG_SETTER)
    }

    pub fn is_getter(&self) -> bool {
        self.flag(format::function::FLAG_GETTER)
    }

    pub fn is_constructor(&self) -> bool {
        self.flag(format::function::FLAG_CONSTRUCTOR)
    }

    pub fn wraps_vfunc(&self) -> bool {
        self.flag(format::function::FLAG_WRAPS_VFUNC)
    }

    pub fn throws(&self) -> bool {
        self.flag(format::function::FLAG_THROWS)
    }

    pub fn is_static(&self) -> bool {
        self.flag(format::function::FLAG_IS_STATIC)
    }

    pub fn signature(&self) -> Option<SignatureInfo<'a>> {
        let offset = self.typelib.u32_at(self.offset + format::function::SIGNATURE)?;
        Some(SignatureInfo::at(self.typelib, offset as usize))
    }
}

impl<'a> CallbackInfo<'a> {
    pub fn name(&self) -> Option<&'a str> {
        self.str_field(format::callback::NAME)
    }

    pub fn signature(&self) -> Option<SignatureInfo<'a>> {
        let offset = self.typelib.u32_at(self.offset + format::callback::SIGNATURE)?;
        Some(SignatureInfo::at(self.typelib, offset as usize))
    }
}

impl<'a> SignatureInfo<'a> {
    pub fn return_type(&self) -> Option<TypeInfo> {
        TypeInfo::decode(self.typelib, self.offset + format::signature::RETURN_TYPE)
    }

    pub fn may_return_null(&self) -> bool {
        self.typelib
            .u16_at(self.offset + format::signature::FLAGS)
            .map(|flags| flags & format::signature::FLAG_MAY_RETURN_NULL != 0)
            .unwrap_or(false)
    }

    pub fn caller_owns_return(&self) -> bool {
        self.typelib
            .u16_at(self.offset + format::signature::FLAGS)
            .map(|flags| flags & format::signature::FLAG_CALLER_OWNS_VALUE != 0)
            .unwrap_or(false)
    }

    pub fn n_args(&self) -> u16 {
        self.typelib
            .u16_at(self.offset + format::signature::N_ARGUMENTS)
            .unwrap_or(0)
    }

    pub fn arg(&self, index: u16) -> Option<ArgInfo<'a>> {
        if index >= self.n_args() {
            return None;
        }
        let offset = self.offset
            + format::SIGNATURE_BLOB_SIZE as usize
            + index as usize * format::ARG_BLOB_SIZE as usize;
        Some(ArgInfo::at(self.typelib, offset))
    }

    pub fn args(&self) -> impl Iterator<Item = ArgInfo<'a>> + '_ {
        (0..self.n_args()).filter_map(move |index| self.arg(index))
    }
}

impl<'a> ArgInfo<'a> {
    pub fn name(&self) -> Option<&'a str> {
        self.str_field(format::arg::NAME)
    }

    fn flag(&self, bit: u32) -> bool {
        self.typelib
            .u32_at(self.offset + format::arg::FLAGS)
            .map(|flags| flags & bit != 0)
            .unwrap_or(false)
    }

    pub fn is_in(&self) -> bool {
        self.flag(format::arg::FLAG_IN)
    }

    pub fn is_out(&self) -> bool {
        self.flag(format::arg::FLAG_OUT)
    }

    pub fn is_caller_allocates(&self) -> bool {
        self.flag(format::arg::FLAG_DIPPER)
    }

    pub fn allow_none(&self) -> bool {
        self.flag(format::arg::FLAG_ALLOW_NONE)
    }

    pub fn is_optional(&self) -> bool {
        self.flag(format::arg::FLAG_OPTIONAL)
    }

    pub fn is_return_value(&self) -> bool {
        self.flag(format::arg::FLAG_RETURN_VALUE)
    }

    pub fn scope(&self) -> u8 {
        self.typelib
            .u32_at(self.offset + format::arg::FLAGS)
            .map(|flags| ((flags & format::arg::SCOPE_MASK) >> format::arg::SCOPE_SHIFT) as u8)
            .unwrap_or(0)
    }

    pub fn closure_index(&self) -> i8 {
        self.typelib
            .u8_at(self.offset + format::arg::CLOSURE)
            .map(|raw| raw as i8)
            .unwrap_or(-1)
    }

    pub fn destroy_index(&self) -> i8 {
        self.typelib
            .u8_at(self.offset + format::arg::DESTROY)
            .map(|raw| raw as i8)
            .unwrap_or(-1)
    }

    pub fn type_info(&self) -> Option<TypeInfo> {
        TypeInfo::decode(self.typelib, self.offset + format::arg::TYPE)
    }
}

impl<'a> FieldInfo<'a> {
    pub fn name(&self) -> Option<&'a str> {
        self.str_field(format::field::NAME)
    }

    pub fn is_readable(&self) -> bool {
        self.typelib
            .u8_at(self.offset + format::field::FLAGS)
            .map(|flags| flags & format::field::FLAG_READABLE != 0)
            .unwrap_or(false)
    }

    pub fn is_writable(&self) -> bool {
        self.typelib
            .u8_at(self.offset + format::field::FLAGS)
            .map(|flags| flags & format::field::FLAG_WRITABLE != 0)
            .unwrap_or(false)
    }

    pub fn bits(&self) -> u8 {
        self.typelib
            .u8_at(self.offset + format::field::BITS)
            .unwrap_or(0)
    }

    /// Byte offset inside the aggregate, `None` when layout was unknown.
    pub fn struct_offset(&self) -> Option<u16> {
        let raw = self
            .typelib
            .u16_at(self.offset + format::field::STRUCT_OFFSET)?;
        (raw != format::field::UNKNOWN_OFFSET).then_some(raw)
    }

    pub fn type_info(&self) -> Option<TypeInfo> {
        TypeInfo::decode(self.typelib, self.offset + format::field::TYPE)
    }
}

impl<'a> PropertyInfo<'a> {
    pub fn name(&self) -> Option<&'a str> {
        self.str_field(format::property::NAME)
    }

    fn flag(&self, bit: u32) -> bool {
        self.typelib
            .u32_at(self.offset + format::property::FLAGS)
            .map(|flags| flags & bit != 0)
            .unwrap_or(false)
    }

    pub fn is_readable(&self) -> bool {
        self.flag(format::property::FLAG_READABLE)
    }

    pub fn is_writable(&self) -> bool {
        self.flag(format::property::FLAG_WRITABLE)
    }

    pub fn is_construct(&self) -> bool {
        self.flag(format::property::FLAG_CONSTRUCT)
    }

    pub fn is_construct_only(&self) -> bool {
        self.flag(format::property::FLAG_CONSTRUCT_ONLY)
    }

    pub fn type_info(&self) -> Option<TypeInfo> {
        TypeInfo::decode(self.typelib, self.offset + format::property::TYPE)
    }
}

impl<'a> SignalInfo<'a> {
    pub fn name(&self) -> Option<&'a str> {
        self.str_field(format::signal::NAME)
    }

    fn flag(&self, bit: u16) -> bool {
        self.typelib
            .u16_at(self.offset + format::signal::FLAGS)
            .map(|flags| flags & bit != 0)
            .unwrap_or(false)
    }

    pub fn runs_first(&self) -> bool {
        self.flag(format::signal::FLAG_RUN_FIRST)
    }

    pub fn runs_last(&self) -> bool {
        self.flag(format::signal::FLAG_RUN_LAST)
    }

    pub fn runs_cleanup(&self) -> bool {
        self.flag(format::signal::FLAG_RUN_CLEANUP)
    }

    pub fn is_detailed(&self) -> bool {
        self.flag(format::signal::FLAG_DETAILED)
    }

    pub fn is_action(&self) -> bool {
        self.flag(format::signal::FLAG_ACTION)
    }

    pub fn signature(&self) -> Option<SignatureInfo<'a>> {
        let offset = self.typelib.u32_at(self.offset + format::signal::SIGNATURE)?;
        Some(SignatureInfo::at(self.typelib, offset as usize))
    }
}

impl<'a> VFuncInfo<'a> {
    pub fn name(&self) -> Option<&'a str> {
        self.str_field(format::vfunc::NAME)
    }

    pub fn struct_offset(&self) -> u16 {
        self.typelib
            .u16_at(self.offset + format::vfunc::STRUCT_OFFSET)
            .unwrap_or(0)
    }

    /// Index of the invoking method among the container's methods.
    pub fn invoker(&self) -> Option<u16> {
        let raw = self.typelib.u16_at(self.offset + format::vfunc::INVOKER)?;
        (raw != format::vfunc::NO_INVOKER).then_some(raw)
    }

    pub fn must_chain_up(&self) -> bool {
        self.typelib
            .u16_at(self.offset + format::vfunc::FLAGS)
            .map(|flags| flags & format::vfunc::FLAG_MUST_CHAIN_UP != 0)
            .unwrap_or(false)
    }

    pub fn signature(&self) -> Option<SignatureInfo<'a>> {
        let offset = self.typelib.u32_at(self.offset + format::vfunc::SIGNATURE)?;
        Some(SignatureInfo::at(self.typelib, offset as usize))
    }
}

impl<'a> ValueInfo<'a> {
    pub fn name(&self) -> Option<&'a str> {
        self.str_field(format::value::NAME)
    }

    pub fn value(&self) -> u32 {
        self.typelib
            .u32_at(self.offset + format::value::VALUE)
            .unwrap_or(0)
    }

    pub fn is_deprecated(&self) -> bool {
        self.typelib
            .u32_at(self.offset + format::value::FLAGS)
            .map(|flags| flags & format::value::FLAG_DEPRECATED != 0)
            .unwrap_or(false)
    }
}

impl<'a> ConstantInfo<'a> {
    pub fn name(&self) -> Option<&'a str> {
        self.str_field(format::constant::NAME)
    }

    pub fn type_info(&self) -> Option<TypeInfo> {
        TypeInfo::decode(self.typelib, self.offset + format::constant::TYPE)
    }

    /// Decode the payload according to the declared tag.
    pub fn value(&self) -> Option<ConstantValue<'a>> {
        let Some(TypeInfo::Simple { tag, .. }) = self.type_info() else {
            return None;
        };
        let size = self.typelib.u32_at(self.offset + format::constant::SIZE)?;
        let at = self.typelib.u32_at(self.offset + format::constant::OFFSET)? as usize;

        let int = |width: u32| -> Option<i64> {
            Some(match width {
                1 => self.typelib.u8_at(at)? as i8 as i64,
                2 => self.typelib.u16_at(at)? as i16 as i64,
                4 => self.typelib.u32_at(at)? as i32 as i64,
                _ => {
                    let lo = self.typelib.u32_at(at)? as u64;
                    let hi = self.typelib.u32_at(at + 4)? as u64;
                    (lo | (hi << 32)) as i64
                }
            })
        };
        let uint = |width: u32| -> Option<u64> {
            Some(match width {
                1 => self.typelib.u8_at(at)? as u64,
                2 => self.typelib.u16_at(at)? as u64,
                4 => self.typelib.u32_at(at)? as u64,
                _ => {
                    let lo = self.typelib.u32_at(at)? as u64;
                    let hi = self.typelib.u32_at(at + 4)? as u64;
                    lo | (hi << 32)
                }
            })
        };

        Some(match tag {
            1 => ConstantValue::Boolean(self.typelib.u32_at(at)? != 0),
            2 | 4 | 6 | 8 | 10 | 12 | 14 => ConstantValue::Int(int(size)?),
            3 | 5 | 7 | 9 | 11 | 13 | 15 | 18 => ConstantValue::UInt(uint(size)?),
            16 => ConstantValue::Float(f32::from_le_bytes(
                self.typelib.u32_at(at)?.to_le_bytes(),
            ) as f64),
            17 => {
                let lo = self.typelib.u32_at(at)? as u64;
                let hi = self.typelib.u32_at(at + 4)? as u64;
                ConstantValue::Float(f64::from_le_bytes((lo | (hi << 32)).to_le_bytes()))
            }
            20 | 21 => ConstantValue::String(self.typelib.string_at(at)?),
            _ => return None,
        })
    }
}

impl<'a> EnumInfo<'a> {
    pub fn name(&self) -> Option<&'a str> {
        self.str_field(format::enum_blob::NAME)
    }

    pub fn storage_type(&self) -> u16 {
        self.typelib
            .u16_at(self.offset + format::enum_blob::STORAGE_TYPE)
            .unwrap_or(0)
    }

    pub fn n_values(&self) -> u16 {
        self.typelib
            .u16_at(self.offset + format::enum_blob::N_VALUES)
            .unwrap_or(0)
    }

    pub fn values(&self) -> impl Iterator<Item = ValueInfo<'a>> + '_ {
        let base = self.offset + format::ENUM_BLOB_SIZE as usize;
        (0..self.n_values() as usize)
            .map(move |i| ValueInfo::at(self.typelib, base + i * format::VALUE_BLOB_SIZE as usize))
    }
}

impl<'a> StructInfo<'a> {
    pub fn name(&self) -> Option<&'a str> {
        self.str_field(format::struct_blob::NAME)
    }

    pub fn size(&self) -> u32 {
        self.typelib
            .u32_at(self.offset + format::struct_blob::SIZE)
            .unwrap_or(0)
    }

    pub fn alignment(&self) -> u16 {
        self.typelib
            .u16_at(self.offset + format::struct_blob::ALIGNMENT)
            .unwrap_or(0)
    }

    pub fn is_disguised(&self) -> bool {
        self.typelib
            .u16_at(self.offset + format::struct_blob::FLAGS)
            .map(|flags| flags & format::struct_blob::FLAG_DISGUISED != 0)
            .unwrap_or(false)
    }

    pub fn n_fields(&self) -> u16 {
        self.typelib
            .u16_at(self.offset + format::struct_blob::N_FIELDS)
            .unwrap_or(0)
    }

    pub fn n_methods(&self) -> u16 {
        self.typelib
            .u16_at(self.offset + format::struct_blob::N_METHODS)
            .unwrap_or(0)
    }

    pub fn fields(&self) -> impl Iterator<Item = FieldInfo<'a>> + '_ {
        let base = self.offset + format::STRUCT_BLOB_SIZE as usize;
        (0..self.n_fields() as usize)
            .map(move |i| FieldInfo::at(self.typelib, base + i * format::FIELD_BLOB_SIZE as usize))
    }

    pub fn methods(&self) -> impl Iterator<Item = FunctionInfo<'a>> + '_ {
        let base = self.offset
            + format::STRUCT_BLOB_SIZE as usize
            + self.n_fields() as usize * format::FIELD_BLOB_SIZE as usize;
        (0..self.n_methods() as usize).map(move |i| {
            FunctionInfo::at(self.typelib, base + i * format::FUNCTION_BLOB_SIZE as usize)
        })
    }
}

impl<'a> ObjectInfo<'a> {
    pub fn name(&self) -> Option<&'a str> {
        self.str_field(format::object::NAME)
    }

    pub fn gtype_name(&self) -> Option<&'a str> {
        self.str_field(format::object::GTYPE_NAME)
    }

    pub fn is_abstract(&self) -> bool {
        self.typelib
            .u16_at(self.offset + format::object::FLAGS)
            .map(|flags| flags & format::object::FLAG_ABSTRACT != 0)
            .unwrap_or(false)
    }

    /// Directory index of the parent class, 0 when there is none.
    pub fn parent(&self) -> u16 {
        self.typelib
            .u16_at(self.offset + format::object::PARENT)
            .unwrap_or(0)
    }

    pub fn gtype_struct(&self) -> u16 {
        self.typelib
            .u16_at(self.offset + format::object::GTYPE_STRUCT)
            .unwrap_or(0)
    }

    pub fn interfaces(&self) -> Vec<u16> {
        let n = self
            .typelib
            .u16_at(self.offset + format::object::N_INTERFACES)
            .unwrap_or(0);
        let base = self.offset + format::OBJECT_BLOB_SIZE as usize;
        (0..n as usize)
            .filter_map(|i| self.typelib.u16_at(base + i * 2))
            .collect()
    }
}

impl<'a> InterfaceInfo<'a> {
    pub fn name(&self) -> Option<&'a str> {
        self.str_field(format::interface::NAME)
    }

    pub fn prerequisites(&self) -> Vec<u16> {
        let n = self
            .typelib
            .u16_at(self.offset + format::interface::N_PREREQUISITES)
            .unwrap_or(0);
        let base = self.offset + format::INTERFACE_BLOB_SIZE as usize;
        (0..n as usize)
            .filter_map(|i| self.typelib.u16_at(base + i * 2))
            .collect()
    }
}

impl<'a> UnionInfo<'a> {
    pub fn name(&self) -> Option<&'a str> {
        self.str_field(format::union_blob::NAME)
    }

    pub fn size(&self) -> u32 {
        self.typelib
            .u32_at(self.offset + format::union_blob::SIZE)
            .unwrap_or(0)
    }

    pub fn alignment(&self) -> u16 {
        self.typelib
            .u16_at(self.offset + format::union_blob::ALIGNMENT)
            .unwrap_or(0)
    }

    pub fn is_discriminated(&self) -> bool {
        self.typelib
            .u16_at(self.offset + format::union_blob::FLAGS)
            .map(|flags| flags & format::union_blob::FLAG_DISCRIMINATED != 0)
            .unwrap_or(false)
    }

    pub fn discriminator_offset(&self) -> i32 {
        self.typelib
            .i32_at(self.offset + format::union_blob::DISCRIMINATOR_OFFSET)
            .unwrap_or(0)
    }

    pub fn discriminator_type(&self) -> Option<TypeInfo> {
        if !self.is_discriminated() {
            return None;
        }
        TypeInfo::decode(
            self.typelib,
            self.offset + format::union_blob::DISCRIMINATOR_TYPE,
        )
    }

    pub fn n_fields(&self) -> u16 {
        self.typelib
            .u16_at(self.offset + format::union_blob::N_FIELDS)
            .unwrap_or(0)
    }

    pub fn n_functions(&self) -> u16 {
        self.typelib
            .u16_at(self.offset + format::union_blob::N_FUNCTIONS)
            .unwrap_or(0)
    }

    pub fn fields(&self) -> impl Iterator<Item = FieldInfo<'a>> + '_ {
        let base = self.offset + format::UNION_BLOB_SIZE as usize;
        (0..self.n_fields() as usize)
            .map(move |i| FieldInfo::at(self.typelib, base + i * format::FIELD_BLOB_SIZE as usize))
    }

    /// Discriminator constants, one per field, when discriminated.
    pub fn discriminator_values(&self) -> Vec<ConstantInfo<'a>> {
        if !self.is_discriminated() {
            return Vec::new();
        }
        let base = self.offset
            + format::UNION_BLOB_SIZE as usize
            + self.n_fields() as usize * format::FIELD_BLOB_SIZE as usize
            + self.n_functions() as usize * format::FUNCTION_BLOB_SIZE as usize;
        (0..self.n_fields() as usize)
            .map(|i| ConstantInfo::at(self.typelib, base + i * format::CONSTANT_BLOB_SIZE as usize))
            .collect()
    }
}

impl<'a> ErrorDomainInfo<'a> {
    pub fn name(&self) -> Option<&'a str> {
        self.str_field(format::error_domain::NAME)
    }

    pub fn get_quark(&self) -> Option<&'a str> {
        self.str_field(format::error_domain::GET_QUARK)
    }

    /// Directory index of the enum carrying the error codes.
    pub fn error_codes(&self) -> u16 {
        self.typelib
            .u16_at(self.offset + format::error_domain::ERROR_CODES)
            .unwrap_or(0)
    }
}

/// A dispatched view of one local directory entry.
#[derive(Debug, Clone, Copy)]
pub enum EntryInfo<'a> {
    Function(FunctionInfo<'a>),
    Callback(CallbackInfo<'a>),
    Struct(StructInfo<'a>),
    Boxed(StructInfo<'a>),
    Enum(EnumInfo<'a>),
    Flags(EnumInfo<'a>),
    Object(ObjectInfo<'a>),
    Interface(InterfaceInfo<'a>),
    Constant(ConstantInfo<'a>),
    ErrorDomain(ErrorDomainInfo<'a>),
    Union(UnionInfo<'a>),
}

impl Typelib {
    /// Typed view of the local entry at 1-based `index`.
    pub fn entry_info(&self, index: u16) -> Option<EntryInfo<'_>> {
        let entry = self.dir_entry(index)?;
        if !entry.local {
            return None;
        }
        let offset = entry.offset as usize;
        Some(match entry.blob_type {
            blob_type::FUNCTION => EntryInfo::Function(FunctionInfo::at(self, offset)),
            blob_type::CALLBACK => EntryInfo::Callback(CallbackInfo::at(self, offset)),
            blob_type::STRUCT => EntryInfo::Struct(StructInfo::at(self, offset)),
            blob_type::BOXED => EntryInfo::Boxed(StructInfo::at(self, offset)),
            blob_type::ENUM => EntryInfo::Enum(EnumInfo::at(self, offset)),
            blob_type::FLAGS => EntryInfo::Flags(EnumInfo::at(self, offset)),
            blob_type::OBJECT => EntryInfo::Object(ObjectInfo::at(self, offset)),
            blob_type::INTERFACE => EntryInfo::Interface(InterfaceInfo::at(self, offset)),
            blob_type::CONSTANT => EntryInfo::Constant(ConstantInfo::at(self, offset)),
            blob_type::ERROR_DOMAIN => EntryInfo::ErrorDomain(ErrorDomainInfo::at(self, offset)),
            blob_type::UNION => EntryInfo::Union(UnionInfo::at(self, offset)),
            _ => return None,
        })
    }

    /// Attributes recorded for the blob at `node_offset`, in table order.
    pub fn attributes_of(&self, node_offset: u32) -> Vec<(&str, &str)> {
        let n = self.n_attributes() as usize;
        let table = self.attributes_offset() as usize;
        let mut found = Vec::new();
        for i in 0..n {
            let record = table + i * format::ATTRIBUTE_BLOB_SIZE as usize;
            if self.u32_at(record + format::attribute::OFFSET) != Some(node_offset) {
                continue;
            }
            let key = self
                .u32_at(record + format::attribute::NAME)
                .and_then(|offset| self.string_at(offset as usize));
            let value = self
                .u32_at(record + format::attribute::VALUE)
                .and_then(|offset| self.string_at(offset as usize));
            if let (Some(key), Some(value)) = (key, value) {
                found.push((key, value));
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_slots_decode() {
        let mut data = vec![0u8; 8];
        data[0..4].copy_from_slice(&type_slot::pack_simple(6, false).to_le_bytes());
        let typelib = Typelib::from_bytes(data);
        assert_eq!(
            TypeInfo::decode(&typelib, 0),
            Some(TypeInfo::Simple {
                tag: 6,
                pointer: false
            })
        );
    }

    #[test]
    fn pooled_list_decodes() {
        // Slot at 0 pointing at a list blob at offset 8.
        let mut data = vec![0u8; 16];
        data[0..4].copy_from_slice(&8u32.to_le_bytes());
        data[8] = type_head::pack(24, true);
        data[10..12].copy_from_slice(&1u16.to_le_bytes());
        data[12..16].copy_from_slice(&type_slot::pack_simple(20, true).to_le_bytes());
        let typelib = Typelib::from_bytes(data);
        match TypeInfo::decode(&typelib, 0) {
            Some(TypeInfo::List { element }) => {
                assert_eq!(
                    *element,
                    TypeInfo::Simple {
                        tag: 20,
                        pointer: true
                    }
                );
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn truncated_pool_decode_is_none() {
        let mut data = vec![0u8; 4];
        data[0..4].copy_from_slice(&100u32.to_le_bytes());
        let typelib = Typelib::from_bytes(data);
        assert_eq!(TypeInfo::decode(&typelib, 0), None);
    }
}
