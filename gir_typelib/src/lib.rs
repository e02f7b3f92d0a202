//! The binary typelib format: layout constants, a read-only view over an
//! image, and the structural validator.
//!
//! The writer lives in `gir_gen`; this crate is the single source of truth
//! for every fixed size and bit position, so the two sides cannot drift
//! apart independently.

pub mod format;
mod info;
mod read;
mod validate;

pub use info::{
    ArgInfo, CallbackInfo, ConstantInfo, ConstantValue, EntryInfo, EnumInfo, ErrorDomainInfo,
    FieldInfo, FunctionInfo, InterfaceInfo, ObjectInfo, PropertyInfo, SignalInfo, SignatureInfo,
    StructInfo, TypeInfo, UnionInfo, VFuncInfo, ValueInfo,
};
pub use read::{DirEntryView, Typelib};
pub use validate::{validate, ValidateError, ValidateErrorKind};
