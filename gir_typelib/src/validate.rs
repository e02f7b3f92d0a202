//! Structural validation of a typelib image.
//!
//! The checks mirror what the writer guarantees, in order: header, then the
//! directory, then every local blob recursively (embedded offsets, directory
//! indices, nested types), then the attribute table. Failures carry a
//! context path such as `struct 'Frobber'/method 'fizz'` so they localize.

use std::fmt;

use crate::format::{self, blob_type, is_aligned, type_head, type_slot, MAX_NAME_LEN};
use crate::read::{DirEntryView, Typelib};

/// A validation failure, annotated with where in the image it was found.
#[derive(Debug)]
pub struct ValidateError {
    /// `/`-separated names of the enclosing entities, outermost first.
    pub context: String,
    pub kind: ValidateErrorKind,
}

impl fmt::Display for ValidateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.context.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "In {}: {}", self.context, self.kind)
        }
    }
}

impl std::error::Error for ValidateError {}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidateErrorKind {
    #[error("buffer too short for {0}")]
    TooShort(&'static str),
    #[error("magic string not found")]
    BadMagic,
    #[error("version mismatch: {major}.{minor}")]
    VersionMismatch { major: u8, minor: u8 },
    #[error("inconsistent entry counts: {n_entries} total, {n_local} local")]
    EntryCountMismatch { n_entries: u16, n_local: u16 },
    #[error("declared size {declared} does not match buffer length {actual}")]
    SizeMismatch { declared: u32, actual: usize },
    #[error("{0} blob size mismatch")]
    BlobSizeMismatch(&'static str),
    #[error("misaligned {0}")]
    Misaligned(&'static str),
    #[error("nonzero attribute count with no attribute table")]
    MissingAttributes,
    #[error("the {what} is too long")]
    NameTooLong { what: &'static str },
    #[error("the {what} contains invalid characters: {name:?}")]
    InvalidName { what: &'static str, name: String },
    #[error("invalid entry type {blob_type}")]
    InvalidEntryType { blob_type: u16 },
    #[error("too few local directory entries")]
    TooFewLocalEntries,
    #[error("too many local directory entries")]
    TooManyLocalEntries,
    #[error("wrong blob type {found}, expected {expected}")]
    WrongBlobType { expected: u16, found: u16 },
    #[error("invalid directory index {0}")]
    InvalidDirectoryIndex(u16),
    #[error("directory entry {index} is not {expected}")]
    WrongEntryKind { index: u16, expected: &'static str },
    #[error("wrong tag {0} in simple type")]
    InvalidSimpleTag(u8),
    #[error("wrong tag {0} in compound type")]
    InvalidCompoundTag(u8),
    #[error("pointer type expected for tag {0}")]
    PointerExpected(u8),
    #[error("array declares both a length parameter and a fixed size")]
    ConflictingArrayShape,
    #[error("parameter type count {found}, expected {expected}")]
    TypeParamCountMismatch { expected: u16, found: u16 },
    #[error("invalid scope value {0}")]
    InvalidScope(u8),
    #[error("invalid signal run flags")]
    InvalidSignalRunFlags,
    #[error("invalid class closure index {0}")]
    InvalidClassClosure(u16),
    #[error("invalid invoker index {0}")]
    InvalidInvoker(u16),
    #[error("constant value has void type")]
    ConstantVoidType,
    #[error("constant value size {declared}, expected {expected}")]
    ConstantSizeMismatch { declared: u32, expected: u32 },
    #[error("constant string payload is not NUL-terminated")]
    ConstantStringUnterminated,
    #[error("constant of non-basic type")]
    ConstantNotBasic,
    #[error("gtype data in unregistered {0}")]
    UnexpectedGType(&'static str),
    #[error("invalid storage type tag {0}")]
    InvalidStorageType(u16),
    #[error("invalid aggregate alignment {0}")]
    InvalidAlignment(u16),
    #[error("aggregate size {size} is not a multiple of alignment {alignment}")]
    UnalignedSize { size: u32, alignment: u16 },
    #[error("constructor does not return an interface type")]
    InvalidConstructorReturn,
    #[error("constructor not allowed here")]
    ConstructorNotAllowed,
    #[error("setter, getter or wrapper not allowed here")]
    WrapperNotAllowed,
    #[error("more than one of setter, getter and wraps-vfunc is set")]
    ConflictingWrapperBits,
    #[error("wrapped-member index without setter, getter or wraps-vfunc")]
    IndexWithoutWrapperBits,
}

/// Validate a whole image. The entry point the compiler calls after
/// building, and the one external consumers call on an untrusted blob.
pub fn validate(typelib: &Typelib) -> Result<(), ValidateError> {
    let mut validator = Validator {
        typelib,
        context: Vec::new(),
    };
    validator.header()?;
    validator.directory()?;
    validator.attributes()?;
    Ok(())
}

struct Validator<'a> {
    typelib: &'a Typelib,
    context: Vec<String>,
}

impl<'a> Validator<'a> {
    fn fail<T>(&self, kind: ValidateErrorKind) -> Result<T, ValidateError> {
        Err(ValidateError {
            context: self.context.join("/"),
            kind,
        })
    }

    fn push_context(&mut self, what: &str, name_offset: u32) {
        let name = self
            .typelib
            .string_at(name_offset as usize)
            .unwrap_or("<unreadable>");
        self.context.push(format!("{what} '{name}'"));
    }

    fn pop_context(&mut self) {
        self.context.pop();
    }

    fn u8_at(&self, offset: usize, what: &'static str) -> Result<u8, ValidateError> {
        match self.typelib.u8_at(offset) {
            Some(value) => Ok(value),
            None => self.fail(ValidateErrorKind::TooShort(what)),
        }
    }

    fn u16_at(&self, offset: usize, what: &'static str) -> Result<u16, ValidateError> {
        match self.typelib.u16_at(offset) {
            Some(value) => Ok(value),
            None => self.fail(ValidateErrorKind::TooShort(what)),
        }
    }

    fn u32_at(&self, offset: usize, what: &'static str) -> Result<u32, ValidateError> {
        match self.typelib.u32_at(offset) {
            Some(value) => Ok(value),
            None => self.fail(ValidateErrorKind::TooShort(what)),
        }
    }

    fn require(&self, end: usize, what: &'static str) -> Result<(), ValidateError> {
        if self.typelib.len() < end {
            self.fail(ValidateErrorKind::TooShort(what))
        } else {
            Ok(())
        }
    }

    /// A name string: NUL-terminated within `MAX_NAME_LEN` bytes, identifier
    /// character set.
    fn name(&self, what: &'static str, offset: u32) -> Result<(), ValidateError> {
        let offset = offset as usize;
        if offset >= self.typelib.len() {
            return self.fail(ValidateErrorKind::TooShort(what));
        }
        let tail = &self.typelib.as_bytes()[offset..];
        let window = &tail[..tail.len().min(MAX_NAME_LEN)];
        let Some(nul) = window.iter().position(|&b| b == 0) else {
            return self.fail(ValidateErrorKind::NameTooLong { what });
        };
        let name = &window[..nul];
        if name
            .iter()
            .any(|&b| !(b.is_ascii_alphanumeric() || b == b'_' || b == b'-'))
        {
            return self.fail(ValidateErrorKind::InvalidName {
                what,
                name: String::from_utf8_lossy(name).into_owned(),
            });
        }
        Ok(())
    }

    /// Any NUL-terminated string within the buffer; no charset constraint.
    /// Used for attribute keys and values.
    fn payload_string(&self, what: &'static str, offset: u32) -> Result<(), ValidateError> {
        if self.typelib.string_at(offset as usize).is_none() {
            return self.fail(ValidateErrorKind::TooShort(what));
        }
        Ok(())
    }

    fn header(&mut self) -> Result<(), ValidateError> {
        use format::header;

        let typelib = self.typelib;
        self.require(format::HEADER_SIZE as usize, "header")?;

        if typelib.magic() != format::MAGIC {
            return self.fail(ValidateErrorKind::BadMagic);
        }

        let major = self.u8_at(header::MAJOR_VERSION, "header")?;
        let minor = self.u8_at(header::MINOR_VERSION, "header")?;
        if major != format::MAJOR_VERSION || minor != format::MINOR_VERSION {
            return self.fail(ValidateErrorKind::VersionMismatch { major, minor });
        }

        let n_entries = typelib.n_entries();
        let n_local = typelib.n_local_entries();
        if n_entries < n_local {
            return self.fail(ValidateErrorKind::EntryCountMismatch { n_entries, n_local });
        }

        if typelib.declared_size() as usize != typelib.len() {
            return self.fail(ValidateErrorKind::SizeMismatch {
                declared: typelib.declared_size(),
                actual: typelib.len(),
            });
        }

        let sizes: &[(usize, u16, &'static str)] = &[
            (header::ENTRY_BLOB_SIZE, format::DIR_ENTRY_SIZE, "entry"),
            (header::FUNCTION_BLOB_SIZE, format::FUNCTION_BLOB_SIZE, "function"),
            (header::CALLBACK_BLOB_SIZE, format::CALLBACK_BLOB_SIZE, "callback"),
            (header::SIGNAL_BLOB_SIZE, format::SIGNAL_BLOB_SIZE, "signal"),
            (header::VFUNC_BLOB_SIZE, format::VFUNC_BLOB_SIZE, "vfunc"),
            (header::ARG_BLOB_SIZE, format::ARG_BLOB_SIZE, "arg"),
            (header::PROPERTY_BLOB_SIZE, format::PROPERTY_BLOB_SIZE, "property"),
            (header::FIELD_BLOB_SIZE, format::FIELD_BLOB_SIZE, "field"),
            (header::VALUE_BLOB_SIZE, format::VALUE_BLOB_SIZE, "value"),
            (header::ATTRIBUTE_BLOB_SIZE, format::ATTRIBUTE_BLOB_SIZE, "attribute"),
            (header::CONSTANT_BLOB_SIZE, format::CONSTANT_BLOB_SIZE, "constant"),
            (
                header::ERROR_DOMAIN_BLOB_SIZE,
                format::ERROR_DOMAIN_BLOB_SIZE,
                "error-domain",
            ),
            (header::SIGNATURE_BLOB_SIZE, format::SIGNATURE_BLOB_SIZE, "signature"),
            (header::ENUM_BLOB_SIZE, format::ENUM_BLOB_SIZE, "enum"),
            (header::STRUCT_BLOB_SIZE, format::STRUCT_BLOB_SIZE, "struct"),
            (header::OBJECT_BLOB_SIZE, format::OBJECT_BLOB_SIZE, "object"),
            (header::INTERFACE_BLOB_SIZE, format::INTERFACE_BLOB_SIZE, "interface"),
            (header::UNION_BLOB_SIZE, format::UNION_BLOB_SIZE, "union"),
        ];
        for &(offset, expected, what) in sizes {
            if self.u16_at(offset, "header")? != expected {
                return self.fail(ValidateErrorKind::BlobSizeMismatch(what));
            }
        }

        if !is_aligned(typelib.directory_offset()) {
            return self.fail(ValidateErrorKind::Misaligned("directory"));
        }
        if !is_aligned(typelib.attributes_offset()) {
            return self.fail(ValidateErrorKind::Misaligned("attributes"));
        }
        if typelib.attributes_offset() == 0 && typelib.n_attributes() > 0 {
            return self.fail(ValidateErrorKind::MissingAttributes);
        }

        self.name("namespace", self.u32_at(header::NAMESPACE, "header")?)?;
        Ok(())
    }

    fn directory(&mut self) -> Result<(), ValidateError> {
        let typelib = self.typelib;
        let n_entries = typelib.n_entries();
        let dir_end = typelib.directory_offset() as usize
            + n_entries as usize * format::DIR_ENTRY_SIZE as usize;
        self.require(dir_end, "directory")?;

        for index in 1..=n_entries {
            let entry = match typelib.dir_entry(index) {
                Some(entry) => entry,
                None => return self.fail(ValidateErrorKind::TooShort("directory entry")),
            };

            self.name("entry", entry.name)?;

            if (entry.local && entry.blob_type == blob_type::INVALID)
                || entry.blob_type > blob_type::LAST
            {
                return self.fail(ValidateErrorKind::InvalidEntryType {
                    blob_type: entry.blob_type,
                });
            }

            if index <= typelib.n_local_entries() {
                if !entry.local {
                    return self.fail(ValidateErrorKind::TooFewLocalEntries);
                }
                if !is_aligned(entry.offset) {
                    return self.fail(ValidateErrorKind::Misaligned("entry"));
                }
                self.blob(entry)?;
            } else {
                if entry.local {
                    return self.fail(ValidateErrorKind::TooManyLocalEntries);
                }
                // Non-local entries store the owning namespace name where
                // local ones store a body offset.
                self.name("namespace", entry.offset)?;
            }
        }
        Ok(())
    }

    fn blob(&mut self, entry: DirEntryView) -> Result<(), ValidateError> {
        let offset = entry.offset as usize;
        let found = self.u16_at(offset, "blob")?;
        if found != entry.blob_type {
            return self.fail(ValidateErrorKind::WrongBlobType {
                expected: entry.blob_type,
                found,
            });
        }
        match entry.blob_type {
            blob_type::FUNCTION => self.function(offset, blob_type::INVALID),
            blob_type::CALLBACK => self.callback(offset),
            blob_type::STRUCT | blob_type::BOXED => self.struct_blob(offset, entry.blob_type),
            blob_type::ENUM | blob_type::FLAGS => self.enum_blob(offset, entry.blob_type),
            blob_type::OBJECT => self.object(offset),
            blob_type::INTERFACE => self.interface(offset),
            blob_type::CONSTANT => self.constant(offset),
            blob_type::ERROR_DOMAIN => self.error_domain(offset),
            blob_type::UNION => self.union_blob(offset),
            other => self.fail(ValidateErrorKind::InvalidEntryType { blob_type: other }),
        }
    }

    fn dir_entry_checked(&self, index: u16) -> Result<DirEntryView, ValidateError> {
        if index == 0 || index > self.typelib.n_entries() {
            return self.fail(ValidateErrorKind::InvalidDirectoryIndex(index));
        }
        match self.typelib.dir_entry(index) {
            Some(entry) => Ok(entry),
            None => self.fail(ValidateErrorKind::TooShort("directory entry")),
        }
    }

    /// A directory reference that must point at one of `kinds` when local.
    fn entry_of_kind(
        &self,
        index: u16,
        kinds: &[u16],
        expected: &'static str,
    ) -> Result<(), ValidateError> {
        let entry = self.dir_entry_checked(index)?;
        if kinds.contains(&entry.blob_type) {
            return Ok(());
        }
        if !entry.local && entry.blob_type == blob_type::INVALID {
            return Ok(());
        }
        self.fail(ValidateErrorKind::WrongEntryKind { index, expected })
    }

    // Type descriptors.

    fn type_slot(&mut self, slot_offset: usize) -> Result<(), ValidateError> {
        let slot = self.u32_at(slot_offset, "type")?;
        if type_slot::is_inline(slot) {
            let tag = type_slot::inline_tag(slot);
            if tag >= 22 {
                return self.fail(ValidateErrorKind::InvalidSimpleTag(tag));
            }
            // utf8 and filename are pointer by convention.
            if tag >= 20 && !type_slot::inline_pointer(slot) {
                return self.fail(ValidateErrorKind::PointerExpected(tag));
            }
            return Ok(());
        }

        let pool_offset = slot as usize;
        let head = self.u8_at(pool_offset, "type blob")?;
        match type_head::tag(head) {
            22 => self.array_type(pool_offset),
            23 => self.interface_type(pool_offset),
            24 | 25 => self.param_type(pool_offset, 1),
            26 => self.param_type(pool_offset, 2),
            27 => self.error_type(pool_offset),
            other => self.fail(ValidateErrorKind::InvalidCompoundTag(other)),
        }
    }

    fn array_type(&mut self, offset: usize) -> Result<(), ValidateError> {
        self.require(offset + format::ARRAY_TYPE_BLOB_SIZE as usize, "array type")?;
        let head = self.u16_at(offset, "array type")?;
        if head & type_head::POINTER_BIT as u16 == 0 {
            return self.fail(ValidateErrorKind::PointerExpected(22));
        }
        let has_length = head & format::array_type::HAS_LENGTH_BIT != 0;
        let has_size = head & format::array_type::HAS_SIZE_BIT != 0;
        if has_length && has_size {
            return self.fail(ValidateErrorKind::ConflictingArrayShape);
        }
        self.type_slot(offset + format::array_type::ELEMENT)
    }

    fn interface_type(&mut self, offset: usize) -> Result<(), ValidateError> {
        self.require(
            offset + format::INTERFACE_TYPE_BLOB_SIZE as usize,
            "interface type",
        )?;
        let index = self.u16_at(offset + 2, "interface type")?;
        self.dir_entry_checked(index)?;
        Ok(())
    }

    fn param_type(&mut self, offset: usize, expected: u16) -> Result<(), ValidateError> {
        self.require(
            offset + format::PARAM_TYPE_BLOB_SIZE as usize + expected as usize * 4,
            "parameter type",
        )?;
        let head = self.u8_at(offset, "parameter type")?;
        if !type_head::pointer(head) {
            return self.fail(ValidateErrorKind::PointerExpected(type_head::tag(head)));
        }
        let n_types = self.u16_at(offset + 2, "parameter type")?;
        if n_types != expected {
            return self.fail(ValidateErrorKind::TypeParamCountMismatch {
                expected,
                found: n_types,
            });
        }
        for i in 0..expected as usize {
            self.type_slot(offset + format::PARAM_TYPE_BLOB_SIZE as usize + i * 4)?;
        }
        Ok(())
    }

    fn error_type(&mut self, offset: usize) -> Result<(), ValidateError> {
        self.require(offset + format::ERROR_TYPE_BLOB_SIZE as usize, "error type")?;
        let head = self.u8_at(offset, "error type")?;
        if !type_head::pointer(head) {
            return self.fail(ValidateErrorKind::PointerExpected(type_head::tag(head)));
        }
        let n_domains = self.u16_at(offset + 2, "error type")?;
        self.require(
            offset + format::ERROR_TYPE_BLOB_SIZE as usize + n_domains as usize * 2,
            "error type domains",
        )?;
        for i in 0..n_domains as usize {
            let index = self.u16_at(offset + 4 + i * 2, "error type domain")?;
            self.entry_of_kind(index, &[blob_type::ERROR_DOMAIN], "an error domain")?;
        }
        Ok(())
    }

    // Callables.

    fn signature(&mut self, offset: usize) -> Result<(), ValidateError> {
        self.require(offset + format::SIGNATURE_BLOB_SIZE as usize, "signature")?;
        let return_slot = self.u32_at(offset + format::signature::RETURN_TYPE, "signature")?;
        // A zero slot is a void return written with no flags; anything else
        // must parse as a type.
        if return_slot != 0 {
            self.type_slot(offset + format::signature::RETURN_TYPE)?;
        }
        let n_arguments = self.u16_at(offset + format::signature::N_ARGUMENTS, "signature")?;
        for i in 0..n_arguments as usize {
            self.arg(
                offset + format::SIGNATURE_BLOB_SIZE as usize + i * format::ARG_BLOB_SIZE as usize,
            )?;
        }
        Ok(())
    }

    fn arg(&mut self, offset: usize) -> Result<(), ValidateError> {
        self.require(offset + format::ARG_BLOB_SIZE as usize, "argument")?;
        let name = self.u32_at(offset + format::arg::NAME, "argument")?;
        self.name("argument", name)?;
        self.push_context("argument", name);
        let flags = self.u32_at(offset + format::arg::FLAGS, "argument")?;
        let scope = ((flags & format::arg::SCOPE_MASK) >> format::arg::SCOPE_SHIFT) as u8;
        if scope > 3 {
            return self.fail(ValidateErrorKind::InvalidScope(scope));
        }
        self.type_slot(offset + format::arg::TYPE)?;
        self.pop_context();
        Ok(())
    }

    fn function(&mut self, offset: usize, container: u16) -> Result<(), ValidateError> {
        use format::function as f;

        self.require(offset + format::FUNCTION_BLOB_SIZE as usize, "function")?;
        let found = self.u16_at(offset + f::BLOB_TYPE, "function")?;
        if found != blob_type::FUNCTION {
            return self.fail(ValidateErrorKind::WrongBlobType {
                expected: blob_type::FUNCTION,
                found,
            });
        }
        let name = self.u32_at(offset + f::NAME, "function")?;
        self.name("function", name)?;
        self.push_context("function", name);
        self.name("function symbol", self.u32_at(offset + f::SYMBOL, "function")?)?;

        let flags = self.u16_at(offset + f::FLAGS, "function")?;
        let is_wrapper_kind = flags & (f::FLAG_SETTER | f::FLAG_GETTER | f::FLAG_WRAPS_VFUNC) != 0;
        let wrapper_bits = [f::FLAG_SETTER, f::FLAG_GETTER, f::FLAG_WRAPS_VFUNC]
            .iter()
            .filter(|&&bit| flags & bit != 0)
            .count();
        if wrapper_bits > 1 {
            return self.fail(ValidateErrorKind::ConflictingWrapperBits);
        }

        if flags & f::FLAG_CONSTRUCTOR != 0 {
            match container {
                blob_type::BOXED
                | blob_type::STRUCT
                | blob_type::UNION
                | blob_type::OBJECT
                | blob_type::INTERFACE => {}
                _ => return self.fail(ValidateErrorKind::ConstructorNotAllowed),
            }
        }
        if is_wrapper_kind {
            match container {
                blob_type::OBJECT | blob_type::INTERFACE => {}
                _ => return self.fail(ValidateErrorKind::WrapperNotAllowed),
            }
        }
        if self.u16_at(offset + f::INDEX, "function")? != 0 && !is_wrapper_kind {
            return self.fail(ValidateErrorKind::IndexWithoutWrapperBits);
        }

        let signature = self.u32_at(offset + f::SIGNATURE, "function")?;
        self.signature(signature as usize)?;

        if flags & f::FLAG_CONSTRUCTOR != 0 {
            let return_slot =
                self.u32_at(signature as usize + format::signature::RETURN_TYPE, "signature")?;
            let ok = !type_slot::is_inline(return_slot)
                && self
                    .u8_at(return_slot as usize, "constructor return")
                    .map(|head| type_head::tag(head) == 23)
                    .unwrap_or(false);
            if !ok {
                return self.fail(ValidateErrorKind::InvalidConstructorReturn);
            }
        }

        self.pop_context();
        Ok(())
    }

    fn callback(&mut self, offset: usize) -> Result<(), ValidateError> {
        use format::callback as c;

        self.require(offset + format::CALLBACK_BLOB_SIZE as usize, "callback")?;
        let found = self.u16_at(offset + c::BLOB_TYPE, "callback")?;
        if found != blob_type::CALLBACK {
            return self.fail(ValidateErrorKind::WrongBlobType {
                expected: blob_type::CALLBACK,
                found,
            });
        }
        let name = self.u32_at(offset + c::NAME, "callback")?;
        self.name("callback", name)?;
        self.push_context("callback", name);
        let signature = self.u32_at(offset + c::SIGNATURE, "callback")?;
        self.signature(signature as usize)?;
        self.pop_context();
        Ok(())
    }

    // Members.

    fn field(&mut self, offset: usize) -> Result<(), ValidateError> {
        self.require(offset + format::FIELD_BLOB_SIZE as usize, "field")?;
        let name = self.u32_at(offset + format::field::NAME, "field")?;
        self.name("field", name)?;
        self.push_context("field", name);
        self.type_slot(offset + format::field::TYPE)?;
        self.pop_context();
        Ok(())
    }

    fn property(&mut self, offset: usize) -> Result<(), ValidateError> {
        self.require(offset + format::PROPERTY_BLOB_SIZE as usize, "property")?;
        let name = self.u32_at(offset + format::property::NAME, "property")?;
        self.name("property", name)?;
        self.push_context("property", name);
        self.type_slot(offset + format::property::TYPE)?;
        self.pop_context();
        Ok(())
    }

    fn signal(&mut self, offset: usize, n_signals: u16) -> Result<(), ValidateError> {
        use format::signal as s;

        self.require(offset + format::SIGNAL_BLOB_SIZE as usize, "signal")?;
        let name = self.u32_at(offset + s::NAME, "signal")?;
        self.name("signal", name)?;
        self.push_context("signal", name);

        let flags = self.u16_at(offset + s::FLAGS, "signal")?;
        let run_bits = [s::FLAG_RUN_FIRST, s::FLAG_RUN_LAST, s::FLAG_RUN_CLEANUP]
            .iter()
            .filter(|&&bit| flags & bit != 0)
            .count();
        if run_bits != 1 {
            return self.fail(ValidateErrorKind::InvalidSignalRunFlags);
        }

        if flags & s::FLAG_HAS_CLASS_CLOSURE != 0 {
            let closure = self.u16_at(offset + s::CLASS_CLOSURE, "signal")?;
            if closure >= n_signals {
                return self.fail(ValidateErrorKind::InvalidClassClosure(closure));
            }
        }

        let signature = self.u32_at(offset + s::SIGNATURE, "signal")?;
        self.signature(signature as usize)?;
        self.pop_context();
        Ok(())
    }

    fn vfunc(&mut self, offset: usize, n_methods: u16) -> Result<(), ValidateError> {
        use format::vfunc as v;

        self.require(offset + format::VFUNC_BLOB_SIZE as usize, "vfunc")?;
        let name = self.u32_at(offset + v::NAME, "vfunc")?;
        self.name("vfunc", name)?;
        self.push_context("vfunc", name);

        let invoker = self.u16_at(offset + v::INVOKER, "vfunc")?;
        if invoker != v::NO_INVOKER && invoker >= n_methods {
            return self.fail(ValidateErrorKind::InvalidInvoker(invoker));
        }

        let signature = self.u32_at(offset + v::SIGNATURE, "vfunc")?;
        self.signature(signature as usize)?;
        self.pop_context();
        Ok(())
    }

    fn value(&mut self, offset: usize) -> Result<(), ValidateError> {
        self.require(offset + format::VALUE_BLOB_SIZE as usize, "value")?;
        self.name("value", self.u32_at(offset + format::value::NAME, "value")?)?;
        Ok(())
    }

    fn constant(&mut self, offset: usize) -> Result<(), ValidateError> {
        use format::constant as c;

        self.require(offset + format::CONSTANT_BLOB_SIZE as usize, "constant")?;
        let found = self.u16_at(offset + c::BLOB_TYPE, "constant")?;
        if found != blob_type::CONSTANT {
            return self.fail(ValidateErrorKind::WrongBlobType {
                expected: blob_type::CONSTANT,
                found,
            });
        }
        let name = self.u32_at(offset + c::NAME, "constant")?;
        self.name("constant", name)?;
        self.push_context("constant", name);
        self.type_slot(offset + c::TYPE)?;

        let value_offset = self.u32_at(offset + c::OFFSET, "constant")?;
        if !is_aligned(value_offset) {
            return self.fail(ValidateErrorKind::Misaligned("constant value"));
        }
        let size = self.u32_at(offset + c::SIZE, "constant")?;
        self.require(value_offset as usize + size as usize, "constant value")?;

        let slot = self.u32_at(offset + c::TYPE, "constant")?;
        if !type_slot::is_inline(slot) {
            return self.fail(ValidateErrorKind::ConstantNotBasic);
        }
        let tag = type_slot::inline_tag(slot);
        if tag == 0 {
            return self.fail(ValidateErrorKind::ConstantVoidType);
        }
        match fixed_constant_size(tag) {
            Some(expected) if size != expected => {
                return self.fail(ValidateErrorKind::ConstantSizeMismatch {
                    declared: size,
                    expected,
                });
            }
            Some(_) => {}
            None => {
                // String payload: size includes the NUL, which must be there.
                if size == 0
                    || self.typelib.u8_at(value_offset as usize + size as usize - 1) != Some(0)
                {
                    return self.fail(ValidateErrorKind::ConstantStringUnterminated);
                }
            }
        }
        self.pop_context();
        Ok(())
    }

    // Aggregates.

    fn check_aggregate_layout(&self, size: u32, alignment: u16) -> Result<(), ValidateError> {
        if alignment == 0 {
            // Layout was never computed (pointer-only or disguised record).
            return Ok(());
        }
        if !matches!(alignment, 1 | 2 | 4 | 8) {
            return self.fail(ValidateErrorKind::InvalidAlignment(alignment));
        }
        if size % alignment as u32 != 0 {
            return self.fail(ValidateErrorKind::UnalignedSize { size, alignment });
        }
        Ok(())
    }

    /// Registered types carry both gtype strings, unregistered ones neither.
    fn gtype_pair(
        &self,
        what: &'static str,
        unregistered: bool,
        gtype_name: u32,
        gtype_init: u32,
    ) -> Result<(), ValidateError> {
        if unregistered {
            if gtype_name != 0 || gtype_init != 0 {
                return self.fail(ValidateErrorKind::UnexpectedGType(what));
            }
        } else {
            self.name(what, gtype_name)?;
            self.name(what, gtype_init)?;
        }
        Ok(())
    }

    fn struct_blob(&mut self, offset: usize, expected: u16) -> Result<(), ValidateError> {
        use format::struct_blob as s;

        self.require(offset + format::STRUCT_BLOB_SIZE as usize, "struct")?;
        let found = self.u16_at(offset + s::BLOB_TYPE, "struct")?;
        if found != expected {
            return self.fail(ValidateErrorKind::WrongBlobType { expected, found });
        }
        let name = self.u32_at(offset + s::NAME, "struct")?;
        self.name("struct", name)?;
        self.push_context("struct", name);

        let flags = self.u16_at(offset + s::FLAGS, "struct")?;
        self.gtype_pair(
            "struct",
            flags & s::FLAG_UNREGISTERED != 0,
            self.u32_at(offset + s::GTYPE_NAME, "struct")?,
            self.u32_at(offset + s::GTYPE_INIT, "struct")?,
        )?;
        self.check_aggregate_layout(
            self.u32_at(offset + s::SIZE, "struct")?,
            self.u16_at(offset + s::ALIGNMENT, "struct")?,
        )?;

        let n_fields = self.u16_at(offset + s::N_FIELDS, "struct")?;
        let n_methods = self.u16_at(offset + s::N_METHODS, "struct")?;
        let mut cursor = offset + format::STRUCT_BLOB_SIZE as usize;
        self.require(
            cursor
                + n_fields as usize * format::FIELD_BLOB_SIZE as usize
                + n_methods as usize * format::FUNCTION_BLOB_SIZE as usize,
            "struct members",
        )?;
        for _ in 0..n_fields {
            self.field(cursor)?;
            cursor += format::FIELD_BLOB_SIZE as usize;
        }
        for _ in 0..n_methods {
            self.function(cursor, expected)?;
            cursor += format::FUNCTION_BLOB_SIZE as usize;
        }

        self.pop_context();
        Ok(())
    }

    fn enum_blob(&mut self, offset: usize, expected: u16) -> Result<(), ValidateError> {
        use format::enum_blob as e;

        self.require(offset + format::ENUM_BLOB_SIZE as usize, "enum")?;
        let found = self.u16_at(offset + e::BLOB_TYPE, "enum")?;
        if found != expected {
            return self.fail(ValidateErrorKind::WrongBlobType { expected, found });
        }
        let name = self.u32_at(offset + e::NAME, "enum")?;
        self.name("enum", name)?;
        self.push_context("enum", name);

        let flags = self.u16_at(offset + e::FLAGS, "enum")?;
        self.gtype_pair(
            "enum",
            flags & e::FLAG_UNREGISTERED != 0,
            self.u32_at(offset + e::GTYPE_NAME, "enum")?,
            self.u32_at(offset + e::GTYPE_INIT, "enum")?,
        )?;

        // Storage must be one of the fixed-width integer tags.
        let storage = self.u16_at(offset + e::STORAGE_TYPE, "enum")?;
        if !(2..=9).contains(&storage) {
            return self.fail(ValidateErrorKind::InvalidStorageType(storage));
        }

        let n_values = self.u16_at(offset + e::N_VALUES, "enum")?;
        let mut cursor = offset + format::ENUM_BLOB_SIZE as usize;
        self.require(
            cursor + n_values as usize * format::VALUE_BLOB_SIZE as usize,
            "enum values",
        )?;
        for _ in 0..n_values {
            self.value(cursor)?;
            cursor += format::VALUE_BLOB_SIZE as usize;
        }

        self.pop_context();
        Ok(())
    }

    fn object(&mut self, offset: usize) -> Result<(), ValidateError> {
        use format::object as o;

        self.require(offset + format::OBJECT_BLOB_SIZE as usize, "object")?;
        let found = self.u16_at(offset + o::BLOB_TYPE, "object")?;
        if found != blob_type::OBJECT {
            return self.fail(ValidateErrorKind::WrongBlobType {
                expected: blob_type::OBJECT,
                found,
            });
        }
        let name = self.u32_at(offset + o::NAME, "object")?;
        self.name("object", name)?;
        self.name("object", self.u32_at(offset + o::GTYPE_NAME, "object")?)?;
        self.name("object", self.u32_at(offset + o::GTYPE_INIT, "object")?)?;
        self.push_context("object", name);

        let parent = self.u16_at(offset + o::PARENT, "object")?;
        if parent != 0 {
            self.entry_of_kind(parent, &[blob_type::OBJECT], "an object")?;
        }
        let gtype_struct = self.u16_at(offset + o::GTYPE_STRUCT, "object")?;
        if gtype_struct != 0 {
            self.entry_of_kind(gtype_struct, &[blob_type::STRUCT], "a struct")?;
        }

        let n_interfaces = self.u16_at(offset + o::N_INTERFACES, "object")?;
        let n_fields = self.u16_at(offset + o::N_FIELDS, "object")?;
        let n_properties = self.u16_at(offset + o::N_PROPERTIES, "object")?;
        let n_methods = self.u16_at(offset + o::N_METHODS, "object")?;
        let n_signals = self.u16_at(offset + o::N_SIGNALS, "object")?;
        let n_vfuncs = self.u16_at(offset + o::N_VFUNCS, "object")?;
        let n_constants = self.u16_at(offset + o::N_CONSTANTS, "object")?;

        let iface_bytes = (n_interfaces as usize + n_interfaces as usize % 2) * 2;
        self.require(
            offset
                + format::OBJECT_BLOB_SIZE as usize
                + iface_bytes
                + n_fields as usize * format::FIELD_BLOB_SIZE as usize
                + n_properties as usize * format::PROPERTY_BLOB_SIZE as usize
                + n_methods as usize * format::FUNCTION_BLOB_SIZE as usize
                + n_signals as usize * format::SIGNAL_BLOB_SIZE as usize
                + n_vfuncs as usize * format::VFUNC_BLOB_SIZE as usize
                + n_constants as usize * format::CONSTANT_BLOB_SIZE as usize,
            "object members",
        )?;

        let mut cursor = offset + format::OBJECT_BLOB_SIZE as usize;
        for _ in 0..n_interfaces {
            let index = self.u16_at(cursor, "object interfaces")?;
            self.entry_of_kind(index, &[blob_type::INTERFACE], "an interface")?;
            cursor += 2;
        }
        cursor += 2 * (n_interfaces as usize % 2);

        for _ in 0..n_fields {
            self.field(cursor)?;
            cursor += format::FIELD_BLOB_SIZE as usize;
        }
        for _ in 0..n_properties {
            self.property(cursor)?;
            cursor += format::PROPERTY_BLOB_SIZE as usize;
        }
        for _ in 0..n_methods {
            self.function(cursor, blob_type::OBJECT)?;
            cursor += format::FUNCTION_BLOB_SIZE as usize;
        }
        for _ in 0..n_signals {
            self.signal(cursor, n_signals)?;
            cursor += format::SIGNAL_BLOB_SIZE as usize;
        }
        for _ in 0..n_vfuncs {
            self.vfunc(cursor, n_methods)?;
            cursor += format::VFUNC_BLOB_SIZE as usize;
        }
        for _ in 0..n_constants {
            self.constant(cursor)?;
            cursor += format::CONSTANT_BLOB_SIZE as usize;
        }

        self.pop_context();
        Ok(())
    }

    fn interface(&mut self, offset: usize) -> Result<(), ValidateError> {
        use format::interface as i;

        self.require(offset + format::INTERFACE_BLOB_SIZE as usize, "interface")?;
        let found = self.u16_at(offset + i::BLOB_TYPE, "interface")?;
        if found != blob_type::INTERFACE {
            return self.fail(ValidateErrorKind::WrongBlobType {
                expected: blob_type::INTERFACE,
                found,
            });
        }
        let name = self.u32_at(offset + i::NAME, "interface")?;
        self.name("interface", name)?;
        self.name("interface", self.u32_at(offset + i::GTYPE_NAME, "interface")?)?;
        self.name("interface", self.u32_at(offset + i::GTYPE_INIT, "interface")?)?;
        self.push_context("interface", name);

        let gtype_struct = self.u16_at(offset + i::GTYPE_STRUCT, "interface")?;
        if gtype_struct != 0 {
            self.entry_of_kind(gtype_struct, &[blob_type::STRUCT], "a struct")?;
        }

        let n_prerequisites = self.u16_at(offset + i::N_PREREQUISITES, "interface")?;
        let n_properties = self.u16_at(offset + i::N_PROPERTIES, "interface")?;
        let n_methods = self.u16_at(offset + i::N_METHODS, "interface")?;
        let n_signals = self.u16_at(offset + i::N_SIGNALS, "interface")?;
        let n_vfuncs = self.u16_at(offset + i::N_VFUNCS, "interface")?;
        let n_constants = self.u16_at(offset + i::N_CONSTANTS, "interface")?;

        let prereq_bytes = (n_prerequisites as usize + n_prerequisites as usize % 2) * 2;
        self.require(
            offset
                + format::INTERFACE_BLOB_SIZE as usize
                + prereq_bytes
                + n_properties as usize * format::PROPERTY_BLOB_SIZE as usize
                + n_methods as usize * format::FUNCTION_BLOB_SIZE as usize
                + n_signals as usize * format::SIGNAL_BLOB_SIZE as usize
                + n_vfuncs as usize * format::VFUNC_BLOB_SIZE as usize
                + n_constants as usize * format::CONSTANT_BLOB_SIZE as usize,
            "interface members",
        )?;

        let mut cursor = offset + format::INTERFACE_BLOB_SIZE as usize;
        for _ in 0..n_prerequisites {
            let index = self.u16_at(cursor, "interface prerequisites")?;
            self.entry_of_kind(
                index,
                &[blob_type::INTERFACE, blob_type::OBJECT],
                "an interface or object",
            )?;
            cursor += 2;
        }
        cursor += 2 * (n_prerequisites as usize % 2);

        for _ in 0..n_properties {
            self.property(cursor)?;
            cursor += format::PROPERTY_BLOB_SIZE as usize;
        }
        for _ in 0..n_methods {
            self.function(cursor, blob_type::INTERFACE)?;
            cursor += format::FUNCTION_BLOB_SIZE as usize;
        }
        for _ in 0..n_signals {
            self.signal(cursor, n_signals)?;
            cursor += format::SIGNAL_BLOB_SIZE as usize;
        }
        for _ in 0..n_vfuncs {
            self.vfunc(cursor, n_methods)?;
            cursor += format::VFUNC_BLOB_SIZE as usize;
        }
        for _ in 0..n_constants {
            self.constant(cursor)?;
            cursor += format::CONSTANT_BLOB_SIZE as usize;
        }

        self.pop_context();
        Ok(())
    }

    fn error_domain(&mut self, offset: usize) -> Result<(), ValidateError> {
        use format::error_domain as e;

        self.require(offset + format::ERROR_DOMAIN_BLOB_SIZE as usize, "error domain")?;
        let found = self.u16_at(offset + e::BLOB_TYPE, "error domain")?;
        if found != blob_type::ERROR_DOMAIN {
            return self.fail(ValidateErrorKind::WrongBlobType {
                expected: blob_type::ERROR_DOMAIN,
                found,
            });
        }
        let name = self.u32_at(offset + e::NAME, "error domain")?;
        self.name("error domain", name)?;
        self.push_context("error domain", name);
        self.name("quark function", self.u32_at(offset + e::GET_QUARK, "error domain")?)?;
        let codes = self.u16_at(offset + e::ERROR_CODES, "error domain")?;
        self.entry_of_kind(codes, &[blob_type::ENUM, blob_type::FLAGS], "an enum")?;
        self.pop_context();
        Ok(())
    }

    fn union_blob(&mut self, offset: usize) -> Result<(), ValidateError> {
        use format::union_blob as u;

        self.require(offset + format::UNION_BLOB_SIZE as usize, "union")?;
        let found = self.u16_at(offset + u::BLOB_TYPE, "union")?;
        if found != blob_type::UNION {
            return self.fail(ValidateErrorKind::WrongBlobType {
                expected: blob_type::UNION,
                found,
            });
        }
        let name = self.u32_at(offset + u::NAME, "union")?;
        self.name("union", name)?;
        self.push_context("union", name);

        let flags = self.u16_at(offset + u::FLAGS, "union")?;
        self.gtype_pair(
            "union",
            flags & u::FLAG_UNREGISTERED != 0,
            self.u32_at(offset + u::GTYPE_NAME, "union")?,
            self.u32_at(offset + u::GTYPE_INIT, "union")?,
        )?;
        self.check_aggregate_layout(
            self.u32_at(offset + u::SIZE, "union")?,
            self.u16_at(offset + u::ALIGNMENT, "union")?,
        )?;

        let discriminated = flags & u::FLAG_DISCRIMINATED != 0;
        if discriminated {
            self.type_slot(offset + u::DISCRIMINATOR_TYPE)?;
        }

        let n_fields = self.u16_at(offset + u::N_FIELDS, "union")?;
        let n_functions = self.u16_at(offset + u::N_FUNCTIONS, "union")?;
        let n_discriminators = if discriminated { n_fields } else { 0 };
        self.require(
            offset
                + format::UNION_BLOB_SIZE as usize
                + n_fields as usize * format::FIELD_BLOB_SIZE as usize
                + n_functions as usize * format::FUNCTION_BLOB_SIZE as usize
                + n_discriminators as usize * format::CONSTANT_BLOB_SIZE as usize,
            "union members",
        )?;

        let mut cursor = offset + format::UNION_BLOB_SIZE as usize;
        for _ in 0..n_fields {
            self.field(cursor)?;
            cursor += format::FIELD_BLOB_SIZE as usize;
        }
        for _ in 0..n_functions {
            self.function(cursor, blob_type::UNION)?;
            cursor += format::FUNCTION_BLOB_SIZE as usize;
        }
        for _ in 0..n_discriminators {
            self.constant(cursor)?;
            cursor += format::CONSTANT_BLOB_SIZE as usize;
        }

        self.pop_context();
        Ok(())
    }

    fn attributes(&mut self) -> Result<(), ValidateError> {
        let typelib = self.typelib;
        let n_attributes = typelib.n_attributes();
        if n_attributes == 0 {
            return Ok(());
        }
        let base = typelib.attributes_offset() as usize;
        let end = base + n_attributes as usize * format::ATTRIBUTE_BLOB_SIZE as usize;
        if (typelib.declared_size() as usize) < end {
            return self.fail(ValidateErrorKind::TooShort("attributes"));
        }
        for i in 0..n_attributes as usize {
            let record = base + i * format::ATTRIBUTE_BLOB_SIZE as usize;
            // Keys and values are unconstrained payloads, not identifiers.
            self.payload_string(
                "attribute key",
                self.u32_at(record + format::attribute::NAME, "attribute")?,
            )?;
            self.payload_string(
                "attribute value",
                self.u32_at(record + format::attribute::VALUE, "attribute")?,
            )?;
        }
        Ok(())
    }
}

fn fixed_constant_size(tag: u8) -> Option<u32> {
    match tag {
        1 => Some(4),
        2 | 3 => Some(1),
        4 | 5 => Some(2),
        6 | 7 => Some(4),
        8 | 9 => Some(8),
        10 | 11 => Some(4),
        12..=15 | 18 => Some(8),
        16 => Some(4),
        17 => Some(8),
        // gtype, utf8, filename: variable or pointer-sized payloads.
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{header, HEADER_SIZE, MAGIC};

    fn minimal_header() -> Vec<u8> {
        let mut data = vec![0u8; HEADER_SIZE as usize];
        data[..16].copy_from_slice(MAGIC);
        data[header::MAJOR_VERSION] = format::MAJOR_VERSION;
        data[header::MINOR_VERSION] = format::MINOR_VERSION;
        data[header::DIRECTORY..header::DIRECTORY + 4]
            .copy_from_slice(&HEADER_SIZE.to_le_bytes());
        let sizes: &[(usize, u16)] = &[
            (header::ENTRY_BLOB_SIZE, format::DIR_ENTRY_SIZE),
            (header::FUNCTION_BLOB_SIZE, format::FUNCTION_BLOB_SIZE),
            (header::CALLBACK_BLOB_SIZE, format::CALLBACK_BLOB_SIZE),
            (header::SIGNAL_BLOB_SIZE, format::SIGNAL_BLOB_SIZE),
            (header::VFUNC_BLOB_SIZE, format::VFUNC_BLOB_SIZE),
            (header::ARG_BLOB_SIZE, format::ARG_BLOB_SIZE),
            (header::PROPERTY_BLOB_SIZE, format::PROPERTY_BLOB_SIZE),
            (header::FIELD_BLOB_SIZE, format::FIELD_BLOB_SIZE),
            (header::VALUE_BLOB_SIZE, format::VALUE_BLOB_SIZE),
            (header::ATTRIBUTE_BLOB_SIZE, format::ATTRIBUTE_BLOB_SIZE),
            (header::CONSTANT_BLOB_SIZE, format::CONSTANT_BLOB_SIZE),
            (header::ERROR_DOMAIN_BLOB_SIZE, format::ERROR_DOMAIN_BLOB_SIZE),
            (header::SIGNATURE_BLOB_SIZE, format::SIGNATURE_BLOB_SIZE),
            (header::ENUM_BLOB_SIZE, format::ENUM_BLOB_SIZE),
            (header::STRUCT_BLOB_SIZE, format::STRUCT_BLOB_SIZE),
            (header::OBJECT_BLOB_SIZE, format::OBJECT_BLOB_SIZE),
            (header::INTERFACE_BLOB_SIZE, format::INTERFACE_BLOB_SIZE),
            (header::UNION_BLOB_SIZE, format::UNION_BLOB_SIZE),
        ];
        for &(offset, value) in sizes {
            data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
        }
        // Namespace string "T" appended after the (empty) directory.
        data.extend_from_slice(b"T\0\0\0");
        let len = data.len() as u32;
        data[header::SIZE..header::SIZE + 4].copy_from_slice(&len.to_le_bytes());
        data[header::NAMESPACE..header::NAMESPACE + 4]
            .copy_from_slice(&HEADER_SIZE.to_le_bytes());
        data
    }

    #[test]
    fn minimal_image_validates() {
        let typelib = Typelib::from_bytes(minimal_header());
        validate(&typelib).unwrap();
    }

    #[test]
    fn short_buffer_is_rejected() {
        let typelib = Typelib::from_bytes(vec![0u8; 10]);
        let err = validate(&typelib).unwrap_err();
        assert_eq!(err.kind, ValidateErrorKind::TooShort("header"));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut data = minimal_header();
        data[0] = b'X';
        let err = validate(&Typelib::from_bytes(data)).unwrap_err();
        assert_eq!(err.kind, ValidateErrorKind::BadMagic);
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let mut data = minimal_header();
        data[header::MAJOR_VERSION] = 9;
        let err = validate(&Typelib::from_bytes(data)).unwrap_err();
        assert!(matches!(err.kind, ValidateErrorKind::VersionMismatch { major: 9, .. }));
    }

    #[test]
    fn size_mismatch_is_rejected() {
        let mut data = minimal_header();
        data.push(0);
        let err = validate(&Typelib::from_bytes(data)).unwrap_err();
        assert!(matches!(err.kind, ValidateErrorKind::SizeMismatch { .. }));
    }

    #[test]
    fn blob_size_drift_is_rejected() {
        let mut data = minimal_header();
        data[header::FUNCTION_BLOB_SIZE] = 99;
        let err = validate(&Typelib::from_bytes(data)).unwrap_err();
        assert_eq!(err.kind, ValidateErrorKind::BlobSizeMismatch("function"));
    }

    #[test]
    fn misaligned_directory_is_rejected() {
        let mut data = minimal_header();
        let odd = HEADER_SIZE + 2;
        data[header::DIRECTORY..header::DIRECTORY + 4].copy_from_slice(&odd.to_le_bytes());
        let err = validate(&Typelib::from_bytes(data)).unwrap_err();
        assert_eq!(err.kind, ValidateErrorKind::Misaligned("directory"));
    }

    #[test]
    fn attribute_count_without_table_is_rejected() {
        let mut data = minimal_header();
        data[header::N_ATTRIBUTES..header::N_ATTRIBUTES + 4]
            .copy_from_slice(&2u32.to_le_bytes());
        let err = validate(&Typelib::from_bytes(data)).unwrap_err();
        assert_eq!(err.kind, ValidateErrorKind::MissingAttributes);
    }

    #[test]
    fn namespace_with_bad_characters_is_rejected() {
        let mut data = minimal_header();
        let at = HEADER_SIZE as usize;
        data[at] = b'!';
        let err = validate(&Typelib::from_bytes(data)).unwrap_err();
        assert!(matches!(err.kind, ValidateErrorKind::InvalidName { .. }));
    }
}
