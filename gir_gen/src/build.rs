//! Two-phase typelib serialization.
//!
//! Phase A walks the IR and sums each node's worst-case contribution to the
//! image (fixed blob, variable tails, strings, pooled types). Phase B
//! reserves a buffer of that size and writes: header, directory, then for
//! every local entry the fixed blob at its reserved offset with the
//! variable-size payloads appended at the separately tracked secondary
//! offset. The buffer is truncated to the final secondary offset at the
//! end, so over-reservation (string and type dedup, dropped members) only
//! costs transient memory.
//!
//! Cross-references are materialized as stub entries before sizing, so a
//! single pass normally suffices; a name that still fails to resolve while
//! writing records a new stub and restarts the emission, which terminates
//! because stubs themselves reference nothing.

use gir_types::{Module, Node, NodeKind, NodeKindId, ParamNode, TypeNode, TypeTag, XRefNode};
use gir_typelib::format::{
    self, align, blob_type, type_head, type_slot, ARG_BLOB_SIZE, CALLBACK_BLOB_SIZE,
    CONSTANT_BLOB_SIZE, DIR_ENTRY_SIZE, ENUM_BLOB_SIZE, ERROR_DOMAIN_BLOB_SIZE, FIELD_BLOB_SIZE,
    FUNCTION_BLOB_SIZE, HEADER_SIZE, INTERFACE_BLOB_SIZE, OBJECT_BLOB_SIZE, PROPERTY_BLOB_SIZE,
    SIGNAL_BLOB_SIZE, SIGNATURE_BLOB_SIZE, STRUCT_BLOB_SIZE, UNION_BLOB_SIZE, VALUE_BLOB_SIZE,
    VFUNC_BLOB_SIZE,
};
use gir_typelib::Typelib;
use log::{debug, warn};

use crate::canon::canonical_type;
use crate::error::BuildError;
use crate::offsets::{compute_offsets, enum_storage_tag};
use crate::pools::{StringPool, TypePool};

/// Serialize `module` into a typelib image. The other parsed modules are
/// consulted for cross-namespace lookups. Entries gain xref stubs for every
/// foreign name the module references; field offsets and aggregate sizes
/// are computed first.
pub fn build_typelib(module: &mut Module, modules: &[Module]) -> Result<Typelib, BuildError> {
    for entry in &module.entries {
        if entry.name.contains('.') {
            return Err(BuildError::NameContainsDot(entry.name.clone()));
        }
    }
    for (i, entry) in module.entries.iter().enumerate() {
        if module.entries[..i].iter().any(|e| e.name == entry.name) {
            return Err(BuildError::DuplicateEntry(entry.name.clone()));
        }
    }

    compute_offsets(module, modules)?;

    // Local entries first, stubs at the tail; the directory relies on it.
    module
        .entries
        .sort_by_key(|entry| matches!(entry.kind, NodeKind::XRef(_)));

    for (namespace, name) in collect_foreign_refs(module) {
        debug!("creating xref {namespace}.{name}");
        module.entries.push(Node::new(
            name,
            NodeKind::XRef(XRefNode { namespace }),
        ));
    }

    loop {
        let outcome = {
            let mut writer = Writer::new(&*module, modules);
            writer.write()?
        };
        match outcome {
            Written::Done(typelib) => return Ok(typelib),
            Written::Restart(stubs) => {
                debug!("found implicit cross references, starting over");
                for (namespace, name) in stubs {
                    module.entries.push(Node::new(
                        name,
                        NodeKind::XRef(XRefNode { namespace }),
                    ));
                }
            }
        }
    }
}

// Reference collection.

fn collect_foreign_refs(module: &Module) -> Vec<(String, String)> {
    let mut names: Vec<String> = Vec::new();
    for entry in &module.entries {
        collect_node_refs(entry, &mut names);
    }

    let mut stubs: Vec<(String, String)> = Vec::new();
    for name in names {
        let Some((namespace, bare)) = name.split_once('.') else {
            continue;
        };
        if namespace == module.name {
            continue;
        }
        let exists = module.entries.iter().any(|entry| match &entry.kind {
            NodeKind::XRef(xref) => xref.namespace == namespace && entry.name == bare,
            _ => false,
        }) || stubs
            .iter()
            .any(|(ns, n)| ns == namespace && n == bare);
        if !exists {
            stubs.push((namespace.to_string(), bare.to_string()));
        }
    }
    stubs
}

fn collect_node_refs(node: &Node, out: &mut Vec<String>) {
    match &node.kind {
        NodeKind::Function(f) | NodeKind::Callback(f) => {
            collect_type_refs(&f.result.ty, out);
            for param in &f.parameters {
                collect_type_refs(&param.ty, out);
            }
        }
        NodeKind::Signal(s) => {
            collect_type_refs(&s.result.ty, out);
            for param in &s.parameters {
                collect_type_refs(&param.ty, out);
            }
        }
        NodeKind::VFunc(v) => {
            collect_type_refs(&v.result.ty, out);
            for param in &v.parameters {
                collect_type_refs(&param.ty, out);
            }
        }
        NodeKind::Field(f) => collect_type_refs(&f.ty, out),
        NodeKind::Property(p) => collect_type_refs(&p.ty, out),
        NodeKind::Constant(c) => collect_type_refs(&c.ty, out),
        NodeKind::ErrorDomain(e) => out.push(e.codes.clone()),
        NodeKind::Enum(_) | NodeKind::Flags(_) | NodeKind::Value(_) | NodeKind::XRef(_) => {}
        NodeKind::Struct(s) => {
            for member in &s.members {
                collect_node_refs(member, out);
            }
        }
        NodeKind::Boxed(b) => {
            for member in &b.members {
                collect_node_refs(member, out);
            }
        }
        NodeKind::Union(u) => {
            if let Some(ty) = &u.discriminator_type {
                collect_type_refs(ty, out);
            }
            for member in u.members.iter().chain(&u.discriminators) {
                collect_node_refs(member, out);
            }
        }
        NodeKind::Object(o) => {
            if let Some(parent) = &o.parent {
                out.push(parent.clone());
            }
            if let Some(gtype_struct) = &o.gtype_struct {
                out.push(gtype_struct.clone());
            }
            out.extend(o.interfaces.iter().cloned());
            for member in &o.members {
                collect_node_refs(member, out);
            }
        }
        NodeKind::Interface(i) => {
            if let Some(gtype_struct) = &i.gtype_struct {
                out.push(gtype_struct.clone());
            }
            out.extend(i.prerequisites.iter().cloned());
            for member in &i.members {
                collect_node_refs(member, out);
            }
        }
    }
}

fn collect_type_refs(ty: &TypeNode, out: &mut Vec<String>) {
    if let Some(interface) = &ty.interface {
        out.push(interface.clone());
    }
    out.extend(ty.errors.iter().cloned());
    if let Some(param) = &ty.param1 {
        collect_type_refs(param, out);
    }
    if let Some(param) = &ty.param2 {
        collect_type_refs(param, out);
    }
}

// Phase A: size accounting. Every quantity is a worst case; deduplication
// and dropped members only shrink the real image.

fn str_size(text: &str) -> u32 {
    align(text.len() as u32 + 1, 4)
}

fn opt_str_size(text: &Option<String>) -> u32 {
    text.as_deref().map(str_size).unwrap_or(0)
}

fn type_full_size(ty: &TypeNode) -> u32 {
    match ty.tag {
        TypeTag::Array => {
            format::ARRAY_TYPE_BLOB_SIZE
                + ty.param1.as_deref().map(type_full_size).unwrap_or(4)
        }
        TypeTag::Interface => 4 + format::INTERFACE_TYPE_BLOB_SIZE,
        TypeTag::GList | TypeTag::GSList => {
            4 + format::PARAM_TYPE_BLOB_SIZE + ty.param1.as_deref().map(type_full_size).unwrap_or(4)
        }
        TypeTag::GHash => {
            4 + format::PARAM_TYPE_BLOB_SIZE * 2
                + ty.param1.as_deref().map(type_full_size).unwrap_or(4)
                + ty.param2.as_deref().map(type_full_size).unwrap_or(4)
        }
        TypeTag::Error => {
            let n = ty.errors.len() as u32;
            4 + format::ERROR_TYPE_BLOB_SIZE + 2 * (n + n % 2)
        }
        _ => 4,
    }
}

fn param_full_size(param: &ParamNode) -> u32 {
    let name = if param.name.is_empty() {
        0
    } else {
        str_size(&param.name)
    };
    (ARG_BLOB_SIZE as u32 - 4) + name + type_full_size(&param.ty)
}

fn node_size(node: &Node) -> u32 {
    match &node.kind {
        NodeKind::Function(_) => FUNCTION_BLOB_SIZE as u32,
        NodeKind::Callback(_) => CALLBACK_BLOB_SIZE as u32,
        NodeKind::Property(_) => PROPERTY_BLOB_SIZE as u32,
        NodeKind::Signal(_) => SIGNAL_BLOB_SIZE as u32,
        NodeKind::VFunc(_) => VFUNC_BLOB_SIZE as u32,
        NodeKind::Field(_) => FIELD_BLOB_SIZE as u32,
        NodeKind::Value(_) => VALUE_BLOB_SIZE as u32,
        NodeKind::Constant(_) => CONSTANT_BLOB_SIZE as u32,
        NodeKind::ErrorDomain(_) => ERROR_DOMAIN_BLOB_SIZE as u32,
        NodeKind::XRef(_) => 0,
        NodeKind::Enum(e) | NodeKind::Flags(e) => {
            ENUM_BLOB_SIZE as u32 + e.values.iter().map(node_size).sum::<u32>()
        }
        NodeKind::Struct(s) => {
            STRUCT_BLOB_SIZE as u32 + s.members.iter().map(node_size).sum::<u32>()
        }
        NodeKind::Boxed(b) => {
            STRUCT_BLOB_SIZE as u32 + b.members.iter().map(node_size).sum::<u32>()
        }
        NodeKind::Union(u) => {
            UNION_BLOB_SIZE as u32
                + u.members.iter().map(node_size).sum::<u32>()
                + u.discriminators.iter().map(node_size).sum::<u32>()
        }
        NodeKind::Object(o) => {
            let n = o.interfaces.len() as u32;
            OBJECT_BLOB_SIZE as u32
                + 2 * (n + n % 2)
                + o.members.iter().map(node_size).sum::<u32>()
        }
        NodeKind::Interface(i) => {
            let n = i.prerequisites.len() as u32;
            INTERFACE_BLOB_SIZE as u32
                + 2 * (n + n % 2)
                + i.members.iter().map(node_size).sum::<u32>()
        }
    }
}

fn node_full_size(node: &Node) -> u32 {
    let name = str_size(&node.name);
    let size = match &node.kind {
        NodeKind::Function(f) => {
            FUNCTION_BLOB_SIZE as u32
                + name
                + str_size(&f.symbol)
                + param_full_size(&f.result)
                + f.parameters.iter().map(param_full_size).sum::<u32>()
        }
        NodeKind::Callback(f) => {
            CALLBACK_BLOB_SIZE as u32
                + name
                + param_full_size(&f.result)
                + f.parameters.iter().map(param_full_size).sum::<u32>()
        }
        NodeKind::Signal(s) => {
            SIGNAL_BLOB_SIZE as u32
                + name
                + param_full_size(&s.result)
                + s.parameters.iter().map(param_full_size).sum::<u32>()
        }
        NodeKind::VFunc(v) => {
            VFUNC_BLOB_SIZE as u32
                + name
                + param_full_size(&v.result)
                + v.parameters.iter().map(param_full_size).sum::<u32>()
        }
        NodeKind::Property(p) => PROPERTY_BLOB_SIZE as u32 + name + type_full_size(&p.ty),
        NodeKind::Field(f) => FIELD_BLOB_SIZE as u32 + name + type_full_size(&f.ty),
        NodeKind::Value(_) => VALUE_BLOB_SIZE as u32 + name,
        NodeKind::Constant(c) => {
            let payload = align((c.value.len() as u32 + 1).max(8), 4);
            CONSTANT_BLOB_SIZE as u32 + name + payload + type_full_size(&c.ty)
        }
        NodeKind::ErrorDomain(e) => ERROR_DOMAIN_BLOB_SIZE as u32 + name + str_size(&e.get_quark),
        NodeKind::XRef(x) => name + str_size(&x.namespace),
        NodeKind::Enum(e) | NodeKind::Flags(e) => {
            ENUM_BLOB_SIZE as u32
                + name
                + opt_str_size(&e.gtype_name)
                + opt_str_size(&e.gtype_init)
                + e.values.iter().map(node_full_size).sum::<u32>()
        }
        NodeKind::Struct(s) => {
            STRUCT_BLOB_SIZE as u32
                + name
                + opt_str_size(&s.gtype_name)
                + opt_str_size(&s.gtype_init)
                + s.members.iter().map(node_full_size).sum::<u32>()
        }
        NodeKind::Boxed(b) => {
            STRUCT_BLOB_SIZE as u32
                + name
                + str_size(&b.gtype_name)
                + str_size(&b.gtype_init)
                + b.members.iter().map(node_full_size).sum::<u32>()
        }
        NodeKind::Union(u) => {
            UNION_BLOB_SIZE as u32
                + name
                + opt_str_size(&u.gtype_name)
                + opt_str_size(&u.gtype_init)
                + u.discriminator_type.as_ref().map(type_full_size).unwrap_or(0)
                + u.members.iter().map(node_full_size).sum::<u32>()
                + u.discriminators.iter().map(node_full_size).sum::<u32>()
        }
        NodeKind::Object(o) => {
            let n = o.interfaces.len() as u32;
            OBJECT_BLOB_SIZE as u32
                + name
                + str_size(&o.gtype_name)
                + str_size(&o.gtype_init)
                + 2 * (n + n % 2)
                + o.members.iter().map(node_full_size).sum::<u32>()
        }
        NodeKind::Interface(i) => {
            let n = i.prerequisites.len() as u32;
            INTERFACE_BLOB_SIZE as u32
                + name
                + str_size(&i.gtype_name)
                + str_size(&i.gtype_init)
                + 2 * (n + n % 2)
                + i.members.iter().map(node_full_size).sum::<u32>()
        }
    };
    size + attribute_full_size(node)
}

/// Attribute records and their key/value strings for one node. Member and
/// value attribute sizes ride along in the `node_full_size` recursion.
fn attribute_full_size(node: &Node) -> u32 {
    node.attributes
        .iter()
        .map(|(key, value)| format::ATTRIBUTE_BLOB_SIZE as u32 + str_size(key) + str_size(value))
        .sum()
}

// Phase B.

enum Written {
    Done(Typelib),
    Restart(Vec<(String, String)>),
}

struct Writer<'a> {
    module: &'a Module,
    modules: &'a [Module],
    data: Vec<u8>,
    strings: StringPool,
    types: TypePool,
    /// (blob offset, key, value), gathered while blobs are written.
    attributes: Vec<(u32, String, String)>,
    /// Foreign names that had no stub yet; forces a restart when nonempty.
    pending_xrefs: Vec<(String, String)>,
}

impl<'a> Writer<'a> {
    fn new(module: &'a Module, modules: &'a [Module]) -> Writer<'a> {
        Writer {
            module,
            modules,
            data: Vec::new(),
            strings: StringPool::new(),
            types: TypePool::new(),
            attributes: Vec::new(),
            pending_xrefs: Vec::new(),
        }
    }

    fn put_u8(&mut self, at: u32, value: u8) {
        self.data[at as usize] = value;
    }

    fn put_u16(&mut self, at: u32, value: u16) {
        self.data[at as usize..at as usize + 2].copy_from_slice(&value.to_le_bytes());
    }

    fn put_u32(&mut self, at: u32, value: u32) {
        self.data[at as usize..at as usize + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn put_i32(&mut self, at: u32, value: i32) {
        self.data[at as usize..at as usize + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn put_bytes(&mut self, at: u32, bytes: &[u8]) {
        self.data[at as usize..at as usize + bytes.len()].copy_from_slice(bytes);
    }

    fn write_string(&mut self, offset2: &mut u32, text: &str) -> u32 {
        self.strings.write(&mut self.data, offset2, text)
    }

    fn note_attributes(&mut self, node: &Node, blob_offset: u32) {
        for (key, value) in &node.attributes {
            self.attributes
                .push((blob_offset, key.clone(), value.clone()));
        }
    }

    /// Directory index (1-based) for a top-level name; 0 when a bare name
    /// does not resolve. Foreign names without a stub are queued for the
    /// restart pass and assigned the index they will have.
    fn find_entry(&mut self, name: &str) -> Result<u16, BuildError> {
        let parts: Vec<&str> = name.split('.').collect();
        if parts.len() > 2 {
            return Err(BuildError::TooManyNameParts(name.to_string()));
        }
        if parts.len() == 1 || parts[0] == self.module.name {
            let bare = *parts.last().unwrap();
            return Ok(self.module.entry_index(bare).unwrap_or_else(|| {
                warn!("entry '{name}' not found");
                0
            }));
        }

        let (namespace, bare) = (parts[0], parts[1]);
        for (index, entry) in self.module.entries.iter().enumerate() {
            if let NodeKind::XRef(xref) = &entry.kind {
                if xref.namespace == namespace && entry.name == bare {
                    return Ok((index + 1) as u16);
                }
            }
        }
        let base = self.module.entries.len();
        if let Some(position) = self
            .pending_xrefs
            .iter()
            .position(|(ns, n)| ns == namespace && n == bare)
        {
            return Ok((base + position + 1) as u16);
        }
        self.pending_xrefs
            .push((namespace.to_string(), bare.to_string()));
        Ok((base + self.pending_xrefs.len()) as u16)
    }

    fn image_size_estimate(&self) -> u32 {
        let mut size = HEADER_SIZE + self.module.entries.len() as u32 * DIR_ENTRY_SIZE as u32;
        for entry in &self.module.entries {
            size += node_full_size(entry);
        }
        size += str_size(&self.module.name);
        size += opt_str_size(&self.module.shared_library);
        if !self.module.dependencies.is_empty() {
            size += str_size(&self.module.dependencies.join("|"));
        }
        size
    }

    fn write_header(&mut self) {
        use format::header as h;

        self.put_bytes(h::MAGIC as u32, format::MAGIC);
        self.put_u8(h::MAJOR_VERSION as u32, format::MAJOR_VERSION);
        self.put_u8(h::MINOR_VERSION as u32, format::MINOR_VERSION);

        let n_entries = self.module.entries.len() as u16;
        let n_local = self
            .module
            .entries
            .iter()
            .filter(|entry| !matches!(entry.kind, NodeKind::XRef(_)))
            .count() as u16;
        self.put_u16(h::N_ENTRIES as u32, n_entries);
        self.put_u16(h::N_LOCAL_ENTRIES as u32, n_local);
        self.put_u32(h::DIRECTORY as u32, HEADER_SIZE);

        let sizes: &[(usize, u16)] = &[
            (h::ENTRY_BLOB_SIZE, DIR_ENTRY_SIZE),
            (h::FUNCTION_BLOB_SIZE, FUNCTION_BLOB_SIZE),
            (h::CALLBACK_BLOB_SIZE, CALLBACK_BLOB_SIZE),
            (h::SIGNAL_BLOB_SIZE, SIGNAL_BLOB_SIZE),
            (h::VFUNC_BLOB_SIZE, VFUNC_BLOB_SIZE),
            (h::ARG_BLOB_SIZE, ARG_BLOB_SIZE),
            (h::PROPERTY_BLOB_SIZE, PROPERTY_BLOB_SIZE),
            (h::FIELD_BLOB_SIZE, FIELD_BLOB_SIZE),
            (h::VALUE_BLOB_SIZE, VALUE_BLOB_SIZE),
            (h::ATTRIBUTE_BLOB_SIZE, format::ATTRIBUTE_BLOB_SIZE),
            (h::CONSTANT_BLOB_SIZE, CONSTANT_BLOB_SIZE),
            (h::ERROR_DOMAIN_BLOB_SIZE, ERROR_DOMAIN_BLOB_SIZE),
            (h::SIGNATURE_BLOB_SIZE, SIGNATURE_BLOB_SIZE),
            (h::ENUM_BLOB_SIZE, ENUM_BLOB_SIZE),
            (h::STRUCT_BLOB_SIZE, STRUCT_BLOB_SIZE),
            (h::OBJECT_BLOB_SIZE, OBJECT_BLOB_SIZE),
            (h::INTERFACE_BLOB_SIZE, INTERFACE_BLOB_SIZE),
            (h::UNION_BLOB_SIZE, UNION_BLOB_SIZE),
        ];
        for &(offset, value) in sizes {
            self.put_u16(offset as u32, value);
        }
    }

    fn write(&mut self) -> Result<Written, BuildError> {
        let estimate = self.image_size_estimate();
        debug!(
            "allocating {estimate} bytes for {} entries",
            self.module.entries.len()
        );
        self.data = vec![0u8; estimate as usize];
        self.write_header();

        let dir_size = self.module.entries.len() as u32 * DIR_ENTRY_SIZE as u32;
        let mut offset2 = HEADER_SIZE + dir_size;

        for (index, entry) in self.module.entries.iter().enumerate() {
            let dir = HEADER_SIZE + index as u32 * DIR_ENTRY_SIZE as u32;

            if let NodeKind::XRef(xref) = &entry.kind {
                let namespace = self.write_string(&mut offset2, &xref.namespace.clone());
                let name = self.write_string(&mut offset2, &entry.name.clone());
                self.put_u16(dir + format::dir_entry::BLOB_TYPE as u32, blob_type::INVALID);
                self.put_u16(dir + format::dir_entry::FLAGS as u32, 0);
                self.put_u32(dir + format::dir_entry::NAME as u32, name);
                self.put_u32(dir + format::dir_entry::OFFSET as u32, namespace);
                continue;
            }

            let body = offset2;
            offset2 = body + node_size(entry);
            let name = self.write_string(&mut offset2, &entry.name.clone());
            self.put_u16(
                dir + format::dir_entry::BLOB_TYPE as u32,
                entry.kind_id() as u16,
            );
            self.put_u16(
                dir + format::dir_entry::FLAGS as u32,
                format::dir_entry::FLAG_LOCAL,
            );
            self.put_u32(dir + format::dir_entry::NAME as u32, name);
            self.put_u32(dir + format::dir_entry::OFFSET as u32, body);

            let mut offset = body;
            self.write_node(entry, &mut offset, &mut offset2)?;

            let reserved = node_full_size(entry);
            if offset2 > body + reserved {
                return Err(BuildError::ReservationExceeded {
                    name: entry.name.clone(),
                    excess: offset2 - (body + reserved),
                });
            }
        }

        let namespace = self.write_string(&mut offset2, &self.module.name.clone());
        self.put_u32(format::header::NAMESPACE as u32, namespace);
        if let Some(shlib) = self.module.shared_library.clone() {
            let offset = self.write_string(&mut offset2, &shlib);
            self.put_u32(format::header::SHARED_LIBRARY as u32, offset);
        }
        if !self.module.dependencies.is_empty() {
            let joined = self.module.dependencies.join("|");
            let offset = self.write_string(&mut offset2, &joined);
            self.put_u32(format::header::DEPENDENCIES as u32, offset);
        }

        if !self.attributes.is_empty() {
            self.attributes.sort_by_key(|(offset, _, _)| *offset);
            let table = offset2;
            let records = std::mem::take(&mut self.attributes);
            offset2 = table + records.len() as u32 * format::ATTRIBUTE_BLOB_SIZE as u32;
            for (i, (node_offset, key, value)) in records.iter().enumerate() {
                let record = table + i as u32 * format::ATTRIBUTE_BLOB_SIZE as u32;
                let key = self.write_string(&mut offset2, key);
                let value = self.write_string(&mut offset2, value);
                self.put_u32(record + format::attribute::OFFSET as u32, *node_offset);
                self.put_u32(record + format::attribute::NAME as u32, key);
                self.put_u32(record + format::attribute::VALUE as u32, value);
            }
            self.put_u32(format::header::N_ATTRIBUTES as u32, records.len() as u32);
            self.put_u32(format::header::ATTRIBUTES as u32, table);
        }

        if !self.pending_xrefs.is_empty() {
            return Ok(Written::Restart(std::mem::take(&mut self.pending_xrefs)));
        }

        self.strings.log_stats();
        self.types.log_stats();

        self.put_u32(format::header::SIZE as u32, offset2);
        let mut data = std::mem::take(&mut self.data);
        data.truncate(offset2 as usize);
        Ok(Written::Done(Typelib::from_bytes(data)))
    }

    // Type descriptors.

    fn write_type(
        &mut self,
        ty: &TypeNode,
        slot: u32,
        offset2: &mut u32,
    ) -> Result<(), BuildError> {
        if ty.tag.is_basic() {
            self.put_u32(slot, type_slot::pack_simple(ty.tag as u8, ty.is_pointer));
            return Ok(());
        }

        let key = canonical_type(&self.module.name, ty);
        if let Some(existing) = self.types.get(&key) {
            self.put_u32(slot, existing);
            return Ok(());
        }

        let start = *offset2;
        self.types.insert(key, start);
        self.put_u32(slot, start);

        let any = TypeNode::simple(TypeTag::Void, true);
        match ty.tag {
            TypeTag::Array => {
                *offset2 = start + format::ARRAY_TYPE_BLOB_SIZE;
                let mut head = type_head::pack(ty.tag as u8, true) as u16;
                if ty.zero_terminated {
                    head |= format::array_type::ZERO_TERMINATED_BIT;
                }
                let dim = if let Some(length) = ty.length {
                    head |= format::array_type::HAS_LENGTH_BIT;
                    length
                } else if let Some(size) = ty.fixed_size {
                    head |= format::array_type::HAS_SIZE_BIT;
                    size
                } else {
                    format::array_type::NO_DIM
                };
                self.put_u16(start, head);
                self.put_u16(start + format::array_type::DIM as u32, dim);
                let element = ty.param1.as_deref().unwrap_or(&any);
                self.write_type(element, start + format::array_type::ELEMENT as u32, offset2)?;
            }
            TypeTag::Interface => {
                *offset2 = start + format::INTERFACE_TYPE_BLOB_SIZE;
                let index = self.find_entry(ty.interface.as_deref().unwrap_or(""))?;
                self.put_u8(start, type_head::pack(ty.tag as u8, ty.is_pointer));
                self.put_u16(start + 2, index);
            }
            TypeTag::GList | TypeTag::GSList => {
                *offset2 = start + format::PARAM_TYPE_BLOB_SIZE + 4;
                self.put_u8(start, type_head::pack(ty.tag as u8, true));
                self.put_u16(start + 2, 1);
                let element = ty.param1.as_deref().unwrap_or(&any);
                self.write_type(element, start + 4, offset2)?;
            }
            TypeTag::GHash => {
                *offset2 = start + format::PARAM_TYPE_BLOB_SIZE + 8;
                self.put_u8(start, type_head::pack(ty.tag as u8, true));
                self.put_u16(start + 2, 2);
                let key_ty = ty.param1.as_deref().unwrap_or(&any);
                let value_ty = ty.param2.as_deref().unwrap_or(&any);
                self.write_type(key_ty, start + 4, offset2)?;
                self.write_type(value_ty, start + 8, offset2)?;
            }
            TypeTag::Error => {
                let domains = ty.errors.clone();
                let n = domains.len() as u32;
                *offset2 = align(start + format::ERROR_TYPE_BLOB_SIZE + 2 * n, 4);
                self.put_u8(start, type_head::pack(ty.tag as u8, true));
                self.put_u16(start + 2, n as u16);
                for (i, domain) in domains.iter().enumerate() {
                    let index = self.find_entry(domain)?;
                    self.put_u16(start + 4 + i as u32 * 2, index);
                }
            }
            _ => unreachable!("basic tags are written inline"),
        }
        Ok(())
    }

    // Callables.

    fn write_param(
        &mut self,
        param: &ParamNode,
        offset: &mut u32,
        offset2: &mut u32,
    ) -> Result<(), BuildError> {
        use format::arg;

        let name = self.write_string(offset2, &param.name.clone());
        self.put_u32(*offset + arg::NAME as u32, name);

        let mut flags = 0u32;
        if param.direction_in {
            flags |= arg::FLAG_IN;
        }
        if param.direction_out {
            flags |= arg::FLAG_OUT;
        }
        if param.dipper {
            flags |= arg::FLAG_DIPPER;
        }
        if param.allow_none {
            flags |= arg::FLAG_ALLOW_NONE;
        }
        if param.optional {
            flags |= arg::FLAG_OPTIONAL;
        }
        if param.transfer_value {
            flags |= arg::FLAG_TRANSFER_VALUE;
        }
        if param.transfer_container {
            flags |= arg::FLAG_TRANSFER_CONTAINER;
        }
        if param.retval {
            flags |= arg::FLAG_RETURN_VALUE;
        }
        flags |= (param.scope as u32) << arg::SCOPE_SHIFT;
        self.put_u32(*offset + arg::FLAGS as u32, flags);
        self.put_u8(*offset + arg::CLOSURE as u32, param.closure as u8);
        self.put_u8(*offset + arg::DESTROY as u32, param.destroy as u8);

        self.write_type(&param.ty.clone(), *offset + arg::TYPE as u32, offset2)?;
        *offset += ARG_BLOB_SIZE as u32;
        Ok(())
    }

    /// Write a signature tail (blob plus argument array) at the secondary
    /// offset and return its location.
    fn write_signature(
        &mut self,
        result: &ParamNode,
        parameters: &[ParamNode],
        offset2: &mut u32,
    ) -> Result<u32, BuildError> {
        use format::signature as sig;

        let start = *offset2;
        *offset2 = start + SIGNATURE_BLOB_SIZE as u32 + parameters.len() as u32 * ARG_BLOB_SIZE as u32;

        self.write_type(&result.ty.clone(), start + sig::RETURN_TYPE as u32, offset2)?;

        let mut flags = 0u16;
        if result.allow_none {
            flags |= sig::FLAG_MAY_RETURN_NULL;
        }
        if result.transfer_value {
            flags |= sig::FLAG_CALLER_OWNS_VALUE;
        }
        if result.transfer_container {
            flags |= sig::FLAG_CALLER_OWNS_CONTAINER;
        }
        self.put_u16(start + sig::FLAGS as u32, flags);
        self.put_u16(start + sig::N_ARGUMENTS as u32, parameters.len() as u16);

        let mut cursor = start + SIGNATURE_BLOB_SIZE as u32;
        for param in parameters {
            self.write_param(param, &mut cursor, offset2)?;
        }
        Ok(start)
    }

    // Node dispatch.

    fn write_node(
        &mut self,
        node: &Node,
        offset: &mut u32,
        offset2: &mut u32,
    ) -> Result<(), BuildError> {
        self.note_attributes(node, *offset);
        match &node.kind {
            NodeKind::Function(_) => self.write_function(node, offset, offset2),
            NodeKind::Callback(_) => self.write_callback(node, offset, offset2),
            NodeKind::Struct(_) | NodeKind::Boxed(_) => self.write_struct(node, offset, offset2),
            NodeKind::Enum(_) | NodeKind::Flags(_) => self.write_enum(node, offset, offset2),
            NodeKind::Object(_) => self.write_object(node, offset, offset2),
            NodeKind::Interface(_) => self.write_interface(node, offset, offset2),
            NodeKind::Constant(_) => self.write_constant(node, offset, offset2),
            NodeKind::ErrorDomain(_) => self.write_error_domain(node, offset, offset2),
            NodeKind::Union(_) => self.write_union(node, offset, offset2),
            NodeKind::Value(_) => self.write_value(node, offset, offset2),
            NodeKind::Property(_) => self.write_property(node, offset, offset2),
            NodeKind::Signal(_) => self.write_signal(node, offset, offset2),
            NodeKind::VFunc(_) => self.write_vfunc(node, offset, offset2, &[]),
            NodeKind::Field(_) => self.write_field(node, offset, offset2),
            NodeKind::XRef(_) => Ok(()),
        }
    }

    fn write_function(
        &mut self,
        node: &Node,
        offset: &mut u32,
        offset2: &mut u32,
    ) -> Result<(), BuildError> {
        use format::function as f;

        let NodeKind::Function(function) = &node.kind else {
            unreachable!()
        };
        let function = function.clone();
        let base = *offset;
        *offset = base + FUNCTION_BLOB_SIZE as u32;

        debug!("building function '{}'", function.symbol);

        self.put_u16(base + f::BLOB_TYPE as u32, blob_type::FUNCTION);
        let mut flags = 0u16;
        if function.deprecated {
            flags |= f::FLAG_DEPRECATED;
        }
        if function.is_setter {
            flags |= f::FLAG_SETTER;
        }
        if function.is_getter {
            flags |= f::FLAG_GETTER;
        }
        if function.is_constructor {
            flags |= f::FLAG_CONSTRUCTOR;
        }
        if function.wraps_vfunc {
            flags |= f::FLAG_WRAPS_VFUNC;
        }
        if function.throws {
            flags |= f::FLAG_THROWS;
        }
        if !function.is_method {
            flags |= f::FLAG_IS_STATIC;
        }
        self.put_u16(base + f::FLAGS as u32, flags);

        let name = self.write_string(offset2, &node.name.clone());
        self.put_u32(base + f::NAME as u32, name);
        let symbol = self.write_string(offset2, &function.symbol);
        self.put_u32(base + f::SYMBOL as u32, symbol);

        let signature = self.write_signature(&function.result, &function.parameters, offset2)?;
        self.put_u32(base + f::SIGNATURE as u32, signature);
        Ok(())
    }

    fn write_callback(
        &mut self,
        node: &Node,
        offset: &mut u32,
        offset2: &mut u32,
    ) -> Result<(), BuildError> {
        use format::callback as c;

        let NodeKind::Callback(function) = &node.kind else {
            unreachable!()
        };
        let function = function.clone();
        let base = *offset;
        *offset = base + CALLBACK_BLOB_SIZE as u32;

        self.put_u16(base + c::BLOB_TYPE as u32, blob_type::CALLBACK);
        let mut flags = 0u16;
        if function.deprecated {
            flags |= c::FLAG_DEPRECATED;
        }
        self.put_u16(base + c::FLAGS as u32, flags);
        let name = self.write_string(offset2, &node.name.clone());
        self.put_u32(base + c::NAME as u32, name);
        let signature = self.write_signature(&function.result, &function.parameters, offset2)?;
        self.put_u32(base + c::SIGNATURE as u32, signature);
        Ok(())
    }

    fn write_signal(
        &mut self,
        node: &Node,
        offset: &mut u32,
        offset2: &mut u32,
    ) -> Result<(), BuildError> {
        use format::signal as s;

        let NodeKind::Signal(signal) = &node.kind else {
            unreachable!()
        };
        let signal = signal.clone();
        let base = *offset;
        *offset = base + SIGNAL_BLOB_SIZE as u32;

        let mut flags = 0u16;
        if signal.deprecated {
            flags |= s::FLAG_DEPRECATED;
        }
        if signal.run_first {
            flags |= s::FLAG_RUN_FIRST;
        }
        if signal.run_last {
            flags |= s::FLAG_RUN_LAST;
        }
        if signal.run_cleanup {
            flags |= s::FLAG_RUN_CLEANUP;
        }
        if signal.no_recurse {
            flags |= s::FLAG_NO_RECURSE;
        }
        if signal.detailed {
            flags |= s::FLAG_DETAILED;
        }
        if signal.action {
            flags |= s::FLAG_ACTION;
        }
        if signal.no_hooks {
            flags |= s::FLAG_NO_HOOKS;
        }
        if signal.has_class_closure {
            flags |= s::FLAG_HAS_CLASS_CLOSURE;
        }
        self.put_u16(base + s::FLAGS as u32, flags);
        self.put_u16(base + s::CLASS_CLOSURE as u32, signal.class_closure);
        let name = self.write_string(offset2, &node.name.clone());
        self.put_u32(base + s::NAME as u32, name);
        let signature = self.write_signature(&signal.result, &signal.parameters, offset2)?;
        self.put_u32(base + s::SIGNATURE as u32, signature);
        Ok(())
    }

    fn write_vfunc(
        &mut self,
        node: &Node,
        offset: &mut u32,
        offset2: &mut u32,
        method_names: &[String],
    ) -> Result<(), BuildError> {
        use format::vfunc as v;

        let NodeKind::VFunc(vfunc) = &node.kind else {
            unreachable!()
        };
        let vfunc = vfunc.clone();
        let base = *offset;
        *offset = base + VFUNC_BLOB_SIZE as u32;

        let name = self.write_string(offset2, &node.name.clone());
        self.put_u32(base + v::NAME as u32, name);

        let mut flags = 0u16;
        if vfunc.must_chain_up {
            flags |= v::FLAG_MUST_CHAIN_UP;
        }
        if vfunc.must_be_implemented {
            flags |= v::FLAG_MUST_BE_IMPLEMENTED;
        }
        if vfunc.must_not_be_implemented {
            flags |= v::FLAG_MUST_NOT_BE_IMPLEMENTED;
        }
        if vfunc.is_class_closure {
            flags |= v::FLAG_CLASS_CLOSURE;
        }
        self.put_u16(base + v::FLAGS as u32, flags);
        self.put_u16(base + v::STRUCT_OFFSET as u32, vfunc.offset);

        let invoker = vfunc
            .invoker
            .as_deref()
            .and_then(|name| method_names.iter().position(|m| m == name))
            .map(|index| index as u16)
            .unwrap_or(v::NO_INVOKER);
        self.put_u16(base + v::INVOKER as u32, invoker);

        let signature = self.write_signature(&vfunc.result, &vfunc.parameters, offset2)?;
        self.put_u32(base + v::SIGNATURE as u32, signature);
        Ok(())
    }

    fn write_property(
        &mut self,
        node: &Node,
        offset: &mut u32,
        offset2: &mut u32,
    ) -> Result<(), BuildError> {
        use format::property as p;

        let NodeKind::Property(property) = &node.kind else {
            unreachable!()
        };
        let property = property.clone();
        let base = *offset;
        *offset = base + PROPERTY_BLOB_SIZE as u32;

        let name = self.write_string(offset2, &node.name.clone());
        self.put_u32(base + p::NAME as u32, name);
        let mut flags = 0u32;
        if property.deprecated {
            flags |= p::FLAG_DEPRECATED;
        }
        if property.readable {
            flags |= p::FLAG_READABLE;
        }
        if property.writable {
            flags |= p::FLAG_WRITABLE;
        }
        if property.construct {
            flags |= p::FLAG_CONSTRUCT;
        }
        if property.construct_only {
            flags |= p::FLAG_CONSTRUCT_ONLY;
        }
        self.put_u32(base + p::FLAGS as u32, flags);
        self.write_type(&property.ty, base + p::TYPE as u32, offset2)
    }

    fn write_field(
        &mut self,
        node: &Node,
        offset: &mut u32,
        offset2: &mut u32,
    ) -> Result<(), BuildError> {
        use format::field as f;

        let NodeKind::Field(field) = &node.kind else {
            unreachable!()
        };
        let field = field.clone();
        let base = *offset;
        *offset = base + FIELD_BLOB_SIZE as u32;

        let name = self.write_string(offset2, &node.name.clone());
        self.put_u32(base + f::NAME as u32, name);
        let mut flags = 0u8;
        if field.readable {
            flags |= f::FLAG_READABLE;
        }
        if field.writable {
            flags |= f::FLAG_WRITABLE;
        }
        self.put_u8(base + f::FLAGS as u32, flags);
        self.put_u8(base + f::BITS as u32, field.bits);
        let struct_offset = if field.offset >= 0 {
            field.offset as u16
        } else {
            f::UNKNOWN_OFFSET
        };
        self.put_u16(base + f::STRUCT_OFFSET as u32, struct_offset);
        self.write_type(&field.ty, base + f::TYPE as u32, offset2)
    }

    fn write_value(
        &mut self,
        node: &Node,
        offset: &mut u32,
        offset2: &mut u32,
    ) -> Result<(), BuildError> {
        use format::value as v;

        let NodeKind::Value(value) = &node.kind else {
            unreachable!()
        };
        let value = value.clone();
        let base = *offset;
        *offset = base + VALUE_BLOB_SIZE as u32;

        let flags = if value.deprecated { v::FLAG_DEPRECATED } else { 0 };
        self.put_u32(base + v::FLAGS as u32, flags);
        let name = self.write_string(offset2, &node.name.clone());
        self.put_u32(base + v::NAME as u32, name);
        self.put_u32(base + v::VALUE as u32, value.value);
        Ok(())
    }

    fn write_constant(
        &mut self,
        node: &Node,
        offset: &mut u32,
        offset2: &mut u32,
    ) -> Result<(), BuildError> {
        use format::constant as c;

        let NodeKind::Constant(constant) = &node.kind else {
            unreachable!()
        };
        let constant = constant.clone();
        let base = *offset;
        *offset = base + CONSTANT_BLOB_SIZE as u32;

        self.put_u16(base + c::BLOB_TYPE as u32, blob_type::CONSTANT);
        let flags = if constant.deprecated {
            c::FLAG_DEPRECATED
        } else {
            0
        };
        self.put_u16(base + c::FLAGS as u32, flags);
        let name = self.write_string(offset2, &node.name.clone());
        self.put_u32(base + c::NAME as u32, name);

        let payload = encode_constant(&node.name, &constant.ty, &constant.value)?;
        let value_offset = *offset2;
        let size = payload.len() as u32;
        self.put_bytes(value_offset, &payload);
        *offset2 = align(value_offset + size, 4);
        self.put_u32(base + c::SIZE as u32, size);
        self.put_u32(base + c::OFFSET as u32, value_offset);

        self.write_type(&constant.ty, base + c::TYPE as u32, offset2)
    }

    fn write_error_domain(
        &mut self,
        node: &Node,
        offset: &mut u32,
        offset2: &mut u32,
    ) -> Result<(), BuildError> {
        use format::error_domain as e;

        let NodeKind::ErrorDomain(domain) = &node.kind else {
            unreachable!()
        };
        let domain = domain.clone();
        let base = *offset;
        *offset = base + ERROR_DOMAIN_BLOB_SIZE as u32;

        self.put_u16(base + e::BLOB_TYPE as u32, blob_type::ERROR_DOMAIN);
        let flags = if domain.deprecated { e::FLAG_DEPRECATED } else { 0 };
        self.put_u16(base + e::FLAGS as u32, flags);
        let name = self.write_string(offset2, &node.name.clone());
        self.put_u32(base + e::NAME as u32, name);
        let quark = self.write_string(offset2, &domain.get_quark);
        self.put_u32(base + e::GET_QUARK as u32, quark);
        let codes = self.find_entry(&domain.codes)?;
        self.put_u16(base + e::ERROR_CODES as u32, codes);
        Ok(())
    }

    fn write_enum(
        &mut self,
        node: &Node,
        offset: &mut u32,
        offset2: &mut u32,
    ) -> Result<(), BuildError> {
        use format::enum_blob as e;

        let (kind, enum_node) = match &node.kind {
            NodeKind::Enum(en) => (blob_type::ENUM, en.clone()),
            NodeKind::Flags(en) => (blob_type::FLAGS, en.clone()),
            _ => unreachable!(),
        };
        let base = *offset;
        *offset = base + ENUM_BLOB_SIZE as u32;

        self.put_u16(base + e::BLOB_TYPE as u32, kind);
        let mut flags = 0u16;
        if enum_node.deprecated {
            flags |= e::FLAG_DEPRECATED;
        }
        let name = self.write_string(offset2, &node.name.clone());
        self.put_u32(base + e::NAME as u32, name);
        match (&enum_node.gtype_name, &enum_node.gtype_init) {
            (Some(gtype_name), Some(gtype_init)) => {
                let gtype_name = self.write_string(offset2, gtype_name);
                let gtype_init = self.write_string(offset2, gtype_init);
                self.put_u32(base + e::GTYPE_NAME as u32, gtype_name);
                self.put_u32(base + e::GTYPE_INIT as u32, gtype_init);
            }
            _ => flags |= e::FLAG_UNREGISTERED,
        }
        self.put_u16(base + e::FLAGS as u32, flags);

        let storage = enum_node
            .storage_type
            .unwrap_or_else(|| enum_storage_tag(&enum_node));
        self.put_u16(base + e::STORAGE_TYPE as u32, storage as u8 as u16);
        self.put_u16(base + e::N_VALUES as u32, enum_node.values.len() as u16);

        for value in &enum_node.values {
            self.note_attributes(value, *offset);
            self.write_value(value, offset, offset2)?;
        }
        Ok(())
    }

    /// Members sorted by (kind, byte-wise name), the order the groups are
    /// emitted in.
    fn sorted_members(members: &[Node]) -> Vec<&Node> {
        let mut sorted: Vec<&Node> = members.iter().collect();
        sorted.sort_by(|a, b| a.member_sort_key().cmp(&b.member_sort_key()));
        sorted
    }

    /// Write every member of `kind`, returning how many there were.
    fn write_member_group(
        &mut self,
        members: &[&Node],
        kind: NodeKindId,
        offset: &mut u32,
        offset2: &mut u32,
        method_names: &[String],
    ) -> Result<u16, BuildError> {
        let mut count = 0u16;
        for member in members {
            if member.kind_id() != kind {
                continue;
            }
            count += 1;
            self.note_attributes(member, *offset);
            match kind {
                NodeKindId::Field => self.write_field(member, offset, offset2)?,
                NodeKindId::Property => self.write_property(member, offset, offset2)?,
                NodeKindId::Function => self.write_function(member, offset, offset2)?,
                NodeKindId::Signal => self.write_signal(member, offset, offset2)?,
                NodeKindId::VFunc => self.write_vfunc(member, offset, offset2, method_names)?,
                NodeKindId::Constant => self.write_constant(member, offset, offset2)?,
                _ => unreachable!("not a member group kind"),
            }
        }
        Ok(count)
    }

    fn method_names(members: &[&Node]) -> Vec<String> {
        members
            .iter()
            .filter(|member| member.kind_id() == NodeKindId::Function)
            .map(|member| member.name.clone())
            .collect()
    }

    fn write_struct(
        &mut self,
        node: &Node,
        offset: &mut u32,
        offset2: &mut u32,
    ) -> Result<(), BuildError> {
        use format::struct_blob as s;

        // Boxed records share the struct layout with the registration made
        // mandatory.
        let (kind, deprecated, disguised, is_gtype_struct, gtype, alignment, size, members) =
            match &node.kind {
                NodeKind::Struct(st) => (
                    blob_type::STRUCT,
                    st.deprecated,
                    st.disguised,
                    st.is_gtype_struct,
                    st.gtype_name.clone().zip(st.gtype_init.clone()),
                    st.alignment,
                    st.size,
                    st.members.clone(),
                ),
                NodeKind::Boxed(bx) => (
                    blob_type::BOXED,
                    bx.deprecated,
                    false,
                    false,
                    Some((bx.gtype_name.clone(), bx.gtype_init.clone())),
                    bx.alignment,
                    bx.size,
                    bx.members.clone(),
                ),
                _ => unreachable!(),
            };
        let base = *offset;
        *offset = base + STRUCT_BLOB_SIZE as u32;

        self.put_u16(base + s::BLOB_TYPE as u32, kind);
        let mut flags = 0u16;
        if deprecated {
            flags |= s::FLAG_DEPRECATED;
        }
        if disguised {
            flags |= s::FLAG_DISGUISED;
        }
        if is_gtype_struct {
            flags |= s::FLAG_IS_GTYPE_STRUCT;
        }
        let name = self.write_string(offset2, &node.name.clone());
        self.put_u32(base + s::NAME as u32, name);
        match gtype {
            Some((gtype_name, gtype_init)) => {
                let gtype_name = self.write_string(offset2, &gtype_name);
                let gtype_init = self.write_string(offset2, &gtype_init);
                self.put_u32(base + s::GTYPE_NAME as u32, gtype_name);
                self.put_u32(base + s::GTYPE_INIT as u32, gtype_init);
            }
            None => flags |= s::FLAG_UNREGISTERED,
        }
        self.put_u16(base + s::FLAGS as u32, flags);
        self.put_u32(base + s::SIZE as u32, size);
        self.put_u16(base + s::ALIGNMENT as u32, alignment as u16);

        let sorted = Self::sorted_members(&members);
        let n_fields =
            self.write_member_group(&sorted, NodeKindId::Field, offset, offset2, &[])?;
        let n_methods =
            self.write_member_group(&sorted, NodeKindId::Function, offset, offset2, &[])?;
        self.put_u16(base + s::N_FIELDS as u32, n_fields);
        self.put_u16(base + s::N_METHODS as u32, n_methods);
        Ok(())
    }

    fn write_union(
        &mut self,
        node: &Node,
        offset: &mut u32,
        offset2: &mut u32,
    ) -> Result<(), BuildError> {
        use format::union_blob as u;

        let NodeKind::Union(union) = &node.kind else {
            unreachable!()
        };
        let union = union.clone();
        let base = *offset;
        *offset = base + UNION_BLOB_SIZE as u32;

        self.put_u16(base + u::BLOB_TYPE as u32, blob_type::UNION);
        let mut flags = 0u16;
        if union.deprecated {
            flags |= u::FLAG_DEPRECATED;
        }
        let name = self.write_string(offset2, &node.name.clone());
        self.put_u32(base + u::NAME as u32, name);
        match (&union.gtype_name, &union.gtype_init) {
            (Some(gtype_name), Some(gtype_init)) => {
                let gtype_name = self.write_string(offset2, gtype_name);
                let gtype_init = self.write_string(offset2, gtype_init);
                self.put_u32(base + u::GTYPE_NAME as u32, gtype_name);
                self.put_u32(base + u::GTYPE_INIT as u32, gtype_init);
            }
            _ => flags |= u::FLAG_UNREGISTERED,
        }
        self.put_u32(base + u::SIZE as u32, union.size);
        self.put_u16(base + u::ALIGNMENT as u32, union.alignment as u16);

        let sorted = Self::sorted_members(&union.members);
        let discriminated = union.discriminator_type.is_some();
        if let Some(ty) = &union.discriminator_type {
            flags |= u::FLAG_DISCRIMINATED;
            self.put_i32(
                base + u::DISCRIMINATOR_OFFSET as u32,
                union.discriminator_offset,
            );
            self.write_type(ty, base + u::DISCRIMINATOR_TYPE as u32, offset2)?;
        }
        self.put_u16(base + u::FLAGS as u32, flags);

        let n_fields =
            self.write_member_group(&sorted, NodeKindId::Field, offset, offset2, &[])?;
        let n_functions =
            self.write_member_group(&sorted, NodeKindId::Function, offset, offset2, &[])?;
        self.put_u16(base + u::N_FIELDS as u32, n_fields);
        self.put_u16(base + u::N_FUNCTIONS as u32, n_functions);

        if discriminated {
            if union.discriminators.len() != n_fields as usize {
                return Err(BuildError::DiscriminatorCount {
                    name: node.name.clone(),
                    fields: n_fields as usize,
                    discriminators: union.discriminators.len(),
                });
            }
            for constant in &union.discriminators {
                self.note_attributes(constant, *offset);
                self.write_constant(constant, offset, offset2)?;
            }
        }
        Ok(())
    }

    fn write_object(
        &mut self,
        node: &Node,
        offset: &mut u32,
        offset2: &mut u32,
    ) -> Result<(), BuildError> {
        use format::object as o;

        let NodeKind::Object(object) = &node.kind else {
            unreachable!()
        };
        let object = object.clone();
        let base = *offset;
        *offset = base + OBJECT_BLOB_SIZE as u32;

        self.put_u16(base + o::BLOB_TYPE as u32, blob_type::OBJECT);
        let mut flags = 0u16;
        if object.deprecated {
            flags |= o::FLAG_DEPRECATED;
        }
        if object.abstract_ {
            flags |= o::FLAG_ABSTRACT;
        }
        self.put_u16(base + o::FLAGS as u32, flags);
        let name = self.write_string(offset2, &node.name.clone());
        self.put_u32(base + o::NAME as u32, name);
        let gtype_name = self.write_string(offset2, &object.gtype_name);
        let gtype_init = self.write_string(offset2, &object.gtype_init);
        self.put_u32(base + o::GTYPE_NAME as u32, gtype_name);
        self.put_u32(base + o::GTYPE_INIT as u32, gtype_init);

        let parent = match &object.parent {
            Some(parent) => self.find_entry(parent)?,
            None => 0,
        };
        self.put_u16(base + o::PARENT as u32, parent);
        let gtype_struct = match &object.gtype_struct {
            Some(gtype_struct) => self.find_entry(gtype_struct)?,
            None => 0,
        };
        self.put_u16(base + o::GTYPE_STRUCT as u32, gtype_struct);

        self.put_u16(base + o::N_INTERFACES as u32, object.interfaces.len() as u16);
        for interface in &object.interfaces {
            let index = self.find_entry(interface)?;
            self.put_u16(*offset, index);
            *offset += 2;
        }
        *offset = align(*offset, 4);

        let sorted = Self::sorted_members(&object.members);
        let method_names = Self::method_names(&sorted);
        let n_fields =
            self.write_member_group(&sorted, NodeKindId::Field, offset, offset2, &[])?;
        let n_properties =
            self.write_member_group(&sorted, NodeKindId::Property, offset, offset2, &[])?;
        let n_methods =
            self.write_member_group(&sorted, NodeKindId::Function, offset, offset2, &[])?;
        let n_signals =
            self.write_member_group(&sorted, NodeKindId::Signal, offset, offset2, &[])?;
        let n_vfuncs =
            self.write_member_group(&sorted, NodeKindId::VFunc, offset, offset2, &method_names)?;
        let n_constants =
            self.write_member_group(&sorted, NodeKindId::Constant, offset, offset2, &[])?;

        self.put_u16(base + o::N_FIELDS as u32, n_fields);
        self.put_u16(base + o::N_PROPERTIES as u32, n_properties);
        self.put_u16(base + o::N_METHODS as u32, n_methods);
        self.put_u16(base + o::N_SIGNALS as u32, n_signals);
        self.put_u16(base + o::N_VFUNCS as u32, n_vfuncs);
        self.put_u16(base + o::N_CONSTANTS as u32, n_constants);
        Ok(())
    }

    fn write_interface(
        &mut self,
        node: &Node,
        offset: &mut u32,
        offset2: &mut u32,
    ) -> Result<(), BuildError> {
        use format::interface as i;

        let NodeKind::Interface(interface) = &node.kind else {
            unreachable!()
        };
        let interface = interface.clone();
        let base = *offset;
        *offset = base + INTERFACE_BLOB_SIZE as u32;

        self.put_u16(base + i::BLOB_TYPE as u32, blob_type::INTERFACE);
        let flags = if interface.deprecated {
            i::FLAG_DEPRECATED
        } else {
            0
        };
        self.put_u16(base + i::FLAGS as u32, flags);
        let name = self.write_string(offset2, &node.name.clone());
        self.put_u32(base + i::NAME as u32, name);
        let gtype_name = self.write_string(offset2, &interface.gtype_name);
        let gtype_init = self.write_string(offset2, &interface.gtype_init);
        self.put_u32(base + i::GTYPE_NAME as u32, gtype_name);
        self.put_u32(base + i::GTYPE_INIT as u32, gtype_init);

        let gtype_struct = match &interface.gtype_struct {
            Some(gtype_struct) => self.find_entry(gtype_struct)?,
            None => 0,
        };
        self.put_u16(base + i::GTYPE_STRUCT as u32, gtype_struct);

        self.put_u16(
            base + i::N_PREREQUISITES as u32,
            interface.prerequisites.len() as u16,
        );
        for prerequisite in &interface.prerequisites {
            let index = self.find_entry(prerequisite)?;
            self.put_u16(*offset, index);
            *offset += 2;
        }
        *offset = align(*offset, 4);

        let sorted = Self::sorted_members(&interface.members);
        let method_names = Self::method_names(&sorted);
        let n_properties =
            self.write_member_group(&sorted, NodeKindId::Property, offset, offset2, &[])?;
        let n_methods =
            self.write_member_group(&sorted, NodeKindId::Function, offset, offset2, &[])?;
        let n_signals =
            self.write_member_group(&sorted, NodeKindId::Signal, offset, offset2, &[])?;
        let n_vfuncs =
            self.write_member_group(&sorted, NodeKindId::VFunc, offset, offset2, &method_names)?;
        let n_constants =
            self.write_member_group(&sorted, NodeKindId::Constant, offset, offset2, &[])?;

        self.put_u16(base + i::N_PROPERTIES as u32, n_properties);
        self.put_u16(base + i::N_METHODS as u32, n_methods);
        self.put_u16(base + i::N_SIGNALS as u32, n_signals);
        self.put_u16(base + i::N_VFUNCS as u32, n_vfuncs);
        self.put_u16(base + i::N_CONSTANTS as u32, n_constants);
        Ok(())
    }
}

// Constant value encoding.

fn parse_int_literal(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Some((base, shift)) = text.split_once("<<") {
        let base: i64 = base.trim().parse().ok()?;
        let shift: u32 = shift.trim().parse().ok()?;
        return base.checked_shl(shift);
    }
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).ok();
    }
    if let Some(hex) = text.strip_prefix("-0x").or_else(|| text.strip_prefix("-0X")) {
        return i64::from_str_radix(hex, 16).ok().map(|v| -v);
    }
    text.parse().ok()
}

fn parse_uint_literal(text: &str) -> Option<u64> {
    let text = text.trim();
    if let Some((base, shift)) = text.split_once("<<") {
        let base: u64 = base.trim().parse().ok()?;
        let shift: u32 = shift.trim().parse().ok()?;
        return base.checked_shl(shift);
    }
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).ok();
    }
    text.parse().ok()
}

fn parse_boolean_literal(text: &str) -> Option<bool> {
    match text.trim() {
        "TRUE" | "true" => Some(true),
        "FALSE" | "false" => Some(false),
        other => parse_int_literal(other).map(|v| v != 0),
    }
}

/// Encode a constant's literal text in the width its declared tag dictates.
fn encode_constant(name: &str, ty: &TypeNode, value: &str) -> Result<Vec<u8>, BuildError> {
    let bad = || BuildError::BadConstantValue {
        name: name.to_string(),
        value: value.to_string(),
    };

    let bytes = match ty.tag {
        TypeTag::Boolean => {
            let v = parse_boolean_literal(value).ok_or_else(bad)?;
            (v as u32).to_le_bytes().to_vec()
        }
        TypeTag::Int8 => (parse_int_literal(value).ok_or_else(bad)? as i8)
            .to_le_bytes()
            .to_vec(),
        TypeTag::UInt8 => (parse_uint_literal(value).ok_or_else(bad)? as u8)
            .to_le_bytes()
            .to_vec(),
        TypeTag::Int16 => (parse_int_literal(value).ok_or_else(bad)? as i16)
            .to_le_bytes()
            .to_vec(),
        TypeTag::UInt16 => (parse_uint_literal(value).ok_or_else(bad)? as u16)
            .to_le_bytes()
            .to_vec(),
        TypeTag::Int32 | TypeTag::Int => (parse_int_literal(value).ok_or_else(bad)? as i32)
            .to_le_bytes()
            .to_vec(),
        TypeTag::UInt32 | TypeTag::UInt => (parse_uint_literal(value).ok_or_else(bad)? as u32)
            .to_le_bytes()
            .to_vec(),
        TypeTag::Int64 | TypeTag::Long | TypeTag::SSize => {
            parse_int_literal(value).ok_or_else(bad)?.to_le_bytes().to_vec()
        }
        TypeTag::UInt64 | TypeTag::ULong | TypeTag::Size | TypeTag::Time => {
            parse_uint_literal(value).ok_or_else(bad)?.to_le_bytes().to_vec()
        }
        TypeTag::Float => {
            let v: f32 = value.trim().parse().map_err(|_| bad())?;
            v.to_le_bytes().to_vec()
        }
        TypeTag::Double => {
            let v: f64 = value.trim().parse().map_err(|_| bad())?;
            v.to_le_bytes().to_vec()
        }
        TypeTag::Utf8 | TypeTag::Filename => {
            let mut bytes = value.as_bytes().to_vec();
            bytes.push(0);
            bytes
        }
        _ => {
            return Err(BuildError::NonBasicConstant {
                name: name.to_string(),
            })
        }
    };
    Ok(bytes)
}
