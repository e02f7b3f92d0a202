//! Size, alignment and field-offset computation for aggregates.
//!
//! Sizes are measured the way the target C ABI lays the types out: fields
//! placed in declaration order, each aligned to its own alignment, the
//! aggregate tail-padded to the largest member alignment. Referenced types
//! are resolved through the alias tables and the other parsed modules, and
//! results are memoized per qualified name.

use std::collections::{HashMap, HashSet};

use gir_types::{
    find_node, EnumNode, Module, Node, NodeKind, TypeNode, TypeTag, POINTER_ALIGN, POINTER_SIZE,
};
use log::warn;

use crate::error::LayoutError;

fn align_up(value: u32, alignment: u32) -> u32 {
    (value + alignment - 1) & !(alignment - 1)
}

/// Infer the storage tag of an enum from its largest member value: the
/// smallest signed width whose positive range holds it, falling back to an
/// unsigned 32-bit representation at the top of the range.
pub fn enum_storage_tag(node: &EnumNode) -> TypeTag {
    let max_value = node
        .values
        .iter()
        .filter_map(|value| match &value.kind {
            NodeKind::Value(v) => Some(v.value),
            _ => None,
        })
        .max()
        .unwrap_or(0);

    if max_value <= i8::MAX as u32 {
        TypeTag::Int8
    } else if max_value <= i16::MAX as u32 {
        TypeTag::Int16
    } else if max_value <= i32::MAX as u32 {
        TypeTag::Int32
    } else {
        TypeTag::UInt32
    }
}

/// Computed layout of one aggregate: overall size/alignment plus the byte
/// offset of each field member in declaration order (`None` for members
/// that are not plain fields).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateLayout {
    pub size: u32,
    pub alignment: u32,
    pub field_offsets: Vec<Option<u32>>,
}

/// Memoizing layout resolver over one module and everything it can see.
pub struct LayoutEngine<'a> {
    module: &'a Module,
    modules: &'a [Module],
    memo: HashMap<String, AggregateLayout>,
    visiting: HashSet<String>,
}

impl<'a> LayoutEngine<'a> {
    pub fn new(module: &'a Module, modules: &'a [Module]) -> LayoutEngine<'a> {
        LayoutEngine {
            module,
            modules,
            memo: HashMap::new(),
            visiting: HashSet::new(),
        }
    }

    /// Layout of the aggregate entry `name` (bare or qualified), computing
    /// and caching it on first use.
    pub fn aggregate_layout(&mut self, name: &str) -> Result<AggregateLayout, LayoutError> {
        let qualified = self.qualify(name);
        if let Some(layout) = self.memo.get(&qualified) {
            return Ok(layout.clone());
        }
        if !self.visiting.insert(qualified.clone()) {
            let mut path: Vec<String> = self.visiting.iter().cloned().collect();
            path.sort();
            path.push(qualified);
            return Err(LayoutError::RecursiveAggregate { path });
        }

        let result = self.compute_aggregate(&qualified);

        self.visiting.remove(&qualified);
        if let Ok(layout) = &result {
            self.memo.insert(qualified, layout.clone());
        }
        result
    }

    fn qualify(&self, name: &str) -> String {
        if name.contains('.') {
            name.to_string()
        } else {
            format!("{}.{}", self.module.name, name)
        }
    }

    /// Resolve `name` through the owning module's aliases, then through the
    /// alias tables of every visible module.
    fn resolve_name(&self, name: &str) -> String {
        let resolved = self.module.resolve_alias(name);
        if resolved != name {
            return resolved.to_string();
        }
        for other in self.modules {
            if let Some(target) = other.aliases.get(name) {
                return target.clone();
            }
        }
        name.to_string()
    }

    fn lookup(&self, aggregate: &str, name: &str) -> Result<(&'a Module, &'a Node), LayoutError> {
        let resolved = self.resolve_name(name);
        find_node(self.module, self.modules, &resolved).ok_or_else(|| LayoutError::UnknownType {
            aggregate: aggregate.to_string(),
            name: resolved,
        })
    }

    fn compute_aggregate(&mut self, qualified: &str) -> Result<AggregateLayout, LayoutError> {
        let (owner, node) = self.lookup(qualified, qualified)?;
        let owner_name = owner.name.clone();
        match &node.kind {
            NodeKind::Struct(s) => {
                if s.alignment != 0 {
                    return Ok(AggregateLayout {
                        size: s.size,
                        alignment: s.alignment,
                        field_offsets: collect_existing_offsets(&s.members),
                    });
                }
                self.struct_layout(qualified, &owner_name, &s.members)
            }
            NodeKind::Boxed(b) => {
                if b.alignment != 0 {
                    return Ok(AggregateLayout {
                        size: b.size,
                        alignment: b.alignment,
                        field_offsets: collect_existing_offsets(&b.members),
                    });
                }
                self.struct_layout(qualified, &owner_name, &b.members)
            }
            NodeKind::Union(u) => {
                if u.alignment != 0 {
                    return Ok(AggregateLayout {
                        size: u.size,
                        alignment: u.alignment,
                        field_offsets: collect_existing_offsets(&u.members),
                    });
                }
                self.union_layout(qualified, &owner_name, &u.members)
            }
            other => Err(LayoutError::InvalidEmbedded {
                aggregate: qualified.to_string(),
                field: String::new(),
                kind: other.id().as_str(),
            }),
        }
    }

    /// Size and alignment of a value of the referenced entry, used when a
    /// non-pointer field embeds it.
    fn interface_size_align(
        &mut self,
        aggregate: &str,
        name: &str,
    ) -> Result<(u32, u32), LayoutError> {
        let (owner, node) = self.lookup(aggregate, name)?;
        let qualified = format!("{}.{}", owner.name, node.name);
        match &node.kind {
            NodeKind::Struct(_) | NodeKind::Boxed(_) | NodeKind::Union(_) => {
                let layout = self.aggregate_layout(&qualified)?;
                Ok((layout.size, layout.alignment))
            }
            NodeKind::Enum(e) | NodeKind::Flags(e) => {
                let tag = e.storage_type.unwrap_or_else(|| enum_storage_tag(e));
                tag.inline_layout().ok_or(LayoutError::NoInlineLayout {
                    aggregate: aggregate.to_string(),
                    field: qualified,
                    tag: tag.name(),
                })
            }
            NodeKind::Callback(_) => Ok((POINTER_SIZE, POINTER_ALIGN)),
            other => Err(LayoutError::InvalidEmbedded {
                aggregate: aggregate.to_string(),
                field: node.name.clone(),
                kind: other.id().as_str(),
            }),
        }
    }

    fn field_size_align(
        &mut self,
        aggregate: &str,
        field: &str,
        ty: &TypeNode,
    ) -> Result<(u32, u32), LayoutError> {
        if ty.is_pointer {
            return Ok((POINTER_SIZE, POINTER_ALIGN));
        }
        match ty.tag {
            TypeTag::Interface => {
                let name = ty.interface.as_deref().unwrap_or("");
                self.interface_size_align(aggregate, name)
            }
            TypeTag::Void => Err(LayoutError::VoidField {
                aggregate: aggregate.to_string(),
                field: field.to_string(),
            }),
            tag => tag.inline_layout().ok_or(LayoutError::NoInlineLayout {
                aggregate: aggregate.to_string(),
                field: field.to_string(),
                tag: tag.name(),
            }),
        }
    }

    fn struct_layout(
        &mut self,
        qualified: &str,
        _owner: &str,
        members: &[Node],
    ) -> Result<AggregateLayout, LayoutError> {
        let mut size = 0u32;
        let mut alignment = 1u32;
        let mut field_offsets = Vec::with_capacity(members.len());

        for member in members {
            match &member.kind {
                NodeKind::Field(field) => {
                    let (member_size, member_align) =
                        self.field_size_align(qualified, &member.name, &field.ty)?;
                    size = align_up(size, member_align);
                    alignment = alignment.max(member_align);
                    field_offsets.push(Some(size));
                    size += member_size;
                }
                NodeKind::Callback(_) => {
                    // Inline callback members take a function-pointer slot
                    // but are not addressable fields.
                    size = align_up(size, POINTER_ALIGN);
                    alignment = alignment.max(POINTER_ALIGN);
                    size += POINTER_SIZE;
                    field_offsets.push(None);
                }
                _ => field_offsets.push(None),
            }
        }

        // Tail padding out to a multiple of the aggregate alignment.
        size = align_up(size, alignment);
        Ok(AggregateLayout {
            size,
            alignment,
            field_offsets,
        })
    }

    fn union_layout(
        &mut self,
        qualified: &str,
        _owner: &str,
        members: &[Node],
    ) -> Result<AggregateLayout, LayoutError> {
        let mut size = 0u32;
        let mut alignment = 1u32;
        let mut field_offsets = Vec::with_capacity(members.len());

        for member in members {
            match &member.kind {
                NodeKind::Field(field) => {
                    let (member_size, member_align) =
                        self.field_size_align(qualified, &member.name, &field.ty)?;
                    size = size.max(member_size);
                    alignment = alignment.max(member_align);
                    field_offsets.push(Some(0));
                }
                _ => field_offsets.push(None),
            }
        }

        size = align_up(size, alignment);
        Ok(AggregateLayout {
            size,
            alignment,
            field_offsets,
        })
    }
}

fn collect_existing_offsets(members: &[Node]) -> Vec<Option<u32>> {
    members
        .iter()
        .map(|member| match &member.kind {
            NodeKind::Field(field) if field.offset >= 0 => Some(field.offset as u32),
            _ => None,
        })
        .collect()
}

/// Compute layouts for every aggregate entry of `module` and write the
/// results back into the tree: aggregate size/alignment, per-field byte
/// offsets, and inferred enum storage tags.
pub fn compute_offsets(module: &mut Module, modules: &[Module]) -> Result<(), LayoutError> {
    let mut layouts: HashMap<String, AggregateLayout> = HashMap::new();
    {
        let snapshot = module.clone();
        let mut engine = LayoutEngine::new(&snapshot, modules);
        for entry in &snapshot.entries {
            match &entry.kind {
                NodeKind::Struct(_) | NodeKind::Boxed(_) | NodeKind::Union(_) => {
                    let qualified = format!("{}.{}", snapshot.name, entry.name);
                    let layout = engine.aggregate_layout(&qualified)?;
                    layouts.insert(entry.name.clone(), layout);
                }
                _ => {}
            }
        }
    }

    for entry in &mut module.entries {
        let name = entry.name.clone();
        match &mut entry.kind {
            NodeKind::Struct(s) => {
                if let Some(layout) = layouts.get(&name) {
                    s.size = layout.size;
                    s.alignment = layout.alignment;
                    apply_field_offsets(&mut s.members, layout);
                }
            }
            NodeKind::Boxed(b) => {
                if let Some(layout) = layouts.get(&name) {
                    b.size = layout.size;
                    b.alignment = layout.alignment;
                    apply_field_offsets(&mut b.members, layout);
                }
            }
            NodeKind::Union(u) => {
                if let Some(layout) = layouts.get(&name) {
                    u.size = layout.size;
                    u.alignment = layout.alignment;
                    apply_field_offsets(&mut u.members, layout);
                }
            }
            NodeKind::Enum(e) | NodeKind::Flags(e) => {
                if e.storage_type.is_none() {
                    e.storage_type = Some(enum_storage_tag(e));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn apply_field_offsets(members: &mut [Node], layout: &AggregateLayout) {
    if members.len() != layout.field_offsets.len() {
        warn!("field offset table does not match member list");
        return;
    }
    for (member, offset) in members.iter_mut().zip(&layout.field_offsets) {
        if let (NodeKind::Field(field), Some(offset)) = (&mut member.kind, offset) {
            field.offset = *offset as i32;
        }
    }
}
