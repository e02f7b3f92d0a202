//! In-memory representation of parsed GIR documents.
//!
//! A GIR file parses into a [`Module`] holding a tree of [`Node`]s; the
//! layout engine and the typelib builder both consume this model. Nothing
//! here does I/O.

mod module;
mod nodes;
mod tags;

pub use module::{find_node, Module};
pub use nodes::{
    BoxedNode, ConstantNode, EnumNode, ErrorDomainNode, FieldNode, FunctionNode, InterfaceNode,
    Node, NodeKind, NodeKindId, ObjectNode, ParamNode, PropertyNode, SignalNode, StructNode,
    TypeNode, UnionNode, VFuncNode, ValueNode, XRefNode,
};
pub use tags::{
    lookup_basic, BasicTypeInfo, ScopeKind, TypeTag, BASIC_TYPES, POINTER_ALIGN, POINTER_SIZE,
};
