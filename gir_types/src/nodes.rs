use indexmap::IndexMap;
use serde_derive::{Deserialize, Serialize};

use crate::tags::{ScopeKind, TypeTag};

/// Numeric identity of a node kind. The entry kinds double as the on-disk
/// blob type of the corresponding directory entry, so the values are fixed.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u16)]
pub enum NodeKindId {
    Invalid = 0,
    Function = 1,
    Callback = 2,
    Struct = 3,
    Boxed = 4,
    Enum = 5,
    Flags = 6,
    Object = 7,
    Interface = 8,
    Constant = 9,
    ErrorDomain = 10,
    Union = 11,
    Param = 12,
    Type = 13,
    Property = 14,
    Signal = 15,
    Value = 16,
    VFunc = 17,
    Field = 18,
    XRef = 19,
}

impl NodeKindId {
    pub fn as_str(self) -> &'static str {
        use NodeKindId::*;
        match self {
            Invalid => "invalid",
            Function => "function",
            Callback => "callback",
            Struct => "struct",
            Boxed => "boxed",
            Enum => "enum",
            Flags => "flags",
            Object => "object",
            Interface => "interface",
            Constant => "constant",
            ErrorDomain => "error-domain",
            Union => "union",
            Param => "param",
            Type => "type",
            Property => "property",
            Signal => "signal",
            Value => "value",
            VFunc => "vfunc",
            Field => "field",
            XRef => "xref",
        }
    }
}

/// One node of the IR tree: a name, free-form attributes, and kind-specific
/// payload. Top-level entries and aggregate members are both `Node`s.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Node {
    pub name: String,
    /// `<attribute name= value=/>` pairs in document order.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attributes: IndexMap<String, String>,
    pub kind: NodeKind,
}

impl Node {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Node {
        Node {
            name: name.into(),
            attributes: IndexMap::new(),
            kind,
        }
    }

    pub fn kind_id(&self) -> NodeKindId {
        self.kind.id()
    }

    /// Ordering used when an aggregate's members are written out:
    /// kind first, then byte-wise name.
    pub fn member_sort_key(&self) -> (NodeKindId, &[u8]) {
        (self.kind_id(), self.name.as_bytes())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    Function(FunctionNode),
    Callback(FunctionNode),
    Struct(StructNode),
    Boxed(BoxedNode),
    Enum(EnumNode),
    Flags(EnumNode),
    Object(ObjectNode),
    Interface(InterfaceNode),
    Constant(ConstantNode),
    ErrorDomain(ErrorDomainNode),
    Union(UnionNode),
    Property(PropertyNode),
    Signal(SignalNode),
    Value(ValueNode),
    VFunc(VFuncNode),
    Field(FieldNode),
    XRef(XRefNode),
}

impl NodeKind {
    pub fn id(&self) -> NodeKindId {
        match self {
            NodeKind::Function(_) => NodeKindId::Function,
            NodeKind::Callback(_) => NodeKindId::Callback,
            NodeKind::Struct(_) => NodeKindId::Struct,
            NodeKind::Boxed(_) => NodeKindId::Boxed,
            NodeKind::Enum(_) => NodeKindId::Enum,
            NodeKind::Flags(_) => NodeKindId::Flags,
            NodeKind::Object(_) => NodeKindId::Object,
            NodeKind::Interface(_) => NodeKindId::Interface,
            NodeKind::Constant(_) => NodeKindId::Constant,
            NodeKind::ErrorDomain(_) => NodeKindId::ErrorDomain,
            NodeKind::Union(_) => NodeKindId::Union,
            NodeKind::Property(_) => NodeKindId::Property,
            NodeKind::Signal(_) => NodeKindId::Signal,
            NodeKind::Value(_) => NodeKindId::Value,
            NodeKind::VFunc(_) => NodeKindId::VFunc,
            NodeKind::Field(_) => NodeKindId::Field,
            NodeKind::XRef(_) => NodeKindId::XRef,
        }
    }

    /// Whether the kind is a legal top-level directory entry.
    pub fn is_entry(&self) -> bool {
        matches!(
            self,
            NodeKind::Function(_)
                | NodeKind::Callback(_)
                | NodeKind::Struct(_)
                | NodeKind::Boxed(_)
                | NodeKind::Enum(_)
                | NodeKind::Flags(_)
                | NodeKind::Object(_)
                | NodeKind::Interface(_)
                | NodeKind::Constant(_)
                | NodeKind::ErrorDomain(_)
                | NodeKind::Union(_)
                | NodeKind::XRef(_)
        )
    }

    /// Kinds that own a member list.
    pub fn members(&self) -> Option<&Vec<Node>> {
        match self {
            NodeKind::Struct(s) => Some(&s.members),
            NodeKind::Boxed(b) => Some(&b.members),
            NodeKind::Union(u) => Some(&u.members),
            NodeKind::Object(o) => Some(&o.members),
            NodeKind::Interface(i) => Some(&i.members),
            _ => None,
        }
    }

    pub fn members_mut(&mut self) -> Option<&mut Vec<Node>> {
        match self {
            NodeKind::Struct(s) => Some(&mut s.members),
            NodeKind::Boxed(b) => Some(&mut b.members),
            NodeKind::Union(u) => Some(&mut u.members),
            NodeKind::Object(o) => Some(&mut o.members),
            NodeKind::Interface(i) => Some(&mut i.members),
            _ => None,
        }
    }
}

/// A recursive type descriptor. Owned by the node whose shape it describes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TypeNode {
    pub tag: TypeTag,
    pub is_pointer: bool,
    /// The raw spelling the document used, kept for diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unparsed: Option<String>,

    // Array shape: at most one of `length` (index of the parameter carrying
    // the element count) and `fixed_size` is present.
    #[serde(default)]
    pub zero_terminated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_size: Option<u16>,

    /// First element type of array/list/hash containers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param1: Option<Box<TypeNode>>,
    /// Hash value type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param2: Option<Box<TypeNode>>,

    /// Referenced entry name for `Interface` tags, possibly `Ns.Name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    /// Error-domain entry names for `Error` tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl TypeNode {
    pub fn simple(tag: TypeTag, is_pointer: bool) -> TypeNode {
        TypeNode {
            tag,
            is_pointer,
            unparsed: None,
            zero_terminated: false,
            length: None,
            fixed_size: None,
            param1: None,
            param2: None,
            interface: None,
            errors: Vec::new(),
        }
    }

    pub fn interface_ref(name: impl Into<String>) -> TypeNode {
        let mut ty = TypeNode::simple(TypeTag::Interface, false);
        ty.interface = Some(name.into());
        ty
    }

    /// A simple basic type with no pointer adjustment can live inline in a
    /// 32-bit type slot; everything else goes to the type pool.
    pub fn is_inline_simple(&self) -> bool {
        self.tag.is_basic()
    }
}

impl Default for TypeNode {
    fn default() -> TypeNode {
        TypeNode::simple(TypeTag::Void, false)
    }
}

/// A callable parameter or return value.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ParamNode {
    pub name: String,
    pub direction_in: bool,
    pub direction_out: bool,
    /// Caller allocates the output buffer.
    pub dipper: bool,
    pub optional: bool,
    pub retval: bool,
    pub allow_none: bool,
    /// Receiver owns the value.
    pub transfer_value: bool,
    /// Receiver owns the container only.
    pub transfer_container: bool,
    pub scope: ScopeKind,
    /// Index of the closure-data parameter, -1 when absent.
    pub closure: i8,
    /// Index of the destroy-notify parameter, -1 when absent.
    pub destroy: i8,
    pub ty: TypeNode,
}

impl ParamNode {
    /// The implicit return value of a callable without one: void, no flags.
    pub fn void_return() -> ParamNode {
        ParamNode {
            name: String::new(),
            direction_in: false,
            direction_out: false,
            dipper: false,
            optional: false,
            retval: true,
            allow_none: false,
            transfer_value: false,
            transfer_container: false,
            scope: ScopeKind::Invalid,
            closure: -1,
            destroy: -1,
            ty: TypeNode::default(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FunctionNode {
    pub deprecated: bool,
    /// Varargs callables never reach the typelib; the post-filter drops them.
    pub is_varargs: bool,
    pub is_method: bool,
    pub is_setter: bool,
    pub is_getter: bool,
    pub is_constructor: bool,
    pub wraps_vfunc: bool,
    pub throws: bool,
    pub symbol: String,
    pub result: ParamNode,
    pub parameters: Vec<ParamNode>,
}

impl FunctionNode {
    pub fn new(symbol: impl Into<String>) -> FunctionNode {
        FunctionNode {
            deprecated: false,
            is_varargs: false,
            is_method: false,
            is_setter: false,
            is_getter: false,
            is_constructor: false,
            wraps_vfunc: false,
            throws: false,
            symbol: symbol.into(),
            result: ParamNode::void_return(),
            parameters: Vec::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FieldNode {
    pub readable: bool,
    pub writable: bool,
    /// Bit-width for bitfields, 0 for a whole field.
    pub bits: u8,
    /// Byte offset inside the aggregate, -1 until the layout engine ran.
    pub offset: i32,
    pub ty: TypeNode,
}

impl FieldNode {
    pub fn new(ty: TypeNode) -> FieldNode {
        FieldNode {
            readable: true,
            writable: false,
            bits: 0,
            offset: -1,
            ty,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PropertyNode {
    pub deprecated: bool,
    pub readable: bool,
    pub writable: bool,
    pub construct: bool,
    pub construct_only: bool,
    pub ty: TypeNode,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SignalNode {
    pub deprecated: bool,
    pub run_first: bool,
    pub run_last: bool,
    pub run_cleanup: bool,
    pub no_recurse: bool,
    pub detailed: bool,
    pub action: bool,
    pub no_hooks: bool,
    pub has_class_closure: bool,
    pub class_closure: u16,
    pub result: ParamNode,
    pub parameters: Vec<ParamNode>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VFuncNode {
    pub is_varargs: bool,
    pub must_chain_up: bool,
    pub must_be_implemented: bool,
    pub must_not_be_implemented: bool,
    pub is_class_closure: bool,
    /// Byte offset of the function pointer in the class struct.
    pub offset: u16,
    /// Name of the method that invokes this vfunc, when one exists.
    pub invoker: Option<String>,
    pub result: ParamNode,
    pub parameters: Vec<ParamNode>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ValueNode {
    pub deprecated: bool,
    pub value: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EnumNode {
    pub deprecated: bool,
    /// Inferred from the value range when the document does not declare it.
    pub storage_type: Option<TypeTag>,
    pub gtype_name: Option<String>,
    pub gtype_init: Option<String>,
    /// `Value` nodes in source order.
    pub values: Vec<Node>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StructNode {
    pub deprecated: bool,
    /// Public typedef without a visible pointer star; measured as a pointer.
    pub disguised: bool,
    /// This record is the class struct of some object or interface.
    pub is_gtype_struct: bool,
    pub gtype_name: Option<String>,
    pub gtype_init: Option<String>,
    /// 0 until the layout engine ran; nonzero doubles as the memo flag.
    pub alignment: u32,
    pub size: u32,
    pub members: Vec<Node>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BoxedNode {
    pub deprecated: bool,
    pub gtype_name: String,
    pub gtype_init: String,
    pub alignment: u32,
    pub size: u32,
    pub members: Vec<Node>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UnionNode {
    pub deprecated: bool,
    pub gtype_name: Option<String>,
    pub gtype_init: Option<String>,
    pub alignment: u32,
    pub size: u32,
    pub members: Vec<Node>,
    /// One `Constant` node per discriminated branch, in branch order.
    pub discriminators: Vec<Node>,
    pub discriminator_offset: i32,
    pub discriminator_type: Option<TypeNode>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ObjectNode {
    pub deprecated: bool,
    pub abstract_: bool,
    pub gtype_name: String,
    pub gtype_init: String,
    /// Parent entry name, possibly `Ns.Name`.
    pub parent: Option<String>,
    /// Class-struct entry name.
    pub gtype_struct: Option<String>,
    /// Implemented interface entry names.
    pub interfaces: Vec<String>,
    pub members: Vec<Node>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct InterfaceNode {
    pub deprecated: bool,
    pub gtype_name: String,
    pub gtype_init: String,
    pub gtype_struct: Option<String>,
    /// Required object or interface entry names.
    pub prerequisites: Vec<String>,
    pub members: Vec<Node>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ConstantNode {
    pub deprecated: bool,
    pub ty: TypeNode,
    /// Literal text as written: decimal, hex, shift expression, TRUE/FALSE,
    /// or a plain string for utf8 constants.
    pub value: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorDomainNode {
    pub deprecated: bool,
    pub get_quark: String,
    /// Name of the enum entry listing this domain's error codes.
    pub codes: String,
}

/// Stub entry pointing at an entity in another namespace.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct XRefNode {
    pub namespace: String,
}
