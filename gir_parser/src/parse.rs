//! The second-pass state machine that builds the IR tree.
//!
//! States name the element currently open. Nodes are pushed on a stack when
//! their start tag arrives and attached to their parent (or the module's
//! entry list) when the end tag pops them; a completed `<type>` subtree
//! lands in `pending_type` and is consumed by the owning element's end
//! handler.

use gir_types::{
    BoxedNode, ConstantNode, EnumNode, ErrorDomainNode, FieldNode, FunctionNode, InterfaceNode,
    Module, Node, NodeKind, ObjectNode, ParamNode, PropertyNode, ScopeKind, SignalNode,
    StructNode, TypeNode, TypeTag, UnionNode, VFuncNode, ValueNode,
};
use indexmap::{IndexMap, IndexSet};
use log::{debug, warn};

use crate::error::{ParseError, Position};
use crate::typeparse::parse_type;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    Start,
    End,
    Repository,
    Include,
    Package,
    Namespace,
    Enum,
    Function,
    FunctionReturn,
    FunctionParameters,
    FunctionParameter,
    Class,
    ClassField,
    ClassProperty,
    Interface,
    InterfaceProperty,
    InterfaceField,
    Implements,
    Prerequisite,
    Boxed,
    BoxedField,
    Struct,
    StructField,
    ErrorDomain,
    Union,
    UnionField,
    NamespaceConstant,
    ClassConstant,
    InterfaceConstant,
    Alias,
    Type,
    Attribute,
    Unknown,
}

/// Attributes of one element, in document order.
pub(crate) struct Attrs(pub(crate) Vec<(String, String)>);

impl Attrs {
    pub(crate) fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Boolean attributes are spelled `"1"`.
    pub(crate) fn flag(&self, name: &str) -> bool {
        self.get(name) == Some("1")
    }

    pub(crate) fn present(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

pub(crate) struct Ctx {
    pub(crate) state: State,
    prev_state: State,
    unknown_depth: u32,
    /// Logical namespace derived from the file name.
    pub(crate) namespace: String,
    pub(crate) modules: Vec<Module>,
    pub(crate) current: Option<Module>,
    /// Collected by the first pass, moved into the module on `<namespace>`.
    pub(crate) aliases: IndexMap<String, String>,
    pub(crate) disguised: IndexSet<String>,
    pub(crate) dependencies: Vec<String>,
    pub(crate) include_names: Vec<String>,
    node_stack: Vec<Node>,
    current_param: Option<ParamNode>,
    /// Branch value of the union field currently open, if any.
    pending_branch: Option<String>,
    pending_type: Option<TypeNode>,
    type_stack: Vec<Vec<TypeNode>>,
    type_parameters: Vec<TypeNode>,
    type_depth: u32,
}

impl Ctx {
    pub(crate) fn new(namespace: &str) -> Ctx {
        Ctx {
            state: State::Start,
            prev_state: State::Start,
            unknown_depth: 0,
            namespace: namespace.to_string(),
            modules: Vec::new(),
            current: None,
            aliases: IndexMap::new(),
            disguised: IndexSet::new(),
            dependencies: Vec::new(),
            include_names: Vec::new(),
            node_stack: Vec::new(),
            current_param: None,
            pending_branch: None,
            pending_type: None,
            type_stack: Vec::new(),
            type_parameters: Vec::new(),
            type_depth: 0,
        }
    }

    fn switch(&mut self, state: State) {
        debug!("state {:?} -> {:?}", self.state, state);
        self.prev_state = self.state;
        self.state = state;
    }

    fn module(&mut self) -> &mut Module {
        self.current.as_mut().expect("namespace already open")
    }

    /// Validate an `<include>` directive's attributes. The caller recurses
    /// into the referenced document before calling [`Ctx::enter_include`].
    pub(crate) fn include_attrs(
        &self,
        pos: Position,
        attrs: &Attrs,
    ) -> Result<(String, String), ParseError> {
        let name = attrs
            .get("name")
            .ok_or_else(|| self.missing(pos, "include", "name"))?;
        let version = attrs
            .get("version")
            .ok_or_else(|| self.missing(pos, "include", "version"))?;
        Ok((name.to_string(), version.to_string()))
    }

    pub(crate) fn enter_include(&mut self, name: &str, version: &str) {
        self.dependencies.push(format!("{name}-{version}"));
        self.switch(State::Include);
    }

    fn missing(&self, pos: Position, element: &str, attribute: &str) -> ParseError {
        ParseError::MissingAttribute {
            position: pos,
            element: element.to_string(),
            attribute: attribute.to_string(),
        }
    }

    fn require_end(
        &self,
        pos: Position,
        expected: &str,
        found: &str,
    ) -> Result<(), ParseError> {
        if expected == found {
            Ok(())
        } else {
            Err(ParseError::MismatchedEndTag {
                position: pos,
                expected: expected.to_string(),
                found: found.to_string(),
            })
        }
    }

    fn push_node(&mut self, node: Node) {
        debug!("pushing node {:?} '{}'", node.kind_id(), node.name);
        self.node_stack.push(node);
    }

    fn pop_node(&mut self) -> Node {
        let node = self.node_stack.pop().expect("node stack underflow");
        debug!("popping node {:?} '{}'", node.kind_id(), node.name);
        node
    }

    /// Attach a finished node to the enclosing aggregate, or to the module's
    /// entry list when nothing encloses it.
    fn attach(&mut self, node: Node) {
        match self.node_stack.last_mut() {
            Some(parent) => match parent.kind.members_mut() {
                Some(members) => members.push(node),
                None => debug!("dropping '{}' inside non-aggregate", node.name),
            },
            None => self.module().entries.push(node),
        }
    }

    /// State to return to after an entry-level element closes, derived from
    /// the new stack top.
    fn container_state(&self, pos: Position, element: &str) -> Result<State, ParseError> {
        match self.node_stack.last().map(|node| &node.kind) {
            None => Ok(State::Namespace),
            Some(NodeKind::Object(_)) => Ok(State::Class),
            Some(NodeKind::Interface(_)) => Ok(State::Interface),
            Some(NodeKind::Boxed(_)) => Ok(State::Boxed),
            Some(NodeKind::Struct(_)) => Ok(State::Struct),
            Some(NodeKind::Union(_)) => Ok(State::Union),
            Some(_) => Err(ParseError::MismatchedEndTag {
                position: pos,
                expected: "an aggregate end".to_string(),
                found: element.to_string(),
            }),
        }
    }
}

/// Decimal, `0x` hex, or `a << b` shift expressions.
pub(crate) fn parse_value(text: &str) -> i64 {
    let text = text.trim();
    if let Some((base, shift)) = text.split_once("<<") {
        let base: i64 = base.trim().parse().unwrap_or(0);
        let shift: u32 = shift.trim().parse().unwrap_or(0);
        return base.checked_shl(shift).unwrap_or(0);
    }
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).unwrap_or(0);
    }
    text.parse().unwrap_or(0)
}

fn parse_transfer(param: &mut ParamNode, transfer: Option<&str>) {
    match transfer {
        None => warn!("required attribute 'transfer-ownership' missing"),
        Some("none") => {}
        Some("container") => param.transfer_container = true,
        Some("full") => param.transfer_value = true,
        Some(other) => warn!("unknown transfer-ownership value: {other}"),
    }
}

// Start handlers. Each returns true when it consumed the element.

fn start_function(ctx: &mut Ctx, pos: Position, element: &str, attrs: &Attrs) -> Result<bool, ParseError> {
    let found = match ctx.state {
        State::Namespace => matches!(element, "function" | "callback"),
        State::Class => matches!(
            element,
            "function" | "constructor" | "method" | "callback"
        ),
        State::Boxed | State::Struct | State::Union => {
            matches!(element, "constructor" | "method" | "callback")
        }
        State::Interface => matches!(element, "method" | "callback"),
        _ => false,
    };
    if !found {
        return Ok(false);
    }

    let name = attrs
        .get("name")
        .ok_or_else(|| ctx.missing(pos, element, "name"))?;
    let symbol = attrs.get("c:identifier");
    if element != "callback" && symbol.is_none() {
        return Err(ctx.missing(pos, element, "c:identifier"));
    }

    let mut function = FunctionNode::new(symbol.unwrap_or(""));
    function.deprecated = attrs.present("deprecated");
    function.throws = attrs.flag("throws");
    function.is_method = matches!(element, "method" | "constructor");
    function.is_constructor = element == "constructor";

    let kind = if element == "callback" {
        NodeKind::Callback(function)
    } else {
        NodeKind::Function(function)
    };
    ctx.push_node(Node::new(name, kind));
    ctx.switch(State::Function);
    Ok(true)
}

fn start_class(ctx: &mut Ctx, pos: Position, attrs: &Attrs) -> Result<(), ParseError> {
    let name = attrs
        .get("name")
        .ok_or_else(|| ctx.missing(pos, "class", "name"))?;
    let gtype_name = attrs
        .get("glib:type-name")
        .ok_or_else(|| ctx.missing(pos, "class", "glib:type-name"))?;
    let gtype_init = match attrs.get("glib:get-type") {
        Some(init) => init,
        // The root GObject class has no get_type function.
        None if gtype_name == "GObject" => "",
        None => return Err(ctx.missing(pos, "class", "glib:get-type")),
    };

    let object = ObjectNode {
        deprecated: attrs.present("deprecated"),
        abstract_: attrs.flag("abstract"),
        gtype_name: gtype_name.to_string(),
        gtype_init: gtype_init.to_string(),
        parent: attrs.get("parent").map(str::to_string),
        gtype_struct: attrs.get("glib:type-struct").map(str::to_string),
        interfaces: Vec::new(),
        members: Vec::new(),
    };
    ctx.push_node(Node::new(name, NodeKind::Object(object)));
    ctx.switch(State::Class);
    Ok(())
}

fn start_interface(ctx: &mut Ctx, pos: Position, attrs: &Attrs) -> Result<(), ParseError> {
    let name = attrs
        .get("name")
        .ok_or_else(|| ctx.missing(pos, "interface", "name"))?;
    let gtype_name = attrs
        .get("glib:type-name")
        .ok_or_else(|| ctx.missing(pos, "interface", "glib:type-name"))?;
    let gtype_init = attrs
        .get("glib:get-type")
        .ok_or_else(|| ctx.missing(pos, "interface", "glib:get-type"))?;

    let interface = InterfaceNode {
        deprecated: attrs.present("deprecated"),
        gtype_name: gtype_name.to_string(),
        gtype_init: gtype_init.to_string(),
        gtype_struct: attrs.get("glib:type-struct").map(str::to_string),
        prerequisites: Vec::new(),
        members: Vec::new(),
    };
    ctx.push_node(Node::new(name, NodeKind::Interface(interface)));
    ctx.switch(State::Interface);
    Ok(())
}

fn start_struct(ctx: &mut Ctx, pos: Position, attrs: &Attrs) -> Result<(), ParseError> {
    let name = attrs.get("name");
    if name.is_none() && ctx.node_stack.is_empty() {
        return Err(ctx.missing(pos, "record", "name"));
    }
    let gtype_name = attrs.get("glib:type-name");
    let gtype_init = attrs.get("glib:get-type");
    if gtype_name.is_none() && gtype_init.is_some() {
        return Err(ctx.missing(pos, "record", "glib:type-name"));
    }
    if gtype_name.is_some() && gtype_init.is_none() {
        return Err(ctx.missing(pos, "record", "glib:get-type"));
    }

    let record = StructNode {
        deprecated: attrs.present("deprecated"),
        disguised: attrs.flag("disguised"),
        is_gtype_struct: attrs.present("glib:is-gtype-struct-for"),
        gtype_name: gtype_name.map(str::to_string),
        gtype_init: gtype_init.map(str::to_string),
        alignment: 0,
        size: 0,
        members: Vec::new(),
    };
    ctx.push_node(Node::new(name.unwrap_or(""), NodeKind::Struct(record)));
    ctx.switch(State::Struct);
    Ok(())
}

fn start_union(ctx: &mut Ctx, pos: Position, attrs: &Attrs) -> Result<(), ParseError> {
    let name = attrs.get("name");
    if name.is_none() && ctx.node_stack.is_empty() {
        return Err(ctx.missing(pos, "union", "name"));
    }
    let union = UnionNode {
        deprecated: attrs.present("deprecated"),
        gtype_name: attrs.get("glib:type-name").map(str::to_string),
        gtype_init: attrs.get("glib:get-type").map(str::to_string),
        alignment: 0,
        size: 0,
        members: Vec::new(),
        discriminators: Vec::new(),
        discriminator_offset: 0,
        discriminator_type: None,
    };
    ctx.push_node(Node::new(name.unwrap_or(""), NodeKind::Union(union)));
    ctx.switch(State::Union);
    Ok(())
}

fn start_boxed(ctx: &mut Ctx, pos: Position, attrs: &Attrs) -> Result<(), ParseError> {
    let name = attrs
        .get("glib:name")
        .ok_or_else(|| ctx.missing(pos, "glib:boxed", "glib:name"))?;
    let gtype_name = attrs
        .get("glib:type-name")
        .ok_or_else(|| ctx.missing(pos, "glib:boxed", "glib:type-name"))?;
    let gtype_init = attrs
        .get("glib:get-type")
        .ok_or_else(|| ctx.missing(pos, "glib:boxed", "glib:get-type"))?;

    let boxed = BoxedNode {
        deprecated: attrs.present("deprecated"),
        gtype_name: gtype_name.to_string(),
        gtype_init: gtype_init.to_string(),
        alignment: 0,
        size: 0,
        members: Vec::new(),
    };
    ctx.push_node(Node::new(name, NodeKind::Boxed(boxed)));
    ctx.switch(State::Boxed);
    Ok(())
}

fn start_enum(ctx: &mut Ctx, pos: Position, element: &str, attrs: &Attrs) -> Result<(), ParseError> {
    let name = attrs
        .get("name")
        .ok_or_else(|| ctx.missing(pos, element, "name"))?;
    let enum_node = EnumNode {
        deprecated: attrs.present("deprecated"),
        storage_type: None,
        gtype_name: attrs.get("glib:type-name").map(str::to_string),
        gtype_init: attrs.get("glib:get-type").map(str::to_string),
        values: Vec::new(),
    };
    let kind = if element == "bitfield" {
        NodeKind::Flags(enum_node)
    } else {
        NodeKind::Enum(enum_node)
    };
    ctx.push_node(Node::new(name, kind));
    ctx.switch(State::Enum);
    Ok(())
}

fn start_errordomain(ctx: &mut Ctx, pos: Position, attrs: &Attrs) -> Result<(), ParseError> {
    let name = attrs
        .get("name")
        .ok_or_else(|| ctx.missing(pos, "errordomain", "name"))?;
    let get_quark = attrs
        .get("get-quark")
        .ok_or_else(|| ctx.missing(pos, "errordomain", "get-quark"))?;
    let codes = attrs
        .get("codes")
        .ok_or_else(|| ctx.missing(pos, "errordomain", "codes"))?;

    let domain = ErrorDomainNode {
        deprecated: attrs.present("deprecated"),
        get_quark: get_quark.to_string(),
        codes: codes.to_string(),
    };
    ctx.push_node(Node::new(name, NodeKind::ErrorDomain(domain)));
    ctx.switch(State::ErrorDomain);
    Ok(())
}

fn start_signal(ctx: &mut Ctx, pos: Position, attrs: &Attrs) -> Result<(), ParseError> {
    let name = attrs
        .get("name")
        .ok_or_else(|| ctx.missing(pos, "glib:signal", "name"))?;
    let when = attrs.get("when");
    let signal = SignalNode {
        deprecated: attrs.present("deprecated"),
        run_first: when == Some("FIRST"),
        run_last: when.is_none() || when == Some("LAST"),
        run_cleanup: when.is_some() && when != Some("FIRST") && when != Some("LAST"),
        no_recurse: attrs.flag("no-recurse"),
        detailed: attrs.flag("detailed"),
        action: attrs.flag("action"),
        no_hooks: attrs.flag("no-hooks"),
        has_class_closure: attrs.flag("has-class-closure"),
        class_closure: 0,
        result: ParamNode::void_return(),
        parameters: Vec::new(),
    };
    ctx.push_node(Node::new(name, NodeKind::Signal(signal)));
    ctx.switch(State::Function);
    Ok(())
}

fn start_vfunc(ctx: &mut Ctx, pos: Position, attrs: &Attrs) -> Result<(), ParseError> {
    let name = attrs
        .get("name")
        .ok_or_else(|| ctx.missing(pos, "virtual-method", "name"))?;
    let override_ = attrs.get("override");
    let vfunc = VFuncNode {
        is_varargs: false,
        must_chain_up: attrs.flag("must-chain-up"),
        must_be_implemented: override_ == Some("always"),
        must_not_be_implemented: override_ == Some("never"),
        is_class_closure: attrs.flag("is-class-closure"),
        offset: attrs
            .get("offset")
            .and_then(|text| text.parse().ok())
            .unwrap_or(0),
        invoker: attrs.get("invoker").map(str::to_string),
        result: ParamNode::void_return(),
        parameters: Vec::new(),
    };
    ctx.push_node(Node::new(name, NodeKind::VFunc(vfunc)));
    ctx.switch(State::Function);
    Ok(())
}

fn start_field(ctx: &mut Ctx, pos: Position, attrs: &Attrs) -> Result<(), ParseError> {
    let name = attrs
        .get("name")
        .ok_or_else(|| ctx.missing(pos, "field", "name"))?;
    let mut field = FieldNode::new(TypeNode::default());
    field.readable = attrs.get("readable") != Some("0");
    field.writable = attrs.flag("writable");
    field.bits = attrs
        .get("bits")
        .and_then(|text| text.parse().ok())
        .unwrap_or(0);

    let next = match ctx.node_stack.last().map(|node| &node.kind) {
        Some(NodeKind::Object(_)) => State::ClassField,
        Some(NodeKind::Interface(_)) => State::InterfaceField,
        Some(NodeKind::Boxed(_)) => State::BoxedField,
        Some(NodeKind::Struct(_)) => State::StructField,
        Some(NodeKind::Union(_)) => State::UnionField,
        _ => {
            return Err(ParseError::InvalidElement {
                position: pos,
                element: "field".to_string(),
            })
        }
    };
    ctx.pending_branch = attrs.get("branch").map(str::to_string);
    ctx.push_node(Node::new(name, NodeKind::Field(field)));
    ctx.switch(next);
    Ok(())
}

fn start_property(ctx: &mut Ctx, pos: Position, attrs: &Attrs) -> Result<(), ParseError> {
    let name = attrs
        .get("name")
        .ok_or_else(|| ctx.missing(pos, "property", "name"))?;
    let property = PropertyNode {
        deprecated: attrs.present("deprecated"),
        // Properties are assumed readable.
        readable: attrs.get("readable") != Some("0"),
        writable: attrs.flag("writable"),
        construct: attrs.flag("construct"),
        construct_only: attrs.flag("construct-only"),
        ty: TypeNode::default(),
    };
    let next = if ctx.state == State::Class {
        State::ClassProperty
    } else {
        State::InterfaceProperty
    };
    ctx.push_node(Node::new(name, NodeKind::Property(property)));
    ctx.switch(next);
    Ok(())
}

fn start_member(ctx: &mut Ctx, pos: Position, attrs: &Attrs) -> Result<(), ParseError> {
    let name = attrs
        .get("name")
        .ok_or_else(|| ctx.missing(pos, "member", "name"))?;
    let value = ValueNode {
        deprecated: attrs.present("deprecated"),
        value: parse_value(attrs.get("value").unwrap_or("0")) as u32,
    };
    let node = Node::new(name, NodeKind::Value(value));
    match ctx.node_stack.last_mut().map(|top| &mut top.kind) {
        Some(NodeKind::Enum(e)) | Some(NodeKind::Flags(e)) => e.values.push(node),
        _ => {
            return Err(ParseError::InvalidElement {
                position: pos,
                element: "member".to_string(),
            })
        }
    }
    Ok(())
}

fn start_constant(ctx: &mut Ctx, pos: Position, attrs: &Attrs) -> Result<(), ParseError> {
    let name = attrs
        .get("name")
        .ok_or_else(|| ctx.missing(pos, "constant", "name"))?;
    let value = attrs
        .get("value")
        .ok_or_else(|| ctx.missing(pos, "constant", "value"))?;
    let constant = ConstantNode {
        deprecated: attrs.present("deprecated"),
        ty: TypeNode::default(),
        value: value.to_string(),
    };
    let next = match ctx.state {
        State::Namespace => State::NamespaceConstant,
        State::Class => State::ClassConstant,
        State::Interface => State::InterfaceConstant,
        _ => unreachable!("guarded by the caller"),
    };
    ctx.push_node(Node::new(name, NodeKind::Constant(constant)));
    ctx.switch(next);
    Ok(())
}

fn start_parameter(ctx: &mut Ctx, attrs: &Attrs) {
    let mut param = ParamNode::void_return();
    param.retval = attrs.flag("retval");
    param.name = attrs.get("name").unwrap_or("unknown").to_string();
    match attrs.get("direction") {
        Some("out") => {
            param.direction_in = false;
            param.direction_out = true;
        }
        Some("inout") => {
            param.direction_in = true;
            param.direction_out = true;
        }
        _ => {
            param.direction_in = true;
            param.direction_out = false;
        }
    }
    param.dipper = attrs.flag("dipper");
    param.optional = attrs.flag("optional");
    param.allow_none = attrs.flag("allow-none");
    parse_transfer(&mut param, attrs.get("transfer-ownership"));
    param.scope = match attrs.get("scope") {
        Some("call") => ScopeKind::Call,
        Some("async") => ScopeKind::Async,
        Some("notified") => ScopeKind::Notified,
        _ => ScopeKind::Invalid,
    };
    param.closure = attrs
        .get("closure")
        .and_then(|text| text.parse().ok())
        .unwrap_or(-1);
    param.destroy = attrs
        .get("destroy")
        .and_then(|text| text.parse().ok())
        .unwrap_or(-1);

    ctx.current_param = Some(param);
    ctx.switch(State::FunctionParameter);
}

fn start_return_value(ctx: &mut Ctx, attrs: &Attrs) {
    let mut param = ParamNode::void_return();
    parse_transfer(&mut param, attrs.get("transfer-ownership"));
    param.allow_none = attrs.flag("allow-none");
    ctx.current_param = Some(param);
    ctx.switch(State::FunctionReturn);
}

fn start_discriminator(ctx: &mut Ctx, pos: Position, attrs: &Attrs) -> Result<(), ParseError> {
    let type_name = attrs
        .get("type")
        .ok_or_else(|| ctx.missing(pos, "discriminator", "type"))?
        .to_string();
    let offset = attrs
        .get("offset")
        .ok_or_else(|| ctx.missing(pos, "discriminator", "offset"))?
        .parse()
        .unwrap_or(0);

    let ty = parse_type(ctx.module(), &type_name);
    match ctx.node_stack.last_mut().map(|top| &mut top.kind) {
        Some(NodeKind::Union(u)) => {
            u.discriminator_type = Some(ty);
            u.discriminator_offset = offset;
            Ok(())
        }
        _ => Err(ParseError::InvalidElement {
            position: pos,
            element: "discriminator".to_string(),
        }),
    }
}

fn start_attribute(ctx: &mut Ctx, pos: Position, attrs: &Attrs) -> Result<bool, ParseError> {
    if ctx.node_stack.is_empty() {
        return Ok(false);
    }
    let name = attrs
        .get("name")
        .ok_or_else(|| ctx.missing(pos, "attribute", "name"))?
        .to_string();
    let value = attrs
        .get("value")
        .ok_or_else(|| ctx.missing(pos, "attribute", "value"))?
        .to_string();
    ctx.switch(State::Attribute);
    let top = ctx.node_stack.last_mut().expect("checked above");
    top.attributes.insert(name, value);
    Ok(true)
}

/// States from which a `<type>` child is legal; they all have an owner
/// waiting in `current_param` or on the node stack.
fn in_typed_state(state: State) -> bool {
    matches!(
        state,
        State::FunctionParameter
            | State::FunctionReturn
            | State::StructField
            | State::UnionField
            | State::ClassProperty
            | State::ClassField
            | State::InterfaceField
            | State::InterfaceProperty
            | State::BoxedField
            | State::NamespaceConstant
            | State::ClassConstant
            | State::InterfaceConstant
    )
}

fn start_type(ctx: &mut Ctx, pos: Position, element: &str, attrs: &Attrs) -> Result<(), ParseError> {
    let is_array = element == "array";
    let is_varargs = element == "varargs";

    if ctx.state == State::Type {
        ctx.type_depth += 1;
        let parents = std::mem::take(&mut ctx.type_parameters);
        ctx.type_stack.push(parents);
    } else if in_typed_state(ctx.state) {
        if ctx.pending_type.is_some() {
            // The owner already received its one type child.
            return Err(ParseError::InvalidElement {
                position: pos,
                element: element.to_string(),
            });
        }
        ctx.switch(State::Type);
        ctx.type_depth = 1;
        ctx.type_stack.clear();
        ctx.type_parameters.clear();
        if is_varargs {
            match ctx.node_stack.last_mut().map(|top| &mut top.kind) {
                Some(NodeKind::Function(f)) | Some(NodeKind::Callback(f)) => f.is_varargs = true,
                Some(NodeKind::VFunc(v)) => v.is_varargs = true,
                _ => {}
            }
        }
    } else {
        return Err(ParseError::InvalidElement {
            position: pos,
            element: element.to_string(),
        });
    }

    if is_varargs {
        return Ok(());
    }

    let ty = if is_array {
        let mut ty = TypeNode::simple(TypeTag::Array, true);
        // Arrays default to zero-terminated unless explicitly disabled.
        ty.zero_terminated = attrs.get("zero-terminated") != Some("0");
        ty.length = attrs.get("length").and_then(|text| text.parse().ok());
        ty.fixed_size = attrs.get("fixed-size").and_then(|text| text.parse().ok());
        ty
    } else {
        let name = attrs
            .get("name")
            .ok_or_else(|| ctx.missing(pos, element, "name"))?
            .to_string();

        let mut pointer_depth = attrs
            .get("c:type")
            .map(|ctype| ctype.bytes().rev().take_while(|&b| b == b'*').count())
            .unwrap_or(0);
        // Out parameters consume one level of indirection.
        if pointer_depth > 0
            && ctx
                .current_param
                .as_ref()
                .map(|param| param.direction_out)
                .unwrap_or(false)
        {
            pointer_depth -= 1;
        }

        let mut ty = parse_type(ctx.module(), &name);
        if ty.tag == TypeTag::Interface {
            let target = ty.interface.clone().unwrap_or_default();
            if ctx.module().is_disguised(&target) {
                // Disguised records read through an implicit pointer.
                pointer_depth += 1;
            }
        }
        if pointer_depth > 0 {
            ty.is_pointer = true;
        }
        ty
    };

    ctx.type_parameters.push(ty);
    Ok(())
}

fn end_type(ctx: &mut Ctx) {
    if ctx.type_depth == 1 {
        end_type_top(ctx);
        let previous = ctx.prev_state;
        ctx.switch(previous);
    } else {
        end_type_recurse(ctx);
        ctx.type_depth -= 1;
    }
}

fn any_type(ctx: &mut Ctx) -> TypeNode {
    parse_type(ctx.module(), "any")
}

fn end_type_top(ctx: &mut Ctx) {
    if !ctx.type_parameters.is_empty() {
        let mut ty = ctx.type_parameters.remove(0);
        // Containers default their unspecified parameters to void pointers.
        match ty.tag {
            TypeTag::Array | TypeTag::GList | TypeTag::GSList => {
                if ty.param1.is_none() {
                    ty.param1 = Some(Box::new(any_type(ctx)));
                }
            }
            TypeTag::GHash => {
                if ty.param1.is_none() {
                    ty.param1 = Some(Box::new(any_type(ctx)));
                    ty.param2 = Some(Box::new(any_type(ctx)));
                }
            }
            _ => {}
        }
        ctx.pending_type = Some(ty);
    }
    ctx.type_depth = 0;
    ctx.type_parameters.clear();
}

fn end_type_recurse(ctx: &mut Ctx) {
    let param = if ctx.type_parameters.is_empty() {
        None
    } else {
        Some(ctx.type_parameters.remove(0))
    };
    let mut parents = ctx.type_stack.pop().expect("type stack underflow");
    if let (Some(parent), Some(param)) = (parents.first_mut(), param) {
        match parent.tag {
            TypeTag::Array | TypeTag::GList | TypeTag::GSList => {
                if parent.param1.is_none() {
                    parent.param1 = Some(Box::new(param));
                }
            }
            TypeTag::GHash => {
                if parent.param1.is_none() {
                    parent.param1 = Some(Box::new(param));
                } else if parent.param2.is_none() {
                    parent.param2 = Some(Box::new(param));
                }
            }
            _ => {}
        }
    }
    ctx.type_parameters = parents;
}

// End-of-element plumbing shared by the field/property/constant states.

fn finish_typed_member(ctx: &mut Ctx) {
    let ty = ctx.pending_type.take().unwrap_or_default();
    let mut node = ctx.pop_node();
    match &mut node.kind {
        NodeKind::Field(field) => field.ty = ty,
        NodeKind::Property(property) => property.ty = ty,
        NodeKind::Constant(constant) => constant.ty = ty,
        _ => unreachable!("not a typed member"),
    }

    // A union branch value becomes a discriminator constant on the parent.
    let branch = ctx.pending_branch.take();
    ctx.attach(node.clone());
    if let (Some(branch), Some(parent)) = (branch, ctx.node_stack.last_mut()) {
        if let NodeKind::Union(u) = &mut parent.kind {
            match &u.discriminator_type {
                Some(ty) => u.discriminators.push(Node::new(
                    node.name,
                    NodeKind::Constant(ConstantNode {
                        deprecated: false,
                        ty: ty.clone(),
                        value: branch,
                    }),
                )),
                None => warn!("union branch on '{}' without a discriminator", node.name),
            }
        }
    }
}

fn finish_param(ctx: &mut Ctx) {
    let mut param = ctx.current_param.take().expect("open parameter");
    if let Some(ty) = ctx.pending_type.take() {
        param.ty = ty;
    }
    match ctx.node_stack.last_mut().map(|top| &mut top.kind) {
        Some(NodeKind::Function(f)) | Some(NodeKind::Callback(f)) => f.parameters.push(param),
        Some(NodeKind::Signal(s)) => s.parameters.push(param),
        Some(NodeKind::VFunc(v)) => v.parameters.push(param),
        _ => warn!("parameter outside a callable"),
    }
}

fn finish_return(ctx: &mut Ctx) {
    let mut param = ctx.current_param.take().expect("open return value");
    if let Some(ty) = ctx.pending_type.take() {
        param.ty = ty;
    }
    match ctx.node_stack.last_mut().map(|top| &mut top.kind) {
        Some(NodeKind::Function(f)) | Some(NodeKind::Callback(f)) => f.result = param,
        Some(NodeKind::Signal(s)) => s.result = param,
        Some(NodeKind::VFunc(v)) => v.result = param,
        _ => warn!("return value outside a callable"),
    }
}

pub(crate) fn end_element(ctx: &mut Ctx, pos: Position, element: &str) -> Result<(), ParseError> {
    debug!("</{element}>");
    match ctx.state {
        State::Start | State::End => Ok(()),
        State::Repository => {
            ctx.switch(State::End);
            Ok(())
        }
        State::Include => {
            ctx.require_end(pos, "include", element)?;
            ctx.switch(State::Repository);
            Ok(())
        }
        State::Package => {
            ctx.require_end(pos, "package", element)?;
            ctx.switch(State::Repository);
            Ok(())
        }
        State::Namespace => {
            ctx.require_end(pos, "namespace", element)?;
            let module = ctx.current.take().expect("namespace open");
            ctx.modules.push(module);
            ctx.switch(State::Repository);
            Ok(())
        }
        State::Alias => {
            ctx.require_end(pos, "alias", element)?;
            ctx.switch(State::Namespace);
            Ok(())
        }
        State::FunctionReturn => {
            if matches!(element, "type" | "array") {
                return Ok(());
            }
            ctx.require_end(pos, "return-value", element)?;
            finish_return(ctx);
            ctx.switch(State::Function);
            Ok(())
        }
        State::FunctionParameters => {
            ctx.require_end(pos, "parameters", element)?;
            ctx.switch(State::Function);
            Ok(())
        }
        State::FunctionParameter => {
            if matches!(element, "type" | "array") {
                return Ok(());
            }
            ctx.require_end(pos, "parameter", element)?;
            finish_param(ctx);
            ctx.switch(State::FunctionParameters);
            Ok(())
        }
        State::Function => {
            let node = ctx.pop_node();
            let next = ctx.container_state(pos, element)?;
            ctx.attach(node);
            ctx.switch(next);
            Ok(())
        }
        State::ClassField => {
            if matches!(element, "type" | "array") {
                return Ok(());
            }
            ctx.require_end(pos, "field", element)?;
            finish_typed_member(ctx);
            ctx.switch(State::Class);
            Ok(())
        }
        State::ClassProperty => {
            if matches!(element, "type" | "array") {
                return Ok(());
            }
            ctx.require_end(pos, "property", element)?;
            finish_typed_member(ctx);
            ctx.switch(State::Class);
            Ok(())
        }
        State::Class => {
            ctx.require_end(pos, "class", element)?;
            let node = ctx.pop_node();
            ctx.attach(node);
            ctx.switch(State::Namespace);
            Ok(())
        }
        State::ErrorDomain => {
            ctx.require_end(pos, "errordomain", element)?;
            let node = ctx.pop_node();
            ctx.attach(node);
            ctx.switch(State::Namespace);
            Ok(())
        }
        State::InterfaceProperty => {
            if matches!(element, "type" | "array") {
                return Ok(());
            }
            ctx.require_end(pos, "property", element)?;
            finish_typed_member(ctx);
            ctx.switch(State::Interface);
            Ok(())
        }
        State::InterfaceField => {
            if matches!(element, "type" | "array") {
                return Ok(());
            }
            ctx.require_end(pos, "field", element)?;
            finish_typed_member(ctx);
            ctx.switch(State::Interface);
            Ok(())
        }
        State::Interface => {
            ctx.require_end(pos, "interface", element)?;
            let node = ctx.pop_node();
            ctx.attach(node);
            ctx.switch(State::Namespace);
            Ok(())
        }
        State::Enum => {
            if element == "member" {
                return Ok(());
            }
            if element != "enumeration" && element != "bitfield" {
                return Err(ParseError::MismatchedEndTag {
                    position: pos,
                    expected: "enumeration".to_string(),
                    found: element.to_string(),
                });
            }
            let node = ctx.pop_node();
            ctx.attach(node);
            ctx.switch(State::Namespace);
            Ok(())
        }
        State::Boxed => {
            ctx.require_end(pos, "glib:boxed", element)?;
            let node = ctx.pop_node();
            ctx.attach(node);
            ctx.switch(State::Namespace);
            Ok(())
        }
        State::BoxedField => {
            if matches!(element, "type" | "array") {
                return Ok(());
            }
            ctx.require_end(pos, "field", element)?;
            finish_typed_member(ctx);
            ctx.switch(State::Boxed);
            Ok(())
        }
        State::StructField => {
            if matches!(element, "type" | "array") {
                return Ok(());
            }
            ctx.require_end(pos, "field", element)?;
            finish_typed_member(ctx);
            ctx.switch(State::Struct);
            Ok(())
        }
        State::Struct => {
            ctx.require_end(pos, "record", element)?;
            let node = ctx.pop_node();
            let next = ctx.container_state(pos, element)?;
            if ctx.node_stack.is_empty() {
                ctx.attach(node);
            } else {
                // Nested records never become entries of their own.
                debug!("discarding nested record '{}'", node.name);
            }
            ctx.switch(next);
            Ok(())
        }
        State::UnionField => {
            if matches!(element, "type" | "array") {
                return Ok(());
            }
            ctx.require_end(pos, "field", element)?;
            finish_typed_member(ctx);
            ctx.switch(State::Union);
            Ok(())
        }
        State::Union => {
            if element == "discriminator" {
                return Ok(());
            }
            ctx.require_end(pos, "union", element)?;
            let node = ctx.pop_node();
            let next = ctx.container_state(pos, element)?;
            if ctx.node_stack.is_empty() {
                ctx.attach(node);
            } else {
                debug!("discarding nested union '{}'", node.name);
            }
            ctx.switch(next);
            Ok(())
        }
        State::Implements => {
            ctx.require_end(pos, "implements", element)?;
            ctx.switch(State::Class);
            Ok(())
        }
        State::Prerequisite => {
            ctx.require_end(pos, "prerequisite", element)?;
            ctx.switch(State::Interface);
            Ok(())
        }
        State::NamespaceConstant | State::ClassConstant | State::InterfaceConstant => {
            if matches!(element, "type" | "array") {
                return Ok(());
            }
            ctx.require_end(pos, "constant", element)?;
            let next = match ctx.state {
                State::NamespaceConstant => State::Namespace,
                State::ClassConstant => State::Class,
                _ => State::Interface,
            };
            finish_typed_member(ctx);
            ctx.switch(next);
            Ok(())
        }
        State::Type => {
            if matches!(element, "type" | "array" | "varargs") {
                end_type(ctx);
                Ok(())
            } else {
                Err(ParseError::MismatchedEndTag {
                    position: pos,
                    expected: "type".to_string(),
                    found: element.to_string(),
                })
            }
        }
        State::Attribute => {
            if element == "attribute" {
                let previous = ctx.prev_state;
                ctx.switch(previous);
            }
            Ok(())
        }
        State::Unknown => {
            ctx.unknown_depth -= 1;
            if ctx.unknown_depth == 0 {
                let previous = ctx.prev_state;
                ctx.switch(previous);
            }
            Ok(())
        }
    }
}

/// Dispatch one start tag. `<include>` directives are handled by the
/// caller (they recurse into other files) before this runs.
pub(crate) fn start_element(
    ctx: &mut Ctx,
    pos: Position,
    element: &str,
    attrs: &Attrs,
) -> Result<(), ParseError> {
    debug!("<{element}>");

    // Anything inside an unrecognized subtree stays unrecognized.
    if ctx.state == State::Unknown {
        ctx.unknown_depth += 1;
        return Ok(());
    }

    let handled = match element {
        "repository" if ctx.state == State::Start => {
            let version = attrs
                .get("version")
                .ok_or_else(|| ctx.missing(pos, element, "version"))?;
            if version != "1.0" {
                return Err(ParseError::UnsupportedVersion {
                    position: pos,
                    version: version.to_string(),
                });
            }
            ctx.switch(State::Repository);
            true
        }
        "package" if ctx.state == State::Repository => {
            ctx.switch(State::Package);
            true
        }
        "namespace" if ctx.state == State::Repository => {
            if ctx.current.is_some() {
                return Err(ParseError::DuplicateNamespace { position: pos });
            }
            let name = attrs
                .get("name")
                .ok_or_else(|| ctx.missing(pos, element, "name"))?;
            let version = attrs
                .get("version")
                .ok_or_else(|| ctx.missing(pos, element, "version"))?;
            if name != ctx.namespace {
                return Err(ParseError::NamespaceMismatch {
                    position: pos,
                    name: name.to_string(),
                    expected: ctx.namespace.clone(),
                });
            }
            let mut module = Module::new(name, version);
            module.shared_library = attrs.get("shared-library").map(str::to_string);
            module.c_prefix = attrs.get("c:prefix").map(str::to_string);
            module.aliases = std::mem::take(&mut ctx.aliases);
            module.disguised = std::mem::take(&mut ctx.disguised);
            module.includes = std::mem::take(&mut ctx.include_names);
            module.dependencies = std::mem::take(&mut ctx.dependencies);
            ctx.current = Some(module);
            ctx.switch(State::Namespace);
            true
        }
        "alias" if ctx.state == State::Namespace => {
            // Alias payloads were gathered by the first pass.
            ctx.switch(State::Alias);
            true
        }
        "type" | "array" | "varargs" => {
            start_type(ctx, pos, element, attrs)?;
            true
        }
        "attribute" => start_attribute(ctx, pos, attrs)?,
        "class" if ctx.state == State::Namespace => {
            start_class(ctx, pos, attrs)?;
            true
        }
        "interface" if ctx.state == State::Namespace => {
            start_interface(ctx, pos, attrs)?;
            true
        }
        "record"
            if matches!(
                ctx.state,
                State::Namespace | State::Struct | State::Union | State::Class
            ) =>
        {
            start_struct(ctx, pos, attrs)?;
            true
        }
        "union"
            if matches!(
                ctx.state,
                State::Namespace | State::Struct | State::Union | State::Class
            ) =>
        {
            start_union(ctx, pos, attrs)?;
            true
        }
        "glib:boxed" if ctx.state == State::Namespace => {
            start_boxed(ctx, pos, attrs)?;
            true
        }
        "enumeration" | "bitfield" if ctx.state == State::Namespace => {
            start_enum(ctx, pos, element, attrs)?;
            true
        }
        "errordomain" if ctx.state == State::Namespace => {
            start_errordomain(ctx, pos, attrs)?;
            true
        }
        "glib:signal" if matches!(ctx.state, State::Class | State::Interface) => {
            start_signal(ctx, pos, attrs)?;
            true
        }
        "virtual-method" if matches!(ctx.state, State::Class | State::Interface) => {
            start_vfunc(ctx, pos, attrs)?;
            true
        }
        "field"
            if matches!(
                ctx.state,
                State::Class | State::Boxed | State::Struct | State::Union | State::Interface
            ) =>
        {
            start_field(ctx, pos, attrs)?;
            true
        }
        "property" if matches!(ctx.state, State::Class | State::Interface) => {
            start_property(ctx, pos, attrs)?;
            true
        }
        "member" if ctx.state == State::Enum => {
            start_member(ctx, pos, attrs)?;
            true
        }
        "constant"
            if matches!(
                ctx.state,
                State::Namespace | State::Class | State::Interface
            ) =>
        {
            start_constant(ctx, pos, attrs)?;
            true
        }
        "implements" if ctx.state == State::Class => {
            let name = attrs
                .get("name")
                .ok_or_else(|| ctx.missing(pos, element, "name"))?
                .to_string();
            if let Some(NodeKind::Object(object)) =
                ctx.node_stack.last_mut().map(|top| &mut top.kind)
            {
                object.interfaces.push(name);
            }
            ctx.switch(State::Implements);
            true
        }
        "prerequisite" if ctx.state == State::Interface => {
            let name = attrs
                .get("name")
                .ok_or_else(|| ctx.missing(pos, element, "name"))?
                .to_string();
            if let Some(NodeKind::Interface(interface)) =
                ctx.node_stack.last_mut().map(|top| &mut top.kind)
            {
                interface.prerequisites.push(name);
            }
            ctx.switch(State::Prerequisite);
            true
        }
        "parameters" if ctx.state == State::Function => {
            ctx.switch(State::FunctionParameters);
            true
        }
        "parameter" if ctx.state == State::FunctionParameters => {
            start_parameter(ctx, attrs);
            true
        }
        "return-value" if ctx.state == State::Function => {
            start_return_value(ctx, attrs);
            true
        }
        "discriminator" if ctx.state == State::Union => {
            start_discriminator(ctx, pos, attrs)?;
            true
        }
        _ => start_function(ctx, pos, element, attrs)?,
    };

    if !handled {
        if ctx.state != State::Unknown {
            ctx.switch(State::Unknown);
            ctx.unknown_depth = 1;
        } else {
            ctx.unknown_depth += 1;
        }
    }
    Ok(())
}

/// Remove varargs callables and everything that depends on them: the
/// callbacks themselves, varargs functions, and any function taking a
/// removed callback type by name.
pub(crate) fn post_filter(module: &mut Module) {
    let mut varargs_callbacks: Vec<String> = Vec::new();
    filter_varargs(&mut module.entries, &mut varargs_callbacks);
    for entry in &mut module.entries {
        if let Some(members) = entry.kind.members_mut() {
            filter_varargs(members, &mut varargs_callbacks);
        }
    }

    let namespace = module.name.clone();
    let names_callback = |ty: &TypeNode| {
        ty.interface.as_deref().is_some_and(|name| {
            varargs_callbacks
                .iter()
                .any(|cb| name == cb || name == &format!("{namespace}.{cb}"))
        })
    };
    let keeps = |node: &Node| match &node.kind {
        NodeKind::Function(f) => !f.parameters.iter().any(|param| names_callback(&param.ty)),
        _ => true,
    };
    module.entries.retain(keeps);
    for entry in &mut module.entries {
        if let Some(members) = entry.kind.members_mut() {
            members.retain(keeps);
        }
    }
}

fn filter_varargs(nodes: &mut Vec<Node>, varargs_callbacks: &mut Vec<String>) {
    nodes.retain(|node| match &node.kind {
        NodeKind::Function(f) => !f.is_varargs,
        NodeKind::Callback(f) => {
            if f.is_varargs {
                varargs_callbacks.push(node.name.clone());
                false
            } else {
                true
            }
        }
        _ => true,
    });
}
