//! Streaming GIR XML parser.
//!
//! Each document is read twice: a first pass gathers aliases and disguised
//! records (they affect how later type references parse), a second pass
//! drives the full state machine. `<include>` directives recursively parse
//! the referenced `.gir` files, located through the configured include
//! directories and the system data directories; every parsed module stays
//! cached on the parser so repeated includes cost nothing.

mod error;
mod parse;
mod typeparse;

use std::path::{Path, PathBuf};

use gir_types::Module;
use log::debug;
use quick_xml::events::Event;
use quick_xml::Reader;

pub use error::{ParseError, Position};

use error::position_of;
use parse::{end_element, post_filter, start_element, Attrs, Ctx, State};

pub struct Parser {
    include_dirs: Vec<PathBuf>,
    parsed: Vec<Module>,
}

impl Default for Parser {
    fn default() -> Parser {
        Parser::new()
    }
}

impl Parser {
    pub fn new() -> Parser {
        Parser {
            include_dirs: Vec::new(),
            parsed: Vec::new(),
        }
    }

    /// Directories searched for included `.gir` files, before the system
    /// data directories.
    pub fn add_include_dir(&mut self, dir: impl Into<PathBuf>) {
        self.include_dirs.push(dir.into());
    }

    /// Every module parsed so far, includes first.
    pub fn modules(&self) -> &[Module] {
        &self.parsed
    }

    pub fn into_modules(self) -> Vec<Module> {
        self.parsed
    }

    /// Parse one `.gir` file (plus anything it includes). Returns the names
    /// of the modules the file itself defined.
    pub fn parse_file(&mut self, path: &Path) -> Result<Vec<String>, ParseError> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let Some(stem) = file_name.strip_suffix(".gir") else {
            return Err(ParseError::BadFilename {
                path: path.to_path_buf(),
            });
        };
        // The logical namespace is the file name minus the version suffix.
        let namespace = match stem.find('-') {
            Some(dash) => &stem[..dash],
            None => stem,
        };

        debug!("parsing {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.parse_string(namespace, &content)
    }

    /// Parse a complete GIR document held in memory. `namespace` is the
    /// logical name the document's `<namespace>` element must carry.
    pub fn parse_string(
        &mut self,
        namespace: &str,
        content: &str,
    ) -> Result<Vec<String>, ParseError> {
        let mut ctx = Ctx::new(namespace);
        self.first_pass(&mut ctx, content)?;
        self.second_pass(&mut ctx, content)?;

        let mut names = Vec::with_capacity(ctx.modules.len());
        for mut module in std::mem::take(&mut ctx.modules) {
            post_filter(&mut module);
            names.push(module.name.clone());
            self.parsed.push(module);
        }
        Ok(names)
    }

    /// First pass: only `<alias>` and `<record disguised="1">` matter, and
    /// both must be known before the full traversal parses any type name.
    fn first_pass(&mut self, ctx: &mut Ctx, content: &str) -> Result<(), ParseError> {
        let mut reader = Reader::from_str(content);
        loop {
            let event = reader
                .read_event()
                .map_err(|err| xml_error(content, &reader, err))?;
            match event {
                Event::Start(e) | Event::Empty(e) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    let attrs = collect_attrs(content, &reader, &e)?;
                    match name.as_str() {
                        "alias" => first_pass_alias(ctx, content, &reader, &attrs)?,
                        "record" => {
                            if attrs.flag("disguised") {
                                if let Some(record) = attrs.get("name") {
                                    ctx.disguised
                                        .insert(format!("{}.{}", ctx.namespace, record));
                                }
                            }
                        }
                        _ => {}
                    }
                }
                Event::Eof => return Ok(()),
                _ => {}
            }
        }
    }

    fn second_pass(&mut self, ctx: &mut Ctx, content: &str) -> Result<(), ParseError> {
        let mut reader = Reader::from_str(content);
        loop {
            let event = reader
                .read_event()
                .map_err(|err| xml_error(content, &reader, err))?;
            match event {
                Event::Start(e) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    let attrs = collect_attrs(content, &reader, &e)?;
                    self.dispatch_start(ctx, content, &reader, &name, &attrs)?;
                }
                Event::Empty(e) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    let attrs = collect_attrs(content, &reader, &e)?;
                    self.dispatch_start(ctx, content, &reader, &name, &attrs)?;
                    let pos = position_of(content, reader.buffer_position() as usize);
                    end_element(ctx, pos, &name)?;
                }
                Event::End(e) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    let pos = position_of(content, reader.buffer_position() as usize);
                    end_element(ctx, pos, &name)?;
                }
                Event::Eof => return Ok(()),
                _ => {}
            }
        }
    }

    fn dispatch_start(
        &mut self,
        ctx: &mut Ctx,
        content: &str,
        reader: &Reader<&[u8]>,
        name: &str,
        attrs: &Attrs,
    ) -> Result<(), ParseError> {
        let pos = position_of(content, reader.buffer_position() as usize);
        // Includes recurse into other files, so they are resolved here
        // rather than inside the state machine.
        if name == "include" && ctx.state == State::Repository {
            let (include_name, version) = ctx.include_attrs(pos, attrs)?;
            self.parse_include(ctx, &include_name, &version)?;
            ctx.enter_include(&include_name, &version);
            return Ok(());
        }
        start_element(ctx, pos, name, attrs)
    }

    /// Resolve one `<include name=N version=V>`: reuse the cached module
    /// when N was parsed already (version conflicts are fatal), otherwise
    /// find `N-V.gir` on the search path and parse it recursively.
    fn parse_include(
        &mut self,
        ctx: &mut Ctx,
        name: &str,
        version: &str,
    ) -> Result<(), ParseError> {
        for module in &self.parsed {
            if module.name == name {
                if module.version == version {
                    ctx.include_names.push(name.to_string());
                    return Ok(());
                }
                return Err(ParseError::ConflictingIncludeVersions {
                    name: name.to_string(),
                    existing: module.version.clone(),
                    requested: version.to_string(),
                });
            }
        }

        let girname = format!("{name}-{version}.gir");
        let path = self
            .locate_gir(&girname)
            .ok_or_else(|| ParseError::IncludeNotFound {
                girname: girname.clone(),
            })?;
        debug!("parsing include {}", path.display());
        let content = std::fs::read_to_string(&path).map_err(|source| ParseError::Io {
            path,
            source,
        })?;
        self.parse_string(name, &content)?;
        ctx.include_names.push(name.to_string());
        Ok(())
    }

    fn locate_gir(&self, girname: &str) -> Option<PathBuf> {
        for dir in &self.include_dirs {
            let candidate = dir.join(girname);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        for dir in system_data_dirs() {
            let candidate = dir.join("gir-1.0").join(girname);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }
}

fn system_data_dirs() -> Vec<PathBuf> {
    match std::env::var("XDG_DATA_DIRS") {
        Ok(dirs) if !dirs.is_empty() => dirs.split(':').map(PathBuf::from).collect(),
        _ => vec![
            PathBuf::from("/usr/local/share"),
            PathBuf::from("/usr/share"),
        ],
    }
}

fn xml_error(content: &str, reader: &Reader<&[u8]>, err: impl std::fmt::Display) -> ParseError {
    ParseError::Xml {
        position: position_of(content, reader.buffer_position() as usize),
        message: err.to_string(),
    }
}

fn collect_attrs(
    content: &str,
    reader: &Reader<&[u8]>,
    element: &quick_xml::events::BytesStart<'_>,
) -> Result<Attrs, ParseError> {
    let mut attrs = Vec::new();
    for attr in element.attributes() {
        let attr = attr.map_err(|err| xml_error(content, reader, err))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| xml_error(content, reader, err))?
            .into_owned();
        attrs.push((key, value));
    }
    Ok(Attrs(attrs))
}

fn first_pass_alias(
    ctx: &mut Ctx,
    content: &str,
    reader: &Reader<&[u8]>,
    attrs: &Attrs,
) -> Result<(), ParseError> {
    let pos = position_of(content, reader.buffer_position() as usize);
    let name = attrs.get("name").ok_or(ParseError::MissingAttribute {
        position: pos,
        element: "alias".to_string(),
        attribute: "name".to_string(),
    })?;
    let target = attrs.get("target").ok_or(ParseError::MissingAttribute {
        position: pos,
        element: "alias".to_string(),
        attribute: "target".to_string(),
    })?;

    let key = format!("{}.{}", ctx.namespace, name);
    // Unqualified non-basic targets live in the current namespace.
    let value = if !target.contains('.') && gir_types::lookup_basic(target).is_none() {
        format!("{}.{}", ctx.namespace, target)
    } else {
        target.to_string()
    };
    ctx.aliases.insert(key, value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gir_types::{NodeKind, TypeTag};

    fn parse_one(namespace: &str, content: &str) -> Module {
        let mut parser = Parser::new();
        let names = parser.parse_string(namespace, content).unwrap();
        assert_eq!(names.len(), 1);
        parser.into_modules().pop().unwrap()
    }

    #[test]
    fn empty_namespace() {
        let module = parse_one(
            "X",
            r#"<repository version="1.0"><namespace name="X" version="1.0"/></repository>"#,
        );
        assert_eq!(module.name, "X");
        assert_eq!(module.version, "1.0");
        assert!(module.entries.is_empty());
    }

    #[test]
    fn unsupported_repository_version() {
        let mut parser = Parser::new();
        let err = parser
            .parse_string("X", r#"<repository version="2.0"/>"#)
            .unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedVersion { .. }));
    }

    #[test]
    fn namespace_name_must_match_file_name() {
        let mut parser = Parser::new();
        let err = parser
            .parse_string(
                "X",
                r#"<repository version="1.0"><namespace name="Y" version="1.0"/></repository>"#,
            )
            .unwrap_err();
        assert!(matches!(err, ParseError::NamespaceMismatch { .. }));
    }

    #[test]
    fn function_with_parameters_and_return() {
        let module = parse_one(
            "X",
            r#"<repository version="1.0">
                 <namespace name="X" version="1.0" shared-library="libx.so">
                   <function name="foo" c:identifier="x_foo">
                     <return-value transfer-ownership="none">
                       <type name="bool" c:type="gboolean"/>
                     </return-value>
                     <parameters>
                       <parameter name="i" transfer-ownership="none">
                         <type name="int32" c:type="gint32"/>
                       </parameter>
                     </parameters>
                   </function>
                 </namespace>
               </repository>"#,
        );
        assert_eq!(module.shared_library.as_deref(), Some("libx.so"));
        assert_eq!(module.entries.len(), 1);
        let entry = &module.entries[0];
        assert_eq!(entry.name, "foo");
        let NodeKind::Function(function) = &entry.kind else {
            panic!("expected function");
        };
        assert_eq!(function.symbol, "x_foo");
        assert_eq!(function.result.ty.tag, TypeTag::Boolean);
        assert_eq!(function.parameters.len(), 1);
        assert_eq!(function.parameters[0].name, "i");
        assert_eq!(function.parameters[0].ty.tag, TypeTag::Int32);
        assert!(function.parameters[0].direction_in);
        assert!(!function.parameters[0].direction_out);
    }

    #[test]
    fn record_with_fields() {
        let module = parse_one(
            "X",
            r#"<repository version="1.0">
                 <namespace name="X" version="1.0">
                   <record name="R">
                     <field name="a" writable="1"><type name="int32" c:type="gint32"/></field>
                     <field name="b" bits="3"><type name="int8" c:type="gint8"/></field>
                   </record>
                 </namespace>
               </repository>"#,
        );
        let NodeKind::Struct(record) = &module.entries[0].kind else {
            panic!("expected record");
        };
        assert_eq!(record.members.len(), 2);
        let NodeKind::Field(a) = &record.members[0].kind else {
            panic!("expected field");
        };
        assert!(a.writable);
        assert_eq!(a.ty.tag, TypeTag::Int32);
        assert_eq!(a.offset, -1);
        let NodeKind::Field(b) = &record.members[1].kind else {
            panic!("expected field");
        };
        assert_eq!(b.bits, 3);
    }

    #[test]
    fn pointer_depth_from_c_type() {
        let module = parse_one(
            "X",
            r#"<repository version="1.0">
                 <namespace name="X" version="1.0">
                   <function name="get" c:identifier="x_get">
                     <return-value transfer-ownership="full">
                       <type name="utf8" c:type="char*"/>
                     </return-value>
                     <parameters>
                       <parameter name="out_value" direction="out" transfer-ownership="none">
                         <type name="int32" c:type="gint32*"/>
                       </parameter>
                     </parameters>
                   </function>
                 </namespace>
               </repository>"#,
        );
        let NodeKind::Function(function) = &module.entries[0].kind else {
            panic!("expected function");
        };
        assert!(function.result.ty.is_pointer);
        assert!(function.result.transfer_value);
        // The out parameter's one star is the out indirection, not a
        // pointer-typed value.
        assert!(!function.parameters[0].ty.is_pointer);
        assert!(function.parameters[0].direction_out);
    }

    #[test]
    fn enum_members_parse_all_value_forms() {
        let module = parse_one(
            "X",
            r#"<repository version="1.0">
                 <namespace name="X" version="1.0">
                   <enumeration name="E">
                     <member name="a" value="0"/>
                     <member name="b" value="0x10"/>
                     <member name="c" value="1 &lt;&lt; 5"/>
                     <member name="d" value="300" deprecated="1"/>
                   </enumeration>
                   <bitfield name="F">
                     <member name="x" value="1"/>
                   </bitfield>
                 </namespace>
               </repository>"#,
        );
        let NodeKind::Enum(e) = &module.entries[0].kind else {
            panic!("expected enum");
        };
        let values: Vec<u32> = e
            .values
            .iter()
            .map(|v| match &v.kind {
                NodeKind::Value(value) => value.value,
                _ => panic!("expected value"),
            })
            .collect();
        assert_eq!(values, vec![0, 16, 32, 300]);
        assert!(matches!(module.entries[1].kind, NodeKind::Flags(_)));
    }

    #[test]
    fn nested_container_types() {
        let module = parse_one(
            "X",
            r#"<repository version="1.0">
                 <namespace name="X" version="1.0">
                   <function name="tbl" c:identifier="x_tbl">
                     <return-value transfer-ownership="container">
                       <type name="GLib.HashTable" c:type="GHashTable*">
                         <type name="utf8" c:type="char*"/>
                         <type name="int32" c:type="gint32"/>
                       </type>
                     </return-value>
                   </function>
                 </namespace>
               </repository>"#,
        );
        let NodeKind::Function(function) = &module.entries[0].kind else {
            panic!("expected function");
        };
        let ty = &function.result.ty;
        assert_eq!(ty.tag, TypeTag::GHash);
        assert_eq!(ty.param1.as_ref().unwrap().tag, TypeTag::Utf8);
        assert_eq!(ty.param2.as_ref().unwrap().tag, TypeTag::Int32);
    }

    #[test]
    fn hash_without_parameters_defaults_to_void_pointers() {
        let module = parse_one(
            "X",
            r#"<repository version="1.0">
                 <namespace name="X" version="1.0">
                   <function name="tbl" c:identifier="x_tbl">
                     <return-value transfer-ownership="none">
                       <type name="GLib.HashTable" c:type="GHashTable*"/>
                     </return-value>
                   </function>
                 </namespace>
               </repository>"#,
        );
        let NodeKind::Function(function) = &module.entries[0].kind else {
            panic!("expected function");
        };
        let ty = &function.result.ty;
        let key = ty.param1.as_ref().unwrap();
        let value = ty.param2.as_ref().unwrap();
        assert_eq!(key.tag, TypeTag::Void);
        assert!(key.is_pointer);
        assert_eq!(value.tag, TypeTag::Void);
        assert!(value.is_pointer);
    }

    #[test]
    fn array_attributes() {
        let module = parse_one(
            "X",
            r#"<repository version="1.0">
                 <namespace name="X" version="1.0">
                   <function name="f" c:identifier="x_f">
                     <return-value transfer-ownership="none">
                       <array length="2" zero-terminated="0">
                         <type name="utf8" c:type="char**"/>
                       </array>
                     </return-value>
                   </function>
                 </namespace>
               </repository>"#,
        );
        let NodeKind::Function(function) = &module.entries[0].kind else {
            panic!("expected function");
        };
        let ty = &function.result.ty;
        assert_eq!(ty.tag, TypeTag::Array);
        assert!(!ty.zero_terminated);
        assert_eq!(ty.length, Some(2));
        assert_eq!(ty.fixed_size, None);
    }

    #[test]
    fn varargs_functions_are_filtered() {
        let module = parse_one(
            "X",
            r#"<repository version="1.0">
                 <namespace name="X" version="1.0">
                   <function name="printf_like" c:identifier="x_printf">
                     <return-value transfer-ownership="none">
                       <type name="none" c:type="void"/>
                     </return-value>
                     <parameters>
                       <parameter name="fmt" transfer-ownership="none">
                         <type name="utf8" c:type="const char*"/>
                       </parameter>
                       <parameter name="args" transfer-ownership="none">
                         <varargs/>
                       </parameter>
                     </parameters>
                   </function>
                   <function name="plain" c:identifier="x_plain">
                     <return-value transfer-ownership="none">
                       <type name="none" c:type="void"/>
                     </return-value>
                   </function>
                 </namespace>
               </repository>"#,
        );
        assert_eq!(module.entries.len(), 1);
        assert_eq!(module.entries[0].name, "plain");
    }

    #[test]
    fn functions_taking_varargs_callbacks_are_filtered() {
        let module = parse_one(
            "X",
            r#"<repository version="1.0">
                 <namespace name="X" version="1.0">
                   <callback name="Logger">
                     <return-value transfer-ownership="none">
                       <type name="none" c:type="void"/>
                     </return-value>
                     <parameters>
                       <parameter name="args" transfer-ownership="none"><varargs/></parameter>
                     </parameters>
                   </callback>
                   <function name="set_logger" c:identifier="x_set_logger">
                     <return-value transfer-ownership="none">
                       <type name="none" c:type="void"/>
                     </return-value>
                     <parameters>
                       <parameter name="logger" transfer-ownership="none">
                         <type name="Logger" c:type="XLogger"/>
                       </parameter>
                     </parameters>
                   </function>
                   <function name="untouched" c:identifier="x_untouched">
                     <return-value transfer-ownership="none">
                       <type name="none" c:type="void"/>
                     </return-value>
                   </function>
                 </namespace>
               </repository>"#,
        );
        let names: Vec<&str> = module.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["untouched"]);
    }

    #[test]
    fn class_with_members() {
        let module = parse_one(
            "X",
            r#"<repository version="1.0">
                 <namespace name="X" version="1.0">
                   <class name="C" parent="Y.Base" glib:type-name="XC"
                          glib:get-type="x_c_get_type" glib:type-struct="CClass" abstract="1">
                     <implements name="Y.Iface"/>
                     <field name="parent_instance"><type name="Y.Base" c:type="YBase"/></field>
                     <property name="count" writable="1"><type name="int32" c:type="gint"/></property>
                     <method name="frob" c:identifier="x_c_frob">
                       <return-value transfer-ownership="none">
                         <type name="none" c:type="void"/>
                       </return-value>
                     </method>
                     <glib:signal name="changed" when="FIRST" no-recurse="1">
                       <return-value transfer-ownership="none">
                         <type name="none" c:type="void"/>
                       </return-value>
                     </glib:signal>
                     <virtual-method name="frob" offset="16" invoker="frob">
                       <return-value transfer-ownership="none">
                         <type name="none" c:type="void"/>
                       </return-value>
                     </virtual-method>
                   </class>
                 </namespace>
               </repository>"#,
        );
        let NodeKind::Object(object) = &module.entries[0].kind else {
            panic!("expected object");
        };
        assert!(object.abstract_);
        assert_eq!(object.parent.as_deref(), Some("Y.Base"));
        assert_eq!(object.gtype_struct.as_deref(), Some("CClass"));
        assert_eq!(object.interfaces, vec!["Y.Iface"]);
        assert_eq!(object.members.len(), 5);
        let kinds: Vec<_> = object.members.iter().map(|m| m.kind_id()).collect();
        use gir_types::NodeKindId::*;
        assert_eq!(kinds, vec![Field, Property, Function, Signal, VFunc]);
        let NodeKind::Signal(signal) = &object.members[3].kind else {
            panic!("expected signal");
        };
        assert!(signal.run_first);
        assert!(!signal.run_last);
        assert!(signal.no_recurse);
        let NodeKind::VFunc(vfunc) = &object.members[4].kind else {
            panic!("expected vfunc");
        };
        assert_eq!(vfunc.offset, 16);
        assert_eq!(vfunc.invoker.as_deref(), Some("frob"));
    }

    #[test]
    fn interface_with_prerequisites() {
        let module = parse_one(
            "X",
            r#"<repository version="1.0">
                 <namespace name="X" version="1.0">
                   <interface name="I" glib:type-name="XI" glib:get-type="x_i_get_type">
                     <prerequisite name="Y.Base"/>
                     <method name="poke" c:identifier="x_i_poke">
                       <return-value transfer-ownership="none">
                         <type name="none" c:type="void"/>
                       </return-value>
                     </method>
                   </interface>
                 </namespace>
               </repository>"#,
        );
        let NodeKind::Interface(interface) = &module.entries[0].kind else {
            panic!("expected interface");
        };
        assert_eq!(interface.prerequisites, vec!["Y.Base"]);
        assert_eq!(interface.members.len(), 1);
    }

    #[test]
    fn union_with_discriminator() {
        let module = parse_one(
            "X",
            r#"<repository version="1.0">
                 <namespace name="X" version="1.0">
                   <union name="U">
                     <discriminator type="int32" offset="0"/>
                     <field name="a" branch="1"><type name="int32" c:type="gint32"/></field>
                     <field name="b" branch="2"><type name="double" c:type="gdouble"/></field>
                   </union>
                 </namespace>
               </repository>"#,
        );
        let NodeKind::Union(union) = &module.entries[0].kind else {
            panic!("expected union");
        };
        assert_eq!(union.discriminator_offset, 0);
        assert_eq!(union.discriminator_type.as_ref().unwrap().tag, TypeTag::Int32);
        assert_eq!(union.members.len(), 2);
        assert_eq!(union.discriminators.len(), 2);
        let NodeKind::Constant(first) = &union.discriminators[0].kind else {
            panic!("expected constant");
        };
        assert_eq!(first.value, "1");
        assert_eq!(first.ty.tag, TypeTag::Int32);
    }

    #[test]
    fn aliases_and_disguised_records_resolve() {
        let module = parse_one(
            "X",
            r#"<repository version="1.0">
                 <namespace name="X" version="1.0">
                   <alias name="Chars" target="utf8"/>
                   <alias name="Handle" target="Opaque"/>
                   <record name="Opaque" disguised="1"/>
                   <record name="Holder">
                     <field name="text"><type name="Chars" c:type="XChars"/></field>
                     <field name="handle"><type name="Handle" c:type="XHandle"/></field>
                   </record>
                 </namespace>
               </repository>"#,
        );
        assert_eq!(module.aliases.get("X.Chars").map(String::as_str), Some("utf8"));
        assert_eq!(
            module.aliases.get("X.Handle").map(String::as_str),
            Some("X.Opaque")
        );
        assert!(module.disguised.contains("X.Opaque"));

        let NodeKind::Struct(holder) = &module.entries[1].kind else {
            panic!("expected record");
        };
        let NodeKind::Field(text) = &holder.members[0].kind else {
            panic!("expected field");
        };
        assert_eq!(text.ty.tag, TypeTag::Utf8);
        let NodeKind::Field(handle) = &holder.members[1].kind else {
            panic!("expected field");
        };
        // The alias target is a disguised record, so the reference carries
        // an implicit pointer.
        assert_eq!(handle.ty.tag, TypeTag::Interface);
        assert_eq!(handle.ty.interface.as_deref(), Some("X.Opaque"));
        assert!(handle.ty.is_pointer);
    }

    #[test]
    fn attributes_attach_to_the_open_node() {
        let module = parse_one(
            "X",
            r#"<repository version="1.0">
                 <namespace name="X" version="1.0">
                   <function name="f" c:identifier="x_f">
                     <attribute name="org.example.note" value="hello"/>
                     <return-value transfer-ownership="none">
                       <type name="none" c:type="void"/>
                     </return-value>
                   </function>
                 </namespace>
               </repository>"#,
        );
        assert_eq!(
            module.entries[0].attributes.get("org.example.note"),
            Some(&"hello".to_string())
        );
    }

    #[test]
    fn errordomain_and_constants() {
        let module = parse_one(
            "X",
            r#"<repository version="1.0">
                 <namespace name="X" version="1.0">
                   <errordomain name="FooError" get-quark="x_foo_error_quark" codes="FooErrorCode"/>
                   <enumeration name="FooErrorCode">
                     <member name="bad" value="0"/>
                   </enumeration>
                   <constant name="LIMIT" value="128">
                     <type name="int32" c:type="gint"/>
                   </constant>
                 </namespace>
               </repository>"#,
        );
        let NodeKind::ErrorDomain(domain) = &module.entries[0].kind else {
            panic!("expected error domain");
        };
        assert_eq!(domain.get_quark, "x_foo_error_quark");
        assert_eq!(domain.codes, "FooErrorCode");
        let NodeKind::Constant(constant) = &module.entries[2].kind else {
            panic!("expected constant");
        };
        assert_eq!(constant.value, "128");
        assert_eq!(constant.ty.tag, TypeTag::Int32);
    }

    #[test]
    fn mismatched_end_tag_is_fatal() {
        let mut parser = Parser::new();
        let err = parser
            .parse_string(
                "X",
                r#"<repository version="1.0">
                     <namespace name="X" version="1.0">
                       <record name="R"></class>
                     </namespace>
                   </repository>"#,
            )
            .unwrap_err();
        // quick-xml itself rejects the ill-formed nesting.
        assert!(matches!(
            err,
            ParseError::Xml { .. } | ParseError::MismatchedEndTag { .. }
        ));
    }

    #[test]
    fn missing_required_attribute_is_fatal() {
        let mut parser = Parser::new();
        let err = parser
            .parse_string(
                "X",
                r#"<repository version="1.0">
                     <namespace name="X" version="1.0">
                       <function name="f"/>
                     </namespace>
                   </repository>"#,
            )
            .unwrap_err();
        match err {
            ParseError::MissingAttribute { attribute, .. } => {
                assert_eq!(attribute, "c:identifier");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_elements_are_skipped() {
        let module = parse_one(
            "X",
            r#"<repository version="1.0">
                 <namespace name="X" version="1.0">
                   <doc xml:space="preserve">Some <code>markup</code> here.</doc>
                   <function name="f" c:identifier="x_f">
                     <return-value transfer-ownership="none">
                       <type name="none" c:type="void"/>
                     </return-value>
                   </function>
                 </namespace>
               </repository>"#,
        );
        assert_eq!(module.entries.len(), 1);
    }

    #[test]
    fn includes_resolve_from_include_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("Y-1.0.gir"),
            r#"<repository version="1.0">
                 <namespace name="Y" version="1.0">
                   <record name="Base"><field name="x"><type name="int32" c:type="gint"/></field></record>
                 </namespace>
               </repository>"#,
        )
        .unwrap();
        let main = dir.path().join("X-1.0.gir");
        std::fs::write(
            &main,
            r#"<repository version="1.0">
                 <include name="Y" version="1.0"/>
                 <namespace name="X" version="1.0">
                   <record name="Wrapper">
                     <field name="base"><type name="Y.Base" c:type="YBase"/></field>
                   </record>
                 </namespace>
               </repository>"#,
        )
        .unwrap();

        let mut parser = Parser::new();
        parser.add_include_dir(dir.path());
        let names = parser.parse_file(&main).unwrap();
        assert_eq!(names, vec!["X"]);

        let modules = parser.modules();
        assert_eq!(modules.len(), 2);
        assert_eq!(modules[0].name, "Y");
        assert_eq!(modules[1].name, "X");
        assert_eq!(modules[1].dependencies, vec!["Y-1.0"]);
        assert_eq!(modules[1].includes, vec!["Y"]);
    }

    #[test]
    fn conflicting_include_versions_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        for version in ["1.0", "2.0"] {
            std::fs::write(
                dir.path().join(format!("Y-{version}.gir")),
                format!(
                    r#"<repository version="1.0"><namespace name="Y" version="{version}"/></repository>"#
                ),
            )
            .unwrap();
        }
        let mut parser = Parser::new();
        parser.add_include_dir(dir.path());
        parser
            .parse_string(
                "A",
                r#"<repository version="1.0">
                     <include name="Y" version="1.0"/>
                     <namespace name="A" version="1.0"/>
                   </repository>"#,
            )
            .unwrap();
        let err = parser
            .parse_string(
                "B",
                r#"<repository version="1.0">
                     <include name="Y" version="2.0"/>
                     <namespace name="B" version="1.0"/>
                   </repository>"#,
            )
            .unwrap_err();
        assert!(matches!(err, ParseError::ConflictingIncludeVersions { .. }));
    }

    #[test]
    fn repeated_includes_reuse_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("Y-1.0.gir"),
            r#"<repository version="1.0"><namespace name="Y" version="1.0"/></repository>"#,
        )
        .unwrap();
        let doc = |ns: &str| {
            format!(
                r#"<repository version="1.0">
                     <include name="Y" version="1.0"/>
                     <namespace name="{ns}" version="1.0"/>
                   </repository>"#
            )
        };
        let mut parser = Parser::new();
        parser.add_include_dir(dir.path());
        parser.parse_string("A", &doc("A")).unwrap();
        parser.parse_string("B", &doc("B")).unwrap();
        // One cached copy of Y plus the two documents.
        assert_eq!(parser.modules().len(), 3);
    }

    #[test]
    fn missing_include_is_fatal() {
        let mut parser = Parser::new();
        let err = parser
            .parse_string(
                "X",
                r#"<repository version="1.0">
                     <include name="Nope" version="9.9"/>
                     <namespace name="X" version="1.0"/>
                   </repository>"#,
            )
            .unwrap_err();
        assert!(matches!(err, ParseError::IncludeNotFound { .. }));
    }

    #[test]
    fn file_must_have_gir_suffix() {
        let mut parser = Parser::new();
        let err = parser.parse_file(Path::new("whatever.xml")).unwrap_err();
        assert!(matches!(err, ParseError::BadFilename { .. }));
    }
}
