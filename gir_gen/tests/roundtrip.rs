//! Full-pipeline tests: GIR text through the parser, layout engine and
//! builder, then back through the validator and reader.

use gir_gen::build_typelib;
use gir_parser::Parser;
use gir_typelib::format::{self, blob_type, type_slot, HEADER_SIZE};
use gir_typelib::{validate, Typelib};
use gir_types::Module;

fn compile(namespace: &str, content: &str) -> Typelib {
    let mut parser = Parser::new();
    parser.parse_string(namespace, content).unwrap();
    let modules = parser.into_modules();
    let mut target = modules
        .iter()
        .find(|module| module.name == namespace)
        .unwrap()
        .clone();
    let typelib = build_typelib(&mut target, &modules).unwrap();
    validate(&typelib).unwrap();
    typelib
}

#[test]
fn empty_namespace_round_trip() {
    let typelib = compile(
        "X",
        r#"<repository version="1.0"><namespace name="X" version="1.0"/></repository>"#,
    );
    assert_eq!(typelib.n_entries(), 0);
    assert_eq!(typelib.n_local_entries(), 0);
    assert_eq!(typelib.len() as u32, HEADER_SIZE + 4);
    assert_eq!(typelib.namespace(), Some("X"));
    assert!(typelib.shared_library().is_none());
    assert!(typelib.dependencies().is_empty());
}

#[test]
fn single_function_blob_location() {
    let typelib = compile(
        "X",
        r#"<repository version="1.0">
             <namespace name="X" version="1.0">
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
    assert_eq!(typelib.n_entries(), 1);
    let entry = typelib.dir_entry(1).unwrap();
    assert_eq!(entry.offset, 124);
    assert_eq!(typelib.string_at(entry.name as usize), Some("foo"));

    let base = entry.offset as usize;
    assert_eq!(typelib.u16_at(base), Some(blob_type::FUNCTION));
    let symbol = typelib.u32_at(base + format::function::SYMBOL).unwrap();
    assert_eq!(typelib.string_at(symbol as usize), Some("x_foo"));

    let signature = typelib.u32_at(base + format::function::SIGNATURE).unwrap();
    let return_slot = typelib.u32_at(signature as usize).unwrap();
    assert!(type_slot::is_inline(return_slot));
    assert_eq!(type_slot::inline_tag(return_slot), 1);
    assert!(!type_slot::inline_pointer(return_slot));

    let arg = signature as usize + format::SIGNATURE_BLOB_SIZE as usize;
    let arg_name = typelib.u32_at(arg + format::arg::NAME).unwrap();
    assert_eq!(typelib.string_at(arg_name as usize), Some("i"));
    let arg_slot = typelib.u32_at(arg + format::arg::TYPE).unwrap();
    assert_eq!(type_slot::inline_tag(arg_slot), 6);
}

#[test]
fn struct_layout_round_trip() {
    let typelib = compile(
        "X",
        r#"<repository version="1.0">
             <namespace name="X" version="1.0">
               <record name="R">
                 <field name="a"><type name="int32" c:type="gint32"/></field>
                 <field name="b"><type name="int8" c:type="gint8"/></field>
               </record>
             </namespace>
           </repository>"#,
    );
    let (_, entry) = typelib.find_entry("R").unwrap();
    let base = entry.offset as usize;
    assert_eq!(typelib.u32_at(base + format::struct_blob::SIZE), Some(8));
    assert_eq!(typelib.u16_at(base + format::struct_blob::ALIGNMENT), Some(4));
    assert_eq!(typelib.u16_at(base + format::struct_blob::N_FIELDS), Some(2));

    let fields = base + format::STRUCT_BLOB_SIZE as usize;
    let first_name = typelib.u32_at(fields + format::field::NAME).unwrap();
    assert_eq!(typelib.string_at(first_name as usize), Some("a"));
    assert_eq!(typelib.u16_at(fields + format::field::STRUCT_OFFSET), Some(0));
    let second = fields + format::FIELD_BLOB_SIZE as usize;
    assert_eq!(typelib.u16_at(second + format::field::STRUCT_OFFSET), Some(4));
}

#[test]
fn cross_namespace_parent_becomes_xref() {
    let typelib = compile(
        "X",
        r#"<repository version="1.0">
             <namespace name="X" version="1.0">
               <class name="C" parent="Y.Base" glib:type-name="XC" glib:get-type="x_c_get_type"/>
             </namespace>
           </repository>"#,
    );
    assert_eq!(typelib.n_entries(), 2);
    assert_eq!(typelib.n_local_entries(), 1);

    let stub = typelib.dir_entry(2).unwrap();
    assert!(!stub.local);
    assert_eq!(stub.blob_type, 0);
    assert_eq!(typelib.string_at(stub.name as usize), Some("Base"));
    assert_eq!(typelib.string_at(stub.offset as usize), Some("Y"));

    let (_, object) = typelib.find_entry("C").unwrap();
    let parent = typelib
        .u16_at(object.offset as usize + format::object::PARENT)
        .unwrap();
    assert_eq!(parent, 2);
}

#[test]
fn enum_width_inference_round_trip() {
    let typelib = compile(
        "X",
        r#"<repository version="1.0">
             <namespace name="X" version="1.0">
               <enumeration name="E">
                 <member name="a" value="0"/>
                 <member name="b" value="1"/>
                 <member name="c" value="300"/>
               </enumeration>
             </namespace>
           </repository>"#,
    );
    let (_, entry) = typelib.find_entry("E").unwrap();
    let base = entry.offset as usize;
    assert_eq!(typelib.u16_at(base + format::enum_blob::STORAGE_TYPE), Some(4));
    assert_eq!(typelib.u16_at(base + format::enum_blob::N_VALUES), Some(3));

    // Values stay in source order.
    let values = base + format::ENUM_BLOB_SIZE as usize;
    let third = values + 2 * format::VALUE_BLOB_SIZE as usize;
    assert_eq!(typelib.u32_at(third + format::value::VALUE), Some(300));
}

#[test]
fn union_reads_back_through_typed_views() {
    use gir_typelib::{ConstantValue, EntryInfo, TypeInfo};

    let typelib = compile(
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
    let (index, _) = typelib.find_entry("U").unwrap();
    let EntryInfo::Union(union) = typelib.entry_info(index).unwrap() else {
        panic!("expected a union entry");
    };
    assert!(union.is_discriminated());
    assert_eq!(union.discriminator_offset(), 0);
    assert_eq!(
        union.discriminator_type(),
        Some(TypeInfo::Simple {
            tag: 6,
            pointer: false
        })
    );

    let fields: Vec<_> = union.fields().collect();
    assert_eq!(fields.len(), 2);
    assert_eq!(fields[0].name(), Some("a"));
    assert_eq!(fields[0].struct_offset(), Some(0));
    assert_eq!(fields[1].name(), Some("b"));
    assert_eq!(fields[1].struct_offset(), Some(0));

    let discriminators = union.discriminator_values();
    assert_eq!(discriminators.len(), 2);
    assert_eq!(discriminators[0].value(), Some(ConstantValue::Int(1)));
    assert_eq!(discriminators[1].value(), Some(ConstantValue::Int(2)));
}

#[test]
fn function_reads_back_through_typed_views() {
    use gir_typelib::{EntryInfo, TypeInfo};

    let typelib = compile(
        "X",
        r#"<repository version="1.0">
             <namespace name="X" version="1.0">
               <function name="walk" c:identifier="x_walk" throws="1">
                 <return-value transfer-ownership="full">
                   <type name="GLib.List" c:type="GList*"><type name="utf8" c:type="char*"/></type>
                 </return-value>
                 <parameters>
                   <parameter name="root" direction="inout" transfer-ownership="none" allow-none="1">
                     <type name="utf8" c:type="char*"/>
                   </parameter>
                 </parameters>
               </function>
             </namespace>
           </repository>"#,
    );
    let EntryInfo::Function(function) = typelib.entry_info(1).unwrap() else {
        panic!("expected a function entry");
    };
    assert_eq!(function.name(), Some("walk"));
    assert_eq!(function.symbol(), Some("x_walk"));
    assert!(function.throws());
    assert!(function.is_static());
    assert!(!function.is_constructor());

    let signature = function.signature().unwrap();
    assert!(signature.caller_owns_return());
    match signature.return_type() {
        Some(TypeInfo::List { element }) => {
            assert_eq!(
                *element,
                TypeInfo::Simple {
                    tag: 20,
                    pointer: true
                }
            );
        }
        other => panic!("unexpected return type: {other:?}"),
    }

    assert_eq!(signature.n_args(), 1);
    let arg = signature.arg(0).unwrap();
    assert_eq!(arg.name(), Some("root"));
    assert!(arg.is_in());
    assert!(arg.is_out());
    assert!(arg.allow_none());
}

#[test]
fn union_with_discriminator_round_trip() {
    let typelib = compile(
        "X",
        r#"<repository version="1.0">
             <namespace name="X" version="1.0">
               <union name="U">
                 <discriminator type="int32" offset="0"/>
                 <field name="a" branch="1"><type name="int32" c:type="gint32"/></field>
                 <field name="b" branch="2"><type name="int64" c:type="gint64"/></field>
               </union>
             </namespace>
           </repository>"#,
    );
    let (_, entry) = typelib.find_entry("U").unwrap();
    let base = entry.offset as usize;

    let flags = typelib.u16_at(base + format::union_blob::FLAGS).unwrap();
    assert!(flags & format::union_blob::FLAG_DISCRIMINATED != 0);
    assert_eq!(
        typelib.i32_at(base + format::union_blob::DISCRIMINATOR_OFFSET),
        Some(0)
    );
    let disc_slot = typelib
        .u32_at(base + format::union_blob::DISCRIMINATOR_TYPE)
        .unwrap();
    assert_eq!(type_slot::inline_tag(disc_slot), 6);

    assert_eq!(typelib.u32_at(base + format::union_blob::SIZE), Some(8));
    assert_eq!(typelib.u16_at(base + format::union_blob::N_FIELDS), Some(2));

    // Two discriminator constants follow the fields, in branch order.
    let constants = base
        + format::UNION_BLOB_SIZE as usize
        + 2 * format::FIELD_BLOB_SIZE as usize;
    for (index, expected) in [1i32, 2].iter().enumerate() {
        let record = constants + index * format::CONSTANT_BLOB_SIZE as usize;
        assert_eq!(
            typelib.u16_at(record + format::constant::BLOB_TYPE),
            Some(blob_type::CONSTANT)
        );
        let payload = typelib.u32_at(record + format::constant::OFFSET).unwrap();
        assert_eq!(typelib.i32_at(payload as usize), Some(*expected));
    }
}

#[test]
fn every_node_kind_round_trips() {
    let typelib = compile(
        "X",
        r#"<repository version="1.0">
             <namespace name="X" version="1.0" shared-library="libx.so.0">
               <alias name="Chars" target="utf8"/>
               <function name="global" c:identifier="x_global" throws="1">
                 <return-value transfer-ownership="full">
                   <type name="Chars" c:type="char*"/>
                 </return-value>
                 <parameters>
                   <parameter name="names" transfer-ownership="none">
                     <array zero-terminated="1"><type name="utf8" c:type="char**"/></array>
                   </parameter>
                   <parameter name="cb" transfer-ownership="none" scope="async" closure="2" destroy="3">
                     <type name="Visitor" c:type="XVisitor"/>
                   </parameter>
                 </parameters>
               </function>
               <callback name="Visitor">
                 <return-value transfer-ownership="none">
                   <type name="bool" c:type="gboolean"/>
                 </return-value>
                 <parameters>
                   <parameter name="item" transfer-ownership="none">
                     <type name="none" c:type="void*"/>
                   </parameter>
                 </parameters>
               </callback>
               <record name="R" glib:type-name="XR" glib:get-type="x_r_get_type">
                 <field name="head"><type name="int32" c:type="gint32"/></field>
                 <method name="reset" c:identifier="x_r_reset">
                   <return-value transfer-ownership="none">
                     <type name="none" c:type="void"/>
                   </return-value>
                 </method>
               </record>
               <glib:boxed glib:name="Blob" glib:type-name="XBlob" glib:get-type="x_blob_get_type"/>
               <enumeration name="E" glib:type-name="XE" glib:get-type="x_e_get_type">
                 <member name="a" value="0"/>
                 <member name="b" value="1"/>
               </enumeration>
               <bitfield name="F">
                 <member name="one" value="1"/>
                 <member name="two" value="2"/>
               </bitfield>
               <class name="C" parent="Y.Base" glib:type-name="XC"
                      glib:get-type="x_c_get_type" glib:type-struct="CClass">
                 <implements name="I"/>
                 <field name="count"><type name="int32" c:type="gint"/></field>
                 <property name="count" writable="1"><type name="int32" c:type="gint"/></property>
                 <constructor name="new" c:identifier="x_c_new">
                   <return-value transfer-ownership="full">
                     <type name="C" c:type="XC*"/>
                   </return-value>
                 </constructor>
                 <method name="frob" c:identifier="x_c_frob">
                   <return-value transfer-ownership="none">
                     <type name="none" c:type="void"/>
                   </return-value>
                 </method>
                 <glib:signal name="changed" when="LAST" detailed="1">
                   <return-value transfer-ownership="none">
                     <type name="none" c:type="void"/>
                   </return-value>
                 </glib:signal>
                 <virtual-method name="frob" offset="24" invoker="frob">
                   <return-value transfer-ownership="none">
                     <type name="none" c:type="void"/>
                   </return-value>
                 </virtual-method>
               </class>
               <record name="CClass" glib:is-gtype-struct-for="C">
                 <field name="parent_class"><type name="int64" c:type="gint64"/></field>
               </record>
               <interface name="I" glib:type-name="XI" glib:get-type="x_i_get_type">
                 <prerequisite name="C"/>
                 <method name="poke" c:identifier="x_i_poke">
                   <return-value transfer-ownership="none">
                     <type name="GLib.List" c:type="GList*">
                       <type name="utf8" c:type="char*"/>
                     </type>
                   </return-value>
                 </method>
               </interface>
               <constant name="LIMIT" value="4096"><type name="int32" c:type="gint"/></constant>
               <constant name="NAME" value="frobnicator"><type name="utf8" c:type="char*"/></constant>
               <errordomain name="FooError" get-quark="x_foo_error_quark" codes="E"/>
               <union name="U">
                 <field name="i"><type name="int32" c:type="gint32"/></field>
                 <field name="d"><type name="double" c:type="gdouble"/></field>
               </union>
             </namespace>
           </repository>"#,
    );

    assert_eq!(typelib.declared_size() as usize, typelib.len());
    // Every declared entry plus one xref stub for Y.Base.
    assert_eq!(typelib.n_entries(), typelib.n_local_entries() + 1);
    assert_eq!(typelib.shared_library(), Some("libx.so.0"));

    for name in [
        "global", "Visitor", "R", "Blob", "E", "F", "C", "CClass", "I", "LIMIT", "NAME",
        "FooError", "U",
    ] {
        let (index, entry) = typelib.find_entry(name).unwrap();
        assert!(entry.local, "{name} should be local");
        assert!(index <= typelib.n_local_entries());
    }

    // The gtype-struct reference resolves to the CClass record.
    let (cclass_index, _) = typelib.find_entry("CClass").unwrap();
    let (_, class_entry) = typelib.find_entry("C").unwrap();
    let gtype_struct = typelib
        .u16_at(class_entry.offset as usize + format::object::GTYPE_STRUCT)
        .unwrap();
    assert_eq!(gtype_struct, cclass_index);

    // The error domain points at the enum with its codes.
    let (enum_index, _) = typelib.find_entry("E").unwrap();
    let (_, domain_entry) = typelib.find_entry("FooError").unwrap();
    let codes = typelib
        .u16_at(domain_entry.offset as usize + format::error_domain::ERROR_CODES)
        .unwrap();
    assert_eq!(codes, enum_index);
}

#[test]
fn dependencies_are_recorded() {
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
    parser.parse_file(&main).unwrap();
    let modules = parser.into_modules();
    let mut target = modules.iter().find(|m| m.name == "X").unwrap().clone();
    let typelib = build_typelib(&mut target, &modules).unwrap();
    validate(&typelib).unwrap();

    assert_eq!(typelib.dependencies(), vec!["Y-1.0"]);

    // The embedded foreign struct contributed its layout.
    let (_, entry) = typelib.find_entry("Wrapper").unwrap();
    assert_eq!(
        typelib.u32_at(entry.offset as usize + format::struct_blob::SIZE),
        Some(4)
    );
}

#[test]
fn attributes_table_round_trips() {
    let typelib = compile(
        "X",
        r#"<repository version="1.0">
             <namespace name="X" version="1.0">
               <function name="f" c:identifier="x_f">
                 <attribute name="org.example.note" value="hello world"/>
                 <attribute name="org.example.other" value="42"/>
                 <return-value transfer-ownership="none">
                   <type name="none" c:type="void"/>
                 </return-value>
               </function>
             </namespace>
           </repository>"#,
    );
    assert_eq!(typelib.n_attributes(), 2);
    let table = typelib.attributes_offset() as usize;
    let entry = typelib.dir_entry(1).unwrap();
    let node_offset = typelib.u32_at(table + format::attribute::OFFSET).unwrap();
    assert_eq!(node_offset, entry.offset);
    let key = typelib.u32_at(table + format::attribute::NAME).unwrap();
    assert_eq!(typelib.string_at(key as usize), Some("org.example.note"));
    let value = typelib.u32_at(table + format::attribute::VALUE).unwrap();
    assert_eq!(typelib.string_at(value as usize), Some("hello world"));
}

#[test]
fn strings_are_nul_terminated_and_shared() {
    let typelib = compile(
        "X",
        r#"<repository version="1.0">
             <namespace name="X" version="1.0">
               <function name="same" c:identifier="same">
                 <return-value transfer-ownership="none">
                   <type name="none" c:type="void"/>
                 </return-value>
               </function>
             </namespace>
           </repository>"#,
    );
    let entry = typelib.dir_entry(1).unwrap();
    let base = entry.offset as usize;
    let name = typelib.u32_at(base + format::function::NAME).unwrap();
    let symbol = typelib.u32_at(base + format::function::SYMBOL).unwrap();
    // One pooled copy serves both the name and the symbol.
    assert_eq!(name, symbol);
    let bytes = typelib.as_bytes();
    assert_eq!(bytes[name as usize + 4], 0);
}

#[test]
fn modified_image_fails_validation() {
    let typelib = compile(
        "X",
        r#"<repository version="1.0">
             <namespace name="X" version="1.0">
               <function name="foo" c:identifier="x_foo">
                 <return-value transfer-ownership="none">
                   <type name="none" c:type="void"/>
                 </return-value>
               </function>
             </namespace>
           </repository>"#,
    );
    validate(&typelib).unwrap();

    // Corrupt the directory entry's blob type.
    let mut bytes = typelib.into_bytes();
    let dir = HEADER_SIZE as usize;
    bytes[dir] = 0xEE;
    bytes[dir + 1] = 0xEE;
    assert!(validate(&Typelib::from_bytes(bytes)).is_err());
}

#[test]
fn deterministic_output() {
    let source = r#"<repository version="1.0">
         <namespace name="X" version="1.0">
           <record name="R">
             <field name="a"><type name="utf8" c:type="char*"/></field>
             <field name="b"><type name="utf8" c:type="char*"/></field>
           </record>
           <function name="f" c:identifier="x_f">
             <return-value transfer-ownership="none">
               <type name="GLib.List" c:type="GList*"><type name="utf8" c:type="char*"/></type>
             </return-value>
           </function>
         </namespace>
       </repository>"#;
    let first = compile("X", source);
    let second = compile("X", source);
    assert_eq!(first.as_bytes(), second.as_bytes());
}
