//! Turning type-name spellings into type descriptors.
//!
//! Most structure comes from child `<type>` elements; the name string alone
//! decides the tag, resolves basic-type synonyms, and in the `GLib.Error`
//! case carries the error-domain list inline.

use gir_types::{lookup_basic, Module, TypeNode, TypeTag};
use log::debug;

/// Names permitted inside an interface reference.
fn is_name_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'-' | b'_' | b':')
}

/// Parse a (possibly alias-resolved) type name into a descriptor.
///
/// `in_glib` enables the bare `List`/`SList`/`HashTable`/`Error` spellings
/// used inside the GLib namespace itself; `in_gobject` maps the bare `Type`
/// to `GLib.Type`.
pub(crate) fn parse_type_name(name: &str, in_glib: bool, in_gobject: bool) -> TypeNode {
    let mut ty = TypeNode::simple(TypeTag::Void, false);
    ty.unparsed = Some(name.to_string());

    let mut text: &str = name;
    let mut requalified: Option<String> = None;
    if in_gobject && text == "Type" {
        text = "GLib.Type";
    } else if in_glib {
        // Inside GLib the container types appear without their namespace.
        for bare in ["List", "SList", "HashTable", "Error"] {
            if text == bare || text.starts_with(&format!("{bare}<")) {
                requalified = Some(format!("GLib.{text}"));
                break;
            }
        }
    }
    if let Some(qualified) = requalified.as_deref() {
        text = qualified;
    }

    if let Some(basic) = lookup_basic(text) {
        ty.tag = basic.tag;
        ty.is_pointer = basic.pointer;
        return ty;
    }

    if text.starts_with("GLib.SList") {
        ty.tag = TypeTag::GSList;
        ty.is_pointer = true;
    } else if text.starts_with("GLib.List") {
        ty.tag = TypeTag::GList;
        ty.is_pointer = true;
    } else if text.starts_with("GLib.HashTable") {
        ty.tag = TypeTag::GHash;
        ty.is_pointer = true;
    } else if let Some(rest) = text.strip_prefix("GLib.Error") {
        ty.tag = TypeTag::Error;
        ty.is_pointer = true;
        if let Some(list) = rest.strip_prefix('<') {
            if let Some(end) = list.find('>') {
                ty.errors = list[..end]
                    .split(',')
                    .map(|domain| domain.trim().to_string())
                    .filter(|domain| !domain.is_empty())
                    .collect();
            }
        }
    } else {
        ty.tag = TypeTag::Interface;
        let end = text
            .bytes()
            .position(|byte| !is_name_byte(byte))
            .unwrap_or(text.len());
        ty.interface = Some(text[..end].to_string());
    }
    ty
}

/// Alias-resolve `name` against `module` (basic spellings are never
/// aliases), then parse it.
pub(crate) fn parse_type(module: &Module, name: &str) -> TypeNode {
    let in_glib = module.name == "GLib";
    let in_gobject = module.name == "GObject";

    let resolved = if lookup_basic(name).is_some() {
        name
    } else {
        module.resolve_alias(name)
    };

    let ty = parse_type_name(resolved, in_glib, in_gobject);
    debug!("parsed type {name} => {}", ty.tag.name());
    ty
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_names_resolve_to_tags() {
        let ty = parse_type_name("int32", false, false);
        assert_eq!(ty.tag, TypeTag::Int32);
        assert!(!ty.is_pointer);

        let ty = parse_type_name("utf8", false, false);
        assert_eq!(ty.tag, TypeTag::Utf8);
        assert!(ty.is_pointer);

        let ty = parse_type_name("any", false, false);
        assert_eq!(ty.tag, TypeTag::Void);
        assert!(ty.is_pointer);
    }

    #[test]
    fn qualified_container_names() {
        assert_eq!(parse_type_name("GLib.List", false, false).tag, TypeTag::GList);
        assert_eq!(parse_type_name("GLib.SList", false, false).tag, TypeTag::GSList);
        assert_eq!(
            parse_type_name("GLib.HashTable", false, false).tag,
            TypeTag::GHash
        );
    }

    #[test]
    fn bare_containers_only_inside_glib() {
        assert_eq!(parse_type_name("List", true, false).tag, TypeTag::GList);
        // Outside GLib a bare `List` is just an interface reference.
        let ty = parse_type_name("List", false, false);
        assert_eq!(ty.tag, TypeTag::Interface);
        assert_eq!(ty.interface.as_deref(), Some("List"));
    }

    #[test]
    fn error_domains_parse_from_angle_brackets() {
        let ty = parse_type_name("GLib.Error<X.FooError,X.BarError>", false, false);
        assert_eq!(ty.tag, TypeTag::Error);
        assert_eq!(ty.errors, vec!["X.FooError", "X.BarError"]);
    }

    #[test]
    fn gobject_type_shorthand() {
        // Inside GObject the bare `Type` reads as a reference to GLib.Type.
        let ty = parse_type_name("Type", false, true);
        assert_eq!(ty.tag, TypeTag::Interface);
        assert_eq!(ty.interface.as_deref(), Some("GLib.Type"));
    }

    #[test]
    fn unknown_names_become_interface_refs() {
        let ty = parse_type_name("Gtk.Widget", false, false);
        assert_eq!(ty.tag, TypeTag::Interface);
        assert_eq!(ty.interface.as_deref(), Some("Gtk.Widget"));
    }

    #[test]
    fn aliases_resolve_before_parsing() {
        let mut module = Module::new("X", "1.0");
        module.aliases.insert("X.Chars".into(), "utf8".into());
        let ty = parse_type(&module, "Chars");
        assert_eq!(ty.tag, TypeTag::Utf8);

        // Basic spellings skip alias resolution entirely.
        module.aliases.insert("X.int32".into(), "utf8".into());
        let ty = parse_type(&module, "int32");
        assert_eq!(ty.tag, TypeTag::Int32);
    }
}
