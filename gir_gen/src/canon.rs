//! Canonical textual form of a type descriptor, used as the dedup key for
//! the type pool. Two descriptors serialize to equal text exactly when they
//! would produce identical pool blobs.

use gir_types::{TypeNode, TypeTag};

/// Render `ty` unambiguously. Interface references are qualified with their
/// owning namespace (`current` for bare names) so identical spellings from
/// different namespaces cannot collide.
pub fn canonical_type(current: &str, ty: &TypeNode) -> String {
    let mut text = String::new();
    append_type(current, ty, &mut text);
    text
}

fn append_type(current: &str, ty: &TypeNode, out: &mut String) {
    match ty.tag {
        TypeTag::Array => {
            if let Some(element) = &ty.param1 {
                append_type(current, element, out);
            }
            out.push('[');
            let mut parts: Vec<String> = Vec::new();
            if let Some(length) = ty.length {
                parts.push(format!("length={length}"));
            } else if let Some(size) = ty.fixed_size {
                parts.push(format!("fixed-size={size}"));
            }
            if ty.zero_terminated {
                parts.push("zero-terminated=1".to_string());
            }
            out.push_str(&parts.join(","));
            out.push(']');
        }
        TypeTag::Interface => {
            let name = ty.interface.as_deref().unwrap_or("");
            if !name.contains('.') && !current.is_empty() {
                out.push_str(current);
                out.push('.');
            }
            out.push_str(name);
            if ty.is_pointer {
                out.push('*');
            }
        }
        TypeTag::GList | TypeTag::GSList => {
            out.push_str(if ty.tag == TypeTag::GList {
                "GList"
            } else {
                "GSList"
            });
            if let Some(element) = &ty.param1 {
                out.push('<');
                append_type(current, element, out);
                out.push('>');
            }
        }
        TypeTag::GHash => {
            out.push_str("GHashTable");
            if let (Some(key), Some(value)) = (&ty.param1, &ty.param2) {
                out.push('<');
                append_type(current, key, out);
                out.push(',');
                append_type(current, value, out);
                out.push('>');
            }
        }
        TypeTag::Error => {
            out.push_str("GError");
            if !ty.errors.is_empty() {
                out.push('<');
                out.push_str(&ty.errors.join(","));
                out.push('>');
            }
        }
        basic => {
            out.push_str(basic.name());
            if ty.is_pointer {
                out.push('*');
            }
        }
    }
}
