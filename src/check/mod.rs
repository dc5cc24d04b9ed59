//! Conformance checking: non-fatal structural and content findings that a
//! successfully decoded (or freshly built) tree may still exhibit.
//!
//! A tree can round-trip perfectly through [`crate::wire`] and still be
//! flagged here — an empty item name, a non-identifier object name, a
//! `double` holding `NaN`, a `string` that is not valid UTF-8. None of
//! these break the wire format; they just aren't what a well-formed
//! `GwyContainer` tree looks like.

mod error;

pub use error::{CheckDomain, CheckError, CheckFlags};

use memchr::memchr3;

use crate::tree::{ItemType, Object};
use error::CheckCode;

/// Path components longer than this are ellipsized in finding messages.
const PATH_COMPONENT_CAP: usize = 64;

/// Runs every selected check over `object` and its full subtree, returning
/// every finding in traversal order.
pub fn check_object(object: &Object, flags: CheckFlags) -> Vec<CheckError> {
    let mut out = Vec::new();
    walk_object(object, &[], flags, &mut out, false);
    out
}

/// Like [`check_object`], but stops at the first finding and returns
/// whether the tree is entirely clean under `flags`.
pub fn check_object_ok(object: &Object, flags: CheckFlags) -> bool {
    let mut out = Vec::new();
    walk_object(object, &[], flags, &mut out, true);
    out.is_empty()
}

fn walk_object(
    object: &Object,
    path: &[&[u8]],
    flags: CheckFlags,
    out: &mut Vec<CheckError>,
    short_circuit: bool,
) {
    if short_circuit && !out.is_empty() {
        return;
    }

    let name = object.name();
    if !is_legacy_utf8(&name) {
        push(out, flags, CheckCode::InvalidUtf8Type, path, "object name is not valid UTF-8");
    }
    if short_circuit && !out.is_empty() {
        return;
    }
    if !is_identifier(&name) {
        push(
            out,
            flags,
            CheckCode::TypeIdentifier,
            path,
            format!(
                "object name {:?} is not a valid identifier",
                String::from_utf8_lossy(&name)
            ),
        );
    }
    if short_circuit && !out.is_empty() {
        return;
    }

    let mut stop = false;
    object.foreach(|item| {
        if stop {
            return;
        }
        let mut child_path = path.to_vec();
        let item_name = item.name();
        child_path.push(&item_name);
        check_item(item, &child_path, flags, out, short_circuit);
        if short_circuit && !out.is_empty() {
            stop = true;
        }
    });
}

fn check_item(
    item: &crate::tree::Item,
    path: &[&[u8]],
    flags: CheckFlags,
    out: &mut Vec<CheckError>,
    short_circuit: bool,
) {
    let name = item.name();
    if name.is_empty() {
        push(out, flags, CheckCode::EmptyName, path, "name is empty");
    }
    if short_circuit && !out.is_empty() {
        return;
    }
    if !is_legacy_utf8(&name) {
        push(out, flags, CheckCode::InvalidUtf8Name, path, "name is not valid UTF-8");
    }
    if short_circuit && !out.is_empty() {
        return;
    }

    match item.item_type() {
        ItemType::String => {
            let bytes = item.get_string();
            if !is_legacy_utf8(&bytes) {
                push(
                    out,
                    flags,
                    CheckCode::InvalidUtf8String,
                    path,
                    "string item is not valid UTF-8",
                );
            }
        }
        ItemType::StringArray => {
            for (index, bytes) in item.get_string_array().iter().enumerate() {
                if short_circuit && !out.is_empty() {
                    break;
                }
                if !is_legacy_utf8(bytes) {
                    push(
                        out,
                        flags,
                        CheckCode::InvalidUtf8String,
                        path,
                        format!("string array element {index} is not valid UTF-8"),
                    );
                }
            }
        }
        ItemType::Double => {
            if !item.get_double().is_finite() {
                push(out, flags, CheckCode::InvalidDouble, path, "double is not finite");
            }
        }
        ItemType::DoubleArray => {
            for (index, value) in item.get_double_array().iter().enumerate() {
                if short_circuit && !out.is_empty() {
                    break;
                }
                if !value.is_finite() {
                    push(
                        out,
                        flags,
                        CheckCode::InvalidDouble,
                        path,
                        format!("double array element {index} is not finite"),
                    );
                }
            }
        }
        ItemType::Object => {
            if !(short_circuit && !out.is_empty()) {
                walk_object(&item.get_object(), path, flags, out, short_circuit);
            }
        }
        ItemType::ObjectArray => {
            for (index, child) in item.get_object_array().iter().enumerate() {
                if short_circuit && !out.is_empty() {
                    break;
                }
                let mut child_path = path.to_vec();
                let label = format!("{index}").into_bytes();
                child_path.push(&label);
                walk_object(child, &child_path, flags, out, short_circuit);
            }
        }
        _ => {}
    }
}

fn push(
    out: &mut Vec<CheckError>,
    flags: CheckFlags,
    code: CheckCode,
    path: &[&[u8]],
    message: impl Into<String>,
) {
    let error = CheckError::new(code, build_path(path), message);
    if error.is_selected(flags) {
        out.push(error);
    }
}

/// `[A-Za-z][A-Za-z0-9_]*`, the convention Gwyddion object type names
/// (`GwyContainer`, `GwyDataField`, ...) follow.
fn is_identifier(name: &[u8]) -> bool {
    let mut bytes = name.iter();
    match bytes.next() {
        Some(&b) if b.is_ascii_alphabetic() => {}
        _ => return false,
    }
    bytes.all(|&b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Validates `bytes` against the pre-Unicode-2003 UTF-8 definition, which
/// permits 1- to 6-byte sequences (up to `U+7FFFFFFF`) rather than the
/// 4-byte ceiling `std::str::from_utf8` enforces. Older Gwyddion files can
/// contain text produced by a glib build still accepting that wider range.
fn is_legacy_utf8(bytes: &[u8]) -> bool {
    let mut i = 0;
    while i < bytes.len() {
        let lead = bytes[i];
        let len = match sequence_len(lead) {
            Some(len) => len,
            None => return false,
        };
        if i + len > bytes.len() {
            return false;
        }
        let mut codepoint = u32::from(lead & lead_mask(len));
        for &cont in &bytes[i + 1..i + len] {
            if cont & 0xC0 != 0x80 {
                return false;
            }
            codepoint = (codepoint << 6) | u32::from(cont & 0x3F);
        }
        if codepoint < min_codepoint(len) {
            return false;
        }
        i += len;
    }
    true
}

fn sequence_len(lead: u8) -> Option<usize> {
    if lead & 0x80 == 0x00 {
        Some(1)
    } else if lead & 0xE0 == 0xC0 {
        Some(2)
    } else if lead & 0xF0 == 0xE0 {
        Some(3)
    } else if lead & 0xF8 == 0xF0 {
        Some(4)
    } else if lead & 0xFC == 0xF8 {
        Some(5)
    } else if lead & 0xFE == 0xFC {
        Some(6)
    } else {
        None
    }
}

fn lead_mask(len: usize) -> u8 {
    match len {
        1 => 0x7F,
        2 => 0x1F,
        3 => 0x0F,
        4 => 0x07,
        5 => 0x03,
        6 => 0x01,
        _ => 0,
    }
}

fn min_codepoint(len: usize) -> u32 {
    match len {
        1 => 0,
        2 => 0x80,
        3 => 0x800,
        4 => 0x1_0000,
        5 => 0x20_0000,
        6 => 0x400_0000,
        _ => u32::MAX,
    }
}

/// Joins `segments` with `/`, escaping `/`, ` ` and `\` within each segment
/// as `\/`, `\ ` and `\\`, bytes outside `0x21..=0x7E` as `\xNN`, and
/// ellipsizing any segment longer than [`PATH_COMPONENT_CAP`] bytes.
fn build_path(segments: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    for segment in segments {
        out.push(b'/');
        escape_segment(segment, &mut out);
    }
    if out.is_empty() {
        out.push(b'/');
    }
    out
}

fn escape_segment(name: &[u8], out: &mut Vec<u8>) {
    let truncated = name.len() > PATH_COMPONENT_CAP;
    let name = &name[..name.len().min(PATH_COMPONENT_CAP)];

    let mut start = 0;
    while start < name.len() {
        match memchr3(b'/', b' ', b'\\', &name[start..]) {
            Some(offset) => {
                escape_plain_run(&name[start..start + offset], out);
                out.push(b'\\');
                out.push(name[start + offset]);
                start += offset + 1;
            }
            None => {
                escape_plain_run(&name[start..], out);
                break;
            }
        }
    }
    if truncated {
        out.extend_from_slice(b"...");
    }
}

fn escape_plain_run(bytes: &[u8], out: &mut Vec<u8>) {
    for &b in bytes {
        if (0x21..=0x7E).contains(&b) {
            out.push(b);
        } else {
            out.extend_from_slice(format!("\\x{:02X}", b).as_bytes());
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tree::Item;

    #[test]
    fn test_clean_tree_has_no_findings() {
        let root = Object::new(b"GwyContainer".to_vec());
        root.add(Item::new_double(b"value".to_vec(), 1.0));
        assert!(check_object_ok(&root, CheckFlags::all()));
        assert!(check_object(&root, CheckFlags::all()).is_empty());
    }

    #[test]
    fn test_non_identifier_type_name_is_warning() {
        let root = Object::new(b"not an identifier!".to_vec());
        assert!(check_object(&root, CheckFlags::VALIDITY).is_empty());
        let findings = check_object(&root, CheckFlags::WARNING);
        assert!(findings.iter().any(|f| f.code == CheckCode::TypeIdentifier));
    }

    #[test]
    fn test_leading_underscore_is_not_an_identifier() {
        assert!(!is_identifier(b"_private"));
        assert!(is_identifier(b"GwyContainer"));
    }

    #[test]
    fn test_empty_item_name_is_warning() {
        let root = Object::new(b"GwyContainer".to_vec());
        root.add(Item::new_bool(Vec::new(), true));
        assert!(check_object(&root, CheckFlags::VALIDITY).is_empty());
        let findings = check_object(&root, CheckFlags::WARNING);
        assert!(findings.iter().any(|f| f.code == CheckCode::EmptyName));
    }

    #[test]
    fn test_non_finite_double_is_validity() {
        let root = Object::new(b"GwyContainer".to_vec());
        root.add(Item::new_double(b"value".to_vec(), f64::NAN));
        let findings = check_object(&root, CheckFlags::VALIDITY);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].code, CheckCode::InvalidDouble);
        assert!(check_object(&root, CheckFlags::WARNING).is_empty());
    }

    #[test]
    fn test_invalid_utf8_string_flagged() {
        let root = Object::new(b"GwyContainer".to_vec());
        root.add(Item::new_string(b"text".to_vec(), vec![0xFF, 0xFE]));
        let findings = check_object(&root, CheckFlags::VALIDITY);
        assert!(findings.iter().any(|f| f.code == CheckCode::InvalidUtf8String));
    }

    #[test]
    fn test_non_utf8_object_name_uses_type_code() {
        let root = Object::new(vec![0xC3, 0x28]);
        let findings = check_object(&root, CheckFlags::VALIDITY);
        assert!(findings.iter().any(|f| f.code == CheckCode::InvalidUtf8Type));
    }

    #[test]
    fn test_non_utf8_item_name_uses_name_code() {
        let root = Object::new(b"GwyContainer".to_vec());
        root.add(Item::new_bool(vec![0xC3, 0x28], true));
        let findings = check_object(&root, CheckFlags::VALIDITY);
        assert!(findings.iter().any(|f| f.code == CheckCode::InvalidUtf8Name));
    }

    #[test]
    fn test_legacy_utf8_accepts_five_byte_sequence() {
        // 5-byte lead 0xF8 followed by four 10xxxxxx continuation bytes,
        // valid under the permissive pre-2003 definition only.
        let bytes = [0xF8, 0x88, 0x80, 0x80, 0x80];
        assert!(is_legacy_utf8(&bytes));
        assert!(std::str::from_utf8(&bytes).is_err());
    }

    #[test]
    fn test_nested_object_path_is_reported() {
        let inner = Object::new(b"GwyDataField".to_vec());
        inner.add(Item::new_bool(Vec::new(), true));
        let root = Object::new(b"GwyContainer".to_vec());
        root.add(Item::new_object(b"data".to_vec(), inner));

        let findings = check_object(&root, CheckFlags::WARNING);
        let empty_name_finding = findings
            .iter()
            .find(|f| f.code == CheckCode::EmptyName)
            .unwrap();
        // The item's own name is empty, so its path segment is empty too —
        // the trailing slash marks a nameless child directly under `/data`.
        assert_eq!(empty_name_finding.path, b"/data/".to_vec());
    }

    #[test]
    fn test_path_escapes_special_characters() {
        let path = build_path(&[b"a/b c\\d"]);
        assert_eq!(path, b"/a\\/b\\ c\\\\d".to_vec());
    }

    #[test]
    fn test_path_escapes_control_bytes() {
        let path = build_path(&[&[0x01, b'x'][..]]);
        assert_eq!(path, b"/\\x01x".to_vec());
    }

    #[test]
    fn test_path_ellipsizes_long_components() {
        let long = vec![b'a'; PATH_COMPONENT_CAP + 10];
        let path = build_path(&[&long[..]]);
        assert!(path.ends_with(b"..."));
        assert_eq!(path.len(), 1 + PATH_COMPONENT_CAP + 3);
    }

    #[test]
    fn test_check_object_ok_short_circuits() {
        let root = Object::new(b"GwyContainer".to_vec());
        root.add(Item::new_bool(Vec::new(), true));
        assert!(!check_object_ok(&root, CheckFlags::WARNING));
        assert!(check_object_ok(&root, CheckFlags::VALIDITY));
    }
}
