//! Binary encode/decode between the [`crate::tree`] model and a byte stream.
//!
//! Layout: `"GWYP"` magic, then the root object serialized as
//! `name\0 u32:data_size items...`. Each item is `name\0 tag:u8 payload`,
//! where `payload` is a nested object for the `o` tag, a `u32:count` then
//! `count` elements for the array tags, and the type's own fixed or
//! nul-terminated encoding otherwise.

use std::io::{Read, Write};
use std::rc::Rc;

use crate::codec::{
    write_bool, write_cstring, write_f64_array, write_f64_le, write_i32_array, write_i32_le,
    write_i64_array, write_i64_le, write_u32_le, write_u8, BoundedReader,
};
use crate::error::{DataError, Error, Result};
use crate::tree::{Item, ItemType, ItemValue, Object};

pub(crate) const MAGIC: &[u8; 4] = b"GWYP";

/// Nesting limit and other decode-time guards not carried by the wire
/// format itself.
#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions {
    /// Maximum object nesting depth before decoding fails with
    /// [`crate::error::DataError::TooDeepNesting`]. The root object is
    /// depth 0.
    pub max_depth: u32,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions { max_depth: 200 }
    }
}

/// Writes `"GWYP"` followed by `object`, fully consuming neither magic nor
/// budget concerns on the write side (those only apply to decoding).
pub fn fwrite(object: &Object, writer: &mut dyn Write) -> Result<()> {
    writer.write_all(MAGIC)?;
    encode_object(object, writer)
}

/// Reads a root object with the default [`DecodeOptions`].
pub fn fread(reader: &mut dyn Read, max_size: u64) -> Result<Object> {
    fread_with_options(reader, max_size, &DecodeOptions::default())
}

/// Reads a root object, confined to at most `max_size` bytes including the
/// magic header.
pub fn fread_with_options(
    reader: &mut dyn Read,
    max_size: u64,
    options: &DecodeOptions,
) -> Result<Object> {
    let mut bounded = BoundedReader::new(reader, max_size);
    let magic = bounded.read_magic()?;
    if &magic != MAGIC {
        return Err(DataError::Magic.into());
    }
    decode_object(&mut bounded, 0, options)
}

fn encode_object(object: &Object, writer: &mut dyn Write) -> Result<()> {
    let inner = object.0.borrow();
    write_cstring(writer, &inner.name)?;
    if inner.data_size > u64::from(u32::MAX) {
        return Err(DataError::ObjectSize.into());
    }
    write_u32_le(writer, inner.data_size as u32)?;
    for item in &inner.items {
        encode_item(item, writer)?;
    }
    Ok(())
}

fn encode_item(item: &Item, writer: &mut dyn Write) -> Result<()> {
    let inner = item.0.borrow();
    write_cstring(writer, &inner.name)?;
    write_u8(writer, item_value_type(&inner.value).tag())?;
    match &inner.value {
        ItemValue::Bool(v) => write_bool(writer, *v)?,
        ItemValue::Char(v) => write_u8(writer, *v)?,
        ItemValue::Int32(v) => write_i32_le(writer, *v)?,
        ItemValue::Int64(v) => write_i64_le(writer, *v)?,
        ItemValue::Double(v) => write_f64_le(writer, *v)?,
        ItemValue::Str(s) => write_cstring(writer, s)?,
        ItemValue::Obj(o) => encode_object(o, writer)?,
        ItemValue::CharArray(a) => {
            write_u32_le(writer, a.len() as u32)?;
            writer.write_all(a)?;
        }
        ItemValue::Int32Array(a) => {
            write_u32_le(writer, a.len() as u32)?;
            write_i32_array(writer, a)?;
        }
        ItemValue::Int64Array(a) => {
            write_u32_le(writer, a.len() as u32)?;
            write_i64_array(writer, a)?;
        }
        ItemValue::DoubleArray(a) => {
            write_u32_le(writer, a.len() as u32)?;
            write_f64_array(writer, a)?;
        }
        ItemValue::StringArray(a) => {
            write_u32_le(writer, a.len() as u32)?;
            for s in a.iter() {
                write_cstring(writer, s)?;
            }
        }
        ItemValue::ObjectArray(a) => {
            write_u32_le(writer, a.len() as u32)?;
            for o in a {
                encode_object(o, writer)?;
            }
        }
    }
    Ok(())
}

/// `ItemValue` keeps its own `item_type()` private to `tree::item`; this
/// small duplicate avoids widening that module's visibility just for the
/// encoder's dispatch.
fn item_value_type(value: &ItemValue) -> ItemType {
    match value {
        ItemValue::Bool(_) => ItemType::Bool,
        ItemValue::Char(_) => ItemType::Char,
        ItemValue::Int32(_) => ItemType::Int32,
        ItemValue::Int64(_) => ItemType::Int64,
        ItemValue::Double(_) => ItemType::Double,
        ItemValue::Str(_) => ItemType::String,
        ItemValue::Obj(_) => ItemType::Object,
        ItemValue::CharArray(_) => ItemType::CharArray,
        ItemValue::Int32Array(_) => ItemType::Int32Array,
        ItemValue::Int64Array(_) => ItemType::Int64Array,
        ItemValue::DoubleArray(_) => ItemType::DoubleArray,
        ItemValue::StringArray(_) => ItemType::StringArray,
        ItemValue::ObjectArray(_) => ItemType::ObjectArray,
    }
}

fn decode_object(
    reader: &mut BoundedReader<'_>,
    depth: u32,
    options: &DecodeOptions,
) -> Result<Object> {
    if depth >= options.max_depth {
        return Err(DataError::TooDeepNesting.into());
    }
    let name = reader.read_cstring()?;
    let declared_size = u64::from(reader.read_u32_le()?);
    let mut child = reader.confine(declared_size)?;

    let mut items = Vec::new();
    while child.remaining() > 0 {
        items.push(decode_item(&mut child, depth, options)?);
    }

    let object = Object::from_decoded_items(name, items);
    debug_assert_eq!(
        object.data_size(),
        declared_size,
        "decoded items did not exactly fill the declared payload length"
    );
    if let Some(dup) = object.find_duplicate_name() {
        return Err(DataError::DuplicateName(dup).into());
    }
    Ok(object)
}

fn decode_item(
    reader: &mut BoundedReader<'_>,
    depth: u32,
    options: &DecodeOptions,
) -> Result<Item> {
    let name = reader.read_cstring()?;
    let tag = reader.read_u8()?;
    let item_type = ItemType::from_tag(tag).ok_or(DataError::ItemType(tag))?;

    let value = match item_type {
        ItemType::Bool => ItemValue::Bool(reader.read_bool()?),
        ItemType::Char => ItemValue::Char(reader.read_u8()?),
        ItemType::Int32 => ItemValue::Int32(reader.read_i32_le()?),
        ItemType::Int64 => ItemValue::Int64(reader.read_i64_le()?),
        ItemType::Double => ItemValue::Double(reader.read_f64_le()?),
        ItemType::String => ItemValue::Str(reader.read_cstring()?.into()),
        ItemType::Object => {
            let next_depth = depth.checked_add(1).ok_or(DataError::TooDeepNesting)?;
            ItemValue::Obj(decode_object(reader, next_depth, options)?)
        }
        ItemType::CharArray => {
            let len = reader.read_u32_le()?;
            if len == 0 {
                return Err(DataError::ArraySize.into());
            }
            ItemValue::CharArray(reader.read_char_array(len)?.into())
        }
        ItemType::Int32Array => {
            let len = reader.read_u32_le()?;
            if len == 0 {
                return Err(DataError::ArraySize.into());
            }
            ItemValue::Int32Array(reader.read_i32_array(len)?.into())
        }
        ItemType::Int64Array => {
            let len = reader.read_u32_le()?;
            if len == 0 {
                return Err(DataError::ArraySize.into());
            }
            ItemValue::Int64Array(reader.read_i64_array(len)?.into())
        }
        ItemType::DoubleArray => {
            let len = reader.read_u32_le()?;
            if len == 0 {
                return Err(DataError::ArraySize.into());
            }
            ItemValue::DoubleArray(reader.read_f64_array(len)?.into())
        }
        ItemType::StringArray => {
            let len = reader.read_u32_le()?;
            if len == 0 {
                return Err(DataError::ArraySize.into());
            }
            let mut strings: Vec<Rc<[u8]>> = Vec::with_capacity(len as usize);
            for _ in 0..len {
                strings.push(reader.read_cstring()?.into());
            }
            ItemValue::StringArray(strings.into())
        }
        ItemType::ObjectArray => {
            let len = reader.read_u32_le()?;
            if len == 0 {
                return Err(DataError::ArraySize.into());
            }
            let next_depth = depth.checked_add(1).ok_or(DataError::TooDeepNesting)?;
            let mut objects = Vec::with_capacity(len as usize);
            for _ in 0..len {
                objects.push(decode_object(reader, next_depth, options)?);
            }
            ItemValue::ObjectArray(objects)
        }
    };

    Ok(Item::from_decoded(name, value))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::DataError;

    fn minimal_object() -> Object {
        let root = Object::new(b"GwyContainer".to_vec());
        root.add(Item::new_string(b"comment".to_vec(), b"hi".to_vec()));
        root
    }

    #[test]
    fn test_round_trip_minimal_object() {
        let root = minimal_object();
        let mut buf = Vec::new();
        fwrite(&root, &mut buf).unwrap();

        let back = fread(&mut &buf[..], buf.len() as u64).unwrap();
        assert_eq!(back.name(), root.name());
        assert_eq!(back.get(b"comment").unwrap().get_string(), root.get(b"comment").unwrap().get_string());
    }

    #[test]
    fn test_round_trip_every_atomic_type() {
        let root = Object::new(b"root".to_vec());
        root.add(Item::new_bool(b"b".to_vec(), true));
        root.add(Item::new_char(b"c".to_vec(), b'x'));
        root.add(Item::new_int32(b"i".to_vec(), -7));
        root.add(Item::new_int64(b"q".to_vec(), i64::MIN));
        root.add(Item::new_double(b"d".to_vec(), 1.5));
        root.add(Item::new_int32_array(b"ia".to_vec(), vec![1, 2, 3]));
        root.add(Item::new_double_array(b"da".to_vec(), vec![1.0, 2.0]));
        root.add(Item::new_string_array(
            b"sa".to_vec(),
            vec![b"one".to_vec(), b"two".to_vec()],
        ));

        let mut buf = Vec::new();
        fwrite(&root, &mut buf).unwrap();
        let back = fread(&mut &buf[..], buf.len() as u64).unwrap();

        assert!(back.get(b"b").unwrap().get_bool());
        assert_eq!(back.get(b"c").unwrap().get_char(), b'x');
        assert_eq!(back.get(b"i").unwrap().get_int32(), -7);
        assert_eq!(back.get(b"q").unwrap().get_int64(), i64::MIN);
        assert_eq!(back.get(b"d").unwrap().get_double(), 1.5);
        assert_eq!(&*back.get(b"ia").unwrap().get_int32_array(), &[1, 2, 3]);
        assert_eq!(&*back.get(b"da").unwrap().get_double_array(), &[1.0, 2.0]);
        assert_eq!(back.get(b"sa").unwrap().get_string_array().len(), 2);
    }

    #[test]
    fn test_nested_object_round_trip() {
        let inner = Object::new(b"inner".to_vec());
        inner.add(Item::new_int32(b"depth".to_vec(), 1));
        let root = Object::new(b"root".to_vec());
        root.add(Item::new_object(b"child".to_vec(), inner));

        let mut buf = Vec::new();
        fwrite(&root, &mut buf).unwrap();
        let back = fread(&mut &buf[..], buf.len() as u64).unwrap();

        let child = back.get(b"child").unwrap().get_object();
        assert_eq!(child.get(b"depth").unwrap().get_int32(), 1);
    }

    #[test]
    fn test_duplicate_item_name_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(b"root\0");
        let mut body = Vec::new();
        for _ in 0..2 {
            body.extend_from_slice(b"x\0");
            body.push(b'i');
            body.extend_from_slice(&1i32.to_le_bytes());
        }
        buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
        buf.extend_from_slice(&body);

        let err = fread(&mut &buf[..], buf.len() as u64).unwrap_err();
        assert!(matches!(err, Error::Data(DataError::DuplicateName(_))));
    }

    #[test]
    fn test_truncated_stream_is_confinement_error() {
        let root = minimal_object();
        let mut buf = Vec::new();
        fwrite(&root, &mut buf).unwrap();
        let truncated = &buf[..buf.len() - 2];

        let err = fread(&mut &truncated[..], truncated.len() as u64).unwrap_err();
        assert!(matches!(err, Error::Data(DataError::Confinement)));
    }

    #[test]
    fn test_declared_size_exceeding_max_size_is_confinement() {
        let root = minimal_object();
        let mut buf = Vec::new();
        fwrite(&root, &mut buf).unwrap();

        let err = fread(&mut &buf[..], (buf.len() - 1) as u64).unwrap_err();
        assert!(matches!(err, Error::Data(DataError::Confinement)));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let err = fread(&mut &b"NOPE"[..], 4).unwrap_err();
        assert!(matches!(err, Error::Data(DataError::Magic)));
    }

    #[test]
    fn test_depth_limit_enforced() {
        // Build a chain of nested objects one item deep each, exceeding a
        // deliberately tiny max_depth.
        let mut current = Object::new(b"leaf".to_vec());
        for level in 0..5 {
            let parent = Object::new(format!("level{level}").into_bytes());
            parent.add(Item::new_object(b"child".to_vec(), current));
            current = parent;
        }

        let mut buf = Vec::new();
        fwrite(&current, &mut buf).unwrap();

        let options = DecodeOptions { max_depth: 2 };
        let err = fread_with_options(&mut &buf[..], buf.len() as u64, &options).unwrap_err();
        assert!(matches!(err, Error::Data(DataError::TooDeepNesting)));
    }

    #[test]
    fn test_zero_length_array_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(b"root\0");
        let mut body = Vec::new();
        body.extend_from_slice(b"a\0");
        body.push(b'I');
        body.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
        buf.extend_from_slice(&body);

        let err = fread(&mut &buf[..], buf.len() as u64).unwrap_err();
        assert!(matches!(err, Error::Data(DataError::ArraySize)));
    }

    #[test]
    fn test_unknown_type_tag_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(b"root\0");
        let mut body = Vec::new();
        body.extend_from_slice(b"x\0");
        body.push(b'z');
        buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
        buf.extend_from_slice(&body);

        let err = fread(&mut &buf[..], buf.len() as u64).unwrap_err();
        assert!(matches!(err, Error::Data(DataError::ItemType(b'z'))));
    }
}
