//! Read, write, construct, inspect, and validate files in the Gwyddion GWY
//! container format: a recursive, typed, length-prefixed binary tree used
//! to archive scanning-probe-microscopy datasets.
//!
//! ```
//! use gwyfile::{Object, Item};
//!
//! let root = Object::new(b"GwyContainer".to_vec());
//! root.add(Item::new_string(b"comment".to_vec(), b"hello".to_vec()));
//!
//! let mut buf = Vec::new();
//! gwyfile::fwrite(&root, &mut buf).unwrap();
//!
//! let back = gwyfile::fread(&mut &buf[..], buf.len() as u64).unwrap();
//! assert_eq!(back.name(), root.name());
//! ```
//!
//! This crate implements the container format itself: the object/item
//! tree ([`tree`]), the wire codec ([`wire`]), and the conformance checker
//! ([`check`]). Gwyddion-specific schemas layered on top (`GwyDataField`,
//! `GwyGraphModel`, and so on) are out of scope.

mod codec;
pub mod check;
pub mod error;
mod tree;
mod wire;

use std::fs::File;
use std::io::{BufWriter, Write as _};
use std::path::Path;

pub use check::{check_object, check_object_ok, CheckDomain, CheckError, CheckFlags};
pub use error::{DataError, Domain, Error, Result};
pub use tree::{Item, ItemType, Object};
pub use wire::{fread, fread_with_options, fwrite, DecodeOptions};

/// Reads a whole `.gwy` file from `path`, confined to the file's own size.
pub fn read_file(path: impl AsRef<Path>) -> Result<Object> {
    let path = path.as_ref();
    let max_size = std::fs::metadata(path)?.len();
    let mut file = File::open(path)?;
    fread(&mut file, max_size)
}

/// Like [`read_file`], but with caller-supplied [`DecodeOptions`].
pub fn read_file_with_options(path: impl AsRef<Path>, options: &DecodeOptions) -> Result<Object> {
    let path = path.as_ref();
    let max_size = std::fs::metadata(path)?.len();
    let mut file = File::open(path)?;
    fread_with_options(&mut file, max_size, options)
}

/// Writes `object` as a whole `.gwy` file at `path`, creating or truncating it.
pub fn write_file(object: &Object, path: impl AsRef<Path>) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    fwrite(object, &mut writer)?;
    writer.flush()?;
    Ok(())
}
