use std::cell::RefCell;
use std::rc::Rc;

use super::object::ObjectInner;
use super::{propagate_from_item, ItemOwner};
use crate::tree::Object;

/// One of the 13 wire type tags an item's value may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemType {
    Bool,
    Char,
    Int32,
    Int64,
    Double,
    String,
    Object,
    CharArray,
    Int32Array,
    Int64Array,
    DoubleArray,
    StringArray,
    ObjectArray,
}

impl ItemType {
    pub(crate) fn tag(self) -> u8 {
        match self {
            ItemType::Bool => b'b',
            ItemType::Char => b'c',
            ItemType::Int32 => b'i',
            ItemType::Int64 => b'q',
            ItemType::Double => b'd',
            ItemType::String => b's',
            ItemType::Object => b'o',
            ItemType::CharArray => b'C',
            ItemType::Int32Array => b'I',
            ItemType::Int64Array => b'Q',
            ItemType::DoubleArray => b'D',
            ItemType::StringArray => b'S',
            ItemType::ObjectArray => b'O',
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<ItemType> {
        Some(match tag {
            b'b' => ItemType::Bool,
            b'c' => ItemType::Char,
            b'i' => ItemType::Int32,
            b'q' => ItemType::Int64,
            b'd' => ItemType::Double,
            b's' => ItemType::String,
            b'o' => ItemType::Object,
            b'C' => ItemType::CharArray,
            b'I' => ItemType::Int32Array,
            b'Q' => ItemType::Int64Array,
            b'D' => ItemType::DoubleArray,
            b'S' => ItemType::StringArray,
            b'O' => ItemType::ObjectArray,
            _ => return None,
        })
    }

    /// Whether this type's wire form carries a 4-byte element count ahead
    /// of its payload.
    pub(crate) fn is_array(self) -> bool {
        matches!(
            self,
            ItemType::CharArray
                | ItemType::Int32Array
                | ItemType::DoubleArray
                | ItemType::Int64Array
                | ItemType::StringArray
                | ItemType::ObjectArray
        )
    }
}

pub(crate) enum ItemValue {
    Bool(bool),
    Char(u8),
    Int32(i32),
    Int64(i64),
    Double(f64),
    Str(Rc<[u8]>),
    Obj(Object),
    CharArray(Rc<[u8]>),
    Int32Array(Rc<[i32]>),
    Int64Array(Rc<[i64]>),
    DoubleArray(Rc<[f64]>),
    StringArray(Rc<[Rc<[u8]>]>),
    ObjectArray(Vec<Object>),
}

impl ItemValue {
    fn item_type(&self) -> ItemType {
        match self {
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

    fn array_length(&self) -> u32 {
        match self {
            ItemValue::CharArray(a) => a.len() as u32,
            ItemValue::Int32Array(a) => a.len() as u32,
            ItemValue::Int64Array(a) => a.len() as u32,
            ItemValue::DoubleArray(a) => a.len() as u32,
            ItemValue::StringArray(a) => a.len() as u32,
            ItemValue::ObjectArray(a) => a.len() as u32,
            _ => 0,
        }
    }

    /// Size in bytes of this value alone, not counting the item's own
    /// `name\0` + type-tag header. Matches `data_size` in the spec.
    fn data_size(&self) -> u64 {
        use crate::codec::array_byte_len;
        match self {
            ItemValue::Bool(_) | ItemValue::Char(_) => 1,
            ItemValue::Int32(_) => 4,
            ItemValue::Int64(_) | ItemValue::Double(_) => 8,
            ItemValue::Str(s) => s.len() as u64 + 1,
            ItemValue::Obj(o) => o.size(),
            ItemValue::CharArray(a) => 4 + a.len() as u64,
            ItemValue::Int32Array(a) => 4 + array_byte_len(4, a.len() as u32),
            ItemValue::Int64Array(a) => 4 + array_byte_len(8, a.len() as u32),
            ItemValue::DoubleArray(a) => 4 + array_byte_len(8, a.len() as u32),
            ItemValue::StringArray(a) => {
                4 + a.iter().map(|s| s.len() as u64 + 1).sum::<u64>()
            }
            ItemValue::ObjectArray(a) => 4 + a.iter().map(|o| o.size()).sum::<u64>(),
        }
    }
}

pub(crate) struct ItemInner {
    pub(crate) name: Vec<u8>,
    pub(crate) value: ItemValue,
    pub(crate) data_owned: bool,
    pub(crate) data_size: u64,
    pub(crate) owner: Option<ItemOwner>,
}

/// A named, typed value attached to at most one [`Object`].
///
/// `Item` is a cheap, `Clone`-able handle onto shared state (an
/// `Rc<RefCell<_>>`): cloning it does not duplicate the underlying value,
/// it hands out another reference to the same node. This is the crate's
/// realization of the format's three ownership modes — see the
/// `new_*`/`new_*_copy`/`new_*_const` families below.
#[derive(Clone)]
pub struct Item(pub(crate) Rc<RefCell<ItemInner>>);

impl Item {
    pub(crate) fn from_value(name: Vec<u8>, value: ItemValue, data_owned: bool) -> Item {
        let data_size = value.data_size();
        let item = Item(Rc::new(RefCell::new(ItemInner {
            name,
            value,
            data_owned,
            data_size,
            owner: None,
        })));
        match &item.0.borrow().value {
            ItemValue::Obj(obj) => {
                assert!(obj.owner_is_none(), "object is already wrapped by an item");
                obj.set_owner(&item.0);
            }
            ItemValue::ObjectArray(objs) => {
                for obj in objs {
                    assert!(obj.owner_is_none(), "object is already wrapped by an item");
                    obj.set_owner(&item.0);
                }
            }
            _ => {}
        }
        item
    }

    /// Constructs an item directly from a decoded value. Decoded items are
    /// always fully owned: their data came from a byte stream, not from
    /// borrowing a caller's buffer.
    pub(crate) fn from_decoded(name: Vec<u8>, value: ItemValue) -> Item {
        Item::from_value(name, value, true)
    }

    pub(crate) fn set_owner(&self, owner: &Rc<RefCell<ObjectInner>>) {
        self.0.borrow_mut().owner = Some(Rc::downgrade(owner));
    }

    pub(crate) fn clear_owner(&self) {
        self.0.borrow_mut().owner = None;
    }

    pub(crate) fn owner_is_none(&self) -> bool {
        self.0.borrow().owner.is_none()
    }

    fn replace_value(&self, new_value: ItemValue, data_owned: bool) {
        let new_size = new_value.data_size();
        let (old_size, parent) = {
            let mut inner = self.0.borrow_mut();
            let old_size = inner.data_size;
            if let ItemValue::Obj(old_obj) = &inner.value {
                old_obj.clear_owner();
            }
            inner.value = new_value;
            inner.data_owned = data_owned;
            inner.data_size = new_size;
            (old_size, inner.owner.clone())
        };
        if let ItemValue::Obj(new_obj) = &self.0.borrow().value {
            new_obj.set_owner(&self.0);
        }
        let delta = new_size as i64 - old_size as i64;
        if delta != 0 {
            if let Some(owner) = parent.and_then(|w| w.upgrade()) {
                propagate_from_object_owner(&owner, delta);
            }
        }
    }

    pub fn name(&self) -> Vec<u8> {
        self.0.borrow().name.clone()
    }

    pub fn item_type(&self) -> ItemType {
        self.0.borrow().value.item_type()
    }

    /// Element count for array types, `0` for every scalar type.
    pub fn array_length(&self) -> u32 {
        self.0.borrow().value.array_length()
    }

    /// Bytes occupied by the value alone (not the `name\0` + tag header).
    pub fn data_size(&self) -> u64 {
        self.0.borrow().data_size
    }

    /// Full wire size: `name.len() + 1 (nul) + 1 (tag) + data_size()`.
    pub fn size(&self) -> u64 {
        self.0.borrow().name.len() as u64 + 2 + self.data_size()
    }

    /// `false` for items built with a `_const` constructor or set with a
    /// `_const` setter: their payload is shared with the caller, not owned.
    pub fn owns_data(&self) -> bool {
        self.0.borrow().data_owned
    }

    // ---- bool ----

    pub fn new_bool(name: Vec<u8>, value: bool) -> Item {
        Item::from_value(name, ItemValue::Bool(value), true)
    }

    pub fn get_bool(&self) -> bool {
        match self.0.borrow().value {
            ItemValue::Bool(v) => v,
            _ => panic!("item is not a bool"),
        }
    }

    pub fn set_bool(&self, value: bool) {
        self.replace_value(ItemValue::Bool(value), true);
    }

    // ---- char ----

    pub fn new_char(name: Vec<u8>, value: u8) -> Item {
        Item::from_value(name, ItemValue::Char(value), true)
    }

    pub fn get_char(&self) -> u8 {
        match self.0.borrow().value {
            ItemValue::Char(v) => v,
            _ => panic!("item is not a char"),
        }
    }

    pub fn set_char(&self, value: u8) {
        self.replace_value(ItemValue::Char(value), true);
    }

    // ---- int32 ----

    pub fn new_int32(name: Vec<u8>, value: i32) -> Item {
        Item::from_value(name, ItemValue::Int32(value), true)
    }

    pub fn get_int32(&self) -> i32 {
        match self.0.borrow().value {
            ItemValue::Int32(v) => v,
            _ => panic!("item is not an int32"),
        }
    }

    pub fn set_int32(&self, value: i32) {
        self.replace_value(ItemValue::Int32(value), true);
    }

    // ---- int64 ----

    pub fn new_int64(name: Vec<u8>, value: i64) -> Item {
        Item::from_value(name, ItemValue::Int64(value), true)
    }

    pub fn get_int64(&self) -> i64 {
        match self.0.borrow().value {
            ItemValue::Int64(v) => v,
            _ => panic!("item is not an int64"),
        }
    }

    pub fn set_int64(&self, value: i64) {
        self.replace_value(ItemValue::Int64(value), true);
    }

    // ---- double ----

    pub fn new_double(name: Vec<u8>, value: f64) -> Item {
        Item::from_value(name, ItemValue::Double(value), true)
    }

    pub fn get_double(&self) -> f64 {
        match self.0.borrow().value {
            ItemValue::Double(v) => v,
            _ => panic!("item is not a double"),
        }
    }

    pub fn set_double(&self, value: f64) {
        self.replace_value(ItemValue::Double(value), true);
    }

    // ---- string ----
    //
    // A wire "string" is a nul-terminated byte sequence, not necessarily
    // valid UTF-8 — decoding one never fails on the bytes alone, it is
    // `crate::check::check_object` that flags invalid UTF-8 as a VALIDITY
    // finding. `Vec<u8>`/`&[u8]`/`Rc<[u8]>` carry that all the way through;
    // callers with an ordinary `String` can pass `s.into_bytes()`.

    pub fn new_string(name: Vec<u8>, value: Vec<u8>) -> Item {
        Item::from_value(name, ItemValue::Str(value.into()), true)
    }

    pub fn new_string_copy(name: Vec<u8>, value: &[u8]) -> Item {
        Item::from_value(name, ItemValue::Str(Rc::from(value)), true)
    }

    pub fn new_string_const(name: Vec<u8>, value: Rc<[u8]>) -> Item {
        Item::from_value(name, ItemValue::Str(value), false)
    }

    pub fn get_string(&self) -> Rc<[u8]> {
        match &self.0.borrow().value {
            ItemValue::Str(s) => s.clone(),
            _ => panic!("item is not a string"),
        }
    }

    /// Returns the owned string handle. Panics if this item does not own
    /// its data (see [`Item::owns_data`]) — taking ownership of a borrowed
    /// value is a contract violation, not a recoverable error.
    pub fn take_string(&self) -> Rc<[u8]> {
        let inner = self.0.borrow();
        assert!(inner.data_owned, "cannot take a borrowed item's data");
        match &inner.value {
            ItemValue::Str(s) => s.clone(),
            _ => panic!("item is not a string"),
        }
    }

    pub fn set_string(&self, value: Vec<u8>) {
        self.replace_value(ItemValue::Str(value.into()), true);
    }

    pub fn set_string_copy(&self, value: &[u8]) {
        self.replace_value(ItemValue::Str(Rc::from(value)), true);
    }

    pub fn set_string_const(&self, value: Rc<[u8]>) {
        self.replace_value(ItemValue::Str(value), false);
    }

    // ---- object ----

    pub fn new_object(name: Vec<u8>, value: Object) -> Item {
        Item::from_value(name, ItemValue::Obj(value), true)
    }

    pub fn get_object(&self) -> Object {
        match &self.0.borrow().value {
            ItemValue::Obj(o) => o.clone(),
            _ => panic!("item is not an object"),
        }
    }

    /// Detaches and returns the wrapped object, consuming this item handle.
    pub fn release_object(self) -> Object {
        let obj = match &self.0.borrow().value {
            ItemValue::Obj(o) => o.clone(),
            _ => panic!("item is not an object"),
        };
        obj.clear_owner();
        obj
    }

    pub fn set_object(&self, value: Object) {
        assert!(value.owner_is_none(), "object is already wrapped by an item");
        self.replace_value(ItemValue::Obj(value), true);
    }

    // ---- char array ----

    pub fn new_char_array(name: Vec<u8>, value: Vec<u8>) -> Item {
        assert!(!value.is_empty(), "array item must not be empty");
        Item::from_value(name, ItemValue::CharArray(value.into()), true)
    }

    pub fn new_char_array_copy(name: Vec<u8>, value: &[u8]) -> Item {
        assert!(!value.is_empty(), "array item must not be empty");
        Item::from_value(name, ItemValue::CharArray(Rc::from(value)), true)
    }

    pub fn new_char_array_const(name: Vec<u8>, value: Rc<[u8]>) -> Item {
        assert!(!value.is_empty(), "array item must not be empty");
        Item::from_value(name, ItemValue::CharArray(value), false)
    }

    pub fn get_char_array(&self) -> Rc<[u8]> {
        match &self.0.borrow().value {
            ItemValue::CharArray(a) => a.clone(),
            _ => panic!("item is not a char array"),
        }
    }

    pub fn take_char_array(&self) -> Rc<[u8]> {
        let inner = self.0.borrow();
        assert!(inner.data_owned, "cannot take a borrowed item's data");
        match &inner.value {
            ItemValue::CharArray(a) => a.clone(),
            _ => panic!("item is not a char array"),
        }
    }

    pub fn set_char_array(&self, value: Vec<u8>) {
        assert!(!value.is_empty(), "array item must not be empty");
        self.replace_value(ItemValue::CharArray(value.into()), true);
    }

    pub fn set_char_array_copy(&self, value: &[u8]) {
        assert!(!value.is_empty(), "array item must not be empty");
        self.replace_value(ItemValue::CharArray(Rc::from(value)), true);
    }

    pub fn set_char_array_const(&self, value: Rc<[u8]>) {
        assert!(!value.is_empty(), "array item must not be empty");
        self.replace_value(ItemValue::CharArray(value), false);
    }

    // ---- int32 / int64 / double arrays: see `numeric_array!` below ----

    // ---- string array ----

    pub fn new_string_array(name: Vec<u8>, value: Vec<Vec<u8>>) -> Item {
        assert!(!value.is_empty(), "array item must not be empty");
        let rc: Rc<[Rc<[u8]>]> = value.into_iter().map(Rc::from).collect();
        Item::from_value(name, ItemValue::StringArray(rc), true)
    }

    pub fn new_string_array_copy(name: Vec<u8>, value: &[&[u8]]) -> Item {
        assert!(!value.is_empty(), "array item must not be empty");
        let rc: Rc<[Rc<[u8]>]> = value.iter().map(|s| Rc::from(*s)).collect();
        Item::from_value(name, ItemValue::StringArray(rc), true)
    }

    pub fn new_string_array_const(name: Vec<u8>, value: Rc<[Rc<[u8]>]>) -> Item {
        assert!(!value.is_empty(), "array item must not be empty");
        Item::from_value(name, ItemValue::StringArray(value), false)
    }

    pub fn get_string_array(&self) -> Rc<[Rc<[u8]>]> {
        match &self.0.borrow().value {
            ItemValue::StringArray(a) => a.clone(),
            _ => panic!("item is not a string array"),
        }
    }

    pub fn take_string_array(&self) -> Rc<[Rc<[u8]>]> {
        let inner = self.0.borrow();
        assert!(inner.data_owned, "cannot take a borrowed item's data");
        match &inner.value {
            ItemValue::StringArray(a) => a.clone(),
            _ => panic!("item is not a string array"),
        }
    }

    pub fn set_string_array(&self, value: Vec<Vec<u8>>) {
        assert!(!value.is_empty(), "array item must not be empty");
        let rc: Rc<[Rc<[u8]>]> = value.into_iter().map(Rc::from).collect();
        self.replace_value(ItemValue::StringArray(rc), true);
    }

    pub fn set_string_array_const(&self, value: Rc<[Rc<[u8]>]>) {
        assert!(!value.is_empty(), "array item must not be empty");
        self.replace_value(ItemValue::StringArray(value), false);
    }

    // ---- object array (always owned) ----

    pub fn new_object_array(name: Vec<u8>, value: Vec<Object>) -> Item {
        assert!(!value.is_empty(), "array item must not be empty");
        Item::from_value(name, ItemValue::ObjectArray(value), true)
    }

    pub fn get_object_array(&self) -> Vec<Object> {
        match &self.0.borrow().value {
            ItemValue::ObjectArray(a) => a.clone(),
            _ => panic!("item is not an object array"),
        }
    }

    pub fn set_object_array(&self, value: Vec<Object>) {
        assert!(!value.is_empty(), "array item must not be empty");
        for obj in &value {
            assert!(obj.owner_is_none(), "object is already wrapped by an item");
        }
        if let ItemValue::ObjectArray(old) = &self.0.borrow().value {
            for obj in old {
                obj.clear_owner();
            }
        }
        self.replace_value(ItemValue::ObjectArray(value), true);
        if let ItemValue::ObjectArray(objs) = &self.0.borrow().value {
            for obj in objs {
                obj.set_owner(&self.0);
            }
        }
    }
}

/// Item is stored behind `Rc<RefCell<_>>`, so the owner edge from an
/// [`Object`] needs to reach an `Item`'s inner cell directly when the
/// delta didn't originate in `replace_value` (e.g. a nested object's own
/// mutator already did the `borrow_mut`/propagate dance and just needs to
/// keep walking up past this item).
pub(crate) fn propagate_from_object_owner(owner: &Rc<RefCell<ItemInner>>, delta: i64) {
    propagate_from_item(owner, delta);
}

/// Generates the `new_*`/`new_*_copy`/`new_*_const`/`get_*`/`take_*`/
/// `set_*`/`set_*_copy`/`set_*_const` family shared by the POD numeric
/// array types, which differ only in element type, variant name and method
/// names — all spelled out explicitly so the generated API reads exactly
/// like the hand-written one above.
macro_rules! numeric_array {
    (
        $variant:ident, $elem:ty,
        $new:ident, $new_copy:ident, $new_const:ident,
        $get:ident, $take:ident,
        $set:ident, $set_copy:ident, $set_const:ident
    ) => {
        impl Item {
            pub fn $new(name: Vec<u8>, value: Vec<$elem>) -> Item {
                assert!(!value.is_empty(), "array item must not be empty");
                Item::from_value(name, ItemValue::$variant(value.into()), true)
            }

            pub fn $new_copy(name: Vec<u8>, value: &[$elem]) -> Item {
                assert!(!value.is_empty(), "array item must not be empty");
                Item::from_value(name, ItemValue::$variant(Rc::from(value)), true)
            }

            pub fn $new_const(name: Vec<u8>, value: Rc<[$elem]>) -> Item {
                assert!(!value.is_empty(), "array item must not be empty");
                Item::from_value(name, ItemValue::$variant(value), false)
            }

            pub fn $get(&self) -> Rc<[$elem]> {
                match &self.0.borrow().value {
                    ItemValue::$variant(a) => a.clone(),
                    _ => panic!(concat!("item is not a ", stringify!($variant))),
                }
            }

            pub fn $take(&self) -> Rc<[$elem]> {
                let inner = self.0.borrow();
                assert!(inner.data_owned, "cannot take a borrowed item's data");
                match &inner.value {
                    ItemValue::$variant(a) => a.clone(),
                    _ => panic!(concat!("item is not a ", stringify!($variant))),
                }
            }

            pub fn $set(&self, value: Vec<$elem>) {
                assert!(!value.is_empty(), "array item must not be empty");
                self.replace_value(ItemValue::$variant(value.into()), true);
            }

            pub fn $set_copy(&self, value: &[$elem]) {
                assert!(!value.is_empty(), "array item must not be empty");
                self.replace_value(ItemValue::$variant(Rc::from(value)), true);
            }

            pub fn $set_const(&self, value: Rc<[$elem]>) {
                assert!(!value.is_empty(), "array item must not be empty");
                self.replace_value(ItemValue::$variant(value), false);
            }
        }
    };
}

numeric_array! {
    Int32Array, i32,
    new_int32_array, new_int32_array_copy, new_int32_array_const,
    get_int32_array, take_int32_array,
    set_int32_array, set_int32_array_copy, set_int32_array_const
}

numeric_array! {
    Int64Array, i64,
    new_int64_array, new_int64_array_copy, new_int64_array_const,
    get_int64_array, take_int64_array,
    set_int64_array, set_int64_array_copy, set_int64_array_const
}

numeric_array! {
    DoubleArray, f64,
    new_double_array, new_double_array_copy, new_double_array_const,
    get_double_array, take_double_array,
    set_double_array, set_double_array_copy, set_double_array_const
}
