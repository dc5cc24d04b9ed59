use std::cell::RefCell;
use std::rc::Rc;

use super::item::{propagate_from_object_owner, ItemInner};
use super::{Item, ItemType, ObjectOwner};

pub(crate) struct ObjectInner {
    pub(crate) name: Vec<u8>,
    pub(crate) items: Vec<Item>,
    pub(crate) data_size: u64,
    pub(crate) owner: Option<ObjectOwner>,
}

/// A node of the tree: a name plus an ordered, duplicate-free set of
/// [`Item`]s.
///
/// Like [`Item`], `Object` is a cheap `Clone`-able handle onto shared
/// state. Cloning an `Object` that is attached to a parent does not detach
/// it or give the clone independent identity — both handles observe (and
/// can mutate) the same node, which is how [`Item::get_object`] can hand
/// out a live view of a child without forcing a copy.
#[derive(Clone)]
pub struct Object(pub(crate) Rc<RefCell<ObjectInner>>);

impl Object {
    /// An empty object with the given name.
    pub fn new(name: Vec<u8>) -> Object {
        Object(Rc::new(RefCell::new(ObjectInner {
            name,
            items: Vec::new(),
            data_size: 0,
            owner: None,
        })))
    }

    /// An object built from a batch of items in one call.
    ///
    /// # Panics
    ///
    /// Panics if two items share a name: building a forest with a
    /// duplicate is always a programming error, not recoverable input.
    pub fn new_with_items(name: Vec<u8>, items: Vec<Item>) -> Object {
        let object = Object::new(name);
        for item in items {
            let added = object.add(item);
            assert!(added, "duplicate item name in new_with_items");
        }
        object
    }

    pub(crate) fn set_owner(&self, owner: &Rc<RefCell<ItemInner>>) {
        self.0.borrow_mut().owner = Some(Rc::downgrade(owner));
    }

    pub(crate) fn clear_owner(&self) {
        self.0.borrow_mut().owner = None;
    }

    pub(crate) fn owner_is_none(&self) -> bool {
        self.0.borrow().owner.is_none()
    }

    pub fn name(&self) -> Vec<u8> {
        self.0.borrow().name.clone()
    }

    /// Sum of every child item's `size()`.
    pub fn data_size(&self) -> u64 {
        self.0.borrow().data_size
    }

    /// Full wire size: `name.len() + 1 (nul) + 4 (length prefix) + data_size()`.
    pub fn size(&self) -> u64 {
        self.0.borrow().name.len() as u64 + 5 + self.data_size()
    }

    pub fn nitems(&self) -> usize {
        self.0.borrow().items.len()
    }

    pub fn item_names(&self) -> Vec<Vec<u8>> {
        self.0.borrow().items.iter().map(|it| it.name()).collect()
    }

    /// Attaches `item`, returning `false` (and dropping `item`, same as
    /// `HashSet::insert`) if an item with that name is already present.
    pub fn add(&self, item: Item) -> bool {
        let name = item.name();
        let mut inner = self.0.borrow_mut();
        if inner.items.iter().any(|it| it.name() == name) {
            return false;
        }
        let delta = item.size() as i64;
        assert!(item.owner_is_none(), "item is already attached to an object");
        item.set_owner(&self.0);
        inner.items.push(item);
        inner.data_size += delta as u64;
        let parent = inner.owner.clone();
        drop(inner);
        if let Some(owner) = parent.and_then(|w| w.upgrade()) {
            propagate_from_object_owner(&owner, delta);
        }
        true
    }

    /// Detaches and drops the item named `name`, reporting whether one was
    /// found.
    pub fn remove(&self, name: &[u8]) -> bool {
        self.take(name).is_some()
    }

    /// Detaches and returns the item named `name`.
    pub fn take(&self, name: &[u8]) -> Option<Item> {
        let mut inner = self.0.borrow_mut();
        let index = inner.items.iter().position(|it| it.name() == name)?;
        let item = inner.items.remove(index);
        let delta = -(item.size() as i64);
        inner.data_size = (inner.data_size as i64 + delta) as u64;
        let parent = inner.owner.clone();
        drop(inner);
        item.clear_owner();
        if let Some(owner) = parent.and_then(|w| w.upgrade()) {
            propagate_from_object_owner(&owner, delta);
        }
        Some(item)
    }

    /// A clone of the handle to the item named `name`, without detaching it.
    pub fn get(&self, name: &[u8]) -> Option<Item> {
        self.0
            .borrow()
            .items
            .iter()
            .find(|it| it.name() == name)
            .cloned()
    }

    /// Like [`Object::get`], but returns `None` if the item exists with a
    /// different type.
    pub fn get_with_type(&self, name: &[u8], item_type: ItemType) -> Option<Item> {
        self.get(name).filter(|it| it.item_type() == item_type)
    }

    /// Like [`Object::take`], but leaves a mistyped item attached and
    /// returns `None` instead.
    pub fn take_with_type(&self, name: &[u8], item_type: ItemType) -> Option<Item> {
        if self.get_with_type(name, item_type).is_none() {
            return None;
        }
        self.take(name)
    }

    /// Invokes `f` once per attached item, in attachment order. Items are
    /// cloned out under a single short-lived borrow first, so `f` may
    /// freely read or mutate this same object (e.g. via a borrowed item's
    /// owner edge) without a `RefCell` panic.
    pub fn foreach(&self, mut f: impl FnMut(&Item)) {
        let items = self.0.borrow().items.clone();
        for item in &items {
            f(item);
        }
    }

    /// Scans for two items sharing a name, without permuting the live item
    /// list: a side copy of names is sorted and compared element by
    /// element, so the order callers see from [`Object::foreach`] or
    /// [`Object::item_names`] is never disturbed by the check.
    pub(crate) fn find_duplicate_name(&self) -> Option<Vec<u8>> {
        let mut names: Vec<Vec<u8>> = self.0.borrow().items.iter().map(|it| it.name()).collect();
        names.sort();
        names.windows(2).find(|w| w[0] == w[1]).map(|w| w[0].clone())
    }

    /// Builds an object from already-decoded items without the per-item
    /// duplicate check `add` performs: the wire decoder scans the whole
    /// batch for a duplicate name once, after the fact, so it can report
    /// which name collided rather than silently dropping the second item.
    pub(crate) fn from_decoded_items(name: Vec<u8>, items: Vec<Item>) -> Object {
        let data_size = items.iter().map(|it| it.size()).sum();
        let object = Object(Rc::new(RefCell::new(ObjectInner {
            name,
            items,
            data_size,
            owner: None,
        })));
        for item in &object.0.borrow().items {
            item.set_owner(&object.0);
        }
        object
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tree::Item;

    #[test]
    fn test_add_rejects_duplicate_and_drops_it() {
        let object = Object::new(b"root".to_vec());
        assert!(object.add(Item::new_int32(b"x".to_vec(), 1)));
        assert!(!object.add(Item::new_int32(b"x".to_vec(), 2)));
        assert_eq!(object.nitems(), 1);
        assert_eq!(object.get(b"x").unwrap().get_int32(), 1);
    }

    #[test]
    fn test_take_detaches_and_shrinks_data_size() {
        let object = Object::new(b"root".to_vec());
        object.add(Item::new_int32(b"x".to_vec(), 1));
        let before = object.data_size();
        let taken = object.take(b"x").unwrap();
        assert_eq!(taken.get_int32(), 1);
        assert_eq!(object.data_size(), 0);
        assert!(before > 0);
        assert_eq!(object.nitems(), 0);
        assert!(object.take(b"x").is_none());
    }

    #[test]
    fn test_size_propagates_through_nested_object() {
        let child = Object::new(b"child".to_vec());
        let root = Object::new(b"root".to_vec());
        root.add(Item::new_object(b"inner".to_vec(), child.clone()));

        let size_before = root.data_size();
        child.add(Item::new_int32(b"answer".to_vec(), 42));
        assert!(root.data_size() > size_before);

        let item_size_before = root.get(b"inner").unwrap().data_size();
        child.add(Item::new_int32(b"other".to_vec(), 7));
        assert!(root.get(b"inner").unwrap().data_size() > item_size_before);
    }

    #[test]
    fn test_find_duplicate_name_does_not_reorder_items() {
        let object = Object::new(b"root".to_vec());
        object.add(Item::new_int32(b"a".to_vec(), 1));
        object.add(Item::new_int32(b"b".to_vec(), 2));
        assert_eq!(object.find_duplicate_name(), None);
        assert_eq!(object.item_names(), vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn test_get_with_type_filters_mismatched_type() {
        let object = Object::new(b"root".to_vec());
        object.add(Item::new_int32(b"x".to_vec(), 1));
        assert!(object
            .get_with_type(b"x", crate::tree::ItemType::Double)
            .is_none());
        assert!(object
            .get_with_type(b"x", crate::tree::ItemType::Int32)
            .is_some());
    }

    #[test]
    fn test_object_handle_sharing() {
        let object = Object::new(b"root".to_vec());
        let handle = object.clone();
        object.add(Item::new_int32(b"x".to_vec(), 1));
        assert_eq!(handle.nitems(), 1);
    }
}
