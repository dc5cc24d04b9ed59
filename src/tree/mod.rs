//! The in-memory tree: [`Object`], [`Item`], ownership and size accounting.
//!
//! Every non-root node has exactly one parent (the "forest invariant" of the
//! format): an [`Item`] knows the [`Object`] it is attached to, an [`Object`]
//! knows the [`Item`] wrapping it (if it is an object-valued item's payload).
//! Both edges are `Weak` — see [`propagate_from_object`] — so that an
//! `Object`/`Item` pair forms a `Rc`/`Weak` tree rather than a reference
//! cycle, and dropping the root frees everything reachable only from it.

mod item;
mod object;

pub use item::{Item, ItemType};
pub use object::Object;

pub(crate) use item::ItemValue;

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use item::ItemInner;
use object::ObjectInner;

/// The owner edge out of an [`Object`]: the [`Item`] that wraps it, if any.
pub(crate) type ObjectOwner = Weak<RefCell<ItemInner>>;
/// The owner edge out of an [`Item`]: the [`Object`] it is attached to, if any.
pub(crate) type ItemOwner = Weak<RefCell<ObjectInner>>;

/// Adds `delta` (which may be negative) to an object's cached `data_size`,
/// then walks up through its owning item (if any) and repeats on the item's
/// own `data_size`, continuing until a node with no owner is reached. This
/// is the single propagation routine backing every size-changing mutator in
/// [`Object`] and [`Item`].
pub(crate) fn propagate_from_object(object: &Rc<RefCell<ObjectInner>>, delta: i64) {
    if delta == 0 {
        return;
    }
    let owner = {
        let mut obj = object.borrow_mut();
        obj.data_size = apply_delta(obj.data_size, delta);
        obj.owner.clone()
    };
    if let Some(item) = owner.and_then(|w| w.upgrade()) {
        propagate_from_item(&item, delta);
    }
}

/// Symmetric counterpart of [`propagate_from_object`], starting at an item.
pub(crate) fn propagate_from_item(item: &Rc<RefCell<ItemInner>>, delta: i64) {
    if delta == 0 {
        return;
    }
    let owner = {
        let mut it = item.borrow_mut();
        it.data_size = apply_delta(it.data_size, delta);
        it.owner.clone()
    };
    if let Some(object) = owner.and_then(|w| w.upgrade()) {
        propagate_from_object(&object, delta);
    }
}

fn apply_delta(size: u64, delta: i64) -> u64 {
    if delta >= 0 {
        size + delta as u64
    } else {
        size - (-delta) as u64
    }
}
