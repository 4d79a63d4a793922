//! Dense positioning for drag-and-drop reordering.
//!
//! Every structural change renumbers the affected sequence so positions are
//! exactly `0..len`. Because positions are recomputed from list order rather
//! than compared, there are never ties and no secondary sort key is needed,
//! and replaying the same move converges to the same order.
//!
//! The same functions back the client's optimistic moves, the application
//! of remote `*.moved` events, and the hub.

use crate::model::{Column, ColumnId, Task, TaskId};

/// An element of an ordered sibling sequence.
pub trait Positioned {
    /// Identifier type used to look the element up.
    type Id: PartialEq;

    /// Returns the element's identifier.
    fn id(&self) -> &Self::Id;

    /// Returns the element's current position.
    fn position(&self) -> u32;

    /// Overwrites the element's position.
    fn set_position(&mut self, position: u32);
}

impl Positioned for Task {
    type Id = TaskId;

    fn id(&self) -> &TaskId {
        &self.id
    }

    fn position(&self) -> u32 {
        self.position
    }

    fn set_position(&mut self, position: u32) {
        self.position = position;
    }
}

impl Positioned for Column {
    type Id = ColumnId;

    fn id(&self) -> &ColumnId {
        &self.id
    }

    fn position(&self) -> u32 {
        self.position
    }

    fn set_position(&mut self, position: u32) {
        self.position = position;
    }
}

/// Where an element was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropTarget<'a, Id> {
    /// Dropped onto an existing sibling: the element takes its place.
    Sibling(&'a Id),
    /// Dropped onto the container itself (e.g. an empty column): append.
    Container,
}

/// Converts a sequence index to a wire position.
#[must_use]
pub fn to_position(index: usize) -> u32 {
    u32::try_from(index).unwrap_or(u32::MAX)
}

/// Clamps a requested position to a valid insertion index for a sequence of
/// `len` elements, i.e. `[0, len]`.
#[must_use]
pub fn clamp_index(desired: u32, len: usize) -> usize {
    usize::try_from(desired).map_or(len, |d| d.min(len))
}

/// Rewrites positions to match sequence order (`0..len`).
pub fn renumber<T: Positioned>(items: &mut [T]) {
    for (index, item) in items.iter_mut().enumerate() {
        item.set_position(to_position(index));
    }
}

/// Stable-sorts by position, then renumbers densely.
pub fn normalize<T: Positioned>(items: &mut [T]) {
    items.sort_by_key(|item| item.position());
    renumber(items);
}

/// Returns `true` when positions are exactly `0..len` in sequence order.
#[must_use]
pub fn is_dense<T: Positioned>(items: &[T]) -> bool {
    items
        .iter()
        .enumerate()
        .all(|(index, item)| item.position() == to_position(index))
}

/// Returns the index of the element with `id`.
pub fn index_of<T: Positioned>(items: &[T], id: &T::Id) -> Option<usize> {
    items.iter().position(|item| item.id() == id)
}

/// Inserts `item` at `clamp(desired, 0, len)` and renumbers.
///
/// Returns the index the item landed at.
pub fn insert_at<T: Positioned>(items: &mut Vec<T>, item: T, desired: u32) -> usize {
    let index = clamp_index(desired, items.len());
    items.insert(index, item);
    renumber(items);
    index
}

/// Removes the element with `id` and renumbers the survivors.
pub fn remove<T: Positioned>(items: &mut Vec<T>, id: &T::Id) -> Option<T> {
    let index = index_of(items, id)?;
    let removed = items.remove(index);
    renumber(items);
    Some(removed)
}

/// Moves the element with `id` to `desired` within the same sequence.
///
/// Returns `(from, to)` indices, or `None` if the element is absent.
pub fn reorder<T: Positioned>(items: &mut Vec<T>, id: &T::Id, desired: u32) -> Option<(usize, usize)> {
    let from = index_of(items, id)?;
    let item = items.remove(from);
    let to = insert_at(items, item, desired);
    Some((from, to))
}

/// Moves the element with `id` from `source` into `target` at `desired`.
///
/// `prepare` runs on the element between removal and insertion, which is
/// where callers rewrite ownership (e.g. a task's column id). Both sequences
/// end up densely numbered.
///
/// Returns the index in `target`, or `None` if the element is not in
/// `source` (in which case neither sequence is touched).
pub fn transfer<T: Positioned>(
    source: &mut Vec<T>,
    target: &mut Vec<T>,
    id: &T::Id,
    desired: u32,
    prepare: impl FnOnce(&mut T),
) -> Option<usize> {
    let mut item = remove(source, id)?;
    prepare(&mut item);
    Some(insert_at(target, item, desired))
}

/// Resolves a drop target to the position the moved element should take.
///
/// Dropping onto a sibling yields that sibling's current position; dropping
/// onto the container (or onto a sibling that is no longer there) appends.
pub fn resolve_drop_position<T: Positioned>(siblings: &[T], target: DropTarget<'_, T::Id>) -> u32 {
    match target {
        DropTarget::Sibling(id) => siblings
            .iter()
            .find(|item| item.id() == id)
            .map_or_else(|| to_position(siblings.len()), |item| item.position()),
        DropTarget::Container => to_position(siblings.len()),
    }
}
