//! Configuration tree arena
//!
//! Children hold a back-reference to their owner for dirty-state
//! propagation, which makes the tree cyclic. All items therefore live in a
//! single arena addressed by stable [`ItemId`] handles; an item's owner is
//! a handle, never a pointer, and upward notification is one hop per
//! ancestor.

use tracing::debug;

use crate::collection::Collection;
use crate::error::ModelError;
use crate::field::Field;
use crate::node::Node;
use crate::state::LifecycleState;

/// Stable handle to an item in a [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemId(pub(crate) u32);

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind of an item behind a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Field,
    Node,
    Collection,
}

#[derive(Debug)]
pub(crate) enum Item {
    Field(Field),
    Node(Node),
    Collection(Collection),
}

/// Arena holding one device session's configuration tree.
#[derive(Debug, Default)]
pub struct Tree {
    pub(crate) items: Vec<Item>,
}

impl Tree {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Create a root node (no owner) with the given wire element name.
    pub fn new_root(&mut self, wire_name: impl Into<String>) -> ItemId {
        self.insert(Item::Node(Node::new(Some(wire_name.into()), None)))
    }

    pub(crate) fn insert(&mut self, item: Item) -> ItemId {
        let id = ItemId(self.items.len() as u32);
        self.items.push(item);
        id
    }

    pub(crate) fn item(&self, id: ItemId) -> &Item {
        &self.items[id.0 as usize]
    }

    pub(crate) fn item_mut(&mut self, id: ItemId) -> &mut Item {
        &mut self.items[id.0 as usize]
    }

    pub fn kind(&self, id: ItemId) -> ItemKind {
        match self.item(id) {
            Item::Field(_) => ItemKind::Field,
            Item::Node(_) => ItemKind::Node,
            Item::Collection(_) => ItemKind::Collection,
        }
    }

    pub fn state(&self, id: ItemId) -> LifecycleState {
        match self.item(id) {
            Item::Field(f) => f.state,
            Item::Node(n) => n.state,
            Item::Collection(c) => c.state,
        }
    }

    /// True when the item carries pending data worth persisting.
    pub fn is_changed(&self, id: ItemId) -> bool {
        self.state(id).is_changed()
    }

    pub fn slot_index(&self, id: ItemId) -> u32 {
        match self.item(id) {
            Item::Field(f) => f.slot_index,
            Item::Node(n) => n.slot_index,
            Item::Collection(_) => 0,
        }
    }

    pub(crate) fn owner_of(&self, id: ItemId) -> Option<ItemId> {
        match self.item(id) {
            Item::Field(f) => f.owner,
            Item::Node(n) => n.owner,
            Item::Collection(c) => c.owner,
        }
    }

    pub(crate) fn set_state(&mut self, id: ItemId, state: LifecycleState) {
        match self.item_mut(id) {
            Item::Field(f) => f.state = state,
            Item::Node(n) => n.state = state,
            Item::Collection(c) => c.state = state,
        }
    }

    pub(crate) fn field(&self, id: ItemId) -> Result<&Field, ModelError> {
        match self.item(id) {
            Item::Field(f) => Ok(f),
            _ => Err(ModelError::NotFound {
                name: format!("field {}", id),
            }),
        }
    }

    pub(crate) fn field_mut(&mut self, id: ItemId) -> Result<&mut Field, ModelError> {
        match self.item_mut(id) {
            Item::Field(f) => Ok(f),
            _ => Err(ModelError::NotFound {
                name: format!("field {}", id),
            }),
        }
    }

    pub(crate) fn node(&self, id: ItemId) -> Result<&Node, ModelError> {
        match self.item(id) {
            Item::Node(n) => Ok(n),
            _ => Err(ModelError::NotFound {
                name: format!("node {}", id),
            }),
        }
    }

    pub(crate) fn node_mut(&mut self, id: ItemId) -> Result<&mut Node, ModelError> {
        match self.item_mut(id) {
            Item::Node(n) => Ok(n),
            _ => Err(ModelError::NotFound {
                name: format!("node {}", id),
            }),
        }
    }

    pub(crate) fn collection(&self, id: ItemId) -> Result<&Collection, ModelError> {
        match self.item(id) {
            Item::Collection(c) => Ok(c),
            _ => Err(ModelError::NotFound {
                name: format!("collection {}", id),
            }),
        }
    }

    pub(crate) fn collection_mut(&mut self, id: ItemId) -> Result<&mut Collection, ModelError> {
        match self.item_mut(id) {
            Item::Collection(c) => Ok(c),
            _ => Err(ModelError::NotFound {
                name: format!("collection {}", id),
            }),
        }
    }

    /// True when any direct child of the item is in a changed state.
    pub(crate) fn any_child_changed(&self, id: ItemId) -> bool {
        match self.item(id) {
            Item::Field(_) => false,
            Item::Node(n) => n.children.iter().any(|(_, c)| self.is_changed(*c)),
            Item::Collection(c) => {
                !c.removed.is_empty() || c.entries.iter().any(|e| self.is_changed(*e))
            }
        }
    }

    /// Upward propagation hook: a child's state changed, fold it into the
    /// parent and continue along the owner chain while states keep moving.
    pub(crate) fn child_state_changed(&mut self, parent: ItemId, child_state: LifecycleState) {
        let current = self.state(parent);
        let next = if child_state.is_changed() {
            current.absorb(child_state)
        } else {
            current.settle(self.any_child_changed(parent))
        };
        if next != current {
            debug!(item = %parent, ?current, ?next, "state propagated");
            self.set_state(parent, next);
            if let Some(up) = self.owner_of(parent) {
                self.child_state_changed(up, next);
            }
        }
    }

    /// Push the item's current state into its owner chain.
    pub(crate) fn notify_owner(&mut self, id: ItemId) {
        let state = self.state(id);
        if let Some(up) = self.owner_of(id) {
            self.child_state_changed(up, state);
        }
    }

    /// Snapshot current values as the new baseline for the whole subtree.
    pub fn commit(&mut self, id: ItemId) {
        self.commit_with(id, false);
    }

    /// Commit a bulk wire-load: the subtree lands in `Precommit` and a later
    /// unconditional [`Tree::commit`] promotes it to `Committed`.
    pub fn commit_as_loaded(&mut self, id: ItemId) {
        self.commit_with(id, true);
    }

    fn commit_with(&mut self, id: ItemId, loading: bool) {
        self.commit_inner(id, loading);
        self.notify_owner(id);
    }

    pub(crate) fn commit_inner(&mut self, id: ItemId, loading: bool) {
        match self.kind(id) {
            ItemKind::Field => self.commit_field(id, loading),
            ItemKind::Node => self.commit_node(id, loading),
            ItemKind::Collection => self.commit_collection(id, loading),
        }
    }

    /// Restore the last committed snapshot for the whole subtree.
    pub fn reject(&mut self, id: ItemId) {
        self.reject_inner(id);
        self.notify_owner(id);
    }

    pub(crate) fn reject_inner(&mut self, id: ItemId) {
        match self.kind(id) {
            ItemKind::Field => self.reject_field(id),
            ItemKind::Node => self.reject_node(id),
            ItemKind::Collection => self.reject_collection(id),
        }
    }

    /// Cooperative read-only guard over the whole subtree.
    pub fn freeze(&mut self, id: ItemId) {
        self.set_frozen(id, true);
    }

    pub fn unfreeze(&mut self, id: ItemId) {
        self.set_frozen(id, false);
    }

    fn set_frozen(&mut self, id: ItemId, frozen: bool) {
        let descendants = self.descendants(id);
        for item_id in descendants {
            match self.item_mut(item_id) {
                Item::Field(f) => f.frozen = frozen,
                Item::Node(n) => n.frozen = frozen,
                Item::Collection(c) => c.frozen = frozen,
            }
        }
    }

    /// True when any changed field in the subtree requires a reboot to apply.
    pub fn reboot_required(&self, id: ItemId) -> bool {
        self.descendants(id).into_iter().any(|item_id| {
            matches!(
                self.item(item_id),
                Item::Field(f) if f.state.is_changed() && f.spec.reboot_required
            )
        })
    }

    /// All items of the subtree rooted at `id`, including `id` itself and
    /// tombstoned collection entries.
    pub(crate) fn descendants(&self, id: ItemId) -> Vec<ItemId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            match self.item(current) {
                Item::Field(_) => {}
                Item::Node(n) => stack.extend(n.children.iter().map(|(_, c)| *c)),
                Item::Collection(c) => {
                    stack.extend(c.entries.iter().copied());
                    stack.extend(c.removed.iter().copied());
                }
            }
        }
        out
    }
}
