//! Composite attribute containers ("Component" on the wire)
//!
//! A node owns an ordered set of named children (fields, nested nodes,
//! repeating groups) plus wire-level extra attributes such as `FQDD` that
//! identify the element without being modeled as fields.

use std::collections::HashSet;

use crate::error::ModelError;
use crate::state::LifecycleState;
use crate::tree::{Item, ItemId, Tree};
use crate::value::Value;

#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) wire_name: Option<String>,
    pub(crate) wire_alias: Option<String>,
    pub(crate) extra_attributes: Vec<(String, String)>,
    pub(crate) excluded_attributes: HashSet<String>,
    pub(crate) excluded_fields: HashSet<String>,
    pub(crate) children: Vec<(String, ItemId)>,
    pub(crate) slot_index: u32,
    pub(crate) frozen: bool,
    pub(crate) state: LifecycleState,
    pub(crate) owner: Option<ItemId>,
}

impl Node {
    pub(crate) fn new(wire_name: Option<String>, owner: Option<ItemId>) -> Self {
        Self {
            wire_name,
            wire_alias: None,
            extra_attributes: Vec::new(),
            excluded_attributes: HashSet::new(),
            excluded_fields: HashSet::new(),
            children: Vec::new(),
            slot_index: 0,
            frozen: false,
            state: LifecycleState::Uninitialized,
            owner,
        }
    }
}

impl Tree {
    /// Add a named child node under a parent node.
    pub fn add_child_node(
        &mut self,
        parent: ItemId,
        name: &str,
        wire_name: Option<&str>,
    ) -> Result<ItemId, ModelError> {
        if self.node(parent)?.children.iter().any(|(n, _)| n == name) {
            return Err(ModelError::Validation {
                name: name.to_string(),
                reason: "duplicate child name".to_string(),
            });
        }
        let id = self.insert(Item::Node(Node::new(
            wire_name.map(str::to_string),
            Some(parent),
        )));
        self.node_mut(parent)?
            .children
            .push((name.to_string(), id));
        Ok(id)
    }

    /// Look up a direct child by name.
    pub fn child(&self, node: ItemId, name: &str) -> Result<ItemId, ModelError> {
        self.node(node)?
            .children
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, id)| *id)
            .ok_or_else(|| ModelError::NotFound {
                name: name.to_string(),
            })
    }

    /// Ordered children of a node.
    pub fn children(&self, node: ItemId) -> Result<&[(String, ItemId)], ModelError> {
        Ok(&self.node(node)?.children)
    }

    /// Write a value to the named field of this node.
    pub fn set_field(
        &mut self,
        node: ItemId,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<bool, ModelError> {
        let child = self.child(node, name)?;
        match self.item(child) {
            Item::Field(_) => self.set_value(child, value),
            _ => Err(ModelError::NotFound {
                name: name.to_string(),
            }),
        }
    }

    /// Read the named field's current value.
    pub fn field_value(&self, node: ItemId, name: &str) -> Result<Option<Value>, ModelError> {
        let child = self.child(node, name)?;
        match self.item(child) {
            Item::Field(_) => Ok(self.value_of(child)),
            _ => Err(ModelError::NotFound {
                name: name.to_string(),
            }),
        }
    }

    /// Store a wire-level attribute rendered on the element itself.
    pub fn add_extra_attribute(
        &mut self,
        node: ItemId,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), ModelError> {
        let name = name.into();
        let value = value.into();
        let n = self.node_mut(node)?;
        if n.frozen {
            return Err(ModelError::Immutable {
                name,
                reason: "frozen".to_string(),
                state: n.state,
            });
        }
        if let Some(entry) = n.extra_attributes.iter_mut().find(|(k, _)| k == &name) {
            entry.1 = value;
        } else {
            n.extra_attributes.push((name, value));
        }
        Ok(())
    }

    /// Read a wire-level extra attribute.
    pub fn extra_attribute(&self, node: ItemId, name: &str) -> Option<&str> {
        self.node(node)
            .ok()?
            .extra_attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Never render the named extra attribute.
    pub fn exclude_attribute(&mut self, node: ItemId, name: impl Into<String>) -> Result<(), ModelError> {
        self.node_mut(node)?.excluded_attributes.insert(name.into());
        Ok(())
    }

    /// Never render the named child.
    pub fn exclude_field(&mut self, node: ItemId, name: impl Into<String>) -> Result<(), ModelError> {
        self.node_mut(node)?.excluded_fields.insert(name.into());
        Ok(())
    }

    /// Set an alternate wire element name accepted for this node.
    pub fn set_wire_alias(&mut self, node: ItemId, alias: impl Into<String>) -> Result<(), ModelError> {
        self.node_mut(node)?.wire_alias = Some(alias.into());
        Ok(())
    }

    /// Wire element name of a node.
    pub fn wire_name(&self, node: ItemId) -> Option<&str> {
        self.node(node).ok()?.wire_name.as_deref()
    }

    /// Alternate wire element name accepted for this node.
    pub fn node_wire_alias(&self, node: ItemId) -> Option<&str> {
        self.node(node).ok()?.wire_alias.as_deref()
    }

    /// Resolve a wire attribute name to a field of this node, checking the
    /// alias first and the declared name second.
    pub fn field_by_wire_name(&self, node: ItemId, wire: &str) -> Option<ItemId> {
        let n = self.node(node).ok()?;
        n.children.iter().find_map(|(_, id)| match self.item(*id) {
            Item::Field(f) if f.spec.wire_name() == wire || f.spec.name == wire => Some(*id),
            _ => None,
        })
    }

    /// Resolve a wire group name to a collection child of this node.
    pub fn collection_by_group(&self, node: ItemId, group: &str) -> Option<ItemId> {
        let n = self.node(node).ok()?;
        n.children.iter().find_map(|(_, id)| match self.item(*id) {
            Item::Collection(c) if c.template.name == group => Some(*id),
            _ => None,
        })
    }

    pub(crate) fn commit_node(&mut self, id: ItemId, loading: bool) {
        let children: Vec<ItemId> = match self.node(id) {
            Ok(n) => n.children.iter().map(|(_, c)| *c).collect(),
            Err(_) => return,
        };
        for child in children {
            self.commit_inner(child, loading);
        }
        let Ok(n) = self.node_mut(id) else { return };
        if n.state.is_changed() || loading {
            n.state = if loading {
                LifecycleState::Precommit
            } else {
                LifecycleState::Committed
            };
        }
    }

    pub(crate) fn reject_node(&mut self, id: ItemId) {
        let children: Vec<ItemId> = match self.node(id) {
            Ok(n) => n.children.iter().map(|(_, c)| *c).collect(),
            Err(_) => return,
        };
        for child in children {
            self.reject_inner(child);
        }
        let next = self.state(id).settle(self.any_child_changed(id));
        self.set_state(id, next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldSpec;
    use crate::value::TypeTag;

    fn raid_tree() -> (Tree, ItemId, ItemId, ItemId) {
        let mut tree = Tree::new();
        let root = tree.new_root("SystemConfiguration");
        let controller = tree
            .add_child_node(root, "RaidController", Some("Component"))
            .unwrap();
        tree.add_extra_attribute(controller, "FQDD", "RAID.Integrated.1-1")
            .unwrap();
        let reset = tree
            .add_field(
                controller,
                FieldSpec::new("RAIDresetConfig", TypeTag::Bool).default_on_delete("False"),
            )
            .unwrap();
        (tree, root, controller, reset)
    }

    #[test]
    fn test_child_lookup() {
        let (tree, root, controller, _) = raid_tree();
        assert_eq!(tree.child(root, "RaidController").unwrap(), controller);
        assert!(matches!(
            tree.child(root, "Nope"),
            Err(ModelError::NotFound { .. })
        ));
    }

    #[test]
    fn test_set_field_delegates() {
        let (mut tree, _, controller, reset) = raid_tree();
        tree.set_field(controller, "RAIDresetConfig", "True").unwrap();
        assert_eq!(tree.value_of(reset), Some(Value::Bool(true)));
        // Resolving a non-field child as a field fails
        let mut tree2 = Tree::new();
        let root2 = tree2.new_root("SystemConfiguration");
        tree2.add_child_node(root2, "Sub", None).unwrap();
        assert!(matches!(
            tree2.set_field(root2, "Sub", "x"),
            Err(ModelError::NotFound { .. })
        ));
    }

    #[test]
    fn test_dirty_propagation_three_levels() {
        let (mut tree, root, controller, _) = raid_tree();
        let enclosure = tree
            .add_child_node(controller, "Enclosure", Some("Component"))
            .unwrap();
        let slot = tree
            .add_field(enclosure, FieldSpec::new("SlotCount", TypeTag::Int))
            .unwrap();
        assert!(!tree.is_changed(root));
        tree.set_value(slot, 8i64).unwrap();
        assert!(tree.is_changed(enclosure));
        assert!(tree.is_changed(controller));
        assert!(tree.is_changed(root));
    }

    #[test]
    fn test_recursive_commit_and_reject() {
        let (mut tree, root, controller, reset) = raid_tree();
        tree.set_field(controller, "RAIDresetConfig", "False").unwrap();
        tree.commit(root);
        assert_eq!(tree.state(root), LifecycleState::Committed);

        tree.set_field(controller, "RAIDresetConfig", "True").unwrap();
        assert!(tree.is_changed(root));
        tree.reject(root);
        assert_eq!(tree.value_of(reset), Some(Value::Bool(false)));
        assert!(!tree.is_changed(root));
        assert_eq!(tree.state(root), LifecycleState::Committed);
    }

    #[test]
    fn test_reverting_only_change_settles_ancestors() {
        let (mut tree, root, controller, _) = raid_tree();
        tree.set_field(controller, "RAIDresetConfig", "False").unwrap();
        tree.commit(root);
        tree.set_field(controller, "RAIDresetConfig", "True").unwrap();
        assert!(tree.is_changed(root));
        tree.set_field(controller, "RAIDresetConfig", "False").unwrap();
        assert!(!tree.is_changed(root));
    }

    #[test]
    fn test_extra_attribute_upsert() {
        let (mut tree, _, controller, _) = raid_tree();
        assert_eq!(
            tree.extra_attribute(controller, "FQDD"),
            Some("RAID.Integrated.1-1")
        );
        tree.add_extra_attribute(controller, "FQDD", "RAID.Slot.2-1")
            .unwrap();
        assert_eq!(tree.extra_attribute(controller, "FQDD"), Some("RAID.Slot.2-1"));
        assert_eq!(tree.node(controller).unwrap().extra_attributes.len(), 1);

        tree.freeze(controller);
        assert!(matches!(
            tree.add_extra_attribute(controller, "FQDD", "RAID.Slot.3-1"),
            Err(ModelError::Immutable { .. })
        ));
    }
}
