//! Repeating groups: ordered, key-unique, slot-indexed sets of nodes
//!
//! One collection models one device-side repeating group (a controller's
//! virtual disks, a NIC's partitions). Entries are nodes stamped out from a
//! data template, addressed by slot indices drawn from a bounded pool, and
//! optionally keyed for uniqueness (FQDD-style keys).

use std::collections::{HashMap, HashSet};

use scpkit_expr::{ExprValue, Scope};
use tracing::{debug, warn};

use crate::error::ModelError;
use crate::field::FieldSpec;
use crate::node::Node;
use crate::pool::IndexPool;
use crate::state::LifecycleState;
use crate::tree::{Item, ItemId, Tree};
use crate::value::Value;

/// Data template a collection stamps entries from.
///
/// The template's name doubles as the wire group name: entry fields render
/// as `{name}.{slot}#{field}` attributes on the enclosing component.
#[derive(Debug, Clone)]
pub struct GroupTemplate {
    pub name: String,
    pub min_index: u32,
    pub max_index: u32,
    /// Field names whose joined values form an entry's uniqueness key
    pub key_fields: Vec<String>,
    pub fields: Vec<FieldSpec>,
}

impl GroupTemplate {
    pub fn new(name: impl Into<String>, min_index: u32, max_index: u32) -> Self {
        Self {
            name: name.into(),
            min_index,
            max_index,
            key_fields: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn key(mut self, fields: Vec<String>) -> Self {
        self.key_fields = fields;
        self
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }
}

#[derive(Debug)]
pub(crate) struct Collection {
    pub(crate) template: GroupTemplate,
    pub(crate) pool: IndexPool,
    /// Live entries, sorted by slot index
    pub(crate) entries: Vec<ItemId>,
    pub(crate) key_index: HashMap<String, ItemId>,
    /// Entries created since the last commit; dropped on reject
    pub(crate) fresh: Vec<ItemId>,
    /// Entries removed since the last commit; restored on reject
    pub(crate) removed: Vec<ItemId>,
    pub(crate) frozen: bool,
    pub(crate) state: LifecycleState,
    pub(crate) owner: Option<ItemId>,
}

impl Tree {
    /// Add a repeating group under a node. The child name is the template's
    /// group name.
    pub fn add_group(
        &mut self,
        node: ItemId,
        template: GroupTemplate,
    ) -> Result<ItemId, ModelError> {
        let name = template.name.clone();
        if self.node(node)?.children.iter().any(|(n, _)| n == &name) {
            return Err(ModelError::Validation {
                name,
                reason: "duplicate child name".to_string(),
            });
        }
        let pool = IndexPool::new(template.min_index, template.max_index);
        let id = self.insert(Item::Collection(Collection {
            template,
            pool,
            entries: Vec::new(),
            key_index: HashMap::new(),
            fresh: Vec::new(),
            removed: Vec::new(),
            frozen: false,
            state: LifecycleState::Uninitialized,
            owner: Some(node),
        }));
        self.node_mut(node)?.children.push((name, id));
        Ok(id)
    }

    /// Create an entry, allocating the smallest free slot index or consuming
    /// an explicitly supplied one.
    ///
    /// Auto-indexed creation enforces key uniqueness; explicit-index
    /// creation bypasses it for wire-driven population, where duplicates are
    /// cleaned up by [`Tree::clear_duplicates`] before the first commit.
    pub fn create(
        &mut self,
        coll: ItemId,
        index: Option<u32>,
        fields: &[(&str, Value)],
    ) -> Result<ItemId, ModelError> {
        let (template, frozen) = {
            let c = self.collection(coll)?;
            (c.template.clone(), c.frozen)
        };
        if frozen {
            return Err(ModelError::Immutable {
                name: template.name.clone(),
                reason: "frozen".to_string(),
                state: self.state(coll),
            });
        }
        if index.is_none() && !template.key_fields.is_empty() {
            let key = prospective_key(&template.key_fields, fields);
            if !key.is_empty() && self.collection(coll)?.key_index.contains_key(&key) {
                return Err(ModelError::DuplicateKey { key });
            }
        }
        let slot = {
            let c = self.collection_mut(coll)?;
            match index {
                Some(i) => c.pool.take(i)?,
                None => c.pool.next()?,
            }
        };
        match self.build_entry(coll, &template, slot, fields) {
            Ok(entry) => {
                debug!(group = %template.name, slot, "entry created");
                let pending = self.state(coll).absorb(LifecycleState::Changing);
                self.child_state_changed_self(coll, pending);
                Ok(entry)
            }
            Err(e) => {
                // A failed create is fully rejected: hand the slot back.
                if let Ok(c) = self.collection_mut(coll) {
                    c.pool.release(slot);
                }
                Err(e)
            }
        }
    }

    fn build_entry(
        &mut self,
        coll: ItemId,
        template: &GroupTemplate,
        slot: u32,
        fields: &[(&str, Value)],
    ) -> Result<ItemId, ModelError> {
        let mut node = Node::new(Some(template.name.clone()), None);
        node.slot_index = slot;
        let entry = self.insert(Item::Node(node));
        for spec in &template.fields {
            self.add_field(entry, spec.clone())?;
        }
        // Populate before attaching: a validation failure leaves the
        // collection untouched.
        for (name, value) in fields {
            self.set_field(entry, name, value.clone())?;
        }
        self.node_mut(entry)?.owner = Some(coll);
        let key = self.entry_key(coll, entry);
        let c = self.collection_mut(coll)?;
        c.entries.push(entry);
        c.fresh.push(entry);
        if !key.is_empty() {
            c.key_index.entry(key).or_insert(entry);
        }
        self.sort_entries(coll);
        Ok(entry)
    }

    /// Set own state and propagate to the owner chain.
    fn child_state_changed_self(&mut self, id: ItemId, next: LifecycleState) {
        if next != self.state(id) {
            self.set_state(id, next);
            self.notify_owner(id);
        }
    }

    /// Joined key-field values of an entry; empty when the group is keyless
    /// or every key field is unset.
    pub(crate) fn entry_key(&self, coll: ItemId, entry: ItemId) -> String {
        let Ok(c) = self.collection(coll) else {
            return String::new();
        };
        if c.template.key_fields.is_empty() {
            return String::new();
        }
        let parts: Vec<String> = c
            .template
            .key_fields
            .iter()
            .map(|name| {
                self.field_value(entry, name)
                    .ok()
                    .flatten()
                    .map(|v| v.as_wire())
                    .unwrap_or_default()
            })
            .collect();
        if parts.iter().all(|p| p.is_empty()) {
            String::new()
        } else {
            parts.join("#")
        }
    }

    fn sort_entries(&mut self, coll: ItemId) {
        let Ok(c) = self.collection(coll) else { return };
        let mut pairs: Vec<(u32, ItemId)> = c
            .entries
            .iter()
            .map(|e| (self.slot_index(*e), *e))
            .collect();
        pairs.sort_by_key(|(slot, _)| *slot);
        if let Ok(c) = self.collection_mut(coll) {
            c.entries = pairs.into_iter().map(|(_, e)| e).collect();
        }
    }

    /// Live entries, sorted by slot index.
    pub fn entries(&self, coll: ItemId) -> Result<&[ItemId], ModelError> {
        Ok(&self.collection(coll)?.entries)
    }

    /// Entry occupying the given slot index.
    pub fn entry_at(&self, coll: ItemId, index: u32) -> Option<ItemId> {
        self.collection(coll)
            .ok()?
            .entries
            .iter()
            .copied()
            .find(|e| self.slot_index(*e) == index)
    }

    /// Entry occupying the given slot, created empty when absent (used
    /// while parsing wire documents that reference groups by index).
    pub fn find_or_create(&mut self, coll: ItemId, index: u32) -> Result<ItemId, ModelError> {
        match self.entry_at(coll, index) {
            Some(entry) => Ok(entry),
            None => self.create(coll, Some(index), &[]),
        }
    }

    /// Entries whose named fields all equal the given values (wire-form
    /// comparison).
    pub fn find(&self, coll: ItemId, criteria: &[(&str, Value)]) -> Vec<ItemId> {
        let Ok(c) = self.collection(coll) else {
            return Vec::new();
        };
        c.entries
            .iter()
            .copied()
            .filter(|e| self.entry_matches(*e, criteria))
            .collect()
    }

    /// First entry matching the criteria.
    pub fn find_first(&self, coll: ItemId, criteria: &[(&str, Value)]) -> Option<ItemId> {
        self.find(coll, criteria).into_iter().next()
    }

    fn entry_matches(&self, entry: ItemId, criteria: &[(&str, Value)]) -> bool {
        criteria.iter().all(|(name, expected)| {
            self.field_value(entry, name)
                .ok()
                .flatten()
                .map(|v| v.as_wire() == expected.as_wire())
                .unwrap_or(false)
        })
    }

    /// Entries matching a filter expression.
    ///
    /// The expression must parse; an entry the expression cannot be
    /// resolved against (unknown field, missing parent) is treated as a
    /// non-match and logged, never an evaluation of arbitrary code.
    pub fn find_matching(&self, coll: ItemId, expression: &str) -> Result<Vec<ItemId>, ModelError> {
        let expr = scpkit_expr::compile(expression)?;
        let c = self.collection(coll)?;
        let mut matched = Vec::new();
        for entry in c.entries.iter().copied() {
            let scope = EntryScope { tree: self, id: entry };
            match scpkit_expr::eval(&expr, &scope) {
                Ok(true) => matched.push(entry),
                Ok(false) => {}
                Err(e) => {
                    warn!(group = %c.template.name, entry = %entry, error = %e,
                        "filter expression did not resolve; treating as no match");
                }
            }
        }
        Ok(matched)
    }

    /// Remove entries matching the criteria; returns the removed entries.
    /// Their slot indices go back to the pool and `reject` restores them.
    pub fn remove(
        &mut self,
        coll: ItemId,
        criteria: &[(&str, Value)],
    ) -> Result<Vec<ItemId>, ModelError> {
        let victims = self.find(coll, criteria);
        self.detach_all(coll, &victims)?;
        Ok(victims)
    }

    /// Remove entries matching a filter expression.
    pub fn remove_matching(
        &mut self,
        coll: ItemId,
        expression: &str,
    ) -> Result<Vec<ItemId>, ModelError> {
        let victims = self.find_matching(coll, expression)?;
        self.detach_all(coll, &victims)?;
        Ok(victims)
    }

    fn detach_all(&mut self, coll: ItemId, victims: &[ItemId]) -> Result<(), ModelError> {
        if victims.is_empty() {
            return Ok(());
        }
        {
            let c = self.collection(coll)?;
            if c.frozen {
                return Err(ModelError::Immutable {
                    name: c.template.name.clone(),
                    reason: "frozen".to_string(),
                    state: c.state,
                });
            }
        }
        for victim in victims {
            self.detach_entry(coll, *victim)?;
        }
        let pending = self.state(coll).absorb(LifecycleState::Changing);
        self.child_state_changed_self(coll, pending);
        Ok(())
    }

    fn detach_entry(&mut self, coll: ItemId, entry: ItemId) -> Result<(), ModelError> {
        let slot = self.slot_index(entry);
        let c = self.collection_mut(coll)?;
        c.entries.retain(|e| *e != entry);
        c.key_index.retain(|_, v| *v != entry);
        c.pool.release(slot);
        if let Some(pos) = c.fresh.iter().position(|e| *e == entry) {
            // Never committed: gone for good, nothing to restore on reject.
            c.fresh.remove(pos);
        } else {
            c.removed.push(entry);
        }
        debug!(group = %c.template.name, slot, "entry removed");
        Ok(())
    }

    /// Drop entries whose key is empty or already seen, keeping the first
    /// occurrence. Used once after bulk wire-load, before the first commit.
    pub fn clear_duplicates(&mut self, coll: ItemId) -> Result<Vec<ItemId>, ModelError> {
        let entries = self.collection(coll)?.entries.clone();
        if self.collection(coll)?.template.key_fields.is_empty() {
            return Ok(Vec::new());
        }
        let mut seen: HashSet<String> = HashSet::new();
        let mut victims = Vec::new();
        for entry in entries {
            let key = self.entry_key(coll, entry);
            if key.is_empty() || !seen.insert(key) {
                victims.push(entry);
            }
        }
        self.detach_all(coll, &victims)?;
        self.rebuild_key_index(coll);
        Ok(victims)
    }

    fn rebuild_key_index(&mut self, coll: ItemId) {
        let Ok(c) = self.collection(coll) else { return };
        let entries = c.entries.clone();
        let mut index: HashMap<String, ItemId> = HashMap::new();
        for entry in entries {
            let key = self.entry_key(coll, entry);
            if !key.is_empty() {
                index.entry(key).or_insert(entry);
            }
        }
        if let Ok(c) = self.collection_mut(coll) {
            c.key_index = index;
        }
    }

    /// Retire a slot index forever (hardware will never reuse the slot).
    pub fn reserve_index_permanently(&mut self, coll: ItemId, index: u32) -> Result<(), ModelError> {
        self.collection_mut(coll)?.pool.reserve_permanently(index);
        Ok(())
    }

    /// True when the group can still allocate a slot.
    pub fn has_free_index(&self, coll: ItemId) -> bool {
        self.collection(coll)
            .map(|c| c.pool.has_free())
            .unwrap_or(false)
    }

    pub(crate) fn commit_collection(&mut self, id: ItemId, loading: bool) {
        let entries = match self.collection(id) {
            Ok(c) => c.entries.clone(),
            Err(_) => return,
        };
        for entry in entries {
            self.commit_inner(entry, loading);
        }
        let Ok(c) = self.collection_mut(id) else { return };
        c.fresh.clear();
        c.removed.clear();
        if c.state.is_changed() || loading {
            c.state = if loading {
                LifecycleState::Precommit
            } else {
                LifecycleState::Committed
            };
        }
    }

    pub(crate) fn reject_collection(&mut self, id: ItemId) {
        let (fresh, removed) = match self.collection_mut(id) {
            Ok(c) => (std::mem::take(&mut c.fresh), std::mem::take(&mut c.removed)),
            Err(_) => return,
        };
        // Entries created since the last commit never existed in the
        // snapshot: drop them and free their slots.
        for entry in fresh {
            let slot = self.slot_index(entry);
            if let Ok(c) = self.collection_mut(id) {
                c.entries.retain(|e| *e != entry);
                c.key_index.retain(|_, v| *v != entry);
                c.pool.release(slot);
            }
        }
        // Entries removed since the last commit come back, re-taking their
        // slots.
        for entry in removed {
            let slot = self.slot_index(entry);
            if let Ok(c) = self.collection_mut(id) {
                if let Err(e) = c.pool.take(slot) {
                    warn!(slot, error = %e, "slot no longer free while restoring entry");
                }
                c.entries.push(entry);
            }
        }
        self.sort_entries(id);
        let entries = match self.collection(id) {
            Ok(c) => c.entries.clone(),
            Err(_) => return,
        };
        for entry in entries {
            self.reject_inner(entry);
        }
        self.rebuild_key_index(id);
        let next = self.state(id).settle(self.any_child_changed(id));
        self.set_state(id, next);
    }
}

fn prospective_key(key_fields: &[String], fields: &[(&str, Value)]) -> String {
    let parts: Vec<String> = key_fields
        .iter()
        .map(|name| {
            fields
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.as_wire())
                .unwrap_or_default()
        })
        .collect();
    if parts.iter().all(|p| p.is_empty()) {
        String::new()
    } else {
        parts.join("#")
    }
}

/// Expression-evaluation scope over one collection entry.
struct EntryScope<'a> {
    tree: &'a Tree,
    id: ItemId,
}

impl Scope for EntryScope<'_> {
    fn field(&self, name: &str) -> Option<ExprValue> {
        let child = self.tree.child(self.id, name).ok()?;
        match self.tree.item(child) {
            Item::Field(_) => self.tree.value_of(child).map(|v| match v {
                Value::Str(s) => ExprValue::Str(s),
                Value::Int(i) => ExprValue::Int(i),
                Value::Bool(b) => ExprValue::Bool(b),
            }),
            _ => None,
        }
    }

    fn parent(&self) -> Option<Box<dyn Scope + '_>> {
        let mut current = self.tree.owner_of(self.id)?;
        loop {
            match self.tree.item(current) {
                Item::Node(_) => {
                    return Some(Box::new(EntryScope {
                        tree: self.tree,
                        id: current,
                    }))
                }
                _ => current = self.tree.owner_of(current)?,
            }
        }
    }
}
