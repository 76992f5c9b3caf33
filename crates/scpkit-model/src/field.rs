//! Scalar attribute fields
//!
//! A field is a single typed attribute with validation, dirty tracking
//! against a committed shadow value, and an optional wire alias. Composite
//! fields are read-only views joining several sibling fields into one
//! logical value.

use tracing::debug;

use crate::error::ModelError;
use crate::state::LifecycleState;
use crate::tree::{Item, ItemId, Tree};
use crate::value::{TypeTag, Value};

/// Static description of a field: name, declared type, and behavior flags.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub wire_alias: Option<String>,
    pub tag: TypeTag,
    /// Repeated `set` calls append comma-joined instead of replacing
    pub list: bool,
    pub modifiable: bool,
    /// May be reset to `default_on_delete` by callers
    pub deletable: bool,
    /// Applying a change to this field requires a device reboot
    pub reboot_required: bool,
    pub default_on_delete: Value,
    /// Sibling field names this composite joins; empty for plain fields
    pub composite_of: Vec<String>,
    /// Custom acceptance predicate run after type coercion
    pub validator: Option<fn(&Value) -> bool>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, tag: TypeTag) -> Self {
        Self {
            name: name.into(),
            wire_alias: None,
            tag,
            list: false,
            modifiable: true,
            deletable: false,
            reboot_required: false,
            default_on_delete: Value::Str(String::new()),
            composite_of: Vec::new(),
            validator: None,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.wire_alias = Some(alias.into());
        self
    }

    pub fn list(mut self) -> Self {
        self.list = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.modifiable = false;
        self
    }

    pub fn deletable(mut self) -> Self {
        self.deletable = true;
        self
    }

    pub fn reboot_required(mut self) -> Self {
        self.reboot_required = true;
        self
    }

    pub fn default_on_delete(mut self, value: impl Into<Value>) -> Self {
        self.default_on_delete = value.into();
        self
    }

    pub fn composite_of(mut self, sources: Vec<String>) -> Self {
        self.composite_of = sources;
        self
    }

    pub fn validator(mut self, validator: fn(&Value) -> bool) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn is_composite(&self) -> bool {
        !self.composite_of.is_empty()
    }

    /// Name used on the wire: the alias when present, else the field name.
    pub fn wire_name(&self) -> &str {
        self.wire_alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug)]
pub(crate) struct Field {
    pub(crate) spec: FieldSpec,
    pub(crate) value: Option<Value>,
    pub(crate) shadow: Option<Value>,
    pub(crate) slot_index: u32,
    pub(crate) frozen: bool,
    pub(crate) state: LifecycleState,
    pub(crate) owner: Option<ItemId>,
}

impl Field {
    pub(crate) fn new(spec: FieldSpec, owner: Option<ItemId>) -> Self {
        Self {
            spec,
            value: None,
            shadow: None,
            slot_index: 0,
            frozen: false,
            state: LifecycleState::Uninitialized,
            owner,
        }
    }

    /// State after a successful write in the current state.
    fn written_state(&self) -> LifecycleState {
        match self.state {
            LifecycleState::Uninitialized
            | LifecycleState::Precommit
            | LifecycleState::Initializing => LifecycleState::Initializing,
            LifecycleState::Committed | LifecycleState::Changing => {
                if self.value != self.shadow {
                    LifecycleState::Changing
                } else {
                    LifecycleState::Committed
                }
            }
        }
    }
}

impl Tree {
    /// Add a field under a node. The child name is the spec's name.
    pub fn add_field(&mut self, node: ItemId, spec: FieldSpec) -> Result<ItemId, ModelError> {
        let name = spec.name.clone();
        if self.node(node)?.children.iter().any(|(n, _)| n == &name) {
            return Err(ModelError::Validation {
                name,
                reason: "duplicate child name".to_string(),
            });
        }
        let slot = self.node(node)?.slot_index;
        let mut field = Field::new(spec, Some(node));
        field.slot_index = slot;
        let id = self.insert(Item::Field(field));
        self.node_mut(node)?.children.push((name, id));
        Ok(id)
    }

    /// Write a value to a field, coercing it to the declared type.
    ///
    /// Returns `Ok(true)` when the value was applied. List-typed fields
    /// append comma-joined on repeated writes.
    pub fn set_value(
        &mut self,
        id: ItemId,
        value: impl Into<Value>,
    ) -> Result<bool, ModelError> {
        let coerced = {
            let f = self.field(id)?;
            self.guard_write(f)?;
            let coerced = f.spec.tag.coerce(&f.spec.name, value.into())?;
            if let Some(validate) = f.spec.validator {
                if !validate(&coerced) {
                    return Err(ModelError::Validation {
                        name: f.spec.name.clone(),
                        reason: "rejected by validator".to_string(),
                    });
                }
            }
            if f.spec.list {
                match &f.value {
                    Some(current) => {
                        Value::Str(format!("{},{}", current.as_wire(), coerced.as_wire()))
                    }
                    None => coerced,
                }
            } else {
                coerced
            }
        };
        self.apply_write(id, Some(coerced));
        Ok(true)
    }

    /// Write an optional value; a null value is a no-op, never a clear.
    pub fn set_value_opt(
        &mut self,
        id: ItemId,
        value: Option<Value>,
    ) -> Result<bool, ModelError> {
        match value {
            Some(v) => self.set_value(id, v),
            None => Ok(false),
        }
    }

    /// Clear a field's value without type-checking (used before a
    /// controlled re-set). Transitions state exactly as a write does.
    pub fn nullify(&mut self, id: ItemId) -> Result<(), ModelError> {
        {
            let f = self.field(id)?;
            self.guard_write(f)?;
        }
        self.apply_write(id, None);
        Ok(())
    }

    /// Reset a deletable field to its delete default.
    pub fn clear_to_default(&mut self, id: ItemId) -> Result<(), ModelError> {
        let default = {
            let f = self.field(id)?;
            if !f.spec.deletable {
                return Err(ModelError::Validation {
                    name: f.spec.name.clone(),
                    reason: "field is not deletable".to_string(),
                });
            }
            self.guard_write(f)?;
            f.spec.default_on_delete.clone()
        };
        self.apply_write(id, Some(default));
        Ok(())
    }

    fn guard_write(&self, f: &Field) -> Result<(), ModelError> {
        if f.frozen {
            return Err(ModelError::Immutable {
                name: f.spec.name.clone(),
                reason: "frozen".to_string(),
                state: f.state,
            });
        }
        if f.spec.is_composite() {
            return Err(ModelError::CompositeWrite {
                name: f.spec.name.clone(),
            });
        }
        if !f.spec.modifiable
            && matches!(
                f.state,
                LifecycleState::Committed | LifecycleState::Changing
            )
        {
            return Err(ModelError::Immutable {
                name: f.spec.name.clone(),
                reason: "not modifiable once committed".to_string(),
                state: f.state,
            });
        }
        Ok(())
    }

    fn apply_write(&mut self, id: ItemId, value: Option<Value>) {
        let (previous, next) = {
            // Guarded by the caller; the handle is known to be a field.
            let Item::Field(f) = self.item_mut(id) else {
                return;
            };
            f.value = value;
            let previous = f.state;
            let next = f.written_state();
            f.state = next;
            (previous, next)
        };
        if next != previous {
            debug!(item = %id, ?previous, ?next, "field written");
            self.notify_owner(id);
        }
    }

    /// Current value of a field; composite fields join their sources.
    pub fn value_of(&self, id: ItemId) -> Option<Value> {
        let f = self.field(id).ok()?;
        if !f.spec.is_composite() {
            return f.value.clone();
        }
        let owner = f.owner?;
        let parts: Vec<String> = f
            .spec
            .composite_of
            .iter()
            .filter_map(|source| {
                let child = self.child(owner, source).ok()?;
                self.value_of(child).map(|v| v.as_wire())
            })
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(Value::Str(parts.join(",")))
        }
    }

    /// Last committed value of a field.
    pub fn shadow_of(&self, id: ItemId) -> Option<Value> {
        self.field(id).ok().and_then(|f| f.shadow.clone())
    }

    pub(crate) fn commit_field(&mut self, id: ItemId, loading: bool) {
        let Ok(f) = self.field_mut(id) else { return };
        if f.state.is_changed() || loading {
            f.shadow = f.value.clone();
            f.state = if loading {
                LifecycleState::Precommit
            } else {
                LifecycleState::Committed
            };
        }
    }

    pub(crate) fn reject_field(&mut self, id: ItemId) {
        let Ok(f) = self.field_mut(id) else { return };
        if f.state.is_changed() {
            if f.shadow.is_none() {
                f.value = None;
                f.state = LifecycleState::Uninitialized;
            } else {
                f.value = f.shadow.clone();
                f.state = LifecycleState::Committed;
            }
        }
    }
}
