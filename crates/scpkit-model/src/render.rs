//! Wire-fragment rendering
//!
//! Walks a subtree into a document fragment: elements for nodes, attribute
//! lines for fields. A delta dump (`everything == false`) carries only
//! changed attributes and is the default change-submission payload; a
//! deleted dump substitutes each field's delete default. Fields of a
//! repeating-group entry render as `{Group}.{Slot}#{Field}` lines on the
//! enclosing element, and an element that would be empty is never produced.

use crate::field::Field;
use crate::tree::{Item, ItemId, Tree};

/// One `<Attribute Name="...">value</Attribute>` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrLine {
    pub name: String,
    pub value: String,
}

/// A rendered element: name, element attributes, attribute lines, nested
/// elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub lines: Vec<AttrLine>,
    pub children: Vec<Fragment>,
}

impl Tree {
    /// Render the subtree rooted at a node.
    ///
    /// `everything` selects a full dump over the default delta dump;
    /// `deleted` renders delete defaults for modifiable fields. Returns
    /// `None` when nothing would be emitted.
    pub fn render(&self, id: ItemId, everything: bool, deleted: bool) -> Option<Fragment> {
        match self.item(id) {
            Item::Node(_) => self.render_node(id, None, everything, deleted),
            _ => None,
        }
    }

    fn render_node(
        &self,
        id: ItemId,
        name_hint: Option<&str>,
        everything: bool,
        deleted: bool,
    ) -> Option<Fragment> {
        let n = self.node(id).ok()?;
        let element_name = n
            .wire_name
            .as_deref()
            .or(name_hint)
            .unwrap_or("Component")
            .to_string();
        let attributes: Vec<(String, String)> = n
            .extra_attributes
            .iter()
            .filter(|(name, _)| !n.excluded_attributes.contains(name))
            .cloned()
            .collect();
        let mut lines = Vec::new();
        let mut children = Vec::new();
        for (child_name, child_id) in &n.children {
            if n.excluded_fields.contains(child_name) {
                continue;
            }
            match self.item(*child_id) {
                Item::Field(f) => {
                    lines.extend(self.render_field(f, None, everything, deleted));
                }
                Item::Node(_) => {
                    if let Some(fragment) =
                        self.render_node(*child_id, Some(child_name), everything, deleted)
                    {
                        children.push(fragment);
                    }
                }
                Item::Collection(c) => {
                    for entry in &c.entries {
                        let Ok(entry_node) = self.node(*entry) else {
                            continue;
                        };
                        for (field_name, field_id) in &entry_node.children {
                            if entry_node.excluded_fields.contains(field_name) {
                                continue;
                            }
                            if let Item::Field(f) = self.item(*field_id) {
                                lines.extend(self.render_field(
                                    f,
                                    Some((&c.template.name, entry_node.slot_index)),
                                    everything,
                                    deleted,
                                ));
                            }
                        }
                    }
                }
            }
        }
        if lines.is_empty() && children.is_empty() {
            return None;
        }
        Some(Fragment {
            name: element_name,
            attributes,
            lines,
            children,
        })
    }

    fn render_field(
        &self,
        f: &Field,
        group: Option<(&str, u32)>,
        everything: bool,
        deleted: bool,
    ) -> Vec<AttrLine> {
        // Composites are client-side views; their sources render instead.
        if f.spec.is_composite() {
            return Vec::new();
        }
        if !everything && !f.state.is_changed() {
            return Vec::new();
        }
        // A never-writable field cannot be deleted either.
        if deleted && !f.spec.modifiable {
            return Vec::new();
        }
        let value = if deleted {
            Some(f.spec.default_on_delete.clone())
        } else {
            f.value.clone()
        };
        let Some(value) = value else {
            return Vec::new();
        };
        let base = f.spec.wire_name();
        let name = match group {
            Some((group_name, slot)) => format!("{}.{}#{}", group_name, slot, base),
            None => base.to_string(),
        };
        if f.spec.list {
            value
                .as_wire()
                .split(',')
                .map(|part| AttrLine {
                    name: name.clone(),
                    value: part.to_string(),
                })
                .collect()
        } else {
            vec![AttrLine {
                name,
                value: value.as_wire(),
            }]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::GroupTemplate;
    use crate::field::FieldSpec;
    use crate::value::{TypeTag, Value};

    fn sample_tree() -> (Tree, ItemId) {
        let mut tree = Tree::new();
        let root = tree.new_root("SystemConfiguration");
        let controller = tree
            .add_child_node(root, "RaidController", Some("Component"))
            .unwrap();
        tree.add_extra_attribute(controller, "FQDD", "RAID.Integrated.1-1")
            .unwrap();
        tree.add_field(
            controller,
            FieldSpec::new("RAIDresetConfig", TypeTag::Bool).default_on_delete("False"),
        )
        .unwrap();
        let vds = tree
            .add_group(
                controller,
                GroupTemplate::new("VirtualDisk", 1, 4)
                    .key(vec!["Name".into()])
                    .field(FieldSpec::new("Name", TypeTag::Str))
                    .field(FieldSpec::new(
                        "RAIDaction",
                        TypeTag::Enum(vec!["Create".into(), "Delete".into()]),
                    ))
                    .field(FieldSpec::new("IncludedDisks", TypeTag::Str).list()),
            )
            .unwrap();
        tree.set_field(controller, "RAIDresetConfig", "False").unwrap();
        tree.create(
            vds,
            None,
            &[
                ("Name", Value::Str("vd0".into())),
                ("RAIDaction", Value::Str("Create".into())),
            ],
        )
        .unwrap();
        (tree, root)
    }

    #[test]
    fn test_full_dump_structure() {
        let (tree, root) = sample_tree();
        let fragment = tree.render(root, true, false).unwrap();
        assert_eq!(fragment.name, "SystemConfiguration");
        assert_eq!(fragment.children.len(), 1);
        let component = &fragment.children[0];
        assert_eq!(component.name, "Component");
        assert_eq!(
            component.attributes,
            vec![("FQDD".to_string(), "RAID.Integrated.1-1".to_string())]
        );
        let names: Vec<&str> = component.lines.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["RAIDresetConfig", "VirtualDisk.1#Name", "VirtualDisk.1#RAIDaction"]);
    }

    #[test]
    fn test_delta_dump_only_changes() {
        let (mut tree, root) = sample_tree();
        tree.commit(root);
        assert!(tree.render(root, false, false).is_none());

        let controller = tree.child(root, "RaidController").unwrap();
        tree.set_field(controller, "RAIDresetConfig", "True").unwrap();
        let fragment = tree.render(root, false, false).unwrap();
        let component = &fragment.children[0];
        assert_eq!(component.lines.len(), 1);
        assert_eq!(component.lines[0].name, "RAIDresetConfig");
        assert_eq!(component.lines[0].value, "True");
    }

    #[test]
    fn test_list_fields_render_one_line_per_element() {
        let (mut tree, root) = sample_tree();
        let controller = tree.child(root, "RaidController").unwrap();
        let vds = tree.child(controller, "VirtualDisk").unwrap();
        let entry = tree.entries(vds).unwrap()[0];
        tree.set_field(entry, "IncludedDisks", "Disk.0").unwrap();
        tree.set_field(entry, "IncludedDisks", "Disk.1").unwrap();
        let fragment = tree.render(root, true, false).unwrap();
        let disk_lines: Vec<&AttrLine> = fragment.children[0]
            .lines
            .iter()
            .filter(|l| l.name == "VirtualDisk.1#IncludedDisks")
            .collect();
        assert_eq!(disk_lines.len(), 2);
        assert_eq!(disk_lines[0].value, "Disk.0");
        assert_eq!(disk_lines[1].value, "Disk.1");
    }

    #[test]
    fn test_deleted_dump_uses_defaults() {
        let (mut tree, root) = sample_tree();
        let controller = tree.child(root, "RaidController").unwrap();
        tree.add_field(
            controller,
            FieldSpec::new("SerialNumber", TypeTag::Str).read_only(),
        )
        .unwrap();
        let fragment = tree.render(root, true, true).unwrap();
        let component = &fragment.children[0];
        let reset = component
            .lines
            .iter()
            .find(|l| l.name == "RAIDresetConfig")
            .unwrap();
        assert_eq!(reset.value, "False");
        // Never-writable fields are skipped in deleted dumps
        assert!(component.lines.iter().all(|l| l.name != "SerialNumber"));
    }

    #[test]
    fn test_excluded_names_never_emitted() {
        let (mut tree, root) = sample_tree();
        let controller = tree.child(root, "RaidController").unwrap();
        tree.exclude_field(controller, "RAIDresetConfig").unwrap();
        tree.exclude_attribute(controller, "FQDD").unwrap();
        let fragment = tree.render(root, true, false).unwrap();
        let component = &fragment.children[0];
        assert!(component.attributes.is_empty());
        assert!(component.lines.iter().all(|l| l.name != "RAIDresetConfig"));
    }

    #[test]
    fn test_empty_elements_omitted() {
        let mut tree = Tree::new();
        let root = tree.new_root("SystemConfiguration");
        let component = tree
            .add_child_node(root, "Idrac", Some("Component"))
            .unwrap();
        tree.add_field(component, FieldSpec::new("NTPEnable", TypeTag::Bool))
            .unwrap();
        // Nothing set anywhere: no fragment at all
        assert!(tree.render(root, true, false).is_none());
    }

    #[test]
    fn test_wire_alias_used_for_field_names() {
        let mut tree = Tree::new();
        let root = tree.new_root("SystemConfiguration");
        let component = tree
            .add_child_node(root, "Idrac", Some("Component"))
            .unwrap();
        let f = tree
            .add_field(
                component,
                FieldSpec::new("ntp_enable", TypeTag::Bool).alias("NTPEnable.1"),
            )
            .unwrap();
        tree.set_value(f, true).unwrap();
        let fragment = tree.render(root, true, false).unwrap();
        assert_eq!(fragment.children[0].lines[0].name, "NTPEnable.1");
    }
}
