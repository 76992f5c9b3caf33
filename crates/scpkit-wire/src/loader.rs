//! Applying parsed documents to a configuration tree
//!
//! The loader walks a parsed document against a schema-built tree,
//! resolving components by FQDD and attribute names through wire aliases.
//! Unknown names are reported and skipped rather than aborting the load,
//! matching how devices tolerate profiles exported from newer firmware.
//! The load finishes with per-group duplicate elimination and a bulk-load
//! commit that leaves the whole tree in `Precommit`.

use scpkit_model::{ItemId, ItemKind, Tree};
use tracing::{debug, info, warn};

use crate::document::{ScpComponent, ScpDocument};
use crate::WireError;

/// Outcome of a document load.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Attribute lines applied to the tree
    pub applied: usize,
    /// Names that could not be resolved or values that failed validation
    pub skipped: Vec<String>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Apply a parsed document to a schema-built tree and commit it as loaded.
pub fn load_document(
    tree: &mut Tree,
    root: ItemId,
    document: &ScpDocument,
) -> Result<LoadReport, WireError> {
    let mut report = LoadReport::default();
    for component in &document.components {
        match resolve_component(tree, root, component) {
            Some(node) => apply_component(tree, node, component, &mut report),
            None => {
                let label = component
                    .fqdd()
                    .unwrap_or(component.element.as_str())
                    .to_string();
                warn!(component = %label, "unknown component skipped");
                report.skipped.push(label);
            }
        }
    }
    clear_group_duplicates(tree, root);
    tree.commit_as_loaded(root);
    info!(
        applied = report.applied,
        skipped = report.skipped.len(),
        "document loaded"
    );
    Ok(report)
}

fn resolve_component(tree: &Tree, parent: ItemId, component: &ScpComponent) -> Option<ItemId> {
    let children: Vec<ItemId> = tree
        .children(parent)
        .ok()?
        .iter()
        .map(|(_, id)| *id)
        .filter(|id| tree.kind(*id) == ItemKind::Node)
        .collect();
    if let Some(fqdd) = component.fqdd() {
        return children
            .into_iter()
            .find(|id| tree.extra_attribute(*id, "FQDD") == Some(fqdd));
    }
    // Without an FQDD, fall back to the element name or its alias.
    children.into_iter().find(|id| {
        tree.wire_name(*id) == Some(component.element.as_str())
            || tree
                .node_wire_alias(*id)
                .is_some_and(|alias| alias == component.element)
    })
}

fn apply_component(
    tree: &mut Tree,
    node: ItemId,
    component: &ScpComponent,
    report: &mut LoadReport,
) {
    for attribute in &component.fields {
        let outcome = match attribute.grouped() {
            Some((group, index, field)) => {
                apply_grouped(tree, node, group, index, field, &attribute.value)
            }
            None => apply_plain(tree, node, &attribute.name, &attribute.value),
        };
        match outcome {
            Ok(()) => report.applied += 1,
            Err(reason) => {
                warn!(attribute = %attribute.name, %reason, "attribute skipped");
                report
                    .skipped
                    .push(format!("{}: {}", attribute.name, reason));
            }
        }
    }
    for child in &component.children {
        match resolve_component(tree, node, child) {
            Some(child_node) => apply_component(tree, child_node, child, report),
            None => {
                let label = child.fqdd().unwrap_or(child.element.as_str()).to_string();
                warn!(component = %label, "unknown nested component skipped");
                report.skipped.push(label);
            }
        }
    }
}

fn apply_plain(tree: &mut Tree, node: ItemId, name: &str, value: &str) -> Result<(), String> {
    let field = tree
        .field_by_wire_name(node, name)
        .ok_or_else(|| "unknown attribute".to_string())?;
    tree.set_value(field, value).map_err(|e| e.to_string())?;
    debug!(attribute = %name, "attribute applied");
    Ok(())
}

fn apply_grouped(
    tree: &mut Tree,
    node: ItemId,
    group: &str,
    index: u32,
    field: &str,
    value: &str,
) -> Result<(), String> {
    let collection = tree
        .collection_by_group(node, group)
        .ok_or_else(|| format!("unknown group '{}'", group))?;
    let entry = tree
        .find_or_create(collection, index)
        .map_err(|e| e.to_string())?;
    let field_id = tree
        .field_by_wire_name(entry, field)
        .ok_or_else(|| format!("unknown attribute in group '{}'", group))?;
    tree.set_value(field_id, value).map_err(|e| e.to_string())?;
    debug!(group, index, attribute = %field, "group attribute applied");
    Ok(())
}

fn clear_group_duplicates(tree: &mut Tree, node: ItemId) {
    let children: Vec<ItemId> = match tree.children(node) {
        Ok(children) => children.iter().map(|(_, id)| *id).collect(),
        Err(_) => return,
    };
    for child in children {
        match tree.kind(child) {
            ItemKind::Collection => {
                if let Ok(dropped) = tree.clear_duplicates(child) {
                    if !dropped.is_empty() {
                        debug!(count = dropped.len(), "duplicate group entries dropped");
                    }
                }
            }
            ItemKind::Node => clear_group_duplicates(tree, child),
            ItemKind::Field => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::parse_document;
    use scpkit_model::{LifecycleState, SchemaDoc, Value};

    fn raid_schema() -> SchemaDoc {
        SchemaDoc::from_toml(
            r#"
[[component]]
fqdd = "RAID.Integrated.1-1"

  [[component.attribute]]
  name = "RAIDresetConfig"
  kind = "enum"
  values = ["True", "False"]

  [[component.group]]
  name = "VirtualDisk"
  max_index = 4
  key = ["Name"]

    [[component.group.attribute]]
    name = "Name"

    [[component.group.attribute]]
    name = "RAIDaction"

    [[component.group.attribute]]
    name = "IncludedDisks"
    list = true
"#,
        )
        .unwrap()
    }

    const PROFILE: &str = r#"<?xml version='1.0'?>
<SystemConfiguration>
  <Component FQDD="RAID.Integrated.1-1">
    <Attribute Name="RAIDresetConfig">False</Attribute>
    <Attribute Name="VirtualDisk.1#Name">vd0</Attribute>
    <Attribute Name="VirtualDisk.1#RAIDaction">Create</Attribute>
    <Attribute Name="VirtualDisk.1#IncludedDisks">Disk.0</Attribute>
    <Attribute Name="VirtualDisk.1#IncludedDisks">Disk.1</Attribute>
  </Component>
</SystemConfiguration>"#;

    #[test]
    fn test_load_populates_tree() {
        let mut tree = scpkit_model::Tree::new();
        let root = raid_schema().build(&mut tree).unwrap();
        let document = parse_document(PROFILE).unwrap();
        let report = load_document(&mut tree, root, &document).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.applied, 5);

        let controller = tree.child(root, "RAID.Integrated.1-1").unwrap();
        assert_eq!(
            tree.field_value(controller, "RAIDresetConfig").unwrap(),
            Some(Value::Str("False".into()))
        );
        let disks = tree.child(controller, "VirtualDisk").unwrap();
        let entry = tree.entry_at(disks, 1).unwrap();
        // Repeated list attributes accumulate comma-joined
        assert_eq!(
            tree.field_value(entry, "IncludedDisks").unwrap(),
            Some(Value::Str("Disk.0,Disk.1".into()))
        );
        // Bulk loads land in Precommit until confirmed
        assert_eq!(tree.state(root), LifecycleState::Precommit);
        tree.commit(root);
        assert_eq!(tree.state(root), LifecycleState::Committed);
    }

    #[test]
    fn test_unknown_names_skipped_not_fatal() {
        let profile = r#"<?xml version='1.0'?>
<SystemConfiguration>
  <Component FQDD="RAID.Integrated.1-1">
    <Attribute Name="NoSuchAttribute">1</Attribute>
    <Attribute Name="RAIDresetConfig">True</Attribute>
  </Component>
  <Component FQDD="NIC.Missing.9-9-9">
    <Attribute Name="VLanId">7</Attribute>
  </Component>
</SystemConfiguration>"#;
        let mut tree = scpkit_model::Tree::new();
        let root = raid_schema().build(&mut tree).unwrap();
        let document = parse_document(profile).unwrap();
        let report = load_document(&mut tree, root, &document).unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(report.skipped.len(), 2);
    }

    #[test]
    fn test_duplicate_entries_cleared_on_load() {
        let profile = r#"<?xml version='1.0'?>
<SystemConfiguration>
  <Component FQDD="RAID.Integrated.1-1">
    <Attribute Name="VirtualDisk.1#Name">vd0</Attribute>
    <Attribute Name="VirtualDisk.2#Name">vd0</Attribute>
    <Attribute Name="VirtualDisk.3#Name">vd1</Attribute>
  </Component>
</SystemConfiguration>"#;
        let mut tree = scpkit_model::Tree::new();
        let root = raid_schema().build(&mut tree).unwrap();
        let document = parse_document(profile).unwrap();
        load_document(&mut tree, root, &document).unwrap();

        let controller = tree.child(root, "RAID.Integrated.1-1").unwrap();
        let disks = tree.child(controller, "VirtualDisk").unwrap();
        // First occurrence of the duplicated key wins
        assert_eq!(tree.entries(disks).unwrap().len(), 2);
        assert!(tree.entry_at(disks, 1).is_some());
        assert!(tree.entry_at(disks, 2).is_none());
        assert!(tree.entry_at(disks, 3).is_some());
    }

    #[test]
    fn test_full_dump_round_trip_is_byte_identical() {
        let mut tree = scpkit_model::Tree::new();
        let root = raid_schema().build(&mut tree).unwrap();
        let document = parse_document(PROFILE).unwrap();
        load_document(&mut tree, root, &document).unwrap();

        let first = crate::document::to_xml(&tree.render(root, true, false).unwrap()).unwrap();

        // Parse the rendering back into a freshly built tree of the same
        // schema and render again.
        let mut second_tree = scpkit_model::Tree::new();
        let second_root = raid_schema().build(&mut second_tree).unwrap();
        let reparsed = parse_document(&first).unwrap();
        load_document(&mut second_tree, second_root, &reparsed).unwrap();
        let second =
            crate::document::to_xml(&second_tree.render(second_root, true, false).unwrap())
                .unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_commit_is_idempotent_on_rendering() {
        let mut tree = scpkit_model::Tree::new();
        let root = raid_schema().build(&mut tree).unwrap();
        let document = parse_document(PROFILE).unwrap();
        load_document(&mut tree, root, &document).unwrap();

        tree.commit(root);
        let first = crate::document::to_xml(&tree.render(root, true, false).unwrap()).unwrap();
        tree.commit(root);
        let second = crate::document::to_xml(&tree.render(root, true, false).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_component_resolved_by_element_alias() {
        let mut tree = scpkit_model::Tree::new();
        let root = tree.new_root("SystemConfiguration");
        let bios = tree.add_child_node(root, "bios", Some("BiosCfg")).unwrap();
        tree.set_wire_alias(bios, "BIOS").unwrap();
        tree.add_field(
            bios,
            scpkit_model::FieldSpec::new("BootMode", scpkit_model::TypeTag::Str),
        )
        .unwrap();

        let profile = r#"<?xml version='1.0'?>
<SystemConfiguration>
  <BIOS>
    <Attribute Name="BootMode">Uefi</Attribute>
  </BIOS>
</SystemConfiguration>"#;
        let document = parse_document(profile).unwrap();
        let report = load_document(&mut tree, root, &document).unwrap();
        assert!(report.is_clean());
        assert_eq!(
            tree.field_value(bios, "BootMode").unwrap(),
            Some(Value::Str("Uefi".into()))
        );
    }

    #[test]
    fn test_validation_failures_reported() {
        let profile = r#"<?xml version='1.0'?>
<SystemConfiguration>
  <Component FQDD="RAID.Integrated.1-1">
    <Attribute Name="RAIDresetConfig">Maybe</Attribute>
  </Component>
</SystemConfiguration>"#;
        let mut tree = scpkit_model::Tree::new();
        let root = raid_schema().build(&mut tree).unwrap();
        let document = parse_document(profile).unwrap();
        let report = load_document(&mut tree, root, &document).unwrap();
        assert_eq!(report.applied, 0);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].contains("RAIDresetConfig"));
    }
}
