//! Device schema documents
//!
//! A schema describes a device's configurable surface as data: components
//! with typed attributes and repeating groups. Trees are built from schema
//! documents instead of generated per-device classes, keeping the model
//! engine schema-agnostic. Documents load from TOML or JSON.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::collection::GroupTemplate;
use crate::error::ModelError;
use crate::field::FieldSpec;
use crate::tree::{ItemId, Tree};
use crate::value::{TypeTag, Value};

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("failed to read schema: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse schema: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("failed to serialize schema: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("failed to parse schema: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown attribute kind '{kind}' for '{name}'")]
    UnknownKind { name: String, kind: String },
    #[error("invalid group '{name}': {reason}")]
    InvalidGroup { name: String, reason: String },
    #[error("model error while building tree: {0}")]
    Model(#[from] ModelError),
}

/// A full schema document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDoc {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub component: Vec<ComponentDef>,
}

fn default_version() -> String {
    "1.0".to_string()
}

/// One device component (a controller, a NIC port, the management
/// controller itself), identified by its FQDD.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentDef {
    pub fqdd: String,
    /// Wire element name
    #[serde(default = "default_element")]
    pub element: String,
    #[serde(default)]
    pub attribute: Vec<FieldDef>,
    #[serde(default)]
    pub group: Vec<GroupDef>,
}

fn default_element() -> String {
    "Component".to_string()
}

/// One scalar attribute of a component or group entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    /// Wire spelling when it differs from the name
    #[serde(default)]
    pub alias: Option<String>,
    /// One of: str, int, bool, enum, ipv4, ipv6, mac, wwpn
    #[serde(default = "default_kind")]
    pub kind: String,
    /// Allowed values for kind = "enum"
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default)]
    pub list: bool,
    #[serde(default = "default_true")]
    pub modifiable: bool,
    #[serde(default)]
    pub deletable: bool,
    #[serde(default)]
    pub reboot_required: bool,
    #[serde(default)]
    pub default_on_delete: Option<String>,
    /// Sibling attribute names joined into this read-only view
    #[serde(default)]
    pub composite_of: Vec<String>,
}

fn default_kind() -> String {
    "str".to_string()
}

fn default_true() -> bool {
    true
}

impl FieldDef {
    fn to_spec(&self) -> Result<FieldSpec, SchemaError> {
        let tag = match self.kind.as_str() {
            "str" => TypeTag::Str,
            "int" => TypeTag::Int,
            "bool" => TypeTag::Bool,
            "enum" => TypeTag::Enum(self.values.clone()),
            "ipv4" => TypeTag::Ipv4,
            "ipv6" => TypeTag::Ipv6,
            "mac" => TypeTag::Mac,
            "wwpn" => TypeTag::Wwpn,
            other => {
                return Err(SchemaError::UnknownKind {
                    name: self.name.clone(),
                    kind: other.to_string(),
                })
            }
        };
        let mut spec = FieldSpec::new(&self.name, tag);
        spec.wire_alias = self.alias.clone();
        spec.list = self.list;
        spec.modifiable = self.modifiable;
        spec.deletable = self.deletable;
        spec.reboot_required = self.reboot_required;
        if let Some(default) = &self.default_on_delete {
            spec.default_on_delete = Value::Str(default.clone());
        }
        spec.composite_of = self.composite_of.clone();
        Ok(spec)
    }
}

/// One repeating group of a component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupDef {
    pub name: String,
    #[serde(default = "default_min_index")]
    pub min_index: u32,
    pub max_index: u32,
    /// Attribute names forming an entry's uniqueness key
    #[serde(default)]
    pub key: Vec<String>,
    #[serde(default)]
    pub attribute: Vec<FieldDef>,
}

fn default_min_index() -> u32 {
    1
}

impl GroupDef {
    fn to_template(&self) -> Result<GroupTemplate, SchemaError> {
        if self.min_index > self.max_index {
            return Err(SchemaError::InvalidGroup {
                name: self.name.clone(),
                reason: format!(
                    "min_index {} exceeds max_index {}",
                    self.min_index, self.max_index
                ),
            });
        }
        let mut template = GroupTemplate::new(&self.name, self.min_index, self.max_index)
            .key(self.key.clone());
        for field in &self.attribute {
            template = template.field(field.to_spec()?);
        }
        Ok(template)
    }
}

impl SchemaDoc {
    /// Load a schema from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, SchemaError> {
        Ok(toml::from_str(content)?)
    }

    /// Load a schema from a JSON string.
    pub fn from_json(content: &str) -> Result<Self, SchemaError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Load a schema from a file, selecting the format by extension.
    pub fn from_file(path: &Path) -> Result<Self, SchemaError> {
        let content = std::fs::read_to_string(path)?;
        let doc = if path.extension().and_then(|e| e.to_str()) == Some("json") {
            Self::from_json(&content)?
        } else {
            Self::from_toml(&content)?
        };
        info!(path = %path.display(), components = doc.component.len(), "schema loaded");
        Ok(doc)
    }

    /// Save the schema to a TOML file.
    pub fn to_file(&self, path: &Path) -> Result<(), SchemaError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Build a configuration tree for this schema: a `SystemConfiguration`
    /// root with one component node per definition.
    pub fn build(&self, tree: &mut Tree) -> Result<ItemId, SchemaError> {
        let root = tree.new_root("SystemConfiguration");
        for component in &self.component {
            let node = tree.add_child_node(root, &component.fqdd, Some(component.element.as_str()))?;
            tree.add_extra_attribute(node, "FQDD", &component.fqdd)?;
            for field in &component.attribute {
                tree.add_field(node, field.to_spec()?)?;
            }
            for group in &component.group {
                tree.add_group(node, group.to_template()?)?;
            }
        }
        Ok(root)
    }

    /// Component definitions keyed by FQDD.
    pub fn components_by_fqdd(&self) -> HashMap<&str, &ComponentDef> {
        self.component
            .iter()
            .map(|c| (c.fqdd.as_str(), c))
            .collect()
    }

    /// A starter document demonstrating the format.
    pub fn sample() -> Self {
        Self {
            version: default_version(),
            component: vec![ComponentDef {
                fqdd: "RAID.Integrated.1-1".to_string(),
                element: default_element(),
                attribute: vec![
                    FieldDef {
                        name: "RAIDresetConfig".to_string(),
                        alias: None,
                        kind: "enum".to_string(),
                        values: vec!["True".to_string(), "False".to_string()],
                        list: false,
                        modifiable: true,
                        deletable: false,
                        reboot_required: false,
                        default_on_delete: Some("False".to_string()),
                        composite_of: Vec::new(),
                    },
                    FieldDef {
                        name: "ControllerFirmwareVersion".to_string(),
                        alias: None,
                        kind: "str".to_string(),
                        values: Vec::new(),
                        list: false,
                        modifiable: false,
                        deletable: false,
                        reboot_required: false,
                        default_on_delete: None,
                        composite_of: Vec::new(),
                    },
                ],
                group: vec![GroupDef {
                    name: "VirtualDisk".to_string(),
                    min_index: 1,
                    max_index: 240,
                    key: vec!["Name".to_string()],
                    attribute: vec![
                        FieldDef {
                            name: "Name".to_string(),
                            alias: None,
                            kind: "str".to_string(),
                            values: Vec::new(),
                            list: false,
                            modifiable: true,
                            deletable: false,
                            reboot_required: false,
                            default_on_delete: None,
                            composite_of: Vec::new(),
                        },
                        FieldDef {
                            name: "RAIDaction".to_string(),
                            alias: None,
                            kind: "enum".to_string(),
                            values: vec!["Create".to_string(), "Update".to_string(), "Delete".to_string()],
                            list: false,
                            modifiable: true,
                            deletable: true,
                            reboot_required: false,
                            default_on_delete: Some("Delete".to_string()),
                            composite_of: Vec::new(),
                        },
                        FieldDef {
                            name: "IncludedDisks".to_string(),
                            alias: None,
                            kind: "str".to_string(),
                            values: Vec::new(),
                            list: true,
                            modifiable: true,
                            deletable: false,
                            reboot_required: false,
                            default_on_delete: None,
                            composite_of: Vec::new(),
                        },
                    ],
                }],
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SCHEMA: &str = r#"
version = "1.0"

[[component]]
fqdd = "NIC.Integrated.1-1-1"

  [[component.attribute]]
  name = "MacAddr"
  kind = "mac"
  modifiable = false

  [[component.attribute]]
  name = "VLanId"
  kind = "int"
  reboot_required = true

  [[component.group]]
  name = "Partition"
  max_index = 8
  key = ["PartitionName"]

    [[component.group.attribute]]
    name = "PartitionName"

    [[component.group.attribute]]
    name = "MinBandwidth"
    kind = "int"
"#;

    #[test]
    fn test_parse_and_build() {
        let doc = SchemaDoc::from_toml(SCHEMA).unwrap();
        assert_eq!(doc.component.len(), 1);

        let mut tree = Tree::new();
        let root = doc.build(&mut tree).unwrap();
        let nic = tree.child(root, "NIC.Integrated.1-1-1").unwrap();
        assert_eq!(tree.extra_attribute(nic, "FQDD"), Some("NIC.Integrated.1-1-1"));
        // Address kind validates the format
        assert!(tree.set_field(nic, "MacAddr", "not-a-mac").is_err());
        tree.set_field(nic, "MacAddr", "aa:bb:cc:dd:ee:ff").unwrap();

        let partitions = tree.child(nic, "Partition").unwrap();
        tree.create(
            partitions,
            None,
            &[("PartitionName", Value::Str("p1".into()))],
        )
        .unwrap();
    }

    #[test]
    fn test_reboot_flag_propagates() {
        let doc = SchemaDoc::from_toml(SCHEMA).unwrap();
        let mut tree = Tree::new();
        let root = doc.build(&mut tree).unwrap();
        let nic = tree.child(root, "NIC.Integrated.1-1-1").unwrap();
        assert!(!tree.reboot_required(root));
        tree.set_field(nic, "VLanId", 100i64).unwrap();
        assert!(tree.reboot_required(root));
        tree.commit(root);
        assert!(!tree.reboot_required(root));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let bad = r#"
[[component]]
fqdd = "X"
[[component.attribute]]
name = "A"
kind = "float"
"#;
        let doc = SchemaDoc::from_toml(bad).unwrap();
        let mut tree = Tree::new();
        assert!(matches!(
            doc.build(&mut tree),
            Err(SchemaError::UnknownKind { .. })
        ));
    }

    #[test]
    fn test_invalid_group_bounds() {
        let bad = r#"
[[component]]
fqdd = "X"
[[component.group]]
name = "G"
min_index = 5
max_index = 2
"#;
        let doc = SchemaDoc::from_toml(bad).unwrap();
        let mut tree = Tree::new();
        assert!(matches!(
            doc.build(&mut tree),
            Err(SchemaError::InvalidGroup { .. })
        ));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("schema.toml");
        SchemaDoc::sample().to_file(&path).unwrap();
        let doc = SchemaDoc::from_file(&path).unwrap();
        assert_eq!(doc.component[0].fqdd, "RAID.Integrated.1-1");
        assert!(doc.components_by_fqdd().contains_key("RAID.Integrated.1-1"));
    }

    #[test]
    fn test_json_schema() {
        let json = r#"{
  "component": [
    {"fqdd": "iDRAC.Embedded.1", "attribute": [{"name": "NTPEnable", "kind": "bool"}]}
  ]
}"#;
        let doc = SchemaDoc::from_json(json).unwrap();
        let mut tree = Tree::new();
        let root = doc.build(&mut tree).unwrap();
        let idrac = tree.child(root, "iDRAC.Embedded.1").unwrap();
        tree.set_field(idrac, "NTPEnable", "true").unwrap();
    }
}
