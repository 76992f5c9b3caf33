//! SCP document reading and writing
//!
//! ```text
//! <SystemConfiguration Model="..." ServiceTag="..." TimeStamp="...">
//!   <Component FQDD="RAID.Integrated.1-1">
//!     <Attribute Name="RAIDresetConfig">False</Attribute>
//!     <Attribute Name="VirtualDisk.1#RAIDaction">Create</Attribute>
//!   </Component>
//! </SystemConfiguration>
//! ```

use chrono::Utc;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use scpkit_model::Fragment;

use crate::WireError;

/// Header attributes stamped on the root element of an exported document.
#[derive(Debug, Clone, Default)]
pub struct DocumentHeader {
    pub model: Option<String>,
    pub service_tag: Option<String>,
    pub timestamp: Option<String>,
}

impl DocumentHeader {
    /// Header carrying the current export time.
    pub fn stamped(model: Option<String>, service_tag: Option<String>) -> Self {
        Self {
            model,
            service_tag,
            timestamp: Some(Utc::now().to_rfc3339()),
        }
    }
}

/// A parsed SCP document.
#[derive(Debug, Clone, Default)]
pub struct ScpDocument {
    pub model: Option<String>,
    pub service_tag: Option<String>,
    pub timestamp: Option<String>,
    pub components: Vec<ScpComponent>,
}

impl ScpDocument {
    /// Header preserving this document's root attributes.
    pub fn header(&self) -> DocumentHeader {
        DocumentHeader {
            model: self.model.clone(),
            service_tag: self.service_tag.clone(),
            timestamp: self.timestamp.clone(),
        }
    }
}

/// A parsed component element.
#[derive(Debug, Clone, Default)]
pub struct ScpComponent {
    /// Element name ("Component" in standard documents)
    pub element: String,
    /// Element attributes in document order
    pub attributes: Vec<(String, String)>,
    /// `<Attribute>` lines in document order
    pub fields: Vec<ScpAttribute>,
    /// Nested component elements
    pub children: Vec<ScpComponent>,
}

impl ScpComponent {
    /// The component's FQDD element attribute, if present.
    pub fn fqdd(&self) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == "FQDD")
            .map(|(_, v)| v.as_str())
    }
}

/// One `<Attribute Name="...">value</Attribute>` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScpAttribute {
    pub name: String,
    pub value: String,
}

impl ScpAttribute {
    /// Split a repeating-group name into `(group, slot index, field)`.
    ///
    /// `VirtualDisk.1#RAIDaction` becomes `("VirtualDisk", 1, "RAIDaction")`;
    /// a plain attribute name returns `None`.
    pub fn grouped(&self) -> Option<(&str, u32, &str)> {
        let (prefix, field) = self.name.split_once('#')?;
        let (group, index) = prefix.rsplit_once('.')?;
        let index: u32 = index.parse().ok()?;
        Some((group, index, field))
    }
}

/// Serialize a rendered fragment to SCP XML.
pub fn to_xml(fragment: &Fragment) -> Result<String, WireError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    write_element(&mut writer, fragment)?;
    let body = String::from_utf8(writer.into_inner())
        .map_err(|e| WireError::Serialize(e.to_string()))?;
    Ok(format!("<?xml version='1.0'?>\n{}", body))
}

/// Serialize with header attributes applied to the root element.
pub fn to_xml_with_header(fragment: &Fragment, header: &DocumentHeader) -> Result<String, WireError> {
    let mut stamped = fragment.clone();
    let mut attributes = Vec::new();
    if let Some(model) = &header.model {
        attributes.push(("Model".to_string(), model.clone()));
    }
    if let Some(tag) = &header.service_tag {
        attributes.push(("ServiceTag".to_string(), tag.clone()));
    }
    if let Some(timestamp) = &header.timestamp {
        attributes.push(("TimeStamp".to_string(), timestamp.clone()));
    }
    attributes.extend(stamped.attributes);
    stamped.attributes = attributes;
    to_xml(&stamped)
}

fn write_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    fragment: &Fragment,
) -> Result<(), WireError> {
    let ser = |e: &dyn std::fmt::Display| WireError::Serialize(e.to_string());
    let mut start = BytesStart::new(fragment.name.as_str());
    for (key, value) in &fragment.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }
    writer.write_event(Event::Start(start)).map_err(|e| ser(&e))?;
    for line in &fragment.lines {
        let mut attr = BytesStart::new("Attribute");
        attr.push_attribute(("Name", line.name.as_str()));
        writer.write_event(Event::Start(attr)).map_err(|e| ser(&e))?;
        writer
            .write_event(Event::Text(BytesText::new(&line.value)))
            .map_err(|e| ser(&e))?;
        writer
            .write_event(Event::End(BytesEnd::new("Attribute")))
            .map_err(|e| ser(&e))?;
    }
    for child in &fragment.children {
        write_element(writer, child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(fragment.name.as_str())))
        .map_err(|e| ser(&e))?;
    Ok(())
}

/// Parse an SCP XML document.
pub fn parse_document(xml: &str) -> Result<ScpDocument, WireError> {
    let parse = |e: &dyn std::fmt::Display| WireError::Parse(e.to_string());
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut document = ScpDocument::default();
    let mut saw_root = false;
    let mut stack: Vec<ScpComponent> = Vec::new();
    let mut pending_attribute: Option<(String, String)> = None;

    loop {
        match reader.read_event().map_err(|e| parse(&e))? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "SystemConfiguration" {
                    saw_root = true;
                    for attr in e.attributes() {
                        let attr = attr.map_err(|e| parse(&e))?;
                        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
                        let value = attr.unescape_value().map_err(|e| parse(&e))?.to_string();
                        match key.as_str() {
                            "Model" => document.model = Some(value),
                            "ServiceTag" => document.service_tag = Some(value),
                            "TimeStamp" => document.timestamp = Some(value),
                            _ => {}
                        }
                    }
                } else if name == "Attribute" {
                    let attr_name = attribute_value(&e, "Name")
                        .map_err(|e| parse(&e))?
                        .ok_or_else(|| {
                            WireError::Malformed("Attribute element without Name".to_string())
                        })?;
                    pending_attribute = Some((attr_name, String::new()));
                } else {
                    let mut component = ScpComponent {
                        element: name,
                        ..ScpComponent::default()
                    };
                    for attr in e.attributes() {
                        let attr = attr.map_err(|e| parse(&e))?;
                        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
                        let value = attr.unescape_value().map_err(|e| parse(&e))?.to_string();
                        component.attributes.push((key, value));
                    }
                    stack.push(component);
                }
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "Attribute" {
                    if let Some(attr_name) = attribute_value(&e, "Name").map_err(|e| parse(&e))? {
                        push_attribute(&mut stack, attr_name, String::new())?;
                    }
                }
            }
            Event::Text(e) => {
                if let Some((_, text)) = pending_attribute.as_mut() {
                    text.push_str(&e.unescape().map_err(|e| parse(&e))?);
                }
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "Attribute" {
                    if let Some((attr_name, value)) = pending_attribute.take() {
                        push_attribute(&mut stack, attr_name, value)?;
                    }
                } else if name != "SystemConfiguration" {
                    let component = stack.pop().ok_or_else(|| {
                        WireError::Malformed(format!("unexpected closing element '{}'", name))
                    })?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(component),
                        None => document.components.push(component),
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    if !saw_root {
        return Err(WireError::Malformed(
            "missing SystemConfiguration root element".to_string(),
        ));
    }
    if !stack.is_empty() {
        return Err(WireError::Malformed("unclosed component element".to_string()));
    }
    Ok(document)
}

fn push_attribute(
    stack: &mut [ScpComponent],
    name: String,
    value: String,
) -> Result<(), WireError> {
    let component = stack.last_mut().ok_or_else(|| {
        WireError::Malformed(format!("attribute '{}' outside any component", name))
    })?;
    component.fields.push(ScpAttribute { name, value });
    Ok(())
}

fn attribute_value(
    element: &BytesStart<'_>,
    key: &str,
) -> Result<Option<String>, quick_xml::events::attributes::AttrError> {
    for attr in element.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == key.as_bytes() {
            return Ok(Some(
                String::from_utf8_lossy(&attr.value).to_string(),
            ));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scpkit_model::AttrLine;

    const SAMPLE: &str = r#"<?xml version='1.0'?>
<SystemConfiguration Model="PowerEdge R740" ServiceTag="ABC1234">
  <Component FQDD="RAID.Integrated.1-1">
    <Attribute Name="RAIDresetConfig">False</Attribute>
    <Attribute Name="VirtualDisk.1#RAIDaction">Create</Attribute>
    <Attribute Name="VirtualDisk.1#IncludedDisks">Disk.0</Attribute>
    <Attribute Name="VirtualDisk.1#IncludedDisks">Disk.1</Attribute>
  </Component>
</SystemConfiguration>"#;

    #[test]
    fn test_parse_sample() {
        let doc = parse_document(SAMPLE).unwrap();
        assert_eq!(doc.model.as_deref(), Some("PowerEdge R740"));
        assert_eq!(doc.service_tag.as_deref(), Some("ABC1234"));
        assert_eq!(doc.components.len(), 1);
        let component = &doc.components[0];
        assert_eq!(component.fqdd(), Some("RAID.Integrated.1-1"));
        assert_eq!(component.fields.len(), 4);
        assert_eq!(component.fields[0].name, "RAIDresetConfig");
        assert_eq!(component.fields[0].value, "False");
    }

    #[test]
    fn test_grouped_names() {
        let attr = ScpAttribute {
            name: "VirtualDisk.12#RAIDaction".to_string(),
            value: "Create".to_string(),
        };
        assert_eq!(attr.grouped(), Some(("VirtualDisk", 12, "RAIDaction")));
        let plain = ScpAttribute {
            name: "RAIDresetConfig".to_string(),
            value: "False".to_string(),
        };
        assert_eq!(plain.grouped(), None);
    }

    #[test]
    fn test_write_and_reparse() {
        let fragment = Fragment {
            name: "SystemConfiguration".to_string(),
            attributes: Vec::new(),
            lines: Vec::new(),
            children: vec![Fragment {
                name: "Component".to_string(),
                attributes: vec![("FQDD".to_string(), "NIC.Integrated.1-1-1".to_string())],
                lines: vec![AttrLine {
                    name: "VLanId".to_string(),
                    value: "100".to_string(),
                }],
                children: Vec::new(),
            }],
        };
        let xml = to_xml(&fragment).unwrap();
        assert!(xml.starts_with("<?xml version='1.0'?>"));
        let doc = parse_document(&xml).unwrap();
        assert_eq!(doc.components[0].fqdd(), Some("NIC.Integrated.1-1-1"));
        assert_eq!(doc.components[0].fields[0].value, "100");
    }

    #[test]
    fn test_header_attributes() {
        let fragment = Fragment {
            name: "SystemConfiguration".to_string(),
            attributes: Vec::new(),
            lines: Vec::new(),
            children: vec![Fragment {
                name: "Component".to_string(),
                attributes: Vec::new(),
                lines: vec![AttrLine {
                    name: "NTPEnable".to_string(),
                    value: "True".to_string(),
                }],
                children: Vec::new(),
            }],
        };
        let header = DocumentHeader {
            model: Some("PowerEdge R650".to_string()),
            service_tag: None,
            timestamp: Some("2026-08-07T00:00:00Z".to_string()),
        };
        let xml = to_xml_with_header(&fragment, &header).unwrap();
        let doc = parse_document(&xml).unwrap();
        assert_eq!(doc.model.as_deref(), Some("PowerEdge R650"));
        assert_eq!(doc.timestamp.as_deref(), Some("2026-08-07T00:00:00Z"));
    }

    #[test]
    fn test_escaped_values_round_trip() {
        let fragment = Fragment {
            name: "SystemConfiguration".to_string(),
            attributes: Vec::new(),
            lines: Vec::new(),
            children: vec![Fragment {
                name: "Component".to_string(),
                attributes: vec![("FQDD".to_string(), "iDRAC.Embedded.1".to_string())],
                lines: vec![AttrLine {
                    name: "Banner".to_string(),
                    value: "a < b & c".to_string(),
                }],
                children: Vec::new(),
            }],
        };
        let xml = to_xml(&fragment).unwrap();
        let doc = parse_document(&xml).unwrap();
        assert_eq!(doc.components[0].fields[0].value, "a < b & c");
    }

    #[test]
    fn test_malformed_documents() {
        assert!(matches!(
            parse_document("<NotScp></NotScp>"),
            Err(WireError::Malformed(_))
        ));
        assert!(parse_document("<SystemConfiguration><Component>").is_err());
    }
}
