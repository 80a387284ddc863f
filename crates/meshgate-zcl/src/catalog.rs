//! Schema catalog
//!
//! A read-only table of cluster descriptors keyed by numeric cluster ID,
//! loaded once from a JSON schema file. The file is keyed by cluster name:
//!
//! ```json
//! {
//!   "OnOff": {
//!     "ID": 6,
//!     "Attributes": { "OnOff": { "ID": 0, "Type": 16 } },
//!     "Commands": { "Toggle": { "ID": 2, "Parameters": [] } },
//!     "CommandsResponse": {}
//!   }
//! }
//! ```
//!
//! Lookups never fail. An unknown cluster yields an empty descriptor so
//! callers fall back to numeric identifiers for undocumented hardware.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{Result, ZclError};
use crate::types::DataType;

/// A named, typed attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeDescriptor {
    pub id: u16,
    pub name: String,
    pub data_type: DataType,
}

/// A named command and its parameter shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandDescriptor {
    pub id: u16,
    pub name: String,
    /// `[name, type]` pairs as listed in the schema
    pub parameters: Vec<Vec<String>>,
}

/// Everything the schema says about one cluster
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClusterDescriptor {
    pub id: u16,
    pub name: String,
    pub attributes: HashMap<u16, AttributeDescriptor>,
    pub commands: HashMap<u16, CommandDescriptor>,
    pub responses: HashMap<u16, CommandDescriptor>,
}

impl ClusterDescriptor {
    /// Whether this is the empty descriptor returned for unknown clusters
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.attributes.is_empty() && self.commands.is_empty()
    }

    /// Attribute by numeric ID
    pub fn attribute(&self, id: u16) -> Option<&AttributeDescriptor> {
        self.attributes.get(&id)
    }

    /// Attribute by schema name
    pub fn attribute_by_name(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.values().find(|a| a.name == name)
    }
}

// On-disk shapes
#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawCluster {
    #[serde(rename = "ID")]
    id: u16,
    #[serde(default)]
    attributes: HashMap<String, RawAttribute>,
    #[serde(default)]
    commands: HashMap<String, RawCommand>,
    #[serde(default)]
    commands_response: HashMap<String, RawCommand>,
}

#[derive(Deserialize)]
struct RawAttribute {
    #[serde(rename = "ID")]
    id: u16,
    #[serde(rename = "Type")]
    data_type: u8,
}

#[derive(Deserialize)]
struct RawCommand {
    #[serde(rename = "ID")]
    id: u16,
    #[serde(rename = "Parameters", default)]
    parameters: Vec<Vec<String>>,
}

fn index_commands(raw: HashMap<String, RawCommand>) -> HashMap<u16, CommandDescriptor> {
    raw.into_iter()
        .map(|(name, c)| {
            (
                c.id,
                CommandDescriptor {
                    id: c.id,
                    name,
                    parameters: c.parameters,
                },
            )
        })
        .collect()
}

/// ID-keyed cluster lookup table
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    clusters: HashMap<u16, ClusterDescriptor>,
    empty: ClusterDescriptor,
}

impl SchemaCatalog {
    /// Load a schema file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ZclError::CatalogNotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)?;
        let catalog = Self::from_json_str(&text)?;
        debug!(path = %path.display(), clusters = catalog.len(), "Loaded schema catalog");
        Ok(catalog)
    }

    /// Parse schema JSON text
    pub fn from_json_str(text: &str) -> Result<Self> {
        let raw: HashMap<String, RawCluster> = serde_json::from_str(text)?;

        let mut clusters = HashMap::with_capacity(raw.len());
        for (name, cluster) in raw {
            let attributes = cluster
                .attributes
                .into_iter()
                .map(|(attr_name, a)| {
                    (
                        a.id,
                        AttributeDescriptor {
                            id: a.id,
                            name: attr_name,
                            data_type: DataType(a.data_type),
                        },
                    )
                })
                .collect();

            let descriptor = ClusterDescriptor {
                id: cluster.id,
                name,
                attributes,
                commands: index_commands(cluster.commands),
                responses: index_commands(cluster.commands_response),
            };

            if let Some(previous) = clusters.insert(cluster.id, descriptor) {
                warn!(
                    cluster = cluster.id,
                    replaced = %previous.name,
                    "Duplicate cluster ID in schema"
                );
            }
        }

        Ok(Self {
            clusters,
            empty: ClusterDescriptor::default(),
        })
    }

    /// Descriptor for `cluster_id`, or the empty descriptor
    pub fn lookup(&self, cluster_id: u16) -> &ClusterDescriptor {
        self.clusters.get(&cluster_id).unwrap_or(&self.empty)
    }

    /// Descriptor by cluster name
    pub fn lookup_by_name(&self, name: &str) -> Option<&ClusterDescriptor> {
        self.clusters.values().find(|c| c.name == name)
    }

    /// Number of clusters
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    /// Whether no clusters were loaded
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SCHEMA: &str = r#"{
        "OnOff": {
            "ID": 6,
            "Attributes": {
                "OnOff": { "ID": 0, "Type": 16 },
                "OnTime": { "ID": 16385, "Type": 33 }
            },
            "Commands": {
                "Off": { "ID": 0, "Parameters": [] },
                "Toggle": { "ID": 2, "Parameters": [] }
            },
            "CommandsResponse": {}
        },
        "IASZone": {
            "ID": 1280,
            "Attributes": {},
            "Commands": {},
            "CommandsResponse": {
                "ZoneStatusChangeNotification": {
                    "ID": 0,
                    "Parameters": [["ZoneStatus", "uint16"], ["ExtendedStatus", "uint8"]]
                }
            }
        }
    }"#;

    #[test]
    fn test_lookup_known_cluster() {
        let catalog = SchemaCatalog::from_json_str(SCHEMA).unwrap();
        assert_eq!(catalog.len(), 2);

        let on_off = catalog.lookup(6);
        assert_eq!(on_off.name, "OnOff");
        assert_eq!(on_off.attribute(0).unwrap().name, "OnOff");
        assert_eq!(on_off.attribute(0x4001).unwrap().data_type, DataType::UINT16);
        assert_eq!(on_off.commands[&2].name, "Toggle");
        assert_eq!(on_off.attribute_by_name("OnTime").unwrap().id, 0x4001);

        let zone = catalog.lookup(0x0500);
        assert_eq!(zone.responses[&0].parameters[0], vec!["ZoneStatus", "uint16"]);
    }

    #[test]
    fn test_lookup_unknown_cluster_is_empty() {
        let catalog = SchemaCatalog::from_json_str(SCHEMA).unwrap();
        for id in [0x0001u16, 0xfc00, 0xffff] {
            let descriptor = catalog.lookup(id);
            assert!(descriptor.is_empty());
            assert!(descriptor.name.is_empty());
            assert!(descriptor.attributes.is_empty());
            assert!(descriptor.commands.is_empty());
            assert!(descriptor.responses.is_empty());
        }
    }

    #[test]
    fn test_malformed_schema_is_error() {
        let err = SchemaCatalog::from_json_str("{ \"OnOff\": { \"ID\": \"six\" } }").unwrap_err();
        assert_eq!(err.error_code(), "CATALOG_PARSE");
        assert!(SchemaCatalog::from_json_str("not json").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SCHEMA.as_bytes()).unwrap();
        let catalog = SchemaCatalog::load(file.path()).unwrap();
        assert_eq!(catalog.lookup_by_name("IASZone").unwrap().id, 0x0500);

        let err = SchemaCatalog::load("/nonexistent/zcldef.json").unwrap_err();
        assert_eq!(err.error_code(), "CATALOG_NOT_FOUND");
    }
}
