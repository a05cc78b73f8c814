use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    AttributeExport, AttributeValue, ComponentTypeId, ElementName, REGISTRY_VERSION, Registry,
    RegistryElement, error::Error,
};

pub const REGISTRY_IR_SCHEMA: &str = "trellis.registry";

/// JSON document form of a [`Registry`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryIr {
    pub schema: String,
    pub version: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub elements: BTreeMap<String, ElementIr>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub exported_interfaces: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub exported_components: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub exported_attributes: BTreeMap<String, AttributeExport>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ElementIr {
    #[serde(rename = "type")]
    pub type_id: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, AttributeValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<Box<RegistryIr>>,
}

impl From<&Registry> for RegistryIr {
    fn from(registry: &Registry) -> Self {
        let elements = registry
            .elements
            .iter()
            .map(|(name, element)| (name.to_string(), ElementIr::from(element)))
            .collect();
        let exports = |map: &BTreeMap<String, ElementName>| -> BTreeMap<String, String> {
            map.iter()
                .map(|(id, element)| (id.clone(), element.to_string()))
                .collect()
        };

        Self {
            schema: REGISTRY_IR_SCHEMA.to_string(),
            version: registry.version,
            description: registry.description.clone(),
            keywords: registry.keywords.clone(),
            elements,
            exported_interfaces: exports(&registry.exported_interfaces),
            exported_components: exports(&registry.exported_components),
            exported_attributes: registry.exported_attributes.clone(),
        }
    }
}

impl From<&RegistryElement> for ElementIr {
    fn from(element: &RegistryElement) -> Self {
        Self {
            type_id: element.type_id.to_string(),
            attributes: element.attributes.clone(),
            registry: element
                .sub_registry
                .as_deref()
                .map(|sub| Box::new(RegistryIr::from(sub))),
        }
    }
}

impl TryFrom<RegistryIr> for Registry {
    type Error = Error;

    fn try_from(ir: RegistryIr) -> Result<Self, Self::Error> {
        if ir.schema != REGISTRY_IR_SCHEMA {
            return Err(Error::SchemaMismatch {
                expected: REGISTRY_IR_SCHEMA,
                actual: ir.schema,
            });
        }
        if ir.version > REGISTRY_VERSION {
            return Err(Error::UnsupportedVersion {
                version: ir.version,
                supported: REGISTRY_VERSION,
            });
        }

        let mut registry = Registry::new();
        registry.version = ir.version;
        registry.description = ir.description;
        registry.keywords = ir.keywords;

        for (name, element) in ir.elements {
            let type_id = ComponentTypeId::new(element.type_id)?;
            let entry = registry.add_element(ElementName::new(name)?, type_id)?;
            entry.attributes = element.attributes;
            if let Some(sub) = element.registry {
                entry.sub_registry = Some(Arc::new(Registry::try_from(*sub)?));
            }
        }

        for (interface, element) in ir.exported_interfaces {
            registry.export_interface(interface, Some(ElementName::new(element)?))?;
        }
        for (export_id, element) in ir.exported_components {
            registry.export_component(export_id, Some(ElementName::new(element)?))?;
        }
        for (export_id, target) in ir.exported_attributes {
            registry.export_attribute(export_id, Some(target))?;
        }

        Ok(registry)
    }
}

impl Registry {
    pub fn from_json_str(input: &str) -> Result<Self, Error> {
        let ir: RegistryIr = serde_json::from_str(input)?;
        Registry::try_from(ir)
    }

    pub fn to_json_string_pretty(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(&RegistryIr::from(self))?)
    }
}
