use std::sync::Arc;

use crate::{
    ATTRIBUTE_EXPORTS_VERSION, AttributeExport, AttributeValue, ComponentTypeId, ElementName,
    ElementPath, REGISTRY_VERSION, Registry, RegistryElement,
    archive::{Archive, Tag},
    error::{ArchiveError, Error},
};

const REGISTRY: Tag = Tag::new("Registry");
const VERSION: Tag = Tag::new("Version");
const DESCRIPTION: Tag = Tag::new("Description");
const KEYWORDS: Tag = Tag::new("Keywords");
const KEYWORD: Tag = Tag::new("Keyword");
const ELEMENTS: Tag = Tag::new("Elements");
const ELEMENT: Tag = Tag::new("Element");
const NAME: Tag = Tag::new("Name");
const TYPE_ID: Tag = Tag::new("TypeId");
const ATTRIBUTES: Tag = Tag::new("Attributes");
const ATTRIBUTE: Tag = Tag::new("Attribute");
const KIND: Tag = Tag::new("Kind");
const VALUE: Tag = Tag::new("Value");
const TARGETS: Tag = Tag::new("Targets");
const TARGET: Tag = Tag::new("Target");
const HAS_SUB_REGISTRY: Tag = Tag::new("HasSubRegistry");
const EXPORTED_INTERFACES: Tag = Tag::new("ExportedInterfaces");
const EXPORTED_COMPONENTS: Tag = Tag::new("ExportedComponents");
const EXPORTED_ATTRIBUTES: Tag = Tag::new("ExportedAttributes");
const EXPORT: Tag = Tag::new("Export");
const ID: Tag = Tag::new("Id");

const KIND_LITERAL: u32 = 0;
const KIND_REFERENCE: u32 = 1;
const KIND_MULTI_REFERENCE: u32 = 2;
const KIND_FACTORY_REFERENCE: u32 = 3;

impl Registry {
    /// Stores this registry into `archive`, or replaces it with the archived one when the
    /// archive is loading. A failed load leaves `self` untouched.
    pub fn serialize(&mut self, archive: &mut dyn Archive) -> Result<(), ArchiveError> {
        if archive.is_storing() {
            self.store(archive)
        } else {
            *self = Self::load(archive)?;
            Ok(())
        }
    }

    pub fn store(&self, archive: &mut dyn Archive) -> Result<(), ArchiveError> {
        archive.begin_tag(REGISTRY)?;

        let mut version = self.version;
        tagged(archive, VERSION, |a| a.process_u32(&mut version))?;
        let mut description = self.description.clone();
        tagged(archive, DESCRIPTION, |a| a.process_string(&mut description))?;

        let mut count = self.keywords.len();
        archive.begin_multi_tag(KEYWORDS, KEYWORD, &mut count)?;
        for keyword in &self.keywords {
            let mut keyword = keyword.clone();
            tagged(archive, KEYWORD, |a| a.process_string(&mut keyword))?;
        }
        archive.end_tag(KEYWORDS)?;

        let mut count = self.elements.len();
        archive.begin_multi_tag(ELEMENTS, ELEMENT, &mut count)?;
        for (name, element) in &self.elements {
            archive.begin_tag(ELEMENT)?;
            store_string(archive, NAME, name.as_str())?;
            store_element(archive, element)?;
            archive.end_tag(ELEMENT)?;
        }
        archive.end_tag(ELEMENTS)?;

        store_exports(archive, EXPORTED_INTERFACES, &self.exported_interfaces)?;
        store_exports(archive, EXPORTED_COMPONENTS, &self.exported_components)?;
        if self.version >= ATTRIBUTE_EXPORTS_VERSION {
            store_attribute_exports(archive, &self.exported_attributes)?;
        }

        archive.end_tag(REGISTRY)
    }

    pub fn load(archive: &mut dyn Archive) -> Result<Self, ArchiveError> {
        archive.begin_tag(REGISTRY)?;

        let mut version = 0;
        tagged(archive, VERSION, |a| a.process_u32(&mut version))?;
        if version > REGISTRY_VERSION {
            return Err(Error::UnsupportedVersion {
                version,
                supported: REGISTRY_VERSION,
            }
            .into());
        }

        let mut registry = Registry::new();
        registry.version = version;
        tagged(archive, DESCRIPTION, |a| {
            a.process_string(&mut registry.description)
        })?;

        let mut count = 0;
        archive.begin_multi_tag(KEYWORDS, KEYWORD, &mut count)?;
        for _ in 0..count {
            let mut keyword = String::new();
            tagged(archive, KEYWORD, |a| a.process_string(&mut keyword))?;
            registry.keywords.push(keyword);
        }
        archive.end_tag(KEYWORDS)?;

        let mut count = 0;
        archive.begin_multi_tag(ELEMENTS, ELEMENT, &mut count)?;
        for _ in 0..count {
            archive.begin_tag(ELEMENT)?;
            let name = ElementName::new(load_string(archive, NAME)?)?;
            let element = load_element(archive)?;
            if registry.elements.insert(name.clone(), element).is_some() {
                return Err(Error::NameConflict {
                    name: name.to_string(),
                }
                .into());
            }
            archive.end_tag(ELEMENT)?;
        }
        archive.end_tag(ELEMENTS)?;

        for (interface, element) in load_exports(archive, EXPORTED_INTERFACES)? {
            registry.export_interface(interface, Some(element))?;
        }
        for (export_id, element) in load_exports(archive, EXPORTED_COMPONENTS)? {
            registry.export_component(export_id, Some(element))?;
        }
        if version >= ATTRIBUTE_EXPORTS_VERSION {
            for (export_id, target) in load_attribute_exports(archive)? {
                registry.export_attribute(export_id, Some(target))?;
            }
        }

        archive.end_tag(REGISTRY)?;
        Ok(registry)
    }
}

fn tagged(
    archive: &mut dyn Archive,
    tag: Tag,
    body: impl FnOnce(&mut dyn Archive) -> Result<(), ArchiveError>,
) -> Result<(), ArchiveError> {
    archive.begin_tag(tag)?;
    body(&mut *archive)?;
    archive.end_tag(tag)
}

fn store_string(archive: &mut dyn Archive, tag: Tag, value: &str) -> Result<(), ArchiveError> {
    let mut value = value.to_string();
    tagged(archive, tag, |a| a.process_string(&mut value))
}

fn load_string(archive: &mut dyn Archive, tag: Tag) -> Result<String, ArchiveError> {
    let mut value = String::new();
    tagged(archive, tag, |a| a.process_string(&mut value))?;
    Ok(value)
}

fn store_element(archive: &mut dyn Archive, element: &RegistryElement) -> Result<(), ArchiveError> {
    store_string(archive, TYPE_ID, element.type_id.as_str())?;

    let mut count = element.attributes.len();
    archive.begin_multi_tag(ATTRIBUTES, ATTRIBUTE, &mut count)?;
    for (name, value) in &element.attributes {
        archive.begin_tag(ATTRIBUTE)?;
        store_string(archive, NAME, name)?;
        store_value(archive, value)?;
        archive.end_tag(ATTRIBUTE)?;
    }
    archive.end_tag(ATTRIBUTES)?;

    let mut has_sub_registry = element.sub_registry.is_some();
    tagged(archive, HAS_SUB_REGISTRY, |a| {
        a.process_bool(&mut has_sub_registry)
    })?;
    if let Some(sub_registry) = &element.sub_registry {
        sub_registry.store(archive)?;
    }
    Ok(())
}

fn load_element(archive: &mut dyn Archive) -> Result<RegistryElement, ArchiveError> {
    let type_id = ComponentTypeId::new(load_string(archive, TYPE_ID)?)?;
    let mut element = RegistryElement::new(type_id);

    let mut count = 0;
    archive.begin_multi_tag(ATTRIBUTES, ATTRIBUTE, &mut count)?;
    for _ in 0..count {
        archive.begin_tag(ATTRIBUTE)?;
        let name = load_string(archive, NAME)?;
        let value = load_value(archive)?;
        element.attributes.insert(name, value);
        archive.end_tag(ATTRIBUTE)?;
    }
    archive.end_tag(ATTRIBUTES)?;

    let mut has_sub_registry = false;
    tagged(archive, HAS_SUB_REGISTRY, |a| {
        a.process_bool(&mut has_sub_registry)
    })?;
    if has_sub_registry {
        element.sub_registry = Some(Arc::new(Registry::load(archive)?));
    }
    Ok(element)
}

fn store_value(archive: &mut dyn Archive, value: &AttributeValue) -> Result<(), ArchiveError> {
    let mut kind = match value {
        AttributeValue::Literal(_) => KIND_LITERAL,
        AttributeValue::Reference(_) => KIND_REFERENCE,
        AttributeValue::MultiReference(_) => KIND_MULTI_REFERENCE,
        AttributeValue::FactoryReference(_) => KIND_FACTORY_REFERENCE,
    };
    tagged(archive, KIND, |a| a.process_u32(&mut kind))?;

    match value {
        AttributeValue::Literal(literal) => {
            let text = serde_json::to_string(literal)
                .map_err(|err| ArchiveError::InvalidData(err.to_string()))?;
            store_string(archive, VALUE, &text)
        }
        AttributeValue::Reference(path) => store_string(archive, VALUE, &path.to_string()),
        AttributeValue::MultiReference(paths) => {
            let mut count = paths.len();
            archive.begin_multi_tag(TARGETS, TARGET, &mut count)?;
            for path in paths {
                store_string(archive, TARGET, &path.to_string())?;
            }
            archive.end_tag(TARGETS)
        }
        AttributeValue::FactoryReference(type_id) => {
            store_string(archive, VALUE, type_id.as_str())
        }
    }
}

fn load_value(archive: &mut dyn Archive) -> Result<AttributeValue, ArchiveError> {
    let mut kind = 0;
    tagged(archive, KIND, |a| a.process_u32(&mut kind))?;

    let value = match kind {
        KIND_LITERAL => {
            let text = load_string(archive, VALUE)?;
            let literal = serde_json::from_str(&text)
                .map_err(|err| ArchiveError::InvalidData(err.to_string()))?;
            AttributeValue::Literal(literal)
        }
        KIND_REFERENCE => AttributeValue::Reference(ElementPath::parse(&load_string(
            archive, VALUE,
        )?)?),
        KIND_MULTI_REFERENCE => {
            let mut count = 0;
            archive.begin_multi_tag(TARGETS, TARGET, &mut count)?;
            let mut paths = Vec::new();
            for _ in 0..count {
                paths.push(ElementPath::parse(&load_string(archive, TARGET)?)?);
            }
            archive.end_tag(TARGETS)?;
            AttributeValue::MultiReference(paths)
        }
        KIND_FACTORY_REFERENCE => {
            AttributeValue::FactoryReference(ComponentTypeId::new(load_string(archive, VALUE)?)?)
        }
        other => {
            return Err(ArchiveError::InvalidData(format!(
                "unknown attribute value kind {other}"
            )));
        }
    };
    Ok(value)
}

fn store_exports(
    archive: &mut dyn Archive,
    tag: Tag,
    exports: &std::collections::BTreeMap<String, ElementName>,
) -> Result<(), ArchiveError> {
    let mut count = exports.len();
    archive.begin_multi_tag(tag, EXPORT, &mut count)?;
    for (id, element) in exports {
        archive.begin_tag(EXPORT)?;
        store_string(archive, ID, id)?;
        store_string(archive, ELEMENT, element.as_str())?;
        archive.end_tag(EXPORT)?;
    }
    archive.end_tag(tag)
}

fn load_exports(
    archive: &mut dyn Archive,
    tag: Tag,
) -> Result<Vec<(String, ElementName)>, ArchiveError> {
    let mut count = 0;
    archive.begin_multi_tag(tag, EXPORT, &mut count)?;
    let mut exports = Vec::new();
    for _ in 0..count {
        archive.begin_tag(EXPORT)?;
        let id = load_string(archive, ID)?;
        let element = ElementName::new(load_string(archive, ELEMENT)?)?;
        archive.end_tag(EXPORT)?;
        exports.push((id, element));
    }
    archive.end_tag(tag)?;
    Ok(exports)
}

fn store_attribute_exports(
    archive: &mut dyn Archive,
    exports: &std::collections::BTreeMap<String, AttributeExport>,
) -> Result<(), ArchiveError> {
    let mut count = exports.len();
    archive.begin_multi_tag(EXPORTED_ATTRIBUTES, EXPORT, &mut count)?;
    for (id, target) in exports {
        archive.begin_tag(EXPORT)?;
        store_string(archive, ID, id)?;
        store_string(archive, ELEMENT, target.element.as_str())?;
        store_string(archive, ATTRIBUTE, &target.attribute)?;
        archive.end_tag(EXPORT)?;
    }
    archive.end_tag(EXPORTED_ATTRIBUTES)
}

fn load_attribute_exports(
    archive: &mut dyn Archive,
) -> Result<Vec<(String, AttributeExport)>, ArchiveError> {
    let mut count = 0;
    archive.begin_multi_tag(EXPORTED_ATTRIBUTES, EXPORT, &mut count)?;
    let mut exports = Vec::new();
    for _ in 0..count {
        archive.begin_tag(EXPORT)?;
        let id = load_string(archive, ID)?;
        let element = ElementName::new(load_string(archive, ELEMENT)?)?;
        let attribute = load_string(archive, ATTRIBUTE)?;
        archive.end_tag(EXPORT)?;
        exports.push((id, AttributeExport::new(element, attribute)));
    }
    archive.end_tag(EXPORTED_ATTRIBUTES)?;
    Ok(exports)
}
