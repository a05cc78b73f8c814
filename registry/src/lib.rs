
use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod archive;
mod error;
pub mod graph;
pub mod ir;
mod names;
mod path;
mod serialize;

pub use archive::{Archive, MemoryArchive, Primitive, Tag, Token};
pub use error::{ArchiveError, Error};
pub use ir::{REGISTRY_IR_SCHEMA, RegistryIr};
pub use names::{ComponentTypeId, ElementName};
pub use path::{ComponentAddress, ElementPath, PathSegment};

/// Version written into archive headers.
pub const REGISTRY_VERSION: u32 = 2;

/// First version that carries attribute exports.
pub(crate) const ATTRIBUTE_EXPORTS_VERSION: u32 = 2;

/// Value assigned to one attribute of a registry element.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeValue {
    /// Inline value, interpreted against the attribute's declared type at resolution time.
    Literal(Value),
    Reference(ElementPath),
    /// Ordered references; order is preserved as written.
    MultiReference(Vec<ElementPath>),
    /// Creates fresh instances of the named type on demand.
    FactoryReference(ComponentTypeId),
}

impl AttributeValue {
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    pub fn reference(path: &str) -> Result<Self, Error> {
        Ok(Self::Reference(ElementPath::parse(path)?))
    }

    pub fn multi_reference<'a>(paths: impl IntoIterator<Item = &'a str>) -> Result<Self, Error> {
        let paths = paths
            .into_iter()
            .map(ElementPath::parse)
            .collect::<Result<_, _>>()?;
        Ok(Self::MultiReference(paths))
    }

    /// Reference targets named by this value, in declaration order.
    pub fn references(&self) -> &[ElementPath] {
        match self {
            Self::Reference(path) => std::slice::from_ref(path),
            Self::MultiReference(paths) => paths,
            Self::Literal(_) | Self::FactoryReference(_) => &[],
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RegistryElement {
    pub type_id: ComponentTypeId,
    /// Attribute assignments, keyed by attribute name.
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Embedded sub-registry; its presence makes the element a composite.
    pub sub_registry: Option<Arc<Registry>>,
}

impl RegistryElement {
    pub fn new(type_id: ComponentTypeId) -> Self {
        Self {
            type_id,
            attributes: BTreeMap::new(),
            sub_registry: None,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: AttributeValue) {
        self.attributes.insert(name.into(), value);
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<AttributeValue> {
        self.attributes.remove(name)
    }

    pub fn is_composite(&self) -> bool {
        self.sub_registry.is_some()
    }
}

/// Inner attribute a composite lets its enclosing registry assign.
///
/// When the composite element sets the export id, that value replaces whatever the inner
/// element assigns to `attribute`. References in it resolve from the composite element's
/// registry, not the inner one.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributeExport {
    pub element: ElementName,
    pub attribute: String,
}

impl AttributeExport {
    pub fn new(element: ElementName, attribute: impl Into<String>) -> Self {
        Self {
            element,
            attribute: attribute.into(),
        }
    }
}

/// Declarative graph of named component slots.
///
/// A registry exclusively owns its elements, and each element owns its embedded
/// sub-registry, so ownership is a tree; elements refer to one another only through
/// [`ElementPath`]s. Cheap to clone: embedded registries are shared until mutated.
#[derive(Clone, Debug, PartialEq)]
pub struct Registry {
    version: u32,
    description: String,
    keywords: Vec<String>,
    elements: BTreeMap<ElementName, RegistryElement>,
    exported_interfaces: BTreeMap<String, ElementName>,
    exported_components: BTreeMap<String, ElementName>,
    exported_attributes: BTreeMap<String, AttributeExport>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            version: REGISTRY_VERSION,
            description: String::new(),
            keywords: Vec::new(),
            elements: BTreeMap::new(),
            exported_interfaces: BTreeMap::new(),
            exported_components: BTreeMap::new(),
            exported_attributes: BTreeMap::new(),
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn set_keywords(&mut self, keywords: Vec<String>) {
        self.keywords = keywords;
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn add_element(
        &mut self,
        name: ElementName,
        type_id: ComponentTypeId,
    ) -> Result<&mut RegistryElement, Error> {
        use std::collections::btree_map::Entry;

        match self.elements.entry(name) {
            Entry::Occupied(entry) => Err(Error::NameConflict {
                name: entry.key().to_string(),
            }),
            Entry::Vacant(entry) => Ok(entry.insert(RegistryElement::new(type_id))),
        }
    }

    /// Removes an element. References to it are left dangling and surface when resolved.
    pub fn remove_element(&mut self, name: &str) -> Result<RegistryElement, Error> {
        self.elements.remove(name).ok_or_else(|| Error::NotFound {
            name: name.to_string(),
        })
    }

    pub fn rename_element(&mut self, old: &str, new: ElementName) -> Result<(), Error> {
        if self.elements.contains_key(new.as_str()) {
            return Err(Error::NameConflict {
                name: new.to_string(),
            });
        }
        let element = self.remove_element(old)?;
        for target in self
            .exported_interfaces
            .values_mut()
            .chain(self.exported_components.values_mut())
        {
            if target.as_str() == old {
                *target = new.clone();
            }
        }
        for target in self.exported_attributes.values_mut() {
            if target.element.as_str() == old {
                target.element = new.clone();
            }
        }
        self.elements.insert(new, element);
        Ok(())
    }

    pub fn element(&self, name: &str) -> Option<&RegistryElement> {
        self.elements.get(name)
    }

    pub fn element_mut(&mut self, name: &str) -> Option<&mut RegistryElement> {
        self.elements.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.elements.contains_key(name)
    }

    pub fn element_names(&self) -> impl Iterator<Item = &ElementName> {
        self.elements.keys()
    }

    pub fn elements(&self) -> impl Iterator<Item = (&ElementName, &RegistryElement)> {
        self.elements.iter()
    }

    /// Assigns an attribute value. Whether the attribute is declared by the element's
    /// component type is only known once type metadata is available, at resolution time.
    pub fn set_attribute_value(
        &mut self,
        element: &str,
        attribute: impl Into<String>,
        value: AttributeValue,
    ) -> Result<(), Error> {
        let element = self.element_mut(element).ok_or_else(|| Error::NotFound {
            name: element.to_string(),
        })?;
        element.set_attribute(attribute, value);
        Ok(())
    }

    pub fn set_sub_registry(&mut self, element: &str, registry: Registry) -> Result<(), Error> {
        let element = self.element_mut(element).ok_or_else(|| Error::NotFound {
            name: element.to_string(),
        })?;
        element.sub_registry = Some(Arc::new(registry));
        Ok(())
    }

    pub fn sub_registry(&self, element: &str) -> Option<&Registry> {
        self.element(element)?.sub_registry.as_deref()
    }

    /// Mutable access to an embedded sub-registry, unsharing it if needed.
    pub fn sub_registry_mut(&mut self, element: &str) -> Option<&mut Registry> {
        self.element_mut(element)?
            .sub_registry
            .as_mut()
            .map(Arc::make_mut)
    }

    pub fn exported_interfaces(&self) -> &BTreeMap<String, ElementName> {
        &self.exported_interfaces
    }

    pub fn exported_components(&self) -> &BTreeMap<String, ElementName> {
        &self.exported_components
    }

    pub fn exported_attributes(&self) -> &BTreeMap<String, AttributeExport> {
        &self.exported_attributes
    }

    /// Export id under which `attribute` of `element` is assignable from outside.
    pub fn attribute_export_id(&self, element: &str, attribute: &str) -> Option<&str> {
        self.exported_attributes
            .iter()
            .find(|(_, target)| target.element.as_str() == element && target.attribute == attribute)
            .map(|(export_id, _)| export_id.as_str())
    }

    /// Publishes `interface` of `element` as an interface of the composite built from this
    /// registry. `None` withdraws the export.
    pub fn export_interface(
        &mut self,
        interface: impl Into<String>,
        element: Option<ElementName>,
    ) -> Result<(), Error> {
        let interface = interface.into();
        match element {
            Some(element) => {
                self.ensure_export_target(&interface, &element)?;
                self.exported_interfaces.insert(interface, element);
            }
            None => {
                self.exported_interfaces.remove(&interface);
            }
        }
        Ok(())
    }

    /// Makes `element` reachable from the enclosing scope as `export_id`. `None` withdraws it.
    pub fn export_component(
        &mut self,
        export_id: impl Into<String>,
        element: Option<ElementName>,
    ) -> Result<(), Error> {
        let export_id = export_id.into();
        match element {
            Some(element) => {
                self.ensure_export_target(&export_id, &element)?;
                self.exported_components.insert(export_id, element);
            }
            None => {
                self.exported_components.remove(&export_id);
            }
        }
        Ok(())
    }

    /// Lets the enclosing registry assign `target` through the composite element's attribute
    /// `export_id`. `None` withdraws the export.
    pub fn export_attribute(
        &mut self,
        export_id: impl Into<String>,
        target: Option<AttributeExport>,
    ) -> Result<(), Error> {
        let export_id = export_id.into();
        match target {
            Some(target) => {
                self.ensure_export_target(&export_id, &target.element)?;
                self.exported_attributes.insert(export_id, target);
                self.version = self.version.max(ATTRIBUTE_EXPORTS_VERSION);
            }
            None => {
                self.exported_attributes.remove(&export_id);
            }
        }
        Ok(())
    }

    fn ensure_export_target(&self, export: &str, element: &ElementName) -> Result<(), Error> {
        if self.contains(element.as_str()) {
            return Ok(());
        }
        Err(Error::UnknownExportTarget {
            export: export.to_string(),
            element: element.to_string(),
        })
    }

    /// Addresses of every element, depth-first through embedded sub-registries.
    pub fn addresses(&self) -> Vec<ComponentAddress> {
        let mut out = Vec::new();
        self.collect_addresses(&ComponentAddress::root(), &mut out);
        out
    }

    fn collect_addresses(&self, prefix: &ComponentAddress, out: &mut Vec<ComponentAddress>) {
        for (name, element) in &self.elements {
            let address = prefix.child(name.clone());
            out.push(address.clone());
            if let Some(sub) = &element.sub_registry {
                sub.collect_addresses(&address, out);
            }
        }
    }

    /// Element at `address`, descending through embedded sub-registries.
    pub fn lookup(&self, address: &ComponentAddress) -> Option<&RegistryElement> {
        let (last, parents) = address.segments().split_last()?;
        let mut registry = self;
        for name in parents {
            registry = registry.sub_registry(name.as_str())?;
        }
        registry.element(last.as_str())
    }
}
