use std::{
    any::{Any, TypeId},
    collections::HashSet,
    fmt,
    sync::Arc,
};

use trellis_registry::ComponentTypeId;

use crate::{
    attribute::AttributeDescriptor,
    creation::CreationContext,
    error::{BoxError, Error},
    instance::{Component, ComponentInstance},
    interface::{ErasedObject, Interface, InterfaceExtractor, InterfaceId},
};

type ErasedFactory = Arc<
    dyn Fn(&CreationContext<'_>) -> Result<(ErasedObject, Arc<dyn Component>), BoxError>
        + Send
        + Sync,
>;

/// Metadata shared by every instance of one component type.
///
/// Built once through [`StaticComponentInfo::builder`], registered with
/// [`ComponentTypesBuilder`](crate::ComponentTypesBuilder) and never mutated afterwards.
pub struct StaticComponentInfo {
    type_id: ComponentTypeId,
    concrete: TypeId,
    concrete_name: &'static str,
    description: String,
    keywords: Vec<String>,
    library: Option<Arc<str>>,
    attributes: Vec<AttributeDescriptor>,
    interfaces: Vec<InterfaceExtractor>,
    factory: ErasedFactory,
}

impl StaticComponentInfo {
    pub fn builder<C: Component>(
        type_id: ComponentTypeId,
        factory: fn(&CreationContext<'_>) -> Result<C, BoxError>,
    ) -> ComponentInfoBuilder<C> {
        ComponentInfoBuilder {
            type_id,
            description: String::new(),
            keywords: Vec::new(),
            attributes: Vec::new(),
            interfaces: Vec::new(),
            factory,
        }
    }

    pub fn component_type(&self) -> &ComponentTypeId {
        &self.type_id
    }

    /// Rust type name of the implementation, for diagnostics.
    pub fn concrete_type_name(&self) -> &'static str {
        self.concrete_name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Library that registered this type, if it came from one.
    pub fn library(&self) -> Option<&str> {
        self.library.as_deref()
    }

    pub(crate) fn set_library(&mut self, library: Arc<str>) {
        self.library = Some(library);
    }

    /// Declared attributes, in declaration order.
    pub fn attributes(&self) -> &[AttributeDescriptor] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.iter().find(|attr| attr.name == name)
    }

    pub fn interfaces(&self) -> impl Iterator<Item = InterfaceId> + '_ {
        self.interfaces.iter().map(InterfaceExtractor::id)
    }

    pub fn provides(&self, interface: InterfaceId) -> bool {
        self.get_extractor(interface).is_some()
    }

    pub fn get_extractor(&self, interface: InterfaceId) -> Option<&InterfaceExtractor> {
        self.interfaces.iter().find(|ext| ext.id() == interface)
    }

    /// First registered extractor for `interface` that accepts `object`.
    pub(crate) fn extract(
        &self,
        object: &ErasedObject,
        interface: InterfaceId,
    ) -> Option<Box<dyn Any>> {
        self.interfaces
            .iter()
            .filter(|ext| ext.id() == interface)
            .find_map(|ext| ext.extract(object))
    }

    /// Whether `other` describes the same component type; the owning library is not compared.
    pub fn same_metadata(&self, other: &Self) -> bool {
        self.type_id == other.type_id
            && self.concrete == other.concrete
            && self.description == other.description
            && self.keywords == other.keywords
            && self.attributes == other.attributes
            && self.interfaces().eq(other.interfaces())
    }

    /// Runs the factory and the creation hook. Either failing yields
    /// [`Error::ComponentInitialization`] and nothing is kept.
    pub fn instantiate(
        self: &Arc<Self>,
        context: &CreationContext<'_>,
    ) -> Result<ComponentInstance, Error> {
        let fail = |source: BoxError| Error::ComponentInitialization {
            address: context.address().clone(),
            type_id: self.type_id.clone(),
            source,
        };
        let (object, lifecycle) = (self.factory)(context).map_err(fail)?;
        lifecycle.on_created().map_err(fail)?;
        Ok(ComponentInstance::simple(
            context.address().clone(),
            Arc::clone(self),
            object,
            lifecycle,
        ))
    }
}

impl fmt::Debug for StaticComponentInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticComponentInfo")
            .field("type_id", &self.type_id)
            .field("concrete", &self.concrete_name)
            .field("library", &self.library)
            .field("attributes", &self.attributes)
            .field("interfaces", &self.interfaces)
            .finish_non_exhaustive()
    }
}

pub struct ComponentInfoBuilder<C> {
    type_id: ComponentTypeId,
    description: String,
    keywords: Vec<String>,
    attributes: Vec<AttributeDescriptor>,
    interfaces: Vec<InterfaceExtractor>,
    factory: fn(&CreationContext<'_>) -> Result<C, BoxError>,
}

impl<C: Component> ComponentInfoBuilder<C> {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn keywords<S: Into<String>>(mut self, keywords: impl IntoIterator<Item = S>) -> Self {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn attribute(mut self, attribute: AttributeDescriptor) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Exports `I`. `cast` is normally the identity closure `|c| c`, which coerces
    /// `Arc<C>` to `Arc<dyn I>`.
    pub fn interface<I: Interface + ?Sized>(mut self, cast: fn(Arc<C>) -> Arc<I>) -> Self {
        self.interfaces.push(InterfaceExtractor::new(cast));
        self
    }

    pub fn build(self) -> Result<StaticComponentInfo, Error> {
        let mut names = HashSet::new();
        for attr in &self.attributes {
            if !names.insert(attr.name.as_str()) {
                return Err(Error::DuplicateAttribute {
                    type_id: self.type_id.clone(),
                    attribute: attr.name.clone(),
                });
            }
        }

        for attr in &self.attributes {
            if let Some(related) = attr.related.iter().find(|r| !names.contains(r.as_str())) {
                return Err(Error::UnknownRelatedAttribute {
                    type_id: self.type_id.clone(),
                    attribute: attr.name.clone(),
                    related: related.clone(),
                });
            }
            if let Some(default) = &attr.default {
                attr.check_literal(default)
                    .map_err(|message| Error::InvalidDefault {
                        type_id: self.type_id.clone(),
                        attribute: attr.name.clone(),
                        message,
                    })?;
            }
        }

        let mut seen = HashSet::new();
        for ext in &self.interfaces {
            if !seen.insert(ext.id()) {
                return Err(Error::DuplicateInterface {
                    type_id: self.type_id.clone(),
                    interface: ext.id().name(),
                });
            }
        }

        let factory = self.factory;
        let factory: ErasedFactory = Arc::new(move |context: &CreationContext<'_>| -> Result<
            (ErasedObject, Arc<dyn Component>),
            BoxError,
        > {
            let component = Arc::new(factory(context)?);
            let object: ErasedObject = component.clone();
            let lifecycle: Arc<dyn Component> = component;
            Ok((object, lifecycle))
        });

        Ok(StaticComponentInfo {
            type_id: self.type_id,
            concrete: TypeId::of::<C>(),
            concrete_name: std::any::type_name::<C>(),
            description: self.description,
            keywords: self.keywords,
            library: None,
            attributes: self.attributes,
            interfaces: self.interfaces,
            factory,
        })
    }
}
