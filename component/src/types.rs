use std::{collections::BTreeMap, sync::Arc};

use trellis_registry::{ComponentTypeId, Registry};

use crate::{error::Error, info::StaticComponentInfo};

/// Human-readable description of a component library.
#[derive(Clone, Debug, PartialEq, Eq, bon::Builder)]
#[builder(on(String, into))]
pub struct LibraryDescriptor {
    pub name: String,
    #[builder(default)]
    pub description: String,
    #[builder(default)]
    pub tags: Vec<String>,
}

/// Registration entry point of a set of component types.
pub trait ComponentLibrary {
    fn descriptor(&self) -> LibraryDescriptor;

    fn register(&self, types: &mut ComponentTypesBuilder) -> Result<(), Error>;
}

/// Mutable type registry for the library load phase. [`freeze`](Self::freeze) it before
/// resolving any registry.
#[derive(Debug, Default)]
pub struct ComponentTypesBuilder {
    infos: BTreeMap<ComponentTypeId, Arc<StaticComponentInfo>>,
    composites: BTreeMap<ComponentTypeId, Arc<Registry>>,
    libraries: Vec<LibraryDescriptor>,
    loading: Option<Arc<str>>,
}

impl ComponentTypesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a component type. Registering identical metadata again is a no-op.
    pub fn register(&mut self, mut info: StaticComponentInfo) -> Result<(), Error> {
        if self.composites.contains_key(info.component_type()) {
            return Err(Error::DuplicateRegistration {
                type_id: info.component_type().clone(),
            });
        }
        if let Some(existing) = self.infos.get(info.component_type()) {
            if existing.same_metadata(&info) {
                tracing::trace!(
                    type_id = %info.component_type(),
                    "component type already registered"
                );
                return Ok(());
            }
            return Err(Error::DuplicateRegistration {
                type_id: info.component_type().clone(),
            });
        }

        if let Some(library) = &self.loading {
            info.set_library(Arc::clone(library));
        }
        tracing::debug!(
            type_id = %info.component_type(),
            concrete = info.concrete_type_name(),
            "registered component type"
        );
        self.infos.insert(info.component_type().clone(), Arc::new(info));
        Ok(())
    }

    /// Registers `registry` as a composite component type: elements of this type are built
    /// from a fresh copy of the registry's graph.
    pub fn register_composite(
        &mut self,
        type_id: ComponentTypeId,
        registry: Registry,
    ) -> Result<(), Error> {
        if self.infos.contains_key(&type_id) {
            return Err(Error::DuplicateRegistration { type_id });
        }
        if let Some(existing) = self.composites.get(&type_id) {
            if **existing == registry {
                return Ok(());
            }
            return Err(Error::DuplicateRegistration { type_id });
        }
        tracing::debug!(%type_id, elements = registry.len(), "registered composite type");
        self.composites.insert(type_id, Arc::new(registry));
        Ok(())
    }

    /// Runs `library`'s registration. A library that fails partway leaves the builder as it
    /// was before the call.
    pub fn load_library(&mut self, library: &dyn ComponentLibrary) -> Result<(), Error> {
        let descriptor = library.descriptor();
        if self.libraries.iter().any(|lib| lib.name == descriptor.name) {
            return Err(Error::DuplicateLibrary {
                name: descriptor.name,
            });
        }

        let infos = self.infos.clone();
        let composites = self.composites.clone();
        self.loading = Some(Arc::from(descriptor.name.as_str()));
        let result = library.register(self);
        self.loading = None;
        if let Err(err) = result {
            tracing::debug!(library = %descriptor.name, %err, "library registration rolled back");
            self.infos = infos;
            self.composites = composites;
            return Err(err);
        }

        tracing::debug!(
            library = %descriptor.name,
            types = self.infos.len() + self.composites.len() - infos.len() - composites.len(),
            "loaded component library"
        );
        self.libraries.push(descriptor);
        Ok(())
    }

    pub fn contains(&self, type_id: &str) -> bool {
        self.infos.contains_key(type_id) || self.composites.contains_key(type_id)
    }

    pub fn freeze(self) -> ComponentTypes {
        ComponentTypes {
            inner: Arc::new(TypesInner {
                infos: self.infos,
                composites: self.composites,
                libraries: self.libraries,
            }),
        }
    }
}

/// Frozen, shareable set of registered component types.
#[derive(Clone, Debug, Default)]
pub struct ComponentTypes {
    inner: Arc<TypesInner>,
}

#[derive(Debug, Default)]
struct TypesInner {
    infos: BTreeMap<ComponentTypeId, Arc<StaticComponentInfo>>,
    composites: BTreeMap<ComponentTypeId, Arc<Registry>>,
    libraries: Vec<LibraryDescriptor>,
}

impl ComponentTypes {
    pub fn get(&self, type_id: &str) -> Option<&Arc<StaticComponentInfo>> {
        self.inner.infos.get(type_id)
    }

    /// Registry a composite type is built from.
    pub fn composite(&self, type_id: &str) -> Option<&Arc<Registry>> {
        self.inner.composites.get(type_id)
    }

    pub fn contains(&self, type_id: &str) -> bool {
        self.inner.infos.contains_key(type_id) || self.inner.composites.contains_key(type_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<StaticComponentInfo>> {
        self.inner.infos.values()
    }

    pub fn composites(&self) -> impl Iterator<Item = (&ComponentTypeId, &Arc<Registry>)> {
        self.inner.composites.iter()
    }

    /// Loaded libraries, in load order.
    pub fn libraries(&self) -> &[LibraryDescriptor] {
        &self.inner.libraries
    }

    pub fn len(&self) -> usize {
        self.inner.infos.len() + self.inner.composites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
