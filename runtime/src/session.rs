use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use trellis_component::{
    ComponentInstance, ComponentTypes, CreationContext, Environment, StaticComponentInfo,
};
use trellis_registry::{
    ComponentAddress, ElementName, ElementPath, PathSegment, Registry, RegistryElement,
};

use crate::{
    context::{Assigned, ComponentContext, ContextId, ContextState, Scope, ScopeId},
    error::Error,
};

/// Resolves one registry against a frozen set of component types.
///
/// Contexts are created on first reference and construct their component at most once.
/// Destruction runs in reverse of the order components were actually created, either
/// through [`Session::teardown`] or when the session is dropped.
#[derive(Debug)]
pub struct Session {
    pub(crate) types: ComponentTypes,
    pub(crate) environment: Environment,
    pub(crate) scopes: Vec<Scope>,
    pub(crate) contexts: Vec<ComponentContext>,
    by_address: HashMap<ComponentAddress, ContextId>,
    /// Contexts currently resolving attributes, outermost first.
    stack: Vec<ContextId>,
    created: Vec<ContextId>,
}

impl Session {
    pub fn new(
        types: ComponentTypes,
        environment: Environment,
        registry: impl Into<Arc<Registry>>,
    ) -> Self {
        Self {
            types,
            environment,
            scopes: vec![Scope {
                registry: registry.into(),
                address: ComponentAddress::root(),
                parent: None,
                imports: BTreeMap::new(),
            }],
            contexts: Vec::new(),
            by_address: HashMap::new(),
            stack: Vec::new(),
            created: Vec::new(),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.scopes[ScopeId::ROOT.0].registry
    }

    pub fn types(&self) -> &ComponentTypes {
        &self.types
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Resolves the element `path` names, relative to the root registry.
    pub fn resolve(&mut self, path: &str) -> Result<ComponentInstance, Error> {
        let path = ElementPath::parse(path)?;
        self.resolve_path(&path)
    }

    pub fn resolve_path(&mut self, path: &ElementPath) -> Result<ComponentInstance, Error> {
        let target = self.locate(ScopeId::ROOT, &ComponentAddress::root(), path)?;
        self.resolve_context(target)
    }

    /// Resolves every element of the root registry, in name order.
    pub fn resolve_all(&mut self) -> Result<Vec<ComponentInstance>, Error> {
        let names: Vec<ElementName> = self.registry().element_names().cloned().collect();
        names
            .into_iter()
            .map(|name| self.resolve_path(&ElementPath::from(name)))
            .collect()
    }

    pub fn context(&self, address: &ComponentAddress) -> Option<&ComponentContext> {
        let id = self.by_address.get(address)?;
        Some(&self.contexts[id.0])
    }

    pub fn state(&self, address: &ComponentAddress) -> Option<ContextState> {
        self.context(address).map(ComponentContext::state)
    }

    /// Addresses of live components, in the order they were created.
    pub fn creation_order(&self) -> Vec<ComponentAddress> {
        self.created
            .iter()
            .map(|id| self.contexts[id.0].address.clone())
            .collect()
    }

    /// Destroys every created component, last created first.
    pub fn teardown(&mut self) {
        while let Some(id) = self.created.pop() {
            self.destroy_context(id);
        }
    }

    /// Destroys one component. Returns `false` if it was not created.
    pub fn destroy(&mut self, address: &ComponentAddress) -> bool {
        let Some(&id) = self.by_address.get(address) else {
            return false;
        };
        if self.contexts[id.0].state != ContextState::Created {
            return false;
        }
        self.created.retain(|&created| created != id);
        self.destroy_context(id)
    }

    fn destroy_context(&mut self, id: ContextId) -> bool {
        let context = &mut self.contexts[id.0];
        if context.state != ContextState::Created {
            return false;
        }
        context.state = ContextState::Destroyed;
        if let Some(instance) = context.instance.take() {
            instance.run_destroyed_hook();
        }
        tracing::debug!(address = %context.address, "destroyed component");
        true
    }

    /// The central algorithm: returns the cached instance, or resolves attributes and
    /// constructs it. Any failure returns the context to `Unbound`.
    pub(crate) fn resolve_context(&mut self, id: ContextId) -> Result<ComponentInstance, Error> {
        let context = &self.contexts[id.0];
        match context.state {
            ContextState::Created => {
                if let Some(instance) = &context.instance {
                    return Ok(instance.clone());
                }
            }
            ContextState::AttributesResolving => return Err(self.cycle_through(id)),
            ContextState::Destroyed => {
                return Err(Error::ContextDestroyed {
                    address: context.address.clone(),
                });
            }
            ContextState::Unbound => {}
        }

        self.contexts[id.0].state = ContextState::AttributesResolving;
        self.stack.push(id);
        let result = self.construct(id);
        self.stack.pop();

        let context = &mut self.contexts[id.0];
        match result {
            Ok(instance) => {
                context.state = ContextState::Created;
                context.instance = Some(instance.clone());
                self.created.push(id);
                tracing::debug!(
                    address = %instance.address(),
                    type_id = %instance.component_type(),
                    "created component"
                );
                Ok(instance)
            }
            Err(err) => {
                context.state = ContextState::Unbound;
                Err(err)
            }
        }
    }

    fn cycle_through(&self, id: ContextId) -> Error {
        let start = self
            .stack
            .iter()
            .position(|&entry| entry == id)
            .unwrap_or_default();
        let cycle = self.stack[start..]
            .iter()
            .chain(std::iter::once(&id))
            .map(|entry| self.contexts[entry.0].address.clone())
            .collect();
        Error::CyclicDependency { cycle }
    }

    fn construct(&mut self, id: ContextId) -> Result<ComponentInstance, Error> {
        let scope = self.contexts[id.0].scope;
        let registry = Arc::clone(&self.scopes[scope.0].registry);
        let context = &self.contexts[id.0];
        let address = context.address.clone();
        let name = context.name.clone();
        let element = registry
            .element(name.as_str())
            .ok_or_else(|| Error::UnresolvedReference {
                from: address.clone(),
                path: name.to_string(),
                reason: "element no longer exists",
            })?;

        if self.is_composite(element) {
            return self.construct_composite(id, &address, element);
        }

        let info = self
            .types
            .get(element.type_id.as_str())
            .cloned()
            .ok_or_else(|| Error::UnknownComponentType {
                address: address.clone(),
                type_id: element.type_id.clone(),
            })?;
        let attributes = self.assigned_attributes(scope, &name, element);
        if let Some(attribute) = attributes
            .keys()
            .find(|attribute| info.attribute(attribute).is_none())
        {
            return Err(Error::UnknownAttribute {
                address,
                type_id: element.type_id.clone(),
                attribute: attribute.clone(),
            });
        }

        let slots = self.bind_attributes(&address, &info, &attributes)?;
        instantiate(&info, &address, &slots, &self.environment)
    }

    /// Attributes of element `name` in `scope`. Values imported by the enclosing composite
    /// replace the element's own.
    pub(crate) fn assigned_attributes(
        &self,
        scope: ScopeId,
        name: &ElementName,
        element: &RegistryElement,
    ) -> BTreeMap<String, Assigned> {
        let mut attributes: BTreeMap<String, Assigned> = element
            .attributes
            .iter()
            .map(|(attribute, value)| {
                let assigned = Assigned {
                    value: value.clone(),
                    scope,
                };
                (attribute.clone(), assigned)
            })
            .collect();
        for ((target, attribute), assigned) in &self.scopes[scope.0].imports {
            if target == name {
                attributes.insert(attribute.clone(), assigned.clone());
            }
        }
        attributes
    }

    fn is_composite(&self, element: &RegistryElement) -> bool {
        element.is_composite() || self.types.composite(element.type_id.as_str()).is_some()
    }

    /// Builds a composite: opens its nested scope and resolves every exported target.
    fn construct_composite(
        &mut self,
        id: ContextId,
        address: &ComponentAddress,
        element: &RegistryElement,
    ) -> Result<ComponentInstance, Error> {
        let child = self.child_scope(id, element)?;
        let registry = Arc::clone(&self.scopes[child.0].registry);

        let mut interfaces = BTreeMap::new();
        for (interface, target) in registry.exported_interfaces() {
            let target = self.context_in(child, address, target)?;
            interfaces.insert(interface.clone(), self.resolve_context(target)?);
        }
        let mut components = BTreeMap::new();
        for (export_id, target) in registry.exported_components() {
            let target = self.context_in(child, address, target)?;
            components.insert(export_id.clone(), self.resolve_context(target)?);
        }

        Ok(ComponentInstance::composite(
            address.clone(),
            element.type_id.clone(),
            interfaces,
            components,
        ))
    }

    /// Scope of a composite's nested registry, opened on first use.
    ///
    /// Every attribute the composite element is assigned must name one of the registry's
    /// attribute exports; the values become imports of the new scope.
    fn child_scope(&mut self, id: ContextId, element: &RegistryElement) -> Result<ScopeId, Error> {
        if let Some(scope) = self.contexts[id.0].child_scope {
            return Ok(scope);
        }
        let context = &self.contexts[id.0];
        let address = context.address.clone();
        let name = context.name.clone();
        let parent = context.scope;
        let registry = element
            .sub_registry
            .clone()
            .or_else(|| self.types.composite(element.type_id.as_str()).cloned())
            .ok_or_else(|| Error::UnresolvedReference {
                from: address.clone(),
                path: name.to_string(),
                reason: "element is not a composite",
            })?;

        let mut imports = BTreeMap::new();
        for (attribute, assigned) in self.assigned_attributes(parent, &name, element) {
            let Some(target) = registry.exported_attributes().get(&attribute) else {
                return Err(Error::UnknownAttribute {
                    address,
                    type_id: element.type_id.clone(),
                    attribute,
                });
            };
            imports.insert(
                (target.element.clone(), target.attribute.clone()),
                assigned,
            );
        }

        let scope = ScopeId(self.scopes.len());
        self.scopes.push(Scope {
            registry,
            address,
            parent: Some(parent),
            imports,
        });
        self.contexts[id.0].child_scope = Some(scope);
        Ok(scope)
    }

    /// Context of element `name` in `scope`, created on first use.
    fn context_in(
        &mut self,
        scope: ScopeId,
        from: &ComponentAddress,
        name: &ElementName,
    ) -> Result<ContextId, Error> {
        let address = self.scopes[scope.0].address.child(name.clone());
        if let Some(&id) = self.by_address.get(&address) {
            return Ok(id);
        }
        if !self.scopes[scope.0].registry.contains(name.as_str()) {
            return Err(Error::UnresolvedReference {
                from: from.clone(),
                path: name.to_string(),
                reason: "no such element",
            });
        }

        let id = ContextId(self.contexts.len());
        self.contexts
            .push(ComponentContext::new(address.clone(), name.clone(), scope));
        self.by_address.insert(address, id);
        Ok(id)
    }

    /// Finds the context `path` names, seen from `scope`.
    ///
    /// `..` climbs to the enclosing scope and a leading `/` starts at the root. Descending
    /// into a composite only works through the export ids of its nested registry.
    pub(crate) fn locate(
        &mut self,
        scope: ScopeId,
        from: &ComponentAddress,
        path: &ElementPath,
    ) -> Result<ContextId, Error> {
        let unresolved = |reason| Error::UnresolvedReference {
            from: from.clone(),
            path: path.to_string(),
            reason,
        };

        let mut scope = if path.is_absolute() {
            ScopeId::ROOT
        } else {
            scope
        };
        let mut segments = path.segments().iter().peekable();
        while let Some(PathSegment::Parent) = segments.peek() {
            scope = self.scopes[scope.0]
                .parent
                .ok_or_else(|| unresolved("`..` escapes the root registry"))?;
            segments.next();
        }

        let Some(PathSegment::Name(first)) = segments.next() else {
            return Err(unresolved("path does not name an element"));
        };
        let mut name = first.clone();
        for segment in segments {
            let PathSegment::Name(export_id) = segment else {
                return Err(unresolved("`..` may only lead a path"));
            };
            let registry = Arc::clone(&self.scopes[scope.0].registry);
            let element = registry
                .element(name.as_str())
                .ok_or_else(|| unresolved("no such element"))?;
            if !self.is_composite(element) {
                return Err(unresolved("only composites have nested elements"));
            }
            let id = self.context_in(scope, from, &name)?;
            let child = self.child_scope(id, element)?;
            name = self.scopes[child.0]
                .registry
                .exported_components()
                .get(export_id.as_str())
                .cloned()
                .ok_or_else(|| unresolved("composite does not export that component"))?;
            scope = child;
        }

        self.context_in(scope, from, &name).map_err(|_| unresolved("no such element"))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn instantiate(
    info: &Arc<StaticComponentInfo>,
    address: &ComponentAddress,
    slots: &trellis_component::AttributeSlots,
    environment: &Environment,
) -> Result<ComponentInstance, Error> {
    let context = CreationContext::new(address, info, slots, environment);
    info.instantiate(&context).map_err(|err| match err {
        trellis_component::Error::ComponentInitialization {
            address,
            type_id,
            source,
        } => Error::ComponentInitialization {
            address,
            type_id,
            source,
        },
        other => Error::Component(other),
    })
}
