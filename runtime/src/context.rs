use std::{collections::BTreeMap, sync::Arc};

use trellis_component::ComponentInstance;
use trellis_registry::{AttributeValue, ComponentAddress, ElementName, Registry};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct ContextId(pub(crate) usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct ScopeId(pub(crate) usize);

impl ScopeId {
    pub(crate) const ROOT: Self = Self(0);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContextState {
    Unbound,
    /// Attributes are being resolved; reaching this context again is a cycle.
    AttributesResolving,
    Created,
    Destroyed,
}

/// Runtime binder of one registry element.
#[derive(Debug)]
pub struct ComponentContext {
    pub(crate) address: ComponentAddress,
    pub(crate) name: ElementName,
    pub(crate) scope: ScopeId,
    pub(crate) state: ContextState,
    pub(crate) instance: Option<ComponentInstance>,
    /// Scope of the nested registry, once a composite has opened it.
    pub(crate) child_scope: Option<ScopeId>,
}

impl ComponentContext {
    pub(crate) fn new(address: ComponentAddress, name: ElementName, scope: ScopeId) -> Self {
        Self {
            address,
            name,
            scope,
            state: ContextState::Unbound,
            instance: None,
            child_scope: None,
        }
    }

    pub fn address(&self) -> &ComponentAddress {
        &self.address
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn instance(&self) -> Option<&ComponentInstance> {
        self.instance.as_ref()
    }

    pub fn is_composite(&self) -> bool {
        self.child_scope.is_some()
    }
}

/// One registry being resolved: the root registry, or the sub-registry of a composite.
#[derive(Debug)]
pub(crate) struct Scope {
    pub(crate) registry: Arc<Registry>,
    /// Address of the composite owning this scope; the root address for the root scope.
    pub(crate) address: ComponentAddress,
    pub(crate) parent: Option<ScopeId>,
    /// Inner attributes assigned by the owning composite element, keyed by element and
    /// attribute name.
    pub(crate) imports: BTreeMap<(ElementName, String), Assigned>,
}

/// An attribute value together with the scope its references resolve from.
#[derive(Clone, Debug)]
pub(crate) struct Assigned {
    pub(crate) value: AttributeValue,
    pub(crate) scope: ScopeId,
}
