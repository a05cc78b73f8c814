use std::{
    any::Any,
    collections::BTreeMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use trellis_registry::{ComponentAddress, ComponentTypeId};

use crate::{
    error::BoxError,
    info::StaticComponentInfo,
    interface::{ErasedObject, Interface, InterfaceId},
};

/// Implemented by every concrete component type.
///
/// Construction happens in the factory registered with the type's
/// [`StaticComponentInfo`]; the hooks run around it.
pub trait Component: Any + Send + Sync {
    /// Runs right after construction with every attribute bound. An error aborts creation.
    fn on_created(&self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Runs once, before the owner releases the instance.
    fn on_destroyed(&self) {}
}

/// Handle to a constructed component. Clones share the same object.
#[derive(Clone)]
pub struct ComponentInstance {
    inner: Arc<InstanceInner>,
}

struct InstanceInner {
    address: ComponentAddress,
    type_id: ComponentTypeId,
    body: Body,
    destroyed: AtomicBool,
}

enum Body {
    Simple {
        info: Arc<StaticComponentInfo>,
        object: ErasedObject,
        lifecycle: Arc<dyn Component>,
    },
    Composite {
        interfaces: BTreeMap<String, ComponentInstance>,
        components: BTreeMap<String, ComponentInstance>,
    },
}

impl ComponentInstance {
    pub(crate) fn simple(
        address: ComponentAddress,
        info: Arc<StaticComponentInfo>,
        object: ErasedObject,
        lifecycle: Arc<dyn Component>,
    ) -> Self {
        Self {
            inner: Arc::new(InstanceInner {
                address,
                type_id: info.component_type().clone(),
                body: Body::Simple {
                    info,
                    object,
                    lifecycle,
                },
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    /// A component built from a nested registry. `interfaces` maps exported interface names
    /// to the inner instance providing them, `components` maps export ids to inner instances.
    pub fn composite(
        address: ComponentAddress,
        type_id: ComponentTypeId,
        interfaces: BTreeMap<String, ComponentInstance>,
        components: BTreeMap<String, ComponentInstance>,
    ) -> Self {
        Self {
            inner: Arc::new(InstanceInner {
                address,
                type_id,
                body: Body::Composite {
                    interfaces,
                    components,
                },
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    pub fn address(&self) -> &ComponentAddress {
        &self.inner.address
    }

    pub fn component_type(&self) -> &ComponentTypeId {
        &self.inner.type_id
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.inner.body, Body::Composite { .. })
    }

    /// Static info of a simple component; composites have none.
    pub fn info(&self) -> Option<&Arc<StaticComponentInfo>> {
        match &self.inner.body {
            Body::Simple { info, .. } => Some(info),
            Body::Composite { .. } => None,
        }
    }

    /// Capability lookup. Returns `None` when the component does not implement `I`.
    pub fn get_interface<I: Interface + ?Sized>(&self) -> Option<Arc<I>> {
        let boxed = self.extract(InterfaceId::of::<I>())?;
        boxed.downcast::<Arc<I>>().ok().map(|arc| *arc)
    }

    pub fn provides(&self, interface: InterfaceId) -> bool {
        match &self.inner.body {
            Body::Simple { info, .. } => info.provides(interface),
            Body::Composite { interfaces, .. } => interfaces
                .get(interface.name())
                .is_some_and(|inner| inner.provides(interface)),
        }
    }

    fn extract(&self, interface: InterfaceId) -> Option<Box<dyn Any>> {
        match &self.inner.body {
            Body::Simple { info, object, .. } => info.extract(object, interface),
            Body::Composite { interfaces, .. } => {
                interfaces.get(interface.name())?.extract(interface)
            }
        }
    }

    /// The concrete object, when it is a `C`.
    pub fn downcast<C: Any + Send + Sync>(&self) -> Option<Arc<C>> {
        match &self.inner.body {
            Body::Simple { object, .. } => Arc::clone(object).downcast::<C>().ok(),
            Body::Composite { .. } => None,
        }
    }

    /// Inner component a composite exports under `export_id`.
    pub fn subcomponent(&self, export_id: &str) -> Option<&ComponentInstance> {
        match &self.inner.body {
            Body::Composite { components, .. } => components.get(export_id),
            Body::Simple { .. } => None,
        }
    }

    /// Interface names a composite forwards to its inner components.
    pub fn exported_interfaces(&self) -> impl Iterator<Item = &str> {
        let interfaces = match &self.inner.body {
            Body::Composite { interfaces, .. } => Some(interfaces.keys().map(String::as_str)),
            Body::Simple { .. } => None,
        };
        interfaces.into_iter().flatten()
    }

    /// Fires [`Component::on_destroyed`] unless it already ran for this instance, through
    /// this handle or any clone of it. Returns whether this call fired it. Composites have no
    /// hook of their own.
    pub fn run_destroyed_hook(&self) -> bool {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Body::Simple { lifecycle, .. } = &self.inner.body {
            lifecycle.on_destroyed();
        }
        true
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("address", &self.inner.address)
            .field("type_id", &self.inner.type_id)
            .field("composite", &self.is_composite())
            .finish()
    }
}
