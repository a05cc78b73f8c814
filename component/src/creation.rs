use std::{collections::BTreeMap, fmt, ops::Deref, sync::Arc};

use serde::de::DeserializeOwned;
use serde_json::Value;
use trellis_registry::{ComponentAddress, ComponentTypeId};

use crate::{
    attribute::{AttributeDescriptor, AttributeKind},
    environment::Environment,
    error::Error,
    info::StaticComponentInfo,
    instance::ComponentInstance,
    interface::Interface,
};

/// Resolved value of one attribute, as seen by the component factory.
#[derive(Clone, Debug)]
pub enum AttributeSlot {
    Value(Option<Value>),
    Values(Vec<Value>),
    Reference(Option<ComponentInstance>),
    /// One entry per target, in registry order. Unresolvable nullable targets are `None`.
    References(Vec<Option<ComponentInstance>>),
    Factory(Option<ComponentFactory>),
}

impl AttributeSlot {
    /// Slot for an attribute the registry leaves unset: the default, an empty value for
    /// NULLABLE attributes, or `None` when the attribute is required.
    pub fn unset(descriptor: &AttributeDescriptor) -> Option<Self> {
        let nullable = descriptor.is_nullable();
        let multi = descriptor.is_multi();
        match descriptor.kind {
            AttributeKind::Value(_) => match (&descriptor.default, multi) {
                (Some(Value::Array(items)), true) => Some(Self::Values(items.clone())),
                (Some(value), false) => Some(Self::Value(Some(value.clone()))),
                (None, true) if nullable => Some(Self::Values(Vec::new())),
                (None, false) if nullable => Some(Self::Value(None)),
                _ => None,
            },
            AttributeKind::Reference(_) if nullable && multi => Some(Self::References(Vec::new())),
            AttributeKind::Reference(_) if nullable => Some(Self::Reference(None)),
            AttributeKind::Factory(_) if nullable => Some(Self::Factory(None)),
            AttributeKind::Reference(_) | AttributeKind::Factory(_) => None,
        }
    }
}

pub type AttributeSlots = BTreeMap<String, AttributeSlot>;

/// Everything a factory can see while constructing one component.
pub struct CreationContext<'a> {
    address: &'a ComponentAddress,
    info: &'a StaticComponentInfo,
    slots: &'a AttributeSlots,
    environment: &'a Environment,
}

impl<'a> CreationContext<'a> {
    pub fn new(
        address: &'a ComponentAddress,
        info: &'a StaticComponentInfo,
        slots: &'a AttributeSlots,
        environment: &'a Environment,
    ) -> Self {
        Self {
            address,
            info,
            slots,
            environment,
        }
    }

    pub fn address(&self) -> &'a ComponentAddress {
        self.address
    }

    pub fn info(&self) -> &'a StaticComponentInfo {
        self.info
    }

    pub fn environment(&self) -> &'a Environment {
        self.environment
    }

    pub fn slot(&self, name: &str) -> Result<&'a AttributeSlot, Error> {
        self.slots
            .get(name)
            .ok_or_else(|| Error::access(name, "attribute is not declared by this component"))
    }

    /// Single value attribute, `None` when a nullable attribute is unbound.
    pub fn value<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, Error> {
        match self.slot(name)? {
            AttributeSlot::Value(None) => Ok(None),
            AttributeSlot::Value(Some(value)) => decode(name, value).map(Some),
            _ => Err(Error::access(name, "not a single value attribute")),
        }
    }

    /// Like [`CreationContext::value`], treating an unbound value as an error.
    pub fn required<T: DeserializeOwned>(&self, name: &str) -> Result<T, Error> {
        self.value(name)?
            .ok_or_else(|| Error::access(name, "attribute is unbound"))
    }

    pub fn values<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>, Error> {
        match self.slot(name)? {
            AttributeSlot::Values(values) => values.iter().map(|v| decode(name, v)).collect(),
            _ => Err(Error::access(name, "not a multi value attribute")),
        }
    }

    pub fn reference<I: Interface + ?Sized>(&self, name: &str) -> Result<Option<Arc<I>>, Error> {
        match self.slot(name)? {
            AttributeSlot::Reference(target) => target
                .as_ref()
                .map(|instance| interface_of::<I>(name, instance))
                .transpose(),
            _ => Err(Error::access(name, "not a single reference attribute")),
        }
    }

    pub fn references<I: Interface + ?Sized>(
        &self,
        name: &str,
    ) -> Result<Vec<Option<Arc<I>>>, Error> {
        match self.slot(name)? {
            AttributeSlot::References(targets) => targets
                .iter()
                .map(|target| {
                    target
                        .as_ref()
                        .map(|instance| interface_of::<I>(name, instance))
                        .transpose()
                })
                .collect(),
            _ => Err(Error::access(name, "not a multi reference attribute")),
        }
    }

    /// Bound component instance behind a reference attribute, for concrete downcasts.
    pub fn instance(&self, name: &str) -> Result<Option<&'a ComponentInstance>, Error> {
        match self.slot(name)? {
            AttributeSlot::Reference(target) => Ok(target.as_ref()),
            _ => Err(Error::access(name, "not a single reference attribute")),
        }
    }

    pub fn factory(&self, name: &str) -> Result<Option<ComponentFactory>, Error> {
        match self.slot(name)? {
            AttributeSlot::Factory(factory) => Ok(factory.clone()),
            _ => Err(Error::access(name, "not a factory attribute")),
        }
    }
}

fn decode<T: DeserializeOwned>(name: &str, value: &Value) -> Result<T, Error> {
    serde_json::from_value(value.clone()).map_err(|err| Error::access(name, err.to_string()))
}

fn interface_of<I: Interface + ?Sized>(
    name: &str,
    instance: &ComponentInstance,
) -> Result<Arc<I>, Error> {
    instance.get_interface::<I>().ok_or_else(|| {
        Error::access(
            name,
            format!("{} does not provide `{}`", instance.address(), I::NAME),
        )
    })
}

/// Creates standalone components of one type, configured from attribute defaults.
#[derive(Clone)]
pub struct ComponentFactory {
    info: Arc<StaticComponentInfo>,
    environment: Environment,
    owner: ComponentAddress,
}

impl ComponentFactory {
    /// `owner` is the address of the component holding the factory; created components
    /// report it as their address.
    pub fn new(
        info: Arc<StaticComponentInfo>,
        environment: Environment,
        owner: ComponentAddress,
    ) -> Self {
        Self {
            info,
            environment,
            owner,
        }
    }

    pub fn component_type(&self) -> &ComponentTypeId {
        self.info.component_type()
    }

    pub fn info(&self) -> &Arc<StaticComponentInfo> {
        &self.info
    }

    pub fn create(&self) -> Result<OwnedComponent, Error> {
        let mut slots = AttributeSlots::new();
        for descriptor in self.info.attributes() {
            let slot = AttributeSlot::unset(descriptor).ok_or_else(|| Error::MissingAttribute {
                address: self.owner.clone(),
                attribute: descriptor.name.clone(),
            })?;
            slots.insert(descriptor.name.clone(), slot);
        }

        let context = CreationContext::new(&self.owner, &self.info, &slots, &self.environment);
        let instance = self.info.instantiate(&context)?;
        tracing::debug!(
            owner = %self.owner,
            type_id = %self.info.component_type(),
            "created component from factory"
        );
        Ok(OwnedComponent { instance })
    }
}

impl fmt::Debug for ComponentFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentFactory")
            .field("type_id", self.info.component_type())
            .field("owner", &self.owner)
            .finish()
    }
}

/// Component created through a [`ComponentFactory`]. The destruction hook fires on drop.
#[derive(Debug)]
pub struct OwnedComponent {
    instance: ComponentInstance,
}

impl Deref for OwnedComponent {
    type Target = ComponentInstance;

    fn deref(&self) -> &ComponentInstance {
        &self.instance
    }
}

impl Drop for OwnedComponent {
    fn drop(&mut self) {
        self.instance.run_destroyed_hook();
    }
}
