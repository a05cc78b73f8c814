use std::{collections::BTreeMap, sync::Arc};

use serde_json::Value;
use trellis_component::{
    AttributeDescriptor, AttributeKind, AttributeSlot, AttributeSlots, ComponentFactory,
    ComponentInstance, InterfaceId, StaticComponentInfo,
};
use trellis_registry::{AttributeValue, ComponentAddress, ComponentTypeId, ElementPath};

use crate::{
    context::{Assigned, ScopeId},
    error::Error,
    session::Session,
};

impl Session {
    /// Binds every declared attribute of `info`, in declaration order. Each assigned value
    /// binds from the scope it was written in.
    pub(crate) fn bind_attributes(
        &mut self,
        address: &ComponentAddress,
        info: &StaticComponentInfo,
        attributes: &BTreeMap<String, Assigned>,
    ) -> Result<AttributeSlots, Error> {
        let mut slots = AttributeSlots::new();
        for descriptor in info.attributes() {
            let slot = match attributes.get(&descriptor.name) {
                Some(assigned) => {
                    self.bind_value(assigned.scope, address, descriptor, &assigned.value)?
                }
                None => {
                    AttributeSlot::unset(descriptor).ok_or_else(|| Error::MissingAttribute {
                        address: address.clone(),
                        attribute: descriptor.name.clone(),
                    })?
                }
            };
            tracing::trace!(%address, attribute = %descriptor.name, ?slot, "bound attribute");
            slots.insert(descriptor.name.clone(), slot);
        }
        Ok(slots)
    }

    fn bind_value(
        &mut self,
        scope: ScopeId,
        address: &ComponentAddress,
        descriptor: &AttributeDescriptor,
        value: &AttributeValue,
    ) -> Result<AttributeSlot, Error> {
        let wrong_type = |message: String| Error::AttributeType {
            address: address.clone(),
            attribute: descriptor.name.clone(),
            message,
        };
        let multi = descriptor.is_multi();

        match (descriptor.kind, value) {
            (AttributeKind::Value(_), AttributeValue::Literal(Value::Null))
                if descriptor.is_nullable() =>
            {
                Ok(if multi {
                    AttributeSlot::Values(Vec::new())
                } else {
                    AttributeSlot::Value(None)
                })
            }
            (AttributeKind::Value(_), AttributeValue::Literal(literal)) => {
                descriptor.check_literal(literal).map_err(wrong_type)?;
                match literal {
                    Value::Array(items) if multi => Ok(AttributeSlot::Values(items.clone())),
                    _ => Ok(AttributeSlot::Value(Some(literal.clone()))),
                }
            }
            (AttributeKind::Reference(interface), AttributeValue::Reference(path)) => {
                let target = self.bind_reference(scope, address, descriptor, interface, path)?;
                Ok(if multi {
                    AttributeSlot::References(vec![target])
                } else {
                    AttributeSlot::Reference(target)
                })
            }
            (AttributeKind::Reference(interface), AttributeValue::MultiReference(paths))
                if multi =>
            {
                let targets = paths
                    .iter()
                    .map(|path| self.bind_reference(scope, address, descriptor, interface, path))
                    .collect::<Result<_, _>>()?;
                Ok(AttributeSlot::References(targets))
            }
            (AttributeKind::Factory(interface), AttributeValue::FactoryReference(type_id)) => {
                let factory = self.bind_factory(address, descriptor, interface, type_id)?;
                Ok(AttributeSlot::Factory(factory))
            }
            (kind, value) => Err(wrong_type(format!(
                "{} cannot be bound to a {} attribute",
                describe_value(value),
                describe_kind(kind, multi)
            ))),
        }
    }

    fn bind_reference(
        &mut self,
        scope: ScopeId,
        address: &ComponentAddress,
        descriptor: &AttributeDescriptor,
        interface: InterfaceId,
        path: &ElementPath,
    ) -> Result<Option<ComponentInstance>, Error> {
        let target = match self.locate(scope, address, path) {
            Ok(target) => target,
            Err(err @ Error::UnresolvedReference { .. }) => {
                if descriptor.is_nullable() {
                    tracing::debug!(
                        %address,
                        attribute = %descriptor.name,
                        %path,
                        "unresolved nullable reference bound to none"
                    );
                    return Ok(None);
                }
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        let instance = self.resolve_context(target)?;
        if instance.provides(interface) {
            return Ok(Some(instance));
        }
        if descriptor.is_nullable() {
            tracing::warn!(
                %address,
                attribute = %descriptor.name,
                target = %instance.address(),
                %interface,
                "reference target lacks the declared interface; binding none"
            );
            return Ok(None);
        }
        Err(Error::InterfaceMismatch {
            address: address.clone(),
            attribute: descriptor.name.clone(),
            target: instance.address().to_string(),
            interface: interface.name(),
        })
    }

    fn bind_factory(
        &self,
        address: &ComponentAddress,
        descriptor: &AttributeDescriptor,
        interface: InterfaceId,
        type_id: &ComponentTypeId,
    ) -> Result<Option<ComponentFactory>, Error> {
        let info = match self.types.get(type_id.as_str()) {
            Some(info) => Arc::clone(info),
            None if descriptor.is_nullable() => {
                tracing::debug!(
                    %address,
                    attribute = %descriptor.name,
                    %type_id,
                    "unknown factory type bound to none"
                );
                return Ok(None);
            }
            None => {
                return Err(Error::UnknownComponentType {
                    address: address.clone(),
                    type_id: type_id.clone(),
                });
            }
        };

        if info.provides(interface) {
            return Ok(Some(ComponentFactory::new(
                info,
                self.environment.clone(),
                address.clone(),
            )));
        }
        if descriptor.is_nullable() {
            tracing::warn!(
                %address,
                attribute = %descriptor.name,
                %type_id,
                %interface,
                "factory type lacks the declared interface; binding none"
            );
            return Ok(None);
        }
        Err(Error::InterfaceMismatch {
            address: address.clone(),
            attribute: descriptor.name.clone(),
            target: type_id.to_string(),
            interface: interface.name(),
        })
    }
}

fn describe_value(value: &AttributeValue) -> &'static str {
    match value {
        AttributeValue::Literal(_) => "a literal",
        AttributeValue::Reference(_) => "a reference",
        AttributeValue::MultiReference(_) => "a multi-reference",
        AttributeValue::FactoryReference(_) => "a factory reference",
    }
}

fn describe_kind(kind: AttributeKind, multi: bool) -> String {
    let base = match kind {
        AttributeKind::Value(value_type) => value_type.name().to_string(),
        AttributeKind::Reference(interface) => format!("`{interface}` reference"),
        AttributeKind::Factory(interface) => format!("`{interface}` factory"),
    };
    if multi { format!("multi {base}") } else { base }
}
