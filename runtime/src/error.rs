use miette::Diagnostic;
use thiserror::Error;
use trellis_component::BoxError;
use trellis_registry::{ComponentAddress, ComponentTypeId};

#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum Error {
    #[error("{address} sets attribute `{attribute}`, which `{type_id}` does not declare")]
    #[diagnostic(code(runtime::unknown_attribute))]
    UnknownAttribute {
        address: ComponentAddress,
        type_id: ComponentTypeId,
        attribute: String,
    },

    #[error("reference `{path}` from {from} does not resolve: {reason}")]
    #[diagnostic(code(runtime::unresolved_reference))]
    UnresolvedReference {
        from: ComponentAddress,
        path: String,
        reason: &'static str,
    },

    #[error("attribute `{attribute}` of {address} needs `{interface}`, which `{target}` does not provide")]
    #[diagnostic(code(runtime::interface_mismatch))]
    InterfaceMismatch {
        address: ComponentAddress,
        attribute: String,
        target: String,
        interface: &'static str,
    },

    #[error("required attribute `{attribute}` of {address} has no value and no default")]
    #[diagnostic(code(runtime::missing_attribute))]
    MissingAttribute {
        address: ComponentAddress,
        attribute: String,
    },

    #[error("cyclic dependency: {}", display_cycle(.cycle))]
    #[diagnostic(code(runtime::cyclic_dependency))]
    CyclicDependency { cycle: Vec<ComponentAddress> },

    #[error("failed to initialize {address} (`{type_id}`)")]
    #[diagnostic(code(runtime::component_initialization))]
    ComponentInitialization {
        address: ComponentAddress,
        type_id: ComponentTypeId,
        #[source]
        source: BoxError,
    },

    #[error("{address} uses unregistered component type `{type_id}`")]
    #[diagnostic(code(runtime::unknown_component_type))]
    UnknownComponentType {
        address: ComponentAddress,
        type_id: ComponentTypeId,
    },

    #[error("attribute `{attribute}` of {address} has the wrong type: {message}")]
    #[diagnostic(code(runtime::attribute_type))]
    AttributeType {
        address: ComponentAddress,
        attribute: String,
        message: String,
    },

    #[error("{address} has already been destroyed")]
    #[diagnostic(code(runtime::context_destroyed))]
    ContextDestroyed { address: ComponentAddress },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Registry(#[from] trellis_registry::Error),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Component(#[from] trellis_component::Error),
}

fn display_cycle(cycle: &[ComponentAddress]) -> String {
    cycle
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}
