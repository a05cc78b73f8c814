use miette::Diagnostic;
use thiserror::Error;
use trellis_registry::{ComponentAddress, ComponentTypeId};

/// Error type component code reports through factories and lifecycle hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum Error {
    #[error("component type `{type_id}` is already registered with different metadata")]
    #[diagnostic(code(component::duplicate_registration))]
    DuplicateRegistration { type_id: ComponentTypeId },

    #[error("component type `{type_id}` declares attribute `{attribute}` more than once")]
    #[diagnostic(code(component::duplicate_attribute))]
    DuplicateAttribute {
        type_id: ComponentTypeId,
        attribute: String,
    },

    #[error("component type `{type_id}` registers interface `{interface}` more than once")]
    #[diagnostic(code(component::duplicate_interface))]
    DuplicateInterface {
        type_id: ComponentTypeId,
        interface: &'static str,
    },

    #[error(
        "attribute `{attribute}` of `{type_id}` is related to undeclared attribute `{related}`"
    )]
    #[diagnostic(code(component::unknown_related_attribute))]
    UnknownRelatedAttribute {
        type_id: ComponentTypeId,
        attribute: String,
        related: String,
    },

    #[error("invalid default for attribute `{attribute}` of `{type_id}`: {message}")]
    #[diagnostic(code(component::invalid_default))]
    InvalidDefault {
        type_id: ComponentTypeId,
        attribute: String,
        message: String,
    },

    #[error("component library `{name}` is already loaded")]
    #[diagnostic(code(component::duplicate_library))]
    DuplicateLibrary { name: String },

    #[error("required attribute `{attribute}` of {address} has no value")]
    #[diagnostic(code(component::missing_attribute))]
    MissingAttribute {
        address: ComponentAddress,
        attribute: String,
    },

    #[error("failed to initialize {address} (`{type_id}`)")]
    #[diagnostic(code(component::initialization))]
    ComponentInitialization {
        address: ComponentAddress,
        type_id: ComponentTypeId,
        #[source]
        source: BoxError,
    },

    #[error("cannot read attribute `{attribute}`: {message}")]
    #[diagnostic(code(component::attribute_access))]
    AttributeAccess { attribute: String, message: String },
}

impl Error {
    pub(crate) fn access(attribute: &str, message: impl Into<String>) -> Self {
        Self::AttributeAccess {
            attribute: attribute.to_string(),
            message: message.into(),
        }
    }
}
