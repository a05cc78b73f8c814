#[cfg(test)]
mod tests;

mod attribute;
mod creation;
mod environment;
mod error;
mod info;
mod instance;
mod interface;
mod types;

pub use attribute::{AttributeDescriptor, AttributeFlags, AttributeKind, ValueType};
pub use creation::{AttributeSlot, AttributeSlots, ComponentFactory, CreationContext, OwnedComponent};
pub use environment::Environment;
pub use error::{BoxError, Error};
pub use info::{ComponentInfoBuilder, StaticComponentInfo};
pub use instance::{Component, ComponentInstance};
pub use interface::{Interface, InterfaceExtractor, InterfaceId};
pub use types::{ComponentLibrary, ComponentTypes, ComponentTypesBuilder, LibraryDescriptor};
