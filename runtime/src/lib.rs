//! Resolution of component registries into live component graphs.
//!
//! A [`Session`] binds a [`Registry`](trellis_registry::Registry) to a frozen
//! [`ComponentTypes`](trellis_component::ComponentTypes) set and an [`Environment`].
//! Components are constructed lazily, at most once, when first requested or referenced.


mod binding;
mod context;
mod error;
mod session;

pub use context::{ComponentContext, ContextState};
pub use error::Error;
pub use session::Session;
pub use trellis_component::Environment;
