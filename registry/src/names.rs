use std::{borrow::Borrow, fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::error::Error;

pub(crate) fn ensure_element_name(name: &str, kind: &'static str) -> Result<(), Error> {
    let reason = if name.is_empty() {
        "names must be non-empty"
    } else if name.contains('/') {
        "`/` is the path separator"
    } else if name == "." || name == ".." {
        "`.` and `..` are reserved path segments"
    } else {
        return Ok(());
    };
    Err(Error::InvalidName {
        kind,
        name: name.to_string(),
        reason,
    })
}

pub(crate) fn ensure_type_id(name: &str, kind: &'static str) -> Result<(), Error> {
    if name.trim().is_empty() {
        return Err(Error::InvalidName {
            kind,
            name: name.to_string(),
            reason: "names must be non-empty",
        });
    }
    Ok(())
}

macro_rules! name_type {
    ($(#[$meta:meta])* $name:ident, $kind:expr, $check:path) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(Arc<str>);

        impl $name {
            pub fn new(name: impl Into<String>) -> Result<Self, Error> {
                let name = name.into();
                $check(&name, $kind)?;
                Ok(Self(Arc::from(name)))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = Error;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = Error;

            fn try_from(value: &str) -> Result<Self, Self::Error> {
                $check(value, $kind)?;
                Ok(Self(Arc::from(value)))
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0.to_string()
            }
        }

        impl From<&$name> for String {
            fn from(value: &$name) -> Self {
                value.0.to_string()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

name_type!(
    /// Name of an element, unique within its registry.
    ElementName,
    "element",
    ensure_element_name
);
name_type!(
    /// Opaque, stable identifier of a component implementation.
    ComponentTypeId,
    "component type",
    ensure_type_id
);
