use bitflags::bitflags;
use serde_json::Value;

use crate::interface::{Interface, InterfaceId};

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct AttributeFlags: u32 {
        /// Written out when the owning registry is stored.
        const PERSISTENT = 1;
        /// May be left unbound; unresolvable references bind `None` instead of failing.
        const NULLABLE = 1 << 1;
        /// Holds an ordered sequence of slots instead of a single one.
        const MULTI = 1 << 2;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    Bool,
    Integer,
    Real,
    String,
    /// Any JSON value, passed through untouched.
    Any,
}

impl ValueType {
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Bool => value.is_boolean(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Real => value.is_number(),
            Self::String => value.is_string(),
            Self::Any => true,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Integer => "integer",
            Self::Real => "real",
            Self::String => "string",
            Self::Any => "any",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    /// Inline literal of the given type.
    Value(ValueType),
    /// Another component, bound through the given interface.
    Reference(InterfaceId),
    /// A factory producing fresh components that provide the given interface.
    Factory(InterfaceId),
}

/// Declaration of one attribute of a component type.
#[derive(Clone, Debug, PartialEq, bon::Builder)]
#[builder(on(String, into))]
pub struct AttributeDescriptor {
    pub name: String,
    pub kind: AttributeKind,
    #[builder(default)]
    pub flags: AttributeFlags,
    /// Used when the registry leaves the attribute unset. Only meaningful for value attributes.
    pub default: Option<Value>,
    #[builder(default)]
    pub description: String,
    /// Names of attributes of the same component this one constrains or derives from.
    #[builder(default)]
    pub related: Vec<String>,
}

impl AttributeDescriptor {
    pub fn value(name: impl Into<String>, value_type: ValueType) -> Self {
        Self::builder()
            .name(name)
            .kind(AttributeKind::Value(value_type))
            .build()
    }

    pub fn reference<I: Interface + ?Sized>(name: impl Into<String>) -> Self {
        Self::builder()
            .name(name)
            .kind(AttributeKind::Reference(InterfaceId::of::<I>()))
            .build()
    }

    pub fn factory<I: Interface + ?Sized>(name: impl Into<String>) -> Self {
        Self::builder()
            .name(name)
            .kind(AttributeKind::Factory(InterfaceId::of::<I>()))
            .build()
    }

    pub fn with_flags(mut self, flags: AttributeFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn is_nullable(&self) -> bool {
        self.flags.contains(AttributeFlags::NULLABLE)
    }

    pub fn is_multi(&self) -> bool {
        self.flags.contains(AttributeFlags::MULTI)
    }

    pub fn is_persistent(&self) -> bool {
        self.flags.contains(AttributeFlags::PERSISTENT)
    }

    /// Interface a reference or factory attribute binds through.
    pub fn interface(&self) -> Option<InterfaceId> {
        match self.kind {
            AttributeKind::Reference(id) | AttributeKind::Factory(id) => Some(id),
            AttributeKind::Value(_) => None,
        }
    }

    /// Checks a literal against the declared type; MULTI attributes take an array of items.
    pub fn check_literal(&self, value: &Value) -> Result<(), String> {
        let AttributeKind::Value(value_type) = self.kind else {
            return Err("only value attributes accept literals".to_string());
        };
        if self.is_multi() {
            let Some(items) = value.as_array() else {
                return Err(format!("expected an array of {}", value_type.name()));
            };
            return match items.iter().position(|item| !value_type.accepts(item)) {
                Some(idx) => Err(format!("item {idx} is not of type {}", value_type.name())),
                None => Ok(()),
            };
        }
        if value_type.accepts(value) {
            Ok(())
        } else {
            Err(format!("expected {}, found {value}", value_type.name()))
        }
    }
}
