use std::{
    any::{Any, TypeId},
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

/// Marker for capability trait objects (`dyn Trait`) that components can export.
///
/// Implement it with [`declare_interface!`](crate::declare_interface); `NAME` is the stable
/// identity written into registry export tables.
pub trait Interface: 'static {
    const NAME: &'static str;
}

/// Declares `dyn $trait` as an [`Interface`].
///
/// ```ignore
/// pub trait NumberSource: Send + Sync {
///     fn value(&self) -> i64;
/// }
/// trellis_component::declare_interface!(NumberSource);
/// ```
#[macro_export]
macro_rules! declare_interface {
    ($iface:ident) => {
        $crate::declare_interface!($iface, stringify!($iface));
    };
    ($iface:ident, $name:expr) => {
        impl $crate::Interface for dyn $iface {
            const NAME: &'static str = $name;
        }
    };
}

/// Runtime identity of an [`Interface`]. Equal iff the underlying trait object types are.
#[derive(Clone, Copy)]
pub struct InterfaceId {
    name: &'static str,
    type_id: TypeId,
}

impl InterfaceId {
    pub fn of<I: Interface + ?Sized>() -> Self {
        Self {
            name: I::NAME,
            type_id: TypeId::of::<I>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }
}

impl PartialEq for InterfaceId {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for InterfaceId {}

impl Hash for InterfaceId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InterfaceId({})", self.name)
    }
}

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

pub(crate) type ErasedObject = Arc<dyn Any + Send + Sync>;

type ExtractFn = dyn Fn(&ErasedObject) -> Option<Box<dyn Any>> + Send + Sync;

/// Static witness that a concrete component type implements one interface.
///
/// Extraction downcasts the erased object to the concrete type the extractor was built for
/// and applies the cast; any other object yields `None`.
#[derive(Clone)]
pub struct InterfaceExtractor {
    id: InterfaceId,
    extract: Arc<ExtractFn>,
}

impl InterfaceExtractor {
    pub(crate) fn new<C, I>(cast: fn(Arc<C>) -> Arc<I>) -> Self
    where
        C: Any + Send + Sync,
        I: Interface + ?Sized,
    {
        Self {
            id: InterfaceId::of::<I>(),
            extract: Arc::new(move |object: &ErasedObject| {
                let concrete = Arc::clone(object).downcast::<C>().ok()?;
                Some(Box::new(cast(concrete)) as Box<dyn Any>)
            }),
        }
    }

    pub fn id(&self) -> InterfaceId {
        self.id
    }

    /// Returns a boxed `Arc<I>` for the extractor's interface `I`, or `None`.
    pub(crate) fn extract(&self, object: &ErasedObject) -> Option<Box<dyn Any>> {
        (self.extract)(object)
    }
}

impl fmt::Debug for InterfaceExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceExtractor")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
