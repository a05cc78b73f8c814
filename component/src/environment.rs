use std::{any::Any, collections::HashMap, fmt, sync::Arc};

type Service = Arc<dyn Any + Send + Sync>;

/// Host-provided services (clocks, file systems, ...) that components look up by id.
///
/// Components only read it: the session and every factory hold clones of one table. Inserting
/// into a clone that is still shared copies the table first, so sessions already holding the
/// environment never see later registrations.
#[derive(Clone, Default)]
pub struct Environment {
    inner: Arc<HashMap<Arc<str>, Service>>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `service` under `id`. `T` may be a trait object, e.g. `Arc<dyn Clock>`.
    pub fn insert<T>(&mut self, id: impl Into<Arc<str>>, service: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.inner).insert(id.into(), Arc::new(service));
    }

    pub fn with<T>(mut self, id: impl Into<Arc<str>>, service: Arc<T>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.insert(id, service);
        self
    }

    /// The service registered under `id`, if it was registered as an `Arc<T>`.
    pub fn get_service<T>(&self, id: &str) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.inner.get(id)?.downcast_ref::<Arc<T>>().cloned()
    }

    /// Type-erased lookup; the value is the `Arc<T>` passed to [`Environment::insert`].
    pub fn get_service_any(&self, id: &str) -> Option<&(dyn Any + Send + Sync)> {
        self.inner.get(id).map(|service| &**service)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.contains_key(id)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn service_ids(&self) -> impl Iterator<Item = &str> {
        self.inner.keys().map(|id| &**id)
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&str> = self.service_ids().collect();
        ids.sort_unstable();
        f.debug_struct("Environment").field("services", &ids).finish()
    }
}
