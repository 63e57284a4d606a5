use super::exception::{Exception, ExceptionClass};
use super::kind::builtin;
use super::payload::{ErrorPayload, FieldValue};
use crate::trace::{splice, StackFrame, StackTrace};
use parking_lot::RwLock;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Produces a class the first time its identifier is resolved.
///
/// Returning `None` marks the identifier unresolvable for good.
pub type ClassLoader = Arc<dyn Fn(&ExceptionRegistry) -> Option<ExceptionClass> + Send + Sync>;

enum Entry {
    Loaded(Arc<ExceptionClass>),
    Deferred(ClassLoader),
    Failed,
}

/// Maps exception type identifiers to classes.
///
/// Every registry starts with the builtin hierarchy rooted at
/// `RuntimeException` (plus the standalone `AssertionError`); the generic
/// fallback class is always present.
pub struct ExceptionRegistry {
    entries: RwLock<HashMap<String, Entry>>,
    generic: Arc<ExceptionClass>,
}

static GLOBAL_REGISTRY: OnceLock<Arc<ExceptionRegistry>> = OnceLock::new();

thread_local! {
    // (registry address, identifier) for every loader running on this thread
    static LOADING: RefCell<Vec<(usize, String)>> = RefCell::new(Vec::new());
}

/// Marks `name` as loading on this thread until dropped.
struct LoadingGuard {
    key: (usize, String),
}

impl LoadingGuard {
    /// `None` if this thread is already inside the loader for `name`.
    fn enter(registry: &ExceptionRegistry, name: &str) -> Option<LoadingGuard> {
        let key = (registry as *const ExceptionRegistry as usize, name.to_string());
        LOADING.with(|loading| {
            let mut loading = loading.borrow_mut();
            if loading.contains(&key) {
                return None;
            }
            loading.push(key.clone());
            Some(LoadingGuard { key })
        })
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        LOADING.with(|loading| {
            let mut loading = loading.borrow_mut();
            if let Some(pos) = loading.iter().rposition(|k| *k == self.key) {
                loading.remove(pos);
            }
        });
    }
}

impl ExceptionRegistry {
    pub fn with_builtins() -> Self {
        let generic = Arc::new(ExceptionClass::new(builtin::GENERIC));
        let registry = Self {
            entries: RwLock::new(HashMap::new()),
            generic: generic.clone(),
        };

        registry.register_class(generic.clone());
        for name in [
            builtin::ILLEGAL_ARGUMENT,
            builtin::ILLEGAL_STATE,
            builtin::NULL_POINTER,
            builtin::UNSUPPORTED_OPERATION,
        ] {
            registry.register(ExceptionClass::new(name).extends(generic.clone()));
        }
        registry.register(ExceptionClass::new(builtin::ASSERTION_ERROR));

        registry
    }

    /// The process-wide registry, holding only the builtins until callers
    /// register their own types.
    pub fn global() -> Arc<ExceptionRegistry> {
        GLOBAL_REGISTRY
            .get_or_init(|| Arc::new(ExceptionRegistry::with_builtins()))
            .clone()
    }

    pub fn register(&self, class: ExceptionClass) -> Arc<ExceptionClass> {
        let class = Arc::new(class);
        self.register_class(class.clone());
        class
    }

    fn register_class(&self, class: Arc<ExceptionClass>) {
        self.entries
            .write()
            .insert(class.name().to_string(), Entry::Loaded(class));
    }

    /// Register an identifier whose class is only built when first needed.
    pub fn register_deferred<F>(&self, name: impl Into<String>, loader: F)
    where
        F: Fn(&ExceptionRegistry) -> Option<ExceptionClass> + Send + Sync + 'static,
    {
        self.entries
            .write()
            .insert(name.into(), Entry::Deferred(Arc::new(loader)));
    }

    pub fn is_registered(&self, name: &str) -> bool {
        matches!(
            self.entries.read().get(name),
            Some(Entry::Loaded(_)) | Some(Entry::Deferred(_))
        )
    }

    /// Whether `name` has been resolved to a class already.
    pub fn is_loaded(&self, name: &str) -> bool {
        matches!(self.entries.read().get(name), Some(Entry::Loaded(_)))
    }

    /// The class for `name`, running its deferred loader on first use.
    ///
    /// A loader that ends up resolving its own identifier again on the same
    /// thread gets `None` for the inner lookup; the outer load is unaffected.
    pub fn resolve(&self, name: &str) -> Option<Arc<ExceptionClass>> {
        let loader = match self.entries.read().get(name) {
            Some(Entry::Loaded(class)) => return Some(class.clone()),
            Some(Entry::Deferred(loader)) => loader.clone(),
            Some(Entry::Failed) | None => return None,
        };

        let Some(_loading) = LoadingGuard::enter(self, name) else {
            tracing::debug!(class = name, "exception class resolved while loading itself");
            return None;
        };

        // Run the loader without holding the lock; it may resolve its own
        // superclass through this registry.
        let loaded = loader(self).map(Arc::new);

        let mut entries = self.entries.write();
        match entries.get(name) {
            // someone else finished first
            Some(Entry::Loaded(class)) => Some(class.clone()),
            _ => match loaded {
                Some(class) if class.name() == name => {
                    tracing::debug!(class = name, "loaded deferred exception class");
                    entries.insert(name.to_string(), Entry::Loaded(class.clone()));
                    Some(class)
                }
                other => {
                    tracing::warn!(
                        class = name,
                        produced = ?other.as_ref().map(|c| c.name()),
                        "deferred exception class failed to load"
                    );
                    entries.insert(name.to_string(), Entry::Failed);
                    None
                }
            },
        }
    }

    pub fn generic_class(&self) -> &Arc<ExceptionClass> {
        &self.generic
    }

    /// Turn a failure payload into the exception the caller will see, with
    /// the payload's trace spliced onto `call_site`.
    pub fn marshal(&self, payload: &ErrorPayload, call_site: &StackTrace) -> Exception {
        let stack_trace = splice(call_site, payload.trace());

        let target = payload
            .type_id()
            .or_else(|| payload.kind().builtin_class());

        if let Some(name) = target {
            match self.resolve(name) {
                Some(class) => {
                    match Exception::construct(
                        class,
                        payload.kind().clone(),
                        payload.message(),
                        payload.fields().clone(),
                        stack_trace.clone(),
                    ) {
                        Ok(exception) => return exception,
                        Err(err) => {
                            tracing::warn!(class = name, error = %err, "falling back to generic exception");
                        }
                    }
                }
                None => {
                    tracing::warn!(class = name, "exception class not resolvable; falling back to generic exception");
                }
            }
        }

        self.generic_exception(payload, payload.type_id(), stack_trace)
    }

    fn generic_exception(
        &self,
        payload: &ErrorPayload,
        unresolved: Option<&str>,
        stack_trace: Vec<StackFrame>,
    ) -> Exception {
        let mut fields = payload.fields().clone();
        fields.insert("kind".to_string(), FieldValue::from(payload.kind().name()));
        if let Some(name) = unresolved {
            fields.insert("unresolved_type".to_string(), FieldValue::from(name));
        }

        let message = format!("{}: {}", payload.kind(), payload.message());

        // the generic class has no constructor fields to check
        Exception::from_parts(self.generic.clone(), payload.kind().clone(), message, fields, stack_trace)
    }
}

impl Default for ExceptionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for ExceptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.entries.read();
        let mut names: Vec<_> = entries.keys().cloned().collect();
        names.sort();
        f.debug_struct("ExceptionRegistry").field("entries", &names).finish()
    }
}
