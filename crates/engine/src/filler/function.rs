//! Named bulk enrichment functions.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use viewforge_registry::{ConfigurationError, ViewRegistry};
use viewforge_types::ValueKind;

/// Fetches the results for a batch of keys in one call.
///
/// Results may come back in any order and may omit keys; each result is
/// matched back to its key through the function's [`ResultKey`].
#[async_trait]
pub trait BulkFetch: Send + Sync {
    async fn fetch(&self, keys: Vec<Value>) -> anyhow::Result<Vec<Value>>;
}

/// Adapts a synchronous closure into a [`BulkFetch`].
///
/// The closure runs on tokio's blocking pool, so a blocking call can be timed
/// out or cancelled from the async side. An abandoned call keeps its blocking
/// thread until the closure returns.
pub struct FnFetch<F>(Arc<F>);

impl<F> FnFetch<F> {
    pub fn new(fetch: F) -> Self {
        Self(Arc::new(fetch))
    }
}

#[async_trait]
impl<F> BulkFetch for FnFetch<F>
where
    F: Fn(Vec<Value>) -> anyhow::Result<Vec<Value>> + Send + Sync + 'static,
{
    async fn fetch(&self, keys: Vec<Value>) -> anyhow::Result<Vec<Value>> {
        let fetch = Arc::clone(&self.0);
        match tokio::task::spawn_blocking(move || fetch(keys)).await {
            Ok(results) => results,
            Err(error) if error.is_panic() => std::panic::resume_unwind(error.into_panic()),
            Err(error) => Err(anyhow::anyhow!("blocking fetch did not complete: {error}")),
        }
    }
}

/// Derives the key a result answers for.
#[derive(Clone)]
pub enum ResultKey {
    /// Top-level property of an object result.
    Field(String),
    Custom(Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>),
}

impl ResultKey {
    pub fn field(name: impl Into<String>) -> Self {
        ResultKey::Field(name.into())
    }

    pub fn custom<F>(extract: F) -> Self
    where
        F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    {
        ResultKey::Custom(Arc::new(extract))
    }

    pub fn extract(&self, result: &Value) -> Option<Value> {
        let key = match self {
            ResultKey::Field(name) => result.get(name).cloned(),
            ResultKey::Custom(extract) => extract(result),
        };
        key.filter(|key| !key.is_null())
    }
}

impl fmt::Debug for ResultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultKey::Field(name) => f.debug_tuple("Field").field(name).finish(),
            ResultKey::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// A bulk fetch registered under a name that field bindings refer to.
#[derive(Clone)]
pub struct EnrichmentFunction {
    name: String,
    fetch: Arc<dyn BulkFetch>,
    result_key: ResultKey,
    result_kind: ValueKind,
}

impl EnrichmentFunction {
    /// Creates a function whose results are JSON objects.
    pub fn new(name: impl Into<String>, result_key: ResultKey, fetch: impl BulkFetch + 'static) -> Self {
        Self {
            name: name.into(),
            fetch: Arc::new(fetch),
            result_key,
            result_kind: ValueKind::Object,
        }
    }

    /// Creates a function from a synchronous closure.
    pub fn from_fn<F>(name: impl Into<String>, result_key: ResultKey, fetch: F) -> Self
    where
        F: Fn(Vec<Value>) -> anyhow::Result<Vec<Value>> + Send + Sync + 'static,
    {
        Self::new(name, result_key, FnFetch::new(fetch))
    }

    /// Declares the kind of value each result is.
    pub fn with_result_kind(mut self, kind: ValueKind) -> Self {
        self.result_kind = kind;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn result_key(&self) -> &ResultKey {
        &self.result_key
    }

    pub fn result_kind(&self) -> ValueKind {
        self.result_kind
    }

    pub(crate) fn fetcher(&self) -> Arc<dyn BulkFetch> {
        Arc::clone(&self.fetch)
    }
}

impl fmt::Debug for EnrichmentFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnrichmentFunction")
            .field("name", &self.name)
            .field("result_key", &self.result_key)
            .field("result_kind", &self.result_kind)
            .finish()
    }
}

/// Functions available to the filler, looked up by name.
///
/// Cloning is cheap; clones share the same table until one of them registers
/// another function.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: Arc<IndexMap<String, EnrichmentFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a function.
    ///
    /// # Errors
    /// Fails when the name is taken, or when results are matched by a
    /// property but are declared as something other than objects.
    pub fn register(&mut self, function: EnrichmentFunction) -> Result<(), ConfigurationError> {
        if self.functions.contains_key(function.name()) {
            return Err(ConfigurationError::duplicate_function(function.name()));
        }
        if let ResultKey::Field(key) = function.result_key()
            && !matches!(function.result_kind(), ValueKind::Object | ValueKind::Any)
        {
            return Err(ConfigurationError::ResultKeyOnNonObject {
                function: function.name().to_string(),
                key: key.clone(),
                result_kind: function.result_kind().to_string(),
            });
        }
        Arc::make_mut(&mut self.functions).insert(function.name.clone(), function);
        Ok(())
    }

    /// Builder form of [`FunctionRegistry::register`].
    pub fn with(mut self, function: EnrichmentFunction) -> Result<Self, ConfigurationError> {
        self.register(function)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&EnrichmentFunction> {
        self.functions.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Checks every enrichment binding in `registry` against these functions.
    ///
    /// The filler performs the same checks per record; running this at
    /// startup surfaces mistakes before any view is resolved.
    pub fn check_bindings(&self, registry: &ViewRegistry) -> Result<(), ConfigurationError> {
        for view_type in registry.view_types() {
            let descriptor = registry.describe(view_type)?;
            for binding in descriptor.bindings() {
                let Some(enrichment) = &binding.enrichment else {
                    continue;
                };
                let function = self.get(&enrichment.function).ok_or_else(|| ConfigurationError::UnknownFunction {
                    view_type: view_type.to_string(),
                    field: binding.name.clone(),
                    function: enrichment.function.clone(),
                })?;
                let result_kind = function.result_kind();
                if !binding.kind.can_hold_one(result_kind) && !binding.kind.can_hold_many(result_kind) {
                    return Err(ConfigurationError::IncompatibleEnrichmentTarget {
                        view_type: view_type.to_string(),
                        field: binding.name.clone(),
                        function: function.name().to_string(),
                        field_kind: binding.kind.to_string(),
                        result_kind: result_kind.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Canonical form of a key used for grouping and result matching.
///
/// Keys compare by their compact JSON rendering, so `1` and `1.0` are
/// distinct while object keys compare regardless of insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct EnrichmentKey(String);

impl EnrichmentKey {
    pub(crate) fn of(value: &Value) -> Self {
        Self(canonical(value))
    }
}

fn canonical(value: &Value) -> String {
    match value {
        Value::Object(entries) => {
            let mut keys: Vec<&String> = entries.keys().collect();
            keys.sort();
            let body: Vec<String> = keys
                .into_iter()
                .map(|key| format!("{}:{}", Value::String(key.clone()), canonical(&entries[key])))
                .collect();
            format!("{{{}}}", body.join(","))
        }
        Value::Array(items) => format!("[{}]", items.iter().map(canonical).collect::<Vec<_>>().join(",")),
        scalar => scalar.to_string(),
    }
}
