//! Application settings and locals.
//!
//! Both maps are shared by every request in flight. Writes replace the whole map atomically
//! (`arc-swap`), readers never block: the last write wins and is visible to requests dispatched
//! after it, there is no ordering between writes of unrelated requests.

use crate::error::ConfigError;
use arc_swap::ArcSwap;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Well known setting names.
pub mod keys {
    /// `bool`, read when a router is created by the application
    pub const CASE_SENSITIVE_ROUTING: &str = "case sensitive routing";
    /// `bool`, read when a router is created by the application
    pub const STRICT_ROUTING: &str = "strict routing";
    /// `string`, `production` hides error details, `test` silences unhandled error logs
    pub const ENV: &str = "env";
    /// `string`, directory views are resolved against
    pub const VIEWS: &str = "views";
    /// `string`, extension used for views named without one
    pub const VIEW_ENGINE: &str = "view engine";
    /// `bool`, adds the `X-Powered-By` response header
    pub const X_POWERED_BY: &str = "x-powered-by";
    /// `number`, indentation used by `Response::json`, compact output when unset
    pub const JSON_SPACES: &str = "json spaces";
}

/// environment variable the `env` setting is initialised from
pub const ENV_VAR: &str = "MICRO_CHAIN_ENV";

const DEFAULT_ENV: &str = "development";
const DEFAULT_VIEWS: &str = "views";

/// A string keyed map of JSON values with lock free reads and copy on write updates.
struct SharedMap {
    inner: ArcSwap<Map<String, Value>>,
}

impl SharedMap {
    fn new(map: Map<String, Value>) -> Self {
        Self { inner: ArcSwap::from_pointee(map) }
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.inner.load().get(key).cloned()
    }

    fn set(&self, key: String, value: Value) {
        self.inner.rcu(|current| {
            let mut next = Map::clone(current);
            next.insert(key.clone(), value.clone());
            next
        });
    }

    fn remove(&self, key: &str) -> Option<Value> {
        let previous = self.inner.rcu(|current| {
            let mut next = Map::clone(current);
            next.remove(key);
            next
        });
        previous.get(key).cloned()
    }

    fn extend(&self, values: Map<String, Value>) {
        self.inner.rcu(|current| {
            let mut next = Map::clone(current);
            next.extend(values.clone());
            next
        });
    }

    fn snapshot(&self) -> Arc<Map<String, Value>> {
        self.inner.load_full()
    }
}

/// Application settings, see [`keys`] for the settings the engine itself reads.
pub struct Settings {
    values: SharedMap,
}

impl Settings {
    /// Settings with the engine defaults, `env` is read from [`ENV_VAR`].
    pub fn new() -> Self {
        let env = std::env::var(ENV_VAR).unwrap_or_else(|_| DEFAULT_ENV.to_owned());
        Self::with_env(env)
    }

    fn with_env(env: String) -> Self {
        let mut defaults = Map::new();
        defaults.insert(keys::ENV.to_owned(), Value::String(env));
        defaults.insert(keys::VIEWS.to_owned(), Value::String(DEFAULT_VIEWS.to_owned()));
        defaults.insert(keys::X_POWERED_BY.to_owned(), Value::Bool(true));
        defaults.insert(keys::CASE_SENSITIVE_ROUTING.to_owned(), Value::Bool(false));
        defaults.insert(keys::STRICT_ROUTING.to_owned(), Value::Bool(false));
        Self { values: SharedMap::new(defaults) }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key)
    }

    /// Returns a string setting, `None` when unset or not a string
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.values.get(key) {
            Some(Value::String(value)) => Some(value),
            _ => None,
        }
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.set(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn enable(&self, key: impl Into<String>) {
        self.set(key, true);
    }

    pub fn disable(&self, key: impl Into<String>) {
        self.set(key, false);
    }

    /// Whether the setting holds a truthy value: not `null`, `false`, `0` or `""`.
    pub fn enabled(&self, key: &str) -> bool {
        self.values.get(key).is_some_and(|value| is_truthy(&value))
    }

    pub fn disabled(&self, key: &str) -> bool {
        !self.enabled(key)
    }

    /// The `env` setting
    pub fn env(&self) -> String {
        self.get_str(keys::ENV).unwrap_or_else(|| DEFAULT_ENV.to_owned())
    }

    /// Merges a JSON object into the settings, keys present in `json` overwrite current values.
    pub fn load_json(&self, json: &str) -> Result<(), ConfigError> {
        let values: Map<String, Value> = serde_json::from_str(json)?;
        self.values.extend(values);
        Ok(())
    }

    /// A consistent view of every setting at this instant
    pub fn snapshot(&self) -> Arc<Map<String, Value>> {
        self.values.snapshot()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Settings").field(&self.snapshot()).finish()
    }
}

/// Values shared with every request and every rendered view.
pub struct Locals {
    values: SharedMap,
}

impl Locals {
    pub fn new() -> Self {
        Self { values: SharedMap::new(Map::new()) }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key)
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.set(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn snapshot(&self) -> Arc<Map<String, Value>> {
        self.values.snapshot()
    }
}

impl Default for Locals {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Locals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Locals").field(&self.snapshot()).finish()
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
