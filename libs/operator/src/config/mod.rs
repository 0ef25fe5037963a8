//! Hierarchical configuration store: flat dotted keys over scalars or
//! nested sections, overridable by environment variables (§2.2a).
//!
//! Grounded on the `config` crate's layered-source model. Writes are
//! restricted to the boot phase (`configure_from_spec`) and to readiness
//! callbacks appending discovered endpoints (§5's shared-resource rule);
//! both paths go through [`ConfigStore::record_endpoint`] or
//! [`ConfigStore::configure_from_spec`], never through a raw setter, so the
//! "concurrent tenant handlers never mutate non-tenant sections" invariant
//! holds by construction.

pub mod defaults;
pub mod keys;

use std::collections::HashMap;
use std::sync::RwLock;

use config::{Config, Environment, Value, ValueKind};
use serde::de::DeserializeOwned;

use crate::crd::whisk::WhiskSpec;
use crate::error::{Error, Result};

/// Process-wide configuration, populated once at boot and then only
/// appended to by component readiness callbacks.
pub struct ConfigStore {
    inner: RwLock<Config>,
}

impl ConfigStore {
    /// Builds the store from built-in defaults plus `WHISK_`-prefixed
    /// environment overrides. Does not yet know about any particular
    /// `Whisk` resource; call [`Self::configure_from_spec`] once one is
    /// reconciled.
    pub fn bootstrap() -> Result<Self> {
        let config = defaults::seed()?
            .into_builder()
            .add_source(Environment::with_prefix("WHISK").separator("__"))
            .build()?;
        Ok(Self {
            inner: RwLock::new(config),
        })
    }

    /// Merges a `WhiskSpec`'s operator hints into the store. Called once
    /// per `Whisk` create/resume; never called concurrently with itself
    /// for the same resource, since the framework serializes handlers per
    /// resource (§5).
    pub fn configure_from_spec(&self, spec: &WhiskSpec) -> Result<()> {
        let mut overrides = HashMap::new();
        overrides.insert("runtime".to_owned(), Value::new(None, runtime_str(spec)));
        if let Some(sc) = &spec.storage_class {
            overrides.insert("storage_class".to_owned(), Value::new(None, sc.clone()));
        }
        overrides.insert("api_host".to_owned(), Value::new(None, spec.api_host.clone()));

        let mut guard = self.inner.write().expect("config store lock poisoned");
        let current = guard.clone();
        let mut builder = current.into_builder();
        for (key, value) in overrides {
            builder = builder
                .set_override(key, value)
                .map_err(Error::ConfigError)?;
        }
        *guard = builder.build().map_err(Error::ConfigError)?;
        Ok(())
    }

    /// Appends (or overwrites) a single discovered endpoint key, e.g.
    /// `s3_host` once the object store reports ready. This is the bounded
    /// write interface §9 calls for in place of free-form mutation.
    pub fn record_endpoint(&self, key: &str, value: impl Into<String>) -> Result<()> {
        let mut guard = self.inner.write().expect("config store lock poisoned");
        let current = guard.clone();
        *guard = current
            .into_builder()
            .set_override(key, value.into())
            .map_err(Error::ConfigError)?
            .build()
            .map_err(Error::ConfigError)?;
        Ok(())
    }

    pub fn get_string(&self, key: &str) -> Result<String> {
        self.inner
            .read()
            .expect("config store lock poisoned")
            .get_string(key)
            .map_err(Error::ConfigError)
    }

    pub fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_string(key).unwrap_or_else(|_| default.to_owned())
    }

    pub fn get_int(&self, key: &str) -> Result<i64> {
        self.inner
            .read()
            .expect("config store lock poisoned")
            .get_int(key)
            .map_err(Error::ConfigError)
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.inner
            .read()
            .expect("config store lock poisoned")
            .get_bool(key)
            .map_err(Error::ConfigError)
    }

    /// Deserializes a whole section (e.g. `"document_db"`) into a typed
    /// parameter dictionary, per §2.2c.
    pub fn section<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.inner
            .read()
            .expect("config store lock poisoned")
            .get::<T>(key)
            .map_err(Error::ConfigError)
    }

    /// Required configuration with no usable default: a missing value here
    /// is a [`Error::FatalConfigError`], not a retryable failure (§7).
    pub fn require_string(&self, key: &str, reason: &str) -> Result<String> {
        self.get_string(key)
            .map_err(|_| Error::FatalConfigError(format!("{key} is required: {reason}")))
    }
}

fn runtime_str(spec: &WhiskSpec) -> ValueKind {
    ValueKind::String(format!("{:?}", spec.runtime).to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve_without_spec() {
        let store = ConfigStore::bootstrap().unwrap();
        assert_eq!(store.get_string("object_store.provider").unwrap(), "minio");
        assert_eq!(store.get_int("quota.max_backoff_seconds").unwrap(), 120);
    }

    #[test]
    fn configure_from_spec_overrides_api_host() {
        let store = ConfigStore::bootstrap().unwrap();
        let mut spec = WhiskSpec::default();
        spec.api_host = "example.com".to_owned();
        store.configure_from_spec(&spec).unwrap();
        assert_eq!(store.get_string("api_host").unwrap(), "example.com");
    }

    #[test]
    fn record_endpoint_is_additive() {
        let store = ConfigStore::bootstrap().unwrap();
        store.record_endpoint("s3_host", "minio.nuvolaris.svc").unwrap();
        assert_eq!(
            store.get_string("s3_host").unwrap(),
            "minio.nuvolaris.svc"
        );
        assert_eq!(store.get_string("object_store.provider").unwrap(), "minio");
    }
}
