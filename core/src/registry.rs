//! Capability Registry - name-indexed discovery
//!
//! A name maps either to a ready-made singleton instance or to a factory
//! that builds a fresh instance from caller-supplied configuration.
//! Registering a name again replaces whatever was there, whichever kind it
//! was.
//!
//! Reads share the lock; writes take it exclusively. Factories are always
//! invoked after the lock is released.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::capability::Capability;
use crate::error::{CapabilityError, ExecError};

/// Configuration handed to a factory
pub type FactoryConfig = HashMap<String, Value>;

/// Factory function type
pub type CapabilityFactory =
    Arc<dyn Fn(&FactoryConfig) -> Result<Arc<dyn Capability>, CapabilityError> + Send + Sync>;

#[derive(Clone)]
enum Registration {
    Instance(Arc<dyn Capability>),
    Factory(CapabilityFactory),
}

/// Capability registry
#[derive(Default)]
pub struct Registry {
    entries: RwLock<HashMap<String, Registration>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a singleton under its own name
    pub fn register_instance(&self, capability: Arc<dyn Capability>) {
        let name = capability.name().to_string();
        debug!("Registering capability instance: {}", name);
        self.entries
            .write()
            .insert(name, Registration::Instance(capability));
    }

    /// Register a factory invoked each time a fresh instance is needed
    pub fn register_factory<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(&FactoryConfig) -> Result<Arc<dyn Capability>, CapabilityError> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!("Registering capability factory: {}", name);
        self.entries
            .write()
            .insert(name, Registration::Factory(Arc::new(factory)));
    }

    /// Build a capability. A factory gets `config`; a singleton ignores it.
    pub fn create(
        &self,
        name: &str,
        config: &FactoryConfig,
    ) -> Result<Arc<dyn Capability>, ExecError> {
        let registration = self.entries.read().get(name).cloned();
        match registration {
            Some(Registration::Factory(factory)) => {
                factory(config).map_err(|source| ExecError::FactoryFailed {
                    name: name.to_string(),
                    source,
                })
            }
            Some(Registration::Instance(capability)) => Ok(capability),
            None => Err(ExecError::CapabilityNotFound {
                name: name.to_string(),
            }),
        }
    }

    /// Exact-name lookup. A factory-only name is built with empty config;
    /// construction failure counts as absent.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        let registration = self.entries.read().get(name).cloned()?;
        resolve(name, registration)
    }

    /// Every registered capability, sorted by name. Factories that fail to
    /// build with empty config are left out.
    pub fn list(&self) -> Vec<Arc<dyn Capability>> {
        let snapshot: Vec<(String, Registration)> = self
            .entries
            .read()
            .iter()
            .map(|(name, reg)| (name.clone(), reg.clone()))
            .collect();

        let mut list: Vec<Arc<dyn Capability>> = snapshot
            .into_iter()
            .filter_map(|(name, reg)| resolve(&name, reg))
            .collect();
        list.sort_by(|a, b| a.name().cmp(b.name()));
        list
    }

    /// Remove a name, whichever kind it was registered as
    pub fn remove(&self, name: &str) -> bool {
        let removed = self.entries.write().remove(name).is_some();
        if removed {
            debug!("Removed capability: {}", name);
        }
        removed
    }

    /// Case-insensitive lookup. Tries the exact name first, then scans
    /// instances, then factories.
    pub fn find(&self, name: &str) -> Option<Arc<dyn Capability>> {
        if let Some(capability) = self.get(name) {
            return Some(capability);
        }

        let target = name.to_lowercase();
        let (instance, factories) = {
            let entries = self.entries.read();
            let instance = entries.iter().find_map(|(n, reg)| match reg {
                Registration::Instance(c) if n.to_lowercase() == target => Some(c.clone()),
                _ => None,
            });
            let factories: Vec<(String, CapabilityFactory)> = entries
                .iter()
                .filter_map(|(n, reg)| match reg {
                    Registration::Factory(f) if n.to_lowercase() == target => {
                        Some((n.clone(), f.clone()))
                    }
                    _ => None,
                })
                .collect();
            (instance, factories)
        };

        if instance.is_some() {
            return instance;
        }
        factories
            .into_iter()
            .find_map(|(n, factory)| resolve(&n, Registration::Factory(factory)))
    }

    /// Check if a name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

fn resolve(name: &str, registration: Registration) -> Option<Arc<dyn Capability>> {
    match registration {
        Registration::Instance(capability) => Some(capability),
        Registration::Factory(factory) => match factory(&FactoryConfig::new()) {
            Ok(capability) => Some(capability),
            Err(e) => {
                debug!("Factory for {} failed with empty config: {}", name, e);
                None
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::FnCapability;
    use serde_json::json;

    fn named(name: &str, description: &str) -> Arc<dyn Capability> {
        Arc::new(FnCapability::new(name, description, |_, _, _| {
            Box::pin(async { Ok(Value::Null) })
        }))
    }

    #[test]
    fn test_instance_lifecycle() {
        let registry = Registry::new();
        registry.register_instance(named("clock", "Returns the current UTC time"));

        assert_eq!(registry.get("clock").unwrap().name(), "clock");
        assert!(registry.remove("clock"));
        assert!(registry.get("clock").is_none());
        assert!(!registry.remove("clock"));
    }

    #[test]
    fn test_create_prefers_factory_config() {
        let registry = Registry::new();
        registry.register_factory("greeter", |config| {
            let greeting = config
                .get("greeting")
                .and_then(Value::as_str)
                .unwrap_or("hello")
                .to_string();
            Ok(named("greeter", &greeting))
        });

        let mut config = FactoryConfig::new();
        config.insert("greeting".to_string(), json!("bonjour"));
        let cap = registry.create("greeter", &config).unwrap();
        assert_eq!(cap.description(), "bonjour");

        // get() builds with empty config
        assert_eq!(registry.get("greeter").unwrap().description(), "hello");
    }

    #[test]
    fn test_create_falls_back_to_instance() {
        let registry = Registry::new();
        registry.register_instance(named("echo", "echo"));
        let mut config = FactoryConfig::new();
        config.insert("ignored".to_string(), json!(true));
        assert_eq!(registry.create("echo", &config).unwrap().name(), "echo");
    }

    #[test]
    fn test_create_not_found() {
        let registry = Registry::new();
        let err = registry.create("nope", &FactoryConfig::new()).err().unwrap();
        assert!(matches!(err, ExecError::CapabilityNotFound { ref name } if name == "nope"));
    }

    #[test]
    fn test_failing_factory() {
        let registry = Registry::new();
        registry.register_factory("strict", |config| {
            if config.contains_key("api_key") {
                Ok(named("strict", "configured"))
            } else {
                Err(CapabilityError::new("api_key is required"))
            }
        });

        assert!(registry.get("strict").is_none());
        assert!(registry.find("STRICT").is_none());
        assert!(registry.list().is_empty());
        let err = registry.create("strict", &FactoryConfig::new()).err().unwrap();
        assert!(matches!(err, ExecError::FactoryFailed { .. }));
    }

    #[test]
    fn test_reregistration_overwrites_kind() {
        let registry = Registry::new();
        registry.register_factory("tool", |_| Ok(named("tool", "from factory")));
        registry.register_instance(named("tool", "singleton"));
        assert_eq!(registry.len(), 1);

        let mut config = FactoryConfig::new();
        config.insert("x".to_string(), json!(1));
        assert_eq!(registry.create("tool", &config).unwrap().description(), "singleton");

        registry.register_factory("tool", |_| Ok(named("tool", "from factory")));
        assert_eq!(registry.get("tool").unwrap().description(), "from factory");
    }

    #[test]
    fn test_list_includes_factories() {
        let registry = Registry::new();
        registry.register_instance(named("echo", "echo"));
        registry.register_factory("clock", |_| Ok(named("clock", "clock")));

        let names: Vec<String> = registry.list().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["clock", "echo"]);
        assert_eq!(registry.names(), vec!["clock", "echo"]);
    }

    #[test]
    fn test_find_case_insensitive() {
        let registry = Registry::new();
        registry.register_instance(named("echo", "echo"));
        registry.register_factory("Clock", |_| Ok(named("Clock", "clock")));

        assert_eq!(registry.find("ECHO").unwrap().name(), "echo");
        assert_eq!(registry.find("echo").unwrap().name(), "echo");
        assert_eq!(registry.find("clock").unwrap().name(), "Clock");
        assert!(registry.find("missing").is_none());
    }

    #[test]
    fn test_concurrent_reads() {
        let registry = Arc::new(Registry::new());
        for i in 0..16 {
            registry.register_instance(named(&format!("cap-{}", i), "x"));
        }

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let name = format!("CAP-{}", (i + t) % 16);
                        assert!(registry.find(&name).is_some());
                        assert!(registry.list().len() >= 16);
                    }
                })
            })
            .collect();

        // A writer interleaved with the readers
        for i in 16..32 {
            registry.register_instance(named(&format!("extra-{}", i), "x"));
            registry.remove(&format!("extra-{}", i));
        }

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 16);
    }
}
