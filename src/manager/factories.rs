//! Per-topic manager factories used when a node service is built without an
//! explicit manager.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::manager::Manager;

/// Creates the manager for a given host.
pub type ManagerFactory = Arc<dyn Fn(&str) -> Arc<dyn Manager> + Send + Sync>;

/// Topic → manager factory table.
#[derive(Clone, Default)]
pub struct ManagerFactories {
    by_topic: HashMap<String, ManagerFactory>,
}

impl fmt::Debug for ManagerFactories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerFactories")
            .field("topics", &self.topics())
            .finish()
    }
}

impl ManagerFactories {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the factory for `topic`, replacing any previous one.
    pub fn register<F>(mut self, topic: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&str) -> Arc<dyn Manager> + Send + Sync + 'static,
    {
        self.by_topic.insert(topic.into(), Arc::new(factory));
        self
    }

    /// Instantiates the manager for `topic` on `host`, if one is registered.
    pub fn build(&self, topic: &str, host: &str) -> Option<Arc<dyn Manager>> {
        self.by_topic.get(topic).map(|factory| factory(host))
    }

    /// Registered topics, sorted.
    pub fn topics(&self) -> Vec<&str> {
        let mut topics: Vec<&str> = self.by_topic.keys().map(String::as_str).collect();
        topics.sort_unstable();
        topics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::NoopManager;
    use std::sync::Mutex;

    #[test]
    fn factory_receives_host() {
        let hosts = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&hosts);
        let factories = ManagerFactories::new().register("compute", move |host| {
            seen.lock().unwrap().push(host.to_string());
            Arc::new(NoopManager) as Arc<dyn Manager>
        });

        assert!(factories.build("compute", "node-1").is_some());
        assert!(factories.build("network", "node-1").is_none());
        assert_eq!(*hosts.lock().unwrap(), vec!["node-1".to_string()]);
        assert_eq!(factories.topics(), vec!["compute"]);
    }
}
