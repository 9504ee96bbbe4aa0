//! User-sync adapters: plug an external identity source (LDAP, SAML
//! dumps, a script) in as the authority over `users/org`.
//!
//! Adapters are registered by name; `goliac.yaml`'s `usersync.plugin`
//! selects one. Only the seam lives here — concrete importers are
//! separate concerns wired in by the embedding binary.
use std::collections::BTreeMap;
use std::sync::Arc;

use goliac_core::User;

/// An adapter computing the desired user set from an external source.
pub trait UserSyncPlugin: Send + Sync {
    /// Registry name, matched against `usersync.plugin`.
    fn name(&self) -> &'static str;

    /// Produce the desired users given the currently declared ones.
    ///
    /// Protected users are preserved by the caller regardless of what
    /// this returns.
    fn sync(&self, current: &BTreeMap<String, User>) -> Result<BTreeMap<String, User>, String>;
}

/// The identity adapter: external source and declared state agree.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopUserSync;

impl UserSyncPlugin for NoopUserSync {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn sync(&self, current: &BTreeMap<String, User>) -> Result<BTreeMap<String, User>, String> {
        Ok(current.clone())
    }
}

/// Name-indexed adapter registry.
pub struct UserSyncRegistry {
    plugins: BTreeMap<&'static str, Arc<dyn UserSyncPlugin>>,
}

impl Default for UserSyncRegistry {
    fn default() -> Self {
        let mut registry = UserSyncRegistry {
            plugins: BTreeMap::new(),
        };
        registry.register(Arc::new(NoopUserSync));
        registry
    }
}

impl UserSyncRegistry {
    /// A registry with the built-in `noop` adapter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) an adapter under its name.
    pub fn register(&mut self, plugin: Arc<dyn UserSyncPlugin>) {
        self.plugins.insert(plugin.name(), plugin);
    }

    /// Look an adapter up by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn UserSyncPlugin>> {
        self.plugins.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use goliac_core::UserKind;

    use super::*;

    #[test]
    fn registry_resolves_noop_by_default() {
        let registry = UserSyncRegistry::new();
        assert!(registry.get("noop").is_some());
        assert!(registry.get("ldap").is_none());
    }

    #[test]
    fn noop_is_identity() {
        let current = BTreeMap::from([(
            "alice".to_string(),
            User {
                username: "alice".to_string(),
                login: "gh-a".to_string(),
                kind: UserKind::Internal,
            },
        )]);
        let synced = NoopUserSync.sync(&current).unwrap();
        assert_eq!(synced, current);
    }
}
