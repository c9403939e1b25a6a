use std::collections::HashMap;
use std::sync::Arc;

use super::types::PermsProvider;

/// Maps `(service_type, service_id)` to the provider for that code host.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<(String, String), Arc<dyn PermsProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own code host identity.
    ///
    /// Returns the provider previously registered for the same host, if any.
    pub fn register(&mut self, provider: Arc<dyn PermsProvider>) -> Option<Arc<dyn PermsProvider>> {
        let host = provider.code_host();
        let key = (host.service_type.clone(), host.service_id.clone());
        self.providers.insert(key, provider)
    }

    /// Look up the provider for a code host.
    pub fn get(&self, service_type: &str, service_id: &str) -> Option<Arc<dyn PermsProvider>> {
        self.providers
            .get(&(service_type.to_string(), service_id.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("hosts", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use crate::provider::{CodeHost, Result};
    use crate::types::{ExternalAccount, ExternalRepoSpec};

    use super::*;

    struct NamedProvider {
        host: CodeHost,
        name: &'static str,
    }

    #[async_trait]
    impl PermsProvider for NamedProvider {
        fn code_host(&self) -> &CodeHost {
            &self.host
        }

        async fn fetch_user_perms(&self, _account: &ExternalAccount) -> Result<Vec<String>> {
            Ok(vec![self.name.to_string()])
        }

        async fn fetch_repo_perms(&self, _repo: &ExternalRepoSpec) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    fn provider(base_url: &str, name: &'static str) -> Arc<dyn PermsProvider> {
        Arc::new(NamedProvider {
            host: CodeHost::new("gitlab", base_url),
            name,
        })
    }

    #[test]
    fn test_lookup_uses_provider_identity() {
        let mut registry = ProviderRegistry::new();
        assert!(registry.is_empty());

        registry.register(provider("https://a.example.com", "a"));
        registry.register(provider("https://b.example.com/", "b"));

        assert_eq!(registry.len(), 2);
        assert!(registry.get("gitlab", "https://a.example.com/").is_some());
        assert!(registry.get("gitlab", "https://a.example.com").is_none());
        assert!(registry.get("github", "https://a.example.com/").is_none());
    }
}
