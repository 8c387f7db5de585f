use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

/// How a checkout request identifies the acting customer. Older clients send
/// an email; newer ones carry the canonical id in their token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomerIdentity {
    Canonical(Uuid),
    LegacyEmail(String),
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Unknown customer identity: {0}")]
    Unknown(String),
}

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Resolve a customer identity to its canonical user id.
    async fn resolve(&self, identity: &CustomerIdentity) -> Result<Uuid, IdentityError>;
}

/// Resolver backed by a fixed email-to-id map. Canonical ids pass through.
pub struct StaticIdentityResolver {
    by_email: HashMap<String, Uuid>,
}

impl StaticIdentityResolver {
    pub fn new() -> Self {
        Self { by_email: HashMap::new() }
    }

    pub fn with_email(mut self, email: &str, user_id: Uuid) -> Self {
        self.by_email.insert(email.to_lowercase(), user_id);
        self
    }
}

impl Default for StaticIdentityResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityResolver for StaticIdentityResolver {
    async fn resolve(&self, identity: &CustomerIdentity) -> Result<Uuid, IdentityError> {
        match identity {
            CustomerIdentity::Canonical(id) => Ok(*id),
            CustomerIdentity::LegacyEmail(email) => self
                .by_email
                .get(&email.to_lowercase())
                .copied()
                .ok_or_else(|| IdentityError::Unknown(email.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_legacy_email_case_insensitively() {
        let user_id = Uuid::new_v4();
        let resolver = StaticIdentityResolver::new().with_email("Buyer@Example.com", user_id);

        let resolved = resolver
            .resolve(&CustomerIdentity::LegacyEmail("buyer@example.COM".into()))
            .await
            .unwrap();
        assert_eq!(resolved, user_id);
    }

    #[tokio::test]
    async fn canonical_ids_pass_through() {
        let user_id = Uuid::new_v4();
        let resolver = StaticIdentityResolver::new();
        let resolved = resolver
            .resolve(&CustomerIdentity::Canonical(user_id))
            .await
            .unwrap();
        assert_eq!(resolved, user_id);
    }

    #[tokio::test]
    async fn unknown_email_is_rejected() {
        let resolver = StaticIdentityResolver::new();
        let result = resolver
            .resolve(&CustomerIdentity::LegacyEmail("nobody@example.com".into()))
            .await;
        assert!(matches!(result, Err(IdentityError::Unknown(_))));
    }
}
