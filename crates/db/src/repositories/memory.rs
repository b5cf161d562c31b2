use std::collections::HashMap;

use tokio::sync::RwLock;

use tripcover_core::domain::conversation::ConversationState;
use tripcover_core::domain::policy::IssuedPolicy;

use super::{ConversationRepository, PolicyRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryConversationRepository {
    sessions: RwLock<HashMap<String, ConversationState>>,
    loads: RwLock<HashMap<String, u64>>,
}

impl InMemoryConversationRepository {
    /// Number of turn loads recorded for a session; peeks are not counted.
    pub async fn load_count(&self, session_id: &str) -> u64 {
        self.loads.read().await.get(session_id).copied().unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn load(&self, session_id: &str) -> Result<Option<ConversationState>, RepositoryError> {
        let state = self.sessions.read().await.get(session_id).cloned();
        if state.is_some() {
            *self.loads.write().await.entry(session_id.to_owned()).or_insert(0) += 1;
        }
        Ok(state)
    }

    async fn peek(&self, session_id: &str) -> Result<Option<ConversationState>, RepositoryError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).cloned())
    }

    async fn save(&self, state: &ConversationState) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(state.session_id.clone(), state.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryPolicyRepository {
    policies: RwLock<HashMap<String, IssuedPolicy>>,
}

impl InMemoryPolicyRepository {
    pub async fn len(&self) -> usize {
        self.policies.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.policies.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl PolicyRepository for InMemoryPolicyRepository {
    async fn find_by_payment_reference(
        &self,
        payment_reference_id: &str,
    ) -> Result<Option<IssuedPolicy>, RepositoryError> {
        let policies = self.policies.read().await;
        Ok(policies.get(payment_reference_id).cloned())
    }

    async fn save(&self, policy: IssuedPolicy) -> Result<IssuedPolicy, RepositoryError> {
        let mut policies = self.policies.write().await;
        let stored = policies.entry(policy.payment_reference_id.clone()).or_insert(policy);
        Ok(stored.clone())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use tripcover_core::domain::conversation::ConversationState;
    use tripcover_core::domain::policy::{IssuedPolicy, PolicyNumber};
    use tripcover_core::domain::quote::Tier;

    use crate::repositories::{
        ConversationRepository, InMemoryConversationRepository, InMemoryPolicyRepository,
        PolicyRepository,
    };

    #[tokio::test]
    async fn in_memory_conversation_repo_round_trip() {
        let repo = InMemoryConversationRepository::default();
        let mut state = ConversationState::new("sess-1");
        state.push_user("hello");

        repo.save(&state).await.expect("save");
        assert_eq!(repo.peek("sess-1").await.expect("peek"), Some(state.clone()));
        assert_eq!(repo.load_count("sess-1").await, 0);

        assert_eq!(repo.load("sess-1").await.expect("load"), Some(state));
        assert_eq!(repo.load_count("sess-1").await, 1);
    }

    #[tokio::test]
    async fn in_memory_policy_repo_is_idempotent_per_payment() {
        let repo = InMemoryPolicyRepository::default();
        let policy = |number: &str| IssuedPolicy {
            policy_number: PolicyNumber(number.to_owned()),
            payment_reference_id: "pay-9".to_owned(),
            session_id: "sess-1".to_owned(),
            tier: Tier::Standard,
            premium: Decimal::new(4250, 2),
            currency: "USD".to_owned(),
            coverage: Tier::Standard.coverage(),
            issued_at: Utc::now(),
        };

        repo.save(policy("TC-1")).await.expect("first");
        let second = repo.save(policy("TC-2")).await.expect("second");

        assert_eq!(second.policy_number.0, "TC-1");
        assert_eq!(repo.len().await, 1);
    }
}
