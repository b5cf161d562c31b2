use async_trait::async_trait;
use thiserror::Error;

use tripcover_core::domain::conversation::ConversationState;
use tripcover_core::domain::policy::IssuedPolicy;

pub mod conversation;
pub mod memory;
pub mod policy;

pub use conversation::SqlConversationRepository;
pub use memory::{InMemoryConversationRepository, InMemoryPolicyRepository};
pub use policy::SqlPolicyRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("encode error: {0}")]
    Encode(String),
}

/// Session-keyed store of full conversation snapshots, last writer wins.
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Loads the session for a turn, marking it as accessed.
    async fn load(&self, session_id: &str) -> Result<Option<ConversationState>, RepositoryError>;
    /// Reads the session without touching any bookkeeping.
    async fn peek(&self, session_id: &str) -> Result<Option<ConversationState>, RepositoryError>;
    async fn save(&self, state: &ConversationState) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait PolicyRepository: Send + Sync {
    async fn find_by_payment_reference(
        &self,
        payment_reference_id: &str,
    ) -> Result<Option<IssuedPolicy>, RepositoryError>;

    /// Stores the policy unless one already exists for its payment reference.
    /// Returns whichever policy is on record afterwards.
    async fn save(&self, policy: IssuedPolicy) -> Result<IssuedPolicy, RepositoryError>;
}
