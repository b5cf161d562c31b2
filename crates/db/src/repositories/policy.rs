use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use tripcover_core::domain::policy::{IssuedPolicy, PolicyNumber};
use tripcover_core::domain::quote::Tier;

use super::{PolicyRepository, RepositoryError};
use crate::DbPool;

pub struct SqlPolicyRepository {
    pool: DbPool,
}

impl SqlPolicyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_policy(row: &sqlx::sqlite::SqliteRow) -> Result<IssuedPolicy, RepositoryError> {
    let policy_number: String =
        row.try_get("policy_number").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let payment_reference_id: String =
        row.try_get("payment_reference_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let session_id: String =
        row.try_get("session_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let tier_str: String =
        row.try_get("tier").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let premium_str: String =
        row.try_get("premium").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let currency: String =
        row.try_get("currency").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let coverage_json: String =
        row.try_get("coverage_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let issued_at_str: String =
        row.try_get("issued_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let tier = Tier::parse(&tier_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown tier `{tier_str}`")))?;
    let premium =
        Decimal::from_str(&premium_str).map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let coverage =
        serde_json::from_str(&coverage_json).map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let issued_at = DateTime::parse_from_rfc3339(&issued_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(IssuedPolicy {
        policy_number: PolicyNumber(policy_number),
        payment_reference_id,
        session_id,
        tier,
        premium,
        currency,
        coverage,
        issued_at,
    })
}

#[async_trait::async_trait]
impl PolicyRepository for SqlPolicyRepository {
    async fn find_by_payment_reference(
        &self,
        payment_reference_id: &str,
    ) -> Result<Option<IssuedPolicy>, RepositoryError> {
        let row = sqlx::query(
            "SELECT policy_number, payment_reference_id, session_id, tier, premium, currency,
                    coverage_json, issued_at
             FROM issued_policy WHERE payment_reference_id = ?",
        )
        .bind(payment_reference_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_policy(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, policy: IssuedPolicy) -> Result<IssuedPolicy, RepositoryError> {
        let coverage_json = serde_json::to_string(&policy.coverage)
            .map_err(|e| RepositoryError::Encode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO issued_policy (policy_number, payment_reference_id, session_id, tier,
                                        premium, currency, coverage_json, issued_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(payment_reference_id) DO NOTHING",
        )
        .bind(&policy.policy_number.0)
        .bind(&policy.payment_reference_id)
        .bind(&policy.session_id)
        .bind(policy.tier.as_str())
        .bind(policy.premium.to_string())
        .bind(&policy.currency)
        .bind(&coverage_json)
        .bind(policy.issued_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.find_by_payment_reference(&policy.payment_reference_id).await?.ok_or_else(|| {
            RepositoryError::Decode(format!(
                "policy for payment `{}` missing after insert",
                policy.payment_reference_id
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use tripcover_core::domain::policy::{IssuedPolicy, PolicyNumber};
    use tripcover_core::domain::quote::Tier;

    use super::SqlPolicyRepository;
    use crate::connect_with_settings;
    use crate::migrations::run_pending;
    use crate::repositories::PolicyRepository;

    fn policy(number: &str, reference: &str) -> IssuedPolicy {
        IssuedPolicy {
            policy_number: PolicyNumber(number.to_owned()),
            payment_reference_id: reference.to_owned(),
            session_id: "sess-1".to_owned(),
            tier: Tier::Elite,
            premium: Decimal::new(18000, 2),
            currency: "USD".to_owned(),
            coverage: Tier::Elite.coverage(),
            issued_at: Utc::now(),
        }
    }

    async fn repo() -> SqlPolicyRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrate");
        SqlPolicyRepository::new(pool)
    }

    #[tokio::test]
    async fn saved_policy_is_found_by_payment_reference() {
        let repo = repo().await;
        let stored = repo.save(policy("TC-1", "pay-1")).await.expect("save");

        let found = repo.find_by_payment_reference("pay-1").await.expect("find");
        assert_eq!(found.as_ref().map(|p| &p.policy_number), Some(&stored.policy_number));
        assert_eq!(found.map(|p| p.premium), Some(Decimal::new(18000, 2)));
        assert!(repo.find_by_payment_reference("pay-2").await.expect("find").is_none());
    }

    #[tokio::test]
    async fn second_save_for_same_payment_keeps_first_policy() {
        let repo = repo().await;
        repo.save(policy("TC-1", "pay-1")).await.expect("first");
        let second = repo.save(policy("TC-2", "pay-1")).await.expect("second");

        assert_eq!(second.policy_number, PolicyNumber("TC-1".to_owned()));
    }
}
