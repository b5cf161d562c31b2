use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::quote::{CoverageTable, Tier};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyNumber(pub String);

/// A policy issued for one settled payment. The payment reference is the
/// idempotency key for issuance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedPolicy {
    pub policy_number: PolicyNumber,
    pub payment_reference_id: String,
    pub session_id: String,
    pub tier: Tier,
    pub premium: Decimal,
    pub currency: String,
    pub coverage: CoverageTable,
    pub issued_at: DateTime<Utc>,
}
