//! Collaborator seams: insurer partner, payment gateway and document
//! structuring. Each has an offline implementation so the assistant runs
//! end to end without live partners.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use tripcover_core::domain::document::{DocumentExtraction, DocumentType};
use tripcover_core::domain::policy::PolicyNumber;
use tripcover_core::domain::quote::{CoverageTable, Tier};
use tripcover_core::domain::trip::Travelers;
use tripcover_core::pricing::{PricingRequest, ReferencePrice};
use tripcover_core::PaymentStatus;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum IntegrationError {
    #[error("{service} is unavailable: {detail}")]
    Unavailable { service: &'static str, detail: String },
    #[error("{service} rejected the request: {detail}")]
    Rejected { service: &'static str, detail: String },
    #[error("{service} returned a malformed response: {detail}")]
    Malformed { service: &'static str, detail: String },
    #[error("unknown payment reference `{0}`")]
    UnknownReference(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceQuote {
    pub reference_price: Decimal,
    pub currency: String,
    pub reference_ids: Vec<String>,
}

impl From<ReferenceQuote> for ReferencePrice {
    fn from(quote: ReferenceQuote) -> Self {
        Self {
            elite_price: quote.reference_price,
            currency: quote.currency,
            reference_ids: quote.reference_ids,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseConfirmation {
    pub policy_number: PolicyNumber,
    pub coverage: CoverageTable,
}

#[async_trait]
pub trait InsurerClient: Send + Sync {
    /// Live elite-tier price for the trip.
    async fn quote(&self, trip: &PricingRequest) -> Result<ReferenceQuote, IntegrationError>;

    async fn purchase(
        &self,
        reference_ids: &[String],
        tier: Tier,
        travelers: &Travelers,
    ) -> Result<PurchaseConfirmation, IntegrationError>;
}

/// Insurer stand-in: never offers a live price, issues sequential policy
/// numbers with the tier's standard coverage.
#[derive(Debug, Default)]
pub struct OfflineInsurer {
    issued: AtomicU64,
}

impl OfflineInsurer {
    pub fn issued_count(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InsurerClient for OfflineInsurer {
    async fn quote(&self, _trip: &PricingRequest) -> Result<ReferenceQuote, IntegrationError> {
        Err(IntegrationError::Unavailable {
            service: "insurer",
            detail: "no live insurer is configured".to_owned(),
        })
    }

    async fn purchase(
        &self,
        _reference_ids: &[String],
        tier: Tier,
        travelers: &Travelers,
    ) -> Result<PurchaseConfirmation, IntegrationError> {
        if travelers.is_empty() {
            return Err(IntegrationError::Rejected {
                service: "insurer",
                detail: "a policy needs at least one traveler".to_owned(),
            });
        }
        let sequence = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PurchaseConfirmation {
            policy_number: PolicyNumber(format!("TC-{}-{sequence:06}", Utc::now().format("%Y"))),
            coverage: tier.coverage(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutCustomer {
    pub session_id: String,
    pub traveler_count: usize,
    pub destination: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkout {
    pub checkout_url: String,
    pub payment_reference_id: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout(
        &self,
        amount: Decimal,
        currency: &str,
        customer: &CheckoutCustomer,
    ) -> Result<Checkout, IntegrationError>;

    async fn status(&self, payment_reference_id: &str) -> Result<PaymentStatus, IntegrationError>;
}

/// In-memory gateway. Checkouts stay pending until [`settle`] is called by
/// the callback route or a test.
///
/// [`settle`]: SandboxPaymentGateway::settle
#[derive(Debug)]
pub struct SandboxPaymentGateway {
    checkout_base_url: String,
    payments: RwLock<HashMap<String, PaymentStatus>>,
}

impl SandboxPaymentGateway {
    pub fn new(checkout_base_url: impl Into<String>) -> Self {
        Self { checkout_base_url: checkout_base_url.into(), payments: RwLock::new(HashMap::new()) }
    }

    pub async fn settle(
        &self,
        payment_reference_id: &str,
        status: PaymentStatus,
    ) -> Result<(), IntegrationError> {
        let mut payments = self.payments.write().await;
        match payments.get_mut(payment_reference_id) {
            Some(current) => {
                *current = status;
                Ok(())
            }
            None => Err(IntegrationError::UnknownReference(payment_reference_id.to_owned())),
        }
    }

    pub async fn checkout_count(&self) -> usize {
        self.payments.read().await.len()
    }
}

#[async_trait]
impl PaymentGateway for SandboxPaymentGateway {
    async fn create_checkout(
        &self,
        amount: Decimal,
        currency: &str,
        _customer: &CheckoutCustomer,
    ) -> Result<Checkout, IntegrationError> {
        if amount <= Decimal::ZERO {
            return Err(IntegrationError::Rejected {
                service: "payment gateway",
                detail: format!("amount {amount} {currency} must be positive"),
            });
        }

        let payment_reference_id = format!("pay_{}", Uuid::new_v4().simple());
        self.payments.write().await.insert(payment_reference_id.clone(), PaymentStatus::Pending);
        Ok(Checkout {
            checkout_url: format!(
                "{}/{payment_reference_id}",
                self.checkout_base_url.trim_end_matches('/')
            ),
            payment_reference_id,
        })
    }

    async fn status(&self, payment_reference_id: &str) -> Result<PaymentStatus, IntegrationError> {
        self.payments
            .read()
            .await
            .get(payment_reference_id)
            .copied()
            .ok_or_else(|| IntegrationError::UnknownReference(payment_reference_id.to_owned()))
    }
}

#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract_structured(
        &self,
        bytes: &[u8],
        type_hint: Option<DocumentType>,
    ) -> Result<DocumentExtraction, IntegrationError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct UnavailableDocumentExtractor;

#[async_trait]
impl DocumentExtractor for UnavailableDocumentExtractor {
    async fn extract_structured(
        &self,
        _bytes: &[u8],
        _type_hint: Option<DocumentType>,
    ) -> Result<DocumentExtraction, IntegrationError> {
        Err(IntegrationError::Unavailable {
            service: "document extractor",
            detail: "no document structuring service is configured".to_owned(),
        })
    }
}
