use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vendo_shared::Masked;

/// Raw card data supplied at checkout. Never stored; only the derived
/// [`CardMetadata`] survives past the gateway call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardData {
    pub number: Masked<String>,
    pub exp_month: u32,
    pub exp_year: u32,
    pub cvc: Masked<String>,
}

/// Gateway-reported card details safe to persist alongside a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardMetadata {
    pub last4: String,
    pub brand: String,
    pub exp_month: u32,
    pub exp_year: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureRequest {
    pub amount: Decimal,
    pub currency: String,
    pub method: String,
    pub payment_method_id: Option<String>,
    pub card: Option<CardData>,
    pub customer_email: Option<Masked<String>>,
}

/// A successful capture as reported by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayCharge {
    pub transaction_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub card: Option<CardMetadata>,
}

/// Terminal outcomes of a capture call. All three carry the gateway-assigned
/// transaction id; a payment record is written for each of them. Only
/// [`GatewayError`] results are eligible for retry.
#[derive(Debug, Clone)]
pub enum CaptureOutcome {
    Succeeded(GatewayCharge),
    /// 3-D-Secure-style challenge. The caller must surface the client secret
    /// and wait for the customer to complete the challenge.
    RequiresAction {
        transaction_id: String,
        client_secret: String,
    },
    /// Hard decline. Never retried.
    Declined {
        transaction_id: String,
        code: String,
        message: String,
    },
}

#[derive(Debug, Clone)]
pub struct RefundRequest {
    pub transaction_id: String,
    pub amount: Decimal,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GatewayRefund {
    pub refund_reference: String,
}

/// Terminal outcomes of a refund call.
#[derive(Debug, Clone)]
pub enum RefundOutcome {
    Succeeded(GatewayRefund),
    Declined { code: String, message: String },
}

/// Retryable failure channel. Repeated transient errors mean "unknown";
/// the caller must not assume the charge failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    /// Expected to succeed on retry (network blip, rate limit).
    #[error("transient gateway error: {0}")]
    Transient(String),

    /// The call exceeded its deadline; treated like a transient error.
    #[error("gateway request timed out")]
    Timeout,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Capture funds for a checkout attempt.
    async fn capture(&self, request: &CaptureRequest) -> Result<CaptureOutcome, GatewayError>;

    /// Refund part or all of a previously captured transaction.
    async fn refund(&self, request: &RefundRequest) -> Result<RefundOutcome, GatewayError>;
}

/// Deterministic stand-in for the external processor, driven by well-known
/// test card numbers and payment-method ids.
pub struct SimulatedGateway;

impl SimulatedGateway {
    fn card_last4(request: &CaptureRequest) -> Option<String> {
        request.card.as_ref().map(|c| {
            let digits: Vec<char> = c.number.expose().chars().collect();
            digits[digits.len().saturating_sub(4)..].iter().collect()
        })
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn capture(&self, request: &CaptureRequest) -> Result<CaptureOutcome, GatewayError> {
        // Trigger for testing retry exhaustion
        if request.payment_method_id.as_deref() == Some("pm_transient") {
            return Err(GatewayError::Transient("simulated network failure".into()));
        }

        let last4 = Self::card_last4(request);
        let transaction_id = format!("txn_{}", Uuid::new_v4().simple());
        match last4.as_deref() {
            Some("0002") => Ok(CaptureOutcome::Declined {
                transaction_id,
                code: "card_declined".into(),
                message: "Your card was declined.".into(),
            }),
            Some("3155") => Ok(CaptureOutcome::RequiresAction {
                transaction_id,
                client_secret: format!("seti_{}", Uuid::new_v4().simple()),
            }),
            _ => {
                let charge = GatewayCharge {
                    transaction_id,
                    amount: request.amount,
                    currency: request.currency.clone(),
                    card: last4.map(|last4| CardMetadata {
                        last4,
                        brand: "visa".into(),
                        exp_month: request.card.as_ref().map(|c| c.exp_month).unwrap_or(1),
                        exp_year: request.card.as_ref().map(|c| c.exp_year).unwrap_or(2030),
                    }),
                };
                tracing::info!(transaction_id = %charge.transaction_id, "Simulated capture succeeded");
                Ok(CaptureOutcome::Succeeded(charge))
            }
        }
    }

    async fn refund(&self, request: &RefundRequest) -> Result<RefundOutcome, GatewayError> {
        if request.transaction_id.is_empty() {
            return Ok(RefundOutcome::Declined {
                code: "missing_transaction".into(),
                message: "No transaction to refund".into(),
            });
        }
        Ok(RefundOutcome::Succeeded(GatewayRefund {
            refund_reference: format!("re_{}", Uuid::new_v4().simple()),
        }))
    }
}
