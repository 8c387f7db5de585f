use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::payment::{
    CaptureOutcome, CaptureRequest, GatewayError, PaymentGateway, RefundOutcome, RefundRequest,
};

/// Extra attempts after the initial call. With the exponential schedule this
/// gives delays of 2s, 4s and 8s.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Delays plateau at 2^10 seconds however large the configured retry
/// budget; an unclamped shift would overflow past attempt 63.
const MAX_BACKOFF_SHIFT: u32 = 10;

/// Backoff as a pure function of the attempt number: 2^attempt seconds,
/// no jitter. `attempt` is 1-based (the delay before retry N).
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt.min(MAX_BACKOFF_SHIFT))
}

/// Clock seam so retry tests run without real delays.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Wraps a [`PaymentGateway`] with bounded exponential-backoff retry.
///
/// Only [`GatewayError`] results (transient failures and timeouts) are
/// retried; declines and challenge outcomes are terminal and returned
/// immediately. Exhausting the budget surfaces the last error unchanged;
/// callers must treat it as "unknown, do not assume the charge failed".
pub struct RetryingGatewayClient {
    gateway: Arc<dyn PaymentGateway>,
    sleeper: Arc<dyn Sleeper>,
    max_retries: u32,
}

impl RetryingGatewayClient {
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self {
            gateway,
            sleeper: Arc::new(TokioSleeper),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub async fn capture(&self, request: &CaptureRequest) -> Result<CaptureOutcome, GatewayError> {
        let mut attempt = 0;
        loop {
            match self.gateway.capture(request).await {
                Err(error) if attempt < self.max_retries => {
                    attempt += 1;
                    let delay = backoff_delay(attempt);
                    tracing::warn!(
                        attempt,
                        delay_secs = delay.as_secs(),
                        %error,
                        "Transient gateway error during capture, retrying"
                    );
                    self.sleeper.sleep(delay).await;
                }
                result => return result,
            }
        }
    }

    pub async fn refund(&self, request: &RefundRequest) -> Result<RefundOutcome, GatewayError> {
        let mut attempt = 0;
        loop {
            match self.gateway.refund(request).await {
                Err(error) if attempt < self.max_retries => {
                    attempt += 1;
                    let delay = backoff_delay(attempt);
                    tracing::warn!(
                        attempt,
                        delay_secs = delay.as_secs(),
                        %error,
                        "Transient gateway error during refund, retrying"
                    );
                    self.sleeper.sleep(delay).await;
                }
                result => return result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment::{GatewayCharge, GatewayRefund};
    use rust_decimal::Decimal;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct RecordingSleeper {
        slept: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        fn new() -> Arc<Self> {
            Arc::new(Self { slept: Mutex::new(Vec::new()) })
        }

        fn delays(&self) -> Vec<Duration> {
            self.slept.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
        }
    }

    /// Gateway that replays a scripted sequence of capture results.
    struct ScriptedGateway {
        script: Mutex<VecDeque<Result<CaptureOutcome, GatewayError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedGateway {
        fn new(script: Vec<Result<CaptureOutcome, GatewayError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(0),
            })
        }

        fn call_count(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl PaymentGateway for ScriptedGateway {
        async fn capture(&self, _request: &CaptureRequest) -> Result<CaptureOutcome, GatewayError> {
            *self.calls.lock().unwrap() += 1;
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(GatewayError::Transient("script exhausted".into())))
        }

        async fn refund(&self, _request: &RefundRequest) -> Result<RefundOutcome, GatewayError> {
            *self.calls.lock().unwrap() += 1;
            match self.script.lock().unwrap().pop_front() {
                Some(Ok(_)) => Ok(RefundOutcome::Succeeded(GatewayRefund {
                    refund_reference: "re_test".into(),
                })),
                Some(Err(e)) => Err(e),
                None => Err(GatewayError::Transient("script exhausted".into())),
            }
        }
    }

    fn success() -> Result<CaptureOutcome, GatewayError> {
        Ok(CaptureOutcome::Succeeded(GatewayCharge {
            transaction_id: "txn_test".into(),
            amount: Decimal::new(1000, 2),
            currency: "USD".into(),
            card: None,
        }))
    }

    fn transient() -> Result<CaptureOutcome, GatewayError> {
        Err(GatewayError::Transient("connection reset".into()))
    }

    fn request() -> CaptureRequest {
        CaptureRequest {
            amount: Decimal::new(1000, 2),
            currency: "USD".into(),
            method: "card".into(),
            payment_method_id: None,
            card: None,
            customer_email: None,
        }
    }

    #[test]
    fn backoff_schedule_is_exponential() {
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
        assert_eq!(backoff_delay(3), Duration::from_secs(8));
    }

    #[test]
    fn backoff_plateaus_for_large_attempt_numbers() {
        let cap = Duration::from_secs(1024);
        assert_eq!(backoff_delay(10), cap);
        assert_eq!(backoff_delay(63), cap);
        assert_eq!(backoff_delay(u32::MAX), cap);
    }

    #[tokio::test]
    async fn transient_errors_retry_then_succeed() {
        let gateway = ScriptedGateway::new(vec![transient(), transient(), success()]);
        let sleeper = RecordingSleeper::new();
        let client = RetryingGatewayClient::new(gateway.clone()).with_sleeper(sleeper.clone());

        let outcome = client.capture(&request()).await.unwrap();
        assert!(matches!(outcome, CaptureOutcome::Succeeded(_)));
        assert_eq!(gateway.call_count(), 3);
        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_secs(2), Duration::from_secs(4)]
        );
    }

    #[tokio::test]
    async fn timeouts_are_retried_like_transient_errors() {
        let gateway = ScriptedGateway::new(vec![Err(GatewayError::Timeout), success()]);
        let sleeper = RecordingSleeper::new();
        let client = RetryingGatewayClient::new(gateway.clone()).with_sleeper(sleeper.clone());

        let outcome = client.capture(&request()).await.unwrap();
        assert!(matches!(outcome, CaptureOutcome::Succeeded(_)));
        assert_eq!(gateway.call_count(), 2);
        assert_eq!(sleeper.delays(), vec![Duration::from_secs(2)]);
    }

    #[tokio::test]
    async fn declines_are_not_retried() {
        let gateway = ScriptedGateway::new(vec![Ok(CaptureOutcome::Declined {
            transaction_id: "txn_test".into(),
            code: "card_declined".into(),
            message: "declined".into(),
        })]);
        let sleeper = RecordingSleeper::new();
        let client = RetryingGatewayClient::new(gateway.clone()).with_sleeper(sleeper.clone());

        let outcome = client.capture(&request()).await.unwrap();
        assert!(matches!(outcome, CaptureOutcome::Declined { .. }));
        assert_eq!(gateway.call_count(), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn requires_action_is_not_retried() {
        let gateway = ScriptedGateway::new(vec![Ok(CaptureOutcome::RequiresAction {
            transaction_id: "txn_test".into(),
            client_secret: "secret".into(),
        })]);
        let client =
            RetryingGatewayClient::new(gateway.clone()).with_sleeper(RecordingSleeper::new());

        let outcome = client.capture(&request()).await.unwrap();
        assert!(matches!(outcome, CaptureOutcome::RequiresAction { .. }));
        assert_eq!(gateway.call_count(), 1);
    }

    #[tokio::test]
    async fn exhaustion_surfaces_last_transient_error() {
        let gateway =
            ScriptedGateway::new(vec![transient(), transient(), transient(), transient()]);
        let sleeper = RecordingSleeper::new();
        let client = RetryingGatewayClient::new(gateway.clone()).with_sleeper(sleeper.clone());

        let err = client.capture(&request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Transient(_)));
        // initial call + 3 retries
        assert_eq!(gateway.call_count(), 4);
        assert_eq!(
            sleeper.delays(),
            vec![
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8)
            ]
        );
    }
}
