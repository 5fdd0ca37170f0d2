use crate::error::SinkError;
use crate::{DeliveryOutcome, SignalSink};
use async_trait::async_trait;
use configuration::SinkSettings;
use core_types::OutboundSignal;
use reqwest::{Client, StatusCode};
use uuid::Uuid;

/// A webhook-backed `SignalSink`.
///
/// Posts the signal as JSON with the idempotency key in both the payload and
/// an `Idempotency-Key` header, so receivers can deduplicate however they
/// prefer. The receiving side owns the actual dedup; this sink only
/// guarantees the key is stable per order.
pub struct WebhookSink {
    client: Client,
    url: String,
}

impl WebhookSink {
    /// Creates a new `WebhookSink` from configuration.
    ///
    /// Fails when no URL is configured; the caller decides whether a missing
    /// sink is fatal (live dispatch) or fine (dry run).
    pub fn new(settings: &SinkSettings) -> Result<Self, SinkError> {
        if settings.webhook_url.is_empty() {
            return Err(SinkError::NotConfigured(
                "sink.webhook_url is empty".to_string(),
            ));
        }
        let client = Client::builder().timeout(settings.timeout()).build()?;
        Ok(Self {
            client,
            url: settings.webhook_url.clone(),
        })
    }

    fn classify(status: StatusCode) -> DeliveryOutcome {
        if status.is_success() {
            return DeliveryOutcome::Success;
        }
        // Throttling and server-side trouble are worth another attempt;
        // anything else the receiver said "no" to will keep saying "no".
        if status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
            || status.is_server_error()
        {
            DeliveryOutcome::TransientFailure(format!("webhook returned {}", status))
        } else {
            DeliveryOutcome::PermanentFailure(format!("webhook returned {}", status))
        }
    }
}

#[async_trait]
impl SignalSink for WebhookSink {
    async fn deliver(&self, idempotency_key: Uuid, signal: &OutboundSignal) -> DeliveryOutcome {
        let response = self
            .client
            .post(&self.url)
            .header("Idempotency-Key", idempotency_key.to_string())
            .json(signal)
            .send()
            .await;

        match response {
            Ok(response) => {
                let outcome = Self::classify(response.status());
                if outcome != DeliveryOutcome::Success {
                    tracing::warn!(
                        key = %idempotency_key,
                        status = %response.status(),
                        "webhook delivery not accepted"
                    );
                }
                outcome
            }
            Err(e) => {
                // Transport-level failures (DNS, refused, timeout) are all
                // transient from the queue's point of view.
                tracing::warn!(key = %idempotency_key, error = %e, "webhook delivery failed");
                DeliveryOutcome::TransientFailure(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(
            WebhookSink::classify(StatusCode::OK),
            DeliveryOutcome::Success
        );
        assert!(matches!(
            WebhookSink::classify(StatusCode::BAD_GATEWAY),
            DeliveryOutcome::TransientFailure(_)
        ));
        assert!(matches!(
            WebhookSink::classify(StatusCode::TOO_MANY_REQUESTS),
            DeliveryOutcome::TransientFailure(_)
        ));
        assert!(matches!(
            WebhookSink::classify(StatusCode::UNPROCESSABLE_ENTITY),
            DeliveryOutcome::PermanentFailure(_)
        ));
    }

    #[test]
    fn empty_url_is_rejected() {
        let settings = SinkSettings::default();
        assert!(matches!(
            WebhookSink::new(&settings),
            Err(SinkError::NotConfigured(_))
        ));
    }
}
