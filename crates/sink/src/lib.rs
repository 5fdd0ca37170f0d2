//! # Meridian Signal Sink Crate
//!
//! The delivery seam for dispatched orders. The dispatch worker hands a
//! `OutboundSignal` to a `SignalSink` and acts on the returned outcome; what
//! the sink actually is (webhook, broker bridge, notification fan-out) stays
//! behind the trait.
//!
//! Sinks must tolerate duplicate delivery attempts: the order id travels as
//! an idempotency key precisely so that a re-dispatch after a lease expiry
//! has no additional external effect.

use async_trait::async_trait;
use core_types::OutboundSignal;
use uuid::Uuid;

pub mod error;
pub mod webhook;

pub use error::SinkError;
pub use webhook::WebhookSink;

/// A sink that only logs. Used when no webhook is configured, so a local
/// instance can exercise the whole pipeline without delivering anywhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunSink;

#[async_trait]
impl SignalSink for DryRunSink {
    async fn deliver(&self, idempotency_key: Uuid, signal: &OutboundSignal) -> DeliveryOutcome {
        tracing::info!(
            key = %idempotency_key,
            run_id = %signal.run_id,
            symbol = %signal.symbol,
            side = ?signal.side,
            quantity = %signal.quantity,
            "[DRY RUN] would deliver signal"
        );
        DeliveryOutcome::Success
    }
}

/// How one delivery attempt resolved.
///
/// Transient failures are worth retrying (network hiccups, 5xx, throttling);
/// permanent ones will fail identically on every attempt and terminalize the
/// order immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Success,
    TransientFailure(String),
    PermanentFailure(String),
}

/// The external delivery target for dispatched orders.
#[async_trait]
pub trait SignalSink: Send + Sync {
    /// Attempts to deliver one signal. Never returns an error: every failure
    /// mode is folded into the outcome so the caller has exactly one
    /// decision to make.
    async fn deliver(&self, idempotency_key: Uuid, signal: &OutboundSignal) -> DeliveryOutcome;
}
