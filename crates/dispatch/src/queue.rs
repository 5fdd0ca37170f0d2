use crate::error::DispatchError;
use core_types::{Clock, PendingOrder, SignalIntent};
use database::Store;
use std::sync::Arc;
use uuid::Uuid;

/// The durable holding area for trade intents awaiting dispatch.
///
/// Execution units enqueue; the dispatch worker drains. This is a thin,
/// intention-revealing API over the store — the queue's real state lives in
/// the `pending_orders` table so nothing is lost across restarts.
#[derive(Clone)]
pub struct PendingOrderQueue {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl PendingOrderQueue {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Persists a strategy-emitted intent as a Queued order.
    pub async fn enqueue(
        &self,
        run_id: Uuid,
        intent: &SignalIntent,
    ) -> Result<PendingOrder, DispatchError> {
        let order = PendingOrder::from_intent(run_id, intent, self.clock.now());
        self.store.create_order(&order).await?;
        tracing::info!(
            order_id = %order.order_id,
            run_id = %run_id,
            symbol = %order.symbol,
            side = ?order.side,
            quantity = %order.quantity,
            "order queued"
        );
        Ok(order)
    }

    /// Cancels a queued order.
    ///
    /// Only orders still in Queued can be cancelled; an order that is
    /// already dispatching resolves through the normal lease path, and a
    /// terminal order stays where it ended up.
    pub async fn cancel(&self, order_id: Uuid) -> Result<(), DispatchError> {
        if self.store.cancel_order(order_id).await? {
            tracing::info!(order_id = %order_id, "order cancelled");
            return Ok(());
        }
        match self.store.get_order(order_id).await? {
            None => Err(DispatchError::OrderNotFound(order_id)),
            Some(_) => Err(DispatchError::NotCancellable(order_id)),
        }
    }
}
