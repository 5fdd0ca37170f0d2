use crate::backoff::RetryBackoff;
use crate::error::DispatchError;
use chrono::Duration;
use configuration::DispatchSettings;
use core_types::{Clock, OutboundSignal, PendingOrder};
use database::Store;
use sink::{DeliveryOutcome, SignalSink};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::interval;
use uuid::Uuid;

/// The dispatch worker: leases queued orders and delivers them to the sink.
///
/// Designed to run in a concurrent background task for the life of the
/// process. Several instances — in this process or siblings sharing the
/// store — can drain the same queue; the per-order lease CAS decides who
/// dispatches what, and losing that race is normal operation, not an error.
pub struct OrderDispatchWorker {
    store: Arc<dyn Store>,
    sink: Arc<dyn SignalSink>,
    clock: Arc<dyn Clock>,
    settings: DispatchSettings,
    backoff: RetryBackoff,
    /// This worker's lease token. Resolution CASes carry it so a worker that
    /// outlived its lease cannot resolve an order someone else now owns.
    worker_id: Uuid,
}

impl OrderDispatchWorker {
    pub fn new(
        store: Arc<dyn Store>,
        sink: Arc<dyn SignalSink>,
        clock: Arc<dyn Clock>,
        settings: DispatchSettings,
    ) -> Self {
        let backoff = RetryBackoff::new(
            Duration::seconds(settings.backoff_base_secs),
            Duration::seconds(settings.backoff_cap_secs),
        );
        Self {
            store,
            sink,
            clock,
            settings,
            backoff,
            worker_id: Uuid::new_v4(),
        }
    }

    pub fn worker_id(&self) -> Uuid {
        self.worker_id
    }

    /// The long-running polling loop. Exits when the shutdown signal flips.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        tracing::info!(worker_id = %self.worker_id, "dispatch worker started");

        let mut timer = interval(self.settings.poll_interval());

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }

                _ = timer.tick() => {
                    if let Err(e) = self.poll_once().await {
                        tracing::error!(error = %e, "dispatch poll failed");
                    }
                }
            }
        }

        tracing::info!(worker_id = %self.worker_id, "dispatch worker stopped");
    }

    /// One poll cycle: reap expired leases, lease the ready queue heads,
    /// dispatch each. Returns how many orders this worker attempted.
    pub async fn poll_once(&self) -> Result<usize, DispatchError> {
        let now = self.clock.now();

        let released = self.store.release_expired_leases(now).await?;
        if released > 0 {
            tracing::warn!(released, "released expired dispatch leases back to the queue");
        }

        let batch = self
            .store
            .list_dispatchable_orders(now, self.settings.batch_size)
            .await?;

        let mut attempted = 0;
        for order in batch {
            let expires_at = now + self.settings.lease_duration();
            if !self
                .store
                .try_lease_order(order.order_id, self.worker_id, expires_at)
                .await?
            {
                // Another worker leased (or a cancel landed) between the
                // select and our CAS. Not our order anymore.
                continue;
            }
            attempted += 1;
            self.dispatch_order(&order).await?;
        }

        Ok(attempted)
    }

    /// Delivers one leased order and resolves its terminal-or-requeue state.
    async fn dispatch_order(&self, order: &PendingOrder) -> Result<(), DispatchError> {
        let signal = OutboundSignal::from_order(order);

        match self.sink.deliver(order.order_id, &signal).await {
            DeliveryOutcome::Success => {
                let dispatched_at = self.clock.now();
                if self
                    .store
                    .complete_dispatch(order.order_id, self.worker_id, dispatched_at)
                    .await?
                {
                    tracing::info!(
                        order_id = %order.order_id,
                        run_id = %order.run_id,
                        symbol = %order.symbol,
                        "order dispatched"
                    );
                } else {
                    // Our lease expired mid-delivery and the order moved on
                    // without us. The sink's idempotency key makes the
                    // eventual duplicate delivery harmless.
                    tracing::warn!(
                        order_id = %order.order_id,
                        "dispatch succeeded but lease was lost; leaving resolution to the new owner"
                    );
                }
            }
            DeliveryOutcome::TransientFailure(reason) => {
                if order.retry_count < self.settings.max_retries {
                    let delay = self.backoff.delay_for(order.retry_count);
                    let next_attempt_at = self.clock.now() + delay;
                    self.store
                        .requeue_for_retry(order.order_id, self.worker_id, next_attempt_at)
                        .await?;
                    tracing::warn!(
                        order_id = %order.order_id,
                        retry = order.retry_count + 1,
                        delay_secs = delay.num_seconds(),
                        %reason,
                        "transient dispatch failure; requeued"
                    );
                } else {
                    self.terminalize(order, &reason).await?;
                }
            }
            DeliveryOutcome::PermanentFailure(reason) => {
                // No amount of retrying fixes a permanent rejection.
                self.terminalize(order, &reason).await?;
            }
        }

        Ok(())
    }

    async fn terminalize(&self, order: &PendingOrder, reason: &str) -> Result<(), DispatchError> {
        if self
            .store
            .fail_order(order.order_id, self.worker_id, reason)
            .await?
        {
            // The alertable surface for terminally failed orders: they are
            // never auto-retried and need manual or external follow-up.
            tracing::error!(
                order_id = %order.order_id,
                run_id = %order.run_id,
                symbol = %order.symbol,
                retry_count = order.retry_count,
                %reason,
                "order terminally failed; manual follow-up required"
            );
        }
        Ok(())
    }
}
