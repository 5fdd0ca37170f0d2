//! Integration tests for the dispatch worker, driven end-to-end against the
//! in-memory store with a scripted sink and a manual clock.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use configuration::DispatchSettings;
use core_types::{
    Clock, ManualClock, OrderSide, OrderStatus, OutboundSignal, RunStatus, SignalIntent,
    StrategyId, StrategyRun,
};
use database::{MemoryStore, Store};
use dispatch::{DispatchError, OrderDispatchWorker, PendingOrderQueue};
use rust_decimal_macros::dec;
use serde_json::json;
use sink::{DeliveryOutcome, SignalSink};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// A scripted sink. Pops one programmed outcome per delivery (defaulting to
/// success when the script runs dry) and models the receiver's idempotency
/// guarantee: one external side effect per unique key, no matter how many
/// times that key is delivered.
#[derive(Default)]
struct MockSink {
    script: Mutex<VecDeque<DeliveryOutcome>>,
    delivered: Mutex<Vec<Uuid>>,
    effects: Mutex<HashSet<Uuid>>,
}

impl MockSink {
    fn always_succeed() -> Self {
        Self::default()
    }

    fn scripted(outcomes: Vec<DeliveryOutcome>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            ..Self::default()
        }
    }

    fn delivered_keys(&self) -> Vec<Uuid> {
        self.delivered.lock().unwrap().clone()
    }

    fn effect_count(&self) -> usize {
        self.effects.lock().unwrap().len()
    }
}

#[async_trait]
impl SignalSink for MockSink {
    async fn deliver(&self, idempotency_key: Uuid, _signal: &OutboundSignal) -> DeliveryOutcome {
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(DeliveryOutcome::Success);
        self.delivered.lock().unwrap().push(idempotency_key);
        if outcome == DeliveryOutcome::Success {
            self.effects.lock().unwrap().insert(idempotency_key);
        }
        outcome
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    clock: ManualClock,
    sink: Arc<MockSink>,
    worker: OrderDispatchWorker,
    queue: PendingOrderQueue,
}

fn harness(sink: MockSink, settings: DispatchSettings) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let clock = ManualClock::new(Utc::now());
    let sink = Arc::new(sink);
    let worker = OrderDispatchWorker::new(
        store.clone(),
        sink.clone(),
        Arc::new(clock.clone()),
        settings,
    );
    let queue = PendingOrderQueue::new(
        store.clone(),
        Arc::new(clock.clone()),
    );
    Harness {
        store,
        clock,
        sink,
        worker,
        queue,
    }
}

async fn seed_run(store: &MemoryStore) -> Uuid {
    let mut run = StrategyRun::new(StrategyId::PriceThreshold, "BTCUSDT", json!({}), Utc::now());
    run.status = RunStatus::Running;
    store.create_run(&run).await.unwrap();
    run.run_id
}

#[tokio::test]
async fn first_attempt_success_dispatches_cleanly() {
    let h = harness(MockSink::always_succeed(), DispatchSettings::default());
    let run_id = seed_run(&h.store).await;

    let intent = SignalIntent::market("BTCUSDT", OrderSide::Buy, dec!(1));
    let order = h.queue.enqueue(run_id, &intent).await.unwrap();

    let attempted = h.worker.poll_once().await.unwrap();
    assert_eq!(attempted, 1);

    let reread = h.store.get_order(order.order_id).await.unwrap().unwrap();
    assert_eq!(reread.status, OrderStatus::Dispatched);
    assert!(reread.dispatched_at.is_some());
    assert_eq!(reread.retry_count, 0);
    assert!(reread.lease_owner.is_none());
    assert_eq!(h.sink.delivered_keys(), vec![order.order_id]);
}

#[tokio::test]
async fn transient_failures_exhaust_into_failed_after_max_retries() {
    let transient = || DeliveryOutcome::TransientFailure("broker unreachable".to_string());
    let h = harness(
        MockSink::scripted(vec![transient(), transient(), transient(), transient()]),
        DispatchSettings::default(), // max_retries = 3
    );
    let run_id = seed_run(&h.store).await;
    let intent = SignalIntent::market("BTCUSDT", OrderSide::Buy, dec!(1));
    let order = h.queue.enqueue(run_id, &intent).await.unwrap();

    // Attempts 1..=3: each transient failure requeues with a bumped retry
    // count and an armed backoff gate.
    for expected_retry in 1..=3 {
        h.worker.poll_once().await.unwrap();
        let reread = h.store.get_order(order.order_id).await.unwrap().unwrap();
        assert_eq!(reread.status, OrderStatus::Queued);
        assert_eq!(reread.retry_count, expected_retry);
        assert!(reread.next_attempt_at.is_some());
        // Walk the clock past the backoff gate for the next attempt.
        h.clock.advance(Duration::seconds(600));
    }

    // Attempt 4: retry budget exhausted; terminalized without another bump.
    h.worker.poll_once().await.unwrap();
    let reread = h.store.get_order(order.order_id).await.unwrap().unwrap();
    assert_eq!(reread.status, OrderStatus::Failed);
    assert_eq!(reread.retry_count, 3);
    assert!(reread.error.is_some());
    assert_eq!(h.sink.delivered_keys().len(), 4);
}

#[tokio::test]
async fn backoff_gate_defers_the_retry_until_due() {
    let h = harness(
        MockSink::scripted(vec![DeliveryOutcome::TransientFailure("503".to_string())]),
        DispatchSettings::default(), // backoff base 2s
    );
    let run_id = seed_run(&h.store).await;
    let intent = SignalIntent::market("BTCUSDT", OrderSide::Buy, dec!(1));
    let order = h.queue.enqueue(run_id, &intent).await.unwrap();

    h.worker.poll_once().await.unwrap();

    // Immediately polling again finds nothing: the order is in backoff.
    assert_eq!(h.worker.poll_once().await.unwrap(), 0);

    h.clock.advance(Duration::seconds(3));
    assert_eq!(h.worker.poll_once().await.unwrap(), 1);

    let reread = h.store.get_order(order.order_id).await.unwrap().unwrap();
    assert_eq!(reread.status, OrderStatus::Dispatched);
    assert_eq!(reread.retry_count, 1);
}

#[tokio::test]
async fn expired_lease_is_reaped_and_redispatched_without_a_retry_bump() {
    let h = harness(MockSink::always_succeed(), DispatchSettings::default());
    let run_id = seed_run(&h.store).await;
    let intent = SignalIntent::market("BTCUSDT", OrderSide::Sell, dec!(2));
    let order = h.queue.enqueue(run_id, &intent).await.unwrap();

    // A different worker leased the order and then went silent.
    let stuck_worker = Uuid::new_v4();
    let lease_expiry = h.clock.now() + Duration::seconds(30);
    assert!(
        h.store
            .try_lease_order(order.order_id, stuck_worker, lease_expiry)
            .await
            .unwrap()
    );

    // Before expiry the order is untouchable.
    assert_eq!(h.worker.poll_once().await.unwrap(), 0);

    // Past expiry the reaper releases it and this worker takes over.
    h.clock.advance(Duration::seconds(31));
    assert_eq!(h.worker.poll_once().await.unwrap(), 1);

    let reread = h.store.get_order(order.order_id).await.unwrap().unwrap();
    assert_eq!(reread.status, OrderStatus::Dispatched);
    assert_eq!(reread.retry_count, 0);
}

#[tokio::test]
async fn duplicate_delivery_of_one_key_has_one_external_effect() {
    let sink = MockSink::always_succeed();
    let run_id = Uuid::new_v4();
    let intent = SignalIntent::market("BTCUSDT", OrderSide::Buy, dec!(1));
    let order = core_types::PendingOrder::from_intent(run_id, &intent, Utc::now());
    let signal = OutboundSignal::from_order(&order);

    // Two workers racing a lost lease both deliver the same order.
    sink.deliver(order.order_id, &signal).await;
    sink.deliver(order.order_id, &signal).await;

    assert_eq!(sink.delivered_keys().len(), 2);
    assert_eq!(sink.effect_count(), 1);
}

#[tokio::test]
async fn orders_of_one_run_dispatch_in_fifo_order() {
    let h = harness(MockSink::always_succeed(), DispatchSettings::default());
    let run_id = seed_run(&h.store).await;

    let mut expected = Vec::new();
    for quantity in [dec!(1), dec!(2), dec!(3)] {
        let intent = SignalIntent::market("BTCUSDT", OrderSide::Buy, quantity);
        let order = h.queue.enqueue(run_id, &intent).await.unwrap();
        expected.push(order.order_id);
        // Distinct created_at per order keeps the FIFO key unambiguous.
        h.clock.advance(Duration::seconds(1));
    }

    // One order per run per poll: the queue head must resolve before the
    // next order is offered.
    for _ in 0..3 {
        assert_eq!(h.worker.poll_once().await.unwrap(), 1);
    }

    assert_eq!(h.sink.delivered_keys(), expected);
}

#[tokio::test]
async fn cancel_wins_only_while_queued() {
    let h = harness(MockSink::always_succeed(), DispatchSettings::default());
    let run_id = seed_run(&h.store).await;
    let intent = SignalIntent::market("BTCUSDT", OrderSide::Buy, dec!(1));
    let order = h.queue.enqueue(run_id, &intent).await.unwrap();

    h.queue.cancel(order.order_id).await.unwrap();
    let reread = h.store.get_order(order.order_id).await.unwrap().unwrap();
    assert_eq!(reread.status, OrderStatus::Cancelled);

    // A cancelled order is never offered to the sink.
    assert_eq!(h.worker.poll_once().await.unwrap(), 0);
    assert!(h.sink.delivered_keys().is_empty());

    // Cancelling again is NotCancellable; an unknown id is OrderNotFound.
    assert!(matches!(
        h.queue.cancel(order.order_id).await,
        Err(DispatchError::NotCancellable(_))
    ));
    assert!(matches!(
        h.queue.cancel(Uuid::new_v4()).await,
        Err(DispatchError::OrderNotFound(_))
    ));
}

#[tokio::test]
async fn permanent_failure_terminalizes_without_burning_retries() {
    let h = harness(
        MockSink::scripted(vec![DeliveryOutcome::PermanentFailure(
            "422 unknown instrument".to_string(),
        )]),
        DispatchSettings::default(),
    );
    let run_id = seed_run(&h.store).await;
    let intent = SignalIntent::market("NOPEUSDT", OrderSide::Buy, dec!(1));
    let order = h.queue.enqueue(run_id, &intent).await.unwrap();

    h.worker.poll_once().await.unwrap();

    let reread = h.store.get_order(order.order_id).await.unwrap().unwrap();
    assert_eq!(reread.status, OrderStatus::Failed);
    assert_eq!(reread.retry_count, 0);
    assert_eq!(reread.error.as_deref(), Some("422 unknown instrument"));
    assert_eq!(h.sink.delivered_keys().len(), 1);
}
