//! Snapshot Producer
//!
//! Simulates a moving price and turns it into an account [`Snapshot`] on
//! a fixed cadence, handing each one to a [`SnapshotPublisher`].
//!
//! Each tick perturbs the previous price by a bounded relative delta:
//!
//! ```text
//! new_price = previous_price * (1 + delta)      delta ∈ [-max, +max]
//! ```
//!
//! By default `previous_price` stays at the baseline for every tick, so
//! each snapshot is an independent move away from the same price. With
//! `random_walk` enabled the new price carries into the next tick.
//!
//! A tick whose arithmetic overflows is logged and skipped; the producer
//! keeps running.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::application::ports::SnapshotPublisher;
use crate::domain::snapshot::{AccountParameters, Snapshot, SnapshotError};

/// Decimal places kept on a carried-forward price.
const CARRIED_PRICE_DP: u32 = 10;

/// Decimal places kept on a sampled delta.
const DELTA_DP: u32 = 8;

// =============================================================================
// Price Delta Sources
// =============================================================================

/// Source of relative price moves.
pub trait PriceDelta: Send {
    /// Next relative delta (e.g. `0.002` for +0.2%).
    fn next_delta(&mut self) -> Decimal;
}

/// Uniformly distributed delta over `[-max, +max]`.
#[derive(Debug)]
pub struct UniformDelta {
    rng: StdRng,
    max_relative_delta: f64,
}

impl UniformDelta {
    /// Create a source seeded from the operating system.
    #[must_use]
    pub fn new(max_relative_delta: f64) -> Self {
        Self {
            rng: StdRng::from_os_rng(),
            max_relative_delta: max_relative_delta.abs(),
        }
    }

    /// Create a reproducible source.
    #[must_use]
    pub fn seeded(max_relative_delta: f64, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            max_relative_delta: max_relative_delta.abs(),
        }
    }
}

impl PriceDelta for UniformDelta {
    fn next_delta(&mut self) -> Decimal {
        let max = self.max_relative_delta;
        if !max.is_finite() || max <= 0.0 {
            return Decimal::ZERO;
        }
        let sample: f64 = self.rng.random_range(-max..=max);
        Decimal::try_from(sample)
            .unwrap_or(Decimal::ZERO)
            .round_dp(DELTA_DP)
    }
}

/// Same delta on every tick.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelta(pub Decimal);

impl PriceDelta for FixedDelta {
    fn next_delta(&mut self) -> Decimal {
        self.0
    }
}

// =============================================================================
// Producer
// =============================================================================

/// Producer cadence and price model.
#[derive(Debug, Clone, Copy)]
pub struct ProducerSettings {
    /// Time between emissions.
    pub interval: Duration,
    /// Carry each new price into the next tick.
    pub random_walk: bool,
}

impl Default for ProducerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            random_walk: false,
        }
    }
}

/// Periodic snapshot generator.
pub struct SnapshotProducer {
    params: AccountParameters,
    settings: ProducerSettings,
    delta: Box<dyn PriceDelta>,
    publisher: Arc<dyn SnapshotPublisher>,
    previous_price: Decimal,
    emitted: u64,
}

impl SnapshotProducer {
    /// Create a producer starting at `params.baseline_price`.
    #[must_use]
    pub fn new(
        params: AccountParameters,
        settings: ProducerSettings,
        delta: Box<dyn PriceDelta>,
        publisher: Arc<dyn SnapshotPublisher>,
    ) -> Self {
        Self {
            previous_price: params.baseline_price,
            params,
            settings,
            delta,
            publisher,
            emitted: 0,
        }
    }

    /// Price the next tick will move away from.
    #[must_use]
    pub const fn previous_price(&self) -> Decimal {
        self.previous_price
    }

    /// Number of snapshots published so far.
    #[must_use]
    pub const fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Compute the next snapshot without publishing it.
    ///
    /// The price is only carried forward when the snapshot was computed.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::Overflow` if the new price or a derived
    /// amount is out of range.
    pub fn tick(&mut self) -> Result<Snapshot, SnapshotError> {
        let delta = self.delta.next_delta();
        let new_price = Decimal::ONE
            .checked_add(delta)
            .and_then(|factor| self.previous_price.checked_mul(factor))
            .ok_or(SnapshotError::Overflow("new price"))?;
        let snapshot = Snapshot::compute(&self.params, self.previous_price, new_price)?;

        if self.settings.random_walk {
            self.previous_price = new_price.round_dp(CARRIED_PRICE_DP);
        }

        Ok(snapshot)
    }

    /// Compute the next snapshot and publish it.
    ///
    /// Returns `None` when the tick was skipped.
    pub async fn tick_and_publish(&mut self) -> Option<Snapshot> {
        let snapshot = match self.tick() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    previous_price = %self.previous_price,
                    "Snapshot skipped"
                );
                return None;
            }
        };
        self.publisher.publish(&snapshot).await;
        self.emitted += 1;

        tracing::debug!(
            pnl = %snapshot.unrealized_pnl(),
            margin = %snapshot.margin_balance(),
            can_transfer = %snapshot.transferable(),
            "Snapshot published"
        );

        Some(snapshot)
    }

    /// Publish one snapshot per interval until cancelled.
    ///
    /// The first snapshot goes out immediately.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.settings.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_ms = u64::try_from(self.settings.interval.as_millis()).unwrap_or(u64::MAX),
            random_walk = self.settings.random_walk,
            baseline_price = %self.params.baseline_price,
            "Snapshot producer started"
        );

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    self.tick_and_publish().await;
                }
            }
        }

        tracing::info!(emitted = self.emitted, "Snapshot producer stopped");
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[derive(Default)]
    struct RecordingPublisher {
        published: Mutex<Vec<Snapshot>>,
    }

    #[async_trait]
    impl SnapshotPublisher for RecordingPublisher {
        async fn publish(&self, snapshot: &Snapshot) {
            self.published.lock().await.push(*snapshot);
        }
    }

    fn producer_with(
        delta: Decimal,
        random_walk: bool,
        publisher: Arc<RecordingPublisher>,
    ) -> SnapshotProducer {
        producer_for(AccountParameters::default(), delta, random_walk, publisher)
    }

    fn producer_for(
        params: AccountParameters,
        delta: Decimal,
        random_walk: bool,
        publisher: Arc<RecordingPublisher>,
    ) -> SnapshotProducer {
        SnapshotProducer::new(
            params,
            ProducerSettings {
                interval: Duration::from_millis(10),
                random_walk,
            },
            Box::new(FixedDelta(delta)),
            publisher,
        )
    }

    #[test]
    fn fixed_delta_tick_matches_demo_scenario() {
        let publisher = Arc::new(RecordingPublisher::default());
        let mut producer = producer_with(dec("0.002"), false, publisher);

        let snapshot = producer.tick().unwrap();

        assert_eq!(snapshot.balance(), dec("26800.5"));
        assert_eq!(snapshot.unrealized_pnl(), dec("17.76"));
        assert_eq!(snapshot.margin_balance(), dec("26782.74"));
        assert_eq!(snapshot.transferable(), dec("17902.74"));
    }

    #[test]
    fn baseline_is_not_carried_forward_by_default() {
        let publisher = Arc::new(RecordingPublisher::default());
        let mut producer = producer_with(dec("0.002"), false, publisher);

        let first = producer.tick().unwrap();
        let second = producer.tick().unwrap();

        assert_eq!(first, second);
        assert_eq!(producer.previous_price(), dec("100"));
    }

    #[test]
    fn random_walk_carries_price_forward() {
        let publisher = Arc::new(RecordingPublisher::default());
        let mut producer = producer_with(dec("0.002"), true, publisher);

        producer.tick().unwrap();
        assert_eq!(producer.previous_price(), dec("100.2"));

        let second = producer.tick().unwrap();
        // (100.2 * 1.002 - 100.2) * 88.8
        assert_eq!(second.unrealized_pnl(), dec("17.795520"));
    }

    #[test]
    fn uniform_delta_stays_within_bounds() {
        let mut source = UniformDelta::seeded(0.005, 42);
        let bound = dec("0.005");
        for _ in 0..10_000 {
            let delta = source.next_delta();
            assert!(delta >= -bound && delta <= bound, "delta {delta} out of range");
        }
    }

    #[test]
    fn uniform_delta_is_reproducible_with_seed() {
        let mut a = UniformDelta::seeded(0.005, 7);
        let mut b = UniformDelta::seeded(0.005, 7);
        for _ in 0..100 {
            assert_eq!(a.next_delta(), b.next_delta());
        }
    }

    #[test]
    fn zero_range_yields_zero_delta() {
        let mut source = UniformDelta::seeded(0.0, 1);
        assert!(source.next_delta().is_zero());
    }

    #[tokio::test]
    async fn tick_and_publish_hands_snapshot_to_publisher() {
        let publisher = Arc::new(RecordingPublisher::default());
        let mut producer = producer_with(dec("0.002"), false, Arc::clone(&publisher));

        let snapshot = producer.tick_and_publish().await.unwrap();

        let published = publisher.published.lock().await;
        assert_eq!(published.as_slice(), &[snapshot]);
        assert_eq!(producer.emitted(), 1);
    }

    fn overflowing_account() -> AccountParameters {
        AccountParameters {
            position_size: dec("100000000000000000000"),
            lock_price: dec("10000000000"),
            ..AccountParameters::default()
        }
    }

    #[tokio::test]
    async fn overflowing_tick_is_skipped_not_published() {
        let publisher = Arc::new(RecordingPublisher::default());
        let mut producer =
            producer_for(overflowing_account(), dec("0.002"), true, Arc::clone(&publisher));

        assert_eq!(
            producer.tick(),
            Err(SnapshotError::Overflow("locked amount"))
        );
        assert!(producer.tick_and_publish().await.is_none());

        assert!(publisher.published.lock().await.is_empty());
        assert_eq!(producer.emitted(), 0);
        // Failed ticks do not move the walk.
        assert_eq!(producer.previous_price(), dec("100"));
    }

    #[tokio::test(start_paused = true)]
    async fn run_survives_overflowing_ticks() {
        let publisher = Arc::new(RecordingPublisher::default());
        let producer =
            producer_for(overflowing_account(), dec("0.001"), false, Arc::clone(&publisher));
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(producer.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(35)).await;
        assert!(!handle.is_finished());
        cancel.cancel();
        handle.await.unwrap();

        assert!(publisher.published.lock().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_emits_once_per_interval_until_cancelled() {
        let publisher = Arc::new(RecordingPublisher::default());
        let producer = producer_with(dec("0.001"), false, Arc::clone(&publisher));
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(producer.run(cancel.clone()));

        // Immediate first tick plus one per 10ms.
        tokio::time::sleep(Duration::from_millis(35)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(publisher.published.lock().await.len(), 4);
    }
}
