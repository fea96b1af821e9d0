//! Display refresh ticks
//!
//! A [`TickScheduler`] hands out tick registrations. The compositor owns one
//! registration while it is active and drops it when deactivated, so no tick
//! can reach it afterwards.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{Interval, MissedTickBehavior};

/// Default display refresh rate
pub const DEFAULT_REFRESH_HZ: u32 = 60;

/// One registration for per-frame callbacks
#[async_trait]
pub trait TickSource: Send {
    /// Wait for the next display refresh. `None` once the scheduler is gone.
    async fn next_tick(&mut self) -> Option<()>;
}

/// Hands out tick registrations
pub trait TickScheduler: Send + Sync {
    fn subscribe(&self) -> Box<dyn TickSource>;
}

/// Ticks at the display refresh rate. Late ticks are skipped rather than
/// bunched up, so drawing never runs faster than the display.
#[derive(Debug, Clone)]
pub struct DisplayClock {
    refresh_hz: u32,
}

impl DisplayClock {
    pub fn new(refresh_hz: u32) -> Self {
        Self {
            refresh_hz: refresh_hz.max(1),
        }
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(1) / self.refresh_hz
    }
}

impl Default for DisplayClock {
    fn default() -> Self {
        Self::new(DEFAULT_REFRESH_HZ)
    }
}

impl TickScheduler for DisplayClock {
    fn subscribe(&self) -> Box<dyn TickSource> {
        let mut interval = tokio::time::interval(self.period());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Box::new(IntervalTicks(interval))
    }
}

struct IntervalTicks(Interval);

#[async_trait]
impl TickSource for IntervalTicks {
    async fn next_tick(&mut self) -> Option<()> {
        self.0.tick().await;
        Some(())
    }
}

/// Clock driven by explicit [`ManualClock::tick`] calls.
///
/// Used when an embedding UI already has its own refresh callback.
#[derive(Debug, Clone)]
pub struct ManualClock {
    tx: broadcast::Sender<()>,
}

impl ManualClock {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    /// Fire one tick. Returns how many registrations received it.
    pub fn tick(&self) -> usize {
        self.tx.send(()).unwrap_or(0)
    }

    /// Number of live registrations
    pub fn registrations(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TickScheduler for ManualClock {
    fn subscribe(&self) -> Box<dyn TickSource> {
        Box::new(ManualTicks(self.tx.subscribe()))
    }
}

struct ManualTicks(broadcast::Receiver<()>);

#[async_trait]
impl TickSource for ManualTicks {
    async fn next_tick(&mut self) -> Option<()> {
        match self.0.recv().await {
            Ok(()) => Some(()),
            // Missed ticks collapse into one
            Err(broadcast::error::RecvError::Lagged(_)) => Some(()),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}
