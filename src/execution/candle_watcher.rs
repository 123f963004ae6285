use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::{interval_at, Duration, Instant};

use super::live_engine::LiveEngine;
use super::market_data::MarketData;
use crate::error::TrendbotError;
use crate::models::Interval;
use crate::Result;

/// Cooperative stop flag shared with a running watcher
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatcherStats {
    pub polls: usize,
    pub delivered: usize,
    /// Latest bar was not newer than the last one delivered
    pub duplicates: usize,
    pub errors: usize,
}

/// Polls the market-data source and feeds each newly closed bar to the engine
pub struct CandleWatcher {
    engine: Arc<Mutex<LiveEngine>>,
    market_data: Arc<dyn MarketData>,
    instrument: String,
    interval: Interval,
    poll_every: Duration,
    stop: StopHandle,
}

impl CandleWatcher {
    pub fn new(
        engine: Arc<Mutex<LiveEngine>>,
        market_data: Arc<dyn MarketData>,
        instrument: impl Into<String>,
        interval: Interval,
        poll_every: Duration,
    ) -> Self {
        Self {
            engine,
            market_data,
            instrument: instrument.into(),
            interval,
            poll_every,
            stop: StopHandle::default(),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Run until stopped or the engine lock is poisoned
    ///
    /// The stop flag is checked once per poll, so at most one extra bar is
    /// processed after `stop()` is called.
    pub async fn run(self) -> WatcherStats {
        tracing::info!(
            instrument = %self.instrument,
            interval = %self.interval,
            "Candle watcher starting (poll every {:?})",
            self.poll_every
        );

        let mut ticker = interval_at(Instant::now(), self.poll_every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut stats = WatcherStats::default();
        let mut last_delivered: Option<DateTime<Utc>> = self
            .engine
            .lock()
            .ok()
            .and_then(|engine| engine.last_bar_time());

        loop {
            ticker.tick().await;
            if self.stop.is_stopped() {
                break;
            }

            if let Err(e) = self.poll_once(&mut last_delivered, &mut stats) {
                tracing::error!(instrument = %self.instrument, "Candle watcher stopping: {}", e);
                break;
            }
        }

        tracing::info!(
            instrument = %self.instrument,
            "Candle watcher stopped: {} polls, {} bars delivered, {} errors",
            stats.polls,
            stats.delivered,
            stats.errors
        );
        stats
    }

    fn poll_once(
        &self,
        last_delivered: &mut Option<DateTime<Utc>>,
        stats: &mut WatcherStats,
    ) -> Result<()> {
        stats.polls += 1;

        let bar = match self
            .market_data
            .get_latest_closed_bar(&self.instrument, self.interval)
        {
            Ok(Some(bar)) => bar,
            Ok(None) => return Ok(()),
            Err(e) => {
                tracing::warn!(instrument = %self.instrument, "Latest bar fetch failed: {}", e);
                stats.errors += 1;
                return Ok(());
            }
        };

        if last_delivered.is_some_and(|last| bar.open_time <= last) {
            stats.duplicates += 1;
            return Ok(());
        }

        let mut engine = self
            .engine
            .lock()
            .map_err(|e| TrendbotError::EngineLock(e.to_string()))?;
        // Advance even on rejection so a bad bar is not retried forever
        *last_delivered = Some(bar.open_time);

        match engine.on_new_bar(bar) {
            Ok(()) => stats.delivered += 1,
            Err(e) => {
                tracing::warn!(instrument = %self.instrument, "Rejected bar {}: {}", bar.open_time, e);
                stats.errors += 1;
            }
        }

        Ok(())
    }
}
