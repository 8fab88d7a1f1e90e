//! Engine: the single control loop that ties feed, signal, sizing,
//! orchestration, and supervision together.
//!
//! One cycle at a time; every venue call is awaited in sequence and the
//! trade state is owned exclusively by this loop. A failed cycle is logged
//! and absorbed by the inter-cycle sleep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::error::VenueError;
use crate::feed::IndicatorFeed;
use crate::models::TradeState;
use crate::trading::{
    EntryOutcome, OrderOrchestrator, PositionSizer, PositionSupervisor, SignalEvaluator,
};
use crate::venue::{SymbolFilters, Venue};

/// Position-management engine for one symbol on one venue.
pub struct Engine<V: Venue> {
    config: EngineConfig,
    venue: V,
    filters: SymbolFilters,

    feed: IndicatorFeed,
    evaluator: SignalEvaluator,
    sizer: PositionSizer,
    orchestrator: OrderOrchestrator,
    supervisor: PositionSupervisor,

    state: TradeState,
    shutdown: Arc<AtomicBool>,
}

impl<V: Venue> Engine<V> {
    /// Fetch market metadata and assemble the engine. A metadata failure
    /// here is fatal: without tick size and precision no order can be
    /// priced correctly.
    pub async fn connect(config: EngineConfig, venue: V) -> Result<Self> {
        let filters = venue
            .symbol_filters(&config.symbol)
            .await
            .with_context(|| format!("failed to load market metadata for {}", config.symbol))?;

        info!(
            symbol = %config.symbol,
            price_tick = %filters.price_tick,
            qty_precision = filters.qty_precision,
            min_qty = %filters.min_qty,
            "market metadata loaded"
        );

        let feed = IndicatorFeed::new(config.strategy.clone());
        let evaluator = SignalEvaluator::new(&config.strategy, filters);
        let sizer = PositionSizer::new(config.risk_budget, config.fee_rate, filters);
        let orchestrator = OrderOrchestrator::new(
            config.symbol.clone(),
            filters,
            Duration::from_secs(config.entry_fill_timeout_secs),
            config.risk_budget,
        );
        let supervisor = PositionSupervisor::new(
            config.symbol.clone(),
            filters,
            config.strategy.trailing_ratio,
        );

        Ok(Self {
            config,
            venue,
            filters,
            feed,
            evaluator,
            sizer,
            orchestrator,
            supervisor,
            state: TradeState::Flat,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Shutdown flag for external control.
    pub fn shutdown_signal(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn state(&self) -> &TradeState {
        &self.state
    }

    /// Main loop: runs until the shutdown flag is set.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            symbol = %self.config.symbol,
            timeframe = %self.config.timeframe,
            interval = self.config.cycle_interval_secs,
            risk = %self.config.risk_budget,
            "engine starting"
        );

        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("shutdown signal received");
            shutdown.store(true, Ordering::SeqCst);
        });

        let mut cycles = interval(Duration::from_secs(self.config.cycle_interval_secs));
        while !self.shutdown.load(Ordering::SeqCst) {
            cycles.tick().await;
            if let Err(e) = self.cycle().await {
                error!(error = %e, "cycle failed");
            }
        }

        if let TradeState::Open(pos) = &self.state {
            warn!(
                side = %pos.side,
                qty = %pos.quantity,
                "engine stopping with an open position; protective orders \
                 remain live at the venue"
            );
        }
        info!("engine stopped");
        Ok(())
    }

    /// One strategy cycle.
    pub async fn cycle(&mut self) -> Result<()> {
        let current_price = self
            .venue
            .ticker_price(&self.config.symbol)
            .await
            .context("ticker fetch failed")?;

        let candles = self
            .venue
            .candles(
                &self.config.symbol,
                &self.config.timeframe,
                self.config.candle_limit(),
            )
            .await
            .context("candle fetch failed")?;

        if candles.len() < self.feed.min_history() {
            warn!(
                have = candles.len(),
                need = self.feed.min_history(),
                "not enough candle history yet"
            );
            return Ok(());
        }

        let annotated = self.feed.annotate(&candles);
        let last = annotated
            .last()
            .context("annotation produced no candles")?;

        let Some(current_atr) = last.atr else {
            warn!("ATR not warm on the latest candle, skipping cycle");
            return Ok(());
        };
        if current_atr.is_zero() {
            warn!("ATR is zero on the latest candle, skipping cycle");
            return Ok(());
        }

        info!(
            price = %current_price,
            atr = %current_atr,
            open = self.state.is_open(),
            "cycle"
        );

        match std::mem::take(&mut self.state) {
            TradeState::Open(position) => {
                let backup = position.clone();
                match self
                    .supervisor
                    .supervise(&self.venue, position, current_price, current_atr)
                    .await
                {
                    Ok(next) => self.state = next,
                    Err(e) => {
                        // keep tracking the position across a failed cycle
                        self.state = TradeState::Open(backup);
                        return Err(e).context("position supervision failed");
                    }
                }
            }
            TradeState::Flat => {
                let prev = &annotated[annotated.len() - 2];
                if let Some(signal) = self.evaluator.evaluate(prev, last) {
                    self.state = self.enter(&signal).await;
                }
            }
        }

        Ok(())
    }

    /// Size the signal and run the entry orchestration, classifying
    /// failures per the error taxonomy.
    async fn enter(&self, signal: &crate::trading::EntrySignal) -> TradeState {
        let qty = self
            .sizer
            .size(signal.entry_price, signal.atr, signal.stop_ratio);
        if qty.is_zero() {
            warn!(
                entry = %signal.entry_price,
                atr = %signal.atr,
                "sized quantity is zero, not trading"
            );
            return TradeState::Flat;
        }

        info!(
            side = %signal.side,
            entry = %signal.entry_price,
            qty = %qty,
            session = ?signal.session,
            "entry signal"
        );

        match self.orchestrator.open(&self.venue, signal, qty).await {
            Ok(EntryOutcome::Opened(position)) => TradeState::Open(position),
            Ok(EntryOutcome::NotFilled) => {
                info!("entry not filled, staying flat");
                TradeState::Flat
            }
            Ok(EntryOutcome::EmergencyClosed(reason)) => {
                warn!(reason = %reason, "entry aborted after forced close");
                TradeState::Flat
            }
            Ok(EntryOutcome::Unprotected(position)) => {
                // close already escalated; keep tracking so the supervisor
                // retries next cycle
                TradeState::Open(position)
            }
            Err(e) if e.is_rejection() => {
                warn!(error = %e, "entry rejected by venue, will re-evaluate next cycle");
                TradeState::Flat
            }
            Err(e) if e.is_transient() => {
                warn!(error = %e, "entry aborted on transient venue failure");
                TradeState::Flat
            }
            Err(e) => {
                error!(error = %e, "entry failed");
                TradeState::Flat
            }
        }
    }

    /// Venue-reported net position, used by operator tooling.
    pub async fn venue_net_position(&self) -> Result<rust_decimal::Decimal, VenueError> {
        self.venue.net_position(&self.config.symbol).await
    }

    pub fn filters(&self) -> SymbolFilters {
        self.filters
    }
}
