//! Trade state: the single source of truth for whether a position is open
//! and what defines it.
//!
//! `TradeState` is a sum type so that a flat engine carries no half-filled
//! optional fields. It is created only from a venue-confirmed entry fill and
//! mutated only by the supervisor (trailing updates) or fill detection.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::venue::{OrderRef, OrderSide};

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "LONG",
            Side::Short => "SHORT",
        }
    }

    /// Order side that opens the position.
    pub fn entry_order_side(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    /// Order side that reduces the position (stops, targets, forced close).
    pub fn exit_order_side(&self) -> OrderSide {
        self.entry_order_side().opposite()
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a position stopped existing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Protective stop order filled at the venue
    StopLoss,
    /// Take-profit order filled at the venue
    TakeProfit,
    /// Stop/target placement failed right after entry; position force-closed
    ProtectionFailure,
    /// Trailing-stop replacement failed; position force-closed
    TrailingFailure,
    /// Venue reported zero exposure while our order handles were stale
    Reconciled,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::ProtectionFailure => "protection_failure",
            ExitReason::TrailingFailure => "trailing_failure",
            ExitReason::Reconciled => "reconciled",
        }
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single open-trade record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenPosition {
    pub side: Side,

    /// Venue-reported average fill price, never the requested price
    pub entry_price: Decimal,

    /// Venue-reported filled quantity, never the requested quantity
    pub quantity: Decimal,

    /// Price level of the live stop order, tracked locally
    pub stop_loss: Decimal,

    /// Price level of the live take-profit order, tracked locally
    pub take_profit: Decimal,

    /// Monetary risk budget consumed by this trade
    pub risk_amount: Decimal,

    /// Handle of the live stop order; `None` only mid-replacement or after
    /// a failed placement, which the supervisor treats as unprotected
    pub stop_order: Option<OrderRef>,

    /// Handle of the live take-profit order
    pub take_profit_order: Option<OrderRef>,

    /// Whether entry happened in the Asia session; fixes the trailing
    /// policy for the life of the trade
    pub asia_entry: bool,

    /// Time of the entry fill
    pub opened_at: DateTime<Utc>,
}

impl OpenPosition {
    /// Estimated PnL if the position were closed at `exit_price`.
    /// Authoritative PnL comes from the venue's own records.
    pub fn estimated_pnl(&self, exit_price: Decimal) -> Decimal {
        match self.side {
            Side::Long => (exit_price - self.entry_price) * self.quantity,
            Side::Short => (self.entry_price - exit_price) * self.quantity,
        }
    }

    /// Both protective orders are live at the venue.
    pub fn is_protected(&self) -> bool {
        self.stop_order.is_some() && self.take_profit_order.is_some()
    }

    /// Stop and target sit on the correct sides of the entry price.
    pub fn protective_ordering_holds(&self) -> bool {
        match self.side {
            Side::Long => self.stop_loss < self.entry_price && self.entry_price < self.take_profit,
            Side::Short => self.take_profit < self.entry_price && self.entry_price < self.stop_loss,
        }
    }
}

/// Whether a trade is currently tracked.
#[derive(Debug, Clone, Default)]
pub enum TradeState {
    /// No trade is tracked or pending
    #[default]
    Flat,
    /// One live position, at most one at any time
    Open(OpenPosition),
}

impl TradeState {
    pub fn is_open(&self) -> bool {
        matches!(self, TradeState::Open(_))
    }
}
