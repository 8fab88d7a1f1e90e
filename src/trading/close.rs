//! Forced close: flatten a tracked position with a reduce-only market order.
//!
//! Used when protective orders cannot be placed or replaced. The close is
//! retried with exponential backoff, never in a tight loop; a close that
//! still fails is the one condition requiring manual intervention and is
//! escalated on the dedicated critical target.

use std::time::Duration;

use backoff::ExponentialBackoff;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::error::VenueError;
use crate::models::{ExitReason, OpenPosition};
use crate::trading::CRITICAL;
use crate::venue::{OrderRef, Venue};

const CLOSE_RETRY_INITIAL: Duration = Duration::from_millis(500);
const CLOSE_RETRY_BUDGET: Duration = Duration::from_secs(15);

/// Cancel any live protective orders (tolerating "already gone"), then
/// submit a reduce-only market order for the full tracked quantity.
///
/// On success returns the estimated PnL at the last traded price; the
/// venue's own records stay authoritative. On failure the critical event
/// has already been emitted and the caller must keep the position tracked
/// so the close is retried on a later cycle.
pub async fn force_close<V: Venue>(
    venue: &V,
    symbol: &str,
    position: &OpenPosition,
    reason: ExitReason,
) -> Result<Decimal, VenueError> {
    info!(
        side = %position.side,
        qty = %position.quantity,
        reason = %reason,
        "force-closing position"
    );

    cancel_best_effort(venue, position.stop_order.as_ref()).await;
    cancel_best_effort(venue, position.take_profit_order.as_ref()).await;

    // estimate only; a stale or missing ticker must not block the close
    let exit_price = venue
        .ticker_price(symbol)
        .await
        .unwrap_or(position.entry_price);

    let close_side = position.side.exit_order_side();
    let policy = ExponentialBackoff {
        initial_interval: CLOSE_RETRY_INITIAL,
        max_elapsed_time: Some(CLOSE_RETRY_BUDGET),
        ..ExponentialBackoff::default()
    };

    let attempt = || async {
        venue
            .place_market_order(symbol, close_side, position.quantity, true)
            .await
            .map_err(|e| {
                if e.is_transient() {
                    warn!(error = %e, "close attempt failed, backing off");
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
    };

    match backoff::future::retry(policy, attempt).await {
        Ok(order) => {
            let pnl = position.estimated_pnl(exit_price);
            info!(
                order = %order,
                exit_price = %exit_price,
                est_pnl = %pnl,
                reason = %reason,
                "position force-closed"
            );
            Ok(pnl)
        }
        Err(e) => {
            error!(
                target: CRITICAL,
                error = %e,
                side = %position.side,
                qty = %position.quantity,
                reason = %reason,
                "FORCED CLOSE FAILED: live position with no working protective \
                 orders, manual intervention required"
            );
            Err(e)
        }
    }
}

/// Cancel an order if we still hold a handle, treating not-found as done.
async fn cancel_best_effort<V: Venue>(venue: &V, order: Option<&OrderRef>) {
    let Some(order) = order else { return };
    match venue.cancel_order(order).await {
        Ok(_) => {}
        Err(VenueError::OrderNotFound(_)) => {}
        Err(e) => warn!(order = %order, error = %e, "cancel failed, continuing close"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Side;
    use crate::venue::mock::MockVenue;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn position() -> OpenPosition {
        OpenPosition {
            side: Side::Long,
            entry_price: dec!(100),
            quantity: dec!(0.5),
            stop_loss: dec!(94),
            take_profit: dec!(118),
            risk_amount: dec!(0.8),
            stop_order: Some(OrderRef::new("BTCUSDT", "sl-1")),
            take_profit_order: Some(OrderRef::new("BTCUSDT", "tp-1")),
            asia_entry: false,
            opened_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn close_cancels_protection_then_markets_out() {
        let venue = MockVenue::new();
        venue.push_ticker(dec!(104));

        let pnl = force_close(&venue, "BTCUSDT", &position(), ExitReason::ProtectionFailure)
            .await
            .expect("close succeeds");
        assert_eq!(pnl, dec!(2));

        let cancelled = venue.cancelled();
        assert_eq!(cancelled.len(), 2);

        let placed = venue.placed();
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].side, crate::venue::OrderSide::Sell);
        assert_eq!(placed[0].qty, dec!(0.5));
        assert!(placed[0].reduce_only);
    }

    #[tokio::test]
    async fn close_failure_is_surfaced() {
        let venue = MockVenue::new();
        venue.push_ticker(dec!(104));
        venue.fail_market_orders();

        let err = force_close(&venue, "BTCUSDT", &position(), ExitReason::TrailingFailure)
            .await
            .expect_err("close must fail");
        assert!(err.is_rejection());
    }
}
