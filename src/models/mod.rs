//! Data models for candles, sessions, and the open-trade record.

mod candle;
mod position;
mod session;

pub use candle::Candle;
pub use position::{ExitReason, OpenPosition, Side, TradeState};
pub use session::{Session, SessionPolicy};
