// Technical indicators module
// Implements RSI, EMA/SMA and ATR for rule evaluation

pub mod atr;
pub mod moving_average;
pub mod rsi;

pub use atr::calculate_atr;
pub use moving_average::{calculate_ema, calculate_sma};
pub use rsi::calculate_rsi;
