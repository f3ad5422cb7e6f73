pub mod postgres;

pub use postgres::{SignalStats, Store};
