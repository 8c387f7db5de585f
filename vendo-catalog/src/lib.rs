pub mod stock;

pub use stock::{StockError, StockLedger};
