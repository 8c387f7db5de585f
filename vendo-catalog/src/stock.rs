use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Per-product stock position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockRecord {
    pub product_id: Uuid,
    pub available_quantity: i32,
}

/// In-memory stock ledger. The authoritative quantity per product, mutated
/// only through signed-delta adjustment; an adjustment that would drive a
/// quantity negative is rejected whole.
pub struct StockLedger {
    records: HashMap<Uuid, StockRecord>,
}

impl StockLedger {
    pub fn new() -> Self {
        Self { records: HashMap::new() }
    }

    /// Seed the ledger with a product's starting quantity.
    pub fn initialize(&mut self, product_id: Uuid, quantity: i32) {
        self.records.insert(
            product_id,
            StockRecord { product_id, available_quantity: quantity },
        );
    }

    pub fn get(&self, product_id: &Uuid) -> Option<&StockRecord> {
        self.records.get(product_id)
    }

    /// Apply a signed delta to a product's quantity. Fails without mutating
    /// if the product is unknown or the result would go negative.
    pub fn adjust(&mut self, product_id: &Uuid, delta: i32) -> Result<i32, StockError> {
        let record = self
            .records
            .get_mut(product_id)
            .ok_or(StockError::NotFound(*product_id))?;

        let next = record.available_quantity + delta;
        if next < 0 {
            return Err(StockError::InsufficientStock {
                product_id: *product_id,
                requested: -delta,
                available: record.available_quantity,
            });
        }

        record.available_quantity = next;
        Ok(next)
    }
}

impl Default for StockLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StockError {
    #[error("Stock record not found for product {0}")]
    NotFound(Uuid),

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        requested: i32,
        available: i32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjust_decrements_and_restocks() {
        let mut ledger = StockLedger::new();
        let product_id = Uuid::new_v4();

        ledger.initialize(product_id, 10);
        assert_eq!(ledger.adjust(&product_id, -3).unwrap(), 7);
        assert_eq!(ledger.adjust(&product_id, 5).unwrap(), 12);
        assert_eq!(ledger.get(&product_id).unwrap().available_quantity, 12);
    }

    #[test]
    fn adjust_rejects_negative_result() {
        let mut ledger = StockLedger::new();
        let product_id = Uuid::new_v4();

        ledger.initialize(product_id, 1);
        let err = ledger.adjust(&product_id, -2).unwrap_err();
        match err {
            StockError::InsufficientStock { requested, available, .. } => {
                assert_eq!(requested, 2);
                assert_eq!(available, 1);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        // Failed adjustment leaves the quantity untouched
        assert_eq!(ledger.get(&product_id).unwrap().available_quantity, 1);
    }

    #[test]
    fn adjust_unknown_product_fails() {
        let mut ledger = StockLedger::new();
        assert!(matches!(
            ledger.adjust(&Uuid::new_v4(), -1),
            Err(StockError::NotFound(_))
        ));
    }
}
