//! In-memory order store for testing and development.
//!
//! The reservation operations run as compare-and-set under the store's own
//! write lock, which is this adapter's equivalent of the database's
//! row-level atomicity: racing callers are serialized by the lock, so at
//! most one observes a successful claim.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::application::ports::{OrderStorePort, StoreError, SubmissionConfirmation};
use crate::domain::{OrderRecord, OrderStatus};

/// In-memory implementation of `OrderStorePort`.
///
/// Suitable for testing and development. Not for production use.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<i64, OrderRecord>>,
    blotters: RwLock<HashSet<i64>>,
}

impl InMemoryOrderStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a blotter id as known.
    pub fn add_blotter(&self, blotter_id: i64) {
        self.blotters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(blotter_id);
    }

    /// Insert an order (for test setup). Its blotter becomes known.
    pub fn add(&self, order: OrderRecord) {
        self.add_blotter(order.blotter_id);
        self.orders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(order.id, order);
    }

    /// Snapshot one order.
    #[must_use]
    pub fn get(&self, order_id: i64) -> Option<OrderRecord> {
        self.orders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&order_id)
            .cloned()
    }
}

#[async_trait]
impl OrderStorePort for InMemoryOrderStore {
    async fn find_all_by_ids(&self, ids: &[i64]) -> Result<Vec<OrderRecord>, StoreError> {
        let orders = self.orders.read().unwrap_or_else(PoisonError::into_inner);
        Ok(ids.iter().filter_map(|id| orders.get(id).cloned()).collect())
    }

    async fn reserve(&self, order_id: i64) -> Result<bool, StoreError> {
        let mut orders = self.orders.write().unwrap_or_else(PoisonError::into_inner);
        let Some(order) = orders.get_mut(&order_id) else {
            return Ok(false);
        };
        if order.status != OrderStatus::New || order.trade_reference_id.is_some() {
            return Ok(false);
        }
        order.trade_reference_id = Some(-order_id);
        order.version += 1;
        Ok(true)
    }

    async fn commit(&self, order_id: i64, trade_reference_id: i64) -> Result<bool, StoreError> {
        let mut orders = self.orders.write().unwrap_or_else(PoisonError::into_inner);
        let Some(order) = orders.get_mut(&order_id) else {
            return Ok(false);
        };
        if order.status != OrderStatus::New || order.trade_reference_id != Some(-order_id) {
            return Ok(false);
        }
        order.trade_reference_id = Some(trade_reference_id);
        order.status = OrderStatus::Sent;
        order.version += 1;
        Ok(true)
    }

    async fn release(&self, order_id: i64) -> Result<bool, StoreError> {
        let mut orders = self.orders.write().unwrap_or_else(PoisonError::into_inner);
        let Some(order) = orders.get_mut(&order_id) else {
            return Ok(false);
        };
        if order.status != OrderStatus::New || order.trade_reference_id != Some(-order_id) {
            return Ok(false);
        }
        order.trade_reference_id = None;
        order.version += 1;
        Ok(true)
    }

    async fn apply_submissions(
        &self,
        confirmations: &[SubmissionConfirmation],
    ) -> Result<u64, StoreError> {
        let mut orders = self.orders.write().unwrap_or_else(PoisonError::into_inner);
        let mut updated = 0_u64;
        for confirmation in confirmations {
            if let Some(order) = orders.get_mut(&confirmation.order_id) {
                if order.status == OrderStatus::New
                    && order.trade_reference_id == Some(-confirmation.order_id)
                {
                    order.trade_reference_id = Some(confirmation.trade_reference_id);
                    order.status = OrderStatus::Sent;
                    order.version += 1;
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }

    async fn resolve_blotters(&self, blotter_ids: &[i64]) -> Result<HashSet<i64>, StoreError> {
        let known = self.blotters.read().unwrap_or_else(PoisonError::into_inner);
        Ok(blotter_ids
            .iter()
            .filter(|id| known.contains(id))
            .copied()
            .collect())
    }
}
