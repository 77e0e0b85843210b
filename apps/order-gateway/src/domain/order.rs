//! Order record and submission eligibility.
//!
//! An order is *eligible* for submission iff its status is `NEW` and its
//! trade reference is unset. The trade reference doubles as the claim
//! marker: `-id` means "claimed, awaiting the trade-service result" and a
//! positive value means "confirmed submitted".

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Hard cap on the number of orders in one submission request.
pub const MAX_BATCH_SIZE: usize = 100;

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Created, not yet submitted.
    New,
    /// Confirmed submitted to the trade service.
    Sent,
}

impl OrderStatus {
    /// Status name as stored in the reference table.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Sent => "SENT",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Order pricing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// Execute at market; no limit price.
    Market,
    /// Execute at or better than the limit price.
    Limit,
}

impl OrderType {
    /// Type name as carried on the trade-service wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Market => "MARKET",
            Self::Limit => "LIMIT",
        }
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why an order cannot be submitted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EligibilityError {
    /// The order is not in `NEW` status.
    #[error("order is in {0} status, expected NEW")]
    WrongStatus(OrderStatus),

    /// The order already carries a trade reference (claimed or submitted).
    #[error("order already has trade reference {0}")]
    AlreadyReferenced(i64),

    /// Portfolio id is blank.
    #[error("portfolio id is blank")]
    BlankPortfolioId,

    /// Security id is blank.
    #[error("security id is blank")]
    BlankSecurityId,

    /// Quantity must be strictly positive.
    #[error("quantity {0} is not positive")]
    NonPositiveQuantity(Decimal),

    /// Limit orders need a positive limit price; market orders must not
    /// carry one.
    #[error("invalid limit price for {order_type} order")]
    InvalidLimitPrice {
        /// The order's pricing mode.
        order_type: OrderType,
    },

    /// Order timestamp is missing.
    #[error("order timestamp is missing")]
    MissingTimestamp,

    /// Blotter id does not resolve to a known blotter.
    #[error("unknown blotter {0}")]
    UnknownBlotter(i64),
}

/// A persisted order as loaded from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Store identity.
    pub id: i64,
    /// Lifecycle status.
    pub status: OrderStatus,
    /// None = unclaimed, `-id` = claimed, positive = confirmed submitted.
    pub trade_reference_id: Option<i64>,
    /// Owning portfolio.
    pub portfolio_id: String,
    /// Traded security.
    pub security_id: String,
    /// Pricing mode.
    pub order_type: OrderType,
    /// Quantity, must be > 0 to submit.
    pub quantity: Decimal,
    /// Required positive for limit orders, absent for market orders.
    pub limit_price: Option<Decimal>,
    /// When the order was placed.
    pub order_timestamp: Option<DateTime<Utc>>,
    /// Owning blotter.
    pub blotter_id: i64,
    /// Optimistic version, bumped by every conditional update.
    pub version: i64,
}

impl OrderRecord {
    /// The sentinel written by `reserve` to claim this order.
    #[must_use]
    pub const fn claim_sentinel(&self) -> i64 {
        -self.id
    }

    /// Eligible for submission: `NEW` and no trade reference.
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        self.status == OrderStatus::New && self.trade_reference_id.is_none()
    }

    /// Whether the limit price satisfies the pricing-mode policy.
    fn limit_price_valid(&self) -> bool {
        match self.order_type {
            OrderType::Limit => self.limit_price.is_some_and(|p| p > Decimal::ZERO),
            OrderType::Market => self.limit_price.is_none(),
        }
    }

    /// Full submission eligibility check.
    ///
    /// `blotter_known` is resolved by the caller from the store's blotter
    /// reference data; it is an input here so this check stays pure.
    pub fn validate_for_submission(&self, blotter_known: bool) -> Result<(), EligibilityError> {
        if self.status != OrderStatus::New {
            return Err(EligibilityError::WrongStatus(self.status));
        }
        if let Some(reference) = self.trade_reference_id {
            return Err(EligibilityError::AlreadyReferenced(reference));
        }
        if self.portfolio_id.trim().is_empty() {
            return Err(EligibilityError::BlankPortfolioId);
        }
        if self.security_id.trim().is_empty() {
            return Err(EligibilityError::BlankSecurityId);
        }
        if self.quantity <= Decimal::ZERO {
            return Err(EligibilityError::NonPositiveQuantity(self.quantity));
        }
        if !self.limit_price_valid() {
            return Err(EligibilityError::InvalidLimitPrice {
                order_type: self.order_type,
            });
        }
        if self.order_timestamp.is_none() {
            return Err(EligibilityError::MissingTimestamp);
        }
        if !blotter_known {
            return Err(EligibilityError::UnknownBlotter(self.blotter_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn eligible_order(id: i64) -> OrderRecord {
        OrderRecord {
            id,
            status: OrderStatus::New,
            trade_reference_id: None,
            portfolio_id: "PORT-1".to_string(),
            security_id: "SEC-1".to_string(),
            order_type: OrderType::Limit,
            quantity: dec!(100),
            limit_price: Some(dec!(25.50)),
            order_timestamp: Some(Utc::now()),
            blotter_id: 1,
            version: 0,
        }
    }

    #[test]
    fn eligible_order_passes() {
        let order = eligible_order(1);
        assert!(order.is_eligible());
        assert!(order.validate_for_submission(true).is_ok());
    }

    #[test]
    fn sent_order_is_ineligible() {
        let mut order = eligible_order(1);
        order.status = OrderStatus::Sent;
        assert!(!order.is_eligible());
        assert_eq!(
            order.validate_for_submission(true),
            Err(EligibilityError::WrongStatus(OrderStatus::Sent))
        );
    }

    #[test]
    fn claimed_order_is_ineligible() {
        let mut order = eligible_order(7);
        order.trade_reference_id = Some(order.claim_sentinel());
        assert_eq!(
            order.validate_for_submission(true),
            Err(EligibilityError::AlreadyReferenced(-7))
        );
    }

    #[test]
    fn blank_portfolio_rejected() {
        let mut order = eligible_order(1);
        order.portfolio_id = "  ".to_string();
        assert_eq!(
            order.validate_for_submission(true),
            Err(EligibilityError::BlankPortfolioId)
        );
    }

    #[test]
    fn zero_quantity_rejected() {
        let mut order = eligible_order(1);
        order.quantity = Decimal::ZERO;
        assert!(matches!(
            order.validate_for_submission(true),
            Err(EligibilityError::NonPositiveQuantity(_))
        ));
    }

    #[test]
    fn limit_order_requires_positive_limit_price() {
        let mut order = eligible_order(1);
        order.limit_price = None;
        assert!(matches!(
            order.validate_for_submission(true),
            Err(EligibilityError::InvalidLimitPrice { .. })
        ));

        order.limit_price = Some(dec!(-1));
        assert!(matches!(
            order.validate_for_submission(true),
            Err(EligibilityError::InvalidLimitPrice { .. })
        ));
    }

    #[test]
    fn market_order_must_not_carry_limit_price() {
        let mut order = eligible_order(1);
        order.order_type = OrderType::Market;
        order.limit_price = Some(dec!(10));
        assert!(matches!(
            order.validate_for_submission(true),
            Err(EligibilityError::InvalidLimitPrice { .. })
        ));

        order.limit_price = None;
        assert!(order.validate_for_submission(true).is_ok());
    }

    #[test]
    fn missing_timestamp_rejected() {
        let mut order = eligible_order(1);
        order.order_timestamp = None;
        assert_eq!(
            order.validate_for_submission(true),
            Err(EligibilityError::MissingTimestamp)
        );
    }

    #[test]
    fn unknown_blotter_rejected() {
        let order = eligible_order(1);
        assert_eq!(
            order.validate_for_submission(false),
            Err(EligibilityError::UnknownBlotter(1))
        );
    }

    #[test]
    fn claim_sentinel_is_negated_id() {
        assert_eq!(eligible_order(42).claim_sentinel(), -42);
    }
}
