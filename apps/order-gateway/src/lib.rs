// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::cast_possible_wrap,
        clippy::cast_possible_truncation,
        clippy::items_after_statements
    )
)]

//! Order Gateway - bulk order-submission subsystem.
//!
//! Submits batches of `NEW` orders to an external trade service exactly
//! once. The hard part is that the trade service sits in the middle of what
//! would naturally be one transaction: once it accepts an order there is no
//! rollback, so local state changes are split around the call instead of
//! wrapped around it.
//!
//! # Architecture (Hexagonal)
//!
//! - **Domain**: order records, eligibility rules, per-order and batch
//!   results. Pure, no I/O.
//! - **Application**: driven ports (`OrderStorePort`, `TradeServicePort`,
//!   `ReconciliationPort`) and the `SubmitBatchUseCase` pipeline.
//! - **Infrastructure**: axum HTTP controller, sqlx order store, reqwest
//!   trade service client.
//! - **Resilience**: the admission gate bounding concurrent store work and
//!   the overload detector shedding batches while the system is saturated.
//!
//! # Exactly-once submission
//!
//! Eligibility (`NEW`, no trade reference) is consumed by an atomic
//! conditional update that writes a `-id` claim sentinel into the trade
//! reference column. Racing submitters hit the same WHERE clause and at most
//! one wins. Confirmed submissions replace the sentinel with the service's
//! positive reference; rejected ones clear it. A confirmed order whose claim
//! was lost is never retried and never released - it is flagged for manual
//! reconciliation.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod resilience;
