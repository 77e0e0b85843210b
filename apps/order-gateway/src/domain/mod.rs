//! Domain layer - order records and submission results, no I/O.

pub mod order;
pub mod submission;

pub use order::{EligibilityError, OrderRecord, OrderStatus, OrderType, MAX_BATCH_SIZE};
pub use submission::{BatchSubmitResponse, OrderSubmitResult, SubmissionOutcome};
