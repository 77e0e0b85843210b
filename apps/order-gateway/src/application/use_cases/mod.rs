//! Use cases (driving side of the application layer).

pub mod submit_batch;

pub use submit_batch::{SubmissionConfig, SubmitBatchUseCase, SubmitRejection};
