//! Application layer - driven ports and the submission use case.

pub mod ports;
pub mod use_cases;
