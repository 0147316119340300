//! Row-level operators consuming compiled plans.
//!
//! Every operator takes fully materialized inputs and checks the
//! cancellation token at row boundaries.

pub mod hash_join;
pub mod nested_loop_join;
pub mod set_operation;
