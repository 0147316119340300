//! Human and machine readable descriptions of a query plan.

pub mod explainable;
pub mod node;
