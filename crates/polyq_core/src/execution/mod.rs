pub mod executor;
pub mod operators;
pub mod scheduler;
pub mod stats;
