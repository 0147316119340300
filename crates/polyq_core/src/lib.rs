pub mod arrays;
pub mod config;
pub mod engine;
pub mod execution;
pub mod explain;
pub mod expr;
pub mod logical;
pub mod planner;
pub mod runtime;
pub mod storage;
