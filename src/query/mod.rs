pub mod ast;
pub mod matcher;
pub mod planner;
pub mod executor;
pub mod cache;
pub mod types;
