pub mod types;
pub mod config;
pub mod error;
pub mod event;
pub mod utils;
pub mod validation;
pub mod subscription;
pub mod backend;
pub mod stats;
pub mod store;
pub mod manager;
