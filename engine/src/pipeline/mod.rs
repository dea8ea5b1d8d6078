//! The resilient batch-processing engine shared by the validation and
//! sending pipelines.

pub mod checkpoint_manager;
pub mod classifier;
pub mod coordinator;
pub mod executor;
pub mod progress;
pub mod sending;
pub mod throttle;
pub mod validation;
