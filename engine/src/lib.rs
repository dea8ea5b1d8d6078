//! Resilient batch engine for email list validation and bulk campaign sending.
//!
//! Work is split into fixed-size batches driven against a rate-limited mail
//! provider. Individual item failures are retried with capped exponential
//! backoff and classified into a fixed taxonomy; progress and checkpoints are
//! published to external stores after every batch so an interrupted job can be
//! re-invoked and resume where it left off.

pub mod engine_config;
pub mod error;
pub mod model;
pub mod observability;
pub mod pipeline;
pub mod provider;
pub mod store;
pub mod template;

pub use engine_config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use model::{
    Checkpoint, ErrorReport, JobProgress, JobRecord, JobStatus, SendCategory, SendResult,
    ValidationCategory, ValidationResult, WorkItem,
};
pub use pipeline::sending::{SendOptions, SendReport, SendingPipeline};
pub use pipeline::validation::ValidationPipeline;
pub use provider::{MailProvider, ProviderError, RenderedMessage};
pub use store::{CheckpointStore, JobStore};
pub use template::CampaignTemplate;
