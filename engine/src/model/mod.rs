mod checkpoint;
mod item_result;
mod job;
mod work_item;

pub use checkpoint::Checkpoint;
pub use item_result::{
    ErrorReport, ItemOutcome, RenderedContent, RetryStats, SendCategory, SendErrorDetail,
    SendResult, ValidationCategory, ValidationResult,
};
pub use job::{JobProgress, JobRecord, JobStatus};
pub use work_item::WorkItem;
