pub mod pipeline;
pub mod scheduler;

pub use pipeline::{
    CycleReport, EvaluationPipeline, ItemError, ItemOutcome, OutcomeCounts, PipelineConfig,
};
pub use scheduler::{PollScheduler, SchedulerHandle};
