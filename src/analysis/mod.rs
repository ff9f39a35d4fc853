pub mod resolver;
pub mod retention;
pub mod schedule;

pub use resolver::{
    DuplicateOutcome, DuplicateResolver, DuplicateStatistics, GroupResolution, ResolverSettings,
    SweepResult,
};
pub use retention::RetentionStrategy;
pub use schedule::SweepScheduler;
