pub mod admission;
pub mod error_codes;
pub mod model;
pub mod registry;
pub mod scheduler;

pub mod reclaimer;
pub use reclaimer::{cutoff_before, Reclaimer, ReclaimerConfig};

pub mod metrics;
pub use metrics::{QueueStats, QueueStatus};

pub use admission::{Admission, AdmissionConfig, AdmissionController, CapacityInfo};
pub use error_codes::{ErrorKind, JobError};
pub use model::{Job, JobFailure, JobStatus, JobUpdate, StatusCounts};
pub use registry::JobRegistry;
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerLoad};
