// crates/renderflow/src/jobs/error_codes.rs
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::jobs::model::JobStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    AdmissionRejected,
    TaskTimeout,
    TaskFailure,
    UnknownJob,
    AlreadySubmitted,
    InvalidTransition,
}

impl ErrorKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "ADMISSION_REJECTED" => Some(Self::AdmissionRejected),
            "TASK_TIMEOUT" => Some(Self::TaskTimeout),
            "TASK_FAILURE" => Some(Self::TaskFailure),
            "UNKNOWN_JOB" => Some(Self::UnknownJob),
            "ALREADY_SUBMITTED" => Some(Self::AlreadySubmitted),
            "INVALID_TRANSITION" => Some(Self::InvalidTransition),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AdmissionRejected => "ADMISSION_REJECTED",
            Self::TaskTimeout => "TASK_TIMEOUT",
            Self::TaskFailure => "TASK_FAILURE",
            Self::UnknownJob => "UNKNOWN_JOB",
            Self::AlreadySubmitted => "ALREADY_SUBMITTED",
            Self::InvalidTransition => "INVALID_TRANSITION",
        }
    }
}

pub fn suggested_action(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::AdmissionRejected => {
            "Back off and retry later. The render queue is full; check /queue for capacity."
        }
        ErrorKind::TaskTimeout => {
            "Increase the render timeout OR reduce work (resolution, fps). The renderer may still be running."
        }
        ErrorKind::TaskFailure => {
            "Inspect the error message. Check the renderer binary, disk space and composition build."
        }
        ErrorKind::UnknownJob => {
            "The job never existed or was reclaimed after the retention window."
        }
        ErrorKind::AlreadySubmitted => {
            "Each job runs once. Admit a new job instead of resubmitting this one."
        }
        ErrorKind::InvalidTransition => {
            "Terminal jobs cannot change state. Check the caller for a duplicate status update."
        }
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("render queue is full ({outstanding}/{max_queue_depth} outstanding), retry later")]
    AdmissionRejected {
        outstanding: usize,
        max_queue_depth: usize,
    },

    #[error("render timeout after {}ms", .timeout.as_millis())]
    TaskTimeout { timeout: Duration },

    #[error("{0}")]
    TaskFailure(String),

    #[error("job not found: {0}")]
    UnknownJob(Uuid),

    #[error("job {id} was already submitted (status {status})")]
    AlreadySubmitted { id: Uuid, status: JobStatus },

    #[error("job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },
}

impl JobError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobError::AdmissionRejected { .. } => ErrorKind::AdmissionRejected,
            JobError::TaskTimeout { .. } => ErrorKind::TaskTimeout,
            JobError::TaskFailure(_) => ErrorKind::TaskFailure,
            JobError::UnknownJob(_) => ErrorKind::UnknownJob,
            JobError::AlreadySubmitted { .. } => ErrorKind::AlreadySubmitted,
            JobError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
        }
    }
}
