//! Store health reports derived from [`PipelineStatus`].

use crate::lifecycle::PipelineStatus;
use std::fmt;

/// How well a store is serving its observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HealthStatus {
    /// Processing actions
    Healthy,

    /// Serving its last state but not processing (not attached, or detached)
    Degraded,

    /// Halted by an error; the state will not change again
    Unhealthy,
}

impl HealthStatus {
    /// Check if status is healthy
    #[must_use]
    pub const fn is_healthy(self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Check if status is degraded
    #[must_use]
    pub const fn is_degraded(self) -> bool {
        matches!(self, Self::Degraded)
    }

    /// Check if status is unhealthy
    #[must_use]
    pub const fn is_unhealthy(self) -> bool {
        matches!(self, Self::Unhealthy)
    }
}

impl From<&PipelineStatus> for HealthStatus {
    fn from(status: &PipelineStatus) -> Self {
        match status {
            PipelineStatus::Running => Self::Healthy,
            PipelineStatus::Idle | PipelineStatus::Stopped => Self::Degraded,
            PipelineStatus::Failed(_) => Self::Unhealthy,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        })
    }
}

/// Point-in-time health of one store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheck {
    /// The store's label
    pub component: String,

    /// Overall verdict
    pub status: HealthStatus,

    /// Why the store is not healthy, if it is not
    pub message: Option<String>,

    /// Pipeline status name, see [`PipelineStatus::as_str`]
    pub pipeline: &'static str,

    /// Observers registered when the check ran
    pub observers: usize,
}

impl HealthCheck {
    /// Build the report for a store in `pipeline` status
    #[must_use]
    pub fn for_pipeline(
        component: impl Into<String>,
        pipeline: &PipelineStatus,
        observers: usize,
    ) -> Self {
        let message = match pipeline {
            PipelineStatus::Running => None,
            PipelineStatus::Idle => Some("Store is not attached".to_string()),
            PipelineStatus::Stopped => Some("Store has been detached".to_string()),
            PipelineStatus::Failed(error) => Some(error.to_string()),
        };

        Self {
            component: component.into(),
            status: HealthStatus::from(pipeline),
            message,
            pipeline: pipeline.as_str(),
            observers,
        }
    }
}

impl fmt::Display for HealthCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} ({}, {} observers)",
            self.component, self.status, self.pipeline, self.observers
        )?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}
