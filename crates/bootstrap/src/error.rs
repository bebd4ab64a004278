use std::time::Duration;

use thiserror::Error;

/// Fatal failure while starting components. Carries the component that
/// failed and its phase.
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("component '{component}' failed to start in phase {phase}: {source:#}")]
    ComponentFailed {
        component: String,
        phase: i32,
        #[source]
        source: anyhow::Error,
    },

    #[error("component '{component}' did not start within {timeout:?} in phase {phase}")]
    Timeout {
        component: String,
        phase: i32,
        timeout: Duration,
    },

    #[error("component '{component}' panicked while starting in phase {phase}")]
    Panicked { component: String, phase: i32 },
}

impl BootstrapError {
    pub fn component(&self) -> &str {
        match self {
            Self::ComponentFailed { component, .. }
            | Self::Timeout { component, .. }
            | Self::Panicked { component, .. } => component,
        }
    }

    pub fn phase(&self) -> i32 {
        match self {
            Self::ComponentFailed { phase, .. } | Self::Timeout { phase, .. } | Self::Panicked { phase, .. } => {
                *phase
            }
        }
    }
}
