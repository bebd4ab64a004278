use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use kman_core::config::BootstrapConfig;
use tracing::{error, info};

use crate::error::BootstrapError;

/// A component with a potentially slow, asynchronous start routine.
#[async_trait]
pub trait AsyncStart: Send + Sync {
    fn name(&self) -> &str;

    /// Lower phases start first.
    fn phase(&self) -> i32 {
        0
    }

    async fn start_async(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentReport {
    pub name: String,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseReport {
    pub phase: i32,
    /// In registration order.
    pub components: Vec<ComponentReport>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub phases: Vec<PhaseReport>,
}

impl BootstrapReport {
    pub fn component_count(&self) -> usize {
        self.phases.iter().map(|p| p.components.len()).sum()
    }

    /// Started component names, phase by phase.
    pub fn started(&self) -> Vec<&str> {
        self.phases
            .iter()
            .flat_map(|p| p.components.iter().map(|c| c.name.as_str()))
            .collect()
    }
}

pub struct Bootstrap {
    start_timeout: Duration,
    components: Vec<Arc<dyn AsyncStart>>,
}

impl Bootstrap {
    pub fn new(start_timeout: Duration) -> Self {
        Self {
            start_timeout,
            components: Vec::new(),
        }
    }

    pub fn from_config(config: &BootstrapConfig) -> Self {
        Self::new(config.start_timeout())
    }

    pub fn register(&mut self, component: Arc<dyn AsyncStart>) -> &mut Self {
        self.components.push(component);
        self
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Start every registered component, phase by phase.
    pub async fn run(&self) -> Result<BootstrapReport, BootstrapError> {
        let mut phases: BTreeMap<i32, Vec<Arc<dyn AsyncStart>>> = BTreeMap::new();
        for component in &self.components {
            phases.entry(component.phase()).or_default().push(component.clone());
        }

        let mut report = BootstrapReport::default();
        for (phase, components) in phases {
            report.phases.push(self.start_phase(phase, components).await?);
        }
        Ok(report)
    }

    async fn start_phase(
        &self,
        phase: i32,
        components: Vec<Arc<dyn AsyncStart>>,
    ) -> Result<PhaseReport, BootstrapError> {
        info!(phase, count = components.len(), "Starting components asynchronously");
        let phase_started = Instant::now();
        let timeout = self.start_timeout;

        let names: Vec<String> = components.iter().map(|c| c.name().to_string()).collect();
        let handles = components.into_iter().map(|component| {
            tokio::spawn(async move {
                let name = component.name().to_string();
                info!(component = %name, phase, "Starting component");
                let started = Instant::now();
                match tokio::time::timeout(timeout, component.start_async()).await {
                    Ok(Ok(())) => {
                        let elapsed = started.elapsed();
                        info!(component = %name, phase, elapsed_ms = elapsed.as_millis() as u64, "Component started");
                        Ok(ComponentReport { name, elapsed })
                    }
                    Ok(Err(source)) => Err(BootstrapError::ComponentFailed {
                        component: name,
                        phase,
                        source,
                    }),
                    Err(_) => Err(BootstrapError::Timeout {
                        component: name,
                        phase,
                        timeout,
                    }),
                }
            })
        });

        // Wait for every component of the phase before judging it.
        let outcomes = join_all(handles).await;

        let mut started = Vec::with_capacity(outcomes.len());
        let mut first_failure = None;
        for (name, outcome) in names.into_iter().zip(outcomes) {
            let outcome = outcome.unwrap_or_else(|_| {
                Err(BootstrapError::Panicked {
                    component: name,
                    phase,
                })
            });
            match outcome {
                Ok(component) => started.push(component),
                Err(e) => {
                    error!(phase, component = %e.component(), error = %e, "Component failed to start");
                    first_failure.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_failure {
            return Err(e);
        }

        let elapsed = phase_started.elapsed();
        info!(phase, count = started.len(), elapsed_ms = elapsed.as_millis() as u64, "Phase started");
        Ok(PhaseReport {
            phase,
            components: started,
            elapsed,
        })
    }
}
