//! Bounded worker pool over components.
//!
//! Every component becomes one task. Tasks are spawned up front into a
//! [`JoinSet`] and wait on a shared [`Semaphore`] before doing any work, so at
//! most `max_workers` components are in flight and the rest queue. A task that
//! fails, panics, or times out is reported against its component and never
//! cancels the others; [`WorkerPool::run_batch`] returns only once every task
//! has finished.

use super::claims::NamespaceClaims;
use super::namespace::NamespaceProcessor;
use crate::error::{DiscoveryError, Result};
use crate::types::{BatchReport, Component, ComponentReport, NamespaceOutcome};
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Per-namespace results of one component.
pub type NamespaceResults = Vec<(String, Result<NamespaceOutcome>)>;

/// Work performed for one component.
#[async_trait]
pub trait ComponentRunner: Send + Sync + 'static {
    /// Process every environment of the component, in order.
    async fn run_component(&self, component: &Component, claims: &NamespaceClaims) -> NamespaceResults;
}

#[async_trait]
impl ComponentRunner for NamespaceProcessor {
    async fn run_component(&self, component: &Component, claims: &NamespaceClaims) -> NamespaceResults {
        let mut results = Vec::with_capacity(component.envs.len());
        for env in &component.envs {
            let Some(namespace) = env.namespace.as_deref().filter(|ns| !ns.is_empty()) else {
                tracing::debug!(component = %component.name, environment = %env.name, "Environment has no namespace");
                continue;
            };
            tracing::debug!(component = %component.name, environment = %env.name, namespace = %namespace, "Processing environment");
            results.push((namespace.to_string(), self.process(namespace, claims).await));
        }
        results
    }
}

/// Bounded-concurrency executor for a batch of components.
pub struct WorkerPool {
    runner: Arc<dyn ComponentRunner>,
    max_workers: usize,
    unit_timeout: Option<Duration>,
}

impl WorkerPool {
    /// Create a pool; `max_workers` below one is raised to one.
    pub fn new(runner: Arc<dyn ComponentRunner>, max_workers: usize) -> Self {
        Self {
            runner,
            max_workers: max_workers.max(1),
            unit_timeout: None,
        }
    }

    /// Fail any component that takes longer than `timeout`.
    #[must_use]
    pub fn with_unit_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.unit_timeout = timeout;
        self
    }

    #[must_use]
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Run every component and wait for all of them.
    ///
    /// Reports are returned in completion order. A fresh claim set is used
    /// for the batch.
    pub async fn run_batch(&self, components: Vec<Component>) -> BatchReport {
        let total = components.len();
        tracing::info!(components = total, max_workers = self.max_workers, "Processing batch of components");

        let claims = NamespaceClaims::new();
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut tasks = JoinSet::new();

        for (index, component) in components.into_iter().enumerate() {
            let runner = Arc::clone(&self.runner);
            let claims = claims.clone();
            let semaphore = Arc::clone(&semaphore);
            let timeout = self.unit_timeout;

            tasks.spawn(async move {
                let name = component.name.clone();
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return ComponentReport {
                        component: name,
                        namespaces: Vec::new(),
                        failure: Some(DiscoveryError::internal("worker pool closed".to_string(), file!(), line!())),
                    };
                };
                tracing::info!(component = %name, position = index + 1, total, "Started component");

                let work = AssertUnwindSafe(runner.run_component(&component, &claims)).catch_unwind();
                let outcome = match timeout {
                    Some(limit) => tokio::time::timeout(limit, work).await.map_err(|_| {
                        crate::err!(Timeout {
                            message: format!("component '{name}' did not finish"),
                            seconds: limit.as_secs(),
                        })
                    }),
                    None => Ok(work.await),
                };

                match outcome {
                    Ok(Ok(namespaces)) => ComponentReport {
                        component: name,
                        namespaces,
                        failure: None,
                    },
                    Ok(Err(panic)) => ComponentReport {
                        failure: Some(DiscoveryError::internal(
                            format!("worker panicked: {}", panic_message(panic.as_ref())),
                            file!(),
                            line!(),
                        )),
                        component: name,
                        namespaces: Vec::new(),
                    },
                    Err(timed_out) => ComponentReport {
                        component: name,
                        namespaces: Vec::new(),
                        failure: Some(timed_out),
                    },
                }
            });
        }

        let mut report = BatchReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(component) => {
                    if let Some(failure) = &component.failure {
                        tracing::error!(component = %component.component, error = %failure, "Component task failed");
                    } else if !component.succeeded() {
                        tracing::warn!(component = %component.component, "Component finished with errors");
                    }
                    report.components.push(component);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Component task could not be joined");
                    report.components.push(ComponentReport {
                        component: "<unknown>".to_string(),
                        namespaces: Vec::new(),
                        failure: Some(DiscoveryError::internal(format!("task join failed: {e}"), file!(), line!())),
                    });
                }
            }
        }

        tracing::info!(
            components = total,
            succeeded = report.succeeded(),
            failed = report.failed(),
            namespaces_skipped = report.count(NamespaceOutcome::Skipped),
            "Completed processing components"
        );
        report
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
