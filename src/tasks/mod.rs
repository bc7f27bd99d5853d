//! Task registry and execution context
//!
//! Every task is registered by name in a [`TaskRegistry`] built once at
//! startup and handed to the dispatcher. Tasks receive a [`TaskContext`]
//! carrying the validated design, the collaborators and the user's filters,
//! and return the text to print.

mod docker;
mod inventory;
mod plan;
mod rules;

pub use docker::{
    ContainersTask, ImagesTask, PullTask, RemoveTask, RunTask, SmokeTest, SmokeTestTask,
};
pub use inventory::{GroupsTask, HostsTask, NodesTask, VolumesTask};
pub use plan::PlanTask;
pub use rules::RulesTask;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client::{ClientError, DockerHttpClient, EndpointProbe, HttpProbe, OpenStackInventory};
use crate::cluster::{
    ClusterCorrelator, ContainerClient, EnrichedNode, ErrorPolicy, FanoutError, FanoutIterator,
    InventoryClient, InventoryError, NamingError, Selection, StaticInventory,
};
use crate::config::{expand_env, expand_path, ClusterConfig, ConfigError, InventorySource};

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Unknown task '{0}' (use --list-tasks to see the available tasks)")]
    UnknownTask(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Naming error: {0}")]
    Naming(#[from] NamingError),

    #[error("{0}")]
    Inventory(#[from] InventoryError),

    #[error("{0}")]
    Fanout(#[from] FanoutError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),
}

// ============================================================================
// Task trait and registry
// ============================================================================

#[async_trait]
pub trait Task: Send + Sync {
    fn name(&self) -> &'static str;

    /// One-line summary for `--list-tasks`
    fn description(&self) -> &'static str;

    async fn run(&self, ctx: &TaskContext) -> Result<String, TaskError>;
}

#[derive(Default)]
pub struct TaskRegistry {
    tasks: HashMap<&'static str, Box<dyn Task>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in task
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(PlanTask);
        registry.register(NodesTask);
        registry.register(GroupsTask);
        registry.register(VolumesTask);
        registry.register(RulesTask);
        registry.register(HostsTask);
        registry.register(ImagesTask);
        registry.register(PullTask);
        registry.register(RunTask);
        registry.register(ContainersTask);
        registry.register(RemoveTask);
        registry.register(SmokeTestTask);
        registry
    }

    /// Register a task, replacing any task of the same name
    pub fn register<T: Task + 'static>(&mut self, task: T) {
        self.tasks.insert(task.name(), Box::new(task));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Task> {
        self.tasks.get(name).map(|t| t.as_ref())
    }

    /// `(name, description)` of every task, sorted by name
    pub fn list(&self) -> Vec<(&'static str, &'static str)> {
        let mut tasks: Vec<_> = self
            .tasks
            .values()
            .map(|t| (t.name(), t.description()))
            .collect();
        tasks.sort_by_key(|(name, _)| *name);
        tasks
    }

    pub async fn run(&self, name: &str, ctx: &TaskContext) -> Result<String, TaskError> {
        let task = self
            .get(name)
            .ok_or_else(|| TaskError::UnknownTask(name.to_string()))?;
        info!("Running task '{}' on cluster '{}'", name, ctx.config.cluster);
        task.run(ctx).await
    }
}

// ============================================================================
// Execution context
// ============================================================================

pub struct TaskContext {
    pub config: ClusterConfig,
    pub inventory: Arc<dyn InventoryClient>,
    pub containers: Arc<dyn ContainerClient>,
    pub probe: Arc<dyn EndpointProbe>,
    pub selection: Selection,
    /// Overrides each task's default error policy
    pub policy: Option<ErrorPolicy>,
    /// Deadline applied to every fanned-out action
    pub timeout: Option<Duration>,
    pub cancel: CancellationToken,
}

impl TaskContext {
    /// Context over explicit collaborators
    pub fn new(
        config: ClusterConfig,
        inventory: Arc<dyn InventoryClient>,
        containers: Arc<dyn ContainerClient>,
        probe: Arc<dyn EndpointProbe>,
    ) -> Self {
        Self {
            config,
            inventory,
            containers,
            probe,
            selection: Selection::default(),
            policy: None,
            timeout: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Context with the HTTP collaborators described by the design file
    pub fn from_config(config: ClusterConfig) -> Result<Self, TaskError> {
        let inventory = build_inventory(config.inventory.as_ref())?;
        let http_timeout = Duration::from_secs(10);
        let containers = Arc::new(DockerHttpClient::with_timeout(http_timeout)?);
        let probe = Arc::new(HttpProbe::new(http_timeout)?);
        Ok(Self::new(config, inventory, containers, probe))
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_policy(mut self, policy: Option<ErrorPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn correlator(&self) -> ClusterCorrelator<'_> {
        ClusterCorrelator::new(&self.config.cluster, &self.config.node_types)
            .with_docker(self.config.docker.clone())
            .with_ssh(self.config.ssh.clone())
    }

    /// Iterator for `operation`, using `default_policy` unless overridden
    pub fn iterator(&self, operation: &str, default_policy: ErrorPolicy) -> FanoutIterator {
        let iterator = FanoutIterator::new(operation, self.policy.unwrap_or(default_policy))
            .with_cancellation(self.cancel.clone());
        match self.timeout {
            Some(limit) => iterator.with_timeout(limit),
            None => iterator,
        }
    }

    /// Every live node of the cluster, enriched
    pub async fn cluster_nodes(&self) -> Result<Vec<EnrichedNode>, TaskError> {
        let live = self.inventory.list_nodes().await?;
        Ok(self.correlator().nodes(&live))
    }

    /// Live nodes of the cluster admitted by the selection
    pub async fn selected_nodes(&self) -> Result<Vec<EnrichedNode>, TaskError> {
        Ok(self
            .cluster_nodes()
            .await?
            .into_iter()
            .filter(|node| {
                self.selection
                    .node_selected(&node.node_type, Some(&node.id), &self.config.node_types)
            })
            .collect())
    }
}

/// Cancel `cancel` at the first interrupt, letting the running action
/// finish. Returns `true` at a second interrupt: the caller should exit
/// without waiting any longer.
pub async fn handle_interrupts<F, Fut>(mut interrupted: F, cancel: CancellationToken) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    if !interrupted().await {
        return false;
    }
    warn!("Interrupted, finishing the current item (interrupt again to exit)");
    cancel.cancel();

    if !interrupted().await {
        return false;
    }
    warn!("Interrupted again, exiting");
    true
}

fn build_inventory(
    source: Option<&InventorySource>,
) -> Result<Arc<dyn InventoryClient>, TaskError> {
    match source {
        Some(InventorySource::Openstack(endpoints)) => {
            let mut endpoints = endpoints.clone();
            endpoints.token = expand_env(&endpoints.token)?;
            Ok(Arc::new(OpenStackInventory::new(endpoints)?))
        }
        Some(InventorySource::Snapshot { path }) => Ok(Arc::new(
            StaticInventory::from_snapshot_file(&expand_path(path))?,
        )),
        None => Ok(Arc::new(StaticInventory::unavailable(
            "no inventory configured in the design file",
        ))),
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_standard_registry_lists_tasks() {
        let registry = TaskRegistry::standard();
        let names: Vec<&str> = registry.list().into_iter().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            vec![
                "containers", "groups", "hosts", "images", "nodes", "plan", "pull", "remove",
                "rules", "run", "test", "volumes"
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_task() {
        let registry = TaskRegistry::standard();
        let result = registry.run("deploy", &context()).await;
        assert!(matches!(result, Err(TaskError::UnknownTask(name)) if name == "deploy"));
    }

    #[tokio::test]
    async fn test_selected_nodes() {
        let ctx = context().with_selection(Selection::all().with_node_type("computing"));
        let names: Vec<String> = ctx
            .selected_nodes()
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.name)
            .collect();
        assert_eq!(names, vec!["oa-1-computing", "oa-2-computing"]);
    }

    #[tokio::test]
    async fn test_inventory_failure_is_fatal() {
        let ctx = test_support::context_with(
            StaticInventory::unavailable("connection refused"),
            crate::client::docker::mock::MockContainerClient::new(),
            crate::client::probe::mock::MockProbe::new(),
        );
        let result = TaskRegistry::standard().run("nodes", &ctx).await;
        assert!(matches!(
            result,
            Err(TaskError::Inventory(InventoryError::Unavailable(_)))
        ));
    }

    #[test]
    fn test_iterator_policy_override() {
        let ctx = context();
        assert_eq!(
            ctx.iterator("x", ErrorPolicy::ContinueOnError).policy(),
            ErrorPolicy::ContinueOnError
        );
        let ctx = ctx.with_policy(Some(ErrorPolicy::FailFast));
        assert_eq!(
            ctx.iterator("x", ErrorPolicy::ContinueOnError).policy(),
            ErrorPolicy::FailFast
        );
    }

    #[tokio::test]
    async fn test_second_interrupt_forces_exit() {
        let token = CancellationToken::new();
        let calls = std::cell::Cell::new(0);
        let exit = handle_interrupts(
            || {
                calls.set(calls.get() + 1);
                async { true }
            },
            token.clone(),
        )
        .await;

        assert!(exit);
        assert!(token.is_cancelled());
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn test_interrupt_listener_failure_does_not_exit() {
        let token = CancellationToken::new();
        assert!(!handle_interrupts(|| async { false }, token.clone()).await);
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_missing_inventory_source_is_unavailable() {
        assert!(build_inventory(None).is_ok());
    }
}
