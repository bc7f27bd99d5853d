//! Tasks touching the Docker side of the nodes: images, containers and the
//! endpoints they serve
//!
//! Constructive work (`pull`, `run`, `test`) stops at the first failure by
//! default; listing and removing containers carry on past failing nodes.

use std::convert::Infallible;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::future;
use tracing::{info, warn};

use super::{Task, TaskContext, TaskError};
use crate::cli::{format_container_list, format_image_work, format_nested_report, format_report};
use crate::cluster::{
    container_work, create_request, expand_image_work, extra_hosts, ContainerWork,
    DockerEndpoint, EnrichedNode, ErrorPolicy, FanoutItem, ImageWork,
};
use crate::config::EndpointTest;

fn docker_endpoint(node: &EnrichedNode) -> Result<&DockerEndpoint, String> {
    node.docker
        .as_ref()
        .ok_or_else(|| format!("node '{}' has no address", node.name))
}

/// Containers on one node that the selection admits
async fn list_node_containers(
    ctx: &TaskContext,
    node: EnrichedNode,
) -> Result<Vec<ContainerWork>, String> {
    let endpoint = docker_endpoint(&node)?;
    let containers = ctx
        .containers
        .list_containers(endpoint)
        .await
        .map_err(|e| e.to_string())?;
    Ok(container_work(
        &node,
        containers,
        &ctx.selection,
        &ctx.config.node_types,
    ))
}

async fn selected_image_work(ctx: &TaskContext) -> Result<Vec<ImageWork>, TaskError> {
    let nodes = ctx.selected_nodes().await?;
    Ok(expand_image_work(
        &nodes,
        &ctx.config.images,
        ctx.config.registry.as_deref(),
    ))
}

pub struct ImagesTask;

#[async_trait]
impl Task for ImagesTask {
    fn name(&self) -> &'static str {
        "images"
    }

    fn description(&self) -> &'static str {
        "List the images each selected node deploys, fully qualified"
    }

    async fn run(&self, ctx: &TaskContext) -> Result<String, TaskError> {
        Ok(format_image_work(&selected_image_work(ctx).await?))
    }
}

/// Pulls every deployed image onto its nodes
pub struct PullTask;

#[async_trait]
impl Task for PullTask {
    fn name(&self) -> &'static str {
        "pull"
    }

    fn description(&self) -> &'static str {
        "Pull the images of every selected node from the registry"
    }

    async fn run(&self, ctx: &TaskContext) -> Result<String, TaskError> {
        let work = selected_image_work(ctx).await?;

        let report = ctx
            .iterator("pull images", ErrorPolicy::FailFast)
            .run(work, |work: ImageWork| async move {
                let endpoint = docker_endpoint(&work.node)?;
                ctx.containers
                    .pull_image(endpoint, &work.repo)
                    .await
                    .map_err(|e| e.to_string())
            })
            .await;

        let output = format_report(&report);
        report.into_result()?;
        Ok(output)
    }
}

/// Creates and starts one container per deployed image. Every container
/// gets the cluster's node names in its `/etc/hosts`.
pub struct RunTask;

#[async_trait]
impl Task for RunTask {
    fn name(&self) -> &'static str {
        "run"
    }

    fn description(&self) -> &'static str {
        "Create and start the containers of every selected node"
    }

    async fn run(&self, ctx: &TaskContext) -> Result<String, TaskError> {
        let hosts = extra_hosts(&ctx.cluster_nodes().await?);
        let work = selected_image_work(ctx).await?;

        let report = ctx
            .iterator("run containers", ErrorPolicy::FailFast)
            .run(work, |work: ImageWork| {
                let request = create_request(&work, &hosts);
                async move {
                    let endpoint = docker_endpoint(&work.node)?;
                    let id = ctx
                        .containers
                        .run_container(endpoint, &request)
                        .await
                        .map_err(|e| e.to_string())?;
                    info!("Started container {} from {} on {}", id, work.repo, work.node.name);
                    Ok::<(), String>(())
                }
            })
            .await;

        let output = format_report(&report);
        report.into_result()?;
        Ok(output)
    }
}

/// Lists containers node by node. A node whose daemon cannot be reached is
/// reported and skipped unless `--policy fail-fast` is given.
pub struct ContainersTask;

#[async_trait]
impl Task for ContainersTask {
    fn name(&self) -> &'static str {
        "containers"
    }

    fn description(&self) -> &'static str {
        "List the Docker containers on every selected node"
    }

    async fn run(&self, ctx: &TaskContext) -> Result<String, TaskError> {
        let nodes = ctx.selected_nodes().await?;
        let listed: Mutex<Vec<ContainerWork>> = Mutex::new(Vec::new());

        let report = ctx
            .iterator("list containers", ErrorPolicy::ContinueOnError)
            .run_nested(
                nodes,
                |node: EnrichedNode| list_node_containers(ctx, node),
                |work: ContainerWork| {
                    if let Ok(mut listed) = listed.lock() {
                        listed.push(work);
                    }
                    future::ready(Ok::<(), Infallible>(()))
                },
            )
            .await
            .into_result()?;

        let mut output = match listed.lock() {
            Ok(listed) => format_container_list(&listed),
            Err(_) => String::new(),
        };
        if report.expansion.failed() > 0 {
            output.push('\n');
            output.push_str(&format_report(&report.expansion));
        }
        Ok(output)
    }
}

/// Stops and removes the selected containers. Teardown is best effort: a
/// container or node that fails is reported and the rest are still removed.
pub struct RemoveTask;

#[async_trait]
impl Task for RemoveTask {
    fn name(&self) -> &'static str {
        "remove"
    }

    fn description(&self) -> &'static str {
        "Stop and remove the containers on every selected node"
    }

    async fn run(&self, ctx: &TaskContext) -> Result<String, TaskError> {
        let nodes = ctx.selected_nodes().await?;

        let report = ctx
            .iterator("remove containers", ErrorPolicy::ContinueOnError)
            .run_nested(
                nodes,
                |node: EnrichedNode| list_node_containers(ctx, node),
                |work: ContainerWork| async move {
                    let endpoint = docker_endpoint(&work.node)?;
                    ctx.containers
                        .remove_container(endpoint, &work.container.id)
                        .await
                        .map_err(|e| e.to_string())
                },
            )
            .await;

        let output = format_nested_report(&report);
        report.into_result()?;
        Ok(output)
    }
}

/// One smoke test against one node
#[derive(Debug, Clone)]
pub struct SmokeTest {
    pub node: EnrichedNode,
    pub address: String,
    pub test: EndpointTest,
}

impl FanoutItem for SmokeTest {
    fn label(&self) -> String {
        format!("{}@{}", self.test.name, self.node.name)
    }
}

/// Runs every node type's smoke tests against its nodes, stopping at the
/// first failure unless another policy is given.
pub struct SmokeTestTask;

impl SmokeTestTask {
    fn smoke_tests(ctx: &TaskContext, nodes: Vec<EnrichedNode>) -> Vec<SmokeTest> {
        let mut tests = Vec::new();
        for node in nodes {
            let Some(spec) = ctx.config.node_type(&node.node_type) else {
                continue;
            };
            let Some(address) = node.address.clone() else {
                warn!("Node '{}' has no address, not tested", node.name);
                continue;
            };
            tests.extend(spec.tests.iter().map(|test| SmokeTest {
                node: node.clone(),
                address: address.clone(),
                test: test.clone(),
            }));
        }
        tests
    }
}

#[async_trait]
impl Task for SmokeTestTask {
    fn name(&self) -> &'static str {
        "test"
    }

    fn description(&self) -> &'static str {
        "Run the HTTP smoke tests of every selected node"
    }

    async fn run(&self, ctx: &TaskContext) -> Result<String, TaskError> {
        let tests = Self::smoke_tests(ctx, ctx.selected_nodes().await?);

        let report = ctx
            .iterator("smoke test", ErrorPolicy::FailFast)
            .run(tests, |smoke: SmokeTest| {
                let probe = ctx.probe.clone();
                async move { probe.run_test(&smoke.test, &smoke.address).await }
            })
            .await;

        let output = format_report(&report);
        report.into_result()?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::client::docker::mock::MockContainerClient;
    use crate::client::probe::mock::MockProbe;
    use crate::cluster::{ContainerSummary, FanoutError, Selection};
    use crate::tasks::test_support::*;

    #[tokio::test]
    async fn test_images_task() {
        let output = ImagesTask.run(&context()).await.unwrap();
        assert!(output.contains("registry:5000/apache:2.4"));
        assert!(output.contains("registry:5000/consul"));
    }

    fn containers() -> MockContainerClient {
        MockContainerClient::new()
            .with_host(
                "10.0.0.1",
                vec![
                    ContainerSummary::new("c1aaaaaaaaaaaaaa", "registry:5000/apache:2.4"),
                    ContainerSummary::new("c2bbbbbbbbbbbbbb", "registry:5000/consul"),
                ],
            )
            .with_host("10.0.0.3", vec![ContainerSummary::new("c3cccccccccccccc", "consul")])
    }

    fn containers_on_every_node() -> MockContainerClient {
        containers().with_host("10.0.0.2", Vec::new())
    }

    /// Context sharing the mock client, so its recorded operations can be read
    fn shared(client: MockContainerClient) -> (TaskContext, Arc<MockContainerClient>) {
        let client = Arc::new(client);
        let ctx = TaskContext::new(
            config(),
            Arc::new(inventory()),
            client.clone(),
            Arc::new(MockProbe::new()),
        );
        (ctx, client)
    }

    #[tokio::test]
    async fn test_containers_task_continues_past_unreachable_node() {
        // 10.0.0.2 has no canned listing, so its daemon is unreachable
        let ctx = context_with(inventory(), containers(), MockProbe::new());
        let output = ContainersTask.run(&ctx).await.unwrap();

        assert!(output.contains("c1aaaaaaaaaa"));
        assert!(output.contains("c3cccccccccc"));
        assert!(output.contains("oa-2-computing"));
        assert!(output.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_containers_task_fail_fast() {
        let ctx = context_with(inventory(), containers(), MockProbe::new())
            .with_policy(Some(ErrorPolicy::FailFast));
        let result = ContainersTask.run(&ctx).await;
        assert!(matches!(
            result,
            Err(TaskError::Fanout(FanoutError::Aborted { not_attempted: 1, .. }))
        ));
    }

    #[tokio::test]
    async fn test_containers_task_selection_by_type() {
        let ctx = context_with(inventory(), containers(), MockProbe::new())
            .with_selection(Selection::all().with_node_type("loadbalancer"));
        let output = ContainersTask.run(&ctx).await.unwrap();
        assert!(output.contains("c3cccccccccc"));
        assert!(!output.contains("c1aaaaaaaaaa"));
    }

    #[tokio::test]
    async fn test_pull_task() {
        let (ctx, client) = shared(containers_on_every_node());
        let output = PullTask.run(&ctx).await.unwrap();
        assert!(output.contains("pull images: 3 attempted, 0 failed"));

        assert_eq!(
            client.operations(),
            vec![
                "pull 10.0.0.1 registry:5000/apache:2.4",
                "pull 10.0.0.2 registry:5000/apache:2.4",
                "pull 10.0.0.3 registry:5000/consul",
            ]
        );
    }

    #[tokio::test]
    async fn test_pull_task_stops_at_first_failure() {
        let (ctx, client) =
            shared(containers_on_every_node().failing("registry:5000/apache:2.4"));
        assert!(matches!(
            PullTask.run(&ctx).await,
            Err(TaskError::Fanout(FanoutError::Aborted { not_attempted: 2, .. }))
        ));
        assert!(client.operations().is_empty());
    }

    #[tokio::test]
    async fn test_run_task_on_selected_nodes() {
        let (ctx, client) = shared(containers_on_every_node());
        let ctx = ctx.with_selection(Selection::all().with_node_type("loadbalancer"));
        let output = RunTask.run(&ctx).await.unwrap();

        assert!(output.contains("consul@oa-1-loadbalancer"));
        assert_eq!(client.operations(), vec!["run 10.0.0.3 registry:5000/consul"]);
    }

    #[tokio::test]
    async fn test_remove_task_continues_past_failures() {
        let (ctx, client) = shared(containers_on_every_node().failing("c1aaaaaaaaaaaaaa"));

        let output = RemoveTask.run(&ctx).await.unwrap();
        assert!(output.contains("remove containers: 3 attempted, 1 failed"));
        assert!(output.contains("FAILED"));
        assert_eq!(
            client.operations(),
            vec!["remove 10.0.0.1 c2bbbbbbbbbbbbbb", "remove 10.0.0.3 c3cccccccccccccc"]
        );
    }

    #[tokio::test]
    async fn test_remove_task_reports_unreachable_node() {
        let (ctx, client) = shared(containers());
        let output = RemoveTask.run(&ctx).await.unwrap();

        // 10.0.0.2 cannot be listed; the other nodes are still cleaned up
        assert!(output.contains("connection refused"));
        assert_eq!(client.operations().len(), 3);
    }

    #[tokio::test]
    async fn test_smoke_tests_pass() {
        let probe = MockProbe::new()
            .with_body("http://10.0.0.1/", "<html><body>ok</body></html>")
            .with_body("http://10.0.0.2/", "<html></html>");
        let ctx = context_with(inventory(), MockContainerClient::new(), probe);

        let output = SmokeTestTask.run(&ctx).await.unwrap();
        assert!(output.contains("home@oa-1-computing"));
        assert!(output.contains("home@oa-2-computing"));
    }

    #[tokio::test]
    async fn test_smoke_tests_fail_fast() {
        let probe = MockProbe::new()
            .with_body("http://10.0.0.1/", "Internal Server Error")
            .with_body("http://10.0.0.2/", "<html></html>");
        let ctx = context_with(inventory(), MockContainerClient::new(), probe);

        let result = SmokeTestTask.run(&ctx).await;
        assert!(matches!(
            result,
            Err(TaskError::Fanout(FanoutError::Aborted { not_attempted: 1, .. }))
        ));
    }
}
