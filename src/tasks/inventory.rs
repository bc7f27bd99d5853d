//! Read-only views of the live cluster

use async_trait::async_trait;

use super::{Task, TaskContext, TaskError};
use crate::cli::{format_group_list, format_node_list, format_volume_list};
use crate::cluster::extra_hosts;

pub struct NodesTask;

#[async_trait]
impl Task for NodesTask {
    fn name(&self) -> &'static str {
        "nodes"
    }

    fn description(&self) -> &'static str {
        "List the cluster's live nodes"
    }

    async fn run(&self, ctx: &TaskContext) -> Result<String, TaskError> {
        let nodes = ctx.selected_nodes().await?;
        Ok(format_node_list(&nodes))
    }
}

pub struct GroupsTask;

#[async_trait]
impl Task for GroupsTask {
    fn name(&self) -> &'static str {
        "groups"
    }

    fn description(&self) -> &'static str {
        "List the cluster's live security groups"
    }

    async fn run(&self, ctx: &TaskContext) -> Result<String, TaskError> {
        let live = ctx.inventory.list_security_groups().await?;
        Ok(format_group_list(&ctx.correlator().security_groups(&live)))
    }
}

pub struct VolumesTask;

#[async_trait]
impl Task for VolumesTask {
    fn name(&self) -> &'static str {
        "volumes"
    }

    fn description(&self) -> &'static str {
        "List the cluster's live volumes of declared types"
    }

    async fn run(&self, ctx: &TaskContext) -> Result<String, TaskError> {
        let live = ctx.inventory.list_volumes().await?;
        let types = ctx.config.volume_type_names();
        Ok(format_volume_list(&ctx.correlator().volumes(&live, &types)))
    }
}

pub struct HostsTask;

#[async_trait]
impl Task for HostsTask {
    fn name(&self) -> &'static str {
        "hosts"
    }

    fn description(&self) -> &'static str {
        "Print name:address host entries for every cluster node"
    }

    async fn run(&self, ctx: &TaskContext) -> Result<String, TaskError> {
        let nodes = ctx.cluster_nodes().await?;
        let mut output = extra_hosts(&nodes).join("\n");
        output.push('\n');
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::Selection;
    use crate::tasks::test_support::*;

    #[tokio::test]
    async fn test_nodes_task_filters_cluster() {
        let output = NodesTask.run(&context()).await.unwrap();
        assert!(output.contains("oa-1-loadbalancer"));
        assert!(!output.contains("vh-1-computing"));
    }

    #[tokio::test]
    async fn test_nodes_task_by_id() {
        let ctx = context().with_selection(Selection::all().with_node_id("n2"));
        let output = NodesTask.run(&ctx).await.unwrap();
        assert!(output.contains("oa-2-computing"));
        assert!(!output.contains("oa-1-computing"));
    }

    #[tokio::test]
    async fn test_groups_task() {
        let output = GroupsTask.run(&context()).await.unwrap();
        assert!(output.contains("oa-http"));
        assert!(!output.contains("default"));
    }

    #[tokio::test]
    async fn test_volumes_task_is_cluster_scoped() {
        let output = VolumesTask.run(&context()).await.unwrap();
        assert!(output.contains("dbdata__oa-1-computing"));
        assert!(!output.contains("vh-1-computing"));
    }

    #[tokio::test]
    async fn test_hosts_task() {
        let output = HostsTask.run(&context()).await.unwrap();
        assert_eq!(
            output,
            "oa-1-computing:10.0.0.1\noa-2-computing:10.0.0.2\noa-1-loadbalancer:10.0.0.3\n"
        );
    }
}
