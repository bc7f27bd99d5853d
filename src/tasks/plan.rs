use async_trait::async_trait;

use super::{Task, TaskContext, TaskError};
use crate::cli::format_plan;
use crate::cluster::{expand_nodes, expand_security_group_names, expand_volumes};

/// Offline view of everything the design declares
pub struct PlanTask;

#[async_trait]
impl Task for PlanTask {
    fn name(&self) -> &'static str {
        "plan"
    }

    fn description(&self) -> &'static str {
        "Show the declared nodes, security groups and volumes (no cloud access)"
    }

    async fn run(&self, ctx: &TaskContext) -> Result<String, TaskError> {
        let config = &ctx.config;
        let nodes = expand_nodes(&config.cluster, &config.node_types)?;
        let group_names: Vec<&str> = config.security_groups.iter().map(|g| g.name.as_str()).collect();
        let groups = expand_security_group_names(&config.cluster, &group_names)?;
        let volumes = expand_volumes(&config.cluster, &config.node_types, &config.volume_types)?;

        Ok(format_plan(&config.cluster, &nodes, &groups, &volumes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::StaticInventory;
    use crate::tasks::test_support::*;

    #[tokio::test]
    async fn test_plan_needs_no_inventory() {
        let ctx = context_with(
            StaticInventory::unavailable("offline"),
            crate::client::docker::mock::MockContainerClient::new(),
            crate::client::probe::mock::MockProbe::new(),
        );
        let output = PlanTask.run(&ctx).await.unwrap();

        assert!(output.contains("oa-1-computing"));
        assert!(output.contains("oa-2-computing"));
        assert!(output.contains("oa-1-loadbalancer"));
        assert!(output.contains("oa-http"));
        assert!(output.contains("dbdata__oa-2-computing"));
    }
}
