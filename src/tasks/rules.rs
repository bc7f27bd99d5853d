use async_trait::async_trait;
use tracing::warn;

use super::{Task, TaskContext, TaskError};
use crate::cli::format_rule_list;
use crate::cluster::{bind_rules, resolve_rules};

/// Resolve rule templates against live node addresses and bind them to the
/// live security groups. Prints the rules that would be created.
pub struct RulesTask;

#[async_trait]
impl Task for RulesTask {
    fn name(&self) -> &'static str {
        "rules"
    }

    fn description(&self) -> &'static str {
        "Resolve security group rules against live node addresses"
    }

    async fn run(&self, ctx: &TaskContext) -> Result<String, TaskError> {
        let nodes = ctx.cluster_nodes().await?;
        let live_groups = ctx.inventory.list_security_groups().await?;
        let groups = ctx.correlator().security_groups(&live_groups);

        let resolved = resolve_rules(&ctx.config.cluster, &ctx.config.security_groups, &nodes)?;
        let bound = bind_rules(&resolved, &groups);
        if !bound.missing_groups.is_empty() {
            warn!(
                "Create the missing security groups first: {}",
                bound.missing_groups.join(", ")
            );
        }

        Ok(format_rule_list(&bound))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::test_support::*;

    #[tokio::test]
    async fn test_rules_task_uses_live_addresses() {
        let output = RulesTask.run(&context()).await.unwrap();
        // loadbalancer address for the templated rule, then the static rule
        assert!(output.contains("10.0.0.3"));
        assert!(output.contains("0.0.0.0/0"));
        assert!(output.contains("g1"));
        assert!(!output.contains("10.0.0.1"));
    }
}
