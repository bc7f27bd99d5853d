//! CLI module for clouddity
//!
//! `clouddity [OPTIONS] <TASK>` runs one registered task against the cluster
//! described by the design file. `clouddity --list-tasks` shows the tasks.

use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::time::Duration;

mod display;

pub use display::*;

use crate::cluster::{ErrorPolicy, Selection};
use crate::config::default_config_path;

#[derive(Parser, Debug)]
#[command(name = "clouddity")]
#[command(about = "Resolve a declarative cluster design against the live cloud and run tasks on it")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging output (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to the cluster design file (default: ~/.clouddity/cluster.json)
    #[arg(short, long, env = "CLOUDDITY_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Path to a .env file for loading credentials
    #[arg(long, value_name = "FILE")]
    pub env_file: Option<PathBuf>,

    /// List the available tasks and exit
    #[arg(long)]
    pub list_tasks: bool,

    /// Task to run
    #[arg(required_unless_present = "list_tasks")]
    pub task: Option<String>,

    /// Only process nodes of this type
    #[arg(long, value_name = "TYPE", alias = "nodetype")]
    pub node_type: Option<String>,

    /// Only process the node with this id
    #[arg(long, value_name = "ID", alias = "nodeid")]
    pub node_id: Option<String>,

    /// Only process the container with this id
    #[arg(long, value_name = "ID", alias = "containerid")]
    pub container_id: Option<String>,

    /// Error policy for per-item actions (fail-fast or continue-on-error)
    #[arg(long)]
    pub policy: Option<ErrorPolicy>,

    /// Deadline for each per-item action, in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

impl Cli {
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(default_config_path)
    }

    pub fn selection(&self) -> Selection {
        Selection {
            node_type: self.node_type.clone(),
            node_id: self.node_id.clone(),
            container_id: self.container_id.clone(),
        }
    }

    pub fn action_timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_task_with_filters() {
        let cli = Cli::parse_from([
            "clouddity",
            "-vv",
            "--config",
            "cluster.yaml",
            "containers",
            "--node-type",
            "computing",
            "--policy",
            "fail-fast",
            "--timeout",
            "30",
        ]);

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.task.as_deref(), Some("containers"));
        assert_eq!(cli.config_path(), PathBuf::from("cluster.yaml"));
        assert_eq!(cli.selection(), Selection::all().with_node_type("computing"));
        assert_eq!(cli.policy, Some(ErrorPolicy::FailFast));
        assert_eq!(cli.action_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_list_tasks_needs_no_task() {
        let cli = Cli::parse_from(["clouddity", "--list-tasks"]);
        assert!(cli.list_tasks);
        assert!(cli.task.is_none());
    }

    #[test]
    fn test_task_required() {
        assert!(Cli::try_parse_from(["clouddity"]).is_err());
    }

    #[test]
    fn test_invalid_policy_rejected() {
        assert!(Cli::try_parse_from(["clouddity", "nodes", "--policy", "sometimes"]).is_err());
    }

    #[test]
    fn test_gruntfile_style_aliases() {
        let cli = Cli::parse_from(["clouddity", "nodes", "--nodeid", "abc"]);
        assert_eq!(cli.node_id.as_deref(), Some("abc"));
    }
}
