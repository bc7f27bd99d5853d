//! Cluster topology resolution and per-node task fan-out for OpenStack
//! clusters running Docker.
//!
//! A declarative design (node types, security groups, volume types) is
//! expanded into named entities, correlated with the live inventory, and
//! walked one item at a time by registered tasks.

pub mod cli;
pub mod client;
pub mod cluster;
pub mod config;
pub mod tasks;
