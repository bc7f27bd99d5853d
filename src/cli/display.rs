//! Display formatting for CLI output
//!
//! SBIO pattern: Pure functions that format data for display

use crate::cluster::{
    BoundRules, ContainerWork, DeclaredNode, DeclaredVolume, EnrichedNode, FanoutReport,
    ImageWork, ItemState, LiveGroup, LiveVolume, NestedReport,
};

// ============================================================================
// Table formatting helpers
// ============================================================================

/// Format a simple table with headers and rows
pub fn format_table(headers: &[&str], rows: Vec<Vec<String>>) -> String {
    if rows.is_empty() {
        return "No resources found.\n".to_string();
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let mut output = String::new();
    push_row(&mut output, headers.iter().map(|h| h.to_uppercase()), &widths);
    for row in rows {
        push_row(&mut output, row.into_iter(), &widths);
    }
    output
}

fn push_row(output: &mut String, cells: impl Iterator<Item = String>, widths: &[usize]) {
    let mut line = String::new();
    for (i, cell) in cells.enumerate() {
        if i > 0 {
            line.push_str("   ");
        }
        match widths.get(i) {
            Some(width) => line.push_str(&format!("{:width$}", cell, width = *width)),
            None => line.push_str(&cell),
        }
    }
    output.push_str(line.trim_end());
    output.push('\n');
}

fn or_dash(value: Option<&str>) -> String {
    value.unwrap_or("-").to_string()
}

// ============================================================================
// Task list
// ============================================================================

pub fn format_task_list(tasks: &[(&str, &str)]) -> String {
    let rows = tasks
        .iter()
        .map(|(name, description)| vec![name.to_string(), description.to_string()])
        .collect();
    format_table(&["TASK", "DESCRIPTION"], rows)
}

// ============================================================================
// Declared entities
// ============================================================================

/// Format the declared topology of a cluster
pub fn format_plan(
    cluster: &str,
    nodes: &[DeclaredNode],
    groups: &[String],
    volumes: &[DeclaredVolume],
) -> String {
    let mut output = format!("Cluster: {}\n\n", cluster);

    output.push_str(&format!("Nodes ({}):\n", nodes.len()));
    let rows = nodes
        .iter()
        .map(|n| {
            let groups: Vec<&str> = n.security_groups.iter().map(|g| g.name.as_str()).collect();
            vec![
                n.name.clone(),
                n.node_type.clone(),
                or_dash(n.image_ref.as_deref()),
                or_dash(n.flavor_ref.as_deref()),
                groups.join(","),
            ]
        })
        .collect();
    output.push_str(&format_table(
        &["NAME", "TYPE", "IMAGE", "FLAVOR", "SECURITY GROUPS"],
        rows,
    ));

    output.push_str(&format!("\nSecurity groups ({}):\n", groups.len()));
    for group in groups {
        output.push_str(&format!("  {}\n", group));
    }

    output.push_str(&format!("\nVolumes ({}):\n", volumes.len()));
    let rows = volumes
        .iter()
        .map(|v| {
            vec![
                v.name.clone(),
                format!("{}GiB", v.size_gib),
                v.fstype.clone(),
                v.mountpoint.clone(),
            ]
        })
        .collect();
    output.push_str(&format_table(&["NAME", "SIZE", "FSTYPE", "MOUNTPOINT"], rows));

    output
}

// ============================================================================
// Live entities
// ============================================================================

pub fn format_node_list(nodes: &[EnrichedNode]) -> String {
    let rows = nodes
        .iter()
        .map(|n| {
            vec![
                n.name.clone(),
                n.id.clone(),
                n.node_type.clone(),
                n.status.clone(),
                or_dash(n.address.as_deref()),
                if n.images.is_empty() {
                    "-".to_string()
                } else {
                    n.images.join(",")
                },
            ]
        })
        .collect();
    format_table(&["NAME", "ID", "TYPE", "STATUS", "ADDRESS", "IMAGES"], rows)
}

pub fn format_group_list(groups: &[LiveGroup]) -> String {
    let rows = groups
        .iter()
        .map(|g| vec![g.name.clone(), g.id.clone(), g.description.clone()])
        .collect();
    format_table(&["NAME", "ID", "DESCRIPTION"], rows)
}

pub fn format_volume_list(volumes: &[LiveVolume]) -> String {
    let rows = volumes
        .iter()
        .map(|v| {
            vec![
                v.name.clone(),
                v.id.clone(),
                format!("{}GiB", v.size_gib),
                v.status.clone(),
                if v.attached_to.is_empty() {
                    "-".to_string()
                } else {
                    v.attached_to.join(",")
                },
            ]
        })
        .collect();
    format_table(&["NAME", "ID", "SIZE", "STATUS", "ATTACHED TO"], rows)
}

/// Format bound rules, followed by the groups they could not be bound to
pub fn format_rule_list(bound: &BoundRules) -> String {
    let rows = bound
        .rules
        .iter()
        .map(|r| {
            let ports = match (r.rule.port_range_min, r.rule.port_range_max) {
                (Some(min), Some(max)) if min == max => min.to_string(),
                (Some(min), Some(max)) => format!("{}-{}", min, max),
                (Some(port), None) | (None, Some(port)) => port.to_string(),
                (None, None) => "any".to_string(),
            };
            vec![
                r.security_group.clone(),
                r.security_group_id.clone(),
                format!("{:?}", r.rule.direction).to_lowercase(),
                or_dash(r.rule.protocol.as_deref()),
                ports,
                r.rule.remote_ip_prefix.clone(),
            ]
        })
        .collect();

    let mut output = format_table(
        &["GROUP", "GROUP ID", "DIRECTION", "PROTOCOL", "PORTS", "REMOTE"],
        rows,
    );
    if !bound.missing_groups.is_empty() {
        output.push_str(&format!(
            "\nMissing security groups: {}\n",
            bound.missing_groups.join(", ")
        ));
    }
    output
}

// ============================================================================
// Docker
// ============================================================================

pub fn format_image_work(work: &[ImageWork]) -> String {
    let rows = work
        .iter()
        .map(|w| {
            vec![
                w.node.name.clone(),
                w.image.clone(),
                w.repo.clone(),
                w.node
                    .docker
                    .as_ref()
                    .map(|d| d.url())
                    .unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect();
    format_table(&["NODE", "IMAGE", "REPOSITORY", "DOCKER"], rows)
}

pub fn format_container_list(containers: &[ContainerWork]) -> String {
    let rows = containers
        .iter()
        .map(|w| {
            vec![
                w.node.name.clone(),
                w.container.id.chars().take(12).collect(),
                w.container.image.clone(),
                w.container.names.join(","),
                w.container.status.clone(),
            ]
        })
        .collect();
    format_table(&["NODE", "CONTAINER", "IMAGE", "NAMES", "STATUS"], rows)
}

// ============================================================================
// Fan-out reports
// ============================================================================

/// Format per-item records and a summary line
pub fn format_report(report: &FanoutReport) -> String {
    let rows = report
        .records
        .iter()
        .map(|r| {
            let state = match r.state {
                ItemState::Succeeded => "ok",
                ItemState::Failed => "FAILED",
                ItemState::Skipped => "skipped",
            };
            vec![
                r.item.clone(),
                state.to_string(),
                format!("{}ms", r.duration_ms),
                r.error.clone().unwrap_or_default(),
            ]
        })
        .collect();

    let mut output = format_table(&["ITEM", "RESULT", "TIME", "ERROR"], rows);
    output.push_str(&format!(
        "{}: {} attempted, {} failed, {} not attempted\n",
        report.operation,
        report.attempted(),
        report.failed(),
        report.skipped()
    ));
    output
}

/// Format both passes of a two-pass run; the second only if it ran
pub fn format_nested_report(report: &NestedReport) -> String {
    let mut output = format_report(&report.expansion);
    if let Some(items) = &report.items {
        output.push('\n');
        output.push_str(&format_report(items));
    }
    output
}
