//! Display formatting for CLI output
//!
//! SBIO pattern: pure functions that format data for display

use std::path::Path;

use super::commands::{ContextInfo, SynthesizedStack};
use crate::graph::{RoutingTable, RouteTarget, StackGraph, ValidationReport, ValidationSeverity};
use crate::provision::{DeploymentRecord, TeardownReport};

// ============================================================================
// Table formatting helpers
// ============================================================================

/// Left-aligned table, three spaces between columns, upper-case headers
pub fn format_table(headers: &[&str], rows: Vec<Vec<String>>) -> String {
    if rows.is_empty() {
        return "No resources found.\n".to_string();
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let render_row = |cells: Vec<String>| -> String {
        let line = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| match widths.get(i) {
                Some(&w) => format!("{:w$}", cell, w = w),
                None => cell.clone(),
            })
            .collect::<Vec<_>>()
            .join("   ");
        format!("{}\n", line.trim_end())
    };

    let mut output = render_row(headers.iter().map(|h| h.to_uppercase()).collect());
    for row in rows {
        output.push_str(&render_row(row));
    }
    output
}

// ============================================================================
// Context display
// ============================================================================

pub fn format_context_list(contexts: &[ContextInfo]) -> String {
    let rows: Vec<Vec<String>> = contexts
        .iter()
        .map(|ctx| {
            vec![
                if ctx.is_current { "*" } else { " " }.to_string(),
                ctx.name.clone(),
                ctx.target.clone(),
            ]
        })
        .collect();

    format_table(&["", "NAME", "TARGET"], rows)
}

pub fn format_current_context(name: &str, target: &str) -> String {
    format!("Current context: {} ({})\n", name, target)
}

// ============================================================================
// Stack display
// ============================================================================

/// One row per declared resource, in creation order
pub fn format_graph_summary(graph: &StackGraph) -> String {
    let rows: Vec<Vec<String>> = graph
        .resources()
        .iter()
        .map(|r| {
            let deps = r.depends_on();
            vec![
                r.id.to_string(),
                r.kind().to_string(),
                if deps.is_empty() {
                    "-".to_string()
                } else {
                    deps.iter().map(|d| d.as_str()).collect::<Vec<_>>().join(", ")
                },
                format!("{:?}", r.removal_policy).to_lowercase(),
            ]
        })
        .collect();

    format!(
        "Stack: {}\n\n{}",
        graph.stack_id,
        format_table(&["ID", "KIND", "DEPENDS ON", "REMOVAL"], rows)
    )
}

pub fn format_synthesis_result(stack: &SynthesizedStack, template_path: &Path) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "✓ Synthesized {} ({} resources, {} outputs)\n",
        stack.graph.stack_id,
        stack.template.resources.len(),
        stack.template.outputs.len()
    ));
    output.push_str(&format!("  Template: {}\n", template_path.display()));
    output
}

pub fn format_validation_report(report: &ValidationReport, source: &str) -> String {
    let mut output = String::new();

    if report.passed {
        output.push_str(&format!("✓ {} is valid\n", source));
    } else {
        output.push_str(&format!("✗ {} is invalid\n", source));
    }

    for msg in &report.messages {
        let marker = match msg.severity {
            ValidationSeverity::Error => "error",
            ValidationSeverity::Warning => "warning",
            ValidationSeverity::Info => "info",
        };
        match &msg.resource {
            Some(resource) => output.push_str(&format!(
                "  {}[{}] {}: {}\n",
                marker, msg.code, resource, msg.message
            )),
            None => output.push_str(&format!("  {}[{}] {}\n", marker, msg.code, msg.message)),
        }
        if let Some(suggestion) = &msg.suggestion {
            output.push_str(&format!("      hint: {}\n", suggestion));
        }
    }

    output
}

fn target_cell(target: &RouteTarget) -> String {
    let backends: Vec<&str> = target.backends.iter().map(|b| b.as_str()).collect();
    format!("{} -> {}", target.target_group, backends.join(", "))
}

/// Rules in evaluation order, then the default
pub fn format_routing_table(table: &RoutingTable) -> String {
    let mut rows: Vec<Vec<String>> = table
        .entries
        .iter()
        .map(|e| {
            vec![
                e.priority.to_string(),
                e.patterns
                    .iter()
                    .map(|p| p.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                target_cell(&e.target),
            ]
        })
        .collect();
    rows.push(vec![
        "default".to_string(),
        "*".to_string(),
        target_cell(&table.default),
    ]);

    format!(
        "Listener: {}\n{}",
        table.listener,
        format_table(&["PRIORITY", "PATHS", "TARGET"], rows)
    )
}

/// Where each path ends up
pub fn format_resolutions(table: &RoutingTable, paths: &[String]) -> String {
    let rows: Vec<Vec<String>> = paths
        .iter()
        .map(|path| {
            let target = table.resolve(path);
            vec![
                path.clone(),
                target
                    .rule
                    .as_ref()
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "default".to_string()),
                target_cell(target),
            ]
        })
        .collect();
    format_table(&["PATH", "RULE", "TARGET"], rows)
}

// ============================================================================
// Deploy display
// ============================================================================

pub fn format_deployment(record: &DeploymentRecord, target: &str) -> String {
    let mut output = String::new();
    output.push_str(&format!("✓ Deployed {} to {}\n", record.stack, target));
    output.push_str(&format!("  Deployment: {}\n", record.id));
    output.push_str(&format!("  Resources:  {}\n", record.resource_count));
    output.push_str(&format!("  At:         {}\n", record.deployed_at.to_rfc3339()));
    output.push_str(&format!("  From:       {}\n", record.host));
    output
}

pub fn format_dry_run(stack: &SynthesizedStack, target: &str) -> String {
    let mut output = String::new();
    output.push_str("stackforge - Dry Run Mode\n\n");
    output.push_str(&format!("Target: {}\n\n", target));
    output.push_str(&format_graph_summary(&stack.graph));
    if !stack.template.outputs.is_empty() {
        output.push_str("\nOutputs:\n");
        for name in stack.template.outputs.keys() {
            output.push_str(&format!("  - {}\n", name));
        }
    }
    let retained = stack.template.retained();
    if !retained.is_empty() {
        output.push_str(&format!("\nRetained on teardown: {}\n", retained.join(", ")));
    }
    output
}

pub fn format_teardown(report: &TeardownReport) -> String {
    let mut output = format!(
        "✓ Destroyed {} ({} resources removed)\n",
        report.stack,
        report.removed.len()
    );
    for id in &report.removed {
        output.push_str(&format!("  - {}\n", id));
    }
    output
}
