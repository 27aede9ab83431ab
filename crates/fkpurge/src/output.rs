//! Output formatting for CLI commands.
//!
//! Every command prints either human-readable text or pretty JSON. Text
//! writers take any `Write` so they can be tested against a buffer.

use crate::engine::{DeleteOutcome, PurgePlan, PurgeReport, StepKind};
use crate::graph::DependencyGraph;
use colored::Colorize;
use serde::Serialize;
use std::io::{self, Write};

/// Output mode for CLI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable text format
    Text,
    /// JSON format for programmatic use
    Json,
}

/// A table and its direct dependents, as printed by `graph`.
#[derive(Debug, Serialize)]
pub struct GraphEntry {
    /// Table name
    pub table: String,
    /// Tables that reference it directly
    pub dependents: Vec<String>,
}

/// Every table in purge order with its direct dependents.
pub fn graph_entries(graph: &DependencyGraph) -> Vec<GraphEntry> {
    let mut entries = Vec::with_capacity(graph.len());
    graph.traverse(|vertex| {
        entries.push(GraphEntry {
            table: vertex.name().to_string(),
            dependents: vertex
                .dependents()
                .filter(|d| *d != vertex)
                .map(|d| d.name().to_string())
                .collect(),
        });
    });
    entries
}

/// Print a value as pretty JSON to stdout.
pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(handle, "{json}")
}

/// Print the purge order of a graph.
pub fn print_graph(graph: &DependencyGraph, mode: OutputMode) -> io::Result<()> {
    let entries = graph_entries(graph);
    match mode {
        OutputMode::Json => print_json(&entries),
        OutputMode::Text => write_graph_text(&mut io::stdout().lock(), &entries),
    }
}

/// Print the steps of a plan.
pub fn print_plan(plan: &PurgePlan, mode: OutputMode) -> io::Result<()> {
    match mode {
        OutputMode::Json => print_json(plan),
        OutputMode::Text => write_plan_text(&mut io::stdout().lock(), plan),
    }
}

/// Print the per-table results of a purge or preview.
pub fn print_report(report: &PurgeReport, dry_run: bool, mode: OutputMode) -> io::Result<()> {
    match mode {
        OutputMode::Json => print_json(&serde_json::json!({
            "target": report.target,
            "dry_run": dry_run,
            "total": report.total_deleted(),
            "steps": report.steps,
        })),
        OutputMode::Text => write_report_text(&mut io::stdout().lock(), report, dry_run),
    }
}

fn kind_label(kind: StepKind) -> String {
    match kind {
        StepKind::Target => kind.to_string().yellow().to_string(),
        StepKind::Dependent => kind.to_string().dimmed().to_string(),
    }
}

fn write_graph_text<W: Write>(w: &mut W, entries: &[GraphEntry]) -> io::Result<()> {
    if entries.is_empty() {
        writeln!(w, "No tables found.")?;
        return Ok(());
    }

    writeln!(w, "Purge order ({} tables):", entries.len())?;
    for (position, entry) in entries.iter().enumerate() {
        if entry.dependents.is_empty() {
            writeln!(w, "{:>4}. {}", position + 1, entry.table.cyan())?;
        } else {
            writeln!(
                w,
                "{:>4}. {} {} {}",
                position + 1,
                entry.table.cyan(),
                "<-".dimmed(),
                entry.dependents.join(", ")
            )?;
        }
    }
    Ok(())
}

fn write_plan_text<W: Write>(w: &mut W, plan: &PurgePlan) -> io::Result<()> {
    if !plan.found {
        writeln!(
            w,
            "{} {} is not a purge entry point; only its own rows are deleted",
            "Note:".yellow(),
            plan.target
        )?;
    }

    writeln!(w, "Purge plan for {}:", plan.target.to_string().cyan())?;
    for (position, step) in plan.steps.iter().enumerate() {
        writeln!(
            w,
            "{:>4}. {} ({})",
            position + 1,
            step.table,
            kind_label(step.kind)
        )?;
    }
    Ok(())
}

fn write_report_text<W: Write>(w: &mut W, report: &PurgeReport, dry_run: bool) -> io::Result<()> {
    let verb = if dry_run { "Would delete" } else { "Deleted" };

    for step in &report.steps {
        let outcome = match step.outcome {
            DeleteOutcome::NotFound => "skipped (no row source)".dimmed().to_string(),
            DeleteOutcome::Deleted(0) => "none found".dimmed().to_string(),
            DeleteOutcome::Deleted(rows) => format!("{rows} row(s)").green().to_string(),
        };
        writeln!(
            w,
            "  {} ({}): {}",
            step.table,
            kind_label(step.kind),
            outcome
        )?;
    }

    writeln!(
        w,
        "{verb} {} row(s) for {}",
        report.total_deleted(),
        report.target.to_string().cyan()
    )
}
