// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Output formatting for CLI commands

use clap::ValueEnum;
use rungate_core::{EnqueueRunResponse, Permit, RunStatus, RunStatusView, SemaphoreStateView};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Print output in the specified format
pub fn print<T: Serialize + fmt::Display>(value: &T, format: OutputFormat) {
    match format {
        OutputFormat::Text => println!("{}", value),
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string_pretty(value) {
                println!("{}", json);
            }
        }
    }
}

/// Print a list of items
pub fn print_list<T: Serialize + fmt::Display>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Text => {
            for item in items {
                println!("{}", item);
            }
        }
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string_pretty(items) {
                println!("{}", json);
            }
        }
    }
}

pub fn status_label(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Queued => "queued",
        RunStatus::Starting => "starting",
        RunStatus::Running => "running",
        RunStatus::Failed => "failed",
        RunStatus::Canceled => "canceled",
        RunStatus::NotFound => "not_found",
    }
}

#[derive(Serialize)]
#[serde(transparent)]
pub struct PermitInfo(pub Permit);

impl fmt::Display for PermitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "granted {} on {} (waited {}ms)",
            self.0.lease_id, self.0.runner_id, self.0.queue_wait_ms
        )
    }
}

#[derive(Serialize)]
#[serde(transparent)]
pub struct StateInfo(pub SemaphoreStateView);

impl fmt::Display for StateInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = &self.0;
        writeln!(f, "Runner: {}", state.runner_id)?;
        writeln!(
            f,
            "  Holders: {}/{}",
            state.holders.len(),
            state.capacity
        )?;
        for holder in &state.holders {
            writeln!(
                f,
                "    {:<24} {:<16} since {}",
                holder.lease_id,
                holder.owner_namespace,
                holder.granted_at.format("%Y-%m-%d %H:%M:%S")
            )?;
        }
        write!(f, "  Queued: {}", state.queue_len)?;
        for queued in &state.queue_preview {
            write!(
                f,
                "\n    {:<24} {:<16} since {}",
                queued.lease_id,
                queued.owner_namespace,
                queued.requested_at.format("%Y-%m-%d %H:%M:%S")
            )?;
        }
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(transparent)]
pub struct RunInfo(pub RunStatusView);

impl fmt::Display for RunInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let view = &self.0;
        write!(f, "{:<24} {:<10}", view.ticket_id, status_label(view.status))?;
        if view.position > 0 {
            write!(f, " {}/{}", view.position, view.line_len)?;
        }
        if !view.run_id.is_empty() {
            write!(f, " {}/{}", view.workflow_id, view.run_id)?;
        }
        if !view.error_message.is_empty() {
            write!(f, " {}", view.error_message)?;
        }
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(transparent)]
pub struct EnqueuedInfo(pub EnqueueRunResponse);

impl fmt::Display for EnqueuedInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let response = &self.0;
        write!(f, "{} {}", response.ticket_id, status_label(response.status))?;
        if response.position > 0 {
            write!(f, " (position {} of {})", response.position, response.line_len)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
