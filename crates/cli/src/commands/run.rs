// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run ticket commands

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use clap::Subcommand;
use rungate_core::{EnqueueRunRequest, RunnerId, TicketId};

use crate::client::DaemonClient;
use crate::output::{self, EnqueuedInfo, OutputFormat, RunInfo};

#[derive(clap::Args)]
pub struct RunArgs {
    #[command(subcommand)]
    pub command: RunCommand,
}

#[derive(Subcommand)]
pub enum RunCommand {
    /// Queue a run ticket on a runner
    Enqueue(EnqueueArgs),
    /// Cancel a queued or active run
    Cancel(TicketArgs),
    /// Remove a run ticket and release what it holds
    Done(TicketArgs),
    /// Show one run ticket
    Status(TicketArgs),
    /// List queued run tickets of a namespace
    List {
        runner: String,
        #[arg(long)]
        namespace: String,
    },
}

#[derive(clap::Args)]
pub struct EnqueueArgs {
    /// Leader runner; the ticket is hosted on its coordinator
    pub runner: String,
    pub ticket: String,
    #[arg(long)]
    pub namespace: String,
    /// Additional runner that must countersign (repeatable)
    #[arg(long = "follower")]
    pub followers: Vec<String>,
    /// Maximum queued tickets for the namespace; 0 disables the limit
    #[arg(long, default_value_t = 0)]
    pub max_queued: u32,
    /// Pipeline configuration as JSON
    #[arg(long)]
    pub pipeline_config: Option<String>,
    /// Memo entry as key=json (repeatable)
    #[arg(long = "memo", value_parser = parse_memo)]
    pub memo: Vec<(String, serde_json::Value)>,
}

#[derive(clap::Args)]
pub struct TicketArgs {
    pub runner: String,
    pub ticket: String,
    #[arg(long)]
    pub namespace: String,
}

/// Parse `key=value`; values that are not JSON are taken as strings
fn parse_memo(s: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

impl EnqueueArgs {
    pub fn into_request(self) -> Result<EnqueueRunRequest> {
        let mut request = EnqueueRunRequest::new(
            self.ticket,
            self.namespace,
            self.runner.as_str(),
            chrono::Utc::now(),
        );
        request = request
            .with_followers(self.followers.into_iter().map(RunnerId::new))
            .with_queue_limit(self.max_queued);
        if let Some(config) = self.pipeline_config {
            let config = serde_json::from_str(&config).context("invalid --pipeline-config")?;
            request = request.with_pipeline_config(config);
        }
        request.memo = self.memo.into_iter().collect::<BTreeMap<_, _>>();
        Ok(request)
    }
}

pub async fn handle(client: &DaemonClient, command: RunCommand, format: OutputFormat) -> Result<()> {
    match command {
        RunCommand::Enqueue(args) => {
            let response = client.enqueue_run(args.into_request()?).await?;
            output::print(&EnqueuedInfo(response), format);
        }
        RunCommand::Cancel(args) => {
            let view = client
                .cancel_run(RunnerId::new(args.runner), TicketId::new(args.ticket), args.namespace)
                .await?;
            output::print(&RunInfo(view), format);
        }
        RunCommand::Done(args) => {
            let view = client
                .run_done(RunnerId::new(args.runner), TicketId::new(args.ticket), args.namespace)
                .await?;
            output::print(&RunInfo(view), format);
        }
        RunCommand::Status(args) => {
            let view = client
                .run_status(RunnerId::new(args.runner), args.namespace, TicketId::new(args.ticket))
                .await?;
            output::print(&RunInfo(view), format);
        }
        RunCommand::List { runner, namespace } => {
            let runs = client
                .list_queued_runs(RunnerId::new(runner), namespace)
                .await?;
            if runs.is_empty() && matches!(format, OutputFormat::Text) {
                println!("No queued runs");
                return Ok(());
            }
            let runs: Vec<RunInfo> = runs.into_iter().map(RunInfo).collect();
            output::print_list(&runs, format);
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
