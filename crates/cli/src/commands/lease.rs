// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Semaphore commands: acquire, release, state

use std::time::Duration;

use anyhow::Result;
use rungate_core::{AcquireRequest, RunnerId};

use crate::client::DaemonClient;
use crate::output::{self, OutputFormat, PermitInfo, StateInfo};

#[derive(clap::Args)]
pub struct AcquireArgs {
    /// Runner to take a slot on
    pub runner: String,
    /// Lease to hold while granted
    pub lease: String,
    /// Idempotency key; retrying with the same key returns the same permit
    #[arg(long)]
    pub request_id: Option<String>,
    /// Owner namespace
    #[arg(long, default_value = "")]
    pub namespace: String,
    #[arg(long, default_value = "")]
    pub workflow_id: String,
    #[arg(long, default_value = "")]
    pub run_id: String,
    /// Give up after waiting this long (e.g. "30s"); waits forever if unset
    #[arg(long, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,
}

impl AcquireArgs {
    pub fn into_request(self) -> (RunnerId, AcquireRequest) {
        let request_id = self
            .request_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let mut request = AcquireRequest::new(request_id, self.lease);
        request.owner_namespace = self.namespace;
        request.owner_workflow_id = self.workflow_id;
        request.owner_run_id = self.run_id;
        request.wait_timeout = self.timeout.unwrap_or_default();
        (RunnerId::new(self.runner), request)
    }
}

#[derive(clap::Args)]
pub struct ReleaseArgs {
    pub runner: String,
    pub lease: String,
}

#[derive(clap::Args)]
pub struct StateArgs {
    pub runner: String,
}

pub async fn acquire(client: &DaemonClient, args: AcquireArgs, format: OutputFormat) -> Result<()> {
    let (runner_id, request) = args.into_request();
    let permit = client.acquire(runner_id, request).await?;
    output::print(&PermitInfo(permit), format);
    Ok(())
}

pub async fn release(client: &DaemonClient, args: ReleaseArgs, format: OutputFormat) -> Result<()> {
    let released = client
        .release(RunnerId::new(args.runner), args.lease.as_str().into())
        .await?;
    match format {
        OutputFormat::Text if released => println!("Released {}", args.lease),
        OutputFormat::Text => println!("Lease {} was not held", args.lease),
        OutputFormat::Json => println!("{}", serde_json::json!({ "released": released })),
    }
    Ok(())
}

pub async fn state(client: &DaemonClient, args: StateArgs, format: OutputFormat) -> Result<()> {
    let state = client.state(RunnerId::new(args.runner)).await?;
    output::print(&StateInfo(state), format);
    Ok(())
}

#[cfg(test)]
#[path = "lease_tests.rs"]
mod tests;
