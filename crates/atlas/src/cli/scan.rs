//! `atlas scan`, `atlas scan-table` and `atlas scan-unscanned`

use crate::cli::output::{format_duration_ms, print_json, print_table_colored, run_status_color};
use crate::cli::{block_on, open_orchestrator};
use anyhow::Result;
use atlas_db::RunStatus;
use atlas_ids::{ExternalResourceId, TenantId};
use atlas_scan::{ScanRequest, ScanRunSummary, TableScanRequest};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug)]
pub struct ScanArgs {
    pub config: PathBuf,
    pub tenant: i64,
    pub resource: i64,
    pub namespaces: Vec<String>,
    pub token: Option<String>,
    pub json: bool,
}

#[derive(Debug)]
pub struct ScanTableArgs {
    pub config: PathBuf,
    pub tenant: i64,
    pub resource: i64,
    pub schema: String,
    pub table: String,
    pub token: Option<String>,
    pub json: bool,
}

#[derive(Debug)]
pub struct ScanUnscannedArgs {
    pub config: PathBuf,
    pub tenant: i64,
    pub json: bool,
}

pub fn run(args: ScanArgs) -> Result<()> {
    block_on(async move {
        let orchestrator = open_orchestrator(&args.config).await?;

        let mut request =
            ScanRequest::new(TenantId::new(args.tenant), ExternalResourceId::new(args.resource))
                .with_namespaces(args.namespaces);
        if let Some(token) = args.token {
            request = request.with_token(token);
        }

        let summary = orchestrator.scan_resource(request).await?;
        report(&summary, args.json)
    })
}

pub fn run_table(args: ScanTableArgs) -> Result<()> {
    block_on(async move {
        let orchestrator = open_orchestrator(&args.config).await?;
        let summary = orchestrator
            .scan_table(TableScanRequest {
                tenant_id: TenantId::new(args.tenant),
                external_id: ExternalResourceId::new(args.resource),
                schema: args.schema,
                table: args.table,
                token: args.token,
            })
            .await?;
        report(&summary, args.json)
    })
}

pub fn run_unscanned(args: ScanUnscannedArgs) -> Result<()> {
    block_on(async move {
        let orchestrator = open_orchestrator(&args.config).await?;
        let dispatch = orchestrator
            .scan_all_unscanned(TenantId::new(args.tenant))
            .await?;
        info!("Dispatched scan run {}", dispatch.run_id());
        if !args.json {
            println!("Scan run {} started, waiting for workers...", dispatch.run_id());
        }

        let summary = dispatch.wait().await?;
        report(&summary, args.json)
    })
}

fn report(summary: &ScanRunSummary, json: bool) -> Result<()> {
    if json {
        print_json(summary)?;
    } else {
        print_summary(summary);
    }

    if summary.status == RunStatus::Failed {
        anyhow::bail!(
            "scan run {} failed: {}",
            summary.run_id,
            summary.message.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

pub fn print_summary(summary: &ScanRunSummary) {
    print_table_colored(
        &["Run", "Status", "Namespaces", "Items", "Fields", "Skipped", "Duration"],
        vec![vec![
            (summary.run_id.to_string(), None),
            (
                summary.status.as_str().to_string(),
                Some(run_status_color(summary.status)),
            ),
            (summary.namespaces_scanned.to_string(), None),
            (summary.items_scanned.to_string(), None),
            (summary.fields_scanned.to_string(), None),
            (summary.skipped.to_string(), None),
            (format_duration_ms(summary.duration_ms), None),
        ]],
    );
    if let Some(message) = &summary.message {
        println!("{}", message);
    }
}
