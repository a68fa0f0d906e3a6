//! `cellar op ...` — reads an operation request as JSON (from a file or
//! stdin), fills in the id/timestamp/tenant the caller doesn't have to
//! supply, submits it through `commit`, and prints the resulting
//! operation or the violation list. Engine errors stay the structured
//! `thiserror` enums all the way to here; only the final rendering is
//! flattened into `anyhow`.

use anyhow::{Context, Result};
use cellar_ledger_core::commit::commit;
use cellar_ledger_core::error::CommitError;
use cellar_ledger_core::model::{OperationId, OperationType, TenantId};
use cellar_ledger_core::request::{FlowQuantityRequest, InputConsumption, OperationRequest, TargetFlowQuantity};
use cellar_ledger_store_memory::InMemoryRepository;
use chrono::Utc;
use clap::ValueEnum;
use colored::Colorize;
use serde::Deserialize;
use std::io::Read;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OperationTypeArg {
    Transfer,
    Blend,
    Bottle,
    Loss,
    Adjustment,
    Press,
    Topping,
    Gain,
}

impl From<OperationTypeArg> for OperationType {
    fn from(arg: OperationTypeArg) -> Self {
        match arg {
            OperationTypeArg::Transfer => OperationType::Transfer,
            OperationTypeArg::Blend => OperationType::Blend,
            OperationTypeArg::Bottle => OperationType::Bottle,
            OperationTypeArg::Loss => OperationType::Loss,
            OperationTypeArg::Adjustment => OperationType::Adjustment,
            OperationTypeArg::Press => OperationType::Press,
            OperationTypeArg::Topping => OperationType::Topping,
            OperationTypeArg::Gain => OperationType::Gain,
        }
    }
}

/// The caller-facing JSON shape: everything `OperationRequest` needs
/// except the id/timestamp/tenant, which the CLI fills in so a seed file
/// author never has to invent a UUID or a clock reading by hand.
#[derive(Deserialize)]
struct OperationInput {
    description: Option<String>,
    from_containers: Vec<cellar_ledger_core::model::ContainerId>,
    #[serde(default)]
    flow_quantities: Vec<FlowQuantityRequest>,
    #[serde(default)]
    input_consumption: Vec<InputConsumption>,
    #[serde(default)]
    target_flow_quantities: Vec<TargetFlowQuantity>,
}

pub async fn submit(
    repo: &InMemoryRepository,
    tenant_id: TenantId,
    op_type: OperationTypeArg,
    request_file: Option<PathBuf>,
) -> Result<()> {
    let raw = match request_file {
        Some(path) => std::fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).context("failed to read operation request from stdin")?;
            buf
        }
    };
    let input: OperationInput = serde_json::from_str(&raw).context("failed to parse operation request")?;

    let request = OperationRequest {
        id: OperationId::new(),
        op_type: op_type.into(),
        tenant_id,
        timestamp: Utc::now(),
        description: input.description,
        from_containers: input.from_containers,
        flow_quantities: input.flow_quantities,
        input_consumption: input.input_consumption,
        target_flow_quantities: input.target_flow_quantities,
    };

    match commit(request, repo).await {
        Ok(operation) => {
            println!("{} {}", "Committed operation:".bright_green().bold(), operation.id);
            for output in &operation.outputs {
                println!(
                    "  {} {} qty={} {:?}",
                    "->".dimmed(),
                    output.container_id,
                    output.composition.qty,
                    output.composition.unit
                );
            }
            println!("{}", serde_json::to_string_pretty(&operation).context("failed to render operation")?);
            Ok(())
        }
        Err(CommitError::ValidationFailed(violations)) => {
            println!("{}", "Commit rejected — invariant violations:".bright_red().bold());
            for violation in &violations {
                println!("  {} {violation:?}", "-".dimmed());
            }
            anyhow::bail!("{} violation(s)", violations.len());
        }
        Err(err) => Err(err).context("commit failed"),
    }
}
