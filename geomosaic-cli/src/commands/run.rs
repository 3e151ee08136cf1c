//! Run command - execute one action descriptor.
//!
//! The descriptor comes from a JSON file (`--action`) or from flags. On
//! success the merged raster path is printed to stdout; on failure the
//! executor's failure string is printed and the process exits non-zero.

use std::fs;
use std::path::PathBuf;

use clap::Args;
use geomosaic::pipeline::Pipeline;
use geomosaic::{ActionDescriptor, ActionOutcome, Executor};
use serde_json::{Map, Value};
use tracing::debug;

use super::common::{load_config, parse_param, progress_callback, resolve_planning, tile_progress_bar};
use crate::error::CliError;

#[derive(Debug, Args)]
pub struct RunArgs {
    /// JSON file holding {operationName, parameters, outputId}
    #[arg(long, conflicts_with_all = ["operation", "params"])]
    pub action: Option<PathBuf>,

    /// Operation name (e.g., rgb_tif, index_composite_tif_tiled)
    #[arg(long)]
    pub operation: Option<String>,

    /// Operation parameter as key=value (repeatable)
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, Value)>,

    /// Output id; overrides the one in the action file
    #[arg(long)]
    pub output_id: Option<String>,

    /// Where tiles are planned: local or remote (default from config)
    #[arg(long)]
    pub planning: Option<String>,

    /// Print the merged raster summary as JSON instead of the bare path
    #[arg(long)]
    pub json: bool,

    /// Disable the download progress bar
    #[arg(long)]
    pub no_progress: bool,
}

pub fn run(args: RunArgs) -> Result<(), CliError> {
    let config = load_config()?;
    let planning = resolve_planning(args.planning.as_deref(), &config)?;
    let show_progress = !args.no_progress;
    let json = args.json;
    let action = resolve_action(args)?;
    debug!(operation = %action.operation_name, output_id = %action.output_id, "Action resolved");

    let progress = show_progress.then(tile_progress_bar);
    let mut pipeline = Pipeline::from_config(&config)?;
    if let Some(pb) = &progress {
        pipeline = pipeline.with_progress(progress_callback(pb));
    }
    let executor = Executor::new(pipeline).with_planning(planning);

    let outcome = executor.execute(&action);
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    match outcome {
        ActionOutcome::Completed(merged) if json => {
            let text = serde_json::to_string_pretty(&merged)
                .map_err(|e| CliError::Usage(format!("cannot encode result: {}", e)))?;
            println!("{}", text);
            Ok(())
        }
        ActionOutcome::Completed(merged) => {
            println!("{}", merged.path.display());
            Ok(())
        }
        ActionOutcome::Failed(message) => Err(CliError::Action(message)),
    }
}

/// Builds the descriptor from `--action` or from the individual flags.
fn resolve_action(args: RunArgs) -> Result<ActionDescriptor, CliError> {
    let mut action = match (&args.action, &args.operation) {
        (Some(path), _) => read_action_file(path)?,
        (None, Some(operation)) => {
            let parameters: Map<String, Value> = args.params.into_iter().collect();
            ActionDescriptor::new(operation.clone(), parameters, String::new())
        }
        (None, None) => {
            return Err(CliError::Usage(
                "either --action <file> or --operation is required".to_string(),
            ))
        }
    };

    if let Some(output_id) = args.output_id {
        action.output_id = output_id;
    }
    if action.output_id.is_empty() {
        return Err(CliError::Usage("--output-id is required".to_string()));
    }
    Ok(action)
}

fn read_action_file(path: &PathBuf) -> Result<ActionDescriptor, CliError> {
    let text = fs::read_to_string(path).map_err(|e| CliError::ActionFile {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    ActionDescriptor::from_json(&text).map_err(|e| CliError::ActionFile {
        path: path.clone(),
        reason: e.to_string(),
    })
}
