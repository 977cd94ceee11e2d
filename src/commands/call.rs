/// `hotscript call` command implementation
///
/// Calls a module function of a script file directly, without constructing
/// an instance.
use anyhow::{Context, Result};

use crate::cli::CallArgs;
use crate::cli_utils::parse_json_arg;
use crate::commands::{build_service, prepare};

pub async fn run(args: &CallArgs) -> Result<()> {
    let config = prepare(&args.common)?;
    let service = build_service(&config)?;

    let path = service.script_file(&args.script);
    let function = args.function.clone();
    let call_args: Vec<serde_json::Value> = args.args.iter().map(|a| parse_json_arg(a)).collect();

    let output = tokio::task::spawn_blocking(move || {
        service.run_path(&path, &function, None, &call_args)
    })
    .await
    .context("Script execution task failed")?
    .with_context(|| format!("Failed to call {} in {}", args.function, args.script))?;

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
