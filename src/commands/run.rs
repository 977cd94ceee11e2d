/// `hotscript run` command implementation
///
/// Constructs a service script with its default constructor and calls one
/// method with a JSON input, printing the JSON result.
use anyhow::{Context, Result};

use hotscript::service::ExecutionReturn;

use crate::cli::RunArgs;
use crate::cli_utils::hotscript_prefix;
use crate::commands::{build_service, prepare};

pub async fn run(args: &RunArgs) -> Result<()> {
    let config = prepare(&args.common)?;
    let service = build_service(&config)?;

    let input: serde_json::Value = serde_json::from_str(&args.input)
        .with_context(|| format!("--input is not valid JSON: {}", args.input))?;

    let service_name = args.service.clone();
    let method = args.method.clone();
    let outcome =
        tokio::task::spawn_blocking(move || service.dispatch(&service_name, &method, input))
            .await
            .context("Script execution task failed")?;

    match outcome {
        ExecutionReturn::Success(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        ExecutionReturn::NotFound => {
            eprintln!(
                "{} No script found for service {}",
                hotscript_prefix(),
                args.service
            );
            anyhow::bail!("Service not found: {}", args.service)
        }
        ExecutionReturn::Error(err) => {
            Err(anyhow::Error::new(err).context(format!("{}.{} failed", args.service, args.method)))
        }
    }
}
