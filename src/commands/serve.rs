/// `hotscript serve` command implementation
///
/// Reads one JSON request per line from stdin and writes one JSON response
/// per line to stdout. All requests share a single script service, so a
/// script edited on disk is picked up by the next request that uses it.
///
/// Requests:
///
/// ```text
/// {"id": 1, "service": "billing.Invoice", "method": "total", "input": {...}}
/// {"id": 2, "op": "static", "service": "jobs.Nightly", "method": "run"}
/// {"id": 3, "op": "stats"}
/// ```
///
/// Responses carry the request id and a `status` of `success`, `not_found`
/// or `error`. Responses to concurrent requests may arrive out of order.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use hotscript::logging::{operations, services, status};
use hotscript::runtime::LuaRuntime;
use hotscript::service::{ExecutionReturn, ScriptService};

use crate::cli::ServeArgs;
use crate::commands::{build_service, prepare};

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    op: Option<String>,
    #[serde(default)]
    service: Option<String>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    input: Value,
}

#[derive(Debug, Serialize, PartialEq)]
struct Response {
    id: Value,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Response {
    fn from_outcome(id: Value, outcome: ExecutionReturn) -> Self {
        let status = outcome.status();
        match outcome {
            ExecutionReturn::Success(output) => Self {
                id,
                status,
                output: Some(output),
                kind: None,
                error: None,
            },
            ExecutionReturn::NotFound => Self {
                id,
                status,
                output: None,
                kind: None,
                error: None,
            },
            ExecutionReturn::Error(err) => Self {
                id,
                status,
                output: None,
                kind: Some(err.kind()),
                error: Some(err.to_string()),
            },
        }
    }

    fn bad_request(id: Value, message: impl Into<String>) -> Self {
        Self {
            id,
            status: status::ERROR,
            output: None,
            kind: Some("bad_request"),
            error: Some(message.into()),
        }
    }
}

pub async fn run(args: &ServeArgs) -> Result<()> {
    let config = prepare(&args.common)?;
    let service = Arc::new(build_service(&config)?);
    let limit = Arc::new(Semaphore::new(args.concurrency.max(1)));

    info!(
        service = services::SERVE,
        root = %service.root().display(),
        concurrency = args.concurrency.max(1),
        "serving requests from stdin"
    );

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = rx.recv().await {
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
        Ok::<(), std::io::Error>(())
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tasks = JoinSet::new();
    let mut handled = 0u64;

    while let Some(line) = lines
        .next_line()
        .await
        .context("Failed to read request from stdin")?
    {
        if line.trim().is_empty() {
            continue;
        }
        handled += 1;

        let permit = Arc::clone(&limit)
            .acquire_owned()
            .await
            .context("Request limiter closed")?;
        let service = Arc::clone(&service);
        let tx = tx.clone();

        tasks.spawn_blocking(move || {
            let response = handle_line(&service, &line);
            drop(permit);
            send_response(&tx, &response);
        });

        // Reap finished tasks so the set does not grow with the session
        while tasks.try_join_next().is_some() {}
    }

    while tasks.join_next().await.is_some() {}
    drop(tx);
    writer
        .await
        .context("Response writer task failed")?
        .context("Failed to write response")?;

    info!(
        service = services::SERVE,
        requests = handled,
        "stdin closed, shutting down"
    );
    Ok(())
}

/// Queue a response for the writer task; returns whether it was queued
fn send_response(tx: &mpsc::UnboundedSender<String>, response: &Response) -> bool {
    let encoded = match serde_json::to_string(response) {
        Ok(encoded) => encoded,
        Err(e) => {
            warn!(service = services::SERVE, error = %e, "failed to encode response");
            return false;
        }
    };

    if tx.send(encoded).is_err() {
        warn!(
            service = services::SERVE,
            id = %response.id,
            status = response.status,
            "response writer has stopped, dropping response"
        );
        return false;
    }
    true
}

fn handle_line(service: &ScriptService<LuaRuntime>, line: &str) -> Response {
    let request: Request = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => return Response::bad_request(Value::Null, format!("invalid request: {}", e)),
    };

    debug!(
        service = services::SERVE,
        operation = operations::DISPATCH,
        id = %request.id,
        op = request.op.as_deref().unwrap_or("dispatch"),
        "request received"
    );

    handle_request(service, request)
}

fn handle_request(service: &ScriptService<LuaRuntime>, request: Request) -> Response {
    let id = request.id;

    match request.op.as_deref() {
        Some("stats") => {
            let output = serde_json::json!({
                "stats": service.cache().stats(),
                "entries": service.cache().snapshot(),
            });
            Response {
                id,
                status: status::SUCCESS,
                output: Some(output),
                kind: None,
                error: None,
            }
        }
        None | Some("dispatch") | Some("static") => {
            let (Some(target), Some(method)) = (request.service, request.method) else {
                return Response::bad_request(id, "`service` and `method` are required");
            };

            let outcome = if request.op.as_deref() == Some("static") {
                service.call_static(&target, &method)
            } else {
                service.dispatch(&target, &method, request.input)
            };
            Response::from_outcome(id, outcome)
        }
        Some(other) => Response::bad_request(id, format!("unknown op `{}`", other)),
    }
}
