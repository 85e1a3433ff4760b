//! offcache agent entry point.
//!
//! Boots the agent on a line-delimited JSON protocol: one command per line
//! on stdin, one result per line on stdout. Logging goes to stderr to
//! avoid interfering with the protocol stream.

use std::sync::Arc;

use anyhow::Result;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tracing_subscriber::EnvFilter;

use offcache_agent::{Agent, Decision, HttpNetwork, InterceptRequest};
use offcache_core::{AppConfig, CacheStore, Error};

/// Commands the hosting process can issue over stdin.
#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "kebab-case")]
enum HostCommand {
    Install,
    Activate,
    Fetch {
        #[serde(flatten)]
        request: InterceptRequest,
    },
    Message { data: Value },
    Status,
    Shutdown,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(version = %config.cache_name, origin = %config.origin, "starting offcache agent on stdio");

    let store = CacheStore::open(&config.db_path).await?;
    let network = Arc::new(HttpNetwork::new(&config)?);
    let mut agent = Agent::new(store.clone(), network, config.clone())?;

    // The stdio host counts as one controllable view.
    agent.clients().register();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (reply, stop) = match serde_json::from_str::<HostCommand>(line) {
            Ok(cmd) => {
                let stop = matches!(cmd, HostCommand::Shutdown);
                (dispatch(&mut agent, &store, &config, cmd).await, stop)
            }
            Err(e) => (json!({ "ok": false, "error": format!("INVALID_INPUT: {e}") }), false),
        };

        write_line(&mut stdout, &reply).await?;
        if stop {
            break;
        }
    }

    agent.interceptor().flush_writes().await;
    Ok(())
}

async fn dispatch(agent: &mut Agent, store: &CacheStore, config: &AppConfig, cmd: HostCommand) -> Value {
    match cmd {
        HostCommand::Install => lifecycle_reply(agent.install().await, agent),
        HostCommand::Activate => lifecycle_reply(agent.activate().await, agent),
        HostCommand::Message { data } => lifecycle_reply(agent.handle_message(&data).await, agent),
        HostCommand::Fetch { request } => fetch_reply(agent.fetch(&request).await),
        HostCommand::Status => status_reply(agent, store, config).await,
        HostCommand::Shutdown => json!({ "ok": true }),
    }
}

fn lifecycle_reply(result: Result<(), Error>, agent: &Agent) -> Value {
    match result {
        Ok(()) => json!({ "ok": true, "state": agent.state() }),
        Err(e) => json!({ "ok": false, "error": e.to_string(), "state": agent.state() }),
    }
}

fn fetch_reply(decision: Decision) -> Value {
    match decision {
        Decision::PassThrough => json!({ "ok": true, "disposition": "pass-through" }),
        Decision::Respond(resp) => json!({
            "ok": true,
            "disposition": "respond",
            "status": resp.status,
            "status_text": resp.status_text,
            "source": resp.source,
            "headers": resp.headers,
            "body": String::from_utf8_lossy(&resp.body),
        }),
    }
}

async fn status_reply(agent: &Agent, store: &CacheStore, config: &AppConfig) -> Value {
    let entries = store.entry_count(&config.cache_name).await.unwrap_or(0);
    json!({
        "ok": true,
        "state": agent.state(),
        "version": config.cache_name,
        "entries": entries,
        "clients": agent.clients().client_count(),
        "controlled": agent.clients().controlled_count(),
    })
}

async fn write_line(stdout: &mut Stdout, value: &Value) -> Result<()> {
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    stdout.write_all(&line).await?;
    stdout.flush().await?;
    Ok(())
}
