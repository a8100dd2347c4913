use anyhow::{anyhow, Context, Result};
use futures::StreamExt;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use sqlitecloud_service::services::remote::WebliteConnector;
use sqlitecloud_service::{Config, RowStream, SqliteCloudService};

const USAGE: &str = "usage: sqlitecloud-service [--tenant <name>] <sql>";

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .with_ansi(config.logging.style != "never")
        .init();

    let (tenant, sql) = parse_args(std::env::args().skip(1))?;

    let connector = Arc::new(WebliteConnector::new(Duration::from_secs(
        config.remote.request_timeout_secs,
    )));
    let service = SqliteCloudService::new(&config, connector).context("Failed to initialize service")?;

    info!("Executing plain SQL for tenant {:?}", tenant);

    let result = run(&service, tenant.as_deref(), &sql).await;
    service.shutdown().await;

    result.map_err(|e| {
        error!("Execution failed: {:#}", e);
        e
    })
}

async fn run(service: &SqliteCloudService, tenant: Option<&str>, sql: &str) -> Result<()> {
    let session = service.begin(tenant).await?;
    let rows = session.on_plain_sql(sql, Vec::new()).await?;

    let mut stdout = std::io::stdout().lock();
    if let RowStream::Json(mut chunks) = RowStream::from_rows(rows, false, false) {
        while let Some(chunk) = chunks.next().await {
            stdout.write_all(chunk.as_bytes())?;
        }
    }
    writeln!(stdout)?;
    Ok(())
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<(Option<String>, String)> {
    let mut tenant = None;
    let mut sql = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--tenant" | "-t" => {
                tenant = Some(args.next().ok_or_else(|| anyhow!("--tenant needs a value\n{}", USAGE))?);
            }
            "--help" | "-h" => return Err(anyhow!(USAGE)),
            _ => sql.push(arg),
        }
    }

    if sql.is_empty() {
        return Err(anyhow!(USAGE));
    }
    Ok((tenant, sql.join(" ")))
}
