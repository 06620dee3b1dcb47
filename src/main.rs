//! Courier command-line client.
//!
//! Performs one request through a [`Session`] over [`HyperTransport`] and
//! prints the status line, headers and body.
//!
//! ```text
//! courier [--config FILE] [-X METHOD] [-H 'name: value']... [--data BODY] URL
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use courier::config::{load_config, CourierConfig};
use courier::observability::{init_logging, LoggingMonitor};
use courier::transport::ResponseStore;
use courier::{HyperTransport, Session, SessionBuilder};

#[derive(Parser)]
#[command(name = "courier")]
#[command(about = "Send one HTTP request through a courier session", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Request method.
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,

    /// Extra header, `name: value`. Repeatable.
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Request body.
    #[arg(short, long)]
    data: Option<String>,

    url: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => CourierConfig::default(),
    };
    init_logging(&config.observability.log_level);

    tracing::info!(
        label = %config.session.label,
        retries = config.retry.max_retries,
        follow_redirects = config.redirect.follow,
        "courier v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    let store = Arc::new(ResponseStore::with_capacity(config.cache.max_entries));
    let session: Session = SessionBuilder::from_config(Arc::new(HyperTransport::with_store(store)), &config)?
        .monitor(LoggingMonitor)
        .build()?;

    let mut descriptor = session.descriptor(cli.method.as_str(), cli.url.as_str());
    for header in &cli.headers {
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| format!("malformed header `{header}`, expected `name: value`"))?;
        descriptor = descriptor.with_header(name.trim(), value.trim());
    }
    if let Some(data) = cli.data {
        descriptor = descriptor.with_body(data);
    }

    let response = session.request(descriptor).response().await?;

    println!("HTTP {}", response.status());
    for (name, value) in response.headers().iter() {
        println!("{name}: {value}");
    }
    println!();
    println!("{}", String::from_utf8_lossy(&response.value));

    tracing::debug!(
        retries = response.retry_count,
        elapsed_ms = response.elapsed.as_millis() as u64,
        "Request complete"
    );
    Ok(())
}
