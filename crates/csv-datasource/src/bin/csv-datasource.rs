//! CSV data source plugin
//!
//! Launched by the host. Verifies the handshake, prints the address line on
//! stdout and serves queries until the host kills the process. Logs go to
//! stderr.

use std::net::SocketAddr;

use clap::Parser;
use csv_datasource::{BatchPolicy, CsvDatasource, CsvSettings, ParseMode};
use datasource_plugin::PluginServer;

#[derive(Parser)]
#[command(name = "csv-datasource")]
#[command(about = "Time-series data source plugin backed by CSV files")]
struct Args {
    /// Address to listen on; port 0 picks a free port
    #[arg(long, default_value = "127.0.0.1:0")]
    bind: SocketAddr,

    /// Skip rows with a malformed timestamp or value instead of failing the query.
    /// A data source can still override this with "parseMode" in its settings.
    #[arg(long)]
    lenient: bool,

    /// Report a failing query in its own result instead of failing the whole batch
    #[arg(long)]
    isolate_queries: bool,

    /// Keep loaded tables in memory, reloading when the file's mtime changes
    #[arg(long)]
    cache_tables: bool,

    /// Maximum number of cached tables (with --cache-tables)
    #[arg(long, default_value = "16")]
    cache_capacity: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let settings = CsvSettings {
        parse_mode: if args.lenient {
            ParseMode::Lenient
        } else {
            ParseMode::Strict
        },
        batch_policy: if args.isolate_queries {
            BatchPolicy::IsolateQueries
        } else {
            BatchPolicy::AbortBatch
        },
        cache_capacity: args.cache_tables.then_some(args.cache_capacity),
    };
    log::info!(
        "Default parse mode {:?}, batch policy {:?}, table cache {}",
        settings.parse_mode,
        settings.batch_policy,
        settings
            .cache_capacity
            .map_or("off".to_string(), |n| format!("{} entries", n))
    );

    let server = PluginServer::builder()
        .register(CsvDatasource::new(settings))?
        .build();

    tokio::select! {
        result = server.serve(args.bind) => result?,
        _ = tokio::signal::ctrl_c() => log::info!("Interrupted, shutting down"),
    }

    Ok(())
}
