use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use inventory_common::Config;
use inventory_graph::query::{compile, filter_map_from_json};
use inventory_graph::{inventory_schema, DgraphClient, EntryReader};

#[derive(Parser)]
#[command(name = "inventory-query", about = "Compile a media inventory filter map into DQL")]
struct Cli {
    /// JSON filter map; read from stdin when omitted
    file: Option<PathBuf>,

    /// Run the query against DGRAPH_ENDPOINT and print the response
    #[arg(long)]
    execute: bool,

    /// Include entries that are not accepted yet
    #[arg(long)]
    private: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("inventory=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let raw = match &cli.file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read filter map from stdin")?;
            buf
        }
    };
    let json: serde_json::Value =
        serde_json::from_str(&raw).context("Filter map is not valid JSON")?;
    let filters = filter_map_from_json(&json);

    let config = Config::from_env()?;
    let public = config.public_queries && !cli.private;
    let schema = Arc::new(inventory_schema()?);

    let Some(compiled) = compile(&schema, &filters, public) else {
        info!(keys = filters.len(), "No usable restriction in filter map, nothing to compile");
        return Ok(());
    };

    println!("{}", compiled.text);
    println!("{}", serde_json::to_string_pretty(&compiled.variables)?);

    if cli.execute {
        config.log_redacted();
        let client = Arc::new(DgraphClient::new(&config)?);
        let reader = EntryReader::new(client, schema);
        let data = reader.run_filter(&compiled).await?;

        let total = data["total"][0]["count"].as_u64().unwrap_or(0);
        info!(
            total,
            page = compiled.page,
            page_size = compiled.page_size,
            "Query executed"
        );
        println!("{}", serde_json::to_string_pretty(&data)?);
    }

    Ok(())
}
