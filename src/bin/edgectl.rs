use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

use edge_router::config::load_config;
use edge_router::mock::build_app;

#[derive(Parser)]
#[command(name = "edgectl")]
#[command(about = "Management CLI for the edge router", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show server status and the active routing strategy
    Status,
    /// List the live route table
    Routes,
    /// Validate a config file and report the strategy it would select
    Check {
        /// Path to the TOML config
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let path = match cli.command {
        Commands::Status => "/admin/status",
        Commands::Routes => "/admin/routes",
        Commands::Check { config } => return check(&config),
    };

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", cli.key))?);

    let res = reqwest::Client::new()
        .get(format!("{}{}", cli.url.trim_end_matches('/'), path))
        .headers(headers)
        .send()
        .await?;
    print_response(res).await
}

fn check(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(path)?;
    let app = build_app(&config)?;
    println!("config ok: {} routes, strategy {}", app.routes().len(), app.strategy());
    for route in app.routes() {
        println!("  {:<7} {}", route.method, route.path);
    }
    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
