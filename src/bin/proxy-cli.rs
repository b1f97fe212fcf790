use axum::http::Uri;
use clap::{Parser, Subcommand};
use serde_json::Value;
use url::Url;

use shinra_proxy::config::ProxyRouteConfig;
use shinra_proxy::routing::{resolve, AddressingMode, ProxyRouter, ProxyUrlEncoder, RouteMatch};
use shinra_proxy::security::TargetPolicy;

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Companion CLI for Shinra Proxy", long_about = None)]
struct Cli {
    /// Origin of the running proxy.
    #[arg(short, long, default_value = "http://localhost:3000")]
    url: String,

    /// Base path the proxy routes live under.
    #[arg(short, long, default_value = "/proxy")]
    base_path: String,

    /// Query parameter used by query mode.
    #[arg(short, long, default_value = "url")]
    query_param: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the proxy status report
    Status,
    /// Fetch the service descriptor
    Info,
    /// Print the proxy URL for a target
    Encode {
        target: String,
        /// query, path or base64
        #[arg(short, long, default_value = "query")]
        mode: AddressingMode,
    },
    /// Print the target a proxy URL or path points at
    Decode { proxy_url: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let origin = cli.url.trim_end_matches('/');
    let routes = ProxyRouteConfig {
        base_path: cli.base_path.clone(),
        query_param: cli.query_param.clone(),
        public_base_url: Some(origin.to_string()),
    };

    match cli.command {
        Commands::Status => {
            let base = cli.base_path.trim_end_matches('/');
            let res = reqwest::get(format!("{origin}{base}/status")).await?;
            print_response(res).await?;
        }
        Commands::Info => {
            let res = reqwest::get(format!("{origin}/")).await?;
            print_response(res).await?;
        }
        Commands::Encode { target, mode } => {
            let target = Url::parse(&target)?;
            println!("{}", ProxyUrlEncoder::from_config(&routes).encode(mode, &target));
        }
        Commands::Decode { proxy_url } => {
            let uri: Uri = proxy_url.parse()?;
            match ProxyRouter::from_config(&routes).match_uri(&uri) {
                RouteMatch::Proxy(target) => {
                    // Decoding only; the server applies its own policy.
                    let resolved = resolve(&target, &TargetPolicy::new(true))?;
                    println!("{} ({} mode)", resolved.url(), resolved.mode());
                }
                other => return Err(format!("not a proxy URL: {other:?}").into()),
            }
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: proxy returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
