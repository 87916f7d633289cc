use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use url::Url;

use rewrite_proxy::config::CodecConfig;
use rewrite_proxy::target::codec::{decode_direct, encode_direct};
use rewrite_proxy::target::{parse_target, PathCodec, RouteKind};

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Management CLI for the rewriting proxy", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080", env = "REWRITE_PROXY_URL")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a browsing session for a target URL
    Session { target: String },
    /// Print the direct-strategy proxy path for a URL
    Encode {
        target: String,
        /// Encode into the asset route instead of the navigation route
        #[arg(long)]
        asset: bool,
    },
    /// Decode a direct-strategy proxy path back into its target URL
    Decode { path: String },
    /// Render a page through the render collaborator
    Render {
        target: String,
        /// Write the screenshot (PNG) to this file
        #[arg(long)]
        screenshot: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let codec = PathCodec::new(&CodecConfig::default());

    match cli.command {
        Commands::Session { target } => {
            let res = client
                .post(format!("{}/api/create-session", cli.url))
                .json(&json!({ "url": target }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Encode { target, asset } => {
            let target = parse_target(&target)?;
            let kind = if asset { RouteKind::Asset } else { RouteKind::Navigation };
            println!("{}{}", codec.prefix(kind), encode_direct(&target));
        }
        Commands::Decode { path } => {
            let path = match Url::parse(&path) {
                Ok(url) => url.path().to_string(),
                Err(_) => path,
            };
            let rest = codec
                .split_path(&path)
                .map(|(_, rest)| rest)
                .unwrap_or(path.as_str());
            println!("{}", decode_direct(rest)?);
        }
        Commands::Render { target, screenshot } => {
            let res = client
                .post(format!("{}/api/render", cli.url))
                .json(&json!({ "url": target, "screenshot": screenshot.is_some() }))
                .send()
                .await?;
            let status = res.status();
            if !status.is_success() {
                return report_failure(status, res).await;
            }

            let mut page: Value = res.json().await?;
            if let (Some(path), Some(encoded)) = (&screenshot, page["screenshot"].as_str()) {
                std::fs::write(path, STANDARD.decode(encoded)?)?;
                eprintln!("Screenshot written to {}", path.display());
            }
            if let Some(obj) = page.as_object_mut() {
                obj.remove("screenshot");
                obj.remove("html");
            }
            println!("{}", serde_json::to_string_pretty(&page)?);
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        return report_failure(status, res).await;
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

async fn report_failure(
    status: reqwest::StatusCode,
    res: reqwest::Response,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("Error: proxy returned status {}", status);
    if let Ok(text) = res.text().await {
        eprintln!("Response: {}", text);
    }
    Ok(())
}
