//! OpsPulse CLI
//!
//! Operator tool for the realtime server:
//! - Mint test tokens for the WebSocket handshake
//! - Generate a default config file
//! - Inspect live sessions
//! - Send operator notices

use clap::{Parser, Subcommand};
use opspulse::auth::TokenVerifier;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "opspulse-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Operator tool for the OpsPulse realtime server")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// API server URL
    #[arg(long, default_value = "http://localhost:8082", global = true)]
    pub api_url: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Mint an HS256 token for connecting to the WebSocket endpoint
    Token {
        /// Identity (the `sub` claim)
        #[arg(long)]
        sub: String,
        /// Role claim
        #[arg(long, default_value = "user")]
        role: String,
        /// Lifetime in seconds
        #[arg(long, default_value = "3600")]
        ttl_secs: i64,
        /// Signing secret (default: OPSPULSE_JWT_SECRET)
        #[arg(long)]
        secret: Option<String>,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show live session statistics
    Stats,

    /// Send a notice to connected dashboards (requires an admin token)
    Notify {
        /// Notice text
        message: String,
        /// Restrict to one company scope
        #[arg(short, long)]
        company: Option<String>,
        /// Admin bearer token
        #[arg(short, long)]
        token: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Token {
            sub,
            role,
            ttl_secs,
            secret,
        } => {
            let secret = match secret.or_else(|| std::env::var("OPSPULSE_JWT_SECRET").ok()) {
                Some(secret) if !secret.is_empty() => secret,
                _ => {
                    eprintln!("No signing secret: pass --secret or set OPSPULSE_JWT_SECRET");
                    std::process::exit(1);
                }
            };

            let token = TokenVerifier::new(&secret).issue(&sub, &role, ttl_secs)?;
            println!("{}", token);
        }

        Commands::Config { output } => {
            let config = opspulse::config::generate_default_config();

            match output {
                Some(path) => {
                    // Create parent directory if needed
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", config);
                }
            }
        }

        Commands::Stats => {
            let response = client
                .get(format!("{}/api/v1/realtime/stats", cli.api_url))
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    let stats: serde_json::Value = resp.json().await?;

                    println!("OpsPulse v{}", env!("CARGO_PKG_VERSION"));
                    println!();
                    println!("Sessions:    {}", stats["sessions"].as_u64().unwrap_or(0));
                    println!("Topics:      {}", stats["topics"].as_u64().unwrap_or(0));
                    println!("Active jobs: {}", stats["activeJobs"].as_u64().unwrap_or(0));

                    if let Some(companies) = stats["companies"].as_object() {
                        if !companies.is_empty() {
                            println!();
                            println!("{:<30} {}", "Company", "Sessions");
                            println!("{}", "-".repeat(40));
                            for (company, count) in companies {
                                println!("{:<30} {}", company, count.as_u64().unwrap_or(0));
                            }
                        }
                    }
                }
                Ok(resp) => {
                    eprintln!("API returned error: {}", resp.status());
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("Cannot connect to OpsPulse API at {}", cli.api_url);
                    eprintln!("Error: {}", e);
                    eprintln!();
                    eprintln!("Make sure the OpsPulse server is running:");
                    eprintln!("  cargo run --bin opspulse");
                    std::process::exit(1);
                }
            }
        }

        Commands::Notify {
            message,
            company,
            token,
        } => {
            let response = client
                .post(format!("{}/api/v1/realtime/notify", cli.api_url))
                .bearer_auth(token)
                .json(&serde_json::json!({
                    "company": company,
                    "message": message,
                }))
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let body: serde_json::Value = response.json().await.unwrap_or_default();
                eprintln!(
                    "Notice rejected ({}): {}",
                    status,
                    body["error"]["message"].as_str().unwrap_or("unknown error")
                );
                std::process::exit(1);
            }

            let result: serde_json::Value = response.json().await?;
            println!(
                "Delivered to {} session(s)",
                result["delivered"].as_u64().unwrap_or(0)
            );
        }
    }

    Ok(())
}
