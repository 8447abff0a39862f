use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "resilience-cli")]
#[command(about = "Management CLI for the risk resilience daemon", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "RESILIENCE_ADMIN_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check daemon status
    Status,
    /// Show bulkhead and resource pool statistics
    Bulkheads,
    /// Show fallback strategies and handlers
    Fallbacks,
    /// Show provider connection pool statistics
    Providers,
    /// Probe provider health
    Health,
    /// Enable the fallback handler for a service
    Enable { service: String },
    /// Disable the fallback handler for a service
    Disable { service: String },
}

impl Commands {
    fn route(&self) -> (Method, String) {
        match self {
            Commands::Status => (Method::GET, "/admin/status".to_string()),
            Commands::Bulkheads => (Method::GET, "/admin/bulkheads".to_string()),
            Commands::Fallbacks => (Method::GET, "/admin/fallbacks".to_string()),
            Commands::Providers => (Method::GET, "/admin/providers".to_string()),
            Commands::Health => (Method::GET, "/admin/health".to_string()),
            Commands::Enable { service } => {
                (Method::POST, format!("/admin/fallbacks/{}/enable", service))
            }
            Commands::Disable { service } => {
                (Method::POST, format!("/admin/fallbacks/{}/disable", service))
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let (method, path) = cli.command.route();
    let res = client
        .request(method, format!("{}{}", cli.url.trim_end_matches('/'), path))
        .headers(headers)
        .send()
        .await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    // /admin/health answers 503 with a body when a provider is down.
    if !status.is_success() && status != reqwest::StatusCode::SERVICE_UNAVAILABLE {
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
