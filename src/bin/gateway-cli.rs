use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Admin CLI for the agent gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Client id sent as `x-client-id`, so admin calls get their own bucket.
    #[arg(long, default_value = "gateway-cli")]
    client_id: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gateway liveness
    Status,
    /// List services with their current health
    Services,
    /// Probe every service now and print the counts
    Summary,
    /// Show a service's capability metadata
    Metadata {
        /// Service id
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let path = match &cli.command {
        Commands::Status => "/healthz".to_string(),
        Commands::Services => "/admin/services".to_string(),
        Commands::Summary => "/admin/summary".to_string(),
        Commands::Metadata { id } => format!("/admin/services/{id}/metadata"),
    };

    let res = client
        .get(format!("{}{}", cli.url.trim_end_matches('/'), path))
        .header("x-client-id", &cli.client_id)
        .send()
        .await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
