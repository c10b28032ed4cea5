use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "payments-cli")]
#[command(about = "Management CLI for the resilient payment service", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "PAYMENTS_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check service status and circuit state
    Status,
    /// Show circuit breaker, retry and transaction log metrics
    Health,
    /// List transaction log entries
    Transactions {
        /// Only entries of this transaction
        #[arg(long)]
        id: Option<String>,
    },
    /// Replay recent failed transactions
    Recover,
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

    let base = cli.url.trim_end_matches('/');
    let request = match cli.command {
        Commands::Status => client.get(format!("{base}/admin/status")),
        Commands::Health => client.get(format!("{base}/admin/health")),
        Commands::Transactions { id } => {
            let req = client.get(format!("{base}/admin/transactions"));
            match id {
                Some(id) => req.query(&[("transaction_id", id)]),
                None => req,
            }
        }
        Commands::Recover => client.post(format!("{base}/admin/recover")),
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
