use std::time::{SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};

use request_shield::security::signature::sign;

#[derive(Parser)]
#[command(name = "shield-cli")]
#[command(about = "Sign and send requests to a request-shield protected API", long_about = None)]
struct Cli {
    /// Shared signing secret.
    #[arg(short, long, env = "API_SECRET_KEY")]
    secret: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print signature headers for a body
    Sign {
        /// Request body, signed byte-for-byte
        body: String,
        /// Unix timestamp in seconds (default: now)
        #[arg(short, long)]
        timestamp: Option<i64>,
    },
    /// POST a signed JSON body and print the response
    Send {
        /// Target URL, e.g. http://localhost:8080/api/init-index
        url: String,
        #[arg(short, long, default_value = "{}")]
        body: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Sign { body, timestamp } => {
            let timestamp = timestamp.unwrap_or(now_secs()?);
            println!("X-Request-Timestamp: {}", timestamp);
            println!("X-Request-Signature: {}", sign(&cli.secret, timestamp, body.as_bytes()));
        }
        Commands::Send { url, body } => {
            let timestamp = now_secs()?;
            let mut headers = HeaderMap::new();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            headers.insert("x-request-timestamp", HeaderValue::from(timestamp));
            headers.insert(
                "x-request-signature",
                HeaderValue::from_str(&sign(&cli.secret, timestamp, body.as_bytes()))?,
            );

            let res = reqwest::Client::new()
                .post(&url)
                .headers(headers)
                .body(body)
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

fn now_secs() -> Result<i64, std::time::SystemTimeError> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as i64)
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    for name in ["retry-after", "x-ratelimit-limit", "x-ratelimit-remaining", "x-ratelimit-reset"] {
        if let Some(value) = res.headers().get(name).and_then(|v| v.to_str().ok()) {
            eprintln!("{}: {}", name, value);
        }
    }

    let text = res.text().await?;
    let pretty = serde_json::from_str::<serde_json::Value>(&text)
        .ok()
        .and_then(|json| serde_json::to_string_pretty(&json).ok())
        .unwrap_or(text);

    if status.is_success() {
        println!("{}", pretty);
    } else {
        eprintln!("Error: {}", status);
        eprintln!("{}", pretty);
    }
    Ok(())
}
