use anyhow::Context;
use clap::{Parser, Subcommand};
use reqwest::{Response, StatusCode};
use serde_json::{Value, json};

#[derive(Parser)]
#[command(name = "relay-cli", version, about = "CLI for a running relay-server")]
struct Cli {
    #[arg(long, env = "RELAY_URL", default_value = "http://localhost:8080")]
    server_url: String,

    /// Bearer token, if the server sets RELAY_API_TOKEN
    #[arg(long, env = "RELAY_API_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a link or bare video id on behalf of a requester
    Submit {
        /// Free text containing a YouTube link or 11-char id
        text: String,

        #[arg(long, default_value = "cli")]
        origin: String,
    },

    /// List queued jobs
    Jobs {
        /// Only show jobs in this state (pending, done, failed)
        #[arg(long)]
        status: Option<String>,
    },

    /// Run one drain cycle now
    Drain,

    /// Ping server health endpoint
    Ping,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let base = cli.server_url.trim_end_matches('/').to_string();
    let client = reqwest::Client::new();
    let auth = |req: reqwest::RequestBuilder| match &cli.token {
        Some(token) => req.bearer_auth(token),
        None => req,
    };

    match cli.command {
        Commands::Ping => {
            let url = format!("{}/healthz", base);
            let r = client.get(url).send().await?;
            let text = r.text().await.unwrap_or_default();
            println!("{}", text);
        }

        Commands::Submit { text, origin } => {
            let url = format!("{}/v1/requests", base);
            let r = auth(client.post(url))
                .json(&json!({ "text": text, "origin": origin }))
                .send()
                .await?;

            let r = ensure(r, "submit", |s| {
                s.is_success() || s == StatusCode::UNPROCESSABLE_ENTITY
            })
            .await?;
            let status = r.status();
            let body: Value = r.json().await.context("invalid response body")?;
            println!("{}", body["message"].as_str().unwrap_or_default());
            if status == StatusCode::UNPROCESSABLE_ENTITY {
                std::process::exit(2);
            }
        }

        Commands::Jobs { status } => {
            let mut url = format!("{}/v1/jobs", base);
            if let Some(status) = status {
                url.push_str(&format!("?status={status}"));
            }
            let r = auth(client.get(url)).send().await?;
            let r = ensure(r, "listing jobs", |s| s.is_success()).await?;
            let body: Value = r.json().await?;
            for job in body["jobs"].as_array().into_iter().flatten() {
                println!(
                    "{}\t{}\tattempts={}\torigin={}\t{}",
                    job["id"].as_str().unwrap_or("?"),
                    job["status"].as_str().unwrap_or("?"),
                    job["attempts"],
                    job["origin"].as_str().unwrap_or("?"),
                    job["last_error"].as_str().unwrap_or(""),
                );
            }
        }

        Commands::Drain => {
            let url = format!("{}/v1/admin/drain", base);
            let r = auth(client.post(url)).send().await?;
            let r = ensure(r, "drain", |s| s.is_success()).await?;
            let report: Value = r.json().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

/// Pass `r` through when `accept` likes its status; otherwise fail with the
/// status and the raw body, which may be empty or plain text.
async fn ensure(
    r: Response,
    what: &str,
    accept: impl Fn(StatusCode) -> bool,
) -> anyhow::Result<Response> {
    let status = r.status();
    if accept(status) {
        return Ok(r);
    }
    let body = r.text().await.unwrap_or_default();
    anyhow::bail!("{what} failed: {status} {body}")
}
