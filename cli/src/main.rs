use std::io::Read;

use clap::{Parser, Subcommand};
use serde_json::json;

mod util;

use util::{api_request, exit_error};

#[derive(Parser, Debug)]
#[command(name = "tonegate", version, about = "Tonegate CLI: rewrite, triage, and send-check messages")]
struct Cli {
    /// API base URL
    #[arg(long, env = "TONEGATE_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    /// Session token; omit to call anonymously
    #[arg(long, env = "TONEGATE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Print status and quota headers alongside the body
    #[arg(long, short = 'i')]
    include: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check API health and list supported modes
    Health,
    /// Run a message through a mode
    Run {
        /// rewrite, urgent, or send_check
        #[arg(long, default_value = "rewrite")]
        mode: String,
        /// Message text; read from stdin when omitted
        #[arg(long)]
        input: Option<String>,
    },
    /// Show plan, limits, and remaining quota (requires --token)
    Me,
    /// Start a Pro checkout and print the checkout URL (requires --token)
    Checkout,
}

fn read_stdin() -> String {
    let mut buf = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut buf) {
        exit_error(&format!("Failed to read stdin: {e}"), None);
    }
    buf
}

fn require_token(token: Option<&str>, command: &str) -> String {
    token.map(str::to_string).unwrap_or_else(|| {
        exit_error(
            &format!("`{command}` requires a session token"),
            Some("Set --token or TONEGATE_TOKEN"),
        )
    })
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let token = cli.token.as_deref();

    let code = match cli.command {
        Commands::Health => {
            api_request(&cli.api_url, reqwest::Method::GET, "/health", None, None, cli.include).await
        }
        Commands::Run { mode, input } => {
            let input = input.unwrap_or_else(read_stdin);
            api_request(
                &cli.api_url,
                reqwest::Method::POST,
                "/v1/run",
                token,
                Some(json!({ "input": input, "mode": mode })),
                cli.include,
            )
            .await
        }
        Commands::Me => {
            let token = require_token(token, "me");
            api_request(&cli.api_url, reqwest::Method::GET, "/v1/me", Some(&token), None, cli.include)
                .await
        }
        Commands::Checkout => {
            let token = require_token(token, "checkout");
            api_request(
                &cli.api_url,
                reqwest::Method::POST,
                "/v1/billing/checkout",
                Some(&token),
                None,
                cli.include,
            )
            .await
        }
    };

    std::process::exit(code);
}
