mod config;
mod logging;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use studymate_auth::{Authenticator, LoginRequest, refresh_failure};

use crate::config::AppConfig;

/// StudyMate API client
#[derive(Parser)]
#[command(name = "studymate")]
#[command(about = "Command-line client for the StudyMate mentor/mentee API")]
#[command(version)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print effective configuration (JSON, secrets redacted) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration and exit
    Check,
    /// Log in, send one authenticated request and print the response
    Request {
        /// HTTP method, e.g. GET or POST
        method: String,
        /// Path relative to api.base_url, e.g. /mentee/tasks
        path: String,
        /// JSON request body
        #[arg(long)]
        body: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Layered config: defaults -> YAML (if provided) -> env (STUDYMATE__*)
    let config = AppConfig::load(cli.config.as_deref())?;
    logging::init(&config.logging, cli.verbose)?;

    if cli.print_config {
        println!("{}", config.to_pretty_json()?);
        return Ok(());
    }

    match cli.command {
        Commands::Check => check_config(&config),
        Commands::Request { method, path, body } => {
            send_request(&config, &method, &path, body.as_deref()).await
        }
    }
}

fn check_config(config: &AppConfig) -> Result<()> {
    tracing::info!("checking configuration");
    println!("Configuration is valid");
    println!("{}", config.to_pretty_json()?);
    Ok(())
}

async fn send_request(
    config: &AppConfig,
    method: &str,
    path: &str,
    body: Option<&str>,
) -> Result<()> {
    let method = http::Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid HTTP method '{method}'"))?;
    let body = body
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()
        .context("--body is not valid JSON")?;
    let (Some(username), Some(password)) = (&config.login.username, &config.login.password)
    else {
        anyhow::bail!("login.username and login.password are required to send requests");
    };

    let auth = Authenticator::new(&config.auth, config.api.auth_http_config())
        .context("failed to set up authentication")?;
    let role = auth
        .login(&LoginRequest::new(username.clone(), password.clone()))
        .await
        .context("login failed")?;
    tracing::info!(username = %username, role = role.as_str(), "signed in");

    let result = exchange(&auth, config, method, path, body.as_ref()).await;

    if let Err(e) = auth.logout().await {
        tracing::warn!(error = %e, "logout failed");
    }

    let status = result?;
    anyhow::ensure!(
        !status.is_client_error() && !status.is_server_error(),
        "server answered {status}"
    );
    Ok(())
}

/// Send one request on the signed-in session and print the response.
async fn exchange(
    auth: &Authenticator,
    config: &AppConfig,
    method: http::Method,
    path: &str,
    body: Option<&serde_json::Value>,
) -> Result<http::StatusCode> {
    let api = auth
        .api_client(config.api.http_config())
        .context("failed to build API client")?;
    let url = config.api.url(path);
    let mut request = api.request(method, &url);
    if let Some(body) = body {
        request = request.json(body)?;
    }

    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            if let Some(cause) = refresh_failure(&e) {
                anyhow::bail!("session expired and could not be refreshed ({cause}); log in again");
            }
            return Err(e).with_context(|| format!("request to {url} failed"));
        }
    };

    let status = response.status();
    let bytes = response.bytes().await.context("failed to read response body")?;
    println!("{status}");
    if !bytes.is_empty() {
        match serde_json::from_slice::<serde_json::Value>(&bytes) {
            Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
            Err(_) => println!("{}", String::from_utf8_lossy(&bytes)),
        }
    }
    Ok(status)
}
