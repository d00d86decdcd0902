use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT_ENCODING, CONTENT_ENCODING, USER_AGENT};

use ingest_gateway::config::{load_config, GatewayConfig};
use ingest_gateway::http::compression::{gzip_decode, gzip_encode};
use ingest_gateway::security::auth::issue_token;
use ingest_gateway::security::decrypt::{encrypt_payload, load_public_key};
use ingest_gateway::security::integrity::sign;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Client tooling for the ingest gateway", long_about = None)]
struct Cli {
    /// Gateway config; header names, keys and secrets are read from it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a signed session token
    IssueToken {
        #[arg(long)]
        subject: i64,
        #[arg(long, default_value = "")]
        user_agent: String,
        #[arg(long)]
        ip: String,
        /// Overrides session.token_ttl_secs.
        #[arg(long)]
        ttl_secs: Option<u64>,
    },
    /// Sign, gzip and encrypt a body, then POST it
    Send {
        #[arg(short, long, default_value = "http://localhost:8080/")]
        url: String,
        /// Body to send; read from this file.
        #[arg(long)]
        file: Option<PathBuf>,
        /// Inline body, used when no file is given.
        #[arg(long, default_value = "")]
        body: String,
        /// Gateway public key (PEM). Encryption is skipped when absent.
        #[arg(long)]
        public_key: Option<PathBuf>,
        #[arg(long)]
        token: Option<String>,
        #[arg(long, default_value = "gateway-cli")]
        user_agent: String,
        /// Send the body uncompressed.
        #[arg(long)]
        no_gzip: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    match cli.command {
        Commands::IssueToken {
            subject,
            user_agent,
            ip,
            ttl_secs,
        } => {
            let secret = config
                .session
                .secret
                .as_deref()
                .ok_or("session.secret is not configured")?;
            let ttl = Duration::from_secs(ttl_secs.unwrap_or(config.session.token_ttl_secs));
            let token = issue_token(secret.as_bytes(), ttl, subject, &user_agent, &ip)?;
            println!("{}", token);
        }
        Commands::Send {
            url,
            file,
            body,
            public_key,
            token,
            user_agent,
            no_gzip,
        } => {
            let plain = match file {
                Some(path) => std::fs::read(path)?,
                None => body.into_bytes(),
            };

            let mut headers = HeaderMap::new();
            headers.insert(USER_AGENT, HeaderValue::from_str(&user_agent)?);
            headers.insert(ACCEPT_ENCODING, HeaderValue::from_str(&config.compression.token)?);

            if let Some(key) = config.security.hash_key.as_deref().filter(|k| !k.is_empty()) {
                let digest = sign(&plain, key.as_bytes());
                headers.insert(
                    HeaderName::from_bytes(config.headers.digest.as_bytes())?,
                    HeaderValue::from_str(&digest)?,
                );
            }
            if let Some(token) = token {
                headers.insert(
                    HeaderName::from_bytes(config.headers.token.as_bytes())?,
                    HeaderValue::from_str(&token)?,
                );
            }

            let mut payload = plain;
            if !no_gzip {
                payload = gzip_encode(&payload, config.compression.level)?;
                headers.insert(CONTENT_ENCODING, HeaderValue::from_str(&config.compression.token)?);
            }
            if let Some(path) = public_key {
                let key = load_public_key(&path)?;
                payload = encrypt_payload(&key, &payload)?;
            }

            let client = reqwest::Client::new();
            let res = client.post(&url).headers(headers).body(payload).send().await?;
            print_response(res, &config).await?;
        }
    }

    Ok(())
}

async fn print_response(
    res: reqwest::Response,
    config: &GatewayConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    println!("Status: {}", status);
    for name in [
        config.headers.token.as_str(),
        config.headers.digest.as_str(),
        "content-encoding",
        "location",
        "x-request-id",
    ] {
        if let Some(value) = res.headers().get(name) {
            println!("{}: {}", name, value.to_str().unwrap_or("<binary>"));
        }
    }

    let gzipped = res
        .headers()
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case(&config.compression.token));
    let bytes = res.bytes().await?;
    let body = if gzipped {
        gzip_decode(&bytes, config.security.max_body_size)?
    } else {
        bytes.to_vec()
    };

    match serde_json::from_slice::<serde_json::Value>(&body) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", String::from_utf8_lossy(&body)),
    }
    Ok(())
}
