//! # Sharelink CLI
//!
//! ## Subcommands
//! - `upload`: send a file to a running gateway and print its signed URL
//! - `issue`: mint a signed URL offline
//! - `verify`: check a signed URL offline
//! - `keygen`: generate a random signing key
//!
//! `issue` and `verify` read the base64 signing key from
//! `SHARELINK_SIGNING_KEY`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use chrono::{TimeDelta, Utc};
use clap::{Parser, Subcommand};
use rand::RngCore;
use sharelink_crypto::{b64, SigningCredential};
use sharelink_gateway::SignedUrlIssuer;
use sharelink_types::Permissions;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the base64 signing key
const SIGNING_KEY_VAR: &str = "SHARELINK_SIGNING_KEY";

#[derive(Parser, Debug)]
#[command(name = "sharelink-cli")]
#[command(about = "Share files through time-limited signed URLs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a file through a running gateway and print its link
    Upload {
        /// Gateway base URL
        #[arg(long)]
        gateway: String,
        /// File to upload
        path: PathBuf,
        /// Object name (defaults to the file name)
        #[arg(long)]
        name: Option<String>,
    },
    /// Mint a signed URL without contacting any server
    Issue {
        /// Storage account identity
        #[arg(long)]
        account: String,
        /// Base endpoint of signed URLs
        #[arg(long)]
        base: String,
        #[arg(long)]
        container: String,
        #[arg(long)]
        name: String,
        /// Permission flags in canonical order (subset of `racwd`)
        #[arg(long, default_value = "r")]
        permissions: String,
        /// Validity window in seconds
        #[arg(long)]
        validity_secs: i64,
    },
    /// Verify a signed URL and print its grant
    Verify {
        #[arg(long)]
        account: String,
        #[arg(long)]
        base: String,
        /// Permissions the grant must include
        #[arg(long, default_value = "r")]
        permissions: String,
        url: String,
    },
    /// Print a random base64 signing key
    Keygen {
        /// Key length in bytes
        #[arg(long, default_value_t = 32)]
        bytes: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Upload {
            gateway,
            path,
            name,
        } => {
            let url = upload(&gateway, &path, name).await?;
            println!("{url}");
        }
        Command::Issue {
            account,
            base,
            container,
            name,
            permissions,
            validity_secs,
        } => {
            let validity = parse_validity(validity_secs)?;
            let issuer = issuer_from_env(&account, &base)?;
            let signed = issuer.issue(
                &container,
                &name,
                parse_permissions(&permissions)?,
                validity,
            )?;
            println!("{}", signed.url);
        }
        Command::Verify {
            account,
            base,
            permissions,
            url,
        } => {
            let issuer = issuer_from_env(&account, &base)?;
            let grant = issuer.verify_url(&url, Utc::now(), parse_permissions(&permissions)?)?;
            println!("{}", serde_json::to_string_pretty(&grant)?);
        }
        Command::Keygen { bytes } => println!("{}", keygen(bytes)?),
    }
    Ok(())
}

fn parse_permissions(flags: &str) -> anyhow::Result<Permissions> {
    Permissions::parse(flags)
        .ok_or_else(|| anyhow!("invalid permissions `{flags}` (use flags from `racwd` in that order)"))
}

fn parse_validity(secs: i64) -> anyhow::Result<TimeDelta> {
    TimeDelta::try_seconds(secs)
        .ok_or_else(|| anyhow!("--validity-secs {secs} is out of range"))
}

fn issuer_from_env(account: &str, base: &str) -> anyhow::Result<SignedUrlIssuer> {
    let key = std::env::var(SIGNING_KEY_VAR)
        .with_context(|| format!("{SIGNING_KEY_VAR} must be set"))?;
    let credential = SigningCredential::from_base64(key.trim())
        .with_context(|| format!("{SIGNING_KEY_VAR} is not a valid signing key"))?;
    Ok(SignedUrlIssuer::new(account, base, Arc::new(credential)))
}

fn keygen(bytes: usize) -> anyhow::Result<String> {
    if bytes < 16 {
        bail!("signing keys shorter than 16 bytes are refused");
    }
    let mut key = vec![0u8; bytes];
    rand::rngs::OsRng.fill_bytes(&mut key);
    Ok(base64::Engine::encode(&b64(), key))
}

/// Posts `path` as the `file` part of the gateway's upload form and returns
/// the signed URL carried by the redirect.
async fn upload(gateway: &str, path: &Path, name: Option<String>) -> anyhow::Result<String> {
    let name = match name {
        Some(name) => name,
        None => path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("cannot derive an object name from {}", path.display()))?,
    };
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;
    let len = file.metadata().await?.len();
    if len == 0 {
        bail!("{} is empty", path.display());
    }

    let part = reqwest::multipart::Part::stream_with_length(file, len).file_name(name.clone());
    let form = reqwest::multipart::Form::new().part("file", part);

    // the link is in the redirect target, so redirects are not followed
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    let endpoint = url::Url::parse(gateway).context("invalid gateway URL")?;
    tracing::info!(name = %name, bytes = len, gateway = %endpoint, "uploading");
    let response = client.post(endpoint.clone()).multipart(form).send().await?;

    let status = response.status();
    if status != reqwest::StatusCode::SEE_OTHER {
        bail!("gateway rejected the upload: HTTP {status}");
    }
    let location = response
        .headers()
        .get(reqwest::header::LOCATION)
        .ok_or_else(|| anyhow!("redirect without Location header"))?
        .to_str()?;
    link_from_location(&endpoint, location)
}

/// Extracts the `url` parameter of a `/link?url=...` redirect target.
fn link_from_location(gateway: &url::Url, location: &str) -> anyhow::Result<String> {
    let target = gateway.join(location).context("invalid redirect target")?;
    target
        .query_pairs()
        .find(|(k, _)| k == "url")
        .map(|(_, v)| v.into_owned())
        .ok_or_else(|| anyhow!("redirect target {target} carries no link"))
}
