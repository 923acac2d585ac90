//! dpop-client: DPoP key vault and proof issuer
//!
//! Manages the client's DPoP keypair and mints proofs for HTTP requests.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use dpop_client::config::ClientConfig;
use dpop_client::{DPoPError, DPoPSession, KeyVault, ProofIssuer, ProofOptions};

#[derive(Parser)]
#[command(name = "dpop-client")]
#[command(about = "DPoP key vault and proof issuer")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the DPoP keypair if it does not exist yet
    Keygen,

    /// Show the stored keypair
    Status,

    /// Print a DPoP proof for a request
    Proof {
        /// HTTP method
        #[arg(long, default_value = "GET")]
        method: String,

        /// Target URL (query and fragment are ignored)
        #[arg(long)]
        url: String,

        /// Server-provided nonce
        #[arg(long)]
        nonce: Option<String>,

        /// Access token to bind through the ath claim
        #[arg(long)]
        access_token: Option<String>,

        /// Print the decoded header and payload as well
        #[arg(long)]
        decode: bool,
    },

    /// Obtain a DPoP-bound token, then fetch the protected resource
    Login {
        #[arg(long)]
        username: String,

        #[arg(long, env = "DPOP_PASSWORD", hide_env_values = true)]
        password: String,

        /// Token endpoint (defaults to the configured one)
        #[arg(long)]
        token_endpoint: Option<String>,

        /// Protected resource (defaults to the configured one)
        #[arg(long)]
        resource: Option<String>,
    },

    /// Delete the DPoP keypair
    Reset {
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("dpop_client=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::load()?;

    match cli.command {
        Commands::Keygen => run_keygen(&config).await,

        Commands::Status => run_status(&config).await,

        Commands::Proof {
            method,
            url,
            nonce,
            access_token,
            decode,
        } => {
            let options = ProofOptions {
                nonce,
                access_token,
            };
            run_proof(&config, &method, &url, &options, decode).await
        }

        Commands::Login {
            username,
            password,
            token_endpoint,
            resource,
        } => {
            let token_endpoint = token_endpoint.unwrap_or_else(|| config.token_endpoint.clone());
            let resource = resource.unwrap_or_else(|| config.resource_url.clone());
            run_login(&config, &token_endpoint, &resource, &username, &password).await
        }

        Commands::Reset { force } => run_reset(&config, force).await,
    }
}

async fn run_keygen(config: &ClientConfig) -> anyhow::Result<()> {
    let vault = KeyVault::global(config).await?;
    let key_pair = vault.ensure_key_pair().await?;

    match key_pair.thumbprint() {
        Some(thumbprint) => println!("DPoP thumbprint: {}", thumbprint),
        None => println!("DPoP keypair ready"),
    }
    Ok(())
}

async fn run_status(config: &ClientConfig) -> anyhow::Result<()> {
    let vault = KeyVault::global(config).await?;

    println!("Storage: {:?}", config.storage.backend);
    if let Some(dir) = &config.storage.dir {
        println!("  Directory: {}", dir.display());
    }

    match vault.thumbprint().await? {
        Some(thumbprint) => {
            println!("DPoP keypair: stored");
            println!("  Thumbprint: {}", thumbprint);
        }
        None => {
            println!("DPoP keypair: none");
            println!("  Create one with: dpop-client keygen");
        }
    }
    Ok(())
}

async fn run_proof(
    config: &ClientConfig,
    method: &str,
    url: &str,
    options: &ProofOptions,
    decode: bool,
) -> anyhow::Result<()> {
    let vault = KeyVault::global(config).await?;
    let issuer = ProofIssuer::new(vault);

    let proof = match issuer.create_proof_with(method, url, options).await {
        Ok(proof) => proof,
        Err(DPoPError::NoKeyMaterial) => {
            anyhow::bail!("No DPoP keypair stored. Create one with: dpop-client keygen")
        }
        Err(e) => return Err(e.into()),
    };

    println!("{}", proof);
    if decode {
        println!("{}", proof.decode()?);
    }
    Ok(())
}

async fn run_login(
    config: &ClientConfig,
    token_endpoint: &str,
    resource: &str,
    username: &str,
    password: &str,
) -> anyhow::Result<()> {
    let vault = KeyVault::global(config).await?;
    let session = DPoPSession::new(Arc::clone(&vault), &config.http)?;

    info!(%token_endpoint, %username, "Requesting access token");
    let token = session.login(token_endpoint, username, password).await?;

    println!("Login successful");
    println!("  Token type: {}", token.token_type);
    if let Some(expires_in) = token.expires_in {
        println!("  Expires in: {}s", expires_in);
    }
    if let Some(thumbprint) = vault.thumbprint().await? {
        println!("  Bound to DPoP thumbprint: {}", thumbprint);
    }

    let data = session.fetch_protected(resource).await?;
    println!();
    println!("Protected data from {}:", resource);
    println!("{}", serde_json::to_string_pretty(&data)?);

    session.logout().await;
    Ok(())
}

async fn run_reset(config: &ClientConfig, force: bool) -> anyhow::Result<()> {
    if !force {
        println!("This will delete your DPoP keypair.");
        println!("Tokens bound to it will stop working.");
        println!();
        println!("Use --force to confirm.");
        return Ok(());
    }

    let vault = KeyVault::global(config).await?;
    if vault.clear().await? {
        println!("DPoP keypair deleted.");
    } else {
        println!("No DPoP keypair found.");
    }
    Ok(())
}
