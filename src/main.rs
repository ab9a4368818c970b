use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use signet::config::Config;
use signet::context::RequestContext;
use signet::error::Result;
use signet::fingerprint::generate_password;
use signet::keys::{fingerprint_from_key, MasterKey};
use signet::manager::PgpManager;
use signet::pks::{HkpClient, KeyDatabase, PublicKeyStore};
use signet::server::{self, AppState};
use signet::storage;
use signet::tokens::JwtTokenManager;

#[derive(Parser)]
#[command(name = "signet")]
#[command(about = "Remote OpenPGP signing and key-management service")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service (the default)
    Serve,
    /// Generate a passphrase-protected key pair and print the armor
    Generate {
        /// Key identifier, e.g. "Name <email>"
        #[arg(long)]
        identifier: String,
        /// Private key passphrase; generated when omitted
        #[arg(long)]
        password: Option<String>,
        /// RSA key strength
        #[arg(long, default_value_t = 3072)]
        bits: u32,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let result = match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve().await,
        Commands::Generate {
            identifier,
            password,
            bits,
        } => generate(&identifier, password, bits),
    };

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn serve() -> Result<()> {
    let config = Config::from_env()?;

    let backend = storage::make_backend(&config);
    let master = MasterKey::load(&config)?;

    let database = if config.enable_database_sks {
        let db = KeyDatabase::connect(&config.database_url).await?;
        db.backfill_subkeys().await?;
        Some(db)
    } else {
        None
    };
    let external = match &config.sks_server {
        Some(server) => Some(HkpClient::new(server)?),
        None => None,
    };
    let pks = Arc::new(PublicKeyStore::new(database, external));

    let pgp = Arc::new(PgpManager::new(
        backend,
        master,
        Some(pks.clone()),
        config.max_keyring_cache,
        config.keys_base64,
    ));

    // Startup barrier: the full backend scan completes before the listener
    // binds, so no request can observe a half-populated key-ring.
    let ctx = RequestContext::background();
    let loaded = pgp.load_keys(&ctx).await?;
    info!(loaded, "Key records loaded from the backend");

    let mut config = config;
    if config.single_key_mode {
        let fingerprint = load_single_key(&config, &pgp, &ctx).await?;
        info!(fingerprint = %fingerprint, "Single-key mode: agent fingerprint set");
        config.agent_key_fingerprint = fingerprint;
    }

    let addr = config.listen_addr();
    let state = AppState {
        pgp,
        pks,
        tokens: Arc::new(JwtTokenManager::new(config.agent_token_secret.clone())),
        config,
        proxy_client: reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| {
                signet::SignerError::ConfigurationInvalid(format!("proxy client: {e}"))
            })?,
    };

    server::serve(state, &addr).await
}

/// Loads and unlocks the one key the service signs with in single-key mode.
async fn load_single_key(
    config: &Config,
    pgp: &PgpManager,
    ctx: &RequestContext,
) -> Result<String> {
    let path = config.single_key_path.as_ref().ok_or_else(|| {
        signet::SignerError::ConfigurationInvalid("SINGLE_KEY_PATH is not set".into())
    })?;
    info!(path = %path, "Running in single-key mode");

    let armored = std::fs::read_to_string(path)?;
    let count = pgp.load_key(ctx, &armored)?;
    if count == 0 {
        return Err(signet::SignerError::InvalidKeyMaterial(
            "key parsed successfully but no private keys found; check if SINGLE_KEY_PATH points to a private key".into(),
        ));
    }

    let fingerprint = fingerprint_from_key(&armored)?;
    let password = config.single_key_password.clone().unwrap_or_default();
    pgp.unlock_key(ctx, &fingerprint, &password)?;
    Ok(fingerprint)
}

fn generate(identifier: &str, password: Option<String>, bits: u32) -> Result<()> {
    let password = password.unwrap_or_else(|| {
        let generated = generate_password();
        eprintln!("Generated passphrase: {generated}");
        generated
    });

    let manager = PgpManager::new(
        Arc::new(storage::void::VoidBackend),
        None,
        None,
        signet::config::DEFAULT_MAX_KEYRING_CACHE,
        false,
    );
    let ctx = RequestContext::background();
    let armored = manager.generate_key(&ctx, identifier, &password, bits)?;
    println!("{armored}");
    Ok(())
}
