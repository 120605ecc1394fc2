//! SealPass CLI - Command line interface for the password vault.
//!
//! Each invocation opens the store in the data directory, resumes a
//! persisted session when one is still valid, runs one command and pushes
//! the resulting changes to the sync service when signed in.

mod config;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use zeroize::Zeroizing;

use config::{AppConfig, CONFIG_FILE, STORE_FILE};
use sealpass_common::{Error, RecordId};
use sealpass_crypto::{generate_memorable, generate_password, generate_pin, GeneratorOptions};
use sealpass_storage::{FileStore, KvStore};
use sealpass_sync::{
    AuthState, HttpRemoteVault, RemoteVault, RetryConfig, SyncConfig, SyncWorker,
};
use sealpass_vault::{
    CredentialDraft, CredentialPatch, CredentialRecord, SyncEvent, SyncOutbox, VaultService,
    VaultStatus,
};

#[derive(Parser)]
#[command(name = "sealpass")]
#[command(about = "SealPass - Zero-knowledge password vault")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Directory holding the store and configuration.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new vault protected by a master password.
    Init,

    /// Unlock the vault with the master password.
    Unlock,

    /// Lock the vault and forget the persisted session.
    Lock,

    /// Show vault and sync status.
    Status,

    /// List saved credentials.
    List {
        /// Only show credentials for this domain.
        #[arg(short, long)]
        domain: Option<String>,
    },

    /// Save a new credential.
    Add {
        #[arg(short, long)]
        domain: String,

        #[arg(short, long)]
        username: String,

        /// Generate a random password instead of prompting.
        #[arg(short, long)]
        generate: bool,

        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Change fields of a saved credential.
    Update {
        id: RecordId,

        #[arg(short, long)]
        domain: Option<String>,

        #[arg(short, long)]
        username: Option<String>,

        /// Prompt for a new password.
        #[arg(short, long)]
        password: bool,

        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Delete a saved credential.
    Remove { id: RecordId },

    /// Print a credential including its password.
    Show { id: RecordId },

    /// Change the master password and re-encrypt every credential.
    ChangePassword,

    /// Generate a password without saving it.
    Generate(GenerateArgs),

    /// Sign in to the sync service.
    Login {
        /// Bearer token issued by the sync service.
        #[arg(long)]
        token: String,

        /// Base URL of the sync API.
        #[arg(long)]
        api_url: Option<String>,
    },

    /// Lock the vault and sign out of the sync service.
    Logout,

    /// Replace local credentials with the copy held by the sync service.
    Pull,
}

#[derive(Args)]
struct GenerateArgs {
    #[arg(short, long, default_value_t = 20)]
    length: usize,

    #[arg(long)]
    no_uppercase: bool,

    #[arg(long)]
    no_lowercase: bool,

    #[arg(long)]
    no_numbers: bool,

    #[arg(long)]
    no_symbols: bool,

    /// Leave out look-alike characters.
    #[arg(long)]
    exclude_ambiguous: bool,

    /// Generate a passphrase of this many words instead.
    #[arg(long, conflicts_with = "pin")]
    memorable: Option<usize>,

    /// Generate a numeric PIN of this many digits instead.
    #[arg(long)]
    pin: Option<usize>,
}

/// Opened store and vault for one invocation.
struct App {
    store: Arc<FileStore>,
    config: AppConfig,
    config_path: PathBuf,
    service: VaultService,
    events: UnboundedReceiver<SyncEvent>,
}

impl App {
    async fn open(data_dir: PathBuf) -> Result<Self> {
        let config_path = data_dir.join(CONFIG_FILE);
        let config = AppConfig::load(&config_path)?;

        let store = Arc::new(
            FileStore::open(data_dir.join(STORE_FILE))
                .await
                .context("Failed to open vault store")?,
        );

        let (outbox, events) = SyncOutbox::channel();
        let service = VaultService::with_outbox(store.clone(), config.vault.clone(), outbox)
            .context("Failed to start vault")?;

        Ok(Self {
            store,
            config,
            config_path,
            service,
            events,
        })
    }

    /// Resume the persisted session, or prompt for the master password.
    async fn ensure_unlocked(&self) -> Result<()> {
        match self.service.status().await? {
            VaultStatus::Unlocked => return Ok(()),
            VaultStatus::NoVault => bail!("No vault found. Run `sealpass init` first"),
            VaultStatus::Locked => {}
        }

        if self.service.hydrate().await? {
            return Ok(());
        }

        let password = prompt_password("Master password: ")?;
        self.service
            .unlock_vault(&password)
            .await
            .map_err(describe)
            .context("Failed to unlock vault")
    }

    /// Push queued changes to the sync service when signed in.
    async fn finish(self) -> Result<()> {
        let App {
            store,
            config,
            service,
            events,
            ..
        } = self;
        // Closes the outbox so the worker sees the end of the queue.
        drop(service);

        if events.is_empty() {
            return Ok(());
        }
        let Some((remote, retry)) = sync_remote(store.as_ref(), &config).await? else {
            return Ok(());
        };

        let stats = SyncWorker::new(remote, store, retry).run(events).await;
        if stats.failed > 0 || stats.skipped > 0 {
            warn!(
                failed = stats.failed,
                skipped = stats.skipped,
                "Some changes were not synced"
            );
        }
        Ok(())
    }
}

/// Client for the sync service, when one is configured and signed in.
async fn sync_remote(
    store: &FileStore,
    config: &AppConfig,
) -> Result<Option<(Arc<HttpRemoteVault>, RetryConfig)>> {
    let Some(sync) = &config.sync else {
        return Ok(None);
    };
    let Some(auth) = AuthState::load(store).await? else {
        return Ok(None);
    };
    let Some(token) = auth.bearer_token() else {
        return Ok(None);
    };

    let remote = HttpRemoteVault::new(&sync.api_base_url, token)?;
    Ok(Some((Arc::new(remote), sync.retry.clone())))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Commands::Generate(args) = &cli.command {
        return cmd_generate(args);
    }

    let app = App::open(config::data_dir(cli.data_dir)?).await?;

    match cli.command {
        Commands::Init => cmd_init(&app).await?,
        Commands::Unlock => cmd_unlock(&app).await?,
        Commands::Lock => cmd_lock(&app).await?,
        Commands::Status => cmd_status(&app).await?,
        Commands::List { domain } => cmd_list(&app, domain.as_deref()).await?,
        Commands::Add {
            domain,
            username,
            generate,
            notes,
        } => cmd_add(&app, domain, username, generate, notes).await?,
        Commands::Update {
            id,
            domain,
            username,
            password,
            notes,
        } => {
            let mut patch = CredentialPatch {
                domain,
                username,
                notes,
                ..Default::default()
            };
            if password {
                patch.password = Some(prompt_new_password("New password: ")?);
            }
            cmd_update(&app, id, patch).await?
        }
        Commands::Remove { id } => cmd_remove(&app, id).await?,
        Commands::Show { id } => cmd_show(&app, id).await?,
        Commands::ChangePassword => cmd_change_password(&app).await?,
        Commands::Login { token, api_url } => cmd_login(&app, token, api_url).await?,
        Commands::Logout => cmd_logout(&app).await?,
        Commands::Pull => cmd_pull(&app).await?,
        // Handled above without touching the store.
        Commands::Generate(_) => {}
    }

    app.finish().await
}

/// Prompt for password securely.
fn prompt_password(prompt: &str) -> Result<Zeroizing<String>> {
    let password = rpassword::prompt_password(prompt).context("Failed to read password")?;
    Ok(Zeroizing::new(password))
}

/// Prompt twice and require both entries to match.
fn prompt_new_password(prompt: &str) -> Result<Zeroizing<String>> {
    let password = prompt_password(prompt)?;
    let confirm = prompt_password("Confirm: ")?;

    if password != confirm {
        bail!("Passwords do not match");
    }
    if password.is_empty() {
        bail!("Password cannot be empty");
    }
    Ok(password)
}

/// Turn vault errors into messages fit for the terminal.
fn describe(err: Error) -> anyhow::Error {
    match err {
        Error::InvalidMasterPassword => anyhow::anyhow!("Wrong master password"),
        Error::VaultLocked => anyhow::anyhow!("Vault is locked. Run `sealpass unlock`"),
        other => other.into(),
    }
}

fn print_record(record: &CredentialRecord) {
    println!(
        "{}  {:<30} {:<24} {}",
        record.id,
        record.domain,
        record.username,
        record.updated_at.format("%Y-%m-%d %H:%M")
    );
}

/// Create a new vault.
async fn cmd_init(app: &App) -> Result<()> {
    if app.service.status().await? != VaultStatus::NoVault {
        bail!("A vault already exists in this data directory");
    }

    let password = prompt_new_password("New master password: ")?;
    app.service
        .initialize_vault(&password)
        .await
        .context("Failed to create vault")?;

    if let Some(mut auth) = AuthState::load(app.store.as_ref()).await? {
        auth.has_master_password = true;
        auth.save(app.store.as_ref()).await?;
    }

    println!("Vault created and unlocked.");
    Ok(())
}

async fn cmd_unlock(app: &App) -> Result<()> {
    app.ensure_unlocked().await?;

    let vault = &app.config.vault;
    if vault.persist_session_key {
        println!(
            "Vault unlocked for up to {} days.",
            vault.wrapped_key_ttl().num_days()
        );
    } else {
        println!("Vault unlocked.");
    }
    Ok(())
}

async fn cmd_lock(app: &App) -> Result<()> {
    app.service.lock_vault().await.context("Failed to lock vault")?;
    println!("Vault locked.");
    Ok(())
}

async fn cmd_status(app: &App) -> Result<()> {
    let mut status = app.service.status().await?;
    if status == VaultStatus::Locked && app.service.hydrate().await? {
        status = VaultStatus::Unlocked;
    }
    println!("Vault: {}", status);

    match AuthState::load(app.store.as_ref()).await? {
        Some(auth) if auth.bearer_token().is_some() => {
            let who = auth
                .user
                .as_ref()
                .map(|u| u.email.as_str())
                .unwrap_or("token");
            println!("Sync: signed in ({})", who);
        }
        _ => println!("Sync: signed out"),
    }
    Ok(())
}

async fn cmd_list(app: &App, domain: Option<&str>) -> Result<()> {
    app.ensure_unlocked().await?;

    let records = match domain {
        Some(domain) => app.service.credentials_for_domain(domain).await,
        None => app.service.get_credentials().await,
    }
    .map_err(describe)?;

    if records.is_empty() {
        println!("No credentials saved.");
    } else {
        for record in &records {
            print_record(record);
        }
    }
    Ok(())
}

async fn cmd_add(
    app: &App,
    domain: String,
    username: String,
    generate: bool,
    notes: Option<String>,
) -> Result<()> {
    app.ensure_unlocked().await?;

    let password = if generate {
        generate_password(&GeneratorOptions::default())
    } else {
        prompt_new_password("Password: ")?
    };

    let mut draft = CredentialDraft::new(domain, username, password.as_str());
    draft.notes = notes;
    let record = app
        .service
        .add_credential(draft)
        .await
        .map_err(describe)
        .context("Failed to save credential")?;

    info!(id = %record.id, "Credential saved");
    print_record(&record);
    if generate {
        println!("Generated password: {}", password.as_str());
    }
    Ok(())
}

async fn cmd_update(app: &App, id: RecordId, patch: CredentialPatch) -> Result<()> {
    if patch.is_empty() {
        bail!("Nothing to update");
    }
    app.ensure_unlocked().await?;

    let record = app
        .service
        .update_credential(id, patch)
        .await
        .map_err(describe)
        .context("Failed to update credential")?;
    print_record(&record);
    Ok(())
}

async fn cmd_remove(app: &App, id: RecordId) -> Result<()> {
    app.ensure_unlocked().await?;

    if app.service.delete_credential(id).await.map_err(describe)? {
        println!("Credential removed: {}", id);
    } else {
        println!("No credential with id {}", id);
    }
    Ok(())
}

async fn cmd_show(app: &App, id: RecordId) -> Result<()> {
    app.ensure_unlocked().await?;

    let record = app
        .service
        .get_credentials()
        .await
        .map_err(describe)?
        .into_iter()
        .find(|r| r.id == id)
        .with_context(|| format!("No credential with id {}", id))?;
    let password = app
        .service
        .get_decrypted_password(id)
        .await
        .map_err(describe)
        .context("Failed to decrypt password")?;

    println!("Domain:   {}", record.domain);
    println!("Username: {}", record.username);
    println!("Password: {}", password.as_str());
    if let Some(notes) = &record.notes {
        println!("Notes:    {}", notes);
    }
    println!("Created:  {}", record.created_at.format("%Y-%m-%d %H:%M"));
    println!("Updated:  {}", record.updated_at.format("%Y-%m-%d %H:%M"));
    Ok(())
}

/// Change the master password.
async fn cmd_change_password(app: &App) -> Result<()> {
    if app.service.status().await? == VaultStatus::NoVault {
        bail!("No vault found. Run `sealpass init` first");
    }

    let old_password = prompt_password("Current master password: ")?;
    let new_password = prompt_new_password("New master password: ")?;

    app.service
        .change_master_password(&old_password, &new_password)
        .await
        .map_err(describe)
        .context("Failed to change master password")?;

    println!("Master password changed.");
    Ok(())
}

fn cmd_generate(args: &GenerateArgs) -> Result<()> {
    let password = if let Some(words) = args.memorable {
        generate_memorable(words)
    } else if let Some(digits) = args.pin {
        generate_pin(digits)
    } else {
        if args.length == 0 {
            bail!("Length must be greater than zero");
        }
        generate_password(&GeneratorOptions {
            length: args.length,
            uppercase: !args.no_uppercase,
            lowercase: !args.no_lowercase,
            numbers: !args.no_numbers,
            symbols: !args.no_symbols,
            exclude_ambiguous: args.exclude_ambiguous,
        })
    };

    println!("{}", password.as_str());
    Ok(())
}

async fn cmd_login(app: &App, token: String, api_url: Option<String>) -> Result<()> {
    let mut config = app.config.clone();
    let sync = config.sync.get_or_insert_with(SyncConfig::default);
    if let Some(url) = api_url {
        sync.api_base_url = url;
    }
    let api_base_url = sync.api_base_url.clone();
    let remote = HttpRemoteVault::new(&api_base_url, token.as_str())?;
    config.save(&app.config_path)?;

    let has_master_password = app.service.status().await? != VaultStatus::NoVault;
    AuthState::with_token(token, has_master_password)
        .save(app.store.as_ref())
        .await
        .context("Failed to save sign-in")?;
    println!("Signed in to {}", api_base_url);

    // Another device may have rotated the master password.
    let local_salt = app.service.session().salts().load().await?;
    match remote.get_salt().await {
        Ok(Some(remote_salt)) => {
            if local_salt.map(|s| s.to_base64()).as_deref() != Some(remote_salt.as_str()) {
                warn!("Remote vault uses a different master salt than this device");
            }
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Could not compare master salt with the sync service"),
    }
    Ok(())
}

async fn cmd_logout(app: &App) -> Result<()> {
    app.service.logout().await.context("Failed to sign out")?;
    if let Err(e) = app.store.remove(sealpass_storage::keys::REMOTE_IDS).await {
        warn!(error = %e, "Failed to clear remote id index");
    }
    println!("Signed out and locked.");
    Ok(())
}

async fn cmd_pull(app: &App) -> Result<()> {
    let Some((remote, retry)) = sync_remote(app.store.as_ref(), &app.config).await? else {
        bail!("Not signed in. Run `sealpass login` first");
    };
    app.ensure_unlocked().await?;

    let count = SyncWorker::new(remote, app.store.clone(), retry)
        .pull(&app.service)
        .await
        .map_err(describe)
        .context("Failed to pull from the sync service")?;
    println!("Pulled {} credential(s).", count);
    Ok(())
}
