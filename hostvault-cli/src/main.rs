use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use hostvault_core::sync::auth::generate_device_seed;
use hostvault_core::{
    ensure_data_dir, get_default_catalog_path, Database, HttpGateway, NewProfile, ProfileCatalog,
    ProfileEdit, SessionProfile, SessionStore, SyncEngine, SyncOutcome, SyncSettings,
};
use rpassword::prompt_password;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

/// hostvault - encrypted SSH session profiles with offline sync
#[derive(Parser)]
#[command(name = "hostvault")]
#[command(about = "Encrypted SSH session profiles with offline sync", long_about = None)]
struct Cli {
    /// Path to the catalog database (defaults to the platform data dir)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a new session profile
    Add {
        #[arg(long)]
        name: String,

        #[arg(long)]
        host: String,

        #[arg(long, default_value_t = 22)]
        port: u16,

        #[arg(long)]
        username: String,

        /// Optional group the profile belongs to
        #[arg(long)]
        group: Option<String>,

        #[arg(long)]
        terminal_type: Option<String>,
    },

    /// List session profiles
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = 20)]
        page_size: u32,
    },

    /// Show one profile, optionally revealing its secret
    Show {
        id: Uuid,

        /// Decrypt and print the credential secret
        #[arg(long)]
        reveal: bool,
    },

    /// Edit profile metadata
    Edit {
        id: Uuid,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,

        #[arg(long)]
        username: Option<String>,

        #[arg(long)]
        group: Option<String>,
    },

    /// Replace a profile's credential secret
    ChangeSecret { id: Uuid },

    /// Soft-delete a profile (removed everywhere on next sync)
    Remove { id: Uuid },

    /// Reconcile the catalog with the relay
    Sync {
        /// Relay base URL; persisted for future runs
        #[arg(long)]
        relay_url: Option<String>,
    },

    /// Show sync status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::WARN)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");

    let cli = Cli::parse();
    let store = open_store(cli.catalog.clone())?;

    match cli.command {
        Commands::Add {
            name,
            host,
            port,
            username,
            group,
            terminal_type,
        } => {
            let owner = ensure_owner(&store)?;
            let catalog = ProfileCatalog::new(store);

            let secret = prompt_password("Credential secret (password or key passphrase): ")?;
            let passphrase = prompt_password("Vault passphrase: ")?;

            let profile = catalog.create_profile(
                NewProfile {
                    owner,
                    name,
                    host,
                    port,
                    username,
                    group_name: group,
                    terminal_type,
                    columns: None,
                    rows: None,
                },
                secret.as_bytes(),
                passphrase.as_bytes(),
            )?;

            println!("Added profile {} ({})", profile.name, profile.id);
        }

        Commands::List { page, page_size } => {
            let catalog = ProfileCatalog::new(store);
            let result = catalog.list_page(page, page_size)?;

            println!(
                "{} profile(s) total, page {} of size {}",
                result.total, page, page_size
            );
            for profile in &result.profiles {
                print_profile_line(profile);
            }
        }

        Commands::Show { id, reveal } => {
            let catalog = ProfileCatalog::new(store);
            let profile = catalog
                .get(id)?
                .ok_or_else(|| anyhow!("no profile with id {}", id))?;

            println!("id:            {}", profile.id);
            println!("name:          {}", profile.name);
            println!("host:          {}:{}", profile.host, profile.port);
            println!("username:      {}", profile.username);
            if let Some(group) = &profile.group_name {
                println!("group:         {}", group);
            }
            if let Some(term) = &profile.terminal_type {
                println!("terminal:      {}", term);
            }
            println!("version:       {}", profile.client_version);
            match profile.last_synced_at {
                Some(at) => println!("last synced:   {}", format_timestamp(at)),
                None => println!("last synced:   never"),
            }
            if let Some(at) = profile.deleted_at {
                println!("deleted:       {}", format_timestamp(at));
            }

            if reveal {
                let passphrase = prompt_password("Vault passphrase: ")?;
                let secret = catalog.reveal_secret(id, passphrase.as_bytes())?;
                println!("secret:        {}", String::from_utf8_lossy(secret.expose()));
            }
        }

        Commands::Edit {
            id,
            name,
            host,
            port,
            username,
            group,
        } => {
            let catalog = ProfileCatalog::new(store);
            let profile = catalog.update_profile(
                id,
                ProfileEdit {
                    name,
                    host,
                    port,
                    username,
                    group_name: group,
                    ..Default::default()
                },
            )?;
            println!("Updated profile {} ({})", profile.name, profile.client_version);
        }

        Commands::ChangeSecret { id } => {
            let catalog = ProfileCatalog::new(store);
            let secret = prompt_password("New credential secret: ")?;
            let passphrase = prompt_password("Vault passphrase: ")?;
            catalog.change_secret(id, secret.as_bytes(), passphrase.as_bytes())?;
            println!("Secret replaced for {}", id);
        }

        Commands::Remove { id } => {
            let catalog = ProfileCatalog::new(store);
            catalog.delete_profile(id)?;
            println!("Profile {} marked deleted; it will be removed everywhere on next sync", id);
        }

        Commands::Sync { relay_url } => {
            let owner = ensure_owner(&store)?;

            let settings = store.with_conn(|conn| {
                let mut settings = SyncSettings::load(conn)?;
                if let Some(url) = &relay_url {
                    settings.relay_url = Some(url.clone());
                }
                if settings.device_id.is_none() {
                    settings.device_id = Some(Uuid::new_v4());
                }
                if settings.device_signing_key.is_none() {
                    settings.device_signing_key = Some(generate_device_seed().to_vec());
                }
                settings.save(conn)?;
                Ok(settings)
            })?;

            let relay = settings
                .relay_url
                .ok_or_else(|| anyhow!("no relay URL configured; pass --relay-url once"))?;
            let device_id = settings.device_id.expect("device id provisioned above");
            let seed: [u8; 32] = settings
                .device_signing_key
                .expect("signing key provisioned above")
                .try_into()
                .map_err(|_| anyhow!("corrupt device signing key in catalog"))?;

            let gateway = HttpGateway::from_seed(&relay, device_id, seed)?;
            let engine = SyncEngine::new(Arc::new(gateway), store, owner);

            match engine.sync().await? {
                SyncOutcome::Completed(report) => {
                    println!(
                        "Sync complete: {} adopted, {} pushed, {} conflict(s) resolved, {} purged",
                        report.adopted.len(),
                        report.pushed_creates.len()
                            + report.pushed_updates.len()
                            + report.pushed_deletes.len(),
                        report.conflicts.len(),
                        report.purged.len()
                    );
                    for conflict in &report.conflicts {
                        println!(
                            "  conflict on {}: {:?} won ({:?})",
                            conflict.id, conflict.winner, conflict.reason
                        );
                    }
                    if !report.is_clean() {
                        println!("{} record(s) failed and will retry next sync:", report.failed.len());
                        for failed in &report.failed {
                            println!("  {}: {}", failed.id, failed.cause);
                        }
                    }
                }
                SyncOutcome::Deferred => {
                    println!("A sync is already running; this trigger was coalesced");
                }
            }
        }

        Commands::Status => {
            let settings = store.with_conn(SyncSettings::load)?;
            match settings.last_sync_at {
                Some(at) => println!("last synced:      {}", format_timestamp(at)),
                None => println!("last synced:      never"),
            }
            match settings.relay_url {
                Some(url) => println!("relay:            {}", url),
                None => println!("relay:            not configured"),
            }
            if let Some(owner) = settings.owner {
                let pending = store.count_pending(owner)?;
                println!("pending changes:  {}", pending);
            }
            println!("conflicts (last): {}", settings.last_conflicts);
            println!("failures (last):  {}", settings.last_failed);
        }
    }

    Ok(())
}

fn open_store(path: Option<PathBuf>) -> Result<SessionStore> {
    let path = match path {
        Some(path) => path,
        None => {
            ensure_data_dir().context("creating data directory")?;
            get_default_catalog_path()
        }
    };
    let db = Database::open(&path).with_context(|| format!("opening catalog at {:?}", path))?;
    Ok(SessionStore::new(Arc::new(Mutex::new(db))))
}

/// Load the owner id, provisioning one on first use.
fn ensure_owner(store: &SessionStore) -> Result<Uuid> {
    let owner = store.with_conn(|conn| {
        let mut settings = SyncSettings::load(conn)?;
        match settings.owner {
            Some(owner) => Ok(owner),
            None => {
                let owner = Uuid::new_v4();
                settings.owner = Some(owner);
                settings.save(conn)?;
                Ok(owner)
            }
        }
    })?;
    Ok(owner)
}

fn print_profile_line(profile: &SessionProfile) {
    let group = profile.group_name.as_deref().unwrap_or("-");
    println!(
        "{}  {:<20} {:<28} {:<12} {}",
        profile.id,
        profile.name,
        format!("{}:{}", profile.host, profile.port),
        group,
        profile.username
    );
}

fn format_timestamp(unix: i64) -> String {
    chrono::DateTime::from_timestamp(unix, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| unix.to_string())
}
