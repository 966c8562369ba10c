//! Developer CLI for the offline identity cache.
//!
//! Operates on a file-backed store, encrypting records with Argon2id and
//! XChaCha20-Poly1305. Every command prints one JSON document on stdout;
//! logs go to stderr and are filtered with `RUST_LOG`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use eyre::{eyre, Result, WrapErr};
use offline_identity_core::{
    CredentialPersistence, FileStore, IdentityRecord, KdfParams, PasswordCodec,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

const DEFAULT_STORE_DIR: &str = "offline-identity";
const DEFAULT_STORE_FILE: &str = "identities.json";

#[derive(Debug, Parser)]
#[command(name = "offline-identity", version, about = "Inspect and manage cached offline identities")]
struct Cli {
    /// Path of the identity store file.
    #[arg(long, env = "OFFLINE_IDENTITY_STORE", global = true)]
    store: Option<PathBuf>,

    /// Argon2id memory cost in KiB.
    #[arg(long, global = true, default_value_t = KdfParams::interactive().memory_kib)]
    kdf_memory_kib: u32,

    /// Argon2id passes.
    #[arg(long, global = true, default_value_t = KdfParams::interactive().iterations)]
    kdf_iterations: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Save an identity record, encrypted with its password.
    Save(SaveArgs),
    /// Decrypt and print an identity record.
    Load(Credentials),
    /// Report whether a record exists for a user.
    Exists {
        /// User name to look up.
        #[arg(long)]
        user: String,
    },
    /// Print the database name of a user's local data.
    DbName(Credentials),
    /// Print the shared DB key of unauthenticated sessions, creating it if needed.
    UnauthenticatedKey,
}

#[derive(Debug, Args)]
struct Credentials {
    /// User name.
    #[arg(long)]
    user: String,

    /// Password used to encrypt the record.
    #[arg(long, env = "OFFLINE_IDENTITY_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Debug, Args)]
struct SaveArgs {
    #[command(flatten)]
    credentials: Credentials,

    /// Mark the record as authenticated by a server.
    #[arg(long)]
    authenticated: bool,

    /// Server the user authenticated against.
    #[arg(long)]
    server_url: Option<String>,

    /// Server-issued DB key. Required with `--authenticated`.
    #[arg(long)]
    db_key: Option<String>,

    /// Organisation of the user.
    #[arg(long)]
    organisation: Option<String>,

    /// Full name of the user.
    #[arg(long)]
    full_name: Option<String>,
}

#[derive(Debug, Serialize)]
struct RecordView {
    user_name: String,
    authenticated: bool,
    server_url: Option<String>,
    organisation: Option<String>,
    full_name: Option<String>,
    database_name: Option<String>,
}

impl From<&IdentityRecord> for RecordView {
    fn from(record: &IdentityRecord) -> Self {
        Self {
            user_name: record.user_name().to_owned(),
            authenticated: record.is_authenticated(),
            server_url: record.server_url().map(str::to_owned),
            organisation: record.organisation().map(str::to_owned),
            full_name: record.full_name().map(str::to_owned),
            database_name: record.database_name(),
        }
    }
}

fn default_store_path() -> Result<PathBuf> {
    dirs::data_local_dir()
        .map(|dir| dir.join(DEFAULT_STORE_DIR).join(DEFAULT_STORE_FILE))
        .ok_or_else(|| eyre!("no local data directory; pass --store"))
}

fn open_persistence(cli: &Cli) -> Result<CredentialPersistence> {
    let path = match &cli.store {
        Some(path) => path.clone(),
        None => default_store_path()?,
    };
    tracing::debug!(store = %path.display(), "opening identity store");

    let store = FileStore::open(&path)
        .wrap_err_with(|| format!("failed to open store at {}", path.display()))?;
    let codec = PasswordCodec::new(KdfParams {
        memory_kib: cli.kdf_memory_kib,
        iterations: cli.kdf_iterations,
        ..KdfParams::interactive()
    })?;
    Ok(CredentialPersistence::new(Arc::new(store), Arc::new(codec)))
}

fn run(cli: &Cli) -> Result<Value> {
    let persistence = open_persistence(cli)?;

    match &cli.command {
        Command::Save(args) => {
            let mut record = IdentityRecord::new(&args.credentials.user)?
                .with_password(&args.credentials.password)
                .with_authenticated(args.authenticated);
            record.set_server_url(args.server_url.clone());
            record.set_db_key(args.db_key.clone());
            record.set_organisation(args.organisation.clone());
            record.set_full_name(args.full_name.clone());

            persistence.save(&mut record)?;
            Ok(serde_json::to_value(RecordView::from(&record))?)
        }
        Command::Load(credentials) => {
            let record = persistence.load(&credentials.user, &credentials.password)?;
            Ok(serde_json::to_value(RecordView::from(&record))?)
        }
        Command::Exists { user } => Ok(json!({
            "user_name": user,
            "exists": persistence.exists(user)?,
        })),
        Command::DbName(credentials) => {
            let record = persistence.load(&credentials.user, &credentials.password)?;
            Ok(json!({
                "user_name": record.user_name(),
                "database_name": record.database_name(),
            }))
        }
        Command::UnauthenticatedKey => Ok(json!({
            "unauthenticated_db_key": persistence.unauthenticated_key()?,
        })),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output = run(&cli).map_err(|err| {
        if let Some(identity_err) = err.downcast_ref::<offline_identity_core::IdentityError>() {
            tracing::warn!(hint = identity_err.recovery_hint(), "command failed");
        }
        err
    })?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(store: &std::path::Path, args: &[&str]) -> Cli {
        let mut argv = vec![
            "offline-identity".to_string(),
            "--store".to_string(),
            store.display().to_string(),
            "--kdf-memory-kib".to_string(),
            "8".to_string(),
            "--kdf-iterations".to_string(),
            "1".to_string(),
        ];
        argv.extend(args.iter().map(|arg| (*arg).to_string()));
        Cli::try_parse_from(argv).expect("parse args")
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = dir.path().join("identities.json");

        let saved = run(&cli(
            &store,
            &["save", "--user", "alice", "--password", "pw", "--full-name", "Alice"],
        ))
        .expect("save");
        let loaded = run(&cli(&store, &["load", "--user", "alice", "--password", "pw"]))
            .expect("load");

        assert_eq!(loaded["user_name"], "alice");
        assert_eq!(loaded["authenticated"], false);
        assert_eq!(loaded["full_name"], "Alice");
        assert_eq!(loaded["database_name"], saved["database_name"]);
        assert!(loaded.get("password").is_none());
    }

    #[test]
    fn test_exists_and_unauthenticated_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = dir.path().join("identities.json");

        let before = run(&cli(&store, &["exists", "--user", "alice"])).expect("exists");
        assert_eq!(before["exists"], false);

        run(&cli(&store, &["save", "--user", "alice", "--password", "pw"])).expect("save");
        let after = run(&cli(&store, &["exists", "--user", "alice"])).expect("exists");
        assert_eq!(after["exists"], true);

        let first = run(&cli(&store, &["unauthenticated-key"])).expect("key");
        let second = run(&cli(&store, &["unauthenticated-key"])).expect("key");
        assert_eq!(first, second);
    }

    #[test]
    fn test_wrong_password_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = dir.path().join("identities.json");
        run(&cli(&store, &["save", "--user", "alice", "--password", "pw"])).expect("save");

        let err = run(&cli(&store, &["db-name", "--user", "alice", "--password", "bad"]))
            .expect_err("wrong password");
        assert!(matches!(
            err.downcast_ref::<offline_identity_core::IdentityError>(),
            Some(offline_identity_core::IdentityError::Authentication(_))
        ));
    }
}
