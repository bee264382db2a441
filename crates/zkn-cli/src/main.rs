//! zkn: zknotes client CLI
//!
//! Commands:
//!   init                        - create a vault (new key hierarchy)
//!   unlock                      - check that a password opens the vault
//!   encrypt --title --body      - print an encrypted note as JSON
//!   decrypt <file|->            - decrypt an encrypted note JSON
//!   search <query>              - print a blind search request as JSON
//!   logout                      - delete the local vault record
//!   config show                 - display current configuration
//!
//! The password is read from ZKN_PASSWORD or prompted for.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use zkn_core::config::{expand_tilde, ZknConfig};
use zkn_core::types::{EncryptedNote, SearchMode};
use zkn_core::{KeyService, Session, VaultStore, ZknError};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "zkn",
    version,
    about = "zknotes zero-knowledge notes client",
    long_about = "zkn: manage the local key vault and encrypt, decrypt, and index notes client-side"
)]
struct Cli {
    /// Path to zkn.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "ZKN_CONFIG",
        default_value = "~/.config/zknotes/zkn.toml"
    )]
    config: PathBuf,

    /// Vault record path (overrides config)
    #[arg(long, env = "ZKN_VAULT")]
    vault: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides config
    #[arg(long, env = "ZKN_LOG")]
    log: Option<String>,

    /// Log format (json, text); overrides config
    #[arg(long, env = "ZKN_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new vault protected by a password
    Init,

    /// Verify that the password opens the vault
    Unlock,

    /// Encrypt a note and print it as JSON
    Encrypt {
        #[arg(long)]
        title: String,
        #[arg(long)]
        body: String,
        /// Tag to attach (repeatable)
        #[arg(long = "tag", short = 't')]
        tags: Vec<String>,
    },

    /// Decrypt an encrypted note JSON file ("-" for stdin)
    Decrypt {
        input: PathBuf,
    },

    /// Build a blind search request for a query
    Search {
        query: String,
        /// Result limit (1..=100)
        #[arg(long)]
        limit: Option<u32>,
        /// Restrict matches to notes or tags
        #[arg(long, default_value = "all")]
        mode: ModeArg,
    },

    /// Forget keys and delete the local vault record
    Logout,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    All,
    Tags,
    Notes,
}

impl From<ModeArg> for SearchMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::All => SearchMode::All,
            ModeArg::Tags => SearchMode::Tags,
            ModeArg::Notes => SearchMode::Notes,
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let mut config = load_config(&config_path).await?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli
        .log_format
        .clone()
        .unwrap_or(match config.log.format.as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        });
    init_logging(&level, &format);

    if !config_path.exists() {
        tracing::warn!(
            "config file not found: {}  (using defaults)",
            config_path.display()
        );
    }
    if let Some(vault) = cli.vault {
        config.vault.path = vault;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "zkn starting"
    );

    match cli.command {
        Commands::Init => cmd_init(&config).await,
        Commands::Unlock => cmd_unlock(&config).await,
        Commands::Encrypt { title, body, tags } => cmd_encrypt(&config, &title, &body, &tags).await,
        Commands::Decrypt { input } => cmd_decrypt(&config, &input).await,
        Commands::Search { query, limit, mode } => {
            cmd_search(&config, &query, limit, mode.into()).await
        }
        Commands::Logout => cmd_logout(&config),
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &config_path),
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

async fn load_config(path: &Path) -> Result<ZknConfig> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config: {}", path.display()))
    } else {
        Ok(ZknConfig::default())
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Logs go to stderr so JSON output on stdout stays clean
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn open_session(config: &ZknConfig) -> Result<Session> {
    let service = KeyService::from_config(config).map_err(user_facing)?;
    let vault = VaultStore::new(config.vault.resolved_path());
    Ok(Session::new(service, vault))
}

/// Reduce a library error to its generic user message; details go to debug logs.
fn user_facing(e: ZknError) -> anyhow::Error {
    tracing::debug!(error = ?e, "operation failed");
    anyhow::anyhow!(e.user_message())
}

fn read_password(confirm: bool) -> Result<SecretString> {
    if let Ok(pw) = std::env::var("ZKN_PASSWORD") {
        return Ok(SecretString::from(pw));
    }

    let pw = rpassword::prompt_password("Password: ").context("reading password")?;
    if pw.is_empty() {
        anyhow::bail!("password must not be empty");
    }
    let pw = SecretString::from(pw);
    if confirm {
        let again = rpassword::prompt_password("Confirm password: ").context("reading password")?;
        let again = SecretString::from(again);
        if again.expose_secret() != pw.expose_secret() {
            anyhow::bail!("passwords do not match");
        }
    }
    Ok(pw)
}

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

async fn login(session: &mut Session) -> Result<()> {
    let password = read_password(false)?;
    let pb = make_spinner("unlock");
    pb.set_message("deriving key...");
    let result = session.login(&password).await.map(|_| ());
    pb.finish_and_clear();
    result.map_err(user_facing)
}

fn read_input(input: &Path) -> Result<String> {
    if input == Path::new("-") {
        std::io::read_to_string(std::io::stdin()).context("reading note from stdin")
    } else {
        std::fs::read_to_string(input).with_context(|| format!("reading note: {}", input.display()))
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

async fn cmd_init(config: &ZknConfig) -> Result<()> {
    let mut session = open_session(config)?;
    let password = read_password(true)?;

    let pb = make_spinner("init");
    pb.set_message("deriving key...");
    let result = session.register(&password).await.map(|_| ());
    pb.finish_and_clear();
    result.map_err(user_facing)?;

    println!("vault created: {}", session.vault().path().display());
    Ok(())
}

async fn cmd_unlock(config: &ZknConfig) -> Result<()> {
    let mut session = open_session(config)?;
    login(&mut session).await?;
    println!("vault unlocked");
    Ok(())
}

async fn cmd_encrypt(config: &ZknConfig, title: &str, body: &str, tags: &[String]) -> Result<()> {
    let mut session = open_session(config)?;
    login(&mut session).await?;

    let mut note = session.encrypt_note(title, body).await.map_err(user_facing)?;
    if let Some(keys) = session.keys() {
        for tag in tags {
            let encrypted = session
                .service()
                .encrypt_tag(tag, keys)
                .await
                .map_err(user_facing)?;
            note.tags.push(encrypted);
        }
    }

    let json = serde_json::to_string_pretty(&note).context("serializing note")?;
    println!("{json}");
    Ok(())
}

async fn cmd_decrypt(config: &ZknConfig, input: &Path) -> Result<()> {
    let content = read_input(input)?;
    let note: EncryptedNote = serde_json::from_str(&content).context("parsing encrypted note")?;

    let mut session = open_session(config)?;
    login(&mut session).await?;
    let plain = session.decrypt_note(&note).await.map_err(user_facing)?;

    if let Some(id) = note.id {
        println!("id:    {id}");
    }
    println!("title: {}", plain.title);
    if !plain.tags.is_empty() {
        println!("tags:  {}", plain.tags.join(", "));
    }
    println!();
    println!("{}", plain.body);
    Ok(())
}

async fn cmd_search(
    config: &ZknConfig,
    query: &str,
    limit: Option<u32>,
    mode: SearchMode,
) -> Result<()> {
    let mut session = open_session(config)?;
    login(&mut session).await?;

    let mut request = session
        .search_query(query)
        .await
        .map_err(user_facing)?
        .with_mode(mode);
    if let Some(limit) = limit {
        request = request.with_limit(limit).map_err(user_facing)?;
    }
    if request.term_hashes.is_empty() {
        tracing::warn!("query has no searchable terms");
    }

    let json = serde_json::to_string_pretty(&request).context("serializing search request")?;
    println!("{json}");
    Ok(())
}

fn cmd_logout(config: &ZknConfig) -> Result<()> {
    let mut session = open_session(config)?;
    session.logout().map_err(user_facing)?;
    println!("vault removed: {}", session.vault().path().display());
    Ok(())
}

fn cmd_config_show(config: &ZknConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
