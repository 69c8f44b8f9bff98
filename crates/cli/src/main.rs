//! claimsync command-line management tool.
//!
//! Provides subcommands for generating and validating configuration files,
//! running a reconciliation from a claims document, inspecting stored
//! accounts, and dry-running the group and name resolvers.

mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use tracing_subscriber::EnvFilter;

use claimsync_core::claims::ExternalLoginInfo;
use claimsync_core::config::AppConfig;
use claimsync_core::db::Database;
use claimsync_core::identity::{resolve_display_name, resolve_login_identifier};
use claimsync_core::models::{LocalUser, ReconcileReport};
use claimsync_core::notify::{AuditLogSink, Notifier, TracingOutcomeSink};
use claimsync_core::{
    avatar_path, CancellationToken, ClaimSet, ExternalLoginProvider, FileSystemContentStore,
    GroupResolver,
};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// claimsync command-line management tool.
#[derive(Parser, Debug)]
#[command(
    name = "claimsync",
    version,
    about = "Reconcile external identity claims with local user accounts"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(
        short,
        long,
        global = true,
        default_value = "/etc/claimsync/config.toml"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./claimsync.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file.
    Validate,

    /// Reconcile a local account with a claims document.
    Reconcile {
        /// JSON claims document (list of {type, value} or an object map).
        #[arg(long)]
        claims: PathBuf,

        /// Environment variable holding the bearer access token.
        #[arg(long)]
        access_token_env: Option<String>,

        /// Treat this as first-time auto-linking; creates the account if missing.
        #[arg(long)]
        first_link: bool,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Inspect stored accounts.
    Users {
        #[command(subcommand)]
        action: UsersAction,
    },

    /// Dry-run group resolution.
    Groups {
        #[command(subcommand)]
        action: ResolveAction,
    },

    /// Dry-run display name and login identifier resolution.
    Name {
        #[command(subcommand)]
        action: ResolveAction,
    },

    /// Print the content store path for a photo version tag.
    AvatarPath {
        /// ETag value exactly as received, quotes included.
        etag: String,
    },
}

#[derive(Subcommand, Debug)]
enum UsersAction {
    /// List all stored accounts.
    List,
    /// Show one account and its recent reconciliations.
    Show {
        /// Login identifier.
        login: String,

        /// Number of reconciliation log entries.
        #[arg(long, default_value = "10")]
        limit: u32,
    },
}

#[derive(Subcommand, Debug)]
enum ResolveAction {
    /// Resolve from a claims document.
    Resolve {
        /// JSON claims document.
        #[arg(long)]
        claims: PathBuf,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.config);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", style::error(&format!("Error: {:#}", e)));
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins; otherwise the configured level, otherwise `warn`.
fn init_logging(config_path: &Path) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = std::fs::read_to_string(config_path)
            .ok()
            .and_then(|raw| toml_log_level(&raw))
            .unwrap_or_else(|| "warn".to_string());
        EnvFilter::new(level)
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

/// `[logging] level` from a raw config file, read before logging exists.
fn toml_log_level(raw: &str) -> Option<String> {
    let table = raw.parse::<toml::Table>().ok()?;
    let level = table.get("logging")?.get("level")?.as_str()?;
    (!level.is_empty()).then(|| level.to_string())
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { output } => cmd_init(&output),
        Commands::Validate => cmd_validate(&cli.config),
        Commands::AvatarPath { etag } => {
            println!("{}", avatar_path(&etag));
            Ok(())
        }
        Commands::Groups {
            action: ResolveAction::Resolve { claims },
        } => cmd_groups_resolve(&load_config(&cli.config)?, &claims),
        Commands::Name {
            action: ResolveAction::Resolve { claims },
        } => cmd_name_resolve(&load_config(&cli.config)?, &claims),
        Commands::Users { action } => {
            let config = load_config(&cli.config)?;
            let db = open_database(&config)?;
            cmd_users(&db, action)
        }
        Commands::Reconcile {
            claims,
            access_token_env,
            first_link,
            json,
        } => {
            let config = load_config(&cli.config)?;
            let db = Arc::new(open_database(&config)?);
            cmd_reconcile(
                &config,
                db,
                &claims,
                access_token_env.as_deref(),
                first_link,
                json,
            )
            .await
        }
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn load_config(path: &Path) -> Result<AppConfig> {
    AppConfig::load_and_resolve(path).context("failed to load configuration file")
}

fn open_database(config: &AppConfig) -> Result<Database> {
    let db = Database::new(&config.store.database_path).context("failed to open database")?;
    db.initialize().context("failed to initialize database")?;
    Ok(db)
}

fn load_claims(config: &AppConfig, path: &Path) -> Result<ClaimSet> {
    ClaimSet::load(path, &config.provider.identity_name_claim)
        .with_context(|| format!("failed to read claims from {}", path.display()))
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

const DEFAULT_CONFIG: &str = r#"# claimsync configuration

[logging]
level = "info"

[provider]
scheme_prefix = "Umbraco."
scheme_name = "MicrosoftAccount"
# tenant_id = "00000000-0000-0000-0000-000000000000"
# client_id = "00000000-0000-0000-0000-000000000000"
client_secret_env = "AZURE_SSO_CLIENT_SECRET"
identity_name_claim = "preferred_username"
button_style = "btn-microsoft"
icon = "fa fa-lock"
deny_local_login = false
auto_redirect_login_to_external_provider = false
sync_user_avatar = true
set_groups_on_login = false
role_merge = { mode = "replace" }
graph_endpoint = "https://graph.microsoft.com"
default_groups = ["writer"]
# group_lookup_file = "/etc/claimsync/groups.toml"

[provider.group_lookup]
# "<group object id>" = "admin,editor"

[avatar]
fetch_timeout_secs = 10
media_root = "/var/lib/claimsync/media"

[store]
database_path = "/var/lib/claimsync/claimsync.db"
"#;

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, DEFAULT_CONFIG).context("failed to write config file")?;

    println!(
        "{}",
        style::success(&format!(
            "Default configuration written to {}",
            output.display()
        ))
    );
    println!();
    println!("Next steps:");
    println!("  1. Fill in the group lookup table with your directory group ids");
    println!("  2. Set the referenced environment variable (AZURE_SSO_CLIENT_SECRET)");
    println!(
        "  3. Validate with: claimsync validate --config {}",
        output.display()
    );

    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let mut config =
        AppConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  [OK] TOML structure is valid");

    config
        .resolve_env_vars()
        .context("failed to resolve environment variables")?;
    println!("  [OK] Environment variable references processed");

    config
        .resolve_group_lookup_file()
        .context("failed to load group mapping file")?;
    println!("  [OK] Group mappings loaded");

    match config.validate() {
        Ok(()) => println!("  [OK] All required fields are valid"),
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }

    let provider = &config.provider;
    println!();
    println!("Configuration summary:");
    println!("  Scheme          : {}", provider.authentication_type());
    println!("  Identity claim  : {}", provider.identity_name_claim);
    println!(
        "  Client secret   : {}",
        if provider.client_secret.is_some() {
            "set"
        } else {
            "not set"
        }
    );
    println!("  Group mappings  : {}", provider.group_lookup.len());
    println!("  Default groups  : {}", provider.default_groups.join(", "));
    println!("  Groups on login : {}", provider.set_groups_on_login);
    println!("  Role merge      : {}", provider.role_merge);
    println!("  Avatar sync     : {}", provider.sync_user_avatar);
    println!("  Graph endpoint  : {}", provider.graph_endpoint);
    println!("  Fetch timeout   : {}s", config.avatar.fetch_timeout_secs);
    println!("  Media root      : {}", config.avatar.media_root.display());
    println!("  Database        : {}", config.store.database_path.display());
    println!();
    println!("{}", style::success("Configuration is valid."));

    Ok(())
}

async fn cmd_reconcile(
    config: &AppConfig,
    db: Arc<Database>,
    claims_path: &Path,
    access_token_env: Option<&str>,
    first_link: bool,
    json: bool,
) -> Result<()> {
    let claims = load_claims(config, claims_path)?;
    let login_id = claims
        .identity_name()
        .map(str::to_string)
        .with_context(|| {
            format!(
                "claims carry no '{}' claim to identify the account",
                config.provider.identity_name_claim
            )
        })?;

    let mut login = ExternalLoginInfo::new(claims);
    if let Some(var) = access_token_env {
        let token = std::env::var(var)
            .with_context(|| format!("environment variable '{}' is not set", var))?;
        login = login.with_access_token(token);
    }

    let mut user = match db
        .get_user_by_login(&login_id)
        .context("failed to look up account")?
    {
        Some(user) => user,
        None if first_link => {
            let user = LocalUser::new(&login_id);
            db.insert_user(&user).context("failed to create account")?;
            println!("{}", style::dim(&format!("created account {}", login_id)));
            user
        }
        None => anyhow::bail!(
            "no local account for '{}'; use --first-link to provision one",
            login_id
        ),
    };

    let content = Arc::new(FileSystemContentStore::new(&config.avatar.media_root));
    let notifier = Notifier::new()
        .with_sink(Arc::new(TracingOutcomeSink))
        .with_sink(Arc::new(AuditLogSink::new(db.clone())));
    let provider = ExternalLoginProvider::from_config(config, db.clone(), content)
        .context("failed to initialize login provider")?
        .with_sink(Arc::new(notifier));

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let result = if first_link {
        provider.on_auto_linking(&mut user, &login, &cancel).await
    } else {
        provider.on_external_login(&mut user, &login, &cancel).await
    };
    ctrl_c.abort();
    let report = result.context("reconciliation failed")?;

    if json {
        let out = serde_json::json!({ "user": user, "report": report });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print_report(&user, &report);
    }

    Ok(())
}

fn print_report(user: &LocalUser, report: &ReconcileReport) {
    println!();
    println!(
        "{}",
        style::header(&format!("Reconciled {} ({})", user.login, report.trigger))
    );
    println!();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Step", "Outcome"]);
    table.add_row(vec![Cell::new("groups"), style::outcome_cell(&report.groups)]);
    table.add_row(vec![
        Cell::new("identity"),
        style::outcome_cell(&report.identity),
    ]);
    table.add_row(vec![Cell::new("avatar"), style::outcome_cell(&report.avatar)]);
    println!("{}", table);
    println!();

    print_user(user);
    println!();
    if report.proceed {
        println!("{}", style::success("sign-in proceeds"));
    } else {
        println!("{}", style::warn("sign-in would be denied"));
    }
}

fn print_user(user: &LocalUser) {
    println!("  Login     : {}", user.login);
    println!("  Name      : {}", user.name);
    println!("  Email     : {}", user.email.as_deref().unwrap_or("-"));
    println!("  Approved  : {}", user.is_approved);
    println!("  Groups    : {}", join_roles(user));
    println!("  Avatar    : {}", user.avatar.as_deref().unwrap_or("-"));
}

fn cmd_users(db: &Database, action: UsersAction) -> Result<()> {
    match action {
        UsersAction::List => {
            let users = db.list_users().context("failed to list accounts")?;

            if users.is_empty() {
                println!("No accounts found.");
                return Ok(());
            }

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["Login", "Name", "Approved", "Groups", "Avatar"]);

            for u in &users {
                table.add_row(vec![
                    Cell::new(&u.login),
                    Cell::new(&u.name),
                    style::flag_cell(u.is_approved),
                    Cell::new(join_roles(u)),
                    Cell::new(if u.avatar.is_some() { "set" } else { "-" }),
                ]);
            }

            println!("{}", table);
            println!();
            println!("{}", store_summary(db)?);
            Ok(())
        }

        UsersAction::Show { login, limit } => {
            let user = db
                .get_user_by_login(&login)
                .context("database error")?
                .ok_or_else(|| anyhow::anyhow!("account '{}' not found", login))?;

            println!("{}", style::header(&format!("Account: {}", user.login)));
            println!();
            println!("  Id        : {}", user.id);
            print_user(&user);

            let entries = db
                .list_reconcile_log(&user.login, limit)
                .context("failed to list reconciliation log")?;
            println!();
            if entries.is_empty() {
                println!("{}", style::dim("No reconciliations recorded."));
                return Ok(());
            }

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["When", "Trigger", "Groups", "Identity", "Avatar", "OK"]);
            for e in &entries {
                table.add_row(vec![
                    Cell::new(&e.created_at[..19.min(e.created_at.len())]),
                    Cell::new(&e.trigger),
                    Cell::new(&e.groups),
                    Cell::new(&e.identity),
                    Cell::new(&e.avatar),
                    style::flag_cell(e.success),
                ]);
            }
            println!("{}", table);
            Ok(())
        }
    }
}

/// One-line account and failure totals for the store.
fn store_summary(db: &Database) -> Result<String> {
    let accounts = db.count_users().context("failed to count accounts")?;
    let failed = db
        .count_failed_reconciliations()
        .context("failed to count failed reconciliations")?;
    Ok(format!(
        "{} account(s), {} reconciliation(s) with a failed step",
        accounts, failed
    ))
}

fn cmd_groups_resolve(config: &AppConfig, claims_path: &Path) -> Result<()> {
    let claims = load_claims(config, claims_path)?;
    let resolver = GroupResolver::new(
        config.provider.group_lookup.clone(),
        config.provider.default_groups.clone(),
    );
    let groups = resolver.resolve(&claims);

    if groups.is_empty() {
        println!("{}", style::warn("no groups resolved"));
        return Ok(());
    }
    for group in &groups {
        println!("{}", group);
    }
    Ok(())
}

fn cmd_name_resolve(config: &AppConfig, claims_path: &Path) -> Result<()> {
    let claims = load_claims(config, claims_path)?;

    match resolve_login_identifier(&claims) {
        Some(login) => {
            println!("Login identifier: {}", login);
            println!("Display name    : {}", resolve_display_name(&claims, &login));
        }
        None => {
            println!(
                "{}",
                style::warn(&format!(
                    "no '{}' claim: name and login would be left unchanged",
                    config.provider.identity_name_claim
                ))
            );
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Utilities
// ---------------------------------------------------------------------------

fn join_roles(user: &LocalUser) -> String {
    if user.roles.is_empty() {
        "-".to_string()
    } else {
        user.roles.iter().cloned().collect::<Vec<_>>().join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_default_config_parses_and_validates() {
        let config: AppConfig = toml::from_str(DEFAULT_CONFIG).unwrap();
        config.validate().unwrap();
        assert_eq!(
            config.provider.authentication_type(),
            "Umbraco.MicrosoftAccount"
        );
        assert_eq!(config.provider.default_groups, vec!["writer"]);
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("claimsync.toml");
        cmd_init(&path).unwrap();
        assert!(cmd_init(&path).is_err());
    }

    #[test]
    fn test_store_summary_counts_accounts_and_failures() {
        use claimsync_core::models::{StepOutcome, Trigger};

        let db = Database::in_memory().unwrap();
        db.initialize().unwrap();
        db.insert_user(&LocalUser::new("jane@example.com")).unwrap();
        db.insert_user(&LocalUser::new("joe@example.com")).unwrap();
        let report = ReconcileReport {
            trigger: Trigger::Login,
            groups: StepOutcome::Applied,
            identity: StepOutcome::Applied,
            avatar: StepOutcome::Failed("timed out".into()),
            proceed: true,
        };
        db.insert_reconcile_log("jane@example.com", &report).unwrap();

        assert_eq!(
            store_summary(&db).unwrap(),
            "2 account(s), 1 reconciliation(s) with a failed step"
        );
    }

    #[test]
    fn test_toml_log_level() {
        let raw = "[provider]\nlevel = \"nope\"\n\n[logging]\nlevel = \"debug\"\n";
        assert_eq!(toml_log_level(raw).as_deref(), Some("debug"));
        assert_eq!(toml_log_level("[logging]\n"), None);
        assert_eq!(toml_log_level("not = [valid"), None);
    }
}
