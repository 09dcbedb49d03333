//! epicboard - command line client for the epicboard project tracker.
//!
//! Sign in, manage projects and epics, and list project members from the
//! terminal. Backend settings come from `EPICBOARD_API_URL` and
//! `EPICBOARD_API_KEY` (a `.env` file is honored).

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use epicboard_core::auth::{CredentialStore, FileCredentialStore, KeyringCredentialStore};
use epicboard_core::config::CredentialBackend;
use epicboard_core::models::{EpicUpdate, NewEpic, NewProject, ProjectUpdate};
use epicboard_core::notify::{NotificationLevel, Notifier};
use epicboard_core::{ApiClient, ApiConfig, ApiError, Config, RefreshPolicy};

#[derive(Parser)]
#[command(name = "epicboard", version, about = "Projects, epics and members from the terminal")]
struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Let every request that hits 401 run its own token refresh
    #[arg(long, global = true)]
    naive_refresh: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an account
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        job_title: Option<String>,
    },
    /// Sign in and store tokens
    Login {
        #[arg(long)]
        email: Option<String>,
        /// Keep the session for 7 days
        #[arg(long)]
        remember: bool,
    },
    /// Sign out and forget tokens
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Email a password reset link
    Recover {
        #[arg(long)]
        email: String,
    },
    /// Set a new password with the token from a reset link
    ResetPassword {
        #[arg(long)]
        token: String,
    },
    #[command(subcommand)]
    Projects(ProjectCommand),
    #[command(subcommand)]
    Epics(EpicCommand),
    #[command(subcommand)]
    Members(MemberCommand),
}

#[derive(Subcommand)]
enum ProjectCommand {
    List,
    Show { id: String },
    Create {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    Delete { id: String },
}

#[derive(Subcommand)]
enum EpicCommand {
    List { project_id: String },
    Create {
        project_id: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        assignee: Option<String>,
        /// Deadline as YYYY-MM-DD
        #[arg(long)]
        deadline: Option<String>,
    },
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        assignee: Option<String>,
        #[arg(long)]
        deadline: Option<String>,
    },
}

#[derive(Subcommand)]
enum MemberCommand {
    List { project_id: String },
}

/// Prints notifications to stderr.
struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn notify(&self, level: NotificationLevel, message: &str) {
        match level {
            NotificationLevel::Success => eprintln!("✓ {}", message),
            NotificationLevel::Error => eprintln!("✗ {}", message),
        }
    }
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn credential_store(config: &Config) -> Result<Arc<dyn CredentialStore>> {
    let store: Arc<dyn CredentialStore> = match config.credential_backend {
        CredentialBackend::File => Arc::new(FileCredentialStore::new(config.cache_dir()?)),
        CredentialBackend::Keyring => Arc::new(KeyringCredentialStore::new()),
    };
    Ok(store)
}

/// Parse a YYYY-MM-DD date as midnight UTC.
fn parse_deadline(value: &str) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("Invalid deadline '{}', expected YYYY-MM-DD", value))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow::anyhow!("Invalid deadline '{}'", value))?;
    Ok(midnight.and_utc())
}

fn prompt_password(prompt: &str) -> Result<String> {
    rpassword::prompt_password(prompt).context("Failed to read password")
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();
    let cli = Cli::parse();

    let result = run(cli).await;
    if let Err(ref e) = result {
        let unauthorized = e
            .downcast_ref::<ApiError>()
            .map(ApiError::is_unauthorized)
            .unwrap_or(false);
        if unauthorized {
            eprintln!("Not signed in or session expired. Run `epicboard login`.");
        }
    }
    result
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load().unwrap_or_default();
    let api_config = ApiConfig::from_env()?;
    let policy = if cli.naive_refresh {
        RefreshPolicy::Naive
    } else {
        RefreshPolicy::SingleFlight
    };
    let notifier: Arc<dyn Notifier> = Arc::new(StderrNotifier);
    let client = ApiClient::builder(api_config, credential_store(&config)?)
        .notifier(notifier.clone())
        .refresh_policy(policy)
        .build()?;

    info!("epicboard starting");

    match cli.command {
        Command::Signup {
            email,
            name,
            job_title,
        } => {
            let password = prompt_password("Password: ")?;
            let confirm = prompt_password("Confirm password: ")?;
            if password != confirm {
                anyhow::bail!("Passwords do not match");
            }
            client
                .sign_up(&email, &password, &name, job_title.as_deref())
                .await?;
            notifier.success("Account created, check your email to confirm it");
        }
        Command::Login { email, remember } => {
            let email = match email.or_else(|| config.last_email.clone()) {
                Some(email) => email,
                None => anyhow::bail!("No email given and none remembered, use --email"),
            };
            let password = prompt_password(&format!("Password for {}: ", email))?;
            let user = client.log_in(&email, &password, remember).await?;
            config.last_email = Some(email);
            config.save()?;
            notifier.success(&format!("Welcome back {}!", user.display_name()));
        }
        Command::Logout => {
            client.log_out().await?;
            notifier.success("Logged out");
        }
        Command::Whoami => {
            let user = client.current_user().await?;
            if cli.json {
                print_json(&user)?;
            } else {
                println!("{} ({})", user.display_name(), user.job_title_display());
            }
        }
        Command::Recover { email } => {
            client.recover_password(&email).await?;
            notifier.success("If an account exists with this email, a reset link has been sent");
        }
        Command::ResetPassword { token } => {
            let password = prompt_password("New password: ")?;
            client.update_password(&token, &password).await?;
            notifier.success("Password updated");
        }
        Command::Projects(command) => {
            run_projects(&client, notifier.as_ref(), command, cli.json).await?
        }
        Command::Epics(command) => run_epics(&client, notifier.as_ref(), command, cli.json).await?,
        Command::Members(MemberCommand::List { project_id }) => {
            let members = client.list_members(&project_id).await?;
            if cli.json {
                print_json(&members)?;
            } else {
                for member in &members {
                    println!(
                        "{}\t{}",
                        member.display_name(),
                        member.metadata.email.as_deref().unwrap_or("-")
                    );
                }
            }
        }
    }

    Ok(())
}

async fn run_projects(
    client: &ApiClient,
    notifier: &dyn Notifier,
    command: ProjectCommand,
    json: bool,
) -> Result<()> {
    match command {
        ProjectCommand::List => {
            let projects = client.list_projects().await?;
            if json {
                return print_json(&projects);
            }
            for project in &projects {
                println!("{}\t{}\t{}", project.id, project.name, project.description_display());
            }
        }
        ProjectCommand::Show { id } => {
            let project = client.get_project(&id).await?;
            if json {
                return print_json(&project);
            }
            println!("{}\n{}", project.name, project.description_display());
        }
        ProjectCommand::Create { name, description } => {
            let project = client
                .create_project(&NewProject { name, description })
                .await?;
            if json {
                return print_json(&project);
            }
            notifier.success(&format!("Project {} created", project.id));
        }
        ProjectCommand::Update {
            id,
            name,
            description,
        } => {
            let update = ProjectUpdate { name, description };
            if update.is_empty() {
                anyhow::bail!("Nothing to update, pass --name or --description");
            }
            let project = client.update_project(&id, &update).await?;
            if json {
                return print_json(&project);
            }
            notifier.success("Project updated");
        }
        ProjectCommand::Delete { id } => {
            client.delete_project(&id).await?;
            if json {
                return print_json(&serde_json::json!({ "deleted": id }));
            }
            notifier.success("Project deleted");
        }
    }
    Ok(())
}

async fn run_epics(
    client: &ApiClient,
    notifier: &dyn Notifier,
    command: EpicCommand,
    json: bool,
) -> Result<()> {
    match command {
        EpicCommand::List { project_id } => {
            let epics = client.list_epics(&project_id).await?;
            if json {
                return print_json(&epics);
            }
            let now = Utc::now();
            for epic in &epics {
                let deadline = epic
                    .deadline
                    .map(|d| d.format("%b %d, %Y").to_string())
                    .unwrap_or_else(|| "-".to_string());
                let flag = if epic.is_overdue(now) { " (overdue)" } else { "" };
                println!(
                    "{}\t{}\t{}\t{}{}",
                    epic.epic_id.as_deref().unwrap_or(&epic.id),
                    epic.title,
                    epic.assignee_name(),
                    deadline,
                    flag
                );
            }
        }
        EpicCommand::Create {
            project_id,
            title,
            description,
            assignee,
            deadline,
        } => {
            let epic = NewEpic {
                title,
                description,
                assignee_id: assignee,
                deadline: deadline.as_deref().map(parse_deadline).transpose()?,
                project_id,
            };
            let created = client.create_epic(&epic).await?;
            if json {
                return print_json(&created);
            }
            notifier.success(&format!("Epic {} created", created.id));
        }
        EpicCommand::Update {
            id,
            title,
            description,
            assignee,
            deadline,
        } => {
            let update = EpicUpdate {
                title,
                description,
                assignee_id: assignee,
                deadline: deadline.as_deref().map(parse_deadline).transpose()?,
            };
            if update.is_empty() {
                anyhow::bail!("Nothing to update");
            }
            let epic = client.update_epic(&id, &update).await?;
            if json {
                return print_json(&epic);
            }
            notifier.success("Epic updated successfully");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_deadline() {
        let deadline = parse_deadline("2025-12-01").unwrap();
        assert_eq!(deadline.to_rfc3339(), "2025-12-01T00:00:00+00:00");
        assert!(parse_deadline("12/01/2025").is_err());
    }

    #[test]
    fn test_cli_parses_nested_commands() {
        let cli = Cli::try_parse_from([
            "epicboard",
            "epics",
            "update",
            "42",
            "--title",
            "Renamed",
        ])
        .unwrap();
        match cli.command {
            Command::Epics(EpicCommand::Update { id, title, .. }) => {
                assert_eq!(id, "42");
                assert_eq!(title.as_deref(), Some("Renamed"));
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn test_json_flag_reaches_write_commands() {
        let cli = Cli::try_parse_from([
            "epicboard",
            "--json",
            "projects",
            "create",
            "--name",
            "Website",
        ])
        .unwrap();
        assert!(cli.json);
        assert!(matches!(
            cli.command,
            Command::Projects(ProjectCommand::Create { .. })
        ));
    }

    #[test]
    fn test_cli_global_flags() {
        let cli =
            Cli::try_parse_from(["epicboard", "projects", "list", "--json", "--naive-refresh"])
                .unwrap();
        assert!(cli.json);
        assert!(cli.naive_refresh);
    }
}
