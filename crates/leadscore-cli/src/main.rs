mod commands;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use leadscore_client::{ApiClient, ClientConfig, CredentialStore, SessionEvent};
use leadscore_core::IntentFilter;
use leadscore_workflow::Workflow;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing_subscriber::EnvFilter;

/// How long to wait for pending session notices after a command finishes.
const NOTICE_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Parser)]
#[command(name = "leadscore")]
#[command(about = "Qualify sales leads against your offers with AI intent scoring")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Log in and store the session locally
    Login {
        #[arg(long)]
        username: String,
        #[arg(long, env = "LEADSCORE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and log in
    Signup {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "LEADSCORE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Show whether a session is stored
    Status,
    /// Manage offers
    Offers {
        #[command(subcommand)]
        command: OffersCommands,
    },
    /// Manage uploaded leads
    Leads {
        #[command(subcommand)]
        command: LeadsCommands,
    },
    /// Score every uploaded lead against an offer
    Score {
        #[arg(long)]
        offer: i64,
    },
    /// List scored leads
    Results {
        /// all, high, medium or low
        #[arg(long, default_value = "all")]
        intent: IntentFilter,
    },
    /// Write scored leads to a dated CSV file
    Export {
        #[arg(long, default_value = "all")]
        intent: IntentFilter,
        /// Directory to write into
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
    /// Lead and intent counts
    Stats,
}

impl Commands {
    /// Everything except the session commands talks to the service as the
    /// logged-in user.
    fn requires_session(&self) -> bool {
        !matches!(
            self,
            Commands::Login { .. } | Commands::Signup { .. } | Commands::Logout | Commands::Status
        )
    }
}

#[derive(Debug, Subcommand)]
enum OffersCommands {
    /// List offers
    List,
    /// Create a single offer
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        value_props: String,
        #[arg(long)]
        ideal_use_cases: String,
        /// Target role; repeat or comma-separate for several
        #[arg(long = "role", value_delimiter = ',')]
        target_roles: Vec<String>,
        /// Target industry; repeat or comma-separate for several
        #[arg(long = "industry", value_delimiter = ',')]
        target_industries: Vec<String>,
    },
    /// Create every offer in a YAML file
    Import { file: PathBuf },
}

#[derive(Debug, Subcommand)]
enum LeadsCommands {
    /// List uploaded leads
    List,
    /// Upload a CSV batch of leads
    Upload { file: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loads `.env` first so clap's env fallbacks can see it.
    let config = leadscore_core::load_app_config()?;
    let cli = Cli::parse();

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(env = %config.env, base_url = %config.api_base_url, "configuration loaded");

    let store = CredentialStore::open(&config.credentials_path);
    let client = ApiClient::new(ClientConfig::from_app_config(&config), store)?;
    let notices = tokio::spawn(print_session_notices(client.subscribe()));
    client.restore_session();

    let workflow = Workflow::new(client);
    let outcome = commands::run(&workflow, cli.command).await;

    // Closing the client ends the event stream once pending notices are out.
    drop(workflow);
    let _ = tokio::time::timeout(NOTICE_GRACE, notices).await;

    outcome
}

async fn print_session_notices(mut events: broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::Expired) => eprintln!("session expired, please log in again"),
            Ok(event) => tracing::debug!(?event, "session event"),
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "session notices lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
