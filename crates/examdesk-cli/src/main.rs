//! examdesk CLI: take timed certification exams from the terminal.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use examdesk_client::ArtifactKind;
use examdesk_core::SessionError;

mod commands;
mod display;

#[derive(Parser)]
#[command(name = "examdesk", version, about = "Terminal client for timed certification exams")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start (or rejoin) an exam and answer it interactively
    Take {
        /// Exam to start
        #[arg(long)]
        exam: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Reattach to a live session by id
    Resume {
        /// Session to resume
        #[arg(long)]
        session: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show the server's view of a session
    Status {
        /// Session to inspect
        #[arg(long)]
        session: String,

        /// Print the raw snapshot as JSON
        #[arg(long)]
        json: bool,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Download a certificate, results spreadsheet, or backup
    Download {
        /// What to download: certificate, results, backup
        kind: ArtifactKind,

        /// Certificate, exam, or backup id
        #[arg(long)]
        id: String,

        /// Output directory (defaults to the configured download_dir)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Check a certificate by its verification code
    Verify {
        /// Verification code, e.g. CERT-2026-000123
        #[arg(long)]
        code: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show the signed-in user
    Whoami {
        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create a starter config file
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("examdesk=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Take { exam, config } => commands::take::execute(exam, config).await,
        Commands::Resume { session, config } => commands::take::resume(session, config).await,
        Commands::Status {
            session,
            json,
            config,
        } => commands::status::execute(session, json, config).await,
        Commands::Download {
            kind,
            id,
            output,
            config,
        } => commands::download::execute(kind, id, output, config).await,
        Commands::Verify { code, config } => commands::verify::execute(code, config).await,
        Commands::Whoami { config } => commands::whoami::execute(config).await,
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        let auth_expired = e.chain().any(|cause| {
            matches!(
                cause.downcast_ref::<SessionError>(),
                Some(SessionError::AuthenticationExpired)
            )
        });
        if auth_expired {
            eprintln!("Your login has expired. Sign in again and update EXAMDESK_TOKEN.");
            process::exit(2);
        }
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
