use clap::{Parser, Subcommand};
use rewind::{format_error_with_help, RewindError};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod cli;

#[derive(Parser)]
#[command(name = "rewind")]
#[command(about = "Install an earlier release of an App Store application")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in to the App Store and store the credentials
    Login {
        /// Apple ID (prompted for when omitted)
        #[arg(short, long)]
        account: Option<String>,
    },
    /// Sign out and delete the stored credentials
    Logout,
    /// Show whether the stored credentials still work
    Status,
    /// List the releases available for an app
    Versions {
        /// App Store share link or numeric app id
        link: String,
        /// Use the public release history service instead of the App Store
        #[arg(long)]
        history: bool,
    },
    /// Download an earlier release and serve it for installation
    Downgrade {
        /// App Store share link or numeric app id
        link: String,
        /// Use the public release history service instead of the App Store
        #[arg(long)]
        history: bool,
        /// Release id to install (prompted for when omitted)
        #[arg(short, long)]
        release: Option<String>,
    },
    /// Inspect configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Print the config file location
    Path,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Login { account } => cli::login::run(account).await,
        Commands::Logout => cli::logout::run(),
        Commands::Status => cli::status::run().await,
        Commands::Versions { link, history } => cli::versions::run(link, history).await,
        Commands::Downgrade {
            link,
            history,
            release,
        } => {
            cli::downgrade::run(cli::downgrade::DowngradeOptions {
                link,
                history,
                release,
            })
            .await
        }
        Commands::Config(cmd) => match cmd {
            ConfigCommands::Show => cli::config::show(),
            ConfigCommands::Path => cli::config::path(),
        },
    };

    // Handle result and exit codes
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(RewindError::Cancelled) => {
            eprintln!("\nCancelled");
            ExitCode::from(130)
        }
        Err(e) => {
            eprintln!("\n{}", format_error_with_help(&e));
            ExitCode::FAILURE
        }
    }
}
