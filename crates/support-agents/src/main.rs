use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use support_agents::{Supervisor, SupportConfig, TurnRequest};
use tracing::info;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file (SUPPORT_* environment variables override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit one message for a ticket and print the outcome as JSON
    Submit {
        #[arg(long)]
        session: String,
        #[arg(long)]
        ticket: String,
        #[arg(long)]
        user: String,
        #[arg(long, default_value = "chat")]
        channel: String,
        message: String,
    },
    /// Run the sample tickets against the reference handlers
    Demo,
    /// Print the stored state of a session
    Show {
        #[arg(long)]
        session: String,
    },
    /// Print a user's most recent archived tickets
    History {
        #[arg(long)]
        user: String,
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
}

const DEMO_TICKETS: [(&str, &str, &str); 5] = [
    ("user-001", "T-100", "How do I log in to the app?"),
    ("user-001", "T-101", "I was charged twice, I want my money back"),
    ("user-001", "T-102", "How many experiences do I have left on my subscription?"),
    ("user-002", "T-103", "Please cancel my reservation res-2001"),
    ("user-003", "T-104", "Something odd happened"),
];

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let config = SupportConfig::load(args.config.as_deref())?;
    let supervisor = Supervisor::from_config(&config).await?;
    info!(
        threshold = config.policy.confidence_threshold,
        timeout_ms = supervisor.turn_timeout().as_millis() as u64,
        persistent = config.state_dir.is_some(),
        "Support supervisor starting"
    );

    let result = run(&supervisor, args.command).await;
    supervisor.shutdown().await;
    result
}

async fn run(supervisor: &Supervisor, command: Command) -> Result<()> {
    match command {
        Command::Submit {
            session,
            ticket,
            user,
            channel,
            message,
        } => {
            let request = TurnRequest::new(session, ticket, user, message).with_channel(channel);
            match supervisor.handle_turn(request).await {
                Ok(outcome) => println!("{}", serde_json::to_string_pretty(&outcome)?),
                Err(e) => anyhow::bail!(e),
            }
        }
        Command::Demo => {
            for (i, (user, ticket, message)) in DEMO_TICKETS.iter().enumerate() {
                let request =
                    TurnRequest::new(format!("demo-{}", i + 1), *ticket, *user, *message);
                let outcome = supervisor.handle_turn(request).await?;
                println!(
                    "{ticket} [{user}] {:?} -> {}{}",
                    message,
                    outcome.status,
                    outcome
                        .escalation_reason
                        .map(|r| format!(" ({r})"))
                        .unwrap_or_default()
                );
                println!("    {}", outcome.response);
            }
        }
        Command::Show { session } => {
            let state = supervisor
                .session(&session)
                .await
                .context("Failed to read session store")?
                .context(format!("No session named {session}"))?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        Command::History { user, limit } => {
            let entries = supervisor
                .recent_history(&user, limit)
                .await
                .context("Failed to read history archive")?;
            for entry in &entries {
                println!("{}", serde_json::to_string(entry)?);
            }
        }
    }
    Ok(())
}
