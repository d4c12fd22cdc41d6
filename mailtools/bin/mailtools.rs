//! Command-line front end for the mailtools spool and QMQP transfer.
//!
//! - `serve` receives QMQP messages into the spool until interrupted
//! - `enqueue` writes a message into the spool
//! - `send` delivers a queue file directly
//! - `queue` lists, flushes, clears and revives spool entries

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::{
    io::BufReader,
    path::{Path, PathBuf},
};

use clap::{Parser, Subcommand};
use mailtools::{Controller, MailTools};
use mailtools_common::{Message, RecipientInput, logging};
use mailtools_spool::{SpoolEntry, spool::now};
use tokio::io::AsyncReadExt;

/// Spool, send and receive mail over QMQP
#[derive(Parser, Debug)]
#[command(name = "mailtools")]
#[command(about = "Spool, send and receive mail over QMQP", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file, in RON
    #[arg(short, long, env = "MAILTOOLS_CONFIG")]
    config: Option<PathBuf>,

    /// Spool directory, overriding the configuration
    #[arg(short, long, env = "MAILDROP_DIR")]
    spool_path: Option<PathBuf>,

    /// Dead-letter directory, overriding the configuration
    #[arg(short, long, env = "MAILDROP_DEAD_LETTERS")]
    dead_letter: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Receive QMQP messages into the spool
    Serve,
    /// Deliver a queue file directly, bypassing the spool
    Send {
        /// Queue file to deliver
        file: PathBuf,
    },
    /// Write a message into the spool
    Enqueue {
        /// Return path; the null sender when omitted
        #[arg(short, long, default_value = "")]
        from: String,

        /// Recipient, in any accepted recipient shape
        #[arg(short, long = "to")]
        to: Vec<String>,

        /// File of recipients, one per line
        #[arg(short, long)]
        recipients: Option<PathBuf>,

        /// Encode each recipient into the return path
        #[arg(long)]
        verp: bool,

        /// Message body; read from standard input when omitted
        body: Option<PathBuf>,
    },
    /// Spool management commands
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
}

#[derive(Subcommand, Debug)]
enum QueueAction {
    /// List spool entries
    List,
    /// Deliver every due entry
    Flush,
    /// Delete every entry
    Clear {
        /// Skip confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// List dead-lettered entries
    Dead,
    /// Move a dead-lettered entry back into the spool
    Revive {
        /// Name of the dead letter
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init();

    let controller: Controller = MailTools::load(cli.config.as_deref())?
        .with_spool_paths(cli.spool_path, cli.dead_letter)?
        .into();

    match cli.command {
        Commands::Serve => controller.serve().await?,
        Commands::Send { file } => {
            let response = controller.send(&file).await?;
            println!("{response}");
        }
        Commands::Enqueue {
            from,
            to,
            recipients,
            verp,
            body,
        } => {
            let message =
                build_message(from, to, recipients.as_deref(), verp, body.as_deref()).await?;
            let name = controller.enqueue(&message).await?;
            println!("Queued {name}");
        }
        Commands::Queue { action } => match action {
            QueueAction::List => {
                let entries = controller.spool().entries().await?;
                print_entries(&entries);
            }
            QueueAction::Flush => {
                let report = controller.flush().await?;
                println!("{report}");
            }
            QueueAction::Clear { yes } => {
                if !yes {
                    println!(
                        "Refusing to clear {} without --yes",
                        controller.spool().path().display()
                    );
                    return Ok(());
                }
                let removed = controller.spool().clear().await?;
                println!("Removed {removed} entry(ies)");
            }
            QueueAction::Dead => {
                let entries = controller.spool().dead_letters().await?;
                print_entries(&entries);
            }
            QueueAction::Revive { name } => {
                let revived = controller.spool().revive(&name).await?;
                println!("Revived {name} as {revived}");
            }
        },
    }

    Ok(())
}

async fn build_message(
    from: String,
    to: Vec<String>,
    recipients: Option<&Path>,
    verp: bool,
    body: Option<&Path>,
) -> anyhow::Result<Message> {
    let body = match body {
        Some(path) => tokio::fs::read_to_string(path).await?,
        None => {
            let mut body = String::new();
            tokio::io::stdin().read_to_string(&mut body).await?;
            body
        }
    };

    let mut builder = Message::builder().body(body).return_path(from).recipients(to);
    if let Some(path) = recipients {
        let file = std::fs::File::open(path)?;
        builder = builder.recipient(RecipientInput::reader(BufReader::new(file)));
    }

    let mut message = builder.build()?;
    if message.recipients().is_empty() {
        anyhow::bail!("No recipients given");
    }
    if verp && !message.verp() {
        anyhow::bail!("Return path {:?} cannot carry VERP", message.return_path());
    }

    Ok(message)
}

fn print_entries(entries: &[SpoolEntry]) {
    let now = now();

    println!("{:<28} {:<10} {:<20}", "ENTRY", "STATE", "DUE");
    println!("{}", "-".repeat(60));

    for entry in entries {
        let due = entry.name.epoch().saturating_sub(now);
        let due = if due == 0 {
            "now".to_string()
        } else {
            format!("in {due}s")
        };
        println!(
            "{:<28} {:<10} {due:<20}",
            entry.name.to_string(),
            entry.name.state().to_string()
        );
    }

    println!("\nTotal: {} entry(ies)", entries.len());
}
