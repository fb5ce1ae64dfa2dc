#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! CLI for a POP3 mailbox over TLS

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use pop3_tls_client::{MailboxEntry, Pop3Client, Pop3Config};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pop3-cli")]
#[command(about = "List, read, and delete mail over POP3/TLS")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// List messages in the mailbox
    List,

    /// Print a single message
    Show {
        /// Message number as shown by `list`
        id: u32,
    },

    /// Delete a message (committed when the session ends)
    Delete {
        /// Message number as shown by `list`
        id: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = Pop3Config::from_env()?;
    let client: Pop3Client = Pop3Client::new(config)?;

    let greeting = client.connect().await?;
    if !greeting.success {
        bail!("Server refused connection: {}", greeting.status_text());
    }

    let login = client.authenticate().await?;
    if !login.success {
        client.disconnect().await.ok();
        bail!("Login failed: {}", login.status_text());
    }

    let outcome = match &args.command {
        Command::List => cmd_list(&client, &args).await,
        Command::Show { id } => cmd_show(&client, &args, *id).await,
        Command::Delete { id } => cmd_delete(&client, &args, *id).await,
    };

    // QUIT commits deletions, so the session always ends here.
    let disconnected = client.disconnect().await.context("Failed to end session");
    outcome?;
    disconnected?;
    Ok(())
}

async fn cmd_list(client: &Pop3Client, args: &Args) -> anyhow::Result<()> {
    let entries = client.list_entries().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        print_entry_table(&entries);
    }

    Ok(())
}

async fn cmd_show(client: &Pop3Client, args: &Args, id: u32) -> anyhow::Result<()> {
    let response = client.retrieve(id).await?;
    if !response.success {
        bail!("Could not retrieve message {id}: {}", response.status_text());
    }

    if args.json {
        let message = json!({ "id": id, "message": response.payload() });
        println!("{}", serde_json::to_string_pretty(&message)?);
    } else {
        print!("{}", response.payload());
    }

    Ok(())
}

async fn cmd_delete(client: &Pop3Client, args: &Args, id: u32) -> anyhow::Result<()> {
    let response = client.delete(id).await?;
    if !response.success {
        bail!("Could not delete message {id}: {}", response.status_text());
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&json!({ "deleted": id }))?);
    } else {
        println!("Marked message {id} for deletion");
    }

    Ok(())
}

fn print_entry_table(entries: &[MailboxEntry]) {
    if entries.is_empty() {
        println!("No messages.");
        return;
    }

    println!("{:<8} {:>12}", "ID", "Size");
    println!("{}", "-".repeat(21));

    for entry in entries {
        println!("{:<8} {:>12}", entry.id, format_size(entry.size));
    }

    println!("\n{} message(s)", entries.len());
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else {
        format!("{} KiB", bytes.div_ceil(1024))
    }
}
