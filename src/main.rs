//! Memkeep CLI
//!
//! Thin front end over the memory library: facts, daily notes, search,
//! prompt context and session maintenance.

use clap::{Parser, Subcommand};
use memkeep::memory::daily::SESSION_NOTES;
use memkeep::session::CompactionOutcome;
use memkeep::{ApproxTokenCounter, LlmSummarizer, MemkeepConfig, MemoryManager};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Memkeep - plain-text memory for agents
#[derive(Parser, Debug)]
#[command(name = "memkeep")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Storage root (defaults to ~/.memkeep)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Agent whose sessions to use
    #[arg(long, global = true)]
    agent: Option<String>,

    /// Path to the TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the storage layout
    Init,
    /// Long-term facts
    #[command(subcommand)]
    Fact(FactCommand),
    /// Daily notes
    #[command(subcommand)]
    Note(NoteCommand),
    /// Search long-term memory and daily notes
    Search { pattern: String },
    /// Print the assembled memory context
    Context,
    /// Conversation sessions
    #[command(subcommand)]
    Session(SessionCommand),
    /// Compact a session transcript
    Compact { session: String },
}

#[derive(Subcommand, Debug)]
enum FactCommand {
    /// Add a fact (duplicates are skipped unless --allow-duplicate)
    Add {
        section: String,
        fact: String,
        #[arg(long)]
        allow_duplicate: bool,
    },
    /// Remove a fact
    Remove { section: String, fact: String },
    /// List the facts of one section
    List { section: String },
}

#[derive(Subcommand, Debug)]
enum NoteCommand {
    /// Add a timestamped note to today's file
    Add {
        content: String,
        #[arg(long, default_value = SESSION_NOTES)]
        section: String,
    },
    /// Print a day's notes (YYYY-MM-DD, defaults to today)
    Show { date: Option<String> },
}

#[derive(Subcommand, Debug)]
enum SessionCommand {
    /// Start a new session
    New,
    /// List sessions, most recent first
    List,
    /// Print a session's recent conversation
    Show { session: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = resolve_config(&cli)?;
    info!("Storage root: {:?}", config.root);

    let mut manager = MemoryManager::open(config.clone(), Arc::new(ApproxTokenCounter)).await?;
    if let Some(summarizer) = &config.summarizer {
        manager.set_summarizer(Some(Arc::new(LlmSummarizer::from_config(summarizer)?)));
    }

    match cli.command {
        Command::Init => println!("Initialized {}", config.root.display()),
        Command::Fact(command) => run_fact(&mut manager, command).await?,
        Command::Note(command) => run_note(&manager, command).await?,
        Command::Search { pattern } => {
            for line in manager.facts().search(&pattern).await? {
                println!("MEMORY.md: {}", line);
            }
            for (date, line) in manager.daily().search(&pattern).await? {
                println!("{}: {}", date, line);
            }
        }
        Command::Context => println!("{}", manager.build_context().await?),
        Command::Session(command) => run_session(&mut manager, command).await?,
        Command::Compact { session } => {
            if !manager.resume_session(&session).await? {
                anyhow::bail!("no such session: {}", session);
            }
            match manager.compact().await? {
                CompactionOutcome::NothingToDo => println!("Nothing to compact"),
                CompactionOutcome::Compacted(result) => println!(
                    "Compacted {} entries, saved {} tokens ({} recent tokens now)",
                    result.entries_removed, result.tokens_saved, result.recent_tokens_after
                ),
            }
        }
    }

    Ok(())
}

fn resolve_config(cli: &Cli) -> anyhow::Result<MemkeepConfig> {
    let config_path = match &cli.config {
        Some(path) => Some(path.clone()),
        None => memkeep::config::default_root().ok().map(|root| root.join("config.toml")),
    };
    let mut config = MemkeepConfig::load(config_path.as_deref())?;
    if let Some(root) = &cli.root {
        config.root = root.clone();
    }
    if let Some(agent) = &cli.agent {
        config.agent_id = agent.clone();
    }
    Ok(config)
}

async fn run_fact(manager: &mut MemoryManager, command: FactCommand) -> anyhow::Result<()> {
    match command {
        FactCommand::Add {
            section,
            fact,
            allow_duplicate,
        } => {
            if manager.facts().add_fact(&section, &fact, !allow_duplicate).await? {
                println!("Added to {}", section);
            } else {
                println!("Not added (blank or already known)");
            }
        }
        FactCommand::Remove { section, fact } => {
            if manager.facts().remove_fact(&section, &fact).await? {
                println!("Removed from {}", section);
            } else {
                println!("Not found");
            }
        }
        FactCommand::List { section } => {
            for fact in manager.facts().list_facts(&section).await? {
                println!("- {}", fact);
            }
        }
    }
    Ok(())
}

async fn run_note(manager: &MemoryManager, command: NoteCommand) -> anyhow::Result<()> {
    match command {
        NoteCommand::Add { content, section } => {
            manager.daily().add_entry(&content, &section).await?;
            println!("Noted under {}", section);
        }
        NoteCommand::Show { date } => {
            let text = match date {
                Some(date) => {
                    let date = chrono::NaiveDate::parse_from_str(&date, "%Y-%m-%d")?;
                    manager.daily().read_date(date).await?
                }
                None => manager.daily().read_today().await?,
            };
            print!("{}", text);
        }
    }
    Ok(())
}

async fn run_session(manager: &mut MemoryManager, command: SessionCommand) -> anyhow::Result<()> {
    match command {
        SessionCommand::New => {
            let meta = manager.start_session().await?;
            println!("{}", meta.id);
        }
        SessionCommand::List => {
            for meta in manager.sessions().list().await? {
                println!(
                    "{}  updated {}  {} entries  {} tokens  {} compactions",
                    meta.id,
                    meta.updated_at.format("%Y-%m-%d %H:%M"),
                    meta.entry_count,
                    meta.token_count,
                    meta.compaction_count
                );
            }
        }
        SessionCommand::Show { session } => {
            if !manager.resume_session(&session).await? {
                anyhow::bail!("no such session: {}", session);
            }
            if let Some(transcript) = manager.transcript() {
                for message in transcript.build_conversation_history() {
                    println!("[{}] {}\n", message.role, message.content);
                }
            }
        }
    }
    Ok(())
}
