mod config;
mod error;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use bridge::Bridge;
use clap::{Parser, Subcommand};
use runtime::{DeepSeekBackend, Message, Orchestrator, describe_tools};
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use error::{Error, Result};

const SYSTEM_PROMPT: &str = "You are dbchat, an assistant that answers questions about a \
SQLite database. Use the provided tools to inspect tables and run queries. Be concise.";
const CONFIG_FILE: &str = "dbchat.toml";
const TOOL_BINARY: &str = "dbchat-tools";

type ChatOrchestrator = Orchestrator<DeepSeekBackend, Bridge>;

#[derive(Parser)]
#[command(name = "dbchat")]
#[command(about = "Chat with your database through an LLM", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the config file (default: ./dbchat.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session
    Chat,
    /// Ask a single question and print the answer
    Ask {
        /// The question to ask
        question: String,
    },
    /// List the tools offered to the model
    Tools,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Chat);

    if matches!(command, Commands::Tools) {
        cmd_tools();
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    let backend = DeepSeekBackend::builder(config.model.api_key.clone(), &config.model.model)
        .base_url(&config.model.base_url)
        .timeout(config.model.timeout())
        .build()?;
    let bridge = Bridge::new(config.service_config(&default_tool_command()))?;
    info!(backend = %backend, tools = %bridge.base_url(), "starting");

    let orchestrator = Orchestrator::new(backend, bridge.clone());
    let result = match command {
        Commands::Ask { question } => cmd_ask(&orchestrator, &question).await,
        Commands::Chat | Commands::Tools => cmd_chat(&orchestrator, &config).await,
    };

    bridge.shutdown().await;
    result
}

async fn cmd_chat(orchestrator: &ChatOrchestrator, config: &Config) -> Result<()> {
    println!("dbchat v{}", env!("CARGO_PKG_VERSION"));
    println!("Model: {}", orchestrator.backend().model());
    println!("Database: {}", config.tools.database.display());
    println!("Type 'quit' or Ctrl+D to exit.\n");

    let mut messages = vec![Message::system(SYSTEM_PROMPT)];
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "quit" || input == "exit" {
            break;
        }

        messages.push(Message::user(input));
        let reply = orchestrator.handle_request(&messages).await;
        println!("\n{}\n", reply.content);
        messages.push(reply);
    }

    println!("\nBye.");
    Ok(())
}

async fn cmd_ask(orchestrator: &ChatOrchestrator, question: &str) -> Result<()> {
    let messages = [Message::system(SYSTEM_PROMPT), Message::user(question)];
    let reply = orchestrator.handle_request(&messages).await;
    println!("{}", reply.content);
    Ok(())
}

fn cmd_tools() {
    for tool in describe_tools() {
        let required = tool.parameters["required"]
            .as_array()
            .map(|params| {
                params
                    .iter()
                    .filter_map(|p| p.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();
        println!("{:<16}  {}", tool.name, tool.description);
        if !required.is_empty() {
            println!("{:<16}  requires: {required}", "");
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) if !path.exists() => {
            return Err(Error::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }
        Some(path) => Config::load(path)?,
        None if Path::new(CONFIG_FILE).exists() => Config::load(CONFIG_FILE)?,
        None => Config::default(),
    };
    config.apply_env(|name| std::env::var(name).ok())?;
    Ok(config)
}

/// `dbchat-tools` next to the running executable, or on `PATH`.
fn default_tool_command() -> PathBuf {
    let binary = format!("{TOOL_BINARY}{}", std::env::consts::EXE_SUFFIX);
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(&binary)))
        .filter(|candidate| candidate.exists())
        .unwrap_or_else(|| PathBuf::from(binary))
}
