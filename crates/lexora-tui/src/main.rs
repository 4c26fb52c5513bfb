use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lexora_core::{AnswerFragments, Config, Gateway, HttpGateway, Session, SessionOptions};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use tui::{EventHandler, Tui};

#[derive(Parser)]
#[command(name = "lexora")]
#[command(about = "Chat with your documents through a Lexora backend")]
#[command(version)]
struct Cli {
    /// Backend base URL (overrides the config file)
    #[arg(long, env = "LEXORA_API_URL")]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List documents known to the backend
    List,
    /// Upload a document (.pdf, .docx or .txt)
    Upload {
        /// Path of the file to upload
        file: PathBuf,
    },
    /// Delete a document by name
    Delete {
        /// Document name as shown by `list`
        name: String,
    },
    /// Ask a single question and print the answer
    Ask {
        /// Your question
        question: String,
        /// Wait for the whole answer instead of streaming it
        #[arg(long)]
        no_stream: bool,
    },
    /// Show the effective settings
    Config {
        /// Write them to the config file, including any --api-url override
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load().unwrap_or_else(|e| {
        eprintln!("Ignoring unreadable config: {}", e);
        Config::new()
    });
    if let Some(url) = cli.api_url {
        config.api_url = url;
    }

    match cli.command {
        None => {
            init_logging(Some(&config.log_path()?))?;
            run_tui(config).await
        }
        Some(command) => {
            init_logging(None)?;
            run_command(command, &config).await
        }
    }
}

/// The TUI owns the terminal, so its logs go to a file.
fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

async fn run_tui(config: Config) -> Result<()> {
    info!(api_url = %config.api_url, "starting lexora");

    let gateway = Arc::new(HttpGateway::new(&config.api_url));
    let options = SessionOptions {
        stream_idle_timeout: config.stream_idle_timeout(),
        ..Default::default()
    };
    let (session, session_events) = Session::new(gateway, options);
    let mut app = App::new(session, config.api_url.clone());
    app.session.refresh_documents();

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new(session_events);

    let result = run_loop(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    info!("lexora exited");
    result
}

async fn run_loop(terminal: &mut Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event)?,
            None => break,
        }
    }
    Ok(())
}

async fn run_command(command: Commands, config: &Config) -> Result<()> {
    let gateway = HttpGateway::new(&config.api_url);

    match command {
        Commands::List => {
            let names = gateway
                .list_documents()
                .await
                .context("Failed to fetch documents")?;
            if names.is_empty() {
                println!("No documents uploaded yet.");
            }
            for name in names {
                println!("{}", name);
            }
        }
        Commands::Upload { file } => {
            let message = gateway
                .upload_document(&file)
                .await
                .with_context(|| format!("Upload of {} failed", file.display()))?;
            println!("{}", message);
        }
        Commands::Delete { name } => {
            let message = gateway
                .delete_document(&name)
                .await
                .with_context(|| format!("Delete of {} failed", name))?;
            println!("{}", message);
        }
        Commands::Ask { question, no_stream } => {
            if question.trim().is_empty() {
                anyhow::bail!("Question cannot be empty");
            }
            if no_stream {
                let answer = gateway.ask(&question).await.context("Failed to ask question")?;
                println!("{}", answer);
            } else {
                stream_to_stdout(&gateway, &question, config).await?;
            }
        }
        Commands::Config { save } => {
            let path = Config::get_config_path()?;
            if save {
                config
                    .save()
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!(path = %path.display(), "config saved");
            }
            println!("config file: {}", path.display());
            println!("api_url: {}", config.api_url);
            match config.stream_idle_timeout() {
                Some(timeout) => println!("stream idle timeout: {}s", timeout.as_secs()),
                None => println!("stream idle timeout: none"),
            }
            println!("log file: {}", config.log_path()?.display());
        }
    }

    Ok(())
}

async fn stream_to_stdout(gateway: &dyn Gateway, question: &str, config: &Config) -> Result<()> {
    let mut fragments = AnswerFragments::open(gateway, question, config.stream_idle_timeout())
        .await
        .context("Failed to ask question")?;

    let mut stdout = std::io::stdout();
    while let Some(fragment) = fragments.next().await {
        let text = fragment.context("Answer stream interrupted")?;
        write!(stdout, "{}", text)?;
        stdout.flush()?;
    }
    writeln!(stdout)?;
    Ok(())
}
