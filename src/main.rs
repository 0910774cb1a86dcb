use std::fs::File;
use std::io::Write;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod app;
mod client;
mod config;
mod crawl;
mod error;
mod handler;
mod state;
mod tui;
mod ui;

#[cfg(test)]
mod test_server;

use app::App;
use client::QaClient;
use config::{Config, Endpoints};
use crawl::CrawlClient;
use state::{ChatMessage, ChatRole};
use tui::EventHandler;

#[derive(Parser)]
#[command(name = "qachat")]
#[command(about = "Chat with a question-answering backend and feed it new sources", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Endpoint that streams answers
    #[arg(long, global = true, env = "QACHAT_SEARCH_URL", value_name = "URL")]
    search_url: Option<String>,

    /// Endpoint that receives like/dislike feedback
    #[arg(long, global = true, env = "QACHAT_FEEDBACK_URL", value_name = "URL")]
    feedback_url: Option<String>,

    /// Endpoint that starts crawl jobs
    #[arg(long, global = true, env = "QACHAT_CRAWL_URL", value_name = "URL")]
    crawl_url: Option<String>,

    /// Seconds to wait for a connection to any service
    #[arg(long, global = true, env = "QACHAT_CONNECT_TIMEOUT", value_name = "SECS")]
    connect_timeout: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask one question and stream the answer to stdout
    Ask {
        /// Your question
        question: String,
    },
    /// Crawl a page and store it under a topic
    Crawl {
        /// Page to crawl
        url: String,
        /// Topic to file the page under
        #[arg(short, long, default_value = "")]
        topic: String,
    },
    /// Show the effective configuration
    Config {
        /// Save the effective configuration to the config file
        #[arg(long)]
        write: bool,
    },
}

impl Cli {
    fn overrides(&self) -> Config {
        Config {
            search_url: self.search_url.clone(),
            feedback_url: self.feedback_url.clone(),
            crawl_url: self.crawl_url.clone(),
            connect_timeout_secs: self.connect_timeout,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let interactive = cli.command.is_none();
    init_logging(interactive)?;

    let file_config = Config::load().unwrap_or_else(|e| {
        warn!("{:#}; using defaults", e);
        Config::new()
    });
    let config = file_config.merge(cli.overrides());
    let endpoints = config.endpoints();

    match cli.command {
        None => run_tui(endpoints).await,
        Some(Commands::Ask { question }) => ask_once(&endpoints, &question).await,
        Some(Commands::Crawl { url, topic }) => crawl_once(&endpoints, &url, &topic).await,
        Some(Commands::Config { write }) => show_config(&config, write),
    }
}

/// The TUI owns the terminal, so its logs go to a file instead of stderr.
fn init_logging(interactive: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{}=info", env!("CARGO_CRATE_NAME")).into());

    if interactive {
        let log_dir = dirs::cache_dir()
            .context("Could not determine cache directory")?
            .join("qa-chat");
        std::fs::create_dir_all(&log_dir)?;
        let file = File::create(log_dir.join("qa-chat.log"))?;

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
    Ok(())
}

async fn run_tui(endpoints: Endpoints) -> Result<()> {
    info!(search_url = %endpoints.search_url, "starting chat");

    let mut events = EventHandler::new();
    let mut app = App::new(endpoints, events.sender())?;

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let result = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;
            match events.next().await {
                Some(event) => handler::handle_event(&mut app, event)?,
                None => break,
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    tui::restore()?;
    info!("chat closed");
    result
}

async fn ask_once(endpoints: &Endpoints, question: &str) -> Result<()> {
    if question.trim().is_empty() {
        return Ok(());
    }

    let qa = QaClient::new(endpoints.http_client()?, &endpoints.search_url, &endpoints.feedback_url);
    let messages = vec![
        ChatMessage::greeting(),
        ChatMessage::new(ChatRole::User, question),
    ];

    let mut out = ChunkWriter::new(std::io::stdout());
    qa.ask(&messages, |chunk| out.write(chunk))
        .await
        .with_context(|| format!("Could not get an answer from {}", endpoints.search_url))?;

    out.finish().context("Could not write the answer to stdout")
}

/// Writes streamed chunks as they arrive and keeps the first write error
struct ChunkWriter<W: Write> {
    out: W,
    error: Option<std::io::Error>,
}

impl<W: Write> ChunkWriter<W> {
    fn new(out: W) -> Self {
        Self { out, error: None }
    }

    fn write(&mut self, chunk: &str) {
        if self.error.is_some() {
            return;
        }
        let written = self
            .out
            .write_all(chunk.as_bytes())
            .and_then(|_| self.out.flush());
        if let Err(e) = written {
            warn!("stopped writing answer: {}", e);
            self.error = Some(e);
        }
    }

    /// End the answer with a newline, or return the first error seen
    fn finish(mut self) -> std::io::Result<()> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        self.out.write_all(b"\n")?;
        self.out.flush()
    }
}

async fn crawl_once(endpoints: &Endpoints, url: &str, topic: &str) -> Result<()> {
    let crawler = CrawlClient::new(endpoints.http_client()?, &endpoints.crawl_url);
    let outcome = crawler
        .crawl(url, topic)
        .await
        .with_context(|| format!("Could not reach {}", endpoints.crawl_url))?;

    if outcome.success {
        println!("{}", outcome.message);
        Ok(())
    } else {
        anyhow::bail!("Crawl failed: {}", outcome.message)
    }
}

fn show_config(config: &Config, write: bool) -> Result<()> {
    let endpoints = config.endpoints();
    println!("config file:     {}", Config::get_config_path()?.display());
    println!("search url:      {}", endpoints.search_url);
    println!("feedback url:    {}", endpoints.feedback_url);
    println!("crawl url:       {}", endpoints.crawl_url);
    println!("connect timeout: {}s", endpoints.connect_timeout.as_secs());

    if write {
        let path = config.save()?;
        println!("saved to {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct BrokenPipe {
        attempts: usize,
    }

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            self.attempts += 1;
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_chunk_writer_appends_newline() {
        let mut out = ChunkWriter::new(Vec::new());
        out.write("Vitamin ");
        out.write("B3.");
        assert!(out.error.is_none());
        assert_eq!(out.out, b"Vitamin B3.");

        let mut buf = Vec::new();
        let mut out = ChunkWriter::new(&mut buf);
        out.write("done");
        out.finish().unwrap();
        assert_eq!(buf, b"done\n");
    }

    #[test]
    fn test_chunk_writer_keeps_first_error() {
        let mut out = ChunkWriter::new(BrokenPipe { attempts: 0 });
        out.write("one");
        out.write("two");
        out.write("three");

        assert_eq!(out.out.attempts, 1);
        let err = out.finish().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
