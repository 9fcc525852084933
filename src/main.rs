//! Stub Matcher - CLI Entry Point

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use stub_matcher::{EngineConfig, LookupQuery, StubEngine};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "stub-matcher",
    about = "Stub-matching engine for request/response mocking",
    version
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "stub-matcher.yaml")]
    config: PathBuf,

    /// Directory of stub definition files (overrides stubs_dir)
    #[arg(short, long)]
    stubs: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print default configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,

    /// Print every registered stub as JSON and exit
    #[arg(long)]
    list: bool,

    /// Resolve one lookup query, given as JSON, and exit
    #[arg(short, long, value_name = "JSON")]
    query: Option<String>,

    /// Resolve newline-delimited JSON lookup queries from stdin
    #[arg(long)]
    stdin: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries results
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.print_config {
        print!("{}", serde_yaml::to_string(&EngineConfig::default())?);
        return Ok(());
    }

    let mut config = if args.config.exists() {
        info!(path = ?args.config, "Loading configuration");
        EngineConfig::from_file(&args.config)?
    } else if args.validate {
        anyhow::bail!("Configuration file not found: {:?}", args.config);
    } else {
        info!("Using default configuration");
        EngineConfig::default()
    };

    if let Some(dir) = args.stubs {
        config.stubs_dir = Some(dir);
    }

    if args.validate {
        config.validate()?;
        println!(
            "Configuration is valid ({} inline stubs defined)",
            config.stubs.len()
        );
        return Ok(());
    }

    let (engine, _) = StubEngine::from_config(&config).await?;

    if args.list {
        println!("{}", serde_json::to_string_pretty(&engine.list())?);
        return Ok(());
    }

    if let Some(raw) = args.query {
        let query: LookupQuery = serde_json::from_str(&raw)?;
        let output = engine.find(&query)?;
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if args.stdin {
        serve_stdin(&engine).await?;
        let stats = engine.stats();
        info!(
            total = stats.total,
            matched = stats.matched,
            unmatched = stats.unmatched,
            "Input closed"
        );
        return Ok(());
    }

    println!(
        "Loaded {} stubs; pass --list, --query or --stdin to use them",
        engine.stats().stubs
    );
    Ok(())
}

/// Answer one JSON line per query line until stdin closes.
async fn serve_stdin(engine: &StubEngine) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<LookupQuery>(&line) {
            Ok(query) => match engine.find(&query) {
                Ok(output) => serde_json::to_value(&output)?,
                Err(e) => serde_json::json!({ "error": e.to_string() }),
            },
            Err(e) => serde_json::json!({ "error": format!("Invalid query: {}", e) }),
        };

        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
        stdout.flush().await?;
    }
    Ok(())
}
