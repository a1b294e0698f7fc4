//! nomroute CLI - run bean routing configurations from the command line
//!
//! Validates cartridge configurations and runs them over JSON inputs, either
//! printing the routed messages (dry run) or publishing them to NATS JetStream.

use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use nomroute::dispatch::{DispatchTemplate, MemoryDispatcher, NatsConfig, NatsDispatcher};
use nomroute::exchange::CHARSET_PROPERTY;
use nomroute::{Body, CartridgeConfig, Exchange, TransformProcessor};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nomroute")]
#[command(
    version,
    about = "Run bean extraction and routing over JSON documents",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a cartridge configuration without running it
    Validate {
        /// Path to the cartridge YAML file
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Run a cartridge configuration over a JSON input
    Run {
        /// Path to the cartridge YAML file
        #[arg(short, long)]
        config: PathBuf,

        /// JSON input document
        #[arg(short, long)]
        input: PathBuf,

        /// Publish routed beans to NATS JetStream instead of printing them
        #[arg(long)]
        nats: bool,

        /// Character set of the input file (defaults to UTF-8)
        #[arg(long)]
        charset: Option<String>,

        /// Global context field for the run (key=value, repeatable)
        #[arg(long = "context", value_parser = parse_context_field)]
        context: Vec<(String, String)>,
    },
}

fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { config } => validate_config(config),
        Commands::Run {
            config,
            input,
            nats,
            charset,
            context,
        } => run_config(config, input, nats, charset, context),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn parse_context_field(field: &str) -> Result<(String, String), String> {
    field
        .split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("Expected key=value, got '{}'", field))
}

/// Validate a cartridge configuration, including every router
fn validate_config(config: PathBuf) -> Result<(), String> {
    let cartridge = CartridgeConfig::load_from_file(&config).map_err(|e| e.to_string())?;

    // Building the engine compiles conditions and correlation templates
    cartridge
        .build_engine(Some(Arc::new(MemoryDispatcher::new())))
        .map_err(|e| e.to_string())?;

    println!(
        "✓ {} is valid ({} beans, {} routers)",
        config.display(),
        cartridge.beans.len(),
        cartridge.routers.len()
    );
    Ok(())
}

/// Run a cartridge configuration over one input document
fn run_config(
    config: PathBuf,
    input: PathBuf,
    nats: bool,
    charset: Option<String>,
    context: Vec<(String, String)>,
) -> Result<(), String> {
    let bytes = fs::read(&input)
        .map_err(|e| format!("Failed to read input {}: {}", input.display(), e))?;

    let memory = Arc::new(MemoryDispatcher::new());
    let dispatch: Arc<dyn DispatchTemplate> = if nats {
        Arc::new(NatsDispatcher::connect(NatsConfig::default()).map_err(|e| e.to_string())?)
    } else {
        memory.clone()
    };

    let processor = TransformProcessor::from_config(config, Some(dispatch));
    processor.start().map_err(|e| e.to_string())?;

    let mut exchange = Exchange::new(Body::Bytes(bytes));
    if let Some(charset) = charset {
        exchange.set_property(CHARSET_PROPERTY, serde_json::Value::String(charset));
    }
    for (key, value) in context {
        exchange = exchange.with_header(key, serde_json::Value::String(value));
    }

    let processed = processor.process(&mut exchange);
    let stopped = processor.stop();
    processed.map_err(|e| e.to_string())?;
    stopped.map_err(|e| e.to_string())?;

    for (destination, message) in memory.drain_all() {
        let routed = serde_json::json!({
            "destination": destination,
            "headers": message.headers,
            "body": message.body,
        });
        println!("{}", routed);
    }

    let result = match exchange.body {
        Body::Result(map) => serde_json::to_string_pretty(&map).map_err(|e| e.to_string())?,
        Body::Text(text) => text,
        other => format!("{:?}", other),
    };
    println!("{}", result);

    Ok(())
}
