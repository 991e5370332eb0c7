use clap::Parser;
use serde_json::Value;
use simple_lang::{DefaultExchange, SimpleLanguage, SimpleOptions, TargetType};
use std::path::{Path, PathBuf};
use tracing::Level;

/// Evaluate a simple expression or predicate against a message.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Expression text, e.g. 'Hello ${header.name}'
    expression: String,
    /// Parse as a predicate and print true or false
    #[arg(long, short)]
    predicate: bool,
    /// Message body; parsed as JSON when valid, otherwise kept as text
    #[arg(long)]
    body: Option<String>,
    /// Header as key=value (repeatable)
    #[arg(long = "header", short = 'H', value_name = "KEY=VALUE")]
    headers: Vec<String>,
    /// Exchange property as key=value (repeatable)
    #[arg(long = "property", short = 'P', value_name = "KEY=VALUE")]
    properties: Vec<String>,
    /// JSON file describing the whole exchange (body, headers, properties, ...)
    #[arg(long)]
    exchange: Option<PathBuf>,
    /// JSON file with language options
    #[arg(long)]
    config: Option<PathBuf>,
    /// Convert the result to this type (String, Long, Double, Boolean, List, Map)
    #[arg(long)]
    target: Option<String>,
    /// More logging: -v for debug, -vv for trace
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);
    if let Err(message) = run(&args) {
        eprintln!("{message}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .try_init();
}

fn run(args: &Args) -> Result<(), String> {
    let options = match &args.config {
        Some(path) => serde_json::from_str::<SimpleOptions>(&read(path)?)
            .map_err(|e| format!("Invalid config {}: {e}", path.display()))?,
        None => SimpleOptions::default(),
    };
    let lang = SimpleLanguage::with_options(options);
    let mut exchange = build_exchange(args)?;

    let out = if args.predicate {
        let predicate = lang
            .parse_predicate(&args.expression)
            .map_err(|e| e.diagnostic().unwrap_or_else(|| e.to_string()))?;
        Value::Bool(predicate.matches(&mut exchange).map_err(|e| e.to_string())?)
    } else {
        let target = match &args.target {
            Some(name) => {
                TargetType::from_name(name).ok_or_else(|| format!("Unknown target type: {name}"))?
            }
            None => TargetType::Object,
        };
        lang.parse_expression(&args.expression)
            .map_err(|e| e.diagnostic().unwrap_or_else(|| e.to_string()))?
            .evaluate(&mut exchange, target)
            .map_err(|e| e.to_string())?
    };

    let text = match &out {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).map_err(|e| e.to_string())?,
    };
    println!("{text}");
    Ok(())
}

fn build_exchange(args: &Args) -> Result<DefaultExchange, String> {
    let mut exchange = match &args.exchange {
        Some(path) => serde_json::from_str::<DefaultExchange>(&read(path)?)
            .map_err(|e| format!("Invalid exchange {}: {e}", path.display()))?,
        None => DefaultExchange::new(),
    };
    if let Some(body) = &args.body {
        exchange = exchange.with_body(json_or_text(body));
    }
    for pair in &args.headers {
        let (k, v) = key_value(pair)?;
        exchange = exchange.with_header(k, json_or_text(v));
    }
    for pair in &args.properties {
        let (k, v) = key_value(pair)?;
        exchange = exchange.with_property(k, json_or_text(v));
    }
    Ok(exchange)
}

fn read(path: &Path) -> Result<String, String> {
    std::fs::read_to_string(path).map_err(|e| format!("Cannot read {}: {e}", path.display()))
}

fn key_value(pair: &str) -> Result<(&str, &str), String> {
    pair.split_once('=')
        .ok_or_else(|| format!("Expected KEY=VALUE, got: {pair}"))
}

fn json_or_text(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
