use bs_batch::{BatchPricer, InputTable, OptionParams, PipelineConfig, PipelineResult};
use std::io::{Read, Write};

const USAGE: &str = "usage: bs_batch [--single] [INPUT.json]\n\
    Reads a JSON array of rows (or one parameter object with --single) from\n\
    INPUT.json or stdin and writes the JSON result to stdout.";

#[tokio::main]
async fn main() {
    // Structured logging to stderr; stdout carries the JSON result
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cfg = match PipelineConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("config error: {e}");
            std::process::exit(2);
        }
    };

    let mut single = false;
    let mut path = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--single" => single = true,
            "-h" | "--help" => {
                eprintln!("{USAGE}");
                return;
            }
            _ if path.is_none() => path = Some(arg),
            _ => {
                eprintln!("{USAGE}");
                std::process::exit(2);
            }
        }
    }

    tracing::info!(
        chunk_size = cfg.chunk_size,
        workers = cfg.worker_count,
        parallel_threshold = cfg.parallel_threshold,
        "bs_batch starting"
    );

    let pricer = BatchPricer::new(cfg);
    let result = match read_input(path.as_deref()) {
        Ok(text) if single => run_single(&pricer, &text),
        Ok(text) => run_batch(&pricer, &text).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(json) => {
            let mut stdout = std::io::stdout().lock();
            if let Err(e) = stdout.write_all(json.as_bytes()).and_then(|_| stdout.write_all(b"\n")) {
                tracing::error!("write error: {e}");
                std::process::exit(1);
            }
        }
        Err(e) => {
            tracing::error!("request failed: {e}");
            std::process::exit(1);
        }
    }
}

fn read_input(path: Option<&str>) -> PipelineResult<String> {
    match path {
        Some(p) if p != "-" => Ok(std::fs::read_to_string(p)?),
        _ => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            Ok(text)
        }
    }
}

async fn run_batch(pricer: &BatchPricer, text: &str) -> PipelineResult<String> {
    let table = InputTable::from_json(text)?;
    if table.is_empty() {
        tracing::warn!("input table has no rows");
    }
    let response = pricer.price_table(table).await?;
    Ok(serde_json::to_string(&response)?)
}

fn run_single(pricer: &BatchPricer, text: &str) -> PipelineResult<String> {
    let params: OptionParams = serde_json::from_str(text)?;
    let quote = pricer.price_single(&params)?;
    Ok(serde_json::to_string(&quote)?)
}
