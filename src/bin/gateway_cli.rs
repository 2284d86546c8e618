use std::io::{self, Read, Write};

use chat_gateway::providers::translator_for;
use chat_gateway::{Gateway, GatewayResponse};
use futures_util::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

struct CliConfig {
    input: Option<String>,
    model: Option<String>,
    stream: bool,
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let config = parse_config(std::env::args().skip(1).collect())?;
    let mut body = read_body(config.input.as_deref())?;
    apply_overrides(&mut body, &config)?;

    let gateway = Gateway::from_env()?;

    if config.dry_run {
        let prepared = gateway.prepare(&body)?;
        let translated = translator_for(prepared.provider).translate(&prepared.request);
        eprintln!(
            "gateway_cli: provider={}, model={}",
            prepared.provider, translated.model
        );
        println!("{}", serde_json::to_string_pretty(&translated.body)?);
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_token.cancel();
        }
    });

    match gateway.handle(&body, cancel).await {
        Ok(GatewayResponse::Completion(completion)) => {
            println!("{}", serde_json::to_string_pretty(&completion)?);
        }
        Ok(GatewayResponse::Stream(mut frames)) => {
            let mut stdout = io::stdout().lock();
            while let Some(frame) = frames.next().await {
                stdout.write_all(frame.as_bytes())?;
                stdout.flush()?;
            }
        }
        Err(error) => {
            eprintln!("error ({}): {error}", error.http_status());
            println!("{}", serde_json::to_string_pretty(&error.error_body())?);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn read_body(input: Option<&str>) -> Result<Value, Box<dyn std::error::Error>> {
    let raw = match input {
        Some(path) if path != "-" => std::fs::read_to_string(path)?,
        _ => {
            let mut raw = String::new();
            io::stdin().read_to_string(&mut raw)?;
            raw
        }
    };

    Ok(serde_json::from_str(&raw)?)
}

fn apply_overrides(body: &mut Value, config: &CliConfig) -> Result<(), Box<dyn std::error::Error>> {
    let object = body
        .as_object_mut()
        .ok_or("request body must be a JSON object")?;

    if let Some(model) = &config.model {
        object.insert("model".to_string(), Value::String(model.clone()));
    }
    if config.stream {
        object.insert("stream".to_string(), Value::Bool(true));
    }
    Ok(())
}

fn parse_config(args: Vec<String>) -> Result<CliConfig, Box<dyn std::error::Error>> {
    let mut config = CliConfig {
        input: None,
        model: None,
        stream: false,
        dry_run: false,
    };

    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--model" => {
                let value = args
                    .get(i + 1)
                    .ok_or("missing value for --model")?
                    .trim()
                    .to_string();
                if value.is_empty() {
                    return Err("--model must be non-empty".into());
                }
                config.model = Some(value);
                i += 2;
            }
            "--stream" => {
                config.stream = true;
                i += 1;
            }
            "--dry-run" => {
                config.dry_run = true;
                i += 1;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other if other.starts_with("--") => {
                return Err(format!("unknown argument: {other}").into());
            }
            path => {
                if config.input.is_some() {
                    return Err("only one request file may be given".into());
                }
                config.input = Some(path.to_string());
                i += 1;
            }
        }
    }

    Ok(config)
}

fn print_help() {
    println!(
        "Usage:\n  cargo run --bin gateway_cli -- [REQUEST.json|-] [--model MODEL] [--stream] [--dry-run]\n\nReads an OpenAI-style chat request (plus web_search, code_execution, url_context,\nthinking, provider flags) from the file or stdin and prints the completion JSON,\nor SSE frames when streaming. --dry-run prints the routed provider and the\ntranslated upstream body without sending anything.\n\nEnv:\n  OPENROUTER_API_KEY / OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY (or GOOGLE_API_KEY)\n  <PROVIDER>_BASE_URL, GATEWAY_TIMEOUT_MS, GATEWAY_HTTP_REFERER, GATEWAY_APP_TITLE\n  RUST_LOG (default info)"
    );
}
