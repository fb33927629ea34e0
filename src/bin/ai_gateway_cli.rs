//! ai-gateway CLI — 通过网关发送请求、检查健康状态、列出模型与估算 Token 的命令行工具
//!
//! Usage:
//!   ai-gateway-cli chat [--mode <mode>] [--stream] [--json] [--caller <name>] <prompt>
//!   ai-gateway-cli health [--mode <mode>]
//!   ai-gateway-cli models [--mode <mode>]
//!   ai-gateway-cli tokens <text>

use ai_gateway::{Gateway, GatewayConfig, Mode, Request, ResponseEvent, ResponseFormat};
use futures::StreamExt;
use std::io::Write;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        return ExitCode::FAILURE;
    }

    let rest = &args[2..];
    let result = match args[1].as_str() {
        "chat" => cmd_chat(rest).await,
        "health" => cmd_health(rest).await,
        "models" => cmd_models(rest).await,
        "tokens" => cmd_tokens(rest),
        "version" | "--version" | "-V" => {
            println!("ai-gateway-cli {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    println!(
        r#"ai-gateway-cli — AI 请求网关命令行工具

USAGE:
    ai-gateway-cli <COMMAND> [OPTIONS]

COMMANDS:
    chat <prompt>               Send a prompt and print events as they arrive
        --mode <mode>           demo | scripted | offline | live
        --stream                Request incremental deltas
        --json                  Ask for a JSON object reply
        --caller <name>         Caller identity attached to the request
    health [--mode <mode>]      Probe the active backend
    models [--mode <mode>]      List models the backend offers
    tokens <text>               Estimate the token count of a text
    version                     Show version information
    help                        Show this help message

ENVIRONMENT:
    AI_GATEWAY_CONFIG           YAML configuration file
    AI_GATEWAY_MODE             Default mode
    RUST_LOG                    Log filter (e.g. ai_gateway=debug)"#
    );
}

/// Flags shared by the gateway commands.
#[derive(Default)]
struct Options {
    mode: Option<Mode>,
    stream: bool,
    json: bool,
    caller: Option<String>,
    words: Vec<String>,
}

fn parse_options(args: &[String]) -> ai_gateway::Result<Options> {
    let mut options = Options::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--mode" => {
                let value = iter
                    .next()
                    .ok_or_else(|| ai_gateway::Error::configuration("--mode needs a value"))?;
                options.mode = Some(value.parse()?);
            }
            "--caller" => {
                let value = iter
                    .next()
                    .ok_or_else(|| ai_gateway::Error::configuration("--caller needs a value"))?;
                options.caller = Some(value.clone());
            }
            "--stream" => options.stream = true,
            "--json" => options.json = true,
            _ => options.words.push(arg.clone()),
        }
    }
    Ok(options)
}

async fn connect(options: &Options) -> ai_gateway::Result<Gateway> {
    let config = GatewayConfig::load()?;
    let mode = options.mode.unwrap_or(config.mode);
    let gateway = Gateway::new(config)?;
    gateway.configure(mode, None).await?;
    Ok(gateway)
}

async fn cmd_chat(args: &[String]) -> ai_gateway::Result<()> {
    let options = parse_options(args)?;
    if options.words.is_empty() {
        return Err(ai_gateway::Error::invalid_request("chat needs a prompt"));
    }
    let gateway = connect(&options).await?;

    let mut request = Request::user(options.words.join(" ")).with_stream(options.stream);
    if options.json {
        request = request.with_response_format(ResponseFormat::Json);
    }
    if let Some(caller) = &options.caller {
        request = request.with_caller(caller.clone());
    }

    let mut events = gateway.send(request);
    let mut streamed = false;
    let mut stdout = std::io::stdout();
    while let Some(event) = events.next().await {
        match event {
            ResponseEvent::TextDelta { delta } => {
                streamed = true;
                print!("{delta}");
                let _ = stdout.flush();
            }
            ResponseEvent::TextChunk { text } => {
                if streamed {
                    println!();
                } else {
                    println!("{text}");
                }
            }
            ResponseEvent::StructuredPayload { payload } => {
                println!("{}", ai_gateway::types::value::map_to_json(&payload));
            }
            ResponseEvent::FunctionCallProposal { call } => {
                println!(
                    "[function call] {}({})",
                    call.name,
                    ai_gateway::types::value::map_to_json(&call.arguments)
                );
            }
            ResponseEvent::Done { usage } => {
                if let Some(usage) = usage {
                    eprintln!(
                        "[{} mode] tokens: {} prompt + {} completion",
                        gateway.mode(),
                        usage.prompt_tokens,
                        usage.completion_tokens
                    );
                }
            }
            ResponseEvent::Error { kind, message } => {
                eprintln!("[{kind}] {message}");
                std::process::exit(2);
            }
        }
    }
    Ok(())
}

async fn cmd_health(args: &[String]) -> ai_gateway::Result<()> {
    let options = parse_options(args)?;
    let gateway = connect(&options).await?;
    let health = gateway.check_health().await;
    println!("{}", serde_json::to_string_pretty(&health)?);
    Ok(())
}

async fn cmd_models(args: &[String]) -> ai_gateway::Result<()> {
    let options = parse_options(args)?;
    let gateway = connect(&options).await?;
    for model in gateway.available_models().await? {
        println!("{model}");
    }
    Ok(())
}

fn cmd_tokens(args: &[String]) -> ai_gateway::Result<()> {
    if args.is_empty() {
        return Err(ai_gateway::Error::invalid_request("tokens needs some text"));
    }
    println!("{}", ai_gateway::estimate_token_count(&args.join(" ")));
    Ok(())
}
