//! `sparqlgate` command line front end

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use serde::Serialize;
use sparqlgate_core::prelude::*;
use sparqlgate_statement::{explain, scrub, GraphScoper};
use std::io::{BufRead, Read, Write};
use std::path::PathBuf;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

fn statement_arg(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .required(true)
        .help(help)
}

fn confirm_arg() -> Arg {
    Arg::new("yes")
        .long("yes")
        .short('y')
        .action(ArgAction::SetTrue)
        .help("Apply without asking for confirmation")
}

fn cli() -> Command {
    Command::new("sparqlgate")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Guarded SPARQL mutations with confirmation, undo and audit")
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file; environment variables override it"),
        )
        .arg(
            Arg::new("api-key")
                .long("api-key")
                .global(true)
                .help("API credential presented to the gateway"),
        )
        .subcommand(
            Command::new("explain")
                .about("Classify an update and list the predicates it touches")
                .arg(statement_arg("statement", "Statement text, or - for stdin")),
        )
        .subcommand(
            Command::new("scrub")
                .about("Show what free text looks like after literal scrubbing")
                .arg(statement_arg("text", "Free text, or - for stdin")),
        )
        .subcommand(
            Command::new("scope")
                .about("Confine an update to the configured named graph")
                .arg(statement_arg("statement", "Statement text, or - for stdin")),
        )
        .subcommand(
            Command::new("validate")
                .about("Check classes and properties against the store schema")
                .arg(statement_arg("statement", "Statement text, or - for stdin")),
        )
        .subcommand(
            Command::new("apply")
                .about("Preview an update and apply it after confirmation")
                .arg(statement_arg("statement", "Statement text, or - for stdin"))
                .arg(confirm_arg()),
        )
        .subcommand(
            Command::new("generate")
                .about("Turn a free-text request into an update and apply it after confirmation")
                .arg(statement_arg("text", "Free-text request, or - for stdin"))
                .arg(
                    Arg::new("intent")
                        .long("intent")
                        .value_parser(["insert", "update", "delete", "select"])
                        .help("Intent hint; guessed from the text when absent"),
                )
                .arg(confirm_arg()),
        )
        .subcommand(
            Command::new("undo")
                .about("Apply an undo statement returned by a previous run")
                .arg(statement_arg("statement", "Undo statement, or - for stdin")),
        )
        .subcommand(
            Command::new("query")
                .about("Run a read-only query")
                .arg(statement_arg("query", "SELECT or ASK query, or - for stdin")),
        )
        .subcommand(
            Command::new("logs")
                .about("Show recent audit records")
                .arg(
                    Arg::new("limit")
                        .long("limit")
                        .short('n')
                        .default_value("20")
                        .value_parser(value_parser!(usize))
                        .help("Number of records, newest first (1-500)"),
                )
                .arg(
                    Arg::new("verify")
                        .long("verify")
                        .action(ArgAction::SetTrue)
                        .help("Check the audit hash chain instead"),
                ),
        )
        .subcommand(
            Command::new("terms")
                .about("List the allowed classes and properties")
                .arg(
                    Arg::new("refresh")
                        .long("refresh")
                        .action(ArgAction::SetTrue)
                        .help("Reload from the store first"),
                ),
        )
        .subcommand(
            Command::new("perf")
                .about("Store latency percentiles")
                .arg(
                    Arg::new("minutes")
                        .long("minutes")
                        .default_value("60")
                        .value_parser(value_parser!(u32))
                        .help("Window length in minutes (1-1440)"),
                ),
        )
}

fn parse_intent(value: &str) -> Option<Intent> {
    match value {
        "insert" => Some(Intent::Insert),
        "update" => Some(Intent::Update),
        "delete" => Some(Intent::Delete),
        "select" => Some(Intent::Select),
        _ => None,
    }
}

/// Positional text, read from stdin when given as `-`.
fn text(args: &ArgMatches, name: &str) -> Result<String> {
    let value = args
        .get_one::<String>(name)
        .with_context(|| format!("missing <{name}>"))?;
    if value != "-" {
        return Ok(value.clone());
    }
    let mut buffer = String::new();
    std::io::stdin()
        .read_to_string(&mut buffer)
        .context("reading stdin")?;
    Ok(buffer)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn confirmed(args: &ArgMatches) -> Result<bool> {
    if args.get_flag("yes") {
        return Ok(true);
    }
    print!("Apply this statement? [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

async fn confirm_and_execute(
    gateway: &MutationGateway,
    caller: &Caller,
    preview: &Preview,
    args: &ArgMatches,
) -> Result<()> {
    print_json(preview)?;
    let Some(token) = preview.token.as_deref() else {
        return Ok(());
    };
    if !confirmed(args)? {
        println!("Not applied.");
        return Ok(());
    }
    let outcome = gateway.execute(caller, token).await?;
    match &outcome.undo_statement {
        Some(undo) => println!("Applied. Undo with:\n{undo}"),
        None => println!("Applied. No undo statement could be derived."),
    }
    Ok(())
}

async fn run(matches: ArgMatches) -> Result<()> {
    let config_path = matches.get_one::<PathBuf>("config");
    let config = GatewayConfig::load(config_path.map(PathBuf::as_path))
        .context("loading configuration")?;

    let (name, args) = matches.subcommand().context("no command given")?;
    match name {
        "explain" => return print_json(&explain(&text(args, "statement")?)),
        "scrub" => return print_json(&scrub(&text(args, "text")?)),
        "scope" => {
            let scoper = GraphScoper::new(config.changes_graph.clone());
            println!("{}", scoper.ensure_target_graph(&text(args, "statement")?));
            return Ok(());
        }
        _ => {}
    }

    let mut caller = Caller::new().with_origin("cli");
    if let Some(key) = matches
        .get_one::<String>("api-key")
        .cloned()
        .or_else(|| config.api_token.clone())
    {
        caller = caller.with_api_key(key);
    }
    let gateway = MutationGateway::connect(config).await?;
    if let Err(e) = gateway.refresh_terms(&caller).await {
        warn!(error = %e, "allowed terms not loaded, validation will warn on every term");
    }
    debug!(?gateway, "gateway connected");

    match name {
        "validate" => {
            let statement = text(args, "statement")?;
            let terms = gateway.terms(&caller).await?;
            print_json(&sparqlgate_statement::check(&statement, &terms))
        }
        "apply" => {
            let preview = gateway.preview(&caller, &text(args, "statement")?).await?;
            confirm_and_execute(&gateway, &caller, &preview, args).await
        }
        "generate" => {
            let intent = args
                .get_one::<String>("intent")
                .and_then(|v| parse_intent(v));
            let generated = gateway
                .generate(&caller, &text(args, "text")?, intent)
                .await?;
            println!("intent: {} (attempts: {})", generated.intent, generated.attempts);
            confirm_and_execute(&gateway, &caller, &generated.preview, args).await
        }
        "undo" => {
            let statement = text(args, "statement")?;
            let outcome = gateway
                .undo(&caller, UndoSource::Statement(statement))
                .await?;
            println!("Undo applied ({}).", outcome.status);
            Ok(())
        }
        "query" => print_json(&gateway.select(&caller, &text(args, "query")?).await?),
        "logs" => {
            if args.get_flag("verify") {
                let count = gateway.verify_audit(&caller).await?;
                println!("Audit chain intact ({count} records).");
                return Ok(());
            }
            let limit = args.get_one::<usize>("limit").copied().unwrap_or(20);
            print_json(&gateway.recent_audit(&caller, limit).await?)
        }
        "terms" => {
            let terms = if args.get_flag("refresh") {
                gateway.refresh_terms(&caller).await?
            } else {
                gateway.terms(&caller).await?
            };
            print_json(terms.as_ref())
        }
        "perf" => {
            let minutes = args.get_one::<u32>("minutes").copied().unwrap_or(60);
            print_json(&gateway.perf_summary(&caller, minutes).await?)
        }
        other => bail!("unknown command: {other}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    run(cli().get_matches()).await
}
