use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use llk::Grammar;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Grammar file
    #[arg(value_name = "GRAMMAR")]
    grammar: PathBuf,

    /// Text to parse, read from stdin when absent
    #[arg(value_name = "INPUT")]
    input: Option<PathBuf>,

    /// Rule to start from instead of the first one
    #[arg(short, long, value_name = "RULE")]
    root: Option<String>,

    /// Only check that the input is accepted
    #[arg(short, long)]
    check: bool,

    /// Print the token stream instead of parsing
    #[arg(short, long, conflicts_with = "check")]
    tokens: bool,

    /// Give up after this many parser steps
    #[arg(long, value_name = "N")]
    step_limit: Option<usize>,

    /// More logging (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    Registry::default()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false),
        )
        .init();
}

fn run(args: &Args) -> Result<()> {
    let grammar = Grammar::load(&args.grammar)
        .with_context(|| format!("Failed to load {}", args.grammar.display()))?;
    let mut parser = grammar
        .compile()
        .with_context(|| format!("Failed to compile {}", args.grammar.display()))?;
    if let Some(limit) = args.step_limit {
        parser = parser.with_step_limit(limit);
    }

    let text = match &args.input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read stdin")?;
            text
        }
    };

    let root = args.root.as_deref();
    if args.tokens {
        for token in parser.tokenize(&text)? {
            println!(
                "{:>6}  {}:{}  {:?}",
                token.offset, token.namespace, token.name, token.value
            );
        }
    } else if args.check {
        parser.recognize(&text, root)?;
    } else {
        print!("{}", parser.parse(&text, root)?);
    }
    Ok(())
}
