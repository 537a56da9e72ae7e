use anyhow::{bail, Result};
use clap::{ArgAction, Parser};
use std::io;
use tracing::info;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use seeker_cli::input::{parse_k, validate_question, NO_QUESTION_WARNING};
use seeker_cli::prompt::{run_prompt, warm_up_with_spinner};
use seeker_cli::render::{render_json, render_stats, render_table};
use seeker_core::config::{Config, Settings};
use seeker_search::{get_similar_questions_with_score, shared, Resources};

#[derive(Parser, Debug)]
#[command(name = "sf-seeker", version, about = "Find previously asked questions similar to yours")]
struct Args {
    /// Question to search for; starts an interactive prompt when omitted
    question: Option<String>,

    /// Number of similar questions to show (1-100)
    #[arg(short, long, value_parser = parse_k)]
    k: Option<usize>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// More logging (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };
    tracing_subscriber::registry().with(fmt::layer().with_writer(io::stderr)).with(filter).init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    // Rejected before any resource is touched.
    let question = match args.question.as_deref() {
        Some(raw) => match validate_question(raw) {
            Some(q) => Some(q.to_string()),
            None => {
                eprintln!("{NO_QUESTION_WARNING}");
                std::process::exit(1);
            }
        },
        None => None,
    };

    let config = Config::load()?;
    let settings = config.settings()?;
    info!("config env={} data={:?}", config.env_name(), settings.data);
    let k = args.k.unwrap_or(settings.search.default_k);
    if k > settings.search.max_k {
        bail!("k={} exceeds search.max_k={}", k, settings.search.max_k);
    }

    match question {
        Some(q) => ask_once(&settings, &q, k, args.json),
        None => interactive(&settings, k, args.json),
    }
}

fn ask_once(settings: &Settings, question: &str, k: usize, json: bool) -> Result<()> {
    let resources = shared(settings);
    let results = get_similar_questions_with_score(resources, question, k)?;
    if json {
        println!("{}", render_json(&results)?);
    } else {
        println!("🔍 Top {} similar questions for: \"{}\"\n", results.len(), question);
        print!("{}", render_table(&results));
    }
    Ok(())
}

fn interactive(settings: &Settings, k: usize, json: bool) -> Result<()> {
    println!("🚀 SF Seeker\n===========");
    let resources = Resources::new(settings);
    warm_up_with_spinner(&resources)?;
    println!("{}", render_stats(&resources.stats()?));
    println!("Type /help for commands.\n");
    run_prompt(settings, resources, k, json, io::stdin().lock(), &mut io::stdout(), &mut io::stderr())
}
