//! kg-reason CLI: inference and structural queries over an extraction batch.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;

use kg_reason::config::ReasonerConfig;
use kg_reason::engine::Engine;
use kg_reason::graph::ExtractionBatch;
use kg_reason::infer::AdvancedInferenceEngine;

#[derive(Parser)]
#[command(name = "kg-reason", version, about = "Knowledge-graph reasoning and query engine")]
struct Cli {
    /// Extraction batch (JSON `{entities, relations}`). Empty graph if omitted.
    #[arg(long, global = true)]
    batch: Option<PathBuf>,

    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show graph, rule and cache statistics.
    Info,

    /// Derive new relations.
    Infer {
        #[command(subcommand)]
        action: InferAction,
    },

    /// Answer a structural query, e.g. "relation between A and B".
    Query {
        text: String,

        /// Skip the result cache.
        #[arg(long)]
        no_cache: bool,

        /// Merge rule-derived relations into the graph first.
        #[arg(long)]
        with_inferred: bool,
    },

    /// Show the execution plan and cost estimate for a query.
    Plan { text: String },

    /// Suggest alternative queries.
    Suggest {
        text: String,

        /// Maximum number of suggestions.
        #[arg(long, default_value = "3")]
        max: usize,
    },

    /// List the composition rules.
    Rules,

    /// Inspect or clear the result cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum InferAction {
    /// Apply every active composition rule once.
    Rules,

    /// Temporal, probabilistic and multi-hop inference for one entity pair.
    Advanced {
        #[arg(long)]
        source: String,

        #[arg(long)]
        target: String,

        #[arg(long)]
        relation_type: String,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show occupancy and per-type statistics.
    Stats,
    /// Remove every cached entry.
    Clear,
}

fn load_batch(path: Option<&Path>) -> Result<ExtractionBatch> {
    let Some(path) = path else {
        return Ok(ExtractionBatch::default());
    };
    let content = std::fs::read_to_string(path).into_diagnostic()?;
    serde_json::from_str(&content).into_diagnostic()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ReasonerConfig::load(path)?,
        None => ReasonerConfig::default(),
    };
    let batch = load_batch(cli.batch.as_deref())?;
    let engine = Engine::new(config, &batch)?;

    match cli.command {
        Commands::Info => {
            let info = engine.info();
            if cli.json {
                print_json(&info)?;
            } else {
                print!("{info}");
            }
        }

        Commands::Infer { action: InferAction::Rules } => {
            let result = engine.infer_rules();
            if cli.json {
                print_json(&result.derived)?;
            } else {
                for relation in &result.derived {
                    println!(
                        "{}  confidence={:.4}  rule={}",
                        relation.describe(),
                        relation.confidence,
                        relation.rule_id().unwrap_or("-")
                    );
                }
                println!(
                    "{} derived, {} skipped",
                    result.derived.len(),
                    result.skipped
                );
            }
        }

        Commands::Infer {
            action: InferAction::Advanced { source, target, relation_type },
        } => {
            let report = engine.infer_advanced(&source, &target, &relation_type)?;
            if cli.json {
                print_json(&report)?;
            } else if report.is_empty() {
                println!("No relations inferred.");
            } else {
                for line in AdvancedInferenceEngine::explain(&report) {
                    println!("{line}");
                }
            }
        }

        Commands::Query { text, no_cache, with_inferred } => {
            if with_inferred {
                let derived = engine.infer_rules().derived;
                engine.materialize(&derived)?;
            }
            let result = engine.query(&text, !no_cache)?;
            if cli.json {
                print_json(&result)?;
            } else {
                println!(
                    "{} query: {} nodes, {} edges, {} paths, confidence {:.2} ({:.3}s)",
                    result.query_type,
                    result.nodes.len(),
                    result.edges.len(),
                    result.paths.len(),
                    result.confidence,
                    result.execution_time
                );
                for path in &result.paths {
                    println!("  {}", path.join(" -> "));
                }
                if result.paths.is_empty() {
                    for node in &result.nodes {
                        println!("  {}", node.id);
                    }
                }
            }
        }

        Commands::Plan { text } => {
            let plan = engine.plan(&text)?;
            if cli.json {
                print_json(&plan)?;
            } else {
                println!(
                    "{} query, estimated cost {:.2} (cache hits: {})",
                    plan.query_type, plan.estimated_cost, plan.cache_hits
                );
                for (i, step) in plan.steps.iter().enumerate() {
                    println!("  {}. {:<40} {:.2}", i + 1, step.description, step.estimated_cost);
                }
            }
        }

        Commands::Suggest { text, max } => {
            let suggestions = engine.suggest(&text, max);
            if cli.json {
                print_json(&suggestions)?;
            } else if suggestions.is_empty() {
                println!("No suggestions.");
            } else {
                for s in &suggestions {
                    println!("{:.2}  {}  ({})", s.confidence, s.suggested_query, s.explanation);
                }
            }
        }

        Commands::Rules => {
            let rules = engine.rule_engine().rules();
            if cli.json {
                print_json(&rules.rules())?;
            } else {
                for rule in rules.rules() {
                    println!("{}", rule.summary());
                }
            }
        }

        Commands::Cache { action: CacheAction::Stats } => {
            let stats = engine.cache_stats();
            if cli.json {
                print_json(&stats)?;
            } else {
                println!(
                    "{} items, {} / {} bytes ({:.1}%)",
                    stats.total_items,
                    stats.total_size_bytes,
                    stats.max_size_bytes,
                    stats.usage_percent
                );
                for (data_type, t) in &stats.type_statistics {
                    println!(
                        "  {data_type}: {} items, {} bytes, {} accesses",
                        t.count, t.total_size, t.total_access
                    );
                }
            }
        }

        Commands::Cache { action: CacheAction::Clear } => {
            engine.cache().clear();
            println!("Cache cleared.");
        }
    }

    Ok(())
}
