use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use batch_planner_core::{
    analysis, parse_assessment_json, DependencyGraph, FailureTriage, PlanReporter, Planner,
    PlannerConfig,
};

/// Batch Planner - dependency-aware migration batch planning
#[derive(Parser)]
#[command(name = "batch-planner")]
#[command(version)] // Auto-pull version from Cargo.toml
#[command(about = "Turn migration assessments into balanced, ordered batch plans", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a batch plan from an assessment file
    Analyze {
        /// Assessment JSON file
        input: PathBuf,
        /// Optional YAML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Output path prefix; format extensions are appended
        #[arg(short, long, default_value = "migration_plan")]
        output: PathBuf,
        /// Report formats to write
        #[arg(short, long, value_enum, value_delimiter = ',', default_values = ["json", "markdown"])]
        formats: Vec<ReportFormat>,
        /// Engagement name for report headers
        #[arg(short, long, default_value = "Migration Engagement")]
        engagement: String,
    },
    /// Check a generated plan for internal consistency
    Validate {
        /// Plan JSON file produced by `analyze`
        input: PathBuf,
    },
    /// Print the dependency graph structure without planning
    Visualize {
        /// Assessment JSON file
        input: PathBuf,
        /// Optional YAML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Json,
    Markdown,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Commands::Analyze {
            input,
            config,
            output,
            formats,
            engagement,
        } => run_analyze(&input, config.as_deref(), &output, &formats, &engagement),
        Commands::Validate { input } => run_validate(&input),
        Commands::Visualize { input, config } => run_visualize(&input, config.as_deref()),
    };

    match outcome {
        Ok(0) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(1),
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(2)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<PlannerConfig> {
    match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            Ok(PlannerConfig::from_yaml(&text)?)
        }
        None => Ok(PlannerConfig::default()),
    }
}

/// Full pipeline: parse, triage, graph, score, plan, render. Returns the
/// warning count so `main` can pick the exit code.
fn run_analyze(
    input: &Path,
    config: Option<&Path>,
    output: &Path,
    formats: &[ReportFormat],
    engagement: &str,
) -> Result<usize> {
    let config = load_config(config)?;
    let text = fs::read_to_string(input)
        .with_context(|| format!("reading assessment {}", input.display()))?;
    let parsed = parse_assessment_json(&text)?;
    info!(objects = parsed.objects.len(), "assessment loaded");

    let mut objects = parsed.objects;
    let triage = FailureTriage::new(&config.triage.categories);
    triage.categorize(&mut objects);

    let graph = DependencyGraph::build(&objects);
    let max_depth = config.dependency.max_depth;
    let scores = analysis::compute_impact_scores(&objects, &graph, max_depth);
    analysis::apply_impact_scores(&mut objects, &scores);

    let planner = Planner::new(config);
    let mut plan = planner.create_plan(&objects, &graph, engagement)?;
    // parser warnings lead, planner warnings follow
    let mut warnings = parsed.warnings;
    warnings.append(&mut plan.warnings);
    plan.warnings = warnings;

    for format in formats {
        let (path, contents) = match format {
            ReportFormat::Json => (
                output.with_extension("json"),
                PlanReporter::to_json(&plan).context("serializing plan")?,
            ),
            ReportFormat::Markdown => (
                output.with_extension("md"),
                PlanReporter::to_markdown(&plan),
            ),
        };
        fs::write(&path, contents)
            .with_context(|| format!("writing report {}", path.display()))?;
        println!("Wrote {}", path.display());
    }

    println!(
        "Planned {} objects into {} batches across {} sprints.",
        plan.total_objects, plan.total_batches, plan.total_sprints
    );
    let failure_summary = triage.summary(&objects);
    if failure_summary.total_failures > 0 {
        println!("Failed objects by category:");
        for (category, count) in &failure_summary.counts {
            if *count > 0 {
                println!("  {category}: {count}");
            }
        }
        let failures = analysis::analyze_failures(&objects, &graph, max_depth);
        println!(
            "Failure origins: {} primary, {} cascading.",
            failures.primary_failures.len(),
            failures.dependent_failures.len()
        );
        let top = failures.most_impactful(5);
        if !top.is_empty() {
            println!("Highest-impact failures:");
            for failure in top {
                println!(
                    "  {} (impact {}): {}",
                    failure.qualified_name, failure.impact_score, failure.failure_reason
                );
            }
        }
    }
    if !plan.warnings.is_empty() {
        println!("{} warning(s):", plan.warnings.len());
        for warning in &plan.warnings {
            println!("  - {warning}");
        }
    }
    Ok(plan.warnings.len())
}

/// Structural checks over a rendered plan document. Problems are printed
/// and counted, never fatal.
fn run_validate(input: &Path) -> Result<usize> {
    let text =
        fs::read_to_string(input).with_context(|| format!("reading plan {}", input.display()))?;
    let plan: Value = serde_json::from_str(&text).context("plan is not valid JSON")?;
    let batches = plan["batches"]
        .as_array()
        .context("plan has no 'batches' array")?;

    let mut problems: Vec<String> = Vec::new();

    let declared_total = plan["metadata"]["total_objects"].as_u64().unwrap_or(0);
    let actual_total: u64 = batches
        .iter()
        .map(|b| b["total_objects"].as_u64().unwrap_or(0))
        .sum();
    if declared_total != actual_total {
        problems.push(format!(
            "metadata claims {declared_total} objects but batches hold {actual_total}"
        ));
    }

    let mut sprint_of: HashMap<u64, u64> = HashMap::new();
    for batch in batches {
        sprint_of.insert(
            batch["batch_id"].as_u64().unwrap_or(0),
            batch["sprint_number"].as_u64().unwrap_or(0),
        );
    }

    let mut seen_objects: HashSet<String> = HashSet::new();
    for batch in batches {
        let id = batch["batch_id"].as_u64().unwrap_or(0);
        let sprint = batch["sprint_number"].as_u64().unwrap_or(0);
        let name = batch["batch_name"].as_str().unwrap_or("?");

        for dep in batch["dependencies"].as_array().into_iter().flatten() {
            let dep_id = dep.as_u64().unwrap_or(0);
            match sprint_of.get(&dep_id) {
                None => problems.push(format!(
                    "batch '{name}' depends on nonexistent batch {dep_id}"
                )),
                Some(&dep_sprint) => {
                    if dep_id >= id {
                        problems.push(format!(
                            "batch '{name}' depends on batch {dep_id}, which is not earlier"
                        ));
                    }
                    if dep_sprint > sprint {
                        problems.push(format!(
                            "batch '{name}' (sprint {sprint}) depends on a batch in later sprint {dep_sprint}"
                        ));
                    }
                }
            }
        }

        for obj in batch["objects"].as_array().into_iter().flatten() {
            let qualified = obj["qualified_name"].as_str().unwrap_or("").to_lowercase();
            if !qualified.is_empty() && !seen_objects.insert(qualified.clone()) {
                problems.push(format!("object '{qualified}' appears in more than one batch"));
            }
        }
    }

    if problems.is_empty() {
        println!("Plan is internally consistent.");
    } else {
        println!("{} problem(s) found:", problems.len());
        for problem in &problems {
            println!("  - {problem}");
        }
    }
    Ok(problems.len())
}

/// Print graph statistics, layers, and cycles for an assessment.
fn run_visualize(input: &Path, config: Option<&Path>) -> Result<usize> {
    let config = load_config(config)?;
    let text = fs::read_to_string(input)
        .with_context(|| format!("reading assessment {}", input.display()))?;
    let parsed = parse_assessment_json(&text)?;
    let graph = DependencyGraph::build(&parsed.objects);

    let summary = graph.summary();
    println!("Dependency graph: {} objects, {} edges", summary.total_nodes, summary.total_edges);
    println!(
        "Layers: {}   Longest chain: {}   Roots: {}   Leaves: {}",
        summary.num_layers, summary.max_chain_depth, summary.root_nodes, summary.leaf_nodes
    );

    let outcome = graph.layers(config.dependency.circular_resolution)?;
    for (i, layer) in outcome.layers.iter().enumerate() {
        let names: Vec<&str> = layer
            .iter()
            .map(|key| graph.display_name(key).unwrap_or(key.as_str()))
            .collect();
        println!("Layer {i}: {}", names.join(", "));
    }

    if !summary.cycles.is_empty() {
        println!("Circular dependencies:");
        for cycle in &summary.cycles {
            println!("  {}", cycle.join(" -> "));
        }
    }

    let warnings = parsed.warnings.len() + outcome.warnings.len();
    for warning in parsed.warnings.iter().chain(outcome.warnings.iter()) {
        println!("Warning: {warning}");
    }
    Ok(warnings)
}
