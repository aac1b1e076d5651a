//! PLang policy runtime: demo CLI
//!
//! Runs the reference scenarios, or compiles and evaluates a policy file of
//! your own.
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- safety-gate
//!   cargo run -p demo -- compile policies.plang --config runtime.toml
//!   cargo run -p demo -- plan policies.plang
//!   cargo run -p demo -- evaluate policies.plang --var prompt='"hello"' --var flagged=true

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use plang_contracts::error::{PlangError, PlangResult};
use plang_contracts::value::Value;
use plang_runtime::scenarios::{conflict_audit, expert_routing, safety_gate};
use plang_runtime::{compile_with, EvaluationRequest, Evaluator, RuntimeConfig};

// ── CLI definition ────────────────────────────────────────────────────────────

/// PLang: a deterministic policy language for AI request governance.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "PLang policy runtime demo",
    long_about = "Runs PLang reference scenarios, or compiles, plans and evaluates a policy file.\n\
                  Set RUST_LOG=debug to see the engine's structured logs."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all three reference scenarios in sequence.
    RunAll,
    /// Scenario 1: Safety Gate (early termination, escalation, audit chain).
    SafetyGate,
    /// Scenario 2: Expert Routing (route cycle detection and breaking).
    ExpertRouting,
    /// Scenario 3: Conflict Audit (every conflict class, activation gate).
    ConflictAudit,
    /// Compile a policy file and report its conflicts.
    Compile {
        file: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the execution plan of a policy file.
    Plan {
        file: PathBuf,
        /// Print the plan as JSON instead of the tree view.
        #[arg(long)]
        json: bool,
    },
    /// Evaluate one request against a policy file and print the trace.
    Evaluate {
        file: PathBuf,
        /// Request variable as `name=value`; the value is parsed as JSON and
        /// falls back to a plain string.
        #[arg(long = "var", value_name = "NAME=VALUE")]
        vars: Vec<String>,
        /// Full request as JSON. `--var` entries are applied on top.
        #[arg(long)]
        request: Option<String>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Initialize structured logging.  Set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::RunAll => {
            print_banner();
            run_all()
        }
        Command::SafetyGate => {
            print_banner();
            safety_gate::run_scenario()
        }
        Command::ExpertRouting => {
            print_banner();
            expert_routing::run_scenario()
        }
        Command::ConflictAudit => {
            print_banner();
            conflict_audit::run_scenario()
        }
        Command::Compile { file, config } => run_compile(&file, config.as_deref()),
        Command::Plan { file, json } => run_plan(&file, json),
        Command::Evaluate { file, vars, request, config } => {
            run_evaluate(&file, &vars, request.as_deref(), config.as_deref())
        }
    };

    if let Err(e) = result {
        eprintln!("Demo error: {}", e);
        std::process::exit(1);
    }
}

// ── Scenario dispatch ─────────────────────────────────────────────────────────

fn run_all() -> PlangResult<()> {
    safety_gate::run_scenario()?;
    expert_routing::run_scenario()?;
    conflict_audit::run_scenario()?;
    println!("All scenarios completed successfully.");
    Ok(())
}

// ── File commands ─────────────────────────────────────────────────────────────

fn load_config(path: Option<&Path>) -> PlangResult<RuntimeConfig> {
    match path {
        Some(path) => RuntimeConfig::from_file(path),
        None => Ok(RuntimeConfig::default()),
    }
}

fn read_source(path: &Path) -> PlangResult<String> {
    std::fs::read_to_string(path).map_err(|e| PlangError::Config {
        reason: format!("failed to read policy file '{}': {}", path.display(), e),
    })
}

fn to_pretty_json(value: &impl serde::Serialize) -> PlangResult<String> {
    serde_json::to_string_pretty(value).map_err(|e| PlangError::InvalidState {
        reason: format!("cannot render JSON: {}", e),
    })
}

fn run_compile(file: &Path, config: Option<&Path>) -> PlangResult<()> {
    let config = load_config(config)?;
    let compiled = compile_with(&read_source(file)?, &config)?;

    println!("{} policies compiled", compiled.module.len());
    println!("{}", plang_core::visualize_plan(&compiled.module, &compiled.plan));
    println!("{}", to_pretty_json(&compiled.conflicts)?);

    if let Some(severity) = config.blocking_severity {
        let blocking = compiled.blocking_conflicts(severity);
        if !blocking.is_empty() {
            return Err(PlangError::Activation {
                reason: format!(
                    "{} unresolved conflict(s) at or above severity {}",
                    blocking.len(),
                    severity
                ),
            });
        }
    }
    Ok(())
}

fn run_plan(file: &Path, json: bool) -> PlangResult<()> {
    let ast = plang_lang::parse(&read_source(file)?)?;
    let module = plang_lang::build(&ast);
    if json {
        println!("{}", to_pretty_json(&plang_runtime::get_execution_plan(&module))?);
    } else {
        println!("{}", plang_runtime::visualize_plan(&module));
    }
    Ok(())
}

/// Split `name=value` and parse the value as JSON, falling back to a string.
fn parse_var(raw: &str) -> PlangResult<(String, Value)> {
    let (name, value) = raw.split_once('=').ok_or_else(|| PlangError::Config {
        reason: format!("expected NAME=VALUE, got '{}'", raw),
    })?;
    let value = serde_json::from_str::<serde_json::Value>(value)
        .map(Value::from)
        .unwrap_or_else(|_| Value::from(value));
    Ok((name.to_string(), value))
}

fn run_evaluate(
    file: &Path,
    vars: &[String],
    request: Option<&str>,
    config: Option<&Path>,
) -> PlangResult<()> {
    let config = load_config(config)?;
    let compiled = compile_with(&read_source(file)?, &config)?;

    let mut request = match request {
        Some(json) => serde_json::from_str::<EvaluationRequest>(json).map_err(|e| {
            PlangError::Config { reason: format!("invalid --request JSON: {}", e) }
        })?,
        None => EvaluationRequest::new("cli-request"),
    };
    for raw in vars {
        let (name, value) = parse_var(raw)?;
        request.variables.insert(name, value);
    }
    debug!(request_id = %request.request_id, variables = request.variables.len(), "evaluating from CLI");

    let trace = Evaluator::new(&config)?.evaluate(&compiled, request)?;
    println!("{}", to_pretty_json(&trace)?);

    let sealed = plang_audit::seal_trace(&trace)?;
    println!();
    println!("Final action:    {}", trace.final_action.as_str().to_uppercase());
    println!(
        "Audit chain:     {} ({} event(s))",
        if plang_audit::verify_chain(&sealed.events) { "VERIFIED" } else { "FAILED" },
        sealed.events.len()
    );
    println!("Decision digest: {}", sealed.decision_digest);
    Ok(())
}

// ── Banner ────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("PLang Policy Runtime");
    println!("Reference Scenarios");
    println!("====================");
    println!();
    println!("Evaluation pipeline per request:");
    println!("  [1] Stages run in category order: SAFETY, PRIVACY, OPERATIONAL, ROUTING, CUSTOM");
    println!("  [2] Policies in a stage run in declaration order, one step budget each");
    println!("  [3] Every action emits a validated intent");
    println!("  [4] The first DENY ends the evaluation; failed policies count as ALLOW");
    println!("  [5] The trace is sealed into a SHA-256 hash chain");
    println!();
}
