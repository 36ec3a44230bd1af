// src/main.rs
//
// =============================================================================
// LABTWIN: COMMANDER & ENTRY POINT (v 0.3 )
// =============================================================================
//
// Command-line access to bench documents.
//
// Modes:
// 1. CHECK:   Loads and builds a bench, reports what it contains.
// 2. STATE:   Prints the full object state (JSON) and its digest.
// 3. GRAPH:   Renders the instruction precedence graph as Graphviz DOT.
// 4. ACTIONS: Lists the actions each device implements.
// 5. REPLAY:  Runs the instructions one at a time on a simple serial clock.
//
// REPLAY is a smoke test for documents, not a scheduler: it never runs two
// instructions at once and does no resource arbitration.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use labtwin::setup;
use labtwin::{InstructionStatus, Lab};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// 1. CLI DEFINITION
// ============================================================================

#[derive(Parser)]
#[command(
    name = "labtwin",
    version = "0.3",
    about = "Digital-twin simulation core for lab-automation benchtops"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate and build a bench document.
    Check {
        /// Path to the bench document (.yaml / .json).
        #[arg(long)]
        file: PathBuf,
    },

    /// Print the state of every object.
    State {
        #[arg(long)]
        file: PathBuf,

        /// Pretty-print the JSON.
        #[arg(long)]
        pretty: bool,
    },

    /// Render the instruction graph as Graphviz DOT.
    Graph {
        #[arg(long)]
        file: PathBuf,

        /// Write to this path instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// List the actions of every device in the bench.
    Actions {
        #[arg(long)]
        file: PathBuf,
    },

    /// Run the instructions serially and report the outcome.
    Replay {
        #[arg(long)]
        file: PathBuf,

        /// Print the final state after the run.
        #[arg(long)]
        state: bool,
    },
}

// ============================================================================
// 2. ENTRY POINT
// ============================================================================

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match cli.command {
        Commands::Check { file } => run_check(&file),
        Commands::State { file, pretty } => run_state(&file, pretty),
        Commands::Graph { file, out } => run_graph(&file, out),
        Commands::Actions { file } => run_actions(&file),
        Commands::Replay { file, state } => run_replay(&file, state),
    }
}

fn load(file: &Path) -> Result<Lab> {
    setup::load_lab(file).with_context(|| format!("loading bench {}", file.display()))
}

// ============================================================================
// 3. INSPECTION
// ============================================================================

fn run_check(file: &Path) -> Result<()> {
    let lab = load(file)?;
    let devices = lab.objects().filter(|o| o.is_device()).count();
    println!(
        "{}: {} objects ({} devices), {} instructions, {} precedence edges",
        file.display(),
        lab.objects().count(),
        devices,
        lab.instructions().len(),
        lab.precedence().edge_count()
    );
    println!(
        "eligible now: {:?}",
        lab.eligible_instructions()
            .iter()
            .map(|i| i.identifier())
            .collect::<Vec<_>>()
    );
    println!("state digest: {}", lab.state_digest());
    Ok(())
}

fn run_state(file: &Path, pretty: bool) -> Result<()> {
    let lab = load(file)?;
    print_state(&lab, pretty)
}

fn print_state(lab: &Lab, pretty: bool) -> Result<()> {
    let state = lab.state();
    let out = if pretty {
        serde_json::to_string_pretty(&state)?
    } else {
        serde_json::to_string(&state)?
    };
    println!("{}", out);
    println!("# digest {}", lab.state_digest());
    Ok(())
}

fn run_graph(file: &Path, out: Option<PathBuf>) -> Result<()> {
    let lab = load(file)?;
    let dot = lab.instructions_to_dot();
    match out {
        Some(path) => {
            fs::write(&path, dot).with_context(|| format!("writing {}", path.display()))?;
            log::info!("graph written to {}", path.display());
        }
        None => println!("{}", dot),
    }
    Ok(())
}

fn run_actions(file: &Path) -> Result<()> {
    let lab = load(file)?;
    for device in lab.objects().filter(|o| o.is_device()) {
        let names = lab.action_names(device.identifier())?;
        println!("{} ({}): {}", device.identifier(), device.kind(), names.join(", "));
    }
    Ok(())
}

// ============================================================================
// 4. SERIAL REPLAY
// ============================================================================

fn run_replay(file: &Path, show_state: bool) -> Result<()> {
    let mut lab = load(file)?;
    let mut clock = 0.0_f64;
    let mut unrunnable: BTreeSet<String> = BTreeSet::new();

    loop {
        let next = lab
            .eligible_instructions()
            .into_iter()
            .map(|i| i.identifier().to_string())
            .find(|id| !unrunnable.contains(id));
        let Some(id) = next else {
            break;
        };

        let claim = match lab.reserve(&id) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("cannot reserve {}: {}", id, e);
                unrunnable.insert(id);
                continue;
            }
        };
        if lab.start(&id).is_err() {
            continue;
        }
        clock += claim.duration;
        if lab.finish(&id).is_ok() {
            println!("[t={:>8.1}] committed {}", clock, id);
        }
    }

    let failed = lab.instructions_with_status(InstructionStatus::Failed);
    let committed = lab.instructions_with_status(InstructionStatus::Committed).len();
    let halted = lab.halted_instructions();

    println!(
        "replay finished at t={:.1}: {} committed, {} failed, {} halted, {} unrunnable",
        clock,
        committed,
        failed.len(),
        halted.len(),
        unrunnable.len()
    );
    for ins in &failed {
        println!("  failed {}: {}", ins.identifier(), ins.failure().unwrap_or("?"));
    }
    for id in &halted {
        println!("  halted {}", id);
    }
    if show_state {
        print_state(&lab, true)?;
    }

    if !failed.is_empty() || !unrunnable.is_empty() {
        bail!(
            "{} instruction(s) failed and {} could not be scheduled",
            failed.len(),
            unrunnable.len()
        );
    }
    Ok(())
}
