use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tensegrity_sim::{render_summary, Snapshot, SolveReport, StructureFile, TensegritySolver};

/// Solve a tensegrity structure for static equilibrium.
#[derive(Parser)]
#[command(name = "tensegrity-sim")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Structure file (.yaml)
    file: PathBuf,

    /// Control length changes applied after the first solve, in control order
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    controls: Option<Vec<f64>>,

    /// Print a JSON snapshot instead of the text report
    #[arg(long)]
    json: bool,

    /// Convergence tolerance on the residual
    #[arg(long)]
    tolerance: Option<f64>,

    /// Maximum number of solver iterations
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Read control length changes from standard input after the first solve
    #[arg(short, long)]
    interactive: bool,
}

fn print(solver: &TensegritySolver, report: &SolveReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", Snapshot::capture(solver.tensegrity(), Some(report)).to_json()?);
    } else {
        println!("{}", render_summary(solver.tensegrity(), Some(report)));
    }
    Ok(())
}

fn parse_deltas(line: &str) -> anyhow::Result<Vec<f64>> {
    line.split(',')
        .map(|value| {
            value
                .trim()
                .parse::<f64>()
                .with_context(|| format!("'{}' is not a number", value.trim()))
        })
        .collect()
}

fn prompt(solver: &TensegritySolver) -> io::Result<()> {
    let controls = solver.tensegrity().control_order().join(", ");
    print!("control changes [{controls}], r to reset, q to quit> ");
    io::stdout().flush()
}

fn interact(solver: &mut TensegritySolver, json: bool) -> anyhow::Result<()> {
    prompt(solver)?;
    for line in io::stdin().lock().lines() {
        let line = line?;
        match line.trim() {
            "q" | "quit" => break,
            "" => {}
            "r" | "reset" => {
                solver.tensegrity_mut().reset_control_lengths();
                resolve(solver, json)?;
            }
            deltas => match parse_deltas(deltas) {
                Ok(deltas) => match solver.tensegrity_mut().change_control_lengths(&deltas) {
                    Ok(()) => resolve(solver, json)?,
                    Err(error) => eprintln!("{error}"),
                },
                Err(error) => eprintln!("{error:#}"),
            },
        }
        prompt(solver)?;
    }
    Ok(())
}

/// Solve again after an interactive change; a failed solve keeps the last equilibrium.
fn resolve(solver: &mut TensegritySolver, json: bool) -> anyhow::Result<()> {
    match solver.solve() {
        Ok(report) => print(solver, &report, json),
        Err(error) => {
            eprintln!("{error}");
            Ok(())
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let file = StructureFile::from_path(&cli.file)
        .with_context(|| format!("loading {}", cli.file.display()))?;
    let mut solver = file.build_solver()?;
    let mut config = *solver.config();
    if let Some(tolerance) = cli.tolerance {
        config.tolerance = tolerance;
    }
    if let Some(max_iterations) = cli.max_iterations {
        config.max_iterations = max_iterations;
    }
    solver.set_config(config);

    let mut report = solver.solve().context("initial solve failed")?;
    if let Some(deltas) = &cli.controls {
        solver.tensegrity_mut().change_control_lengths(deltas)?;
        report = solver.solve().context("solve after control change failed")?;
    }
    print(&solver, &report, cli.json)?;

    if cli.interactive {
        interact(&mut solver, cli.json)?;
    }
    Ok(())
}
