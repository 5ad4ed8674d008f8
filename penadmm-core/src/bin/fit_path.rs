/*
This program fits a penalized regression path to a problem file written by generate_problem.
*/

use std::{path::PathBuf, process::ExitCode, time::Instant};

use clap::{Parser, ValueEnum};
use penadmm_core::{
    config::FitConfig,
    coord::{CoordProblem, CoordSolver},
    dataset::Dataset,
    genridge::{GenRidgeAdmm, first_difference},
    lasso::{LassoAdmm, LassoCoord},
    logistic::LogisticLassoAdmm,
    mcp::McpCoord,
    path::{PathFit, fit_admm_path, fit_coord_path},
    problem::{AdmmProblem, AdmmSolver},
    timing::TimingTracker,
    utils::LassoError,
};

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum Model {
    /// Lasso with accelerated ADMM
    Lasso,
    /// Lasso with coordinate descent
    LassoCd,
    /// Logistic Lasso with accelerated ADMM
    Logistic,
    /// Lasso plus a first-difference fused ridge penalty
    Genridge,
    /// MCP regression with coordinate descent
    Mcp,
    /// MCP regression whose loss uses only the first --num-loss rows
    McpPartial,
}

/// Program to fit a lambda path and report per-lambda results.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Problem file written by generate_problem
    #[arg(short, long)]
    problem: PathBuf,

    /// JSON fit configuration; defaults are used for missing fields
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// The model to fit
    #[arg(short, long, value_enum, default_value_t = Model::Lasso)]
    model: Model,

    /// Number of leading rows in the loss of mcp-partial
    #[arg(long)]
    num_loss: Option<usize>,

    /// Prefix of the step and path timing CSV files
    #[arg(long)]
    timing_prefix: Option<String>,

    /// Write the fitted path as JSON
    #[arg(short, long)]
    out: Option<PathBuf>,
}

fn fit_admm<P: AdmmProblem>(
    model: P,
    config: &FitConfig,
) -> Result<(PathFit, AdmmSolver<P>), LassoError> {
    let mut solver = AdmmSolver::new(
        model,
        config.eps_abs,
        config.eps_rel,
        config.spectral_estimator(),
    );
    let fit = fit_admm_path(&mut solver, config)?;
    Ok((fit, solver))
}

fn fit_coord<P: CoordProblem>(
    model: P,
    config: &FitConfig,
) -> Result<(PathFit, CoordSolver<P>), LassoError> {
    let mut solver = CoordSolver::new(model, config.eps_rel);
    let fit = fit_coord_path(&mut solver, config)?;
    Ok((fit, solver))
}

fn report(fit: &PathFit, tracker: &TimingTracker, args: &Args) -> Result<(), LassoError> {
    println!("[Main] {:>4} {:>14} {:>10} {:>9} {:>6}", "step", "lambda", "iterations", "converged", "nnz");
    for i in 0..fit.len() {
        println!(
            "[Main] {:>4} {:>14.6e} {:>10} {:>9} {:>6}",
            i + 1,
            fit.lambdas[i],
            fit.iterations[i],
            fit.converged[i],
            fit.coefficients[i].nnz()
        );
    }
    let missed = fit.converged.iter().filter(|c| !**c).count();
    if missed > 0 {
        println!("[Main] {} of {} lambda values hit the iteration cap", missed, fit.len());
    }

    println!("\n{}", tracker.summary());
    if let Some(prefix) = &args.timing_prefix {
        tracker.export_all(prefix)?;
    }
    if let Some(out) = &args.out {
        std::fs::write(out, serde_json::to_string_pretty(fit)?)?;
        println!("[Main] Path written to {}", out.display());
    }
    Ok(())
}

fn run(args: &Args) -> Result<(), LassoError> {
    let config = match &args.config {
        Some(path) => FitConfig::from_json_file(path)?,
        None => FitConfig::default(),
    };
    let data = Dataset::load(&args.problem)?;
    println!(
        "[Main] Loaded {}x{} problem from {}",
        data.nrows(),
        data.ncols(),
        args.problem.display()
    );
    if !config.penalty_factor.is_empty() && matches!(args.model, Model::Lasso | Model::Logistic) {
        println!("[Main] {:?} uses a uniform penalty; penalty_factor is ignored", args.model);
    }

    let (x, y) = (&data.x, &data.y);
    let pf = config.penalty_factor.clone();
    let start = Instant::now();
    match args.model {
        Model::Lasso => {
            let (fit, solver) = fit_admm(LassoAdmm::new(x, y)?, &config)?;
            report(&fit, solver.timing_tracker(), args)?;
        }
        Model::LassoCd => {
            let model = LassoCoord::new(x, y)?.with_penalty_factor(pf)?;
            let (fit, solver) = fit_coord(model, &config)?;
            report(&fit, solver.timing_tracker(), args)?;
        }
        Model::Logistic => {
            let model = LogisticLassoAdmm::new(x, y)?.with_newton(config.newton_maxit, config.newton_tol);
            let (fit, solver) = fit_admm(model, &config)?;
            report(&fit, solver.timing_tracker(), args)?;
            let newton = solver.problem().report();
            println!(
                "[Main] Newton: {} solves, {} steps, {} capped, {} non-decreasing steps",
                newton.calls, newton.inner_iterations, newton.capped_calls, newton.non_decrease_steps
            );
        }
        Model::Genridge => {
            let d = first_difference(data.ncols());
            let model = GenRidgeAdmm::new(x, y, &d, config.alpha)?.with_penalty_factor(pf)?;
            println!("[Main] First-difference fused ridge with alpha = {}", model.alpha());
            let (fit, solver) = fit_admm(model, &config)?;
            report(&fit, solver.timing_tracker(), args)?;
        }
        Model::Mcp => {
            let model = McpCoord::new(x, y, pf, config.gamma)?;
            println!("[Main] MCP with gamma = {}", model.gamma());
            let (fit, solver) = fit_coord(model, &config)?;
            report(&fit, solver.timing_tracker(), args)?;
        }
        Model::McpPartial => {
            let num_loss = args.num_loss.ok_or_else(|| {
                LassoError::InvalidConfig("mcp-partial requires --num-loss".to_string())
            })?;
            let model = McpCoord::partial(x, y, pf, config.gamma, num_loss)?;
            println!(
                "[Main] MCP with gamma = {}, loss over the first {} of {} rows",
                model.gamma(),
                model.num_loss(),
                data.nrows()
            );
            let (fit, solver) = fit_coord(model, &config)?;
            report(&fit, solver.timing_tracker(), args)?;
        }
    }
    println!("[Main] Path fitted in {:?}", start.elapsed());
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("[Main] {}", e);
            ExitCode::FAILURE
        }
    }
}
