/*
This program generates a synthetic sparse regression problem and stores it in the local filesystem.
*/

use std::{path::PathBuf, process::ExitCode, time::Instant};

use clap::{Parser, ValueEnum};
use penadmm_core::{dataset::Dataset, utils::max_abs};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Family {
    /// y = X beta + noise
    Gaussian,
    /// y ~ Bernoulli(sigmoid(X beta))
    Binomial,
}

/// Program to generate a design X, response y and true coefficients.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The number of rows in X
    #[arg(short, long)]
    n: usize,

    /// The number of columns in X
    #[arg(short, long)]
    p: usize,

    /// The number of non-zero elements in beta_true
    #[arg(short, long)]
    k: usize,

    /// Standard deviation of the Gaussian noise
    #[arg(long, default_value_t = 0.03162)]
    noise: f64,

    /// Seed of every random draw
    #[arg(short, long, default_value_t = 42)]
    seed: u64,

    /// Response family
    #[arg(short, long, value_enum, default_value_t = Family::Gaussian)]
    family: Family,

    /// Output problem file
    #[arg(short, long, default_value = "problem.bin")]
    out: PathBuf,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let start = Instant::now();

    println!(
        "[Main] Generating {:?} problem with n = {}, p = {}, k = {}...",
        args.family, args.n, args.p, args.k
    );
    let dataset = match args.family {
        Family::Gaussian => Dataset::synthetic_gaussian(args.n, args.p, args.k, args.noise, args.seed),
        Family::Binomial => Dataset::synthetic_binomial(args.n, args.p, args.k, args.seed),
    };
    let dataset = match dataset {
        Ok(dataset) => dataset,
        Err(e) => {
            eprintln!("[Main] {}", e);
            return ExitCode::FAILURE;
        }
    };
    println!("[Main] Data generated in {:?}", start.elapsed());

    // ||X'y||_inf, the top of the default Lasso path
    let lambda_max = max_abs(&dataset.x.tr_mul(&dataset.y));
    println!("[Main] Lambda_max: {}", lambda_max);

    if let Err(e) = dataset.save(&args.out) {
        eprintln!("[Main] failed to write {}: {}", args.out.display(), e);
        return ExitCode::FAILURE;
    }
    println!(
        "[Main] Problem written to {} in {:?}",
        args.out.display(),
        start.elapsed()
    );
    ExitCode::SUCCESS
}
