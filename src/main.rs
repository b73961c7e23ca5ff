//! cifar_ssl CLI
//!
//! Entry point for semi-supervised CIFAR training: dataset download,
//! Noisy Student and FixMatch runs, and dataset statistics. All
//! configuration is consumed here at process start; there is no runtime
//! reconfiguration.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use cifar_ssl::backend::{backend_name, TrainingBackend};
use cifar_ssl::dataset::{self, CifarDataset, DatasetKind, Split};
use cifar_ssl::model::{Capacity, GrowthSequence};
use cifar_ssl::training::{fixmatch, noisy_student, FixMatchConfig, NoisyStudentConfig};
use cifar_ssl::utils::logging::{init_logging, LogConfig};

/// Semi-supervised CIFAR classification (Noisy Student, FixMatch) with Burn
#[derive(Parser, Debug)]
#[command(name = "cifar_ssl")]
#[command(version)]
#[command(about = "Semi-supervised CIFAR training with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download and extract the CIFAR binary datasets
    Download {
        /// Output directory for the datasets
        #[arg(short, long, default_value = "data")]
        data_dir: String,

        /// Which dataset to fetch (cifar10, cifar100, both)
        #[arg(long, default_value = "both")]
        dataset: String,
    },

    /// Train with iterative teacher/student promotion (Noisy Student)
    NoisyStudent {
        /// Labeled dataset (cifar10 or cifar100); the other variant is the
        /// unlabeled pool
        #[arg(short, long, default_value = "cifar10")]
        dataset: String,

        /// Directory holding the extracted datasets
        #[arg(long, default_value = "data")]
        data_dir: String,

        /// Student epochs per iteration
        #[arg(short, long, default_value = "350")]
        epochs: usize,

        /// Supervised warmup epochs before student training starts
        #[arg(short, long, default_value = "10")]
        warmup: usize,

        /// Number of teacher/student promotion iterations
        #[arg(short, long, default_value = "3")]
        iterations: usize,

        /// Base batch size (large capacities halve it)
        #[arg(short, long, default_value = "256")]
        batch_size: usize,

        /// Student capacity growth sequence, first entry is the warmup
        /// teacher
        #[arg(long, default_value = "small,medium,large,xlarge")]
        growth: String,

        /// Pseudo-label confidence threshold
        #[arg(long, default_value = "0.4")]
        threshold: f32,

        /// Weight of the consistency loss term
        #[arg(long, default_value = "1.0")]
        coefficient: f64,

        /// Initial learning rate
        #[arg(short, long, default_value = "0.128")]
        lr: f64,

        /// Evaluate on the test set every N epochs
        #[arg(long, default_value = "10")]
        eval_every: usize,

        /// Output directory for experiment logs
        #[arg(short, long, default_value = "results")]
        outdir: String,

        /// Name of the experiment
        #[arg(short, long, default_value = "noisy_student")]
        name: String,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Train with confidence-masked consistency (FixMatch)
    Fixmatch {
        /// Labeled dataset (cifar10 or cifar100)
        #[arg(short, long, default_value = "cifar10")]
        dataset: String,

        /// Directory holding the extracted datasets
        #[arg(long, default_value = "data")]
        data_dir: String,

        /// Training epochs
        #[arg(short, long, default_value = "300")]
        epochs: usize,

        /// Batch size
        #[arg(short, long, default_value = "64")]
        batch_size: usize,

        /// Model capacity (small, medium, large, xlarge)
        #[arg(long, default_value = "medium")]
        capacity: String,

        /// Pseudo-label confidence threshold
        #[arg(long, default_value = "0.95")]
        threshold: f32,

        /// Weight of the unlabeled loss term
        #[arg(long, default_value = "1.0")]
        coefficient: f64,

        /// Initial learning rate
        #[arg(short, long, default_value = "0.03")]
        lr: f64,

        /// Evaluate on the test set every N epochs
        #[arg(long, default_value = "10")]
        eval_every: usize,

        /// Output directory for experiment logs
        #[arg(short, long, default_value = "results")]
        outdir: String,

        /// Name of the experiment
        #[arg(short, long, default_value = "fixmatch")]
        name: String,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Show dataset statistics
    Stats {
        /// Dataset to inspect (cifar10 or cifar100)
        #[arg(short, long, default_value = "cifar10")]
        dataset: String,

        /// Directory holding the extracted datasets
        #[arg(long, default_value = "data")]
        data_dir: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    let _ = init_logging(&log_config);

    match cli.command {
        Commands::Download { data_dir, dataset } => cmd_download(&data_dir, &dataset)?,

        Commands::NoisyStudent {
            dataset,
            data_dir,
            epochs,
            warmup,
            iterations,
            batch_size,
            growth,
            threshold,
            coefficient,
            lr,
            eval_every,
            outdir,
            name,
            seed,
        } => {
            let config = NoisyStudentConfig {
                dataset: DatasetKind::parse(&dataset)?,
                data_dir: PathBuf::from(data_dir),
                epochs,
                warmup_epochs: warmup,
                iterations,
                batch_size,
                growth: GrowthSequence::parse(&growth)?,
                confidence_threshold: threshold,
                coefficient,
                learning_rate: lr,
                eval_every,
                outdir: PathBuf::from(outdir),
                name,
                seed,
            };
            config.validate()?;

            println!("{}", "Noisy Student Configuration:".cyan().bold());
            println!("  Dataset:      {}", config.dataset);
            println!(
                "  Unlabeled:    {}",
                config.dataset.unlabeled_counterpart()
            );
            println!("  Warmup:       {} epochs", config.warmup_epochs);
            println!(
                "  Iterations:   {} x {} epochs",
                config.iterations, config.epochs
            );
            println!("  Growth:       {}", config.growth);
            println!("  Threshold:    {}", config.confidence_threshold);
            println!("  Backend:      {}", backend_name());
            println!();

            let outcome = noisy_student::run::<TrainingBackend>(config)?;

            println!();
            println!("{}", "Training complete!".green().bold());
            println!(
                "  Final teacher: test loss {:.4}, accuracy {:.2}%",
                outcome.final_test.loss,
                outcome.final_test.accuracy * 100.0
            );
            println!(
                "  {} promotions, {} students trained",
                outcome.promotions, outcome.students_created
            );
        }

        Commands::Fixmatch {
            dataset,
            data_dir,
            epochs,
            batch_size,
            capacity,
            threshold,
            coefficient,
            lr,
            eval_every,
            outdir,
            name,
            seed,
        } => {
            let config = FixMatchConfig {
                dataset: DatasetKind::parse(&dataset)?,
                data_dir: PathBuf::from(data_dir),
                epochs,
                batch_size,
                capacity: Capacity::parse(&capacity)?,
                confidence_threshold: threshold,
                coefficient,
                learning_rate: lr,
                eval_every,
                outdir: PathBuf::from(outdir),
                name,
                seed,
            };
            config.validate()?;

            println!("{}", "FixMatch Configuration:".cyan().bold());
            println!("  Dataset:      {}", config.dataset);
            println!("  Epochs:       {}", config.epochs);
            println!("  Capacity:     {}", config.capacity);
            println!("  Threshold:    {}", config.confidence_threshold);
            println!("  Backend:      {}", backend_name());
            println!();

            let outcome = fixmatch::run::<TrainingBackend>(config)?;

            println!();
            println!("{}", "Training complete!".green().bold());
            println!(
                "  Final: test loss {:.4}, accuracy {:.2}%",
                outcome.final_test.loss,
                outcome.final_test.accuracy * 100.0
            );
        }

        Commands::Stats { dataset, data_dir } => cmd_stats(&dataset, &data_dir)?,
    }

    Ok(())
}

fn cmd_download(data_dir: &str, dataset: &str) -> Result<()> {
    let dir = PathBuf::from(data_dir);
    let kinds: Vec<DatasetKind> = match dataset.to_lowercase().as_str() {
        "both" => vec![DatasetKind::Cifar10, DatasetKind::Cifar100],
        other => vec![DatasetKind::parse(other)?],
    };

    for kind in kinds {
        info!("Fetching {}", kind);
        let extracted = dataset::download_dataset(kind, &dir)?;
        println!(
            "{} {} ready at {:?}",
            "OK".green().bold(),
            kind,
            extracted
        );
    }

    Ok(())
}

fn cmd_stats(dataset: &str, data_dir: &str) -> Result<()> {
    let kind = DatasetKind::parse(dataset)?;
    let dir = PathBuf::from(data_dir);

    for split in [Split::Train, Split::Test] {
        let loaded = CifarDataset::load(&dir, kind, split)?;
        let stats = loaded.stats();

        let split_name = match split {
            Split::Train => "train",
            Split::Test => "test",
        };
        println!(
            "{}",
            format!("{} {} split:", kind, split_name).cyan().bold()
        );
        println!("  Total samples: {}", stats.total_samples);
        println!("  Classes:       {}", stats.num_classes);

        for (idx, count) in stats.class_counts.iter().enumerate() {
            let class_name = kind.class_name(idx).unwrap_or("unknown");
            let pct = 100.0 * *count as f64 / stats.total_samples.max(1) as f64;
            println!("  {:24} {:>6} ({:>5.1}%)", class_name, count, pct);
        }
        println!();
    }

    Ok(())
}
