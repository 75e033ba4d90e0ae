//! flowrt - CLI

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use flowrt::runtime::flow::TaskStatus;
use flowrt::util::config::load_config;
use flowrt::util::logger::{self, LogLevel};
use flowrt::{plan_file, run_file, FlowEvent, RunOptions, NAME, VERSION};
use std::path::PathBuf;

/// Run DAGs of named tasks described in TOML flow files
#[derive(Parser, Debug)]
#[command(name = "flowrt")]
#[command(author = "flowrt contributors")]
#[command(version = VERSION)]
#[command(about = NAME, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a flow file
    Run {
        /// Flow file to run
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Worker threads
        #[arg(short, long)]
        workers: Option<usize>,

        /// Maximum number of tasks running at once
        #[arg(short, long)]
        limit: Option<usize>,

        /// Run every task on the main thread
        #[arg(long)]
        inline: bool,
    },

    /// Validate a flow file and print its levels
    Plan {
        /// Flow file to check
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Print version information
    Version,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    if args.verbose {
        logger::init_with_level(LogLevel::Debug);
        eprintln!("flowrt version: {}", VERSION);
        eprintln!("Host: {}", std::env::consts::OS);
    } else {
        logger::init_from_config(&config.log);
    }

    match args.command {
        Commands::Run {
            file,
            workers,
            limit,
            inline,
        } => {
            let options = RunOptions {
                workers,
                limit,
                inline,
            };
            let report = run_file(&file, &config, &options, |event| match event {
                FlowEvent::TaskStarted(task) => println!("  start  {}", task),
                FlowEvent::TaskFinished(task) => println!("  done   {}", task),
                FlowEvent::FlowFinished(status) => println!("flow {}", status),
            })
            .with_context(|| format!("Failed to run: {}", file.display()))?;

            for task in &report.tasks {
                match (&task.status, &task.error) {
                    (TaskStatus::Failed, Some(error)) => {
                        println!("{:>4}  {:<24} {}  {}", task.level, task.name, task.status, error)
                    }
                    _ => println!("{:>4}  {:<24} {}", task.level, task.name, task.status),
                }
            }
            println!("finished in {:.3}s", report.elapsed.as_secs_f64());

            if let Some(error) = report.error {
                bail!(
                    "task `{}` failed: {}",
                    report.failed_task.unwrap_or_default(),
                    error
                );
            }
        }
        Commands::Plan { file } => {
            let plan =
                plan_file(&file).with_context(|| format!("Failed to plan: {}", file.display()))?;
            for (name, level) in plan {
                println!("{:>4}  {}", level, name);
            }
        }
        Commands::Version => {
            println!("{} {}", NAME, VERSION);
        }
    }

    Ok(())
}
