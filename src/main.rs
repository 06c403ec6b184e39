//! timeslice - CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use timeslice::runtime::scheduler::Callback;
use timeslice::util::config::{load_config_file, load_user_config, Config};
use timeslice::util::logger::{self, LogLevel};
use timeslice::{
    MessageLoopHost, PriorityLevel, Scheduler, TaskId, TaskOptions, TaskStatus, Time, NAME,
    VERSION,
};
use tracing::{debug, info};

/// Cooperative priority task scheduler
#[derive(Parser, Debug)]
#[command(name = "timeslice")]
#[command(version = VERSION)]
#[command(about = "Cooperative priority task scheduler", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a synthetic workload on the message-loop host and print the trace
    Demo {
        /// Number of tasks to submit
        #[arg(long, default_value_t = 20)]
        tasks: usize,

        /// Seed for the workload generator
        #[arg(long)]
        seed: Option<u64>,

        /// Force a frame rate (0 restores the default slice)
        #[arg(long, value_name = "FPS")]
        frame_rate: Option<f64>,

        /// Print profiling events as JSON
        #[arg(long)]
        profile: bool,

        /// Configuration file
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Configuration file
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Print version information
    Version,
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Demo {
            tasks,
            seed,
            frame_rate,
            profile,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            init_logging(&config, args.verbose);
            run_demo(
                &config,
                DemoOptions {
                    tasks,
                    seed,
                    frame_rate,
                    profile,
                },
            )?;
        }
        Commands::Config { config } => {
            let config = load_config(config.as_deref())?;
            init_logging(&config, args.verbose);
            print!("{}", config.to_toml()?);
        }
        Commands::Version => {
            println!("{} {}", NAME, VERSION);
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => load_config_file(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => load_user_config().context("Failed to load user config")?,
    };
    config.apply_env()?;
    Ok(config)
}

fn init_logging(
    config: &Config,
    verbose: bool,
) {
    let level = if verbose {
        LogLevel::Debug
    } else {
        config.log.level
    };
    logger::init_with_level(level);
}

struct DemoOptions {
    tasks: usize,
    seed: Option<u64>,
    frame_rate: Option<f64>,
    profile: bool,
}

/// One executed step of a demo task.
struct TraceEntry {
    time: Time,
    id: TaskId,
    level: PriorityLevel,
    step: u32,
    steps: u32,
    did_timeout: bool,
}

struct DemoContext {
    scheduler: Scheduler,
    trace: RefCell<Vec<TraceEntry>>,
}

fn run_demo(
    config: &Config,
    options: DemoOptions,
) -> Result<()> {
    let host = Rc::new(MessageLoopHost::with_config(config.host.clone()));
    let mut scheduler_config = config.scheduler.clone();
    scheduler_config.enable_profiling |= options.profile;
    let scheduler = Scheduler::with_config(host.clone(), scheduler_config);

    if let Some(fps) = options.frame_rate {
        scheduler.force_frame_rate(fps)?;
    }

    let seed = options.seed.unwrap_or_else(|| rand::rng().random());
    let mut rng = StdRng::seed_from_u64(seed);
    info!("demo: {} tasks, seed {}", options.tasks, seed);

    let ctx = Rc::new(DemoContext {
        scheduler: scheduler.clone(),
        trace: RefCell::new(Vec::new()),
    });

    for _ in 0..options.tasks {
        let level = PriorityLevel::from_u8(rng.random_range(1..=5));
        let delay = if rng.random_bool(0.25) {
            rng.random_range(1.0..50.0)
        } else {
            0.0
        };
        let steps = rng.random_range(1..=4);
        let cost = rng.random_range(0.5..4.0);
        let task = scheduler.schedule_task_with_options(
            level,
            demo_step(ctx.clone(), 1, steps, cost),
            TaskOptions::delayed(delay),
        );
        debug!(
            "submitted {} ({}, {} steps of {:.2}ms, delay {:.2}ms)",
            task.id(),
            level,
            steps,
            cost,
            delay
        );
    }

    host.run()?;

    for entry in ctx.trace.borrow().iter() {
        let level = colorize(entry.level);
        let timeout = if entry.did_timeout {
            " timed out".red().to_string()
        } else {
            String::new()
        };
        println!(
            "{:>10.3}ms  {:<10} {:<24} step {}/{}{}",
            entry.time,
            entry.id.to_string(),
            level,
            entry.step,
            entry.steps,
            timeout
        );
    }

    let steps = ctx.trace.borrow().len();
    println!(
        "{} {} tasks, {} steps, {:.3}ms",
        "done:".bold(),
        options.tasks,
        steps,
        scheduler.now()
    );

    if options.profile {
        println!("{}", scheduler.profiling_json()?);
    }

    Ok(())
}

/// A task step that busy-waits for `cost` ms and continues until `steps`.
fn demo_step(
    ctx: Rc<DemoContext>,
    step: u32,
    steps: u32,
    cost: Time,
) -> Callback {
    Box::new(move |did_timeout| {
        let started = ctx.scheduler.now();
        while ctx.scheduler.now() - started < cost {
            std::hint::spin_loop();
        }

        if let Some(task) = ctx.scheduler.current_task() {
            ctx.trace.borrow_mut().push(TraceEntry {
                time: started,
                id: task.id(),
                level: task.priority_level(),
                step,
                steps,
                did_timeout,
            });
        }

        if step < steps {
            Ok(TaskStatus::Continue(demo_step(ctx, step + 1, steps, cost)))
        } else {
            Ok(TaskStatus::Done)
        }
    })
}

fn colorize(level: PriorityLevel) -> String {
    let name = level.to_string();
    match level {
        PriorityLevel::Immediate => name.red().bold().to_string(),
        PriorityLevel::UserBlocking => name.yellow().to_string(),
        PriorityLevel::Normal => name.green().to_string(),
        PriorityLevel::Low => name.blue().to_string(),
        PriorityLevel::Idle => name.dimmed().to_string(),
    }
}
