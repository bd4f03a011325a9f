mod affinity;
mod cli;
mod config;
mod error;
mod load;
mod logging;
mod orchestrator;
mod report;
mod topology;

use std::path::Path;
use std::process;
use std::sync::Arc;

use clap::{CommandFactory, Parser};

use cli::{CalibrateArgs, Cli, Command, LoadArgs};
use config::{LoadMode, RunConfig};
use error::Error;

/// Build a RunConfig by layering: defaults → TOML file → CLI overrides.
fn build_run_config(
    config_file: Option<&Path>,
    start: usize,
    load_args: &LoadArgs,
) -> Result<RunConfig, Error> {
    let mut cfg = config::load_config(config_file)?.load;
    cfg.start_cpu = start;

    // Apply CLI overrides (only if explicitly set)
    if let Some(v) = load_args.count {
        cfg.count = v;
    }
    if let Some(v) = load_args.timeout {
        cfg.timeout_secs = v;
    }
    if let Some(v) = load_args.busy {
        cfg.busy_pct = v;
    }
    if let Some(v) = load_args.sample {
        cfg.sample_ms = v;
    }
    if let Some(v) = load_args.period {
        cfg.period_secs = v;
    }
    if let Some(v) = load_args.mode {
        cfg.mode = LoadMode::from_code(v)?;
    }

    cfg.validate()?;
    Ok(cfg)
}

fn run_load(cli: &Cli) -> Result<(), Error> {
    let start = cli
        .start
        .ok_or_else(|| Error::InvalidArgs("-s is a must".into()))?;
    let cfg = build_run_config(cli.config_file.as_deref(), start, &cli.load)?;
    let online = topology::online_cpus()?;

    orchestrator::run(Arc::new(cfg), online)?;
    Ok(())
}

fn run_calibrate(args: &CalibrateArgs) -> Result<(), Error> {
    let load_args = LoadArgs {
        count: Some(args.count),
        timeout: None,
        busy: None,
        sample: args.sample,
        period: None,
        mode: None,
    };
    let cfg = build_run_config(args.config_file.as_deref(), args.start, &load_args)?;
    let online = topology::online_cpus()?;

    report::run(args, Arc::new(cfg), online)?;
    Ok(())
}

fn parse_cli() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            if !e.use_stderr() {
                // --help / --version
                process::exit(0);
            }
            println!();
            let _ = Cli::command().print_help();
            process::exit(1);
        }
    }
}

fn main() {
    let cli = parse_cli();

    let result = match &cli.command {
        Some(Command::Calibrate(args)) => {
            logging::init(&args.log);
            run_calibrate(args)
        }
        None => {
            logging::init(&cli.log);
            run_load(&cli)
        }
    };

    if let Err(e) = result {
        log::error!("{}", e);
        process::exit(1);
    }
}
