use anyhow::Result;
use bootcfg::boot_config::{Mutation, WriteStatus};
use bootcfg::cli::{parse_args, Args, GlobalArgs};
use bootcfg::config::{self, Config};
use bootcfg::config_set::{ConfigSet, FanOutReport};
use bootcfg::diff_formatter::DiffFormatter;
use bootcfg::{exit_codes, hardware, logger, SafeModeBackup};
use std::path::Path;
use std::process::ExitCode;

fn main() -> ExitCode {
    let (global, args) = match parse_args() {
        Ok(parsed) => parsed,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(exit_codes::for_parse_error(&e) as u8);
        }
    };

    match run(&global, args) {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_codes::for_error(&e) as u8)
        }
    }
}

fn run(global: &GlobalArgs, args: Args) -> Result<()> {
    let (config, config_path) = config::load_config(global.config.as_deref())?;

    if let Some(log_path) = logger::init_logging(config.logging.debug, global.verbose)? {
        tracing::debug!("Debug log: {}", log_path.display());
    }
    tracing::debug!("Using configuration {}", config_path.display());

    let mut configs = ConfigSet::from_paths(&config.paths);
    if global.dry_run || config.engine.dry_run {
        configs.set_dry_run();
    }

    match args {
        Args::Ensure => {
            let report = configs.apply(&global.target.targets(), |c| c.ensure_exists());
            for outcome in &report.outcomes {
                match &outcome.result {
                    Ok(true) if configs.get(outcome.target).is_dry_run() => {
                        println!("{}: would create", outcome.path.display())
                    }
                    Ok(true) => println!("{}: created", outcome.path.display()),
                    Ok(false) => println!("{}: exists", outcome.path.display()),
                    Err(e) => println!("{}: failed: {:#}", outcome.path.display(), e),
                }
            }
            report.check()?;
        }
        Args::Set { name, value } => {
            let report = configs.apply(&global.target.targets(), |c| {
                c.set_value(&name, value.as_deref())
            });
            print_mutations(global, report)?;
        }
        Args::Get { name } => {
            let value = configs.get(global.target.query_target()).get_value(&name)?;
            println!("{}", value);
        }
        Args::SetComment { name, value } => {
            let report = configs.apply(&global.target.targets(), |c| c.set_comment(&name, &value));
            print_mutations(global, report)?;
        }
        Args::GetComment { name, value } => {
            let found = configs.get(global.target.query_target()).get_comment(&name, &value)?;
            println!("{}", found);
        }
        Args::HasComment { name } => {
            let found = configs.get(global.target.query_target()).has_comment(&name)?;
            println!("{}", found);
        }
        Args::RemoveBlock { sentinel } => {
            let sentinel = sentinel.unwrap_or_else(|| config.engine.noobs_sentinel.clone());
            let report = configs.apply(&global.target.targets(), |c| {
                c.strip_trailing_block(&sentinel)
            });
            print_mutations(global, report)?;
        }
        Args::Snapshot => {
            let backup = SafeModeBackup::from_config(&config);
            if global.dry_run || config.engine.dry_run {
                println!(
                    "Would copy {} to {}",
                    backup.primary().display(),
                    backup.snapshot_path().display()
                );
            } else {
                backup.snapshot()?;
                println!("Snapshot saved to {}", backup.snapshot_path().display());
            }
        }
        Args::Restore => {
            let backup = SafeModeBackup::from_config(&config);
            if global.dry_run || config.engine.dry_run {
                println!(
                    "Would move {} to {}",
                    backup.snapshot_path().display(),
                    backup.primary().display()
                );
            } else {
                backup.restore()?;
                println!("Restored {}", backup.primary().display());
            }
        }
        Args::Status { json } => {
            show_status(&config, json)?;
        }
        Args::Check => {
            hardware::enforce_expected_hardware(&config.paths)?;
            println!("ok");
        }
        Args::Config { init, force } => {
            show_or_init_config(&config, &config_path, init, force)?;
        }
    }

    Ok(())
}

fn print_mutations(global: &GlobalArgs, report: FanOutReport<Mutation>) -> Result<()> {
    let use_color = DiffFormatter::should_use_color();

    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(mutation) if mutation.status == WriteStatus::DryRun => {
                print!("{}", DiffFormatter::format_mutation(mutation, global.context, use_color));
            }
            Ok(mutation) => println!("{}", DiffFormatter::format_status(mutation)),
            Err(e) => println!("{}: failed: {:#}", outcome.path.display(), e),
        }
    }

    // A single-file failure keeps its own error type for the exit status
    if report.outcomes.len() == 1 {
        if let Some(outcome) = report.outcomes.into_iter().next() {
            outcome.result?;
        }
        return Ok(());
    }

    report.check()?;
    Ok(())
}

fn show_status(config: &Config, json: bool) -> Result<()> {
    let status = SafeModeBackup::from_config(config).status();

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("Primary config:  {}", status.primary.display());
    println!("Snapshot:        {}", status.snapshot.display());
    if status.restored_state {
        println!("State:           snapshot present (unconfirmed config)");
        if let Some(size) = status.size_bytes {
            println!("Snapshot size:   {} bytes", size);
        }
        if let Some(modified) = status.modified {
            println!("Snapshot taken:  {}", modified.format("%Y-%m-%d %H:%M:%S"));
        }
    } else {
        println!("State:           no snapshot");
    }

    Ok(())
}

fn show_or_init_config(config: &Config, path: &Path, init: bool, force: bool) -> Result<()> {
    if init {
        if path.exists() && !force {
            anyhow::bail!(
                "Config file already exists: {} (use --force to overwrite)",
                path.display()
            );
        }
        config::save_default_config(path)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    println!("# {}", path.display());
    print!("{}", config::to_toml(config)?);
    Ok(())
}
