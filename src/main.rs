mod cli;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use cli::{Cli, Command, RunArgs};
use reclaim::catalog::Category;
use reclaim::categories::{all_cleaner_names, RunContext};
use reclaim::config::Settings;
use reclaim::disk_info::disk_space;
use reclaim::executor::StopFlag;
use reclaim::orchestrator::CleanupOrchestrator;
use reclaim::report::{CategoryOutcome, RunKind, RunSummary};

fn init_logging(quiet: bool, verbose: bool) {
    let default_level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    let env = env_logger::Env::default().default_filter_or(default_level);
    let _ = env_logger::Builder::from_env(env).is_test(false).try_init();
    log::debug!("Logger initialized with level: {default_level}");
}

/// Turn Ctrl-C into a cooperative stop. A second Ctrl-C while stopping
/// ends the process.
fn install_interrupt_handler(stop: StopFlag) {
    let result = ctrlc::set_handler(move || {
        if stop.is_set() {
            std::process::exit(130);
        }
        log::warn!("interrupted, finishing in-flight batches");
        stop.stop();
    });
    if let Err(e) = result {
        log::warn!("cannot install Ctrl-C handler: {e}");
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            output::print_error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let mut settings = Settings::load(cli.config.as_deref()).context("cannot load settings")?;
    settings.verbose |= cli.verbose;

    match cli.command {
        Command::Categories => {
            for name in all_cleaner_names() {
                println!("{name}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Inspect { paths } => inspect(settings, &paths),
        Command::Scan { run } => execute(settings, &run, RunKind::Scan),
        Command::Clean {
            confirm,
            backup,
            backup_max_size,
            run,
        } => {
            if !confirm {
                output::print_no_confirm_warning();
                settings.dry_run = true;
            }
            if backup {
                settings.backup.enabled = true;
            }
            if let Some(limit) = backup_max_size {
                settings.backup.max_file_bytes = limit;
            }
            execute(settings, &run, RunKind::Cleanup)
        }
    }
}

fn inspect(settings: Settings, paths: &[PathBuf]) -> Result<ExitCode> {
    let orchestrator = CleanupOrchestrator::new(settings).context("invalid settings")?;
    let (verdicts, summary) = orchestrator.assess(paths);
    for (path, verdict) in &verdicts {
        output::print_verdict(path, verdict);
    }
    output::print_security_summary(&summary);
    Ok(ExitCode::SUCCESS)
}

fn execute(mut settings: Settings, args: &RunArgs, kind: RunKind) -> Result<ExitCode> {
    args.apply(&mut settings);
    let category: Category = args
        .category
        .parse()
        .with_context(|| format!("try one of: all, {}", all_cleaner_names().join(", ")))?;
    let deleting = kind == RunKind::Cleanup && !settings.dry_run;
    let dry_run = settings.dry_run;

    let ctx = RunContext::new(settings)
        .context("invalid settings")?
        .with_progress(Arc::new(output::BarProgress::new()));
    let orchestrator = CleanupOrchestrator::with_context(ctx);
    install_interrupt_handler(orchestrator.stop_flag());

    output::print_banner();
    let disk_root = reclaim::utils::home_dir().unwrap_or_else(|| PathBuf::from("/"));
    let before = disk_space(&disk_root);

    let summary = if category == Category::All {
        orchestrator.full_run(kind)
    } else {
        single_run(&orchestrator, category, kind, dry_run)
    };
    output::print_summary(&summary, deleting);

    if deleting {
        if let (Some(before), Some(after)) = (before, disk_space(&disk_root)) {
            output::print_disk_space(&disk_root, &before, &after);
        }
    } else if kind == RunKind::Cleanup {
        output::print_dry_run_footer();
    }

    Ok(if summary.total.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

fn single_run(
    orchestrator: &CleanupOrchestrator,
    category: Category,
    kind: RunKind,
    dry_run: bool,
) -> RunSummary {
    let started = std::time::Instant::now();
    let result = match kind {
        RunKind::Scan => orchestrator.scan(category),
        RunKind::Cleanup => orchestrator.clean(category),
    };
    let mut summary = RunSummary::new(kind, dry_run);
    summary.push(CategoryOutcome {
        category,
        result,
        elapsed: started.elapsed(),
    });
    summary.failures = orchestrator.failure_summary();
    summary.failure_total = orchestrator.failure_total();
    summary.stopped = orchestrator.stop_flag().is_set();
    if let Some(path) = &orchestrator.context().settings.report_path {
        if let Err(e) = summary.write_to(path) {
            log::error!("cannot write report {}: {e}", path.display());
        }
    }
    summary
}
