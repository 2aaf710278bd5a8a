//! autoheal - Main CLI Entry Point

use anyhow::{Context, Result};
use autoheal::{
    agent::{CycleOrchestrator, CycleReport, StopReason},
    cli::{Args, Commands, Verbosity},
    config::Config,
    faults::FaultKind,
    health::{HealthAnalyzer, HealthStatus, ServiceStatus},
    telemetry::{init_tracing, TelemetryCollector, TelemetryDisplay},
};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbosity());

    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    match &args.command {
        Commands::RunOnce => run_once(&args, &config).await?,
        Commands::Run { .. } => {
            run_continuous(&args, &config, config.orchestrator.max_cycles).await?;
        }
        Commands::Forever { .. } => run_continuous(&args, &config, None).await?,
        Commands::Inject { kind } => inject(&args, &config, *kind).await?,
        Commands::Health => show_health(&config)?,
        Commands::Config => show_config(&args, &config)?,
    }

    Ok(())
}

fn build(config: &Config, telemetry: &TelemetryCollector) -> Result<CycleOrchestrator> {
    config
        .orchestrator(telemetry.clone())
        .context("Failed to initialise orchestrator")
}

async fn run_once(args: &Args, config: &Config) -> Result<()> {
    let telemetry = TelemetryCollector::new();
    let orchestrator = build(config, &telemetry)?;

    let report = tokio::select! {
        report = orchestrator.run_one_cycle() => report?,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("{}", "Interrupted, faults released".yellow());
            return Ok(());
        }
    };

    print_report(&report, args.verbosity());
    TelemetryDisplay::new(telemetry).display_summary(&orchestrator.stats());
    Ok(())
}

async fn run_continuous(args: &Args, config: &Config, max_cycles: Option<u64>) -> Result<()> {
    let telemetry = TelemetryCollector::new();
    let orchestrator = build(config, &telemetry)?;
    let interval = config.orchestrator.interval();

    if args.verbosity().show_progress() {
        println!("{}", "Starting continuous autonomous operation".bold());
        println!("  Cycle interval: {}s", interval.as_secs());
        match max_cycles {
            Some(max) => println!("  Max cycles:     {}", max),
            None => println!("  Max cycles:     unlimited"),
        }
        println!("  Press Ctrl+C to stop\n");
    }

    let (stats, reason) = orchestrator.run_cycles(interval, max_cycles).await?;
    if reason == StopReason::Interrupted {
        println!("\n{}", "Stopped by user".yellow().bold());
    }
    TelemetryDisplay::new(telemetry).display_summary(&stats);
    Ok(())
}

async fn inject(args: &Args, config: &Config, kind: Option<FaultKind>) -> Result<()> {
    let telemetry = TelemetryCollector::new();
    let orchestrator = Arc::new(build(config, &telemetry)?);
    let status = orchestrator.status();

    let mut handle = orchestrator.trigger(kind)?;

    let spinner = if args.verbosity().show_progress() {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    } else {
        None
    };

    let joined = loop {
        tokio::select! {
            joined = &mut handle => break joined,
            _ = tokio::time::sleep(Duration::from_millis(200)) => {
                if let Some(pb) = &spinner {
                    let s = status.snapshot();
                    pb.set_message(format!("Cycle #{} · {} · {}", s.cycle, s.phase.display_name(), s.operation));
                }
            }
            _ = tokio::signal::ctrl_c() => {
                handle.abort();
                let _ = (&mut handle).await;
                if let Some(pb) = &spinner {
                    pb.finish_and_clear();
                }
                eprintln!("{}", "Interrupted, faults released".yellow());
                return Ok(());
            }
        }
    };
    if let Some(pb) = &spinner {
        pb.finish_and_clear();
    }

    let report = joined.context("Manual cycle task failed")??;
    print_report(&report, args.verbosity());
    TelemetryDisplay::new(telemetry).display_summary(&orchestrator.stats());
    Ok(())
}

fn show_health(config: &Config) -> Result<()> {
    let stores = config.stores().context("Failed to open stores")?;
    let analyzer = HealthAnalyzer::new(config.health.clone());
    let (report, services) = analyzer.assess(stores.events.as_ref());

    let status = match report.status {
        HealthStatus::Healthy => report.status.as_str().green(),
        HealthStatus::Warning => report.status.as_str().yellow(),
        HealthStatus::Degraded => report.status.as_str().bright_red(),
        HealthStatus::Critical => report.status.as_str().red().bold(),
    };
    println!("\n{}", "System Health".bold());
    println!("─────────────────────────────────────");
    println!("Status:    {}", status);
    println!("Errors:    {}", report.error_count);
    println!("Warnings:  {}", report.warning_count);
    println!("CPU:       {:.1}%", report.cpu);
    println!("Memory:    {:.1}%", report.memory);
    println!("Window:    {} events", report.window);

    println!("\n{}", "Services".bold());
    for (service, state) in &services {
        let label = match state {
            ServiceStatus::Up => state.to_string().green(),
            ServiceStatus::Degraded => state.to_string().yellow(),
            ServiceStatus::Down => state.to_string().red().bold(),
        };
        println!("  {:<16} {}", service, label);
    }
    println!();
    Ok(())
}

fn show_config(args: &Args, config: &Config) -> Result<()> {
    println!("\n{}", "autoheal Configuration".bold());
    println!("─────────────────────────────────────");
    match (&args.config, Config::config_path()) {
        (Some(path), _) => println!("Source: {}", path.display()),
        (None, Some(path)) if path.exists() => println!("Source: {}", path.display()),
        _ => println!("Source: built-in defaults"),
    }
    println!("Data:   {}", config.data_dir().display());
    println!("Verbosity: {}\n", args.verbosity().as_str());

    let rendered = toml::to_string_pretty(config).context("Failed to render configuration")?;
    println!("{}", rendered);
    Ok(())
}

fn print_report(report: &CycleReport, verbosity: Verbosity) {
    if verbosity == Verbosity::Quiet {
        return;
    }

    println!("\n{}", format!("Cycle #{}", report.cycle).bold());
    match (&report.injected, &report.injection_error) {
        (Some(fault), _) => println!("  Fault:        {} ({})", fault.kind.to_string().magenta(), fault.id),
        (None, Some(reason)) => println!("  Fault:        {} {}", "injection failed:".red(), reason),
        (None, None) => println!("  Fault:        {}", "none".dimmed()),
    }
    if let Some(health) = &report.health_before {
        println!("  Health:       {} ({} errors)", health.status, health.error_count);
    }
    println!("  Incidents:    {}", report.incidents.len());
    for incident in &report.incidents {
        println!("    - {}", incident.label());
    }

    for remediation in &report.remediations {
        let verdict = if remediation.succeeded() {
            remediation.verification.recommendation.to_string().green()
        } else {
            remediation.verification.recommendation.to_string().red()
        };
        println!("  Remediation:  {} {}", verdict, remediation.verification.message);
        if verbosity.show_events() {
            for step in &remediation.step_results {
                let mark = if step.success { "✓".green() } else { "✗".red() };
                println!("    {} Step {}: {}", mark, step.index, step.action);
            }
        }
    }
    if let Some(health) = &report.health_after {
        println!("  After:        {}", health.status);
    }
    if !report.cleanup.is_clean() {
        for failure in &report.cleanup.failures {
            println!("  {} {}", "Cleanup failed:".red(), failure);
        }
    }
    println!("  Duration:     {}ms", report.duration_ms);
}
