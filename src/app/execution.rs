//! Subcommand execution

use std::path::Path;
use std::time::Duration;
use anyhow::{Context, Result};
use log::{error, info, warn};
use serde_json::json;
use modulebus::config::ConfigManager;
use modulebus::display::{self, ColourManager};
use modulebus::topology::Topology;
use modulebus::{BusError, EventBus};
use crate::cli::{Args, Command};

pub async fn run_command(args: &Args, config: &ConfigManager, colours: &ColourManager) -> Result<()> {
    match &args.command {
        Command::Plan { topology, module } => plan(topology, module, args.json, colours),
        Command::Check { topology } => check(topology, args.json, colours),
        Command::Run { topology, modules, shutdown_timeout_ms, settle_timeout_ms } => {
            let options = RunOptions {
                modules: modules.clone(),
                shutdown_timeout_ms: *shutdown_timeout_ms,
                settle_timeout: Duration::from_millis(*settle_timeout_ms),
                json: args.json,
            };
            run(topology, options, config, colours).await
        }
    }
}

fn plan(path: &Path, module: &str, json: bool, colours: &ColourManager) -> Result<()> {
    let topology = Topology::load(path)?;
    let order = topology
        .activation_plan(module)
        .with_context(|| format!("Cannot plan activation of '{}'", module))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&json!({ "module": module, "plan": order }))?);
        return Ok(());
    }

    println!("{}", colours.highlight(&format!("Activation plan for '{}':", module)));
    for (step, id) in order.iter().enumerate() {
        println!("  {:>2}. {}", step + 1, id);
    }
    Ok(())
}

fn check(path: &Path, json: bool, colours: &ColourManager) -> Result<()> {
    let topology = Topology::load(path)?;
    let problems = topology.check();

    if json {
        let report: Vec<_> = problems
            .iter()
            .map(|problem| json!({ "kind": problem.as_label(), "message": problem.to_string() }))
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "valid": problems.is_empty(), "problems": report }))?
        );
    } else if problems.is_empty() {
        println!(
            "{} {} module(s), {} handler(s), {} seed event(s)",
            colours.success("OK"),
            topology.modules.len(),
            topology.handler_specs().len(),
            topology.events.len()
        );
    } else {
        println!("{}", colours.error(&format!("{} problem(s) found:", problems.len())));
        for problem in &problems {
            println!("  {} {}", colours.warning(problem.as_label()), problem);
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(anyhow::anyhow!("Topology check failed with {} problem(s)", problems.len()))
    }
}

struct RunOptions {
    modules: Vec<String>,
    shutdown_timeout_ms: Option<u64>,
    settle_timeout: Duration,
    json: bool,
}

async fn run(path: &Path, options: RunOptions, config: &ConfigManager, colours: &ColourManager) -> Result<()> {
    let topology = Topology::load(path)?;

    let mut bus_config = config.get_bus_config()?;
    if let Some(timeout) = options.shutdown_timeout_ms {
        bus_config.shutdown_timeout_ms = timeout;
    }
    let bus = EventBus::try_new(bus_config).context("Invalid bus configuration")?;

    topology.install(&bus).await.context("Failed to install topology")?;
    let monitor = bus.start_configured_health_monitor();

    let targets = if options.modules.is_empty() {
        topology.module_ids()
    } else {
        options.modules.clone()
    };

    let mut failures: Vec<BusError> = Vec::new();
    for id in &targets {
        if let Err(activation_error) = bus.activate_module(id).await {
            error!("Could not activate '{}': {}", id, activation_error);
            failures.push(activation_error);
        }
    }
    info!("{} of {} module(s) active", bus.active_modules().len(), topology.modules.len());

    let emitted = topology.emit_seed_events(&bus).await?;
    if let Err(settle_error) = bus.wait_for_quiescence(options.settle_timeout).await {
        warn!("Cascades still running: {}", settle_error);
    }

    let health = bus.module_health().await;
    let metrics = bus.metrics();
    let modules = bus.modules();

    if let Some(monitor) = monitor {
        monitor.join().await;
    }
    let shutdown = bus.shutdown().await;

    if options.json {
        let failures: Vec<_> = failures
            .iter()
            .map(|failure| json!({ "kind": failure.as_label(), "message": failure.to_string() }))
            .collect();
        let report = json!({
            "seed_events": emitted,
            "activation_failures": failures,
            "modules": modules,
            "health": health,
            "metrics": metrics,
            "shutdown": shutdown.as_ref().map(|_| "completed").unwrap_or("timed out"),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", colours.highlight("Modules"));
        print!("{}", display::modules_table(&modules));
        println!();
        println!("{}", colours.highlight("Health"));
        if health.is_empty() {
            println!("  {}", colours.dimmed("no modules in health scope"));
        } else {
            print!("{}", display::health_table(&health));
            for (id, module_health) in &health {
                if !module_health.status.is_healthy() {
                    println!("  {} {}", colours.status(module_health.status), id);
                }
            }
        }
        println!();
        println!("{}", colours.highlight(&format!("Metrics ({} seed event(s))", emitted)));
        print!("{}", display::metrics_table(&metrics));
        for failure in &failures {
            println!("{} {}", colours.error("activation failed:"), failure);
        }
    }

    shutdown.context("Graceful shutdown did not complete")?;
    if failures.is_empty() {
        Ok(())
    } else {
        Err(anyhow::anyhow!("{} module(s) failed to activate", failures.len()))
    }
}
