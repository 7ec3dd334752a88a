//! CLI interface for Rollout.
//!
//! Each subcommand is non-interactive: arguments in, structured output out.
//!
//! Commands split into two groups:
//!
//! - `rollout deploy|rollback|flow` — drive a version transition and exit
//!   non-zero unless the service came up healthy.
//! - `rollout serve|status|events` — run the webhook server, or inspect
//!   recorded state without touching anything.

mod format;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use jiff::Timestamp;
use uuid::Uuid;

use crate::config::Config;
use crate::deploy::Executor;
use crate::flow::Orchestrator;
use crate::model::{InitiatedBy, RollbackRequest, RollbackStatus};
use crate::probe::HttpProber;
use crate::rollback::Controller;
use crate::runtime::ComposeRuntime;
use crate::store::VersionStore;
use crate::webhook::{self, ServerState};

use format::{format_event, format_timeline};

/// Rollout — deploy, watch, roll back.
#[derive(Debug, Parser)]
#[command(name = "rollout")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Deploy a version to a service and wait for it to report healthy.
    ///
    /// Exits non-zero unless the deploy was confirmed healthy.
    Deploy {
        /// Service name from the catalog.
        service: String,

        /// Version to deploy. Must be listed for the service.
        version: String,
    },

    /// Roll a service back to its last-known-good version.
    Rollback {
        /// Service name from the catalog.
        service: String,

        /// Explicit target version. Defaults to the configured
        /// healthy version.
        #[arg(long = "to")]
        to: Option<String>,

        /// Idempotency key. Repeating one replays the recorded result
        /// instead of rolling back again.
        #[arg(long)]
        alert_id: Option<String>,

        /// Why this rollback is happening (recorded in the result).
        #[arg(long, default_value = "manual rollback")]
        reason: String,
    },

    /// Run the rollback webhook server.
    Serve {
        /// Bind address. Overrides `listen` from the config.
        #[arg(long)]
        listen: Option<String>,
    },

    /// Run the degrade-and-recover exercise against a live environment.
    ///
    /// Deploys the bad version, waits for the detector to flag it, rolls
    /// back, and confirms recovery. Exits non-zero unless the full cycle
    /// passed.
    Flow {
        /// Service name from the catalog.
        service: String,

        /// Known-bad version to deploy.
        bad_version: String,

        /// Monitoring rounds before giving up. Overrides the config.
        #[arg(long)]
        rounds: Option<u32>,
    },

    /// Show the recorded version of every configured service.
    Status,

    /// Show the deployment event log for a service.
    Events {
        /// Service name from the catalog.
        service: String,
    },
}

/// Run the CLI, returning an error message on failure.
pub fn run(config: &Config) -> Result<(), String> {
    let cli = Cli::parse();

    let store = Arc::new(
        VersionStore::new(config.state_dir()?)
            .map_err(|e| format!("failed to initialize version store: {e}"))?,
    );
    let runtime = ComposeRuntime::new(
        config.runtime.compose_file.clone(),
        config.runtime.env_file.clone(),
    );
    let probe = HttpProber::new(
        config.probe.request_timeout(),
        config.probe.overall_timeout(),
    )
    .map_err(|e| format!("failed to build prober: {e}"))?;
    let executor = Arc::new(Executor::new(
        config.services.clone(),
        store,
        Box::new(runtime),
        Box::new(probe),
        config.deploy.settings(),
    ));
    let controller = Arc::new(Controller::new(
        Arc::clone(&executor),
        config.webhook.cache_ttl(),
    ));

    match cli.command {
        Command::Deploy { service, version } => cmd_deploy(&executor, &service, &version),
        Command::Rollback {
            service,
            to,
            alert_id,
            reason,
        } => cmd_rollback(&controller, &service, to, alert_id, &reason),
        Command::Serve { listen } => {
            let listen = listen.unwrap_or_else(|| config.listen.clone());
            cmd_serve(controller, &listen, config)
        }
        Command::Flow {
            service,
            bad_version,
            rounds,
        } => cmd_flow(&executor, &controller, config, &service, &bad_version, rounds),
        Command::Status => cmd_status(&executor),
        Command::Events { service } => cmd_events(&executor, &service),
    }
}

fn cmd_deploy(executor: &Executor, service: &str, version: &str) -> Result<(), String> {
    let event = executor
        .deploy(service, version, InitiatedBy::Manual)
        .map_err(|e| format!("deploy failed: {e}"))?;

    println!("{}", format_event(&event));
    if event.outcome.is_success() {
        Ok(())
    } else {
        Err(format!("{service} did not come up healthy on {version}"))
    }
}

fn cmd_rollback(
    controller: &Controller,
    service: &str,
    to: Option<String>,
    alert_id: Option<String>,
    reason: &str,
) -> Result<(), String> {
    let request = RollbackRequest {
        service: service.to_string(),
        target_version: to,
        alert_id: alert_id.unwrap_or_else(|| format!("manual-{}", Uuid::new_v4())),
        reason: reason.to_string(),
        triggered_at: Some(Timestamp::now()),
    };

    let result = controller.rollback(&request);
    let json = serde_json::to_string_pretty(&result)
        .map_err(|e| format!("failed to serialize result: {e}"))?;
    println!("{json}");

    match result.status {
        RollbackStatus::Completed => Ok(()),
        _ => Err(format!(
            "rollback {} did not complete: {}",
            result.rollback_id,
            result.error.unwrap_or_else(|| "see log".to_string())
        )),
    }
}

fn cmd_serve(controller: Arc<Controller>, listen: &str, config: &Config) -> Result<(), String> {
    let state = ServerState::new(controller, config.webhook.handler_sla());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("failed to start async runtime: {e}"))?;

    runtime.block_on(async {
        let listener = tokio::net::TcpListener::bind(listen)
            .await
            .map_err(|e| format!("failed to bind {listen}: {e}"))?;
        tracing::info!(listen, "rollback webhook listening");
        webhook::serve(listener, state)
            .await
            .map_err(|e| format!("server error: {e}"))
    })
}

fn cmd_flow(
    executor: &Executor,
    controller: &Controller,
    config: &Config,
    service: &str,
    bad_version: &str,
    rounds: Option<u32>,
) -> Result<(), String> {
    let mut settings = config.flow.settings();
    if let Some(rounds) = rounds {
        settings.max_rounds = rounds;
    }

    let orchestrator = Orchestrator::new(executor, controller, config.thresholds.clone(), settings);
    let report = orchestrator.run(service, bad_version);

    println!("{}", format_timeline(&report));
    if report.passed {
        Ok(())
    } else {
        Err("flow run failed".to_string())
    }
}

fn cmd_status(executor: &Executor) -> Result<(), String> {
    for spec in executor.catalog() {
        let record = executor
            .store()
            .get(&spec.name)
            .map_err(|e| format!("failed to read {}: {e}", spec.name))?;
        match record {
            Some(r) => println!("{}  {}  (updated {})", spec.name, r.version, r.updated_at),
            None => println!("{}  (not deployed)", spec.name),
        }
    }
    Ok(())
}

fn cmd_events(executor: &Executor, service: &str) -> Result<(), String> {
    if executor.service(service).is_none() {
        return Err(format!("unknown service: {service}"));
    }

    let events = executor
        .store()
        .load_events(service)
        .map_err(|e| format!("failed to load events for {service}: {e}"))?;

    if events.is_empty() {
        println!("No events for {service}");
        return Ok(());
    }
    for event in &events {
        println!("{}", format_event(event));
    }
    Ok(())
}
