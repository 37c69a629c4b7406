//! `run` and `config` subcommands

use crate::cli::{ConfigArgs, RunArgs};
use anyhow::{Context, Result, bail};
use conclave_application::{
    AgentHandle, AgentRuntime, AgentServices, AgentSnapshot, AgentSpec, Collaborators, LlmGateway,
};
use conclave_domain::{AgentId, ModelId};
use conclave_infrastructure::{
    ConfigIssue, ConfigLoader, FileConfig, GatewayReflector, HashingEmbedder, JsonFileStateStore,
    JsonlBroadcaster, JsonlCostLedger, LocalShellExecutor, ScriptedGateway,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Load and validate configuration. Warnings are logged; errors abort.
fn load_config(path: Option<PathBuf>) -> Result<FileConfig> {
    let config = ConfigLoader::new(path)
        .load()
        .map_err(|e| anyhow::anyhow!("{}", e))
        .context("Failed to load configuration")?;
    let issues = config.validate();
    for issue in issues.iter().filter(|i| !i.is_error()) {
        warn!("{}", issue.message);
    }
    let errors: Vec<&ConfigIssue> = issues.iter().filter(|i| i.is_error()).collect();
    if !errors.is_empty() {
        let listed: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        bail!("Invalid configuration:\n  {}", listed.join("\n  "));
    }
    Ok(config)
}

fn collaborators(config: &FileConfig, script: &Path) -> Result<Collaborators> {
    let gateway: Arc<dyn LlmGateway> = Arc::new(
        ScriptedGateway::from_file(script).with_context(|| format!("Failed to load script {}", script.display()))?,
    );

    let mut shell = LocalShellExecutor::new();
    if let Some(dir) = &config.agent.working_dir {
        shell = shell.with_working_dir(dir);
    }

    let mut collaborators = Collaborators::new(gateway.clone(), Arc::new(HashingEmbedder::default()))
        .with_reflector(Arc::new(GatewayReflector::new(gateway)))
        .with_executor(Arc::new(shell));

    if let Some(dir) = &config.agent.state_dir {
        collaborators = collaborators.with_store(Arc::new(JsonFileStateStore::new(dir)));
    }
    if let Some(path) = &config.agent.cost_ledger {
        let ledger = Arc::new(JsonlCostLedger::new(path));
        collaborators = collaborators.with_costs(ledger.clone(), Some(ledger));
    }
    if let Some(path) = &config.agent.event_log {
        match JsonlBroadcaster::new(path) {
            Some(broadcaster) => collaborators = collaborators.with_broadcaster(Arc::new(broadcaster)),
            None => warn!("Event log disabled"),
        }
    }
    Ok(collaborators)
}

/// Poll until the agent has run at least one cycle and has nothing in
/// flight. An armed wait timer counts as settled.
async fn wait_until_settled(handle: &AgentHandle) -> Result<AgentSnapshot> {
    loop {
        tokio::time::sleep(POLL_INTERVAL).await;
        let snapshot = handle.snapshot().await?;
        if snapshot.cycles > 0 && snapshot.is_idle() {
            return Ok(snapshot);
        }
    }
}

pub async fn run(args: RunArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;

    let models: Vec<ModelId> = if args.model.is_empty() {
        config.agent.parse_models().0
    } else {
        args.model.iter().map(|m| ModelId::from(m.as_str())).collect()
    };
    if models.is_empty() {
        bail!("No models given. Use --model or set [agent].models in the config file.");
    }

    let services = AgentServices::new(config.to_runtime_config(), collaborators(&config, &args.script)?)
        .context("Failed to initialise agent services")?;
    let runtime = AgentRuntime::new(services);

    let mut spec = AgentSpec::new(args.message.clone(), models)
        .with_budget(config.agent.parse_budget().0)
        .with_capabilities(config.agent.parse_capabilities().0)
        .with_message(args.message.clone());
    if let Some(id) = &args.agent_id {
        spec = spec.with_id(AgentId::from(id.as_str()));
    }

    let handle = runtime.spawn(spec)?;
    info!(agent_id = %handle.id(), "Agent started");

    let settled = tokio::time::timeout(Duration::from_secs(args.timeout), wait_until_settled(&handle)).await;

    let result = match settled {
        Ok(Ok(snapshot)) => {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            Ok(())
        }
        Ok(Err(e)) => Err(e.context("Agent stopped unexpectedly")),
        Err(_) => {
            let snapshot = handle.snapshot().await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            Err(anyhow::anyhow!("Agent did not settle within {}s", args.timeout))
        }
    };

    runtime.shutdown_all().await;
    result
}

pub fn show_config(args: ConfigArgs, config_path: Option<PathBuf>) -> Result<()> {
    let loader = ConfigLoader::new(config_path);

    if args.show_sources {
        println!("Configuration sources (in priority order):");
        println!("  [     ] Env:      CONCLAVE_* variables");
        for source in loader.sources().iter().rev() {
            let mark = if source.found { "FOUND" } else { "     " };
            println!("  [{}] {:<9} {}", mark, format!("{}:", source.label), source.path.display());
        }
        println!("  [     ] Default:  built-in defaults");
        println!();
    }

    let config = loader
        .load()
        .map_err(|e| anyhow::anyhow!("{}", e))
        .context("Failed to load configuration")?;
    println!("{}", toml::to_string_pretty(&config)?);

    let issues = config.validate();
    for issue in &issues {
        eprintln!("{}", issue);
    }
    let errors = issues.iter().filter(|i| i.is_error()).count();
    if errors > 0 {
        bail!("Configuration has {} error(s)", errors);
    }
    Ok(())
}
