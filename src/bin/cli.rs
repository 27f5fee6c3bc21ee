//! Mobile Pilot - AI-powered mobile device automation
//!
//! CLI entry point. Run with: cargo run --bin mobile-pilot -- "<goal>"

use std::env;
use std::sync::Arc;

use mobile_pilot::device::DEFAULT_DEVICE_BASE_URL;
use mobile_pilot::{
    AgentContext, AgentRunner, HttpDeviceBackend, InferenceGateway, KnowledgeBase, LlmConfig,
    RunnerConfig, Settings,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let goal = env::args().skip(1).collect::<Vec<_>>().join(" ");
    if goal.trim().is_empty() {
        eprintln!("Usage: mobile-pilot \"<goal>\"");
        eprintln!("Example: mobile-pilot \"open settings and enable dark mode\"");
        std::process::exit(2);
    }

    let settings = Settings::from_env();

    // Role config: optional JSON file, then env overrides, then fail-fast
    // credential validation.
    let llm_config = match env::var("LLM_CONFIG_PATH") {
        Ok(path) => LlmConfig::load(path)?,
        Err(_) => LlmConfig::default(),
    }
    .apply_env_overrides()?;
    llm_config.validate(&settings)?;

    let gateway = InferenceGateway::from_config(&llm_config, &settings)?;

    let device_url = settings
        .device_base_url
        .clone()
        .unwrap_or_else(|| DEFAULT_DEVICE_BASE_URL.to_string());
    let device = Arc::new(HttpDeviceBackend::new(device_url));

    let knowledge = settings
        .knowledge_base_path
        .as_deref()
        .map(KnowledgeBase::load)
        .unwrap_or_default();

    let max_cycles: u32 = env::var("MAX_CYCLES")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(25);
    let config = RunnerConfig::default().with_max_cycles(max_cycles);

    let ctx = AgentContext::new(gateway, device).with_knowledge(knowledge);
    let runner = AgentRunner::new(ctx, config);

    let report = runner.run(&goal).await?;
    println!("{}", report.summary());

    Ok(())
}
