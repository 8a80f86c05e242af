//! agentry command implementations

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info};

use agentry_agent::RunResult;
use agentry_config::{self, Config};
use agentry_provider::{ModelRef, OpenAiProvider, Provider};

use crate::agents::{bank, city, weather};

/// Effective config: file, then environment, then `--model`
async fn load_config(model: Option<String>) -> Result<Config> {
    let mut config = Config::load()
        .await
        .with_context(|| format!("failed to load {}", agentry_config::config_path().display()))?;
    config.apply_env();
    if let Some(model) = model.filter(|m| !m.trim().is_empty()) {
        config.agent.model = model;
    }
    config.validate()?;
    Ok(config)
}

/// Model client for the configured `provider:model`
fn build_provider(config: &Config) -> Result<Arc<dyn Provider>> {
    let model_ref: ModelRef = config
        .agent
        .model
        .parse()
        .with_context(|| format!("invalid model identifier '{}'", config.agent.model))?;

    let section = config.provider(model_ref.provider.as_str());
    let api_key = section.and_then(|p| p.api_key());
    let api_base = section.and_then(|p| p.api_base.clone());

    let provider = OpenAiProvider::for_model(&model_ref, api_key, api_base).with_context(|| {
        format!(
            "no API key for {}. Set it in {} or the environment",
            model_ref.provider,
            agentry_config::config_path().display()
        )
    })?;
    info!(model = %model_ref, api_base = provider.api_base(), "using model");
    Ok(Arc::new(provider))
}

fn print_usage(result: &RunResult) {
    println!(
        "Usage: {} request(s), {} prompt + {} completion = {} tokens",
        result.requests,
        result.usage.prompt_tokens,
        result.usage.completion_tokens,
        result.usage.total_tokens
    );
}

/// Initialize the config file
pub async fn init_command() -> Result<()> {
    println!("◆ Initializing agentry...");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = agentry_config::init().await?;

    println!("Config:  {}", agentry_config::config_path().display());
    println!("Model:   {}", config.default_model());
    println!("\n◆ agentry initialized");
    println!("\nNext steps:");
    println!("  1. Add an API key to the config, or put GROQ_API_KEY in");
    println!("     {}", agentry_config::env_file_path().display());
    println!("  2. Ask the bank agent: agentry bank -m \"What is my balance?\"");

    Ok(())
}

/// Show configuration status
pub async fn status_command(model: Option<String>) -> Result<()> {
    let config_path = agentry_config::config_path();
    let env_path = agentry_config::env_file_path();

    println!("◆ agentry Status");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let mark = |ok: bool, yes: &'static str, no: &'static str| if ok { yes } else { no };

    println!(
        "Config:    {} {}",
        config_path.display(),
        mark(config_path.exists(), "[OK]", "[Missing]")
    );
    println!(
        "Env file:  {} {}",
        env_path.display(),
        mark(env_path.exists(), "[OK]", "[Missing]")
    );

    let config = load_config(model).await?;
    println!("Model:     {}", config.default_model());
    for name in ["openai", "groq", "openrouter", "ollama"] {
        let set = config.configured_providers().contains(&name);
        println!("  {:<11} {}", name, mark(set, "[Set]", "[Missing]"));
    }
    println!(
        "Weather:   {}",
        mark(config.tools.weather_api_key().is_some(), "[Set]", "[Missing]")
    );
    println!(
        "Geocode:   {}",
        mark(config.tools.geo_api_key().is_some(), "[Set]", "[Missing]")
    );
    println!(
        "Retries:   {} (tool rounds {}, tool timeout {}s)",
        config.agent.max_retries, config.agent.max_tool_rounds, config.agent.tool_timeout_secs
    );

    println!("\n◆ Ready");

    Ok(())
}

/// Ask the bank support agent
pub async fn bank_command(model: Option<String>, customer: u32, message: Option<String>) -> Result<()> {
    let config = load_config(model).await?;
    let agent = bank::support_agent(build_provider(&config)?, &config)?;

    let queries = match message {
        Some(message) => vec![message],
        None => bank::DEMO_QUERIES.iter().map(|q| q.to_string()).collect(),
    };

    for query in queries {
        debug!(customer, query = %query, "running bank agent");
        let deps = bank::SupportDependencies::new(customer);
        let result = agent
            .run(query.as_str(), deps)
            .await
            .with_context(|| format!("bank agent failed on '{}'", query))?;
        let advice: bank::SupportResult = result
            .output_as()
            .context("bank agent returned an unexpected shape")?;

        println!("◆ {}", query);
        println!("{}", advice);
        print_usage(&result);
        println!();
    }

    Ok(())
}

/// Ask the weather agent
pub async fn weather_command(model: Option<String>, message: Option<String>) -> Result<()> {
    let config = load_config(model).await?;
    let agent = weather::weather_agent(build_provider(&config)?, &config)?;

    let deps = weather::WeatherDeps::new(
        reqwest::Client::new(),
        config.tools.weather_api_key(),
        config.tools.geo_api_key(),
    );
    let query = message.unwrap_or_else(|| weather::DEMO_QUERY.to_string());

    let result = agent.run(query, deps).await.context("weather agent failed")?;

    println!("Response: {}", result.output_text().unwrap_or_default());
    print_usage(&result);
    Ok(())
}

/// Extract structured facts about a city
pub async fn city_command(model: Option<String>, message: Option<String>) -> Result<()> {
    let config = load_config(model).await?;
    println!("Using model: {}", config.default_model());
    let agent = city::city_agent(build_provider(&config)?, &config)?;

    let query = message.unwrap_or_else(|| city::DEMO_QUERY.to_string());
    let result = agent.run(query, ()).await.context("city agent failed")?;
    let facts: city::CityFacts = result
        .output_as()
        .context("city agent returned an unexpected shape")?;

    println!("{}", facts);
    print_usage(&result);
    Ok(())
}
