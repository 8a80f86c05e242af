//! Demo agents hosted by the CLI

pub mod bank;
pub mod city;
pub mod weather;

use std::sync::Arc;

use agentry_agent::AgentBuilder;
use agentry_config::Config;
use agentry_provider::Provider;

/// Builder preloaded with the configured limits
pub fn configured<D: Send + Sync + 'static>(
    provider: Arc<dyn Provider>,
    config: &Config,
) -> AgentBuilder<D> {
    AgentBuilder::new(provider)
        .defaults(&config.agent)
        .transport(&config.transport)
}
