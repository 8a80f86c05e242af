//! Structured city facts, no tools

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use agentry_agent::{Agent, FieldSpec, ResultSchema};
use agentry_config::Config;
use agentry_provider::Provider;

pub const DEMO_QUERY: &str = "The windy city in the US of A.";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CityFacts {
    pub city: String,
    pub state: String,
    pub country: String,
    pub population: String,
}

impl fmt::Display for CityFacts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "city={:?} state={:?} country={:?} population={:?}",
            self.city, self.state, self.country, self.population
        )
    }
}

pub fn result_schema() -> agentry_agent::Result<ResultSchema> {
    let schema = ResultSchema::builder("CityFacts")
        .field(FieldSpec::string("city"))
        .field(FieldSpec::string("state"))
        .field(FieldSpec::string("country"))
        .field(FieldSpec::string("population"))
        .build()?;
    Ok(schema)
}

pub fn city_agent(provider: Arc<dyn Provider>, config: &Config) -> agentry_agent::Result<Agent<()>> {
    super::configured(provider, config)
        .result_schema(result_schema()?)
        .build()
}
