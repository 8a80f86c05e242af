//! Weather agent: geocoding via geocode.maps.co, conditions via tomorrow.io

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::{debug, warn};

use agentry_agent::{Agent, ArgSchema, FieldSpec, RunContext, ToolArgs, ToolOutcome, ToolTrait};
use agentry_config::Config;
use agentry_provider::Provider;

pub const DEMO_QUERY: &str = "What is the weather like in Delhi?";

pub const GEOCODE_URL: &str = "https://geocode.maps.co/search";
pub const WEATHER_URL: &str = "https://api.tomorrow.io/v4/weather/realtime";

const SYSTEM_PROMPT: &str = "Be concise, reply with one sentence. Use the `get_lat_lng` tool to \
get the latitude and longitude of a location, then use the `get_weather` tool to get the weather.";

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client and keys shared by the weather tools
pub struct WeatherDeps {
    pub client: reqwest::Client,
    pub weather_api_key: Option<String>,
    pub geo_api_key: Option<String>,
    pub geocode_url: String,
    pub weather_url: String,
}

impl WeatherDeps {
    pub fn new(
        client: reqwest::Client,
        weather_api_key: Option<String>,
        geo_api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            weather_api_key,
            geo_api_key,
            geocode_url: GEOCODE_URL.to_string(),
            weather_url: WEATHER_URL.to_string(),
        }
    }

    /// Point the tools at other endpoints
    pub fn with_endpoints(
        mut self,
        geocode_url: impl Into<String>,
        weather_url: impl Into<String>,
    ) -> Self {
        self.geocode_url = geocode_url.into();
        self.weather_url = weather_url.into();
        self
    }
}

/// Description for a tomorrow.io weather code
pub fn describe_weather_code(code: i64) -> &'static str {
    match code {
        1000 => "Clear, Sunny",
        1100 => "Mostly Clear",
        1101 => "Partly Cloudy",
        1102 => "Mostly Cloudy",
        1001 => "Cloudy",
        2000 => "Fog",
        2100 => "Light Fog",
        4000 => "Drizzle",
        4001 => "Rain",
        4200 => "Light Rain",
        4201 => "Heavy Rain",
        5000 => "Snow",
        5001 => "Flurries",
        5100 => "Light Snow",
        5101 => "Heavy Snow",
        6000 => "Freezing Drizzle",
        6001 => "Freezing Rain",
        6200 => "Light Freezing Rain",
        6201 => "Heavy Freezing Rain",
        7000 => "Ice Pellets",
        7101 => "Heavy Ice Pellets",
        7102 => "Light Ice Pellets",
        8000 => "Thunderstorm",
        _ => "Unknown",
    }
}

/// GET and decode JSON. Timeouts, connection failures, 429 and 5xx come
/// back as [`ToolOutcome::Transient`]; everything else is a tool error.
async fn fetch_json(request: reqwest::RequestBuilder, api: &str) -> Result<Value, ToolOutcome> {
    let response = request.timeout(HTTP_TIMEOUT).send().await.map_err(|e| {
        let msg = format!("{} request failed: {}", api, e);
        if e.is_timeout() || e.is_connect() {
            ToolOutcome::Transient(msg)
        } else {
            ToolOutcome::Error(msg)
        }
    })?;

    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return Err(ToolOutcome::Transient(format!("{} API returned {}", api, status)));
    }
    if !status.is_success() {
        return Err(ToolOutcome::Error(format!("{} API returned {}", api, status)));
    }

    response
        .json()
        .await
        .map_err(|e| ToolOutcome::Error(format!("{} API returned invalid JSON: {}", api, e)))
}

/// geocode.maps.co reports coordinates as strings
fn coordinate(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub struct GetLatLngTool {
    parameters: ArgSchema,
}

impl GetLatLngTool {
    pub fn new() -> Self {
        Self {
            parameters: ArgSchema::from_fields(vec![FieldSpec::string("location_description")
                .describe("A description of a location")]),
        }
    }
}

impl Default for GetLatLngTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolTrait<WeatherDeps> for GetLatLngTool {
    fn name(&self) -> &str {
        "get_lat_lng"
    }

    fn description(&self) -> &str {
        "Get latitude and longitude from a location description."
    }

    fn parameters(&self) -> &ArgSchema {
        &self.parameters
    }

    async fn execute(&self, ctx: &RunContext<WeatherDeps>, args: ToolArgs) -> ToolOutcome {
        let deps = ctx.deps();
        let Some(api_key) = deps.geo_api_key.as_deref() else {
            return ToolOutcome::Error("Geo API key is required".to_string());
        };
        let location = args.str_or("location_description", "");
        debug!(location, "calling geocode API");

        let request = deps
            .client
            .get(&deps.geocode_url)
            .query(&[("q", location), ("api_key", api_key)]);
        let data = match fetch_json(request, "geocode").await {
            Ok(data) => data,
            Err(outcome) => return outcome,
        };

        let place = data.as_array().and_then(|places| places.first());
        let coordinates = place.map(|p| {
            (
                p.get("lat").and_then(coordinate),
                p.get("lon").and_then(coordinate),
            )
        });
        match coordinates {
            Some((Some(lat), Some(lng))) => ToolOutcome::Ok(json!({"lat": lat, "lng": lng})),
            Some(_) => {
                ToolOutcome::Error("geocode API returned a place without coordinates".to_string())
            }
            None => {
                warn!(location, "no geocoding match");
                ToolOutcome::Retry("Could not find the location".to_string())
            }
        }
    }
}

pub struct GetWeatherTool {
    parameters: ArgSchema,
}

impl GetWeatherTool {
    pub fn new() -> Self {
        Self {
            parameters: ArgSchema::from_fields(vec![
                FieldSpec::number("lat").describe("Latitude of the location"),
                FieldSpec::number("lng").describe("Longitude of the location"),
            ]),
        }
    }
}

impl Default for GetWeatherTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolTrait<WeatherDeps> for GetWeatherTool {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Get weather data from a latitude and longitude."
    }

    fn parameters(&self) -> &ArgSchema {
        &self.parameters
    }

    async fn execute(&self, ctx: &RunContext<WeatherDeps>, args: ToolArgs) -> ToolOutcome {
        let deps = ctx.deps();
        let Some(api_key) = deps.weather_api_key.as_deref() else {
            return ToolOutcome::Error("Weather API key is required".to_string());
        };
        let (lat, lng) = (args.f64("lat").unwrap_or_default(), args.f64("lng").unwrap_or_default());
        let location = format!("{},{}", lat, lng);
        debug!(%location, "calling weather API");

        let request = deps.client.get(&deps.weather_url).query(&[
            ("apikey", api_key),
            ("location", location.as_str()),
            ("units", "metric"),
        ]);
        let data = match fetch_json(request, "weather").await {
            Ok(data) => data,
            Err(outcome) => return outcome,
        };

        let values = &data["data"]["values"];
        let Some(temperature) = values["temperatureApparent"].as_f64() else {
            return ToolOutcome::Error("weather API response has no temperature".to_string());
        };
        let code = values["weatherCode"].as_i64().unwrap_or_default();

        ToolOutcome::Ok(json!({
            "temperature": format!("{:.0}°C", temperature),
            "description": describe_weather_code(code),
        }))
    }
}

/// Text-mode agent answering weather questions
pub fn weather_agent(
    provider: Arc<dyn Provider>,
    config: &Config,
) -> agentry_agent::Result<Agent<WeatherDeps>> {
    super::configured(provider, config)
        .system_prompt(SYSTEM_PROMPT)
        .tool(GetLatLngTool::new())
        .tool(GetWeatherTool::new())
        .build()
}
