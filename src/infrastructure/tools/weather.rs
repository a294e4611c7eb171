use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{instrument, warn};

use crate::domain::{ports::Tool, ToolOutcome, ToolSpec, TurnContext};
use crate::infrastructure::config::WeatherConfig;

const MAX_FORECAST_DAYS: i64 = 7;

fn default_forecast_days() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
pub struct WeatherQueryArgs {
    pub location: String,
    #[serde(default)]
    pub current: Option<Vec<String>>,
    #[serde(default)]
    pub hourly: Option<Vec<String>>,
    #[serde(default)]
    pub daily: Option<Vec<String>>,
    #[serde(default = "default_forecast_days")]
    pub forecast_days: i64,
}

impl WeatherQueryArgs {
    /// Open-Meteo accepts 1 to 7 days on the free tier.
    pub fn forecast_days(&self) -> i64 {
        self.forecast_days.clamp(1, MAX_FORECAST_DAYS)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeoLocation {
    #[serde(default)]
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub timezone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodingResponse {
    #[serde(default)]
    results: Option<Vec<GeoLocation>>,
}

/// Geocoding plus forecast lookups against the Open-Meteo APIs.
#[derive(Clone)]
pub struct OpenMeteoClient {
    http: reqwest::Client,
    geocoding_url: String,
    forecast_url: String,
    geocoding_timeout: Duration,
    forecast_timeout: Duration,
}

impl OpenMeteoClient {
    pub fn new(geocoding_url: impl Into<String>, forecast_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            geocoding_url: geocoding_url.into(),
            forecast_url: forecast_url.into(),
            geocoding_timeout: Duration::from_secs(5),
            forecast_timeout: Duration::from_secs(10),
        }
    }

    pub fn from_config(config: &WeatherConfig) -> Self {
        Self::new(&config.geocoding_url, &config.forecast_url).with_timeouts(
            Duration::from_secs(config.geocoding_timeout_seconds),
            Duration::from_secs(config.forecast_timeout_seconds),
        )
    }

    pub fn with_timeouts(mut self, geocoding: Duration, forecast: Duration) -> Self {
        self.geocoding_timeout = geocoding;
        self.forecast_timeout = forecast;
        self
    }

    /// Best match for a place name, `None` when the name is unknown.
    pub async fn geocode(&self, location: &str) -> Result<Option<GeoLocation>, reqwest::Error> {
        let response: GeocodingResponse = self
            .http
            .get(&self.geocoding_url)
            .query(&[("name", location), ("count", "1")])
            .timeout(self.geocoding_timeout)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.results.unwrap_or_default().into_iter().next())
    }

    pub async fn forecast(&self, place: &GeoLocation, args: &WeatherQueryArgs) -> Result<Value, reqwest::Error> {
        let mut params = vec![
            ("latitude", place.latitude.to_string()),
            ("longitude", place.longitude.to_string()),
            ("timezone", place.timezone.clone().unwrap_or_else(|| "auto".to_string())),
            ("forecast_days", args.forecast_days().to_string()),
        ];
        for (key, variables) in [
            ("current", &args.current),
            ("hourly", &args.hourly),
            ("daily", &args.daily),
        ] {
            if let Some(variables) = variables.as_ref().filter(|v| !v.is_empty()) {
                params.push((key, variables.join(",")));
            }
        }

        self.http
            .get(&self.forecast_url)
            .query(&params)
            .timeout(self.forecast_timeout)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

/// Weather lookup for a named place.
pub struct WeatherTool {
    client: OpenMeteoClient,
}

impl WeatherTool {
    pub fn new(client: OpenMeteoClient) -> Self {
        Self { client }
    }
}

impl Tool for WeatherTool {
    const NAME: &'static str = "query_weather";

    type Args = WeatherQueryArgs;

    fn definition(&self) -> ToolSpec {
        let variables = |description: &str| {
            json!({
                "type": "array",
                "items": { "type": "string" },
                "description": description
            })
        };

        ToolSpec {
            name: Self::NAME.to_string(),
            description: "Look up current conditions and the forecast for a place using Open-Meteo."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "location": {
                        "type": "string",
                        "description": "City or place name, e.g. Taipei"
                    },
                    "current": variables("Open-Meteo current variables, e.g. temperature_2m"),
                    "hourly": variables("Open-Meteo hourly variables, e.g. precipitation_probability"),
                    "daily": variables("Open-Meteo daily variables, e.g. temperature_2m_max"),
                    "forecast_days": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": MAX_FORECAST_DAYS,
                        "description": "Number of forecast days"
                    }
                },
                "required": ["location"]
            }),
        }
    }

    #[instrument(skip_all, fields(location = %args.location))]
    async fn call(&self, _ctx: &TurnContext, args: WeatherQueryArgs) -> ToolOutcome {
        let place = match self.client.geocode(&args.location).await {
            Ok(Some(place)) => place,
            Ok(None) => return ToolOutcome::failure(format!("location not found: {}", args.location)),
            Err(e) => {
                warn!(error = %e, "geocoding failed");
                return ToolOutcome::failure(format!("geocoding request failed: {e}"));
            }
        };

        match self.client.forecast(&place, &args).await {
            Ok(payload) => ToolOutcome::success(payload.to_string()),
            Err(e) => {
                warn!(error = %e, place = %place.name, "forecast failed");
                ToolOutcome::failure(format!("weather API call failed: {e}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ports::DynTool, ThreadId};
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use std::collections::HashMap;

    /// Local stand-in for the geocoding and forecast endpoints. The forecast
    /// route echoes its query string back.
    async fn spawn_open_meteo() -> String {
        let app = Router::new()
            .route(
                "/v1/search",
                get(|Query(query): Query<HashMap<String, String>>| async move {
                    match query.get("name").map(String::as_str) {
                        Some("Taipei") => Json(json!({
                            "results": [{
                                "name": "Taipei",
                                "latitude": 25.05,
                                "longitude": 121.53,
                                "timezone": "Asia/Taipei"
                            }]
                        })),
                        _ => Json(json!({ "generationtime_ms": 0.2 })),
                    }
                }),
            )
            .route(
                "/v1/forecast",
                get(|Query(query): Query<HashMap<String, String>>| async move {
                    Json(json!({ "query": query }))
                }),
            )
            .route("/broken/forecast", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .route(
                "/slow/forecast",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    Json(json!({}))
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn ctx() -> TurnContext {
        TurnContext::new(ThreadId::from("t"), Vec::new())
    }

    fn tool(base: &str, forecast_path: &str) -> WeatherTool {
        WeatherTool::new(
            OpenMeteoClient::new(format!("{base}/v1/search"), format!("{base}{forecast_path}"))
                .with_timeouts(Duration::from_millis(500), Duration::from_millis(200)),
        )
    }

    #[tokio::test]
    async fn test_forecast_for_known_location() {
        let base = spawn_open_meteo().await;

        let outcome = tool(&base, "/v1/forecast")
            .call_json(
                &ctx(),
                json!({
                    "location": "Taipei",
                    "current": ["temperature_2m", "relative_humidity_2m"],
                    "forecast_days": 30
                }),
            )
            .await;

        let text = outcome.to_text();
        let payload: Value = serde_json::from_str(text.strip_prefix("Success: ").unwrap()).unwrap();
        assert_eq!(payload["query"]["latitude"], "25.05");
        assert_eq!(payload["query"]["timezone"], "Asia/Taipei");
        assert_eq!(payload["query"]["current"], "temperature_2m,relative_humidity_2m");
        assert_eq!(payload["query"]["forecast_days"], "7");
        assert!(payload["query"].get("hourly").is_none());
    }

    #[tokio::test]
    async fn test_unknown_location() {
        let base = spawn_open_meteo().await;

        let outcome = tool(&base, "/v1/forecast")
            .call_json(&ctx(), json!({ "location": "Atlantis" }))
            .await;

        assert_eq!(outcome.to_text(), "Fail: location not found: Atlantis");
    }

    #[tokio::test]
    async fn test_forecast_http_error() {
        let base = spawn_open_meteo().await;

        let outcome = tool(&base, "/broken/forecast")
            .call_json(&ctx(), json!({ "location": "Taipei" }))
            .await;

        assert!(outcome.to_text().starts_with("Fail: weather API call failed"));
    }

    #[tokio::test]
    async fn test_forecast_timeout() {
        let base = spawn_open_meteo().await;

        let outcome = tool(&base, "/slow/forecast")
            .call_json(&ctx(), json!({ "location": "Taipei" }))
            .await;

        assert!(outcome.to_text().starts_with("Fail: weather API call failed"));
    }

    #[tokio::test]
    async fn test_geocoding_unreachable() {
        let outcome = tool("http://127.0.0.1:9", "/v1/forecast")
            .call_json(&ctx(), json!({ "location": "Taipei" }))
            .await;

        assert!(outcome.to_text().starts_with("Fail: geocoding request failed"));
    }

    #[test]
    fn test_forecast_days_clamped() {
        let args: WeatherQueryArgs =
            serde_json::from_value(json!({ "location": "x", "forecast_days": 0 })).unwrap();
        assert_eq!(args.forecast_days(), 1);

        let args: WeatherQueryArgs =
            serde_json::from_value(json!({ "location": "x", "forecast_days": 12 })).unwrap();
        assert_eq!(args.forecast_days(), 7);

        let args: WeatherQueryArgs = serde_json::from_value(json!({ "location": "x" })).unwrap();
        assert_eq!(args.forecast_days(), 1);
    }
}
