use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::llm::models::{FunctionDefinition, ToolDefinition};
use crate::tools::Tool;

/// Current conditions and forecast from the Open-Meteo API.
pub struct WeatherTool {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct WeatherArguments {
    latitude: f64,
    longitude: f64,
}

impl WeatherTool {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    async fn fetch(&self, args: &WeatherArguments) -> Result<serde_json::Value, reqwest::Error> {
        self.client
            .get(format!("{}/v1/forecast", self.base_url))
            .query(&[
                ("latitude", args.latitude.to_string()),
                ("longitude", args.longitude.to_string()),
                ("current", "temperature_2m".to_string()),
                ("hourly", "temperature_2m".to_string()),
                ("daily", "sunrise,sunset".to_string()),
                ("timezone", "auto".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

#[async_trait]
impl Tool for WeatherTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            r#type: "function".to_string(),
            function: FunctionDefinition {
                name: "get_weather".to_string(),
                description: "Get the current weather at a location.".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "latitude": { "type": "number" },
                        "longitude": { "type": "number" }
                    },
                    "required": ["latitude", "longitude"]
                }),
            },
        }
    }

    async fn call(&self, arguments: &serde_json::Value) -> serde_json::Value {
        let args: WeatherArguments = match serde_json::from_value(arguments.clone()) {
            Ok(a) => a,
            Err(e) => return json!({ "error": format!("Error parsing arguments: {}", e) }),
        };

        info!("Fetching weather for {}, {}", args.latitude, args.longitude);
        match self.fetch(&args).await {
            Ok(forecast) => forecast,
            Err(e) => {
                error!("Weather lookup failed: {}", e);
                json!({ "error": format!("Weather lookup failed: {}", e) })
            }
        }
    }
}
