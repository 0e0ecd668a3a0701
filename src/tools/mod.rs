pub mod weather;

use async_trait::async_trait;
use serde_json::json;

use crate::config::ToolsConfig;
use crate::llm::models::ToolDefinition;

#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    /// Runs the tool with JSON-encoded `arguments`. Failures are reported
    /// inside the returned value so the model can see them.
    async fn call(&self, arguments: &serde_json::Value) -> serde_json::Value;
}

pub struct ToolRegistry {
    pub tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new(config: &ToolsConfig) -> Self {
        Self::with_tools(vec![Box::new(weather::WeatherTool::new(
            config.weather_api_base.clone(),
        ))])
    }

    pub fn with_tools(tools: Vec<Box<dyn Tool>>) -> Self {
        Self { tools }
    }

    /// Definitions of the tools named in `active`, in registry order.
    pub fn definitions(&self, active: &[String]) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| t.definition())
            .filter(|d| active.iter().any(|name| *name == d.function.name))
            .collect()
    }

    pub async fn call_tool(
        &self,
        name: &str,
        active: &[String],
        arguments: &serde_json::Value,
    ) -> serde_json::Value {
        if !active.iter().any(|a| a == name) {
            return json!({ "error": format!("Tool '{}' is not available", name) });
        }
        for tool in &self.tools {
            if tool.definition().function.name == name {
                return tool.call(arguments).await;
            }
        }
        json!({ "error": format!("Tool '{}' not found", name) })
    }
}
