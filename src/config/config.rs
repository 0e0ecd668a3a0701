use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

/// A bearer key and the user it authenticates as.
#[derive(Debug, Deserialize, Clone)]
pub struct ApiKeyConfig {
    pub key: String,
    pub user_id: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub api_keys: Vec<ApiKeyConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OpenAiConfig {
    pub api_base: String,
    pub api_key: String,
    pub default_model: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnthropicConfig {
    pub api_base: String,
    pub api_key: String,
    pub default_model: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub default_model: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub provider: String,
    pub openai: Option<OpenAiConfig>,
    pub anthropic: Option<AnthropicConfig>,
    pub ollama: Option<OllamaConfig>,
}

/// Maps a client-facing model selector onto a provider model.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ChatModelConfig {
    pub id: String,
    pub model: String,
    #[serde(default)]
    pub reasoning: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_tools_prompt")]
    pub tools_prompt: String,
    #[serde(default = "default_models")]
    pub models: Vec<ChatModelConfig>,
    #[serde(default = "default_active_tools")]
    pub active_tools: Vec<String>,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: u64,
    #[serde(default = "default_smooth_delay_ms")]
    pub smooth_delay_ms: u64,
    #[serde(default)]
    pub title_model: Option<String>,
    #[serde(default = "default_stream_error_message")]
    pub stream_error_message: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            tools_prompt: default_tools_prompt(),
            models: default_models(),
            active_tools: default_active_tools(),
            max_steps: default_max_steps(),
            max_duration_secs: default_max_duration_secs(),
            smooth_delay_ms: default_smooth_delay_ms(),
            title_model: None,
            stream_error_message: default_stream_error_message(),
        }
    }
}

impl ChatConfig {
    pub fn resolve_model(&self, selector: &str) -> Option<&ChatModelConfig> {
        self.models.iter().find(|m| m.id == selector)
    }

    /// Reasoning models run without tools and without the tools prompt.
    pub fn system_prompt_for(&self, model: &ChatModelConfig) -> String {
        if model.reasoning {
            self.system_prompt.clone()
        } else {
            format!("{}\n\n{}", self.system_prompt, self.tools_prompt)
        }
    }

    pub fn active_tools_for(&self, model: &ChatModelConfig) -> Vec<String> {
        if model.reasoning {
            Vec::new()
        } else {
            self.active_tools.clone()
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ToolsConfig {
    #[serde(default = "default_weather_api_base")]
    pub weather_api_base: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            weather_api_base: default_weather_api_base(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

impl AppConfig {
    pub fn load(path: &str) -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();

        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("CHATWIRE").separator("__"))
            .build()?;

        let mut app_config: AppConfig = settings.try_deserialize()?;

        // Expand environment variables if present like ${OPENAI_API_KEY}
        app_config.server.host = expand_env(&app_config.server.host);
        app_config.database.path = expand_env(&app_config.database.path);

        for api_key in &mut app_config.auth.api_keys {
            api_key.key = expand_env(&api_key.key);
        }
        if let Some(ref mut openai) = app_config.llm.openai {
            openai.api_key = expand_env(&openai.api_key);
        }
        if let Some(ref mut anthropic) = app_config.llm.anthropic {
            anthropic.api_key = expand_env(&anthropic.api_key);
        }

        Ok(app_config)
    }
}

fn expand_env(val: &str) -> String {
    match val.strip_prefix("${").and_then(|v| v.strip_suffix('}')) {
        Some(var_name) => std::env::var(var_name).unwrap_or_default(),
        None => val.to_string(),
    }
}

fn default_system_prompt() -> String {
    "You are a friendly assistant! Keep your responses concise and helpful.".to_string()
}

fn default_tools_prompt() -> String {
    "When the user asks about current weather conditions, call the get_weather tool with the \
     latitude and longitude of the place in question and answer from its result."
        .to_string()
}

fn default_models() -> Vec<ChatModelConfig> {
    vec![
        ChatModelConfig {
            id: "chat-model".to_string(),
            model: "gpt-4o-mini".to_string(),
            reasoning: false,
        },
        ChatModelConfig {
            id: "chat-model-reasoning".to_string(),
            model: "o3-mini".to_string(),
            reasoning: true,
        },
    ]
}

fn default_active_tools() -> Vec<String> {
    vec!["get_weather".to_string()]
}

fn default_max_steps() -> usize {
    5
}

fn default_max_duration_secs() -> u64 {
    60
}

fn default_smooth_delay_ms() -> u64 {
    10
}

fn default_stream_error_message() -> String {
    "Oops, an error occured!".to_string()
}

fn default_weather_api_base() -> String {
    "https://api.open-meteo.com".to_string()
}
