//! Configuration for the chat client

use crate::error::{ChatError, Result};
use crate::forecast::{MAX_DEGREE, MAX_HORIZON};
use chat_utils::{env_list, env_parse};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_API_BASE: &str = "http://localhost:8888";
const DEFAULT_CHAT_PATH: &str = "/api/chat";
const DEFAULT_GREETING: &str = "Hi! Ask me about a stock: prices, history, balance sheets, \
     analyst ratings, news or a price forecast.";

/// Origins the backend accepts cross-origin requests from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllowedOrigins {
    /// `*`: every origin
    #[default]
    Any,
    /// Explicit allow-list
    List(Vec<String>),
}

impl AllowedOrigins {
    /// Parse a comma-separated list. Empty input or any `*` item is permissive.
    pub fn parse(raw: &str) -> Self {
        let items: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .map(str::to_string)
            .collect();
        Self::from_items(items)
    }

    fn from_items(items: Vec<String>) -> Self {
        let items: Vec<String> = items
            .iter()
            .map(|item| item.trim().trim_end_matches('/').to_string())
            .filter(|item| !item.is_empty())
            .collect();
        if items.is_empty() || items.iter().any(|item| item == "*") {
            Self::Any
        } else {
            Self::List(items)
        }
    }

    /// Whether requests from `origin` are allowed
    pub fn is_allowed(&self, origin: &str) -> bool {
        match self {
            Self::Any => true,
            Self::List(origins) => {
                let origin = origin.trim_end_matches('/');
                origins.iter().any(|allowed| allowed.eq_ignore_ascii_case(origin))
            }
        }
    }

    /// The single concrete origin, if exactly one is configured
    pub fn single(&self) -> Option<&str> {
        match self {
            Self::List(origins) if origins.len() == 1 => origins.first().map(String::as_str),
            _ => None,
        }
    }
}

/// Settings for the local forecast collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// Polynomial degree of the least-squares fit
    pub degree: usize,
    /// Number of future points
    pub horizon: usize,
    /// Days between consecutive future points
    pub step_days: u64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            degree: 2,
            horizon: MAX_HORIZON,
            step_days: 30,
        }
    }
}

/// Configuration for the chat client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Backend base URL
    pub api_base: String,

    /// Path of the streaming chat endpoint
    pub chat_path: String,

    /// Total request timeout, including the whole streamed body
    pub request_timeout: Duration,

    /// Connection establishment timeout
    pub connect_timeout: Duration,

    /// Text of the assistant entry every fresh transcript starts with
    pub greeting: String,

    /// CORS allow-list shared with the backend
    pub allowed_origins: AllowedOrigins,

    /// Local forecast settings
    pub forecast: ForecastConfig,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            chat_path: DEFAULT_CHAT_PATH.to_string(),
            request_timeout: Duration::from_secs(180),
            connect_timeout: Duration::from_secs(10),
            greeting: DEFAULT_GREETING.to_string(),
            allowed_origins: AllowedOrigins::Any,
            forecast: ForecastConfig::default(),
        }
    }
}

impl ChatConfig {
    /// Create a new configuration builder
    pub fn builder() -> ChatConfigBuilder {
        ChatConfigBuilder::default()
    }

    /// Full URL of the chat endpoint
    pub fn chat_url(&self) -> String {
        format!(
            "{}/{}",
            self.api_base.trim_end_matches('/'),
            self.chat_path.trim_start_matches('/')
        )
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.api_base.trim().is_empty() {
            return Err(ChatError::Config("api_base must not be empty".to_string()));
        }

        if self.request_timeout.is_zero() || self.connect_timeout.is_zero() {
            return Err(ChatError::Config("timeouts must be greater than 0".to_string()));
        }

        if self.forecast.degree == 0 || self.forecast.degree > MAX_DEGREE {
            return Err(ChatError::Config(format!(
                "forecast degree must be between 1 and {MAX_DEGREE}"
            )));
        }

        if self.forecast.horizon == 0 || self.forecast.horizon > MAX_HORIZON {
            return Err(ChatError::Config(format!(
                "forecast horizon must be between 1 and {MAX_HORIZON}"
            )));
        }

        if self.forecast.step_days == 0 {
            return Err(ChatError::Config("forecast step_days must be greater than 0".to_string()));
        }

        Ok(())
    }
}

/// Builder for ChatConfig
#[derive(Debug, Default)]
pub struct ChatConfigBuilder {
    api_base: Option<String>,
    chat_path: Option<String>,
    request_timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    greeting: Option<String>,
    allowed_origins: Option<AllowedOrigins>,
    forecast_degree: Option<usize>,
    forecast_horizon: Option<usize>,
    forecast_step_days: Option<u64>,
}

impl ChatConfigBuilder {
    /// Set the backend base URL
    pub fn api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = Some(api_base.into());
        self
    }

    /// Set the chat endpoint path
    pub fn chat_path(mut self, path: impl Into<String>) -> Self {
        self.chat_path = Some(path.into());
        self
    }

    /// Set request timeout
    pub fn request_timeout(mut self, duration: Duration) -> Self {
        self.request_timeout = Some(duration);
        self
    }

    /// Set connect timeout
    pub fn connect_timeout(mut self, duration: Duration) -> Self {
        self.connect_timeout = Some(duration);
        self
    }

    /// Set the greeting entry text
    pub fn greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = Some(greeting.into());
        self
    }

    /// Set the CORS allow-list
    pub fn allowed_origins(mut self, origins: AllowedOrigins) -> Self {
        self.allowed_origins = Some(origins);
        self
    }

    /// Set the forecast polynomial degree
    pub fn forecast_degree(mut self, degree: usize) -> Self {
        self.forecast_degree = Some(degree);
        self
    }

    /// Set the number of forecast points
    pub fn forecast_horizon(mut self, horizon: usize) -> Self {
        self.forecast_horizon = Some(horizon);
        self
    }

    /// Set days between forecast points
    pub fn forecast_step_days(mut self, days: u64) -> Self {
        self.forecast_step_days = Some(days);
        self
    }

    /// Fill unset fields from the environment.
    ///
    /// Reads `MARKET_CHAT_API_BASE`, `MARKET_CHAT_TIMEOUT_SECS`,
    /// `FRONTEND_ORIGINS` and `MARKET_CHAT_FORECAST_DEGREE`. Values already set
    /// on the builder win.
    pub fn from_env(mut self) -> Result<Self> {
        if self.api_base.is_none() {
            self.api_base = std::env::var("MARKET_CHAT_API_BASE").ok();
        }
        if self.request_timeout.is_none() {
            self.request_timeout =
                env_parse::<u64>("MARKET_CHAT_TIMEOUT_SECS")?.map(Duration::from_secs);
        }
        if self.allowed_origins.is_none() {
            self.allowed_origins = env_list("FRONTEND_ORIGINS").map(AllowedOrigins::from_items);
        }
        if self.forecast_degree.is_none() {
            self.forecast_degree = env_parse("MARKET_CHAT_FORECAST_DEGREE")?;
        }
        Ok(self)
    }

    /// Build the configuration
    pub fn build(self) -> Result<ChatConfig> {
        let defaults = ChatConfig::default();

        let config = ChatConfig {
            api_base: self.api_base.unwrap_or(defaults.api_base),
            chat_path: self.chat_path.unwrap_or(defaults.chat_path),
            request_timeout: self.request_timeout.unwrap_or(defaults.request_timeout),
            connect_timeout: self.connect_timeout.unwrap_or(defaults.connect_timeout),
            greeting: self.greeting.unwrap_or(defaults.greeting),
            allowed_origins: self.allowed_origins.unwrap_or(defaults.allowed_origins),
            forecast: ForecastConfig {
                degree: self.forecast_degree.unwrap_or(defaults.forecast.degree),
                horizon: self.forecast_horizon.unwrap_or(defaults.forecast.horizon),
                step_days: self.forecast_step_days.unwrap_or(defaults.forecast.step_days),
            },
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ChatConfig::default();
        assert_eq!(config.chat_url(), "http://localhost:8888/api/chat");
        assert_eq!(config.allowed_origins, AllowedOrigins::Any);
        assert_eq!(config.forecast.degree, 2);
        assert_eq!(config.forecast.horizon, 12);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = ChatConfig::builder()
            .api_base("https://chat.example.com/")
            .request_timeout(Duration::from_secs(60))
            .forecast_degree(3)
            .build()
            .unwrap();

        assert_eq!(config.chat_url(), "https://chat.example.com/api/chat");
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.forecast.degree, 3);
    }

    #[test]
    fn test_validation() {
        assert!(ChatConfig::builder().api_base("  ").build().is_err());
        assert!(ChatConfig::builder().request_timeout(Duration::ZERO).build().is_err());
        assert!(ChatConfig::builder().forecast_degree(0).build().is_err());
        assert!(ChatConfig::builder().forecast_horizon(13).build().is_err());
        assert!(ChatConfig::builder().forecast_step_days(0).build().is_err());
    }

    #[test]
    fn test_allowed_origins_parse() {
        assert_eq!(AllowedOrigins::parse(""), AllowedOrigins::Any);
        assert_eq!(AllowedOrigins::parse("*"), AllowedOrigins::Any);
        assert_eq!(AllowedOrigins::parse("https://a.example,*"), AllowedOrigins::Any);

        let origins = AllowedOrigins::parse(" https://a.example/ , https://b.example ");
        assert_eq!(
            origins,
            AllowedOrigins::List(vec![
                "https://a.example".to_string(),
                "https://b.example".to_string()
            ])
        );
        assert!(origins.is_allowed("https://A.example"));
        assert!(origins.is_allowed("https://b.example/"));
        assert!(!origins.is_allowed("https://evil.example"));
        assert!(origins.single().is_none());
    }

    #[test]
    fn test_single_origin() {
        let origins = AllowedOrigins::parse("https://app.example");
        assert_eq!(origins.single(), Some("https://app.example"));
        assert!(AllowedOrigins::Any.is_allowed("https://anything.example"));
        assert!(AllowedOrigins::Any.single().is_none());
    }
}
