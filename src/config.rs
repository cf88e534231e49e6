//! Runtime settings read from the environment (and `.env` via dotenv in the
//! binaries).

use crate::error::AgentError;
use crate::Result;
use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_STOCK_DATA_URL: &str = "localhost:5001";
const DEFAULT_TECHNICAL_URL: &str = "localhost:5002";
const DEFAULT_MCP_PORT: u16 = 5001;

#[derive(Debug, Clone)]
pub struct Settings {
    pub llm_provider: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    /// Normalized `/mcp/` endpoint of the stock data server.
    pub stock_data_url: String,
    /// Normalized `/mcp/` endpoint of the technical analysis server.
    pub technical_url: String,
    pub database_url: Option<String>,
    pub api_host: String,
    pub api_port: u16,
    pub frontend_url: String,
    pub step_timeout: Option<Duration>,
    pub tool_http_timeout: Duration,
    pub max_plan_steps: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            llm_provider: "gemini".to_string(),
            gemini_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            stock_data_url: normalize_server_url(DEFAULT_STOCK_DATA_URL, DEFAULT_MCP_PORT),
            technical_url: normalize_server_url(DEFAULT_TECHNICAL_URL, DEFAULT_MCP_PORT + 1),
            database_url: None,
            api_host: "0.0.0.0".to_string(),
            api_port: 8000,
            frontend_url: "http://localhost:3000".to_string(),
            step_timeout: Some(Duration::from_secs(30)),
            tool_http_timeout: Duration::from_secs(60),
            max_plan_steps: 50,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build settings from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let llm_provider = var("LLM_PROVIDER")
            .map(|p| p.trim().to_ascii_lowercase())
            .unwrap_or(defaults.llm_provider);
        if llm_provider != "gemini" {
            return Err(AgentError::ConfigError(format!(
                "Unsupported LLM_PROVIDER '{}' (only 'gemini' is available)",
                llm_provider
            )));
        }

        let step_timeout_secs: u64 = parse_var(&var, "STEP_TIMEOUT_SECS")?.unwrap_or(30);
        let tool_timeout_secs: u64 = parse_var(&var, "TOOL_HTTP_TIMEOUT_SECS")?.unwrap_or(60);

        let api_port = match parse_var(&var, "PORT")? {
            Some(port) => port,
            None => parse_var(&var, "API_PORT")?.unwrap_or(defaults.api_port),
        };

        Ok(Self {
            llm_provider,
            gemini_api_key: var("GEMINI_API_KEY"),
            gemini_model: var("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            stock_data_url: normalize_server_url(
                &var("MCP_STOCK_DATA_URL").unwrap_or_else(|| DEFAULT_STOCK_DATA_URL.to_string()),
                DEFAULT_MCP_PORT,
            ),
            technical_url: normalize_server_url(
                &var("MCP_TECHNICAL_URL").unwrap_or_else(|| DEFAULT_TECHNICAL_URL.to_string()),
                DEFAULT_MCP_PORT + 1,
            ),
            database_url: var("POSTGRES_URL").or_else(|| var("DATABASE_URL")),
            api_host: var("API_HOST").unwrap_or(defaults.api_host),
            api_port,
            frontend_url: var("FRONTEND_URL").unwrap_or(defaults.frontend_url),
            step_timeout: (step_timeout_secs > 0).then(|| Duration::from_secs(step_timeout_secs)),
            tool_http_timeout: Duration::from_secs(tool_timeout_secs.max(1)),
            max_plan_steps: parse_var(&var, "MAX_PLAN_STEPS")?.unwrap_or(defaults.max_plan_steps),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}

fn parse_var<T, F>(var: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
            AgentError::ConfigError(format!("{} has an invalid value '{}'", name, raw))
        }),
        None => Ok(None),
    }
}

/// Turn `host`, `host:port` or a full URL into the server's `/mcp/` endpoint.
pub fn normalize_server_url(raw: &str, default_port: u16) -> String {
    let raw = raw.trim().trim_end_matches('/');

    let base = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else if raw.contains(':') {
        format!("http://{}", raw)
    } else {
        format!("http://{}:{}", raw, default_port)
    };

    if base.ends_with("/mcp") {
        format!("{}/", base)
    } else {
        format!("{}/mcp/", base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings_from(vars: &[(&str, &str)]) -> Result<Settings> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let settings = settings_from(&[]).unwrap();

        assert_eq!(settings.stock_data_url, "http://localhost:5001/mcp/");
        assert_eq!(settings.technical_url, "http://localhost:5002/mcp/");
        assert_eq!(settings.bind_address(), "0.0.0.0:8000");
        assert_eq!(settings.step_timeout, Some(Duration::from_secs(30)));
        assert_eq!(settings.max_plan_steps, 50);
        assert!(settings.database_url.is_none());
    }

    #[test]
    fn test_overrides() {
        let settings = settings_from(&[
            ("PORT", "9000"),
            ("API_PORT", "1234"),
            ("STEP_TIMEOUT_SECS", "0"),
            ("DATABASE_URL", "postgres://localhost/agent"),
            ("MCP_TECHNICAL_URL", "https://tech.internal/mcp"),
        ])
        .unwrap();

        assert_eq!(settings.api_port, 9000);
        assert_eq!(settings.step_timeout, None);
        assert_eq!(settings.database_url.as_deref(), Some("postgres://localhost/agent"));
        assert_eq!(settings.technical_url, "https://tech.internal/mcp/");
    }

    #[test]
    fn test_invalid_number_names_variable() {
        let err = settings_from(&[("MAX_PLAN_STEPS", "lots")]).unwrap_err();
        assert!(err.to_string().contains("MAX_PLAN_STEPS"));
    }

    #[test]
    fn test_unsupported_provider() {
        assert!(matches!(
            settings_from(&[("LLM_PROVIDER", "openai")]),
            Err(AgentError::ConfigError(_))
        ));
    }

    #[test]
    fn test_normalize_server_url() {
        assert_eq!(normalize_server_url("mcp-stock", 5001), "http://mcp-stock:5001/mcp/");
        assert_eq!(normalize_server_url("10.0.0.5:7000/", 5001), "http://10.0.0.5:7000/mcp/");
        assert_eq!(normalize_server_url("http://localhost:5002/mcp/", 5001), "http://localhost:5002/mcp/");
    }
}
