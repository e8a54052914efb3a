use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = "parado.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderSetting {
    Auto,
    Gemini,
    Openai,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub provider: Option<ProviderSetting>,
    pub gemini_base_url: Option<String>,
    pub gemini_model: Option<String>,
    pub gemini_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub openai_model: Option<String>,
    pub openai_api_key: Option<String>,
    pub temperature: Option<f32>,
    pub max_agent_rounds: Option<usize>,
    pub package_index: Option<String>,
    pub package_dir: Option<String>,
    pub packages: Option<Vec<String>>,
    pub boot_attempts: Option<u32>,
    pub verbose: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnvConfig {
    pub provider: Option<ProviderSetting>,
    pub gemini_base_url: Option<String>,
    pub gemini_model: Option<String>,
    pub gemini_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub openai_model: Option<String>,
    pub openai_api_key: Option<String>,
    pub temperature: Option<f32>,
    pub max_agent_rounds: Option<usize>,
    pub package_index: Option<String>,
    pub package_dir: Option<String>,
    pub verbose: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CliOverrides {
    pub provider: Option<ProviderSetting>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_agent_rounds: Option<usize>,
    pub package_dir: Option<String>,
    pub verbose: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionDefaults {
    pub provider: ProviderSetting,
    pub gemini_base_url: String,
    pub gemini_model: String,
    pub gemini_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub openai_api_key: Option<String>,
    pub temperature: f32,
    pub max_agent_rounds: usize,
    pub package_index: String,
    pub package_dir: Option<String>,
    pub packages: Vec<String>,
    pub boot_attempts: u32,
    pub verbose: bool,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            provider: ProviderSetting::Auto,
            gemini_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            gemini_model: "gemini-3-flash-preview".to_string(),
            gemini_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_model: "gpt-4.1-mini".to_string(),
            openai_api_key: None,
            temperature: 0.5,
            max_agent_rounds: 12,
            package_index: "https://cdn.jsdelivr.net/npm".to_string(),
            package_dir: None,
            packages: Vec::new(),
            boot_attempts: 3,
            verbose: false,
        }
    }
}

pub fn load_file_config(explicit_path: Option<&Path>, cwd: &Path) -> Result<Option<FileConfig>> {
    let path = match explicit_path {
        Some(p) => p.to_path_buf(),
        None => {
            let candidate = cwd.join(CONFIG_FILE_NAME);
            if !candidate.exists() {
                return Ok(None);
            }
            candidate
        }
    };

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed reading config file {}", path.display()))?;
    let parsed: FileConfig = serde_json::from_str(&raw)
        .with_context(|| format!("failed parsing config file {}", path.display()))?;
    Ok(Some(parsed))
}

impl EnvConfig {
    pub fn from_current_env() -> Self {
        Self {
            provider: env::var("PARADO_PROVIDER")
                .ok()
                .and_then(|v| parse_provider(&v)),
            gemini_base_url: non_empty_var("GEMINI_BASE_URL"),
            gemini_model: non_empty_var("PARADO_GEMINI_MODEL"),
            gemini_api_key: non_empty_var("GEMINI_API_KEY").or_else(|| non_empty_var("API_KEY")),
            openai_base_url: non_empty_var("OPENAI_BASE_URL"),
            openai_model: non_empty_var("PARADO_MODEL"),
            openai_api_key: non_empty_var("OPENAI_API_KEY"),
            temperature: env::var("PARADO_TEMPERATURE")
                .ok()
                .and_then(|v| v.trim().parse().ok()),
            max_agent_rounds: env::var("PARADO_MAX_AGENT_ROUNDS")
                .ok()
                .and_then(|v| v.trim().parse().ok()),
            package_index: non_empty_var("PARADO_PACKAGE_INDEX"),
            package_dir: non_empty_var("PARADO_PACKAGE_DIR"),
            verbose: env::var("PARADO_VERBOSE").ok().and_then(|v| parse_bool(&v)),
        }
    }
}

pub fn resolve_session_defaults(
    cli: &CliOverrides,
    env_cfg: &EnvConfig,
    file_cfg: Option<&FileConfig>,
) -> SessionDefaults {
    let base = SessionDefaults::default();

    let provider = cli
        .provider
        .or(env_cfg.provider)
        .or(file_cfg.and_then(|c| c.provider))
        .unwrap_or(base.provider);

    let gemini_base_url = env_cfg
        .gemini_base_url
        .clone()
        .or_else(|| file_cfg.and_then(|c| c.gemini_base_url.clone()))
        .unwrap_or(base.gemini_base_url);

    // --model targets whichever provider family is selected.
    let model_for_gemini = match provider {
        ProviderSetting::Openai => None,
        _ => cli.model.clone(),
    };
    let model_for_openai = match provider {
        ProviderSetting::Gemini => None,
        _ => cli.model.clone(),
    };

    let gemini_model = model_for_gemini
        .or_else(|| env_cfg.gemini_model.clone())
        .or_else(|| file_cfg.and_then(|c| c.gemini_model.clone()))
        .unwrap_or(base.gemini_model);

    let gemini_api_key = env_cfg
        .gemini_api_key
        .clone()
        .or_else(|| file_cfg.and_then(|c| c.gemini_api_key.clone()));

    let openai_base_url = env_cfg
        .openai_base_url
        .clone()
        .or_else(|| file_cfg.and_then(|c| c.openai_base_url.clone()))
        .unwrap_or(base.openai_base_url);

    let openai_model = model_for_openai
        .or_else(|| env_cfg.openai_model.clone())
        .or_else(|| file_cfg.and_then(|c| c.openai_model.clone()))
        .unwrap_or(base.openai_model);

    let openai_api_key = env_cfg
        .openai_api_key
        .clone()
        .or_else(|| file_cfg.and_then(|c| c.openai_api_key.clone()));

    let temperature = cli
        .temperature
        .or(env_cfg.temperature)
        .or(file_cfg.and_then(|c| c.temperature))
        .unwrap_or(base.temperature);

    let max_agent_rounds = cli
        .max_agent_rounds
        .or(env_cfg.max_agent_rounds)
        .or(file_cfg.and_then(|c| c.max_agent_rounds))
        .unwrap_or(base.max_agent_rounds)
        .max(1);

    let package_index = env_cfg
        .package_index
        .clone()
        .or_else(|| file_cfg.and_then(|c| c.package_index.clone()))
        .unwrap_or(base.package_index);

    let package_dir = cli
        .package_dir
        .clone()
        .or_else(|| env_cfg.package_dir.clone())
        .or_else(|| file_cfg.and_then(|c| c.package_dir.clone()))
        .or(base.package_dir);

    let packages = file_cfg
        .and_then(|c| c.packages.clone())
        .unwrap_or(base.packages);

    let boot_attempts = file_cfg
        .and_then(|c| c.boot_attempts)
        .unwrap_or(base.boot_attempts);

    let verbose = cli
        .verbose
        .or(env_cfg.verbose)
        .or(file_cfg.and_then(|c| c.verbose))
        .unwrap_or(base.verbose);

    SessionDefaults {
        provider,
        gemini_base_url,
        gemini_model,
        gemini_api_key,
        openai_base_url,
        openai_model,
        openai_api_key,
        temperature,
        max_agent_rounds,
        package_index,
        package_dir,
        packages,
        boot_attempts,
        verbose,
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bool(input: &str) -> Option<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_provider(input: &str) -> Option<ProviderSetting> {
    match input.trim().to_ascii_lowercase().as_str() {
        "auto" => Some(ProviderSetting::Auto),
        "gemini" | "google" => Some(ProviderSetting::Gemini),
        "openai" | "openai-compatible" => Some(ProviderSetting::Openai),
        _ => None,
    }
}
