use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

/// Small Llama-architecture checkpoint that runs comfortably on a CPU.
pub const DEFAULT_MODEL_ID: &str = "HuggingFaceTB/SmolLM2-135M";

#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub common: core_config::Config,
    pub model: ModelSettings,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    /// Hugging Face hub repository, e.g. `HuggingFaceTB/SmolLM2-135M`.
    pub model_id: String,
    /// Branch, tag or commit of the repository.
    pub revision: String,
    pub dtype: ModelDType,
    pub device: DeviceKind,
    /// When false the service starts without a model and answers every
    /// prompt with the load-failure fallback.
    pub enabled: bool,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            revision: "main".to_string(),
            dtype: ModelDType::F32,
            device: DeviceKind::Cpu,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
}

/// Weight precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelDType {
    F32,
    F16,
    Bf16,
}

impl FromStr for ModelDType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "f32" => Ok(ModelDType::F32),
            "f16" => Ok(ModelDType::F16),
            "bf16" => Ok(ModelDType::Bf16),
            other => Err(invalid("CHAT_MODEL_DTYPE", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Cpu,
    Cuda,
    Metal,
}

impl FromStr for DeviceKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(DeviceKind::Cpu),
            "cuda" => Ok(DeviceKind::Cuda),
            "metal" => Ok(DeviceKind::Metal),
            other => Err(invalid("CHAT_MODEL_DEVICE", other)),
        }
    }
}

impl ChatConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        Ok(ChatConfig {
            common: common_config,
            model: ModelSettings {
                model_id: get_env("CHAT_MODEL_ID", Some(DEFAULT_MODEL_ID), is_prod)?,
                revision: get_env("CHAT_MODEL_REVISION", Some("main"), is_prod)?,
                dtype: get_env("CHAT_MODEL_DTYPE", Some("f32"), is_prod)?.parse()?,
                device: get_env("CHAT_MODEL_DEVICE", Some("cpu"), is_prod)?.parse()?,
                enabled: parse_bool(
                    "CHAT_MODEL_ENABLED",
                    &get_env("CHAT_MODEL_ENABLED", Some("true"), is_prod)?,
                )?,
            },
            telemetry: TelemetryConfig {
                log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
                otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|v| !v.is_empty()),
            },
        })
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, AppError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(invalid(key, other)),
    }
}

fn invalid(key: &str, value: &str) -> AppError {
    AppError::ConfigError(anyhow::anyhow!("{} has unsupported value '{}'", key, value))
}
