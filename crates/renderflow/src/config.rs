use std::path::PathBuf;
use std::time::Duration;

use crate::jobs::{AdmissionConfig, ReclaimerConfig, SchedulerConfig};
use crate::render::llm::{DEFAULT_LLM_ENDPOINT, DEFAULT_LLM_MODEL};
use crate::render::{LlmConfig, RenderConfig};

/// Runtime configuration, loaded from the environment (and `.env` if present).
///
/// Every knob has a `RENDERFLOW_*` name and, where the service historically used one,
/// a bare fallback name.
#[derive(Clone, Debug)]
pub struct Config {
    pub listen_addr: String,
    pub max_concurrent_renders: usize,
    pub render_timeout: Duration,
    pub max_queue_depth: usize,
    pub job_retention: Duration,
    pub sweep_interval: Duration,
    pub temp_dir: PathBuf,
    pub render_command: Vec<String>,
    pub entry_point: String,
    pub composition_id: String,
    /// Set only when an API key is present.
    pub llm: Option<LlmConfig>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let listen_addr = env_or_fallback("RENDERFLOW_LISTEN_ADDR", "LISTEN_ADDR")
            .or_else(|| env_nonempty("PORT").map(|port| format!("0.0.0.0:{port}")))
            .unwrap_or_else(|| "0.0.0.0:3000".to_string());

        let max_concurrent_renders: usize =
            env_parse("RENDERFLOW_MAX_CONCURRENT_RENDERS", "MAX_CONCURRENT_RENDERS")?.unwrap_or(2);
        if max_concurrent_renders == 0 {
            anyhow::bail!("MAX_CONCURRENT_RENDERS must be >= 1");
        }

        let render_timeout_ms: u64 =
            env_parse("RENDERFLOW_RENDER_TIMEOUT_MS", "RENDER_TIMEOUT")?.unwrap_or(300_000);
        if render_timeout_ms == 0 {
            anyhow::bail!("RENDER_TIMEOUT must be > 0 ms");
        }

        let max_queue_depth: usize =
            env_parse("RENDERFLOW_MAX_QUEUE_DEPTH", "MAX_QUEUE_DEPTH")?.unwrap_or(10);
        if max_queue_depth == 0 {
            anyhow::bail!("MAX_QUEUE_DEPTH must be >= 1");
        }

        let job_retention_secs: u64 =
            env_parse("RENDERFLOW_JOB_RETENTION_SECS", "JOB_RETENTION_SECS")?.unwrap_or(60 * 60);
        let sweep_interval_secs: u64 =
            env_parse("RENDERFLOW_SWEEP_INTERVAL_SECS", "SWEEP_INTERVAL_SECS")?.unwrap_or(60 * 60);

        let temp_dir = env_or_fallback("RENDERFLOW_TEMP_DIR", "TEMP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("temp"));

        let render_command: Vec<String> = env_nonempty("RENDERFLOW_RENDER_COMMAND")
            .unwrap_or_else(|| "npx remotion render".to_string())
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let entry_point =
            env_nonempty("RENDERFLOW_ENTRY_POINT").unwrap_or_else(|| "src/index.tsx".to_string());
        let composition_id =
            env_nonempty("RENDERFLOW_COMPOSITION").unwrap_or_else(|| "WeatherForecast".to_string());

        let llm_timeout_ms: u64 =
            env_parse("RENDERFLOW_LLM_TIMEOUT_MS", "LLM_TIMEOUT_MS")?.unwrap_or(30_000);
        let llm = env_or_fallback("RENDERFLOW_LLM_API_KEY", "GROQ_API_KEY").map(|api_key| LlmConfig {
            api_key,
            endpoint: env_nonempty("RENDERFLOW_LLM_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_LLM_ENDPOINT.to_string()),
            model: env_nonempty("RENDERFLOW_LLM_MODEL")
                .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            timeout: Duration::from_millis(llm_timeout_ms.max(1)),
        });

        Ok(Self {
            listen_addr,
            max_concurrent_renders,
            render_timeout: Duration::from_millis(render_timeout_ms),
            max_queue_depth,
            job_retention: Duration::from_secs(job_retention_secs),
            sweep_interval: Duration::from_secs(sweep_interval_secs.max(1)),
            temp_dir,
            render_command,
            entry_point,
            composition_id,
            llm,
        })
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            max_concurrency: self.max_concurrent_renders,
            render_timeout: self.render_timeout,
        }
    }

    pub fn admission(&self) -> AdmissionConfig {
        AdmissionConfig {
            max_queue_depth: self.max_queue_depth,
        }
    }

    pub fn reclaimer(&self) -> ReclaimerConfig {
        ReclaimerConfig {
            retention: self.job_retention,
            interval: self.sweep_interval,
        }
    }

    pub fn render(&self) -> RenderConfig {
        RenderConfig {
            command: self.render_command.clone(),
            entry_point: self.entry_point.clone(),
            composition_id: self.composition_id.clone(),
            temp_dir: self.temp_dir.clone(),
            ..RenderConfig::default()
        }
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn env_or_fallback(primary: &str, fallback: &str) -> Option<String> {
    env_nonempty(primary).or_else(|| env_nonempty(fallback))
}

/// Unset is `Ok(None)`; set but unparseable is an error naming the variable.
fn env_parse<T: std::str::FromStr>(primary: &str, fallback: &str) -> anyhow::Result<Option<T>> {
    match env_or_fallback(primary, fallback) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{primary} (or {fallback}) is not a valid number: {raw:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: &[&str] = &[
        "RENDERFLOW_MAX_CONCURRENT_RENDERS",
        "MAX_CONCURRENT_RENDERS",
        "RENDERFLOW_RENDER_TIMEOUT_MS",
        "RENDER_TIMEOUT",
        "RENDERFLOW_MAX_QUEUE_DEPTH",
        "MAX_QUEUE_DEPTH",
        "RENDERFLOW_LISTEN_ADDR",
        "LISTEN_ADDR",
        "PORT",
        "RENDERFLOW_LLM_API_KEY",
        "GROQ_API_KEY",
        "RENDERFLOW_LLM_MODEL",
    ];

    fn clear() {
        for key in KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn defaults() {
        clear();
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.max_concurrent_renders, 2);
        assert_eq!(cfg.render_timeout, Duration::from_secs(300));
        assert_eq!(cfg.max_queue_depth, 10);
        assert_eq!(cfg.listen_addr, "0.0.0.0:3000");
        assert_eq!(cfg.render_command, vec!["npx", "remotion", "render"]);
        assert!(cfg.llm.is_none());
    }

    #[test]
    #[serial]
    fn llm_is_enabled_by_the_key() {
        clear();
        std::env::set_var("GROQ_API_KEY", "gsk_test");
        std::env::set_var("RENDERFLOW_LLM_MODEL", "llama-3.1-8b-instant");
        let llm = Config::from_env().unwrap().llm.expect("llm config");
        assert_eq!(llm.api_key, "gsk_test");
        assert_eq!(llm.model, "llama-3.1-8b-instant");
        assert_eq!(llm.endpoint, DEFAULT_LLM_ENDPOINT);
        assert_eq!(llm.timeout, Duration::from_secs(30));
        clear();
    }

    #[test]
    #[serial]
    fn primary_wins_over_fallback() {
        clear();
        std::env::set_var("MAX_CONCURRENT_RENDERS", "3");
        std::env::set_var("RENDERFLOW_MAX_CONCURRENT_RENDERS", "5");
        std::env::set_var("PORT", "8080");
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.max_concurrent_renders, 5);
        assert_eq!(cfg.listen_addr, "0.0.0.0:8080");
        clear();
    }

    #[test]
    #[serial]
    fn rejects_zero_and_garbage() {
        clear();
        std::env::set_var("MAX_QUEUE_DEPTH", "0");
        assert!(Config::from_env().is_err());
        clear();
        std::env::set_var("RENDER_TIMEOUT", "soon");
        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("RENDER_TIMEOUT"));
        clear();
    }
}
