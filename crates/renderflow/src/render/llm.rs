//! Chat-completion weather parser.
//!
//! Sends the text to an OpenAI-compatible chat endpoint and asks for a JSON object.
//! The reply is cleaned up and normalized into [`WeatherData`]; anything that cannot be
//! trusted is an error, and [`FallbackParser`] then answers with the keyword parser.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::render::{
    boxed, BoxFuture, KeywordParser, Precipitation, PrecipitationKind, TemperatureRange,
    TemperatureUnit, WeatherData, WeatherParser, WindUnit,
};

pub const DEFAULT_LLM_ENDPOINT: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_LLM_MODEL: &str = "qwen/qwen3-32b";

const VALID_CONDITIONS: &[&str] = &[
    "Soleado",
    "Despejado",
    "Nublado",
    "Muy nublado",
    "Lluvia",
    "Nieve",
    "Tormenta",
];

#[derive(Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
    pub timeout: Duration,
}

// keeps the key out of logs
impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_completion_tokens: u32,
    top_p: f32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

pub struct LlmParser {
    http: HttpClient,
    cfg: LlmConfig,
}

impl LlmParser {
    pub fn new(cfg: LlmConfig) -> anyhow::Result<Self> {
        let http = HttpClient::builder()
            .timeout(cfg.timeout)
            .build()
            .context("could not build LLM http client")?;
        Ok(Self { http, cfg })
    }

    async fn complete(&self, text: &str) -> anyhow::Result<WeatherData> {
        let request = ChatRequest {
            model: &self.cfg.model,
            messages: vec![ChatMessage {
                role: "user",
                content: build_prompt(text),
            }],
            temperature: 0.3,
            max_completion_tokens: 1024,
            top_p: 0.95,
            stream: false,
        };

        let response = self
            .http
            .post(&self.cfg.endpoint)
            .bearer_auth(&self.cfg.api_key)
            .json(&request)
            .send()
            .await
            .context("chat completion request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("chat completion HTTP {status}: {body}");
        }

        let reply: ChatResponse = response
            .json()
            .await
            .context("chat completion response is not valid JSON")?;
        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("chat completion returned no content"))?;

        let value: Value = serde_json::from_str(strip_code_fences(&content))
            .with_context(|| format!("model reply is not a JSON object: {content:?}"))?;
        normalize_response(&value, text)
    }
}

impl WeatherParser for LlmParser {
    fn parse<'a>(&'a self, text: &'a str) -> BoxFuture<'a, anyhow::Result<WeatherData>> {
        boxed(async move {
            let data = self.complete(text).await?;
            tracing::debug!(
                model = %self.cfg.model,
                city = data.city.as_deref().unwrap_or("-"),
                condition = %data.condition,
                temperature_c = data.temperature_c,
                "weather text parsed by model"
            );
            Ok(data)
        })
    }
}

/// Tries `primary` first and answers from the keyword parser when it is absent or fails.
pub struct FallbackParser {
    primary: Option<Arc<dyn WeatherParser>>,
    fallback: KeywordParser,
}

impl FallbackParser {
    pub fn new(primary: Option<Arc<dyn WeatherParser>>, fallback: KeywordParser) -> Self {
        Self { primary, fallback }
    }

    /// `LlmParser` in front when a key is configured, the keyword parser alone otherwise.
    pub fn from_config(llm: Option<LlmConfig>) -> anyhow::Result<Self> {
        let primary = match llm {
            Some(cfg) => Some(Arc::new(LlmParser::new(cfg)?) as Arc<dyn WeatherParser>),
            None => None,
        };
        Ok(Self::new(primary, KeywordParser::new()?))
    }

    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }
}

impl WeatherParser for FallbackParser {
    fn parse<'a>(&'a self, text: &'a str) -> BoxFuture<'a, anyhow::Result<WeatherData>> {
        boxed(async move {
            if let Some(primary) = &self.primary {
                match primary.parse(text).await {
                    Ok(data) => return Ok(data),
                    Err(e) => {
                        tracing::warn!(error = %format!("{e:#}"), "model parse failed, using keyword parser");
                    }
                }
            }
            self.fallback.parse(text).await
        })
    }
}

pub fn build_prompt(text: &str) -> String {
    format!(
        r#"Extrae la información meteorológica del siguiente texto y responde SOLO con un objeto JSON, sin texto adicional.

Texto: "{text}"

Esquema:
{{
  "city": "ciudad o null",
  "country": "país o null",
  "condition": "Soleado | Despejado | Nublado | Muy nublado | Lluvia | Nieve | Tormenta",
  "temperatureC": número,
  "temperatureRange": {{ "min": número, "max": número }} o null,
  "temperatureUnit": "C" o "F",
  "feelsLike": "sensación térmica en texto o null",
  "feelsLikeTemp": número o null,
  "wind": "descripción del viento o null",
  "windSpeed": número o null,
  "windDirection": "dirección o null",
  "windUnit": "km/h" o "mph",
  "precipitation": {{ "type": "rain | snow | storm", "intensity": "texto o null", "probability": número 0-100 o null }} o null,
  "description": "resumen breve en español"
}}

Si se da un rango de temperaturas, temperatureC es la media.
Probabilidad: "alta probabilidad" = 75, "probabilidad media" = 50, "baja probabilidad" = 25."#
    )
}

/// Drop a markdown code fence or leading reasoning and keep the outermost `{...}`.
pub fn strip_code_fences(raw: &str) -> &str {
    let mut s = raw.trim();
    if let Some(idx) = s.rfind("</think>") {
        s = s[idx + "</think>".len()..].trim();
    }
    if let Some(rest) = s.strip_prefix("```json").or_else(|| s.strip_prefix("```")) {
        s = rest.trim_start();
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest.trim_end();
    }
    match (s.find('{'), s.rfind('}')) {
        (Some(start), Some(end)) if start < end => &s[start..=end],
        _ => s,
    }
}

/// Validate the model's object and map it onto [`WeatherData`].
///
/// `condition` and `temperatureC` are required. Everything else is optional and
/// silently dropped when it has the wrong shape.
pub fn normalize_response(value: &Value, text: &str) -> anyhow::Result<WeatherData> {
    let condition = value
        .get("condition")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| anyhow::anyhow!("model reply has no condition"))?;
    let temperature_c = value
        .get("temperatureC")
        .and_then(Value::as_f64)
        .ok_or_else(|| anyhow::anyhow!("model reply has no numeric temperatureC"))?;

    let temperature_range = value.get("temperatureRange").and_then(|r| {
        Some(TemperatureRange {
            min: r.get("min")?.as_f64()?,
            max: r.get("max")?.as_f64()?,
        })
    });

    let temperature_unit = match str_field(value, "temperatureUnit").as_deref() {
        Some("F") | Some("f") => TemperatureUnit::F,
        _ => TemperatureUnit::C,
    };
    let wind_unit = match str_field(value, "windUnit").as_deref() {
        Some("mph") => WindUnit::Mph,
        _ => WindUnit::Kmh,
    };

    let description = str_field(value, "description").unwrap_or_else(|| text.trim().to_string());

    Ok(WeatherData {
        city: str_field(value, "city"),
        country: str_field(value, "country"),
        condition: normalize_condition(condition).to_string(),
        temperature_c,
        temperature_range,
        temperature_unit,
        feels_like: str_field(value, "feelsLike"),
        feels_like_temp: value.get("feelsLikeTemp").and_then(Value::as_f64),
        wind: str_field(value, "wind"),
        wind_speed: value
            .get("windSpeed")
            .and_then(Value::as_f64)
            .filter(|v| *v >= 0.0)
            .map(|v| v.round() as u32),
        wind_direction: str_field(value, "windDirection"),
        wind_unit: Some(wind_unit),
        precipitation: value.get("precipitation").and_then(normalize_precipitation),
        description,
        language: str_field(value, "language").or_else(|| Some("es".to_string())),
    })
}

/// Map free-form condition names onto the composition's fixed set.
pub fn normalize_condition(raw: &str) -> &'static str {
    if let Some(valid) = VALID_CONDITIONS.iter().copied().find(|c| *c == raw) {
        return valid;
    }
    let lower = raw.to_lowercase();
    if lower.contains("soleado") || lower.contains("despejado") {
        "Soleado"
    } else if lower.contains("muy nublado") {
        "Muy nublado"
    } else if lower.contains("nublado") {
        "Nublado"
    } else if lower.contains("lluvia") || lower.contains("chubasco") {
        "Lluvia"
    } else if lower.contains("nieve") {
        "Nieve"
    } else if lower.contains("tormenta") {
        "Tormenta"
    } else {
        "Despejado"
    }
}

fn normalize_precipitation(value: &Value) -> Option<Precipitation> {
    let kind = match value.get("type")?.as_str()?.to_lowercase().as_str() {
        "rain" | "lluvia" => PrecipitationKind::Rain,
        "snow" | "nieve" => PrecipitationKind::Snow,
        "storm" | "tormenta" => PrecipitationKind::Storm,
        _ => return None,
    };
    Some(Precipitation {
        kind,
        intensity: str_field(value, "intensity"),
        probability: value
            .get("probability")
            .and_then(Value::as_f64)
            .map(|p| p.round().clamp(0.0, 100.0) as u32),
    })
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "null")
        .map(str::to_string)
}
