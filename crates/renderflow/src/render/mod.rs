//! Seams to the two slow external collaborators: the weather-text parser and the video
//! renderer. The scheduler only ever sees them as opaque async work.

use std::{path::PathBuf, pin::Pin};

use serde::{Deserialize, Serialize};

pub mod engine;
pub mod files;
pub mod llm;
pub mod parser;

pub use engine::{CommandRenderer, RenderConfig};
pub use llm::{FallbackParser, LlmConfig, LlmParser};
pub use parser::KeywordParser;

pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

pub fn boxed<'a, T>(fut: impl std::future::Future<Output = T> + Send + 'a) -> BoxFuture<'a, T> {
    Box::pin(fut)
}

/// `parseText(text) -> WeatherData`
pub trait WeatherParser: Send + Sync {
    fn parse<'a>(&'a self, text: &'a str) -> BoxFuture<'a, anyhow::Result<WeatherData>>;
}

/// `render(weatherData, options) -> filePath`. Slow and fallible; may not be cancellable.
pub trait VideoRenderer: Send + Sync {
    fn render<'a>(
        &'a self,
        data: &'a WeatherData,
        options: &'a RenderOptions,
    ) -> BoxFuture<'a, anyhow::Result<PathBuf>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemperatureUnit {
    C,
    F,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindUnit {
    #[serde(rename = "km/h")]
    Kmh,
    #[serde(rename = "mph")]
    Mph,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrecipitationKind {
    Rain,
    Snow,
    Storm,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Precipitation {
    #[serde(rename = "type")]
    pub kind: PrecipitationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intensity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probability: Option<u32>,
}

/// Structured weather extracted from free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    pub condition: String,
    pub temperature_c: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_range: Option<TemperatureRange>,
    pub temperature_unit: TemperatureUnit,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feels_like: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feels_like_temp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_speed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_direction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_unit: Option<WindUnit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precipitation: Option<Precipitation>,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl WeatherData {
    /// Input props for the `WeatherForecast` composition.
    ///
    /// A temperature range collapses to its mean; missing city, wind unit and language
    /// get the composition's defaults.
    pub fn to_props(&self) -> WeatherProps {
        let temperature_c = match self.temperature_range {
            Some(r) => (r.min + r.max) / 2.0,
            None => self.temperature_c,
        };

        WeatherProps {
            city: self.city.clone().unwrap_or_else(|| "Ciudad".to_string()),
            country: self.country.clone(),
            condition: self.condition.clone(),
            temperature_c,
            feels_like: self.feels_like.clone(),
            feels_like_temp: self.feels_like_temp,
            wind: self.wind.clone(),
            wind_speed: self.wind_speed,
            wind_direction: self.wind_direction.clone(),
            wind_unit: self.wind_unit.unwrap_or(WindUnit::Kmh),
            language: self.language.clone().unwrap_or_else(|| "es".to_string()),
            temperature_unit: self.temperature_unit,
            precipitation: self.precipitation.clone(),
            description: self.description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherProps {
    pub city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    pub condition: String,
    pub temperature_c: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feels_like: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feels_like_temp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_speed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_direction: Option<String>,
    pub wind_unit: WindUnit,
    pub language: String,
    pub temperature_unit: TemperatureUnit,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precipitation: Option<Precipitation>,
    pub description: String,
}

/// Per-request encoder overrides. Unset fields use the renderer defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderOptions {
    pub fps: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub quality: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WeatherData {
        WeatherData {
            city: None,
            country: None,
            condition: "Nublado".into(),
            temperature_c: 4.5,
            temperature_range: Some(TemperatureRange { min: 1.0, max: 8.0 }),
            temperature_unit: TemperatureUnit::C,
            feels_like: None,
            feels_like_temp: None,
            wind: None,
            wind_speed: None,
            wind_direction: None,
            wind_unit: None,
            precipitation: None,
            description: "Nublado".into(),
            language: None,
        }
    }

    #[test]
    fn props_fill_composition_defaults() {
        let props = sample().to_props();
        assert_eq!(props.city, "Ciudad");
        assert_eq!(props.language, "es");
        assert_eq!(props.wind_unit, WindUnit::Kmh);
        assert_eq!(props.temperature_c, 4.5);
    }

    #[test]
    fn props_serialize_in_camel_case() {
        let json = serde_json::to_value(sample().to_props()).unwrap();
        assert_eq!(json["temperatureC"], 4.5);
        assert_eq!(json["windUnit"], "km/h");
        assert_eq!(json["temperatureUnit"], "C");
        assert!(json.get("country").is_none());
    }
}
