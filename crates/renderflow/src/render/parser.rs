//! Deterministic extractor for short Spanish weather descriptions.
//!
//! Keyword tables are explicit ordered lists evaluated top to bottom; the first match
//! wins. Conditions are ordered from most to least specific/severe so that, for example,
//! "muy nublado, con chubascos" reads as "Muy nublado" and storms beat plain rain.

use regex::Regex;

use crate::render::{
    boxed, BoxFuture, Precipitation, PrecipitationKind, TemperatureRange, TemperatureUnit,
    WeatherData, WeatherParser, WindUnit,
};

const CONDITIONS: &[(&str, &str)] = &[
    (r"\btorment|\brayos\b|\btruenos\b", "Tormenta"),
    (r"\bniev|\bnevad|\bnevando\b", "Nieve"),
    (r"\bmuy nublad|\btotalmente nublad|\bcielo cubierto\b", "Muy nublado"),
    (r"\blluvi|\bllover\b|\blloviendo\b|\bchubasco|\bprecipitacion", "Lluvia"),
    (r"\bnublad|\bnubes\b", "Nublado"),
    (r"\bsoleado|\bsoleada|\bsol\b", "Soleado"),
    (r"\bdespejad|\bcielo claro\b|\bclaro\b|\bclara\b", "Despejado"),
];

const DEFAULT_CONDITION: &str = "Despejado";
const DEFAULT_TEMPERATURE_C: f64 = 15.0;

const INTENSITIES: &[(&str, &str)] = &[
    ("debil", "débil"),
    ("leve", "débil"),
    ("ligero", "débil"),
    ("ligera", "débil"),
    ("suave", "débil"),
    ("moderado", "moderado"),
    ("moderada", "moderado"),
    ("medio", "moderado"),
    ("media", "moderado"),
    ("fuerte", "fuerte"),
    ("intenso", "fuerte"),
    ("intensa", "fuerte"),
    ("severo", "fuerte"),
    ("severa", "fuerte"),
];

// compound directions first so "noreste" is not read as "norte"
const WIND_DIRECTIONS: &[(&str, &str)] = &[
    ("noreste", "Noreste"),
    ("nordeste", "Noreste"),
    ("noroeste", "Noroeste"),
    ("sureste", "Sureste"),
    ("sudeste", "Sureste"),
    ("suroeste", "Suroeste"),
    ("sudoeste", "Suroeste"),
    ("norte", "Norte"),
    ("sur", "Sur"),
    ("este", "Este"),
    ("oeste", "Oeste"),
];

/// Phrase → probability (%), checked in order.
const PROBABILITY_PHRASES: &[(&str, u32)] = &[
    ("alta probabilidad", 75),
    ("muy probable", 75),
    ("baja probabilidad", 25),
    ("poco probable", 25),
    ("probable", 75),
    ("probabilidad", 50),
];

pub struct KeywordParser {
    conditions: Vec<(Regex, &'static str)>,
    location: Vec<Regex>,
    temp_range: Regex,
    temp_single: Regex,
    fahrenheit: Regex,
    wind_speed: Regex,
    wind_intensity: Regex,
    percent: Regex,
}

impl KeywordParser {
    pub fn new() -> anyhow::Result<Self> {
        let conditions = CONDITIONS
            .iter()
            .map(|(pattern, value)| Ok((Regex::new(pattern)?, *value)))
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            conditions,
            location: vec![
                Regex::new(
                    r"\ben\s+([A-ZÁÉÍÓÚÑ]\w*(?:\s+(?:de\s+|del\s+|la\s+)?[A-ZÁÉÍÓÚÑ]\w*)*)(?:,\s*([A-ZÁÉÍÓÚÑ]\w*(?:\s+[A-ZÁÉÍÓÚÑ]\w*)*))?",
                )?,
                Regex::new(r"(?i)^([^,:]+?),\s*([^:]+?)(?::|$)")?,
            ],
            temp_range: Regex::new(
                r"(?i)temperaturas?\s+(?:entre|de)\s+(-?\d+)\s*°?\s*[cf]?\s*(?:y|a)\s+(-?\d+)",
            )?,
            temp_single: Regex::new(r"(?i)(-?\d+)\s*(?:°\s*[cf]?|grados\b)")?,
            fahrenheit: Regex::new(r"(?i)°\s*f\b|fahrenheit")?,
            wind_speed: Regex::new(r"(?i)(\d+)\s*(km/h|kmh|mph|millas)")?,
            wind_intensity: Regex::new(r"viento\s+(\w+)")?,
            percent: Regex::new(r"(\d{1,3})\s*%")?,
        })
    }

    /// Pure extraction; never fails, falls back to defaults.
    pub fn extract(&self, text: &str) -> WeatherData {
        let normalized = normalize(text);

        let (city, country) = self.extract_location(text.trim());
        let condition = self.extract_condition(&normalized);
        let (temperature_c, temperature_range, temperature_unit) = self.extract_temperature(text);
        let wind = self.extract_wind(text, &normalized);
        let precipitation = self.extract_precipitation(text, &normalized, condition);

        WeatherData {
            city,
            country,
            condition: condition.to_string(),
            temperature_c,
            temperature_range,
            temperature_unit,
            feels_like: None,
            feels_like_temp: None,
            wind: wind.label,
            wind_speed: wind.speed,
            wind_direction: wind.direction,
            wind_unit: wind.unit,
            precipitation,
            description: text.trim().to_string(),
            language: Some("es".to_string()),
        }
    }

    fn extract_location(&self, text: &str) -> (Option<String>, Option<String>) {
        for pattern in &self.location {
            let Some(caps) = pattern.captures(text) else {
                continue;
            };
            let city = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
            if city.is_empty() {
                continue;
            }
            let country = caps
                .get(2)
                .map(|m| m.as_str().trim())
                .filter(|c| !c.is_empty())
                .map(capitalize);
            return (Some(capitalize(city)), country);
        }
        (None, None)
    }

    fn extract_condition(&self, normalized: &str) -> &'static str {
        self.conditions
            .iter()
            .find(|(re, _)| re.is_match(normalized))
            .map(|(_, value)| *value)
            .unwrap_or(DEFAULT_CONDITION)
    }

    fn extract_temperature(&self, text: &str) -> (f64, Option<TemperatureRange>, TemperatureUnit) {
        let unit = if self.fahrenheit.is_match(text) {
            TemperatureUnit::F
        } else {
            TemperatureUnit::C
        };
        let to_c = |t: f64| match unit {
            TemperatureUnit::F => (t - 32.0) * 5.0 / 9.0,
            TemperatureUnit::C => t,
        };

        if let Some(caps) = self.temp_range.captures(text) {
            let min = caps[1].parse::<f64>().map(to_c);
            let max = caps[2].parse::<f64>().map(to_c);
            if let (Ok(min), Ok(max)) = (min, max) {
                let range = TemperatureRange {
                    min: round1(min),
                    max: round1(max),
                };
                return (round1((min + max) / 2.0), Some(range), unit);
            }
        }

        if let Some(t) = self
            .temp_single
            .captures(text)
            .and_then(|caps| caps[1].parse::<f64>().ok())
        {
            return (round1(to_c(t)), None, unit);
        }

        (DEFAULT_TEMPERATURE_C, None, TemperatureUnit::C)
    }

    fn extract_wind(&self, text: &str, normalized: &str) -> Wind {
        let mut wind = Wind::default();

        if let Some(caps) = self.wind_speed.captures(text) {
            wind.speed = caps[1].parse().ok();
            wind.unit = Some(match caps[2].to_lowercase().as_str() {
                "mph" | "millas" => WindUnit::Mph,
                _ => WindUnit::Kmh,
            });
        }

        let intensity = self
            .wind_intensity
            .captures(normalized)
            .and_then(|caps| lookup(INTENSITIES, caps.get(1)?.as_str()));
        if let Some(label) = intensity {
            wind.label = Some(format!("Viento {label}"));
        } else if normalized.contains("viento") {
            wind.label = Some("Viento".to_string());
        }

        wind.direction = WIND_DIRECTIONS
            .iter()
            .find(|(key, _)| contains_word(normalized, key))
            .map(|(_, value)| value.to_string());

        wind
    }

    fn extract_precipitation(
        &self,
        text: &str,
        normalized: &str,
        condition: &str,
    ) -> Option<Precipitation> {
        let kind = if normalized.contains("lluv") || normalized.contains("chubasc") {
            Some(PrecipitationKind::Rain)
        } else if normalized.contains("niev") {
            Some(PrecipitationKind::Snow)
        } else if normalized.contains("torment") {
            Some(PrecipitationKind::Storm)
        } else {
            match condition {
                "Lluvia" => Some(PrecipitationKind::Rain),
                "Nieve" => Some(PrecipitationKind::Snow),
                "Tormenta" => Some(PrecipitationKind::Storm),
                _ => None,
            }
        }?;

        let intensity = INTENSITIES
            .iter()
            .find(|(key, _)| contains_word(normalized, key))
            .map(|(_, value)| value.to_string());

        let probability = self
            .percent
            .captures(text)
            .and_then(|caps| caps[1].parse::<u32>().ok())
            .map(|p| p.min(100))
            .or_else(|| {
                PROBABILITY_PHRASES
                    .iter()
                    .find(|(phrase, _)| normalized.contains(phrase))
                    .map(|(_, p)| *p)
            });

        Some(Precipitation {
            kind,
            intensity,
            probability,
        })
    }
}

impl WeatherParser for KeywordParser {
    fn parse<'a>(&'a self, text: &'a str) -> BoxFuture<'a, anyhow::Result<WeatherData>> {
        boxed(async move {
            let data = self.extract(text);
            tracing::debug!(
                city = data.city.as_deref().unwrap_or("-"),
                condition = %data.condition,
                temperature_c = data.temperature_c,
                "weather text parsed"
            );
            Ok(data)
        })
    }
}

#[derive(Default)]
struct Wind {
    label: Option<String>,
    speed: Option<u32>,
    direction: Option<String>,
    unit: Option<WindUnit>,
}

/// Lowercase and strip Spanish diacritics.
fn normalize(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            other => other,
        })
        .collect()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn lookup<'a>(table: &'a [(&'a str, &'a str)], key: &str) -> Option<&'a str> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

fn contains_word(haystack: &str, word: &str) -> bool {
    haystack
        .split(|c: char| !c.is_alphanumeric())
        .any(|w| w == word)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> KeywordParser {
        KeywordParser::new().unwrap()
    }

    #[test]
    fn full_sentence() {
        let data = parser().extract(
            "Hoy en Madrid, España: muy nublado, con chubascos débiles y temperaturas entre 1°C y 8°C. Viento fuerte del noreste a 40 km/h, 60% de probabilidad.",
        );
        assert_eq!(data.city.as_deref(), Some("Madrid"));
        assert_eq!(data.country.as_deref(), Some("España"));
        assert_eq!(data.condition, "Muy nublado");
        assert_eq!(data.temperature_c, 4.5);
        assert_eq!(
            data.temperature_range,
            Some(TemperatureRange { min: 1.0, max: 8.0 })
        );
        assert_eq!(data.wind.as_deref(), Some("Viento fuerte"));
        assert_eq!(data.wind_speed, Some(40));
        assert_eq!(data.wind_unit, Some(WindUnit::Kmh));
        assert_eq!(data.wind_direction.as_deref(), Some("Noreste"));

        let p = data.precipitation.expect("precipitation");
        assert_eq!(p.kind, PrecipitationKind::Rain);
        assert_eq!(p.probability, Some(60));
        assert_eq!(data.language.as_deref(), Some("es"));
    }

    #[test]
    fn storm_outranks_rain() {
        let data = parser().extract("Lluvia intensa y tormenta eléctrica por la tarde");
        assert_eq!(data.condition, "Tormenta");
        assert_eq!(data.precipitation.unwrap().intensity.as_deref(), Some("fuerte"));
    }

    #[test]
    fn fahrenheit_is_converted() {
        let data = parser().extract("Soleado con 50°F durante todo el día");
        assert_eq!(data.temperature_unit, TemperatureUnit::F);
        assert_eq!(data.temperature_c, 10.0);
        assert_eq!(data.condition, "Soleado");
    }

    #[test]
    fn defaults_when_nothing_matches() {
        let data = parser().extract("un día cualquiera sin datos");
        assert_eq!(data.condition, DEFAULT_CONDITION);
        assert_eq!(data.temperature_c, DEFAULT_TEMPERATURE_C);
        assert!(data.precipitation.is_none());
        assert!(data.wind.is_none());
    }

    #[test]
    fn phrase_probability() {
        let data = parser().extract("Nieve en Burgos con baja probabilidad, 2 grados");
        let p = data.precipitation.unwrap();
        assert_eq!(p.kind, PrecipitationKind::Snow);
        assert_eq!(p.probability, Some(25));
        assert_eq!(data.temperature_c, 2.0);
    }

    #[test]
    fn wind_without_intensity_word() {
        let data = parser().extract("Mañana en Cádiz soleado con viento del sur a 15 mph");
        assert_eq!(data.city.as_deref(), Some("Cádiz"));
        assert_eq!(data.wind.as_deref(), Some("Viento"));
        assert_eq!(data.wind_direction.as_deref(), Some("Sur"));
        assert_eq!(data.wind_unit, Some(WindUnit::Mph));
    }
}
