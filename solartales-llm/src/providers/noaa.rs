//! NOAA SWPC space-weather feed
//!
//! Reads the current R (radio blackout), S (radiation storm) and G
//! (geomagnetic storm) scale levels from `noaa-scales.json` and turns the
//! strongest one into a story context.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use solartales_core::{Intensity, ProviderError, SpaceWeatherContext, SpaceWeatherEventType};

use crate::providers::{invalid_response, request_failed, transport_error};
use crate::SpaceWeatherProvider;

pub const DEFAULT_SCALES_URL: &str = "https://services.swpc.noaa.gov/products/noaa-scales.json";

const PROVIDER: &str = "noaa-swpc";

#[derive(Debug, Clone, Deserialize)]
struct ScaleReading {
    #[serde(rename = "Scale")]
    scale: Option<String>,
}

impl ScaleReading {
    fn level(&self) -> u8 {
        self.scale
            .as_deref()
            .and_then(|s| s.trim().parse::<u8>().ok())
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ScalesEntry {
    #[serde(rename = "R")]
    radio: Option<ScaleReading>,
    #[serde(rename = "S")]
    radiation: Option<ScaleReading>,
    #[serde(rename = "G")]
    geomagnetic: Option<ScaleReading>,
}

/// Current levels on the three NOAA scales.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NoaaScales {
    pub radio_blackout: u8,
    pub radiation_storm: u8,
    pub geomagnetic_storm: u8,
}

impl NoaaScales {
    /// Parse the `noaa-scales.json` document; key `"0"` holds current conditions.
    pub fn from_json(body: &str) -> Result<Self, ProviderError> {
        let entries: HashMap<String, ScalesEntry> = serde_json::from_str(body)
            .map_err(|e| invalid_response(PROVIDER, format!("Failed to parse scales: {}", e)))?;
        let current = entries
            .get("0")
            .ok_or_else(|| invalid_response(PROVIDER, "missing current scales entry"))?;

        let level =
            |reading: &Option<ScaleReading>| reading.as_ref().map_or(0, ScaleReading::level);
        Ok(Self {
            radio_blackout: level(&current.radio),
            radiation_storm: level(&current.radiation),
            geomagnetic_storm: level(&current.geomagnetic),
        })
    }

    /// Story context for the strongest active scale, or quiet conditions.
    pub fn to_context(&self) -> SpaceWeatherContext {
        // max_by_key keeps the last maximum, so ties favour geomagnetic storms
        let strongest = [
            (self.radiation_storm, SpaceWeatherEventType::SolarRadiationStorm),
            (self.radio_blackout, SpaceWeatherEventType::SolarFlare),
            (self.geomagnetic_storm, SpaceWeatherEventType::GeomagneticStorm),
        ]
        .into_iter()
        .max_by_key(|(level, _)| *level);

        let Some((level, event_type)) = strongest.filter(|(level, _)| *level > 0) else {
            return SpaceWeatherContext::quiet();
        };

        let (description, impacts) = match event_type {
            SpaceWeatherEventType::GeomagneticStorm => (
                format!("A G{} geomagnetic storm is shaking Earth's magnetic field.", level),
                vec![
                    "Auroras may be seen far from the poles".to_string(),
                    "Power grids and GPS can be disturbed".to_string(),
                ],
            ),
            SpaceWeatherEventType::SolarFlare => (
                format!("A solar flare caused an R{} radio blackout.", level),
                vec![
                    "Shortwave radio can fade on the sunlit side of Earth".to_string(),
                    "Pilots may lose high-frequency radio contact".to_string(),
                ],
            ),
            _ => (
                format!("An S{} solar radiation storm is under way.", level),
                vec![
                    "Astronauts take shelter in shielded areas".to_string(),
                    "Polar flights may be rerouted".to_string(),
                ],
            ),
        };

        SpaceWeatherContext {
            event_type,
            intensity: Intensity::from_noaa_scale(level),
            description,
            impacts,
        }
    }
}

/// Space-weather provider polling NOAA SWPC.
#[derive(Debug, Clone)]
pub struct NoaaSpaceWeatherProvider {
    client: Client,
    url: String,
    timeout_ms: u64,
}

impl NoaaSpaceWeatherProvider {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                request_failed(PROVIDER, 0, format!("Failed to build HTTP client: {}", e))
            })?;
        Ok(Self {
            client,
            url: url.into(),
            timeout_ms: timeout.as_millis() as u64,
        })
    }
}

#[async_trait]
impl SpaceWeatherProvider for NoaaSpaceWeatherProvider {
    async fn current_conditions(&self) -> Result<SpaceWeatherContext, ProviderError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, self.timeout_ms, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(request_failed(PROVIDER, status.as_u16(), "scales request failed"));
        }

        let body = response
            .text()
            .await
            .map_err(|e| invalid_response(PROVIDER, format!("Failed to read body: {}", e)))?;
        Ok(NoaaScales::from_json(&body)?.to_context())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUIET: &str = r#"{
        "-1": {"R": {"Scale": "3"}, "S": {"Scale": "0"}, "G": {"Scale": "0"}},
        "0": {"DateStamp": "2024-05-10", "R": {"Scale": "0", "Text": "none"}, "S": {"Scale": null}, "G": {"Scale": "0"}}
    }"#;

    const STORM: &str = r#"{
        "0": {"R": {"Scale": "1"}, "S": {"Scale": "2"}, "G": {"Scale": "4", "Text": "severe"}},
        "1": {"R": {"Scale": null}, "S": {"Scale": null}, "G": {"Scale": "3"}}
    }"#;

    #[test]
    fn test_quiet_scales_map_to_quiet_context() {
        let scales = NoaaScales::from_json(QUIET).unwrap();
        assert_eq!(scales, NoaaScales::default());
        assert_eq!(scales.to_context(), SpaceWeatherContext::quiet());
    }

    #[test]
    fn test_strongest_scale_wins() {
        let scales = NoaaScales::from_json(STORM).unwrap();
        assert_eq!(scales.geomagnetic_storm, 4);

        let context = scales.to_context();
        assert_eq!(context.event_type, SpaceWeatherEventType::GeomagneticStorm);
        assert_eq!(context.intensity, Intensity::High);
        assert!(context.description.contains("G4"));
        assert!(!context.impacts.is_empty());
    }

    #[test]
    fn test_radio_blackout_maps_to_flare() {
        let scales = NoaaScales {
            radio_blackout: 2,
            ..Default::default()
        };
        let context = scales.to_context();
        assert_eq!(context.event_type, SpaceWeatherEventType::SolarFlare);
        assert_eq!(context.intensity, Intensity::Moderate);
    }

    #[test]
    fn test_missing_current_entry_is_invalid() {
        assert!(matches!(
            NoaaScales::from_json(r#"{"1": {}}"#),
            Err(ProviderError::InvalidResponse { .. })
        ));
        assert!(NoaaScales::from_json("not json").is_err());
    }
}
