//! Story records and the space-weather snapshot they were written from.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::subject::{AgeGroup, Subject};
use crate::Timestamp;

/// Opaque story identifier: generation millis, subject, short random suffix.
pub type StoryId = String;

/// Kind of space-weather event driving a story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum SpaceWeatherEventType {
    SolarFlare,
    GeomagneticStorm,
    SolarRadiationStorm,
    CoronalMassEjection,
    /// Nothing notable; the steady solar wind.
    SolarWind,
}

impl SpaceWeatherEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpaceWeatherEventType::SolarFlare => "solar_flare",
            SpaceWeatherEventType::GeomagneticStorm => "geomagnetic_storm",
            SpaceWeatherEventType::SolarRadiationStorm => "solar_radiation_storm",
            SpaceWeatherEventType::CoronalMassEjection => "coronal_mass_ejection",
            SpaceWeatherEventType::SolarWind => "solar_wind",
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            SpaceWeatherEventType::SolarFlare => "a solar flare",
            SpaceWeatherEventType::GeomagneticStorm => "a geomagnetic storm",
            SpaceWeatherEventType::SolarRadiationStorm => "a solar radiation storm",
            SpaceWeatherEventType::CoronalMassEjection => "a coronal mass ejection",
            SpaceWeatherEventType::SolarWind => "a calm solar wind",
        }
    }
}

/// Event strength, ordered from weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    Low,
    Moderate,
    High,
    Extreme,
}

impl Intensity {
    /// Map a NOAA scale level (0-5) onto an intensity bucket.
    pub fn from_noaa_scale(level: u8) -> Self {
        match level {
            0 | 1 => Intensity::Low,
            2 => Intensity::Moderate,
            3 | 4 => Intensity::High,
            _ => Intensity::Extreme,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Intensity::Low => "low",
            Intensity::Moderate => "moderate",
            Intensity::High => "high",
            Intensity::Extreme => "extreme",
        }
    }
}

/// Snapshot of conditions used as generation input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SpaceWeatherContext {
    pub event_type: SpaceWeatherEventType,
    pub intensity: Intensity,
    pub description: String,
    pub impacts: Vec<String>,
}

impl SpaceWeatherContext {
    /// Default condition used when the data provider is unreachable.
    pub fn quiet() -> Self {
        Self {
            event_type: SpaceWeatherEventType::SolarWind,
            intensity: Intensity::Low,
            description: "The Sun is calm today and a gentle solar wind flows past Earth."
                .to_string(),
            impacts: vec![
                "Faint auroras near the poles".to_string(),
                "Satellites and radios work normally".to_string(),
            ],
        }
    }
}

/// Where a served story came from. Observability only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "kebab-case")]
pub enum StoryOrigin {
    Placeholder,
    Cache,
    FreshlyGenerated,
    Fallback,
}

impl StoryOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoryOrigin::Placeholder => "placeholder",
            StoryOrigin::Cache => "cache",
            StoryOrigin::FreshlyGenerated => "freshly-generated",
            StoryOrigin::Fallback => "fallback",
        }
    }
}

/// Raw provider output before it becomes a stored story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryDraft {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub educational_facts: Vec<String>,
}

/// A generated story. Records are replaced, never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct GeneratedStory {
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub id: StoryId,
    pub subject: Subject,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_group: Option<AgeGroup>,
    pub title: String,
    pub body: String,
    pub educational_facts: Vec<String>,
    pub context: SpaceWeatherContext,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub generated_at: Timestamp,
    pub origin: StoryOrigin,
}

impl GeneratedStory {
    /// Build a freshly generated story from provider output.
    pub fn from_draft(
        subject: Subject,
        age_group: Option<AgeGroup>,
        draft: StoryDraft,
        context: SpaceWeatherContext,
        generated_at: Timestamp,
    ) -> Self {
        let suffix = Uuid::now_v7().simple().to_string();
        let id = format!(
            "{}-{}-{}",
            generated_at.timestamp_millis(),
            subject,
            &suffix[suffix.len() - 8..]
        );

        Self {
            id,
            subject,
            age_group,
            title: draft.title,
            body: draft.body,
            educational_facts: draft.educational_facts,
            context,
            generated_at,
            origin: StoryOrigin::FreshlyGenerated,
        }
    }

    /// Copy of this story tagged with the path it was served through.
    pub fn served_as(&self, origin: StoryOrigin) -> Self {
        Self {
            origin,
            ..self.clone()
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.origin == StoryOrigin::Placeholder
    }
}
