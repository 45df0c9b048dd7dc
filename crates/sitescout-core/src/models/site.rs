use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

// ============================================================================
// Project requirements
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum LandUse {
    Industrial,
    Commercial,
    Residential,
    Agricultural,
}

impl LandUse {
    pub const ALL: [LandUse; 4] = [
        LandUse::Industrial,
        LandUse::Commercial,
        LandUse::Residential,
        LandUse::Agricultural,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LandUse::Industrial => "Industrial",
            LandUse::Commercial => "Commercial",
            LandUse::Residential => "Residential",
            LandUse::Agricultural => "Agricultural",
        }
    }

    /// Case-insensitive parse of a land-use name.
    pub fn from_name(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|lu| lu.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequirementsError {
    #[error("Title is required")]
    MissingTitle,

    #[error("{field} must be a non-negative number")]
    Negative { field: &'static str },

    #[error("{field} must be between {min} and {max}")]
    OutOfRange {
        field: &'static str,
        min: f64,
        max: f64,
    },

    #[error("Select at least one preferred land use")]
    NoLandUse,
}

/// Constraints submitted to `POST /recommend-sites`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ProjectRequirements {
    pub title: String,
    pub budget_limit_usd_sqm: f64,
    pub max_road_dist_km: f64,
    pub max_slope_deg: f64,
    pub environmental_risk_tolerance: f64,
    pub preferred_land_use: Vec<LandUse>,
}

impl Default for ProjectRequirements {
    fn default() -> Self {
        Self {
            title: String::new(),
            budget_limit_usd_sqm: 100.0,
            max_road_dist_km: 5.0,
            max_slope_deg: 10.0,
            environmental_risk_tolerance: 0.5,
            preferred_land_use: vec![LandUse::Industrial, LandUse::Commercial],
        }
    }
}

impl ProjectRequirements {
    /// Check the same constraints the requirements form enforces.
    pub fn validate(&self) -> Result<(), RequirementsError> {
        if self.title.trim().is_empty() {
            return Err(RequirementsError::MissingTitle);
        }
        Self::check_non_negative("budget_limit_usd_sqm", self.budget_limit_usd_sqm)?;
        Self::check_non_negative("max_road_dist_km", self.max_road_dist_km)?;
        Self::check_range("max_slope_deg", self.max_slope_deg, 0.0, 90.0)?;
        Self::check_range(
            "environmental_risk_tolerance",
            self.environmental_risk_tolerance,
            0.0,
            1.0,
        )?;
        if self.preferred_land_use.is_empty() {
            return Err(RequirementsError::NoLandUse);
        }
        Ok(())
    }

    fn check_non_negative(field: &'static str, value: f64) -> Result<(), RequirementsError> {
        if value.is_finite() && value >= 0.0 {
            Ok(())
        } else {
            Err(RequirementsError::Negative { field })
        }
    }

    fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), RequirementsError> {
        if value.is_finite() && (min..=max).contains(&value) {
            Ok(())
        } else {
            Err(RequirementsError::OutOfRange { field, min, max })
        }
    }
}

// ============================================================================
// Recommendations
// ============================================================================

/// One candidate site. Column names follow the backend's registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(rename = "Site_Code")]
    pub site_code: Option<String>,
    #[serde(rename = "Latitude")]
    pub latitude: Option<f64>,
    #[serde(rename = "Longitude")]
    pub longitude: Option<f64>,
    #[serde(rename = "Land_Use")]
    pub land_use: Option<String>,
    #[serde(rename = "District")]
    pub district: Option<String>,
    #[serde(rename = "State_Key")]
    pub state_key: Option<String>,
    #[serde(rename = "Final_Suitability_Rank")]
    pub final_suitability_rank: Option<f64>,
    #[serde(rename = "AI_Predicted_Score")]
    pub ai_predicted_score: Option<f64>,
    #[serde(rename = "Suitability_Score")]
    pub suitability_score: Option<f64>,
    /// Remaining registry columns (land value, road distance, slope, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Recommendation {
    /// Best available score: model prediction, then final rank, then base suitability.
    pub fn score(&self) -> Option<f64> {
        [
            self.ai_predicted_score,
            self.final_suitability_rank,
            self.suitability_score,
        ]
        .into_iter()
        .flatten()
        .find(|v| v.is_finite())
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => Some((lat, lon)),
            _ => None,
        }
    }

    pub fn site_code_display(&self) -> &str {
        self.site_code.as_deref().unwrap_or("N/A")
    }

    /// Numeric registry column by name, e.g. `Land_Value_USD_sqm`.
    pub fn metric(&self, column: &str) -> Option<f64> {
        self.extra.get(column).and_then(Value::as_f64)
    }
}

/// Response of `POST /recommend-sites` and `GET /history/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResponse {
    #[serde(default, with = "crate::utils::time::option")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub analysis_user: Option<String>,
    #[serde(default)]
    pub recommendations: Vec<Recommendation>,
}

impl RecommendationResponse {
    /// Recommendations that carry a usable score, in backend order (best first).
    pub fn ranked(&self) -> Vec<&Recommendation> {
        self.recommendations
            .iter()
            .filter(|r| r.score().is_some())
            .collect()
    }

    pub fn top(&self) -> Option<&Recommendation> {
        self.ranked().into_iter().next()
    }

    pub fn analyst(&self) -> &str {
        self.user
            .as_deref()
            .or(self.analysis_user.as_deref())
            .unwrap_or("Unknown")
    }
}

// ============================================================================
// History
// ============================================================================

/// Entry of `GET /history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobHistory {
    pub id: String,
    pub title: String,
    #[serde(with = "crate::utils::time")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub requirements: Value,
    pub result_count: u32,
}

impl JobHistory {
    /// The stored requirements, if they still match the current schema.
    pub fn parsed_requirements(&self) -> Option<ProjectRequirements> {
        serde_json::from_value(self.requirements.clone()).ok()
    }
}
