use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Where the bar folder is rendered relative to the other-folder list.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Display, AsRefStr, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BarPosition {
    #[default]
    Top,
    Bottom,
}

/// Drop band geometry.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(default)]
pub struct DropZoneConfig {
    /// Fraction of a folder row (along its axis) reserved at each edge for
    /// before/after drops; the remaining middle band drops into the folder.
    pub edge_fraction: f64,
    /// Distance the pointer must leave a resolved zone by before it is re-resolved.
    pub hysteresis_px: f64,
}

impl Default for DropZoneConfig {
    fn default() -> Self {
        Self {
            edge_fraction: 0.25,
            hysteresis_px: 4.0,
        }
    }
}

impl DropZoneConfig {
    /// Clamp stored values into a usable range; a zero-width middle band would
    /// make folders unreachable as drop targets.
    pub fn sanitized(self) -> Self {
        let edge_fraction = if self.edge_fraction.is_finite() {
            self.edge_fraction.clamp(0.05, 0.45)
        } else {
            Self::default().edge_fraction
        };
        let hysteresis_px = if self.hysteresis_px.is_finite() {
            self.hysteresis_px.max(0.0)
        } else {
            Self::default().hysteresis_px
        };
        Self {
            edge_fraction,
            hysteresis_px,
        }
    }
}

/// Reserved ids of the fixed top-level folders, used when the store does not
/// tag them with a folder type. Defaults match Chromium.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct TopLevelIds {
    pub bar: String,
    pub other: String,
}

impl Default for TopLevelIds {
    fn default() -> Self {
        Self {
            bar: "1".to_string(),
            other: "2".to_string(),
        }
    }
}

/// Read-only panel settings. Every field has a default so partially stored
/// settings keep loading.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PanelSettings {
    pub case_sensitive: bool,
    pub bar_position: BarPosition,
    pub drop_zones: DropZoneConfig,
    pub search_separator: String,
    pub top_level: TopLevelIds,
}

impl Default for PanelSettings {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            bar_position: BarPosition::Top,
            drop_zones: DropZoneConfig::default(),
            search_separator: " / ".to_string(),
            top_level: TopLevelIds::default(),
        }
    }
}

impl PanelSettings {
    pub fn from_json(json: &str) -> Option<Self> {
        let mut s: Self = serde_json::from_str(json).ok()?;
        s.drop_zones = s.drop_zones.sanitized();
        Some(s)
    }
}
