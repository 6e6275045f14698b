use std::collections::HashSet;

use serde::Deserialize;

use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ReconConfig {
    pub name: String,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default = "default_parallel")]
    pub parallel: bool,
    #[serde(default = "default_id_prefix")]
    pub id_prefix: String,
    #[serde(default)]
    pub genesis: GenesisConfig,
    #[serde(default)]
    pub tolerance: TolerancePassConfig,
    #[serde(default)]
    pub cooccurrence: CooccurrenceConfig,
    #[serde(default)]
    pub derived: Option<DerivedConfig>,
    #[serde(default)]
    pub grouping: Option<GroupingConfig>,
}

fn default_parallel() -> bool {
    true
}

fn default_id_prefix() -> String {
    "PC".into()
}

/// Which matcher family a run uses.
///
/// `PortCall` treats `left` as openings and `right` as closings of the same visits.
/// `CrossDataset` links two independently keyed datasets (`left` = A, `right` = B).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    PortCall,
    CrossDataset,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PortCall => write!(f, "port_call"),
            Self::CrossDataset => write!(f, "cross_dataset"),
        }
    }
}

// ---------------------------------------------------------------------------
// Genesis
// ---------------------------------------------------------------------------

/// Confidence thresholds for opening → closing pairs, in elapsed days.
#[derive(Debug, Clone, Deserialize)]
pub struct GenesisConfig {
    #[serde(default = "default_high_max_days")]
    pub high_max_days: f64,
    #[serde(default = "default_medium_max_days")]
    pub medium_max_days: f64,
}

fn default_high_max_days() -> f64 {
    15.0
}

fn default_medium_max_days() -> f64 {
    45.0
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            high_max_days: default_high_max_days(),
            medium_max_days: default_medium_max_days(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tolerance passes
// ---------------------------------------------------------------------------

/// Upper bound on any day window (tolerance pass or co-occurrence window), about a century.
pub const MAX_WINDOW_DAYS: i64 = 36_500;

#[derive(Debug, Clone, Deserialize)]
pub struct TolerancePassConfig {
    /// Maximum absolute day offset per pass, widening.
    #[serde(default = "default_passes")]
    pub passes: Vec<i64>,
}

fn default_passes() -> Vec<i64> {
    vec![2, 4, 7]
}

impl Default for TolerancePassConfig {
    fn default() -> Self {
        Self {
            passes: default_passes(),
        }
    }
}

// ---------------------------------------------------------------------------
// Co-occurrence
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CooccurrenceConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_window_days")]
    pub window_days: i64,
    #[serde(default = "default_tower_categories")]
    pub tower_categories: Vec<String>,
    #[serde(default = "default_towed_categories")]
    pub towed_categories: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

fn default_window_days() -> i64 {
    1
}

fn default_tower_categories() -> Vec<String> {
    ["TUG", "PUSH BOAT", "TUG/SUPPLY OFFSHORE SUPPORT"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_towed_categories() -> Vec<String> {
    [
        "DECK BARGE",
        "OTHER TANK BARGE",
        "DRY CARGO BARGE",
        "OTHER DRY CARGO BARGE NEI",
        "COVERED DRY CARGO BARGE",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for CooccurrenceConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            window_days: default_window_days(),
            tower_categories: default_tower_categories(),
            towed_categories: default_towed_categories(),
        }
    }
}

/// Which leg of a composite vessel a category describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leg {
    Tower,
    Towed,
}

impl CooccurrenceConfig {
    /// Classify a category against the vocabularies, ignoring case and surrounding whitespace.
    pub fn leg_of(&self, category: Option<&str>) -> Option<Leg> {
        let category = category?.trim();
        if category.is_empty() {
            return None;
        }
        let hit = |vocab: &[String]| vocab.iter().any(|v| v.trim().eq_ignore_ascii_case(category));
        if hit(&self.tower_categories) {
            Some(Leg::Tower)
        } else if hit(&self.towed_categories) {
            Some(Leg::Towed)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Derived fields
// ---------------------------------------------------------------------------

/// Payload field names feeding the draft derivation.
#[derive(Debug, Clone, Deserialize)]
pub struct DerivedConfig {
    pub draft_ft: String,
    pub draft_in: String,
    pub max_draft_ft: String,
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

/// Collapses B rows that describe the same call (one manifest row per shipment) into one
/// record before cross-dataset matching. Rows agree on a call when their vessel name,
/// location, calendar date and every `key_fields` payload value are equal.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupingConfig {
    #[serde(default)]
    pub key_fields: Vec<String>,
    #[serde(default = "default_group_id_prefix")]
    pub id_prefix: String,
    /// Numeric payload fields totalled across the group as `<field>_total`.
    #[serde(default)]
    pub sum_fields: Vec<String>,
    /// Payload fields listed as sorted distinct values as `<field>_concat`.
    #[serde(default)]
    pub concat_fields: Vec<String>,
}

fn default_group_id_prefix() -> String {
    "VOY".into()
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            key_fields: Vec::new(),
            id_prefix: default_group_id_prefix(),
            sum_fields: Vec::new(),
            concat_fields: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// A config with every section at its default.
    pub fn named(name: impl Into<String>, mode: Mode) -> Self {
        Self {
            name: name.into(),
            mode,
            parallel: default_parallel(),
            id_prefix: default_id_prefix(),
            genesis: GenesisConfig::default(),
            tolerance: TolerancePassConfig::default(),
            cooccurrence: CooccurrenceConfig::default(),
            derived: None,
            grouping: None,
        }
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.name.trim().is_empty() {
            return Err(ReconError::ConfigValidation("name must not be empty".into()));
        }
        if self.id_prefix.trim().is_empty() {
            return Err(ReconError::ConfigValidation(
                "id_prefix must not be empty".into(),
            ));
        }

        let g = &self.genesis;
        if !(g.high_max_days > 0.0 && g.high_max_days <= g.medium_max_days) {
            return Err(ReconError::ConfigValidation(format!(
                "genesis thresholds must satisfy 0 < high_max_days <= medium_max_days, got {} / {}",
                g.high_max_days, g.medium_max_days
            )));
        }

        let passes = &self.tolerance.passes;
        if passes.is_empty() {
            return Err(ReconError::ConfigValidation(
                "tolerance.passes must not be empty".into(),
            ));
        }
        if let Some(bad) = passes.iter().find(|&&p| p <= 0) {
            return Err(ReconError::ConfigValidation(format!(
                "tolerance.passes must be positive, got {bad}"
            )));
        }
        if let Some(bad) = passes.iter().find(|&&p| p > MAX_WINDOW_DAYS) {
            return Err(ReconError::ConfigValidation(format!(
                "tolerance.passes must not exceed {MAX_WINDOW_DAYS} days, got {bad}"
            )));
        }
        if passes.windows(2).any(|w| w[1] <= w[0]) {
            return Err(ReconError::ConfigValidation(format!(
                "tolerance.passes must be strictly increasing, got {passes:?}"
            )));
        }

        let co = &self.cooccurrence;
        if co.window_days < 0 {
            return Err(ReconError::ConfigValidation(format!(
                "cooccurrence.window_days must not be negative, got {}",
                co.window_days
            )));
        }
        if co.window_days > MAX_WINDOW_DAYS {
            return Err(ReconError::ConfigValidation(format!(
                "cooccurrence.window_days must not exceed {MAX_WINDOW_DAYS}, got {}",
                co.window_days
            )));
        }
        let towers: HashSet<String> = co
            .tower_categories
            .iter()
            .map(|c| c.trim().to_ascii_uppercase())
            .collect();
        if let Some(shared) = co
            .towed_categories
            .iter()
            .find(|c| towers.contains(&c.trim().to_ascii_uppercase()))
        {
            return Err(ReconError::ConfigValidation(format!(
                "category '{shared}' is listed as both tower and towed"
            )));
        }

        if let Some(grouping) = &self.grouping {
            if self.mode != Mode::CrossDataset {
                return Err(ReconError::ConfigValidation(
                    "grouping is only supported in cross_dataset mode".into(),
                ));
            }
            if grouping.id_prefix.trim().is_empty() {
                return Err(ReconError::ConfigValidation(
                    "grouping.id_prefix must not be empty".into(),
                ));
            }
            if let Some(shared) = grouping
                .sum_fields
                .iter()
                .find(|f| grouping.concat_fields.contains(f))
            {
                return Err(ReconError::ConfigValidation(format!(
                    "grouping field '{shared}' is listed in both sum_fields and concat_fields"
                )));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
name = "Minimal"
"#;

    const FULL: &str = r#"
name = "USACE 2023 port calls"
mode = "cross_dataset"
parallel = false
id_prefix = "EX"

[genesis]
high_max_days = 10.0
medium_max_days = 30.0

[tolerance]
passes = [1, 3]

[cooccurrence]
enabled = false
window_days = 2
tower_categories = ["TUG"]
towed_categories = ["DECK BARGE"]

[derived]
draft_ft = "DRAFT_FT"
draft_in = "DRAFT_IN"
max_draft_ft = "Vessel_Dwt_Draft_ft"
"#;

    #[test]
    fn parse_minimal_uses_defaults() {
        let config = ReconConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(config.name, "Minimal");
        assert_eq!(config.mode, Mode::PortCall);
        assert!(config.parallel);
        assert_eq!(config.id_prefix, "PC");
        assert_eq!(config.genesis.high_max_days, 15.0);
        assert_eq!(config.genesis.medium_max_days, 45.0);
        assert_eq!(config.tolerance.passes, vec![2, 4, 7]);
        assert!(config.cooccurrence.enabled);
        assert_eq!(config.cooccurrence.window_days, 1);
        assert_eq!(config.cooccurrence.tower_categories.len(), 3);
        assert_eq!(config.cooccurrence.towed_categories.len(), 5);
        assert!(config.derived.is_none());
    }

    #[test]
    fn parse_full() {
        let config = ReconConfig::from_toml(FULL).unwrap();
        assert_eq!(config.mode, Mode::CrossDataset);
        assert!(!config.parallel);
        assert_eq!(config.id_prefix, "EX");
        assert_eq!(config.genesis.high_max_days, 10.0);
        assert_eq!(config.tolerance.passes, vec![1, 3]);
        assert!(!config.cooccurrence.enabled);
        assert_eq!(config.cooccurrence.window_days, 2);
        let derived = config.derived.unwrap();
        assert_eq!(derived.max_draft_ft, "Vessel_Dwt_Draft_ft");
    }

    #[test]
    fn named_matches_minimal_toml() {
        let named = ReconConfig::named("Minimal", Mode::PortCall);
        let parsed = ReconConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(named.id_prefix, parsed.id_prefix);
        assert_eq!(named.tolerance.passes, parsed.tolerance.passes);
        assert!(named.validate().is_ok());
    }

    #[test]
    fn reject_missing_name() {
        let err = ReconConfig::from_toml("mode = \"port_call\"").unwrap_err();
        assert!(matches!(err, ReconError::ConfigParse(_)));
    }

    #[test]
    fn reject_unknown_mode() {
        let err = ReconConfig::from_toml("name = \"x\"\nmode = \"portcall\"").unwrap_err();
        assert!(matches!(err, ReconError::ConfigParse(_)));
    }

    #[test]
    fn reject_blank_name_and_prefix() {
        let err = ReconConfig::from_toml("name = \"  \"").unwrap_err();
        assert!(err.to_string().contains("name"));

        let err = ReconConfig::from_toml("name = \"x\"\nid_prefix = \"\"").unwrap_err();
        assert!(err.to_string().contains("id_prefix"));
    }

    #[test]
    fn reject_bad_passes() {
        for passes in ["[]", "[0, 2]", "[2, 2, 7]", "[4, 2]"] {
            let input = format!("name = \"x\"\n[tolerance]\npasses = {passes}\n");
            let err = ReconConfig::from_toml(&input).unwrap_err();
            assert!(
                matches!(err, ReconError::ConfigValidation(_)),
                "passes {passes} should be rejected"
            );
        }
    }

    #[test]
    fn reject_unbounded_windows() {
        let input = "name = \"x\"\n[tolerance]\npasses = [2, 100000000]\n";
        let err = ReconConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("must not exceed"), "{err}");

        let input = format!("name = \"x\"\n[tolerance]\npasses = [2, {MAX_WINDOW_DAYS}]\n");
        assert!(ReconConfig::from_toml(&input).is_ok());

        let input = "name = \"x\"\n[cooccurrence]\nwindow_days = 100000000\n";
        let err = ReconConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("window_days"), "{err}");
    }

    #[test]
    fn reject_inverted_genesis_thresholds() {
        let input = "name = \"x\"\n[genesis]\nhigh_max_days = 50.0\nmedium_max_days = 45.0\n";
        let err = ReconConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("high_max_days"));

        let input = "name = \"x\"\n[genesis]\nhigh_max_days = 0.0\n";
        assert!(ReconConfig::from_toml(input).is_err());
    }

    #[test]
    fn reject_overlapping_vocabularies() {
        let input = r#"
name = "x"
[cooccurrence]
tower_categories = ["TUG", "Deck Barge"]
towed_categories = ["DECK BARGE"]
"#;
        let err = ReconConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("both tower and towed"));
    }

    #[test]
    fn leg_lookup_is_case_insensitive() {
        let co = CooccurrenceConfig::default();
        assert_eq!(co.leg_of(Some("tug")), Some(Leg::Tower));
        assert_eq!(co.leg_of(Some("  Push Boat ")), Some(Leg::Tower));
        assert_eq!(co.leg_of(Some("DECK BARGE")), Some(Leg::Towed));
        assert_eq!(co.leg_of(Some("BULK CARRIER")), None);
        assert_eq!(co.leg_of(Some("")), None);
        assert_eq!(co.leg_of(None), None);
    }

    #[test]
    fn parse_grouping_section() {
        let input = r#"
name = "exports"
mode = "cross_dataset"

[grouping]
key_fields = ["Carrier"]
sum_fields = ["Tons"]
concat_fields = ["Commodity"]
"#;
        let config = ReconConfig::from_toml(input).unwrap();
        let grouping = config.grouping.unwrap();
        assert_eq!(grouping.id_prefix, "VOY");
        assert_eq!(grouping.key_fields, vec!["Carrier"]);
        assert_eq!(grouping.sum_fields, vec!["Tons"]);
        assert!(ReconConfig::from_toml(MINIMAL).unwrap().grouping.is_none());
    }

    #[test]
    fn reject_grouping_outside_cross_dataset() {
        let err = ReconConfig::from_toml("name = \"x\"\n[grouping]\n").unwrap_err();
        assert!(err.to_string().contains("cross_dataset"));

        let input = "name = \"x\"\nmode = \"cross_dataset\"\n[grouping]\nsum_fields = [\"Tons\"]\nconcat_fields = [\"Tons\"]\n";
        let err = ReconConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("Tons"));
    }
}
