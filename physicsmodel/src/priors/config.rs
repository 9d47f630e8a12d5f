//! JSON description of the priors applied to a grid.
//!
//! ```json
//! {
//!   "age": {"name": "flat_log"},
//!   "mass": {"name": "kroupa"},
//!   "met": {"name": "flat"},
//!   "av": {"name": "lognormal", "mean": 0.5, "sigma": 0.3},
//!   "columns": {"age": "logA"}
//! }
//! ```
//!
//! Every quantity is optional; missing ones are left unweighted. The
//! `*_prior_model` spellings are accepted as well.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{PriorError, PriorModel, PriorSpec, Quantity};

/// Errors loading or validating a prior configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read prior configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid prior configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid prior for {field}: {source}")]
    Prior {
        field: &'static str,
        #[source]
        source: PriorError,
    },
}

/// Names of the grid columns each quantity is read from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    pub age: String,
    pub mass: String,
    #[serde(alias = "met")]
    pub metallicity: String,
    pub distance: String,
    pub av: String,
    pub rv: String,
    #[serde(rename = "f_A")]
    pub f_a: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            age: "logA".to_string(),
            mass: "M_ini".to_string(),
            metallicity: "Z".to_string(),
            distance: "distance".to_string(),
            av: "Av".to_string(),
            rv: "Rv".to_string(),
            f_a: "f_A".to_string(),
        }
    }
}

/// Prior model per physical quantity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriorConfig {
    #[serde(default, alias = "age_prior_model", skip_serializing_if = "Option::is_none")]
    pub age: Option<PriorSpec>,
    #[serde(default, alias = "mass_prior_model", skip_serializing_if = "Option::is_none")]
    pub mass: Option<PriorSpec>,
    #[serde(
        default,
        rename = "met",
        alias = "met_prior_model",
        alias = "metallicity",
        skip_serializing_if = "Option::is_none"
    )]
    pub metallicity: Option<PriorSpec>,
    #[serde(default, alias = "distance_prior_model", skip_serializing_if = "Option::is_none")]
    pub distance: Option<PriorSpec>,
    #[serde(default, alias = "av_prior_model", skip_serializing_if = "Option::is_none")]
    pub av: Option<PriorSpec>,
    #[serde(default, alias = "rv_prior_model", skip_serializing_if = "Option::is_none")]
    pub rv: Option<PriorSpec>,
    #[serde(
        default,
        rename = "f_A",
        alias = "fA_prior_model",
        skip_serializing_if = "Option::is_none"
    )]
    pub f_a: Option<PriorSpec>,
    #[serde(default)]
    pub columns: ColumnNames,
}

/// Validated models ready to apply, with the column each one weights
#[derive(Debug, Clone, Default)]
pub struct PriorPlan {
    pub age: Option<(String, PriorModel)>,
    pub mass: Option<(String, PriorModel)>,
    pub metallicity: Option<(String, PriorModel)>,
    pub distance: Option<(String, PriorModel)>,
    /// Dust priors in Av, Rv, f_A order
    pub dust: Vec<(String, PriorModel)>,
}

impl PriorConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration from a JSON file
    ///
    /// # Errors
    /// Returns error if the file cannot be read or the JSON is invalid. The
    /// priors themselves are checked by [`PriorConfig::validate`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let config: Self = serde_json::from_reader(reader)?;
        Ok(config)
    }

    /// Save the configuration as pretty-printed JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every prior against the allow-list of its quantity.
    ///
    /// # Returns
    /// The models paired with the grid column each one applies to
    pub fn validate(&self) -> Result<PriorPlan, ConfigError> {
        let build = |field: &'static str,
                     spec: &Option<PriorSpec>,
                     quantity: Quantity,
                     column: &str|
         -> Result<Option<(String, PriorModel)>, ConfigError> {
            spec.as_ref()
                .map(|spec| {
                    PriorModel::new(spec.clone(), quantity)
                        .map(|model| (column.to_string(), model))
                        .map_err(|source| ConfigError::Prior { field, source })
                })
                .transpose()
        };

        let cols = &self.columns;
        let dust = [
            build("av", &self.av, Quantity::Dust, &cols.av)?,
            build("rv", &self.rv, Quantity::Dust, &cols.rv)?,
            build("f_A", &self.f_a, Quantity::Dust, &cols.f_a)?,
        ];

        Ok(PriorPlan {
            age: build("age", &self.age, Quantity::Age, &cols.age)?,
            mass: build("mass", &self.mass, Quantity::Mass, &cols.mass)?,
            metallicity: build(
                "met",
                &self.metallicity,
                Quantity::Metallicity,
                &cols.metallicity,
            )?,
            distance: build("distance", &self.distance, Quantity::Distance, &cols.distance)?,
            dust: dust.into_iter().flatten().collect(),
        })
    }
}

impl PriorPlan {
    /// Whether no quantity has a prior
    pub fn is_empty(&self) -> bool {
        self.age.is_none()
            && self.mass.is_none()
            && self.metallicity.is_none()
            && self.distance.is_none()
            && self.dust.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::PriorKind;
    use tempfile::tempdir;

    const BEAST_STYLE: &str = r#"{
        "age": {"name": "bins_histo", "x": [6.0, 7.0, 8.0], "values": [1.0, 2.0]},
        "mass": {"name": "kroupa"},
        "met": {"name": "flat"},
        "distance": {"name": "flat", "amp": 2.0},
        "av": {"name": "two_lognormal", "mean1": 0.2, "mean2": 2.0,
               "sigma1": 1.0, "sigma2": 0.2, "N1_to_N2": 0.2},
        "rv": {"name": "lognormal", "mean": 3.1, "sigma": 0.1},
        "f_A": {"name": "exponential", "tau": 0.5}
    }"#;

    #[test]
    fn test_parse_all_quantities() {
        let config = PriorConfig::from_json_str(BEAST_STYLE).unwrap();
        assert_eq!(config.mass, Some(PriorSpec::Kroupa));
        assert_eq!(config.distance, Some(PriorSpec::Flat { amp: Some(2.0) }));
        assert_eq!(config.columns, ColumnNames::default());

        let plan = config.validate().unwrap();
        assert_eq!(plan.dust.len(), 3);
        assert_eq!(plan.dust[1].0, "Rv");
        let (column, model) = plan.age.unwrap();
        assert_eq!(column, "logA");
        assert_eq!(model.kind(), PriorKind::BinsHisto);
    }

    #[test]
    fn test_round_trip_keeps_spelling() {
        let config = PriorConfig::from_json_str(BEAST_STYLE).unwrap();
        let json = config.to_json_string().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["av"]["name"], "two_lognormal");
        assert_eq!(value["av"]["N1_to_N2"], 0.2);
        assert_eq!(value["f_A"]["tau"], 0.5);
        assert_eq!(value["met"]["name"], "flat");
        assert_eq!(value["age"]["values"], serde_json::json!([1.0, 2.0]));
        assert!(value["distance"].get("amp").is_some());
        assert!(value["met"].get("amp").is_none());

        assert_eq!(PriorConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_prior_model_aliases() {
        let config = PriorConfig::from_json_str(
            r#"{"age_prior_model": {"name": "flat_log"},
                "fA_prior_model": {"name": "flat"},
                "columns": {"age": "log_age"}}"#,
        )
        .unwrap();
        assert_eq!(config.age, Some(PriorSpec::FlatLog));
        assert_eq!(config.f_a, Some(PriorSpec::flat()));
        assert_eq!(config.columns.age, "log_age");
        assert_eq!(config.columns.mass, "M_ini");
    }

    #[test]
    fn test_validate_reports_field() {
        let config = PriorConfig::from_json_str(
            r#"{"mass": {"name": "lognormal", "mean": 1.0, "sigma": 0.1}}"#,
        )
        .unwrap();
        match config.validate() {
            Err(ConfigError::Prior { field, source }) => {
                assert_eq!(field, "mass");
                assert!(matches!(source, PriorError::NotAllowed { .. }));
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_empty_config() {
        let config = PriorConfig::from_json_str("{}").unwrap();
        assert!(config.validate().unwrap().is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("priors.json");
        let config = PriorConfig::from_json_str(BEAST_STYLE).unwrap();

        config.save(&path).unwrap();
        assert_eq!(PriorConfig::load(&path).unwrap(), config);
        assert!(matches!(
            PriorConfig::load(dir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));
    }
}
