use crate::catalog::find_category;
use crate::color::Rgb;
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub view: ViewConfig,
    #[serde(default)]
    pub projection: ProjectionConfig,
    #[serde(default)]
    pub scale: ScaleConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub topology: PathBuf,
    #[serde(default = "default_topology_object")]
    pub topology_object: String,
    pub name_property: String,
    pub code_property: Option<String>,
    pub votes: PathBuf,
    #[serde(default)]
    pub datasets: Vec<DatasetInput>,
}

/// Binds a catalog category to the CSV holding its counts.
#[derive(Debug, Deserialize, Clone)]
pub struct DatasetInput {
    pub category: String,
    pub csv: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ViewConfig {
    pub width: f64,
    pub height: f64,
    pub focus_scale: f64,
    pub legend_ticks: usize,
    pub no_data_color: String,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            width: 960.0,
            height: 500.0,
            focus_scale: 4.0,
            legend_ticks: 4,
            no_data_color: "#cccccc".to_string(),
        }
    }
}

impl ViewConfig {
    pub fn no_data(&self) -> Result<Rgb> {
        Rgb::from_hex(&self.no_data_color)
            .ok_or_else(|| anyhow!("Invalid no_data_color: {}", self.no_data_color))
    }
}

/// Albers conic equal-area parameters, in degrees.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ProjectionConfig {
    pub center: [f64; 2],
    pub rotate: [f64; 2],
    pub parallels: [f64; 2],
    pub scale: f64,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            center: [0.0, 55.4],
            rotate: [4.4, 0.0],
            parallels: [50.0, 60.0],
            scale: 6000.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScaleConfig {
    pub vote_exponent: f64,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self { vote_exponent: 0.75 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            static_dir: PathBuf::from("static"),
        }
    }
}

fn default_topology_object() -> String {
    "lad".to_string()
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config = Self::from_toml(&content)?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)
            .with_context(|| "Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for dataset in &self.input.datasets {
            if find_category(&dataset.category).is_none() {
                bail!("Unknown dataset category '{}'", dataset.category);
            }
            if !seen.insert(dataset.category.as_str()) {
                bail!("Dataset category '{}' configured twice", dataset.category);
            }
        }
        if !(self.view.width > 0.0 && self.view.height > 0.0) {
            bail!("View dimensions must be positive");
        }
        if !(self.view.focus_scale > 0.0) {
            bail!("focus_scale must be positive");
        }
        if !(self.scale.vote_exponent > 0.0) {
            bail!("vote_exponent must be positive");
        }
        let [p0, p1] = self.projection.parallels;
        if (p0 + p1).abs() < f64::EPSILON {
            bail!("Standard parallels must not be symmetric about the equator");
        }
        self.view.no_data()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [input]
        topology = "data/topo_uk.json"
        name_property = "LAD13NM"
        votes = "data/EU-referendum-result-data.csv"

        [[input.datasets]]
        category = "country_of_birth"
        csv = "data/country_of_birth.csv"
    "#;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = AppConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(config.input.topology_object, "lad");
        assert_eq!(config.input.code_property, None);
        assert_eq!(config.view.width, 960.0);
        assert_eq!(config.view.focus_scale, 4.0);
        assert_eq!(config.projection, ProjectionConfig::default());
        assert_eq!(config.scale.vote_exponent, 0.75);
        assert_eq!(config.input.datasets.len(), 1);
    }

    #[test]
    fn overrides_are_read() {
        let content = format!(
            "{}\n[scale]\nvote_exponent = 0.3333\n[view]\nwidth = 400.0\nheight = 300.0\n",
            MINIMAL
        );
        let config = AppConfig::from_toml(&content).unwrap();
        assert_eq!(config.scale.vote_exponent, 0.3333);
        assert_eq!(config.view.width, 400.0);
        assert_eq!(config.view.legend_ticks, 4);
    }

    #[test]
    fn unknown_category_is_rejected() {
        let content = MINIMAL.replace("country_of_birth", "favourite_colour");
        assert!(AppConfig::from_toml(&content).is_err());
    }

    #[test]
    fn duplicate_category_is_rejected() {
        let content = format!(
            "{}\n[[input.datasets]]\ncategory = \"country_of_birth\"\ncsv = \"other.csv\"\n",
            MINIMAL
        );
        assert!(AppConfig::from_toml(&content).is_err());
    }

    #[test]
    fn bad_exponent_is_rejected() {
        let content = format!("{}\n[scale]\nvote_exponent = 0.0\n", MINIMAL);
        assert!(AppConfig::from_toml(&content).is_err());
    }

    #[test]
    fn example_config_is_valid() {
        let config = AppConfig::from_toml(include_str!("../config.example.toml")).unwrap();
        assert_eq!(config.input.datasets.len(), 3);
        assert_eq!(config.input.code_property.as_deref(), Some("LAD13CD"));
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn load_from_file_reports_missing_file() {
        let err = AppConfig::load_from_file(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
