use crate::config::AppConfig;
use crate::data::Layers;
use crate::processing::{process_arrow_lines, DistrictCounts};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const COUNTS_FILE: &str = "counts.json";
pub const ARROWS_FILE: &str = "arrows.geojson";
pub const LEGEND_FILE: &str = "legend.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Symbol {
    Dot,
    Line,
    Outline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegendEntry {
    pub label: &'static str,
    pub symbol: Symbol,
    pub color: &'static str,
}

/// When the loading overlay starts fading, and how long the fade lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OverlayTiming {
    pub delay_ms: u32,
    pub fade_ms: u32,
}

impl Default for OverlayTiming {
    fn default() -> Self {
        Self { delay_ms: 500, fade_ms: 300 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Legend {
    pub title: &'static str,
    pub entries: Vec<LegendEntry>,
    pub overlay: OverlayTiming,
}

impl Default for Legend {
    fn default() -> Self {
        Self {
            title: "Legend",
            entries: vec![
                LegendEntry { label: "Living Locations", symbol: Symbol::Dot, color: "blue" },
                LegendEntry { label: "Registration Locations", symbol: Symbol::Dot, color: "green" },
                LegendEntry { label: "Movement Connections", symbol: Symbol::Line, color: "#666" },
                LegendEntry { label: "District Boundaries", symbol: Symbol::Outline, color: "#232323" },
            ],
            overlay: OverlayTiming::default(),
        }
    }
}

/// Paths of the artifacts written by [`generate_outputs`].
#[derive(Debug, Clone)]
pub struct Outputs {
    pub counts: PathBuf,
    pub arrows: Option<PathBuf>,
    pub legend: PathBuf,
}

pub fn generate_outputs(config: &AppConfig, layers: &Layers) -> Result<Outputs> {
    let out_dir = &config.output.dir;
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory: {:?}", out_dir))?;

    let counts = DistrictCounts::initialize(
        layers.registrations.as_ref(),
        layers.residences.as_ref(),
        &config.input.district_property,
    );
    let counts_path = out_dir.join(COUNTS_FILE);
    write_json(&counts_path, &counts)?;
    info!("Wrote counts for {} districts to {:?}", counts.districts().len(), counts_path);

    let arrows = process_arrow_lines(layers.arrows.as_ref(), config.processing.shorten_percentage);
    let arrows_path = match arrows {
        Some(arrows) => {
            let path = out_dir.join(ARROWS_FILE);
            write_json(&path, &arrows)?;
            info!("Wrote {} movement arrows to {:?}", arrows.features.len(), path);
            Some(path)
        }
        None => None,
    };

    let legend_path = out_dir.join(LEGEND_FILE);
    write_json(&legend_path, &Legend::default())?;

    Ok(Outputs {
        counts: counts_path,
        arrows: arrows_path,
        legend: legend_path,
    })
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    fs::write(path, body).with_context(|| format!("Failed to write {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InputConfig, OutputConfig, ProcessingConfig, ServerConfig};
    use crate::data::parse_feature_collection;
    use serde_json::Value;

    fn config(dir: &Path) -> AppConfig {
        AppConfig {
            input: InputConfig {
                registrations: None,
                residences: None,
                arrows: None,
                districts: None,
                district_property: "district".to_string(),
            },
            processing: ProcessingConfig { shorten_percentage: Some(0.5) },
            output: OutputConfig { dir: dir.join("out") },
            server: ServerConfig { port: 0, static_dir: PathBuf::from(".") },
        }
    }

    fn read_json(path: &Path) -> Value {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn writes_all_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path());
        let points = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","properties":{"district":"3"},"geometry":{"type":"Point","coordinates":[0,0]}}
        ]}"#;
        let layers = Layers {
            registrations: Some(parse_feature_collection(points).unwrap()),
            residences: Some(parse_feature_collection(points).unwrap()),
            arrows: Some(parse_feature_collection(r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{},"geometry":{"type":"LineString","coordinates":[[0,0],[0,8]]}}
            ]}"#).unwrap()),
            districts: Vec::new(),
        };

        let outputs = generate_outputs(&config, &layers).unwrap();

        let counts = read_json(&outputs.counts);
        assert_eq!(counts["registrations"]["3"], 1);
        assert_eq!(counts["residents"]["3"], 1);

        let arrows = read_json(outputs.arrows.as_ref().unwrap());
        assert_eq!(arrows["features"][0]["geometry"]["coordinates"][1][1], 4.0);

        let legend = read_json(&outputs.legend);
        assert_eq!(legend["entries"].as_array().unwrap().len(), 4);
        assert_eq!(legend["entries"][2]["symbol"], "line");
        assert_eq!(legend["overlay"]["delay_ms"], 500);
    }

    #[test]
    fn missing_layers_still_write_counts_and_legend() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path());

        let outputs = generate_outputs(&config, &Layers::default()).unwrap();

        assert!(outputs.arrows.is_none());
        let counts = read_json(&outputs.counts);
        assert_eq!(counts["registrations"], serde_json::json!({}));
        assert!(outputs.legend.exists());
    }
}
