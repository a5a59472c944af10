use crate::config::AppConfig;
use crate::types::District;
use crate::processing::district_label;
use anyhow::{Context, Result, anyhow};
use geo::MultiPolygon;
use geojson::{FeatureCollection, GeoJson};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Every layer the dashboard needs. A layer that is not configured is `None`.
#[derive(Debug, Clone, Default)]
pub struct Layers {
    pub registrations: Option<FeatureCollection>,
    pub residences: Option<FeatureCollection>,
    pub arrows: Option<FeatureCollection>,
    pub districts: Vec<District>,
}

pub fn load_layers(config: &AppConfig) -> Result<Layers> {
    info!("Loading data...");

    let registrations = load_optional_layer("registrations", config.input.registrations.as_deref())?;
    let residences = load_optional_layer("residences", config.input.residences.as_deref())?;
    let arrows = load_optional_layer("arrows", config.input.arrows.as_deref())?;

    let districts = match &config.input.districts {
        Some(path) => load_districts(path, &config.input.district_property)?,
        None => Vec::new(),
    };

    Ok(Layers {
        registrations,
        residences,
        arrows,
        districts,
    })
}

fn load_optional_layer(name: &str, path: Option<&Path>) -> Result<Option<FeatureCollection>> {
    match path {
        Some(path) => {
            let collection = load_feature_collection(path)?;
            info!(layer = name, features = collection.features.len(), "Loaded layer from {:?}", path);
            Ok(Some(collection))
        }
        None => {
            warn!(layer = name, "Layer not configured");
            Ok(None)
        }
    }
}

/// Load a FeatureCollection from GeoJSON or from a qgis2web `.js` layer
/// (`var json_Layer = {...};`).
pub fn load_feature_collection(path: &Path) -> Result<FeatureCollection> {
    let extension = path.extension()
        .and_then(|e| e.to_str())
        .map(|s: &str| s.to_lowercase())
        .ok_or_else(|| anyhow!("Input layer {:?} has no extension", path))?;

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read layer: {:?}", path))?;

    let json = match extension.as_str() {
        "json" | "geojson" => content.as_str(),
        "js" => strip_js_assignment(&content)
            .ok_or_else(|| anyhow!("{:?} is not a `var name = {{...}}` layer file", path))?,
        _ => return Err(anyhow!("Unsupported layer format: {}", extension)),
    };

    parse_feature_collection(json).with_context(|| format!("Failed to parse layer: {:?}", path))
}

pub fn parse_feature_collection(json: &str) -> Result<FeatureCollection> {
    let geojson: GeoJson = json.parse().context("Failed to parse GeoJSON")?;
    match geojson {
        GeoJson::FeatureCollection(fc) => Ok(fc),
        _ => Err(anyhow!("GeoJSON must be a FeatureCollection")),
    }
}

/// Pull the object literal out of `var json_Name = { ... };`.
fn strip_js_assignment(content: &str) -> Option<&str> {
    let (_, rhs) = content.split_once('=')?;
    let body = rhs.trim().trim_end_matches(';').trim_end();
    body.starts_with('{').then_some(body)
}

/// Load council district boundaries. Features without a usable district
/// label or without polygon geometry are skipped.
pub fn load_districts(path: &Path, key: &str) -> Result<Vec<District>> {
    let collection = load_feature_collection(path)?;
    let districts = districts_from_collection(collection, key)?;
    info!("Loaded {} district boundaries", districts.len());
    Ok(districts)
}

pub fn districts_from_collection(collection: FeatureCollection, key: &str) -> Result<Vec<District>> {
    let mut districts = Vec::new();

    for feature in collection.features {
        let id = feature.properties.as_ref()
            .and_then(|props| props.get(key))
            .and_then(district_label);

        let Some(id) = id else {
            continue;
        };

        let geometry = match feature.geometry {
            Some(geom) => {
                let valid_geo: geo::Geometry<f64> = geom.value.try_into()
                    .map_err(|e| anyhow!("Failed to convert district {} geometry: {:?}", id, e))?;

                match valid_geo {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => continue,
                }
            },
            None => continue,
        };

        districts.push(District { id, geometry });
    }

    Ok(districts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    const POINTS: &str = r#"{"type":"FeatureCollection","features":[
        {"type":"Feature","properties":{"district":"1"},"geometry":{"type":"Point","coordinates":[-112.1,33.4]}},
        {"type":"Feature","properties":{"district":"2"},"geometry":{"type":"Point","coordinates":[-112.0,33.5]}}
    ]}"#;

    fn write_layer(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_geojson_layer() {
        let file = write_layer(".geojson", POINTS);
        let fc = load_feature_collection(file.path()).unwrap();
        assert_eq!(fc.features.len(), 2);
    }

    #[test]
    fn loads_qgis2web_js_layer() {
        let file = write_layer(".js", &format!("var json_Lineayer_regloc_4 = {};\n", POINTS));
        let fc = load_feature_collection(file.path()).unwrap();
        assert_eq!(fc.features.len(), 2);
    }

    #[test]
    fn rejects_js_without_assignment() {
        let file = write_layer(".js", "console.log('hi')");
        assert!(load_feature_collection(file.path()).is_err());
    }

    #[test]
    fn rejects_unknown_extension() {
        let file = write_layer(".csv", "district\n1\n");
        let err = load_feature_collection(file.path()).unwrap_err();
        assert!(err.to_string().contains("Unsupported layer format"));
    }

    #[test]
    fn rejects_non_collection_geojson() {
        let err = parse_feature_collection(r#"{"type":"Point","coordinates":[0,0]}"#).unwrap_err();
        assert!(err.to_string().contains("FeatureCollection"));
    }

    #[test]
    fn strip_js_assignment_handles_whitespace() {
        assert_eq!(strip_js_assignment("var a =\n  {\"x\": 1} ;\n"), Some("{\"x\": 1}"));
        assert_eq!(strip_js_assignment("var a = 5;"), None);
    }

    #[test]
    fn districts_keep_polygons_with_labels() {
        let fc = parse_feature_collection(r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","properties":{"district":4},"geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,1],[0,0]]]}},
            {"type":"Feature","properties":{"district":""},"geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}},
            {"type":"Feature","properties":{"district":"5"},"geometry":{"type":"Point","coordinates":[0,0]}},
            {"type":"Feature","properties":{"district":"6"},"geometry":null}
        ]}"#).unwrap();

        let districts = districts_from_collection(fc, "district").unwrap();

        assert_eq!(districts.len(), 1);
        assert_eq!(districts[0].id, "4");
        assert_eq!(districts[0].geometry.0.len(), 1);
    }
}
