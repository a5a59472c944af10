use crate::types::{DistrictCountMap, DistrictId};
use geo::Coord;
use geojson::{FeatureCollection, Geometry, Position, Value};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{error, info};

pub const DEFAULT_DISTRICT_PROPERTY: &str = "district";

/// Share of the line kept when no percentage is given (85%).
pub const DEFAULT_SHORTEN_PERCENTAGE: f64 = 0.85;

/// Count features per council district, reading the default `district`
/// property. Configured keys go through [`count_by_property`].
pub fn count_by_district(collection: Option<&FeatureCollection>) -> DistrictCountMap {
    count_by_property(collection, DEFAULT_DISTRICT_PROPERTY)
}

/// Count features per value of `key`. Features without properties, or whose
/// value is empty, zero or null, contribute nothing.
pub fn count_by_property(collection: Option<&FeatureCollection>, key: &str) -> DistrictCountMap {
    let mut counts = DistrictCountMap::new();

    let Some(collection) = collection else {
        return counts;
    };

    for feature in &collection.features {
        let label = feature
            .properties
            .as_ref()
            .and_then(|props| props.get(key))
            .and_then(district_label);

        if let Some(district) = label {
            *counts.entry(district).or_insert(0) += 1;
        }
    }

    counts
}

/// Turn a property value into a district label. Falsy values (`""`, `0`,
/// `null`, `false`) are rejected, as are values that cannot name a district.
pub fn district_label(value: &serde_json::Value) -> Option<DistrictId> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return (i != 0).then(|| i.to_string());
            }
            if let Some(u) = n.as_u64() {
                return Some(u.to_string());
            }
            let f = n.as_f64()?;
            if f == 0.0 {
                None
            } else if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                // 3.0 and 3 name the same district
                Some((f as i64).to_string())
            } else {
                Some(n.to_string())
            }
        }
        _ => None,
    }
}

/// Shorten a segment so it ends at `percentage` of the way from the first
/// point to the second. Only the first two points are used. Inputs with
/// fewer than two usable points come back unchanged. A missing or falsy
/// `percentage` means 85%. It is not clamped: values outside (0, 1]
/// extrapolate past the end or behind the start.
pub fn shorten_line_coordinates(coords: &[Position], percentage: Option<f64>) -> Vec<Position> {
    let [start, end, ..] = coords else {
        return coords.to_vec();
    };

    let (Some(a), Some(b)) = (planar(start), planar(end)) else {
        return coords.to_vec();
    };

    let new_end = a + (b - a) * effective_percentage(percentage);

    vec![start.clone(), vec![new_end.x, new_end.y]]
}

fn planar(position: &Position) -> Option<Coord<f64>> {
    match position.as_slice() {
        [x, y, ..] => Some(Coord { x: *x, y: *y }),
        _ => None,
    }
}

/// The percentage actually applied: a missing, zero or NaN value falls back
/// to [`DEFAULT_SHORTEN_PERCENTAGE`].
pub fn effective_percentage(percentage: Option<f64>) -> f64 {
    match percentage {
        Some(p) if p != 0.0 && !p.is_nan() => p,
        _ => DEFAULT_SHORTEN_PERCENTAGE,
    }
}

/// Copy `collection` and shorten every LineString in the copy. The input is
/// left untouched; an absent input stays absent.
pub fn process_arrow_lines(
    collection: Option<&FeatureCollection>,
    percentage: Option<f64>,
) -> Option<FeatureCollection> {
    let collection = collection?;

    let mut processed = collection.clone();

    processed.features.par_iter_mut().for_each(|feature| {
        if let Some(Geometry { value: Value::LineString(coords), .. }) = feature.geometry.as_mut() {
            *coords = shorten_line_coordinates(coords, percentage);
        }
    });

    Some(processed)
}

/// Latest registration and residence counts, readable per district.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DistrictCounts {
    registrations: DistrictCountMap,
    residents: DistrictCountMap,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistrictSummary {
    pub district: DistrictId,
    pub registrations: u32,
    pub residents: u32,
    /// Registrations minus residents.
    pub net_movement: i64,
}

impl DistrictCounts {
    /// Aggregate both layers. Nothing is counted unless both are loaded.
    pub fn initialize(
        registrations: Option<&FeatureCollection>,
        residences: Option<&FeatureCollection>,
        key: &str,
    ) -> Self {
        let Some(registrations) = registrations else {
            error!("Registration data not loaded, district counts left empty");
            return Self::default();
        };
        let Some(residences) = residences else {
            error!("Residence data not loaded, district counts left empty");
            return Self::default();
        };

        let counts = Self {
            registrations: count_by_property(Some(registrations), key),
            residents: count_by_property(Some(residences), key),
        };

        info!(
            registration_features = registrations.features.len(),
            residence_features = residences.features.len(),
            "District counts initialized"
        );
        info!(counts = ?counts.registrations, "Registration counts by district");
        info!(counts = ?counts.residents, "Resident counts by district");

        counts
    }

    pub fn registration_count(&self, district: &str) -> u32 {
        self.registrations.get(district).copied().unwrap_or(0)
    }

    pub fn resident_count(&self, district: &str) -> u32 {
        self.residents.get(district).copied().unwrap_or(0)
    }

    pub fn registrations(&self) -> &DistrictCountMap {
        &self.registrations
    }

    pub fn residents(&self) -> &DistrictCountMap {
        &self.residents
    }

    /// Every district seen in either layer, sorted.
    pub fn districts(&self) -> Vec<DistrictId> {
        let mut districts: Vec<DistrictId> = self
            .registrations
            .keys()
            .chain(self.residents.keys())
            .cloned()
            .collect();
        districts.sort();
        districts.dedup();
        districts
    }

    pub fn summary(&self, district: &str) -> DistrictSummary {
        let registrations = self.registration_count(district);
        let residents = self.resident_count(district);
        DistrictSummary {
            district: district.to_string(),
            registrations,
            residents,
            net_movement: i64::from(registrations) - i64::from(residents),
        }
    }
}
