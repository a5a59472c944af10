use geo::MultiPolygon;
use std::collections::BTreeMap;

/// Council district label as found in a feature's properties.
pub type DistrictId = String;

/// District -> number of features carrying that district.
pub type DistrictCountMap = BTreeMap<DistrictId, u32>;

/// A council district boundary used for point lookups.
#[derive(Debug, Clone)]
pub struct District {
    pub id: DistrictId,
    pub geometry: MultiPolygon<f64>,
}
