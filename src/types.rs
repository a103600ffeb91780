use geo::MultiPolygon;
use serde::Serialize;
use std::collections::BTreeMap;

/// Columns of a district table that never name a mappable attribute.
pub const RESERVED_COLUMNS: [&str; 3] = ["district", "total", "%"];

/// One row of a demographic table: a district and its counts per attribute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistrictRecord {
    pub district: String,
    pub attributes: BTreeMap<String, f64>,
    pub total: f64,
}

impl DistrictRecord {
    pub fn value(&self, attribute: &str) -> Option<f64> {
        self.attributes.get(attribute).copied()
    }
}

/// One row of the referendum results table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoteRecord {
    pub area_code: String,
    pub area_name: String,
    pub pct_leave: f64,
    pub pct_remain: f64,
    pub valid_votes: f64,
}

/// A local authority district boundary from the topology file.
#[derive(Debug, Clone)]
pub struct District {
    pub name: String,
    pub code: Option<String>,
    pub geometry: MultiPolygon<f64>,
}
