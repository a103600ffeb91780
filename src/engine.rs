//! Choropleth engine: turns a loaded table and a selection into per-district
//! values, a colour scale and the colour mapping the renderer fills with.

use crate::catalog::VoteChoice;
use crate::color::Rgb;
use crate::error::{ChoroplethError, Result};
use crate::scale::{LinearColorScale, PowColorScale};
use crate::types::{DistrictRecord, VoteRecord, RESERVED_COLUMNS};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatioMapping {
    pub by_district: BTreeMap<String, f64>,
    pub domain_min: f64,
    pub domain_max: f64,
    /// Districts left out because their total was zero.
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoteMapping {
    pub by_area: BTreeMap<String, f64>,
    pub min_margin: f64,
    pub max_margin: f64,
    pub legend_bound: f64,
}

impl VoteMapping {
    /// Symmetric domain `[-bound, 0, bound]`.
    pub fn domain(&self) -> [f64; 3] {
        [-self.legend_bound, 0.0, self.legend_bound]
    }
}

/// `attribute / total` for one record.
pub fn record_ratio(record: &DistrictRecord, attribute: &str) -> Result<f64> {
    let value = record
        .value(attribute)
        .ok_or_else(|| ChoroplethError::MissingAttribute {
            district: record.district.clone(),
            attribute: attribute.to_string(),
        })?;
    if record.total == 0.0 {
        return Err(ChoroplethError::DivisionByZero { district: record.district.clone() });
    }
    Ok(value / record.total)
}

/// Share of `attribute` in each district's total.
///
/// Zero-total records are skipped and do not move the domain. A missing
/// attribute aborts the whole mapping.
pub fn compute_ratio_mapping(records: &[DistrictRecord], attribute: &str) -> Result<RatioMapping> {
    if RESERVED_COLUMNS.contains(&attribute) {
        return Err(ChoroplethError::ReservedAttribute(attribute.to_string()));
    }

    let mut by_district = BTreeMap::new();
    let mut skipped = Vec::new();
    let mut bounds: Option<(f64, f64)> = None;

    for record in records {
        let ratio = match record_ratio(record, attribute) {
            Ok(r) => r,
            Err(ChoroplethError::DivisionByZero { district }) => {
                debug!("Skipping {} (zero total)", district);
                skipped.push(district);
                continue;
            }
            Err(e) => return Err(e),
        };
        bounds = Some(match bounds {
            None => (ratio, ratio),
            Some((lo, hi)) => (lo.min(ratio), hi.max(ratio)),
        });
        by_district.insert(record.district.clone(), ratio);
    }

    let (domain_min, domain_max) = bounds.ok_or(ChoroplethError::EmptyDataset)?;
    Ok(RatioMapping { by_district, domain_min, domain_max, skipped })
}

/// Linear scale over `palette` spanning the ratio domain.
pub fn build_color_scale(domain_min: f64, domain_max: f64, palette: &[Rgb]) -> Result<LinearColorScale> {
    LinearColorScale::uniform(domain_min, domain_max, palette)
}

/// Signed margin `(pct - 50) / 100` of the chosen side, keyed by area code.
/// A zero percentage means the area has no result and is left out.
pub fn compute_vote_mapping(records: &[VoteRecord], choice: VoteChoice) -> Result<VoteMapping> {
    let mut by_area = BTreeMap::new();
    let mut bounds: Option<(f64, f64)> = None;

    for record in records {
        let pct = choice.pct(record);
        if pct == 0.0 {
            continue;
        }
        let margin = (pct - 50.0) / 100.0;
        bounds = Some(match bounds {
            None => (margin, margin),
            Some((lo, hi)) => (lo.min(margin), hi.max(margin)),
        });
        by_area.insert(record.area_code.clone(), margin);
    }

    let (min_margin, max_margin) = bounds.ok_or(ChoroplethError::EmptyDataset)?;
    Ok(VoteMapping {
        by_area,
        min_margin,
        max_margin,
        legend_bound: min_margin.abs().max(max_margin.abs()),
    })
}

/// Diverging power scale anchored at zero margin.
pub fn build_vote_scale(mapping: &VoteMapping, choice: VoteChoice, exponent: f64) -> Result<PowColorScale> {
    PowColorScale::new(&mapping.domain(), &choice.palette(), exponent)
}

/// District name to fill colour. Rebuilt from scratch on every change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ColorMapping {
    pub fills: BTreeMap<String, Rgb>,
    pub no_data: Rgb,
}

impl ColorMapping {
    pub fn fill(&self, district: &str) -> Rgb {
        self.fills.get(district).copied().unwrap_or(self.no_data)
    }
}

/// How values become colours: a scale, or one colour when the domain is flat.
pub enum Fill<'a> {
    Scale(&'a dyn Fn(f64) -> Rgb),
    Flat(Rgb),
}

/// Colours every district `(name, key)` whose key has a value; the rest get `no_data`.
pub fn assemble_mapping<'d, I>(districts: I, values: &BTreeMap<String, f64>, fill: Fill<'_>, no_data: Rgb) -> ColorMapping
where
    I: IntoIterator<Item = (&'d str, &'d str)>,
{
    let mut fills = BTreeMap::new();
    for (name, key) in districts {
        if let Some(&value) = values.get(key) {
            let color = match &fill {
                Fill::Scale(scale) => scale(value),
                Fill::Flat(color) => *color,
            };
            fills.insert(name.to_string(), color);
        }
    }
    ColorMapping { fills, no_data }
}

/// Middle colour of a palette, used when a domain collapses to a point.
pub fn flat_fill(palette: &[Rgb]) -> Rgb {
    if palette.is_empty() {
        warn!("Empty palette for flat fill");
        return Rgb::new(128, 128, 128);
    }
    palette[palette.len() / 2]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(district: &str, attr: f64, total: f64) -> DistrictRecord {
        DistrictRecord {
            district: district.to_string(),
            attributes: BTreeMap::from([("attr".to_string(), attr)]),
            total,
        }
    }

    fn vote(code: &str, leave: f64, remain: f64) -> VoteRecord {
        VoteRecord {
            area_code: code.to_string(),
            area_name: format!("Area {}", code),
            pct_leave: leave,
            pct_remain: remain,
            valid_votes: 1000.0,
        }
    }

    #[test]
    fn ratio_mapping_example() {
        let records = vec![record("X", 4.0, 8.0), record("Y", 2.0, 8.0)];
        let mapping = compute_ratio_mapping(&records, "attr").unwrap();
        assert_eq!(mapping.by_district.get("X"), Some(&0.5));
        assert_eq!(mapping.by_district.get("Y"), Some(&0.25));
        assert_eq!(mapping.domain_min, 0.25);
        assert_eq!(mapping.domain_max, 0.5);
        assert!(mapping.skipped.is_empty());
    }

    #[test]
    fn zero_total_is_skipped_and_leaves_domain_alone() {
        let records = vec![record("X", 4.0, 8.0), record("Z", 9.0, 0.0), record("Y", 2.0, 8.0)];
        let mapping = compute_ratio_mapping(&records, "attr").unwrap();
        assert_eq!(mapping.by_district.len(), 2);
        assert!(!mapping.by_district.contains_key("Z"));
        assert_eq!(mapping.skipped, vec!["Z".to_string()]);
        assert_eq!((mapping.domain_min, mapping.domain_max), (0.25, 0.5));
    }

    #[test]
    fn domain_is_seeded_from_observed_values() {
        // All ratios 1 or all ratios below 1 used to trip the fixed seed.
        let ones = vec![record("A", 3.0, 3.0), record("B", 5.0, 5.0)];
        let mapping = compute_ratio_mapping(&ones, "attr").unwrap();
        assert_eq!((mapping.domain_min, mapping.domain_max), (1.0, 1.0));

        let small = vec![record("A", 1.0, 10.0), record("B", 3.0, 10.0)];
        let mapping = compute_ratio_mapping(&small, "attr").unwrap();
        assert_eq!((mapping.domain_min, mapping.domain_max), (0.1, 0.3));
    }

    #[test]
    fn missing_and_reserved_attributes_fail() {
        let records = vec![record("X", 4.0, 8.0)];
        assert_eq!(
            compute_ratio_mapping(&records, "other"),
            Err(ChoroplethError::MissingAttribute {
                district: "X".to_string(),
                attribute: "other".to_string()
            })
        );
        assert_eq!(
            compute_ratio_mapping(&records, "total"),
            Err(ChoroplethError::ReservedAttribute("total".to_string()))
        );
    }

    #[test]
    fn all_zero_totals_is_an_empty_dataset() {
        let records = vec![record("X", 0.0, 0.0)];
        assert_eq!(compute_ratio_mapping(&records, "attr"), Err(ChoroplethError::EmptyDataset));
        assert_eq!(compute_ratio_mapping(&[], "attr"), Err(ChoroplethError::EmptyDataset));
    }

    #[test]
    fn record_ratio_reports_division_by_zero() {
        assert_eq!(
            record_ratio(&record("Z", 1.0, 0.0), "attr"),
            Err(ChoroplethError::DivisionByZero { district: "Z".to_string() })
        );
    }

    #[test]
    fn vote_mapping_example() {
        let votes = vec![vote("A1", 60.0, 40.0), vote("A2", 45.0, 55.0)];
        let mapping = compute_vote_mapping(&votes, VoteChoice::Leave).unwrap();
        assert!((mapping.by_area["A1"] - 0.10).abs() < 1e-12);
        assert!((mapping.by_area["A2"] + 0.05).abs() < 1e-12);
        assert!((mapping.legend_bound - 0.10).abs() < 1e-12);
        let [lo, mid, hi] = mapping.domain();
        assert_eq!(lo, -hi);
        assert_eq!(mid, 0.0);
    }

    #[test]
    fn vote_domain_is_symmetric_for_skewed_data() {
        let votes = vec![vote("A", 75.0, 25.0), vote("B", 52.0, 48.0), vote("C", 48.0, 52.0)];
        for choice in [VoteChoice::Leave, VoteChoice::Remain] {
            let mapping = compute_vote_mapping(&votes, choice).unwrap();
            let [lo, _, hi] = mapping.domain();
            assert_eq!(lo, -hi);
            assert!((hi - 0.25).abs() < 1e-12);
        }
    }

    #[test]
    fn zero_percentage_rows_are_no_data() {
        let votes = vec![vote("A", 60.0, 40.0), vote("N", 0.0, 0.0)];
        let mapping = compute_vote_mapping(&votes, VoteChoice::Remain).unwrap();
        assert_eq!(mapping.by_area.len(), 1);
        assert!((mapping.min_margin + 0.10).abs() < 1e-12);
        assert!((mapping.max_margin + 0.10).abs() < 1e-12);
    }

    #[test]
    fn vote_scale_puts_neutral_colour_at_zero() {
        let votes = vec![vote("A1", 60.0, 40.0), vote("A2", 45.0, 55.0)];
        let mapping = compute_vote_mapping(&votes, VoteChoice::Leave).unwrap();
        let scale = build_vote_scale(&mapping, VoteChoice::Leave, 0.75).unwrap();
        assert_eq!(scale.color(0.0), VoteChoice::Leave.palette()[1]);
        assert_eq!(scale.color(0.10), VoteChoice::Leave.palette()[2]);
    }

    #[test]
    fn assembled_mapping_uses_no_data_for_missing_keys() {
        let values = BTreeMap::from([("k1".to_string(), 1.0)]);
        let red = Rgb::new(255, 0, 0);
        let grey = Rgb::new(204, 204, 204);
        let districts = [("One", "k1"), ("Two", "k2")];
        let mapping = assemble_mapping(districts, &values, Fill::Flat(red), grey);
        assert_eq!(mapping.fill("One"), red);
        assert_eq!(mapping.fill("Two"), grey);
        assert_eq!(mapping.fills.len(), 1);
    }
}
