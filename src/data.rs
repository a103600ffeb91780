use crate::config::{AppConfig, InputConfig};
use crate::error::ChoroplethError;
use crate::types::{District, DistrictRecord, VoteRecord, RESERVED_COLUMNS};
use anyhow::{anyhow, Context, Result};
use csv::ReaderBuilder;
use futures::future::try_join_all;
use geo::MultiPolygon;
use geojson::{FeatureCollection, GeoJson};
use serde::Deserialize;
use shapefile::Reader;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::Path;
use tracing::{debug, info, warn};

/// Everything the map needs, loaded together or not at all.
#[derive(Debug, Clone, Default)]
pub struct LoadedData {
    pub districts: Vec<District>,
    /// Category id to that category's rows.
    pub tables: BTreeMap<String, Vec<DistrictRecord>>,
    pub votes: Vec<VoteRecord>,
}

/// Strict numeric parse for CSV cells. Thousands separators are allowed,
/// anything else that is not a finite number is rejected.
pub fn parse_numeric(raw: &str) -> crate::error::Result<f64> {
    let cleaned: String = raw.trim().chars().filter(|&c| c != ',').collect();
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ChoroplethError::Parse { value: raw.to_string() }),
    }
}

pub async fn load_all(config: &AppConfig) -> crate::error::Result<LoadedData> {
    info!(
        "Loading topology and {} datasets...",
        config.input.datasets.len()
    );

    let input = config.input.clone();
    let topology = fetch(config.input.topology.display().to_string(), move || {
        load_topology(&input)
    });

    let tables = try_join_all(config.input.datasets.iter().map(|dataset| {
        let category = dataset.category.clone();
        let path = dataset.csv.clone();
        fetch(path.display().to_string(), move || {
            load_district_table(&path).map(|records| (category, records))
        })
    }));

    let votes_path = config.input.votes.clone();
    let votes = fetch(votes_path.display().to_string(), move || load_vote_table(&votes_path));

    let (districts, tables, votes) = tokio::try_join!(topology, tables, votes)?;

    info!(
        "Loaded {} districts, {} tables, {} vote rows",
        districts.len(),
        tables.len(),
        votes.len()
    );

    Ok(LoadedData {
        districts,
        tables: tables.into_iter().collect(),
        votes,
    })
}

async fn fetch<T, F>(resource: String, load: F) -> crate::error::Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(load).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(ChoroplethError::ResourceLoad {
            resource,
            reason: format!("{:#}", e),
        }),
        Err(e) => Err(ChoroplethError::ResourceLoad {
            resource,
            reason: e.to_string(),
        }),
    }
}

/// Reads a demographic table: a `district` column, a `total` column and one
/// column per attribute.
pub fn load_district_table(path: &Path) -> Result<Vec<DistrictRecord>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open CSV file: {:?}", path))?;
    let mut rdr = ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);
    let headers = rdr.headers()?.clone();

    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .ok_or_else(|| anyhow!("Column '{}' not found in {:?}", name, path))
    };
    let district_idx = column("district")?;
    let total_idx = column("total")?;

    let attribute_cols: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| !h.is_empty() && !RESERVED_COLUMNS.iter().any(|r| h.eq_ignore_ascii_case(r)))
        .map(|(i, h)| (i, h.to_string()))
        .collect();

    let mut records = Vec::new();
    let mut rejected = 0;

    for (row, result) in rdr.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!("Rejecting malformed row {} in {:?}: {}", row + 1, path, e);
                rejected += 1;
                continue;
            }
        };
        let district = record.get(district_idx).unwrap_or("").to_string();
        if district.is_empty() {
            continue;
        }

        let parsed = parse_row(&record, total_idx, &attribute_cols);
        match parsed {
            Ok((total, attributes)) => records.push(DistrictRecord { district, attributes, total }),
            Err(e) => {
                warn!("Rejecting row for {} in {:?}: {}", district, path, e);
                rejected += 1;
            }
        }
    }

    debug!("Read {} rows from {:?} ({} rejected)", records.len(), path, rejected);
    Ok(records)
}

fn parse_row(
    record: &csv::StringRecord,
    total_idx: usize,
    attribute_cols: &[(usize, String)],
) -> crate::error::Result<(f64, BTreeMap<String, f64>)> {
    let total = parse_numeric(record.get(total_idx).unwrap_or(""))?;
    let mut attributes = BTreeMap::new();
    for (idx, name) in attribute_cols {
        let value = parse_numeric(record.get(*idx).unwrap_or(""))?;
        attributes.insert(name.clone(), value);
    }
    Ok((total, attributes))
}

#[derive(Debug, Deserialize)]
struct VoteRow {
    #[serde(rename = "Area_Code")]
    area_code: String,
    #[serde(rename = "Area")]
    area: String,
    #[serde(rename = "Pct_Leave")]
    pct_leave: String,
    #[serde(rename = "Pct_Remain")]
    pct_remain: String,
    #[serde(rename = "Valid_Votes")]
    valid_votes: String,
}

impl VoteRow {
    fn parse(self) -> crate::error::Result<VoteRecord> {
        Ok(VoteRecord {
            pct_leave: parse_numeric(&self.pct_leave)?,
            pct_remain: parse_numeric(&self.pct_remain)?,
            valid_votes: parse_numeric(&self.valid_votes)?,
            area_code: self.area_code,
            area_name: self.area,
        })
    }
}

pub fn load_vote_table(path: &Path) -> Result<Vec<VoteRecord>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open CSV file: {:?}", path))?;
    let mut rdr = ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);

    let mut votes = Vec::new();
    for (row, result) in rdr.deserialize::<VoteRow>().enumerate() {
        let parsed = result
            .map_err(|e| anyhow!("{}", e))
            .and_then(|r| r.parse().map_err(|e| anyhow!("{}", e)));
        match parsed {
            Ok(vote) => votes.push(vote),
            Err(e) => warn!("Rejecting vote row {} in {:?}: {}", row + 1, path, e),
        }
    }

    debug!("Read {} vote rows from {:?}", votes.len(), path);
    Ok(votes)
}

/// Loads district boundaries from TopoJSON, GeoJSON or a Shapefile.
pub fn load_topology(input: &InputConfig) -> Result<Vec<District>> {
    let path = &input.topology;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .ok_or_else(|| anyhow!("Input geometry file has no extension"))?;

    let districts = match extension.as_str() {
        "shp" => load_shapefile(input)?,
        "json" | "geojson" | "topojson" => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read geometry file: {:?}", path))?;
            let collection = if is_topology(&content) {
                topology_to_features(&content, &input.topology_object)?
            } else {
                match content.parse::<GeoJson>().context("Failed to parse GeoJSON")? {
                    GeoJson::FeatureCollection(fc) => fc,
                    _ => return Err(anyhow!("GeoJSON must be a FeatureCollection")),
                }
            };
            features_to_districts(collection, input)
        }
        _ => return Err(anyhow!("Unsupported geometry format: {}", extension)),
    };

    info!("Loaded {} district boundaries from {:?}", districts.len(), path);
    Ok(districts)
}

fn is_topology(content: &str) -> bool {
    #[derive(Deserialize)]
    struct TypeTag {
        #[serde(rename = "type")]
        kind: String,
    }
    serde_json::from_str::<TypeTag>(content)
        .map(|p| p.kind == "Topology")
        .unwrap_or(false)
}

fn topology_to_features(content: &str, object: &str) -> Result<FeatureCollection> {
    let topo = match content.parse::<topojson::TopoJson>() {
        Ok(topojson::TopoJson::Topology(t)) => t,
        Ok(_) => return Err(anyhow!("TopoJSON document is not a Topology")),
        Err(e) => return Err(anyhow!("Failed to parse TopoJSON: {:?}", e)),
    };
    let features = topojson::to_geojson(&topo, object)
        .map_err(|e| anyhow!("Failed to extract object '{}': {:?}", object, e))?;
    // Through JSON text so the topojson crate's geojson version stays its own.
    let text = serde_json::to_string(&features)?;
    match text.parse::<GeoJson>().context("Failed to convert TopoJSON features")? {
        GeoJson::FeatureCollection(fc) => Ok(fc),
        _ => Err(anyhow!("TopoJSON object '{}' is not a collection", object)),
    }
}

fn property_string(value: Option<&serde_json::Value>) -> Option<String> {
    match value {
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn features_to_districts(collection: FeatureCollection, input: &InputConfig) -> Vec<District> {
    let mut districts = Vec::new();

    for feature in collection.features {
        let props = feature.properties.as_ref();
        let Some(name) = property_string(props.and_then(|p| p.get(&input.name_property))) else {
            debug!("Skipping feature without '{}'", input.name_property);
            continue;
        };
        let code = input
            .code_property
            .as_ref()
            .and_then(|key| property_string(props.and_then(|p| p.get(key))));

        let geometry = match feature.geometry {
            Some(geom) => match geo::Geometry::<f64>::try_from(geom.value) {
                Ok(geo::Geometry::MultiPolygon(mp)) => mp,
                Ok(geo::Geometry::Polygon(p)) => MultiPolygon::new(vec![p]),
                Ok(_) => continue,
                Err(e) => {
                    warn!("Skipping {}: bad geometry ({:?})", name, e);
                    continue;
                }
            },
            None => continue,
        };

        districts.push(District { name, code, geometry });
    }

    districts
}

fn load_shapefile(input: &InputConfig) -> Result<Vec<District>> {
    let mut reader = Reader::from_path(&input.topology)
        .with_context(|| format!("Failed to open Shapefile: {:?}", input.topology))?;

    let field = |record: &shapefile::dbase::Record, key: &str| -> Result<Option<String>> {
        match record.get(key) {
            Some(shapefile::dbase::FieldValue::Character(value)) => Ok(value.clone()),
            Some(_) => Err(anyhow!("Shapefile column '{}' must be a string", key)),
            None => Err(anyhow!("Column '{}' not found in Shapefile", key)),
        }
    };

    let mut districts = Vec::new();
    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result?;

        let Some(name) = field(&record, &input.name_property)? else { continue };
        let code = match &input.code_property {
            Some(key) => field(&record, key)?,
            None => None,
        };

        let geometry: MultiPolygon<f64> = match shape {
            shapefile::Shape::Polygon(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygon: {:?}", e))?,
            shapefile::Shape::PolygonM(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygonM: {:?}", e))?,
            shapefile::Shape::PolygonZ(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygonZ: {:?}", e))?,
            _ => continue,
        };

        districts.push(District { name, code, geometry });
    }

    Ok(districts)
}
