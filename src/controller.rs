//! Owns the session state and turns commands into renderer frames.

use crate::catalog::{find_category, DemographicCategory, VoteChoice};
use crate::color::Rgb;
use crate::config::AppConfig;
use crate::data::LoadedData;
use crate::engine::{
    assemble_mapping, build_color_scale, build_vote_scale, compute_ratio_mapping, compute_vote_mapping,
    flat_fill, ColorMapping, Fill,
};
use crate::error::{ChoroplethError, Result};
use crate::picking::DistrictIndex;
use crate::projection::{project_all, AlbersProjection, ProjectedDistrict};
use crate::scale::LegendSpec;
use crate::selection::{Pane, SelectionState, ViewTransform};
use crate::types::{DistrictRecord, VoteRecord};
use geo::Coord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// What the map is currently coloured by.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Layer {
    Demographic { category: String, attribute: String },
    Vote { choice: VoteChoice },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    SelectCategory { id: String },
    SelectAttribute { name: String },
    SelectVote { choice: VoteChoice },
    ClickDistrict { name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bar {
    pub label: String,
    pub value: f64,
    pub share: f64,
    pub selected: bool,
}

/// Statistics shown next to the map for the focused district.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatPanel {
    Demographic {
        district: String,
        category: String,
        total: f64,
        bars: Vec<Bar>,
    },
    Vote {
        district: String,
        area_code: String,
        pct_leave: f64,
        pct_remain: f64,
        valid_votes: f64,
    },
    NoData {
        district: String,
    },
}

/// Everything a renderer needs for one redraw.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub layer: Layer,
    pub colors: ColorMapping,
    pub legend: LegendSpec,
    pub transform: ViewTransform,
    pub focused: Option<String>,
    pub focus_flags: BTreeMap<String, bool>,
    pub categories: Vec<String>,
    pub attributes: Vec<String>,
    pub panel: Option<StatPanel>,
}

pub struct AppState {
    tables: BTreeMap<String, Vec<DistrictRecord>>,
    votes: Vec<VoteRecord>,
    districts: Vec<ProjectedDistrict>,
    index: DistrictIndex,
    pane: Pane,
    no_data: Rgb,
    legend_ticks: usize,
    vote_exponent: f64,
    layer: Layer,
    selection: SelectionState,
    transform: ViewTransform,
}

impl AppState {
    pub fn new(config: &AppConfig, data: LoadedData) -> anyhow::Result<Self> {
        let pane = Pane {
            width: config.view.width,
            height: config.view.height,
            focus_scale: config.view.focus_scale,
        };
        let projection = AlbersProjection::new(&config.projection, (pane.width / 2.0, pane.height / 2.0));
        let districts = project_all(&projection, &data.districts, pane.center());
        let index = DistrictIndex::build(&districts);

        let layer = config
            .input
            .datasets
            .iter()
            .find_map(|d| {
                let records = data.tables.get(&d.category)?;
                let attribute = first_attribute(records)?;
                if let Err(e) = compute_ratio_mapping(records, &attribute) {
                    warn!("Category {} cannot start the map: {}", d.category, e);
                    return None;
                }
                Some(Layer::Demographic { category: d.category.clone(), attribute })
            })
            .unwrap_or(Layer::Vote { choice: VoteChoice::Leave });

        info!("Initial layer: {:?}", layer);

        Ok(Self {
            tables: data.tables,
            votes: data.votes,
            districts,
            index,
            pane,
            no_data: config.view.no_data()?,
            legend_ticks: config.view.legend_ticks,
            vote_exponent: config.scale.vote_exponent,
            layer,
            selection: SelectionState::Unfocused,
            transform: ViewTransform::identity(),
        })
    }

    pub fn districts(&self) -> &[ProjectedDistrict] {
        &self.districts
    }

    pub fn pane(&self) -> Pane {
        self.pane
    }

    pub fn layer(&self) -> &Layer {
        &self.layer
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    /// Applies a command and returns the frame to draw. On error the state
    /// is left as it was.
    pub fn dispatch(&mut self, command: Command) -> Result<Frame> {
        info!("Dispatching {:?}", command);
        let mut layer = self.layer.clone();
        let mut selection = self.selection.clone();
        let mut transform = self.transform;

        match command {
            Command::SelectCategory { id } => {
                let category = self.loaded_category(&id)?;
                let records = &self.tables[category.id];
                let attribute = first_attribute(records).ok_or(ChoroplethError::EmptyDataset)?;
                layer = Layer::Demographic { category: id, attribute };
            }
            Command::SelectAttribute { name } => {
                let Layer::Demographic { category, .. } = &self.layer else {
                    return Err(ChoroplethError::NoDemographicLayer);
                };
                layer = Layer::Demographic { category: category.clone(), attribute: name };
            }
            Command::SelectVote { choice } => {
                layer = Layer::Vote { choice };
            }
            Command::ClickDistrict { name } => {
                let centroid = self.centroid(&name)?;
                transform = selection.on_district_clicked(&name, centroid, self.pane);
            }
        }

        let frame = self.build_frame(&layer, &selection, transform)?;
        self.layer = layer;
        self.selection = selection;
        self.transform = transform;
        Ok(frame)
    }

    /// District under a pane point, honouring the current zoom.
    pub fn locate(&self, x: f64, y: f64) -> Option<&str> {
        self.index
            .locate(&self.districts, &self.transform, Coord { x, y })
            .map(|i| self.districts[i].name.as_str())
    }

    pub fn frame(&self) -> Result<Frame> {
        self.build_frame(&self.layer, &self.selection, self.transform)
    }

    fn build_frame(&self, layer: &Layer, selection: &SelectionState, transform: ViewTransform) -> Result<Frame> {
        let (colors, legend, attributes) = match layer {
            Layer::Demographic { category, attribute } => {
                let category = self.loaded_category(category)?;
                let records = &self.tables[category.id];
                let (colors, legend) = self.demographic_colors(category, records, attribute)?;
                (colors, legend, attribute_names(records))
            }
            Layer::Vote { choice } => {
                let (colors, legend) = self.vote_colors(*choice)?;
                (colors, legend, Vec::new())
            }
        };

        let focus_flags = self
            .districts
            .iter()
            .map(|d| (d.name.clone(), selection.is_focused(&d.name)))
            .collect();

        Ok(Frame {
            layer: layer.clone(),
            colors,
            legend,
            transform,
            focused: selection.focused().map(str::to_string),
            focus_flags,
            categories: self.tables.keys().cloned().collect(),
            attributes,
            panel: self.panel(layer, selection),
        })
    }

    fn demographic_colors(
        &self,
        category: &DemographicCategory,
        records: &[DistrictRecord],
        attribute: &str,
    ) -> Result<(ColorMapping, LegendSpec)> {
        let mapping = compute_ratio_mapping(records, attribute)?;
        let palette = category.palette();
        let title = format!("{}: {}", category.display_name, attribute);
        let keys = self.districts.iter().map(|d| (d.name.as_str(), d.name.as_str()));

        match build_color_scale(mapping.domain_min, mapping.domain_max, &palette) {
            Ok(scale) => {
                let color = |v: f64| scale.color(v);
                let colors = assemble_mapping(keys, &mapping.by_district, Fill::Scale(&color), self.no_data);
                Ok((colors, LegendSpec::linear(&title, &scale, self.legend_ticks)))
            }
            Err(ChoroplethError::DegenerateDomain { min, .. }) => {
                warn!("Flat domain for {}, using a single fill", title);
                let fill = flat_fill(&palette);
                let colors = assemble_mapping(keys, &mapping.by_district, Fill::Flat(fill), self.no_data);
                Ok((colors, LegendSpec::flat(&title, min, fill)))
            }
            Err(e) => Err(e),
        }
    }

    fn vote_colors(&self, choice: VoteChoice) -> Result<(ColorMapping, LegendSpec)> {
        let mapping = compute_vote_mapping(&self.votes, choice)?;
        let title = format!("{} margin", choice.label());
        let keys = self.districts.iter().map(|d| (d.name.as_str(), d.vote_key()));

        match build_vote_scale(&mapping, choice, self.vote_exponent) {
            Ok(scale) => {
                let color = |v: f64| scale.color(v);
                let colors = assemble_mapping(keys, &mapping.by_area, Fill::Scale(&color), self.no_data);
                Ok((colors, LegendSpec::pow(&title, &scale, self.legend_ticks)))
            }
            Err(ChoroplethError::DegenerateDomain { .. }) => {
                warn!("Every area sits at 50%, using a single fill");
                let fill = flat_fill(&choice.palette());
                let colors = assemble_mapping(keys, &mapping.by_area, Fill::Flat(fill), self.no_data);
                Ok((colors, LegendSpec::flat(&title, 0.0, fill)))
            }
            Err(e) => Err(e),
        }
    }

    fn panel(&self, layer: &Layer, selection: &SelectionState) -> Option<StatPanel> {
        let name = selection.focused()?;
        let district = self.districts.iter().find(|d| d.name == name)?;
        let no_data = StatPanel::NoData { district: name.to_string() };

        let panel = match layer {
            Layer::Demographic { category, attribute } => {
                let category = find_category(category)?;
                self.tables
                    .get(category.id)
                    .and_then(|records| records.iter().find(|r| r.district == name))
                    .map(|record| StatPanel::Demographic {
                        district: name.to_string(),
                        category: category.display_name.to_string(),
                        total: record.total,
                        bars: record
                            .attributes
                            .iter()
                            .map(|(label, &value)| Bar {
                                label: label.clone(),
                                value,
                                share: if record.total > 0.0 { value / record.total } else { 0.0 },
                                selected: label == attribute,
                            })
                            .collect(),
                    })
            }
            Layer::Vote { .. } => self
                .votes
                .iter()
                .find(|v| v.area_code == district.vote_key() || v.area_name == name)
                .map(|v| StatPanel::Vote {
                    district: name.to_string(),
                    area_code: v.area_code.clone(),
                    pct_leave: v.pct_leave,
                    pct_remain: v.pct_remain,
                    valid_votes: v.valid_votes,
                }),
        };

        Some(panel.unwrap_or(no_data))
    }

    fn centroid(&self, name: &str) -> Result<Coord<f64>> {
        self.districts
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.centroid)
            .ok_or_else(|| ChoroplethError::UnknownDistrict(name.to_string()))
    }

    fn loaded_category(&self, id: &str) -> Result<&'static DemographicCategory> {
        let category = find_category(id).ok_or_else(|| ChoroplethError::UnknownCategory(id.to_string()))?;
        if !self.tables.contains_key(category.id) {
            return Err(ChoroplethError::UnknownCategory(id.to_string()));
        }
        Ok(category)
    }
}

fn first_attribute(records: &[DistrictRecord]) -> Option<String> {
    records.first()?.attributes.keys().next().cloned()
}

/// Attribute names offered for a category, taken from its first record.
fn attribute_names(records: &[DistrictRecord]) -> Vec<String> {
    records
        .first()
        .map(|r| r.attributes.keys().cloned().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scale::LegendKind;
    use crate::types::District;
    use geo::{polygon, MultiPolygon};

    const CONFIG: &str = r#"
        [input]
        topology = "topo_uk.json"
        name_property = "LAD13NM"
        code_property = "LAD13CD"
        votes = "votes.csv"

        [[input.datasets]]
        category = "country_of_birth"
        csv = "cob.csv"

        [[input.datasets]]
        category = "religion"
        csv = "religion.csv"
    "#;

    fn square(name: &str, code: &str, lon: f64) -> District {
        District {
            name: name.to_string(),
            code: Some(code.to_string()),
            geometry: MultiPolygon::new(vec![polygon![
                (x: lon, y: 54.0),
                (x: lon + 1.0, y: 54.0),
                (x: lon + 1.0, y: 55.0),
                (x: lon, y: 55.0),
                (x: lon, y: 54.0),
            ]]),
        }
    }

    fn record(district: &str, pairs: &[(&str, f64)], total: f64) -> DistrictRecord {
        DistrictRecord {
            district: district.to_string(),
            attributes: pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            total,
        }
    }

    fn vote(code: &str, name: &str, leave: f64) -> VoteRecord {
        VoteRecord {
            area_code: code.to_string(),
            area_name: name.to_string(),
            pct_leave: leave,
            pct_remain: 100.0 - leave,
            valid_votes: 5000.0,
        }
    }

    fn tables() -> BTreeMap<String, Vec<DistrictRecord>> {
        BTreeMap::from([
            (
                "country_of_birth".to_string(),
                vec![
                    record("Alpha", &[("Born in UK", 80.0), ("Born abroad", 20.0)], 100.0),
                    record("Beta", &[("Born in UK", 45.0), ("Born abroad", 5.0)], 50.0),
                    record("Gamma", &[("Born in UK", 0.0), ("Born abroad", 0.0)], 0.0),
                ],
            ),
            (
                "religion".to_string(),
                vec![
                    record("Alpha", &[("No religion", 30.0)], 100.0),
                    record("Beta", &[("No religion", 15.0)], 50.0),
                ],
            ),
        ])
    }

    fn state_with(tables: BTreeMap<String, Vec<DistrictRecord>>, votes: Vec<VoteRecord>) -> AppState {
        let config = AppConfig::from_toml(CONFIG).unwrap();
        let data = LoadedData {
            districts: vec![square("Alpha", "E1", -3.0), square("Beta", "E2", -2.0), square("Gamma", "E3", -1.0)],
            tables,
            votes,
        };
        AppState::new(&config, data).unwrap()
    }

    fn state() -> AppState {
        state_with(
            tables(),
            vec![vote("E1", "Alpha", 60.0), vote("E2", "Beta", 45.0), vote("E3", "Gamma", 0.0)],
        )
    }

    fn zero_totals() -> Vec<DistrictRecord> {
        vec![
            record("Alpha", &[("Owned", 0.0)], 0.0),
            record("Beta", &[("Owned", 0.0)], 0.0),
        ]
    }

    #[test]
    fn starts_on_first_configured_category() {
        let state = state();
        assert_eq!(
            state.layer(),
            &Layer::Demographic {
                category: "country_of_birth".to_string(),
                attribute: "Born abroad".to_string()
            }
        );
        let frame = state.frame().unwrap();
        assert_eq!(frame.attributes, vec!["Born abroad".to_string(), "Born in UK".to_string()]);
        assert_eq!(frame.categories.len(), 2);
        assert!(frame.transform.is_identity());
    }

    #[test]
    fn demographic_frame_colours_domain_ends_and_skips_zero_totals() {
        let state = state();
        let frame = state.frame().unwrap();
        let palette = find_category("country_of_birth").unwrap().palette();
        // Born abroad: Alpha 0.2, Beta 0.1; Gamma has a zero total.
        assert_eq!(frame.colors.fill("Alpha"), palette[7]);
        assert_eq!(frame.colors.fill("Beta"), palette[0]);
        assert_eq!(frame.colors.fill("Gamma"), Rgb::new(204, 204, 204));
        assert_eq!(frame.legend.domain_min, 0.1);
        assert_eq!(frame.legend.domain_max, 0.2);
        assert_eq!(frame.legend.ticks.len(), 5);
    }

    #[test]
    fn selecting_attribute_recomputes_domain() {
        let mut state = state();
        let frame = state
            .dispatch(Command::SelectAttribute { name: "Born in UK".to_string() })
            .unwrap();
        assert_eq!(frame.legend.domain_min, 0.8);
        assert_eq!(frame.legend.domain_max, 0.9);
    }

    #[test]
    fn bad_attribute_leaves_state_unchanged() {
        let mut state = state();
        let before = state.layer().clone();
        assert!(matches!(
            state.dispatch(Command::SelectAttribute { name: "Born on Mars".to_string() }),
            Err(ChoroplethError::MissingAttribute { .. })
        ));
        assert_eq!(state.layer(), &before);
    }

    #[test]
    fn failed_category_switch_leaves_state_unchanged() {
        let mut tables = tables();
        tables.insert("tenure".to_string(), zero_totals());
        let mut state = state_with(tables, vec![vote("E1", "Alpha", 60.0)]);
        state.dispatch(Command::ClickDistrict { name: "Alpha".to_string() }).unwrap();
        let layer = state.layer().clone();
        let selection = state.selection().clone();

        assert_eq!(
            state.dispatch(Command::SelectCategory { id: "tenure".to_string() }),
            Err(ChoroplethError::EmptyDataset)
        );
        assert_eq!(state.layer(), &layer);
        assert_eq!(state.selection(), &selection);
        assert!(state.frame().is_ok());

        // Clicking still works because the layer never moved.
        let frame = state.dispatch(Command::ClickDistrict { name: "Alpha".to_string() }).unwrap();
        assert_eq!(frame.focused, None);
    }

    #[test]
    fn failed_vote_switch_leaves_state_unchanged() {
        let mut state = state_with(tables(), vec![vote("E1", "Alpha", 0.0), vote("E2", "Beta", 0.0)]);
        let layer = state.layer().clone();

        assert_eq!(
            state.dispatch(Command::SelectVote { choice: VoteChoice::Leave }),
            Err(ChoroplethError::EmptyDataset)
        );
        assert_eq!(state.layer(), &layer);
        assert_eq!(state.selection(), &SelectionState::Unfocused);
        assert!(state.frame().is_ok());
    }

    #[test]
    fn failed_click_leaves_selection_and_zoom_unchanged() {
        let mut state = state_with(tables(), vec![vote("E1", "Alpha", 0.0)]);
        state.layer = Layer::Vote { choice: VoteChoice::Leave };

        assert_eq!(
            state.dispatch(Command::ClickDistrict { name: "Alpha".to_string() }),
            Err(ChoroplethError::EmptyDataset)
        );
        assert_eq!(state.selection(), &SelectionState::Unfocused);
        assert!(state.transform.is_identity());

        assert!(state.dispatch(Command::ClickDistrict { name: "Atlantis".to_string() }).is_err());
        assert_eq!(state.selection(), &SelectionState::Unfocused);
    }

    #[test]
    fn starts_on_first_category_that_maps() {
        let mut tables = tables();
        tables.insert("country_of_birth".to_string(), zero_totals());
        let state = state_with(tables, vec![vote("E1", "Alpha", 60.0)]);
        assert_eq!(
            state.layer(),
            &Layer::Demographic {
                category: "religion".to_string(),
                attribute: "No religion".to_string()
            }
        );
        assert!(state.frame().is_ok());

        let mut tables = BTreeMap::new();
        tables.insert("country_of_birth".to_string(), zero_totals());
        let state = state_with(tables, vec![vote("E1", "Alpha", 60.0)]);
        assert_eq!(state.layer(), &Layer::Vote { choice: VoteChoice::Leave });
    }

    #[test]
    fn flat_category_falls_back_to_single_fill() {
        let mut state = state();
        let frame = state.dispatch(Command::SelectCategory { id: "religion".to_string() }).unwrap();
        // Both districts sit at 0.3.
        assert_eq!(frame.legend.kind, LegendKind::Flat);
        assert_eq!(frame.colors.fill("Alpha"), frame.colors.fill("Beta"));
        assert_eq!(frame.colors.fill("Gamma"), Rgb::new(204, 204, 204));
    }

    #[test]
    fn unknown_or_unloaded_category_is_rejected() {
        let mut state = state();
        assert_eq!(
            state.dispatch(Command::SelectCategory { id: "tenure".to_string() }),
            Err(ChoroplethError::UnknownCategory("tenure".to_string()))
        );
        assert!(state.dispatch(Command::SelectCategory { id: "nope".to_string() }).is_err());
    }

    #[test]
    fn vote_layer_is_symmetric_and_keyed_by_code() {
        let mut state = state();
        let frame = state.dispatch(Command::SelectVote { choice: VoteChoice::Leave }).unwrap();
        assert_eq!(frame.legend.domain_min, -frame.legend.domain_max);
        assert_eq!(frame.colors.fill("Alpha"), VoteChoice::Leave.palette()[2]);
        assert_eq!(frame.colors.fill("Gamma"), Rgb::new(204, 204, 204));
        assert!(frame.attributes.is_empty());
        assert!(matches!(
            state.dispatch(Command::SelectAttribute { name: "Born in UK".to_string() }),
            Err(ChoroplethError::NoDemographicLayer)
        ));
    }

    #[test]
    fn click_toggles_focus_and_zoom() {
        let mut state = state();
        let frame = state.dispatch(Command::ClickDistrict { name: "Alpha".to_string() }).unwrap();
        assert_eq!(frame.focused.as_deref(), Some("Alpha"));
        assert_eq!(frame.transform.scale, 4.0);
        assert_eq!(frame.focus_flags["Alpha"], true);
        assert_eq!(frame.focus_flags["Beta"], false);

        let frame = state.dispatch(Command::ClickDistrict { name: "Beta".to_string() }).unwrap();
        assert_eq!(frame.focused.as_deref(), Some("Beta"));
        assert_eq!(frame.transform.scale, 4.0);

        let frame = state.dispatch(Command::ClickDistrict { name: "Beta".to_string() }).unwrap();
        assert_eq!(frame.focused, None);
        assert!(frame.transform.is_identity());
        assert!(frame.panel.is_none());
    }

    #[test]
    fn clicking_unknown_district_fails() {
        let mut state = state();
        assert_eq!(
            state.dispatch(Command::ClickDistrict { name: "Atlantis".to_string() }),
            Err(ChoroplethError::UnknownDistrict("Atlantis".to_string()))
        );
    }

    #[test]
    fn panel_follows_layer() {
        let mut state = state();
        let frame = state.dispatch(Command::ClickDistrict { name: "Beta".to_string() }).unwrap();
        match frame.panel {
            Some(StatPanel::Demographic { total, bars, .. }) => {
                assert_eq!(total, 50.0);
                let abroad = bars.iter().find(|b| b.label == "Born abroad").unwrap();
                assert_eq!(abroad.share, 0.1);
                assert!(abroad.selected);
            }
            other => panic!("unexpected panel {:?}", other),
        }

        let frame = state.dispatch(Command::SelectVote { choice: VoteChoice::Remain }).unwrap();
        match frame.panel {
            Some(StatPanel::Vote { area_code, pct_remain, .. }) => {
                assert_eq!(area_code, "E2");
                assert_eq!(pct_remain, 55.0);
            }
            other => panic!("unexpected panel {:?}", other),
        }

        let frame = state.dispatch(Command::SelectCategory { id: "religion".to_string() }).unwrap();
        assert!(matches!(frame.panel, Some(StatPanel::Demographic { .. })));
    }

    #[test]
    fn locate_finds_projected_district() {
        let state = state();
        let beta = state.districts().iter().find(|d| d.name == "Beta").unwrap().centroid;
        assert_eq!(state.locate(beta.x, beta.y), Some("Beta"));
    }

    #[test]
    fn commands_deserialize_from_json() {
        let cmd: Command = serde_json::from_str(r#"{"command":"select_vote","choice":"Remain"}"#).unwrap();
        assert_eq!(cmd, Command::SelectVote { choice: VoteChoice::Remain });
        let cmd: Command = serde_json::from_str(r#"{"command":"click_district","name":"Alpha"}"#).unwrap();
        assert_eq!(cmd, Command::ClickDistrict { name: "Alpha".to_string() });
    }
}
