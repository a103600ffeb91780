use crate::color::{palette, Rgb};
use crate::types::VoteRecord;
use serde::{Deserialize, Serialize};

/// A census topic with the sequential palette its choropleth is drawn in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemographicCategory {
    pub id: &'static str,
    pub display_name: &'static str,
    pub palette_hex: [&'static str; 8],
}

impl DemographicCategory {
    pub fn palette(&self) -> Vec<Rgb> {
        palette(&self.palette_hex)
    }
}

pub const DEMOGRAPHIC_CATEGORIES: [DemographicCategory; 13] = [
    DemographicCategory {
        id: "country_of_birth",
        display_name: "Country of Birth",
        palette_hex: ["#f7fbff", "#deebf7", "#c6dbef", "#9ecae1", "#6baed6", "#4292c6", "#2171b5", "#084594"],
    },
    DemographicCategory {
        id: "ethnic_group",
        display_name: "Ethnic Group",
        palette_hex: ["#f7fcf5", "#e5f5e0", "#c7e9c0", "#a1d99b", "#74c476", "#41ab5d", "#238b45", "#005a32"],
    },
    DemographicCategory {
        id: "religion",
        display_name: "Religion",
        palette_hex: ["#fff5eb", "#fee6ce", "#fdd0a2", "#fdae6b", "#fd8d3c", "#f16913", "#d94801", "#8c2d04"],
    },
    DemographicCategory {
        id: "age_structure",
        display_name: "Age Structure",
        palette_hex: ["#fcfbfd", "#efedf5", "#dadaeb", "#bcbddc", "#9e9ac8", "#807dba", "#6a51a3", "#4a1486"],
    },
    DemographicCategory {
        id: "passports_held",
        display_name: "Passports Held",
        palette_hex: ["#fff5f0", "#fee0d2", "#fcbba1", "#fc9272", "#fb6a4a", "#ef3b2c", "#cb181d", "#99000d"],
    },
    DemographicCategory {
        id: "main_language",
        display_name: "Main Language",
        palette_hex: ["#ffffff", "#f0f0f0", "#d9d9d9", "#bdbdbd", "#969696", "#737373", "#525252", "#252525"],
    },
    DemographicCategory {
        id: "national_identity",
        display_name: "National Identity",
        palette_hex: ["#f7fcfd", "#e5f5f9", "#ccece6", "#99d8c9", "#66c2a4", "#41ae76", "#238b45", "#005824"],
    },
    DemographicCategory {
        id: "tenure",
        display_name: "Tenure",
        palette_hex: ["#f7fcfd", "#e0ecf4", "#bfd3e6", "#9ebcda", "#8c96c6", "#8c6bb1", "#88419d", "#6e016b"],
    },
    DemographicCategory {
        id: "qualifications",
        display_name: "Highest Qualification",
        palette_hex: ["#f7fcf0", "#e0f3db", "#ccebc5", "#a8ddb5", "#7bccc4", "#4eb3d3", "#2b8cbe", "#08589e"],
    },
    DemographicCategory {
        id: "economic_activity",
        display_name: "Economic Activity",
        palette_hex: ["#fff7ec", "#fee8c8", "#fdd49e", "#fdbb84", "#fc8d59", "#ef6548", "#d7301f", "#990000"],
    },
    DemographicCategory {
        id: "general_health",
        display_name: "General Health",
        palette_hex: ["#fff7fb", "#ece7f2", "#d0d1e6", "#a6bddb", "#74a9cf", "#3690c0", "#0570b0", "#034e7b"],
    },
    DemographicCategory {
        id: "household_composition",
        display_name: "Household Composition",
        palette_hex: ["#ffffe5", "#f7fcb9", "#d9f0a3", "#addd8e", "#78c679", "#41ab5d", "#238443", "#005a32"],
    },
    DemographicCategory {
        id: "car_availability",
        display_name: "Car or Van Availability",
        palette_hex: ["#ffffcc", "#ffeda0", "#fed976", "#feb24c", "#fd8d3c", "#fc4e2a", "#e31a1c", "#b10026"],
    },
];

pub fn find_category(id: &str) -> Option<&'static DemographicCategory> {
    DEMOGRAPHIC_CATEGORIES.iter().find(|c| c.id == id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteChoice {
    Leave,
    Remain,
}

impl VoteChoice {
    pub fn pct(&self, record: &VoteRecord) -> f64 {
        match self {
            VoteChoice::Leave => record.pct_leave,
            VoteChoice::Remain => record.pct_remain,
        }
    }

    /// Colours anchored at [-bound, 0, bound] of the chosen side's margin.
    /// Both choices paint a leave-won district red, so the maps compare.
    pub fn palette(&self) -> Vec<Rgb> {
        match self {
            VoteChoice::Leave => palette(&["#2166ac", "#f7f7f7", "#b2182b"]),
            VoteChoice::Remain => palette(&["#b2182b", "#f7f7f7", "#2166ac"]),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            VoteChoice::Leave => "Leave",
            VoteChoice::Remain => "Remain",
        }
    }
}

impl std::str::FromStr for VoteChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "leave" => Ok(VoteChoice::Leave),
            "remain" => Ok(VoteChoice::Remain),
            other => Err(format!("expected 'leave' or 'remain', got '{}'", other)),
        }
    }
}
