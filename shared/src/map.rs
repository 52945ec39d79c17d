//! Static board topology: territories, adjacency and continents.
//!
//! The topology is read-only input to every other component. Both the
//! server and the clients must agree on it exactly, so all collections are
//! ordered maps and iteration order never depends on hashing.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use thiserror::Error;

pub type TerritoryId = String;
pub type ContinentId = String;

#[derive(Debug, Error)]
pub enum MapError {
    #[error("territory {0} is referenced but never declared in a continent")]
    UnknownTerritory(String),

    #[error("territory {0} belongs to more than one continent")]
    DuplicateTerritory(String),

    #[error("adjacency {0} -> {1} has no reverse edge")]
    AsymmetricAdjacency(String, String),

    #[error("territory {0} lists itself as a neighbor")]
    SelfLoop(String),

    #[error("continent {0} has no territories")]
    EmptyContinent(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Continent {
    pub bonus: u32,
    pub territories: BTreeSet<TerritoryId>,
}

/// On-disk format for custom maps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MapDefinition {
    pub continents: BTreeMap<ContinentId, Continent>,
    pub adjacency: BTreeMap<TerritoryId, Vec<TerritoryId>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerritoryDef {
    pub continent: ContinentId,
    pub neighbors: Vec<TerritoryId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapTopology {
    territories: BTreeMap<TerritoryId, TerritoryDef>,
    continents: BTreeMap<ContinentId, Continent>,
}

impl MapTopology {
    /// Builds and validates a topology from a map definition.
    pub fn from_definition(definition: MapDefinition) -> Result<Self, MapError> {
        let mut territories: BTreeMap<TerritoryId, TerritoryDef> = BTreeMap::new();

        for (continent_id, continent) in &definition.continents {
            if continent.territories.is_empty() {
                return Err(MapError::EmptyContinent(continent_id.clone()));
            }
            for territory in &continent.territories {
                let def = TerritoryDef {
                    continent: continent_id.clone(),
                    neighbors: Vec::new(),
                };
                if territories.insert(territory.clone(), def).is_some() {
                    return Err(MapError::DuplicateTerritory(territory.clone()));
                }
            }
        }

        for (territory, neighbors) in &definition.adjacency {
            if !territories.contains_key(territory) {
                return Err(MapError::UnknownTerritory(territory.clone()));
            }
            for neighbor in neighbors {
                if neighbor == territory {
                    return Err(MapError::SelfLoop(territory.clone()));
                }
                if !territories.contains_key(neighbor) {
                    return Err(MapError::UnknownTerritory(neighbor.clone()));
                }
                let reverse = definition
                    .adjacency
                    .get(neighbor)
                    .map(|list| list.contains(territory))
                    .unwrap_or(false);
                if !reverse {
                    return Err(MapError::AsymmetricAdjacency(
                        territory.clone(),
                        neighbor.clone(),
                    ));
                }
            }
            if let Some(def) = territories.get_mut(territory) {
                let mut sorted: Vec<TerritoryId> = neighbors.clone();
                sorted.sort();
                sorted.dedup();
                def.neighbors = sorted;
            }
        }

        Ok(Self {
            territories,
            continents: definition.continents,
        })
    }

    /// Loads a custom map from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, MapError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, MapError> {
        let definition: MapDefinition = serde_json::from_str(raw)?;
        Self::from_definition(definition)
    }

    /// The classic 42-territory world map.
    pub fn classic() -> Self {
        let mut continents = BTreeMap::new();
        for (id, bonus, members) in CLASSIC_CONTINENTS {
            continents.insert(
                id.to_string(),
                Continent {
                    bonus: *bonus,
                    territories: members.iter().map(|t| t.to_string()).collect(),
                },
            );
        }

        let mut adjacency: BTreeMap<TerritoryId, Vec<TerritoryId>> = BTreeMap::new();
        for (a, b) in CLASSIC_BORDERS {
            adjacency.entry(a.to_string()).or_default().push(b.to_string());
            adjacency.entry(b.to_string()).or_default().push(a.to_string());
        }

        // The built-in tables are symmetric by construction.
        match Self::from_definition(MapDefinition {
            continents,
            adjacency,
        }) {
            Ok(map) => map,
            Err(e) => unreachable!("classic map tables are inconsistent: {}", e),
        }
    }

    pub fn territory(&self, id: &str) -> Option<&TerritoryDef> {
        self.territories.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.territories.contains_key(id)
    }

    /// Territory ids in sorted order.
    pub fn territory_ids(&self) -> impl Iterator<Item = &TerritoryId> {
        self.territories.keys()
    }

    pub fn territories(&self) -> impl Iterator<Item = (&TerritoryId, &TerritoryDef)> {
        self.territories.iter()
    }

    pub fn continents(&self) -> impl Iterator<Item = (&ContinentId, &Continent)> {
        self.continents.iter()
    }

    pub fn territory_count(&self) -> usize {
        self.territories.len()
    }

    pub fn are_adjacent(&self, a: &str, b: &str) -> bool {
        self.territories
            .get(a)
            .map(|def| def.neighbors.iter().any(|n| n == b))
            .unwrap_or(false)
    }

    /// Serializable form, used to publish custom maps to clients.
    pub fn to_definition(&self) -> MapDefinition {
        MapDefinition {
            continents: self.continents.clone(),
            adjacency: self
                .territories
                .iter()
                .map(|(id, def)| (id.clone(), def.neighbors.clone()))
                .collect(),
        }
    }
}

const CLASSIC_CONTINENTS: &[(&str, u32, &[&str])] = &[
    (
        "north_america",
        5,
        &[
            "alaska",
            "northwest_territory",
            "greenland",
            "alberta",
            "ontario",
            "quebec",
            "western_united_states",
            "eastern_united_states",
            "central_america",
        ],
    ),
    (
        "south_america",
        2,
        &["venezuela", "peru", "brazil", "argentina"],
    ),
    (
        "europe",
        5,
        &[
            "iceland",
            "scandinavia",
            "ukraine",
            "great_britain",
            "northern_europe",
            "western_europe",
            "southern_europe",
        ],
    ),
    (
        "africa",
        3,
        &[
            "north_africa",
            "egypt",
            "east_africa",
            "congo",
            "south_africa",
            "madagascar",
        ],
    ),
    (
        "asia",
        7,
        &[
            "ural",
            "siberia",
            "yakutsk",
            "kamchatka",
            "irkutsk",
            "mongolia",
            "japan",
            "afghanistan",
            "china",
            "middle_east",
            "india",
            "siam",
        ],
    ),
    (
        "australia",
        2,
        &[
            "indonesia",
            "new_guinea",
            "western_australia",
            "eastern_australia",
        ],
    ),
];

const CLASSIC_BORDERS: &[(&str, &str)] = &[
    ("alaska", "northwest_territory"),
    ("alaska", "alberta"),
    ("alaska", "kamchatka"),
    ("northwest_territory", "alberta"),
    ("northwest_territory", "ontario"),
    ("northwest_territory", "greenland"),
    ("greenland", "ontario"),
    ("greenland", "quebec"),
    ("greenland", "iceland"),
    ("alberta", "ontario"),
    ("alberta", "western_united_states"),
    ("ontario", "quebec"),
    ("ontario", "western_united_states"),
    ("ontario", "eastern_united_states"),
    ("quebec", "eastern_united_states"),
    ("western_united_states", "eastern_united_states"),
    ("western_united_states", "central_america"),
    ("eastern_united_states", "central_america"),
    ("central_america", "venezuela"),
    ("venezuela", "peru"),
    ("venezuela", "brazil"),
    ("peru", "brazil"),
    ("peru", "argentina"),
    ("brazil", "argentina"),
    ("brazil", "north_africa"),
    ("iceland", "great_britain"),
    ("iceland", "scandinavia"),
    ("scandinavia", "great_britain"),
    ("scandinavia", "northern_europe"),
    ("scandinavia", "ukraine"),
    ("great_britain", "northern_europe"),
    ("great_britain", "western_europe"),
    ("northern_europe", "western_europe"),
    ("northern_europe", "southern_europe"),
    ("northern_europe", "ukraine"),
    ("western_europe", "southern_europe"),
    ("western_europe", "north_africa"),
    ("southern_europe", "ukraine"),
    ("southern_europe", "middle_east"),
    ("southern_europe", "egypt"),
    ("southern_europe", "north_africa"),
    ("ukraine", "ural"),
    ("ukraine", "afghanistan"),
    ("ukraine", "middle_east"),
    ("north_africa", "egypt"),
    ("north_africa", "east_africa"),
    ("north_africa", "congo"),
    ("egypt", "east_africa"),
    ("egypt", "middle_east"),
    ("east_africa", "congo"),
    ("east_africa", "south_africa"),
    ("east_africa", "madagascar"),
    ("east_africa", "middle_east"),
    ("congo", "south_africa"),
    ("south_africa", "madagascar"),
    ("ural", "siberia"),
    ("ural", "china"),
    ("ural", "afghanistan"),
    ("siberia", "yakutsk"),
    ("siberia", "irkutsk"),
    ("siberia", "mongolia"),
    ("siberia", "china"),
    ("yakutsk", "kamchatka"),
    ("yakutsk", "irkutsk"),
    ("kamchatka", "irkutsk"),
    ("kamchatka", "mongolia"),
    ("kamchatka", "japan"),
    ("irkutsk", "mongolia"),
    ("mongolia", "china"),
    ("mongolia", "japan"),
    ("afghanistan", "china"),
    ("afghanistan", "india"),
    ("afghanistan", "middle_east"),
    ("china", "india"),
    ("china", "siam"),
    ("middle_east", "india"),
    ("india", "siam"),
    ("siam", "indonesia"),
    ("indonesia", "new_guinea"),
    ("indonesia", "western_australia"),
    ("new_guinea", "eastern_australia"),
    ("new_guinea", "western_australia"),
    ("western_australia", "eastern_australia"),
];
