//! Cross-boundary types shared by the writ core, the SQLite host, and the CLI.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;

/// Hard cap on the encoded inscription of one contract, in characters.
pub const MAX_INSCRIPTION_LEN: usize = 500;

/// Number of hidden trait slots carried by an animal.
pub const TRAIT_SLOTS: u32 = 64;

/// Skill a viewer must exceed before any trait becomes visible when gating is on.
pub const TRAIT_GATE_OFFSET: f64 = 20.0;

/// Stable identifier of a host entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = std::num::ParseIntError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        raw.parse::<u64>().map(Self)
    }
}

/// Identifier of the host item whose inscription backs a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(pub u64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DocumentId {
    type Err = std::num::ParseIntError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        raw.parse::<u64>().map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Animal,
    Player,
    ScriptedNpc,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Animal => "animal",
            Self::Player => "player",
            Self::ScriptedNpc => "scripted_npc",
        }
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "animal" => Ok(Self::Animal),
            "player" => Ok(Self::Player),
            "scripted_npc" | "npc" => Ok(Self::ScriptedNpc),
            other => Err(format!("unknown entity kind: {other}")),
        }
    }
}

/// A resolved, live entity as handed out by the host's entity lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityRef {
    pub id: EntityId,
    pub kind: EntityKind,
}

impl EntityRef {
    pub fn new(id: EntityId, kind: EntityKind) -> Self {
        Self { id, kind }
    }

    pub fn animal(id: u64) -> Self {
        Self::new(EntityId(id), EntityKind::Animal)
    }

    pub fn is_player_controlled(&self) -> bool {
        self.kind == EntityKind::Player
    }

    pub fn is_scripted_non_player(&self) -> bool {
        self.kind == EntityKind::ScriptedNpc
    }

    /// Only plain animals may be written onto a contract.
    pub fn is_eligible(&self) -> bool {
        !self.is_player_controlled() && !self.is_scripted_non_player()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ItemKind {
    AnimalContract,
    Other(String),
}

impl ItemKind {
    pub const ANIMAL_CONTRACT: &'static str = "writ.animal";

    pub fn as_str(&self) -> &str {
        match self {
            Self::AnimalContract => Self::ANIMAL_CONTRACT,
            Self::Other(name) => name.as_str(),
        }
    }

    pub fn parse(raw: &str) -> Self {
        if raw == Self::ANIMAL_CONTRACT {
            Self::AnimalContract
        } else {
            Self::Other(raw.to_string())
        }
    }

    pub fn is_animal_contract(&self) -> bool {
        matches!(self, Self::AnimalContract)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRecord {
    pub item_id: DocumentId,
    pub kind: ItemKind,
    pub owner_id: Option<EntityId>,
    pub value: u32,
}

/// One persisted inscription, as enumerated at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRecord {
    pub document_id: DocumentId,
    pub kind: ItemKind,
    pub text: Option<String>,
}

/// Display data the management view needs for one animal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnimalProfile {
    pub entity: EntityRef,
    pub name: String,
    pub species: String,
    pub colour: String,
    pub traits: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimalAge {
    pub entity_id: EntityId,
    pub age: u32,
    pub lifespan: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraitSummary {
    pub count_label: String,
    pub detail_text: String,
}

impl TraitSummary {
    pub fn new(count_label: impl Into<String>, detail_text: impl Into<String>) -> Self {
        Self {
            count_label: count_label.into(),
            detail_text: detail_text.into(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Serde(serde_json::Error),
    NotAnObject,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "config io error: {err}"),
            Self::Serde(err) => write!(f, "config parse error: {err}"),
            Self::NotAnObject => write!(f, "config root must be a JSON object"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct WritConfig {
    pub contract_price_in_irons: u32,
    pub use_animal_husbandry_for_traits: bool,
    pub aging_worker_threads: u8,
}

impl Default for WritConfig {
    fn default() -> Self {
        Self {
            contract_price_in_irons: 1000,
            use_animal_husbandry_for_traits: false,
            aging_worker_threads: 1,
        }
    }
}

/// Keys older configs carry that this system does not act on.
const UNSUPPORTED_KEYS: [&str; 2] = ["update_traders", "contracts_on_traders"];

impl WritConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_lenient(&raw)
    }

    /// Parses a config object. A well-formed object deserializes in one go;
    /// otherwise each field is read on its own, and a field with the wrong
    /// type keeps its default and is reported, so one bad value never
    /// rejects the file.
    pub fn from_json_lenient(raw: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_json::from_str(raw)?;
        let Value::Object(fields) = &value else {
            return Err(ConfigError::NotAnObject);
        };
        let mut config = match serde_json::from_value::<Self>(value.clone()) {
            Ok(config) => config,
            Err(_) => Self::fields_leniently(fields),
        };
        config.aging_worker_threads = config.aging_worker_threads.max(1);
        Ok(config)
    }

    fn fields_leniently(fields: &serde_json::Map<String, Value>) -> Self {
        let mut config = Self::default();
        for (key, raw) in fields {
            match key.as_str() {
                "contract_price_in_irons" => {
                    read_field(key, raw, &mut config.contract_price_in_irons)
                }
                "use_animal_husbandry_for_traits" => {
                    read_field(key, raw, &mut config.use_animal_husbandry_for_traits)
                }
                "aging_worker_threads" => read_field(key, raw, &mut config.aging_worker_threads),
                other if UNSUPPORTED_KEYS.contains(&other) => {
                    tracing::warn!(key = other, "config key is not supported, ignoring");
                }
                other => tracing::warn!(key = other, "unknown config key, ignoring"),
            }
        }
        config
    }
}

fn read_field<T: serde::de::DeserializeOwned>(name: &str, raw: &Value, slot: &mut T) {
    match serde_json::from_value::<T>(raw.clone()) {
        Ok(parsed) => *slot = parsed,
        Err(err) => {
            tracing::warn!(field = name, value = %raw, %err, "invalid config value, using default");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lenient_config_keeps_defaults_for_bad_fields() {
        let config = WritConfig::from_json_lenient(
            r#"{"contract_price_in_irons":"lots","use_animal_husbandry_for_traits":true}"#,
        )
        .expect("object parses");
        assert_eq!(config.contract_price_in_irons, 1000);
        assert!(config.use_animal_husbandry_for_traits);
        assert_eq!(config.aging_worker_threads, 1);
    }

    #[test]
    fn lenient_config_rejects_non_object_root() {
        let err = WritConfig::from_json_lenient("[1,2]").expect_err("array root");
        assert!(matches!(err, ConfigError::NotAnObject));
    }

    #[test]
    fn well_formed_config_deserializes_whole() {
        let config = WritConfig::from_json_lenient(
            r#"{"contract_price_in_irons":250,"aging_worker_threads":0}"#,
        )
        .expect("object parses");
        assert_eq!(config.contract_price_in_irons, 250);
        assert!(!config.use_animal_husbandry_for_traits);
        assert_eq!(config.aging_worker_threads, 1);
    }

    #[test]
    fn trader_keys_are_ignored_without_dropping_known_fields() {
        let config = WritConfig::from_json_lenient(
            r#"{"contract_price_in_irons":40,"update_traders":true,"contracts_on_traders":2}"#,
        )
        .expect("object parses");
        assert_eq!(
            config,
            WritConfig {
                contract_price_in_irons: 40,
                ..WritConfig::default()
            }
        );
    }

    #[test]
    fn eligibility_excludes_players_and_scripted_npcs() {
        assert!(EntityRef::animal(1).is_eligible());
        assert!(!EntityRef::new(EntityId(2), EntityKind::Player).is_eligible());
        assert!(!EntityRef::new(EntityId(3), EntityKind::ScriptedNpc).is_eligible());
    }

    #[test]
    fn item_kind_round_trips_contract_tag() {
        assert!(ItemKind::parse("writ.animal").is_animal_contract());
        assert_eq!(ItemKind::parse("papyrus").as_str(), "papyrus");
    }
}
