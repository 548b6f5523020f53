use std::fmt;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension, Row};
use writ_core::{
    AgeOutcome, AgingResult, AnimalDirectory, ControlPolicy, DocumentCatalog, DocumentStore,
    EntityLookup, ItemRegistry, StoreError, TrustSource,
};
use writ_types::{
    AnimalAge, AnimalProfile, DocumentId, DocumentRecord, EntityId, EntityKind, EntityRef,
    ItemKind, ItemRecord,
};

#[derive(Debug)]
pub enum PersistenceError {
    Sqlite(rusqlite::Error),
    NotAttached,
    UnknownEntityKind(String),
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite error: {err}"),
            Self::NotAttached => write!(f, "sqlite store is not attached"),
            Self::UnknownEntityKind(kind) => write!(f, "unknown entity kind in store: {kind}"),
        }
    }
}

impl std::error::Error for PersistenceError {}

impl From<rusqlite::Error> for PersistenceError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// A creature, player or NPC to insert into the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntity {
    pub kind: EntityKind,
    pub name: String,
    pub species: String,
    pub colour: String,
    pub traits: u64,
    pub lifespan: u32,
    pub owner_id: Option<EntityId>,
}

impl NewEntity {
    pub fn animal(name: &str, species: &str, colour: &str) -> Self {
        Self {
            kind: EntityKind::Animal,
            name: name.to_string(),
            species: species.to_string(),
            colour: colour.to_string(),
            traits: 0,
            lifespan: 0,
            owner_id: None,
        }
    }

    pub fn player(name: &str) -> Self {
        Self {
            kind: EntityKind::Player,
            ..Self::animal(name, "human", "")
        }
    }
}

/// What one committed aging pass changed on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgingCommit {
    pub aged: usize,
    pub expired: Vec<EntityId>,
    pub failed: Vec<EntityId>,
}

// Ids and trait masks are u64 on the Rust side and stored bit-for-bit in
// sqlite's signed INTEGER columns.
fn to_sql(value: u64) -> i64 {
    value as i64
}

fn from_sql(value: i64) -> u64 {
    value as u64
}

fn backend(err: rusqlite::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn parse_kind(raw: &str) -> Result<EntityKind, PersistenceError> {
    raw.parse::<EntityKind>()
        .map_err(|_| PersistenceError::UnknownEntityKind(raw.to_string()))
}

#[derive(Debug)]
pub struct SqliteWritStore {
    conn: Connection,
}

impl SqliteWritStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let conn = Connection::open(path)?;
        let mut store = Self { conn };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory()?;
        let mut store = Self { conn };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    /// Inserts an item with no inscription row.
    pub fn insert_item(
        &self,
        kind: &ItemKind,
        owner_id: Option<EntityId>,
        value: u32,
    ) -> Result<DocumentId, PersistenceError> {
        self.conn.execute(
            "INSERT INTO items (kind, owner_id, value) VALUES (?1, ?2, ?3)",
            params![
                kind.as_str(),
                owner_id.map(|owner| to_sql(owner.0)),
                i64::from(value)
            ],
        )?;
        Ok(DocumentId(from_sql(self.conn.last_insert_rowid())))
    }

    pub fn insert_entity(&self, entity: &NewEntity) -> Result<EntityRef, PersistenceError> {
        self.conn.execute(
            "INSERT INTO animals (
                kind,
                name,
                species,
                colour,
                traits,
                age,
                lifespan,
                owner_id
             ) VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7)",
            params![
                entity.kind.as_str(),
                entity.name,
                entity.species,
                entity.colour,
                to_sql(entity.traits),
                i64::from(entity.lifespan),
                entity.owner_id.map(|owner| to_sql(owner.0)),
            ],
        )?;
        let id = EntityId(from_sql(self.conn.last_insert_rowid()));
        Ok(EntityRef::new(id, entity.kind))
    }

    pub fn set_breeding_skill(&self, viewer: EntityId, score: f64) -> Result<(), PersistenceError> {
        self.conn.execute(
            "INSERT INTO skills (entity_id, breeding) VALUES (?1, ?2)
             ON CONFLICT(entity_id) DO UPDATE SET breeding = excluded.breeding",
            params![to_sql(viewer.0), score],
        )?;
        Ok(())
    }

    /// Age records for every stored animal, in id order.
    pub fn list_ages(&self) -> Result<Vec<AnimalAge>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_id, age, lifespan
             FROM animals
             WHERE kind = 'animal'
             ORDER BY entity_id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(AnimalAge {
                entity_id: EntityId(from_sql(row.get(0)?)),
                age: u32::try_from(row.get::<_, i64>(1)?).unwrap_or(u32::MAX),
                lifespan: u32::try_from(row.get::<_, i64>(2)?).unwrap_or(0),
            })
        })?;

        let mut ages = Vec::new();
        for row in rows {
            ages.push(row?);
        }
        Ok(ages)
    }

    /// Writes one aging pass in a single transaction. Expired animals are
    /// deleted; contracts that list them keep the stale id until next saved.
    pub fn commit_aging(&mut self, results: &[AgingResult]) -> Result<AgingCommit, PersistenceError> {
        let tx = self.conn.transaction()?;
        let mut commit = AgingCommit::default();

        for result in results {
            let id = to_sql(result.entity_id.0);
            match &result.outcome {
                Ok(AgeOutcome::Unchanged) => {}
                Ok(AgeOutcome::Aged { age }) => {
                    tx.execute(
                        "UPDATE animals SET age = ?2 WHERE entity_id = ?1",
                        params![id, i64::from(*age)],
                    )?;
                    commit.aged += 1;
                }
                Ok(AgeOutcome::Expired { .. }) => {
                    tx.execute("DELETE FROM animals WHERE entity_id = ?1", params![id])?;
                    commit.expired.push(result.entity_id);
                }
                Err(err) => {
                    tracing::warn!(entity = %result.entity_id, error = %err, "aging failed");
                    commit.failed.push(result.entity_id);
                }
            }
        }

        tx.commit()?;
        Ok(commit)
    }

    fn load_entity(&self, id: EntityId) -> Result<Option<(EntityRef, EntityRow)>, PersistenceError> {
        let row = self
            .conn
            .query_row(
                "SELECT kind, name, species, colour, traits, owner_id
                 FROM animals
                 WHERE entity_id = ?1",
                params![to_sql(id.0)],
                EntityRow::read,
            )
            .optional()?;

        match row {
            Some(row) => {
                let kind = parse_kind(&row.kind)?;
                Ok(Some((EntityRef::new(id, kind), row)))
            }
            None => Ok(None),
        }
    }

    fn configure(&mut self) -> Result<(), PersistenceError> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }

    fn migrate(&mut self) -> Result<(), PersistenceError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS items (
                item_id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                owner_id INTEGER,
                value INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS inscriptions (
                item_id INTEGER PRIMARY KEY REFERENCES items(item_id) ON DELETE CASCADE,
                text TEXT
            );

            CREATE TABLE IF NOT EXISTS animals (
                entity_id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                name TEXT NOT NULL,
                species TEXT NOT NULL,
                colour TEXT NOT NULL,
                traits INTEGER NOT NULL DEFAULT 0,
                age INTEGER NOT NULL DEFAULT 0,
                lifespan INTEGER NOT NULL DEFAULT 0,
                owner_id INTEGER
            );

            CREATE TABLE IF NOT EXISTS skills (
                entity_id INTEGER PRIMARY KEY,
                breeding REAL NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_items_kind ON items(kind);
            CREATE INDEX IF NOT EXISTS idx_animals_kind ON animals(kind);
            ",
        )?;

        self.conn.execute(
            "INSERT OR IGNORE INTO schema_migrations(version, name, applied_at)
             VALUES(1, 'initial_v1', 'startup')",
            [],
        )?;

        Ok(())
    }

    fn item_exists(&self, document: DocumentId) -> Result<bool, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT 1 FROM items WHERE item_id = ?1",
                params![to_sql(document.0)],
                |_| Ok(()),
            )
            .optional()
            .map(|found| found.is_some())
    }
}

/// Raw columns of one `animals` row.
#[derive(Debug)]
struct EntityRow {
    kind: String,
    name: String,
    species: String,
    colour: String,
    traits: i64,
    owner_id: Option<i64>,
}

impl EntityRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            kind: row.get(0)?,
            name: row.get(1)?,
            species: row.get(2)?,
            colour: row.get(3)?,
            traits: row.get(4)?,
            owner_id: row.get(5)?,
        })
    }
}

impl DocumentStore for SqliteWritStore {
    fn get_text(&self, document: DocumentId) -> Result<Option<String>, StoreError> {
        if !self.item_exists(document).map_err(backend)? {
            return Err(StoreError::UnknownDocument(document));
        }
        let text: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT text FROM inscriptions WHERE item_id = ?1",
                params![to_sql(document.0)],
                |row| row.get(0),
            )
            .optional()
            .map_err(backend)?;
        Ok(text.flatten())
    }

    fn set_text(&self, document: DocumentId, text: &str) -> Result<(), StoreError> {
        if !self.item_exists(document).map_err(backend)? {
            return Err(StoreError::UnknownDocument(document));
        }
        self.conn
            .execute(
                "INSERT INTO inscriptions (item_id, text) VALUES (?1, ?2)
                 ON CONFLICT(item_id) DO UPDATE SET text = excluded.text",
                params![to_sql(document.0), text],
            )
            .map_err(backend)?;
        Ok(())
    }
}

impl DocumentCatalog for SqliteWritStore {
    fn documents(&self) -> Result<Vec<DocumentRecord>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT items.item_id, items.kind, inscriptions.text
                 FROM inscriptions
                 JOIN items ON items.item_id = inscriptions.item_id
                 ORDER BY items.item_id ASC",
            )
            .map_err(backend)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(DocumentRecord {
                    document_id: DocumentId(from_sql(row.get(0)?)),
                    kind: ItemKind::parse(&row.get::<_, String>(1)?),
                    text: row.get(2)?,
                })
            })
            .map_err(backend)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(backend)?);
        }
        Ok(records)
    }
}

impl EntityLookup for SqliteWritStore {
    fn resolve(&self, id: EntityId) -> Option<EntityRef> {
        match self.load_entity(id) {
            Ok(found) => found.map(|(entity, _)| entity),
            Err(err) => {
                tracing::warn!(entity = %id, error = %err, "entity lookup failed");
                None
            }
        }
    }
}

impl AnimalDirectory for SqliteWritStore {
    fn profile(&self, id: EntityId) -> Option<AnimalProfile> {
        match self.load_entity(id) {
            Ok(found) => found.map(|(entity, row)| AnimalProfile {
                entity,
                name: row.name,
                species: row.species,
                colour: row.colour,
                traits: from_sql(row.traits),
            }),
            Err(err) => {
                tracing::warn!(entity = %id, error = %err, "profile lookup failed");
                None
            }
        }
    }
}

impl ItemRegistry for SqliteWritStore {
    fn item(&self, id: DocumentId) -> Option<ItemRecord> {
        let found = self
            .conn
            .query_row(
                "SELECT kind, owner_id, value FROM items WHERE item_id = ?1",
                params![to_sql(id.0)],
                |row| {
                    Ok(ItemRecord {
                        item_id: id,
                        kind: ItemKind::parse(&row.get::<_, String>(0)?),
                        owner_id: row.get::<_, Option<i64>>(1)?.map(|owner| EntityId(from_sql(owner))),
                        value: u32::try_from(row.get::<_, i64>(2)?).unwrap_or(0),
                    })
                },
            )
            .optional();

        match found {
            Ok(item) => item,
            Err(err) => {
                tracing::warn!(item = %id, error = %err, "item lookup failed");
                None
            }
        }
    }
}

impl ControlPolicy for SqliteWritStore {
    fn may_control(&self, performer: EntityId, target: EntityId) -> bool {
        match self.load_entity(target) {
            Ok(Some((_, row))) => row
                .owner_id
                .map_or(true, |owner| from_sql(owner) == performer.0),
            Ok(None) => false,
            Err(err) => {
                tracing::warn!(entity = %target, error = %err, "control check failed");
                false
            }
        }
    }
}

impl TrustSource for SqliteWritStore {
    fn trust_score_for(&self, viewer: EntityId) -> Option<f64> {
        let found = self
            .conn
            .query_row(
                "SELECT breeding FROM skills WHERE entity_id = ?1",
                params![to_sql(viewer.0)],
                |row| row.get::<_, f64>(0),
            )
            .optional();

        match found {
            Ok(score) => score,
            Err(err) => {
                tracing::warn!(viewer = %viewer, error = %err, "skill lookup failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteWritStore {
        SqliteWritStore::open_in_memory().expect("in-memory store should open")
    }

    #[test]
    fn inscription_absent_until_written() {
        let store = store();
        let writ = store
            .insert_item(&ItemKind::AnimalContract, None, 1000)
            .expect("insert item");

        assert_eq!(store.get_text(writ), Ok(None));
        store.set_text(writ, "11\n22").expect("write");
        assert_eq!(store.get_text(writ), Ok(Some("11\n22".to_string())));
        store.set_text(writ, "").expect("overwrite");
        assert_eq!(store.get_text(writ), Ok(Some(String::new())));
    }

    #[test]
    fn unknown_item_is_rejected() {
        let store = store();
        let missing = DocumentId(404);
        assert_eq!(
            store.get_text(missing),
            Err(StoreError::UnknownDocument(missing))
        );
        assert_eq!(
            store.set_text(missing, "1"),
            Err(StoreError::UnknownDocument(missing))
        );
    }

    #[test]
    fn catalog_lists_only_inscribed_items() {
        let store = store();
        let writ = store
            .insert_item(&ItemKind::AnimalContract, None, 0)
            .expect("writ");
        let letter = store
            .insert_item(&ItemKind::Other("papyrus".to_string()), None, 0)
            .expect("letter");
        store
            .insert_item(&ItemKind::AnimalContract, None, 0)
            .expect("blank writ");
        store.set_text(writ, "5").expect("write writ");
        store.set_text(letter, "dear rolf").expect("write letter");

        let documents = store.documents().expect("documents");
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].document_id, writ);
        assert!(documents[0].kind.is_animal_contract());
        assert_eq!(documents[1].kind, ItemKind::Other("papyrus".to_string()));
    }

    #[test]
    fn entities_resolve_with_kind_and_profile() {
        let store = store();
        let mut spider = NewEntity::animal("Itsy", "spider", "black");
        spider.traits = (1 << 63) | 1;
        let spider = store.insert_entity(&spider).expect("spider");
        let player = store.insert_entity(&NewEntity::player("Rolf")).expect("player");

        assert_eq!(store.resolve(spider.id), Some(spider));
        assert!(store.resolve(player.id).map_or(false, |found| found.is_player_controlled()));
        let profile = store.profile(spider.id).expect("profile");
        assert_eq!(profile.species, "spider");
        assert_eq!(profile.traits, (1 << 63) | 1);
        assert_eq!(store.resolve(EntityId(9_999)), None);
    }

    #[test]
    fn control_follows_animal_owner() {
        let store = store();
        let rolf = store.insert_entity(&NewEntity::player("Rolf")).expect("rolf");
        let mallory = store.insert_entity(&NewEntity::player("Mallory")).expect("mallory");
        let stray = store
            .insert_entity(&NewEntity::animal("Stray", "dog", "grey"))
            .expect("stray");
        let mut kept = NewEntity::animal("Rex", "dog", "brown");
        kept.owner_id = Some(rolf.id);
        let kept = store.insert_entity(&kept).expect("kept");

        assert!(store.may_control(mallory.id, stray.id));
        assert!(store.may_control(rolf.id, kept.id));
        assert!(!store.may_control(mallory.id, kept.id));
    }

    #[test]
    fn skills_upsert() {
        let store = store();
        let viewer = EntityId(7);
        assert_eq!(store.trust_score_for(viewer), None);
        store.set_breeding_skill(viewer, 12.5).expect("skill");
        store.set_breeding_skill(viewer, 30.0).expect("skill again");
        assert_eq!(store.trust_score_for(viewer), Some(30.0));
    }

    #[test]
    fn aging_commit_updates_and_deletes() {
        let mut store = store();
        let young = store
            .insert_entity(&NewEntity::animal("Foal", "horse", "white"))
            .expect("young");
        let old = store
            .insert_entity(&NewEntity::animal("Nag", "horse", "grey"))
            .expect("old");

        let commit = store
            .commit_aging(&[
                AgingResult {
                    entity_id: young.id,
                    outcome: Ok(AgeOutcome::Aged { age: 1 }),
                },
                AgingResult {
                    entity_id: old.id,
                    outcome: Ok(AgeOutcome::Expired { age: 40 }),
                },
            ])
            .expect("commit");

        assert_eq!(commit.aged, 1);
        assert_eq!(commit.expired, vec![old.id]);
        let ages = store.list_ages().expect("ages");
        assert_eq!(ages.len(), 1);
        assert_eq!(ages[0].age, 1);
        assert_eq!(store.resolve(old.id), None);
    }
}
