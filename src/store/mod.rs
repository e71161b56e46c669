//! Entity repository: persons and relationships over SQLite.
//!
//! Every mutating operation validates its input before touching storage and
//! runs multi-statement work inside a single transaction.

mod persons;
mod relationships;

pub use persons::{
    parse_position_entries, GroupUpdate, NewPerson, Person, PersonPatch, PositionEntry,
    DEFAULT_COLOR, DEFAULT_GROUP, DEFAULT_ICON,
};
pub use relationships::{
    NewRelationship, Relationship, RelationshipWithNames, DEFAULT_KIND, DEFAULT_STRENGTH,
    MAX_STRENGTH, MIN_STRENGTH,
};

use crate::db::Db;
use crate::error::Result;

/// Repository handle; cheap to clone, every call opens its own connection.
#[derive(Debug, Clone)]
pub struct Store {
    db: Db,
}

impl Store {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Number of (persons, relationships) currently stored
    pub async fn counts(&self) -> Result<(usize, usize)> {
        self.db
            .with_connection(|conn| {
                let persons: i64 = conn.query_row("SELECT COUNT(*) FROM personas", [], |row| row.get(0))?;
                let relationships: i64 =
                    conn.query_row("SELECT COUNT(*) FROM relaciones", [], |row| row.get(0))?;
                Ok((persons as usize, relationships as usize))
            })
            .await
    }
}

/// True when `err` is SQLite rejecting a row because of a UNIQUE constraint or index.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == rusqlite::ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        }
        _ => false,
    }
}
