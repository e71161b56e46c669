use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::{Deserialize, Serialize};

use super::persons::fetch_person;
use super::{is_unique_violation, Store};
use crate::error::{RelgraphError, Result};

pub const DEFAULT_KIND: &str = "profesional";
pub const DEFAULT_STRENGTH: i64 = 5;
pub const MIN_STRENGTH: i64 = 1;
pub const MAX_STRENGTH: i64 = 10;

/// A typed, weighted association between two persons. Undirected in meaning;
/// the endpoint order is whatever the creator supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: i64,
    pub persona1_id: i64,
    pub persona2_id: i64,
    #[serde(rename = "tipo")]
    pub kind: String,
    #[serde(rename = "fortaleza")]
    pub strength: i64,
    #[serde(rename = "contexto")]
    pub context: String,
    #[serde(rename = "fecha_creacion")]
    pub created_at: Option<String>,
}

impl Relationship {
    /// True when `person_id` is either endpoint.
    pub fn touches(&self, person_id: i64) -> bool {
        self.persona1_id == person_id || self.persona2_id == person_id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            persona1_id: row.get(1)?,
            persona2_id: row.get(2)?,
            kind: row.get::<_, Option<String>>(3)?.unwrap_or_else(|| DEFAULT_KIND.to_string()),
            strength: row.get::<_, Option<i64>>(4)?.unwrap_or(DEFAULT_STRENGTH),
            context: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            created_at: row.get(6)?,
        })
    }
}

/// A relationship joined with the display names of both endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipWithNames {
    #[serde(flatten)]
    pub relationship: Relationship,
    #[serde(rename = "persona1_nombre")]
    pub persona1_name: String,
    #[serde(rename = "persona2_nombre")]
    pub persona2_name: String,
}

/// Input for [`Store::create_relationship`].
#[derive(Debug, Clone, Default)]
pub struct NewRelationship {
    pub persona1_id: i64,
    pub persona2_id: i64,
    pub kind: Option<String>,
    pub strength: Option<i64>,
    pub context: Option<String>,
}

fn pair_exists(conn: &Connection, a: i64, b: i64) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM relaciones \
             WHERE (persona1_id = ?1 AND persona2_id = ?2) OR (persona1_id = ?2 AND persona2_id = ?1)",
            params![a, b],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

impl Store {
    /// All relationships with endpoint names, most recently created first
    pub async fn list_relationships_with_names(&self) -> Result<Vec<RelationshipWithNames>> {
        self.db
            .with_connection(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT r.id, r.persona1_id, r.persona2_id, r.tipo, r.fortaleza, r.contexto, \
                            r.fecha_creacion, p1.nombre, p2.nombre \
                     FROM relaciones r \
                     JOIN personas p1 ON r.persona1_id = p1.id \
                     JOIN personas p2 ON r.persona2_id = p2.id \
                     ORDER BY r.fecha_creacion DESC, r.id DESC",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(RelationshipWithNames {
                            relationship: Relationship::from_row(row)?,
                            persona1_name: row.get(7)?,
                            persona2_name: row.get(8)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
                Ok(rows)
            })
            .await
    }

    pub async fn get_relationship(&self, id: i64) -> Result<Option<Relationship>> {
        self.db
            .with_connection(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT id, persona1_id, persona2_id, tipo, fortaleza, contexto, fecha_creacion \
                         FROM relaciones WHERE id = ?1",
                        [id],
                        Relationship::from_row,
                    )
                    .optional()?)
            })
            .await
    }

    /// Insert a relationship and return its generated id.
    ///
    /// Self-relationships and strengths outside 1..=10 are `Validation` errors,
    /// a missing endpoint is `NotFound`, and a second relationship for the same
    /// unordered pair is `DuplicateRelationship`. All checks run before the insert.
    pub async fn create_relationship(&self, new: NewRelationship) -> Result<i64> {
        let (a, b) = (new.persona1_id, new.persona2_id);
        if a == b {
            return Err(RelgraphError::Validation(
                "a person cannot have a relationship with themselves".to_string(),
            ));
        }
        let strength = new.strength.unwrap_or(DEFAULT_STRENGTH);
        if !(MIN_STRENGTH..=MAX_STRENGTH).contains(&strength) {
            return Err(RelgraphError::Validation(format!(
                "strength must be between {} and {}, got {}",
                MIN_STRENGTH, MAX_STRENGTH, strength
            )));
        }
        let kind = match new.kind.as_deref().map(str::trim) {
            Some(k) if !k.is_empty() => k.to_string(),
            _ => DEFAULT_KIND.to_string(),
        };
        let context = new.context.unwrap_or_default();

        self.db
            .with_connection(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                for id in [a, b] {
                    if fetch_person(&tx, id)?.is_none() {
                        return Err(RelgraphError::NotFound(format!("person {}", id)));
                    }
                }
                if pair_exists(&tx, a, b)? {
                    return Err(RelgraphError::DuplicateRelationship(a, b));
                }
                let inserted = tx.execute(
                    "INSERT INTO relaciones (persona1_id, persona2_id, tipo, fortaleza, contexto) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![a, b, kind, strength, context],
                );
                match inserted {
                    Err(e) if is_unique_violation(&e) => {
                        return Err(RelgraphError::DuplicateRelationship(a, b))
                    }
                    Err(e) => return Err(e.into()),
                    Ok(_) => {}
                }
                let id = tx.last_insert_rowid();
                tx.commit()?;
                log::info!("Created relationship {} ({} <-> {}, {})", id, a, b, kind);
                Ok(id)
            })
            .await
    }

    /// Delete one relationship. Returns true when a row was removed.
    pub async fn delete_relationship(&self, id: i64) -> Result<bool> {
        self.db
            .with_connection(move |conn| {
                let affected = conn.execute("DELETE FROM relaciones WHERE id = ?1", [id])?;
                Ok(affected > 0)
            })
            .await
    }
}
