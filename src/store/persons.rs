use std::collections::BTreeMap;

use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{is_unique_violation, Store};
use crate::error::{RelgraphError, Result};

pub const DEFAULT_ICON: &str = "user";
pub const DEFAULT_GROUP: &str = "contactos";
pub const DEFAULT_COLOR: &str = "#3b82f6";

const PERSON_COLUMNS: &str = "id, nombre, icono, grupo, color, descripcion, \
     posicion_x, posicion_y, imagen_url, es_principal, fecha_creacion";

/// A person (graph node candidate).
///
/// Serialized with the column names the visualization front end reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: i64,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "icono")]
    pub icon: String,
    #[serde(rename = "grupo")]
    pub group: String,
    pub color: String,
    #[serde(rename = "descripcion")]
    pub description: String,
    #[serde(rename = "posicion_x")]
    pub x: Option<f64>,
    #[serde(rename = "posicion_y")]
    pub y: Option<f64>,
    #[serde(rename = "imagen_url")]
    pub image_url: Option<String>,
    /// Distinguished primary person, rendered larger.
    #[serde(rename = "es_principal")]
    pub is_root: bool,
    #[serde(rename = "fecha_creacion")]
    pub created_at: Option<String>,
}

impl Person {
    /// Stored position; only reported when both coordinates are present.
    pub fn position(&self) -> Option<(f64, f64)> {
        match (self.x, self.y) {
            (Some(x), Some(y)) => Some((x, y)),
            _ => None,
        }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            icon: row.get::<_, Option<String>>(2)?.unwrap_or_else(|| DEFAULT_ICON.to_string()),
            group: row.get::<_, Option<String>>(3)?.unwrap_or_else(|| DEFAULT_GROUP.to_string()),
            color: row.get::<_, Option<String>>(4)?.unwrap_or_else(|| DEFAULT_COLOR.to_string()),
            description: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            x: row.get(6)?,
            y: row.get(7)?,
            image_url: row.get(8)?,
            is_root: row.get(9)?,
            created_at: row.get(10)?,
        })
    }
}

/// Input for [`Store::create_person`]. Absent or blank optional fields take their defaults.
#[derive(Debug, Clone, Default)]
pub struct NewPerson {
    pub name: String,
    pub icon: Option<String>,
    pub group: Option<String>,
    pub color: Option<String>,
    pub description: Option<String>,
    pub is_root: bool,
}

/// Partial update for [`Store::update_person`]; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct PersonPatch {
    pub name: Option<String>,
    pub icon: Option<String>,
    pub group: Option<String>,
    pub color: Option<String>,
    pub description: Option<String>,
    pub is_root: Option<bool>,
    pub position: Option<(f64, f64)>,
}

/// One validated entry of a batch position update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionEntry {
    pub id: i64,
    pub x: f64,
    pub y: f64,
}

/// One entry of a batch group update; entries without an id are skipped.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GroupUpdate {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default, rename = "grupo")]
    pub group: Option<String>,
}

/// Parse a `{ "<id>": {"x": .., "y": ..} }` object, dropping entries whose id is not an
/// integer or whose coordinates are missing, non-numeric or not finite.
/// Numeric strings are accepted for both ids and coordinates.
pub fn parse_position_entries(raw: &Map<String, Value>) -> Vec<PositionEntry> {
    raw.iter()
        .filter_map(|(key, xy)| {
            let id = key.trim().parse::<i64>().ok()?;
            let x = coordinate(xy.get("x")?)?;
            let y = coordinate(xy.get("y")?)?;
            Some(PositionEntry { id, x, y })
        })
        .collect()
}

fn coordinate(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn validate_name(raw: &str) -> Result<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(RelgraphError::Validation("name is required".to_string()));
    }
    Ok(name.to_string())
}

fn text_or_default(value: Option<String>, default: &str) -> String {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => default.to_string(),
    }
}

fn normalize_color(value: Option<String>) -> Result<String> {
    let color = text_or_default(value, DEFAULT_COLOR);
    if is_hex_color(&color) {
        Ok(color)
    } else {
        Err(RelgraphError::Validation(format!("color must be a hex value like #3b82f6, got {:?}", color)))
    }
}

fn is_hex_color(s: &str) -> bool {
    match s.strip_prefix('#') {
        Some(hex) => matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

/// True when another person (other than `except`) already uses `name`.
fn name_taken(conn: &Connection, name: &str, except: Option<i64>) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM personas WHERE nombre = ?1 AND id != ?2",
            params![name, except.unwrap_or(-1)],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub(super) fn fetch_person(conn: &Connection, id: i64) -> Result<Option<Person>> {
    let sql = format!("SELECT {} FROM personas WHERE id = ?1", PERSON_COLUMNS);
    Ok(conn.query_row(&sql, [id], Person::from_row).optional()?)
}

impl Store {
    /// All persons ordered by name
    pub async fn list_persons(&self) -> Result<Vec<Person>> {
        self.db
            .with_connection(|conn| {
                let sql = format!("SELECT {} FROM personas ORDER BY nombre ASC, id ASC", PERSON_COLUMNS);
                let mut stmt = conn.prepare(&sql)?;
                let persons = stmt
                    .query_map([], Person::from_row)?
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
                Ok(persons)
            })
            .await
    }

    pub async fn get_person(&self, id: i64) -> Result<Option<Person>> {
        self.db.with_connection(move |conn| fetch_person(conn, id)).await
    }

    /// Insert a person and return its generated id.
    ///
    /// Fails with `Validation` for a blank name or malformed color and with
    /// `DuplicateName` when the trimmed name is already used.
    pub async fn create_person(&self, new: NewPerson) -> Result<i64> {
        let name = validate_name(&new.name)?;
        let icon = text_or_default(new.icon, DEFAULT_ICON);
        let group = text_or_default(new.group, DEFAULT_GROUP);
        let color = normalize_color(new.color)?;
        let description = new.description.unwrap_or_default();
        let is_root = new.is_root;

        let id = self
            .db
            .with_connection(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                if name_taken(&tx, &name, None)? {
                    return Err(RelgraphError::DuplicateName(name));
                }
                let inserted = tx.execute(
                    "INSERT INTO personas (nombre, icono, grupo, color, descripcion, es_principal) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![name, icon, group, color, description, is_root],
                );
                match inserted {
                    Err(e) if is_unique_violation(&e) => return Err(RelgraphError::DuplicateName(name)),
                    Err(e) => return Err(e.into()),
                    Ok(_) => {}
                }
                let id = tx.last_insert_rowid();
                tx.commit()?;
                log::info!("Created person {} ({})", id, name);
                Ok(id)
            })
            .await?;

        Ok(id)
    }

    /// Apply a partial update and return the stored result.
    pub async fn update_person(&self, id: i64, patch: PersonPatch) -> Result<Person> {
        let name = patch.name.as_deref().map(validate_name).transpose()?;
        let color = match patch.color {
            Some(c) => Some(normalize_color(Some(c))?),
            None => None,
        };

        self.db
            .with_connection(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let mut person = fetch_person(&tx, id)?
                    .ok_or_else(|| RelgraphError::NotFound(format!("person {}", id)))?;

                if let Some(name) = name {
                    if name_taken(&tx, &name, Some(id))? {
                        return Err(RelgraphError::DuplicateName(name));
                    }
                    person.name = name;
                }
                if let Some(icon) = patch.icon {
                    person.icon = text_or_default(Some(icon), DEFAULT_ICON);
                }
                if let Some(group) = patch.group {
                    person.group = text_or_default(Some(group), DEFAULT_GROUP);
                }
                if let Some(color) = color {
                    person.color = color;
                }
                if let Some(description) = patch.description {
                    person.description = description;
                }
                if let Some(is_root) = patch.is_root {
                    person.is_root = is_root;
                }
                if let Some((x, y)) = patch.position {
                    person.x = Some(x);
                    person.y = Some(y);
                }

                let updated = tx.execute(
                    "UPDATE personas SET nombre = ?1, icono = ?2, grupo = ?3, color = ?4, \
                     descripcion = ?5, es_principal = ?6, posicion_x = ?7, posicion_y = ?8 \
                     WHERE id = ?9",
                    params![
                        person.name,
                        person.icon,
                        person.group,
                        person.color,
                        person.description,
                        person.is_root,
                        person.x,
                        person.y,
                        id
                    ],
                );
                match updated {
                    Err(e) if is_unique_violation(&e) => {
                        return Err(RelgraphError::DuplicateName(person.name))
                    }
                    Err(e) => return Err(e.into()),
                    Ok(_) => {}
                }
                tx.commit()?;
                Ok(person)
            })
            .await
    }

    /// Write a batch of positions in one transaction.
    ///
    /// Returns how many persons were actually updated; ids with no matching
    /// person are ignored.
    pub async fn update_person_positions(&self, entries: Vec<PositionEntry>) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }
        let received = entries.len();
        let applied = self
            .db
            .with_connection(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let mut applied = 0;
                {
                    let mut stmt =
                        tx.prepare("UPDATE personas SET posicion_x = ?1, posicion_y = ?2 WHERE id = ?3")?;
                    for entry in &entries {
                        applied += stmt.execute(params![entry.x, entry.y, entry.id])?;
                    }
                }
                tx.commit()?;
                Ok(applied)
            })
            .await?;
        log::debug!("Saved {} of {} positions", applied, received);
        Ok(applied)
    }

    /// Stored positions, optionally restricted to `ids`. Persons without a position are omitted.
    pub async fn list_positions(&self, ids: Option<Vec<i64>>) -> Result<BTreeMap<i64, (f64, f64)>> {
        let persons = self.list_persons().await?;
        Ok(persons
            .iter()
            .filter(|p| ids.as_ref().map_or(true, |ids| ids.contains(&p.id)))
            .filter_map(|p| p.position().map(|pos| (p.id, pos)))
            .collect())
    }

    /// Reassign groups in one transaction; entries missing an id or group are skipped.
    pub async fn update_person_groups(&self, updates: Vec<GroupUpdate>) -> Result<usize> {
        let valid: Vec<(i64, String)> = updates
            .into_iter()
            .filter_map(|u| {
                let group = u.group.map(|g| g.trim().to_string()).filter(|g| !g.is_empty())?;
                Some((u.id?, group))
            })
            .collect();
        if valid.is_empty() {
            return Ok(0);
        }

        self.db
            .with_connection(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let mut applied = 0;
                {
                    let mut stmt = tx.prepare("UPDATE personas SET grupo = ?1 WHERE id = ?2")?;
                    for (id, group) in &valid {
                        applied += stmt.execute(params![group, id])?;
                    }
                }
                tx.commit()?;
                Ok(applied)
            })
            .await
    }

    /// Set or clear the stored image reference. Returns false when the person does not exist.
    ///
    /// Only call this after the image file write has succeeded; the reference is
    /// taken as-is.
    pub async fn set_person_image(&self, id: i64, image_url: Option<String>) -> Result<bool> {
        self.db
            .with_connection(move |conn| {
                let affected = conn.execute(
                    "UPDATE personas SET imagen_url = ?1 WHERE id = ?2",
                    params![image_url, id],
                )?;
                Ok(affected > 0)
            })
            .await
    }

    /// Delete a person and every relationship referencing it, atomically.
    ///
    /// Returns the removed person (so the caller can clean up its image), or
    /// `None` when no person has this id.
    pub async fn delete_person(&self, id: i64) -> Result<Option<Person>> {
        self.db
            .with_connection(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let Some(person) = fetch_person(&tx, id)? else {
                    return Ok(None);
                };
                let removed_edges = tx.execute(
                    "DELETE FROM relaciones WHERE persona1_id = ?1 OR persona2_id = ?1",
                    [id],
                )?;
                tx.execute("DELETE FROM personas WHERE id = ?1", [id])?;
                tx.commit()?;
                log::info!(
                    "Deleted person {} ({}) and {} relationships",
                    id,
                    person.name,
                    removed_edges
                );
                Ok(Some(person))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_then_get_round_trip() {
        let (store, _temp) = setup_store().await;
        let id = store
            .create_person(NewPerson {
                name: "  Ana García ".to_string(),
                icon: Some("family".to_string()),
                group: Some("equipo_directo".to_string()),
                color: Some("#10b981".to_string()),
                description: Some("Gerente de Proyectos".to_string()),
                is_root: false,
            })
            .await
            .unwrap();

        let person = store.get_person(id).await.unwrap().unwrap();
        assert_eq!(person.id, id);
        assert_eq!(person.name, "Ana García");
        assert_eq!(person.icon, "family");
        assert_eq!(person.group, "equipo_directo");
        assert_eq!(person.color, "#10b981");
        assert_eq!(person.description, "Gerente de Proyectos");
        assert_eq!(person.position(), None);
        assert_eq!(person.image_url, None);
        assert!(!person.is_root);
        assert!(person.created_at.is_some());
    }

    #[tokio::test]
    async fn test_defaults_applied() {
        let (store, _temp) = setup_store().await;
        let id = store
            .create_person(NewPerson {
                name: "Luis".to_string(),
                group: Some("   ".to_string()),
                ..NewPerson::default()
            })
            .await
            .unwrap();

        let person = store.get_person(id).await.unwrap().unwrap();
        assert_eq!(person.icon, DEFAULT_ICON);
        assert_eq!(person.group, DEFAULT_GROUP);
        assert_eq!(person.color, DEFAULT_COLOR);
        assert_eq!(person.description, "");
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected_without_side_effects() {
        let (store, _temp) = setup_store().await;
        store.create_person(person("Ana")).await.unwrap();

        let err = store.create_person(person(" Ana ")).await.unwrap_err();
        assert!(matches!(err, RelgraphError::DuplicateName(ref n) if n == "Ana"));
        assert_eq!(store.list_persons().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_blank_name_is_validation_error() {
        let (store, _temp) = setup_store().await;
        let err = store.create_person(person("   ")).await.unwrap_err();
        assert!(matches!(err, RelgraphError::Validation(_)));
        assert!(store.list_persons().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_color_rejected() {
        let (store, _temp) = setup_store().await;
        let err = store
            .create_person(NewPerson {
                name: "Ana".to_string(),
                color: Some("blue".to_string()),
                ..NewPerson::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RelgraphError::Validation(_)));
    }

    #[tokio::test]
    async fn test_list_persons_sorted_by_name() {
        let (store, _temp) = setup_store().await;
        for name in ["Carlos", "Ana", "Berta"] {
            store.create_person(person(name)).await.unwrap();
        }
        let names: Vec<_> = store
            .list_persons()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["Ana", "Berta", "Carlos"]);
    }

    #[tokio::test]
    async fn test_update_person_fields() {
        let (store, _temp) = setup_store().await;
        let id = store.create_person(person("Ana")).await.unwrap();

        let updated = store
            .update_person(
                id,
                PersonPatch {
                    name: Some("Ana María".to_string()),
                    is_root: Some(true),
                    position: Some((10.0, -4.5)),
                    ..PersonPatch::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "Ana María");
        assert!(updated.is_root);
        assert_eq!(updated.position(), Some((10.0, -4.5)));
        assert_eq!(store.get_person(id).await.unwrap().unwrap(), updated);
    }

    #[tokio::test]
    async fn test_update_person_rename_onto_existing_name() {
        let (store, _temp) = setup_store().await;
        store.create_person(person("Ana")).await.unwrap();
        let id = store.create_person(person("Luis")).await.unwrap();

        let err = store
            .update_person(
                id,
                PersonPatch {
                    name: Some("Ana".to_string()),
                    ..PersonPatch::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RelgraphError::DuplicateName(_)));

        // keeping one's own name is not a conflict
        let same = store
            .update_person(
                id,
                PersonPatch {
                    name: Some("Luis".to_string()),
                    ..PersonPatch::default()
                },
            )
            .await;
        assert!(same.is_ok());
    }

    #[tokio::test]
    async fn test_update_missing_person_is_not_found() {
        let (store, _temp) = setup_store().await;
        let err = store.update_person(42, PersonPatch::default()).await.unwrap_err();
        assert!(matches!(err, RelgraphError::NotFound(_)));
    }

    #[test]
    fn test_parse_position_entries_skips_bad_entries() {
        let raw = json!({
            "1": {"x": 10.5, "y": -3},
            "2": {"x": "7.25", "y": "1"},
            "3": {"x": "left", "y": 0},
            "4": {"x": 1.0},
            "five": {"x": 1.0, "y": 2.0},
            "6": "nope"
        });
        let entries = parse_position_entries(raw.as_object().unwrap());
        assert_eq!(
            entries,
            vec![
                PositionEntry { id: 1, x: 10.5, y: -3.0 },
                PositionEntry { id: 2, x: 7.25, y: 1.0 },
            ]
        );
    }

    #[tokio::test]
    async fn test_positions_round_trip_and_idempotent() {
        let (store, _temp) = setup_store().await;
        let a = store.create_person(person("Ana")).await.unwrap();
        let b = store.create_person(person("Luis")).await.unwrap();

        let entries = vec![
            PositionEntry { id: a, x: 12.5, y: -8.0 },
            PositionEntry { id: b, x: 0.0, y: 300.25 },
        ];
        assert_eq!(store.update_person_positions(entries.clone()).await.unwrap(), 2);
        assert_eq!(store.update_person_positions(entries).await.unwrap(), 2);

        let positions = store.list_positions(None).await.unwrap();
        assert_eq!(positions.get(&a), Some(&(12.5, -8.0)));
        assert_eq!(positions.get(&b), Some(&(0.0, 300.25)));

        let only_b = store.list_positions(Some(vec![b])).await.unwrap();
        assert_eq!(only_b.len(), 1);
    }

    #[tokio::test]
    async fn test_positions_for_unknown_ids_not_counted() {
        let (store, _temp) = setup_store().await;
        let a = store.create_person(person("Ana")).await.unwrap();

        let applied = store
            .update_person_positions(vec![
                PositionEntry { id: a, x: 1.0, y: 2.0 },
                PositionEntry { id: 999, x: 1.0, y: 2.0 },
            ])
            .await
            .unwrap();
        assert_eq!(applied, 1);
    }

    #[tokio::test]
    async fn test_group_updates_skip_entries_without_id() {
        let (store, _temp) = setup_store().await;
        let a = store.create_person(person("Ana")).await.unwrap();
        let b = store.create_person(person("Luis")).await.unwrap();

        let applied = store
            .update_person_groups(vec![
                GroupUpdate { id: Some(a), group: Some("externos".to_string()) },
                GroupUpdate { id: None, group: Some("centro".to_string()) },
                GroupUpdate { id: Some(b), group: None },
            ])
            .await
            .unwrap();

        assert_eq!(applied, 1);
        assert_eq!(store.get_person(a).await.unwrap().unwrap().group, "externos");
        assert_eq!(store.get_person(b).await.unwrap().unwrap().group, DEFAULT_GROUP);
    }

    #[tokio::test]
    async fn test_set_and_clear_image() {
        let (store, _temp) = setup_store().await;
        let id = store.create_person(person("Ana")).await.unwrap();

        assert!(store
            .set_person_image(id, Some("static/images/users/user_1_abcd1234.png".to_string()))
            .await
            .unwrap());
        assert!(store.get_person(id).await.unwrap().unwrap().image_url.is_some());

        assert!(store.set_person_image(id, None).await.unwrap());
        assert!(store.get_person(id).await.unwrap().unwrap().image_url.is_none());

        assert!(!store.set_person_image(999, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_missing_person_reports_none() {
        let (store, _temp) = setup_store().await;
        assert!(store.delete_person(7).await.unwrap().is_none());
    }
}
