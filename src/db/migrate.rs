use rusqlite::{Connection, params};
use std::fs;
use std::path::Path;
use crate::error::{Result, RelgraphError};

/// Migration metadata
struct Migration {
    version: u32,
    name: String,
    sql: String,
}

/// Columns added to `personas` after the first deployed schema.
/// Databases created before them are upgraded in place.
const LEGACY_PERSONA_COLUMNS: &[(&str, &str)] = &[
    ("imagen_url", "TEXT"),
    ("es_principal", "INTEGER NOT NULL DEFAULT 0"),
];

/// Create schema_migrations table if it doesn't exist
fn ensure_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Get list of applied migrations
pub fn get_applied_migrations(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM schema_migrations ORDER BY version")?;
    let names: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()
        .map_err(RelgraphError::Database)?;
    Ok(names)
}

/// Load migration files from migrations directory
fn load_migrations(migrations_dir: &Path) -> Result<Vec<Migration>> {
    let mut migrations = Vec::new();

    let entries = fs::read_dir(migrations_dir)
        .map_err(|e| RelgraphError::Config(format!(
            "Cannot read migrations directory {}: {}",
            migrations_dir.display(),
            e
        )))?;

    let mut files: Vec<_> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("sql"))
        .collect();

    files.sort_by_key(|e| e.file_name());

    for entry in files {
        let path = entry.path();
        let filename = path.file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| RelgraphError::Config("Invalid migration filename".to_string()))?;

        // "001_core_tables.sql" -> 1
        let version_str = filename
            .split('_')
            .next()
            .ok_or_else(|| RelgraphError::Config(format!("Invalid migration filename: {}", filename)))?;
        let version: u32 = version_str.parse()
            .map_err(|_| RelgraphError::Config(format!("Invalid migration version: {}", version_str)))?;

        let sql = fs::read_to_string(&path)?;

        let name = filename.trim_end_matches(".sql").to_string();

        migrations.push(Migration { version, name, sql });
    }

    migrations.sort_by_key(|m| m.version);

    Ok(migrations)
}

/// Run all pending migrations, then bring older databases up to date
pub fn run_migrations(conn: &mut Connection, migrations_dir: &Path) -> Result<()> {
    ensure_migrations_table(conn)?;

    let applied = get_applied_migrations(conn)?;
    let migrations = load_migrations(migrations_dir)?;

    for migration in migrations {
        if applied.contains(&migration.name) {
            log::debug!("Migration {} already applied, skipping", migration.name);
            continue;
        }

        log::info!("Applying migration: {} (version {})", migration.name, migration.version);

        let tx = conn.transaction()?;

        tx.execute_batch(&migration.sql)
            .map_err(|e| RelgraphError::Config(format!(
                "Failed to execute migration {}: {}",
                migration.name, e
            )))?;

        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            params![migration.version, migration.name],
        )?;

        tx.commit()?;

        log::info!("Migration {} applied successfully", migration.name);
    }

    upgrade_legacy_schema(conn)?;

    log::info!("All migrations completed");
    Ok(())
}

/// Add any `personas` columns missing from a database created by an older schema.
/// Safe to run any number of times.
pub fn upgrade_legacy_schema(conn: &Connection) -> Result<usize> {
    let mut added = 0;
    for (column, decl) in LEGACY_PERSONA_COLUMNS {
        if ensure_column(conn, "personas", column, decl)? {
            log::info!("Added missing column personas.{}", column);
            added += 1;
        }
    }
    Ok(added)
}

/// Add `column` to `table` unless it already exists. Returns true when it was added.
pub fn ensure_column(conn: &Connection, table: &str, column: &str, decl: &str) -> Result<bool> {
    if column_exists(conn, table, column)? {
        return Ok(false);
    }
    conn.execute_batch(&format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, decl))?;
    Ok(true)
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(names.iter().any(|n| n == column))
}
