use rusqlite::{params, Connection, TransactionBehavior};
use crate::error::Result;

/// (nombre, icono, grupo, color, descripcion, es_principal)
const DEMO_PERSONS: &[(&str, &str, &str, &str, &str, bool)] = &[
    ("Usuario Principal", "target", "centro", "#1e3a8a", "Centro de la red organizacional", true),
    ("Ana García", "family", "equipo_directo", "#10b981", "Gerente de Proyectos - Equipo directo", false),
    ("Carlos Mendez", "briefcase", "departamento", "#3b82f6", "Desarrollador Senior - Mismo departamento", false),
    ("María López", "academic", "colaboradores", "#f59e0b", "Analista de Datos - Colaboradora frecuente", false),
    ("David Rodríguez", "briefcase", "otros_departamentos", "#ef4444", "Especialista en Marketing - Otros departamentos", false),
    ("Laura Fernández", "home", "externos", "#8b5cf6", "Consultora Externa - Proveedora de servicios", false),
];

/// Endpoints are indexes into `DEMO_PERSONS`.
const DEMO_RELATIONSHIPS: &[(usize, usize, &str, i64, &str)] = &[
    (0, 1, "supervision_directa", 9, "Relación supervisor-colaborador directo"),
    (0, 2, "colaboracion_estrecha", 7, "Trabajo conjunto en proyectos principales"),
    (0, 3, "colaboracion_regular", 8, "Intercambio frecuente de información"),
    (0, 4, "colaboracion_interdepartamental", 6, "Coordinación entre departamentos"),
    (0, 5, "relacion_externa", 8, "Proveedor de servicios estratégico"),
    (1, 3, "colaboracion_proyecto", 7, "Trabajo conjunto en análisis de datos"),
    (2, 4, "coordinacion_ocasional", 4, "Coordinación esporádica en campañas"),
];

/// Insert the demo network when `personas` is empty.
///
/// Returns the number of persons inserted (0 when the table already had rows).
/// Everything is written in one transaction.
pub fn seed_demo_network(conn: &mut Connection) -> Result<usize> {
    let existing: i64 = conn.query_row("SELECT COUNT(*) FROM personas", [], |row| row.get(0))?;
    if existing > 0 {
        log::debug!("Skipping demo data: {} persons already stored", existing);
        return Ok(0);
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mut ids = Vec::with_capacity(DEMO_PERSONS.len());
    for (name, icon, group, color, description, is_root) in DEMO_PERSONS {
        tx.execute(
            "INSERT INTO personas (nombre, icono, grupo, color, descripcion, es_principal) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![name, icon, group, color, description, is_root],
        )?;
        ids.push(tx.last_insert_rowid());
    }
    for (a, b, kind, strength, context) in DEMO_RELATIONSHIPS {
        tx.execute(
            "INSERT INTO relaciones (persona1_id, persona2_id, tipo, fortaleza, contexto) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![ids[*a], ids[*b], kind, strength, context],
        )?;
    }
    tx.commit()?;

    log::info!(
        "Seeded demo network: {} persons, {} relationships",
        DEMO_PERSONS.len(),
        DEMO_RELATIONSHIPS.len()
    );
    Ok(DEMO_PERSONS.len())
}
