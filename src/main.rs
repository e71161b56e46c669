use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use relgraph::api::ApiServer;
use relgraph::db::{migrate, seed, Db};
use relgraph::error::RelgraphError;
use relgraph::{Config, ImageStore, Store};
use std::collections::HashSet;

/// People and relationship graph service.
#[derive(Parser, Debug)]
#[command(name = "relgraph", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (default)
    Serve {
        /// Override server.port from the configuration
        #[arg(long)]
        port: Option<u16>,
        /// Override server.host from the configuration
        #[arg(long)]
        host: Option<String>,
        /// Insert the demo network first when the database is empty
        #[arg(long)]
        seed: bool,
    },
    /// Apply migrations and check the database schema
    Verify,
    /// Insert the demo network when the database is empty
    Seed,
    /// Delete stored images no person references
    SweepImages,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    // RUST_LOG wins over the configured level
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.relgraph.log_level.as_str()),
    )
    .init();

    let db = open_database(&config).await?;

    match cli.command.unwrap_or(Command::Serve { port: None, host: None, seed: false }) {
        Command::Serve { port, host, seed } => {
            if seed {
                run_seed(&db).await?;
            }
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            log::info!("Starting relgraph v{}", env!("CARGO_PKG_VERSION"));
            let server = ApiServer::new(Store::new(db), &config);
            server.run(&host, port).await?;
        }
        Command::Verify => verify_database_schema(&db).await?,
        Command::Seed => run_seed(&db).await?,
        Command::SweepImages => sweep_images(&config, Store::new(db)).await?,
    }

    Ok(())
}

/// Open the configured database and bring its schema up to date
async fn open_database(config: &Config) -> Result<Db> {
    if let Some(parent) = config.db_path().parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let db = Db::new(config.db_path());
    let migrations_dir = config.migrations_dir().to_path_buf();
    db.with_connection(move |conn| migrate::run_migrations(conn, &migrations_dir))
        .await
        .with_context(|| format!("Failed to migrate {}", config.db_path().display()))?;

    log::info!("Database ready at {}", config.db_path().display());
    Ok(db)
}

async fn run_seed(db: &Db) -> Result<()> {
    let inserted = db.with_connection(seed::seed_demo_network).await?;
    if inserted == 0 {
        log::info!("Database already has data; demo network not inserted");
    }
    Ok(())
}

async fn sweep_images(config: &Config, store: Store) -> Result<()> {
    let referenced: HashSet<String> = store
        .list_persons()
        .await?
        .into_iter()
        .filter_map(|p| p.image_url)
        .collect();

    let images = ImageStore::new(config.images.clone());
    let removed = tokio::task::spawn_blocking(move || images.sweep_orphans(&referenced)).await??;
    log::info!("Removed {} unreferenced image files", removed);
    Ok(())
}

/// Verify that all expected database objects exist
async fn verify_database_schema(db: &Db) -> Result<()> {
    db.with_connection(|conn| {
        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

        let expected_tables = ["personas", "relaciones", "schema_migrations"];
        let mut all_tables_exist = true;
        for table in &expected_tables {
            if tables.iter().any(|t| t == table) {
                log::debug!("✓ Table exists: {}", table);
            } else {
                log::error!("Missing table: {}", table);
                all_tables_exist = false;
            }
        }
        if !all_tables_exist {
            return Err(RelgraphError::Config("Not all required tables exist".to_string()));
        }

        for column in ["imagen_url", "es_principal", "posicion_x", "posicion_y"] {
            let present: bool = conn
                .prepare("SELECT 1 FROM pragma_table_info('personas') WHERE name = ?1")?
                .exists([column])?;
            if !present {
                return Err(RelgraphError::Config(format!("personas.{} is missing", column)));
            }
        }
        log::debug!("✓ personas has all columns");

        let applied = migrate::get_applied_migrations(conn)?;
        log::debug!("✓ {} migrations applied", applied.len());

        let pair_index: bool = conn
            .prepare("SELECT 1 FROM sqlite_master WHERE type='index' AND name='idx_relaciones_pair'")?
            .exists([])?;
        if pair_index {
            log::debug!("✓ Unordered pair index exists");
        } else {
            log::warn!("Index idx_relaciones_pair not found; reversed duplicate pairs rely on the repository check");
        }

        let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        if journal_mode.to_uppercase() != "WAL" {
            return Err(RelgraphError::Config(format!("Journal mode is not WAL: {}", journal_mode)));
        }

        let foreign_keys: i32 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
        if foreign_keys != 1 {
            return Err(RelgraphError::Config("Foreign keys not enabled".to_string()));
        }

        let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if integrity != "ok" {
            return Err(RelgraphError::Config(format!("Database integrity check failed: {}", integrity)));
        }
        log::info!("✓ Database integrity: OK");

        Ok(())
    })
    .await?;

    log::info!("✓ Database schema verification complete");
    Ok(())
}
