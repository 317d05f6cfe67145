use crate::infrastructure::error::InfraError;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

pub fn initialize_database(path: &Path) -> Result<(), InfraError> {
    let connection = Connection::open(path)?;
    connection.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

/// Opens an initialized database without creating it. A missing file means
/// the workspace was never bootstrapped.
pub fn open_existing(path: &Path) -> Result<Connection, InfraError> {
    if !path.exists() {
        return Err(InfraError::StoreUnavailable(format!(
            "database not initialized at {}",
            path.display()
        )));
    }
    let connection = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|error| {
        InfraError::StoreUnavailable(format!("cannot open {}: {error}", path.display()))
    })?;
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(connection)
}
