use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension};
use tracing::{info, instrument};

use crate::error::Result;
use crate::manifest::{read_manifest, validate_name};
use crate::types::{PackageDefinition, PackageDetails, PackageSummary};

/// Thread-safe store of named packages.
///
/// A package name is a live pointer to its most recent upload: saving under
/// an existing name overwrites content and metadata in place.
pub struct PackageStore {
    db: Mutex<Connection>,
}

impl PackageStore {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    /// Validate the name and the archive's manifest, then upsert the package
    /// under `name`.
    #[instrument(skip(self, zip_bytes), fields(size = zip_bytes.len()))]
    pub fn save(&self, name: &str, zip_bytes: &[u8]) -> Result<PackageDefinition> {
        validate_name(name)?;
        let manifest = read_manifest(zip_bytes)?;
        let now = jobhost_core::time::now_db();

        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO packages
             (name, content, author, description, version, file_name, arguments, create_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(name) DO UPDATE SET
                content     = excluded.content,
                author      = excluded.author,
                description = excluded.description,
                version     = excluded.version,
                file_name   = excluded.file_name,
                arguments   = excluded.arguments,
                create_time = excluded.create_time",
            rusqlite::params![
                name,
                zip_bytes,
                manifest.author,
                manifest.description,
                manifest.version,
                manifest.file_name,
                manifest.arguments,
                now
            ],
        )?;
        info!(package = %name, version = %manifest.version, "package saved");

        Ok(PackageDefinition {
            name: name.to_string(),
            author: manifest.author,
            version: manifest.version,
            description: manifest.description,
            entry_file: manifest.file_name,
            static_arguments: manifest.arguments,
            content: zip_bytes.to_vec(),
            modified_at: now,
        })
    }

    /// Load a package including its archive, or `None` if the name is unknown.
    #[instrument(skip(self))]
    pub fn get_by_name(&self, name: &str) -> Result<Option<PackageDefinition>> {
        let db = self.db.lock().unwrap();
        let package = db
            .query_row(
                "SELECT name, author, version, description, file_name, arguments,
                        content, create_time
                 FROM packages WHERE name = ?1",
                [name],
                |row| {
                    Ok(PackageDefinition {
                        name: row.get(0)?,
                        author: row.get(1)?,
                        version: row.get(2)?,
                        description: row.get(3)?,
                        entry_file: row.get(4)?,
                        static_arguments: row.get(5)?,
                        content: row.get(6)?,
                        modified_at: row.get(7)?,
                    })
                },
            )
            .optional()?;
        Ok(package)
    }

    /// All package names in alphabetical order.
    pub fn list_names(&self) -> Result<Vec<String>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare("SELECT name FROM packages ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    /// One page of package metadata plus the total package count.
    ///
    /// `page` is 1-based; values below 1 are treated as the first page.
    pub fn list_page(&self, page_size: usize, page: usize) -> Result<(Vec<PackageSummary>, usize)> {
        let offset = page.saturating_sub(1).saturating_mul(page_size);
        let db = self.db.lock().unwrap();

        let total: i64 = db.query_row("SELECT COUNT(*) FROM packages", [], |row| row.get(0))?;
        let mut stmt = db.prepare(
            "SELECT name, author, version, description, create_time
             FROM packages
             ORDER BY name
             LIMIT ?1 OFFSET ?2",
        )?;
        let items = stmt
            .query_map(rusqlite::params![sql_count(page_size), sql_count(offset)], |row| {
                Ok(PackageSummary {
                    name: row.get(0)?,
                    author: row.get(1)?,
                    version: row.get(2)?,
                    description: row.get(3)?,
                    modified_at: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((items, total as usize))
    }

    pub fn get_details(&self, name: &str) -> Result<Option<PackageDetails>> {
        let db = self.db.lock().unwrap();
        let details = db
            .query_row(
                "SELECT name, create_time FROM packages WHERE name = ?1",
                [name],
                |row| {
                    Ok(PackageDetails {
                        name: row.get(0)?,
                        modified_at: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(details)
    }

    /// Remove a package. Returns `false` when no package had that name.
    pub fn delete(&self, name: &str) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let n = db.execute("DELETE FROM packages WHERE name = ?1", [name])?;
        if n > 0 {
            info!(package = %name, "package deleted");
        }
        Ok(n > 0)
    }
}

/// SQLite takes signed counts; anything past `i64::MAX` is "everything".
fn sql_count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
