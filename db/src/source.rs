//! Migration scripts stored as SQL files on disk.
//!
//! A migrations directory holds one `<name>.up.sql` file per migration and
//! an optional `<name>.down.sql` next to it. Names sort lexically, so the
//! timestamp prefix written by [`scaffold`] orders them by creation time.
//!
//! ```text
//! migrations/
//!   20240101120000_create_users.up.sql
//!   20240101120000_create_users.down.sql
//!   20240102093000_add_posts.up.sql
//! ```
//!
//! A leading `-- ` comment line in the up script becomes the migration's
//! description.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use tabula_core::{Migration, MigrationManager, NewMigration};
use tracing::{debug, info};

use crate::error::{DbError, Result};

static SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<name>[A-Za-z0-9_]+)\.(?P<direction>up|down)\.sql$")
        .expect("static regex must compile")
});

static SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("static regex must compile"));

/// Migrations read from a directory, ordered by name.
///
/// # Examples
///
/// ```no_run
/// use tabula_db::MigrationSource;
///
/// let source = MigrationSource::from_dir("migrations").unwrap();
/// for migration in source.migrations() {
///     println!("{}", migration.name);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MigrationSource {
    dir: PathBuf,
    migrations: Vec<NewMigration>,
}

#[derive(Default)]
struct ScriptPair {
    up: Option<String>,
    down: Option<String>,
}

impl MigrationSource {
    /// Reads every `*.up.sql` / `*.down.sql` pair in `dir`.
    ///
    /// Files that do not look like migration scripts are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](DbError::IoError) if the directory or a script
    /// cannot be read, and [`InvalidMigration`](DbError::InvalidMigration)
    /// when a down script has no matching up script or an up script is
    /// blank.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut pairs: BTreeMap<String, ScriptPair> = BTreeMap::new();

        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(caps) = SCRIPT_RE.captures(file_name) else {
                debug!(file = %path.display(), "skipping non-migration file");
                continue;
            };

            let sql = std::fs::read_to_string(&path)?;
            let pair = pairs.entry(caps["name"].to_string()).or_default();
            match &caps["direction"] {
                "up" => pair.up = Some(sql),
                _ => pair.down = Some(sql),
            }
        }

        let mut migrations = Vec::with_capacity(pairs.len());
        for (name, pair) in pairs {
            let Some(up) = pair.up else {
                return Err(DbError::InvalidMigration(format!(
                    "{name}.down.sql has no matching {name}.up.sql"
                )));
            };
            if up.trim().is_empty() {
                return Err(DbError::InvalidMigration(format!("{name}.up.sql is empty")));
            }
            let mut migration = NewMigration::new(&name, up.as_str());
            if let Some(description) = description_of(&up) {
                migration = migration.description(description);
            }
            if let Some(down) = pair.down {
                migration = migration.down(down);
            }
            migrations.push(migration);
        }

        debug!(dir = %dir.display(), count = migrations.len(), "loaded migration scripts");
        Ok(Self {
            dir: dir.to_path_buf(),
            migrations,
        })
    }

    /// The directory the scripts were read from.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn migrations(&self) -> &[NewMigration] {
        &self.migrations
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// Registers every script with `manager`'s ledger.
    ///
    /// Pending entries pick up edited scripts; an applied migration whose
    /// scripts changed on disk is rejected by the ledger.
    pub fn sync(&self, manager: &MigrationManager<'_>) -> Result<Vec<Migration>> {
        let mut registered = Vec::with_capacity(self.migrations.len());
        for migration in &self.migrations {
            registered.push(manager.register(migration.clone())?);
        }
        info!(table = manager.table(), count = registered.len(), "synced migration scripts");
        Ok(registered)
    }
}

/// Text of a leading `-- ` comment, if the script starts with one.
fn description_of(sql: &str) -> Option<String> {
    let first = sql.lines().next()?.trim();
    let text = first.strip_prefix("--")?.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Turns a free-form name into `lower_snake` form.
///
/// Returns `None` when nothing usable remains.
pub fn slugify(name: &str) -> Option<String> {
    let lowered = name.trim().to_ascii_lowercase();
    let slug = SLUG_RE.replace_all(&lowered, "_");
    let slug = slug.trim_matches('_');
    (!slug.is_empty()).then(|| slug.to_string())
}

/// Writes an empty up/down script pair named `<YYYYMMDDHHMMSS>_<name>`.
///
/// Creates `dir` if needed and returns the full migration name.
///
/// # Errors
///
/// Returns [`InvalidMigration`](DbError::InvalidMigration) for a name with
/// no letters or digits and [`AlreadyExists`](DbError::AlreadyExists) rather
/// than overwriting a script.
pub fn scaffold(dir: impl AsRef<Path>, name: &str, timestamp: DateTime<Utc>) -> Result<String> {
    let dir = dir.as_ref();
    let slug = slugify(name)
        .ok_or_else(|| DbError::InvalidMigration(format!("unusable migration name `{name}`")))?;
    let full_name = format!("{}_{slug}", timestamp.format("%Y%m%d%H%M%S"));

    let up_path = dir.join(format!("{full_name}.up.sql"));
    let down_path = dir.join(format!("{full_name}.down.sql"));
    for path in [&up_path, &down_path] {
        if path.exists() {
            return Err(DbError::AlreadyExists(path.clone()));
        }
    }

    std::fs::create_dir_all(dir)?;
    let title = slug.replace('_', " ");
    std::fs::write(&up_path, format!("-- {title}\n"))?;
    std::fs::write(&down_path, format!("-- revert {title}\n"))?;
    info!(migration = %full_name, dir = %dir.display(), "created migration scripts");
    Ok(full_name)
}
