// NAV store - sharded SQLite persistence of per-scheme NAV history

pub mod models;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, error, info, warn};

use crate::error::StoreError;
pub use models::{
    Category, MergeResult, NavPoint, NavSeries, PlanType, SchemeId, SchemeMeta,
};

const SHARD_DIR: &str = "shards";

/// Durable NAV history keyed by scheme, partitioned into a fixed number of
/// SQLite shard files. Each shard has its own lock; schemes in different
/// shards never contend.
pub struct NavStore {
    root: PathBuf,
    shards: Vec<Shard>,
}

struct Shard {
    index: usize,
    path: PathBuf,
    conn: Mutex<Option<Connection>>,
}

impl NavStore {
    /// Open (or create) a store rooted at `root`.
    ///
    /// Failing to create the root is fatal for the run; individual shard
    /// files are opened lazily and fail per scheme.
    pub fn open(root: impl AsRef<Path>, shard_count: usize) -> Result<Self> {
        if shard_count == 0 {
            anyhow::bail!("shard_count must be at least 1");
        }
        let root = root.as_ref().to_path_buf();
        let shard_dir = root.join(SHARD_DIR);
        fs::create_dir_all(&shard_dir)
            .with_context(|| format!("Failed to create NAV store directory {:?}", shard_dir))?;

        let shards = (0..shard_count)
            .map(|index| Shard {
                index,
                path: shard_dir.join(format!("nav-{:03}.db", index)),
                conn: Mutex::new(None),
            })
            .collect();

        info!("Opened NAV store at {:?} ({} shards)", root, shard_count);
        Ok(Self { root, shards })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Deterministic shard index for a scheme. Uses blake3 rather than the
    /// std hasher so the mapping never changes between builds.
    pub fn shard_index(&self, scheme_id: &SchemeId) -> usize {
        let digest = blake3::hash(scheme_id.as_str().as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest.as_bytes()[..8]);
        (u64::from_le_bytes(prefix) % self.shards.len() as u64) as usize
    }

    fn shard_for(&self, scheme_id: &SchemeId) -> &Shard {
        &self.shards[self.shard_index(scheme_id)]
    }

    /// Load a scheme's history. Never fails: a missing series is a cold
    /// start, and an unreadable one is logged and treated as a cold start.
    pub fn load(&self, scheme_id: &SchemeId) -> NavSeries {
        match self.try_load(scheme_id) {
            Ok(series) => series,
            Err(e) => {
                warn!("Treating scheme {} as cold start: {}", scheme_id, e);
                NavSeries::empty(scheme_id.clone())
            }
        }
    }

    /// Load a scheme's history, surfacing shard problems to the caller
    pub fn try_load(&self, scheme_id: &SchemeId) -> Result<NavSeries, StoreError> {
        let shard = self.shard_for(scheme_id);
        let rows = shard
            .read(|conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT nav_date, nav FROM nav_points
                     WHERE scheme_id = ?1
                     ORDER BY nav_date ASC",
                )?;
                let rows = stmt
                    .query_map([scheme_id.as_str()], |row| {
                        Ok((row.get::<_, NaiveDate>(0)?, row.get::<_, String>(1)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .map_err(|e| shard.classify(scheme_id, e))?;

        let Some(rows) = rows else {
            return Ok(NavSeries::empty(scheme_id.clone()));
        };

        let mut points = Vec::with_capacity(rows.len());
        for (date, raw_nav) in rows {
            let nav = Decimal::from_str(&raw_nav).map_err(|e| StoreError::ShardCorrupt {
                shard: shard.index,
                scheme_id: scheme_id.to_string(),
                reason: format!("unparsable NAV {:?} on {}: {}", raw_nav, date, e),
            })?;
            points.push(NavPoint::new(date, nav));
        }

        Ok(NavSeries::from_points(scheme_id.clone(), points))
    }

    /// Merge fetched points into the stored series.
    ///
    /// Existing dates are never rewritten. Duplicate dates inside
    /// `new_points` are collapsed first (first occurrence wins). Every input
    /// point that did not become a new row is counted as skipped.
    pub fn merge(
        &self,
        scheme_id: &SchemeId,
        new_points: &[NavPoint],
    ) -> Result<MergeResult, StoreError> {
        self.write_points(scheme_id, new_points, false)
    }

    /// Replace a scheme's stored rows with `new_points` in one transaction.
    ///
    /// Used to rebuild a series whose rows no longer decode; other schemes
    /// in the shard are untouched.
    pub fn replace(
        &self,
        scheme_id: &SchemeId,
        new_points: &[NavPoint],
    ) -> Result<MergeResult, StoreError> {
        self.write_points(scheme_id, new_points, true)
    }

    fn write_points(
        &self,
        scheme_id: &SchemeId,
        new_points: &[NavPoint],
        replace: bool,
    ) -> Result<MergeResult, StoreError> {
        let mut unique: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();
        for point in new_points {
            unique.entry(point.date).or_insert(point.nav);
        }

        if unique.is_empty() && !replace {
            return Ok(MergeResult {
                added: 0,
                skipped: new_points.len(),
            });
        }

        let shard = self.shard_for(scheme_id);
        let (added, dropped) = shard.write(scheme_id, |conn| {
            let tx = conn.transaction()?;
            let dropped = if replace {
                tx.execute(
                    "DELETE FROM nav_points WHERE scheme_id = ?1",
                    [scheme_id.as_str()],
                )?
            } else {
                0
            };
            let mut added = 0;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR IGNORE INTO nav_points (scheme_id, nav_date, nav)
                     VALUES (?1, ?2, ?3)",
                )?;
                for (date, nav) in &unique {
                    added += stmt.execute(params![scheme_id.as_str(), date, nav.to_string()])?;
                }
            }
            tx.commit()?;
            Ok((added, dropped))
        })?;

        if replace {
            warn!(
                "Rebuilt scheme {} in shard {}: dropped {} stored rows",
                scheme_id, shard.index, dropped
            );
        }

        let result = MergeResult {
            added,
            skipped: new_points.len() - added,
        };
        debug!(
            "Merged scheme {} into shard {}: {} added, {} skipped",
            scheme_id, shard.index, result.added, result.skipped
        );
        Ok(result)
    }

    /// Store (or refresh) scheme metadata. Unlike NAV points, metadata is
    /// overwritten.
    pub fn upsert_meta(&self, meta: &SchemeMeta) -> Result<(), StoreError> {
        let shard = self.shard_for(&meta.scheme_id);
        shard.write(&meta.scheme_id, |conn| {
            conn.execute(
                "INSERT INTO schemes (
                    scheme_id, name, fund_house, scheme_type, scheme_category,
                    plan, idcw, isin_growth, isin_div_reinvestment, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, CURRENT_TIMESTAMP)
                ON CONFLICT(scheme_id) DO UPDATE SET
                    name = excluded.name,
                    fund_house = excluded.fund_house,
                    scheme_type = excluded.scheme_type,
                    scheme_category = excluded.scheme_category,
                    plan = excluded.plan,
                    idcw = excluded.idcw,
                    isin_growth = excluded.isin_growth,
                    isin_div_reinvestment = excluded.isin_div_reinvestment,
                    updated_at = CURRENT_TIMESTAMP",
                params![
                    meta.scheme_id.as_str(),
                    meta.name,
                    meta.fund_house,
                    meta.scheme_type,
                    meta.scheme_category,
                    meta.plan.as_str(),
                    meta.idcw,
                    meta.isin_growth,
                    meta.isin_div_reinvestment,
                ],
            )?;
            Ok(())
        })
    }

    /// Stored metadata for a scheme, if any. Read failures are logged.
    pub fn load_meta(&self, scheme_id: &SchemeId) -> Option<SchemeMeta> {
        let shard = self.shard_for(scheme_id);
        let result = shard.read(|conn| {
            conn.query_row(
                &format!("{} WHERE scheme_id = ?1", SELECT_META),
                [scheme_id.as_str()],
                meta_from_row,
            )
            .optional()
        });

        match result {
            Ok(found) => found.flatten(),
            Err(e) => {
                warn!(
                    "Could not read metadata for scheme {}: {}",
                    scheme_id,
                    shard.classify(scheme_id, e)
                );
                None
            }
        }
    }

    /// Every scheme with stored metadata, across all readable shards, in
    /// scheme id order
    pub fn known_schemes(&self) -> Vec<SchemeMeta> {
        let mut all = Vec::new();
        for shard in &self.shards {
            let result = shard.read(|conn| {
                let mut stmt = conn.prepare(SELECT_META)?;
                let rows = stmt
                    .query_map([], meta_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            });
            match result {
                Ok(Some(rows)) => all.extend(rows),
                Ok(None) => {}
                Err(e) => warn!("Skipping unreadable shard {}: {}", shard.index, e),
            }
        }
        all.sort_by(|a, b| a.scheme_id.cmp(&b.scheme_id));
        all
    }
}

const SELECT_META: &str = "SELECT scheme_id, name, fund_house, scheme_type, scheme_category,
        plan, idcw, isin_growth, isin_div_reinvestment
 FROM schemes";

fn meta_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SchemeMeta> {
    let name: String = row.get(1)?;
    let plan: String = row.get(5)?;
    Ok(SchemeMeta {
        scheme_id: SchemeId::new(row.get::<_, String>(0)?),
        plan: PlanType::from_str(&plan).unwrap_or_else(|_| PlanType::detect_from_name(&name)),
        name,
        fund_house: row.get(2)?,
        scheme_type: row.get(3)?,
        scheme_category: row.get(4)?,
        idcw: row.get(6)?,
        isin_growth: row.get(7)?,
        isin_div_reinvestment: row.get(8)?,
    })
}

fn is_corruption(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::DatabaseCorrupt) | Some(ErrorCode::NotADatabase)
    )
}

impl Shard {
    fn open(&self) -> rusqlite::Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(conn)
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, Option<Connection>> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a read. Returns `Ok(None)` when the shard file does not exist yet
    /// so that cold reads never create files.
    fn read<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> rusqlite::Result<Option<T>> {
        let mut guard = self.guard();
        let conn = match guard.take() {
            Some(conn) => conn,
            None if !self.path.exists() => return Ok(None),
            None => self.open()?,
        };
        let result = f(&conn);
        *guard = Some(conn);
        result.map(Some)
    }

    /// Run a write, holding the shard lock for its whole duration. A shard
    /// SQLite reports as corrupt is moved aside and recreated once.
    fn write<T>(
        &self,
        scheme_id: &SchemeId,
        mut f: impl FnMut(&mut Connection) -> rusqlite::Result<T>,
    ) -> Result<T, StoreError> {
        let mut guard = self.guard();
        match self.run_write(&mut guard, &mut f) {
            Err(e) if is_corruption(&e) => {
                *guard = None;
                self.quarantine(scheme_id, &e)?;
                self.run_write(&mut guard, &mut f)
                    .map_err(|e| self.classify(scheme_id, e))
            }
            other => other.map_err(|e| self.classify(scheme_id, e)),
        }
    }

    fn run_write<T>(
        &self,
        slot: &mut Option<Connection>,
        f: &mut impl FnMut(&mut Connection) -> rusqlite::Result<T>,
    ) -> rusqlite::Result<T> {
        let mut conn = match slot.take() {
            Some(conn) => conn,
            None => self.open()?,
        };
        let result = f(&mut conn);
        *slot = Some(conn);
        result
    }

    fn quarantine(&self, scheme_id: &SchemeId, cause: &rusqlite::Error) -> Result<(), StoreError> {
        let mut aside = self.path.clone().into_os_string();
        aside.push(".corrupt");
        error!(
            "Shard {} is corrupt ({}) while writing scheme {}; moving {:?} aside and recreating",
            self.index, cause, scheme_id, self.path
        );
        if self.path.exists() {
            fs::rename(&self.path, PathBuf::from(aside))?;
        }
        for suffix in ["-journal", "-wal", "-shm"] {
            let mut sidecar = self.path.clone().into_os_string();
            sidecar.push(suffix);
            let sidecar = PathBuf::from(sidecar);
            if sidecar.exists() {
                fs::remove_file(&sidecar)?;
            }
        }
        Ok(())
    }

    fn classify(&self, scheme_id: &SchemeId, err: rusqlite::Error) -> StoreError {
        let unreadable = is_corruption(&err)
            || matches!(
                err,
                rusqlite::Error::FromSqlConversionFailure(..)
                    | rusqlite::Error::InvalidColumnType(..)
            );
        if unreadable {
            StoreError::ShardCorrupt {
                shard: self.index,
                scheme_id: scheme_id.to_string(),
                reason: err.to_string(),
            }
        } else {
            StoreError::Sqlite(err)
        }
    }
}
