use duckdb::Connection;
use log::{debug, info, warn};
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
};
use time::PrimitiveDateTime;
use weathersg_core::{path_exists, shard_alias, shard_path};

use super::{canonical_timestamp, Error};

/// Years whose shards overlap `[start, end]`, ascending
pub fn shard_years(start: PrimitiveDateTime, end: PrimitiveDateTime) -> Result<Vec<i32>, Error> {
    if start > end {
        return Err(Error::InvalidRequest(format!(
            "start {} is after end {}",
            canonical_timestamp(start),
            canonical_timestamp(end)
        )));
    }
    Ok((start.year()..=end.year()).collect())
}

/// Long-lived hub that yearly shards are attached to.
///
/// Shards are attached on first use and reference counted by the leases that
/// need them; the last lease to let go of a year detaches it. Every connection
/// handed out is a clone of the in-memory hub, so all of them see the same
/// attachments.
pub struct ShardArena {
    archive_dir: String,
    inner: Mutex<ArenaInner>,
}

struct ArenaInner {
    hub: Connection,
    /// year -> number of live leases; a zero entry is still attached
    attached: BTreeMap<i32, usize>,
}

impl ShardArena {
    pub fn open(archive_dir: impl Into<String>) -> Result<Self, Error> {
        let hub = Connection::open_in_memory()?;
        Ok(Self {
            archive_dir: archive_dir.into(),
            inner: Mutex::new(ArenaInner {
                hub,
                attached: BTreeMap::new(),
            }),
        })
    }

    pub fn archive_dir(&self) -> &str {
        &self.archive_dir
    }

    /// Attaches every year (if not attached yet) and pins it for the lifetime
    /// of the returned lease. Either all years are pinned or none are.
    pub fn lease(self: &Arc<Self>, years: &[i32]) -> Result<ShardLease, Error> {
        let mut inner = self.lock();
        let mut pinned = Vec::with_capacity(years.len());
        for &year in years {
            if let Err(e) = inner.pin(&self.archive_dir, year) {
                for year in pinned {
                    inner.unpin(year);
                }
                return Err(e);
            }
            pinned.push(year);
        }
        debug!("leased shards {:?}", pinned);

        Ok(ShardLease {
            arena: Arc::clone(self),
            years: pinned,
        })
    }

    /// Years currently attached to the hub, in use or not
    pub fn attached_years(&self) -> Vec<i32> {
        self.lock().attached.keys().copied().collect()
    }

    /// Number of live leases holding `year`
    pub fn lease_count(&self, year: i32) -> usize {
        self.lock().attached.get(&year).copied().unwrap_or(0)
    }

    fn connect(&self) -> Result<Connection, Error> {
        Ok(self.lock().hub.try_clone()?)
    }

    fn release(&self, years: &[i32]) {
        let mut inner = self.lock();
        for &year in years {
            inner.unpin(year);
        }
    }

    fn lock(&self) -> MutexGuard<'_, ArenaInner> {
        // a panic while holding the lock leaves the bookkeeping intact
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ArenaInner {
    fn pin(&mut self, archive_dir: &str, year: i32) -> Result<(), Error> {
        if let Some(count) = self.attached.get_mut(&year) {
            *count += 1;
            return Ok(());
        }

        let path = shard_path(archive_dir, year);
        let path = path.to_string_lossy();
        if !path_exists(&path) {
            return Err(Error::ShardUnavailable {
                year,
                reason: format!("{} does not exist", path),
            });
        }

        let attach = format!(
            "ATTACH '{}' AS {} (READ_ONLY)",
            path.replace('\'', "''"),
            shard_alias(year)
        );
        self.hub
            .execute_batch(&attach)
            .map_err(|e| Error::ShardUnavailable {
                year,
                reason: e.to_string(),
            })?;
        info!("attached shard {} from {}", shard_alias(year), path);
        self.attached.insert(year, 1);
        Ok(())
    }

    fn unpin(&mut self, year: i32) {
        let Some(count) = self.attached.get_mut(&year) else {
            return;
        };
        *count = count.saturating_sub(1);
        if *count > 0 {
            return;
        }

        match self
            .hub
            .execute_batch(&format!("DETACH {}", shard_alias(year)))
        {
            Ok(()) => {
                self.attached.remove(&year);
                info!("detached shard {}", shard_alias(year));
            }
            // stays attached with no leases; the next lease reuses it
            Err(e) => warn!("failed to detach shard {}: {}", shard_alias(year), e),
        }
    }
}

/// Scoped hold on a set of attached shards, released on drop
pub struct ShardLease {
    arena: Arc<ShardArena>,
    years: Vec<i32>,
}

impl ShardLease {
    pub fn years(&self) -> &[i32] {
        &self.years
    }

    /// Fresh connection that sees every leased shard
    pub fn connect(&self) -> Result<Connection, Error> {
        self.arena.connect()
    }
}

impl Drop for ShardLease {
    fn drop(&mut self) {
        debug!("releasing shards {:?}", self.years);
        self.arena.release(&self.years);
    }
}
