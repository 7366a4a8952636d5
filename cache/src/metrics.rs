use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_utils::CachePadded;

#[inline]
fn ratio(hits: u64, misses: u64) -> f64 {
  let total = hits + misses;
  if total == 0 {
    0.0
  } else {
    hits as f64 / total as f64
  }
}

/// Counters for a bitmap pool. All fields are atomic so that callers never
/// contend on the pool lock just to record a statistic.
#[derive(Debug, Default)]
pub(crate) struct PoolMetrics {
  pub(crate) hits: CachePadded<AtomicU64>,
  pub(crate) misses: CachePadded<AtomicU64>,
  pub(crate) puts: CachePadded<AtomicU64>,
  pub(crate) rejections: CachePadded<AtomicU64>,
  pub(crate) evictions: CachePadded<AtomicU64>,
}

impl PoolMetrics {
  pub(crate) fn snapshot(&self, current_size: u64, max_size: u64) -> PoolMetricsSnapshot {
    let hits = self.hits.load(Ordering::Relaxed);
    let misses = self.misses.load(Ordering::Relaxed);
    PoolMetricsSnapshot {
      hits,
      misses,
      hit_ratio: ratio(hits, misses),
      puts: self.puts.load(Ordering::Relaxed),
      rejections: self.rejections.load(Ordering::Relaxed),
      evictions: self.evictions.load(Ordering::Relaxed),
      current_size,
      max_size,
    }
  }
}

/// A point-in-time view of a bitmap pool's counters.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolMetricsSnapshot {
  /// Requests satisfied by a pooled buffer.
  pub hits: u64,
  /// Requests that found no reusable buffer.
  pub misses: u64,
  pub hit_ratio: f64,
  /// Buffers accepted into the pool.
  pub puts: u64,
  /// Buffers refused by the pool (immutable, disallowed config, too large).
  pub rejections: u64,
  /// Buffers dropped to keep the pool under budget.
  pub evictions: u64,
  pub current_size: u64,
  pub max_size: u64,
}

/// Counters for the memory cache facade.
#[derive(Debug)]
pub(crate) struct MemoryMetrics {
  pub(crate) strong_hits: CachePadded<AtomicU64>,
  pub(crate) weak_hits: CachePadded<AtomicU64>,
  pub(crate) misses: CachePadded<AtomicU64>,
  pub(crate) sets: CachePadded<AtomicU64>,
  pub(crate) removals: CachePadded<AtomicU64>,
  created_at: Instant,
}

impl Default for MemoryMetrics {
  fn default() -> Self {
    Self {
      strong_hits: CachePadded::new(AtomicU64::new(0)),
      weak_hits: CachePadded::new(AtomicU64::new(0)),
      misses: CachePadded::new(AtomicU64::new(0)),
      sets: CachePadded::new(AtomicU64::new(0)),
      removals: CachePadded::new(AtomicU64::new(0)),
      created_at: Instant::now(),
    }
  }
}

impl MemoryMetrics {
  pub(crate) fn snapshot(&self, size: u64, max_size: u64) -> MemoryMetricsSnapshot {
    let strong_hits = self.strong_hits.load(Ordering::Relaxed);
    let weak_hits = self.weak_hits.load(Ordering::Relaxed);
    let misses = self.misses.load(Ordering::Relaxed);
    MemoryMetricsSnapshot {
      strong_hits,
      weak_hits,
      misses,
      hit_ratio: ratio(strong_hits + weak_hits, misses),
      sets: self.sets.load(Ordering::Relaxed),
      removals: self.removals.load(Ordering::Relaxed),
      size,
      max_size,
      uptime_secs: self.created_at.elapsed().as_secs(),
    }
  }
}

/// A point-in-time view of the memory cache's counters.
#[derive(Clone)]
pub struct MemoryMetricsSnapshot {
  /// Lookups answered by the strong tier.
  pub strong_hits: u64,
  /// Lookups answered by the weak tier after a strong miss.
  pub weak_hits: u64,
  pub misses: u64,
  pub hit_ratio: f64,
  pub sets: u64,
  pub removals: u64,
  /// Bytes held by the strong tier.
  pub size: u64,
  pub max_size: u64,
  pub uptime_secs: u64,
}

impl fmt::Debug for MemoryMetricsSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MemoryMetricsSnapshot")
      .field("strong_hits", &self.strong_hits)
      .field("weak_hits", &self.weak_hits)
      .field("misses", &self.misses)
      .field("hit_ratio", &format!("{:.2}%", self.hit_ratio * 100.0))
      .field("sets", &self.sets)
      .field("removals", &self.removals)
      .field("size", &self.size)
      .field("max_size", &self.max_size)
      .field("uptime_secs", &self.uptime_secs)
      .finish()
  }
}

/// Counters for the journaled disk store.
#[derive(Debug, Default)]
pub(crate) struct DiskMetrics {
  pub(crate) hits: CachePadded<AtomicU64>,
  pub(crate) misses: CachePadded<AtomicU64>,
  pub(crate) commits: CachePadded<AtomicU64>,
  pub(crate) aborts: CachePadded<AtomicU64>,
  pub(crate) evictions: CachePadded<AtomicU64>,
  pub(crate) journal_rebuilds: CachePadded<AtomicU64>,
}

impl DiskMetrics {
  pub(crate) fn snapshot(&self, size: u64, max_size: u64) -> DiskMetricsSnapshot {
    let hits = self.hits.load(Ordering::Relaxed);
    let misses = self.misses.load(Ordering::Relaxed);
    DiskMetricsSnapshot {
      hits,
      misses,
      hit_ratio: ratio(hits, misses),
      commits: self.commits.load(Ordering::Relaxed),
      aborts: self.aborts.load(Ordering::Relaxed),
      evictions: self.evictions.load(Ordering::Relaxed),
      journal_rebuilds: self.journal_rebuilds.load(Ordering::Relaxed),
      size,
      max_size,
    }
  }
}

/// A point-in-time view of the disk store's counters.
#[derive(Debug, Clone, PartialEq)]
pub struct DiskMetricsSnapshot {
  /// Lookups that produced a snapshot.
  pub hits: u64,
  pub misses: u64,
  pub hit_ratio: f64,
  /// Edits that completed successfully.
  pub commits: u64,
  /// Edits that were aborted or failed to commit.
  pub aborts: u64,
  /// Entries removed to stay under the byte budget.
  pub evictions: u64,
  /// Times the journal was compacted.
  pub journal_rebuilds: u64,
  pub size: u64,
  pub max_size: u64,
}
