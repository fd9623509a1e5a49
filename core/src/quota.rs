//! Fixed-window quota ledger.
//!
//! Buckets live in a lock-striped map: each key hashes to one of
//! [`SHARD_COUNT`] shards, and a consume holds only that shard's mutex for the
//! duration of its read-modify-write. Nothing here performs I/O, so no lock is
//! ever held across an await point in callers.
//!
//! Windows are fixed, not sliding: a client can spend a full window's budget
//! just before a reset and another full budget just after it.

use std::collections::HashMap;
use std::hash::{BuildHasher, RandomState};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::identity::QuotaKey;

pub const SHARD_COUNT: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Bucket {
    count: u32,
    reset_at: Instant,
}

impl Bucket {
    /// A bucket is live up to and including its reset instant.
    fn is_live(&self, now: Instant) -> bool {
        now <= self.reset_at
    }
}

/// Outcome of a single window check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed {
        remaining: u32,
        reset_in: Duration,
        limit: u32,
    },
    Denied {
        reset_in: Duration,
        limit: u32,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }

    pub fn limit(&self) -> u32 {
        match self {
            Decision::Allowed { limit, .. } | Decision::Denied { limit, .. } => *limit,
        }
    }

    pub fn remaining(&self) -> u32 {
        match self {
            Decision::Allowed { remaining, .. } => *remaining,
            Decision::Denied { .. } => 0,
        }
    }

    pub fn reset_in(&self) -> Duration {
        match self {
            Decision::Allowed { reset_in, .. } | Decision::Denied { reset_in, .. } => *reset_in,
        }
    }

    pub fn reset_in_ms(&self) -> u64 {
        self.reset_in().as_millis().min(u64::MAX as u128) as u64
    }
}

/// One window of a multi-window admission.
#[derive(Debug, Clone, Copy)]
pub struct WindowRequest<'a> {
    pub key: &'a QuotaKey,
    pub limit: u32,
    pub window: Duration,
}

/// Result of [`QuotaLedger::consume_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Every window admitted; decisions are in request order.
    Allowed(Vec<Decision>),
    /// The window at `index` denied; no window was consumed.
    Denied { index: usize, decision: Decision },
}

/// Read-only view of a key's current usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaSnapshot {
    pub used: u32,
    pub remaining: u32,
    pub limit: u32,
    /// `None` when the key has no live bucket.
    pub reset_in: Option<Duration>,
}

type Shard = HashMap<QuotaKey, Bucket>;

pub struct QuotaLedger {
    shards: Box<[Mutex<Shard>]>,
    hasher: RandomState,
}

impl Default for QuotaLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl QuotaLedger {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT)
                .map(|_| Mutex::new(HashMap::new()))
                .collect::<Vec<_>>()
                .into_boxed_slice(),
            hasher: RandomState::new(),
        }
    }

    /// Check and, if allowed, count one request against `key`.
    pub fn consume(&self, key: &QuotaKey, limit: u32, window: Duration) -> Decision {
        self.consume_at(key, limit, window, Instant::now())
    }

    pub fn consume_at(
        &self,
        key: &QuotaKey,
        limit: u32,
        window: Duration,
        now: Instant,
    ) -> Decision {
        let mut shard = self.lock_shard(self.shard_index(key));
        apply(&mut shard, key, limit, window, now)
    }

    /// Admit a request against several windows at once.
    ///
    /// Every window is evaluated before any is consumed, so a denial in a later
    /// window never spends budget in an earlier one. Keys are expected to be
    /// distinct.
    pub fn consume_all(&self, requests: &[WindowRequest<'_>]) -> Admission {
        self.consume_all_at(requests, Instant::now())
    }

    pub fn consume_all_at(&self, requests: &[WindowRequest<'_>], now: Instant) -> Admission {
        let indices: Vec<usize> = requests
            .iter()
            .map(|request| self.shard_index(request.key))
            .collect();

        // Ascending lock order keeps concurrent multi-shard admissions deadlock free.
        let mut order = indices.clone();
        order.sort_unstable();
        order.dedup();
        let mut guards: Vec<(usize, MutexGuard<'_, Shard>)> = order
            .into_iter()
            .map(|index| (index, self.lock_shard(index)))
            .collect();

        for (position, (request, shard_index)) in requests.iter().zip(&indices).enumerate() {
            let shard = guard_for(&mut guards, *shard_index);
            let decision = evaluate(shard.get(request.key), request.limit, request.window, now);
            if !decision.is_allowed() {
                return Admission::Denied {
                    index: position,
                    decision,
                };
            }
        }

        let decisions = requests
            .iter()
            .zip(&indices)
            .map(|(request, shard_index)| {
                let shard = guard_for(&mut guards, *shard_index);
                apply(shard, request.key, request.limit, request.window, now)
            })
            .collect();
        Admission::Allowed(decisions)
    }

    pub fn peek(&self, key: &QuotaKey, limit: u32) -> QuotaSnapshot {
        self.peek_at(key, limit, Instant::now())
    }

    pub fn peek_at(&self, key: &QuotaKey, limit: u32, now: Instant) -> QuotaSnapshot {
        let shard = self.lock_shard(self.shard_index(key));
        match shard.get(key).filter(|bucket| bucket.is_live(now)) {
            Some(bucket) => QuotaSnapshot {
                used: bucket.count,
                remaining: limit.saturating_sub(bucket.count),
                limit,
                reset_in: Some(bucket.reset_at.saturating_duration_since(now)),
            },
            None => QuotaSnapshot {
                used: 0,
                remaining: limit,
                limit,
                reset_in: None,
            },
        }
    }

    /// Drop every expired bucket. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    pub fn sweep_expired_at(&self, now: Instant) -> usize {
        (0..self.shards.len())
            .map(|index| {
                let mut shard = self.lock_shard(index);
                let before = shard.len();
                shard.retain(|_, bucket| bucket.is_live(now));
                before - shard.len()
            })
            .sum()
    }

    /// Number of tracked buckets, live or expired.
    pub fn len(&self) -> usize {
        (0..self.shards.len())
            .map(|index| self.lock_shard(index).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn shard_index(&self, key: &QuotaKey) -> usize {
        (self.hasher.hash_one(key) % self.shards.len() as u64) as usize
    }

    fn lock_shard(&self, index: usize) -> MutexGuard<'_, Shard> {
        // A panic mid-update cannot leave a bucket half-written, so a poisoned
        // shard is still consistent.
        self.shards[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn guard_for<'g, 'a>(
    guards: &'g mut [(usize, MutexGuard<'a, Shard>)],
    shard_index: usize,
) -> &'g mut Shard {
    let position = guards
        .iter()
        .position(|(index, _)| *index == shard_index)
        .unwrap_or_default();
    &mut guards[position].1
}

/// What a consume would decide, without touching the bucket.
fn evaluate(bucket: Option<&Bucket>, limit: u32, window: Duration, now: Instant) -> Decision {
    match bucket.filter(|bucket| bucket.is_live(now)) {
        None if limit == 0 => Decision::Denied {
            reset_in: window,
            limit,
        },
        None => Decision::Allowed {
            remaining: limit - 1,
            reset_in: window,
            limit,
        },
        Some(bucket) if bucket.count >= limit => Decision::Denied {
            reset_in: bucket.reset_at.saturating_duration_since(now),
            limit,
        },
        Some(bucket) => Decision::Allowed {
            remaining: limit - (bucket.count + 1),
            reset_in: bucket.reset_at.saturating_duration_since(now),
            limit,
        },
    }
}

fn apply(shard: &mut Shard, key: &QuotaKey, limit: u32, window: Duration, now: Instant) -> Decision {
    let decision = evaluate(shard.get(key), limit, window, now);
    if !decision.is_allowed() {
        return decision;
    }

    match shard.get_mut(key).filter(|bucket| bucket.is_live(now)) {
        Some(bucket) => bucket.count += 1,
        None => {
            shard.insert(
                key.clone(),
                Bucket {
                    count: 1,
                    reset_at: now + window,
                },
            );
        }
    }
    decision
}
