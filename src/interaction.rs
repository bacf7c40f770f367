// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Epoch Engine - Interaction Cache

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Step;
use crate::world::{Actor, World};

/// Value returned for a pair that was not in the roster at build time.
pub const NEUTRAL_PAIRWISE: f64 = 0.5;

const SIMILARITY_WEIGHT: f64 = 0.6;
const TENSION_WEIGHT: f64 = 0.4;

// ---------------------------------------------------------------------------
// PairKey
// ---------------------------------------------------------------------------

/// Canonical (sorted) key for an unordered actor pair.
///
/// Serializes as `"a:b"` so pair-keyed maps stay JSON objects.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct PairKey(String, String);

impl PairKey {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            Self(a.to_string(), b.to_string())
        } else {
            Self(b.to_string(), a.to_string())
        }
    }

    pub fn first(&self) -> &str {
        &self.0
    }

    pub fn second(&self) -> &str {
        &self.1
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0 == key || self.1 == key
    }

    /// The other member of the pair, if `key` is one of them.
    pub fn partner(&self, key: &str) -> Option<&str> {
        if self.0 == key {
            Some(&self.1)
        } else if self.1 == key {
            Some(&self.0)
        } else {
            None
        }
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.0, self.1)
    }
}

impl From<PairKey> for String {
    fn from(key: PairKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for PairKey {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.split_once(':') {
            Some((a, b)) if !a.is_empty() && !b.is_empty() => Ok(Self::new(a, b)),
            _ => Err(format!("pair key `{}` is not of the form `a:b`", s)),
        }
    }
}

// ---------------------------------------------------------------------------
// Pairwise formula
// ---------------------------------------------------------------------------

/// Cooperation potential between two actors, in [0, 1].
///
/// Similarity is `1 - |a - b| / (|a| + |b|)`. With a tension reading the
/// result blends `0.6 * similarity + 0.4 * (1 - tension)`. Non-finite
/// metrics fall back to [`NEUTRAL_PAIRWISE`].
pub fn pairwise_value(a: f64, b: f64, tension: Option<f64>) -> f64 {
    if !a.is_finite() || !b.is_finite() {
        return NEUTRAL_PAIRWISE;
    }
    let scale = a.abs() + b.abs();
    let similarity = if scale <= f64::EPSILON {
        1.0
    } else {
        1.0 - (a - b).abs() / scale
    };
    let value = match tension.filter(|t| t.is_finite()) {
        Some(t) => SIMILARITY_WEIGHT * similarity + TENSION_WEIGHT * (1.0 - t.clamp(0.0, 1.0)),
        None => similarity,
    };
    value.clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// InteractionCache
// ---------------------------------------------------------------------------

/// Step-scoped O(1) lookups over a bounded actor roster.
///
/// Built once per step from the world; the O(n²) pair table is paid once
/// instead of once per consuming phase. Content is a pure function of the
/// roster and tensions at build time.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionCache<A> {
    built_at: Option<Step>,
    entities: Vec<A>,
    index: BTreeMap<String, usize>,
    pairwise: BTreeMap<PairKey, f64>,
    leader: Option<usize>,
    min_metric: Option<f64>,
}

impl<A> Default for InteractionCache<A> {
    fn default() -> Self {
        Self {
            built_at: None,
            entities: Vec::new(),
            index: BTreeMap::new(),
            pairwise: BTreeMap::new(),
            leader: None,
            min_metric: None,
        }
    }
}

impl<A: Actor + Clone> InteractionCache<A> {
    /// Build from a roster and a tension lookup.
    ///
    /// Duplicate keys keep their first occurrence.
    pub fn build<F>(actors: &[A], tension: F, step: Step) -> Self
    where
        F: Fn(&str, &str) -> Option<f64>,
    {
        let mut cache = Self {
            built_at: Some(step),
            ..Self::default()
        };

        for actor in actors {
            if cache.index.contains_key(actor.key()) {
                continue;
            }
            cache.index.insert(actor.key().to_string(), cache.entities.len());
            cache.entities.push(actor.clone());
        }

        let mut leader: Option<(usize, f64)> = None;
        let mut min_metric: Option<f64> = None;
        for (i, actor) in cache.entities.iter().enumerate() {
            let m = actor.primary_metric();
            if !m.is_finite() {
                continue;
            }
            if leader.map_or(true, |(_, best)| m > best) {
                leader = Some((i, m));
            }
            min_metric = Some(min_metric.map_or(m, |cur: f64| cur.min(m)));
        }
        cache.leader = leader.map(|(i, _)| i);
        cache.min_metric = min_metric;

        let n = cache.entities.len();
        for i in 0..n {
            for j in (i + 1)..n {
                let a = &cache.entities[i];
                let b = &cache.entities[j];
                let value = pairwise_value(
                    a.primary_metric(),
                    b.primary_metric(),
                    tension(a.key(), b.key()),
                );
                cache.pairwise.insert(PairKey::new(a.key(), b.key()), value);
            }
        }
        cache
    }

    pub fn from_world<W: World<Actor = A>>(world: &W) -> Self {
        Self::build(world.actors(), |a, b| world.tension(a, b), world.clock().step())
    }

    pub fn get(&self, key: &str) -> Option<&A> {
        self.index.get(key).map(|&i| &self.entities[i])
    }

    /// Pairwise value, [`NEUTRAL_PAIRWISE`] for pairs absent at build time.
    pub fn pairwise(&self, a: &str, b: &str) -> f64 {
        self.pairwise
            .get(&PairKey::new(a, b))
            .copied()
            .unwrap_or(NEUTRAL_PAIRWISE)
    }

    /// Actor with the highest primary metric (first in roster order on ties).
    pub fn leader(&self) -> Option<&A> {
        self.leader.map(|i| &self.entities[i])
    }

    pub fn max_metric(&self) -> Option<f64> {
        self.leader().map(|a| a.primary_metric())
    }

    pub fn min_metric(&self) -> Option<f64> {
        self.min_metric
    }

    /// Partner with the highest pairwise value for `key`.
    pub fn best_partner(&self, key: &str) -> Option<(&A, f64)> {
        if !self.index.contains_key(key) {
            return None;
        }
        let mut best: Option<(&A, f64)> = None;
        for other in &self.entities {
            if other.key() == key {
                continue;
            }
            let v = self.pairwise(key, other.key());
            if best.map_or(true, |(_, b)| v > b) {
                best = Some((other, v));
            }
        }
        best
    }

    pub fn actors(&self) -> &[A] {
        &self.entities
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&PairKey, f64)> {
        self.pairwise.iter().map(|(k, &v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn pair_count(&self) -> usize {
        self.pairwise.len()
    }

    pub fn built_at(&self) -> Option<Step> {
        self.built_at
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
