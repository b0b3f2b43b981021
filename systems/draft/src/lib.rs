#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Rarity-tiered reward draft pool for Rune Defence.
//!
//! The pool owns the remaining candidate multiset for one level session and
//! the seeded generator used to draw offers. Tier search walks Epic → Rare →
//! Common from the requested rarity, resetting a tier when its configured
//! population allows and falling back across tiers per the level's policy
//! flags. Chosen candidates leave the pool; unchosen offers stay in it.

use std::collections::HashMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rune_defence_core::{LevelPlan, Rarity, RoundDefinition, RuneDef, RuneId, SeedPolicy};
use thiserror::Error;

/// Offers always hold exactly this many distinct candidates, or none.
const OFFER_COUNT: usize = 3;

/// Tiers in fixed search order, highest first.
const TIER_SEARCH_ORDER: [Rarity; 3] = [Rarity::Epic, Rarity::Rare, Rarity::Common];

/// A tier configured with fewer candidates than this draws a warning.
const MIN_TIER_POPULATION: usize = 2;

/// Failure to resolve a candidate id to its definition.
///
/// Resolution failures are never fatal to the session; the pool logs them
/// and drops the id from further consideration.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog holds no definition under the requested id.
    #[error("no rune definition for `{}`", .0.as_str())]
    NotFound(RuneId),
    /// A definition exists but could not be decoded.
    #[error("rune definition for `{}` is malformed: {}", .id.as_str(), .reason)]
    Malformed {
        /// Identifier whose definition failed to decode.
        id: RuneId,
        /// Decoder diagnostic.
        reason: String,
    },
}

/// Source of candidate definitions, resolved once per distinct pool id when
/// a level is set.
pub trait RuneCatalog {
    /// Resolves an id to its full definition.
    fn resolve(&self, id: &RuneId) -> Result<RuneDef, CatalogError>;
}

/// Per-round facts the pool needs when computing offers.
#[derive(Debug)]
struct RoundDraft {
    ordinal: u32,
    offer_runes: bool,
    rarity_override: Option<Rarity>,
}

impl From<&RoundDefinition> for RoundDraft {
    fn from(round: &RoundDefinition) -> Self {
        Self {
            ordinal: round.ordinal,
            offer_runes: round.offer_runes,
            rarity_override: round.rarity_override,
        }
    }
}

#[derive(Debug)]
struct PoolSession {
    remaining: Vec<RuneId>,
    configured: Vec<RuneId>,
    defs: HashMap<RuneId, RuneDef>,
    rounds: Vec<RoundDraft>,
    default_rarity: Option<Rarity>,
    auto_downgrade: bool,
    skip_if_insufficient: bool,
    rng: ChaCha8Rng,
}

impl PoolSession {
    fn rarity_of(&self, id: &RuneId) -> Option<Rarity> {
        self.defs.get(id).map(|def| def.rarity)
    }

    fn distinct_remaining_of(&self, tier: Rarity) -> Vec<RuneId> {
        let of_tier: Vec<RuneId> = self
            .remaining
            .iter()
            .filter(|id| self.rarity_of(id) == Some(tier))
            .cloned()
            .collect();
        distinct(&of_tier)
    }

    fn configured_total_of(&self, tier: Rarity) -> usize {
        self.configured
            .iter()
            .filter(|id| self.rarity_of(id) == Some(tier))
            .count()
    }

    /// Reinserts the tier's ids that have left the remaining multiset, one
    /// occurrence each.
    fn reset_tier(&mut self, tier: Rarity) {
        let missing: Vec<RuneId> = self
            .configured
            .iter()
            .filter(|id| self.rarity_of(id) == Some(tier) && !self.remaining.contains(id))
            .cloned()
            .collect();
        for id in distinct(&missing) {
            self.remaining.push(id);
        }
    }

    fn draw_distinct(&mut self, mut pool: Vec<RuneId>, count: usize) -> Vec<RuneId> {
        let mut drawn = Vec::with_capacity(count);
        for _ in 0..count {
            if pool.is_empty() {
                break;
            }
            let index = self.rng.gen_range(0..pool.len());
            drawn.push(pool.swap_remove(index));
        }
        drawn
    }
}

/// Reward draft pool scoped to one level session.
///
/// `Uninitialized` until [`DraftPool::set_level`], `Ready` afterwards, and
/// `Closed` again after [`DraftPool::close`]; draws outside `Ready` return
/// empty offers.
#[derive(Debug, Default)]
pub struct DraftPool {
    session: Option<PoolSession>,
}

impl DraftPool {
    /// Creates a pool with no session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a session is loaded and draws can produce offers.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.session.is_some()
    }

    /// Candidate occurrences still in the pool, in insertion order.
    #[must_use]
    pub fn remaining(&self) -> &[RuneId] {
        self.session
            .as_ref()
            .map_or(&[], |session| session.remaining.as_slice())
    }

    /// Loads a level session, replacing any prior state.
    ///
    /// Copies the configured pool ids into the remaining multiset, seeds the
    /// generator per the level's [`SeedPolicy`], and resolves each distinct
    /// id through the catalog. Ids that fail to resolve are logged and
    /// dropped; a level without a draft configuration leaves the pool
    /// uninitialized.
    pub fn set_level(&mut self, plan: &LevelPlan, catalog: &dyn RuneCatalog) {
        self.session = None;
        let Some(config) = plan.draft.as_ref() else {
            log::debug!("level declares no draft pool");
            return;
        };

        let rng = match config.seed {
            SeedPolicy::Fixed(seed) => ChaCha8Rng::seed_from_u64(seed),
            SeedPolicy::Entropy => ChaCha8Rng::from_entropy(),
        };

        let mut defs = HashMap::new();
        for id in distinct(&config.pool) {
            match catalog.resolve(&id) {
                Ok(def) => {
                    let _ = defs.insert(id, def);
                }
                Err(error) => log::warn!("dropping rune `{}`: {error}", id.as_str()),
            }
        }

        let configured: Vec<RuneId> = config
            .pool
            .iter()
            .filter(|id| defs.contains_key(*id))
            .cloned()
            .collect();
        log::info!(
            "draft pool ready: {} occurrences, {} definitions",
            configured.len(),
            defs.len()
        );

        self.session = Some(PoolSession {
            remaining: configured.clone(),
            configured,
            defs,
            rounds: plan.rounds.iter().map(RoundDraft::from).collect(),
            default_rarity: config.default_rarity,
            auto_downgrade: config.auto_downgrade,
            skip_if_insufficient: config.skip_if_insufficient,
            rng,
        });
    }

    /// Computes the offer for a round: exactly three distinct candidates, or
    /// none.
    ///
    /// Walks the tiers from the requested rarity downward, resetting a tier
    /// whose configured population supports it, then falls back to the union
    /// of remaining ids and finally to the union of all configured ids
    /// unless the level skips under-populated drafts.
    pub fn offers_for_round(&mut self, ordinal: u32) -> Vec<RuneDef> {
        let Some(session) = self.session.as_mut() else {
            log::debug!("offers requested while no draft session is loaded");
            return Vec::new();
        };
        let Some(round) = session
            .rounds
            .iter()
            .find(|round| round.ordinal == ordinal)
        else {
            log::debug!("offers requested for unknown round {ordinal}");
            return Vec::new();
        };
        if !round.offer_runes {
            return Vec::new();
        }

        let requested = round
            .rarity_override
            .or(session.default_rarity)
            .unwrap_or(Rarity::Common);
        let start = TIER_SEARCH_ORDER
            .iter()
            .position(|tier| *tier == requested)
            .unwrap_or(TIER_SEARCH_ORDER.len() - 1);

        let mut pick_pool = Vec::new();
        for tier in TIER_SEARCH_ORDER[start..].iter().copied() {
            pick_pool = session.distinct_remaining_of(tier);
            if pick_pool.len() >= OFFER_COUNT {
                break;
            }

            let total = session.configured_total_of(tier);
            if total >= OFFER_COUNT {
                session.reset_tier(tier);
                pick_pool = session.distinct_remaining_of(tier);
                break;
            }
            if total < MIN_TIER_POPULATION {
                log::warn!(
                    "rarity {tier:?} has only {total} candidates configured; \
                     at least {MIN_TIER_POPULATION} recommended"
                );
            }
            if !session.auto_downgrade {
                break;
            }
        }

        if pick_pool.len() < OFFER_COUNT {
            if session.skip_if_insufficient {
                log::debug!("skipping draft for round {ordinal}: insufficient candidates");
                return Vec::new();
            }
            pick_pool = distinct(&session.remaining);
            if pick_pool.len() < OFFER_COUNT {
                // Last resort: previously drawn ids may reappear.
                pick_pool = distinct(&session.configured);
            }
        }
        if pick_pool.len() < OFFER_COUNT {
            log::debug!(
                "no draft for round {ordinal}: {} distinct candidates exist anywhere",
                pick_pool.len()
            );
            return Vec::new();
        }

        session
            .draw_distinct(pick_pool, OFFER_COUNT)
            .iter()
            .filter_map(|id| session.defs.get(id).cloned())
            .collect()
    }

    /// Commits a player decision: removes one occurrence of the id from the
    /// remaining multiset and hands back the definition so the caller can
    /// apply its effects.
    ///
    /// An id absent from the live pool is removed from nothing, but the
    /// cached definition is still returned when known. Unknown ids are
    /// logged and yield `None`.
    pub fn choose(&mut self, id: &RuneId) -> Option<&RuneDef> {
        let session = self.session.as_mut()?;
        if !session.defs.contains_key(id) {
            log::warn!("chosen rune `{}` has no definition", id.as_str());
            return None;
        }
        if let Some(index) = session.remaining.iter().position(|held| held == id) {
            let _ = session.remaining.remove(index);
        }
        session.defs.get(id)
    }

    /// Ends the session; subsequent draws return empty offers.
    pub fn close(&mut self) {
        self.session = None;
    }
}

/// First-occurrence deduplication preserving order.
fn distinct(ids: &[RuneId]) -> Vec<RuneId> {
    let mut unique: Vec<RuneId> = Vec::with_capacity(ids.len());
    for id in ids {
        if !unique.contains(id) {
            unique.push(id.clone());
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::{distinct, DraftPool};
    use rune_defence_core::RuneId;

    #[test]
    fn distinct_keeps_first_occurrence_order() {
        let ids = vec![
            RuneId::new("b"),
            RuneId::new("a"),
            RuneId::new("b"),
            RuneId::new("c"),
        ];
        let unique = distinct(&ids);
        assert_eq!(
            unique,
            vec![RuneId::new("b"), RuneId::new("a"), RuneId::new("c")]
        );
    }

    #[test]
    fn uninitialized_pool_yields_nothing() {
        let mut pool = DraftPool::new();
        assert!(!pool.is_ready());
        assert!(pool.offers_for_round(1).is_empty());
        assert!(pool.choose(&RuneId::new("haste")).is_none());
        assert!(pool.remaining().is_empty());
    }
}
