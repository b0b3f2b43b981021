#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Persistent stat-modifier aggregation for Rune Defence.
//!
//! Tower-side modifiers accumulate per attribute and are read lazily by
//! tower consumers. The enemy move-speed pair is kept apart because it has
//! to be re-pushed to the live population whenever it changes; that push is
//! the explicit, idempotent [`StatAggregator::apply_move_speed`] operation
//! rather than a hidden side effect of accumulation.

use std::collections::HashMap;

use rune_defence_core::{EffectOp, EffectTarget, RuneDef, MOVE_SPEED_ATTRIBUTE};
use rune_defence_world::{EnemyStore, PopulationRegistry};

/// An applied speed never drops below this share of the captured base.
const SPEED_FLOOR_RATIO: f32 = 0.2;

/// Running additive/multiplicative totals for one target attribute.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StatAggregate {
    additive: f32,
    multiplier: f32,
}

impl StatAggregate {
    /// Sum of all additive modifiers folded in so far.
    #[must_use]
    pub const fn additive(&self) -> f32 {
        self.additive
    }

    /// Product of all multiplicative modifiers folded in so far.
    #[must_use]
    pub const fn multiplier(&self) -> f32 {
        self.multiplier
    }
}

impl Default for StatAggregate {
    fn default() -> Self {
        Self {
            additive: 0.0,
            multiplier: 1.0,
        }
    }
}

/// Accumulates stat modifiers for the lifetime of a level session.
#[derive(Debug, Default)]
pub struct StatAggregator {
    aggregates: HashMap<(EffectTarget, String), StatAggregate>,
    enemy_speed: StatAggregate,
}

impl StatAggregator {
    /// Creates an aggregator with every aggregate at its identity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds an additive modifier into the aggregate for the attribute.
    pub fn add_additive(&mut self, target: EffectTarget, attribute: &str, value: f32) {
        let entry = self
            .aggregates
            .entry((target, attribute.to_owned()))
            .or_default();
        entry.additive += value;
    }

    /// Folds a multiplicative modifier into the aggregate for the attribute.
    pub fn mul_multiplicative(&mut self, target: EffectTarget, attribute: &str, value: f32) {
        let entry = self
            .aggregates
            .entry((target, attribute.to_owned()))
            .or_default();
        entry.multiplier *= value;
    }

    /// Current aggregate for the attribute; identity when nothing has been
    /// folded in.
    #[must_use]
    pub fn get(&self, target: EffectTarget, attribute: &str) -> StatAggregate {
        self.aggregates
            .get(&(target, attribute.to_owned()))
            .copied()
            .unwrap_or_default()
    }

    /// Current global enemy move-speed aggregate.
    #[must_use]
    pub const fn enemy_speed(&self) -> StatAggregate {
        self.enemy_speed
    }

    /// Resets every aggregate to its identity.
    pub fn clear(&mut self) {
        self.aggregates.clear();
        self.enemy_speed = StatAggregate::default();
    }

    /// Folds every effect of a chosen candidate into the aggregates, in
    /// declaration order.
    ///
    /// Callers that care about live enemies follow up with
    /// [`Self::apply_move_speed`]; the two steps are deliberately separate
    /// so each can be tested on its own.
    pub fn apply_candidate(&mut self, def: &RuneDef) {
        for effect in &def.effects {
            match effect.target {
                EffectTarget::Tower => match effect.op {
                    EffectOp::Add => {
                        self.add_additive(EffectTarget::Tower, &effect.attribute, effect.value);
                    }
                    EffectOp::Multiply => {
                        self.mul_multiplicative(
                            EffectTarget::Tower,
                            &effect.attribute,
                            effect.value,
                        );
                    }
                },
                EffectTarget::Enemy => {
                    if effect.attribute == MOVE_SPEED_ATTRIBUTE {
                        match effect.op {
                            EffectOp::Add => self.enemy_speed.additive += effect.value,
                            EffectOp::Multiply => self.enemy_speed.multiplier *= effect.value,
                        }
                    } else {
                        log::debug!(
                            "rune {} targets unsupported enemy attribute {:?}",
                            def.id.as_str(),
                            effect.attribute
                        );
                    }
                }
            }
        }
    }

    /// Speed an enemy with the given captured base should move at under the
    /// current aggregate, floored at 20% of that base.
    #[must_use]
    pub fn adjusted_speed(&self, base_speed: f32) -> f32 {
        let target = base_speed * self.enemy_speed.multiplier + self.enemy_speed.additive;
        target.max(base_speed * SPEED_FLOOR_RATIO)
    }

    /// Pushes the current enemy-speed aggregate onto every registered
    /// enemy. Idempotent: unchanged aggregates produce unchanged speeds.
    pub fn apply_move_speed(&self, registry: &PopulationRegistry, store: &mut EnemyStore) {
        for (enemy, base_speed) in registry.entries() {
            store.set_speed(enemy, self.adjusted_speed(base_speed));
        }
    }
}
