#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Rune Defence engine.
//!
//! This crate defines the data model and the message surface that connect
//! the authoritative world, the pure systems, and the embedding runtime.
//! Level configuration arrives as already-parsed [`LevelPlan`] values, the
//! orchestrator and its collaborators communicate through [`Event`] values
//! published on a session-owned [`EventBus`], and every identifier crossing
//! a crate boundary is a dedicated newtype.

use std::{collections::VecDeque, time::Duration};

use serde::{Deserialize, Serialize};

/// Attribute name that routes an enemy effect to the global speed aggregate.
pub const MOVE_SPEED_ATTRIBUTE: &str = "moveSpeed";

/// Unique identifier assigned to a live enemy entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EnemyId(u32);

impl EnemyId {
    /// Creates a new enemy identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Name of an enemy type referenced by round sequences (e.g. `"grunt"`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EnemyKindId(String);

impl EnemyKindId {
    /// Creates a new enemy kind identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrows the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Name of a draft candidate (a "rune") referenced by the reward pool.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuneId(String);

impl RuneId {
    /// Creates a new rune identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrows the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Position on the battlefield ground plane expressed in world units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldPoint {
    x: f32,
    z: f32,
}

impl WorldPoint {
    /// Creates a new world point from its ground-plane coordinates.
    #[must_use]
    pub const fn new(x: f32, z: f32) -> Self {
        Self { x, z }
    }

    /// Coordinate along the world x axis.
    #[must_use]
    pub const fn x(&self) -> f32 {
        self.x
    }

    /// Coordinate along the world z axis.
    #[must_use]
    pub const fn z(&self) -> f32 {
        self.z
    }

    /// Squared distance to another point. Proximity queries compare squared
    /// distances so no square root is ever taken.
    #[must_use]
    pub fn distance_squared(self, other: WorldPoint) -> f32 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        dx * dx + dz * dz
    }
}

/// Rarity class that governs draft-pool search order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rarity {
    /// Baseline tier offered when nothing else is requested.
    Common,
    /// Mid tier.
    Rare,
    /// Highest tier, searched first.
    Epic,
}

/// Category of game object an effect applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectTarget {
    /// Tower-side aggregates, read lazily by tower consumers.
    Tower,
    /// Enemy-side modifiers, re-pushed to the live population.
    Enemy,
}

/// Arithmetic applied by an effect to its target attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectOp {
    /// Adds the value to the additive accumulator.
    Add,
    /// Multiplies the multiplicative accumulator by the value.
    Multiply,
}

/// Single stat modifier carried by a draft candidate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Effect {
    /// Category of object the effect applies to.
    pub target: EffectTarget,
    /// Attribute the effect modifies, e.g. `"range"` or `"moveSpeed"`.
    pub attribute: String,
    /// Arithmetic used when folding the value into the aggregate.
    pub op: EffectOp,
    /// Magnitude folded into the aggregate.
    pub value: f32,
}

/// Definition of a draft candidate offered to the player between rounds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuneDef {
    /// Unique identifier of the candidate.
    pub id: RuneId,
    /// Display name carried for presentation subscribers.
    pub name: String,
    /// Display description carried for presentation subscribers.
    pub description: String,
    /// Rarity tier the candidate belongs to.
    pub rarity: Rarity,
    /// Modifiers applied, in order, when the candidate is chosen.
    pub effects: Vec<Effect>,
}

/// Prototype describing how to materialise one enemy type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnemyPrototype {
    /// Enemy type this prototype materialises.
    pub kind: EnemyKindId,
    /// Base movement speed in world units per second.
    pub move_speed: f32,
}

/// One combat round: a wave of spawns followed by a clearance gate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundDefinition {
    /// One-based position of the round within the level.
    pub ordinal: u32,
    /// Reward granted when the round is cleared.
    pub reward: u32,
    /// Enemy types spawned in sequence order.
    pub enemies: Vec<EnemyKindId>,
    /// Overrides the global spawn interval when present and positive.
    pub spawn_interval_override: Option<Duration>,
    /// Whether a reward draft is offered after this round.
    pub offer_runes: bool,
    /// Overrides the draft configuration's default rarity for this round.
    pub rarity_override: Option<Rarity>,
}

/// Timing settings shared by every round of a level.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GlobalRoundSettings {
    /// Delay between consecutive spawns when a round declares no override.
    pub spawn_interval: Duration,
    /// Delay between the end of one round and the start of the next.
    pub round_interval: Duration,
}

/// Policy used to seed the draft pool's random generator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeedPolicy {
    /// Deterministic draws from the provided seed.
    Fixed(u64),
    /// Fresh entropy per session.
    Entropy,
}

/// Draft-pool configuration declared by a level.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DraftConfig {
    /// Candidate ids forming the pool. Duplicates are permitted and count
    /// as separate occurrences.
    pub pool: Vec<RuneId>,
    /// Rarity requested when a round declares no override.
    pub default_rarity: Option<Rarity>,
    /// Whether the tier search may fall through to lower tiers.
    pub auto_downgrade: bool,
    /// Whether an under-populated pool skips the draft instead of mixing
    /// tiers.
    pub skip_if_insufficient: bool,
    /// Random generator seeding policy.
    pub seed: SeedPolicy,
}

/// Fully parsed description of one level session.
///
/// Produced by the external configuration loader; the engine never parses
/// files itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LevelPlan {
    /// Rounds played in ordinal order.
    pub rounds: Vec<RoundDefinition>,
    /// Shared round timing.
    pub settings: GlobalRoundSettings,
    /// Prototypes for every enemy type the rounds may reference.
    pub prototypes: Vec<EnemyPrototype>,
    /// Point where enemies enter the battlefield.
    pub spawn_point: WorldPoint,
    /// Facing, in radians, applied to freshly spawned enemies.
    pub spawn_facing: f32,
    /// Reward-draft configuration, absent when the level offers no drafts.
    pub draft: Option<DraftConfig>,
}

/// Events published on the session bus.
///
/// The variant set is the external contract shared with the embedding
/// runtime and its UI layer.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// A new enemy entered the battlefield.
    EnemySpawned {
        /// Handle of the freshly spawned enemy.
        enemy: EnemyId,
    },
    /// A cleared round granted its reward.
    RoundRewardGranted {
        /// Reward amount from the round definition.
        amount: u32,
    },
    /// A round finished; always follows the reward event for that round.
    RoundEnded {
        /// Ordinal of the round that ended.
        round: u32,
    },
    /// The player chose a draft candidate.
    RuneSelected {
        /// Identifier of the chosen candidate.
        rune: RuneId,
    },
    /// The draft interaction reached a terminal outcome, by choice or by
    /// skip; the orchestrator resumes on this event.
    RuneSelectionCompleted,
}

/// Handle identifying one subscription on an [`EventBus`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberId(u32);

impl SubscriberId {
    /// Retrieves the numeric representation of the subscription handle.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Session-owned publish/subscribe channel.
///
/// Delivery is pull-based: `publish` fans an event out to one queue per
/// live subscriber and each subscriber drains its queue on its own tick.
/// The whole engine runs on one logical thread, so no locking is involved.
#[derive(Debug, Default)]
pub struct EventBus {
    queues: Vec<(SubscriberId, VecDeque<Event>)>,
    next_id: u32,
}

impl EventBus {
    /// Creates a bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscriber and returns its handle.
    pub fn subscribe(&mut self) -> SubscriberId {
        let id = SubscriberId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.queues.push((id, VecDeque::new()));
        id
    }

    /// Removes a subscription together with its undelivered events.
    ///
    /// Unknown handles are ignored.
    pub fn unsubscribe(&mut self, id: SubscriberId) {
        self.queues.retain(|(queued, _)| *queued != id);
    }

    /// Publishes an event to every live subscriber.
    pub fn publish(&mut self, event: Event) {
        for (_, queue) in &mut self.queues {
            queue.push_back(event.clone());
        }
    }

    /// Moves the pending events of a subscriber into `out`, preserving
    /// publish order. Unknown handles leave `out` untouched.
    pub fn drain(&mut self, id: SubscriberId, out: &mut Vec<Event>) {
        if let Some((_, queue)) = self.queues.iter_mut().find(|(queued, _)| *queued == id) {
            out.extend(queue.drain(..));
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.queues.len()
    }
}
