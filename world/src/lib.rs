#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative enemy state for Rune Defence.
//!
//! [`EnemyStore`] is the entity spawn service: it allocates handles,
//! owns per-enemy state, and retires entities on despawn. The
//! [`PopulationRegistry`] layers the battlefield bookkeeping on top:
//! which handles are currently in play, and the base movement speed
//! captured when each one was first observed.

use rune_defence_core::{EnemyId, EnemyKindId, EnemyPrototype, WorldPoint};

/// Smallest base speed ever captured, so a zero-speed spawn cannot pin an
/// entity at zero forever.
const MIN_BASE_SPEED: f32 = 0.01;

#[derive(Debug)]
struct EnemyState {
    id: EnemyId,
    kind: EnemyKindId,
    position: WorldPoint,
    facing: f32,
    speed: f32,
}

/// Entity spawn service owning the state of every live enemy.
#[derive(Debug, Default)]
pub struct EnemyStore {
    enemies: Vec<EnemyState>,
    next_id: u32,
}

impl EnemyStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Materialises a prototype at the provided position and facing,
    /// returning the handle allocated to the new enemy.
    pub fn spawn(
        &mut self,
        prototype: &EnemyPrototype,
        position: WorldPoint,
        facing: f32,
    ) -> EnemyId {
        let id = EnemyId::new(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.enemies.push(EnemyState {
            id,
            kind: prototype.kind.clone(),
            position,
            facing,
            speed: prototype.move_speed,
        });
        id
    }

    /// Retires an enemy. Absent handles are ignored.
    pub fn despawn(&mut self, id: EnemyId) {
        self.enemies.retain(|enemy| enemy.id != id);
    }

    /// Reports whether the handle still refers to a live enemy.
    #[must_use]
    pub fn is_alive(&self, id: EnemyId) -> bool {
        self.state(id).is_some()
    }

    /// Current position of a live enemy.
    #[must_use]
    pub fn position(&self, id: EnemyId) -> Option<WorldPoint> {
        self.state(id).map(|enemy| enemy.position)
    }

    /// Moves a live enemy. Absent handles are ignored.
    pub fn set_position(&mut self, id: EnemyId, position: WorldPoint) {
        if let Some(enemy) = self.state_mut(id) {
            enemy.position = position;
        }
    }

    /// Current facing of a live enemy, in radians.
    #[must_use]
    pub fn facing(&self, id: EnemyId) -> Option<f32> {
        self.state(id).map(|enemy| enemy.facing)
    }

    /// Current movement speed of a live enemy.
    #[must_use]
    pub fn speed(&self, id: EnemyId) -> Option<f32> {
        self.state(id).map(|enemy| enemy.speed)
    }

    /// Overwrites the movement speed of a live enemy. Absent handles are
    /// ignored.
    pub fn set_speed(&mut self, id: EnemyId, speed: f32) {
        if let Some(enemy) = self.state_mut(id) {
            enemy.speed = speed;
        }
    }

    /// Enemy type of a live enemy.
    #[must_use]
    pub fn kind(&self, id: EnemyId) -> Option<&EnemyKindId> {
        self.state(id).map(|enemy| &enemy.kind)
    }

    /// Number of enemies currently alive in the store.
    #[must_use]
    pub fn living(&self) -> usize {
        self.enemies.len()
    }

    fn state(&self, id: EnemyId) -> Option<&EnemyState> {
        self.enemies.iter().find(|enemy| enemy.id == id)
    }

    fn state_mut(&mut self, id: EnemyId) -> Option<&mut EnemyState> {
        self.enemies.iter_mut().find(|enemy| enemy.id == id)
    }
}

#[derive(Clone, Copy, Debug)]
struct PopulationEntry {
    enemy: EnemyId,
    base_speed: f32,
}

/// Tracks the enemies currently in play for round clearance and proximity
/// queries.
///
/// Each entry captures the enemy's base movement speed exactly once, at the
/// moment the handle is first registered; retroactive stat application
/// always derives from that captured value.
#[derive(Debug, Default)]
pub struct PopulationRegistry {
    entries: Vec<PopulationEntry>,
}

impl PopulationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a live enemy handle, capturing its base speed on first
    /// observation. Duplicate or dead handles are ignored.
    pub fn add(&mut self, enemy: EnemyId, store: &EnemyStore) {
        if self.entries.iter().any(|entry| entry.enemy == enemy) {
            return;
        }
        let Some(speed) = store.speed(enemy) else {
            log::debug!("ignoring registration of dead enemy {}", enemy.get());
            return;
        };
        self.entries.push(PopulationEntry {
            enemy,
            base_speed: speed.max(MIN_BASE_SPEED),
        });
    }

    /// Removes a handle from the registry. Absent handles are ignored.
    pub fn remove(&mut self, enemy: EnemyId) {
        self.entries.retain(|entry| entry.enemy != enemy);
    }

    /// Number of registered enemies.
    #[must_use]
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Base speed captured when the handle was first registered.
    #[must_use]
    pub fn base_speed(&self, enemy: EnemyId) -> Option<f32> {
        self.entries
            .iter()
            .find(|entry| entry.enemy == enemy)
            .map(|entry| entry.base_speed)
    }

    /// Iterates over registered handles with their captured base speeds.
    pub fn entries(&self) -> impl Iterator<Item = (EnemyId, f32)> + '_ {
        self.entries.iter().map(|entry| (entry.enemy, entry.base_speed))
    }

    /// Returns the registered enemy nearest to `point` within `max_range`.
    ///
    /// Linear scan comparing squared distances. Entries whose entity has
    /// been despawned without an explicit `remove` are pruned in place as
    /// the scan encounters them. Ties keep the first entry found at the
    /// minimum distance.
    pub fn closest(
        &mut self,
        store: &EnemyStore,
        point: WorldPoint,
        max_range: f32,
    ) -> Option<EnemyId> {
        let limit = max_range * max_range;
        let mut best: Option<(f32, EnemyId)> = None;
        let mut index = 0;
        while index < self.entries.len() {
            let enemy = self.entries[index].enemy;
            let Some(position) = store.position(enemy) else {
                // Stale handle: the entity died without being removed.
                let _ = self.entries.swap_remove(index);
                continue;
            };
            let distance_sq = position.distance_squared(point);
            if distance_sq <= limit && best.map_or(true, |(found, _)| distance_sq < found) {
                best = Some((distance_sq, enemy));
            }
            index += 1;
        }
        best.map(|(_, enemy)| enemy)
    }

    /// Drops every entry, including captured base speeds.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
