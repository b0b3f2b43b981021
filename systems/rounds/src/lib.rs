#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Round progression for Rune Defence.
//!
//! The [`Orchestrator`] sequences a level's rounds as a tick-driven state
//! machine: spawn the round's enemies in order, wait for the battlefield to
//! clear, grant the reward, then hold for the player's draft decision before
//! the inter-round delay. Every wait is a resumable accumulator advanced by
//! the embedding runtime's periodic tick, and one cooperative flag cancels
//! them all.
//!
//! A [`Session`] bundles the collaborators the orchestrator mutates. It is
//! passed by reference into every operation, so multiple sessions can exist
//! side by side and tests stay deterministic.

use std::{collections::HashMap, time::Duration};

use rune_defence_core::{
    EnemyId, EnemyKindId, EnemyPrototype, Event, EventBus, GlobalRoundSettings, LevelPlan,
    RoundDefinition, RuneId, SubscriberId, WorldPoint,
};
use rune_defence_system_draft::{DraftPool, RuneCatalog};
use rune_defence_system_stats::StatAggregator;
use rune_defence_world::{EnemyStore, PopulationRegistry};

/// Cadence at which the clearance gate re-checks the population count.
const CLEAR_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Session-scoped state shared by the orchestrator, its systems, and the
/// embedding runtime's decision handlers.
#[derive(Debug, Default)]
pub struct Session {
    /// Authoritative enemy entity state.
    pub store: EnemyStore,
    /// Enemies currently in play, with their captured base speeds.
    pub registry: PopulationRegistry,
    /// Reward draft pool for this level.
    pub pool: DraftPool,
    /// Accumulated stat modifiers.
    pub stats: StatAggregator,
    /// Publish/subscribe channel owned by this session.
    pub bus: EventBus,
}

impl Session {
    /// Creates a session with empty collaborators.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Commits a draft decision: the candidate leaves the pool, its effects
    /// fold into the aggregates, and the new enemy-speed aggregate is pushed
    /// onto the live population. Publishes [`Event::RuneSelected`] followed
    /// by [`Event::RuneSelectionCompleted`].
    ///
    /// An id with no known definition completes the draft without applying
    /// anything, so the round loop never stalls on a bad decision.
    pub fn select_rune(&mut self, id: &RuneId) {
        if let Some(def) = self.pool.choose(id) {
            let def = def.clone();
            self.stats.apply_candidate(&def);
            self.stats.apply_move_speed(&self.registry, &mut self.store);
            self.bus.publish(Event::RuneSelected { rune: id.clone() });
        }
        self.bus.publish(Event::RuneSelectionCompleted);
    }

    /// Resolves the draft without a choice, e.g. when no offers were
    /// available or the player dismissed the selection.
    pub fn skip_selection(&mut self) {
        self.bus.publish(Event::RuneSelectionCompleted);
    }

    /// Retires a live enemy from both the store and the registry.
    pub fn retire_enemy(&mut self, enemy: EnemyId) {
        self.registry.remove(enemy);
        self.store.despawn(enemy);
    }
}

#[derive(Clone, Copy, Debug)]
enum Phase {
    Idle,
    Spawning {
        round: usize,
        next_enemy: usize,
        until_next: Duration,
    },
    AwaitingClear {
        round: usize,
        until_poll: Duration,
    },
    AwaitingDraft {
        round: usize,
    },
    InterRoundDelay {
        round: usize,
        remaining: Duration,
    },
}

/// Tick-driven state machine sequencing one level session's rounds.
#[derive(Debug)]
pub struct Orchestrator {
    phase: Phase,
    rounds: Vec<RoundDefinition>,
    settings: GlobalRoundSettings,
    prototypes: HashMap<EnemyKindId, EnemyPrototype>,
    spawn_point: WorldPoint,
    spawn_facing: f32,
    subscription: Option<SubscriberId>,
    cancel_requested: bool,
    inbox: Vec<Event>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            rounds: Vec::new(),
            settings: GlobalRoundSettings {
                spawn_interval: Duration::ZERO,
                round_interval: Duration::ZERO,
            },
            prototypes: HashMap::new(),
            spawn_point: WorldPoint::new(0.0, 0.0),
            spawn_facing: 0.0,
            subscription: None,
            cancel_requested: false,
            inbox: Vec::new(),
        }
    }
}

impl Orchestrator {
    /// Creates an idle orchestrator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a round loop is in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !matches!(self.phase, Phase::Idle)
    }

    /// Ordinal of the round currently being played, when running.
    #[must_use]
    pub fn current_round(&self) -> Option<u32> {
        let index = match self.phase {
            Phase::Idle => return None,
            Phase::Spawning { round, .. }
            | Phase::AwaitingClear { round, .. }
            | Phase::AwaitingDraft { round }
            | Phase::InterRoundDelay { round, .. } => round,
        };
        self.rounds.get(index).map(|round| round.ordinal)
    }

    /// Starts the round loop for a level.
    ///
    /// Re-entry while running is rejected with a warning. Rounds are ordered
    /// by ordinal, the draft pool is initialised from the plan, and the
    /// kind→prototype mapping is rebuilt. A plan without rounds leaves the
    /// orchestrator idle.
    pub fn begin(&mut self, plan: &LevelPlan, catalog: &dyn RuneCatalog, session: &mut Session) {
        if self.is_running() {
            log::warn!("begin requested while the round loop is already running");
            return;
        }

        let mut rounds = plan.rounds.clone();
        rounds.sort_by_key(|round| round.ordinal);
        if rounds.is_empty() {
            log::warn!("level plan declares no rounds; orchestrator stays idle");
            return;
        }

        session.pool.set_level(plan, catalog);

        self.prototypes.clear();
        for prototype in &plan.prototypes {
            if self
                .prototypes
                .insert(prototype.kind.clone(), prototype.clone())
                .is_some()
            {
                log::warn!(
                    "duplicate prototype for enemy kind `{}`; keeping the last",
                    prototype.kind.as_str()
                );
            }
        }

        self.rounds = rounds;
        self.settings = plan.settings;
        self.spawn_point = plan.spawn_point;
        self.spawn_facing = plan.spawn_facing;
        if self.subscription.is_none() {
            self.subscription = Some(session.bus.subscribe());
        }
        self.cancel_requested = false;
        self.phase = Phase::Spawning {
            round: 0,
            next_enemy: 0,
            until_next: Duration::ZERO,
        };
        log::info!("round loop started with {} rounds", self.rounds.len());
    }

    /// Requests cooperative cancellation; the next tick unwinds to idle
    /// without publishing further events.
    pub fn cancel(&mut self) {
        self.cancel_requested = true;
    }

    /// Advances the round loop by one tick of `dt` simulated time.
    ///
    /// Each phase is a resumable wait: inter-spawn delays, the clearance
    /// poll, the draft-completion wait, and the inter-round delay all carry
    /// their accumulators across ticks. Cancellation is observed here,
    /// bounded by the tick granularity.
    pub fn tick(&mut self, dt: Duration, session: &mut Session) {
        if self.cancel_requested {
            if self.is_running() {
                log::info!("round loop cancelled");
                self.phase = Phase::Idle;
            }
            return;
        }

        match self.phase {
            Phase::Idle => {}
            Phase::Spawning {
                round,
                next_enemy,
                until_next,
            } => self.tick_spawning(round, next_enemy, until_next, dt, session),
            Phase::AwaitingClear { round, until_poll } => {
                self.tick_awaiting_clear(round, until_poll, dt, session);
            }
            Phase::AwaitingDraft { round } => self.tick_awaiting_draft(round, session),
            Phase::InterRoundDelay { round, remaining } => {
                self.tick_inter_round_delay(round, remaining, dt);
            }
        }
    }

    /// Cancels the loop, drops the draft-completion subscription, optionally
    /// despawns everything still alive, and clears the pool and prototype
    /// caches. Safe to call when not running.
    pub fn stop_and_reset(&mut self, session: &mut Session, clear_spawned: bool) {
        self.cancel_requested = false;
        self.phase = Phase::Idle;
        self.release_subscription(session);
        if clear_spawned {
            let spawned: Vec<EnemyId> = session.registry.entries().map(|(enemy, _)| enemy).collect();
            for enemy in spawned {
                session.store.despawn(enemy);
            }
            session.registry.clear();
        }
        session.pool.close();
        self.prototypes.clear();
        self.rounds.clear();
    }

    /// [`Self::stop_and_reset`] followed by [`Self::begin`] with a new plan.
    pub fn restart(
        &mut self,
        plan: &LevelPlan,
        catalog: &dyn RuneCatalog,
        session: &mut Session,
        clear_spawned: bool,
    ) {
        self.stop_and_reset(session, clear_spawned);
        self.begin(plan, catalog, session);
    }

    fn tick_spawning(
        &mut self,
        round: usize,
        mut next_enemy: usize,
        mut until_next: Duration,
        dt: Duration,
        session: &mut Session,
    ) {
        let interval = self.spawn_interval_for(round);
        let total = self.rounds[round].enemies.len();
        let mut budget = dt;

        loop {
            if next_enemy >= total {
                self.phase = Phase::AwaitingClear {
                    round,
                    until_poll: Duration::ZERO,
                };
                return;
            }
            if until_next > budget {
                until_next -= budget;
                break;
            }
            budget = budget.saturating_sub(until_next);
            until_next = Duration::ZERO;

            let kind = self.rounds[round].enemies[next_enemy].clone();
            let spawned = self.spawn_enemy(&kind, session);
            next_enemy += 1;
            // No wait after the last spawn, and none after a skipped one.
            if spawned && next_enemy < total {
                until_next = interval;
            }
        }

        self.phase = Phase::Spawning {
            round,
            next_enemy,
            until_next,
        };
    }

    fn tick_awaiting_clear(
        &mut self,
        round: usize,
        until_poll: Duration,
        dt: Duration,
        session: &mut Session,
    ) {
        if until_poll > dt {
            self.phase = Phase::AwaitingClear {
                round,
                until_poll: until_poll - dt,
            };
            return;
        }
        if session.registry.count() > 0 {
            self.phase = Phase::AwaitingClear {
                round,
                until_poll: CLEAR_POLL_INTERVAL,
            };
            return;
        }
        self.finish_round(round, session);
    }

    fn tick_awaiting_draft(&mut self, round: usize, session: &mut Session) {
        if self.take_selection_completed(session) {
            self.phase = Phase::InterRoundDelay {
                round,
                remaining: self.settings.round_interval,
            };
        }
    }

    fn tick_inter_round_delay(&mut self, round: usize, remaining: Duration, dt: Duration) {
        let remaining = remaining.saturating_sub(dt);
        self.phase = if remaining.is_zero() {
            Phase::Spawning {
                round: round + 1,
                next_enemy: 0,
                until_next: Duration::ZERO,
            }
        } else {
            Phase::InterRoundDelay { round, remaining }
        };
    }

    /// Grants the reward and announces the round's end, then decides how the
    /// loop proceeds: terminate after the final round, hold for the draft
    /// decision, or head straight into the inter-round delay.
    fn finish_round(&mut self, round: usize, session: &mut Session) {
        // Anything still queued predates this round's decision window.
        self.discard_pending(session);

        let definition = &self.rounds[round];
        session.bus.publish(Event::RoundRewardGranted {
            amount: definition.reward,
        });
        session.bus.publish(Event::RoundEnded {
            round: definition.ordinal,
        });
        log::info!("round {} cleared", definition.ordinal);

        let last = round + 1 == self.rounds.len();
        if last {
            log::info!("round loop complete");
            self.phase = Phase::Idle;
            self.release_subscription(session);
        } else if definition.offer_runes {
            self.phase = Phase::AwaitingDraft { round };
        } else {
            self.phase = Phase::InterRoundDelay {
                round,
                remaining: self.settings.round_interval,
            };
        }
    }

    fn spawn_enemy(&self, kind: &EnemyKindId, session: &mut Session) -> bool {
        let Some(prototype) = self.prototypes.get(kind) else {
            log::warn!(
                "no prototype mapped for enemy kind `{}`; skipping spawn",
                kind.as_str()
            );
            return false;
        };
        let enemy = session
            .store
            .spawn(prototype, self.spawn_point, self.spawn_facing);
        session.registry.add(enemy, &session.store);
        // Fresh spawns pick up the aggregate accumulated so far.
        if let Some(base) = session.registry.base_speed(enemy) {
            session.store.set_speed(enemy, session.stats.adjusted_speed(base));
        }
        session.bus.publish(Event::EnemySpawned { enemy });
        true
    }

    fn spawn_interval_for(&self, round: usize) -> Duration {
        self.rounds[round]
            .spawn_interval_override
            .filter(|interval| !interval.is_zero())
            .unwrap_or(self.settings.spawn_interval)
    }

    fn take_selection_completed(&mut self, session: &mut Session) -> bool {
        let Some(subscription) = self.subscription else {
            return true;
        };
        self.inbox.clear();
        session.bus.drain(subscription, &mut self.inbox);
        self.inbox
            .iter()
            .any(|event| matches!(event, Event::RuneSelectionCompleted))
    }

    fn discard_pending(&mut self, session: &mut Session) {
        if let Some(subscription) = self.subscription {
            self.inbox.clear();
            session.bus.drain(subscription, &mut self.inbox);
            self.inbox.clear();
        }
    }

    fn release_subscription(&mut self, session: &mut Session) {
        if let Some(subscription) = self.subscription.take() {
            session.bus.unsubscribe(subscription);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Orchestrator, Session};
    use rune_defence_core::{
        Effect, EffectOp, EffectTarget, EnemyKindId, EnemyPrototype, Event, GlobalRoundSettings,
        LevelPlan, Rarity, RoundDefinition, RuneDef, RuneId, WorldPoint,
    };
    use rune_defence_system_draft::{CatalogError, RuneCatalog};
    use std::time::Duration;

    struct EmptyCatalog;

    impl RuneCatalog for EmptyCatalog {
        fn resolve(&self, id: &RuneId) -> Result<RuneDef, CatalogError> {
            Err(CatalogError::NotFound(id.clone()))
        }
    }

    fn plan(rounds: Vec<RoundDefinition>) -> LevelPlan {
        LevelPlan {
            rounds,
            settings: GlobalRoundSettings {
                spawn_interval: Duration::ZERO,
                round_interval: Duration::ZERO,
            },
            prototypes: vec![EnemyPrototype {
                kind: EnemyKindId::new("grunt"),
                move_speed: 2.0,
            }],
            spawn_point: WorldPoint::new(0.0, 0.0),
            spawn_facing: 0.0,
            draft: None,
        }
    }

    fn round(ordinal: u32, enemies: &[&str]) -> RoundDefinition {
        RoundDefinition {
            ordinal,
            reward: 25,
            enemies: enemies.iter().copied().map(EnemyKindId::new).collect(),
            spawn_interval_override: None,
            offer_runes: false,
            rarity_override: None,
        }
    }

    #[test]
    fn empty_plan_stays_idle() {
        let mut session = Session::new();
        let mut orchestrator = Orchestrator::new();
        orchestrator.begin(&plan(Vec::new()), &EmptyCatalog, &mut session);
        assert!(!orchestrator.is_running());
        assert_eq!(orchestrator.current_round(), None);
    }

    #[test]
    fn begin_rejects_re_entry_while_running() {
        let mut session = Session::new();
        let mut orchestrator = Orchestrator::new();
        let level = plan(vec![round(1, &["grunt"]), round(2, &["grunt"])]);
        orchestrator.begin(&level, &EmptyCatalog, &mut session);
        assert!(orchestrator.is_running());

        orchestrator.begin(&level, &EmptyCatalog, &mut session);
        assert_eq!(
            session.bus.subscriber_count(),
            1,
            "the running loop keeps its single subscription"
        );
    }

    #[test]
    fn rounds_are_played_in_ordinal_order() {
        let mut session = Session::new();
        let mut orchestrator = Orchestrator::new();
        let level = plan(vec![round(2, &[]), round(1, &["grunt"])]);
        orchestrator.begin(&level, &EmptyCatalog, &mut session);
        assert_eq!(orchestrator.current_round(), Some(1));
    }

    #[test]
    fn missing_prototype_skips_exactly_that_spawn() {
        let mut session = Session::new();
        let mut orchestrator = Orchestrator::new();
        let level = plan(vec![round(1, &["grunt", "phantom", "grunt"])]);
        orchestrator.begin(&level, &EmptyCatalog, &mut session);

        orchestrator.tick(Duration::from_millis(1), &mut session);
        assert_eq!(session.store.living(), 2, "unmapped kind spawns nothing");
        assert_eq!(session.registry.count(), 2);
    }

    #[test]
    fn cancellation_unwinds_without_further_events() {
        let mut session = Session::new();
        let mut orchestrator = Orchestrator::new();
        let level = plan(vec![round(1, &["grunt"]), round(2, &["grunt"])]);
        orchestrator.begin(&level, &EmptyCatalog, &mut session);
        let probe = session.bus.subscribe();

        orchestrator.tick(Duration::from_millis(1), &mut session);
        let mut events = Vec::new();
        session.bus.drain(probe, &mut events);
        assert!(matches!(events.as_slice(), [Event::EnemySpawned { .. }]));

        orchestrator.cancel();
        orchestrator.tick(Duration::from_millis(1), &mut session);
        assert!(!orchestrator.is_running());

        events.clear();
        session.bus.drain(probe, &mut events);
        assert!(events.is_empty(), "cancellation publishes nothing");
    }

    #[test]
    fn fresh_spawns_receive_the_current_speed_aggregate() {
        let mut session = Session::new();
        session.stats.apply_candidate(&RuneDef {
            id: RuneId::new("frost"),
            name: "Frost".to_owned(),
            description: String::new(),
            rarity: Rarity::Common,
            effects: vec![Effect {
                target: EffectTarget::Enemy,
                attribute: "moveSpeed".to_owned(),
                op: EffectOp::Multiply,
                value: 0.5,
            }],
        });

        let mut orchestrator = Orchestrator::new();
        orchestrator.begin(&plan(vec![round(1, &["grunt"])]), &EmptyCatalog, &mut session);
        orchestrator.tick(Duration::from_millis(1), &mut session);

        let enemy = session
            .registry
            .entries()
            .next()
            .map(|(enemy, _)| enemy)
            .expect("one enemy spawned");
        let speed = session.store.speed(enemy).expect("alive");
        assert!((speed - 1.0).abs() < 1e-6, "base 2.0 halved at spawn time");
    }

    #[test]
    fn stop_and_reset_despawns_the_population_on_request() {
        let mut session = Session::new();
        let mut orchestrator = Orchestrator::new();
        let level = plan(vec![round(1, &["grunt", "grunt"])]);
        orchestrator.begin(&level, &EmptyCatalog, &mut session);
        orchestrator.tick(Duration::from_millis(1), &mut session);
        assert_eq!(session.store.living(), 2);

        orchestrator.stop_and_reset(&mut session, true);
        assert!(!orchestrator.is_running());
        assert_eq!(session.store.living(), 0);
        assert_eq!(session.registry.count(), 0);
        assert_eq!(session.bus.subscriber_count(), 0);

        orchestrator.stop_and_reset(&mut session, true);
    }
}
