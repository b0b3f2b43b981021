use std::collections::HashMap;
use std::time::Duration;

use rune_defence_core::{
    DraftConfig, EnemyKindId, EnemyPrototype, Event, GlobalRoundSettings, LevelPlan, Rarity,
    RoundDefinition, RuneDef, RuneId, SeedPolicy, WorldPoint,
};
use rune_defence_system_draft::{CatalogError, RuneCatalog};
use rune_defence_system_rounds::{Orchestrator, Session};

const DT: Duration = Duration::from_millis(50);

struct MemoryCatalog {
    defs: HashMap<RuneId, RuneDef>,
}

impl RuneCatalog for MemoryCatalog {
    fn resolve(&self, id: &RuneId) -> Result<RuneDef, CatalogError> {
        self.defs
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(id.clone()))
    }
}

fn catalog() -> MemoryCatalog {
    let tiers = [
        ("ember", Rarity::Common),
        ("frost", Rarity::Common),
        ("gale", Rarity::Common),
        ("stone", Rarity::Common),
        ("swift", Rarity::Rare),
        ("keen", Rarity::Rare),
        ("stout", Rarity::Rare),
        ("wrath", Rarity::Epic),
    ];
    MemoryCatalog {
        defs: tiers
            .iter()
            .map(|(id, rarity)| {
                (
                    RuneId::new(*id),
                    RuneDef {
                        id: RuneId::new(*id),
                        name: (*id).to_owned(),
                        description: String::new(),
                        rarity: *rarity,
                        effects: Vec::new(),
                    },
                )
            })
            .collect(),
    }
}

fn scripted_plan() -> LevelPlan {
    let round = |ordinal: u32, rarity: Option<Rarity>| RoundDefinition {
        ordinal,
        reward: ordinal * 10,
        enemies: vec![EnemyKindId::new("grunt"), EnemyKindId::new("grunt")],
        spawn_interval_override: Some(Duration::from_millis(100)),
        offer_runes: true,
        rarity_override: rarity,
    };
    LevelPlan {
        rounds: vec![
            round(1, None),
            round(2, Some(Rarity::Rare)),
            round(3, None),
            round(4, None),
        ],
        settings: GlobalRoundSettings {
            spawn_interval: Duration::from_millis(100),
            round_interval: Duration::from_millis(200),
        },
        prototypes: vec![EnemyPrototype {
            kind: EnemyKindId::new("grunt"),
            move_speed: 2.0,
        }],
        spawn_point: WorldPoint::new(0.0, 0.0),
        spawn_facing: 0.0,
        draft: Some(DraftConfig {
            pool: [
                "ember", "frost", "gale", "stone", "swift", "keen", "stout", "wrath",
            ]
            .iter()
            .copied()
            .map(RuneId::new)
            .collect(),
            default_rarity: None,
            auto_downgrade: true,
            skip_if_insufficient: false,
            seed: SeedPolicy::Fixed(0x0dd5_eed),
        }),
    }
}

fn replay() -> (Vec<Event>, Vec<Vec<RuneId>>) {
    let catalog = catalog();
    let plan = scripted_plan();
    let mut session = Session::new();
    let probe = session.bus.subscribe();
    let mut orchestrator = Orchestrator::new();
    orchestrator.begin(&plan, &catalog, &mut session);

    let mut log = Vec::new();
    let mut offers_seen = Vec::new();
    for _ in 0..4_000 {
        if !orchestrator.is_running() {
            break;
        }
        orchestrator.tick(DT, &mut session);
        if let Some((enemy, _)) = session.registry.entries().next() {
            session.retire_enemy(enemy);
        }

        let mut fresh = Vec::new();
        session.bus.drain(probe, &mut fresh);
        for event in fresh {
            if let Event::RoundEnded { round } = event {
                let offers = session.pool.offers_for_round(round);
                offers_seen.push(offers.iter().map(|def| def.id.clone()).collect());
                match offers.first() {
                    Some(def) => {
                        let id = def.id.clone();
                        session.select_rune(&id);
                    }
                    None => session.skip_selection(),
                }
            }
            log.push(event);
        }
    }
    assert!(!orchestrator.is_running(), "replay must run to completion");
    (log, offers_seen)
}

#[test]
fn deterministic_replay_produces_identical_runs() {
    let (first_events, first_offers) = replay();
    let (second_events, second_offers) = replay();

    assert_eq!(first_events, second_events, "event log diverged between runs");
    assert_eq!(first_offers, second_offers, "draft offers diverged between runs");

    assert_eq!(first_offers.len(), 4, "every round computed an offer");
    for offers in &first_offers {
        assert_eq!(offers.len(), 3, "each draw produced a full offer");
    }
}
