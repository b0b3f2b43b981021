//! JSON level and rune models consumed by the demo adapter.
//!
//! The engine proper receives already-parsed [`LevelPlan`] values; this
//! module stands in for the embedding runtime's configuration loader and
//! reads the streaming-asset JSON shapes the original game shipped.

use std::time::Duration;

use rune_defence_core::{
    DraftConfig, Effect, EffectOp, EffectTarget, EnemyKindId, EnemyPrototype,
    GlobalRoundSettings, LevelPlan, Rarity, RoundDefinition, RuneDef, RuneId, SeedPolicy,
    WorldPoint,
};
use rune_defence_system_draft::CatalogError;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LevelFile {
    #[serde(default)]
    pub(crate) display_name: String,
    pub(crate) spawn_point: PointModel,
    #[serde(default)]
    pub(crate) spawn_facing: f32,
    pub(crate) global: GlobalModel,
    pub(crate) rounds: Vec<RoundModel>,
    pub(crate) enemies: Vec<EnemyModel>,
    #[serde(default)]
    pub(crate) runes: Option<RunesModel>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PointModel {
    pub(crate) x: f32,
    pub(crate) z: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GlobalModel {
    pub(crate) spawn_interval: f32,
    pub(crate) round_interval: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RoundModel {
    pub(crate) round: u32,
    #[serde(default)]
    pub(crate) reward: u32,
    pub(crate) enemies: Vec<String>,
    #[serde(default)]
    pub(crate) spawn_interval: f32,
    #[serde(default)]
    pub(crate) offer_runes: bool,
    #[serde(default)]
    pub(crate) rarity: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EnemyModel {
    pub(crate) id: String,
    pub(crate) move_speed: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RunesModel {
    pub(crate) pool_ids: Vec<String>,
    #[serde(default)]
    pub(crate) default_rarity: Option<String>,
    #[serde(default)]
    pub(crate) auto_downgrade_rarity: bool,
    #[serde(default)]
    pub(crate) skip_if_insufficient: bool,
    #[serde(default)]
    pub(crate) use_random_seed: bool,
    #[serde(default)]
    pub(crate) random_seed: u64,
}

impl LevelFile {
    /// Converts the parsed file into the engine's plan, clamping negative
    /// timings and warning about unknown rarity names.
    pub(crate) fn into_plan(self, seed_override: Option<u64>) -> LevelPlan {
        let rounds = self
            .rounds
            .iter()
            .map(|round| RoundDefinition {
                ordinal: round.round,
                reward: round.reward,
                enemies: round.enemies.iter().cloned().map(EnemyKindId::new).collect(),
                spawn_interval_override: (round.spawn_interval > 0.0)
                    .then(|| Duration::from_secs_f32(round.spawn_interval)),
                offer_runes: round.offer_runes,
                rarity_override: round.rarity.as_deref().and_then(parse_rarity),
            })
            .collect();

        let draft = self.runes.map(|runes| DraftConfig {
            pool: runes.pool_ids.iter().cloned().map(RuneId::new).collect(),
            default_rarity: runes.default_rarity.as_deref().and_then(parse_rarity),
            auto_downgrade: runes.auto_downgrade_rarity,
            skip_if_insufficient: runes.skip_if_insufficient,
            seed: match seed_override {
                Some(seed) => SeedPolicy::Fixed(seed),
                None if runes.use_random_seed => SeedPolicy::Fixed(runes.random_seed),
                None => SeedPolicy::Entropy,
            },
        });

        LevelPlan {
            rounds,
            settings: GlobalRoundSettings {
                spawn_interval: Duration::from_secs_f32(self.global.spawn_interval.max(0.0)),
                round_interval: Duration::from_secs_f32(self.global.round_interval.max(0.0)),
            },
            prototypes: self
                .enemies
                .iter()
                .map(|enemy| EnemyPrototype {
                    kind: EnemyKindId::new(enemy.id.clone()),
                    move_speed: enemy.move_speed,
                })
                .collect(),
            spawn_point: WorldPoint::new(self.spawn_point.x, self.spawn_point.z),
            spawn_facing: self.spawn_facing,
            draft,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RuneFile {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) description: String,
    pub(crate) rarity: String,
    #[serde(default)]
    pub(crate) effects: Vec<EffectModel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EffectModel {
    pub(crate) target: String,
    pub(crate) attribute: String,
    pub(crate) operation: String,
    pub(crate) value: f32,
}

impl RuneFile {
    /// Builds the engine definition for the id the pool asked about.
    ///
    /// An unknown rarity is malformed since tier search depends on it;
    /// effects with unknown targets or operations are dropped with a
    /// warning, matching how the engine treats unsupported attributes.
    pub(crate) fn into_def(self, id: &RuneId) -> Result<RuneDef, CatalogError> {
        let Some(rarity) = parse_rarity(&self.rarity) else {
            return Err(CatalogError::Malformed {
                id: id.clone(),
                reason: format!("unknown rarity `{}`", self.rarity),
            });
        };
        let effects = self
            .effects
            .into_iter()
            .filter_map(|effect| {
                let target = match effect.target.as_str() {
                    "Tower" => EffectTarget::Tower,
                    "Enemy" => EffectTarget::Enemy,
                    other => {
                        log::warn!(
                            "rune `{}`: dropping effect with unknown target `{other}`",
                            id.as_str()
                        );
                        return None;
                    }
                };
                let op = match effect.operation.as_str() {
                    "add" => EffectOp::Add,
                    "mult" => EffectOp::Multiply,
                    other => {
                        log::warn!(
                            "rune `{}`: dropping effect with unknown operation `{other}`",
                            id.as_str()
                        );
                        return None;
                    }
                };
                Some(Effect {
                    target,
                    attribute: effect.attribute,
                    op,
                    value: effect.value,
                })
            })
            .collect();
        Ok(RuneDef {
            id: id.clone(),
            name: self.name,
            description: self.description,
            rarity,
            effects,
        })
    }
}

fn parse_rarity(raw: &str) -> Option<Rarity> {
    match raw {
        "Common" => Some(Rarity::Common),
        "Rare" => Some(Rarity::Rare),
        "Epic" => Some(Rarity::Epic),
        other => {
            if !other.is_empty() {
                log::warn!("unknown rarity `{other}` ignored");
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::LevelFile;
    use rune_defence_core::{Rarity, SeedPolicy};
    use std::time::Duration;

    const LEVEL: &str = r#"{
        "displayName": "Proving Grounds",
        "spawnPoint": { "x": 0.0, "z": -4.0 },
        "global": { "spawnInterval": 0.8, "roundInterval": 2.0 },
        "rounds": [
            {
                "round": 1,
                "reward": 25,
                "enemies": ["grunt", "grunt", "tank"],
                "spawnInterval": 0.5,
                "offerRunes": true,
                "rarity": "Epic"
            }
        ],
        "enemies": [{ "id": "grunt", "moveSpeed": 2.0 }],
        "runes": {
            "poolIds": ["ember", "frost"],
            "defaultRarity": "Common",
            "autoDowngradeRarity": true,
            "skipIfInsufficient": false,
            "useRandomSeed": true,
            "randomSeed": 99
        }
    }"#;

    #[test]
    fn level_file_converts_to_a_plan() {
        let file: LevelFile = serde_json::from_str(LEVEL).expect("parse");
        let plan = file.into_plan(None);

        assert_eq!(plan.rounds.len(), 1);
        let round = &plan.rounds[0];
        assert_eq!(round.ordinal, 1);
        assert_eq!(
            round.spawn_interval_override,
            Some(Duration::from_millis(500))
        );
        assert_eq!(round.rarity_override, Some(Rarity::Epic));

        let draft = plan.draft.expect("draft config");
        assert_eq!(draft.seed, SeedPolicy::Fixed(99));
        assert_eq!(draft.default_rarity, Some(Rarity::Common));
    }

    #[test]
    fn seed_override_wins_over_the_file_policy() {
        let file: LevelFile = serde_json::from_str(LEVEL).expect("parse");
        let plan = file.into_plan(Some(7));
        assert_eq!(plan.draft.expect("draft config").seed, SeedPolicy::Fixed(7));
    }
}
