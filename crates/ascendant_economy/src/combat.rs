//! # Damage Formula
//!
//! Pure stat transform: no inventory access, no state mutation. Given the
//! same stats and the same random draw, the result is always identical.
//!
//! ```text
//! base     = max(1, attack - defense)
//! effect   = skill.effect_at(level) + sum(passive.effect_at(level))
//! bonus    = floor(base * effect / 100)
//! damage   = max(1, base + bonus + floor(uniform(0, 5)))
//! ```
//!
//! The variance is added after percentage scaling and is never multiplied
//! by the skill effect.

use serde::{Deserialize, Serialize};

use crate::fixed_point::FixedPoint;
use crate::rng::RandomSource;

/// Unique identifier for a skill (its catalog name).
pub type SkillId = String;

/// Upper bound (exclusive) of the flat damage variance.
pub const DAMAGE_VARIANCE: f64 = 5.0;

/// Combat-relevant stats of a player or creature.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorStats {
    /// Attack power.
    pub attack: u64,
    /// Defense.
    pub defense: u64,
    /// Character level.
    pub level: u32,
}

impl ActorStats {
    /// Creates a stat block.
    #[must_use]
    pub const fn new(attack: u64, defense: u64, level: u32) -> Self {
        Self {
            attack,
            defense,
            level,
        }
    }
}

/// How a skill is triggered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillType {
    /// Always on; its effect stacks additively onto every attack.
    Passive,
    /// Used explicitly.
    Active,
    /// Used explicitly, usually with a long cooldown.
    Ultimate,
}

fn default_max_level() -> u32 {
    10
}

fn default_required_level() -> u32 {
    1
}

/// A skill definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    /// Unique name.
    pub name: SkillId,
    /// Trigger type.
    #[serde(rename = "type")]
    pub skill_type: SkillType,
    /// Effect percentage at level 1.
    pub base_effect: FixedPoint,
    /// Effect percentage gained per level above 1.
    #[serde(default)]
    pub effect_per_level: FixedPoint,
    /// Energy consumed per use.
    #[serde(default)]
    pub energy_cost: u32,
    /// Cooldown in turns.
    #[serde(default)]
    pub cooldown: u32,
    /// Character level needed to learn the skill. Learning is outside the
    /// engine; combat does not gate on it.
    #[serde(default = "default_required_level")]
    pub required_level: u32,
    /// Highest trainable skill level; higher trained levels resolve as this.
    #[serde(default = "default_max_level")]
    pub max_level: u32,
}

impl Skill {
    /// Creates a skill with no costs, learnable from level 1.
    #[must_use]
    pub fn new(
        name: impl Into<SkillId>,
        skill_type: SkillType,
        base_effect: FixedPoint,
        effect_per_level: FixedPoint,
    ) -> Self {
        Self {
            name: name.into(),
            skill_type,
            base_effect,
            effect_per_level,
            energy_cost: 0,
            cooldown: 0,
            required_level: 1,
            max_level: default_max_level(),
        }
    }

    /// Effect percentage at `level`: `base + per_level * (level - 1)`.
    ///
    /// `level` is clamped to `1..=max_level`.
    #[inline]
    #[must_use]
    pub fn effect_at(&self, level: u32) -> FixedPoint {
        let steps = u64::from(level.clamp(1, self.max_level.max(1)) - 1);
        self.base_effect + self.effect_per_level * steps
    }

    /// Returns true for passive skills.
    #[inline]
    #[must_use]
    pub fn is_passive(&self) -> bool {
        self.skill_type == SkillType::Passive
    }
}

/// A passive skill at the level the attacker has trained it to.
#[derive(Clone, Copy, Debug)]
pub struct ActivePassive<'a> {
    /// The passive skill.
    pub skill: &'a Skill,
    /// Trained level.
    pub level: u32,
}

/// Every intermediate value of one damage roll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DamageBreakdown {
    /// `max(1, attack - defense)`.
    pub base: u64,
    /// Combined effect percentage of the skill and passives.
    pub effect_percent: FixedPoint,
    /// `floor(base * effect_percent / 100)`.
    pub bonus: u64,
    /// Flat variance in `0..5`.
    pub variance: u64,
    /// Final damage, at least 1.
    pub total: u64,
}

/// Resolves one attack and returns every intermediate value.
///
/// Consumes exactly one draw from `rng`.
pub fn resolve_damage<R: RandomSource + ?Sized>(
    attacker: &ActorStats,
    defender: &ActorStats,
    skill: &Skill,
    skill_level: u32,
    passives: &[ActivePassive<'_>],
    rng: &mut R,
) -> DamageBreakdown {
    let base = attacker.attack.saturating_sub(defender.defense).max(1);

    let mut effect_percent = skill.effect_at(skill_level);
    for passive in passives {
        if passive.skill.is_passive() {
            effect_percent += passive.skill.effect_at(passive.level);
        } else {
            tracing::trace!(skill = %passive.skill.name, "ignoring non-passive skill in passive list");
        }
    }

    let bonus = effect_percent.percent_of(base);
    let variance = variance_from_draw(rng.uniform_range(0.0, DAMAGE_VARIANCE));
    let total = base.saturating_add(bonus).saturating_add(variance).max(1);

    DamageBreakdown {
        base,
        effect_percent,
        bonus,
        variance,
        total,
    }
}

/// Computes the damage of one attack. Always at least 1.
pub fn compute_damage<R: RandomSource + ?Sized>(
    attacker: &ActorStats,
    defender: &ActorStats,
    skill: &Skill,
    skill_level: u32,
    passives: &[ActivePassive<'_>],
    rng: &mut R,
) -> u64 {
    resolve_damage(attacker, defender, skill, skill_level, passives, rng).total
}

/// Floors a variance draw into `0..=4`.
#[inline]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn variance_from_draw(draw: f64) -> u64 {
    // Custom sources may stray outside [0, 1).
    draw.floor().clamp(0.0, DAMAGE_VARIANCE - 1.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::{ScriptedRng, SeededRng};

    fn power_strike() -> Skill {
        Skill::new(
            "Power Strike",
            SkillType::Active,
            FixedPoint::from_parts(1, 500_000),
            FixedPoint::from_parts(0, 200_000),
        )
    }

    #[test]
    fn test_effect_scales_linearly() {
        let skill = power_strike();
        assert_eq!(skill.effect_at(1), FixedPoint::from_parts(1, 500_000));
        assert_eq!(skill.effect_at(6), FixedPoint::from_parts(2, 500_000));
        assert_eq!(skill.effect_at(0), skill.effect_at(1));
    }

    #[test]
    fn test_effect_capped_at_max_level() {
        let skill = power_strike();
        assert_eq!(skill.max_level, 10);
        assert_eq!(skill.effect_at(10), FixedPoint::from_parts(3, 300_000));
        assert_eq!(skill.effect_at(11), skill.effect_at(10));
        assert_eq!(skill.effect_at(u32::MAX), skill.effect_at(10));

        let fury = Skill {
            max_level: 3,
            ..Skill::new("Fury", SkillType::Passive, FixedPoint::from_whole(5), FixedPoint::from_whole(1))
        };
        let attacker = ActorStats::new(500, 0, 10);
        let defender = ActorStats::new(0, 100, 10);
        let at_cap = [ActivePassive { skill: &fury, level: 3 }];
        let over_cap = [ActivePassive { skill: &fury, level: 40 }];
        let capped = resolve_damage(&attacker, &defender, &skill, 10, &at_cap, &mut ScriptedRng::constant(0.0));
        let over = resolve_damage(&attacker, &defender, &skill, 99, &over_cap, &mut ScriptedRng::constant(0.0));
        assert_eq!(over, capped);
        // 3.3% + 7% of 400
        assert_eq!(capped.bonus, 41);
    }

    #[test]
    fn test_reference_example() {
        let attacker = ActorStats::new(500, 0, 10);
        let defender = ActorStats::new(0, 50, 10);
        let skill = power_strike();

        let low = resolve_damage(&attacker, &defender, &skill, 1, &[], &mut ScriptedRng::constant(0.0));
        assert_eq!(low.base, 450);
        assert_eq!(low.effect_percent, FixedPoint::from_parts(1, 500_000));
        assert_eq!(low.bonus, 6);
        assert_eq!(low.total, 456);

        let high = resolve_damage(&attacker, &defender, &skill, 1, &[], &mut ScriptedRng::constant(0.999_999));
        assert_eq!(high.variance, 4);
        assert_eq!(high.total, 460);

        let mut rng = SeededRng::from_seed(3);
        for _ in 0..1_000 {
            let damage = compute_damage(&attacker, &defender, &skill, 1, &[], &mut rng);
            assert!((456..=460).contains(&damage));
        }
    }

    #[test]
    fn test_defense_floors_base_at_one() {
        let attacker = ActorStats::new(10, 0, 1);
        let defender = ActorStats::new(0, 9_999, 1);
        let breakdown = resolve_damage(
            &attacker,
            &defender,
            &power_strike(),
            1,
            &[],
            &mut ScriptedRng::constant(0.0),
        );
        assert_eq!(breakdown.base, 1);
        assert_eq!(breakdown.total, 1);
    }

    #[test]
    fn test_passives_stack_additively() {
        let attacker = ActorStats::new(1_050, 0, 30);
        let defender = ActorStats::new(0, 50, 30);
        let skill = Skill::new("Cleave", SkillType::Active, FixedPoint::from_whole(10), FixedPoint::ZERO);
        let fury = Skill::new("Fury", SkillType::Passive, FixedPoint::from_whole(5), FixedPoint::from_whole(1));

        let passives = [ActivePassive { skill: &fury, level: 3 }];
        let breakdown = resolve_damage(&attacker, &defender, &skill, 1, &passives, &mut ScriptedRng::constant(0.0));

        // 10% + (5% + 2 * 1%) = 17% of 1000, not 10% then 7% compounded
        assert_eq!(breakdown.effect_percent, FixedPoint::from_whole(17));
        assert_eq!(breakdown.bonus, 170);
        assert_eq!(breakdown.total, 1_170);
    }

    #[test]
    fn test_non_passive_in_passive_list_is_ignored() {
        let attacker = ActorStats::new(200, 0, 1);
        let defender = ActorStats::default();
        let skill = Skill::new("Jab", SkillType::Active, FixedPoint::ZERO, FixedPoint::ZERO);
        let ultimate = Skill::new("Meteor", SkillType::Ultimate, FixedPoint::from_whole(500), FixedPoint::ZERO);

        let passives = [ActivePassive { skill: &ultimate, level: 1 }];
        let damage = compute_damage(&attacker, &defender, &skill, 1, &passives, &mut ScriptedRng::constant(0.0));
        assert_eq!(damage, 200);
    }

    #[test]
    fn test_variance_is_not_scaled() {
        // A 100% effect doubles the base but must not double the variance.
        let attacker = ActorStats::new(100, 0, 1);
        let defender = ActorStats::default();
        let skill = Skill::new("Double", SkillType::Active, FixedPoint::from_whole(100), FixedPoint::ZERO);

        let breakdown = resolve_damage(&attacker, &defender, &skill, 1, &[], &mut ScriptedRng::constant(0.9));
        assert_eq!(breakdown.variance, 4);
        assert_eq!(breakdown.total, 204);
    }

    #[test]
    fn test_consumes_one_draw() {
        let mut rng = ScriptedRng::new(vec![0.1, 0.2, 0.3]);
        let _ = compute_damage(&ActorStats::default(), &ActorStats::default(), &power_strike(), 1, &[], &mut rng);
        assert_eq!(rng.draws(), 1);
    }
}
