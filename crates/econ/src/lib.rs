#![deny(warnings)]

//! Economy formulas: derived stats and gain computations.
//!
//! Everything here is a pure function of its inputs:
//! - Stat recalculation from upgrade levels and the balance catalog
//! - Manual gain with a critical roll
//! - Passive production over an elapsed interval
//! - Offline production, capped to a maximum simulated duration

use balance::{Catalog, Effect, Stat, UpgradeId};
use rand::Rng;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Manual yield before any upgrade.
pub const BASE_CLICK_YIELD: Decimal = Decimal::ONE;
/// Passive production before any upgrade.
pub const BASE_PASSIVE_RATE: Decimal = Decimal::ZERO;
/// Global multiplier before any upgrade.
pub const BASE_GLOBAL_MULTIPLIER: Decimal = Decimal::ONE;
/// Critical chance before any upgrade (0.05).
pub const BASE_CRIT_CHANCE: Decimal = Decimal::from_parts(5, 0, 0, false, 2);
/// Critical multiplier unless an upgrade overrides it.
pub const BASE_CRIT_MULTIPLIER: Decimal = Decimal::TEN;

/// Default cap for offline production, one hour.
pub const DEFAULT_OFFLINE_CAP_SECS: u32 = 3600;

/// Derived production stats. Always produced by [`recalculate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    /// Resource per manual action before multipliers.
    pub click_yield: Decimal,
    /// Resource per second before multipliers.
    pub passive_rate: Decimal,
    /// Scalar applied to manual and passive gains.
    pub global_multiplier: Decimal,
    /// Probability in [0,1] that a manual action is critical.
    pub crit_chance: Decimal,
    /// Factor applied to critical manual gains.
    pub crit_multiplier: Decimal,
}

impl Stats {
    pub const fn baseline() -> Self {
        Self {
            click_yield: BASE_CLICK_YIELD,
            passive_rate: BASE_PASSIVE_RATE,
            global_multiplier: BASE_GLOBAL_MULTIPLIER,
            crit_chance: BASE_CRIT_CHANCE,
            crit_multiplier: BASE_CRIT_MULTIPLIER,
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::baseline()
    }
}

/// Recompute derived stats from scratch.
///
/// Each definition contributes `level * per_level` to its target. A
/// critical multiplier override is set, not accumulated, and does not depend
/// on level; when several definitions carry one, the last in catalog order
/// wins. Ids missing from `levels` count as level 0; ids not in the catalog
/// are ignored.
pub fn recalculate(catalog: &Catalog, levels: &BTreeMap<UpgradeId, u32>) -> Stats {
    let mut s = Stats::baseline();
    for def in catalog.iter() {
        let level = levels.get(&def.id).copied().unwrap_or(0);
        let amount = Decimal::from(level).saturating_mul(def.effect.per_level());
        match def.effect {
            Effect::AddStat { stat, .. } => {
                let slot = match stat {
                    Stat::ClickYield => &mut s.click_yield,
                    Stat::PassiveRate => &mut s.passive_rate,
                    Stat::CritChance => &mut s.crit_chance,
                };
                *slot = slot.saturating_add(amount);
            }
            Effect::AddMultiplier { .. } => {
                s.global_multiplier = s.global_multiplier.saturating_add(amount);
            }
        }
        if let Some(m) = def.critical_multiplier_override {
            s.crit_multiplier = m;
        }
    }
    s
}

/// Outcome of a single manual action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ManualGain {
    pub gain: Decimal,
    pub is_critical: bool,
}

/// Manual gain for a given uniform `sample` in [0,1).
///
/// The action is critical when `sample < crit_chance`.
pub fn manual_gain(stats: &Stats, sample: f64) -> ManualGain {
    let base = stats.click_yield.saturating_mul(stats.global_multiplier);
    let is_critical = sample < stats.crit_chance.to_f64().unwrap_or(0.0);
    let gain = if is_critical {
        base.saturating_mul(stats.crit_multiplier)
    } else {
        base
    };
    ManualGain {
        gain: gain.max(Decimal::ZERO),
        is_critical,
    }
}

/// Manual gain drawing one uniform sample from `rng`.
pub fn roll_manual_gain<R: Rng + ?Sized>(stats: &Stats, rng: &mut R) -> ManualGain {
    manual_gain(stats, rng.gen::<f64>())
}

/// Passive production over `elapsed_secs`.
///
/// Zero when the passive rate or the elapsed time is not positive.
pub fn passive_gain(stats: &Stats, elapsed_secs: Decimal) -> Decimal {
    if stats.passive_rate <= Decimal::ZERO || elapsed_secs <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    stats
        .passive_rate
        .saturating_mul(elapsed_secs)
        .saturating_mul(stats.global_multiplier)
        .max(Decimal::ZERO)
}

/// Offline seconds credited for `elapsed_millis`, clamped to `[0, cap_secs]`.
pub fn offline_seconds(elapsed_millis: i64, cap_secs: u32) -> Decimal {
    Decimal::new(elapsed_millis.max(0), 3).min(Decimal::from(cap_secs))
}

/// Passive production credited for time spent away, capped at `cap_secs`.
pub fn offline_gain(stats: &Stats, elapsed_millis: i64, cap_secs: u32) -> Decimal {
    passive_gain(stats, offline_seconds(elapsed_millis, cap_secs))
}

/// Convert a wall-clock interval in seconds; `None` for NaN or infinities.
pub fn seconds_from_f64(secs: f64) -> Option<Decimal> {
    if !secs.is_finite() {
        return None;
    }
    Decimal::from_f64(secs)
}
