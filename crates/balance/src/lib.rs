#![deny(warnings)]

//! Balance configuration: the static upgrade catalog read by the economy engine.
//!
//! The catalog is loaded once at startup from JSON (or YAML, picked by file
//! extension) and validated before the engine sees it. Effect formulas are a
//! closed set of variants so the stat recalculation can match them
//! exhaustively.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Built-in demo balance shipped with the workspace.
pub const DEMO_BALANCE_JSON: &str = include_str!("../../../assets/balance/demo.json");

/// Unique identifier for an upgrade, e.g. "claws".
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpgradeId(pub String);

impl UpgradeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UpgradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UpgradeId {
    fn from(s: &str) -> Self {
        UpgradeId(s.to_string())
    }
}

impl Borrow<str> for UpgradeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Wire tag for the effect formula family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EffectKind {
    /// Adds `level * amount` to a base stat.
    AdditiveStat,
    /// Adds `level * amount` to the global multiplier.
    AdditiveMultiplier,
}

/// Every stat name accepted as `targetStat` on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TargetStat {
    ClickYield,
    PassiveRate,
    GlobalMultiplier,
    CritChance,
}

/// Stats that an additive-stat effect may modify.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stat {
    /// Resource gained per manual action before multipliers.
    ClickYield,
    /// Resource gained per second without manual action.
    PassiveRate,
    /// Probability in [0,1] that a manual action is critical.
    CritChance,
}

impl From<Stat> for TargetStat {
    fn from(s: Stat) -> Self {
        match s {
            Stat::ClickYield => TargetStat::ClickYield,
            Stat::PassiveRate => TargetStat::PassiveRate,
            Stat::CritChance => TargetStat::CritChance,
        }
    }
}

/// Per-level effect of an upgrade.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EffectSpec", into = "EffectSpec")]
pub enum Effect {
    /// Adds `level * per_level` to `stat`.
    AddStat { stat: Stat, per_level: Decimal },
    /// Adds `level * per_level` to the global multiplier (baseline 1).
    AddMultiplier { per_level: Decimal },
}

impl Effect {
    /// Amount contributed per purchased level.
    pub fn per_level(&self) -> Decimal {
        match self {
            Effect::AddStat { per_level, .. } | Effect::AddMultiplier { per_level } => *per_level,
        }
    }
}

/// Effect as written in balance files: `{ kind, targetStat, perLevelAmount }`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectSpec {
    pub kind: EffectKind,
    pub target_stat: TargetStat,
    pub per_level_amount: Decimal,
}

impl TryFrom<EffectSpec> for Effect {
    type Error = BalanceError;

    fn try_from(spec: EffectSpec) -> Result<Self> {
        let per_level = spec.per_level_amount;
        let stat = match (spec.kind, spec.target_stat) {
            (EffectKind::AdditiveMultiplier, TargetStat::GlobalMultiplier) => {
                return Ok(Effect::AddMultiplier { per_level })
            }
            (EffectKind::AdditiveStat, TargetStat::ClickYield) => Stat::ClickYield,
            (EffectKind::AdditiveStat, TargetStat::PassiveRate) => Stat::PassiveRate,
            (EffectKind::AdditiveStat, TargetStat::CritChance) => Stat::CritChance,
            (kind, stat) => return Err(BalanceError::EffectTarget { kind, stat }),
        };
        Ok(Effect::AddStat { stat, per_level })
    }
}

impl From<Effect> for EffectSpec {
    fn from(e: Effect) -> Self {
        match e {
            Effect::AddStat { stat, per_level } => EffectSpec {
                kind: EffectKind::AdditiveStat,
                target_stat: stat.into(),
                per_level_amount: per_level,
            },
            Effect::AddMultiplier { per_level } => EffectSpec {
                kind: EffectKind::AdditiveMultiplier,
                target_stat: TargetStat::GlobalMultiplier,
                per_level_amount: per_level,
            },
        }
    }
}

/// Gate that must be satisfied before an upgrade can be bought.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum UnlockCondition {
    /// Lifetime earnings must reach `threshold`.
    TotalEarnedAtLeast { threshold: Decimal },
}

impl UnlockCondition {
    pub fn is_met(&self, total_earned: Decimal) -> bool {
        match self {
            UnlockCondition::TotalEarnedAtLeast { threshold } => total_earned >= *threshold,
        }
    }
}

/// A purchasable, levelled upgrade.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeDefinition {
    /// Catalog-unique key.
    pub id: UpgradeId,
    /// Display name.
    pub name: String,
    /// Formula applied per level.
    pub effect: Effect,
    /// Cost of each level in order; its length is the max level.
    pub cost_schedule: Vec<Decimal>,
    /// Optional purchase gate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlock_condition: Option<UnlockCondition>,
    /// Fixed critical multiplier set by this upgrade, independent of level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical_multiplier_override: Option<Decimal>,
}

impl UpgradeDefinition {
    /// Highest reachable level.
    pub fn max_level(&self) -> u32 {
        u32::try_from(self.cost_schedule.len()).unwrap_or(u32::MAX)
    }

    /// Cost of buying the level after `level`, or `None` once maxed.
    pub fn cost_at(&self, level: u32) -> Option<Decimal> {
        self.cost_schedule.get(level as usize).copied()
    }

    /// Whether the unlock gate (if any) is met for the given lifetime earnings.
    pub fn is_unlocked(&self, total_earned: Decimal) -> bool {
        self.unlock_condition
            .as_ref()
            .map_or(true, |c| c.is_met(total_earned))
    }
}

/// Errors raised while loading or validating a balance catalog.
#[derive(Debug, Error)]
pub enum BalanceError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON balance: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid YAML balance: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("upgrade id must not be empty")]
    EmptyId,
    #[error("duplicate upgrade id: {0}")]
    DuplicateId(String),
    #[error("upgrade {0} has an empty cost schedule")]
    EmptyCostSchedule(String),
    #[error("upgrade {0} has a negative cost")]
    NegativeCost(String),
    #[error("upgrade {0} has a negative unlock threshold")]
    NegativeThreshold(String),
    #[error("upgrade {0} has a critical multiplier override <= 0")]
    InvalidCritOverride(String),
    #[error("effect kind {kind:?} cannot target {stat:?}")]
    EffectTarget { kind: EffectKind, stat: TargetStat },
}

pub type Result<T> = std::result::Result<T, BalanceError>;

/// Validate a single upgrade definition in isolation.
pub fn validate_upgrade(def: &UpgradeDefinition) -> Result<()> {
    if def.id.0.trim().is_empty() {
        return Err(BalanceError::EmptyId);
    }
    if def.cost_schedule.is_empty() {
        return Err(BalanceError::EmptyCostSchedule(def.id.0.clone()));
    }
    if def.cost_schedule.iter().any(|c| *c < Decimal::ZERO) {
        return Err(BalanceError::NegativeCost(def.id.0.clone()));
    }
    if let Some(UnlockCondition::TotalEarnedAtLeast { threshold }) = &def.unlock_condition {
        if *threshold < Decimal::ZERO {
            return Err(BalanceError::NegativeThreshold(def.id.0.clone()));
        }
    }
    if let Some(m) = def.critical_multiplier_override {
        if m <= Decimal::ZERO {
            return Err(BalanceError::InvalidCritOverride(def.id.0.clone()));
        }
    }
    Ok(())
}

/// On-disk shape of a balance file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    pub upgrades: Vec<UpgradeDefinition>,
}

/// Validated, ordered upgrade catalog with id lookup.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(try_from = "CatalogFile", into = "CatalogFile")]
pub struct Catalog {
    upgrades: Vec<UpgradeDefinition>,
    index: BTreeMap<UpgradeId, usize>,
}

impl Catalog {
    /// Build a catalog, rejecting invalid definitions and duplicate ids.
    pub fn new(upgrades: Vec<UpgradeDefinition>) -> Result<Self> {
        let mut index = BTreeMap::new();
        for (i, def) in upgrades.iter().enumerate() {
            validate_upgrade(def)?;
            if index.insert(def.id.clone(), i).is_some() {
                return Err(BalanceError::DuplicateId(def.id.0.clone()));
            }
        }
        Ok(Self { upgrades, index })
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let catalog: Catalog = serde_json::from_str(s)?;
        debug!(upgrades = catalog.len(), "parsed JSON balance");
        Ok(catalog)
    }

    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let catalog: Catalog = serde_yaml::from_str(s)?;
        debug!(upgrades = catalog.len(), "parsed YAML balance");
        Ok(catalog)
    }

    /// Load a balance file; `.yaml`/`.yml` are read as YAML, anything else as JSON.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| BalanceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&text),
            _ => Self::from_json_str(&text),
        }
    }

    /// The demo balance bundled into the binary.
    pub fn demo() -> Result<Self> {
        Self::from_json_str(DEMO_BALANCE_JSON)
    }

    pub fn get(&self, id: &str) -> Option<&UpgradeDefinition> {
        self.index.get(id).map(|&i| &self.upgrades[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Definitions in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &UpgradeDefinition> {
        self.upgrades.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &UpgradeId> {
        self.upgrades.iter().map(|u| &u.id)
    }

    pub fn len(&self) -> usize {
        self.upgrades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.upgrades.is_empty()
    }
}

impl TryFrom<CatalogFile> for Catalog {
    type Error = BalanceError;

    fn try_from(file: CatalogFile) -> Result<Self> {
        Catalog::new(file.upgrades)
    }
}

impl From<Catalog> for CatalogFile {
    fn from(c: Catalog) -> Self {
        CatalogFile {
            upgrades: c.upgrades,
        }
    }
}
