//! Mutable economy state and its conversion to and from snapshots.

use balance::{Catalog, UpgradeId};
use econ::{recalculate, Stats};
use persistence::Snapshot;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::warn;

/// The live economy. Only the engine mutates it; everyone else reads.
#[derive(Clone, Debug, PartialEq)]
pub struct EconomyState {
    resource: Decimal,
    total_earned: Decimal,
    stats: Stats,
    upgrade_levels: BTreeMap<UpgradeId, u32>,
    sound_enabled: bool,
    pending_offline_gain: Option<Decimal>,
}

impl EconomyState {
    /// Fresh state: every catalog upgrade at level 0, baseline stats.
    pub fn new(catalog: &Catalog) -> Self {
        let upgrade_levels = catalog.ids().map(|id| (id.clone(), 0)).collect();
        let mut state = Self {
            resource: Decimal::ZERO,
            total_earned: Decimal::ZERO,
            stats: Stats::baseline(),
            upgrade_levels,
            sound_enabled: true,
            pending_offline_gain: None,
        };
        state.refresh_stats(catalog);
        state
    }

    /// Rebuild state from a snapshot.
    ///
    /// Levels are merged only for ids still in the catalog and clamped to
    /// their schedule length; anything else in the snapshot is dropped.
    pub(crate) fn restore(catalog: &Catalog, snap: &Snapshot) -> Self {
        let mut state = Self::new(catalog);
        state.resource = snap.resource.max(Decimal::ZERO);
        state.total_earned = snap.total_earned.max(Decimal::ZERO);
        state.sound_enabled = snap.sound_enabled;
        for (id, &level) in &snap.upgrade_levels {
            let Some(def) = catalog.get(id) else {
                warn!(upgrade = %id, "dropping level for upgrade no longer in catalog");
                continue;
            };
            let max = def.max_level();
            if level > max {
                warn!(upgrade = %id, level, max, "clamping saved level to schedule length");
            }
            state.upgrade_levels.insert(def.id.clone(), level.min(max));
        }
        state.refresh_stats(catalog);
        state
    }

    pub(crate) fn to_snapshot(&self, saved_at_epoch_millis: i64) -> Snapshot {
        Snapshot {
            resource: self.resource,
            total_earned: self.total_earned,
            upgrade_levels: self
                .upgrade_levels
                .iter()
                .map(|(id, &l)| (id.0.clone(), l))
                .collect(),
            saved_at_epoch_millis: Some(saved_at_epoch_millis),
            sound_enabled: self.sound_enabled,
        }
    }

    pub fn resource(&self) -> Decimal {
        self.resource
    }

    pub fn total_earned(&self) -> Decimal {
        self.total_earned
    }

    /// Derived stats, always equal to `recalculate` over the current levels.
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Level of `id`; 0 for ids not in the catalog.
    pub fn level(&self, id: &str) -> u32 {
        self.upgrade_levels.get(id).copied().unwrap_or(0)
    }

    pub fn upgrade_levels(&self) -> &BTreeMap<UpgradeId, u32> {
        &self.upgrade_levels
    }

    pub fn sound_enabled(&self) -> bool {
        self.sound_enabled
    }

    /// Offline production credited on load and not yet shown.
    pub fn pending_offline_gain(&self) -> Option<Decimal> {
        self.pending_offline_gain
    }

    /// Add earnings to both the balance and the lifetime counter.
    pub(crate) fn credit(&mut self, gain: Decimal) {
        if gain <= Decimal::ZERO {
            return;
        }
        self.resource = self.resource.saturating_add(gain);
        self.total_earned = self.total_earned.saturating_add(gain);
    }

    /// Spend from the balance. Callers check affordability first.
    pub(crate) fn spend(&mut self, cost: Decimal) {
        self.resource = self.resource.saturating_sub(cost).max(Decimal::ZERO);
    }

    pub(crate) fn increment_level(&mut self, id: &UpgradeId) {
        let level = self.upgrade_levels.entry(id.clone()).or_insert(0);
        *level = level.saturating_add(1);
    }

    pub(crate) fn refresh_stats(&mut self, catalog: &Catalog) {
        self.stats = recalculate(catalog, &self.upgrade_levels);
    }

    pub(crate) fn set_sound_enabled(&mut self, enabled: bool) {
        self.sound_enabled = enabled;
    }

    pub(crate) fn set_pending_offline_gain(&mut self, gain: Decimal) {
        self.pending_offline_gain = Some(gain);
    }

    pub(crate) fn take_pending_offline_gain(&mut self) -> Option<Decimal> {
        self.pending_offline_gain.take()
    }
}
