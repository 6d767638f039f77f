//! The economy engine: actions, purchase gating, observers and debounced saves.

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::observer::{ObserverRegistry, StateObserver};
use crate::state::EconomyState;
use crate::timer::SaveTimer;
use balance::Catalog;
use econ::ManualGain;
use persistence::SaveStore;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

/// Owns the single live [`EconomyState`] of a running game.
///
/// All mutation goes through the operations here. Each one ends by
/// notifying observers and arming the save timer; the host pumps
/// [`EconomyEngine::poll_save`] from its loop to let the timer fire.
pub struct EconomyEngine {
    catalog: Catalog,
    config: EngineConfig,
    state: EconomyState,
    store: Box<dyn SaveStore>,
    clock: Box<dyn Clock>,
    rng: Box<dyn RngCore>,
    observers: ObserverRegistry,
    save_timer: SaveTimer,
    save_wiped: bool,
}

impl EconomyEngine {
    /// Hydrate an engine from the store, crediting offline production.
    ///
    /// A missing, unreadable or malformed save is logged and replaced by a
    /// fresh state; loading never fails.
    pub fn load(
        catalog: Catalog,
        config: EngineConfig,
        store: Box<dyn SaveStore>,
        clock: Box<dyn Clock>,
    ) -> Self {
        let now = clock.now_millis();
        let (mut state, saved_at) = match persistence::load_snapshot(store.as_ref(), &config.save_key)
        {
            Ok(Some(snap)) => {
                let state = EconomyState::restore(&catalog, &snap);
                info!(
                    resource = %state.resource(),
                    total_earned = %state.total_earned(),
                    "save loaded"
                );
                (state, snap.saved_at_epoch_millis)
            }
            Ok(None) => {
                info!("no save found, starting fresh");
                (EconomyState::new(&catalog), None)
            }
            Err(e) => {
                warn!(error = %e, "save unreadable, starting fresh");
                (EconomyState::new(&catalog), None)
            }
        };

        if let Some(saved_at) = saved_at {
            let away_ms = now.saturating_sub(saved_at);
            let gain = econ::offline_gain(state.stats(), away_ms, config.offline_cap_secs);
            if gain > Decimal::ZERO {
                state.credit(gain);
                state.set_pending_offline_gain(gain);
                info!(%gain, away_ms, "offline production credited");
            }
        }

        let seed = config.rng_seed.unwrap_or_else(rand::random);
        let save_timer = SaveTimer::new(config.save_debounce_ms);
        Self {
            catalog,
            config,
            state,
            store,
            clock,
            rng: Box::new(ChaCha8Rng::seed_from_u64(seed)),
            observers: ObserverRegistry::new(),
            save_timer,
            save_wiped: false,
        }
    }

    /// Replace the source of critical rolls.
    pub fn with_rng<R: RngCore + 'static>(mut self, rng: R) -> Self {
        self.rng = Box::new(rng);
        self
    }

    pub fn state(&self) -> &EconomyState {
        &self.state
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn subscribe<O: StateObserver + 'static>(&mut self, observer: O) {
        self.observers.subscribe(observer);
    }

    /// One manual action, possibly critical.
    pub fn apply_manual_gain(&mut self) -> ManualGain {
        let outcome = econ::roll_manual_gain(self.state.stats(), self.rng.as_mut());
        self.state.credit(outcome.gain);
        self.changed();
        outcome
    }

    /// Passive production for `elapsed_seconds` of real time.
    pub fn apply_passive_tick(&mut self, elapsed_seconds: f64) {
        let Some(elapsed) = econ::seconds_from_f64(elapsed_seconds) else {
            return;
        };
        if self.state.stats().passive_rate <= Decimal::ZERO || elapsed <= Decimal::ZERO {
            return;
        }
        let gain = econ::passive_gain(self.state.stats(), elapsed);
        self.state.credit(gain);
        self.changed();
    }

    pub fn is_unlocked(&self, id: &str) -> bool {
        self.catalog
            .get(id)
            .is_some_and(|def| def.is_unlocked(self.state.total_earned()))
    }

    pub fn can_afford(&self, id: &str) -> bool {
        self.next_cost(id)
            .is_some_and(|cost| self.state.resource() >= cost)
    }

    pub fn level(&self, id: &str) -> u32 {
        self.state.level(id)
    }

    /// Cost of the next level; `None` when maxed or unknown.
    pub fn next_cost(&self, id: &str) -> Option<Decimal> {
        self.catalog
            .get(id)
            .and_then(|def| def.cost_at(self.state.level(id)))
    }

    pub fn is_maxed(&self, id: &str) -> bool {
        self.catalog
            .get(id)
            .is_some_and(|def| self.state.level(id) >= def.max_level())
    }

    /// Buy one level of `id`. Returns `false`, changing nothing, when the id
    /// is unknown, locked, maxed or unaffordable.
    pub fn purchase(&mut self, id: &str) -> bool {
        if !self.is_unlocked(id) || !self.can_afford(id) {
            debug!(upgrade = id, "purchase refused");
            return false;
        }
        let (Some(def), Some(cost)) = (self.catalog.get(id), self.next_cost(id)) else {
            return false;
        };
        let upgrade = def.id.clone();
        self.state.spend(cost);
        self.state.increment_level(&upgrade);
        self.state.refresh_stats(&self.catalog);
        debug!(%upgrade, %cost, level = self.state.level(id), "upgrade purchased");
        self.changed();
        true
    }

    /// Flip the sound preference and return the new value.
    pub fn toggle_sound(&mut self) -> bool {
        let enabled = !self.state.sound_enabled();
        self.state.set_sound_enabled(enabled);
        self.changed();
        enabled
    }

    /// Offline production credited on load, returned once.
    pub fn take_pending_offline_gain(&mut self) -> Option<Decimal> {
        self.state.take_pending_offline_gain()
    }

    /// Delete the persisted save.
    ///
    /// Any pending save is dropped and no further saves are written by this
    /// instance; the host is expected to construct a fresh engine.
    pub fn reset_save(&mut self) {
        self.save_timer.cancel();
        self.save_wiped = true;
        match self.store.remove(&self.config.save_key) {
            Ok(()) => info!(key = %self.config.save_key, "save wiped"),
            Err(e) => warn!(error = %e, "failed to wipe save"),
        }
    }

    pub fn save_pending(&self) -> bool {
        self.save_timer.is_pending()
    }

    /// Epoch millis at which the pending save fires.
    pub fn next_save_due(&self) -> Option<i64> {
        self.save_timer.due_at()
    }

    /// Write the snapshot if the debounce window has elapsed. Returns whether
    /// a write was attempted.
    pub fn poll_save(&mut self) -> bool {
        if !self.save_timer.fire_if_due(self.clock.now_millis()) {
            return false;
        }
        self.write_save();
        true
    }

    /// Write immediately if a save is pending, e.g. on shutdown.
    pub fn flush_save(&mut self) -> bool {
        if !self.save_timer.cancel() {
            return false;
        }
        self.write_save();
        true
    }

    fn changed(&mut self) {
        self.observers.notify(&self.state);
        self.schedule_save();
    }

    fn schedule_save(&mut self) {
        if self.save_wiped {
            return;
        }
        let now = self.clock.now_millis();
        if self.save_timer.arm(now) {
            debug!(due_at = ?self.save_timer.due_at(), "save scheduled");
        }
    }

    fn write_save(&mut self) {
        let snap = self.state.to_snapshot(self.clock.now_millis());
        // Failures are not retried; the next change arms a new window.
        if let Err(e) = persistence::write_snapshot(self.store.as_mut(), &self.config.save_key, &snap)
        {
            warn!(error = %e, "save failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use balance::{Effect, Stat, UnlockCondition, UpgradeDefinition, UpgradeId};
    use persistence::{MemoryStore, Snapshot};
    use proptest::prelude::*;
    use rand::rngs::mock::StepRng;
    use std::cell::RefCell;
    use std::rc::Rc;

    const T0: i64 = 1_700_000_000_000;

    fn def(id: &str, effect: Effect, costs: &[i64]) -> UpgradeDefinition {
        UpgradeDefinition {
            id: UpgradeId::from(id),
            name: id.to_string(),
            effect,
            cost_schedule: costs.iter().map(|&c| Decimal::from(c)).collect(),
            unlock_condition: None,
            critical_multiplier_override: None,
        }
    }

    fn catalog() -> Catalog {
        let mut c = def(
            "C",
            Effect::AddMultiplier {
                per_level: Decimal::ONE,
            },
            &[5],
        );
        c.unlock_condition = Some(UnlockCondition::TotalEarnedAtLeast {
            threshold: Decimal::from(1000),
        });
        Catalog::new(vec![
            def(
                "A",
                Effect::AddStat {
                    stat: Stat::ClickYield,
                    per_level: Decimal::ONE,
                },
                &[10, 20],
            ),
            def(
                "B",
                Effect::AddStat {
                    stat: Stat::PassiveRate,
                    per_level: Decimal::new(2, 1),
                },
                &[1, 1, 1, 1],
            ),
            c,
        ])
        .unwrap()
    }

    /// Crit never fires: samples are just below 1.
    fn no_crit() -> StepRng {
        StepRng::new(u64::MAX, 0)
    }

    /// Crit always fires: samples are 0.
    fn always_crit() -> StepRng {
        StepRng::new(0, 0)
    }

    struct Harness {
        engine: EconomyEngine,
        store: MemoryStore,
        clock: ManualClock,
    }

    fn boot(store: MemoryStore, clock: ManualClock) -> Harness {
        let engine = EconomyEngine::load(
            catalog(),
            EngineConfig::default(),
            Box::new(store.clone()),
            Box::new(clock.clone()),
        )
        .with_rng(no_crit());
        Harness {
            engine,
            store,
            clock,
        }
    }

    fn fresh() -> Harness {
        boot(MemoryStore::new(), ManualClock::new(T0))
    }

    fn seeded(snapshot: Snapshot, clock: ManualClock) -> Harness {
        let store = MemoryStore::new();
        store.insert_raw(persistence::DEFAULT_SAVE_KEY, &snapshot.encode().unwrap());
        boot(store, clock)
    }

    fn snapshot(resource: i64, total: i64, levels: &[(&str, u32)], saved_at: Option<i64>) -> Snapshot {
        Snapshot {
            resource: Decimal::from(resource),
            total_earned: Decimal::from(total),
            upgrade_levels: levels.iter().map(|&(id, l)| (id.to_string(), l)).collect(),
            saved_at_epoch_millis: saved_at,
            sound_enabled: true,
        }
    }

    #[test]
    fn click_then_buy_then_click() {
        let mut h = fresh();
        let first = h.engine.apply_manual_gain();
        assert_eq!(
            first,
            ManualGain {
                gain: Decimal::ONE,
                is_critical: false
            }
        );
        for _ in 0..9 {
            h.engine.apply_manual_gain();
        }
        assert_eq!(h.engine.state().resource(), Decimal::from(10));
        assert!(h.engine.purchase("A"));
        assert_eq!(h.engine.state().stats().click_yield, Decimal::from(2));
        assert_eq!(h.engine.state().resource(), Decimal::ZERO);
        assert_eq!(h.engine.state().total_earned(), Decimal::from(10));
        assert_eq!(h.engine.apply_manual_gain().gain, Decimal::from(2));
    }

    #[test]
    fn critical_gain_uses_multiplier() {
        let mut h = fresh();
        h.engine = h.engine.with_rng(always_crit());
        let g = h.engine.apply_manual_gain();
        assert!(g.is_critical);
        assert_eq!(g.gain, Decimal::from(10));
        assert_eq!(h.engine.state().total_earned(), Decimal::from(10));
    }

    #[test]
    fn seeded_engines_roll_identically() {
        let config = EngineConfig {
            rng_seed: Some(7),
            ..EngineConfig::default()
        };
        let mk = || {
            EconomyEngine::load(
                catalog(),
                config.clone(),
                Box::new(MemoryStore::new()),
                Box::new(ManualClock::new(T0)),
            )
        };
        let (mut a, mut b) = (mk(), mk());
        for _ in 0..200 {
            assert_eq!(a.apply_manual_gain(), b.apply_manual_gain());
        }
    }

    #[test]
    fn passive_tick_scenario() {
        let mut h = seeded(snapshot(0, 0, &[("B", 3)], None), ManualClock::new(T0));
        assert_eq!(h.engine.state().stats().passive_rate, Decimal::new(6, 1));
        h.engine.apply_passive_tick(5.0);
        assert_eq!(h.engine.state().resource(), Decimal::new(30, 1));
        assert_eq!(h.engine.state().total_earned(), Decimal::new(30, 1));
    }

    #[test]
    fn passive_tick_noops_without_rate_or_time() {
        let mut h = fresh();
        let calls = Rc::new(RefCell::new(0));
        let c = calls.clone();
        h.engine.subscribe(move |_: &EconomyState| *c.borrow_mut() += 1);
        h.engine.apply_passive_tick(5.0);
        assert_eq!(*calls.borrow(), 0);

        let mut h = seeded(snapshot(0, 0, &[("B", 1)], None), ManualClock::new(T0));
        let c = calls.clone();
        h.engine.subscribe(move |_: &EconomyState| *c.borrow_mut() += 1);
        h.engine.apply_passive_tick(0.0);
        h.engine.apply_passive_tick(-1.0);
        h.engine.apply_passive_tick(f64::NAN);
        assert_eq!(*calls.borrow(), 0);
        assert!(!h.engine.save_pending());
        assert_eq!(h.engine.state().resource(), Decimal::ZERO);
    }

    #[test]
    fn unlock_threshold_is_inclusive() {
        let h = seeded(snapshot(100, 999, &[], None), ManualClock::new(T0));
        assert!(!h.engine.is_unlocked("C"));
        assert!(h.engine.can_afford("C"));
        let h = seeded(snapshot(100, 1000, &[], None), ManualClock::new(T0));
        assert!(h.engine.is_unlocked("C"));
        assert!(h.engine.is_unlocked("A"));
        assert!(!h.engine.is_unlocked("nope"));
    }

    #[test]
    fn refused_purchases_change_nothing() {
        let mut h = seeded(snapshot(9, 999, &[], None), ManualClock::new(T0));
        let calls = Rc::new(RefCell::new(0));
        let c = calls.clone();
        h.engine.subscribe(move |_: &EconomyState| *c.borrow_mut() += 1);
        let before = h.engine.state().clone();

        // Unaffordable.
        assert!(!h.engine.can_afford("A"));
        assert!(!h.engine.purchase("A"));
        // Affordable but locked.
        assert!(h.engine.can_afford("C"));
        assert!(!h.engine.purchase("C"));
        // Unknown.
        assert!(!h.engine.can_afford("ghost"));
        assert!(!h.engine.purchase("ghost"));

        assert_eq!(h.engine.state(), &before);
        assert_eq!(*calls.borrow(), 0);
        assert!(!h.engine.save_pending());
    }

    #[test]
    fn maxed_upgrade_cannot_be_bought() {
        let mut h = seeded(snapshot(100, 100, &[], None), ManualClock::new(T0));
        assert!(h.engine.purchase("A"));
        assert_eq!(h.engine.next_cost("A"), Some(Decimal::from(20)));
        assert!(h.engine.purchase("A"));
        assert!(h.engine.is_maxed("A"));
        assert_eq!(h.engine.next_cost("A"), None);
        assert!(!h.engine.can_afford("A"));
        assert!(!h.engine.purchase("A"));
        assert_eq!(h.engine.level("A"), 2);
        assert_eq!(h.engine.state().resource(), Decimal::from(70));
        assert_eq!(h.engine.state().total_earned(), Decimal::from(100));
    }

    #[test]
    fn observers_see_post_mutation_state_in_order() {
        let mut h = fresh();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s1 = seen.clone();
        h.engine
            .subscribe(move |st: &EconomyState| s1.borrow_mut().push(("first", st.resource())));
        let s2 = seen.clone();
        h.engine
            .subscribe(move |st: &EconomyState| s2.borrow_mut().push(("second", st.resource())));
        h.engine.apply_manual_gain();
        h.engine.toggle_sound();
        assert_eq!(
            *seen.borrow(),
            [
                ("first", Decimal::ONE),
                ("second", Decimal::ONE),
                ("first", Decimal::ONE),
                ("second", Decimal::ONE),
            ]
        );
    }

    #[test]
    fn rapid_gains_write_once_per_window() {
        let mut h = fresh();
        for _ in 0..3 {
            h.engine.apply_manual_gain();
            h.clock.advance_millis(300);
            assert!(!h.engine.poll_save());
        }
        assert_eq!(h.store.writes(), 0);
        assert_eq!(h.engine.next_save_due(), Some(T0 + 2_000));

        h.clock.set(T0 + 2_000);
        assert!(h.engine.poll_save());
        assert!(!h.engine.poll_save());
        h.clock.advance_millis(10_000);
        assert!(!h.engine.poll_save());
        assert_eq!(h.store.writes(), 1);
    }

    #[test]
    fn save_captures_state_at_fire_time() {
        let mut h = fresh();
        h.engine.apply_manual_gain();
        h.clock.advance_millis(1_000);
        h.engine.apply_manual_gain();
        h.engine.toggle_sound();
        h.clock.advance_millis(1_000);
        h.engine.poll_save();
        let saved = Snapshot::decode(&h.store.raw(persistence::DEFAULT_SAVE_KEY).unwrap()).unwrap();
        assert_eq!(saved.resource, Decimal::from(2));
        assert!(!saved.sound_enabled);
        assert_eq!(saved.saved_at_epoch_millis, Some(T0 + 2_000));
    }

    #[test]
    fn round_trip_with_frozen_clock() {
        let mut h = seeded(snapshot(40, 40, &[], None), ManualClock::new(T0));
        assert!(h.engine.purchase("A"));
        for _ in 0..3 {
            assert!(h.engine.purchase("B"));
        }
        h.engine.apply_manual_gain();
        for _ in 0..3 {
            h.engine.apply_passive_tick(1.0 / 60.0);
        }
        h.engine.toggle_sound();
        assert!(h.engine.flush_save());
        assert!(!h.engine.flush_save());

        let before = h.engine.state().clone();
        // Frame-time income carries more digits than an f64 can hold.
        assert!(before.resource().scale() > 15);
        let again = boot(h.store.clone(), h.clock.clone());
        let after = again.engine.state();
        assert_eq!(after.resource(), before.resource());
        assert_eq!(after.total_earned(), before.total_earned());
        assert_eq!(after.upgrade_levels(), before.upgrade_levels());
        assert_eq!(after.sound_enabled(), before.sound_enabled());
        assert_eq!(
            after.stats(),
            &econ::recalculate(again.engine.catalog(), after.upgrade_levels())
        );
        assert_eq!(after.pending_offline_gain(), None);
    }

    #[test]
    fn offline_gain_is_credited_once() {
        let clock = ManualClock::new(T0);
        let mut h = seeded(snapshot(1, 1, &[("B", 3)], Some(T0 - 10_000)), clock);
        let expected = Decimal::from(6);
        assert_eq!(h.engine.state().pending_offline_gain(), Some(expected));
        assert_eq!(h.engine.state().resource(), Decimal::from(7));
        assert_eq!(h.engine.state().total_earned(), Decimal::from(7));
        assert_eq!(h.engine.take_pending_offline_gain(), Some(expected));
        assert_eq!(h.engine.take_pending_offline_gain(), None);
    }

    #[test]
    fn offline_gain_is_capped_at_one_hour() {
        let h = seeded(
            snapshot(0, 0, &[("B", 3)], Some(T0 - 5 * 3_600_000)),
            ManualClock::new(T0),
        );
        assert_eq!(h.engine.state().pending_offline_gain(), Some(Decimal::from(2160)));
    }

    #[test]
    fn no_offline_gain_without_rate_or_elapsed_time() {
        let h = seeded(snapshot(5, 5, &[], Some(T0 - 60_000)), ManualClock::new(T0));
        assert_eq!(h.engine.state().pending_offline_gain(), None);
        assert_eq!(h.engine.state().resource(), Decimal::from(5));

        // Clock moved backwards since the save.
        let h = seeded(snapshot(5, 5, &[("B", 2)], Some(T0 + 60_000)), ManualClock::new(T0));
        assert_eq!(h.engine.state().pending_offline_gain(), None);
        assert_eq!(h.engine.state().resource(), Decimal::from(5));
    }

    #[test]
    fn corrupt_save_falls_back_to_defaults() {
        let store = MemoryStore::new();
        store.insert_raw(persistence::DEFAULT_SAVE_KEY, "{\"resource\": \"lots\"");
        let h = boot(store, ManualClock::new(T0));
        assert_eq!(h.engine.state(), &EconomyState::new(&catalog()));
    }

    #[test]
    fn write_failures_keep_state_and_next_window_retries() {
        let mut h = fresh();
        h.store.set_fail_writes(true);
        h.engine.apply_manual_gain();
        h.clock.advance_millis(2_000);
        assert!(h.engine.poll_save());
        assert!(!h.engine.save_pending());
        assert_eq!(h.engine.state().resource(), Decimal::ONE);
        assert_eq!(h.store.raw(persistence::DEFAULT_SAVE_KEY), None);

        h.store.set_fail_writes(false);
        h.engine.apply_manual_gain();
        h.clock.advance_millis(2_000);
        assert!(h.engine.poll_save());
        assert_eq!(h.store.writes(), 1);
    }

    #[test]
    fn reset_wipes_save_and_stops_writing() {
        let mut h = seeded(snapshot(50, 50, &[("A", 1)], Some(T0)), ManualClock::new(T0));
        h.engine.apply_manual_gain();
        assert!(h.engine.save_pending());
        h.engine.reset_save();
        assert!(!h.engine.save_pending());
        assert_eq!(h.store.raw(persistence::DEFAULT_SAVE_KEY), None);

        h.engine.apply_manual_gain();
        h.clock.advance_millis(5_000);
        assert!(!h.engine.poll_save());
        assert!(!h.engine.flush_save());
        assert_eq!(h.store.writes(), 0);

        let restarted = boot(h.store.clone(), h.clock.clone());
        assert_eq!(restarted.engine.state(), &EconomyState::new(&catalog()));
    }

    #[derive(Clone, Debug)]
    enum Op {
        Click,
        Tick(u8),
        Buy(&'static str),
        Sound,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Click),
            (0u8..20).prop_map(Op::Tick),
            prop::sample::select(vec!["A", "B", "C", "zzz"]).prop_map(Op::Buy),
            Just(Op::Sound),
        ]
    }

    proptest! {
        #[test]
        fn totals_never_decrease_and_balance_stays_non_negative(ops in proptest::collection::vec(op(), 0..60),
                                                               seed in any::<u64>()) {
            let mut h = fresh();
            h.engine = h.engine.with_rng(ChaCha8Rng::seed_from_u64(seed));
            let mut last_total = h.engine.state().total_earned();
            for op in ops {
                match op {
                    Op::Click => { h.engine.apply_manual_gain(); }
                    Op::Tick(s) => h.engine.apply_passive_tick(f64::from(s) / 4.0),
                    Op::Buy(id) => { h.engine.purchase(id); }
                    Op::Sound => { h.engine.toggle_sound(); }
                }
                let st = h.engine.state();
                prop_assert!(st.total_earned() >= last_total);
                prop_assert!(st.resource() >= Decimal::ZERO);
                for d in h.engine.catalog().iter() {
                    prop_assert!(st.level(d.id.as_str()) <= d.max_level());
                }
                prop_assert_eq!(st.stats(), &econ::recalculate(h.engine.catalog(), st.upgrade_levels()));
                last_total = st.total_earned();
            }
        }
    }
}
