//! Purchase policy for unattended runs.

use balance::UpgradeId;
use engine::EconomyEngine;
use rust_decimal::Decimal;

/// Cheapest upgrade that is unlocked and affordable right now. Ties go to
/// the earlier catalog entry.
pub fn next_purchase(engine: &EconomyEngine) -> Option<UpgradeId> {
    let mut best: Option<(Decimal, &UpgradeId)> = None;
    for def in engine.catalog().iter() {
        let id = def.id.as_str();
        if !engine.is_unlocked(id) || !engine.can_afford(id) {
            continue;
        }
        let Some(cost) = engine.next_cost(id) else {
            continue;
        };
        if best.map_or(true, |(c, _)| cost < c) {
            best = Some((cost, &def.id));
        }
    }
    best.map(|(_, id)| id.clone())
}
