use bevy::prelude::{Res, ResMut, Resource};
use tracing::debug;

use crate::catalog::EffectTemplate;
use crate::resources::EngineClock;

/// Fraction of an effect's admission cost returned when it expires or is
/// forcibly removed. Permanent mutations therefore act as a one-way sink.
pub const REMOVAL_REFUND_RATIO: f32 = 0.5;

/// Regenerating resource that gates how many mutations may be live at once.
///
/// `available` stays within `[0, max]`; `max` only ever grows (rebirth).
#[derive(Resource, Debug, Clone, PartialEq)]
pub struct BudgetLedger {
    available: f32,
    max: f32,
    regen_per_minute: f32,
}

impl BudgetLedger {
    pub fn new(available: f32, max: f32, regen_per_minute: f32) -> Self {
        let max = max.max(0.0);
        Self {
            available: available.clamp(0.0, max),
            max,
            regen_per_minute: regen_per_minute.max(0.0),
        }
    }

    pub fn available(&self) -> f32 {
        self.available
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    pub fn regen_per_minute(&self) -> f32 {
        self.regen_per_minute
    }

    pub fn regenerate(&mut self, delta_secs: f32) {
        let amount = self.regen_per_minute * delta_secs.max(0.0) / 60.0;
        self.available = (self.available + amount).min(self.max);
    }

    /// Deducts `cost` iff it is fully covered; otherwise leaves the ledger
    /// untouched and returns `false`.
    pub fn try_debit(&mut self, cost: f32) -> bool {
        if cost < 0.0 || self.available < cost {
            return false;
        }
        self.available -= cost;
        true
    }

    pub fn credit(&mut self, amount: f32) {
        self.available = (self.available + amount.max(0.0)).min(self.max);
    }

    /// Raises the ceiling and refills to it. Used on rebirth as a full-refill
    /// reward.
    pub fn increase_max(&mut self, amount: f32) {
        self.max += amount.max(0.0);
        self.available = self.max;
    }
}

/// Admission cost of an effect built from `template`.
///
/// Base cost scales with order and intensity; permanent mutations are taxed
/// at 1.5x because they never refund through natural expiry, while finite
/// mutations pay a surcharge proportional to their duration in hours.
pub fn effect_cost(template: &EffectTemplate) -> f32 {
    let base = f32::from(u8::from(template.order)) * 10.0 * template.intensity;
    if template.duration_secs <= 0.0 {
        base * 1.5
    } else {
        base * (1.0 + template.duration_secs / 3600.0 / 10.0)
    }
}

pub fn regenerate_budget(clock: Res<EngineClock>, mut ledger: ResMut<BudgetLedger>) {
    let before = ledger.available();
    ledger.regenerate(clock.delta);
    if ledger.available() > before {
        debug!(
            target: "metamorph::budget",
            available = ledger.available(),
            max = ledger.max(),
            "budget.regenerated"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Category, Order};

    fn template(order: Order, intensity: f32, duration_secs: f32) -> EffectTemplate {
        EffectTemplate {
            id: "test_effect".into(),
            name: "Test Effect".into(),
            description: String::new(),
            order,
            category: Category::Visual,
            duration_secs,
            intensity,
            affected_tags: Vec::new(),
            region: None,
            object_changes: Default::default(),
            world_changes: Default::default(),
            visual_effects: Vec::new(),
            sound_effects: Vec::new(),
            related_symbols: Vec::new(),
        }
    }

    #[test]
    fn regeneration_clamps_at_max() {
        // 120 simulated seconds at 0.5/min while already full: no change.
        let mut ledger = BudgetLedger::new(100.0, 100.0, 0.5);
        ledger.regenerate(120.0);
        assert_eq!(ledger.available(), 100.0);
    }

    #[test]
    fn regeneration_accrues_per_minute() {
        let mut ledger = BudgetLedger::new(10.0, 100.0, 0.5);
        ledger.regenerate(120.0);
        assert!((ledger.available() - 11.0).abs() < 1e-5);
    }

    #[test]
    fn permanent_order_two_effect_costs_eighteen() {
        let cost = effect_cost(&template(Order::Structural, 0.6, 0.0));
        assert!((cost - 18.0).abs() < 1e-5);

        let mut ledger = BudgetLedger::new(100.0, 100.0, 0.5);
        assert!(ledger.try_debit(cost));
        assert!((ledger.available() - 82.0).abs() < 1e-5);
    }

    #[test]
    fn removal_refunds_half_the_cost() {
        let cost = effect_cost(&template(Order::Structural, 0.6, 0.0));
        let mut ledger = BudgetLedger::new(100.0, 100.0, 0.5);
        assert!(ledger.try_debit(cost));
        ledger.credit(cost * REMOVAL_REFUND_RATIO);
        assert!((ledger.available() - 91.0).abs() < 1e-5);
    }

    #[test]
    fn debit_fails_without_touching_balance() {
        let mut ledger = BudgetLedger::new(10.0, 100.0, 0.5);
        assert!(!ledger.try_debit(10.5));
        assert_eq!(ledger.available(), 10.0);
    }

    #[test]
    fn cost_is_strictly_increasing_in_intensity() {
        let mut previous = 0.0;
        for step in 1..=10 {
            let intensity = step as f32 / 10.0;
            let cost = effect_cost(&template(Order::Functional, intensity, 600.0));
            assert!(cost > previous);
            previous = cost;
        }
    }

    #[test]
    fn permanent_costs_more_than_short_finite() {
        // Below five duration-hours the finite surcharge stays under the
        // 1.5x permanence tax.
        let permanent = effect_cost(&template(Order::Functional, 0.8, 0.0));
        for hours in [0.5_f32, 1.0, 2.0, 4.0, 4.9] {
            let finite = effect_cost(&template(Order::Functional, 0.8, hours * 3600.0));
            assert!(permanent > finite, "permanent {permanent} <= finite {finite}");
        }
    }

    #[test]
    fn rebirth_refills_to_new_max() {
        let mut ledger = BudgetLedger::new(12.0, 100.0, 0.5);
        ledger.increase_max(25.0);
        assert_eq!(ledger.max(), 125.0);
        assert_eq!(ledger.available(), 125.0);
    }

    #[test]
    fn balance_never_leaves_bounds() {
        let mut ledger = BudgetLedger::new(50.0, 100.0, 2.0);
        let ops: [(u8, f32); 8] = [
            (0, 30.0),
            (1, 45.0),
            (2, 500.0),
            (1, 20.0),
            (0, 90.0),
            (2, 1.0),
            (1, 9.5),
            (0, 55.0),
        ];
        for (kind, value) in ops {
            match kind {
                0 => {
                    ledger.try_debit(value);
                }
                1 => ledger.credit(value),
                _ => ledger.regenerate(value),
            }
            assert!(ledger.available() >= 0.0);
            assert!(ledger.available() <= ledger.max());
        }
    }
}
