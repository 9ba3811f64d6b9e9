use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::config::ReleaseConfig;
use crate::domain::{Credit, ManualMovement, MovementDirection};
use crate::release::{is_released, release_at};

/// Merchant-scoped totals derived from raw movements. Commissions on
/// released funds are reported alongside the headline figure, never
/// silently netted out of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceSummary {
    /// Withdrawable now: released credits + released deposito inflows,
    /// gross, minus outflows, plus immediately-available inflows.
    pub available: Decimal,
    pub released_gross: Decimal,
    pub released_commissions: Decimal,
    pub pending_gross: Decimal,
    /// Still in transit, after commission.
    pub pending_net: Decimal,
}

/// Release status of one deposito-kind inflow, for support diagnostics.
#[derive(Debug, Clone)]
pub struct DepositStatus {
    pub movement_id: Uuid,
    pub amount: Decimal,
    pub release_at: DateTime<Utc>,
    pub released: bool,
}

pub fn pending_gross(
    credits: &[Credit],
    hold_hours: u32,
    cfg: &ReleaseConfig,
    as_of: DateTime<Utc>,
) -> Decimal {
    credits
        .iter()
        .filter(|c| !is_released(c.received_at, hold_hours, cfg, as_of))
        .map(|c| c.amount)
        .sum()
}

pub fn released_gross(
    credits: &[Credit],
    hold_hours: u32,
    cfg: &ReleaseConfig,
    as_of: DateTime<Utc>,
) -> Decimal {
    credits
        .iter()
        .filter(|c| is_released(c.received_at, hold_hours, cfg, as_of))
        .map(|c| c.amount)
        .sum()
}

/// Unreleased credits and unreleased deposito inflows, net of commission.
pub fn pending_net(
    credits: &[Credit],
    movements: &[ManualMovement],
    hold_hours: u32,
    cfg: &ReleaseConfig,
    as_of: DateTime<Utc>,
) -> Decimal {
    let mut total = Decimal::ZERO;
    for c in credits {
        if !is_released(c.received_at, hold_hours, cfg, as_of) {
            total += c.amount - c.commission_amount;
        }
    }
    for m in movements {
        if m.is_held_deposit() && !is_released(m.effective_at, hold_hours, cfg, as_of) {
            total += m.amount - m.commission_amount;
        }
    }
    total
}

pub fn summarize(
    credits: &[Credit],
    movements: &[ManualMovement],
    hold_hours: u32,
    cfg: &ReleaseConfig,
    as_of: DateTime<Utc>,
) -> BalanceSummary {
    let mut available = Decimal::ZERO;
    let mut released = Decimal::ZERO;
    let mut released_commissions = Decimal::ZERO;
    let mut pending = Decimal::ZERO;
    let mut pending_after_commission = Decimal::ZERO;

    for c in credits {
        if is_released(c.received_at, hold_hours, cfg, as_of) {
            released += c.amount;
            released_commissions += c.commission_amount;
        } else {
            pending += c.amount;
            pending_after_commission += c.amount - c.commission_amount;
        }
    }

    for m in movements {
        match m.direction {
            MovementDirection::Egreso => available -= m.amount,
            MovementDirection::Credito => {
                if !m.deposito {
                    available += m.amount;
                } else if is_released(m.effective_at, hold_hours, cfg, as_of) {
                    released += m.amount;
                    released_commissions += m.commission_amount;
                } else {
                    pending += m.amount;
                    pending_after_commission += m.amount - m.commission_amount;
                }
            }
        }
    }

    available += released;

    BalanceSummary {
        available,
        released_gross: released,
        released_commissions,
        pending_gross: pending,
        pending_net: pending_after_commission,
    }
}

pub fn deposit_release_detail(
    movements: &[ManualMovement],
    hold_hours: u32,
    cfg: &ReleaseConfig,
    as_of: DateTime<Utc>,
) -> Vec<DepositStatus> {
    movements
        .iter()
        .filter(|m| m.is_held_deposit())
        .map(|m| {
            let at = release_at(m.effective_at, hold_hours, cfg);
            DepositStatus {
                movement_id: m.id,
                amount: m.amount,
                release_at: at,
                released: as_of >= at,
            }
        })
        .collect()
}
