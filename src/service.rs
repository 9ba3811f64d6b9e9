use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::db::Db;
use crate::domain::{
    Credit, CreditSource, ManualMovement, Merchant, MovementDirection, Receipt, commission_for,
    validate_hold_hours,
};
use crate::error::{CoreError, CoreResult};
use crate::ledger::{self, Movement};
use crate::matching::{ScoreBreakdown, find_best_match, select_candidates};
use crate::normalize::{names_match, tax_ids_match};

/// Outcome of receipt ingestion: either an automatic match or a receipt
/// left pending for manual reconciliation. Pending is not a failure.
#[derive(Debug)]
pub enum ReceiptOutcome {
    Matched {
        receipt: Receipt,
        credit: Credit,
        score: ScoreBreakdown,
    },
    Pending(Receipt),
}

/// Record an incoming bank transfer. Idempotent on the external id: a
/// repeat submission is rejected as a duplicate, never re-inserted.
pub fn ingest_credit(
    db: &Db,
    external_id: &str,
    amount: Decimal,
    payer_name: Option<String>,
    payer_tax_id: Option<String>,
    received_at: DateTime<Utc>,
    source: CreditSource,
    now: DateTime<Utc>,
) -> CoreResult<Credit> {
    let external_id = external_id.trim();
    if external_id.is_empty() {
        return Err(CoreError::Validation("external id must not be empty".into()));
    }
    if amount <= Decimal::ZERO {
        return Err(CoreError::Validation(format!(
            "credit amount must be positive, got {amount}"
        )));
    }

    if db.get_credit_by_external_id(external_id)?.is_some() {
        return Err(CoreError::Duplicate(format!(
            "credit with external id {external_id} already recorded"
        )));
    }

    let credit = Credit {
        id: Uuid::new_v4(),
        external_id: external_id.to_string(),
        amount,
        payer_name: none_if_blank(payer_name),
        payer_tax_id: none_if_blank(payer_tax_id),
        received_at,
        merchant_id: None,
        commission_pct: Decimal::ZERO,
        commission_amount: Decimal::ZERO,
        matched: false,
        receipt_id: None,
        source,
        created_at: now,
    };
    db.insert_credit(&credit)?;
    Ok(credit)
}

/// Record a reported payment and immediately try to reconcile it against
/// the unmatched credit pool.
#[allow(clippy::too_many_arguments)]
pub fn ingest_receipt(
    db: &mut Db,
    cfg: &AppConfig,
    declared_name: Option<String>,
    declared_tax_id: Option<String>,
    amount: Decimal,
    declared_at: DateTime<Utc>,
    merchant_hint: Option<Uuid>,
    now: DateTime<Utc>,
) -> CoreResult<ReceiptOutcome> {
    let declared_name = none_if_blank(declared_name);
    let declared_tax_id = none_if_blank(declared_tax_id);

    if declared_name.is_none() && declared_tax_id.is_none() {
        return Err(CoreError::Validation(
            "a receipt needs at least a sender name or a tax id".into(),
        ));
    }
    if amount <= Decimal::ZERO {
        return Err(CoreError::Validation(format!(
            "receipt amount must be positive, got {amount}"
        )));
    }

    let merchant = match merchant_hint {
        Some(id) => Some(require_merchant(db, id)?),
        None => None,
    };

    check_duplicate_receipt(
        db,
        cfg,
        declared_name.as_deref(),
        declared_tax_id.as_deref(),
        amount,
        declared_at,
        merchant_hint,
    )?;

    let receipt = Receipt {
        id: Uuid::new_v4(),
        declared_name,
        declared_tax_id,
        amount,
        declared_at,
        merchant_id: merchant_hint,
        credit_id: None,
        matched: false,
        expired: false,
        created_at: now,
    };
    db.insert_receipt(&receipt)?;

    // A match assigns the credit to a merchant; without one the receipt can
    // only wait for manual reconciliation.
    if let Some(merchant) = merchant {
        if let Some(outcome) = try_auto_match(db, cfg, &receipt, &merchant, now)? {
            return Ok(outcome);
        }
        // Pending receipts with a known merchant show up in its ledger as
        // informational zero-delta entries.
        ledger::append(db, &merchant, Movement::Receipt(&receipt), &cfg.release, now)?;
    }

    Ok(ReceiptOutcome::Pending(receipt))
}

fn try_auto_match(
    db: &mut Db,
    cfg: &AppConfig,
    receipt: &Receipt,
    merchant: &Merchant,
    now: DateTime<Utc>,
) -> CoreResult<Option<ReceiptOutcome>> {
    // The retrieval window is widened by the import skew so corrected
    // timestamps near the edge are not cut off before scoring.
    let slack = Duration::hours(
        cfg.matching.candidate_window_hours + cfg.matching.import_clock_skew_hours.abs(),
    );
    let pool = db.unmatched_credits_in_window(
        receipt.amount,
        receipt.declared_at - slack,
        receipt.declared_at + slack,
    )?;
    let candidates = select_candidates(pool, receipt.declared_at, &cfg.matching);

    let Some((credit, score)) = find_best_match(receipt, &candidates, &cfg.matching) else {
        return Ok(None);
    };
    let credit_id = credit.id;

    let commission = commission_for(credit.amount, merchant.commission_pct);
    let linked = db.link_match(
        credit_id,
        receipt.id,
        merchant.id,
        merchant.commission_pct,
        commission,
    )?;
    if !linked {
        // A concurrent attempt claimed the credit first; this receipt
        // stays pending rather than overwriting the link.
        return Ok(None);
    }

    let credit = db.get_credit(credit_id)?.ok_or(CoreError::NotFound {
        entity: "credit",
        id: credit_id,
    })?;
    let receipt = db.get_receipt(receipt.id)?.ok_or(CoreError::NotFound {
        entity: "receipt",
        id: receipt.id,
    })?;

    ledger::append(db, merchant, Movement::Credit(&credit), &cfg.release, now)?;

    Ok(Some(ReceiptOutcome::Matched {
        receipt,
        credit,
        score,
    }))
}

fn check_duplicate_receipt(
    db: &Db,
    cfg: &AppConfig,
    declared_name: Option<&str>,
    declared_tax_id: Option<&str>,
    amount: Decimal,
    declared_at: DateTime<Utc>,
    merchant_hint: Option<Uuid>,
) -> CoreResult<()> {
    let window = Duration::minutes(cfg.matching.duplicate_window_minutes);
    let nearby = db.receipts_in_window(amount, declared_at - window, declared_at + window)?;

    for existing in nearby {
        if existing.merchant_id != merchant_hint {
            continue;
        }
        let same_name = match (declared_name, existing.declared_name.as_deref()) {
            (None, None) => true,
            (Some(a), Some(b)) => names_match(a, b, cfg.matching.name_threshold),
            _ => false,
        };
        let same_tax_id = match (declared_tax_id, existing.declared_tax_id.as_deref()) {
            (None, None) => true,
            (Some(a), Some(b)) => tax_ids_match(a, b),
            _ => false,
        };
        if same_name && same_tax_id {
            return Err(CoreError::Duplicate(format!(
                "receipt {} already reports this payment",
                existing.id
            )));
        }
    }
    Ok(())
}

/// Operator-driven match. The merchant comes from the receipt's channel
/// or an explicit override; both records must still be unmatched.
pub fn manual_match(
    db: &mut Db,
    cfg: &AppConfig,
    receipt_id: Uuid,
    credit_id: Uuid,
    merchant_override: Option<Uuid>,
    now: DateTime<Utc>,
) -> CoreResult<(Credit, Receipt)> {
    let receipt = db.get_receipt(receipt_id)?.ok_or(CoreError::NotFound {
        entity: "receipt",
        id: receipt_id,
    })?;
    let credit = db.get_credit(credit_id)?.ok_or(CoreError::NotFound {
        entity: "credit",
        id: credit_id,
    })?;

    if receipt.matched {
        return Err(CoreError::Conflict(format!(
            "receipt {receipt_id} is already matched"
        )));
    }
    if receipt.expired {
        return Err(CoreError::Conflict(format!(
            "receipt {receipt_id} is expired"
        )));
    }
    if credit.matched {
        return Err(CoreError::Conflict(format!(
            "credit {credit_id} is already matched"
        )));
    }

    let merchant_id = merchant_override.or(receipt.merchant_id).ok_or_else(|| {
        CoreError::Validation(
            "receipt carries no merchant; pass one explicitly to match it".into(),
        )
    })?;
    let merchant = require_merchant(db, merchant_id)?;

    let commission = commission_for(credit.amount, merchant.commission_pct);
    let linked = db.link_match(
        credit_id,
        receipt_id,
        merchant.id,
        merchant.commission_pct,
        commission,
    )?;
    if !linked {
        return Err(CoreError::Conflict(
            "credit or receipt was matched concurrently".into(),
        ));
    }

    // The receipt may already sit in a ledger as a pending entry; rebuild
    // folds the new state cleanly. When an override moved the receipt to a
    // different merchant, the original hint's ledger needs the same.
    ledger::rebuild(db, &merchant, &cfg.release, now)?;
    if let Some(hint_id) = receipt.merchant_id {
        if hint_id != merchant.id {
            let hint = require_merchant(db, hint_id)?;
            ledger::rebuild(db, &hint, &cfg.release, now)?;
        }
    }

    let credit = db.get_credit(credit_id)?.ok_or(CoreError::NotFound {
        entity: "credit",
        id: credit_id,
    })?;
    let receipt = db.get_receipt(receipt_id)?.ok_or(CoreError::NotFound {
        entity: "receipt",
        id: receipt_id,
    })?;
    Ok((credit, receipt))
}

/// Sever a match, returning both records to the unmatched pool and
/// rebuilding the affected merchant's ledger.
pub fn manual_unmatch(
    db: &mut Db,
    cfg: &AppConfig,
    credit_id: Uuid,
    now: DateTime<Utc>,
) -> CoreResult<Uuid> {
    let credit = db.get_credit(credit_id)?.ok_or(CoreError::NotFound {
        entity: "credit",
        id: credit_id,
    })?;
    if !credit.matched {
        return Err(CoreError::Conflict(format!(
            "credit {credit_id} is not matched"
        )));
    }

    let Some((_receipt_id, merchant_id)) = db.unlink_match(credit_id)? else {
        return Err(CoreError::Conflict(format!(
            "credit {credit_id} was unmatched concurrently"
        )));
    };

    let merchant = require_merchant(db, merchant_id)?;
    ledger::rebuild(db, &merchant, &cfg.release, now)?;
    Ok(merchant_id)
}

// ---- merchants ----

pub fn create_merchant(
    db: &Db,
    name: &str,
    tax_id: Option<String>,
    commission_pct: Decimal,
    hold_hours: u32,
    now: DateTime<Utc>,
) -> CoreResult<Merchant> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CoreError::Validation("merchant name must not be empty".into()));
    }
    validate_commission(commission_pct)?;
    if !validate_hold_hours(hold_hours) {
        return Err(CoreError::Validation(format!(
            "hold hours must be one of 24/48/72/96, got {hold_hours}"
        )));
    }

    let merchant = Merchant {
        id: Uuid::new_v4(),
        name: name.to_string(),
        tax_id: none_if_blank(tax_id),
        commission_pct,
        hold_hours,
        active: true,
        created_at: now,
    };
    db.insert_merchant(&merchant)?;
    Ok(merchant)
}

pub fn update_merchant(
    db: &Db,
    id: Uuid,
    commission_pct: Option<Decimal>,
    hold_hours: Option<u32>,
) -> CoreResult<Merchant> {
    if let Some(pct) = commission_pct {
        validate_commission(pct)?;
    }
    if let Some(hours) = hold_hours {
        if !validate_hold_hours(hours) {
            return Err(CoreError::Validation(format!(
                "hold hours must be one of 24/48/72/96, got {hours}"
            )));
        }
    }

    let changed = db.update_merchant_terms(id, commission_pct, hold_hours)?;
    if changed == 0 {
        return Err(CoreError::NotFound {
            entity: "merchant",
            id,
        });
    }
    require_merchant(db, id)
}

/// Soft delete; the merchant's history stays queryable.
pub fn deactivate_merchant(db: &Db, id: Uuid) -> CoreResult<()> {
    let changed = db.set_merchant_active(id, false)?;
    if changed == 0 {
        return Err(CoreError::NotFound {
            entity: "merchant",
            id,
        });
    }
    Ok(())
}

// ---- manual movements ----

#[allow(clippy::too_many_arguments)]
pub fn create_movement(
    db: &mut Db,
    cfg: &AppConfig,
    merchant_id: Uuid,
    direction: MovementDirection,
    deposito: bool,
    amount: Decimal,
    concept: Option<String>,
    effective_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> CoreResult<ManualMovement> {
    if amount <= Decimal::ZERO {
        return Err(CoreError::Validation(format!(
            "movement amount must be positive, got {amount}"
        )));
    }
    if deposito && direction == MovementDirection::Egreso {
        return Err(CoreError::Validation(
            "deposito applies to inflows only".into(),
        ));
    }
    let merchant = require_merchant(db, merchant_id)?;

    // Commission only applies to deposito inflows; they behave like bank
    // credits under the merchant's terms.
    let (pct, commission) = if deposito {
        (
            merchant.commission_pct,
            commission_for(amount, merchant.commission_pct),
        )
    } else {
        (Decimal::ZERO, Decimal::ZERO)
    };

    let movement = ManualMovement {
        id: Uuid::new_v4(),
        merchant_id,
        direction,
        deposito,
        amount,
        commission_pct: pct,
        commission_amount: commission,
        concept: none_if_blank(concept),
        effective_at,
        created_at: now,
    };
    db.insert_movement(&movement)?;
    ledger::append(db, &merchant, Movement::Manual(&movement), &cfg.release, now)?;
    Ok(movement)
}

/// Amounts are immutable; corrections are delete + recreate. Deletion
/// rebuilds the merchant's ledger so the cache never drifts silently.
pub fn delete_movement(
    db: &mut Db,
    cfg: &AppConfig,
    movement_id: Uuid,
    now: DateTime<Utc>,
) -> CoreResult<Uuid> {
    let movement = db.get_movement(movement_id)?.ok_or(CoreError::NotFound {
        entity: "movement",
        id: movement_id,
    })?;
    let merchant = require_merchant(db, movement.merchant_id)?;

    db.delete_movement(movement_id)?;
    ledger::rebuild(db, &merchant, &cfg.release, now)?;
    Ok(merchant.id)
}

// ---- receipt expiry ----

/// Apply the configured (or overridden) pending-receipt expiry policy.
/// Refuses to run when no policy exists; there is no hidden default age.
pub fn expire_receipts(
    db: &Db,
    cfg: &AppConfig,
    days_override: Option<u32>,
    now: DateTime<Utc>,
) -> CoreResult<usize> {
    let Some(days) = days_override.or(cfg.receipt_expiry_days) else {
        return Err(CoreError::Validation(
            "no receipt expiry policy configured; pass --days or set receipt_expiry_days".into(),
        ));
    };
    let cutoff = now - Duration::days(i64::from(days));
    Ok(db.expire_receipts_before(cutoff)?)
}

// ---- helpers ----

fn require_merchant(db: &Db, id: Uuid) -> CoreResult<Merchant> {
    db.get_merchant(id)?.ok_or(CoreError::NotFound {
        entity: "merchant",
        id,
    })
}

fn validate_commission(pct: Decimal) -> CoreResult<()> {
    if pct < Decimal::ZERO || pct > Decimal::from(100u32) {
        return Err(CoreError::Validation(format!(
            "commission must be between 0 and 100, got {pct}"
        )));
    }
    Ok(())
}

fn none_if_blank(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
