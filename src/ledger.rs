use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::config::ReleaseConfig;
use crate::db::{Db, LedgerQuery};
use crate::domain::{Credit, EntryKind, LedgerEntry, ManualMovement, Merchant, MovementDirection, Receipt};
use crate::release::release_at;

/// A raw movement about to be materialized into the ledger.
pub enum Movement<'a> {
    Credit(&'a Credit),
    Receipt(&'a Receipt),
    Manual(&'a ManualMovement),
}

impl Movement<'_> {
    fn effective_at(&self) -> DateTime<Utc> {
        match self {
            Movement::Credit(c) => c.received_at,
            Movement::Receipt(r) => r.declared_at,
            Movement::Manual(m) => m.effective_at,
        }
    }
}

/// Result of a consistency check: entry count in the cache versus the live
/// movement tables. A mismatch signals drift; correction is an explicit
/// rebuild, never automatic.
#[derive(Debug, Clone, Copy)]
pub struct ConsistencyReport {
    pub ledger_count: u64,
    pub live_count: u64,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.ledger_count == self.live_count
    }
}

/// Entry for one movement, balances unset. Ids and created_at are taken
/// from the source row so rebuilds are reproducible.
fn proto_entry(
    merchant: &Merchant,
    movement: &Movement<'_>,
    cfg: &ReleaseConfig,
    now: DateTime<Utc>,
) -> LedgerEntry {
    let (kind, source_id, gross, commission, effective, created, released, release, metadata) =
        match movement {
            Movement::Credit(c) => {
                let release = release_at(c.received_at, merchant.hold_hours, cfg);
                (
                    EntryKind::Credit,
                    c.id,
                    c.amount,
                    c.commission_amount,
                    c.received_at,
                    c.created_at,
                    now >= release,
                    Some(release),
                    serde_json::json!({
                        "external_id": c.external_id,
                        "payer_name": c.payer_name,
                        "payer_tax_id": c.payer_tax_id,
                        "source": c.source.as_str(),
                    }),
                )
            }
            Movement::Receipt(r) => (
                EntryKind::Receipt,
                r.id,
                r.amount,
                Decimal::ZERO,
                r.declared_at,
                r.created_at,
                false,
                None,
                serde_json::json!({
                    "declared_name": r.declared_name,
                    "declared_tax_id": r.declared_tax_id,
                }),
            ),
            Movement::Manual(m) => {
                let kind = match m.direction {
                    MovementDirection::Credito => EntryKind::ManualInflow,
                    MovementDirection::Egreso => EntryKind::ManualOutflow,
                };
                // Only deposito inflows follow the hold schedule; everything
                // else releases at its own moment.
                let (released, release) = if m.is_held_deposit() {
                    let at = release_at(m.effective_at, merchant.hold_hours, cfg);
                    (now >= at, Some(at))
                } else {
                    (true, Some(m.effective_at))
                };
                (
                    kind,
                    m.id,
                    m.amount,
                    m.commission_amount,
                    m.effective_at,
                    m.created_at,
                    released,
                    release,
                    serde_json::json!({
                        "concept": m.concept,
                        "deposito": m.deposito,
                    }),
                )
            }
        };

    let net = match kind {
        EntryKind::Receipt => Decimal::ZERO,
        EntryKind::ManualOutflow => gross,
        _ => gross - commission,
    };

    LedgerEntry {
        id: source_id,
        merchant_id: merchant.id,
        kind,
        source_id,
        gross,
        commission,
        net,
        balance_before: Decimal::ZERO,
        balance_after: Decimal::ZERO,
        released,
        release_at: release,
        effective_at: effective,
        metadata,
        created_at: created,
    }
}

/// Fold a merchant's full movement set into ordered entries with running
/// balances.
fn compose_entries(
    merchant: &Merchant,
    credits: &[Credit],
    receipts: &[Receipt],
    movements: &[ManualMovement],
    cfg: &ReleaseConfig,
    now: DateTime<Utc>,
) -> Vec<LedgerEntry> {
    let mut entries: Vec<LedgerEntry> = credits
        .iter()
        .map(|c| proto_entry(merchant, &Movement::Credit(c), cfg, now))
        .chain(
            receipts
                .iter()
                .map(|r| proto_entry(merchant, &Movement::Receipt(r), cfg, now)),
        )
        .chain(
            movements
                .iter()
                .map(|m| proto_entry(merchant, &Movement::Manual(m), cfg, now)),
        )
        .collect();

    entries.sort_by(|a, b| {
        a.effective_at
            .cmp(&b.effective_at)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.source_id.cmp(&b.source_id))
    });

    let mut balance = Decimal::ZERO;
    for e in &mut entries {
        e.balance_before = balance;
        balance += e.signed_delta();
        e.balance_after = balance;
    }
    entries
}

/// Discard and recompute a merchant's ledger from the raw movement tables.
/// The delete+insert runs in one transaction.
pub fn rebuild(db: &mut Db, merchant: &Merchant, cfg: &ReleaseConfig, now: DateTime<Utc>) -> Result<usize> {
    let credits = db.credits_for_merchant(merchant.id)?;
    let receipts = db.pending_receipts_for_merchant(merchant.id)?;
    let movements = db.movements_for_merchant(merchant.id)?;

    let entries = compose_entries(merchant, &credits, &receipts, &movements, cfg, now);
    db.replace_ledger(merchant.id, &entries)?;
    Ok(entries.len())
}

/// Append one new movement on top of the merchant's latest entry. A
/// movement dated at or before the ledger tail could land elsewhere in
/// the rebuild ordering, so those cases fall back to a full rebuild;
/// either way the resulting ledger equals what a rebuild would produce.
pub fn append(
    db: &mut Db,
    merchant: &Merchant,
    movement: Movement<'_>,
    cfg: &ReleaseConfig,
    now: DateTime<Utc>,
) -> Result<()> {
    let latest = db.latest_ledger_entry(merchant.id)?;

    if let Some(tail) = &latest {
        if movement.effective_at() <= tail.effective_at {
            rebuild(db, merchant, cfg, now)?;
            return Ok(());
        }
    }

    let balance_before = latest.map(|e| e.balance_after).unwrap_or(Decimal::ZERO);
    let mut entry = proto_entry(merchant, &movement, cfg, now);
    entry.balance_before = balance_before;
    entry.balance_after = balance_before + entry.signed_delta();
    db.append_ledger_entry(&entry)?;
    Ok(())
}

/// Running balance from the cache: the latest entry at or before `as_of`
/// (or the tail when unset), zero for an empty ledger.
pub fn current_balance(
    db: &Db,
    merchant_id: Uuid,
    as_of: Option<DateTime<Utc>>,
) -> Result<Decimal> {
    let entry = match as_of {
        Some(t) => db.latest_ledger_entry_as_of(merchant_id, t)?,
        None => db.latest_ledger_entry(merchant_id)?,
    };
    Ok(entry.map(|e| e.balance_after).unwrap_or(Decimal::ZERO))
}

pub fn list_entries(db: &Db, merchant_id: Uuid, query: &LedgerQuery) -> Result<Vec<LedgerEntry>> {
    db.list_ledger_entries(merchant_id, query)
}

pub fn verify_consistency(db: &Db, merchant_id: Uuid) -> Result<ConsistencyReport> {
    Ok(ConsistencyReport {
        ledger_count: db.ledger_entry_count(merchant_id)?,
        live_count: db.live_movement_count(merchant_id)?,
    })
}
