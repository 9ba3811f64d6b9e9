use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a bank credit entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditSource {
    /// Live bank notification.
    Webhook,
    /// Batch-imported history. Timestamps from this source carry a known
    /// clock skew; the matcher corrects for it (see config).
    Import,
}

impl CreditSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditSource::Webhook => "webhook",
            CreditSource::Import => "import",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "webhook" => Some(CreditSource::Webhook),
            "import" => Some(CreditSource::Import),
            _ => None,
        }
    }
}

/// A bank-reported incoming transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credit {
    pub id: Uuid,
    /// Bank-assigned transaction id; ingestion is idempotent on it.
    pub external_id: String,
    pub amount: Decimal,
    pub payer_name: Option<String>,
    pub payer_tax_id: Option<String>,
    pub received_at: DateTime<Utc>,
    /// Unset until the credit is matched to a receipt.
    pub merchant_id: Option<Uuid>,
    pub commission_pct: Decimal,
    pub commission_amount: Decimal,
    pub matched: bool,
    pub receipt_id: Option<Uuid>,
    pub source: CreditSource,
    pub created_at: DateTime<Utc>,
}

/// A manually reported payment claim, to be matched against a credit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub id: Uuid,
    pub declared_name: Option<String>,
    pub declared_tax_id: Option<String>,
    pub amount: Decimal,
    pub declared_at: DateTime<Utc>,
    pub merchant_id: Option<Uuid>,
    pub credit_id: Option<Uuid>,
    pub matched: bool,
    pub expired: bool,
    pub created_at: DateTime<Utc>,
}

/// A tenant whose funds are tracked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Merchant {
    pub id: Uuid,
    pub name: String,
    pub tax_id: Option<String>,
    /// Default commission applied to credits matched for this merchant.
    pub commission_pct: Decimal,
    /// Funds-release hold in hours; one of ALLOWED_HOLD_HOURS.
    pub hold_hours: u32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

pub const ALLOWED_HOLD_HOURS: &[u32] = &[24, 48, 72, 96];

pub fn validate_hold_hours(hours: u32) -> bool {
    ALLOWED_HOLD_HOURS.contains(&hours)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementDirection {
    /// Outflow; reduces the balance immediately, no hold applies.
    Egreso,
    /// Inflow.
    Credito,
}

impl MovementDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementDirection::Egreso => "egreso",
            MovementDirection::Credito => "credito",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "egreso" => Some(MovementDirection::Egreso),
            "credito" => Some(MovementDirection::Credito),
            _ => None,
        }
    }
}

/// An operator- or import-entered movement outside the matching pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualMovement {
    pub id: Uuid,
    pub merchant_id: Uuid,
    pub direction: MovementDirection,
    /// "deposito" inflows follow the release schedule like bank credits;
    /// any other inflow is available immediately. Meaningless for egresos.
    pub deposito: bool,
    pub amount: Decimal,
    pub commission_pct: Decimal,
    pub commission_amount: Decimal,
    pub concept: Option<String>,
    pub effective_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ManualMovement {
    /// Only deposito-kind inflows are subject to the hold period.
    pub fn is_held_deposit(&self) -> bool {
        self.direction == MovementDirection::Credito && self.deposito
    }
}

/// Kind of source row behind a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Credit,
    Receipt,
    ManualInflow,
    ManualOutflow,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Credit => "credit",
            EntryKind::Receipt => "receipt",
            EntryKind::ManualInflow => "manual_inflow",
            EntryKind::ManualOutflow => "manual_outflow",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "credit" => Some(EntryKind::Credit),
            "receipt" => Some(EntryKind::Receipt),
            "manual_inflow" => Some(EntryKind::ManualInflow),
            "manual_outflow" => Some(EntryKind::ManualOutflow),
            _ => None,
        }
    }

    pub fn source_table(&self) -> &'static str {
        match self {
            EntryKind::Credit => "credits",
            EntryKind::Receipt => "receipts",
            EntryKind::ManualInflow | EntryKind::ManualOutflow => "movements",
        }
    }
}

/// One materialized running-balance row. Derived cache over the raw
/// movement tables; always rebuildable, never the source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub merchant_id: Uuid,
    pub kind: EntryKind,
    pub source_id: Uuid,
    pub gross: Decimal,
    pub commission: Decimal,
    pub net: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub released: bool,
    pub release_at: Option<DateTime<Utc>>,
    pub effective_at: DateTime<Utc>,
    /// Origin-specific fields (payer data, declared data, concept).
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Signed contribution to the running balance: +net for inflows,
    /// -gross for outflows, 0 for unmatched receipts.
    pub fn signed_delta(&self) -> Decimal {
        match self.kind {
            EntryKind::Credit | EntryKind::ManualInflow => self.net,
            EntryKind::ManualOutflow => -self.gross,
            EntryKind::Receipt => Decimal::ZERO,
        }
    }
}

/// Commission for a gross amount at a percentage rate, rounded to cents.
pub fn commission_for(amount: Decimal, pct: Decimal) -> Decimal {
    (amount * pct / Decimal::from(100u32)).round_dp(2)
}
