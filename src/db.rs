use crate::config::AppPaths;
use crate::domain::{
    Credit, CreditSource, EntryKind, LedgerEntry, ManualMovement, Merchant, MovementDirection,
    Receipt,
};
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use rust_decimal::Decimal;
use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

/// Whitelisted sort fields for ledger listings. Mapped to fixed column
/// expressions; user input never reaches the SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerSortField {
    EffectiveAt,
    Amount,
}

impl LedgerSortField {
    fn column(&self) -> &'static str {
        match self {
            LedgerSortField::EffectiveAt => "effective_at",
            LedgerSortField::Amount => "CAST(gross AS REAL)",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LedgerQuery {
    /// 1-based.
    pub page: u32,
    pub page_size: u32,
    pub sort_by: LedgerSortField,
    pub descending: bool,
    pub kind: Option<EntryKind>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl Default for LedgerQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 50,
            sort_by: LedgerSortField::EffectiveAt,
            descending: false,
            kind: None,
            from: None,
            to: None,
        }
    }
}

/// Canonical storage encoding for amounts: trailing zeros stripped so
/// string equality in SQL agrees with decimal equality.
pub fn dec_str(d: Decimal) -> String {
    d.normalize().to_string()
}

pub struct Db {
    conn: Connection,
}

impl Db {
    pub fn open(paths: &AppPaths) -> Result<(Self, PathBuf)> {
        fs::create_dir_all(&paths.data_dir)
            .with_context(|| format!("Failed to create data dir {}", paths.data_dir.display()))?;

        let db_path = paths.data_dir.join("concilia.sqlite3");
        let conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open DB {}", db_path.display()))?;

        let db = Self { conn };
        db.migrate()?;
        Ok((db, db_path))
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS merchants (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                tax_id TEXT,
                commission_pct TEXT NOT NULL,
                hold_hours INTEGER NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS credits (
                id TEXT PRIMARY KEY,
                external_id TEXT NOT NULL UNIQUE,
                amount TEXT NOT NULL,
                payer_name TEXT,
                payer_tax_id TEXT,
                received_at TEXT NOT NULL,
                merchant_id TEXT,
                commission_pct TEXT NOT NULL DEFAULT '0',
                commission_amount TEXT NOT NULL DEFAULT '0',
                matched INTEGER NOT NULL DEFAULT 0,
                receipt_id TEXT,
                source TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_credits_match_pool ON credits(matched, amount, received_at);
            CREATE INDEX IF NOT EXISTS idx_credits_merchant ON credits(merchant_id);

            CREATE TABLE IF NOT EXISTS receipts (
                id TEXT PRIMARY KEY,
                declared_name TEXT,
                declared_tax_id TEXT,
                amount TEXT NOT NULL,
                declared_at TEXT NOT NULL,
                merchant_id TEXT,
                credit_id TEXT,
                matched INTEGER NOT NULL DEFAULT 0,
                expired INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_receipts_merchant ON receipts(merchant_id);
            CREATE INDEX IF NOT EXISTS idx_receipts_window ON receipts(amount, declared_at);

            CREATE TABLE IF NOT EXISTS movements (
                id TEXT PRIMARY KEY,
                merchant_id TEXT NOT NULL,
                direction TEXT NOT NULL,
                deposito INTEGER NOT NULL DEFAULT 0,
                amount TEXT NOT NULL,
                commission_pct TEXT NOT NULL DEFAULT '0',
                commission_amount TEXT NOT NULL DEFAULT '0',
                concept TEXT,
                effective_at TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_movements_merchant ON movements(merchant_id, effective_at);

            CREATE TABLE IF NOT EXISTS ledger_entries (
                id TEXT PRIMARY KEY,
                merchant_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                source_id TEXT NOT NULL,
                gross TEXT NOT NULL,
                commission TEXT NOT NULL,
                net TEXT NOT NULL,
                balance_before TEXT NOT NULL,
                balance_after TEXT NOT NULL,
                released INTEGER NOT NULL DEFAULT 0,
                release_at TEXT,
                effective_at TEXT NOT NULL,
                metadata_json TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_ledger_merchant_time ON ledger_entries(merchant_id, effective_at);
            "#,
        )?;
        Ok(())
    }

    // ---- merchants ----

    pub fn insert_merchant(&self, m: &Merchant) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO merchants (id, name, tax_id, commission_pct, hold_hours, active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                m.id.to_string(),
                m.name,
                m.tax_id,
                dec_str(m.commission_pct),
                m.hold_hours,
                m.active as i64,
                m.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_merchant(&self, id: Uuid) -> Result<Option<Merchant>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, tax_id, commission_pct, hold_hours, active, created_at
             FROM merchants WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![id.to_string()])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        Ok(Some(merchant_from_row(row)?))
    }

    pub fn list_merchants(&self, include_inactive: bool) -> Result<Vec<Merchant>> {
        let sql = if include_inactive {
            "SELECT id, name, tax_id, commission_pct, hold_hours, active, created_at
             FROM merchants ORDER BY created_at ASC"
        } else {
            "SELECT id, name, tax_id, commission_pct, hold_hours, active, created_at
             FROM merchants WHERE active = 1 ORDER BY created_at ASC"
        };
        let mut stmt = self.conn.prepare(sql)?;
        let mut out = Vec::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            out.push(merchant_from_row(row)?);
        }
        Ok(out)
    }

    pub fn update_merchant_terms(
        &self,
        id: Uuid,
        commission_pct: Option<Decimal>,
        hold_hours: Option<u32>,
    ) -> Result<usize> {
        let changed = self.conn.execute(
            "UPDATE merchants SET
                commission_pct = COALESCE(?2, commission_pct),
                hold_hours = COALESCE(?3, hold_hours)
             WHERE id = ?1",
            params![id.to_string(), commission_pct.map(dec_str), hold_hours],
        )?;
        Ok(changed)
    }

    pub fn set_merchant_active(&self, id: Uuid, active: bool) -> Result<usize> {
        let changed = self.conn.execute(
            "UPDATE merchants SET active = ?2 WHERE id = ?1",
            params![id.to_string(), active as i64],
        )?;
        Ok(changed)
    }

    // ---- credits ----

    pub fn insert_credit(&self, c: &Credit) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO credits (id, external_id, amount, payer_name, payer_tax_id, received_at,
                                 merchant_id, commission_pct, commission_amount, matched,
                                 receipt_id, source, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                c.id.to_string(),
                c.external_id,
                dec_str(c.amount),
                c.payer_name,
                c.payer_tax_id,
                c.received_at.to_rfc3339(),
                c.merchant_id.map(|m| m.to_string()),
                dec_str(c.commission_pct),
                dec_str(c.commission_amount),
                c.matched as i64,
                c.receipt_id.map(|r| r.to_string()),
                c.source.as_str(),
                c.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_credit(&self, id: Uuid) -> Result<Option<Credit>> {
        self.credit_where("id = ?1", params![id.to_string()])
            .map(|mut v| v.pop())
    }

    pub fn get_credit_by_external_id(&self, external_id: &str) -> Result<Option<Credit>> {
        self.credit_where("external_id = ?1", params![external_id])
            .map(|mut v| v.pop())
    }

    pub fn list_credits(&self, only_unmatched: bool) -> Result<Vec<Credit>> {
        if only_unmatched {
            self.credit_where("matched = 0", params![])
        } else {
            self.credit_where("1 = 1", params![])
        }
    }

    pub fn credits_for_merchant(&self, merchant_id: Uuid) -> Result<Vec<Credit>> {
        self.credit_where("merchant_id = ?1", params![merchant_id.to_string()])
    }

    /// Unmatched credits with exactly this amount inside the time window.
    pub fn unmatched_credits_in_window(
        &self,
        amount: Decimal,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Credit>> {
        self.credit_where(
            "matched = 0 AND amount = ?1 AND received_at >= ?2 AND received_at <= ?3",
            params![dec_str(amount), from.to_rfc3339(), to.to_rfc3339()],
        )
    }

    fn credit_where(&self, predicate: &str, args: impl rusqlite::Params) -> Result<Vec<Credit>> {
        let sql = format!(
            "SELECT id, external_id, amount, payer_name, payer_tax_id, received_at,
                    merchant_id, commission_pct, commission_amount, matched,
                    receipt_id, source, created_at
             FROM credits WHERE {predicate} ORDER BY received_at ASC, created_at ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut out = Vec::new();
        let mut rows = stmt.query(args)?;
        while let Some(row) = rows.next()? {
            out.push(credit_from_row(row)?);
        }
        Ok(out)
    }

    /// Conditionally link a credit and a receipt. Both sides must still be
    /// unmatched; zero affected rows on either side means a concurrent or
    /// prior match already claimed one of them, and nothing is written.
    pub fn link_match(
        &mut self,
        credit_id: Uuid,
        receipt_id: Uuid,
        merchant_id: Uuid,
        commission_pct: Decimal,
        commission_amount: Decimal,
    ) -> Result<bool> {
        let tx = self.conn.transaction()?;

        let credit_rows = tx.execute(
            "UPDATE credits SET matched = 1, receipt_id = ?2, merchant_id = ?3,
                                commission_pct = ?4, commission_amount = ?5
             WHERE id = ?1 AND matched = 0 AND receipt_id IS NULL",
            params![
                credit_id.to_string(),
                receipt_id.to_string(),
                merchant_id.to_string(),
                dec_str(commission_pct),
                dec_str(commission_amount),
            ],
        )?;

        let receipt_rows = tx.execute(
            "UPDATE receipts SET matched = 1, credit_id = ?2, merchant_id = ?3
             WHERE id = ?1 AND matched = 0 AND credit_id IS NULL AND expired = 0",
            params![
                receipt_id.to_string(),
                credit_id.to_string(),
                merchant_id.to_string(),
            ],
        )?;

        if credit_rows == 1 && receipt_rows == 1 {
            tx.commit()?;
            Ok(true)
        } else {
            // Dropping the transaction rolls back the one-sided update.
            Ok(false)
        }
    }

    /// Sever an existing match. Returns the receipt and merchant that were
    /// linked, or None when the credit exists but is unmatched.
    pub fn unlink_match(&mut self, credit_id: Uuid) -> Result<Option<(Uuid, Uuid)>> {
        let tx = self.conn.transaction()?;

        let linked: Option<(String, String)> = {
            let mut stmt = tx.prepare(
                "SELECT receipt_id, merchant_id FROM credits
                 WHERE id = ?1 AND matched = 1",
            )?;
            let mut rows = stmt.query(params![credit_id.to_string()])?;
            match rows.next()? {
                Some(row) => Some((row.get(0)?, row.get(1)?)),
                None => None,
            }
        };

        let Some((receipt_raw, merchant_raw)) = linked else {
            return Ok(None);
        };

        tx.execute(
            "UPDATE credits SET matched = 0, receipt_id = NULL, merchant_id = NULL,
                                commission_pct = '0', commission_amount = '0'
             WHERE id = ?1",
            params![credit_id.to_string()],
        )?;
        tx.execute(
            "UPDATE receipts SET matched = 0, credit_id = NULL WHERE id = ?1",
            params![receipt_raw],
        )?;
        tx.commit()?;

        let receipt_id = parse_uuid(&receipt_raw, "credits.receipt_id")?;
        let merchant_id = parse_uuid(&merchant_raw, "credits.merchant_id")?;
        Ok(Some((receipt_id, merchant_id)))
    }

    // ---- receipts ----

    pub fn insert_receipt(&self, r: &Receipt) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO receipts (id, declared_name, declared_tax_id, amount, declared_at,
                                  merchant_id, credit_id, matched, expired, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                r.id.to_string(),
                r.declared_name,
                r.declared_tax_id,
                dec_str(r.amount),
                r.declared_at.to_rfc3339(),
                r.merchant_id.map(|m| m.to_string()),
                r.credit_id.map(|c| c.to_string()),
                r.matched as i64,
                r.expired as i64,
                r.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_receipt(&self, id: Uuid) -> Result<Option<Receipt>> {
        self.receipt_where("id = ?1", params![id.to_string()])
            .map(|mut v| v.pop())
    }

    pub fn list_receipts(&self, only_pending: bool) -> Result<Vec<Receipt>> {
        if only_pending {
            self.receipt_where("matched = 0 AND expired = 0", params![])
        } else {
            self.receipt_where("1 = 1", params![])
        }
    }

    pub fn pending_receipts_for_merchant(&self, merchant_id: Uuid) -> Result<Vec<Receipt>> {
        self.receipt_where(
            "merchant_id = ?1 AND matched = 0 AND expired = 0",
            params![merchant_id.to_string()],
        )
    }

    /// Receipts with this amount declared inside the window; used for
    /// duplicate-submission detection.
    pub fn receipts_in_window(
        &self,
        amount: Decimal,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Receipt>> {
        self.receipt_where(
            "amount = ?1 AND declared_at >= ?2 AND declared_at <= ?3",
            params![dec_str(amount), from.to_rfc3339(), to.to_rfc3339()],
        )
    }

    /// Mark pending receipts declared before the cutoff as expired.
    pub fn expire_receipts_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let changed = self.conn.execute(
            "UPDATE receipts SET expired = 1
             WHERE matched = 0 AND expired = 0 AND declared_at < ?1",
            params![cutoff.to_rfc3339()],
        )?;
        Ok(changed)
    }

    fn receipt_where(&self, predicate: &str, args: impl rusqlite::Params) -> Result<Vec<Receipt>> {
        let sql = format!(
            "SELECT id, declared_name, declared_tax_id, amount, declared_at,
                    merchant_id, credit_id, matched, expired, created_at
             FROM receipts WHERE {predicate} ORDER BY declared_at ASC, created_at ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut out = Vec::new();
        let mut rows = stmt.query(args)?;
        while let Some(row) = rows.next()? {
            out.push(receipt_from_row(row)?);
        }
        Ok(out)
    }

    // ---- manual movements ----

    pub fn insert_movement(&self, m: &ManualMovement) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO movements (id, merchant_id, direction, deposito, amount,
                                   commission_pct, commission_amount, concept,
                                   effective_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                m.id.to_string(),
                m.merchant_id.to_string(),
                m.direction.as_str(),
                m.deposito as i64,
                dec_str(m.amount),
                dec_str(m.commission_pct),
                dec_str(m.commission_amount),
                m.concept,
                m.effective_at.to_rfc3339(),
                m.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_movement(&self, id: Uuid) -> Result<Option<ManualMovement>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, merchant_id, direction, deposito, amount, commission_pct,
                    commission_amount, concept, effective_at, created_at
             FROM movements WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![id.to_string()])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        Ok(Some(movement_from_row(row)?))
    }

    pub fn movements_for_merchant(&self, merchant_id: Uuid) -> Result<Vec<ManualMovement>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, merchant_id, direction, deposito, amount, commission_pct,
                    commission_amount, concept, effective_at, created_at
             FROM movements WHERE merchant_id = ?1
             ORDER BY effective_at ASC, created_at ASC",
        )?;
        let mut out = Vec::new();
        let mut rows = stmt.query(params![merchant_id.to_string()])?;
        while let Some(row) = rows.next()? {
            out.push(movement_from_row(row)?);
        }
        Ok(out)
    }

    pub fn delete_movement(&self, id: Uuid) -> Result<usize> {
        let changed = self
            .conn
            .execute("DELETE FROM movements WHERE id = ?1", params![id.to_string()])?;
        Ok(changed)
    }

    // ---- ledger ----

    /// Swap a merchant's ledger for a freshly computed one in a single
    /// transaction, so readers never observe a half-rebuilt ledger.
    pub fn replace_ledger(&mut self, merchant_id: Uuid, entries: &[LedgerEntry]) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM ledger_entries WHERE merchant_id = ?1",
            params![merchant_id.to_string()],
        )?;
        for e in entries {
            insert_entry(&tx, e)?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn append_ledger_entry(&self, e: &LedgerEntry) -> Result<()> {
        insert_entry(&self.conn, e)
    }

    pub fn latest_ledger_entry(&self, merchant_id: Uuid) -> Result<Option<LedgerEntry>> {
        self.entry_where(
            "merchant_id = ?1",
            params![merchant_id.to_string()],
            "ORDER BY effective_at DESC, created_at DESC LIMIT 1",
        )
        .map(|mut v| v.pop())
    }

    pub fn latest_ledger_entry_as_of(
        &self,
        merchant_id: Uuid,
        as_of: DateTime<Utc>,
    ) -> Result<Option<LedgerEntry>> {
        self.entry_where(
            "merchant_id = ?1 AND effective_at <= ?2",
            params![merchant_id.to_string(), as_of.to_rfc3339()],
            "ORDER BY effective_at DESC, created_at DESC LIMIT 1",
        )
        .map(|mut v| v.pop())
    }

    pub fn ledger_entries_for_merchant(&self, merchant_id: Uuid) -> Result<Vec<LedgerEntry>> {
        self.entry_where(
            "merchant_id = ?1",
            params![merchant_id.to_string()],
            "ORDER BY effective_at ASC, created_at ASC",
        )
    }

    pub fn ledger_entry_count(&self, merchant_id: Uuid) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM ledger_entries WHERE merchant_id = ?1",
            params![merchant_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn list_ledger_entries(
        &self,
        merchant_id: Uuid,
        query: &LedgerQuery,
    ) -> Result<Vec<LedgerEntry>> {
        let mut predicate = String::from("merchant_id = ?1");
        if query.kind.is_some() {
            predicate.push_str(" AND kind = ?2");
        } else {
            predicate.push_str(" AND ?2 IS NULL");
        }
        if query.from.is_some() {
            predicate.push_str(" AND effective_at >= ?3");
        } else {
            predicate.push_str(" AND ?3 IS NULL");
        }
        if query.to.is_some() {
            predicate.push_str(" AND effective_at <= ?4");
        } else {
            predicate.push_str(" AND ?4 IS NULL");
        }

        let order = if query.descending { "DESC" } else { "ASC" };
        let page_size = query.page_size.max(1);
        let offset = (query.page.max(1) - 1) * page_size;
        let tail = format!(
            "ORDER BY {} {order}, created_at {order} LIMIT {page_size} OFFSET {offset}",
            query.sort_by.column()
        );

        self.entry_where(
            &predicate,
            params![
                merchant_id.to_string(),
                query.kind.map(|k| k.as_str()),
                query.from.map(|t| t.to_rfc3339()),
                query.to.map(|t| t.to_rfc3339()),
            ],
            &tail,
        )
    }

    fn entry_where(
        &self,
        predicate: &str,
        args: impl rusqlite::Params,
        tail: &str,
    ) -> Result<Vec<LedgerEntry>> {
        let sql = format!(
            "SELECT id, merchant_id, kind, source_id, gross, commission, net,
                    balance_before, balance_after, released, release_at,
                    effective_at, metadata_json, created_at
             FROM ledger_entries WHERE {predicate} {tail}"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut out = Vec::new();
        let mut rows = stmt.query(args)?;
        while let Some(row) = rows.next()? {
            out.push(entry_from_row(row)?);
        }
        Ok(out)
    }

    // ---- consistency ----

    /// Live movement count for a merchant: credits assigned to it, its
    /// pending (unmatched, unexpired) receipts, and its manual movements.
    pub fn live_movement_count(&self, merchant_id: Uuid) -> Result<u64> {
        let id = merchant_id.to_string();
        let credits: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM credits WHERE merchant_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        let receipts: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM receipts WHERE merchant_id = ?1 AND matched = 0 AND expired = 0",
            params![id],
            |row| row.get(0),
        )?;
        let movements: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM movements WHERE merchant_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok((credits + receipts + movements) as u64)
    }
}

fn insert_entry(conn: &Connection, e: &LedgerEntry) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO ledger_entries (id, merchant_id, kind, source_id, gross, commission, net,
                                    balance_before, balance_after, released, release_at,
                                    effective_at, metadata_json, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
        params![
            e.id.to_string(),
            e.merchant_id.to_string(),
            e.kind.as_str(),
            e.source_id.to_string(),
            dec_str(e.gross),
            dec_str(e.commission),
            dec_str(e.net),
            dec_str(e.balance_before),
            dec_str(e.balance_after),
            e.released as i64,
            e.release_at.map(|t| t.to_rfc3339()),
            e.effective_at.to_rfc3339(),
            serde_json::to_string(&e.metadata)?,
            e.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

// ---- row mapping ----

fn merchant_from_row(row: &Row<'_>) -> Result<Merchant> {
    let id: String = row.get(0)?;
    let name: String = row.get(1)?;
    let tax_id: Option<String> = row.get(2)?;
    let commission_pct: String = row.get(3)?;
    let hold_hours: i64 = row.get(4)?;
    let active: i64 = row.get(5)?;
    let created_at: String = row.get(6)?;

    Ok(Merchant {
        id: parse_uuid(&id, "merchants.id")?,
        name,
        tax_id,
        commission_pct: parse_decimal(&commission_pct, "merchants.commission_pct")?,
        hold_hours: hold_hours as u32,
        active: active != 0,
        created_at: parse_ts(&created_at, "merchants.created_at")?,
    })
}

fn credit_from_row(row: &Row<'_>) -> Result<Credit> {
    let id: String = row.get(0)?;
    let external_id: String = row.get(1)?;
    let amount: String = row.get(2)?;
    let payer_name: Option<String> = row.get(3)?;
    let payer_tax_id: Option<String> = row.get(4)?;
    let received_at: String = row.get(5)?;
    let merchant_id: Option<String> = row.get(6)?;
    let commission_pct: String = row.get(7)?;
    let commission_amount: String = row.get(8)?;
    let matched: i64 = row.get(9)?;
    let receipt_id: Option<String> = row.get(10)?;
    let source: String = row.get(11)?;
    let created_at: String = row.get(12)?;

    Ok(Credit {
        id: parse_uuid(&id, "credits.id")?,
        external_id,
        amount: parse_decimal(&amount, "credits.amount")?,
        payer_name,
        payer_tax_id,
        received_at: parse_ts(&received_at, "credits.received_at")?,
        merchant_id: merchant_id
            .map(|m| parse_uuid(&m, "credits.merchant_id"))
            .transpose()?,
        commission_pct: parse_decimal(&commission_pct, "credits.commission_pct")?,
        commission_amount: parse_decimal(&commission_amount, "credits.commission_amount")?,
        matched: matched != 0,
        receipt_id: receipt_id
            .map(|r| parse_uuid(&r, "credits.receipt_id"))
            .transpose()?,
        source: CreditSource::parse(&source)
            .ok_or_else(|| anyhow!("Invalid credit source in DB: {source}"))?,
        created_at: parse_ts(&created_at, "credits.created_at")?,
    })
}

fn receipt_from_row(row: &Row<'_>) -> Result<Receipt> {
    let id: String = row.get(0)?;
    let declared_name: Option<String> = row.get(1)?;
    let declared_tax_id: Option<String> = row.get(2)?;
    let amount: String = row.get(3)?;
    let declared_at: String = row.get(4)?;
    let merchant_id: Option<String> = row.get(5)?;
    let credit_id: Option<String> = row.get(6)?;
    let matched: i64 = row.get(7)?;
    let expired: i64 = row.get(8)?;
    let created_at: String = row.get(9)?;

    Ok(Receipt {
        id: parse_uuid(&id, "receipts.id")?,
        declared_name,
        declared_tax_id,
        amount: parse_decimal(&amount, "receipts.amount")?,
        declared_at: parse_ts(&declared_at, "receipts.declared_at")?,
        merchant_id: merchant_id
            .map(|m| parse_uuid(&m, "receipts.merchant_id"))
            .transpose()?,
        credit_id: credit_id
            .map(|c| parse_uuid(&c, "receipts.credit_id"))
            .transpose()?,
        matched: matched != 0,
        expired: expired != 0,
        created_at: parse_ts(&created_at, "receipts.created_at")?,
    })
}

fn movement_from_row(row: &Row<'_>) -> Result<ManualMovement> {
    let id: String = row.get(0)?;
    let merchant_id: String = row.get(1)?;
    let direction: String = row.get(2)?;
    let deposito: i64 = row.get(3)?;
    let amount: String = row.get(4)?;
    let commission_pct: String = row.get(5)?;
    let commission_amount: String = row.get(6)?;
    let concept: Option<String> = row.get(7)?;
    let effective_at: String = row.get(8)?;
    let created_at: String = row.get(9)?;

    Ok(ManualMovement {
        id: parse_uuid(&id, "movements.id")?,
        merchant_id: parse_uuid(&merchant_id, "movements.merchant_id")?,
        direction: MovementDirection::parse(&direction)
            .ok_or_else(|| anyhow!("Invalid movement direction in DB: {direction}"))?,
        deposito: deposito != 0,
        amount: parse_decimal(&amount, "movements.amount")?,
        commission_pct: parse_decimal(&commission_pct, "movements.commission_pct")?,
        commission_amount: parse_decimal(&commission_amount, "movements.commission_amount")?,
        concept,
        effective_at: parse_ts(&effective_at, "movements.effective_at")?,
        created_at: parse_ts(&created_at, "movements.created_at")?,
    })
}

fn entry_from_row(row: &Row<'_>) -> Result<LedgerEntry> {
    let id: String = row.get(0)?;
    let merchant_id: String = row.get(1)?;
    let kind: String = row.get(2)?;
    let source_id: String = row.get(3)?;
    let gross: String = row.get(4)?;
    let commission: String = row.get(5)?;
    let net: String = row.get(6)?;
    let balance_before: String = row.get(7)?;
    let balance_after: String = row.get(8)?;
    let released: i64 = row.get(9)?;
    let release_at: Option<String> = row.get(10)?;
    let effective_at: String = row.get(11)?;
    let metadata_json: String = row.get(12)?;
    let created_at: String = row.get(13)?;

    Ok(LedgerEntry {
        id: parse_uuid(&id, "ledger_entries.id")?,
        merchant_id: parse_uuid(&merchant_id, "ledger_entries.merchant_id")?,
        kind: EntryKind::parse(&kind)
            .ok_or_else(|| anyhow!("Invalid ledger entry kind in DB: {kind}"))?,
        source_id: parse_uuid(&source_id, "ledger_entries.source_id")?,
        gross: parse_decimal(&gross, "ledger_entries.gross")?,
        commission: parse_decimal(&commission, "ledger_entries.commission")?,
        net: parse_decimal(&net, "ledger_entries.net")?,
        balance_before: parse_decimal(&balance_before, "ledger_entries.balance_before")?,
        balance_after: parse_decimal(&balance_after, "ledger_entries.balance_after")?,
        released: released != 0,
        release_at: release_at
            .map(|t| parse_ts(&t, "ledger_entries.release_at"))
            .transpose()?,
        effective_at: parse_ts(&effective_at, "ledger_entries.effective_at")?,
        metadata: serde_json::from_str(&metadata_json)
            .context("Invalid metadata_json in ledger_entries")?,
        created_at: parse_ts(&created_at, "ledger_entries.created_at")?,
    })
}

fn parse_uuid(raw: &str, field: &'static str) -> Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("Invalid UUID in {field}: {raw}"))
}

fn parse_decimal(raw: &str, field: &'static str) -> Result<Decimal> {
    raw.parse::<Decimal>()
        .with_context(|| format!("Invalid decimal in {field}: {raw}"))
}

fn parse_ts(raw: &str, field: &'static str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Invalid timestamp in {field}: {raw}"))?
        .with_timezone(&Utc))
}
