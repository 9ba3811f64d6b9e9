mod balance;
mod cli;
mod config;
mod db;
mod domain;
mod error;
mod ledger;
mod matching;
mod normalize;
mod release;
mod service;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::cli::{
    BalanceArgs, Cli, Command, CreditCmd, DirectionArg, EntryKindArg, LedgerCmd, MatchCmd,
    MerchantCmd, MovementCmd, ReceiptCmd, SortFieldArg, SortOrderArg, SourceArg,
};
use crate::config::{AppConfig, app_paths, load_or_init_config, now_utc};
use crate::db::{Db, LedgerQuery, LedgerSortField};
use crate::domain::{CreditSource, EntryKind, MovementDirection};
use crate::service::ReceiptOutcome;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let paths = app_paths(cli.home.clone())?;
    let (cfg, _cfg_path) = load_or_init_config(&paths)?;
    let (mut db, _db_path) = Db::open(&paths)?;

    match cli.command {
        Command::Merchant(args) => handle_merchant(&db, args.cmd),
        Command::Credit(args) => handle_credit(&db, args.cmd),
        Command::Receipt(args) => handle_receipt(&mut db, &cfg, args.cmd),
        Command::Match(args) => handle_match(&mut db, &cfg, args.cmd),
        Command::Movement(args) => handle_movement(&mut db, &cfg, args.cmd),
        Command::Ledger(args) => handle_ledger(&mut db, &cfg, args.cmd),
        Command::Balance(args) => handle_balance(&db, &cfg, args),
    }
}

fn handle_merchant(db: &Db, cmd: MerchantCmd) -> Result<()> {
    match cmd {
        MerchantCmd::Add {
            name,
            tax_id,
            commission,
            hold_hours,
        } => {
            let commission = parse_decimal(commission, "commission")?;
            let merchant =
                service::create_merchant(db, &name, tax_id, commission, hold_hours, now_utc())?;
            println!(
                "Created merchant '{}' ({}) commission {}% hold {}h.",
                merchant.name, merchant.id, merchant.commission_pct, merchant.hold_hours
            );
            Ok(())
        }
        MerchantCmd::List { all } => {
            let merchants = db.list_merchants(all)?;
            if merchants.is_empty() {
                println!("(no merchants)");
                return Ok(());
            }
            let rows: Vec<Vec<String>> = merchants
                .iter()
                .map(|m| {
                    vec![
                        m.id.to_string(),
                        m.name.clone(),
                        m.commission_pct.to_string(),
                        m.hold_hours.to_string(),
                        if m.active { "yes" } else { "no" }.to_string(),
                    ]
                })
                .collect();
            print_table(&["ID", "NAME", "COMMISSION %", "HOLD H", "ACTIVE"], &rows);
            Ok(())
        }
        MerchantCmd::Update {
            id,
            commission,
            hold_hours,
        } => {
            let id = parse_uuid_arg(&id, "merchant id")?;
            let commission = commission
                .map(|c| parse_decimal(c, "commission"))
                .transpose()?;
            let merchant = service::update_merchant(db, id, commission, hold_hours)?;
            println!(
                "Updated merchant '{}': commission {}% hold {}h.",
                merchant.name, merchant.commission_pct, merchant.hold_hours
            );
            Ok(())
        }
        MerchantCmd::Deactivate { id } => {
            let id = parse_uuid_arg(&id, "merchant id")?;
            service::deactivate_merchant(db, id)?;
            println!("Deactivated merchant {id}.");
            Ok(())
        }
    }
}

fn handle_credit(db: &Db, cmd: CreditCmd) -> Result<()> {
    match cmd {
        CreditCmd::Add {
            external_id,
            amount,
            at,
            name,
            tax_id,
            source,
        } => {
            let amount = parse_decimal(amount, "amount")?;
            let received_at = parse_rfc3339(&at)?;
            let source = match source {
                SourceArg::Webhook => CreditSource::Webhook,
                SourceArg::Import => CreditSource::Import,
            };
            let credit = service::ingest_credit(
                db,
                &external_id,
                amount,
                name,
                tax_id,
                received_at,
                source,
                now_utc(),
            )?;
            println!(
                "Recorded credit {} for {} ({}).",
                credit.id, credit.amount, credit.external_id
            );
            Ok(())
        }
        CreditCmd::List { unmatched } => {
            let credits = db.list_credits(unmatched)?;
            if credits.is_empty() {
                println!("(no credits)");
                return Ok(());
            }
            let rows: Vec<Vec<String>> = credits
                .iter()
                .map(|c| {
                    vec![
                        c.id.to_string(),
                        c.external_id.clone(),
                        c.amount.to_string(),
                        c.payer_name.clone().unwrap_or_default(),
                        c.received_at.to_rfc3339(),
                        if c.matched { "yes" } else { "no" }.to_string(),
                    ]
                })
                .collect();
            print_table(
                &["ID", "EXTERNAL", "AMOUNT", "PAYER", "RECEIVED", "MATCHED"],
                &rows,
            );
            Ok(())
        }
    }
}

fn handle_receipt(db: &mut Db, cfg: &AppConfig, cmd: ReceiptCmd) -> Result<()> {
    match cmd {
        ReceiptCmd::Add {
            amount,
            at,
            name,
            tax_id,
            merchant,
        } => {
            let amount = parse_decimal(amount, "amount")?;
            let declared_at = parse_rfc3339(&at)?;
            let merchant = merchant
                .map(|m| parse_uuid_arg(&m, "merchant id"))
                .transpose()?;

            let outcome = service::ingest_receipt(
                db,
                cfg,
                name,
                tax_id,
                amount,
                declared_at,
                merchant,
                now_utc(),
            )?;

            match outcome {
                ReceiptOutcome::Matched {
                    receipt,
                    credit,
                    score,
                } => {
                    println!(
                        "Receipt {} matched credit {} (score {}: amount {} + time {} + name {} + tax id {}).",
                        receipt.id,
                        credit.id,
                        score.total(),
                        score.amount,
                        score.time,
                        score.name,
                        score.tax_id,
                    );
                    println!(
                        "Commission {} ({}%) on {}.",
                        credit.commission_amount, credit.commission_pct, credit.amount
                    );
                }
                ReceiptOutcome::Pending(receipt) => {
                    println!(
                        "Receipt {} recorded; no credit cleared the match bar, left pending.",
                        receipt.id
                    );
                }
            }
            Ok(())
        }
        ReceiptCmd::List { pending } => {
            let receipts = db.list_receipts(pending)?;
            if receipts.is_empty() {
                println!("(no receipts)");
                return Ok(());
            }
            let rows: Vec<Vec<String>> = receipts
                .iter()
                .map(|r| {
                    vec![
                        r.id.to_string(),
                        r.amount.to_string(),
                        r.declared_name.clone().unwrap_or_default(),
                        r.declared_at.to_rfc3339(),
                        if r.matched {
                            "matched"
                        } else if r.expired {
                            "expired"
                        } else {
                            "pending"
                        }
                        .to_string(),
                    ]
                })
                .collect();
            print_table(&["ID", "AMOUNT", "SENDER", "DECLARED", "STATE"], &rows);
            Ok(())
        }
        ReceiptCmd::Expire { days } => {
            let expired = service::expire_receipts(db, cfg, days, now_utc())?;
            println!("Expired {expired} receipt(s).");
            if expired > 0 {
                // Expired receipts leave the gather set; refresh the caches.
                rebuild_all(db, cfg)?;
            }
            Ok(())
        }
    }
}

fn handle_match(db: &mut Db, cfg: &AppConfig, cmd: MatchCmd) -> Result<()> {
    match cmd {
        MatchCmd::Set {
            receipt_id,
            credit_id,
            merchant,
        } => {
            let receipt_id = parse_uuid_arg(&receipt_id, "receipt id")?;
            let credit_id = parse_uuid_arg(&credit_id, "credit id")?;
            let merchant = merchant
                .map(|m| parse_uuid_arg(&m, "merchant id"))
                .transpose()?;

            let (credit, receipt) =
                service::manual_match(db, cfg, receipt_id, credit_id, merchant, now_utc())?;
            println!(
                "Linked receipt {} to credit {} (commission {}).",
                receipt.id, credit.id, credit.commission_amount
            );
            Ok(())
        }
        MatchCmd::Unset { credit_id } => {
            let credit_id = parse_uuid_arg(&credit_id, "credit id")?;
            let merchant_id = service::manual_unmatch(db, cfg, credit_id, now_utc())?;
            println!("Unlinked credit {credit_id}; ledger for merchant {merchant_id} rebuilt.");
            Ok(())
        }
    }
}

fn handle_movement(db: &mut Db, cfg: &AppConfig, cmd: MovementCmd) -> Result<()> {
    match cmd {
        MovementCmd::Add {
            merchant_id,
            direction,
            amount,
            deposito,
            concept,
            at,
        } => {
            let merchant_id = parse_uuid_arg(&merchant_id, "merchant id")?;
            let amount = parse_decimal(amount, "amount")?;
            let effective_at = match at.as_deref() {
                Some(raw) => parse_rfc3339(raw)?,
                None => now_utc(),
            };
            let direction = match direction {
                DirectionArg::Egreso => MovementDirection::Egreso,
                DirectionArg::Credito => MovementDirection::Credito,
            };

            let movement = service::create_movement(
                db,
                cfg,
                merchant_id,
                direction,
                deposito,
                amount,
                concept,
                effective_at,
                now_utc(),
            )?;
            println!(
                "Recorded {} {} of {} for merchant {}.",
                if movement.deposito { "deposito" } else { "movement" },
                movement.direction.as_str(),
                movement.amount,
                merchant_id
            );
            Ok(())
        }
        MovementCmd::List { merchant_id } => {
            let merchant_id = parse_uuid_arg(&merchant_id, "merchant id")?;
            let movements = db.movements_for_merchant(merchant_id)?;
            if movements.is_empty() {
                println!("(no movements)");
                return Ok(());
            }
            let rows: Vec<Vec<String>> = movements
                .iter()
                .map(|m| {
                    vec![
                        m.id.to_string(),
                        m.direction.as_str().to_string(),
                        if m.deposito { "deposito" } else { "-" }.to_string(),
                        m.amount.to_string(),
                        m.concept.clone().unwrap_or_default(),
                        m.effective_at.to_rfc3339(),
                    ]
                })
                .collect();
            print_table(
                &["ID", "DIRECTION", "KIND", "AMOUNT", "CONCEPT", "EFFECTIVE"],
                &rows,
            );
            Ok(())
        }
        MovementCmd::Delete { movement_id } => {
            let movement_id = parse_uuid_arg(&movement_id, "movement id")?;
            let merchant_id = service::delete_movement(db, cfg, movement_id, now_utc())?;
            println!("Deleted movement {movement_id}; ledger for merchant {merchant_id} rebuilt.");
            Ok(())
        }
    }
}

fn handle_ledger(db: &mut Db, cfg: &AppConfig, cmd: LedgerCmd) -> Result<()> {
    match cmd {
        LedgerCmd::Rebuild { merchant, all } => {
            if all {
                return rebuild_all(db, cfg);
            }
            let Some(merchant) = merchant else {
                return Err(anyhow!("Pass --merchant <id> or --all"));
            };
            let merchant_id = parse_uuid_arg(&merchant, "merchant id")?;
            let merchant = db
                .get_merchant(merchant_id)?
                .ok_or_else(|| anyhow!("No such merchant: {merchant_id}"))?;
            let entries = ledger::rebuild(db, &merchant, &cfg.release, now_utc())?;
            println!("Rebuilt ledger for '{}': {} entries.", merchant.name, entries);
            Ok(())
        }
        LedgerCmd::List {
            merchant_id,
            page,
            page_size,
            sort_by,
            order,
            kind,
            from,
            to,
        } => {
            let merchant_id = parse_uuid_arg(&merchant_id, "merchant id")?;
            let query = LedgerQuery {
                page,
                page_size,
                sort_by: match sort_by {
                    SortFieldArg::EffectiveAt => LedgerSortField::EffectiveAt,
                    SortFieldArg::Amount => LedgerSortField::Amount,
                },
                descending: matches!(order, SortOrderArg::Desc),
                kind: kind.map(|k| match k {
                    EntryKindArg::Credit => EntryKind::Credit,
                    EntryKindArg::Receipt => EntryKind::Receipt,
                    EntryKindArg::ManualInflow => EntryKind::ManualInflow,
                    EntryKindArg::ManualOutflow => EntryKind::ManualOutflow,
                }),
                from: from.as_deref().map(parse_rfc3339).transpose()?,
                to: to.as_deref().map(parse_rfc3339).transpose()?,
            };

            let entries = ledger::list_entries(db, merchant_id, &query)?;
            if entries.is_empty() {
                println!("(no entries)");
                return Ok(());
            }
            let rows: Vec<Vec<String>> = entries
                .iter()
                .map(|e| {
                    vec![
                        e.effective_at.to_rfc3339(),
                        e.kind.as_str().to_string(),
                        e.gross.to_string(),
                        e.commission.to_string(),
                        e.net.to_string(),
                        e.balance_after.to_string(),
                        if e.released { "yes" } else { "no" }.to_string(),
                    ]
                })
                .collect();
            print_table(
                &[
                    "EFFECTIVE", "KIND", "GROSS", "COMMISSION", "NET", "BALANCE", "RELEASED",
                ],
                &rows,
            );
            Ok(())
        }
        LedgerCmd::Verify { merchant_id } => {
            let merchant_id = parse_uuid_arg(&merchant_id, "merchant id")?;
            let report = ledger::verify_consistency(db, merchant_id)?;
            if report.is_consistent() {
                println!(
                    "Ledger consistent: {} entries match the live movement set.",
                    report.ledger_count
                );
            } else {
                println!(
                    "WARNING: ledger drift for merchant {merchant_id}: {} cached entries vs {} live movements. Run: concilia ledger rebuild --merchant {merchant_id}",
                    report.ledger_count, report.live_count
                );
            }
            Ok(())
        }
    }
}

fn rebuild_all(db: &mut Db, cfg: &AppConfig) -> Result<()> {
    let merchants = db.list_merchants(true)?;
    if merchants.is_empty() {
        println!("(no merchants)");
        return Ok(());
    }

    let pb = ProgressBar::new(merchants.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner} {msg} {pos}/{len}")
            .unwrap()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );

    let mut total = 0usize;
    for merchant in &merchants {
        pb.set_message(merchant.name.clone());
        total += ledger::rebuild(db, merchant, &cfg.release, now_utc())?;
        pb.inc(1);
    }
    pb.finish_and_clear();
    println!(
        "Rebuilt {} ledger(s), {} entries total.",
        merchants.len(),
        total
    );
    Ok(())
}

fn handle_balance(db: &Db, cfg: &AppConfig, args: BalanceArgs) -> Result<()> {
    let merchant_id = parse_uuid_arg(&args.merchant_id, "merchant id")?;
    let merchant = db
        .get_merchant(merchant_id)?
        .ok_or_else(|| anyhow!("No such merchant: {merchant_id}"))?;

    if let Some(raw) = args.as_of.as_deref() {
        let as_of = parse_rfc3339(raw)?;
        let cached = ledger::current_balance(db, merchant_id, Some(as_of))?;
        println!("balance\t{}\t{}", as_of.to_rfc3339(), cached);
        return Ok(());
    }

    let now = now_utc();
    let credits = db.credits_for_merchant(merchant_id)?;
    let movements = db.movements_for_merchant(merchant_id)?;
    let summary = balance::summarize(
        &credits,
        &movements,
        merchant.hold_hours,
        &cfg.release,
        now,
    );

    println!("available\t{}", summary.available);
    println!("released\t{}", summary.released_gross);
    println!("released_commissions\t{}", summary.released_commissions);
    println!("pending\t{}", summary.pending_gross);
    println!("pending_net\t{}", summary.pending_net);
    println!("ledger_cached\t{}", ledger::current_balance(db, merchant_id, None)?);

    if args.detail {
        let detail =
            balance::deposit_release_detail(&movements, merchant.hold_hours, &cfg.release, now);
        if detail.is_empty() {
            println!("(no deposits)");
            return Ok(());
        }
        println!();
        println!("(deposits)");
        for d in detail {
            println!(
                "{}\t{}\t{}\t{}",
                d.movement_id,
                d.amount,
                d.release_at.to_rfc3339(),
                if d.released { "released" } else { "pending" }
            );
        }
    }
    Ok(())
}

fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    if headers.is_empty() {
        println!("(no columns)");
        return;
    }

    let cols = headers.len();
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();

    for row in rows {
        for (i, cell) in row.iter().take(cols).enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }

    fn print_row(cells: &[String], widths: &[usize]) {
        print!("|");
        for (i, w) in widths.iter().enumerate() {
            let cell = cells.get(i).map(String::as_str).unwrap_or("");
            print!(" {:width$} |", cell, width = *w);
        }
        println!();
    }

    fn print_sep(widths: &[usize]) {
        print!("|");
        for w in widths {
            print!("{}|", "-".repeat(w + 2));
        }
        println!();
    }

    let header_cells: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    print_row(&header_cells, &widths);
    print_sep(&widths);
    for row in rows {
        print_row(row, &widths);
    }
}

fn parse_decimal(raw: String, field: &'static str) -> Result<Decimal> {
    raw.parse::<Decimal>()
        .with_context(|| format!("Invalid decimal for {field}: {raw}"))
}

fn parse_uuid_arg(raw: &str, field: &'static str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).with_context(|| format!("Invalid {field}: {raw}"))
}

fn parse_rfc3339(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Invalid RFC3339 timestamp: {raw}"))?
        .with_timezone(&Utc))
}
