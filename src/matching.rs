use chrono::{DateTime, Duration, Utc};

use crate::config::MatchingConfig;
use crate::domain::{Credit, CreditSource, Receipt};
use crate::normalize::{name_similarity, normalize_name, tax_ids_match};

const AMOUNT_POINTS: u32 = 30;
const NAME_EXACT_POINTS: u32 = 25;
const NAME_PARTIAL_POINTS: u32 = 15;
const TAX_ID_POINTS: u32 = 20;

/// Component scores for one receipt/credit pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreBreakdown {
    pub amount: u32,
    pub time: u32,
    pub name: u32,
    pub tax_id: u32,
}

impl ScoreBreakdown {
    pub fn total(&self) -> u32 {
        self.amount + self.time + self.name + self.tax_id
    }

    /// Amount and time proximity alone are never enough; a match needs at
    /// least one identity signal to guard against same-amount same-day
    /// transfers from unrelated payers.
    pub fn has_identity_signal(&self) -> bool {
        self.name > 0 || self.tax_id > 0
    }
}

/// Credit timestamp as used for time-proximity comparison. Batch-imported
/// history carries a recording skew that is corrected here; live webhook
/// credits are taken as-is.
pub fn corrected_received_at(credit: &Credit, cfg: &MatchingConfig) -> DateTime<Utc> {
    match credit.source {
        CreditSource::Import => credit.received_at + Duration::hours(cfg.import_clock_skew_hours),
        CreditSource::Webhook => credit.received_at,
    }
}

fn time_points(diff_minutes: i64) -> u32 {
    match diff_minutes {
        0..=6 => 30,
        7..=60 => 25,
        61..=360 => 20,
        361..=720 => 15,
        _ => 10,
    }
}

pub fn score_candidate(receipt: &Receipt, credit: &Credit, cfg: &MatchingConfig) -> ScoreBreakdown {
    let diff = (corrected_received_at(credit, cfg) - receipt.declared_at)
        .num_minutes()
        .abs();

    let name = match (receipt.declared_name.as_deref(), credit.payer_name.as_deref()) {
        (Some(a), Some(b)) => {
            let na = normalize_name(a);
            if !na.is_empty() && na == normalize_name(b) {
                NAME_EXACT_POINTS
            } else if name_similarity(a, b) >= cfg.name_partial_threshold {
                NAME_PARTIAL_POINTS
            } else {
                0
            }
        }
        _ => 0,
    };

    let tax_id = match (
        receipt.declared_tax_id.as_deref(),
        credit.payer_tax_id.as_deref(),
    ) {
        (Some(a), Some(b)) if tax_ids_match(a, b) => TAX_ID_POINTS,
        _ => 0,
    };

    ScoreBreakdown {
        amount: AMOUNT_POINTS,
        time: time_points(diff),
        name,
        tax_id,
    }
}

/// Narrow a pool of same-amount credits to those inside the configured
/// window around the receipt's declared time, nearest first, capped to
/// bound scoring cost.
pub fn select_candidates(
    pool: Vec<Credit>,
    receipt_declared_at: DateTime<Utc>,
    cfg: &MatchingConfig,
) -> Vec<Credit> {
    let window = Duration::hours(cfg.candidate_window_hours);
    let mut with_distance: Vec<(i64, Credit)> = pool
        .into_iter()
        .filter_map(|c| {
            let diff = (corrected_received_at(&c, cfg) - receipt_declared_at).abs();
            (diff <= window).then(|| (diff.num_seconds(), c))
        })
        .collect();
    with_distance.sort_by_key(|(d, _)| *d);
    with_distance
        .into_iter()
        .take(cfg.candidate_limit)
        .map(|(_, c)| c)
        .collect()
}

/// Best candidate clearing both the score floor and the identity-signal
/// rule, or None when the receipt should stay pending.
pub fn find_best_match<'a>(
    receipt: &Receipt,
    candidates: &'a [Credit],
    cfg: &MatchingConfig,
) -> Option<(&'a Credit, ScoreBreakdown)> {
    let mut best: Option<(&Credit, ScoreBreakdown)> = None;

    for credit in candidates {
        let score = score_candidate(receipt, credit, cfg);
        match &best {
            Some((_, current)) if score.total() <= current.total() => {}
            _ => best = Some((credit, score)),
        }
    }

    best.filter(|(_, s)| s.total() >= cfg.min_score && s.has_identity_signal())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn cfg() -> MatchingConfig {
        MatchingConfig::default()
    }

    fn ts(h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 3, h, min, 0).unwrap()
    }

    fn credit(
        name: Option<&str>,
        tax_id: Option<&str>,
        received_at: DateTime<Utc>,
        source: CreditSource,
    ) -> Credit {
        Credit {
            id: Uuid::new_v4(),
            external_id: Uuid::new_v4().to_string(),
            amount: Decimal::from(1000),
            payer_name: name.map(String::from),
            payer_tax_id: tax_id.map(String::from),
            received_at,
            merchant_id: None,
            commission_pct: Decimal::ZERO,
            commission_amount: Decimal::ZERO,
            matched: false,
            receipt_id: None,
            source,
            created_at: received_at,
        }
    }

    fn receipt(
        name: Option<&str>,
        tax_id: Option<&str>,
        declared_at: DateTime<Utc>,
    ) -> Receipt {
        Receipt {
            id: Uuid::new_v4(),
            declared_name: name.map(String::from),
            declared_tax_id: tax_id.map(String::from),
            amount: Decimal::from(1000),
            declared_at,
            merchant_id: None,
            credit_id: None,
            matched: false,
            expired: false,
            created_at: declared_at,
        }
    }

    #[test]
    fn close_name_match_scores_eighty_five() {
        let c = credit(Some("Juan Perez"), None, ts(10, 0), CreditSource::Webhook);
        let r = receipt(Some("Pérez Juan"), None, ts(10, 2));
        let s = score_candidate(&r, &c, &cfg());
        assert_eq!(s.amount, 30);
        assert_eq!(s.time, 30);
        assert_eq!(s.name, 25);
        assert_eq!(s.tax_id, 0);
        assert_eq!(s.total(), 85);
        assert!(s.has_identity_signal());
    }

    #[test]
    fn time_buckets_step_down_with_distance() {
        let r = receipt(Some("x"), None, ts(10, 0));
        let mk = |h, min| credit(None, None, ts(h, min), CreditSource::Webhook);
        assert_eq!(score_candidate(&r, &mk(10, 5), &cfg()).time, 30);
        assert_eq!(score_candidate(&r, &mk(10, 45), &cfg()).time, 25);
        assert_eq!(score_candidate(&r, &mk(14, 0), &cfg()).time, 20);
        assert_eq!(score_candidate(&r, &mk(21, 0), &cfg()).time, 15);
        assert_eq!(score_candidate(&r, &mk(23, 30), &cfg()).time, 10);
    }

    #[test]
    fn imported_credit_timestamps_are_skew_corrected() {
        // Receipt at 10:00; imported credit recorded at 13:01 is really
        // 10:01 after the -3h correction.
        let r = receipt(Some("Juan Perez"), None, ts(10, 0));
        let c = credit(Some("Juan Perez"), None, ts(13, 1), CreditSource::Import);
        assert_eq!(score_candidate(&r, &c, &cfg()).time, 30);

        // The same timestamps from a webhook credit score as a 3h gap.
        let c = credit(Some("Juan Perez"), None, ts(13, 1), CreditSource::Webhook);
        assert_eq!(score_candidate(&r, &c, &cfg()).time, 20);
    }

    #[test]
    fn amount_and_time_alone_never_match() {
        // Score 30 + 20 = 50 reaches the floor but carries no identity
        // signal, so it must not auto-match.
        let c = credit(None, None, ts(14, 0), CreditSource::Webhook);
        let r = receipt(Some("Juan Perez"), None, ts(10, 0));
        let s = score_candidate(&r, &c, &cfg());
        assert_eq!(s.total(), 50);
        assert!(!s.has_identity_signal());
        assert!(find_best_match(&r, &[c], &cfg()).is_none());
    }

    #[test]
    fn unrelated_name_far_in_time_stays_pending() {
        // 30 amount + 10 time + 0 name = 40, under the 50 floor.
        let c = credit(
            Some("Gomez Maria"),
            None,
            ts(10, 0) + Duration::hours(20),
            CreditSource::Webhook,
        );
        let r = receipt(Some("Juan Perez"), None, ts(10, 0));
        assert!(find_best_match(&r, &[c], &cfg()).is_none());
    }

    #[test]
    fn best_scoring_candidate_wins() {
        let taxed = credit(
            Some("Juan Perez"),
            Some("20-12345678-6"),
            ts(12, 0),
            CreditSource::Webhook,
        );
        let taxed_id = taxed.id;
        let candidates = vec![
            credit(Some("Juan Perez"), None, ts(12, 0), CreditSource::Webhook),
            taxed,
        ];
        let r = receipt(Some("Perez Juan"), Some("20123456786"), ts(10, 0));
        let (winner, score) = find_best_match(&r, &candidates, &cfg()).unwrap();
        assert_eq!(winner.id, taxed_id);
        assert_eq!(score.tax_id, 20);
        assert_eq!(score.total(), 95); // 30 amount + 20 time + 25 name + 20 tax id
    }

    #[test]
    fn candidate_selection_caps_and_sorts_by_proximity() {
        let mut pool = Vec::new();
        for i in 0..15i64 {
            pool.push(credit(None, None, ts(10, 0) + Duration::hours(i), CreditSource::Webhook));
        }
        // One outside the 24h window.
        pool.push(credit(
            None,
            None,
            ts(10, 0) + Duration::hours(30),
            CreditSource::Webhook,
        ));

        let selected = select_candidates(pool, ts(10, 0), &cfg());
        assert_eq!(selected.len(), 10);
        assert_eq!(selected[0].received_at, ts(10, 0));
        // Nearest-first ordering.
        for pair in selected.windows(2) {
            let a = (pair[0].received_at - ts(10, 0)).num_seconds().abs();
            let b = (pair[1].received_at - ts(10, 0)).num_seconds().abs();
            assert!(a <= b);
        }
    }
}
