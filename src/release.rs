use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, TimeZone, Utc, Weekday};

use crate::config::ReleaseConfig;

fn business_tz(cfg: &ReleaseConfig) -> FixedOffset {
    FixedOffset::east_opt(cfg.business_utc_offset_hours * 3600)
        .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap())
}

/// Moment a credit received at `received_at` becomes withdrawable under a
/// `hold_hours` hold.
///
/// Wall-clock rules in the fixed business timezone: receipts at or after
/// the cutoff hour count from the next day; the hold is whole calendar
/// days (ceil of hours/24); weekends never count and roll to Monday; the
/// release lands at 23:59:00 local on the resulting day.
pub fn release_at(
    received_at: DateTime<Utc>,
    hold_hours: u32,
    cfg: &ReleaseConfig,
) -> DateTime<Utc> {
    let tz = business_tz(cfg);
    let local = received_at.with_timezone(&tz);

    let cutoff = NaiveTime::from_hms_opt(cfg.cutoff_hour, 0, 0)
        .unwrap_or_else(|| NaiveTime::from_hms_opt(15, 0, 0).unwrap());

    let mut day = local.date_naive();
    if local.time() >= cutoff {
        day = day.succ_opt().unwrap_or(day);
    }

    let whole_days = hold_hours.div_ceil(24);
    for _ in 0..whole_days {
        day = day.succ_opt().unwrap_or(day);
        match day.weekday() {
            Weekday::Sat => {
                day = day.succ_opt().and_then(|d| d.succ_opt()).unwrap_or(day);
            }
            Weekday::Sun => {
                day = day.succ_opt().unwrap_or(day);
            }
            _ => {}
        }
    }

    let eod = day.and_time(NaiveTime::from_hms_opt(23, 59, 0).unwrap());
    match tz.from_local_datetime(&eod).single() {
        Some(dt) => dt.with_timezone(&Utc),
        // Unreachable for a fixed offset; fall back to the UTC reading.
        None => Utc.from_utc_datetime(&eod),
    }
}

pub fn is_released(
    received_at: DateTime<Utc>,
    hold_hours: u32,
    cfg: &ReleaseConfig,
    as_of: DateTime<Utc>,
) -> bool {
    as_of >= release_at(received_at, hold_hours, cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn cfg() -> ReleaseConfig {
        ReleaseConfig {
            business_utc_offset_hours: -3,
            cutoff_hour: 15,
        }
    }

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        let tz = FixedOffset::east_opt(-3 * 3600).unwrap();
        tz.from_local_datetime(
            &NaiveDate::from_ymd_opt(y, m, d)
                .unwrap()
                .and_hms_opt(h, min, 0)
                .unwrap(),
        )
        .unwrap()
        .with_timezone(&Utc)
    }

    fn local_date_of(dt: DateTime<Utc>) -> (NaiveDate, NaiveTime) {
        let tz = FixedOffset::east_opt(-3 * 3600).unwrap();
        let l = dt.with_timezone(&tz);
        (l.date_naive(), l.time())
    }

    #[test]
    fn weekday_credit_releases_next_business_day() {
        // Tuesday 2026-03-03 10:00 local, 24h hold -> Wednesday 23:59.
        let r = release_at(local(2026, 3, 3, 10, 0), 24, &cfg());
        let (date, time) = local_date_of(r);
        assert_eq!(date, NaiveDate::from_ymd_opt(2026, 3, 4).unwrap());
        assert_eq!(time, NaiveTime::from_hms_opt(23, 59, 0).unwrap());
    }

    #[test]
    fn friday_credit_rolls_over_weekend() {
        // Friday 2026-03-06 10:00 local, 24h hold: the next day is Saturday,
        // which rolls to Monday 2026-03-09 23:59.
        let r = release_at(local(2026, 3, 6, 10, 0), 24, &cfg());
        let (date, time) = local_date_of(r);
        assert_eq!(date, NaiveDate::from_ymd_opt(2026, 3, 9).unwrap());
        assert_eq!(date.weekday(), Weekday::Mon);
        assert_eq!(time, NaiveTime::from_hms_opt(23, 59, 0).unwrap());
    }

    #[test]
    fn after_cutoff_counts_from_next_day() {
        // Thursday 2026-03-05 16:00 local is past the 15:00 cutoff, so the
        // effective start is Friday; 24h lands on Saturday -> Monday 23:59.
        let r = release_at(local(2026, 3, 5, 16, 0), 24, &cfg());
        let (date, _) = local_date_of(r);
        assert_eq!(date, NaiveDate::from_ymd_opt(2026, 3, 9).unwrap());

        // At 14:59 the same Thursday it still counts from Thursday.
        let r = release_at(local(2026, 3, 5, 14, 59), 24, &cfg());
        let (date, _) = local_date_of(r);
        assert_eq!(date, NaiveDate::from_ymd_opt(2026, 3, 6).unwrap());
    }

    #[test]
    fn cutoff_boundary_is_inclusive() {
        // Exactly 15:00 counts as after the cutoff.
        let r = release_at(local(2026, 3, 3, 15, 0), 24, &cfg());
        let (date, _) = local_date_of(r);
        assert_eq!(date, NaiveDate::from_ymd_opt(2026, 3, 5).unwrap());
    }

    #[test]
    fn longer_holds_accumulate_business_days() {
        // Monday 2026-03-02 10:00, 96h = 4 days -> Friday 2026-03-06.
        let r = release_at(local(2026, 3, 2, 10, 0), 96, &cfg());
        let (date, _) = local_date_of(r);
        assert_eq!(date, NaiveDate::from_ymd_opt(2026, 3, 6).unwrap());

        // Wednesday 2026-03-04 10:00, 72h = 3 days: Thu, Fri, Sat->Mon.
        let r = release_at(local(2026, 3, 4, 10, 0), 72, &cfg());
        let (date, _) = local_date_of(r);
        assert_eq!(date, NaiveDate::from_ymd_opt(2026, 3, 9).unwrap());
    }

    #[test]
    fn partial_day_holds_round_up() {
        // A 25h hold needs 2 whole days.
        let r = release_at(local(2026, 3, 2, 10, 0), 25, &cfg());
        let (date, _) = local_date_of(r);
        assert_eq!(date, NaiveDate::from_ymd_opt(2026, 3, 4).unwrap());
    }

    #[test]
    fn is_released_compares_against_release_moment() {
        let received = local(2026, 3, 3, 10, 0);
        let released_at = release_at(received, 24, &cfg());
        assert!(!is_released(
            received,
            24,
            &cfg(),
            released_at - chrono::Duration::minutes(1)
        ));
        assert!(is_released(received, 24, &cfg(), released_at));
    }
}
