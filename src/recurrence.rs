//! Recurrence rule parsing and resolution.
//!
//! Rules arrive as RRULE-style text (`FREQ=WEEKLY;INTERVAL=2;BYDAY=MO,TH`)
//! persisted on the reminder row. They are parsed exactly once here into a
//! [`RecurrenceSpec`]; all occurrence math operates on the structured form.
//!
//! A malformed rule is a hard [`RecurrenceError`], distinct from
//! `Ok(None)` ("the series has ended"): the caller archives the reminder
//! on a parse failure rather than firing on a schedule nobody asked for.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc, Weekday};

use crate::model::Recurrence;

/// Safety cap on grid steps when searching for the next occurrence.
const MAX_SEARCH_STEPS: u32 = 1000;

/// Recurrence frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

/// A parsed recurrence rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceSpec {
    pub freq: Frequency,
    /// Grid spacing in frequency units, >= 1.
    pub interval: u32,
    /// Weekday set for WEEKLY rules (empty = the anchor's weekday), or the
    /// single weekday selected by `by_set_pos` for MONTHLY rules.
    pub by_weekday: Vec<Weekday>,
    /// "nth weekday of the month" selector: 1..=4 or -1 for last.
    pub by_set_pos: Option<i32>,
}

/// Rule parse/validation failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RecurrenceError {
    #[error("malformed recurrence rule: {0}")]
    Malformed(String),
}

impl RecurrenceSpec {
    /// Parse RRULE-style text. A leading `RRULE:` prefix is tolerated.
    pub fn parse(rule: &str) -> Result<Self, RecurrenceError> {
        let body = rule.trim().trim_start_matches("RRULE:");
        if body.is_empty() {
            return Err(RecurrenceError::Malformed("empty rule".to_owned()));
        }

        let mut freq = None;
        let mut interval = 1u32;
        let mut by_weekday = Vec::new();
        let mut by_set_pos = None;

        for part in body.split(';').filter(|p| !p.is_empty()) {
            let Some((key, value)) = part.split_once('=') else {
                return Err(RecurrenceError::Malformed(format!(
                    "expected KEY=VALUE, got '{part}'"
                )));
            };

            match key {
                "FREQ" => {
                    freq = Some(match value {
                        "DAILY" => Frequency::Daily,
                        "WEEKLY" => Frequency::Weekly,
                        "MONTHLY" => Frequency::Monthly,
                        "YEARLY" => Frequency::Yearly,
                        other => {
                            return Err(RecurrenceError::Malformed(format!(
                                "unknown frequency '{other}'"
                            )));
                        }
                    });
                }
                "INTERVAL" => {
                    interval = value.parse::<u32>().ok().filter(|i| *i >= 1).ok_or_else(|| {
                        RecurrenceError::Malformed(format!("bad interval '{value}'"))
                    })?;
                }
                "BYDAY" => {
                    for day in value.split(',') {
                        by_weekday.push(parse_weekday(day)?);
                    }
                }
                "BYSETPOS" => {
                    let pos = value.parse::<i32>().map_err(|_| {
                        RecurrenceError::Malformed(format!("bad BYSETPOS '{value}'"))
                    })?;
                    if !matches!(pos, 1..=4 | -1) {
                        return Err(RecurrenceError::Malformed(format!(
                            "BYSETPOS out of range: {pos}"
                        )));
                    }
                    by_set_pos = Some(pos);
                }
                other => {
                    return Err(RecurrenceError::Malformed(format!(
                        "unsupported rule part '{other}'"
                    )));
                }
            }
        }

        let Some(freq) = freq else {
            return Err(RecurrenceError::Malformed("missing FREQ".to_owned()));
        };

        let spec = Self {
            freq,
            interval,
            by_weekday,
            by_set_pos,
        };
        spec.validate()?;
        Ok(spec)
    }

    fn validate(&self) -> Result<(), RecurrenceError> {
        match self.freq {
            Frequency::Weekly => {
                if self.by_set_pos.is_some() {
                    return Err(RecurrenceError::Malformed(
                        "BYSETPOS is only valid with FREQ=MONTHLY".to_owned(),
                    ));
                }
            }
            Frequency::Monthly => {
                match (self.by_set_pos, self.by_weekday.len()) {
                    (None, 0) | (Some(_), 1) => {}
                    (Some(_), _) => {
                        return Err(RecurrenceError::Malformed(
                            "BYSETPOS requires exactly one BYDAY".to_owned(),
                        ));
                    }
                    (None, _) => {
                        return Err(RecurrenceError::Malformed(
                            "MONTHLY BYDAY requires BYSETPOS".to_owned(),
                        ));
                    }
                }
            }
            Frequency::Daily | Frequency::Yearly => {
                if !self.by_weekday.is_empty() || self.by_set_pos.is_some() {
                    return Err(RecurrenceError::Malformed(
                        "BYDAY/BYSETPOS are not valid for this frequency".to_owned(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Compute the next occurrence of `series` strictly after `after`.
///
/// Returns `Ok(None)` when the series has ended (end date passed, or no
/// further occurrence can be constructed); `Err` when the rule text is
/// malformed.
pub fn next_occurrence(
    series: &Recurrence,
    after: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, RecurrenceError> {
    let spec = RecurrenceSpec::parse(&series.rule)?;
    let start = series.dtstart.naive_utc();
    let after_n = after.naive_utc();

    let next = match spec.freq {
        Frequency::Daily => next_daily(start, spec.interval, after_n),
        Frequency::Weekly => next_weekly(start, &spec, after_n),
        Frequency::Monthly => next_monthly(start, &spec, after_n),
        Frequency::Yearly => next_yearly(start, spec.interval, after_n),
    };

    let Some(next) = next else {
        return Ok(None);
    };

    if let Some(end) = series.end_date {
        if next.date() > end {
            return Ok(None);
        }
    }

    Ok(Some(Utc.from_utc_datetime(&next)))
}

fn next_daily(start: NaiveDateTime, interval: u32, after: NaiveDateTime) -> Option<NaiveDateTime> {
    let step_days = i64::from(interval);
    let mut occ = start;
    if occ <= after {
        // Fast-forward to the last grid point at or before `after`, then
        // step until strictly past it.
        let elapsed_days = (after - start).num_days().max(0);
        let steps = elapsed_days / step_days;
        occ = start + Duration::days(steps * step_days);
        let mut guard = 0;
        while occ <= after {
            occ += Duration::days(step_days);
            guard += 1;
            if guard > MAX_SEARCH_STEPS {
                return None;
            }
        }
    }
    Some(occ)
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

fn next_weekly(
    start: NaiveDateTime,
    spec: &RecurrenceSpec,
    after: NaiveDateTime,
) -> Option<NaiveDateTime> {
    let mut weekdays: Vec<Weekday> = if spec.by_weekday.is_empty() {
        vec![start.weekday()]
    } else {
        spec.by_weekday.clone()
    };
    weekdays.sort_by_key(|d| d.num_days_from_monday());
    weekdays.dedup();

    let time = start.time();
    let anchor_week = week_start(start.date());
    let step = i64::from(spec.interval);

    // Jump to the grid week containing (or preceding) `after`.
    let weeks_elapsed = ((week_start(after.date()) - anchor_week).num_days() / 7).max(0);
    let mut week_idx = weeks_elapsed - weeks_elapsed % step;

    for _ in 0..MAX_SEARCH_STEPS {
        let week = anchor_week + Duration::weeks(week_idx);
        for weekday in &weekdays {
            let date = week + Duration::days(i64::from(weekday.num_days_from_monday()));
            let occ = date.and_time(time);
            if occ >= start && occ > after {
                return Some(occ);
            }
        }
        week_idx += step;
    }
    None
}

fn month_index(date: NaiveDate) -> i64 {
    i64::from(date.year()) * 12 + i64::from(date.month0())
}

fn month_from_index(idx: i64) -> (i32, u32) {
    (
        i32::try_from(idx.div_euclid(12)).unwrap_or(i32::MAX),
        u32::try_from(idx.rem_euclid(12)).unwrap_or(0) + 1,
    )
}

/// Resolve the date selected inside one month, or None when the month has
/// no such date (short month, or fewer than n of that weekday).
fn date_in_month(
    year: i32,
    month: u32,
    spec: &RecurrenceSpec,
    anchor_day: u32,
) -> Option<NaiveDate> {
    match spec.by_set_pos {
        None => NaiveDate::from_ymd_opt(year, month, anchor_day),
        Some(-1) => {
            let weekday = *spec.by_weekday.first()?;
            let last = last_day_of_month(year, month)?;
            let back = (7 + last.weekday().num_days_from_monday()
                - weekday.num_days_from_monday())
                % 7;
            Some(last - Duration::days(i64::from(back)))
        }
        Some(n) => {
            let weekday = *spec.by_weekday.first()?;
            NaiveDate::from_weekday_of_month_opt(year, month, weekday, u8::try_from(n).ok()?)
        }
    }
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (ny, nm) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(ny, nm, 1)?.pred_opt()
}

fn next_monthly(
    start: NaiveDateTime,
    spec: &RecurrenceSpec,
    after: NaiveDateTime,
) -> Option<NaiveDateTime> {
    let time = start.time();
    let anchor_day = start.day();
    let anchor_idx = month_index(start.date());
    let step = i64::from(spec.interval);

    let months_elapsed = (month_index(after.date()) - anchor_idx).max(0);
    let mut idx = anchor_idx + (months_elapsed - months_elapsed % step);

    for _ in 0..MAX_SEARCH_STEPS {
        let (year, month) = month_from_index(idx);
        if let Some(date) = date_in_month(year, month, spec, anchor_day) {
            let occ = date.and_time(time);
            if occ >= start && occ > after {
                return Some(occ);
            }
        }
        idx += step;
    }
    None
}

fn next_yearly(start: NaiveDateTime, interval: u32, after: NaiveDateTime) -> Option<NaiveDateTime> {
    let time = start.time();
    let (month, day) = (start.month(), start.day());
    let step = i64::from(interval);

    let years_elapsed = i64::from(after.year() - start.year()).max(0);
    let mut year = i64::from(start.year()) + (years_elapsed - years_elapsed % step);

    for _ in 0..MAX_SEARCH_STEPS {
        // Feb 29 anchors simply skip non-leap years.
        if let Some(date) = NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, month, day) {
            let occ = date.and_time(time);
            if occ >= start && occ > after {
                return Some(occ);
            }
        }
        year += step;
    }
    None
}

fn parse_weekday(token: &str) -> Result<Weekday, RecurrenceError> {
    Ok(match token {
        "MO" => Weekday::Mon,
        "TU" => Weekday::Tue,
        "WE" => Weekday::Wed,
        "TH" => Weekday::Thu,
        "FR" => Weekday::Fri,
        "SA" => Weekday::Sat,
        "SU" => Weekday::Sun,
        other => {
            return Err(RecurrenceError::Malformed(format!(
                "unknown weekday '{other}'"
            )));
        }
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn series(rule: &str, dtstart: &str, end: Option<&str>) -> Recurrence {
        Recurrence {
            rule: rule.to_owned(),
            dtstart: dtstart.parse().unwrap(),
            end_date: end.map(|d| d.parse().unwrap()),
        }
    }

    fn dt(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn parse_full_rule() {
        let spec = RecurrenceSpec::parse("FREQ=WEEKLY;INTERVAL=2;BYDAY=MO,TH").unwrap();
        assert_eq!(spec.freq, Frequency::Weekly);
        assert_eq!(spec.interval, 2);
        assert_eq!(spec.by_weekday, vec![Weekday::Mon, Weekday::Thu]);
    }

    #[test]
    fn parse_tolerates_rrule_prefix() {
        let spec = RecurrenceSpec::parse("RRULE:FREQ=DAILY").unwrap();
        assert_eq!(spec.freq, Frequency::Daily);
        assert_eq!(spec.interval, 1);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(RecurrenceSpec::parse("").is_err());
        assert!(RecurrenceSpec::parse("FREQ=FORTNIGHTLY").is_err());
        assert!(RecurrenceSpec::parse("INTERVAL=2").is_err());
        assert!(RecurrenceSpec::parse("FREQ=DAILY;INTERVAL=0").is_err());
        assert!(RecurrenceSpec::parse("FREQ=WEEKLY;BYDAY=XX").is_err());
        assert!(RecurrenceSpec::parse("FREQ=DAILY;COUNT=3").is_err());
        assert!(RecurrenceSpec::parse("FREQ=WEEKLY;BYSETPOS=2;BYDAY=FR").is_err());
        assert!(RecurrenceSpec::parse("FREQ=MONTHLY;BYDAY=FR").is_err());
        assert!(RecurrenceSpec::parse("FREQ=MONTHLY;BYSETPOS=2;BYDAY=MO,FR").is_err());
        assert!(RecurrenceSpec::parse("FREQ=MONTHLY;BYSETPOS=5;BYDAY=FR").is_err());
    }

    #[test]
    fn daily_steps_from_anchor() {
        let s = series("FREQ=DAILY;INTERVAL=3", "2026-01-01T08:00:00Z", None);
        // Grid: Jan 1, 4, 7, ... at 08:00.
        let next = next_occurrence(&s, dt("2026-01-01T08:00:00Z")).unwrap();
        assert_eq!(next, Some(dt("2026-01-04T08:00:00Z")));

        let next = next_occurrence(&s, dt("2026-01-05T12:00:00Z")).unwrap();
        assert_eq!(next, Some(dt("2026-01-07T08:00:00Z")));
    }

    #[test]
    fn occurrence_is_strictly_after_reference() {
        let s = series("FREQ=DAILY", "2026-01-01T08:00:00Z", None);
        for reference in [
            "2025-12-25T00:00:00Z",
            "2026-01-01T08:00:00Z",
            "2026-02-13T07:59:59Z",
        ] {
            let next = next_occurrence(&s, dt(reference)).unwrap().unwrap();
            assert!(next > dt(reference), "reference {reference}");
        }
    }

    #[test]
    fn reference_before_anchor_yields_first_occurrence() {
        let s = series("FREQ=DAILY", "2026-06-01T10:00:00Z", None);
        let next = next_occurrence(&s, dt("2026-01-01T00:00:00Z")).unwrap();
        assert_eq!(next, Some(dt("2026-06-01T10:00:00Z")));
    }

    #[test]
    fn weekly_advances_seven_days() {
        // 2026-03-04 is a Wednesday.
        let s = series("FREQ=WEEKLY", "2026-03-04T09:30:00Z", None);
        let next = next_occurrence(&s, dt("2026-03-04T09:30:00Z")).unwrap();
        assert_eq!(next, Some(dt("2026-03-11T09:30:00Z")));
    }

    #[test]
    fn weekly_byday_picks_next_listed_day() {
        // Anchor Monday 2026-03-02; Mondays and Thursdays.
        let s = series(
            "FREQ=WEEKLY;BYDAY=MO,TH",
            "2026-03-02T07:00:00Z",
            None,
        );
        let next = next_occurrence(&s, dt("2026-03-02T07:00:00Z")).unwrap();
        assert_eq!(next, Some(dt("2026-03-05T07:00:00Z")));
        let next = next_occurrence(&s, dt("2026-03-05T07:00:00Z")).unwrap();
        assert_eq!(next, Some(dt("2026-03-09T07:00:00Z")));
    }

    #[test]
    fn weekly_interval_respects_anchor_grid() {
        // Anchor Monday 2026-03-02, every 2 weeks.
        let s = series(
            "FREQ=WEEKLY;INTERVAL=2;BYDAY=MO",
            "2026-03-02T07:00:00Z",
            None,
        );
        // The Monday one week later is off-grid.
        let next = next_occurrence(&s, dt("2026-03-03T00:00:00Z")).unwrap();
        assert_eq!(next, Some(dt("2026-03-16T07:00:00Z")));
    }

    #[test]
    fn monthly_same_day_skips_short_months() {
        let s = series("FREQ=MONTHLY", "2026-01-31T12:00:00Z", None);
        // February has no 31st; next is March 31.
        let next = next_occurrence(&s, dt("2026-01-31T12:00:00Z")).unwrap();
        assert_eq!(next, Some(dt("2026-03-31T12:00:00Z")));
    }

    #[test]
    fn monthly_nth_weekday() {
        // Second Friday of each month; anchor second Friday of Jan 2026.
        let s = series(
            "FREQ=MONTHLY;BYDAY=FR;BYSETPOS=2",
            "2026-01-09T15:00:00Z",
            None,
        );
        let next = next_occurrence(&s, dt("2026-01-09T15:00:00Z")).unwrap();
        assert_eq!(next, Some(dt("2026-02-13T15:00:00Z")));
    }

    #[test]
    fn monthly_last_weekday() {
        let s = series(
            "FREQ=MONTHLY;BYDAY=SU;BYSETPOS=-1",
            "2026-01-25T10:00:00Z",
            None,
        );
        // Last Sunday of Feb 2026 is the 22nd.
        let next = next_occurrence(&s, dt("2026-01-25T10:00:00Z")).unwrap();
        assert_eq!(next, Some(dt("2026-02-22T10:00:00Z")));
    }

    #[test]
    fn yearly_skips_missing_leap_day() {
        let s = series("FREQ=YEARLY", "2024-02-29T09:00:00Z", None);
        let next = next_occurrence(&s, dt("2024-03-01T00:00:00Z")).unwrap();
        assert_eq!(next, Some(dt("2028-02-29T09:00:00Z")));
    }

    #[test]
    fn end_date_exhausts_series() {
        let s = series(
            "FREQ=WEEKLY",
            "2026-03-04T09:30:00Z",
            Some("2026-03-18"),
        );
        // March 11 and 18 are in range; the 25th exceeds the bound.
        let next = next_occurrence(&s, dt("2026-03-11T09:30:00Z")).unwrap();
        assert_eq!(next, Some(dt("2026-03-18T09:30:00Z")));
        let next = next_occurrence(&s, dt("2026-03-18T09:30:00Z")).unwrap();
        assert_eq!(next, None);
    }

    #[test]
    fn malformed_rule_is_error_not_series_end() {
        let s = series("FREQ=SOMETIMES", "2026-03-04T09:30:00Z", None);
        assert!(next_occurrence(&s, dt("2026-03-04T09:30:00Z")).is_err());
    }
}
