//! Time window planning: trailing `days_back` range split into API-sized spans

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};

use crate::error::FetchError;

/// Half-open date range used as one API query filter.
///
/// Invariant: `end > start`. The span limit is enforced by [`plan`].
/// The API treats both query bounds as inclusive, so requests send
/// [`query_end`](Self::query_end) instead of `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl FetchWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, FetchError> {
        if end <= start {
            return Err(FetchError::invalid_range(format!(
                "window end {end} is not after start {start}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn span(&self) -> TimeDelta {
        self.end - self.start
    }

    /// Last millisecond inside the window.
    ///
    /// Adjacent windows share `end`/`start`; a record stamped on that instant
    /// must match only the later window.
    pub fn query_end(&self) -> DateTime<Utc> {
        (self.end - TimeDelta::milliseconds(1)).max(self.start)
    }
}

/// ISO-8601 with millisecond precision and explicit `+00:00` offset
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, false)
}

impl std::fmt::Display for FetchWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} .. {}",
            format_timestamp(self.start),
            format_timestamp(self.end)
        )
    }
}

/// Split `[now - days_back, now]` into consecutive windows of at most `max_span`.
///
/// Windows are ordered oldest first so a run that fails midway has written a
/// chronological prefix of the range. Only the last window may be shorter than
/// `max_span`.
pub fn plan(
    days_back: i64,
    now: DateTime<Utc>,
    max_span: TimeDelta,
) -> Result<Vec<FetchWindow>, FetchError> {
    if days_back <= 0 {
        return Err(FetchError::invalid_range(format!(
            "days_back must be positive, got {days_back}"
        )));
    }
    if max_span <= TimeDelta::zero() {
        return Err(FetchError::invalid_range(format!(
            "maximum window span must be positive, got {max_span}"
        )));
    }

    let total = TimeDelta::try_days(days_back)
        .ok_or_else(|| FetchError::invalid_range(format!("days_back {days_back} is too large")))?;
    let total_start = now
        .checked_sub_signed(total)
        .ok_or_else(|| FetchError::invalid_range(format!("days_back {days_back} is too large")))?;

    let mut windows = Vec::new();
    let mut start = total_start;
    while start < now {
        let end = start
            .checked_add_signed(max_span)
            .map_or(now, |end| end.min(now));
        windows.push(FetchWindow { start, end });
        start = end;
    }

    log::debug!(
        "Planned {} window(s) covering {} .. {}",
        windows.len(),
        format_timestamp(total_start),
        format_timestamp(now)
    );
    Ok(windows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 30, 12, 34, 56).unwrap()
    }

    fn assert_exact_cover(windows: &[FetchWindow], days_back: i64, max_span: TimeDelta) {
        let now = now();
        assert_eq!(windows.first().unwrap().start(), now - TimeDelta::days(days_back));
        assert_eq!(windows.last().unwrap().end(), now);
        for w in windows {
            assert!(w.end() > w.start());
            assert!(w.span() <= max_span);
        }
        for pair in windows.windows(2) {
            assert_eq!(pair[0].end(), pair[1].start(), "gap or overlap");
        }
    }

    #[test]
    fn one_eighty_days_two_windows() {
        let windows = plan(180, now(), TimeDelta::days(120)).unwrap();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].span(), TimeDelta::days(120));
        assert_eq!(windows[1].span(), TimeDelta::days(60));
        assert_exact_cover(&windows, 180, TimeDelta::days(120));
    }

    #[test]
    fn exact_multiple_has_no_empty_tail() {
        let windows = plan(240, now(), TimeDelta::days(120)).unwrap();
        assert_eq!(windows.len(), 2);
        assert_exact_cover(&windows, 240, TimeDelta::days(120));
    }

    #[test]
    fn single_short_window() {
        let windows = plan(1, now(), TimeDelta::days(120)).unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].span(), TimeDelta::days(1));
    }

    #[test]
    fn ordered_oldest_first() {
        let windows = plan(400, now(), TimeDelta::days(120)).unwrap();
        assert_eq!(windows.len(), 4);
        assert!(windows.windows(2).all(|p| p[0].start() < p[1].start()));
    }

    #[test]
    fn cover_property_many_inputs() {
        let spans = [
            TimeDelta::hours(7),
            TimeDelta::days(1),
            TimeDelta::days(7),
            TimeDelta::days(30),
            TimeDelta::days(120),
            TimeDelta::days(365),
        ];
        for days_back in 1..=400 {
            for span in spans {
                let windows = plan(days_back, now(), span).unwrap();
                assert_exact_cover(&windows, days_back, span);
            }
        }
    }

    #[test]
    fn non_positive_days_rejected() {
        for days_back in [0, -1, -5] {
            let err = plan(days_back, now(), TimeDelta::days(120)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidRange);
        }
    }

    #[test]
    fn zero_span_rejected() {
        let err = plan(10, now(), TimeDelta::zero()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRange);
    }

    #[test]
    fn huge_days_rejected() {
        let err = plan(i64::MAX, now(), TimeDelta::days(120)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRange);
    }

    #[test]
    fn adjacent_windows_do_not_share_a_query_instant() {
        let windows = plan(180, now(), TimeDelta::days(120)).unwrap();
        let first_end = format_timestamp(windows[0].query_end());
        let second_start = format_timestamp(windows[1].start());
        assert!(first_end < second_start, "{first_end} vs {second_start}");
        assert_eq!(
            windows[0].end() - windows[0].query_end(),
            TimeDelta::milliseconds(1)
        );
    }

    #[test]
    fn window_new_requires_order() {
        assert!(FetchWindow::new(now(), now()).is_err());
        assert!(FetchWindow::new(now(), now() - TimeDelta::days(1)).is_err());
        assert!(FetchWindow::new(now() - TimeDelta::days(1), now()).is_ok());
    }

    #[test]
    fn timestamp_format() {
        assert_eq!(format_timestamp(now()), "2024-06-30T12:34:56.000+00:00");
    }
}
