use chrono::{Datelike, Days, Local, TimeZone, Weekday};

/// Timestamp of the next Sunday 23:59:59 in local time strictly after
/// `now_ts`. Packs written at any moment of a week all expire together at
/// the end of that week.
pub fn next_sunday_expiry(now_ts: f64) -> f64 {
    let now = Local
        .timestamp_opt(now_ts.floor() as i64, 0)
        .earliest()
        .unwrap_or_else(Local::now);

    let days_ahead =
        (Weekday::Sun.num_days_from_monday() + 7 - now.weekday().num_days_from_monday()) % 7;
    let mut candidate = now.date_naive() + Days::new(u64::from(days_ahead));

    // Steps a week at a time until the local datetime both exists (DST gaps)
    // and lies strictly in the future.
    loop {
        if let Some(expiry) = candidate
            .and_hms_opt(23, 59, 59)
            .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        {
            let ts = expiry.timestamp() as f64;
            if ts > now_ts {
                return ts;
            }
        }
        candidate = candidate + Days::new(7);
    }
}

#[cfg(test)]
mod tests {
    use chrono::Timelike;

    use super::*;

    const WEEK_SECONDS: f64 = 7.0 * 86_400.0;

    fn assert_is_sunday_end_of_day(ts: f64) {
        let dt = Local.timestamp_opt(ts as i64, 0).earliest().unwrap();
        assert_eq!(dt.weekday(), Weekday::Sun);
        assert_eq!((dt.hour(), dt.minute(), dt.second()), (23, 59, 59));
    }

    #[test]
    fn expiry_is_a_strictly_future_sunday() {
        for ts in [
            0.0,
            951_868_800.0,
            1_600_000_000.0,
            1_700_000_000.25,
            weekpack_core::now_ts(),
        ] {
            let expiry = next_sunday_expiry(ts);
            assert!(expiry > ts);
            assert_is_sunday_end_of_day(expiry);
            // Never further out than one week plus DST slack.
            assert!(expiry - ts <= WEEK_SECONDS + 7_200.0);
        }
    }

    #[test]
    fn expiry_of_an_expiry_is_the_following_week() {
        let first = next_sunday_expiry(1_700_000_000.0);
        let second = next_sunday_expiry(first);
        assert!(second > first);
        assert_is_sunday_end_of_day(second);
        let delta = second - first;
        assert!(delta >= WEEK_SECONDS - 7_200.0 && delta <= WEEK_SECONDS + 7_200.0);
    }

    #[test]
    fn late_sunday_rolls_to_next_week() {
        // One second before an expiry boundary still expires at that boundary;
        // the boundary itself rolls over.
        let boundary = next_sunday_expiry(1_700_000_000.0);
        assert_eq!(next_sunday_expiry(boundary - 1.0), boundary);
        assert!(next_sunday_expiry(boundary) > boundary);
    }
}
