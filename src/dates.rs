use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, UtcOffset};

/// Calendar day of `ts` as seen from the board's offset.
pub fn day_of(ts: OffsetDateTime, offset: UtcOffset) -> Date {
    ts.to_offset(offset).date()
}

pub fn today(offset: UtcOffset) -> Date {
    day_of(OffsetDateTime::now_utc(), offset)
}

/// Canonical `YYYY-MM-DD` group key.
pub fn day_key(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

pub fn day_key_of(ts: OffsetDateTime, offset: UtcOffset) -> String {
    day_key(day_of(ts, offset))
}

pub fn parse_day_key(raw: &str) -> Result<Date, time::error::Parse> {
    Date::parse(raw.trim(), format_description!("[year]-[month]-[day]"))
}

/// Human label for a tab, relative to `today`.
pub fn group_title(date: Date, today: Date) -> String {
    let long = date
        .format(format_description!(
            "[month repr:long] [day padding:none], [year], [weekday repr:long]"
        ))
        .unwrap_or_else(|_| day_key(date));
    if date == today {
        format!("Today - {long}")
    } else if Some(date) == today.previous_day() {
        format!("Yesterday - {long}")
    } else {
        long
    }
}

/// Places `now`'s wall-clock time on `date`, so a timestamp created "now" for
/// a past tab still groups under that tab.
pub fn at_day(date: Date, now: OffsetDateTime, offset: UtcOffset) -> OffsetDateTime {
    let local = now.to_offset(offset);
    date.with_time(local.time())
        .assume_offset(offset)
        .to_offset(UtcOffset::UTC)
}

pub fn is_future_day(date: Date, now: OffsetDateTime, offset: UtcOffset) -> bool {
    date > day_of(now, offset)
}

pub fn format_timestamp(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339)
        .unwrap_or_else(|_| ts.unix_timestamp().to_string())
}

pub fn parse_timestamp(raw: &str) -> Result<OffsetDateTime, time::error::Parse> {
    OffsetDateTime::parse(raw.trim(), &Rfc3339)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    #[test]
    fn day_key_is_zero_padded() {
        assert_eq!(day_key(date!(2024 - 05 - 02)), "2024-05-02");
        assert_eq!(parse_day_key("2024-05-02").ok(), Some(date!(2024 - 05 - 02)));
        assert!(parse_day_key("2024-13-02").is_err());
    }

    #[test]
    fn titles_are_relative_to_today() {
        let today = date!(2024 - 05 - 20);
        assert_eq!(
            group_title(today, today),
            "Today - May 20, 2024, Monday"
        );
        assert_eq!(
            group_title(date!(2024 - 05 - 19), today),
            "Yesterday - May 19, 2024, Sunday"
        );
        assert_eq!(
            group_title(date!(2024 - 05 - 01), today),
            "May 1, 2024, Wednesday"
        );
    }

    #[test]
    fn grouping_day_follows_board_offset() {
        let ts = datetime!(2024-05-20 22:30 UTC);
        assert_eq!(day_key_of(ts, UtcOffset::UTC), "2024-05-20");
        let ist = UtcOffset::from_hms(5, 30, 0).expect("valid offset");
        assert_eq!(day_key_of(ts, ist), "2024-05-21");
    }

    #[test]
    fn at_day_keeps_time_of_day_on_target_date() {
        let now = datetime!(2024-05-20 10:15 UTC);
        let moved = at_day(date!(2024 - 05 - 18), now, UtcOffset::UTC);
        assert_eq!(moved, datetime!(2024-05-18 10:15 UTC));
        assert_eq!(day_key_of(moved, UtcOffset::UTC), "2024-05-18");
    }

    #[test]
    fn future_day_detection() {
        let now = datetime!(2024-05-20 23:59 UTC);
        assert!(!is_future_day(date!(2024 - 05 - 20), now, UtcOffset::UTC));
        assert!(is_future_day(date!(2024 - 05 - 21), now, UtcOffset::UTC));
    }
}
