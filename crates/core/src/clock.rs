//! Wall-clock access and the organization's civil calendar.
//!
//! Every date-bound decision (past dates, the advance window, reporting periods)
//! is made on civil dates in one fixed offset, never on raw instants.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};

pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to one instant.
#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkingHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl WorkingHours {
    /// `09:00-18:00`
    pub fn label(&self) -> String {
        format!("{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrgTimeZone {
    name: String,
    offset: FixedOffset,
}

impl OrgTimeZone {
    pub fn new(name: impl Into<String>, offset: FixedOffset) -> Self {
        Self { name: name.into(), offset }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Human label such as `Asia/Kolkata (UTC+05:30)`.
    pub fn label(&self) -> String {
        format!("{} (UTC{})", self.name, self.offset)
    }

    pub fn now(&self, clock: &dyn Clock) -> DateTime<FixedOffset> {
        self.to_local(clock.now_utc())
    }

    pub fn to_local<Tz: TimeZone>(&self, instant: DateTime<Tz>) -> DateTime<FixedOffset> {
        instant.with_timezone(&self.offset)
    }

    pub fn civil_date<Tz: TimeZone>(&self, instant: &DateTime<Tz>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }

    pub fn today(&self, clock: &dyn Clock) -> NaiveDate {
        self.civil_date(&clock.now_utc())
    }

    pub fn at(&self, date: NaiveDate, time: NaiveTime) -> DateTime<FixedOffset> {
        let local = date.and_time(time);
        let utc = local - Duration::seconds(i64::from(self.offset.local_minus_utc()));
        self.offset.from_utc_datetime(&utc)
    }

    pub fn start_of_day(&self, date: NaiveDate) -> DateTime<FixedOffset> {
        self.at(date, NaiveTime::MIN)
    }

    /// Half-open instant range `[start 00:00, end+1 00:00)` covering both civil
    /// dates inclusively.
    pub fn inclusive_range(&self, start: NaiveDate, end: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let lower = self.start_of_day(start).with_timezone(&Utc);
        let upper = self.start_of_day(end + Duration::days(1)).with_timezone(&Utc);
        (lower, upper)
    }

    /// First and last civil dates of the calendar month before `today`.
    pub fn previous_month(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let first_of_this_month = today - Duration::days(i64::from(today.day0()));
        let last_of_previous = first_of_this_month - Duration::days(1);
        let first_of_previous = last_of_previous - Duration::days(i64::from(last_of_previous.day0()));
        (first_of_previous, last_of_previous)
    }
}

/// Parses `+05:30`, `-04:00`, `+0530` or `Z`.
pub fn parse_utc_offset(raw: &str) -> Option<FixedOffset> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }

    let (sign, rest) = match raw.as_bytes().first()? {
        b'+' => (1, &raw[1..]),
        b'-' => (-1, &raw[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|ch| *ch != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }

    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    if hours > 14 || minutes > 59 {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};

    use super::{parse_utc_offset, Clock, FixedClock, OrgTimeZone};

    fn kolkata() -> OrgTimeZone {
        OrgTimeZone::new("Asia/Kolkata", parse_utc_offset("+05:30").expect("valid offset"))
    }

    #[test]
    fn civil_date_rolls_over_at_local_midnight() {
        let zone = kolkata();
        // 19:00 UTC is 00:30 the next day in Kolkata.
        let instant = Utc.with_ymd_and_hms(2024, 3, 10, 19, 0, 0).unwrap();

        assert_eq!(zone.civil_date(&instant), NaiveDate::from_ymd_opt(2024, 3, 11).unwrap());
    }

    #[test]
    fn today_follows_the_clock_in_local_time() {
        let zone = kolkata();
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 3, 10, 18, 29, 59).unwrap());

        assert_eq!(zone.today(&clock), NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
        assert_eq!(zone.now(&clock).to_rfc3339(), "2024-03-10T23:59:59+05:30");
        assert_eq!(clock.now_utc().to_rfc3339(), "2024-03-10T18:29:59+00:00");
    }

    #[test]
    fn start_of_day_is_local_midnight() {
        let zone = kolkata();
        let start = zone.start_of_day(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());

        assert_eq!(start.to_rfc3339(), "2024-03-01T00:00:00+05:30");
        assert_eq!(start.with_timezone(&Utc).to_rfc3339(), "2024-02-29T18:30:00+00:00");
    }

    #[test]
    fn inclusive_range_covers_the_whole_last_day() {
        let zone = kolkata();
        let (lower, upper) = zone.inclusive_range(
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        );

        assert_eq!(lower.to_rfc3339(), "2024-02-29T18:30:00+00:00");
        assert_eq!(upper.to_rfc3339(), "2024-03-31T18:30:00+00:00");
    }

    #[test]
    fn previous_month_handles_year_boundary_and_leap_years() {
        let zone = kolkata();

        assert_eq!(
            zone.previous_month(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()),
            (
                NaiveDate::from_ymd_opt(2023, 12, 1).unwrap(),
                NaiveDate::from_ymd_opt(2023, 12, 31).unwrap()
            )
        );
        assert_eq!(
            zone.previous_month(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()),
            (
                NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
            )
        );
    }

    #[test]
    fn at_combines_date_and_time_in_the_zone() {
        let zone = kolkata();
        let instant = zone.at(
            NaiveDate::from_ymd_opt(2024, 3, 11).unwrap(),
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        );

        assert_eq!(instant.to_rfc3339(), "2024-03-11T09:00:00+05:30");
    }

    #[test]
    fn offset_parsing_accepts_common_shapes() {
        assert_eq!(parse_utc_offset("+05:30").map(|o| o.local_minus_utc()), Some(19_800));
        assert_eq!(parse_utc_offset("+0530").map(|o| o.local_minus_utc()), Some(19_800));
        assert_eq!(parse_utc_offset("-04:00").map(|o| o.local_minus_utc()), Some(-14_400));
        assert_eq!(parse_utc_offset("Z").map(|o| o.local_minus_utc()), Some(0));
        assert!(parse_utc_offset("IST").is_none());
        assert!(parse_utc_offset("+25:00").is_none());
    }
}
