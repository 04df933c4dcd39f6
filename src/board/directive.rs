//! Deadline directive parsing from issue titles.
//!
//! A directive is a bracketed token in the title. Seven grammars are tried
//! in a fixed order and the first one that matches anywhere in the title
//! wins:
//!
//! | # | Token          | Resolves to                                  |
//! |---|----------------|----------------------------------------------|
//! | 1 | `<DD>`         | day DD of the reference month                |
//! | 2 | `<MM-DD>`      | month MM, day DD of the reference year       |
//! | 3 | `<YYYY-MM-DD>` | the explicit date                            |
//! | 4 | `<zN>`         | weekday N (1 = Monday) of the reference week |
//! | 5 | `<xzN>`        | weekday N of the following week              |
//! | 6 | `<周X>`        | as 4, with a Chinese weekday glyph           |
//! | 7 | `<下周X>`      | as 5, with a Chinese weekday glyph           |
//!
//! All dates are calendar days in Asia/Shanghai.

use std::sync::LazyLock;

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc,
};
use regex::{Captures, Regex};

use crate::errors::DirectiveError;

/// Asia/Shanghai has had a fixed +08:00 offset with no DST since 1991.
const DEADLINE_UTC_OFFSET_SECS: i32 = 8 * 3600;

/// The zone every deadline date is anchored in.
pub fn deadline_zone() -> FixedOffset {
    FixedOffset::east_opt(DEADLINE_UTC_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

type Resolver = fn(&Captures<'_>, NaiveDate) -> Result<NaiveDate, DirectiveError>;

struct Grammar {
    regex: Regex,
    resolve: Resolver,
}

fn grammar(pattern: &str, resolve: Resolver) -> Grammar {
    Grammar {
        regex: Regex::new(pattern).unwrap(),
        resolve,
    }
}

// Order is load-bearing: a title can match more than one grammar.
static GRAMMARS: LazyLock<[Grammar; 7]> = LazyLock::new(|| {
    [
        grammar(r"<([0-9]+)>", resolve_day),
        grammar(r"<([0-9]+)-([0-9]+)>", resolve_month_day),
        grammar(r"<([0-9]+)-([0-9]+)-([0-9]+)>", resolve_full_date),
        grammar(r"<z([0-9])>", resolve_this_week),
        grammar(r"<xz([0-9])>", resolve_next_week),
        grammar(r"<周([一二三四五六日])>", resolve_this_week_cn),
        grammar(r"<下周([一二三四五六日])>", resolve_next_week_cn),
    ]
});

/// A resolved deadline and the exact token that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deadline {
    pub date: NaiveDate,
    pub directive: String,
}

/// Find the deadline directive in `title`, resolving relative forms against
/// `now`.
pub fn parse_deadline<Tz: TimeZone>(
    now: &DateTime<Tz>,
    title: &str,
) -> Result<Deadline, DirectiveError> {
    let today = now.with_timezone(&deadline_zone()).date_naive();

    for grammar in GRAMMARS.iter() {
        if let Some(caps) = grammar.regex.captures(title) {
            let date = (grammar.resolve)(&caps, today)?;
            return Ok(Deadline {
                date,
                directive: caps[0].to_string(),
            });
        }
    }

    Err(DirectiveError::NoDirectiveFound)
}

/// Whether the one-day grace period after `date` has elapsed at `now`.
///
/// A deadline on day D is passed once `now` is strictly later than D+1 00:00.
pub fn is_deadline_passed<Tz: TimeZone>(date: NaiveDate, now: &DateTime<Tz>) -> bool {
    let Some(grace_end) = date
        .succ_opt()
        .and_then(|next| next.and_time(NaiveTime::MIN).and_local_timezone(deadline_zone()).single())
    else {
        return false;
    };
    now.with_timezone(&Utc) > grace_end.with_timezone(&Utc)
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// The date of ISO weekday `weekday` (1 = Monday, 7 = Sunday) in the week
/// containing `date`.
pub fn date_in_week(date: NaiveDate, weekday: u32) -> NaiveDate {
    let current = date.weekday().number_from_monday();
    date + Duration::days(i64::from(weekday) - i64::from(current))
}

// ── Resolvers ─────────────────────────────────────────────────────────

fn resolve_day(caps: &Captures<'_>, today: NaiveDate) -> Result<NaiveDate, DirectiveError> {
    let day = number(caps, 1)?;
    calendar_date(caps, today.year(), today.month(), day)
}

fn resolve_month_day(caps: &Captures<'_>, today: NaiveDate) -> Result<NaiveDate, DirectiveError> {
    let month = parse_month(caps, 1)?;
    let day = number(caps, 2)?;
    calendar_date(caps, today.year(), month, day)
}

fn resolve_full_date(caps: &Captures<'_>, _today: NaiveDate) -> Result<NaiveDate, DirectiveError> {
    let year = number(caps, 1)?;
    let month = parse_month(caps, 2)?;
    let day = number(caps, 3)?;
    calendar_date(caps, year, month, day)
}

fn resolve_this_week(caps: &Captures<'_>, today: NaiveDate) -> Result<NaiveDate, DirectiveError> {
    Ok(date_in_week(today, parse_weekday(caps, 1)?))
}

fn resolve_next_week(caps: &Captures<'_>, today: NaiveDate) -> Result<NaiveDate, DirectiveError> {
    Ok(date_in_week(today, parse_weekday(caps, 1)?) + Duration::days(7))
}

fn resolve_this_week_cn(caps: &Captures<'_>, today: NaiveDate) -> Result<NaiveDate, DirectiveError> {
    Ok(date_in_week(today, chinese_weekday(caps, 1)?))
}

fn resolve_next_week_cn(caps: &Captures<'_>, today: NaiveDate) -> Result<NaiveDate, DirectiveError> {
    Ok(date_in_week(today, chinese_weekday(caps, 1)?) + Duration::days(7))
}

// ── Helpers ───────────────────────────────────────────────────────────

fn invalid(caps: &Captures<'_>, message: &str) -> DirectiveError {
    DirectiveError::InvalidDirective {
        directive: caps[0].to_string(),
        message: message.to_string(),
    }
}

fn number<T: std::str::FromStr>(caps: &Captures<'_>, idx: usize) -> Result<T, DirectiveError> {
    caps[idx]
        .parse()
        .map_err(|_| invalid(caps, "numeric component out of range"))
}

fn parse_month(caps: &Captures<'_>, idx: usize) -> Result<u32, DirectiveError> {
    let month: u32 = number(caps, idx)?;
    if !(1..=12).contains(&month) {
        return Err(DirectiveError::InvalidMonth {
            directive: caps[0].to_string(),
            month,
        });
    }
    Ok(month)
}

fn parse_weekday(caps: &Captures<'_>, idx: usize) -> Result<u32, DirectiveError> {
    let n: u32 = number(caps, idx)?;
    if !(1..=7).contains(&n) {
        return Err(invalid(caps, "weekday must be between 1 and 7"));
    }
    Ok(n)
}

fn chinese_weekday(caps: &Captures<'_>, idx: usize) -> Result<u32, DirectiveError> {
    match &caps[idx] {
        "一" => Ok(1),
        "二" => Ok(2),
        "三" => Ok(3),
        "四" => Ok(4),
        "五" => Ok(5),
        "六" => Ok(6),
        "日" => Ok(7),
        _ => Err(invalid(caps, "unknown weekday")),
    }
}

/// Build a date the way calendar arithmetic does: a day past the end of the
/// month rolls into the next month, day 0 is the last day of the previous one.
fn calendar_date(
    caps: &Captures<'_>,
    year: i32,
    month: u32,
    day: u32,
) -> Result<NaiveDate, DirectiveError> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.checked_add_signed(Duration::days(i64::from(day) - 1)))
        .ok_or_else(|| invalid(caps, "date out of range"))
}
