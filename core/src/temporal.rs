//! Temporal normalizer — pure date functions shared by every step.
//!
//! RULE: Every operation takes its pattern explicitly. There is no
//! implicit locale, timezone, or "current pattern" state anywhere.
//!
//! Patterns are written the way the upstream extracts declare them
//! (`yyyyMMdd`, `yy-MM-dd`, `yyyy-MM-dd`, `yyyyMM`) and compiled once into
//! a chrono format string by `DatePattern::new`.

use crate::error::{LgdError, LgdResult};
use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

// ── Patterns ───────────────────────────────────────────────────────

/// A compiled date pattern.
///
/// Numeric fields are fixed width: `parse` only accepts input that the
/// pattern would render back unchanged, so `2020111` is not a `yyyyMMdd`
/// date.
///
/// Two-digit years (`yy`) resolve into a hundred-year window. By default
/// the window is chrono's fixed pivot, 1969..=2068 (`60` → 2060). Extracts
/// written by a sliding-window parser need `with_century_start`: a window
/// starting at 1940 reads `60` as 1960 and `39` as 2039.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatePattern {
    source:         String,
    chrono_fmt:     String,
    has_day:        bool,
    two_digit_year: bool,
    century_start:  Option<i32>,
}

impl DatePattern {
    /// Compile a `yyyy`/`yy`/`MM`/`dd` pattern. Any other letter is rejected;
    /// non-letters are kept as literal separators.
    pub fn new(pattern: &str) -> LgdResult<Self> {
        let unsupported = |reason: String| LgdError::Pattern {
            pattern: pattern.to_string(),
            reason,
        };

        let chars: Vec<char> = pattern.chars().collect();
        let mut chrono_fmt = String::with_capacity(pattern.len() + 4);
        let (mut has_year, mut has_month, mut has_day) = (false, false, false);
        let mut two_digit_year = false;
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            let run = chars[i..].iter().take_while(|&&x| x == c).count();

            match (c, run) {
                ('y', 4) => { chrono_fmt.push_str("%Y"); has_year = true; }
                ('y', 2) => { chrono_fmt.push_str("%y"); has_year = true; two_digit_year = true; }
                ('M', 2) => { chrono_fmt.push_str("%m"); has_month = true; }
                ('d', 2) => { chrono_fmt.push_str("%d"); has_day = true; }
                (c, n) if c.is_ascii_alphabetic() => {
                    return Err(unsupported(format!("token '{}'", c.to_string().repeat(n))));
                }
                ('%', n) => chrono_fmt.push_str(&"%%".repeat(n)),
                (c, n) => chrono_fmt.push_str(&c.to_string().repeat(n)),
            }
            i += run;
        }

        if !has_year || !has_month {
            return Err(unsupported("pattern needs at least a year and a month".into()));
        }

        Ok(Self {
            source: pattern.to_string(),
            chrono_fmt,
            has_day,
            two_digit_year,
            century_start: None,
        })
    }

    /// Resolve two-digit years into `start..start + 100`. No effect on
    /// patterns with a four-digit year.
    pub fn with_century_start(mut self, start: i32) -> Self {
        self.century_start = Some(start);
        self
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Parse `input`. Month-only patterns resolve to the first of the month.
    pub fn parse(&self, input: &str) -> LgdResult<NaiveDate> {
        let parsed = if self.has_day {
            NaiveDate::parse_from_str(input, &self.chrono_fmt)
        } else {
            // chrono refuses to build a date without a day; pin it to 01.
            NaiveDate::parse_from_str(&format!("{input}01"), &format!("{}%d", self.chrono_fmt))
        };
        let date = parsed
            .ok()
            .and_then(|d| self.resolve_century(d))
            .ok_or_else(|| LgdError::format(input, &self.source))?;
        if self.format(date) != input {
            return Err(LgdError::format(input, &self.source));
        }
        Ok(date)
    }

    fn resolve_century(&self, date: NaiveDate) -> Option<NaiveDate> {
        match self.century_start {
            Some(start) if self.two_digit_year => {
                let year = start + (date.year() % 100 - start).rem_euclid(100);
                date.with_year(year)
            }
            _ => Some(date),
        }
    }

    pub fn format(&self, date: NaiveDate) -> String {
        date.format(&self.chrono_fmt).to_string()
    }
}

impl fmt::Display for DatePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

// ── Explicit tie-break and bound semantics ─────────────────────────

/// Which argument `least`/`greatest` return when both dates are equal.
///
/// Equal dates in one pattern render identically, so the choice only shows
/// in the cross-pattern variants, which hand back the chosen argument's
/// own text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    First,
    #[default]
    Second,
}

/// Whether the bounds of a date window belong to the window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BoundInclusivity {
    #[default]
    Inclusive,
    Exclusive,
}

/// A closed or open date interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub lower:       NaiveDate,
    pub upper:       NaiveDate,
    pub inclusivity: BoundInclusivity,
}

impl DateWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        match self.inclusivity {
            BoundInclusivity::Inclusive => self.lower <= date && date <= self.upper,
            BoundInclusivity::Exclusive => self.lower < date && date < self.upper,
        }
    }
}

// ── String operations ──────────────────────────────────────────────

pub fn parse(input: &str, pattern: &DatePattern) -> LgdResult<NaiveDate> {
    pattern.parse(input)
}

pub fn format(date: NaiveDate, pattern: &DatePattern) -> String {
    pattern.format(date)
}

/// Reformat a date string, propagating absence. Fails only when a present
/// value does not match `old`.
pub fn try_reformat(
    input: Option<&str>,
    old: &DatePattern,
    new: &DatePattern,
) -> LgdResult<Option<String>> {
    input.map(|s| old.parse(s).map(|d| new.format(d))).transpose()
}

/// Total variant of `try_reformat`: an unparsable value degrades to absent.
pub fn reformat(input: Option<&str>, old: &DatePattern, new: &DatePattern) -> Option<String> {
    match try_reformat(input, old, new) {
        Ok(out) => out,
        Err(e) => {
            log::debug!("reformat: {e}; treating as absent");
            None
        }
    }
}

pub fn compare(
    d1: &str,
    p1: &DatePattern,
    d2: &str,
    p2: &DatePattern,
) -> LgdResult<Ordering> {
    Ok(p1.parse(d1)?.cmp(&p2.parse(d2)?))
}

pub fn greater_than(d1: &str, p1: &DatePattern, d2: &str, p2: &DatePattern) -> LgdResult<bool> {
    Ok(compare(d1, p1, d2, p2)? == Ordering::Greater)
}

pub fn greater_or_equal(d1: &str, p1: &DatePattern, d2: &str, p2: &DatePattern) -> LgdResult<bool> {
    Ok(compare(d1, p1, d2, p2)? != Ordering::Less)
}

pub fn less_than(d1: &str, p1: &DatePattern, d2: &str, p2: &DatePattern) -> LgdResult<bool> {
    Ok(compare(d1, p1, d2, p2)? == Ordering::Less)
}

pub fn less_or_equal(d1: &str, p1: &DatePattern, d2: &str, p2: &DatePattern) -> LgdResult<bool> {
    Ok(compare(d1, p1, d2, p2)? != Ordering::Greater)
}

/// `lower <= date <= upper` (or strict, per `inclusivity`).
pub fn between(
    date: &str,
    pattern: &DatePattern,
    lower: &str,
    lower_pattern: &DatePattern,
    upper: &str,
    upper_pattern: &DatePattern,
    inclusivity: BoundInclusivity,
) -> LgdResult<bool> {
    let window = DateWindow {
        lower: lower_pattern.parse(lower)?,
        upper: upper_pattern.parse(upper)?,
        inclusivity,
    };
    Ok(window.contains(pattern.parse(date)?))
}

/// Earlier of two dates sharing `common`, returned in the same pattern.
pub fn least(d1: &str, d2: &str, common: &DatePattern, tie: TieBreak) -> LgdResult<String> {
    least_across(d1, common, d2, common, tie).map(str::to_string)
}

/// Later of two dates sharing `common`, returned in the same pattern.
pub fn greatest(d1: &str, d2: &str, common: &DatePattern, tie: TieBreak) -> LgdResult<String> {
    greatest_across(d1, common, d2, common, tie).map(str::to_string)
}

/// Earlier of two dates in their own patterns. Returns the chosen argument
/// as given.
pub fn least_across<'a>(
    d1: &'a str,
    p1: &DatePattern,
    d2: &'a str,
    p2: &DatePattern,
    tie: TieBreak,
) -> LgdResult<&'a str> {
    let order = p1.parse(d1)?.cmp(&p2.parse(d2)?);
    Ok(pick_text(order.reverse(), d1, d2, tie))
}

/// Later of two dates in their own patterns. Returns the chosen argument
/// as given.
pub fn greatest_across<'a>(
    d1: &'a str,
    p1: &DatePattern,
    d2: &'a str,
    p2: &DatePattern,
    tie: TieBreak,
) -> LgdResult<&'a str> {
    let order = p1.parse(d1)?.cmp(&p2.parse(d2)?);
    Ok(pick_text(order, d1, d2, tie))
}

/// `Greater` picks the first argument, `Less` the second.
fn pick_text<'a>(order: Ordering, d1: &'a str, d2: &'a str, tie: TieBreak) -> &'a str {
    match (order, tie) {
        (Ordering::Greater, _) | (Ordering::Equal, TieBreak::First) => d1,
        (Ordering::Less, _) | (Ordering::Equal, TieBreak::Second)   => d2,
    }
}

pub fn add_months(date: &str, pattern: &DatePattern, n: i32) -> LgdResult<String> {
    let parsed = pattern.parse(date)?;
    let shifted = shift_months(parsed, n).ok_or_else(|| LgdError::format(date, pattern.as_str()))?;
    Ok(pattern.format(shifted))
}

pub fn subtract_months(date: &str, pattern: &DatePattern, n: i32) -> LgdResult<String> {
    add_months(date, pattern, -n)
}

/// Absolute number of days between two dates sharing `common`.
pub fn days_between(d1: &str, d2: &str, common: &DatePattern) -> LgdResult<u64> {
    let (a, b) = (common.parse(d1)?, common.parse(d2)?);
    Ok((a - b).num_days().unsigned_abs())
}

// ── Typed operations ───────────────────────────────────────────────

pub fn least_date(a: NaiveDate, b: NaiveDate, tie: TieBreak) -> NaiveDate {
    match a.cmp(&b) {
        Ordering::Less    => a,
        Ordering::Greater => b,
        Ordering::Equal   => pick(a, b, tie),
    }
}

pub fn greatest_date(a: NaiveDate, b: NaiveDate, tie: TieBreak) -> NaiveDate {
    match a.cmp(&b) {
        Ordering::Greater => a,
        Ordering::Less    => b,
        Ordering::Equal   => pick(a, b, tie),
    }
}

fn pick(a: NaiveDate, b: NaiveDate, tie: TieBreak) -> NaiveDate {
    match tie {
        TieBreak::First  => a,
        TieBreak::Second => b,
    }
}

/// Calendar-month shift; the day is clamped to the end of the target month.
pub fn shift_months(date: NaiveDate, n: i32) -> Option<NaiveDate> {
    if n >= 0 {
        date.checked_add_months(Months::new(n.unsigned_abs()))
    } else {
        date.checked_sub_months(Months::new(n.unsigned_abs()))
    }
}

/// `yyyyMM` truncation used to bucket dates by month.
pub fn month_prefix(date: NaiveDate) -> String {
    format!("{:04}{:02}", date.year(), date.month())
}
