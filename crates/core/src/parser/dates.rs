//! Date tokens as they appear in announcement letters.

use chrono::NaiveDate;
use regex::{Captures, Regex};

pub(crate) const DATE_TOKEN_PATTERN: &str = r"(?i)\b(?:(?P<day>\d{1,2})\s+(?P<month>[a-z]+)\.?\s+(?P<year>\d{4})|(?P<iso_year>\d{4})-(?P<iso_month>\d{1,2})-(?P<iso_day>\d{1,2})|(?P<num_day>\d{1,2})[/-](?P<num_month>\d{1,2})[/-](?P<num_year>\d{4}))\b";

/// Indonesian and English month names with the abbreviations the
/// publisher uses.
pub fn month_number(name: &str) -> Option<u32> {
    let month = match name.to_lowercase().as_str() {
        "januari" | "january" | "jan" => 1,
        "februari" | "pebruari" | "february" | "feb" | "peb" => 2,
        "maret" | "march" | "mar" => 3,
        "april" | "apr" => 4,
        "mei" | "may" => 5,
        "juni" | "june" | "jun" => 6,
        "juli" | "july" | "jul" => 7,
        "agustus" | "august" | "agu" | "agt" | "aug" => 8,
        "september" | "sep" | "sept" => 9,
        "oktober" | "october" | "okt" | "oct" => 10,
        "november" | "nov" => 11,
        "desember" | "december" | "des" | "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn number<T: std::str::FromStr>(captures: &Captures<'_>, name: &str) -> Option<T> {
    captures.name(name)?.as_str().parse().ok()
}

/// Calendar date from one match of [`DATE_TOKEN_PATTERN`]; `None` when the
/// token names no real day.
pub(crate) fn date_from_captures(captures: &Captures<'_>) -> Option<NaiveDate> {
    if let Some(month) = captures.name("month") {
        let month = month_number(month.as_str())?;
        return NaiveDate::from_ymd_opt(number(captures, "year")?, month, number(captures, "day")?);
    }
    if captures.name("iso_year").is_some() {
        return NaiveDate::from_ymd_opt(
            number(captures, "iso_year")?,
            number(captures, "iso_month")?,
            number(captures, "iso_day")?,
        );
    }
    NaiveDate::from_ymd_opt(
        number(captures, "num_year")?,
        number(captures, "num_month")?,
        number(captures, "num_day")?,
    )
}

/// Scans date tokens in a text.
pub struct DateScanner {
    token: Regex,
}

impl DateScanner {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            token: Regex::new(DATE_TOKEN_PATTERN)?,
        })
    }

    /// First token in `text` that is a real date, with its byte range.
    pub fn first(&self, text: &str) -> Option<(NaiveDate, std::ops::Range<usize>)> {
        self.token.captures_iter(text).find_map(|captures| {
            let range = captures.get(0)?.range();
            date_from_captures(&captures).map(|date| (date, range))
        })
    }

    pub fn parse(&self, text: &str) -> Option<NaiveDate> {
        self.first(text).map(|(date, _)| date)
    }
}
