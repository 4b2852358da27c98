//! ru-RU number formatting for the ticker table.
//!
//! Matches what browsers produce for the `ru-RU` locale: no-break space
//! as the group separator (only for five or more integer digits), comma
//! as the decimal separator and a trailing `₽` for currency.

use chrono::{DateTime, TimeZone};
use std::fmt::Display;

const NBSP: char = '\u{a0}';

/// Anything the table may be asked to show. Values that are not a finite
/// number read as zero so `NaN` never reaches the display.
pub trait ToAmount {
    fn to_amount(&self) -> f64;
}

impl ToAmount for f64 {
    fn to_amount(&self) -> f64 {
        if self.is_finite() { *self } else { 0.0 }
    }
}

impl ToAmount for &str {
    fn to_amount(&self) -> f64 {
        self.trim().parse::<f64>().map_or(0.0, |v| v.to_amount())
    }
}

impl ToAmount for String {
    fn to_amount(&self) -> f64 {
        self.as_str().to_amount()
    }
}

pub fn format_rub(value: impl ToAmount) -> String {
    format!("{}{NBSP}₽", localized(value.to_amount(), 2, 2))
}

pub fn format_volume(value: impl ToAmount) -> String {
    localized(value.to_amount(), 4, 8)
}

/// Currency string with an explicit `+` for gains.
pub fn format_change(value: impl ToAmount) -> String {
    let value = value.to_amount();
    let formatted = format_rub(value);

    if value > 0.0 {
        format!("+{formatted}")
    } else {
        formatted
    }
}

pub fn format_timestamp<Tz>(at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    at.format("%d.%m.%Y, %H:%M:%S").to_string()
}

fn localized(value: f64, min_fraction: usize, max_fraction: usize) -> String {
    let fixed = format!("{:.*}", max_fraction, value.abs());
    let (int_part, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));

    let keep = fraction.trim_end_matches('0').len().max(min_fraction);
    let fraction = &fraction[..keep.min(fraction.len())];

    // Rounded to zero: print "0,00", never "-0,00"
    let negative = value < 0.0 && fixed.bytes().any(|b| matches!(b, b'1'..=b'9'));

    let mut out = String::with_capacity(fixed.len() + 8);
    if negative {
        out.push('-');
    }
    out.push_str(&group_thousands(int_part));
    if !fraction.is_empty() {
        out.push(',');
        out.push_str(fraction);
    }
    out
}

fn group_thousands(digits: &str) -> String {
    if digits.len() < 5 {
        return digits.to_string();
    }

    let mut out = String::with_capacity(digits.len() * 2);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(NBSP);
        }
        out.push(ch);
    }
    out
}
