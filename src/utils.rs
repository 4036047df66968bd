use time::{Date, Duration, OffsetDateTime};

use crate::categories::find_category;
use crate::constants::{ERR_UNKNOWN_CATEGORY, MAX_CATEGORY_NAME_LENGTH};
use crate::error::{ExpenseError, Result};

const NANOS_PER_MILLI: i128 = 1_000_000;

pub fn validate_string_length(value: &str, field_name: &str, max_length: usize) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ExpenseError::validation(format!(
            "{} cannot be empty",
            field_name
        )));
    }
    if value.chars().count() > max_length {
        return Err(ExpenseError::validation(format!(
            "{} must be less than {} characters",
            field_name, max_length
        )));
    }
    Ok(())
}

pub fn validate_optional_length(
    value: Option<&str>,
    field_name: &str,
    max_length: usize,
) -> Result<()> {
    match value {
        Some(v) if v.chars().count() > max_length => Err(ExpenseError::validation(format!(
            "{} must be less than {} characters",
            field_name, max_length
        ))),
        _ => Ok(()),
    }
}

/// Categories are free text in storage, but new writes must reference a known one.
pub fn validate_category(category: &str) -> Result<()> {
    validate_string_length(category, "Category", MAX_CATEGORY_NAME_LENGTH)?;
    if find_category(category).is_none() {
        return Err(ExpenseError::validation(ERR_UNKNOWN_CATEGORY));
    }
    Ok(())
}

pub fn validate_amount(amount: f64) -> Result<()> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(ExpenseError::validation(
            "Amount must be a positive number",
        ));
    }
    Ok(())
}

pub fn datetime_to_millis(value: OffsetDateTime) -> i64 {
    (value.unix_timestamp_nanos() / NANOS_PER_MILLI) as i64
}

pub fn millis_to_datetime(millis: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(millis as i128 * NANOS_PER_MILLI).ok()
}

/// Current time truncated to the millisecond precision the record service stores.
pub fn now_millis() -> i64 {
    datetime_to_millis(OffsetDateTime::now_utc())
}

/// Calendar dates are stored as UTC midnight so they compare equal after a round trip.
pub fn date_to_millis(date: Date) -> i64 {
    datetime_to_millis(date.midnight().assume_utc())
}

pub fn millis_to_date(millis: i64) -> Option<Date> {
    millis_to_datetime(millis).map(|value| value.date())
}

/// First instant after `date`, used as an exclusive upper bound.
pub fn end_of_day_millis(date: Date) -> Option<i64> {
    date.checked_add(Duration::days(1)).map(date_to_millis)
}

pub fn today_utc() -> Date {
    OffsetDateTime::now_utc().date()
}
