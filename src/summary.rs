use serde::Serialize;
use std::collections::BTreeMap;
use time::{Date, Duration, Month};

use crate::models::Expense;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Day,
    Week,
    Month,
    Year,
}

impl Period {
    /// Inclusive first and last day of the period containing `today`.
    /// Weeks start on Monday.
    pub fn bounds(self, today: Date) -> Option<(Date, Date)> {
        match self {
            Period::Day => Some((today, today)),
            Period::Week => {
                let offset = i64::from(today.weekday().number_days_from_monday());
                let start = today.checked_sub(Duration::days(offset))?;
                let end = start.checked_add(Duration::days(6))?;
                Some((start, end))
            }
            Period::Month => {
                let start = today.replace_day(1).ok()?;
                let (year, month) = match today.month() {
                    Month::December => (today.year() + 1, Month::January),
                    month => (today.year(), month.next()),
                };
                let end = Date::from_calendar_date(year, month, 1).ok()?.previous_day()?;
                Some((start, end))
            }
            Period::Year => {
                let start = Date::from_calendar_date(today.year(), Month::January, 1).ok()?;
                let end = Date::from_calendar_date(today.year(), Month::December, 31).ok()?;
                Some((start, end))
            }
        }
    }
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct Summary {
    pub total: f64,
    pub by_category: BTreeMap<String, f64>,
}

impl Summary {
    fn add(&mut self, expense: &Expense) {
        self.total += expense.amount;
        *self
            .by_category
            .entry(expense.category.clone())
            .or_insert(0.0) += expense.amount;
    }
}

fn in_period<'a>(
    expenses: &'a [Expense],
    period: Period,
    today: Date,
) -> impl Iterator<Item = &'a Expense> {
    let bounds = period.bounds(today);
    expenses.iter().filter(move |expense| {
        bounds.is_some_and(|(start, end)| expense.date >= start && expense.date <= end)
    })
}

/// Total and per-category subtotals of the expenses dated inside the period. Single pass.
pub fn summarize(expenses: &[Expense], period: Period, today: Date) -> Summary {
    let mut summary = Summary::default();
    for expense in in_period(expenses, period, today) {
        summary.add(expense);
    }
    summary
}

/// Same window as [`summarize`], grouped by account label first.
pub fn summarize_by_account(
    expenses: &[Expense],
    period: Period,
    today: Date,
) -> BTreeMap<String, Summary> {
    let mut totals: BTreeMap<String, Summary> = BTreeMap::new();
    for expense in in_period(expenses, period, today) {
        totals
            .entry(expense.account.clone())
            .or_default()
            .add(expense);
    }
    totals
}
