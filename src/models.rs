use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::{Date, OffsetDateTime};

use crate::constants::*;
use crate::error::{ExpenseError, Result};
use crate::utils::{
    validate_amount, validate_category, validate_optional_length, validate_string_length,
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Expense {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub amount: f64,
    pub category: String,
    pub date: Date,
    pub account: String,
    pub description: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Caller-supplied payload for a new expense. Carries no id, owner or
/// timestamps; those are stamped by the repository, which also fills in its
/// configured default account when `account` is absent.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ExpenseDraft {
    pub title: String,
    pub amount: f64,
    pub category: String,
    pub date: Date,
    pub account: Option<String>,
    pub description: Option<String>,
}

impl ExpenseDraft {
    pub fn new(
        title: impl Into<String>,
        amount: f64,
        category: impl Into<String>,
        date: Date,
    ) -> Self {
        ExpenseDraft {
            title: title.into().trim().to_string(),
            amount,
            category: category.into().trim().to_string(),
            date,
            account: None,
            description: None,
        }
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        let account = account.into();
        let account = account.trim();
        self.account = (!account.is_empty()).then(|| account.to_string());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        let description = description.trim();
        self.description = (!description.is_empty()).then(|| description.to_string());
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_string_length(&self.title, "Title", MAX_TITLE_LENGTH)?;
        validate_amount(self.amount)?;
        validate_category(&self.category)?;
        if let Some(account) = &self.account {
            validate_string_length(account, "Account", MAX_ACCOUNT_LENGTH)?;
        }
        validate_optional_length(
            self.description.as_deref(),
            "Description",
            MAX_DESCRIPTION_LENGTH,
        )
    }
}

/// Partial update. Absent fields keep their stored value; `description`
/// is doubly optional so a patch can clear it.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ExpensePatch {
    pub title: Option<String>,
    pub amount: Option<f64>,
    pub category: Option<String>,
    pub date: Option<Date>,
    pub account: Option<String>,
    pub description: Option<Option<String>>,
}

impl ExpensePatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.amount.is_none()
            && self.category.is_none()
            && self.date.is_none()
            && self.account.is_none()
            && self.description.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(ExpenseError::validation(ERR_EMPTY_PATCH));
        }
        if let Some(title) = &self.title {
            validate_string_length(title, "Title", MAX_TITLE_LENGTH)?;
        }
        if let Some(amount) = self.amount {
            validate_amount(amount)?;
        }
        if let Some(category) = &self.category {
            validate_category(category)?;
        }
        if let Some(account) = &self.account {
            validate_string_length(account, "Account", MAX_ACCOUNT_LENGTH)?;
        }
        if let Some(description) = &self.description {
            validate_optional_length(description.as_deref(), "Description", MAX_DESCRIPTION_LENGTH)?;
        }
        Ok(())
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Category {
    pub id: &'static str,
    pub name: &'static str,
    pub icon: Option<&'static str>,
    pub color: Option<&'static str>,
}

/// Ephemeral query narrowing. Both date bounds are inclusive.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
    pub category: Option<String>,
}

impl Filter {
    pub fn category(category: impl Into<String>) -> Self {
        Filter {
            category: Some(category.into()),
            ..Filter::default()
        }
    }

    pub fn between(start_date: Date, end_date: Date) -> Self {
        Filter {
            start_date: Some(start_date),
            end_date: Some(end_date),
            category: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start_date.is_none() && self.end_date.is_none() && self.category.is_none()
    }

    /// Overrides the fields present in `partial`. Absent fields are kept;
    /// use [`Filter::apply`] to clear one.
    pub fn merge(&mut self, partial: Filter) {
        self.apply(partial.into());
    }

    pub fn apply(&mut self, patch: FilterPatch) {
        if let Some(start_date) = patch.start_date {
            self.start_date = start_date;
        }
        if let Some(end_date) = patch.end_date {
            self.end_date = end_date;
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
    }

    pub fn reset(&mut self) {
        *self = Filter::default();
    }
}

/// Field-wise change to a [`Filter`]: `None` keeps a field, `Some(None)`
/// clears it.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterPatch {
    pub start_date: Option<Option<Date>>,
    pub end_date: Option<Option<Date>>,
    pub category: Option<Option<String>>,
}

impl FilterPatch {
    pub fn clear_category(mut self) -> Self {
        self.category = Some(None);
        self
    }

    pub fn clear_dates(mut self) -> Self {
        self.start_date = Some(None);
        self.end_date = Some(None);
        self
    }
}

impl From<Filter> for FilterPatch {
    fn from(filter: Filter) -> Self {
        FilterPatch {
            start_date: filter.start_date.map(Some),
            end_date: filter.end_date.map(Some),
            category: filter.category.map(Some),
        }
    }
}

/// A money account the owner tracks expenses against.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Account {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub currency: Currency,
    pub balance: f64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AccountDraft {
    pub name: String,
    pub currency: Currency,
    pub balance: f64,
}

impl AccountDraft {
    pub fn new(name: impl Into<String>, currency: Currency) -> Self {
        AccountDraft {
            name: name.into().trim().to_string(),
            currency,
            balance: 0.0,
        }
    }

    pub fn with_balance(mut self, balance: f64) -> Self {
        self.balance = balance;
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_string_length(&self.name, "Account name", MAX_ACCOUNT_NAME_LENGTH)?;
        validate_balance(self.balance)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct AccountPatch {
    pub name: Option<String>,
    pub currency: Option<Currency>,
    pub balance: Option<f64>,
}

impl AccountPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.currency.is_none() && self.balance.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(ExpenseError::validation(ERR_EMPTY_PATCH));
        }
        if let Some(name) = &self.name {
            validate_string_length(name, "Account name", MAX_ACCOUNT_NAME_LENGTH)?;
        }
        if let Some(balance) = self.balance {
            validate_balance(balance)?;
        }
        Ok(())
    }
}

// Balances may be negative (overdraft) but must be a real number
fn validate_balance(balance: f64) -> Result<()> {
    if !balance.is_finite() {
        return Err(ExpenseError::validation("Balance must be a number"));
    }
    Ok(())
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Currency {
    Usd,
    Uah,
    Eur,
}

impl Currency {
    pub fn as_str(self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Uah => "UAH",
            Currency::Eur => "EUR",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = ExpenseError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Currency::Usd),
            "UAH" => Ok(Currency::Uah),
            "EUR" => Ok(Currency::Eur),
            other => Err(ExpenseError::validation(format!("Unknown currency: {}", other))),
        }
    }
}
