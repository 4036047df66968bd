//! Translation between [`Expense`] values and record-service documents.
//!
//! Every operation is scoped to an owner id. Documents coming back from the
//! service go through [`decode_document`], which either yields a complete
//! expense (filling the few fields that have a sane default) or reports the
//! document as skipped with a reason. Nothing here caches: each call is a
//! round trip to the service.

use crate::categories::{default_category, find_category};
use crate::constants::*;
use crate::error::{ExpenseError, Result};
use crate::models::{Expense, ExpenseDraft, ExpensePatch, Filter};
use crate::service::{Document, FieldValue, Fields, Operator, Query, RecordService};
use crate::utils::{date_to_millis, end_of_day_millis, millis_to_date, millis_to_datetime, now_millis};

// Document field names
pub const FIELD_OWNER: &str = "userId";
pub const FIELD_TITLE: &str = "title";
pub const FIELD_AMOUNT: &str = "amount";
pub const FIELD_CATEGORY: &str = "category";
pub const FIELD_DATE: &str = "date";
pub const FIELD_ACCOUNT: &str = "account";
pub const FIELD_DESCRIPTION: &str = "description";
pub const FIELD_CREATED_AT: &str = "createdAt";
pub const FIELD_UPDATED_AT: &str = "updatedAt";

/// Outcome of validating one document at the service boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T> {
    Valid(T),
    Skipped { id: String, reason: String },
}

pub(crate) fn skipped<T>(doc: &Document, reason: &str) -> Decoded<T> {
    Decoded::Skipped {
        id: doc.id.clone(),
        reason: reason.to_string(),
    }
}

pub(crate) fn non_blank_string(doc: &Document, field: &str) -> Option<String> {
    doc.get(field)
        .and_then(FieldValue::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn decode_document(doc: &Document, default_account: &str) -> Decoded<Expense> {
    let Some(owner_id) = non_blank_string(doc, FIELD_OWNER) else {
        return skipped(doc, "missing owner");
    };
    let Some(title) = non_blank_string(doc, FIELD_TITLE) else {
        return skipped(doc, "missing title");
    };
    let Some(date_millis) = doc.get(FIELD_DATE).and_then(FieldValue::as_timestamp) else {
        return skipped(doc, "missing date");
    };
    let Some(date) = millis_to_date(date_millis) else {
        return skipped(doc, "date out of range");
    };

    let amount = doc
        .get(FIELD_AMOUNT)
        .and_then(FieldValue::as_number)
        .filter(|n| n.is_finite())
        .unwrap_or(0.0);

    // Writes only accept known categories; anything else predates that check
    let category = non_blank_string(doc, FIELD_CATEGORY)
        .filter(|c| find_category(c).is_some())
        .unwrap_or_else(|| default_category().name.to_string());

    let account =
        non_blank_string(doc, FIELD_ACCOUNT).unwrap_or_else(|| default_account.to_string());

    let description = doc
        .get(FIELD_DESCRIPTION)
        .and_then(FieldValue::as_str)
        .map(str::to_string);

    let created_at = doc
        .get(FIELD_CREATED_AT)
        .and_then(FieldValue::as_timestamp)
        .unwrap_or(date_millis);
    let updated_at = doc
        .get(FIELD_UPDATED_AT)
        .and_then(FieldValue::as_timestamp)
        .unwrap_or(created_at);

    let (Some(created_at), Some(updated_at)) =
        (millis_to_datetime(created_at), millis_to_datetime(updated_at))
    else {
        return skipped(doc, "timestamp out of range");
    };

    Decoded::Valid(Expense {
        id: doc.id.clone(),
        owner_id,
        title,
        amount,
        category,
        date,
        account,
        description,
        created_at,
        updated_at,
    })
}

/// Document fields for a brand-new expense. A draft without an account gets
/// `default_account`.
pub fn draft_fields(owner_id: &str, draft: &ExpenseDraft, default_account: &str, now: i64) -> Fields {
    let mut fields = Fields::new();
    fields.insert(FIELD_OWNER.to_string(), owner_id.into());
    fields.insert(FIELD_TITLE.to_string(), draft.title.as_str().into());
    fields.insert(FIELD_AMOUNT.to_string(), draft.amount.into());
    fields.insert(FIELD_CATEGORY.to_string(), draft.category.as_str().into());
    fields.insert(
        FIELD_DATE.to_string(),
        FieldValue::Timestamp(date_to_millis(draft.date)),
    );
    fields.insert(
        FIELD_ACCOUNT.to_string(),
        draft.account.as_deref().unwrap_or(default_account).into(),
    );
    fields.insert(
        FIELD_DESCRIPTION.to_string(),
        draft
            .description
            .as_deref()
            .map_or(FieldValue::Null, FieldValue::from),
    );
    fields.insert(FIELD_CREATED_AT.to_string(), FieldValue::Timestamp(now));
    fields.insert(FIELD_UPDATED_AT.to_string(), FieldValue::Timestamp(now));
    fields
}

/// Document fields touched by a partial update; `updatedAt` is always present.
pub fn patch_fields(patch: &ExpensePatch, now: i64) -> Fields {
    let mut fields = Fields::new();
    if let Some(title) = &patch.title {
        fields.insert(FIELD_TITLE.to_string(), title.trim().into());
    }
    if let Some(amount) = patch.amount {
        fields.insert(FIELD_AMOUNT.to_string(), amount.into());
    }
    if let Some(category) = &patch.category {
        fields.insert(FIELD_CATEGORY.to_string(), category.trim().into());
    }
    if let Some(date) = patch.date {
        fields.insert(FIELD_DATE.to_string(), FieldValue::Timestamp(date_to_millis(date)));
    }
    if let Some(account) = &patch.account {
        fields.insert(FIELD_ACCOUNT.to_string(), account.trim().into());
    }
    if let Some(description) = &patch.description {
        fields.insert(
            FIELD_DESCRIPTION.to_string(),
            description
                .as_deref()
                .map_or(FieldValue::Null, FieldValue::from),
        );
    }
    fields.insert(FIELD_UPDATED_AT.to_string(), FieldValue::Timestamp(now));
    fields
}

fn filter_category(filter: &Filter) -> Option<&str> {
    filter.category.as_deref().map(str::trim).filter(|c| !c.is_empty())
}

pub fn list_query(owner_id: &str, filter: &Filter) -> Query {
    let mut query = Query::collection(EXPENSES_COLLECTION).filter(FIELD_OWNER, Operator::Eq, owner_id);

    if let Some(start) = filter.start_date {
        query = query.filter(
            FIELD_DATE,
            Operator::Gte,
            FieldValue::Timestamp(date_to_millis(start)),
        );
    }
    if let Some(end) = filter.end_date {
        // Inclusive end date: anything before the following midnight
        query = match end_of_day_millis(end) {
            Some(bound) => query.filter(FIELD_DATE, Operator::Lt, FieldValue::Timestamp(bound)),
            None => query.filter(
                FIELD_DATE,
                Operator::Lte,
                FieldValue::Timestamp(date_to_millis(end)),
            ),
        };
    }
    if let Some(category) = filter_category(filter) {
        query = query.filter(FIELD_CATEGORY, Operator::Eq, category);
    }

    query.order_by(FIELD_DATE, true)
}

pub(crate) fn require_owner(owner_id: &str) -> Result<&str> {
    let owner_id = owner_id.trim();
    if owner_id.is_empty() {
        return Err(ExpenseError::NotAuthenticated);
    }
    Ok(owner_id)
}

pub struct ExpenseRepository<S> {
    service: S,
    default_account: String,
}

impl<S: RecordService> ExpenseRepository<S> {
    pub fn new(service: S) -> Self {
        Self::with_default_account(service, DEFAULT_ACCOUNT)
    }

    pub fn with_default_account(service: S, default_account: &str) -> Self {
        ExpenseRepository {
            service,
            default_account: default_account.to_string(),
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn default_account(&self) -> &str {
        &self.default_account
    }

    pub async fn list(&self, owner_id: &str, filter: &Filter) -> Result<Vec<Expense>> {
        let owner_id = require_owner(owner_id)?;
        let documents = self.service.query(&list_query(owner_id, filter)).await?;
        let category = filter_category(filter);

        let mut expenses = Vec::with_capacity(documents.len());
        for doc in &documents {
            match decode_document(doc, &self.default_account) {
                // A legacy category shown as the default no longer matches the filter
                Decoded::Valid(expense)
                    if category.is_some_and(|c| c != expense.category) => {}
                Decoded::Valid(expense) => expenses.push(expense),
                Decoded::Skipped { id, reason } => {
                    tracing::warn!("skipping expense document {}: {}", id, reason);
                }
            }
        }

        tracing::debug!(
            "listed {} of {} expense documents for {}",
            expenses.len(),
            documents.len(),
            owner_id
        );
        Ok(expenses)
    }

    /// Fetches one expense and checks that `owner_id` owns it.
    pub async fn get(&self, owner_id: &str, id: &str) -> Result<Expense> {
        let owner_id = require_owner(owner_id)?;
        let doc = self
            .service
            .get(EXPENSES_COLLECTION, id)
            .await?
            .ok_or_else(|| ExpenseError::NotFound(id.to_string()))?;

        let stored_owner = doc.get(FIELD_OWNER).and_then(FieldValue::as_str);
        if stored_owner != Some(owner_id) {
            return Err(ExpenseError::Unauthorized);
        }

        match decode_document(&doc, &self.default_account) {
            Decoded::Valid(expense) => Ok(expense),
            Decoded::Skipped { id, reason } => Err(ExpenseError::Persistence(format!(
                "expense document {} is malformed: {}",
                id, reason
            ))),
        }
    }

    /// Stores a draft for `owner_id`. Drafts are validated by the caller.
    pub async fn create(&self, owner_id: &str, draft: &ExpenseDraft) -> Result<String> {
        let owner_id = require_owner(owner_id)?;
        let fields = draft_fields(owner_id, draft, &self.default_account, now_millis());
        let id = self.service.insert(EXPENSES_COLLECTION, fields).await?;

        tracing::debug!("created expense {} for {}", id, owner_id);
        Ok(id)
    }

    pub async fn update(&self, owner_id: &str, id: &str, patch: &ExpensePatch) -> Result<()> {
        self.ensure_owned(EXPENSES_COLLECTION, owner_id, id).await?;
        self.service
            .update(EXPENSES_COLLECTION, id, patch_fields(patch, now_millis()))
            .await?;

        tracing::debug!("updated expense {}", id);
        Ok(())
    }

    pub async fn delete(&self, owner_id: &str, id: &str) -> Result<()> {
        self.ensure_owned(EXPENSES_COLLECTION, owner_id, id).await?;
        self.service.delete(EXPENSES_COLLECTION, id).await?;

        tracing::debug!("deleted expense {}", id);
        Ok(())
    }

    /// Re-reads the document right before a write and checks its owner.
    pub(crate) async fn ensure_owned(&self, collection: &str, owner_id: &str, id: &str) -> Result<()> {
        let owner_id = require_owner(owner_id)?;
        let doc = self
            .service
            .get(collection, id)
            .await?
            .ok_or_else(|| ExpenseError::NotFound(id.to_string()))?;

        match doc.get(FIELD_OWNER).and_then(FieldValue::as_str) {
            Some(stored) if stored == owner_id => Ok(()),
            _ => {
                tracing::warn!("rejected access to {} {} by {}", collection, id, owner_id);
                Err(ExpenseError::Unauthorized)
            }
        }
    }
}
