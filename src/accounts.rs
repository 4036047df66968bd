//! Owner-scoped money accounts, kept in their own collection next to the
//! expenses and served by the same repository.

use crate::constants::{ACCOUNTS_COLLECTION, DEFAULT_ACCOUNT};
use crate::error::Result;
use crate::models::{Account, AccountDraft, AccountPatch, Currency};
use crate::repository::{
    Decoded, ExpenseRepository, FIELD_CREATED_AT, FIELD_OWNER, FIELD_UPDATED_AT, non_blank_string,
    require_owner, skipped,
};
use crate::service::{Document, FieldValue, Fields, Operator, Query, RecordService};
use crate::utils::{millis_to_datetime, now_millis};

pub const FIELD_NAME: &str = "name";
pub const FIELD_CURRENCY: &str = "currency";
pub const FIELD_BALANCE: &str = "balance";

pub fn decode_account(doc: &Document, default_currency: Currency) -> Decoded<Account> {
    let Some(owner_id) = non_blank_string(doc, FIELD_OWNER) else {
        return skipped(doc, "missing owner");
    };
    let Some(name) = non_blank_string(doc, FIELD_NAME) else {
        return skipped(doc, "missing name");
    };
    let Some(created_millis) = doc.get(FIELD_CREATED_AT).and_then(FieldValue::as_timestamp) else {
        return skipped(doc, "missing createdAt");
    };

    let currency = non_blank_string(doc, FIELD_CURRENCY)
        .and_then(|c| c.parse().ok())
        .unwrap_or(default_currency);
    let balance = doc
        .get(FIELD_BALANCE)
        .and_then(FieldValue::as_number)
        .filter(|n| n.is_finite())
        .unwrap_or(0.0);
    let updated_millis = doc
        .get(FIELD_UPDATED_AT)
        .and_then(FieldValue::as_timestamp)
        .unwrap_or(created_millis);

    let (Some(created_at), Some(updated_at)) = (
        millis_to_datetime(created_millis),
        millis_to_datetime(updated_millis),
    ) else {
        return skipped(doc, "timestamp out of range");
    };

    Decoded::Valid(Account {
        id: doc.id.clone(),
        owner_id,
        name,
        currency,
        balance,
        created_at,
        updated_at,
    })
}

pub fn account_fields(owner_id: &str, draft: &AccountDraft, now: i64) -> Fields {
    let mut fields = Fields::new();
    fields.insert(FIELD_OWNER.to_string(), owner_id.into());
    fields.insert(FIELD_NAME.to_string(), draft.name.as_str().into());
    fields.insert(FIELD_CURRENCY.to_string(), draft.currency.as_str().into());
    fields.insert(FIELD_BALANCE.to_string(), draft.balance.into());
    fields.insert(FIELD_CREATED_AT.to_string(), FieldValue::Timestamp(now));
    fields.insert(FIELD_UPDATED_AT.to_string(), FieldValue::Timestamp(now));
    fields
}

pub fn account_patch_fields(patch: &AccountPatch, now: i64) -> Fields {
    let mut fields = Fields::new();
    if let Some(name) = &patch.name {
        fields.insert(FIELD_NAME.to_string(), name.trim().into());
    }
    if let Some(currency) = patch.currency {
        fields.insert(FIELD_CURRENCY.to_string(), currency.as_str().into());
    }
    if let Some(balance) = patch.balance {
        fields.insert(FIELD_BALANCE.to_string(), balance.into());
    }
    fields.insert(FIELD_UPDATED_AT.to_string(), FieldValue::Timestamp(now));
    fields
}

impl<S: RecordService> ExpenseRepository<S> {
    fn default_currency(&self) -> Currency {
        self.default_account()
            .parse::<Currency>()
            .or_else(|_| DEFAULT_ACCOUNT.parse())
            .unwrap_or(Currency::Usd)
    }

    /// The owner's accounts, oldest first.
    pub async fn list_accounts(&self, owner_id: &str) -> Result<Vec<Account>> {
        let owner_id = require_owner(owner_id)?;
        let query = Query::collection(ACCOUNTS_COLLECTION)
            .filter(FIELD_OWNER, Operator::Eq, owner_id)
            .order_by(FIELD_CREATED_AT, false);
        let documents = self.service().query(&query).await?;

        let default_currency = self.default_currency();
        let mut accounts = Vec::with_capacity(documents.len());
        for doc in &documents {
            match decode_account(doc, default_currency) {
                Decoded::Valid(account) => accounts.push(account),
                Decoded::Skipped { id, reason } => {
                    tracing::warn!("skipping account document {}: {}", id, reason);
                }
            }
        }
        Ok(accounts)
    }

    pub async fn create_account(&self, owner_id: &str, draft: &AccountDraft) -> Result<String> {
        let owner_id = require_owner(owner_id)?;
        let fields = account_fields(owner_id, draft, now_millis());
        let id = self.service().insert(ACCOUNTS_COLLECTION, fields).await?;

        tracing::debug!("created account {} for {}", id, owner_id);
        Ok(id)
    }

    pub async fn update_account(&self, owner_id: &str, id: &str, patch: &AccountPatch) -> Result<()> {
        self.ensure_owned(ACCOUNTS_COLLECTION, owner_id, id).await?;
        self.service()
            .update(ACCOUNTS_COLLECTION, id, account_patch_fields(patch, now_millis()))
            .await?;
        Ok(())
    }

    pub async fn delete_account(&self, owner_id: &str, id: &str) -> Result<()> {
        self.ensure_owned(ACCOUNTS_COLLECTION, owner_id, id).await?;
        self.service().delete(ACCOUNTS_COLLECTION, id).await?;

        tracing::debug!("deleted account {}", id);
        Ok(())
    }
}
