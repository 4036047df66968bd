use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use time::Date;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::auth::{AuthProvider, AuthUser, is_valid_email};
use crate::constants::MIN_PASSWORD_LENGTH;
use crate::error::{ExpenseError, Result};
use crate::models::{
    Account, AccountDraft, AccountPatch, Expense, ExpenseDraft, ExpensePatch, Filter, FilterPatch,
};
use crate::repository::ExpenseRepository;
use crate::service::RecordService;
use crate::summary::{Period, Summary, summarize, summarize_by_account};
use crate::utils::today_utc;

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct AppState {
    pub user: Option<AuthUser>,
    pub expenses: Vec<Expense>,
    pub filtered_expenses: Vec<Expense>,
    pub accounts: Vec<Account>,
    pub filter: Filter,
    pub is_loading: bool,
    pub error: Option<String>,
}

/// Shared state container between the screens and the expense repository.
///
/// Every mutating action re-fetches the owner's collection instead of
/// patching it locally. Fetches carry a request token; a response is only
/// applied if no newer fetch was issued in the meantime.
pub struct Store<S, A> {
    repository: ExpenseRepository<S>,
    auth: A,
    state: RwLock<AppState>,
    fetch_seq: AtomicU64,
    account_seq: AtomicU64,
    mutation_gate: Mutex<()>,
}

impl<S: RecordService, A: AuthProvider> Store<S, A> {
    pub fn new(repository: ExpenseRepository<S>, auth: A) -> Self {
        let state = AppState {
            user: auth.current_user(),
            ..AppState::default()
        };
        Store {
            repository,
            auth,
            state: RwLock::new(state),
            fetch_seq: AtomicU64::new(0),
            account_seq: AtomicU64::new(0),
            mutation_gate: Mutex::new(()),
        }
    }

    pub fn repository(&self) -> &ExpenseRepository<S> {
        &self.repository
    }

    pub fn auth(&self) -> &A {
        &self.auth
    }

    pub async fn snapshot(&self) -> AppState {
        self.state.read().await.clone()
    }

    pub async fn user(&self) -> Option<AuthUser> {
        self.state.read().await.user.clone()
    }

    pub async fn expenses(&self) -> Vec<Expense> {
        self.state.read().await.expenses.clone()
    }

    pub async fn filtered_expenses(&self) -> Vec<Expense> {
        self.state.read().await.filtered_expenses.clone()
    }

    pub async fn accounts(&self) -> Vec<Account> {
        self.state.read().await.accounts.clone()
    }

    pub async fn filter(&self) -> Filter {
        self.state.read().await.filter.clone()
    }

    pub async fn is_loading(&self) -> bool {
        self.state.read().await.is_loading
    }

    pub async fn error(&self) -> Option<String> {
        self.state.read().await.error.clone()
    }

    pub async fn clear_error(&self) {
        self.state.write().await.error = None;
    }

    /// Looks an expense up in the last fetched collection.
    pub async fn expense(&self, id: &str) -> Option<Expense> {
        self.state
            .read()
            .await
            .expenses
            .iter()
            .find(|e| e.id == id)
            .cloned()
    }

    fn invalidate_fetches(&self) {
        self.fetch_seq.fetch_add(1, Ordering::SeqCst);
        self.account_seq.fetch_add(1, Ordering::SeqCst);
    }

    /// Replaces the user; a different owner (or none) drops every user-scoped
    /// collection and the filter, and orphans in-flight fetches.
    fn apply_user(&self, state: &mut AppState, user: Option<AuthUser>) {
        let same_owner = state.user.as_ref().map(|u| &u.id) == user.as_ref().map(|u| &u.id);
        if !same_owner {
            self.invalidate_fetches();
            state.expenses.clear();
            state.filtered_expenses.clear();
            state.accounts.clear();
            state.filter.reset();
            state.is_loading = false;
            state.error = None;
        }
        state.user = user;
    }

    pub async fn set_user(&self, user: Option<AuthUser>) {
        let mut state = self.state.write().await;
        self.apply_user(&mut state, user);
    }

    /// Loads the owner's expenses under the current filter. Failures are
    /// recorded in `error`; the previous collection is kept.
    pub async fn fetch_expenses(&self) {
        let (token, owner_id, filter) = {
            let mut state = self.state.write().await;
            let Some(owner_id) = state.user.as_ref().map(|u| u.id.clone()) else {
                state.is_loading = false;
                state.error = Some(ExpenseError::NotAuthenticated.to_string());
                return;
            };
            state.is_loading = true;
            state.error = None;
            let token = self.fetch_seq.fetch_add(1, Ordering::SeqCst) + 1;
            (token, owner_id, state.filter.clone())
        };

        let result = self.repository.list(&owner_id, &filter).await;

        let mut state = self.state.write().await;
        if self.fetch_seq.load(Ordering::SeqCst) != token {
            tracing::debug!("discarding stale expense fetch #{}", token);
            return;
        }

        match result {
            Ok(expenses) => {
                state.filtered_expenses = expenses.clone();
                state.expenses = expenses;
            }
            Err(err) => {
                tracing::warn!("failed to fetch expenses: {}", err);
                state.error = Some(err.to_string());
            }
        }
        state.is_loading = false;
    }

    /// Loads the owner's accounts. Same contract as [`Store::fetch_expenses`].
    pub async fn fetch_accounts(&self) {
        let (token, owner_id) = {
            let mut state = self.state.write().await;
            let Some(owner_id) = state.user.as_ref().map(|u| u.id.clone()) else {
                state.is_loading = false;
                state.error = Some(ExpenseError::NotAuthenticated.to_string());
                return;
            };
            state.is_loading = true;
            state.error = None;
            let token = self.account_seq.fetch_add(1, Ordering::SeqCst) + 1;
            (token, owner_id)
        };

        let result = self.repository.list_accounts(&owner_id).await;

        let mut state = self.state.write().await;
        if self.account_seq.load(Ordering::SeqCst) != token {
            tracing::debug!("discarding stale account fetch #{}", token);
            return;
        }

        match result {
            Ok(accounts) => state.accounts = accounts,
            Err(err) => {
                tracing::warn!("failed to fetch accounts: {}", err);
                state.error = Some(err.to_string());
            }
        }
        state.is_loading = false;
    }

    async fn begin_action(&self) -> Result<String> {
        let mut state = self.state.write().await;
        match state.user.as_ref().map(|u| u.id.clone()) {
            Some(owner_id) => {
                state.is_loading = true;
                state.error = None;
                Ok(owner_id)
            }
            None => {
                let err = ExpenseError::NotAuthenticated;
                state.is_loading = false;
                state.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    async fn fail(&self, err: ExpenseError) -> ExpenseError {
        tracing::warn!("expense action failed: {}", err);
        let mut state = self.state.write().await;
        state.error = Some(err.to_string());
        state.is_loading = false;
        err
    }

    pub async fn add_expense(&self, draft: ExpenseDraft) -> Result<String> {
        let _gate = self.mutation_gate.lock().await;
        let owner_id = self.begin_action().await?;

        let result = match draft.validate() {
            Ok(()) => self.repository.create(&owner_id, &draft).await,
            Err(err) => Err(err),
        };

        match result {
            Ok(id) => {
                self.fetch_expenses().await;
                Ok(id)
            }
            Err(err) => Err(self.fail(err).await),
        }
    }

    pub async fn update_expense(&self, id: &str, patch: ExpensePatch) -> Result<()> {
        let _gate = self.mutation_gate.lock().await;
        let owner_id = self.begin_action().await?;

        let result = match patch.validate() {
            Ok(()) => self.repository.update(&owner_id, id, &patch).await,
            Err(err) => Err(err),
        };

        match result {
            Ok(()) => {
                self.fetch_expenses().await;
                Ok(())
            }
            Err(err) => Err(self.fail(err).await),
        }
    }

    pub async fn delete_expense(&self, id: &str) -> Result<()> {
        let _gate = self.mutation_gate.lock().await;
        let owner_id = self.begin_action().await?;

        match self.repository.delete(&owner_id, id).await {
            Ok(()) => {
                self.fetch_expenses().await;
                Ok(())
            }
            Err(err) => Err(self.fail(err).await),
        }
    }

    /// Merges `partial` into the active filter and re-runs the query.
    pub async fn set_filter(&self, partial: Filter) {
        self.update_filter(partial.into()).await;
    }

    /// Like [`Store::set_filter`], but can also clear individual fields.
    pub async fn update_filter(&self, patch: FilterPatch) {
        self.state.write().await.filter.apply(patch);
        self.fetch_expenses().await;
    }

    pub async fn reset_filter(&self) {
        self.state.write().await.filter.reset();
        self.fetch_expenses().await;
    }

    pub async fn add_account(&self, draft: AccountDraft) -> Result<String> {
        let _gate = self.mutation_gate.lock().await;
        let owner_id = self.begin_action().await?;

        let result = match draft.validate() {
            Ok(()) => self.repository.create_account(&owner_id, &draft).await,
            Err(err) => Err(err),
        };

        match result {
            Ok(id) => {
                self.fetch_accounts().await;
                Ok(id)
            }
            Err(err) => Err(self.fail(err).await),
        }
    }

    pub async fn update_account(&self, id: &str, patch: AccountPatch) -> Result<()> {
        let _gate = self.mutation_gate.lock().await;
        let owner_id = self.begin_action().await?;

        let result = match patch.validate() {
            Ok(()) => self.repository.update_account(&owner_id, id, &patch).await,
            Err(err) => Err(err),
        };

        match result {
            Ok(()) => {
                self.fetch_accounts().await;
                Ok(())
            }
            Err(err) => Err(self.fail(err).await),
        }
    }

    pub async fn delete_account(&self, id: &str) -> Result<()> {
        let _gate = self.mutation_gate.lock().await;
        let owner_id = self.begin_action().await?;

        match self.repository.delete_account(&owner_id, id).await {
            Ok(()) => {
                self.fetch_accounts().await;
                Ok(())
            }
            Err(err) => Err(self.fail(err).await),
        }
    }

    pub async fn monthly_summary(&self) -> Summary {
        self.summary_for(Period::Month, today_utc()).await
    }

    pub async fn summary_for(&self, period: Period, today: Date) -> Summary {
        let state = self.state.read().await;
        summarize(&state.filtered_expenses, period, today)
    }

    pub async fn summary_by_account(&self, period: Period, today: Date) -> BTreeMap<String, Summary> {
        let state = self.state.read().await;
        summarize_by_account(&state.filtered_expenses, period, today)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthUser> {
        {
            let mut state = self.state.write().await;
            state.is_loading = true;
            state.error = None;
        }

        match self.auth.sign_in(email, password).await {
            Ok(user) => {
                let mut state = self.state.write().await;
                self.apply_user(&mut state, Some(user.clone()));
                state.is_loading = false;
                Ok(user)
            }
            Err(err) => Err(self.fail(err.into()).await),
        }
    }

    /// Checks the sign-up form, then creates the account (which signs it in).
    pub async fn register(&self, email: &str, password: &str, confirm: &str) -> Result<AuthUser> {
        if let Err(err) = validate_sign_up(email, password, confirm) {
            return Err(self.fail(err).await);
        }

        {
            let mut state = self.state.write().await;
            state.is_loading = true;
            state.error = None;
        }

        match self.auth.sign_up(email.trim(), password).await {
            Ok(user) => {
                let mut state = self.state.write().await;
                self.apply_user(&mut state, Some(user.clone()));
                state.is_loading = false;
                Ok(user)
            }
            Err(err) => Err(self.fail(err.into()).await),
        }
    }

    /// Signs out and tears down everything scoped to the previous user.
    pub async fn logout(&self) -> Result<()> {
        match self.auth.sign_out().await {
            Ok(()) => {
                let mut state = self.state.write().await;
                self.apply_user(&mut state, None);
                Ok(())
            }
            Err(err) => Err(self.fail(err.into()).await),
        }
    }
}

impl<S, A> Store<S, A>
where
    S: RecordService + 'static,
    A: AuthProvider + 'static,
{
    /// Follows the auth provider's state changes: updates `user` and loads
    /// the expenses and accounts of whoever signs in.
    pub fn watch_auth(self: &Arc<Self>) -> JoinHandle<()> {
        let store = Arc::clone(self);
        let mut changes = self.auth.subscribe();

        tokio::spawn(async move {
            loop {
                let user = changes.borrow_and_update().clone();
                let signed_in = user.is_some();
                store.set_user(user).await;
                if signed_in {
                    store.fetch_expenses().await;
                    store.fetch_accounts().await;
                }
                if changes.changed().await.is_err() {
                    break;
                }
            }
        })
    }
}

pub fn validate_sign_up(email: &str, password: &str, confirm: &str) -> Result<()> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ExpenseError::validation("Email is required"));
    }
    if !is_valid_email(email) {
        return Err(ExpenseError::validation("Please enter a valid email"));
    }
    if password.is_empty() {
        return Err(ExpenseError::validation("Password is required"));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ExpenseError::validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    if confirm.is_empty() {
        return Err(ExpenseError::validation("Please confirm your password"));
    }
    if password != confirm {
        return Err(ExpenseError::validation("Passwords do not match"));
    }
    Ok(())
}
