/*!
 * Expense Repository Integration Tests
 *
 * Exercises the repository against the embedded libsql record service:
 * ownership scoping, date-range and category filtering, ordering, partial
 * updates, deletion, and coercion of incomplete documents.
 *
 * All tests use isolated temporary databases.
 */

mod common;

use common::*;
use expense_store::constants::EXPENSES_COLLECTION;
use expense_store::error::ExpenseError;
use expense_store::models::{ExpensePatch, Filter};
use expense_store::repository::*;
use expense_store::service::{FieldValue, LibsqlRecordService, RecordService};
use expense_store::utils::date_to_millis;
use time::macros::date;
use tokio_test::{assert_err, assert_ok};

const OWNER: &str = "owner-1";
const INTRUDER: &str = "owner-2";

async fn setup_repository() -> (ExpenseRepository<LibsqlRecordService>, tempfile::TempDir) {
    let (db, temp_dir) = setup_test_environment().await;
    (ExpenseRepository::new(LibsqlRecordService::new(db)), temp_dir)
}

async fn create_sample_expenses(repo: &ExpenseRepository<LibsqlRecordService>) {
    let samples = [
        draft("Groceries", 42.10, "Food", date!(2024 - 03 - 01)),
        draft("Bus pass", 30.00, "Transport", date!(2024 - 03 - 15)),
        draft("Dinner", 25.50, "Food", date!(2024 - 03 - 31)),
        draft("Cinema", 12.00, "Entertainment", date!(2024 - 04 - 02)),
    ];
    for sample in &samples {
        assert_ok!(repo.create(OWNER, sample).await);
    }
}

#[tokio::test]
async fn empty_collection() {
    let (repo, _temp_dir) = setup_repository().await;

    let expenses = assert_ok!(repo.list(OWNER, &Filter::default()).await);
    assert!(expenses.is_empty());
}

#[tokio::test]
async fn create_returns_id_and_stamps_metadata() {
    let (repo, _temp_dir) = setup_repository().await;
    let new_draft = draft("Coffee", 3.5, "Food", date!(2024 - 03 - 15)).with_description("flat white");

    let id = assert_ok!(repo.create(OWNER, &new_draft).await);
    assert!(!id.is_empty());

    let expense = assert_ok!(repo.get(OWNER, &id).await);
    assert_eq!(expense.id, id);
    assert_eq!(expense.owner_id, OWNER);
    assert_eq!(expense.title, "Coffee");
    assert_eq!(expense.amount, 3.5);
    assert_eq!(expense.category, "Food");
    assert_eq!(expense.account, "USD");
    assert_eq!(expense.description.as_deref(), Some("flat white"));
    assert_eq!(expense.created_at, expense.updated_at);
}

/// Dates survive the trip through the service's timestamp type unchanged.
#[tokio::test]
async fn date_round_trip() {
    let (repo, _temp_dir) = setup_repository().await;

    let id = assert_ok!(repo.create(OWNER, &draft("Rent", 900.0, "Bills", date!(2024 - 03 - 15))).await);
    let expenses = assert_ok!(repo.list(OWNER, &Filter::default()).await);

    let stored = expenses.iter().find(|e| e.id == id).expect("created expense is listed");
    assert_eq!(stored.date, date!(2024 - 03 - 15));
}

#[tokio::test]
async fn list_is_ordered_by_date_descending() {
    let (repo, _temp_dir) = setup_repository().await;
    create_sample_expenses(&repo).await;

    let expenses = assert_ok!(repo.list(OWNER, &Filter::default()).await);
    let titles: Vec<&str> = expenses.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["Cinema", "Dinner", "Bus pass", "Groceries"]);
}

#[tokio::test]
async fn list_only_returns_own_expenses() {
    let (repo, _temp_dir) = setup_repository().await;
    create_sample_expenses(&repo).await;
    assert_ok!(repo.create(INTRUDER, &draft("Secret", 1.0, "Other", date!(2024 - 03 - 10))).await);

    let mine = assert_ok!(repo.list(OWNER, &Filter::default()).await);
    assert_eq!(mine.len(), 4);
    assert!(mine.iter().all(|e| e.owner_id == OWNER));

    let theirs = assert_ok!(repo.list(INTRUDER, &Filter::default()).await);
    assert_eq!(theirs.len(), 1);
    assert_eq!(theirs[0].title, "Secret");
}

#[tokio::test]
async fn date_range_is_inclusive_on_both_ends() {
    let (repo, _temp_dir) = setup_repository().await;
    create_sample_expenses(&repo).await;

    let march = Filter::between(date!(2024 - 03 - 01), date!(2024 - 03 - 31));
    let expenses = assert_ok!(repo.list(OWNER, &march).await);

    let titles: Vec<&str> = expenses.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["Dinner", "Bus pass", "Groceries"]);
}

#[tokio::test]
async fn open_ended_date_ranges() {
    let (repo, _temp_dir) = setup_repository().await;
    create_sample_expenses(&repo).await;

    let from = Filter {
        start_date: Some(date!(2024 - 03 - 15)),
        ..Filter::default()
    };
    assert_eq!(assert_ok!(repo.list(OWNER, &from).await).len(), 3);

    let until = Filter {
        end_date: Some(date!(2024 - 03 - 15)),
        ..Filter::default()
    };
    assert_eq!(assert_ok!(repo.list(OWNER, &until).await).len(), 2);
}

#[tokio::test]
async fn category_and_date_filters_combine() {
    let (repo, _temp_dir) = setup_repository().await;
    create_sample_expenses(&repo).await;

    let food = assert_ok!(repo.list(OWNER, &Filter::category("Food")).await);
    assert_eq!(food.len(), 2);
    assert!(food.iter().all(|e| e.category == "Food"));

    let late_march_food = Filter {
        start_date: Some(date!(2024 - 03 - 10)),
        end_date: Some(date!(2024 - 03 - 31)),
        category: Some("Food".to_string()),
    };
    let expenses = assert_ok!(repo.list(OWNER, &late_march_food).await);
    assert_eq!(expenses.len(), 1);
    assert_eq!(expenses[0].title, "Dinner");
}

#[tokio::test]
async fn update_changes_only_supplied_fields() {
    let (repo, _temp_dir) = setup_repository().await;
    let id = assert_ok!(repo.create(OWNER, &draft("Taxi", 18.0, "Transport", date!(2024 - 03 - 15))).await);
    let before = assert_ok!(repo.get(OWNER, &id).await);

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let patch = ExpensePatch {
        title: Some("Airport taxi".to_string()),
        date: Some(date!(2024 - 03 - 16)),
        ..ExpensePatch::default()
    };
    assert_ok!(repo.update(OWNER, &id, &patch).await);

    let after = assert_ok!(repo.get(OWNER, &id).await);
    assert_eq!(after.title, "Airport taxi");
    assert_eq!(after.date, date!(2024 - 03 - 16));
    assert_eq!(after.amount, before.amount);
    assert_eq!(after.category, before.category);
    assert_eq!(after.account, before.account);
    assert_eq!(after.owner_id, before.owner_id);
    assert_eq!(after.created_at, before.created_at);
    assert!(after.updated_at > before.updated_at);
}

#[tokio::test]
async fn patch_can_clear_description() {
    let (repo, _temp_dir) = setup_repository().await;
    let new_draft = draft("Gift", 20.0, "Shopping", date!(2024 - 03 - 15)).with_description("for mum");
    let id = assert_ok!(repo.create(OWNER, &new_draft).await);

    let patch = ExpensePatch {
        description: Some(None),
        ..ExpensePatch::default()
    };
    assert_ok!(repo.update(OWNER, &id, &patch).await);

    let after = assert_ok!(repo.get(OWNER, &id).await);
    assert_eq!(after.description, None);
}

#[tokio::test]
async fn update_by_other_owner_is_unauthorized() {
    let (repo, _temp_dir) = setup_repository().await;
    let id = assert_ok!(repo.create(OWNER, &draft("Taxi", 18.0, "Transport", date!(2024 - 03 - 15))).await);

    let patch = ExpensePatch {
        amount: Some(1.0),
        ..ExpensePatch::default()
    };
    let err = assert_err!(repo.update(INTRUDER, &id, &patch).await);
    assert!(matches!(err, ExpenseError::Unauthorized));

    let unchanged = assert_ok!(repo.get(OWNER, &id).await);
    assert_eq!(unchanged.amount, 18.0);
}

#[tokio::test]
async fn get_by_other_owner_is_unauthorized() {
    let (repo, _temp_dir) = setup_repository().await;
    let id = assert_ok!(repo.create(OWNER, &draft("Taxi", 18.0, "Transport", date!(2024 - 03 - 15))).await);

    assert!(matches!(
        repo.get(INTRUDER, &id).await,
        Err(ExpenseError::Unauthorized)
    ));
}

#[tokio::test]
async fn delete_removes_record_permanently() {
    let (repo, _temp_dir) = setup_repository().await;
    let id = assert_ok!(repo.create(OWNER, &draft("Taxi", 18.0, "Transport", date!(2024 - 03 - 15))).await);

    assert_ok!(repo.delete(OWNER, &id).await);

    assert!(matches!(repo.get(OWNER, &id).await, Err(ExpenseError::NotFound(_))));
    assert!(assert_ok!(repo.service().get(EXPENSES_COLLECTION, &id).await).is_none());
}

#[tokio::test]
async fn delete_by_other_owner_keeps_record() {
    let (repo, _temp_dir) = setup_repository().await;
    let id = assert_ok!(repo.create(OWNER, &draft("Taxi", 18.0, "Transport", date!(2024 - 03 - 15))).await);

    let err = assert_err!(repo.delete(INTRUDER, &id).await);
    assert!(matches!(err, ExpenseError::Unauthorized));
    assert_ok!(repo.get(OWNER, &id).await);
}

#[tokio::test]
async fn missing_records_are_not_found() {
    let (repo, _temp_dir) = setup_repository().await;
    let patch = ExpensePatch {
        amount: Some(1.0),
        ..ExpensePatch::default()
    };

    assert!(matches!(
        repo.update(OWNER, "does-not-exist", &patch).await,
        Err(ExpenseError::NotFound(id)) if id == "does-not-exist"
    ));
    assert!(matches!(
        repo.delete(OWNER, "does-not-exist").await,
        Err(ExpenseError::NotFound(_))
    ));
}

#[tokio::test]
async fn blank_owner_is_not_authenticated() {
    let (repo, _temp_dir) = setup_repository().await;
    let new_draft = draft("Taxi", 18.0, "Transport", date!(2024 - 03 - 15));

    assert!(matches!(
        repo.list("", &Filter::default()).await,
        Err(ExpenseError::NotAuthenticated)
    ));
    assert!(matches!(
        repo.create("  ", &new_draft).await,
        Err(ExpenseError::NotAuthenticated)
    ));
    assert!(matches!(
        repo.delete("", "any").await,
        Err(ExpenseError::NotAuthenticated)
    ));
}

/// Documents written by other clients may miss fields. Coercible ones are
/// filled with defaults; the rest are dropped without failing the list.
#[tokio::test]
async fn incomplete_documents_are_coerced_or_dropped() {
    let (repo, _temp_dir) = setup_repository().await;
    let march_15 = FieldValue::Timestamp(date_to_millis(date!(2024 - 03 - 15)));

    let sparse = fields(vec![
        (FIELD_OWNER, OWNER.into()),
        (FIELD_TITLE, "Sparse".into()),
        (FIELD_DATE, march_15.clone()),
        (FIELD_CATEGORY, "not-a-category".into()),
    ]);
    let untitled = fields(vec![
        (FIELD_OWNER, OWNER.into()),
        (FIELD_AMOUNT, FieldValue::Number(9.0)),
        (FIELD_DATE, march_15.clone()),
    ]);
    let string_date = fields(vec![
        (FIELD_OWNER, OWNER.into()),
        (FIELD_TITLE, "Bad date".into()),
        (FIELD_DATE, "2024-03-15".into()),
    ]);

    for doc in [sparse, untitled, string_date] {
        assert_ok!(repo.service().insert(EXPENSES_COLLECTION, doc).await);
    }
    assert_ok!(repo.create(OWNER, &draft("Complete", 5.0, "Food", date!(2024 - 03 - 14))).await);

    let expenses = assert_ok!(repo.list(OWNER, &Filter::default()).await);
    assert_eq!(expenses.len(), 2);

    let sparse = expenses.iter().find(|e| e.title == "Sparse").expect("sparse document kept");
    assert_eq!(sparse.amount, 0.0);
    assert_eq!(sparse.category, "Other");
    assert_eq!(sparse.account, "USD");
    assert_eq!(sparse.date, date!(2024 - 03 - 15));
    assert_eq!(sparse.created_at, sparse.updated_at);
}

#[tokio::test]
async fn default_account_is_configurable() {
    let (db, _temp_dir) = setup_test_environment().await;
    let repo = ExpenseRepository::with_default_account(LibsqlRecordService::new(db), "EUR");

    let doc = fields(vec![
        (FIELD_OWNER, OWNER.into()),
        (FIELD_TITLE, "No account".into()),
        (FIELD_AMOUNT, FieldValue::Number(4.0)),
        (FIELD_DATE, FieldValue::Timestamp(date_to_millis(date!(2024 - 03 - 15)))),
    ]);
    assert_ok!(repo.service().insert(EXPENSES_COLLECTION, doc).await);

    let expenses = assert_ok!(repo.list(OWNER, &Filter::default()).await);
    assert_eq!(expenses[0].account, "EUR");
}

#[tokio::test]
async fn created_drafts_take_the_configured_default_account() {
    let (db, _temp_dir) = setup_test_environment().await;
    let repo = ExpenseRepository::with_default_account(LibsqlRecordService::new(db), "UAH");

    let id = assert_ok!(repo.create(OWNER, &draft("Bread", 30.0, "Food", date!(2024 - 03 - 15))).await);

    let stored = assert_ok!(repo.service().get(EXPENSES_COLLECTION, &id).await).expect("stored");
    assert_eq!(stored.get(FIELD_ACCOUNT), Some(&FieldValue::from("UAH")));
    assert_eq!(assert_ok!(repo.get(OWNER, &id).await).account, "UAH");
}

#[tokio::test]
async fn category_filter_never_returns_other_categories() {
    let (repo, _temp_dir) = setup_repository().await;
    let legacy = fields(vec![
        (FIELD_OWNER, OWNER.into()),
        (FIELD_TITLE, "Milk".into()),
        (FIELD_CATEGORY, "Groceries".into()),
        (FIELD_DATE, FieldValue::Timestamp(date_to_millis(date!(2024 - 03 - 15)))),
    ]);
    assert_ok!(repo.service().insert(EXPENSES_COLLECTION, legacy).await);

    let groceries = assert_ok!(repo.list(OWNER, &Filter::category("Groceries")).await);
    assert!(groceries.is_empty());

    let everything = assert_ok!(repo.list(OWNER, &Filter::default()).await);
    assert_eq!(everything.len(), 1);
    assert_eq!(everything[0].category, "Other");
}
