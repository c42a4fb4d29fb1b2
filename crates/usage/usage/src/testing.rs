use chrono::{NaiveDate, TimeZone, Utc};
use futures::future::join_all;

use rowgate_core::{ScopeKey, UsageMetric, UsageRecord};

use crate::error::UsageError;
use crate::store::{Admission, UsageStore};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, d).expect("valid test date")
}

fn scope(identity: &str, d: u32) -> ScopeKey {
    ScopeKey::new(identity, "conformance_fn", day(d))
}

fn record(scope: &ScopeKey, request_id: &str, rows: u64) -> UsageRecord {
    let at = Utc
        .from_utc_datetime(&scope.day.and_hms_opt(12, 0, 0).expect("valid test time"));
    UsageRecord::new(scope, request_id, rows, at)
}

/// Run the full usage store conformance test suite.
///
/// Call this from your backend's test module with a fresh store instance.
/// The suite only touches scopes for the `conformance_fn` function.
///
/// # Errors
///
/// Returns an error if any store operation fails.
pub async fn run_store_conformance_tests(store: &dyn UsageStore) -> Result<(), UsageError> {
    test_empty_scope(store).await?;
    test_append_and_sum(store).await?;
    test_day_isolation(store).await?;
    test_identity_isolation(store).await?;
    test_concurrent_appends(store).await?;
    test_append_within_limit(store).await?;
    test_contended_append_within(store).await?;
    Ok(())
}

async fn test_empty_scope(store: &dyn UsageStore) -> Result<(), UsageError> {
    let key = scope("nobody", 1);
    assert_eq!(store.aggregate(&key, UsageMetric::RowCount).await?, 0);
    assert_eq!(store.aggregate(&key, UsageMetric::Requests).await?, 0);
    Ok(())
}

async fn test_append_and_sum(store: &dyn UsageStore) -> Result<(), UsageError> {
    let key = scope("sum-user", 2);
    store.append(record(&key, "r1", 10)).await?;
    store.append(record(&key, "r2", 32)).await?;
    assert_eq!(
        store.aggregate(&key, UsageMetric::RowCount).await?,
        42,
        "row_count aggregate should be the sum of appended rows"
    );
    assert_eq!(
        store.aggregate(&key, UsageMetric::Requests).await?,
        2,
        "requests aggregate should count appended records"
    );
    Ok(())
}

async fn test_day_isolation(store: &dyn UsageStore) -> Result<(), UsageError> {
    let today = scope("day-user", 3);
    let tomorrow = scope("day-user", 4);
    store.append(record(&today, "r1", 7)).await?;
    assert_eq!(store.aggregate(&today, UsageMetric::RowCount).await?, 7);
    assert_eq!(
        store.aggregate(&tomorrow, UsageMetric::RowCount).await?,
        0,
        "usage from another day must not aggregate"
    );
    Ok(())
}

async fn test_identity_isolation(store: &dyn UsageStore) -> Result<(), UsageError> {
    let alice = scope("iso-alice", 5);
    let bob = scope("iso-bob", 5);
    store.append(record(&alice, "r1", 3)).await?;
    assert_eq!(store.aggregate(&bob, UsageMetric::RowCount).await?, 0);
    Ok(())
}

async fn test_concurrent_appends(store: &dyn UsageStore) -> Result<(), UsageError> {
    let key = scope("concurrent-user", 6);
    let appends = (0..20).map(|i| store.append(record(&key, &format!("r{i}"), 5)));
    for result in join_all(appends).await {
        result?;
    }
    assert_eq!(
        store.aggregate(&key, UsageMetric::RowCount).await?,
        100,
        "no concurrent append may be lost"
    );
    assert_eq!(store.aggregate(&key, UsageMetric::Requests).await?, 20);
    Ok(())
}

async fn test_append_within_limit(store: &dyn UsageStore) -> Result<(), UsageError> {
    let key = scope("limit-user", 7);
    store.append(record(&key, "seed", 90)).await?;

    let rejected = store.append_within(record(&key, "over", 11), 100).await?;
    assert_eq!(rejected, Admission::Rejected { total: 101 });
    assert_eq!(
        store.aggregate(&key, UsageMetric::Requests).await?,
        1,
        "a rejected record must not be stored"
    );

    let exact = store.append_within(record(&key, "exact", 10), 100).await?;
    assert_eq!(exact, Admission::Appended { total: 100 });
    assert_eq!(store.aggregate(&key, UsageMetric::RowCount).await?, 100);
    assert_eq!(store.aggregate(&key, UsageMetric::Requests).await?, 2);
    Ok(())
}

async fn test_contended_append_within(store: &dyn UsageStore) -> Result<(), UsageError> {
    let key = scope("contended-user", 8);
    store.append(record(&key, "seed", 900)).await?;

    let attempts = (0..4).map(|i| store.append_within(record(&key, &format!("r{i}"), 60), 1000));
    let mut appended = 0;
    for outcome in join_all(attempts).await {
        if let Admission::Appended { total } = outcome? {
            assert_eq!(total, 960);
            appended += 1;
        }
    }
    assert_eq!(appended, 1, "only one request fits under the limit");
    assert_eq!(store.aggregate(&key, UsageMetric::RowCount).await?, 960);
    Ok(())
}
