//! Quota ledger behaviour under concurrent submissions.

use std::sync::Arc;
use std::thread;

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use mdraft_core::{
    quota::QuotaError, Entitlement, Identity, QuotaConfig, QuotaLedger, SqliteQuotaLedger,
};

#[test]
fn test_concurrent_reservations_never_exceed_limit() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let ledger = Arc::new(
        SqliteQuotaLedger::new(&temp_dir.path().join("quota.db"), QuotaConfig::default())
            .expect("Failed to create ledger"),
    );
    let identity = Identity::session("racing-session");
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let ledger = Arc::clone(&ledger);
            let identity = identity.clone();
            thread::spawn(move || {
                match ledger.check_and_reserve(&identity, &Entitlement::free(), now) {
                    Ok(reservation) => {
                        ledger.commit(reservation).unwrap();
                        true
                    }
                    Err(QuotaError::Exceeded { limit, .. }) => {
                        assert_eq!(limit, 5);
                        false
                    }
                    Err(e) => panic!("unexpected ledger error: {e}"),
                }
            })
        })
        .collect();

    let accepted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|accepted| *accepted)
        .count();

    assert_eq!(accepted, 5);
    let usage = ledger.usage(&identity, &Entitlement::free(), now).unwrap();
    assert_eq!(usage.used_today, 5);
    assert_eq!(usage.remaining, Some(0));
}

#[test]
fn test_released_reservations_free_their_slot() {
    let ledger = SqliteQuotaLedger::in_memory(QuotaConfig::default()).unwrap();
    let identity = Identity::session("releasing");
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

    let reservations = ledger
        .check_and_reserve_many(&identity, &Entitlement::free(), 5, now)
        .unwrap();
    assert!(ledger
        .check_and_reserve(&identity, &Entitlement::free(), now)
        .is_err());

    for reservation in reservations {
        ledger.release(reservation).unwrap();
    }
    let reservation = ledger
        .check_and_reserve(&identity, &Entitlement::free(), now)
        .unwrap();
    assert_eq!(reservation.remaining, Some(4));
    ledger.commit(reservation).unwrap();
}

#[test]
fn test_counter_resets_after_utc_midnight() {
    let ledger = SqliteQuotaLedger::in_memory(QuotaConfig::default()).unwrap();
    let identity = Identity::session("midnight");
    let day_one = Utc.with_ymd_and_hms(2024, 1, 1, 23, 59, 0).unwrap();
    let day_two = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 1).unwrap();

    for reservation in ledger
        .check_and_reserve_many(&identity, &Entitlement::free(), 5, day_one)
        .unwrap()
    {
        ledger.commit(reservation).unwrap();
    }
    assert!(ledger
        .check_and_reserve(&identity, &Entitlement::free(), day_one)
        .is_err());

    let reservation = ledger
        .check_and_reserve(&identity, &Entitlement::free(), day_two)
        .unwrap();
    assert_eq!(reservation.remaining, Some(4));
    ledger.commit(reservation).unwrap();
    assert_eq!(
        ledger
            .usage(&identity, &Entitlement::free(), day_two)
            .unwrap()
            .used_today,
        1
    );
}
