//! Shared fixtures: an in-memory CRM seeded with a reproducible population.
#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
use churnguard_core::{
    config::LabelConfig,
    features::{derive_row, CustomerFeatureRow},
    rng::StageRng,
    store::{CrmStore, CustomerFacts, NewCustomer},
    ChurnConfig,
};

/// Fixed "today" for every test.
pub fn reference_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 30).expect("valid date")
}

pub fn days_ago(days: i64) -> String {
    (reference_date() - Duration::days(days))
        .format("%Y-%m-%d")
        .to_string()
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn empty_store() -> CrmStore {
    init_logging();
    let store = CrmStore::in_memory(&ChurnConfig::default().store).expect("in-memory store");
    store.migrate().expect("migration");
    store
}

/// `n` customers spread over the four lifecycle segments. Roughly a third
/// have lapsed for 300+ days, the rest visited within the last 40 days,
/// so both training labels are well populated.
pub fn seeded_store(n: usize, seed: u64) -> CrmStore {
    populate(empty_store(), n, seed)
}

/// Shared-cache in-memory URI, so a second connection can reach the
/// same database as the store.
pub fn shared_uri(name: &str) -> String {
    format!("file:{name}?mode=memory&cache=shared")
}

/// Like [`seeded_store`], but opened at [`shared_uri`]`(name)`.
pub fn seeded_shared_store(name: &str, n: usize, seed: u64) -> CrmStore {
    init_logging();
    let store = CrmStore::open(&shared_uri(name), &ChurnConfig::default().store)
        .expect("shared in-memory store");
    store.migrate().expect("migration");
    populate(store, n, seed)
}

/// Make every later insert into `segment_by_customer` abort.
pub fn reject_assignment_inserts(uri: &str) {
    let conn = rusqlite::Connection::open_with_flags(
        uri,
        rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE | rusqlite::OpenFlags::SQLITE_OPEN_URI,
    )
    .expect("second connection");
    conn.execute_batch(
        "CREATE TRIGGER reject_assignments BEFORE INSERT ON segment_by_customer
         BEGIN SELECT RAISE(ABORT, 'segment_by_customer is read-only'); END;",
    )
    .expect("trigger");
}

fn populate(store: CrmStore, n: usize, seed: u64) -> CrmStore {
    store.insert_shop(1, "Gangnam").expect("shop");
    store.insert_shop(2, "Hongdae").expect("shop");

    let mut rng = StageRng::new(seed, 0).with_name("fixture");
    for i in 0..n {
        let id = i as i64 + 1;
        let visits = match i % 4 {
            0 => 1 + rng.next_below(2) as i64,
            1 => 3 + rng.next_below(7) as i64,
            2 => 10 + rng.next_below(10) as i64,
            _ => 20 + rng.next_below(20) as i64,
        };
        let lapsed = rng.next_f64() < 0.35;
        let tenure = 120 + rng.next_below(700) as i64;
        let since_last = if lapsed {
            300 + rng.next_below(300) as i64
        } else {
            rng.next_below(40) as i64
        };
        let gender = match rng.next_below(3) {
            0 => Some("F".to_string()),
            1 => Some("M".to_string()),
            _ => None,
        };
        let birthdate = (rng.next_f64() < 0.8).then(|| days_ago(7_000 + rng.next_below(12_000) as i64));

        store
            .insert_customer(&NewCustomer {
                customer_id: id,
                shop_id: Some(1 + (i % 2) as i64),
                customer_name: format!("Customer {id}"),
                phone_number: Some(format!("010-{:04}-{:04}", id, 9_999 - id)),
                visit_count: visits,
                total_revenue: visits as f64 * (30_000.0 + rng.next_below(40_000) as f64),
                recent_visit_date: Some(days_ago(since_last.min(tenure))),
                birthdate,
                noshow_count: if lapsed { rng.next_below(4) as i64 } else { 0 },
                gender,
                marketing_consent: rng.next_below(2) == 0,
                channel_id: (rng.next_f64() < 0.9).then(|| 1 + rng.next_below(4) as i64),
                created_at: Some(days_ago(tenure)),
            })
            .expect("customer");

        for _ in 0..visits.min(6) {
            store
                .insert_reservation(id, "PAID", Some(&days_ago(since_last)))
                .expect("reservation");
            store
                .insert_sale(id, 30_000.0 + rng.next_below(50_000) as f64, Some(&days_ago(since_last)))
                .expect("sale");
        }
        if lapsed {
            store.insert_reservation(id, "NO_SHOW", None).expect("reservation");
            store.insert_reservation(id, "CBC", None).expect("reservation");
        }
    }
    store
}

/// Facts for a synthetic customer created `tenure` days ago whose last visit
/// was `since_last` days ago.
pub fn facts(id: i64, visits: i64, tenure: i64, since_last: i64) -> CustomerFacts {
    CustomerFacts {
        customer_id: id,
        customer_name: format!("Customer {id}"),
        visit_count: visits,
        total_revenue: visits as f64 * 50_000.0,
        recent_visit_date: Some(days_ago(since_last)),
        created_at: Some(days_ago(tenure)),
        ..CustomerFacts::default()
    }
}

/// A derived row with `churn_probability` preset.
pub fn row(visits: i64, tenure: i64, since_last: i64, probability: f64) -> CustomerFeatureRow {
    let mut row = derive_row(
        &facts(1, visits, tenure, since_last),
        reference_date(),
        &LabelConfig::default(),
    );
    row.churn_probability = probability;
    row
}
