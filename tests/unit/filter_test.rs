//! Tests for roster record filters

use chrono::NaiveDate;
use roster_mailer::core::RosterRecord;
use roster_mailer::infra::store::RecordFilter;
use serde_json::json;

fn ada() -> RosterRecord {
    RosterRecord::new(1)
        .with_email("Ada@Example.com")
        .with_name("Ada", "Lovelace")
        .with_attribute("date_of_birth", "1990-12-10")
        .with_attribute("is_a_worker", "Yes")
        .with_attribute("is_born_again", false)
        .with_attribute("service_units", json!(["Media", "Choir"]))
}

fn bob() -> RosterRecord {
    RosterRecord::new(2)
        .with_email("bob@example.com")
        .with_name("Bob", "Hope")
        .with_attribute("service_units", "Ushering, Media")
}

#[test]
fn test_empty_filter_matches_everything() {
    let filter = RecordFilter::new();
    assert!(filter.is_empty());
    assert!(filter.matches(&ada()));
    assert!(filter.matches(&RosterRecord::default()));
}

#[test]
fn test_simple_fields_ignore_case() {
    let filter = RecordFilter::new().with_field("first_name", "ADA");
    assert!(filter.matches(&ada()));
    assert!(!filter.matches(&bob()));
}

#[test]
fn test_date_of_birth_exact_and_range() {
    assert!(RecordFilter::new().with_date_of_birth("1990-12-10").matches(&ada()));
    assert!(!RecordFilter::new().with_date_of_birth("1990-12-11").matches(&ada()));

    let from = NaiveDate::from_ymd_opt(1990, 1, 1);
    let to = NaiveDate::from_ymd_opt(1990, 12, 31);
    assert!(RecordFilter::new().with_date_of_birth_range(from, to).matches(&ada()));
    assert!(!RecordFilter::new().with_date_of_birth_range(None, from).matches(&ada()));
    // No stored date never matches a range.
    assert!(!RecordFilter::new().with_date_of_birth_range(from, None).matches(&bob()));
}

#[test]
fn test_flags_accept_strings_and_bools() {
    assert!(RecordFilter::new().with_flag("is_a_worker", true).matches(&ada()));
    assert!(RecordFilter::new().with_flag("is_born_again", false).matches(&ada()));
    assert!(!RecordFilter::new().with_flag("is_a_worker", true).matches(&bob()));
}

#[test]
fn test_membership_over_arrays_and_csv() {
    let media = RecordFilter::new().with_membership("service_units", "media");
    assert!(media.matches(&ada()));
    assert!(media.matches(&bob()));
    let choir = RecordFilter::new().with_membership("service_units", "Choir");
    assert!(choir.matches(&ada()));
    assert!(!choir.matches(&bob()));
}

#[test]
fn test_emails_in_allow_list() {
    let filter = RecordFilter::new().with_emails_in(["ada@example.com"]);
    assert!(filter.matches(&ada()));
    assert!(!filter.matches(&bob()));
}

#[test]
fn test_from_json_combines_predicates() {
    let filter = RecordFilter::from_json(&json!({
        "is_a_worker": true,
        "service_unit": "Media",
        "date_of_birth": {"from": "1990-01-01", "to": "1990-12-31"},
        "emails_in": ["ada@example.com", "bob@example.com"],
        "last_name": "lovelace"
    }))
    .unwrap();
    assert!(filter.matches(&ada()));
    assert!(!filter.matches(&bob()));
}

#[test]
fn test_from_json_rejects_bad_shapes() {
    assert!(RecordFilter::from_json(&json!(["x"])).is_err());
    assert!(RecordFilter::from_json(&json!({"first_name": 3})).is_err());
    assert!(RecordFilter::from_json(&json!({"emails_in": "a@x.com"})).is_err());
    assert!(RecordFilter::from_json(&json!({"date_of_birth": {"from": "soon"}})).is_err());
    assert!(RecordFilter::from_json(&json!({"nickname": "ada"})).is_err());
}
