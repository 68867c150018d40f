use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};
use crashwatch::config::RetrieveConfig;
use crashwatch::fetch::{FetchError, ReqwestTransport};
use crashwatch::model::Gender;
use crashwatch::pipeline::{FailureKind, PageResult, Pipeline};
use tokio_util::sync::CancellationToken;
use url::Url;

mod news_stub;

fn config(listing_url: &str) -> RetrieveConfig {
    let mut config = RetrieveConfig::new(Url::parse(listing_url).expect("parse listing url"));
    config.ordered = true;
    config.retry.max_attempts = 2;
    config.retry.initial_backoff = Duration::from_millis(10);
    config.retry.attempt_timeout = Duration::from_secs(5);
    config.reference_date = NaiveDate::from_ymd_opt(2024, 6, 1).expect("reference date");
    config
}

#[tokio::test]
async fn retrieves_records_across_listing_pages_over_http() {
    let stub = news_stub::NewsStub::spawn();
    let transport = Arc::new(ReqwestTransport::new().expect("build transport"));
    let pipeline = Pipeline::new(config(&stub.listing_url()), transport).expect("valid config");

    let (results, outcome) = pipeline.start(CancellationToken::new()).collect().await;
    let summary = outcome.expect("run succeeds");

    assert_eq!(summary.listing_pages_visited, 2);
    assert_eq!(summary.detail_pages_visited, 4);
    assert_eq!(summary.records_yielded, 3);
    assert_eq!(summary.failures, 1);
    assert_eq!(
        summary.failed_urls,
        vec![format!("{}/news/traffic-fatality-4-1", stub.base_url)]
    );

    let mut records = Vec::new();
    let mut failures = Vec::new();
    for result in results {
        match result {
            PageResult::Record(record) => records.push(record),
            PageResult::Failure(failure) => failures.push(failure),
        }
    }

    let cases = records
        .iter()
        .map(|record| record.case_number.clone().unwrap_or_default())
        .collect::<Vec<_>>();
    assert_eq!(cases, ["24-000101", "24-000202", "24-000303"]);

    let first = &records[0];
    assert_eq!(first.crash_number, Some(1));
    assert_eq!(first.date, NaiveDate::from_ymd_opt(2024, 1, 4));
    assert_eq!(first.time, NaiveTime::from_hms_opt(23, 42, 0));
    assert_eq!(first.location.as_deref(), Some("4500 N. Lamar Blvd"));
    assert_eq!(
        first.link.as_deref(),
        Some(format!("{}/news/traffic-fatality-1-1", stub.base_url).as_str())
    );
    let ana = &first.victims[0];
    assert_eq!(ana.first_name.as_deref(), Some("Ana"));
    assert_eq!(ana.gender, Gender::Female);
    assert_eq!(ana.ethnicity.as_deref(), Some("Hispanic"));
    assert_eq!(ana.age, Some(33));

    let john = &records[1].victims[0];
    assert_eq!(john.middle_name.as_deref(), Some("Allen"));
    assert_eq!(john.generation.as_deref(), Some("Jr."));
    assert_eq!(john.ethnicity.as_deref(), Some("White"));
    assert_eq!(john.age, Some(45));

    assert_eq!(failures.len(), 1);
    assert!(matches!(
        failures[0].kind,
        FailureKind::Fetch {
            attempts: 2,
            error: FetchError::Status(500)
        }
    ));
    assert_eq!(failures[0].page_ref.listing_page, 2);
}

#[tokio::test]
async fn missing_listing_ends_run_with_listing_error() {
    let stub = news_stub::NewsStub::spawn();
    let transport = Arc::new(ReqwestTransport::new().expect("build transport"));
    let pipeline = Pipeline::new(config(&format!("{}/archive", stub.base_url)), transport)
        .expect("valid config");

    let (results, outcome) = pipeline.start(CancellationToken::new()).collect().await;

    assert!(results.is_empty());
    let err = outcome.expect_err("listing 404 fails the run");
    assert!(format!("{:#}", anyhow::Error::from(err)).contains("HTTP status 404"));
}

#[tokio::test]
async fn unreachable_host_is_a_connection_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let transport = ReqwestTransport::new().expect("build transport");
    let url = Url::parse(&format!("http://{addr}/news")).expect("parse url");
    let err = crashwatch::fetch::Transport::get(&transport, &url, Duration::from_secs(2))
        .await
        .expect_err("nothing is listening");
    assert!(err.is_retryable(), "{err:?}");
}
