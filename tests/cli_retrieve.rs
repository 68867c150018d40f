use predicates::prelude::*;

mod news_stub;

#[test]
fn retrieve_csv_prints_one_row_per_record() {
    let stub = news_stub::NewsStub::spawn();

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("crashwatch");
    cmd.args([
        "retrieve",
        "--url",
        &stub.listing_url(),
        "--format",
        "csv",
        "--attempts",
        "2",
        "--backoff-ms",
        "5",
        "--ordered",
    ])
    .assert()
    .success()
    .stdout(predicate::str::starts_with(
        "case_number,crash_number,date,time,location",
    ))
    .stdout(predicate::str::contains(
        "24-000101,1,01/04/2024,11:42 PM,4500 N. Lamar Blvd,",
    ))
    .stdout(predicate::str::contains("24-000303,3,01/17/2024"))
    .stdout(predicate::str::contains("traffic-fatality-4-1").not())
    .stderr(predicate::str::contains("page skipped"));
}

#[test]
fn retrieve_count_respects_date_range() {
    let stub = news_stub::NewsStub::spawn();

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("crashwatch");
    cmd.args([
        "retrieve",
        "--url",
        &stub.listing_url(),
        "--format",
        "count",
        "--attempts",
        "2",
        "--backoff-ms",
        "5",
        "--from",
        "01/05/2024",
        "--to",
        "Jan 2024",
    ])
    .assert()
    .success()
    .stdout("2\n");
}

#[test]
fn missing_listing_exits_non_zero() {
    let stub = news_stub::NewsStub::spawn();

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("crashwatch");
    cmd.args([
        "retrieve",
        "--url",
        &format!("{}/archive", stub.base_url),
        "--attempts",
        "1",
    ])
    .assert()
    .failure()
    .stdout("[]\n")
    .stderr(predicate::str::contains("listing page 1"))
    .stderr(predicate::str::contains("HTTP status 404"));
}

#[test]
fn invalid_options_are_rejected_before_fetching() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("crashwatch");
    cmd.args([
        "retrieve",
        "--url",
        "http://127.0.0.1:9/news",
        "--concurrency",
        "0",
    ])
    .assert()
    .failure()
    .stderr(predicate::str::contains("concurrency must be at least 1"));
}

#[test]
fn verbosity_flag_and_rust_log() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("crashwatch");
    cmd.env_remove("RUST_LOG")
        .args(["-vv", "retrieve", "--concurrency", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("parsed cli"));

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("crashwatch");
    cmd.env("RUST_LOG", "error")
        .args(["-vvv", "retrieve", "--concurrency", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("parsed cli").not());
}
