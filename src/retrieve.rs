use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use chrono::Datelike as _;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::cli::RetrieveArgs;
use crate::config::RetrieveConfig;
use crate::dates;
use crate::fetch::{ReqwestTransport, RetryPolicy};
use crate::pipeline::{PageResult, Pipeline, RunError};
use crate::render;

pub fn config_from_args(args: &RetrieveArgs) -> anyhow::Result<RetrieveConfig> {
    let listing_url = Url::parse(&args.url).context("parse --url")?;
    let mut config = RetrieveConfig::new(listing_url);
    let year = config.reference_date.year();

    config.from_date = args
        .from
        .as_deref()
        .map(|text| dates::parse_lower_bound(text, year))
        .transpose()
        .context("parse --from")?
        .flatten();
    config.to_date = args
        .to
        .as_deref()
        .map(|text| dates::parse_upper_bound(text, year))
        .transpose()
        .context("parse --to")?
        .flatten();
    config.link_pattern = args.link_pattern.clone();
    config.max_pages = args.pages;
    config.max_concurrent_fetches = args.concurrency;
    config.ordered = args.ordered;
    config.retry = RetryPolicy {
        max_attempts: args.attempts,
        initial_backoff: Duration::from_millis(args.backoff_ms),
        multiplier: args.backoff_multiplier,
        attempt_timeout: Duration::from_secs(args.timeout_secs),
    };

    config.validate().context("validate options")?;
    Ok(config)
}

pub async fn run(args: RetrieveArgs) -> anyhow::Result<()> {
    let config = config_from_args(&args)?;
    let transport = ReqwestTransport::new().context("build http transport")?;
    let pipeline = Pipeline::new(config, Arc::new(transport)).context("build pipeline")?;

    let cancel = CancellationToken::new();
    let ctrl_c = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received; stopping after in-flight pages");
                cancel.cancel();
            }
        }
    });

    let mut handle = pipeline.start(cancel);
    let mut records = Vec::new();
    while let Some(result) = handle.next().await {
        match result {
            PageResult::Record(record) => records.push(record),
            PageResult::Failure(failure) => {
                tracing::warn!(
                    url = %failure.page_ref.url,
                    listing_page = failure.page_ref.listing_page,
                    error = %failure.kind,
                    "page skipped"
                );
            }
        }
    }
    let outcome = handle.finish().await;
    ctrl_c.abort();

    let mut stdout = std::io::stdout().lock();
    render::renderer_for(args.format)
        .render(&records, &mut stdout)
        .context("write records")?;
    stdout.flush().context("flush stdout")?;

    match outcome {
        Ok(summary) => {
            if summary.failures > 0 {
                tracing::warn!(
                    failures = summary.failures,
                    failed_urls = ?summary.failed_urls,
                    "some pages could not be retrieved"
                );
            }
            Ok(())
        }
        Err(RunError::Cancelled(summary)) => {
            anyhow::bail!(
                "interrupted after {} of the discovered pages ({} records)",
                summary.detail_pages_visited,
                summary.records_yielded
            )
        }
        Err(err) => Err(err.into()),
    }
}
