use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::NaiveDate;
use futures::stream::{self, Stream, TryStreamExt as _};
use regex::Regex;
use scraper::{Html, Selector};
use thiserror::Error;
use url::Url;

use crate::dates;
use crate::extract::PageText;
use crate::fetch::{FetchError, FetchOutcome, Fetcher};
use crate::model::PageRef;

static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("anchor selector"));

#[derive(Debug, Error)]
pub enum PaginationError {
    #[error("listing page {page} ({url}) failed")]
    Terminal {
        page: u32,
        url: Url,
        attempts: u32,
        #[source]
        error: FetchError,
    },
    #[error("listing page {page} ({url}) failed after {attempts} attempts")]
    Exhausted {
        page: u32,
        url: Url,
        attempts: u32,
        #[source]
        error: FetchError,
    },
}

impl PaginationError {
    pub fn fetch_error(&self) -> &FetchError {
        match self {
            PaginationError::Terminal { error, .. } | PaginationError::Exhausted { error, .. } => error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginatorState {
    Start,
    /// Page `n` was read and another page may follow.
    HasPage(u32),
    /// The listing ran out of pages.
    Exhausted,
    /// A page limit or the date lower bound stopped traversal.
    Bounded,
    Failed,
}

#[derive(Debug, Clone)]
pub struct ListingPage {
    pub number: u32,
    pub url: Url,
    pub refs: Vec<PageRef>,
    pub has_next: bool,
    pub dates: Vec<NaiveDate>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct ParsedListing {
    pub links: Vec<Url>,
    pub has_next: bool,
    pub dates: Vec<NaiveDate>,
}

/// Walks listing pages in order, handing out detail-page references.
pub struct Paginator {
    fetcher: Fetcher,
    listing_url: Url,
    link_pattern: Regex,
    max_pages: Option<u32>,
    from_date: Option<NaiveDate>,
    reference_year: i32,
    state: PaginatorState,
    seen: HashSet<Url>,
    next_seq: u64,
}

impl Paginator {
    pub fn new(
        fetcher: Fetcher,
        listing_url: Url,
        link_pattern: Regex,
        max_pages: Option<u32>,
        from_date: Option<NaiveDate>,
        reference_year: i32,
    ) -> Self {
        Self {
            fetcher,
            listing_url,
            link_pattern,
            max_pages,
            from_date,
            reference_year,
            state: PaginatorState::Start,
            seen: HashSet::new(),
            next_seq: 0,
        }
    }

    pub fn state(&self) -> PaginatorState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self.state,
            PaginatorState::Exhausted | PaginatorState::Bounded | PaginatorState::Failed
        )
    }

    /// Fetches the next listing page. `Ok(None)` once traversal has ended.
    pub async fn next_page(&mut self) -> Result<Option<ListingPage>, PaginationError> {
        let number = match self.state {
            PaginatorState::Start => 1,
            PaginatorState::HasPage(n) => n + 1,
            PaginatorState::Exhausted | PaginatorState::Bounded | PaginatorState::Failed => {
                return Ok(None);
            }
        };
        let url = listing_page_url(&self.listing_url, number);
        tracing::info!(page = number, url = %url, "fetching listing page");

        let body = match self.fetcher.fetch(&url).await {
            FetchOutcome::Success(body) => body,
            FetchOutcome::Terminal { attempts, error } => {
                self.state = PaginatorState::Failed;
                return Err(PaginationError::Terminal {
                    page: number,
                    url,
                    attempts,
                    error,
                });
            }
            FetchOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                self.state = PaginatorState::Failed;
                return Err(PaginationError::Exhausted {
                    page: number,
                    url,
                    attempts,
                    error: last_error,
                });
            }
        };

        let parsed = parse_listing(&body, &url, &self.link_pattern, self.reference_year);
        let past_lower_bound = self.from_date.is_some_and(|from| {
            !parsed.dates.is_empty() && parsed.dates.iter().all(|date| dates::is_before(*date, from))
        });
        let found = parsed.links.len();

        let mut refs = Vec::new();
        if !past_lower_bound {
            for link in parsed.links {
                if !self.seen.insert(link.clone()) {
                    continue;
                }
                refs.push(PageRef {
                    url: link,
                    listing_url: url.clone(),
                    listing_page: number,
                    seq: self.next_seq,
                });
                self.next_seq += 1;
            }
        }

        self.state = if found == 0 || !parsed.has_next {
            PaginatorState::Exhausted
        } else if past_lower_bound || self.max_pages.is_some_and(|max| number >= max) {
            PaginatorState::Bounded
        } else {
            PaginatorState::HasPage(number)
        };
        tracing::debug!(
            page = number,
            links = found,
            new_refs = refs.len(),
            has_next = parsed.has_next,
            state = ?self.state,
            "listing page parsed"
        );

        Ok(Some(ListingPage {
            number,
            url,
            refs,
            has_next: parsed.has_next,
            dates: parsed.dates,
        }))
    }

    /// Flattens the traversal into a stream of detail-page references.
    pub fn into_stream(self) -> impl Stream<Item = Result<PageRef, PaginationError>> + Send {
        stream::try_unfold(self, |mut paginator| async move {
            let page = paginator.next_page().await?;
            Ok::<_, PaginationError>(page.map(|page| {
                let refs = stream::iter(page.refs.into_iter().map(Ok::<_, PaginationError>));
                (refs, paginator)
            }))
        })
        .try_flatten()
    }
}

/// Page 1 is the base URL; page `n` adds `page=n-1`.
pub fn listing_page_url(base: &Url, number: u32) -> Url {
    if number <= 1 {
        return base.clone();
    }
    let kept = base
        .query_pairs()
        .filter(|(key, _)| key != "page")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect::<Vec<_>>();

    let mut url = base.clone();
    url.set_query(None);
    {
        let mut query = url.query_pairs_mut();
        for (key, value) in &kept {
            query.append_pair(key, value);
        }
        query.append_pair("page", &(number - 1).to_string());
    }
    url
}

pub(crate) fn parse_listing(
    html: &str,
    base: &Url,
    link_pattern: &Regex,
    reference_year: i32,
) -> ParsedListing {
    let document = Html::parse_document(html);
    let mut parsed = ParsedListing::default();

    for anchor in document.select(&ANCHOR_SELECTOR) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let text = anchor.text().collect::<Vec<_>>().join(" ");
        let text = text.trim();

        let rel_next = anchor
            .value()
            .attr("rel")
            .is_some_and(|rel| rel.split_whitespace().any(|token| token.eq_ignore_ascii_case("next")));
        if rel_next || text.to_lowercase().starts_with("next") {
            parsed.has_next = true;
            continue;
        }

        if !link_pattern.is_match(href) && !link_pattern.is_match(text) {
            continue;
        }
        let Ok(mut link) = base.join(href) else {
            tracing::debug!(href = href, "skipping unresolvable link");
            continue;
        };
        link.set_fragment(None);
        if !parsed.links.contains(&link) {
            parsed.links.push(link);
        }
    }

    let text = PageText::parse(html).blocks.join("\n");
    parsed.dates = dates::find_dates(&text, reference_year);
    parsed
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::StreamExt as _;

    use super::*;
    use crate::fetch::{HttpResponse, RetryPolicy, Transport};

    struct Site {
        pages: HashMap<String, String>,
        requested: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for Site {
        async fn get(&self, url: &Url, _timeout: Duration) -> Result<HttpResponse, FetchError> {
            self.requested.lock().unwrap().push(url.to_string());
            match self.pages.get(url.as_str()) {
                Some(body) => Ok(HttpResponse {
                    status: 200,
                    body: body.clone(),
                }),
                None => Ok(HttpResponse {
                    status: 404,
                    body: String::new(),
                }),
            }
        }
    }

    const BASE: &str = "http://example.test/news";

    fn listing(items: &[(&str, &str)], next: bool) -> String {
        let mut html = String::from("<html><body><ul>");
        for (slug, date) in items {
            html.push_str(&format!(
                r#"<li><a href="/news/{slug}">Traffic Fatality {slug}</a> <span>{date}</span></li>"#
            ));
        }
        html.push_str(r#"</ul><a href="/news/about">About</a>"#);
        if next {
            html.push_str(r#"<a href="?page=99">next ›</a>"#);
        }
        html.push_str("</body></html>");
        html
    }

    fn site(pages: Vec<(u32, String)>) -> Arc<Site> {
        let base = Url::parse(BASE).unwrap();
        let pages = pages
            .into_iter()
            .map(|(n, body)| (listing_page_url(&base, n).to_string(), body))
            .collect();
        Arc::new(Site {
            pages,
            requested: Mutex::new(Vec::new()),
        })
    }

    fn paginator(site: Arc<Site>, max_pages: Option<u32>, from: Option<NaiveDate>) -> Paginator {
        let fetcher = Fetcher::new(
            site,
            RetryPolicy {
                max_attempts: 1,
                ..RetryPolicy::default()
            },
        );
        Paginator::new(
            fetcher,
            Url::parse(BASE).unwrap(),
            Regex::new("traffic-fatality").unwrap(),
            max_pages,
            from,
            2024,
        )
    }

    fn three_pages() -> Vec<(u32, String)> {
        vec![
            (
                1,
                listing(
                    &[
                        ("traffic-fatality-6-3", "March 20, 2024"),
                        ("traffic-fatality-5-3", "March 12, 2024"),
                    ],
                    true,
                ),
            ),
            (
                2,
                listing(
                    &[
                        ("traffic-fatality-4-3", "February 28, 2024"),
                        ("traffic-fatality-5-3", "March 12, 2024"),
                    ],
                    true,
                ),
            ),
            (
                3,
                listing(&[("traffic-fatality-1-1", "January 4, 2024")], false),
            ),
        ]
    }

    #[test]
    fn page_urls_use_zero_based_query() {
        let base = Url::parse("http://example.test/news?sort=desc&page=7").unwrap();
        assert_eq!(listing_page_url(&base, 1), base);
        assert_eq!(
            listing_page_url(&base, 3).as_str(),
            "http://example.test/news?sort=desc&page=2"
        );
    }

    #[test]
    fn parses_links_next_marker_and_dates() {
        let base = Url::parse(BASE).unwrap();
        let html = listing(&[("traffic-fatality-2-1", "01/09/2024")], true);
        let parsed = parse_listing(&html, &base, &Regex::new("traffic-fatality").unwrap(), 2024);

        assert_eq!(
            parsed.links,
            vec![Url::parse("http://example.test/news/traffic-fatality-2-1").unwrap()]
        );
        assert!(parsed.has_next);
        assert_eq!(parsed.dates, vec![NaiveDate::from_ymd_opt(2024, 1, 9).unwrap()]);
    }

    #[tokio::test]
    async fn stops_after_page_without_next_link() {
        let site = site(three_pages());
        let refs = paginator(site.clone(), None, None)
            .into_stream()
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        let slugs = refs
            .iter()
            .map(|r| r.url.path().trim_start_matches("/news/").to_string())
            .collect::<Vec<_>>();
        assert_eq!(
            slugs,
            [
                "traffic-fatality-6-3",
                "traffic-fatality-5-3",
                "traffic-fatality-4-3",
                "traffic-fatality-1-1"
            ]
        );
        assert_eq!(refs.iter().map(|r| r.seq).collect::<Vec<_>>(), [0, 1, 2, 3]);
        assert_eq!(refs[2].listing_page, 2);
        assert_eq!(site.requested.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn max_pages_bounds_traversal() {
        let site = site(three_pages());
        let mut paginator = paginator(site.clone(), Some(2), None);

        assert_eq!(paginator.next_page().await.unwrap().unwrap().refs.len(), 2);
        assert_eq!(paginator.next_page().await.unwrap().unwrap().refs.len(), 1);
        assert_eq!(paginator.state(), PaginatorState::Bounded);
        assert!(paginator.next_page().await.unwrap().is_none());
        assert_eq!(site.requested.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn page_entirely_before_lower_bound_ends_traversal() {
        let site = site(vec![
            (
                1,
                listing(
                    &[
                        ("traffic-fatality-8-3", "March 2, 2024"),
                        ("traffic-fatality-7-2", "February 27, 2024"),
                    ],
                    true,
                ),
            ),
            (2, listing(&[("traffic-fatality-6-2", "February 20, 2024")], true)),
            (3, listing(&[("traffic-fatality-5-2", "February 11, 2024")], false)),
        ]);
        let from = NaiveDate::from_ymd_opt(2024, 3, 1);
        let mut paginator = paginator(site.clone(), None, from);

        let first = paginator.next_page().await.unwrap().unwrap();
        assert_eq!(first.refs.len(), 2, "mixed page is still followed");
        assert_eq!(paginator.state(), PaginatorState::HasPage(1));

        let second = paginator.next_page().await.unwrap().unwrap();
        assert!(second.refs.is_empty());
        assert_eq!(paginator.state(), PaginatorState::Bounded);
        assert!(paginator.next_page().await.unwrap().is_none());
        assert_eq!(site.requested.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn listing_failure_is_reported() {
        let site = site(vec![(1, listing(&[("traffic-fatality-9-1", "May 1, 2024")], true))]);
        let mut paginator = paginator(site, None, None);

        assert!(paginator.next_page().await.unwrap().is_some());
        let err = paginator.next_page().await.unwrap_err();
        assert!(matches!(
            err,
            PaginationError::Terminal {
                page: 2,
                error: FetchError::Status(404),
                ..
            }
        ));
        assert_eq!(paginator.state(), PaginatorState::Failed);
        assert!(paginator.next_page().await.unwrap().is_none());
    }
}
