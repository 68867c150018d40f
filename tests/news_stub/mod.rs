use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// A two-page listing with four detail pages:
/// #3 fails once with 503 before succeeding, #4 always answers 500.
pub struct NewsStub {
    pub base_url: String,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl NewsStub {
    pub fn spawn() -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start news stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}");

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let flaky_hits = AtomicUsize::new(0);

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let url = request.url().to_string();
                let (status, body) = match url.as_str() {
                    "/news" => (200, LISTING_PAGE_1.to_string()),
                    "/news?page=1" => (200, LISTING_PAGE_2.to_string()),
                    "/news/traffic-fatality-1-1" => (200, detail(1, "24-000101", "January 4, 2024", "Ana Ruiz, Hispanic female, DOB 03/02/1990")),
                    "/news/traffic-fatality-2-1" => (200, detail(2, "24-000202", "January 9, 2024", "John Allen Smith Jr. | W/M | 45 years of age")),
                    "/news/traffic-fatality-3-1" => {
                        if flaky_hits.fetch_add(1, Ordering::SeqCst) == 0 {
                            (503, "busy".to_string())
                        } else {
                            (200, detail(3, "24-000303", "January 17, 2024", "Lee Park, Asian male, 61 years old"))
                        }
                    }
                    "/news/traffic-fatality-4-1" => (500, "boom".to_string()),
                    _ => (404, "not found".to_string()),
                };

                let header =
                    tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"text/html; charset=utf-8"[..])
                        .expect("build header");
                let response = tiny_http::Response::from_string(body)
                    .with_status_code(status)
                    .with_header(header);
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn listing_url(&self) -> String {
        format!("{}/news", self.base_url)
    }
}

impl Drop for NewsStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

const LISTING_PAGE_1: &str = r#"<!doctype html>
<html>
  <head><title>News</title></head>
  <body>
    <ul>
      <li><a href="/news/traffic-fatality-1-1">Traffic Fatality #1</a> January 4, 2024</li>
      <li><a href="/news/traffic-fatality-2-1">Traffic Fatality #2</a> January 9, 2024</li>
      <li><a href="/news/road-closure">Road closure on Lamar</a></li>
    </ul>
    <a href="?page=1" title="Go to next page">next ›</a>
  </body>
</html>
"#;

const LISTING_PAGE_2: &str = r#"<!doctype html>
<html>
  <head><title>News</title></head>
  <body>
    <ul>
      <li><a href="/news/traffic-fatality-3-1">Traffic Fatality #3</a> January 17, 2024</li>
      <li><a href="/news/traffic-fatality-4-1">Traffic Fatality #4</a> January 21, 2024</li>
      <li><a href="/news/traffic-fatality-2-1">Traffic Fatality #2</a> January 9, 2024</li>
    </ul>
    <a href="/news">‹ previous</a>
  </body>
</html>
"#;

fn detail(crash: u32, case: &str, date: &str, deceased: &str) -> String {
    format!(
        r#"<!doctype html>
<html>
  <head><title>Traffic Fatality #{crash}</title></head>
  <body>
    <h1>Traffic Fatality #{crash}</h1>
    <p><strong>Case:</strong> {case}</p>
    <p><strong>Date:</strong> {date}</p>
    <p><strong>Time:</strong> 11:42 p.m.</p>
    <p><strong>Location:</strong> 4500 N. Lamar Blvd</p>
    <p><strong>Deceased:</strong> {deceased}</p>
    <p>The preliminary investigation shows a vehicle struck the pedestrian.</p>
    <p>Fatality information may change.</p>
  </body>
</html>
"#
    )
}
