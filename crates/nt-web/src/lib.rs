//! HTTP integrations for the nutrition diary tracker.
//!
//! Provides:
//! - [`Client`]: fetches the raw diary page for a [`Timeframe`] from the source site
//! - [`InfluxWriter`]: writes day totals as `InfluxDB` line-protocol points

use std::fmt;
use std::time::Duration;

use nt_core::{DiaryEntry, Timeframe};
use thiserror::Error;

/// Default request timeout for all calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DIARY_PATH: &str = "/db/i18n/myday20/";
const INFLUX_WRITE_PATH: &str = "/api/v2/write";
const MEASUREMENT: &str = "nutrition";

/// HTTP client errors.
#[derive(Debug, Error)]
pub enum WebError {
    /// A required setting was missing or blank.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: &'static str },
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The remote side rejected the credentials.
    #[error("unauthorized (status {status})")]
    Unauthorized { status: u16 },
    /// Any other non-success response.
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Diary source site client.
///
/// # Thread Safety
///
/// The client is safe to clone and share across threads. Each clone shares
/// the underlying HTTP connection pool.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a client for the site at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL or username is blank, or if the HTTP
    /// client fails to build.
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, WebError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let username = username.into();
        if base_url.trim().is_empty() {
            return Err(WebError::InvalidConfig {
                reason: "source base URL cannot be empty",
            });
        }
        if username.trim().is_empty() {
            return Err(WebError::InvalidConfig {
                reason: "source username cannot be empty",
            });
        }

        Ok(Self {
            http: build_http()?,
            base_url,
            username,
            password: password.into(),
        })
    }

    /// URL of the diary page covering `timeframe`.
    pub fn diary_url(&self, timeframe: &Timeframe) -> String {
        format!(
            "{}{DIARY_PATH}?lang=de&p={}&q={}",
            self.base_url,
            timeframe.from(),
            timeframe.to()
        )
    }

    /// Fetches the diary markup for one window.
    ///
    /// 401 and 403 responses map to [`WebError::Unauthorized`].
    pub async fn fetch_diary(&self, timeframe: &Timeframe) -> Result<String, WebError> {
        let url = self.diary_url(timeframe);
        tracing::debug!(%url, "fetching diary page");
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(WebError::Unauthorized {
                status: status.as_u16(),
            });
        }
        let body = response.text().await?;
        if !status.is_success() {
            return Err(WebError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

/// `InfluxDB` v2 write client.
#[derive(Clone)]
pub struct InfluxWriter {
    http: reqwest::Client,
    url: String,
    org: String,
    bucket: String,
    token: String,
}

impl fmt::Debug for InfluxWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfluxWriter")
            .field("url", &self.url)
            .field("org", &self.org)
            .field("bucket", &self.bucket)
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl InfluxWriter {
    /// Creates a writer for the given server, organisation and bucket.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL or bucket is blank, or if the HTTP client
    /// fails to build.
    pub fn new(
        url: impl Into<String>,
        org: impl Into<String>,
        bucket: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, WebError> {
        let url = url.into().trim_end_matches('/').to_string();
        let bucket = bucket.into();
        if url.trim().is_empty() {
            return Err(WebError::InvalidConfig {
                reason: "influx URL cannot be empty",
            });
        }
        if bucket.trim().is_empty() {
            return Err(WebError::InvalidConfig {
                reason: "influx bucket cannot be empty",
            });
        }

        Ok(Self {
            http: build_http()?,
            url,
            org: org.into(),
            bucket,
            token: token.into(),
        })
    }

    /// Writes one point for `entry`, stamped with `timestamp` (unix seconds).
    pub async fn write(&self, entry: &DiaryEntry, timestamp: i64) -> Result<(), WebError> {
        let body = line_protocol(entry, timestamp);
        let response = self
            .http
            .post(format!("{}{INFLUX_WRITE_PATH}", self.url))
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "s"),
            ])
            .header(reqwest::header::AUTHORIZATION, format!("Token {}", self.token))
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(WebError::Unauthorized {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let body = response.text().await?;
            return Err(WebError::Status {
                status: status.as_u16(),
                body,
            });
        }
        tracing::debug!(date = %entry.date, "wrote time-series point");
        Ok(())
    }
}

/// Renders the day totals as a single line-protocol point.
///
/// The date is a tag so re-exports of a day overwrite the same series point.
pub fn line_protocol(entry: &DiaryEntry, timestamp: i64) -> String {
    let t = &entry.totals;
    format!(
        "{MEASUREMENT},date={} calories={},fat={},carbs={},sugar={},protein={},fibre={} {timestamp}",
        nt_core::format_date(entry.date),
        t.calories,
        t.fat,
        t.carbs,
        t.sugar,
        t.protein,
        t.fibre,
    )
}

fn build_http() -> Result<reqwest::Client, WebError> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .map_err(WebError::ClientBuild)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use nt_core::Totals;
    use wiremock::matchers::{body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn window() -> Timeframe {
        Timeframe::new(1_724_716_800, 1_724_803_199).unwrap()
    }

    fn entry() -> DiaryEntry {
        DiaryEntry {
            date: NaiveDate::from_ymd_opt(2024, 8, 27).unwrap(),
            products: Vec::new(),
            totals: Totals {
                calories: 1084.0,
                fat: 32.7,
                carbs: 144.2,
                sugar: 38.9,
                protein: 46.8,
                fibre: 14.6,
            },
        }
    }

    #[test]
    fn client_rejects_blank_username() {
        assert!(matches!(
            Client::new("https://fddb.info", "  ", "pw"),
            Err(WebError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn client_debug_redacts_password() {
        let client = Client::new("https://fddb.info", "anna", "geheim").unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("geheim"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn diary_url_carries_window_bounds() {
        let client = Client::new("https://fddb.info/", "anna", "geheim").unwrap();
        assert_eq!(
            client.diary_url(&window()),
            "https://fddb.info/db/i18n/myday20/?lang=de&p=1724716800&q=1724803199"
        );
    }

    #[test]
    fn line_protocol_renders_all_totals() {
        assert_eq!(
            line_protocol(&entry(), 1_724_716_800),
            "nutrition,date=2024-08-27 calories=1084,fat=32.7,carbs=144.2,sugar=38.9,protein=46.8,fibre=14.6 1724716800"
        );
    }

    #[tokio::test]
    async fn fetch_diary_sends_window_and_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/db/i18n/myday20/"))
            .and(query_param("lang", "de"))
            .and(query_param("p", "1724716800"))
            .and(query_param("q", "1724803199"))
            .and(header("authorization", "Basic YW5uYTpnZWhlaW0="))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>diary</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let client = Client::new(server.uri(), "anna", "geheim").unwrap();
        let body = client.fetch_diary(&window()).await.unwrap();
        assert_eq!(body, "<html>diary</html>");
    }

    #[tokio::test]
    async fn fetch_diary_maps_forbidden_to_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let client = Client::new(server.uri(), "anna", "falsch").unwrap();
        let err = client.fetch_diary(&window()).await.unwrap_err();
        assert!(matches!(err, WebError::Unauthorized { status: 403 }));
    }

    #[tokio::test]
    async fn fetch_diary_reports_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let client = Client::new(server.uri(), "anna", "geheim").unwrap();
        let err = client.fetch_diary(&window()).await.unwrap_err();
        assert!(matches!(err, WebError::Status { status: 503, ref body } if body == "maintenance"));
    }

    #[tokio::test]
    async fn influx_write_posts_line_protocol() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/write"))
            .and(query_param("org", "home"))
            .and(query_param("bucket", "diary"))
            .and(query_param("precision", "s"))
            .and(header("authorization", "Token t0ken"))
            .and(body_string(line_protocol(&entry(), 1_724_716_800)))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let writer = InfluxWriter::new(server.uri(), "home", "diary", "t0ken").unwrap();
        writer.write(&entry(), 1_724_716_800).await.unwrap();
    }

    #[tokio::test]
    async fn influx_write_rejects_bad_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let writer = InfluxWriter::new(server.uri(), "home", "diary", "wrong").unwrap();
        let err = writer.write(&entry(), 0).await.unwrap_err();
        assert!(matches!(err, WebError::Unauthorized { status: 401 }));
        assert!(!format!("{writer:?}").contains("wrong"));
    }
}
