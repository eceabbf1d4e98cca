use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::header::ACCEPT;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::{debug, trace};

use crate::error::CoreError;

use super::{ActivitySource, DeveloperData, PullRequest, WeeklyCommits};

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const PULLS_PER_PAGE: &str = "100";
const USER_AGENT: &str = concat!("chainplot/", env!("CARGO_PKG_VERSION"));

/// Where the activity data lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityEndpoints {
    /// GitHub REST API root, e.g. `https://api.github.com`.
    pub github_api: String,
    /// `owner/name` of the repository.
    pub github_repo: String,
    pub github_token: Option<String>,
    /// CoinGecko API root, e.g. `https://api.coingecko.com/api/v3`.
    pub gecko_api: String,
    /// CoinGecko coin id.
    pub gecko_coin: String,
    /// Client-side cap on CoinGecko requests, which are made once per week
    /// of the chart.
    pub gecko_requests_per_minute: Option<u32>,
}

/// [`ActivitySource`] over the GitHub and CoinGecko REST APIs.
pub struct HttpActivitySource {
    http: reqwest::Client,
    repo_url: Url,
    coin_url: Url,
    github_token: Option<String>,
    gecko_limiter: Option<Limiter>,
}

#[derive(Deserialize)]
struct CoinHistory {
    #[serde(default)]
    developer_data: Option<DeveloperData>,
}

impl HttpActivitySource {
    pub fn new(endpoints: &ActivityEndpoints) -> Result<Self, CoreError> {
        let repo = endpoints.github_repo.trim_matches('/');
        if repo.split('/').count() != 2 || repo.split('/').any(str::is_empty) {
            return Err(CoreError::InvalidConfig(format!(
                "github repository `{}` must look like `owner/name`",
                endpoints.github_repo
            )));
        }
        let repo_url = join(&base_url(&endpoints.github_api)?, &format!("repos/{repo}/"))?;
        let coin_url = join(
            &base_url(&endpoints.gecko_api)?,
            &format!("coins/{}/", endpoints.gecko_coin),
        )?;

        let gecko_limiter = endpoints
            .gecko_requests_per_minute
            .map(|rpm| {
                NonZeroU32::new(rpm)
                    .map(|rpm| RateLimiter::direct(Quota::per_minute(rpm)))
                    .ok_or_else(|| {
                        CoreError::InvalidConfig(
                            "gecko requests per minute must be at least 1".to_owned(),
                        )
                    })
            })
            .transpose()?;

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| api_error("http client", e))?;

        Ok(Self {
            http,
            repo_url,
            coin_url,
            github_token: endpoints.github_token.clone(),
            gecko_limiter,
        })
    }

    async fn github<T: DeserializeOwned>(&self, url: Url) -> Result<T, CoreError> {
        let mut request = self
            .http
            .get(url)
            .header(ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.github_token {
            request = request.bearer_auth(token);
        }
        fetch_json("github", request).await
    }

    async fn gecko<T: DeserializeOwned>(&self, url: Url) -> Result<T, CoreError> {
        if let Some(limiter) = &self.gecko_limiter {
            limiter.until_ready().await;
        }
        fetch_json("coingecko", self.http.get(url)).await
    }
}

#[async_trait]
impl ActivitySource for HttpActivitySource {
    async fn weekly_commits(&self) -> Result<Vec<WeeklyCommits>, CoreError> {
        self.github(join(&self.repo_url, "stats/commit_activity")?)
            .await
    }

    async fn pulls_page(&self, page: u32) -> Result<Vec<PullRequest>, CoreError> {
        let mut url = join(&self.repo_url, "pulls")?;
        url.query_pairs_mut()
            .append_pair("state", "all")
            .append_pair("sort", "created")
            .append_pair("direction", "desc")
            .append_pair("per_page", PULLS_PER_PAGE)
            .append_pair("page", &page.to_string());
        self.github(url).await
    }

    async fn developer_data(&self, week: i64) -> Result<DeveloperData, CoreError> {
        let mut url = join(&self.coin_url, "history")?;
        url.query_pairs_mut()
            .append_pair("date", &gecko_date(week)?)
            .append_pair("localization", "false");
        let history: CoinHistory = self.gecko(url).await?;
        Ok(history.developer_data.unwrap_or_default())
    }
}

async fn fetch_json<T: DeserializeOwned>(
    service: &'static str,
    request: reqwest::RequestBuilder,
) -> Result<T, CoreError> {
    let response = request.send().await.map_err(|e| api_error(service, e))?;
    let status = response.status();
    let url = response.url().clone();
    let text = response.text().await.map_err(|e| api_error(service, e))?;
    debug!(service, %url, %status, bytes = text.len(), "api response");
    trace!(service, body = %text, "api response body");

    if status == StatusCode::ACCEPTED {
        return Err(CoreError::Api {
            service,
            status: Some(status.as_u16()),
            message: "statistics are still being computed".to_owned(),
        });
    }
    if !status.is_success() {
        return Err(CoreError::Api {
            service,
            status: Some(status.as_u16()),
            message: format!("{url} answered {status}: {}", text.trim()),
        });
    }
    serde_json::from_str(&text)
        .map_err(|e| CoreError::InvalidData(format!("unexpected {service} response from {url}: {e}")))
}

fn api_error(service: &'static str, err: reqwest::Error) -> CoreError {
    CoreError::Api {
        service,
        status: err.status().map(|s| s.as_u16()),
        message: err.to_string(),
    }
}

/// `raw` with a trailing slash, so joins extend its path.
fn base_url(raw: &str) -> Result<Url, CoreError> {
    let with_slash = if raw.ends_with('/') {
        raw.to_owned()
    } else {
        format!("{raw}/")
    };
    let url = Url::parse(&with_slash)
        .map_err(|e| CoreError::InvalidConfig(format!("invalid api url `{raw}`: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(CoreError::InvalidConfig(format!(
            "api url `{raw}` must use http or https"
        )));
    }
    Ok(url)
}

fn join(base: &Url, path: &str) -> Result<Url, CoreError> {
    base.join(path)
        .map_err(|e| CoreError::InvalidConfig(format!("cannot extend `{base}` with `{path}`: {e}")))
}

/// CoinGecko's `dd-mm-yyyy` date for the UTC day containing `week`.
fn gecko_date(week: i64) -> Result<String, CoreError> {
    let day = OffsetDateTime::from_unix_timestamp(week)
        .map_err(|e| CoreError::InvalidData(format!("week {week} is out of range: {e}")))?;
    day.format(format_description!("[day]-[month]-[year]"))
        .map_err(|e| CoreError::InvalidData(format!("cannot format week {week}: {e}")))
}
