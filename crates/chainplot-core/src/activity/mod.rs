//! Weekly development-activity chart.
//!
//! Unlike the block charts this document is rebuilt from scratch on every
//! run: the axis is the last 52 weeks reported by GitHub's commit activity
//! statistics, pull requests are bucketed into those weeks, and CoinGecko's
//! developer data is sampled once per week.

mod http;

pub use http::{ActivityEndpoints, HttpActivitySource};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::accumulator::retry;
use crate::config::RetryPolicy;
use crate::error::CoreError;
use crate::store::JsonFileStore;

// ==============================================================================
// Source Data
// ==============================================================================

/// One entry of GitHub's `stats/commit_activity`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WeeklyCommits {
    /// Start of the week, unix seconds.
    pub week: i64,
    pub total: u64,
}

/// The pull request fields the chart reads. Timestamps are RFC 3339.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequest {
    pub created_at: String,
    #[serde(default)]
    pub merged_at: Option<String>,
    #[serde(default)]
    pub closed_at: Option<String>,
}

/// CoinGecko `developer_data` for one day. Missing figures stay `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct DeveloperData {
    #[serde(default)]
    pub forks: Option<u64>,
    #[serde(default)]
    pub stars: Option<u64>,
    #[serde(default)]
    pub subscribers: Option<u64>,
    #[serde(default)]
    pub pull_request_contributors: Option<u64>,
}

/// Where the activity chart gets its data.
#[async_trait]
pub trait ActivitySource: Send + Sync {
    /// Commit totals for the last year, oldest week first.
    async fn weekly_commits(&self) -> Result<Vec<WeeklyCommits>, CoreError>;

    /// Page `page` (1-based) of all pull requests, newest first. An empty
    /// page means there are no more.
    async fn pulls_page(&self, page: u32) -> Result<Vec<PullRequest>, CoreError>;

    /// Developer statistics as of the day containing `week`.
    async fn developer_data(&self, week: i64) -> Result<DeveloperData, CoreError>;
}

// ==============================================================================
// Chart Document
// ==============================================================================

/// The `github_data` document read by the activity chart page. Every
/// array has one entry per element of `weeks_axis`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevActivity {
    pub weeks_axis: Vec<i64>,
    pub commits: Vec<u64>,
    pub pulls_opened: Vec<u64>,
    pub pulls_merged: Vec<u64>,
    pub pulls_closed: Vec<u64>,
    pub forks: Vec<Option<u64>>,
    pub stars: Vec<Option<u64>>,
    pub subscribers: Vec<Option<u64>>,
    pub pull_request_contributors: Vec<Option<u64>>,
}

impl DevActivity {
    fn from_commits(weeks: Vec<WeeklyCommits>) -> Self {
        let len = weeks.len();
        let (weeks_axis, commits) = weeks.into_iter().map(|w| (w.week, w.total)).unzip();
        Self {
            weeks_axis,
            commits,
            pulls_opened: vec![0; len],
            pulls_merged: vec![0; len],
            pulls_closed: vec![0; len],
            forks: Vec::with_capacity(len),
            stars: Vec::with_capacity(len),
            subscribers: Vec::with_capacity(len),
            pull_request_contributors: Vec::with_capacity(len),
        }
    }

    /// Count a pull request as opened in its creation week and as merged,
    /// or else closed, in the week that happened.
    fn count_pull(&mut self, pull: &PullRequest) -> Result<(), CoreError> {
        let opened = epoch_seconds(&pull.created_at)?;
        add_to_weekly_sum(&self.weeks_axis, &mut self.pulls_opened, opened);

        match (&pull.merged_at, &pull.closed_at) {
            (Some(merged), _) => {
                let merged = epoch_seconds(merged)?;
                add_to_weekly_sum(&self.weeks_axis, &mut self.pulls_merged, merged);
            }
            (None, Some(closed)) => {
                let closed = epoch_seconds(closed)?;
                add_to_weekly_sum(&self.weeks_axis, &mut self.pulls_closed, closed);
            }
            (None, None) => {}
        }
        Ok(())
    }

    fn push_developer_data(&mut self, data: DeveloperData) {
        self.forks.push(data.forks);
        self.stars.push(data.stars);
        self.subscribers.push(data.subscribers);
        self.pull_request_contributors.push(data.pull_request_contributors);
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let weeks = self.weeks_axis.len();
        let lengths = [
            ("commits", self.commits.len()),
            ("pulls_opened", self.pulls_opened.len()),
            ("pulls_merged", self.pulls_merged.len()),
            ("pulls_closed", self.pulls_closed.len()),
            ("forks", self.forks.len()),
            ("stars", self.stars.len()),
            ("subscribers", self.subscribers.len()),
            ("pull_request_contributors", self.pull_request_contributors.len()),
        ];
        match lengths.iter().find(|(_, len)| *len != weeks) {
            Some((name, len)) => Err(CoreError::InvalidData(format!(
                "activity series `{name}` has {len} entries for {weeks} weeks"
            ))),
            None => Ok(()),
        }
    }
}

/// Add one to the bucket of the last week starting at or before `at`.
/// Events before the first week are dropped; events after the last week
/// land in the last week.
pub fn add_to_weekly_sum(weeks: &[i64], sums: &mut [u64], at: i64) {
    if let Some(slot) = weeks
        .iter()
        .rposition(|week| *week <= at)
        .and_then(|i| sums.get_mut(i))
    {
        *slot += 1;
    }
}

fn epoch_seconds(timestamp: &str) -> Result<i64, CoreError> {
    OffsetDateTime::parse(timestamp, &Rfc3339)
        .map(OffsetDateTime::unix_timestamp)
        .map_err(|e| CoreError::InvalidData(format!("bad timestamp `{timestamp}`: {e}")))
}

// ==============================================================================
// Collection
// ==============================================================================

/// Build the activity document from `source`, retrying transient failures
/// per `policy`.
pub async fn collect_activity<S>(source: &S, policy: &RetryPolicy) -> Result<DevActivity, CoreError>
where
    S: ActivitySource + ?Sized,
{
    let weeks = retry(policy, "weekly_commits", || source.weekly_commits()).await?;
    let Some(first_week) = weeks.first().map(|w| w.week) else {
        return Err(CoreError::InvalidData(
            "commit activity returned no weeks".to_owned(),
        ));
    };
    let mut activity = DevActivity::from_commits(weeks);

    let mut page = 1;
    loop {
        let pulls = retry(policy, "pulls_page", || source.pulls_page(page)).await?;
        let Some(newest) = pulls.first() else {
            break;
        };
        // Pages are newest first; once a page starts before the chart, the
        // rest of the history is older still.
        if let Some(closed) = &newest.closed_at {
            if epoch_seconds(closed)? < first_week {
                break;
            }
        }
        for pull in &pulls {
            activity.count_pull(pull)?;
        }
        debug!(page, pulls = pulls.len(), "counted pull requests");
        page += 1;
    }

    for week in activity.weeks_axis.clone() {
        let data = retry(policy, "developer_data", || source.developer_data(week)).await?;
        activity.push_developer_data(data);
    }

    activity.validate()?;
    Ok(activity)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityReport {
    pub weeks: usize,
    pub last_week: Option<i64>,
}

/// Rebuild the activity document and replace the one stored under `key`.
/// Nothing is written if collection fails.
pub async fn run_activity<S>(
    source: &S,
    store: &JsonFileStore,
    key: &str,
    policy: &RetryPolicy,
) -> Result<ActivityReport, CoreError>
where
    S: ActivitySource + ?Sized,
{
    let activity = collect_activity(source, policy).await?;
    store.write_document(key, &activity)?;

    let report = ActivityReport {
        weeks: activity.weeks_axis.len(),
        last_week: activity.weeks_axis.last().copied(),
    };
    info!(
        chart = key,
        weeks = report.weeks,
        last_week = ?report.last_week,
        "activity chart rebuilt"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use super::*;

    const WEEK: i64 = 7 * 24 * 3600;
    /// 2024-01-07T00:00:00Z, a Sunday.
    const FIRST_WEEK: i64 = 1_704_585_600;

    struct MockSource {
        weeks: Vec<WeeklyCommits>,
        pages: Vec<Vec<PullRequest>>,
        developer: HashMap<i64, DeveloperData>,
        busy_commit_calls: Mutex<u32>,
        requested_pages: Mutex<Vec<u32>>,
    }

    impl MockSource {
        fn new(weeks: usize) -> Self {
            Self {
                weeks: (0..weeks as i64)
                    .map(|i| WeeklyCommits {
                        week: FIRST_WEEK + i * WEEK,
                        total: 10 + i as u64,
                    })
                    .collect(),
                pages: Vec::new(),
                developer: HashMap::new(),
                busy_commit_calls: Mutex::new(0),
                requested_pages: Mutex::new(Vec::new()),
            }
        }

        fn with_page(mut self, page: Vec<PullRequest>) -> Self {
            self.pages.push(page);
            self
        }

        fn requested_pages(&self) -> Vec<u32> {
            self.requested_pages.lock().expect("pages lock").clone()
        }
    }

    #[async_trait]
    impl ActivitySource for MockSource {
        async fn weekly_commits(&self) -> Result<Vec<WeeklyCommits>, CoreError> {
            let mut busy = self.busy_commit_calls.lock().expect("busy lock");
            if *busy > 0 {
                *busy -= 1;
                return Err(CoreError::Api {
                    service: "github",
                    status: Some(202),
                    message: "computing".into(),
                });
            }
            Ok(self.weeks.clone())
        }

        async fn pulls_page(&self, page: u32) -> Result<Vec<PullRequest>, CoreError> {
            self.requested_pages.lock().expect("pages lock").push(page);
            Ok(self
                .pages
                .get(page as usize - 1)
                .cloned()
                .unwrap_or_default())
        }

        async fn developer_data(&self, week: i64) -> Result<DeveloperData, CoreError> {
            Ok(self.developer.get(&week).copied().unwrap_or_default())
        }
    }

    fn at(seconds: i64) -> String {
        OffsetDateTime::from_unix_timestamp(seconds)
            .expect("valid timestamp")
            .format(&Rfc3339)
            .expect("formats")
    }

    fn pull(created: i64, merged: Option<i64>, closed: Option<i64>) -> PullRequest {
        PullRequest {
            created_at: at(created),
            merged_at: merged.map(at),
            closed_at: closed.map(at),
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            backoff: Duration::ZERO,
        }
    }

    #[test]
    fn weekly_sum_uses_the_last_week_started() {
        let weeks = [100, 200, 300];
        let mut sums = [0; 3];

        add_to_weekly_sum(&weeks, &mut sums, 200);
        add_to_weekly_sum(&weeks, &mut sums, 299);
        add_to_weekly_sum(&weeks, &mut sums, 10_000);
        add_to_weekly_sum(&weeks, &mut sums, 99);

        assert_eq!(sums, [0, 2, 1]);
    }

    #[test]
    fn github_timestamps_parse_as_utc() {
        assert_eq!(epoch_seconds("2024-01-07T00:00:00Z").unwrap(), FIRST_WEEK);
        assert!(matches!(
            epoch_seconds("07/01/2024"),
            Err(CoreError::InvalidData(_))
        ));
    }

    #[tokio::test]
    async fn merged_pulls_are_not_counted_as_closed() {
        let source = MockSource::new(3).with_page(vec![
            pull(FIRST_WEEK + 2 * WEEK + 5, None, None),
            pull(FIRST_WEEK + WEEK + 1, Some(FIRST_WEEK + 2 * WEEK), Some(FIRST_WEEK + 2 * WEEK)),
            pull(FIRST_WEEK + 3, None, Some(FIRST_WEEK + WEEK + 9)),
            pull(FIRST_WEEK - WEEK, None, Some(FIRST_WEEK - 1)),
        ]);

        let activity = collect_activity(&source, &policy()).await.unwrap();

        assert_eq!(activity.weeks_axis, vec![FIRST_WEEK, FIRST_WEEK + WEEK, FIRST_WEEK + 2 * WEEK]);
        assert_eq!(activity.commits, vec![10, 11, 12]);
        assert_eq!(activity.pulls_opened, vec![1, 1, 1]);
        assert_eq!(activity.pulls_merged, vec![0, 0, 1]);
        assert_eq!(activity.pulls_closed, vec![0, 1, 0]);
        activity.validate().expect("every series covers every week");
    }

    #[tokio::test]
    async fn paging_stops_at_an_empty_page_or_before_the_chart() {
        let source = MockSource::new(2)
            .with_page(vec![pull(FIRST_WEEK + 1, None, None)])
            .with_page(vec![pull(FIRST_WEEK - 2 * WEEK, None, Some(FIRST_WEEK - WEEK))])
            .with_page(vec![pull(FIRST_WEEK + 5, None, None)]);

        let activity = collect_activity(&source, &policy()).await.unwrap();
        assert_eq!(source.requested_pages(), vec![1, 2]);
        assert_eq!(activity.pulls_opened, vec![1, 0]);

        let source = MockSource::new(2).with_page(vec![pull(FIRST_WEEK + 1, None, None)]);
        collect_activity(&source, &policy()).await.unwrap();
        assert_eq!(source.requested_pages(), vec![1, 2]);
    }

    #[tokio::test]
    async fn developer_data_is_sampled_per_week() {
        let mut source = MockSource::new(2);
        source.developer.insert(
            FIRST_WEEK + WEEK,
            DeveloperData {
                forks: Some(700),
                stars: Some(500),
                subscribers: Some(90),
                pull_request_contributors: Some(40),
            },
        );

        let activity = collect_activity(&source, &policy()).await.unwrap();
        assert_eq!(activity.forks, vec![None, Some(700)]);
        assert_eq!(activity.pull_request_contributors, vec![None, Some(40)]);
    }

    #[tokio::test]
    async fn commit_statistics_are_retried_while_computing() {
        let source = MockSource::new(1);
        *source.busy_commit_calls.lock().unwrap() = 2;
        let activity = collect_activity(&source, &policy()).await.unwrap();
        assert_eq!(activity.commits, vec![10]);

        let source = MockSource::new(1);
        *source.busy_commit_calls.lock().unwrap() = 5;
        let err = collect_activity(&source, &policy()).await.unwrap_err();
        assert!(matches!(err, CoreError::ObserverUnavailable { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn run_replaces_the_stored_document() {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time must be after unix epoch")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("chainplot-activity-{unique}"));
        let store = JsonFileStore::new(&dir).unwrap();
        store
            .write_document("github_data", &serde_json::json!({"weeks_axis": [1]}))
            .unwrap();

        let source = MockSource::new(3).with_page(vec![pull(FIRST_WEEK + 1, None, None)]);
        let report = run_activity(&source, &store, "github_data", &policy())
            .await
            .unwrap();
        assert_eq!(report.weeks, 3);
        assert_eq!(report.last_week, Some(FIRST_WEEK + 2 * WEEK));

        let on_disk: serde_json::Value = store.read_document("github_data").unwrap().unwrap();
        assert_eq!(on_disk["weeks_axis"].as_array().unwrap().len(), 3);
        assert_eq!(on_disk["pulls_opened"], serde_json::json!([1, 0, 0]));
        assert_eq!(on_disk["forks"], serde_json::json!([null, null, null]));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn empty_commit_history_is_rejected() {
        let source = MockSource::new(0);
        let err = collect_activity(&source, &policy()).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidData(_)));
    }
}
