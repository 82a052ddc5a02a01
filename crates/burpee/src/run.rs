//! 1 回分の実行。カウンターを読み、日付が変わっていれば進め、リマインダーを投稿する。

use anyhow::Result;
use chrono::{DateTime, FixedOffset};
use tracing::info;

use crate::config::Config;
use crate::counter::CounterStore;
use crate::notifier::send_reminder;
use crate::resolver::resolve_channel;
use crate::rollover::apply_rollover;
use crate::slack::{ChatClient, PostedMessage};

/// 実行結果。`main` が標準出力への報告に使う。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub counter: u64,
    /// 今回の実行でカウンターを進めたかどうか
    pub incremented: bool,
    pub channel_name: String,
    pub posted: PostedMessage,
}

/// `now` を現在時刻として 1 回分の処理を行う。
///
/// どの段階で失敗してもその場で打ち切る。カウンターの保存は投稿より先に行うので、
/// 投稿に失敗しても同じ日のうちに再実行すればカウンターは進まない。
pub async fn run<C: ChatClient>(
    config: &Config,
    client: &C,
    now: DateTime<FixedOffset>,
) -> Result<RunReport> {
    let zone = config.reference_zone();
    let store = CounterStore::new(&config.counter.path);

    let mut record = store.load(now)?;
    info!(
        path = ?store.path(),
        counter = record.counter,
        last_updated = %record.last_updated,
        "Counter loaded"
    );

    let incremented = apply_rollover(&mut record, now, &zone)?;
    if incremented {
        store.save(&record)?;
        info!(counter = record.counter, %zone, "New day, counter incremented");
    }

    let channel_id =
        resolve_channel(client, &config.slack.channel, config.channel_scan()).await?;
    info!(channel = %config.slack.channel, id = %channel_id, "Channel resolved");

    let posted = send_reminder(client, &channel_id, record.counter).await?;

    Ok(RunReport {
        counter: record.counter,
        incremented,
        channel_name: config.slack.channel.clone(),
        posted,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::TempDir;

    use super::*;
    use crate::config::{CounterConfig, SlackConfig};
    use crate::counter::StateError;
    use crate::notifier::NotifyError;
    use crate::resolver::ResolveError;
    use crate::slack::fake::FakeClient;

    fn ts(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    fn config_for(path: &Path) -> Config {
        Config {
            slack: SlackConfig {
                channel: "burpees".to_string(),
                ..Default::default()
            },
            counter: CounterConfig {
                path: path.to_path_buf(),
                timezone: Some(chrono_tz::America::Los_Angeles),
            },
        }
    }

    fn workspace_client() -> FakeClient {
        FakeClient::with_channels(&[("general", "C1"), ("burpees", "C2")])
    }

    #[tokio::test]
    async fn new_day_increments_and_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("counter.txt");
        fs::write(&path, "5\n2024-01-15T09:00:00-08:00").unwrap();
        let client = workspace_client();

        let report = run(&config_for(&path), &client, ts("2024-01-16T09:00:00-08:00"))
            .await
            .unwrap();

        assert_eq!(report.counter, 6);
        assert!(report.incremented);
        assert_eq!(report.posted.channel, "C2");
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "6\n2024-01-16T09:00:00-08:00"
        );
        assert_eq!(
            client.posted.lock().unwrap()[0].1,
            "BURPEE TIME! Drop and give me #6"
        );
    }

    #[tokio::test]
    async fn same_day_keeps_counter_and_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("counter.txt");
        fs::write(&path, "5\n2024-01-15T09:00:00-08:00").unwrap();
        let before = fs::metadata(&path).unwrap().modified().unwrap();
        let client = workspace_client();

        let report = run(&config_for(&path), &client, ts("2024-01-15T18:00:00-08:00"))
            .await
            .unwrap();

        assert_eq!(report.counter, 5);
        assert!(!report.incremented);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "5\n2024-01-15T09:00:00-08:00"
        );
        assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), before);
        assert_eq!(
            client.posted.lock().unwrap()[0].1,
            "BURPEE TIME! Drop and give me #5"
        );
    }

    #[tokio::test]
    async fn first_run_starts_at_zero() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("counter.txt");
        let client = workspace_client();

        let report = run(&config_for(&path), &client, ts("2024-01-15T09:00:00-08:00"))
            .await
            .unwrap();

        assert_eq!(report.counter, 0);
        assert!(!report.incremented);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "0\n2024-01-15T09:00:00-08:00"
        );
    }

    #[tokio::test]
    async fn malformed_state_stops_before_any_api_call() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("counter.txt");
        fs::write(&path, "lots\n2024-01-15T09:00:00-08:00").unwrap();
        let client = workspace_client();

        let err = run(&config_for(&path), &client, ts("2024-01-16T09:00:00-08:00"))
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<StateError>(),
            Some(StateError::MalformedState { .. })
        ));
        assert!(client.requests.lock().unwrap().is_empty());
        assert!(client.posted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn exhausted_counter_stops_without_touching_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("counter.txt");
        let content = "18446744073709551615\n2024-01-15T09:00:00-08:00";
        fs::write(&path, content).unwrap();
        let client = workspace_client();

        let err = run(&config_for(&path), &client, ts("2024-01-16T09:00:00-08:00"))
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<StateError>(),
            Some(StateError::CounterOverflow { .. })
        ));
        assert_eq!(fs::read_to_string(&path).unwrap(), content);
        assert!(client.posted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_channel_is_reported_after_counter_is_saved() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("counter.txt");
        fs::write(&path, "5\n2024-01-15T09:00:00-08:00").unwrap();
        let client = FakeClient::with_channels(&[("general", "C1")]);

        let err = run(&config_for(&path), &client, ts("2024-01-16T09:00:00-08:00"))
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ResolveError>(),
            Some(ResolveError::ChannelNotFound { .. })
        ));
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "6\n2024-01-16T09:00:00-08:00"
        );
        assert!(client.posted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn send_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("counter.txt");
        let client = FakeClient {
            post_error: Some("rate_limited".to_string()),
            ..workspace_client()
        };

        let err = run(&config_for(&path), &client, ts("2024-01-15T09:00:00-08:00"))
            .await
            .unwrap_err();

        assert!(err.downcast_ref::<NotifyError>().is_some(), "{err:#}");
    }
}
