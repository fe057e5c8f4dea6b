// src/pipeline/harvest.rs

//! Harvest run orchestration.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::{Config, HarvestConfig};
use crate::pipeline::reconcile::{HarvestOutcome, HarvestSettings, Reconciler, StopReason};
use crate::services::{ApiClient, CallTally, HarvestSource, SessionPool};
use crate::storage::{ArtifactStorage, CursorStore, FileCursorStore, LocalStorage};

/// What a finished run produced.
#[derive(Debug)]
pub struct HarvestReport {
    pub subject: String,
    pub units: usize,
    pub threads: usize,
    pub stop: StopReason,
    pub cursor: String,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub output_location: String,
    pub stats_location: String,
}

/// Build an API client, routing through the configured proxy and confirming
/// the egress address when one is set.
pub async fn prepare_client(config: &Config) -> Result<ApiClient> {
    let mut client = ApiClient::new(&config.http)?;

    if let Some(address) = config.proxy.url.as_deref() {
        client.set_proxy(Some(address))?;
        let expected = config.proxy.verify_ip.as_deref().unwrap_or_default();
        client
            .verify_proxy(&config.proxy.verify_endpoint, expected)
            .await?;
        log::info!(
            "Egress verified through {}",
            config.proxy.display_host().unwrap_or_default()
        );
    }

    Ok(client)
}

/// Run a full harvest for `config.harvest.subject` using the file-backed
/// cursor store and local artifact storage.
pub async fn run_harvest(config: &Config, cancel: CancellationToken) -> Result<HarvestReport> {
    config.validate()?;

    let cursors = FileCursorStore::new(&config.paths.cursor_file);
    let storage = LocalStorage::from_paths(&config.paths);

    let tally = Arc::new(CallTally::new());
    let mut pool = SessionPool::new(&config.credentials, config.proxy.display_host(), tally)?;
    let mut client = prepare_client(config).await?;

    log::info!(
        "Starting harvest of {} with {} sessions",
        config.harvest.subject,
        pool.len()
    );

    run_harvest_with(&config.harvest, &mut client, &mut pool, &cursors, &storage, cancel).await
}

/// Run a harvest over explicit collaborators.
///
/// The saved cursor is loaded before any network activity, so a corrupt
/// cursor file aborts the run early. Output and statistics are written even
/// when the cursor cannot be saved; the save failure is returned afterwards.
pub async fn run_harvest_with<S: HarvestSource + ?Sized>(
    harvest: &HarvestConfig,
    source: &mut S,
    pool: &mut SessionPool,
    cursors: &dyn CursorStore,
    storage: &dyn ArtifactStorage,
    cancel: CancellationToken,
) -> Result<HarvestReport> {
    let subject = harvest.subject.as_str();
    let start_cursor = cursors.load(subject).await?;

    let started_at = Utc::now();
    let clock = Instant::now();
    let outcome = Reconciler::new(source, pool, HarvestSettings::from(harvest), cancel)
        .run(subject, &start_cursor)
        .await;
    let elapsed = clock.elapsed();

    let stamp = run_stamp(started_at);
    let output_location = storage.write_units(subject, &stamp, &outcome.units).await?;

    let saved = cursors.save(subject, &outcome.cursor).await;
    if let Err(e) = &saved {
        log::error!("Failed to save cursor for {}: {}", subject, e);
    }

    let summary = render_stats(subject, &outcome, elapsed, pool.tally(), saved.is_ok())?;
    let stats_location = storage.write_stats(subject, &stamp, &summary).await?;
    log::info!("Statistics written to {}", stats_location);

    saved?;

    Ok(HarvestReport {
        subject: subject.to_string(),
        units: outcome.units.len(),
        threads: outcome.units.iter().filter(|u| u.is_thread()).count(),
        stop: outcome.stop,
        cursor: outcome.cursor,
        started_at,
        elapsed,
        output_location,
        stats_location,
    })
}

/// Human-readable run statistics followed by the API call tally.
pub fn render_stats(
    subject: &str,
    outcome: &HarvestOutcome,
    elapsed: Duration,
    tally: &CallTally,
    cursor_saved: bool,
) -> Result<String> {
    let units = outcome.units.len();
    let threads = outcome.units.iter().filter(|u| u.is_thread()).count();
    let minutes = elapsed.as_secs_f64() / 60.0;
    let rate = if minutes > 0.0 { units as f64 / minutes } else { 0.0 };
    let stats = &outcome.stats;

    let mut out = Vec::new();
    {
        use std::io::Write;
        let mut line = |text: String| writeln!(out, "{text}");
        line("Harvest Summary:".to_string())?;
        line(format!("Subject: {subject}"))?;
        line(format!(
            "Total Units Processed: {units} ({threads} threads, {} standalone)",
            units - threads
        ))?;
        line(format!("Duration: {}", format_duration(elapsed)))?;
        line(format!("Average Rate: {rate:.2} units/minute"))?;
        line(format!("Stop Reason: {}", outcome.stop))?;
        line(format!("Records Seen: {}", stats.records_seen))?;
        line(format!("Errored Records Skipped: {}", stats.errored_records))?;
        line(format!("Duplicates Skipped: {}", stats.duplicates_skipped))?;
        line(format!(
            "Thread Fetches: {} ({} failed)",
            stats.thread_fetches, stats.thread_failures
        ))?;
        line(format!(
            "Timeline Pages: {} ({} failed attempts)",
            stats.page_fetches, stats.page_failures
        ))?;
        line(format!(
            "Resume Cursor: {}",
            match (cursor_saved, outcome.cursor.is_empty()) {
                (false, _) => "NOT SAVED",
                (true, true) => "none",
                (true, false) => "saved",
            }
        ))?;
    }
    tally.report(&mut out)?;

    String::from_utf8(out).map_err(|e| AppError::persistence("stats report", e))
}

/// Local-time artifact stamp, to the second.
pub fn run_stamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d_%H-%M-%S").to_string()
}

/// Format like `1h2m3s`, rounded to the second.
pub fn format_duration(elapsed: Duration) -> String {
    let total = elapsed.as_secs_f64().round() as u64;
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    match (hours, minutes) {
        (0, 0) => format!("{seconds}s"),
        (0, _) => format!("{minutes}m{seconds}s"),
        _ => format!("{hours}h{minutes}m{seconds}s"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Credential, OutputUnit};
    use crate::pipeline::testing::{Call, FakeSource, fast_config, page, pool, post, self_thread};
    use async_trait::async_trait;
    use tempfile::TempDir;

    fn local(tmp: &TempDir) -> (FileCursorStore, LocalStorage) {
        (
            FileCursorStore::new(tmp.path().join("cursors.json")),
            LocalStorage::new(tmp.path().join("json"), tmp.path().join("scrape_logs")),
        )
    }

    fn two_pages() -> FakeSource {
        FakeSource::default()
            .with_page("", page(vec![post("A", "A"), post("B", "C")], "c1", true))
            .with_page("c1", page(vec![post("E", "E")], "c2", false))
            .with_thread(self_thread("C", &["B", "D"]))
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(4_600)), "5s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m5s");
        assert_eq!(format_duration(Duration::from_secs(3_723)), "1h2m3s");
    }

    #[test]
    fn test_run_stamp_separates_runs_in_one_minute() {
        let first = DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        let second = first + chrono::Duration::seconds(30);

        assert_ne!(run_stamp(first), run_stamp(second));
        assert!(run_stamp(first).ends_with("-05"));
    }

    #[tokio::test]
    async fn test_run_writes_artifacts_and_cursor() {
        let tmp = TempDir::new().unwrap();
        let (cursors, storage) = local(&tmp);
        let mut source = two_pages();
        let mut pool = pool(2);

        let report = run_harvest_with(
            &fast_config(),
            &mut source,
            &mut pool,
            &cursors,
            &storage,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(report.units, 3);
        assert_eq!(report.threads, 1);
        assert_eq!(report.stop, StopReason::Exhausted);
        assert_eq!(cursors.load("subject").await.unwrap(), "c2");

        let units: Vec<OutputUnit> =
            serde_json::from_slice(&std::fs::read(&report.output_location).unwrap()).unwrap();
        let ids: Vec<&str> = units.iter().map(|u| u.id()).collect();
        assert_eq!(ids, vec!["A", "C", "E"]);

        let stats = std::fs::read_to_string(&report.stats_location).unwrap();
        assert!(stats.starts_with("Harvest Summary:"));
        assert!(stats.contains("Total Units Processed: 3 (1 threads, 2 standalone)"));
        assert!(stats.contains("Stop Reason: timeline exhausted"));
        assert!(stats.contains("Timeline API Calls: 2"));
        assert!(stats.contains("Thread Detail API Calls: 1"));
        assert!(stats.contains("Total API Calls: 3"));
    }

    #[tokio::test]
    async fn test_resumes_from_saved_cursor() {
        let tmp = TempDir::new().unwrap();
        let (cursors, storage) = local(&tmp);
        cursors.save("subject", "c1").await.unwrap();
        let mut source = two_pages();
        let mut pool = pool(1);

        let report = run_harvest_with(
            &fast_config(),
            &mut source,
            &mut pool,
            &cursors,
            &storage,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(report.units, 1);
        assert_eq!(
            source.calls()[0],
            Call::Timeline {
                auth: "auth-0".into(),
                cursor: "c1".into()
            }
        );
    }

    #[tokio::test]
    async fn test_corrupt_cursor_aborts_before_network() {
        let tmp = TempDir::new().unwrap();
        let (cursors, storage) = local(&tmp);
        std::fs::write(cursors.path(), b"[oops").unwrap();
        let mut source = two_pages();
        let mut pool = pool(1);

        let err = run_harvest_with(
            &fast_config(),
            &mut source,
            &mut pool,
            &cursors,
            &storage,
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Persistence { .. }));
        assert!(source.calls().is_empty());
    }

    struct ReadOnlyCursors;

    #[async_trait]
    impl CursorStore for ReadOnlyCursors {
        async fn load(&self, _subject: &str) -> Result<String> {
            Ok(String::new())
        }

        async fn save(&self, subject: &str, _token: &str) -> Result<()> {
            Err(AppError::persistence(subject, "read-only filesystem"))
        }
    }

    #[tokio::test]
    async fn test_cursor_save_failure_still_writes_output() {
        let tmp = TempDir::new().unwrap();
        let (_, storage) = local(&tmp);
        let mut source = two_pages();
        let mut pool = pool(1);

        let err = run_harvest_with(
            &fast_config(),
            &mut source,
            &mut pool,
            &ReadOnlyCursors,
            &storage,
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Persistence { .. }));
        let written: Vec<_> = std::fs::read_dir(tmp.path().join("json"))
            .unwrap()
            .collect();
        assert_eq!(written.len(), 1);
        let stats: Vec<_> = std::fs::read_dir(tmp.path().join("scrape_logs"))
            .unwrap()
            .map(|entry| std::fs::read_to_string(entry.unwrap().path()).unwrap())
            .collect();
        assert!(stats[0].contains("Resume Cursor: NOT SAVED"));
    }

    #[tokio::test]
    async fn test_run_harvest_rejects_invalid_config() {
        let config = Config {
            credentials: vec![Credential::new("auth", "")],
            ..Config::default()
        };

        let err = run_harvest(&config, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
