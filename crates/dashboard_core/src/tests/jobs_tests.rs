use std::{convert::Infallible, time::Duration};

use axum::{
    http::StatusCode,
    response::sse::{Event, Sse},
    routing::get,
    Router,
};
use futures::stream::BoxStream;
use tokio::{net::TcpListener, sync::broadcast};

use super::*;
use crate::{notify::RecordingNotifier, sse::MAX_LINE_BYTES};

fn tracker() -> JobTracker {
    JobTracker::new(Arc::new(JobCatalog::pipeline()))
}

fn message(entries: &[(&str, &str)]) -> StatusMessage {
    entries
        .iter()
        .map(|(id, status)| (id.to_string(), status.to_string()))
        .collect()
}

fn statuses(jobs: &[JobView]) -> Vec<(String, JobStatus)> {
    jobs.iter()
        .map(|job| (job.id.as_str().to_string(), job.status))
        .collect()
}

#[test]
fn all_jobs_start_queued_in_catalog_order() {
    let tracker = tracker();
    let jobs = tracker.jobs();
    assert_eq!(jobs.len(), 6);
    assert_eq!(jobs[0].id, JobId::new("HarvestData"));
    assert_eq!(jobs[5].id, JobId::new("PreprocessingLongDistanceTransferPatterns"));
    assert!(jobs
        .iter()
        .all(|job| job.status == JobStatus::Queued && job.indicator == StatusIndicator::Pending));
    let clustering = &jobs[3];
    assert_eq!(
        JobCatalog::pipeline()
            .get(&clustering.id)
            .map(|job| job.title.as_str()),
        Some("Clustering")
    );
    assert_eq!(clustering.cards.len(), 1);
    assert_eq!(clustering.cards[0].link, "map");
}

#[test]
fn known_job_changes_alone() {
    let mut tracker = tracker();
    let changed = tracker.apply(&message(&[("HarvestData", "Succeeded")]));
    assert_eq!(changed, vec![JobId::new("HarvestData")]);

    let jobs = tracker.jobs();
    assert_eq!(jobs[0].status, JobStatus::Succeeded);
    assert_eq!(jobs[0].indicator, StatusIndicator::Check);
    assert_eq!(
        jobs.iter()
            .filter(|job| job.status == JobStatus::Queued)
            .count(),
        5
    );
}

#[test]
fn unknown_job_and_unknown_status_are_ignored() {
    let mut tracker = tracker();
    let before = tracker.jobs();
    let changed = tracker.apply(&message(&[
        ("ExportData", "Running"),
        ("ImportData", "Paused"),
    ]));
    assert!(changed.is_empty());
    assert_eq!(tracker.jobs(), before);
}

#[test]
fn full_snapshot_updates_every_listed_job() {
    let mut tracker = tracker();
    tracker.apply(&message(&[
        ("HarvestData", "Succeeded"),
        ("ImportData", "Succeeded"),
        ("ValidateData", "Failed"),
        ("PreprocessingClustering", "Running"),
    ]));
    let indicators: Vec<StatusIndicator> =
        tracker.jobs().iter().map(|job| job.indicator).collect();
    assert_eq!(
        indicators,
        vec![
            StatusIndicator::Check,
            StatusIndicator::Check,
            StatusIndicator::Cross,
            StatusIndicator::Spinner,
            StatusIndicator::Pending,
            StatusIndicator::Pending,
        ]
    );
}

#[test]
fn backward_transition_is_applied_as_given() {
    let mut tracker = tracker();
    tracker.apply(&message(&[("ImportData", "Succeeded")]));
    let changed = tracker.apply(&message(&[("ImportData", "Running")]));
    assert_eq!(changed.len(), 1);
    assert_eq!(
        tracker.status(&JobId::new("ImportData")),
        Some(JobStatus::Running)
    );
}

#[test]
fn repeated_status_reports_no_change() {
    let mut tracker = tracker();
    tracker.apply(&message(&[("HarvestData", "Running")]));
    assert!(tracker
        .apply(&message(&[("HarvestData", "Running")]))
        .is_empty());
}

#[test]
fn discard_empties_the_job_list() {
    let mut tracker = tracker();
    tracker.discard();
    assert!(tracker.is_discarded());
    assert!(tracker.jobs().is_empty());
    assert_eq!(tracker.status(&JobId::new("HarvestData")), None);
    assert!(tracker
        .apply(&message(&[("HarvestData", "Running")]))
        .is_empty());
}

#[tokio::test]
async fn status_event_publishes_one_snapshot() {
    let tracker = RwLock::new(tracker());
    let bus = EventBus::new(8);
    let mut rx = bus.subscribe();
    let event = SseEvent {
        data: r#"{"HarvestData":"Running","ImportData":"Queued"}"#.to_string(),
        ..SseEvent::default()
    };

    apply_status_event(&tracker, &bus, &event)
        .await
        .expect("applied");

    match rx.try_recv().expect("snapshot") {
        DashboardEvent::JobsUpdated(jobs) => {
            assert_eq!(jobs[0].status, JobStatus::Running);
            assert_eq!(jobs.len(), 6);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn malformed_payload_is_a_stream_error() {
    let tracker = RwLock::new(tracker());
    let bus = EventBus::new(8);
    let event = SseEvent {
        data: "HarvestData=Running".to_string(),
        ..SseEvent::default()
    };
    let err = apply_status_event(&tracker, &bus, &event)
        .await
        .expect_err("malformed");
    assert!(matches!(err, StreamError::Malformed(_)));
}

type EventStream = BoxStream<'static, Result<Event, Infallible>>;

fn frames(payloads: &[&'static str], hold_open: bool) -> EventStream {
    let events = tokio_stream::iter(
        payloads
            .iter()
            .map(|data| Ok(Event::default().data(*data)))
            .collect::<Vec<_>>(),
    );
    if hold_open {
        events.chain(tokio_stream::pending()).boxed()
    } else {
        events.boxed()
    }
}

async fn spawn_status_server(app: Router) -> anyhow::Result<Url> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(Url::parse(&format!("http://{addr}/api/v1/status"))?)
}

async fn next_event(rx: &mut broadcast::Receiver<DashboardEvent>) -> DashboardEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event in time")
        .expect("bus open")
}

#[tokio::test]
async fn watcher_applies_stream_frames() {
    let app = Router::new().route(
        "/api/v1/status",
        get(|| async {
            Sse::new(frames(
                &[
                    r#"{"HarvestData":"Running"}"#,
                    r#"{"HarvestData":"Succeeded"}"#,
                ],
                true,
            ))
        }),
    );
    let url = spawn_status_server(app).await.expect("spawn server");
    let tracker = Arc::new(RwLock::new(tracker()));
    let bus = EventBus::new(16);
    let mut rx = bus.subscribe();

    let handle = spawn_status_watcher(Client::new(), url, tracker.clone(), bus.clone(), Arc::new(bus));

    let mut last = Vec::new();
    for _ in 0..2 {
        match next_event(&mut rx).await {
            DashboardEvent::JobsUpdated(jobs) => last = jobs,
            other => panic!("unexpected event: {other:?}"),
        }
    }
    let expected: Vec<(String, JobStatus)> = JobCatalog::pipeline()
        .jobs()
        .iter()
        .map(|job| {
            let status = if job.id.as_str() == "HarvestData" {
                JobStatus::Succeeded
            } else {
                JobStatus::Queued
            };
            (job.id.as_str().to_string(), status)
        })
        .collect();
    assert_eq!(statuses(&last), expected);
    assert!(!handle.is_finished());

    handle.close();
    assert_eq!(
        tracker.read().await.status(&JobId::new("HarvestData")),
        Some(JobStatus::Succeeded)
    );
}

#[tokio::test]
async fn stream_end_discards_jobs_and_reports_closure() {
    let app = Router::new().route(
        "/api/v1/status",
        get(|| async { Sse::new(frames(&[r#"{"ValidateData":"Failed"}"#], false)) }),
    );
    let url = spawn_status_server(app).await.expect("spawn server");
    let tracker = Arc::new(RwLock::new(tracker()));
    let bus = EventBus::new(16);
    let mut rx = bus.subscribe();

    let handle = spawn_status_watcher(Client::new(), url, tracker.clone(), bus.clone(), Arc::new(bus));

    assert!(matches!(
        next_event(&mut rx).await,
        DashboardEvent::JobsUpdated(_)
    ));
    match next_event(&mut rx).await {
        DashboardEvent::JobStreamClosed { reason } => {
            assert!(reason.contains("ended"), "reason: {reason}")
        }
        other => panic!("unexpected event: {other:?}"),
    }
    match next_event(&mut rx).await {
        DashboardEvent::Notification(notification) => {
            assert_eq!(notification.title, crate::notify::STREAM_CLOSED_TITLE)
        }
        other => panic!("unexpected event: {other:?}"),
    }

    handle.join().await;
    let tracker = tracker.read().await;
    assert!(tracker.is_discarded());
    assert!(tracker.jobs().is_empty());
}

#[tokio::test]
async fn malformed_frame_stops_the_watcher() {
    let app = Router::new().route(
        "/api/v1/status",
        get(|| async { Sse::new(frames(&["not json"], true)) }),
    );
    let url = spawn_status_server(app).await.expect("spawn server");
    let tracker = Arc::new(RwLock::new(tracker()));
    let bus = EventBus::new(16);
    let mut rx = bus.subscribe();

    let handle = spawn_status_watcher(Client::new(), url, tracker.clone(), bus.clone(), Arc::new(bus));

    match next_event(&mut rx).await {
        DashboardEvent::JobStreamClosed { reason } => {
            assert!(reason.starts_with("malformed status message"), "reason: {reason}")
        }
        other => panic!("unexpected event: {other:?}"),
    }
    handle.join().await;
    assert!(tracker.read().await.jobs().is_empty());
}

#[tokio::test]
async fn rejected_subscription_discards_jobs() {
    let app = Router::new().route(
        "/api/v1/status",
        get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "pipeline starting") }),
    );
    let url = spawn_status_server(app).await.expect("spawn server");
    let tracker = Arc::new(RwLock::new(tracker()));
    let bus = EventBus::new(16);
    let mut rx = bus.subscribe();

    let handle = spawn_status_watcher(Client::new(), url, tracker.clone(), bus.clone(), Arc::new(bus));

    match next_event(&mut rx).await {
        DashboardEvent::JobStreamClosed { reason } => {
            assert!(reason.contains("pipeline starting"), "reason: {reason}")
        }
        other => panic!("unexpected event: {other:?}"),
    }
    handle.join().await;
    assert!(tracker.read().await.is_discarded());
}

#[tokio::test]
async fn oversized_frame_stops_the_watcher() {
    let app = Router::new().route(
        "/api/v1/status",
        get(|| async {
            let huge = format!(r#"{{"HarvestData":"{}"}}"#, "x".repeat(MAX_LINE_BYTES + 1));
            let events = tokio_stream::iter(vec![Ok::<_, Infallible>(Event::default().data(huge))]);
            Sse::new(events.chain(tokio_stream::pending()).boxed())
        }),
    );
    let url = spawn_status_server(app).await.expect("spawn server");
    let tracker = Arc::new(RwLock::new(tracker()));
    let bus = EventBus::new(16);
    let mut rx = bus.subscribe();
    let notifier = RecordingNotifier::default();

    let handle = spawn_status_watcher(
        Client::new(),
        url,
        tracker.clone(),
        bus,
        Arc::new(notifier.clone()),
    );

    match next_event(&mut rx).await {
        DashboardEvent::JobStreamClosed { reason } => {
            assert!(reason.contains("over 1048576 bytes"), "reason: {reason}")
        }
        other => panic!("unexpected event: {other:?}"),
    }
    handle.join().await;
    assert!(tracker.read().await.is_discarded());
    assert!(rx.try_recv().is_err());
    let seen = notifier.notifications();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].title, crate::notify::STREAM_CLOSED_TITLE);
}
