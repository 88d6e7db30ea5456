//! End-to-end job tests against a mocked site and geocoder.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use haikyo_core::{CoordinateSource, Location};
use haikyo_export::{render, ExportFormat, ExportOptions};
use haikyo_scraper::{
    build_http_client, GeocoderSettings, JobRegistry, JobRequest, JobStatus, NominatimClient,
    ProgressSink, ScrapeContext, ScrapeSettings, ScrapeTarget,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PAGE_WITH_JSON: &str = r#"<html><head><title>摩耶観光ホテル - 廃墟検索地図</title></head>
<body><h1>摩耶観光ホテル</h1>
<script>var spot_info = {"lat": 34.1, "lng": 135.2};</script>
<div class="spot_descr">山上の旧ホテル。</div></body></html>"#;

const PAGE_WITH_ADDRESS: &str = r#"<html><body><h1>旧校舎は長野県の廃校</h1>
<div class="spot_address">兵庫県神戸市</div>
<div class="spot_descr">木造校舎。</div></body></html>"#;

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html; charset=utf-8")
        .set_body_string(body)
}

async fn mock_site() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/s/1.html"))
        .respond_with(html(PAGE_WITH_JSON))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/s/2.html"))
        .respond_with(html(PAGE_WITH_ADDRESS))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/s/3.html"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([{ "lat": "35.0", "lon": "139.0" }])),
        )
        .mount(&server)
        .await;
    server
}

fn scratch_dir(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!("haikyo-{label}-{}", uuid::Uuid::new_v4().simple()))
}

fn context(server: &MockServer, export_dir: Option<PathBuf>) -> ScrapeContext {
    let client = build_http_client(5, "haikyo-test").expect("client construction should not fail");
    let settings = ScrapeSettings {
        base_url: format!("{}/", server.uri()),
        inter_request_delay: Duration::ZERO,
        max_linked_posts: 3,
        description_max_chars: 1000,
        default_max_locations: 10,
        export_dir,
        export_options: ExportOptions::default(),
    };
    ScrapeContext::new(
        client.clone(),
        Arc::new(NominatimClient::new(client, &server.uri())),
        GeocoderSettings {
            backoff: Duration::ZERO,
            ..GeocoderSettings::default()
        },
        settings,
    )
    .expect("context construction should not fail")
}

fn three_urls(server: &MockServer) -> JobRequest {
    JobRequest::new(ScrapeTarget::Urls(
        (1..=3)
            .map(|i| format!("{}/s/{i}.html", server.uri()))
            .collect(),
    ))
}

#[tokio::test]
async fn partial_failures_still_finish_done() {
    let server = mock_site().await;
    let dir = scratch_dir("e2e");
    let ctx = context(&server, Some(dir.clone()));

    let handle = ctx.job("e2e", three_urls(&server)).spawn();
    let monitor = handle.monitor();
    let snapshot = handle.join().await.expect("job task should not panic");

    assert_eq!(snapshot.status, JobStatus::Done);
    assert!((snapshot.percent - 100.0).abs() < f64::EPSILON);

    let results = monitor.board().take_results().expect("results after done");
    assert_eq!(results.len(), 3);

    let first = &results[0];
    assert_eq!(first.id, "1");
    assert_eq!(first.name, "摩耶観光ホテル");
    assert_eq!(first.coordinate_source, Some(CoordinateSource::EmbeddedJson));
    let c = first.coordinate.expect("embedded coordinate");
    assert!((c.latitude() - 34.1).abs() < 1e-9);
    assert!((c.longitude() - 135.2).abs() < 1e-9);

    let second = &results[1];
    assert_eq!(second.name, "旧校舎");
    assert_eq!(second.address.as_deref(), Some("兵庫県神戸市"));
    assert_eq!(second.coordinate_source, Some(CoordinateSource::Geocoded));
    let c = second.coordinate.expect("geocoded coordinate");
    assert!((c.latitude() - 35.0).abs() < 1e-9);
    assert!((c.longitude() - 139.0).abs() < 1e-9);

    let third = &results[2];
    assert!(third.is_fetch_failure());
    assert!(third.coordinate.is_none());

    let kml = render(ExportFormat::Kml, &results, &ExportOptions::default()).unwrap();
    assert_eq!(kml.matches("<Placemark>").count(), 2);
    assert!(kml.contains("135.2,34.1,0"));

    let file_name = monitor.board().export_file().expect("export file written");
    assert_eq!(file_name, "haikyo_locations_e2e.kml");
    let written = std::fs::read_to_string(dir.join(&file_name)).unwrap();
    assert_eq!(written.matches("<Placemark>").count(), 2);
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn related_article_link_to_another_target_is_not_consumed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/s/1.html"))
        .respond_with(html(
            r#"<html><body><h1>旧病院</h1><a href="/s/2.html">関連記事</a></body></html>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/s/2.html"))
        .respond_with(html(PAGE_WITH_JSON))
        .expect(1)
        .mount(&server)
        .await;
    let ctx = context(&server, None);

    let request = JobRequest::new(ScrapeTarget::Urls(vec![
        format!("{}/s/1.html", server.uri()),
        format!("{}/s/2.html", server.uri()),
    ]));
    let handle = ctx.job("related", request).spawn();
    let monitor = handle.monitor();
    let snapshot = handle.join().await.expect("job task should not panic");
    assert_eq!(snapshot.status, JobStatus::Done);

    let results = monitor.board().take_results().expect("results after done");
    assert_eq!(results.len(), 2);
    assert!(results[0].coordinate.is_none());

    let second = &results[1];
    assert!(!second.is_fetch_failure());
    assert_eq!(second.id, "2");
    assert_eq!(second.coordinate_source, Some(CoordinateSource::EmbeddedJson));
    let c = second.coordinate.expect("embedded coordinate");
    assert!((c.latitude() - 34.1).abs() < 1e-9);
    assert!((c.longitude() - 135.2).abs() < 1e-9);
}

#[derive(Default)]
struct Recorder {
    percents: Mutex<Vec<f64>>,
    names: Mutex<Vec<String>>,
}

impl ProgressSink for Recorder {
    fn report(&self, percent: f64, _message: &str) {
        self.percents.lock().unwrap().push(percent);
    }

    fn location_done(&self, location: &Location) {
        self.names.lock().unwrap().push(location.name.clone());
    }
}

#[tokio::test]
async fn progress_reports_are_monotonic_and_ordered() {
    let server = mock_site().await;
    let ctx = context(&server, None);
    let job = ctx.job("progress", three_urls(&server));

    let recorder = Recorder::default();
    let report = job.run(&recorder).await.expect("job should run");
    assert!(!report.cancelled);
    assert!(report.export_file.is_none());

    let percents = recorder.percents.lock().unwrap().clone();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{percents:?}");
    assert!((percents.last().copied().unwrap() - 90.0).abs() < 1e-9);

    let names = recorder.names.lock().unwrap().clone();
    assert_eq!(names.len(), 3);
    assert_eq!(names[0], "摩耶観光ホテル");
}

#[tokio::test]
async fn cancelled_job_finishes_with_completed_records() {
    let server = mock_site().await;
    let ctx = context(&server, None);

    let handle = ctx.job("cancel", three_urls(&server)).spawn();
    handle.cancel();
    let monitor = handle.monitor();
    let snapshot = handle.join().await.unwrap();

    assert_eq!(snapshot.status, JobStatus::Done);
    assert!(snapshot.message.starts_with("Cancelled"));
    assert!(monitor.board().take_results().unwrap().is_empty());
}

#[tokio::test]
async fn failed_discovery_marks_job_failed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let ctx = context(&server, None);

    let request = JobRequest::new(ScrapeTarget::Listing {
        url: format!("{}/explorer/list/prefecture/x/", server.uri()),
    });
    let snapshot = ctx.job("fail", request).spawn().join().await.unwrap();
    assert_eq!(snapshot.status, JobStatus::Failed);
    assert!(snapshot.message.contains("discovery failed"));
}

#[tokio::test]
async fn registry_rejects_second_start_while_running() {
    let server = mock_site().await;
    let registry = JobRegistry::new(context(&server, None));

    let first = registry.start(three_urls(&server)).expect("first start");
    let conflict = registry.start(three_urls(&server)).unwrap_err();
    assert_eq!(conflict.running_job_id, first.id());

    assert_eq!(registry.get(None).map(|m| m.id().to_owned()), Some(first.id().to_owned()));
    assert!(registry.get(Some("missing")).is_none());
    first.cancel();
}
