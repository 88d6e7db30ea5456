//! Integration tests for `FetchCache` and the geocoder using wiremock HTTP mocks.

use std::sync::Arc;
use std::time::Duration;

use haikyo_core::{Coordinate, CoordinateSource};
use haikyo_scraper::{
    build_http_client, discover_targets, AddressGeocoder, FetchCache, FetchError,
    GeocodeOutcome, GeocoderSettings, LocationExtractor, NominatimClient, ScrapeTarget,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client() -> reqwest::Client {
    build_http_client(5, "haikyo-test").expect("client construction should not fail")
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html; charset=utf-8")
        .set_body_string(body)
}

#[tokio::test]
async fn second_fetch_of_same_url_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/s/1.html"))
        .respond_with(html("<h1>one</h1>"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = FetchCache::new(client(), Duration::ZERO);
    let url = format!("{}/s/1.html", server.uri());

    let first = fetcher.fetch(&url).await.expect("first fetch should succeed");
    assert!(first.contains("one"));

    let second = fetcher.fetch(&url).await;
    assert!(matches!(second, Err(FetchError::AlreadySeen { .. })));
    assert_eq!(fetcher.seen_count(), 1);
}

#[tokio::test]
async fn non_success_status_is_a_fetch_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/s/3.html"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let fetcher = FetchCache::new(client(), Duration::ZERO);
    let err = fetcher
        .fetch(&format!("{}/s/3.html", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::UnexpectedStatus { status: 500, .. }));
    assert!(!err.is_skip());
}

#[tokio::test]
async fn geocoder_retries_unavailable_then_caches() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("format", "json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([{ "lat": "35.0", "lon": "139.0" }])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let geocoder = AddressGeocoder::new(
        Arc::new(NominatimClient::new(client(), &server.uri())),
        GeocoderSettings {
            backoff: Duration::ZERO,
            ..GeocoderSettings::default()
        },
    );

    let expected = Coordinate::new(35.0, 139.0).unwrap();
    let outcome = geocoder.geocode("旧校舎", Some("兵庫県神戸市")).await;
    assert_eq!(outcome, GeocodeOutcome::Resolved(expected));
    assert_eq!(outcome.source(), CoordinateSource::Geocoded);

    // served from cache; the `.expect(1)` above fails on drop otherwise
    let again = geocoder.geocode("別名", Some("兵庫県神戸市")).await;
    assert_eq!(again, GeocodeOutcome::Resolved(expected));
}

#[tokio::test]
async fn geocoder_empty_answers_fall_back_to_country_center() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;

    let geocoder = AddressGeocoder::new(
        Arc::new(NominatimClient::new(client(), &server.uri())),
        GeocoderSettings {
            backoff: Duration::ZERO,
            ..GeocoderSettings::default()
        },
    );
    let outcome = geocoder.geocode("旧校舎", Some("どこか")).await;
    assert_eq!(outcome, GeocodeOutcome::Fallback(Coordinate::COUNTRY_CENTER));
}

#[tokio::test]
async fn discovery_follows_pagination() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list/1"))
        .respond_with(html(
            r#"<article class="spot_panel"><a href="/s/1.html">a</a></article>
               <article class="spot_panel"><a href="/s/2.html">b</a></article>
               <a rel="next" href="/list/2">next</a>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/list/2"))
        .respond_with(html(
            r#"<article class="spot_panel"><a href="/s/3.html">c</a></article>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = FetchCache::new(client(), Duration::ZERO);
    let target = ScrapeTarget::Listing {
        url: format!("{}/list/1", server.uri()),
    };
    let base = format!("{}/", server.uri());
    let targets = discover_targets(&fetcher, &base, &target, 10, &[])
        .await
        .expect("discovery should succeed");

    assert_eq!(
        targets,
        vec![
            format!("{}/s/1.html", server.uri()),
            format!("{}/s/2.html", server.uri()),
            format!("{}/s/3.html", server.uri()),
        ]
    );
}

#[tokio::test]
async fn unreachable_listing_aborts_discovery() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let fetcher = FetchCache::new(client(), Duration::ZERO);
    let target = ScrapeTarget::Listing {
        url: format!("{}/list/1", server.uri()),
    };
    let err = discover_targets(&fetcher, &format!("{}/", server.uri()), &target, 10, &[])
        .await
        .unwrap_err();
    assert!(matches!(err, haikyo_scraper::JobAbortError::Discovery { .. }));
}

#[tokio::test]
async fn selection_crawls_the_whole_page_budget() {
    let server = MockServer::start().await;
    let first_page: String = (1..=5)
        .map(|i| format!(r#"<article class="spot_panel"><a href="/s/{i}.html">{i}</a></article>"#))
        .chain(std::iter::once(r#"<a rel="next" href="/list/2">next</a>"#.to_owned()))
        .collect();
    Mock::given(method("GET"))
        .and(path("/list/1"))
        .respond_with(html(&first_page))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/list/2"))
        .respond_with(html(
            r#"<article class="spot_panel"><a href="/s/6.html">6</a></article>
               <article class="spot_panel"><a href="/s/7.html">7</a></article>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = FetchCache::new(client(), Duration::ZERO);
    let target = ScrapeTarget::Listing {
        url: format!("{}/list/1", server.uri()),
    };
    let targets = discover_targets(&fetcher, &format!("{}/", server.uri()), &target, 5, &[0, 6])
        .await
        .expect("discovery should succeed");

    assert_eq!(
        targets,
        vec![
            format!("{}/s/1.html", server.uri()),
            format!("{}/s/7.html", server.uri()),
        ]
    );
}

fn extractor(server: &MockServer, max_linked_posts: usize) -> LocationExtractor {
    let geocoder = AddressGeocoder::new(
        Arc::new(NominatimClient::new(client(), &server.uri())),
        GeocoderSettings {
            backoff: Duration::ZERO,
            ..GeocoderSettings::default()
        },
    );
    LocationExtractor::new(
        Arc::new(FetchCache::new(client(), Duration::ZERO)),
        Arc::new(geocoder),
        max_linked_posts,
        1000,
    )
}

async fn mount_page(server: &MockServer, route: &str, body: &str, calls: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(html(body))
        .expect(calls)
        .mount(server)
        .await;
}

const PAGE_WITH_BLOG_LINKS: &str = r#"<html><body><h1>摩耶観光ホテルは兵庫県の廃墟</h1>
<ul><li><a href="/blog/a">a</a></li><li><a href="/blog/b">b</a></li><li><a href="/blog/c">c</a></li></ul>
</body></html>"#;

#[tokio::test]
async fn linked_post_region_supplies_coordinate() {
    let server = MockServer::start().await;
    mount_page(&server, "/s/10.html", PAGE_WITH_BLOG_LINKS, 1).await;
    mount_page(
        &server,
        "/blog/a",
        "<div><p>別の廃墟 34.11111, 135.22222</p></div>",
        1,
    )
    .await;
    mount_page(
        &server,
        "/blog/b",
        r"<body><section><p>関係ない 33.33333, 133.33333</p></section>
        <article><h2>摩耶観光ホテル</h2><p>34.72765, 135.21251</p></article></body>",
        1,
    )
    .await;
    // first hit stops the traversal
    mount_page(&server, "/blog/c", "<p>摩耶観光ホテル 35.55555, 136.66666</p>", 0).await;

    let location = extractor(&server, 3)
        .extract(&format!("{}/s/10.html", server.uri()))
        .await;

    assert_eq!(location.name, "摩耶観光ホテル");
    assert_eq!(location.coordinate_source, Some(CoordinateSource::LinkedPost));
    let c = location.coordinate.expect("linked coordinate");
    assert!((c.latitude() - 34.72765).abs() < 1e-9);
    assert!((c.longitude() - 135.21251).abs() < 1e-9);
}

#[tokio::test]
async fn linked_posts_respect_the_configured_bound() {
    let server = MockServer::start().await;
    mount_page(&server, "/s/10.html", PAGE_WITH_BLOG_LINKS, 1).await;
    mount_page(&server, "/blog/a", "<p>nothing here</p>", 1).await;
    mount_page(&server, "/blog/b", "<p>nothing here</p>", 1).await;
    mount_page(&server, "/blog/c", "<p>摩耶観光ホテル 35.55555, 136.66666</p>", 0).await;

    let location = extractor(&server, 2)
        .extract(&format!("{}/s/10.html", server.uri()))
        .await;

    assert!(location.coordinate.is_none());
    assert!(location.coordinate_source.is_none());
}
