//! Integration tests for the harvester
//!
//! These tests use wiremock to serve a small catalog site and drive the full
//! harvest cycle end-to-end against a temporary database.

use reel_harvest::config::{
    Config, CrawlerConfig, HttpConfig, OutputConfig, RetryConfig, SeedsConfig, SiteConfig,
};
use reel_harvest::crawler::{FetchClient, Harvester, PaginationWalker};
use reel_harvest::parser::SiteParser;
use reel_harvest::storage::{CatalogQuery, CrawlStore, SqliteStorage};
use reel_harvest::{ItemStatus, MediaKind};
use std::path::Path;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{body_string_contains, header, method, path, path_regex, query_param};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

/// Matches requests without a `page` query parameter
struct FirstPage;

impl Match for FirstPage {
    fn matches(&self, request: &Request) -> bool {
        !request.url.query_pairs().any(|(k, _)| k == "page")
    }
}

fn create_test_config(db_path: &Path, movies: Vec<String>, series: Vec<String>) -> Config {
    Config {
        crawler: CrawlerConfig {
            workers: 4,
            episode_workers: 3,
            server_workers: 2,
            max_listing_pages: 20,
        },
        http: HttpConfig {
            timeout_secs: 5,
            connect_timeout_secs: 2,
            request_delay_ms: 0,
            ..Default::default()
        },
        retry: RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
            jitter: false,
            ..Default::default()
        },
        site: SiteConfig {
            server_endpoint: Some("/ajax/server".to_string()),
            trailer_endpoint: Some("/ajax/trailer".to_string()),
            server_slots: 3,
        },
        seeds: SeedsConfig {
            movies,
            series,
            ..Default::default()
        },
        output: OutputConfig {
            database_path: db_path.display().to_string(),
        },
    }
}

fn html(body: impl AsRef<str>) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(format!("<html><body>{}</body></html>", body.as_ref()))
        .insert_header("content-type", "text/html; charset=utf-8")
}

fn detail_page(title: &str, extra: &str) -> ResponseTemplate {
    html(format!(
        r#"<div class="image"><img src="/img/poster.jpg"></div>
<h1 class="post-title">{}</h1>
<div class="story"><p>A plot.</p></div>
<div class="UnderPoster"><div class="imdbR"><span>7.9</span></div></div>
<ul class="RightTaxContent"><li><span>النوع :</span><a href="/g/drama">Drama</a></li></ul>
{}"#,
        title, extra
    ))
}

fn inline_watch_page(prefix: &str) -> ResponseTemplate {
    html(format!(
        r#"<ul class="watch--servers--list">
<li class="server--item" data-embed="https://player.example/{0}/a"></li>
<li class="server--item" data-embed="https://player.example/{0}/b"></li>
</ul>"#,
        prefix
    ))
}

fn ajax_watch_page(id: &str) -> ResponseTemplate {
    html(format!(
        r#"<ul class="watch--servers--list">
<li class="server--item" data-id="{0}" data-server="0">1</li>
<li class="server--item" data-id="{0}" data-server="1">2</li>
</ul>"#,
        id
    ))
}

fn episode_anchor(href: &str, label: &str) -> String {
    format!(r#"<a href="{}" title="{}"><em>x</em></a>"#, href, label)
}

fn listing_page(anchors: &[String], pages: u32) -> ResponseTemplate {
    let pagination: String = (2..=pages)
        .map(|n| format!(r#"<a href="?page={0}">{0}</a>"#, n))
        .collect();
    html(format!(
        r#"<div class="allepcont"><div class="row">{}</div></div><div class="pagination">{}</div>"#,
        anchors.join("\n"),
        pagination
    ))
}

/// Mounts a three-page listing with overlapping links and a duplicate number
async fn mount_season_one_listing(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/series/show-s1/list/"))
        .and(FirstPage)
        .respond_with(listing_page(
            &[
                episode_anchor("/episode/e1/", "الحلقة 1"),
                episode_anchor("/episode/e2/", "الحلقة 2"),
            ],
            3,
        ))
        .expect(1..)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/series/show-s1/list/"))
        .and(query_param("page", "2"))
        .respond_with(listing_page(
            &[
                episode_anchor("/episode/e2/", "الحلقة 2"),
                episode_anchor("/episode/e3/", "الحلقة 3"),
                episode_anchor("/episode/e3-4/", "الحلقة 3 و 4"),
            ],
            3,
        ))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/series/show-s1/list/"))
        .and(query_param("page", "3"))
        .respond_with(listing_page(
            &[
                episode_anchor("/episode/e3/", "الحلقة 3"),
                episode_anchor("/episode/e5/", "الحلقة 5"),
                episode_anchor("/episode/dup5/", "الحلقة 5"),
                episode_anchor("/episode/e4-5/", "الحلقة 4.5"),
            ],
            3,
        ))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_walker_dedupes_across_pages() {
    let server = MockServer::start().await;
    mount_season_one_listing(&server).await;

    let fetcher = FetchClient::new(
        &HttpConfig {
            request_delay_ms: 0,
            ..Default::default()
        },
        &RetryConfig::default(),
    )
    .unwrap();
    let parser = SiteParser::new();
    let listing = Url::parse(&format!("{}/series/show-s1/list/", server.uri())).unwrap();

    let walker = PaginationWalker::new(&fetcher, &parser, 20);
    let links = walker.walk(&listing).await.unwrap();

    let paths: Vec<String> = links
        .iter()
        .map(|l| Url::parse(&l.url).unwrap().path().to_string())
        .collect();
    assert_eq!(
        paths,
        vec![
            "/episode/e1/",
            "/episode/e2/",
            "/episode/e3/",
            "/episode/e3-4/",
            "/episode/e5/",
            "/episode/dup5/",
            "/episode/e4-5/",
        ]
    );

    // Each walk starts from page 1
    let again = walker.walk(&listing).await.unwrap();
    assert_eq!(again, links);
}

#[tokio::test]
async fn test_walker_respects_page_cap() {
    let server = MockServer::start().await;
    mount_season_one_listing(&server).await;

    let fetcher = FetchClient::new(
        &HttpConfig {
            request_delay_ms: 0,
            ..Default::default()
        },
        &RetryConfig::default(),
    )
    .unwrap();
    let parser = SiteParser::new();
    let listing = Url::parse(&format!("{}/series/show-s1/list/", server.uri())).unwrap();

    let links = PaginationWalker::new(&fetcher, &parser, 2)
        .walk(&listing)
        .await
        .unwrap();

    assert_eq!(links.len(), 4);
    assert!(links.iter().all(|l| !l.url.contains("e5")));
}

#[tokio::test]
async fn test_full_series_harvest() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/series/show/"))
        .respond_with(detail_page(
            "مسلسل Test Show مترجم",
            r#"<div class="Small--Box Season"><a href="/series/show-s2/" title="الموسم الثاني"></a></div>
<div class="Small--Box Season"><a href="/series/show-s1/" title="الموسم الاول"></a></div>"#,
        ))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/series/show-s1/"))
        .respond_with(html(
            r#"<div class="MainSingle"><div class="left"><div class="image"><img src="/img/s1.jpg"></div></div></div>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/series/show-s2/"))
        .respond_with(html("<p>season two</p>"))
        .mount(&server)
        .await;

    mount_season_one_listing(&server).await;
    Mock::given(method("GET"))
        .and(path("/series/show-s2/list/"))
        .respond_with(listing_page(
            &[episode_anchor("/episode/s2e1/", "الحلقة 1")],
            1,
        ))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/episode/e[^/]*/watch/$"))
        .respond_with(inline_watch_page("s1"))
        .expect(5)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/episode/s2e1/watch/"))
        .respond_with(ajax_watch_page("77"))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/ajax/server"))
        .and(header("X-Requested-With", "XMLHttpRequest"))
        .and(body_string_contains("i=0"))
        .respond_with(html(r#"<iframe src="https://player.example/s2e1/0"></iframe>"#))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ajax/server"))
        .and(body_string_contains("i=1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ajax/server"))
        .and(body_string_contains("i=2"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/ajax/trailer"))
        .and(body_string_contains("episode%2Fe1%2F"))
        .respond_with(html(r#"<iframe src="https://video.example/embed/trailer"></iframe>"#))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("harvest.db");
    let series_url = format!("{}/series/show/", base);
    let config = create_test_config(&db_path, vec![], vec![series_url.clone()]);

    let harvester = Harvester::new(config, "test-hash").unwrap();
    let summary = harvester.run(CancellationToken::new()).await.unwrap();

    assert_eq!(summary.completed, 1, "summary: {:?}", summary);
    assert_eq!(summary.failed, 0);

    let storage = SqliteStorage::new(&db_path).unwrap();
    let show = storage.get_subtree(&series_url).unwrap().unwrap();
    let subtree = show.subtree;

    assert_eq!(subtree.title, "Test Show");
    assert_eq!(subtree.kind, MediaKind::Series);
    assert_eq!(subtree.rating.as_deref(), Some("7.9"));
    assert_eq!(
        subtree.trailer_url.as_deref(),
        Some("https://video.example/embed/trailer")
    );
    assert_eq!(subtree.metadata.get("genres").unwrap(), &vec!["Drama"]);

    let seasons: Vec<i64> = subtree.seasons.iter().map(|s| s.season_number).collect();
    assert_eq!(seasons, vec![1, 2]);

    let season_one = &subtree.seasons[0];
    assert_eq!(
        season_one.poster_url.as_deref(),
        Some(format!("{}/img/s1.jpg", base).as_str())
    );
    let numbers: Vec<f64> = season_one
        .episodes
        .iter()
        .map(|e| e.episode_number)
        .collect();
    assert_eq!(numbers, vec![1.0, 2.0, 3.0, 4.5, 5.0]);
    assert!(season_one.episodes.iter().all(|e| e.servers.len() == 2));

    let season_two = &subtree.seasons[1];
    assert_eq!(season_two.episodes.len(), 1);
    let servers = &season_two.episodes[0].servers;
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].server_number, 0);
    assert_eq!(servers[0].embed_url, "https://player.example/s2e1/0");

    let stats = storage.statistics().unwrap();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.seasons, 2);
    assert_eq!(stats.episodes, 6);
    assert_eq!(stats.servers, 11);
}

#[tokio::test]
async fn test_movies_with_failures() {
    let server = MockServer::start().await;
    let base = server.uri();

    // Ajax servers, embedded trailer
    Mock::given(method("GET"))
        .and(path("/movie/m1/"))
        .respond_with(detail_page(
            "فيلم Good Movie 2024 مترجم اون لاين",
            r#"<div class="trailer"><iframe src="https://video.example/embed/m1"></iframe></div>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/movie/m1/watch/"))
        .respond_with(ajax_watch_page("77"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ajax/server"))
        .and(body_string_contains("i=0"))
        .respond_with(html(r#"<iframe src="https://player.example/m1/0"></iframe>"#))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ajax/server"))
        .and(body_string_contains("i=2"))
        .respond_with(html(r#"<iframe src="https://player.example/m1/2"></iframe>"#))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ajax/server"))
        .and(body_string_contains("i=1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<div></div>"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ajax/trailer"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    // Transient failures, then success
    Mock::given(method("GET"))
        .and(path("/movie/flaky/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/movie/flaky/"))
        .respond_with(detail_page("Flaky Movie", ""))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/movie/flaky/watch/"))
        .respond_with(inline_watch_page("flaky"))
        .mount(&server)
        .await;

    // Permanent failure: never retried
    Mock::given(method("GET"))
        .and(path("/movie/gone/"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    // No title
    Mock::given(method("GET"))
        .and(path("/movie/blank/"))
        .respond_with(html("<p>nothing here</p>"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("harvest.db");
    let movies: Vec<String> = ["m1", "flaky", "gone", "blank"]
        .iter()
        .map(|m| format!("{}/movie/{}/", base, m))
        .collect();
    let config = create_test_config(&db_path, movies, vec![]);

    let harvester = Harvester::new(config, "test-hash").unwrap();
    let summary = harvester.run(CancellationToken::new()).await.unwrap();
    assert_eq!(summary.completed, 2, "summary: {:?}", summary);
    assert_eq!(summary.failed, 2);

    let storage = SqliteStorage::new(&db_path).unwrap();

    let m1 = storage
        .get_subtree(&format!("{}/movie/m1/", base))
        .unwrap()
        .unwrap()
        .subtree;
    assert_eq!(m1.title, "Good Movie 2024");
    assert_eq!(m1.trailer_url.as_deref(), Some("https://video.example/embed/m1"));
    assert_eq!(m1.seasons.len(), 1);
    assert_eq!(m1.seasons[0].season_number, 1);
    assert_eq!(m1.seasons[0].episodes[0].episode_number, 1.0);
    let server_numbers: Vec<u32> = m1.seasons[0].episodes[0]
        .servers
        .iter()
        .map(|s| s.server_number)
        .collect();
    assert_eq!(server_numbers, vec![0, 2]);

    let flaky = storage
        .get_item(&format!("{}/movie/flaky/", base))
        .unwrap()
        .unwrap();
    assert_eq!(flaky.status, ItemStatus::Completed);

    let gone = storage
        .get_item(&format!("{}/movie/gone/", base))
        .unwrap()
        .unwrap();
    assert_eq!(gone.status, ItemStatus::Error);
    assert_eq!(gone.attempt_count, 1);
    assert!(gone.last_error.unwrap().contains("HTTP 404"));

    let blank = storage
        .get_item(&format!("{}/movie/blank/", base))
        .unwrap()
        .unwrap();
    assert_eq!(blank.status, ItemStatus::Error);
    assert!(blank.last_error.unwrap().contains("no title"));

    let errors = storage.items_by_status(ItemStatus::Error).unwrap();
    assert_eq!(errors.len(), 2);
}

#[tokio::test]
async fn test_resume_after_errors_and_crash() {
    let server = MockServer::start().await;
    let base = server.uri();

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("harvest.db");
    let movies: Vec<String> = ["a", "b", "c"]
        .iter()
        .map(|m| format!("{}/movie/{}/", base, m))
        .collect();

    for name in ["a", "c"] {
        Mock::given(method("GET"))
            .and(path(format!("/movie/{}/", name)))
            .respond_with(detail_page(&format!("Movie {}", name), ""))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/movie/{}/watch/", name)))
            .respond_with(inline_watch_page(name))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/movie/b/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    // A crashed earlier run left `c` claimed
    {
        let mut storage = SqliteStorage::new(&db_path).unwrap();
        storage
            .seed(&[reel_harvest::storage::SeedItem::new(
                movies[2].clone(),
                MediaKind::Movie,
            )])
            .unwrap();
        let crashed_run = storage.create_run("old-hash").unwrap();
        assert!(storage.claim(&movies[2], crashed_run).unwrap());
    }

    let config = create_test_config(&db_path, movies.clone(), vec![]);
    let harvester = Harvester::new(config.clone(), "test-hash").unwrap();
    let first = harvester.run(CancellationToken::new()).await.unwrap();
    assert_eq!(first.completed, 2);
    assert_eq!(first.failed, 1);
    let completed_after_first = harvester.statistics().unwrap().completed;
    drop(harvester);

    // `b` recovers; completed items are not scraped again
    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/movie/b/"))
        .respond_with(detail_page("Movie b", ""))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/movie/b/watch/"))
        .respond_with(inline_watch_page("b"))
        .mount(&server)
        .await;

    let harvester = Harvester::new(config, "test-hash").unwrap();
    {
        let storage = harvester.storage();
        let mut guard = storage.lock().unwrap();
        assert_eq!(guard.reset_errors().unwrap(), 1);
    }
    let second = harvester.run(CancellationToken::new()).await.unwrap();
    assert_eq!(second.claimed, 1);
    assert_eq!(second.completed, 1);

    let stats = harvester.statistics().unwrap();
    assert!(stats.completed > completed_after_first);
    assert_eq!(stats.completed, 3);
    assert_eq!(stats.error, 0);
    assert_eq!(stats.shows, 3);
}

#[tokio::test]
async fn test_failed_child_page_fails_whole_series() {
    let server = MockServer::start().await;
    let base = server.uri();

    // Season 2 page is gone
    Mock::given(method("GET"))
        .and(path("/series/broken-season/"))
        .respond_with(detail_page(
            "Broken Season",
            r#"<div class="Small--Box Season"><a href="/series/bs-s1/" title="الموسم 1"></a></div>
<div class="Small--Box Season"><a href="/series/bs-s2/" title="الموسم 2"></a></div>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/series/bs-s1/"))
        .respond_with(html("<p>season one</p>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/series/bs-s1/list/"))
        .respond_with(listing_page(&[episode_anchor("/episode/bs1/", "الحلقة 1")], 1))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/episode/bs1/watch/"))
        .respond_with(inline_watch_page("bs1"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/series/bs-s2/"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    // One episode watch page keeps failing; the series page is its own season
    Mock::given(method("GET"))
        .and(path("/series/broken-episode/"))
        .respond_with(detail_page("Broken Episode", ""))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/series/broken-episode/list/"))
        .respond_with(listing_page(
            &[
                episode_anchor("/episode/be1/", "الحلقة 1"),
                episode_anchor("/episode/be2/", "الحلقة 2"),
            ],
            1,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/episode/be1/watch/"))
        .respond_with(inline_watch_page("be1"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/episode/be2/watch/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("harvest.db");
    let broken_season = format!("{}/series/broken-season/", base);
    let broken_episode = format!("{}/series/broken-episode/", base);
    let config = create_test_config(
        &db_path,
        vec![],
        vec![broken_season.clone(), broken_episode.clone()],
    );

    let harvester = Harvester::new(config, "test-hash").unwrap();
    let summary = harvester.run(CancellationToken::new()).await.unwrap();
    assert_eq!(summary.completed, 0, "summary: {:?}", summary);
    assert_eq!(summary.failed, 2);

    let storage = SqliteStorage::new(&db_path).unwrap();
    assert!(storage.get_subtree(&broken_season).unwrap().is_none());
    assert!(storage.get_subtree(&broken_episode).unwrap().is_none());

    let stats = storage.statistics().unwrap();
    assert_eq!(stats.error, 2);
    assert_eq!(stats.shows, 0);
    assert_eq!(stats.seasons, 0);
    assert_eq!(stats.episodes, 0);
    assert_eq!(stats.servers, 0);

    let season_item = storage.get_item(&broken_season).unwrap().unwrap();
    assert_eq!(season_item.status, ItemStatus::Error);
    let reason = season_item.last_error.unwrap();
    assert!(reason.contains("/series/bs-s2/"), "reason: {}", reason);
    assert!(reason.contains("HTTP 404"));

    let episode_item = storage.get_item(&broken_episode).unwrap().unwrap();
    assert_eq!(episode_item.status, ItemStatus::Error);
    let reason = episode_item.last_error.unwrap();
    assert!(reason.contains("/episode/be2/watch/"), "reason: {}", reason);
    assert!(reason.contains("HTTP 500"));
}
