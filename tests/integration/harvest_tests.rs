//! Integration tests for the harvester
//!
//! These tests use wiremock to stand in for the passage source and run
//! whole unit harvests end-to-end, down to the CSV tables on disk.

use chrono::NaiveDate;
use passage_harvester::catalog::{BookCatalog, EditionCatalog};
use passage_harvester::config::{
    load_config, CatalogConfig, Config, ContentMode, HarvestConfig, OutputConfig, SourceConfig,
};
use passage_harvester::harvester::Harvester;
use passage_harvester::{harvest_unit, ConfigError, HarvestError, RuleSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BOOKS: &str = r#"{"books": {"AMP": [
    {"display": "Genesis", "num_chapters": 2},
    {"display": "Ruth", "num_chapters": 4},
    {"display": "Jude", "num_chapters": 1}
]}}"#;

const EDITIONS: &str = r#"{"Amplified (AMP)": "AMP", "King James Version (KJV)": "KJV"}"#;

/// Writes the catalogs into `dir` and builds a configuration around them
fn create_test_config(base_url: &str, dir: &Path) -> Config {
    std::fs::write(dir.join("books.json"), BOOKS).unwrap();
    std::fs::write(dir.join("editions.json"), EDITIONS).unwrap();

    Config {
        harvest: HarvestConfig {
            edition: "AMP".to_string(),
            workers: 4,
            batch_size: 100,
            mode: ContentMode::Text,
            ascii_only: true,
        },
        source: SourceConfig {
            base_url: format!("{}/passage", base_url),
            user_agent: "TestHarvester/1.0".to_string(),
            watchdog_timeout_ms: 2000,
            request_timeout_ms: 1000,
            session_retries: 0,
            session_backoff_ms: 1,
            max_attempts: 0,
            retry_backoff_ms: 0,
        },
        catalog: CatalogConfig {
            books_path: dir.join("books.json"),
            editions_path: dir.join("editions.json"),
            rules_path: None,
        },
        output: OutputConfig {
            directory: dir.join("data"),
            markup_directory: dir.join("data/html"),
            flush_attempts: 3,
            flush_backoff_ms: 1,
        },
    }
}

fn run_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
}

fn passage_page(title: &str, verses: &[(u32, &str)]) -> String {
    let spans: String = verses
        .iter()
        .map(|(n, text)| {
            format!(
                r#"<span class="text"><sup class="versenum">{} </sup>{}<sup class="crossreference">(A)</sup></span> "#,
                n, text
            )
        })
        .collect();
    format!(
        r#"<html><body><div class="passage-text"><h3>{}</h3><p>{}</p></div></body></html>"#,
        title, spans
    )
}

fn empty_page() -> String {
    "<html><body><div class=\"search-results\">No results found.</div></body></html>".to_string()
}

async fn mount_chapter(server: &MockServer, search: &str, body: String) {
    Mock::given(method("GET"))
        .and(path("/passage"))
        .and(query_param("search", search))
        .and(query_param("version", "AMP"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

fn read_rows(path: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .unwrap();
    reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect()
}

fn harvester(config: Config) -> Harvester {
    Harvester::new(config).unwrap().with_run_date(run_date())
}

#[tokio::test]
async fn test_harvest_unit_with_missing_chapter() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), dir.path());

    mount_chapter(&server, "Genesis 1", passage_page("The Creation", &[(1, "In the beginning")])).await;
    mount_chapter(&server, "Genesis 2", empty_page()).await;

    let report = harvester(config).harvest_unit("Genesis").await.unwrap();

    assert_eq!(report.stats.processed, 2);
    assert_eq!(report.stats.records, 1);
    assert_eq!(report.stats.misses, 1);
    assert_eq!(report.flushes, 1);

    let target = dir.path().join("data/AMP_Genesis_2024-06-01.csv");
    assert_eq!(report.plan.target, target);

    let rows = read_rows(&target);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0], vec!["Edition", "ID", "Unit", "Chapter", "Title", "Content"]);
    assert_eq!(
        rows[1],
        vec!["Amplified", "AMP", "Genesis", "1", "The Creation", "1 In the beginning"]
    );
}

#[tokio::test]
async fn test_batches_keep_one_header_and_chapter_order() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&server.uri(), dir.path());
    config.harvest.batch_size = 3;

    for chapter in 1..=4 {
        let text = format!("Verse of chapter {}", chapter);
        mount_chapter(
            &server,
            &format!("Ruth {}", chapter),
            passage_page("Ruth", &[(1, text.as_str())]),
        )
        .await;
    }

    let report = harvester(config).harvest_unit("ruth").await.unwrap();
    assert_eq!(report.stats.records, 4);
    assert_eq!(report.flushes, 2);

    let rows = read_rows(&report.plan.target);
    assert_eq!(rows.len(), 5);
    assert_eq!(rows.iter().filter(|r| r[0] == "Edition").count(), 1);

    let chapters: Vec<u32> = rows[1..].iter().map(|r| r[3].parse().unwrap()).collect();
    assert_eq!(chapters, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_file_in_chapter_order_when_chapters_finish_in_reverse() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&server.uri(), dir.path());
    config.harvest.batch_size = 1;

    // Chapter 1 answers last, chapter 4 first
    for (chapter, delay_ms) in [(1u32, 300u64), (2, 200), (3, 100), (4, 0)] {
        let text = format!("Verse of chapter {}", chapter);
        Mock::given(method("GET"))
            .and(path("/passage"))
            .and(query_param("search", format!("Ruth {}", chapter).as_str()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(passage_page("Ruth", &[(1, text.as_str())]))
                    .set_delay(Duration::from_millis(delay_ms)),
            )
            .mount(&server)
            .await;
    }

    let report = harvester(config).harvest_unit("Ruth").await.unwrap();
    assert_eq!(report.flushes, 4);

    let rows = read_rows(&report.plan.target);
    assert_eq!(rows.iter().filter(|r| r[0] == "Edition").count(), 1);
    assert_eq!(rows[0][0], "Edition");

    let chapters: Vec<u32> = rows[1..].iter().map(|r| r[3].parse().unwrap()).collect();
    assert_eq!(chapters, vec![1, 2, 3, 4]);
    assert_eq!(rows[1][5], "1 Verse of chapter 1");
}

#[tokio::test]
async fn test_flush_failure_fails_unit() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&server.uri(), dir.path());
    config.harvest.batch_size = 1;

    // A directory squatting on the table path makes every flush fail
    let target = dir.path().join("data/AMP_Jude_2024-06-01.csv");
    std::fs::create_dir_all(&target).unwrap();

    mount_chapter(&server, "Jude 1", passage_page("Greeting", &[(1, "Jude")])).await;

    let result = harvester(config).harvest_unit("Jude").await;
    assert!(matches!(result, Err(HarvestError::Storage(_))));
    assert!(target.is_dir());
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), dir.path());

    Mock::given(method("GET"))
        .and(path("/passage"))
        .and(query_param("search", "Jude 1"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    mount_chapter(&server, "Jude 1", passage_page("Greeting", &[(1, "Jude, a servant")])).await;

    let report = harvester(config).harvest_unit("Jude").await.unwrap();

    assert_eq!(report.stats.records, 1);
    assert_eq!(report.stats.abandoned, 0);
    let rows = read_rows(&report.plan.target);
    assert_eq!(rows[1][5], "1 Jude, a servant");
}

#[tokio::test]
async fn test_slow_response_is_retried_on_new_session() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&server.uri(), dir.path());
    config.source.request_timeout_ms = 200;
    config.source.watchdog_timeout_ms = 400;

    Mock::given(method("GET"))
        .and(path("/passage"))
        .and(query_param("search", "Jude 1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(passage_page("Greeting", &[(1, "late")]))
                .set_delay(Duration::from_millis(1500)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_chapter(&server, "Jude 1", passage_page("Greeting", &[(1, "on time")])).await;

    let report = harvester(config).harvest_unit("Jude").await.unwrap();

    let rows = read_rows(&report.plan.target);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1][5], "1 on time");
}

#[tokio::test]
async fn test_bounded_attempts_abandon_chapter() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&server.uri(), dir.path());
    config.source.max_attempts = 3;

    Mock::given(method("GET"))
        .and(path("/passage"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let report = harvester(config).harvest_unit("Jude").await.unwrap();

    assert_eq!(report.stats.processed, 1);
    assert_eq!(report.stats.abandoned, 1);
    assert_eq!(report.stats.records, 0);
    assert_eq!(report.flushes, 0);
    assert!(!report.plan.target.exists());
}

#[tokio::test]
async fn test_markup_mode_writes_rewritten_side_file() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&server.uri(), dir.path());
    config.harvest.mode = ContentMode::Markup;

    let rules_path = dir.path().join("rules.toml");
    std::fs::write(
        &rules_path,
        r#"
[[rule]]
tag = "a"
attributes = { class = "crossref(.*)" }
actions = [{ kind = "remove" }]

[[rule]]
tag = "div"
attributes = { class = "text-html" }
actions = [{ kind = "rename", to = "section" }, { kind = "remove-attributes", names = ["class"] }]
"#,
    )
    .unwrap();
    config.catalog.rules_path = Some(rules_path);

    let page = r##"<html><body><div class="passage-text"><h3>Greeting</h3>
        <div class="version-AMP text-html"><p>Jude, a servant<a class="crossref-3" href="#c">c</a> of Jesus</p></div>
        </div></body></html>"##;
    mount_chapter(&server, "Jude 1", page.to_string()).await;

    let report = harvester(config).harvest_unit("Jude").await.unwrap();

    let rows = read_rows(&report.plan.target);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1][4], "Greeting");

    let file_name = &rows[1][5];
    assert_eq!(file_name, "AMP_Jude_1_2024-06-01.html");

    let markup = std::fs::read_to_string(dir.path().join("data/html").join(file_name)).unwrap();
    assert_eq!(markup, "<section><p>Jude, a servant of Jesus</p></section>");
}

#[tokio::test]
async fn test_unknown_edition_fails_before_any_request() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&server.uri(), dir.path());
    config.harvest.edition = "NOPE".to_string();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let result = Harvester::new(config);
    assert!(matches!(
        result,
        Err(HarvestError::Config(ConfigError::UnknownEdition(_)))
    ));
}

#[tokio::test]
async fn test_malformed_rule_document_is_fatal() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config("http://127.0.0.1:9", dir.path());

    let rules_path = dir.path().join("rules.toml");
    std::fs::write(
        &rules_path,
        r#"
[[rule]]
tag = "a"
actions = [{ kind = "remove" }, { kind = "rename", to = "span" }]
"#,
    )
    .unwrap();
    config.catalog.rules_path = Some(rules_path);

    assert!(matches!(Harvester::new(config), Err(HarvestError::Rule(_))));
}

#[tokio::test]
async fn test_harvest_from_config_file() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    create_test_config(&server.uri(), dir.path());

    let config_path: PathBuf = dir.path().join("harvest.toml");
    std::fs::write(
        &config_path,
        format!(
            r#"
[harvest]
edition = "amp"
workers = 2

[source]
base-url = "{}/passage"

[catalog]
books-path = "{}"
editions-path = "{}"

[output]
directory = "{}"
markup-directory = "{}"
"#,
            server.uri(),
            dir.path().join("books.json").display(),
            dir.path().join("editions.json").display(),
            dir.path().join("out").display(),
            dir.path().join("out/html").display(),
        ),
    )
    .unwrap();

    mount_chapter(&server, "Jude 1", passage_page("Greeting", &[(1, "Jude")])).await;

    let config = load_config(&config_path).unwrap();
    let report = harvest_unit(config, "jude").await.unwrap();

    assert_eq!(report.stats.records, 1);
    assert!(report.plan.target.starts_with(dir.path().join("out")));
    assert_eq!(read_rows(&report.plan.target).len(), 2);
}

#[test]
fn test_catalogs_and_rules_load_from_parts() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config("http://127.0.0.1:9", dir.path());

    let books = BookCatalog::load(&config.catalog.books_path).unwrap();
    let editions = EditionCatalog::load(&config.catalog.editions_path).unwrap();
    let harvester = Harvester::from_parts(config, books, &editions, RuleSet::default()).unwrap();

    assert_eq!(harvester.edition().label, "Amplified");
    assert_eq!(harvester.plan("gen").unwrap().chapters, 2);
}

#[test]
fn test_shipped_samples_load() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR"));

    let config = load_config(&root.join("harvest.toml")).unwrap();
    assert_eq!(config.harvest.edition, "AMP");

    let rules = RuleSet::load(&root.join("catalog/rules.toml")).unwrap();
    assert!(!rules.is_empty());

    let books = BookCatalog::load(&root.join("catalog/books.json")).unwrap();
    let editions = EditionCatalog::load(&root.join("catalog/editions.json")).unwrap();
    let harvester = Harvester::from_parts(config, books, &editions, rules).unwrap();
    assert_eq!(harvester.plan("genesis").unwrap().chapters, 50);
    assert_eq!(harvester.edition().label, "Amplified Bible");
}
