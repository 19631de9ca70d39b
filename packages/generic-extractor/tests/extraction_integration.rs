//! End-to-end job tree tests against the mock transport.

use std::sync::Arc;
use std::time::Duration;

use generic_extractor::pagination::{OffsetConfig, PageNumberConfig};
use generic_extractor::{
    ApiDefinition, Executor, ExtractorConfig, ExtractorError, GenericExtractor, JobSpec,
    JsonFileMetadata, MetadataPersistence, MockTransport, MockTransportBuilder, PlaceholderSpec,
    ScrollerConfig, Table,
};
use serde_json::{json, Value};

fn extractor(api: ApiDefinition, transport: &MockTransport) -> GenericExtractor {
    GenericExtractor::new(api)
        .with_transport_builder(Arc::new(MockTransportBuilder::new(transport.clone())))
}

fn page_api() -> ApiDefinition {
    ApiDefinition::new("helpdesk", "https://helpdesk.example.com/api/")
        .with_pagination(ScrollerConfig::PageNum(PageNumberConfig::default()))
}

fn table(extractor: &GenericExtractor, name: &str) -> Table {
    extractor
        .parser()
        .and_then(|parser| parser.results().into_iter().find(|t| t.name == name))
        .unwrap_or_else(|| panic!("table {} not found", name))
}

fn column(table: &Table, name: &str) -> Vec<Value> {
    table
        .column(name)
        .unwrap_or_else(|| panic!("column {} not found", name))
        .into_iter()
        .cloned()
        .collect()
}

#[tokio::test]
async fn test_tickets_spawn_one_comment_job_per_row() {
    let transport = MockTransport::new()
        .with_pages("tickets", vec![json!([{"id": 1}, {"id": 2}]), json!([])])
        .with_pages(
            "tickets/1/comments",
            vec![json!([{"body": "first"}]), json!([])],
        )
        .with_pages(
            "tickets/2/comments",
            vec![json!([{"body": "second"}, {"body": "third"}]), json!([])],
        );

    let spec = JobSpec::new("tickets").with_child(
        JobSpec::new("tickets/{id}/comments")
            .with_data_type("comments")
            .with_placeholder("id", PlaceholderSpec::path("id")),
    );
    let mut extractor = extractor(page_api(), &transport);
    extractor
        .run(&ExtractorConfig::new(vec![spec]))
        .await
        .unwrap();

    let first_pages: Vec<String> = transport
        .calls()
        .into_iter()
        .filter(|r| r.endpoint.ends_with("/comments") && r.params.get("page") == Some(&json!(1)))
        .map(|r| r.endpoint)
        .collect();
    assert_eq!(first_pages, vec!["tickets/1/comments", "tickets/2/comments"]);
    assert_eq!(transport.calls_to("tickets"), 2);

    let comments = table(&extractor, "comments");
    assert_eq!(column(&comments, "parent_id"), vec![json!(1), json!(2), json!(2)]);
    assert_eq!(
        column(&comments, "body"),
        vec![json!("first"), json!("second"), json!("third")]
    );
}

#[tokio::test]
async fn test_repeated_page_stops_pagination() {
    // Offset pagination keeps asking while pages are full; the API ignores
    // the offset and answers with the same page forever.
    let api = ApiDefinition::new("loop", "https://loop.example.com/")
        .with_pagination(ScrollerConfig::Offset(OffsetConfig::new(1)));
    let transport = MockTransport::new()
        .with_response("items", json!([{"id": 1}]))
        .with_response("items/1/detail", json!([{"size": 3}]));

    let spec = JobSpec::new("items").with_child(
        JobSpec::new("items/{id}/detail")
            .with_data_type("detail")
            .with_placeholder("id", PlaceholderSpec::path("id")),
    );
    let mut extractor = extractor(api, &transport);
    extractor
        .run(&ExtractorConfig::new(vec![spec]))
        .await
        .unwrap();

    // One accepted page plus the duplicate
    assert_eq!(transport.calls_to("items"), 2);

    // Only the accepted page spawned a child
    let child_starts = transport
        .calls()
        .into_iter()
        .filter(|r| r.endpoint == "items/1/detail" && r.params.get("offset") == Some(&json!(0)))
        .count();
    assert_eq!(child_starts, 1);

    assert_eq!(table(&extractor, "items").row_count(), 1);
    assert_eq!(table(&extractor, "detail").row_count(), 1);
}

#[tokio::test]
async fn test_grandchild_addresses_both_ancestor_levels() {
    let transport = MockTransport::new()
        .with_response("tickets", json!([{"id": "g"}]))
        .with_response("tickets/g/comments", json!([{"id": "p1"}, {"id": "p2"}]))
        .with_response("t/g/c/p1/attachments", json!([{"file": "a.txt"}]))
        .with_response("t/g/c/p2/attachments", json!([{"file": "b.txt"}]));

    let spec = JobSpec::new("tickets").with_child(
        JobSpec::new("tickets/{id}/comments")
            .with_data_type("comments")
            .with_placeholder("id", PlaceholderSpec::path("id"))
            .with_child(
                JobSpec::new("t/{2:id}/c/{1:id}/attachments")
                    .with_data_type("attachments")
                    .with_placeholder("2:id", PlaceholderSpec::path("id"))
                    .with_placeholder("1:id", PlaceholderSpec::path("id")),
            ),
    );
    let mut extractor = extractor(ApiDefinition::new("helpdesk", "https://h.example.com/"), &transport);
    extractor
        .run(&ExtractorConfig::new(vec![spec]))
        .await
        .unwrap();

    assert_eq!(
        transport.endpoints(),
        vec![
            "tickets",
            "tickets/g/comments",
            "t/g/c/p1/attachments",
            "t/g/c/p2/attachments"
        ]
    );
    assert_eq!(table(&extractor, "attachments").row_count(), 2);
}

#[tokio::test]
async fn test_parent_columns_from_every_level() {
    let transport = MockTransport::new()
        .with_response("tickets", json!([{"id": 1}]))
        .with_response("tickets/1/comments", json!([{"comment_id": 10, "parent_id": 99}]))
        .with_response("tickets/1/comments/10/attachments", json!([{"file": "a.txt"}]));

    let spec = JobSpec::new("tickets").with_child(
        JobSpec::new("tickets/{ticket}/comments")
            .with_data_type("comments")
            .with_placeholder("ticket", PlaceholderSpec::path("id"))
            .with_child(
                JobSpec::new("tickets/{ticket}/comments/{comment}/attachments")
                    .with_data_type("attachments")
                    .with_placeholder("comment", PlaceholderSpec::path("comment_id"))
                    .with_placeholder("thread", PlaceholderSpec::path("parent_id")),
            ),
    );
    let mut extractor = extractor(ApiDefinition::new("helpdesk", "https://h.example.com/"), &transport);
    extractor
        .run(&ExtractorConfig::new(vec![spec]))
        .await
        .unwrap();

    let attachments = table(&extractor, "attachments");
    assert_eq!(column(&attachments, "parent_comment_id"), vec![json!(10)]);
    // `parent_id` comes from both the ticket binding and the already
    // prefixed `parent_id` field; it is never prefixed twice.
    assert!(attachments.columns.iter().all(|c| !c.starts_with("parent_parent_")));
    assert_eq!(column(&attachments, "parent_id"), vec![json!(99)]);
}

#[tokio::test]
async fn test_own_binding_overrides_inherited() {
    let transport = MockTransport::new()
        .with_response("tickets", json!([{"id": 1}]))
        .with_response("tickets/1/comments", json!([{"author_id": "u7"}]))
        .with_response("users/u7", json!({"name": "Ada"}))
        .with_response("users/u7/groups", json!([{"group": "admins"}]));

    let spec = JobSpec::new("tickets").with_child(
        JobSpec::new("tickets/{id}/comments")
            .with_data_type("comments")
            .with_placeholder("id", PlaceholderSpec::path("id"))
            .with_child(
                JobSpec::new("users/{id}")
                    .with_data_type("authors")
                    .with_placeholder("id", PlaceholderSpec::path("author_id"))
                    .with_child(JobSpec::new("users/{id}/groups").with_data_type("groups")),
            ),
    );
    let mut extractor = extractor(ApiDefinition::new("helpdesk", "https://h.example.com/"), &transport);
    extractor
        .run(&ExtractorConfig::new(vec![spec]))
        .await
        .unwrap();

    assert!(transport.endpoints().contains(&"users/u7/groups".to_string()));
    assert_eq!(column(&table(&extractor, "groups"), "parent_author_id"), vec![json!("u7")]);
}

#[tokio::test]
async fn test_missing_level_names_job_and_level() {
    let transport = MockTransport::new().with_response("tickets", json!([{"id": 1}]));
    let spec = JobSpec::new("tickets").with_child(
        JobSpec::new("tickets/{2:id}/comments")
            .with_id("comments")
            .with_placeholder("2:id", PlaceholderSpec::path("id")),
    );
    let mut extractor = extractor(ApiDefinition::new("helpdesk", "https://h.example.com/"), &transport);
    let err = extractor
        .run(&ExtractorConfig::new(vec![spec]))
        .await
        .unwrap_err();

    let message = err.to_string();
    assert!(message.contains("comments"), "{}", message);
    assert!(
        message.contains("Level 2 not found in parent results! Maximum level: 1"),
        "{}",
        message
    );
    assert!(matches!(err, ExtractorError::Job { .. }));
}

#[tokio::test]
async fn test_response_and_recursion_filters() {
    let transport = MockTransport::new()
        .with_response(
            "tickets",
            json!({"tickets": [
                {"id": 1, "status": "open"},
                {"id": 2, "status": "deleted"},
                {"id": 3, "status": "closed"}
            ]}),
        )
        .with_response("tickets/1/comments", json!([{"body": "x"}]));

    let spec = JobSpec::new("tickets")
        .with_data_field("tickets")
        .with_response_filter("status==deleted")
        .with_child(
            JobSpec::new("tickets/{id}/comments")
                .with_data_type("comments")
                .with_placeholder("id", PlaceholderSpec::path("id"))
                .with_recursion_filter("status==open"),
        );
    let mut extractor = extractor(ApiDefinition::new("helpdesk", "https://h.example.com/"), &transport);
    extractor
        .run(&ExtractorConfig::new(vec![spec]))
        .await
        .unwrap();

    assert_eq!(column(&table(&extractor, "tickets"), "id"), vec![json!(1), json!(3)]);
    assert_eq!(transport.endpoints(), vec!["tickets", "tickets/1/comments"]);
}

fn run_fixture() -> (Vec<ExtractorConfig>, MockTransport) {
    let transport = MockTransport::new()
        .with_pages("tickets", vec![json!([{"id": 1, "via": {"channel": "web"}}, {"id": 2}]), json!([])])
        .with_pages("tickets/1/comments", vec![json!([{"body": "a", "tags": ["x"]}]), json!([])])
        .with_pages("tickets/2/comments", vec![json!([{"body": "b"}]), json!([])]);
    let spec = JobSpec::new("tickets").with_child(
        JobSpec::new("tickets/{id}/comments")
            .with_data_type("comments")
            .with_placeholder("id", PlaceholderSpec::path("id")),
    );
    (vec![ExtractorConfig::new(vec![spec]).with_name("main")], transport)
}

#[tokio::test]
async fn test_reprocessing_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let mut outputs = Vec::new();

    for attempt in 0..2 {
        let (configs, transport) = run_fixture();
        let persistence = JsonFileMetadata::new(dir.path().join(format!("state-{}.json", attempt)));
        let output = Executor::new(page_api())
            .with_transport_builder(Arc::new(MockTransportBuilder::new(transport)))
            .run(&configs, &persistence)
            .await
            .unwrap();
        outputs.push(output);
    }

    assert_eq!(outputs[0].buckets[0].tables, outputs[1].buckets[0].tables);
    assert_eq!(outputs[0].metadata.schema, outputs[1].metadata.schema);
    assert_eq!(outputs[0].metadata.schema["tickets"]["via"], "object");
}

#[tokio::test]
async fn test_metadata_snapshot_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let persistence = JsonFileMetadata::new(dir.path().join("state.json"));
    let (configs, transport) = run_fixture();

    Executor::new(page_api())
        .with_transport_builder(Arc::new(MockTransportBuilder::new(transport)))
        .run(&configs, &persistence)
        .await
        .unwrap();

    let saved = persistence.load().unwrap();
    assert!(saved.time.previous_start > 0);
    assert!(saved.time.current_start.is_none());
    assert!(saved.schema.contains_key("comments"));

    let raw: Value =
        serde_json::from_str(&std::fs::read_to_string(persistence.path()).unwrap()).unwrap();
    assert!(raw.get("json_parser.struct").is_some());
}

#[tokio::test]
async fn test_concurrent_children_produce_same_rows() {
    let mut row_sets = Vec::new();
    for concurrency in [1, 4] {
        let transport = MockTransport::new()
            .with_response("tickets", json!((1..=6).map(|id| json!({"id": id})).collect::<Vec<_>>()))
            .with_delay(Duration::from_millis(2));
        for id in 1..=6 {
            transport.add_response(format!("tickets/{}/comments", id), json!([{"ticket": id}]));
        }
        let spec = JobSpec::new("tickets").with_child(
            JobSpec::new("tickets/{id}/comments")
                .with_data_type("comments")
                .with_placeholder("id", PlaceholderSpec::path("id")),
        );
        let mut extractor = extractor(ApiDefinition::new("helpdesk", "https://h.example.com/"), &transport)
            .with_child_concurrency(concurrency);
        extractor
            .run(&ExtractorConfig::new(vec![spec]))
            .await
            .unwrap();

        let comments = table(&extractor, "comments");
        let mut pairs: Vec<(String, String)> = comments
            .rows
            .iter()
            .map(|row| (row[0].to_string(), row[1].to_string()))
            .collect();
        pairs.sort();
        row_sets.push(pairs);
    }

    assert_eq!(row_sets[0].len(), 6);
    assert_eq!(row_sets[0], row_sets[1]);
}

#[tokio::test]
async fn test_failure_stops_new_jobs() {
    let transport = MockTransport::new()
        .with_response("tickets", json!([{"id": 1}, {"id": 2}, {"id": 3}]))
        .with_response("tickets/2/comments", json!([]))
        .with_response("tickets/3/comments", json!([]))
        .with_failure("tickets/1/comments", 500);

    let spec = JobSpec::new("tickets").with_child(
        JobSpec::new("tickets/{id}/comments")
            .with_data_type("comments")
            .with_placeholder("id", PlaceholderSpec::path("id")),
    );
    let mut extractor = extractor(ApiDefinition::new("helpdesk", "https://h.example.com/"), &transport);
    let err = extractor
        .run(&ExtractorConfig::new(vec![spec, JobSpec::new("users")]))
        .await
        .unwrap_err();

    assert!(matches!(
        err.root_cause(),
        ExtractorError::Transport(generic_extractor::TransportError::Status { status: 500, .. })
    ));
    assert_eq!(transport.endpoints(), vec!["tickets", "tickets/1/comments"]);
}
