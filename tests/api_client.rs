//! HTTP-level behaviour of `ApiClient` against a mock Help Scout API.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use wiremock::matchers::{header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lookout::api_client::{ApiClient, CacheOptions};
use lookout::auth::Credentials;
use lookout::cache::{CacheConfig, ResponseCache};
use lookout::error::ErrorKind;
use lookout::models::{Collection, ConversationSummary, CreatedResource, Page};
use lookout::normalize::ApiFamily;
use lookout::pool::PoolConfig;
use lookout::resolver::EntityResolver;
use lookout::retry::RetryPolicy;

fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy::new(max_retries, Duration::from_millis(10), Duration::from_millis(50))
}

fn cache() -> Arc<ResponseCache> {
    Arc::new(ResponseCache::new(&CacheConfig::default()))
}

fn mailbox_client(server: &MockServer, retries: u32) -> ApiClient {
    ApiClient::new(
        ApiFamily::Mailbox,
        server.uri(),
        Credentials::PersonalToken("personal-token".to_string()),
        PoolConfig::default(),
        cache(),
        fast_retry(retries),
    )
    .unwrap()
}

fn docs_client(server: &MockServer) -> ApiClient {
    ApiClient::new(
        ApiFamily::Docs,
        server.uri(),
        Credentials::ApiKey("docs-key".to_string()),
        PoolConfig::default(),
        cache(),
        fast_retry(3),
    )
    .unwrap()
}

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.unwrap_or_default().len()
}

#[tokio::test]
async fn test_disabled_delete_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let client = mailbox_client(&server, 3);
    let err = client.delete("/conversations/1").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert!(err
        .context()
        .and_then(|c| c.suggestion.as_deref())
        .unwrap()
        .contains("HELPSCOUT_ALLOW_DELETES"));
    assert_eq!(request_count(&server).await, 0);
}

#[tokio::test]
async fn test_enabled_delete_invalidates_cached_reads() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/conversations/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1})))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/conversations/1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = mailbox_client(&server, 0).with_deletes(true);
    let options = CacheOptions::new();
    client.get::<Value>("/conversations/1", &json!({}), options).await.unwrap();
    client.get::<Value>("/conversations/1", &json!({}), options).await.unwrap();
    client.delete("/conversations/1").await.unwrap();
    client.get::<Value>("/conversations/1", &json!({}), options).await.unwrap();
}

#[tokio::test]
async fn test_rate_limit_waits_for_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mailboxes"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/mailboxes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_embedded": {"mailboxes": [{"id": 1, "name": "Support"}]},
            "page": {"number": 1, "totalPages": 1, "totalElements": 1}
        })))
        .mount(&server)
        .await;

    let client = ApiClient::new(
        ApiFamily::Mailbox,
        server.uri(),
        Credentials::PersonalToken("personal-token".to_string()),
        PoolConfig::default(),
        cache(),
        RetryPolicy::new(3, Duration::from_millis(10), Duration::from_secs(10)),
    )
    .unwrap();

    let started = Instant::now();
    let page: Page<Value> = client
        .get("/mailboxes", &json!({}), CacheOptions::new())
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_secs(1));
    assert_eq!(page.count, 1);
    assert_eq!(request_count(&server).await, 2);
}

#[tokio::test]
async fn test_bad_request_is_attempted_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/conversations"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad query"))
        .expect(1)
        .mount(&server)
        .await;

    let client = mailbox_client(&server, 3);
    let err = client
        .get::<Value>("/conversations", &json!({"query": "(("}), CacheOptions::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(err.context().unwrap().attempts, 1);
    assert!(err.to_string().contains("bad query"));
}

#[tokio::test]
async fn test_server_errors_are_retried_until_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mailboxes"))
        .respond_with(ResponseTemplate::new(503))
        .expect(4)
        .mount(&server)
        .await;

    let client = mailbox_client(&server, 3);
    let err = client
        .get::<Value>("/mailboxes", &json!({}), CacheOptions::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Upstream);
    assert!(err.is_retryable());
    let context = err.context().unwrap();
    assert_eq!(context.attempts, 4);
    assert_eq!(context.method, "GET");
    assert_eq!(context.endpoint, "/mailboxes");
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/conversations/404"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = mailbox_client(&server, 3);
    let err = client
        .get::<Value>("/conversations/404", &json!({}), CacheOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_timeouts_are_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mailboxes"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(Duration::from_millis(500)),
        )
        .expect(2)
        .mount(&server)
        .await;

    let client = ApiClient::new(
        ApiFamily::Mailbox,
        server.uri(),
        Credentials::PersonalToken("personal-token".to_string()),
        PoolConfig {
            timeout: Duration::from_millis(100),
            ..PoolConfig::default()
        },
        cache(),
        fast_retry(1),
    )
    .unwrap();

    let err = client
        .get::<Value>("/mailboxes", &json!({}), CacheOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Upstream);
    assert!(err.to_string().contains("timed out"));
    assert_eq!(err.context().unwrap().attempts, 2);
}

#[tokio::test]
async fn test_validation_errors_carry_field_detail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/conversations"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "message": "Bad request",
            "_embedded": {"errors": [{"path": "subject", "message": "may not be empty"}]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = mailbox_client(&server, 3);
    let err = client
        .create::<Value>("/conversations", &json!({"subject": ""}))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    let payload = err.to_payload(&[]);
    assert_eq!(payload["field_errors"][0]["path"], "subject");
    assert_eq!(payload["field_errors"][0]["message"], "may not be empty");
}

#[tokio::test]
async fn test_cached_reads_skip_the_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mailboxes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_embedded": {"mailboxes": []},
            "page": {"number": 1, "totalPages": 1, "totalElements": 0}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = mailbox_client(&server, 0);
    for _ in 0..3 {
        client
            .get::<Value>("/mailboxes", &json!({"page": 1}), CacheOptions::new())
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_bypass_and_zero_ttl_always_call_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(4)
        .mount(&server)
        .await;

    let client = mailbox_client(&server, 0);
    let bypass = CacheOptions::new().bypass();
    let no_store = CacheOptions::new().with_ttl(Duration::ZERO);
    for options in [bypass, bypass, no_store, no_store] {
        client.get::<Value>("/tags", &json!({}), options).await.unwrap();
    }
}

#[tokio::test]
async fn test_missing_credentials_send_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let client = ApiClient::new(
        ApiFamily::Mailbox,
        server.uri(),
        Credentials::None,
        PoolConfig::default(),
        cache(),
        fast_retry(3),
    )
    .unwrap();

    let err = client
        .get::<Value>("/mailboxes", &json!({}), CacheOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert_eq!(request_count(&server).await, 0);
}

#[tokio::test]
async fn test_requests_carry_auth_and_correlation_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/me"))
        .and(header("authorization", "Bearer personal-token"))
        .and(header_exists("x-correlation-id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 7})))
        .expect(1)
        .mount(&server)
        .await;

    let client = mailbox_client(&server, 0);
    let me: Value = client
        .get("/users/me", &json!({}), CacheOptions::new())
        .await
        .unwrap();
    assert_eq!(me["id"], 7);
}

#[tokio::test]
async fn test_docs_nested_listing_is_normalized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/collections"))
        .and(query_param("siteId", "s1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "collections": {
                "page": 1, "pages": 2, "count": 3,
                "items": [
                    {"id": "c1", "siteId": "s1", "name": "Billing", "slug": "billing"},
                    {"id": "c2", "siteId": "s1", "name": "Guides", "slug": "guides"}
                ]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = docs_client(&server);
    let page: Page<Collection> = client
        .get("/collections", &json!({"siteId": "s1"}), CacheOptions::new())
        .await
        .unwrap();

    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].name, "Billing");
    assert_eq!(page.pages, 2);
    assert!(page.has_more());
}

#[tokio::test]
async fn test_hal_listing_is_normalized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/conversations"))
        .and(query_param("status", "active"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_embedded": {"conversations": [
                {"id": 10, "number": 100, "subject": "Refund", "status": "active",
                 "tags": [{"id": 1, "tag": "billing"}]}
            ]},
            "page": {"size": 25, "totalElements": 1, "totalPages": 1, "number": 1}
        })))
        .mount(&server)
        .await;

    let client = mailbox_client(&server, 0);
    let page: Page<ConversationSummary> = client
        .get("/conversations", &json!({"status": "active"}), CacheOptions::new())
        .await
        .unwrap();

    assert_eq!(page.count, 1);
    assert_eq!(page.items[0].subject.as_deref(), Some("Refund"));
    assert_eq!(page.items[0].tags, vec!["billing"]);
}

#[tokio::test]
async fn test_empty_create_response_uses_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/conversations"))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("Resource-ID", "12345")
                .insert_header("Location", "https://api.helpscout.net/v2/conversations/12345"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = mailbox_client(&server, 0);
    let created: CreatedResource = client
        .create("/conversations", &json!({"subject": "Hello"}))
        .await
        .unwrap();

    assert_eq!(created.id.as_deref(), Some("12345"));
    assert!(created.location.unwrap().ends_with("/conversations/12345"));
}

#[tokio::test]
async fn test_create_invalidates_parent_listing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/conversations/5/threads"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"_embedded": {"threads": []}})))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/conversations/5/reply"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/conversations/5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 5})))
        .expect(2)
        .mount(&server)
        .await;

    let client = mailbox_client(&server, 0);
    let options = CacheOptions::new();
    client.get::<Value>("/conversations/5", &json!({}), options).await.unwrap();
    client.get::<Value>("/conversations/5/threads", &json!({}), options).await.unwrap();

    // Parent of /conversations/5/reply is /conversations/5; threads stay cached.
    client
        .create::<Value>("/conversations/5/reply", &json!({"text": "Hi"}))
        .await
        .unwrap();
    client.get::<Value>("/conversations/5", &json!({}), options).await.unwrap();
    client.get::<Value>("/conversations/5/threads", &json!({}), options).await.unwrap();
    client.invalidate("/conversations/5/threads");
    client.get::<Value>("/conversations/5/threads", &json!({}), options).await.unwrap();
}

#[tokio::test]
async fn test_oauth_token_is_refreshed_after_401() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok",
            "expires_in": 7200
        })))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/mailboxes"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/mailboxes"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"_embedded": {"mailboxes": []}})))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::new(
        ApiFamily::Mailbox,
        server.uri(),
        Credentials::ClientCredentials {
            token_url: format!("{}/oauth2/token", server.uri()),
            client_id: "app".to_string(),
            client_secret: "secret".to_string(),
        },
        PoolConfig::default(),
        cache(),
        fast_retry(0),
    )
    .unwrap();

    let page: Page<Value> = client
        .get("/mailboxes", &json!({}), CacheOptions::new())
        .await
        .unwrap();
    assert_eq!(page.count, 0);
}

#[tokio::test]
async fn test_personal_token_401_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let client = mailbox_client(&server, 3);
    let err = client
        .get::<Value>("/mailboxes", &json!({}), CacheOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
}

#[tokio::test]
async fn test_report_payload_is_unwrapped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/reports/conversations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "report": {"current": {"totalConversations": 12}}
        })))
        .mount(&server)
        .await;

    let client = mailbox_client(&server, 0);
    let report: Value = client
        .get_report("/reports/conversations", &json!({"start": "2024-01-01T00:00:00Z"}), CacheOptions::new())
        .await
        .unwrap();
    assert_eq!(report, json!({"current": {"totalConversations": 12}}));
}

#[tokio::test]
async fn test_unknown_report_endpoint_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/reports/nonsense"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Unknown URL"))
        .expect(1)
        .mount(&server)
        .await;

    let client = mailbox_client(&server, 3);
    let err = client
        .get_report::<Value>("/reports/nonsense", &json!({}), CacheOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("/reports/nonsense"));
}

#[tokio::test]
async fn test_error_bodies_never_echo_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid token personal-token"))
        .mount(&server)
        .await;

    let client = mailbox_client(&server, 0);
    let err = client
        .get::<Value>("/mailboxes", &json!({}), CacheOptions::new())
        .await
        .unwrap_err();
    assert!(!err.to_string().contains("personal-token"));
    assert!(err.to_string().contains("[REDACTED]"));
}

fn sites_page(page: u32, pages: u32, items: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "sites": {"page": page, "pages": pages, "count": 2, "items": items}
    }))
}

#[tokio::test]
async fn test_site_directory_merges_every_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sites"))
        .and(query_param("page", "1"))
        .respond_with(sites_page(
            1,
            2,
            json!([{"id": "s1", "title": "Acme Help Center", "subDomain": "acme"}]),
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sites"))
        .and(query_param("page", "2"))
        .respond_with(sites_page(
            2,
            2,
            json!([{"id": "s2", "title": "Globex Knowledge Base", "subDomain": "globex-kb"}]),
        ))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = EntityResolver::new(Arc::new(docs_client(&server)), Duration::from_secs(300));

    let found = resolver.resolve_site("Globex Knowledge Base", None).await.unwrap();
    assert_eq!(found.entity.id, "s2");
    assert_eq!(found.score, 100.0);

    let found = resolver.resolve_site("acme", None).await.unwrap();
    assert_eq!(found.entity.id, "s1");
}

#[tokio::test]
async fn test_stale_site_directory_reaches_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sites"))
        .respond_with(sites_page(
            1,
            1,
            json!([{"id": "s1", "title": "Acme Help Center", "subDomain": "acme"}]),
        ))
        .expect(3)
        .mount(&server)
        .await;

    // A zero freshness window makes every resolution reload the directory.
    let resolver = EntityResolver::new(Arc::new(docs_client(&server)), Duration::ZERO);
    for _ in 0..3 {
        let found = resolver.resolve_site("acme", None).await.unwrap();
        assert_eq!(found.entity.id, "s1");
    }
}

#[tokio::test]
async fn test_collection_directory_filters_by_site() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sites"))
        .respond_with(sites_page(
            1,
            1,
            json!([{"id": "s1", "title": "Acme Help Center", "subDomain": "acme"}]),
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/collections"))
        .and(query_param("siteId", "s1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "collections": {
                "page": 1, "pages": 1, "count": 2,
                "items": [
                    {"id": "c1", "siteId": "s1", "name": "Billing", "slug": "billing"},
                    {"id": "c2", "siteId": "s1", "name": "Getting Started", "slug": "getting-started"}
                ]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = EntityResolver::new(Arc::new(docs_client(&server)), Duration::from_secs(300));
    let found = resolver
        .resolve_collection("billings questions", Some("s1"), None)
        .await
        .unwrap();
    assert_eq!(found.entity.id, "c1");
    assert_eq!(found.entity.site_id, "s1");
}

#[tokio::test]
async fn test_directory_paging_is_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sites"))
        .respond_with(sites_page(
            1,
            1000,
            json!([{"id": "s1", "title": "Acme Help Center", "subDomain": "acme"}]),
        ))
        .expect(50)
        .mount(&server)
        .await;

    let resolver = EntityResolver::new(Arc::new(docs_client(&server)), Duration::from_secs(300));
    let found = resolver.resolve_site("Acme Help Center", None).await.unwrap();
    assert_eq!(found.entity.id, "s1");
}
