//! Token renewal behaviour: single-flight, replay-once and session teardown.

use std::time::Duration;

use futures::future::join_all;
use leadscore_client::{
    ApiClient, ApiError, ClientConfig, Credential, CredentialStore, RefreshError, RefreshPhase,
    SessionEvent,
};
use serde_json::json;
use tokio::sync::broadcast::{self, error::TryRecvError};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_with(base_url: &str, refresh_token: Option<&str>) -> ApiClient {
    client_with_config(ClientConfig::new(base_url), refresh_token)
}

fn client_with_config(config: ClientConfig, refresh_token: Option<&str>) -> ApiClient {
    let store = CredentialStore::in_memory();
    store.set(Credential::new("a1", refresh_token.map(str::to_owned)).expect("valid credential"));
    ApiClient::new(config, store).expect("client construction should not fail")
}

fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    loop {
        match events.try_recv() {
            Ok(event) => seen.push(event),
            Err(TryRecvError::Empty | TryRecvError::Closed) => return seen,
            Err(TryRecvError::Lagged(_)) => {}
        }
    }
}

async fn mount_offers(server: &MockServer, token: &str, status: u16, expected: u64) {
    Mock::given(method("GET"))
        .and(path("/intent/offer/"))
        .and(header("Authorization", format!("Bearer {token}").as_str()))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!([])))
        .expect(expected)
        .mount(server)
        .await;
}

async fn mount_refresh(server: &MockServer, delay: Duration, expected: u64) {
    Mock::given(method("POST"))
        .and(path("/auth/token/refresh/"))
        .and(body_json(json!({"refresh": "r1"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access": "a2"}))
                .set_delay(delay),
        )
        .expect(expected)
        .mount(server)
        .await;
}

#[tokio::test]
async fn concurrent_rejections_share_one_renewal() {
    let server = MockServer::start().await;
    mount_offers(&server, "a1", 401, 5).await;
    mount_offers(&server, "a2", 200, 5).await;
    mount_refresh(&server, Duration::from_millis(200), 1).await;

    let client = client_with(&server.uri(), Some("r1"));
    let mut events = client.subscribe();

    let outcomes = join_all((0..5).map(|_| client.list_offers())).await;

    for outcome in outcomes {
        assert!(outcome.is_ok(), "every request should be replayed: {outcome:?}");
    }
    assert_eq!(client.credentials().access_token().as_deref(), Some("a2"));
    assert!(
        client.credentials().has_refresh_token(),
        "refresh token is kept when the response omits it"
    );
    assert_eq!(client.refresh_coordinator().phase(), RefreshPhase::Idle);
    assert_eq!(drain(&mut events), vec![SessionEvent::Refreshed]);

    server.verify().await;
}

#[tokio::test]
async fn concurrent_ensure_fresh_calls_share_one_renewal() {
    let server = MockServer::start().await;
    mount_refresh(&server, Duration::from_millis(100), 1).await;

    let client = client_with(&server.uri(), Some("r1"));
    let coordinator = client.refresh_coordinator();

    let outcomes = join_all((0..4).map(|_| coordinator.ensure_fresh())).await;

    assert!(outcomes.iter().all(Result::is_ok));
    assert_eq!(client.credentials().access_token().as_deref(), Some("a2"));
}

#[tokio::test]
async fn replay_rejected_again_expires_session_without_second_retry() {
    let server = MockServer::start().await;
    mount_offers(&server, "a1", 401, 1).await;
    mount_offers(&server, "a2", 401, 1).await;
    mount_refresh(&server, Duration::ZERO, 1).await;

    let client = client_with(&server.uri(), Some("r1"));
    let mut events = client.subscribe();

    let err = client.list_offers().await.unwrap_err();

    assert!(matches!(err, ApiError::AuthExpired), "got: {err:?}");
    assert!(!client.is_logged_in());
    assert_eq!(
        drain(&mut events),
        vec![SessionEvent::Refreshed, SessionEvent::Expired]
    );
}

#[tokio::test]
async fn replay_failing_with_server_error_surfaces_it_once() {
    let server = MockServer::start().await;
    mount_offers(&server, "a1", 401, 1).await;
    mount_offers(&server, "a2", 500, 1).await;
    mount_refresh(&server, Duration::ZERO, 1).await;

    let client = client_with(&server.uri(), Some("r1"));
    let err = client.list_offers().await.unwrap_err();

    assert_eq!(err.status(), Some(500));
    // The renewed session stays valid; only the request failed.
    assert_eq!(client.credentials().access_token().as_deref(), Some("a2"));
}

#[tokio::test]
async fn missing_refresh_token_expires_once_for_concurrent_requests() {
    let server = MockServer::start().await;
    mount_offers(&server, "a1", 401, 3).await;
    mount_refresh(&server, Duration::ZERO, 0).await;

    let client = client_with(&server.uri(), None);
    let mut events = client.subscribe();

    let outcomes = join_all((0..3).map(|_| client.list_offers())).await;

    for outcome in outcomes {
        assert!(matches!(outcome, Err(ApiError::AuthExpired)), "got: {outcome:?}");
    }
    assert!(client.credentials().get().is_none());
    assert_eq!(drain(&mut events), vec![SessionEvent::Expired]);
}

#[tokio::test]
async fn rejected_renewal_clears_persisted_session() {
    let server = MockServer::start().await;
    mount_offers(&server, "a1", 401, 1).await;
    Mock::given(method("POST"))
        .and(path("/auth/token/refresh/"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"detail": "Token is blacklisted"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("credentials.json");
    let store = CredentialStore::open(&file);
    store.set(Credential::new("a1", Some("r1".to_owned())).unwrap());
    let client = ApiClient::new(ClientConfig::new(server.uri()), store).unwrap();
    let mut events = client.subscribe();

    let err = client.list_offers().await.unwrap_err();

    assert!(matches!(err, ApiError::AuthExpired));
    assert!(!file.exists(), "credential file should be removed");
    assert_eq!(client.refresh_coordinator().phase(), RefreshPhase::Failed);
    assert_eq!(drain(&mut events), vec![SessionEvent::Expired]);

    let outcome = client.refresh_coordinator().ensure_fresh().await;
    assert_eq!(outcome, Err(RefreshError::MissingRefreshToken));
}

#[tokio::test]
async fn rotated_refresh_token_is_used_next_time() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/token/refresh/"))
        .and(body_json(json!({"refresh": "r1"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"access": "a2", "refresh": "r2"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/token/refresh/"))
        .and(body_json(json!({"refresh": "r2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "a3"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_with(&server.uri(), Some("r1"));
    let coordinator = client.refresh_coordinator();

    coordinator.ensure_fresh().await.expect("first renewal");
    coordinator.ensure_fresh().await.expect("second renewal");

    assert_eq!(client.credentials().access_token().as_deref(), Some("a3"));
}

#[tokio::test]
async fn renewal_response_without_access_token_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/token/refresh/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"refresh": "r2"})))
        .mount(&server)
        .await;

    let client = client_with(&server.uri(), Some("r1"));
    let outcome = client.refresh_coordinator().ensure_fresh().await;

    assert_eq!(outcome, Err(RefreshError::MissingAccessToken));
    assert!(!client.is_logged_in());
}

#[tokio::test]
async fn scheduled_and_reactive_renewal_in_same_tick_share_one_call() {
    let server = MockServer::start().await;
    mount_offers(&server, "a1", 401, 1).await;
    mount_offers(&server, "a2", 200, 1).await;
    mount_refresh(&server, Duration::from_millis(200), 1).await;

    let mut config = ClientConfig::new(server.uri());
    config.refresh_interval = Duration::from_millis(300);
    let client = client_with_config(config, Some("r1"));

    assert!(client.restore_session());
    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(
        client.refresh_coordinator().phase(),
        RefreshPhase::InFlight,
        "the scheduled renewal should be running"
    );

    client
        .list_offers()
        .await
        .expect("request should join the scheduled renewal and replay");
    client.stop_refresh_scheduler();

    assert_eq!(client.credentials().access_token().as_deref(), Some("a2"));
    server.verify().await;
}

#[tokio::test]
async fn reactive_renewal_pushes_back_the_next_scheduled_tick() {
    let server = MockServer::start().await;
    mount_offers(&server, "a1", 401, 1).await;
    mount_offers(&server, "a2", 200, 1).await;
    mount_refresh(&server, Duration::ZERO, 1).await;

    let mut config = ClientConfig::new(server.uri());
    config.refresh_interval = Duration::from_millis(400);
    let client = client_with_config(config, Some("r1"));

    assert!(client.restore_session());
    tokio::time::sleep(Duration::from_millis(300)).await;
    client
        .list_offers()
        .await
        .expect("request should renew and replay");

    // Past the original first tick, well inside one period of the renewal.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let renewals = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.url.path() == "/auth/token/refresh/")
        .count();
    assert_eq!(renewals, 1, "scheduled tick should have been pushed back");
    assert!(client.is_refresh_scheduled());

    client.stop_refresh_scheduler();
    server.verify().await;
}

#[tokio::test]
async fn scheduler_renews_periodically_until_logout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/token/refresh/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "a2"})))
        .mount(&server)
        .await;

    let mut config = ClientConfig::new(server.uri());
    config.refresh_interval = Duration::from_millis(50);
    let client = client_with_config(config, Some("r1"));

    assert!(client.restore_session());
    tokio::time::sleep(Duration::from_millis(300)).await;

    let renewals = server.received_requests().await.unwrap().len();
    assert!(renewals >= 2, "expected periodic renewals, saw {renewals}");
    assert_eq!(client.credentials().access_token().as_deref(), Some("a2"));

    client.logout();
    assert!(!client.is_refresh_scheduled());
}

#[tokio::test]
async fn scheduler_stops_after_failed_renewal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/token/refresh/"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"detail": "Token is invalid"})))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = ClientConfig::new(server.uri());
    config.refresh_interval = Duration::from_millis(50);
    let client = client_with_config(config, Some("r1"));
    let mut events = client.subscribe();

    assert!(client.restore_session());
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(!client.is_refresh_scheduled());
    assert!(!client.is_logged_in());
    assert_eq!(
        drain(&mut events),
        vec![SessionEvent::Authenticated, SessionEvent::Expired]
    );
}
