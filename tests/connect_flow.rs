//! Integration tests for connection bootstrap: the unauthenticated realm
//! probe against a mock site.

use spo_ops::connect::{discover_realm, ConnectionKind, ConnectionProfile};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REALM: &str = "6c32b950-5a56-4b28-9c5d-0d0a2c40d112";

#[tokio::test]
async fn resolve_reads_the_realm_from_the_bearer_challenge() {
    let server = MockServer::start().await;

    let challenge = format!(
        "Bearer realm=\"{REALM}\",client_id=\"00000003-0000-0ff1-ce00-000000000000\""
    );
    Mock::given(method("GET"))
        .and(path("/_vti_bin/client.svc"))
        .respond_with(
            ResponseTemplate::new(401)
                .insert_header("WWW-Authenticate", challenge.as_str()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let profile = ConnectionProfile::resolve(&server.uri()).await.unwrap();

    // A loopback host is not a recognized hosted-tenant domain.
    assert_eq!(profile.kind, ConnectionKind::OnPremises);
    assert_eq!(profile.realm.as_deref(), Some(REALM));

    // The probe advertises an empty bearer token to trigger the challenge.
    let requests = server.received_requests().await.unwrap();
    let auth = requests[0].headers.get("authorization").unwrap().to_str().unwrap();
    assert_eq!(auth, "Bearer ");
}

#[tokio::test]
async fn site_without_challenge_resolves_without_a_realm() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/_vti_bin/client.svc"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let profile = ConnectionProfile::resolve(&server.uri()).await.unwrap();
    assert_eq!(profile.realm, None);
}

#[tokio::test]
async fn challenge_without_realm_marker_yields_none() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/_vti_bin/client.svc"))
        .respond_with(
            ResponseTemplate::new(401).insert_header("WWW-Authenticate", "NTLM"),
        )
        .mount(&server)
        .await;

    let site = url::Url::parse(&server.uri()).unwrap();
    let realm = discover_realm(&reqwest::Client::new(), &site).await.unwrap();
    assert_eq!(realm, None);
}
