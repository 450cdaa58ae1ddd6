mod common;

use common::{closed_port, connector, BlackHoleServer, FakeLdapServer, BASE_DN, VALID_PASSWORD};
use indexgate::ldap::{AuthenticationOutcome, DirectoryClient, DirectoryError, LdapClient};
use std::io::Write;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

fn user(uid: &str) -> String {
    format!("uid={},ou=People,{}", uid, BASE_DN)
}

#[tokio::test]
async fn test_bind_success_then_invalid_credentials() {
    let server = FakeLdapServer::start(&[]).await;
    let client = LdapClient::new(connector(server.port));

    let outcome = client.bind(&user("cartman"), VALID_PASSWORD).await;
    assert_eq!(outcome, AuthenticationOutcome::Success);

    let outcome = client.bind(&user("cartman"), "wrong").await;
    assert_eq!(outcome, AuthenticationOutcome::InvalidCredentials);

    assert_eq!(server.binds.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unreachable_directory_is_connection_failure() {
    let port = closed_port().await;
    let client = LdapClient::new(connector(port));

    let started = Instant::now();
    let outcome = client.bind(&user("cartman"), VALID_PASSWORD).await;

    assert_eq!(outcome, AuthenticationOutcome::ConnectionFailure);
    // Gave up within the request budget rather than hanging.
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_silent_directory_is_timeout() {
    let server = BlackHoleServer::start().await;
    let mut config = connector(server.port);
    config.request_timeout_ms = 300;
    let client = LdapClient::new(config);

    let started = Instant::now();
    let outcome = client.bind(&user("cartman"), VALID_PASSWORD).await;

    assert_eq!(outcome, AuthenticationOutcome::Timeout);
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_group_membership_search() {
    let server = FakeLdapServer::start(&["group1"]).await;
    let client = LdapClient::new(connector(server.port));

    assert!(client.check_membership(&user("cartman"), "group1").await.unwrap());
    assert!(!client.check_membership(&user("cartman"), "group2").await.unwrap());
}

#[tokio::test]
async fn test_membership_uses_service_account_when_configured() {
    let server = FakeLdapServer::start(&["group1"]).await;
    let mut config = connector(server.port);
    config.bind_dn = Some(format!("cn=admin,{}", BASE_DN));
    config.bind_password = Some("not-the-password".to_string());
    let client = LdapClient::new(config);

    let err = client.check_membership(&user("cartman"), "group1").await.unwrap_err();
    assert_eq!(err, DirectoryError::BindFailed { code: 49 });
    assert_eq!(server.binds.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_membership_with_unknown_search_base_reports_result_code() {
    let server = FakeLdapServer::start(&["group1"]).await;
    let mut config = connector(server.port);
    config.search_groups_base_dn = format!("ou=Grops,{}", BASE_DN);
    let client = LdapClient::new(config);

    let err = client.check_membership(&user("cartman"), "group1").await.unwrap_err();
    assert!(matches!(err, DirectoryError::OperationFailed { code: 32, ref operation, .. } if operation == "search"));
    assert!(err.to_string().contains("result code 32"));
}

#[tokio::test]
async fn test_membership_against_unreachable_directory() {
    let client = LdapClient::new(connector(closed_port().await));
    let err = client.check_membership(&user("cartman"), "group1").await.unwrap_err();
    assert!(matches!(err, DirectoryError::ConnectionFailure { .. }));
    assert_eq!(AuthenticationOutcome::from(&err), AuthenticationOutcome::ConnectionFailure);
}

#[tokio::test]
async fn test_wait_until_ready() {
    let server = FakeLdapServer::start(&[]).await;
    let client = LdapClient::new(connector(server.port));
    client.wait_until_ready(Duration::from_secs(2)).await.unwrap();
    assert_eq!(client.probe().await, AuthenticationOutcome::Success);

    let down = LdapClient::new(connector(closed_port().await));
    let err = down.wait_until_ready(Duration::from_millis(300)).await.unwrap_err();
    assert!(matches!(err, DirectoryError::ConnectionFailure { .. }));
    assert_eq!(down.probe().await, AuthenticationOutcome::ConnectionFailure);
}

#[tokio::test]
async fn test_abandoned_bind_leaves_client_usable() {
    let server = BlackHoleServer::start().await;
    let mut config = connector(server.port);
    config.request_timeout_ms = 10_000;
    let client = LdapClient::new(config);

    let abandoned = tokio::time::timeout(
        Duration::from_millis(100),
        client.bind(&user("cartman"), VALID_PASSWORD),
    )
    .await;
    assert!(abandoned.is_err());

    let live = FakeLdapServer::start(&[]).await;
    let other = LdapClient::new(connector(live.port));
    assert_eq!(
        other.bind(&user("cartman"), VALID_PASSWORD).await,
        AuthenticationOutcome::Success
    );
}

#[tokio::test]
async fn test_import_ldif() {
    let server = FakeLdapServer::start(&[]).await;
    let client = LdapClient::new(connector(server.port));

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "version: 1\n\
         \n\
         dn: ou=People,dc=example,dc=com\n\
         objectClass: organizationalUnit\n\
         ou: People\n\
         \n\
         # the first user\n\
         dn: uid=cartman,ou=People,dc=example,dc=com\n\
         objectClass: inetOrgPerson\n\
         uid: cartman\n\
         cn: Eric Cartman\n\
         sn: Cartman\n\
         userPassword:: cGFzc3dvcmQ=\n"
    )
    .unwrap();

    let added = client
        .import_ldif(&format!("cn=admin,{}", BASE_DN), VALID_PASSWORD, file.path())
        .await
        .unwrap();
    assert_eq!(added, 2);
}
