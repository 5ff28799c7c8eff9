//! End-to-end scan scenarios against mocked HTTP targets.
//!
//! Each test stands up a local mock server (`mockito` for everything
//! except the timing scenario, which needs a real delay) and drives
//! the whole pipeline through `Scanner::run` exactly as the CLI does,
//! asserting on the aggregated `ScanResult` rather than on any single
//! component.

use std::sync::Arc;
use std::time::Duration;

use mockito::Matcher;
use tokio_util::sync::CancellationToken;

use sqleech::core::config::{ScanConfig, TechniqueKind, TimingConfig};
use sqleech::model::ScanTarget;
use sqleech::scanner::Scanner;
use sqleech::transport::ReqwestTransport;

fn fast_config() -> ScanConfig {
    ScanConfig {
        threads: 4,
        ..ScanConfig::default()
    }
}

fn transport() -> Arc<ReqwestTransport> {
    Arc::new(ReqwestTransport::new(10, false, None).expect("client builds"))
}

#[tokio::test]
async fn error_based_detects_mysql_extractvalue_injection() {
    let mut server = mockito::Server::new_async().await;

    let _catch_all = server
        .mock("GET", "/vuln/error-mysql")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("<html>Item 1</html>")
        .create_async()
        .await;

    let _quote_error = server
        .mock("GET", "/vuln/error-mysql")
        .match_query(Matcher::Regex(".*id=1%27.*".to_string()))
        .with_status(500)
        .with_body(
            "You have an error in your SQL syntax; check the manual that corresponds \
             to your MySQL server version for the right syntax to use near '''1''' at line 1",
        )
        .create_async()
        .await;

    let _extractvalue_error = server
        .mock("GET", "/vuln/error-mysql")
        .match_query(Matcher::Regex(".*EXTRACTVALUE.*".to_string()))
        .with_status(500)
        .with_body("XPATH syntax error: '~8.0.32~'")
        .create_async()
        .await;

    let target = ScanTarget::new(format!("{}/vuln/error-mysql?id=1", server.url()), "GET");
    let scanner = Scanner::new(transport(), fast_config(), CancellationToken::new());
    let result = scanner.run(target, None).await.expect("scan succeeds");

    let hit = result
        .vulnerabilities
        .iter()
        .find(|v| v.injectable && v.technique == "error-based")
        .expect("an error-based vulnerability was found");
    assert_eq!(hit.parameter.name, "id");
    let dbms = hit.dbms.expect("dbms identified");
    assert_eq!(dbms.canonical_name(), "MySQL");
}

#[tokio::test]
async fn error_based_detects_postgresql_cast_injection() {
    let mut server = mockito::Server::new_async().await;

    let _catch_all = server
        .mock("GET", "/vuln/error-postgres")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("<html>Item 1</html>")
        .create_async()
        .await;

    let _quote_error = server
        .mock("GET", "/vuln/error-postgres")
        .match_query(Matcher::Regex(".*id=1%27.*".to_string()))
        .with_status(500)
        .with_body("ERROR:  syntax error at or near \"'\"")
        .create_async()
        .await;

    let _cast_error = server
        .mock("GET", "/vuln/error-postgres")
        .match_query(Matcher::Regex(".*CAST.*".to_string()))
        .with_status(500)
        .with_body("invalid input syntax for type integer: \"PostgreSQL 15.3\"")
        .create_async()
        .await;

    let target = ScanTarget::new(format!("{}/vuln/error-postgres?id=1", server.url()), "GET");
    let scanner = Scanner::new(transport(), fast_config(), CancellationToken::new());
    let result = scanner.run(target, None).await.expect("scan succeeds");

    let hit = result
        .vulnerabilities
        .iter()
        .find(|v| v.injectable && v.technique == "error-based")
        .expect("an error-based vulnerability was found");
    assert_eq!(hit.parameter.name, "id");
    assert_eq!(hit.dbms.expect("dbms identified").canonical_name(), "PostgreSQL");
}

#[tokio::test]
async fn boolean_blind_detects_numeric_injection() {
    let mut server = mockito::Server::new_async().await;

    let _catch_all = server
        .mock("GET", "/vuln/boolean")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("Welcome!")
        .create_async()
        .await;

    let _false_branch = server
        .mock("GET", "/vuln/boolean")
        .match_query(Matcher::Regex(".*1%3D2.*".to_string()))
        .with_status(200)
        .with_body("No items found.")
        .create_async()
        .await;

    let target = ScanTarget::new(format!("{}/vuln/boolean?id=1", server.url()), "GET");
    let scanner = Scanner::new(transport(), fast_config(), CancellationToken::new());
    let result = scanner.run(target, None).await.expect("scan succeeds");

    let hit = result
        .vulnerabilities
        .iter()
        .find(|v| v.injectable && v.technique == "boolean-blind")
        .expect("a boolean-blind vulnerability was found");
    assert_eq!(hit.parameter.name, "id");
}

#[tokio::test]
async fn time_based_detects_conditional_sleep() {
    let (base_url, server_handle) = start_conditional_sleep_server().await;

    let mut config = fast_config();
    config.force_test = true;
    config.techniques = Some(vec![TechniqueKind::TimeBased]);
    config.timing = TimingConfig {
        sleep_seconds: 1,
        tolerance: 0.3,
    };

    let target = ScanTarget::new(format!("{}/vuln/time-mysql?id=1", base_url), "GET");
    let scanner = Scanner::new(transport(), config, CancellationToken::new());
    let result = scanner.run(target, None).await.expect("scan succeeds");

    let hit = result
        .vulnerabilities
        .iter()
        .find(|v| v.injectable && v.technique == "time-based")
        .expect("a time-based vulnerability was found");
    assert_eq!(hit.parameter.name, "id");

    server_handle.abort();
}

#[tokio::test]
async fn safe_endpoint_yields_no_vulnerabilities() {
    let mut server = mockito::Server::new_async().await;

    let _catch_all = server
        .mock("GET", "/vuln/safe")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("Item: Widget")
        .create_async()
        .await;

    let target = ScanTarget::new(format!("{}/vuln/safe?id=1", server.url()), "GET");
    let scanner = Scanner::new(transport(), fast_config(), CancellationToken::new());
    let result = scanner.run(target, None).await.expect("scan succeeds");

    let injectable_count = result.vulnerabilities.iter().filter(|v| v.injectable).count();
    assert_eq!(injectable_count, 0);
}

#[tokio::test]
async fn only_the_injectable_parameter_is_flagged_among_several() {
    let mut server = mockito::Server::new_async().await;

    let _catch_all = server
        .mock("GET", "/vuln/multi")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("<html>Item 1</html>")
        .create_async()
        .await;

    let _quote_error = server
        .mock("GET", "/vuln/multi")
        .match_query(Matcher::Regex(".*id=1%27.*".to_string()))
        .with_status(500)
        .with_body("You have an error in your SQL syntax near '1''")
        .create_async()
        .await;

    let _extractvalue_error = server
        .mock("GET", "/vuln/multi")
        .match_query(Matcher::Regex(".*EXTRACTVALUE.*".to_string()))
        .with_status(500)
        .with_body("XPATH syntax error: '~8.0.32~'")
        .create_async()
        .await;

    let target = ScanTarget::new(format!("{}/vuln/multi?id=1&name=test", server.url()), "GET");
    let scanner = Scanner::new(transport(), fast_config(), CancellationToken::new());
    let result = scanner.run(target, None).await.expect("scan succeeds");

    let injectable: Vec<_> = result.vulnerabilities.iter().filter(|v| v.injectable).collect();
    assert_eq!(injectable.len(), 1);
    assert_eq!(injectable[0].parameter.name, "id");
}

#[tokio::test]
async fn cancellation_aborts_the_scan_quickly() {
    let mut server = mockito::Server::new_async().await;
    let _catch_all = server
        .mock("GET", "/vuln/whatever")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("ok")
        .create_async()
        .await;

    let cancellation = CancellationToken::new();
    cancellation.cancel();

    let target = ScanTarget::new(format!("{}/vuln/whatever?id=1", server.url()), "GET");
    let scanner = Scanner::new(transport(), fast_config(), cancellation);

    let started = std::time::Instant::now();
    let outcome = scanner.run(target, None).await;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(outcome.is_err());
}

#[tokio::test]
async fn post_body_parameter_is_flagged_via_boolean_blind() {
    let mut server = mockito::Server::new_async().await;

    let _catch_all = server
        .mock("POST", "/vuln/post")
        .match_body(Matcher::Any)
        .with_status(200)
        .with_body("Login form")
        .create_async()
        .await;

    let _heuristic_false = server
        .mock("POST", "/vuln/post")
        .match_body(Matcher::Regex(
            "username=admin%27%20AND%20%271%27%3D%272".to_string(),
        ))
        .with_status(200)
        .with_body("Login form\nNo results matched")
        .create_async()
        .await;

    let _technique_false = server
        .mock("POST", "/vuln/post")
        .match_body(Matcher::Regex("username=admin%27OR%201%3D2".to_string()))
        .with_status(200)
        .with_body("Login form\nNo results matched")
        .create_async()
        .await;

    let mut config = fast_config();
    config.techniques = Some(vec![TechniqueKind::BooleanBlind]);

    let target = ScanTarget::new(format!("{}/vuln/post", server.url()), "POST")
        .with_body("username=admin&password=secret", "application/x-www-form-urlencoded");
    let scanner = Scanner::new(transport(), config, CancellationToken::new());
    let result = scanner.run(target, None).await.expect("scan succeeds");

    let injectable: Vec<_> = result.vulnerabilities.iter().filter(|v| v.injectable).collect();
    assert_eq!(injectable.len(), 1);
    assert_eq!(injectable[0].parameter.name, "username");
    assert_eq!(injectable[0].parameter.location.as_str(), "body");
    assert_eq!(injectable[0].technique, "boolean-blind");
}

/// A minimal raw-socket HTTP/1.1 server that sleeps for one second only
/// when the decoded request target both asserts a true condition
/// (`1=1`) and carries a `SLEEP(` call, emulating a database that
/// actually honours a time-based payload. `mockito` has no supported
/// way to make a response latency conditional on request content, so
/// the timing scenario needs its own tiny listener.
async fn start_conditional_sleep_server() -> (String, tokio::task::JoinHandle<()>) {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind local listener");
    let addr = listener.local_addr().expect("listener has a local address");

    let handle = tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => break,
            };

            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                let mut filled = 0;
                loop {
                    match socket.read(&mut buf[filled..]).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => {
                            filled += n;
                            let seen = String::from_utf8_lossy(&buf[..filled]);
                            if seen.contains("\r\n\r\n") || filled == buf.len() {
                                break;
                            }
                        }
                    }
                }

                let request = String::from_utf8_lossy(&buf[..filled]);
                let target = request
                    .lines()
                    .next()
                    .and_then(|line| line.split_whitespace().nth(1))
                    .unwrap_or("/")
                    .to_string();
                let decoded = urlencoding::decode(&target).map(|s| s.into_owned()).unwrap_or_default();

                if decoded.contains("1=1") && decoded.contains("SLEEP(") {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }

                let body = "OK";
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (format!("http://{}", addr), handle)
}
