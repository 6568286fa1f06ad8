//! HTTP tests for the GHO client
//!
//! Covers the OData paging parameters, status and decode failures, mistyped
//! records inside an otherwise good page, and the full page source running
//! against a mock server.

use futures::TryStreamExt;
use gho_ingest::config::SourceConfig;
use gho_ingest::{
    transform_value, FetchError, GhoClient, PageFetcher, PageSource, Transformed,
};
use std::net::TcpListener;
use std::time::Duration;
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

fn source_config(server: &MockServer, page_size: u64) -> SourceConfig {
    SourceConfig {
        base_url: format!("{}/api", server.uri()),
        indicator: "WHOSIS_000001".to_string(),
        page_size,
        page_delay: Duration::ZERO,
        request_timeout: Duration::from_secs(5),
    }
}

fn record(country: &str, year: i64, value: f64) -> serde_json::Value {
    serde_json::json!({
        "Id": 1,
        "IndicatorCode": "WHOSIS_000001",
        "SpatialDimType": "COUNTRY",
        "SpatialDim": country,
        "ParentLocation": "Africa",
        "TimeDim": year,
        "Dim1": "SEX_BTSX",
        "NumericValue": value,
        "Low": null,
        "High": null,
        "Date": "2023-01-15T00:00:00+00:00"
    })
}

fn page(records: Vec<serde_json::Value>) -> serde_json::Value {
    serde_json::json!({
        "@odata.context": "https://ghoapi.azureedge.net/api/$metadata#WHOSIS_000001",
        "value": records
    })
}

#[tokio::test]
async fn test_fetch_page_sends_paging_parameters() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/WHOSIS_000001"))
        .and(query_param("$top", "2"))
        .and(query_param("$skip", "40"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![
            record("KEN", 2019, 66.1),
            record("UGA", 2019, 63.4),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let client = GhoClient::new(&source_config(&server, 2)).unwrap();
    let records = client.fetch_page(40, 2).await.unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["SpatialDim"], "KEN");
    assert_eq!(records[1]["NumericValue"], serde_json::json!(63.4));
}

#[tokio::test]
async fn test_non_success_status_carries_offset() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/WHOSIS_000001"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = GhoClient::new(&source_config(&server, 10)).unwrap();
    let err = client.fetch_page(20, 10).await.unwrap_err();

    match err {
        FetchError::Status { offset, status } => {
            assert_eq!(offset, 20);
            assert_eq!(status.as_u16(), 503);
        },
        other => panic!("expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_undecodable_body_is_decode_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/WHOSIS_000001"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let client = GhoClient::new(&source_config(&server, 10)).unwrap();
    let err = client.fetch_page(0, 10).await.unwrap_err();

    assert!(matches!(err, FetchError::Decode { offset: 0, .. }));
}

#[tokio::test]
async fn test_missing_value_array_is_empty_page() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/WHOSIS_000001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    let client = GhoClient::new(&source_config(&server, 10)).unwrap();

    assert!(client.fetch_page(0, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unreachable_server_is_transport_error() {
    // Nothing listens on a port whose listener has been dropped
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let config = SourceConfig {
        base_url: format!("http://127.0.0.1:{}/api", port),
        indicator: "WHOSIS_000001".to_string(),
        page_size: 10,
        page_delay: Duration::ZERO,
        request_timeout: Duration::from_secs(5),
    };

    let client = GhoClient::new(&config).unwrap();
    let err = client.fetch_page(30, 10).await.unwrap_err();

    assert!(matches!(err, FetchError::Transport { offset: 30, .. }));
}

#[tokio::test]
async fn test_page_source_walks_all_pages() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/WHOSIS_000001"))
        .and(query_param("$skip", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![
            record("KEN", 2019, 66.1),
            record("UGA", 2019, 63.4),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/WHOSIS_000001"))
        .and(query_param("$skip", "2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(page(vec![record("TZA", 2019, 65.0)])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = source_config(&server, 2);
    let source = PageSource::new(GhoClient::new(&config).unwrap(), &config);

    let records: Vec<_> = source.produce(0).try_collect().await.unwrap();

    let countries: Vec<_> = records
        .iter()
        .map(|r| r["SpatialDim"].as_str().unwrap())
        .collect();
    assert_eq!(countries, vec!["KEN", "UGA", "TZA"]);
}

#[tokio::test]
async fn test_mistyped_record_does_not_fail_page() {
    let server = MockServer::start().await;

    let mut mistyped = record("UGA", 2019, 63.4);
    mistyped["SpatialDim"] = serde_json::json!(404);

    Mock::given(method("GET"))
        .and(path("/api/WHOSIS_000001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![
            record("KEN", 2019, 66.1),
            mistyped,
            serde_json::Value::Null,
        ])))
        .mount(&server)
        .await;

    let client = GhoClient::new(&source_config(&server, 3)).unwrap();
    let records = client.fetch_page(0, 3).await.unwrap();

    assert_eq!(records.len(), 3);
    assert!(matches!(transform_value(&records[0]), Transformed::Valid(_)));
    for bad in &records[1..] {
        match transform_value(bad) {
            Transformed::Invalid(err) => assert_eq!(err.field, "record"),
            Transformed::Valid(obs) => panic!("expected invalid, got {:?}", obs),
        }
    }
}
