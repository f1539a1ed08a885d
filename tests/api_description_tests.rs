mod mocks;

use apiconform::api_description::{load, ApiDescriptionError};
use apiconform::{HttpMethod, ReqwestTransport, SchemaValidator};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_load_from_yaml_file() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("openapi.yaml");
    std::fs::write(&file, mocks::API_DESCRIPTION).unwrap();
    let transport = ReqwestTransport::new().unwrap();

    let document = load(&file.to_string_lossy(), &transport).await.unwrap();

    assert_eq!(document.version(), "3.0.2");
    assert_eq!(document.path_count(), 6);
    let route = document.find_route(HttpMethod::GET, "/jobs/j-9").unwrap();
    assert_eq!(route.template, "/jobs/{job_id}");
    assert_eq!(route.path_params.get("job_id").map(String::as_str), Some("j-9"));
}

#[tokio::test]
async fn test_load_from_url() {
    let server = MockServer::start().await;
    let description: serde_json::Value = serde_yaml::from_str(mocks::API_DESCRIPTION).unwrap();
    Mock::given(method("GET"))
        .and(path("/openapi.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(description))
        .mount(&server)
        .await;
    let transport = ReqwestTransport::new().unwrap();

    let document = load(&format!("{}/openapi.json", server.uri()), &transport).await.unwrap();

    assert_eq!(document.path_count(), 6);
    assert!(document.find_route(HttpMethod::POST, "/jobs").is_ok());
    assert!(document.find_route(HttpMethod::DELETE, "/jobs").is_err());
}

#[tokio::test]
async fn test_unreachable_sources_fail() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let transport = ReqwestTransport::new().unwrap();

    let not_found = load("definitely/not/here.json", &transport).await;
    assert!(matches!(not_found, Err(ApiDescriptionError::NotFound(_))));

    let fetch = load(&format!("{}/openapi.json", server.uri()), &transport).await;
    assert!(matches!(fetch, Err(ApiDescriptionError::Fetch(_))));
}

#[tokio::test]
async fn test_unparsable_file_fails() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("openapi.json");
    std::fs::write(&file, "{ not: [valid").unwrap();
    let transport = ReqwestTransport::new().unwrap();

    let result = load(&file.to_string_lossy(), &transport).await;

    assert!(matches!(result, Err(ApiDescriptionError::Parse(_))));
}
