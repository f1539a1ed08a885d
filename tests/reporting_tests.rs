mod mocks;

use apiconform::execution::{EndpointResult, ExecutionResult, GroupResult, RetryPolicy, SerialExecutor};
use apiconform::reporting::TIMESTAMP_FORMAT;
use apiconform::{Application, BackendTarget, Endpoint, HttpMethod, Report, ValidationState};
use chrono::{Local, TimeZone};
use serde_json::{json, Value};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{basic_auth, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn endpoint_result(id: &str, url: &str, method: HttpMethod, state: ValidationState, message: &str) -> EndpointResult {
    EndpointResult {
        endpoint: Endpoint::new(id, url, method),
        state,
        message: message.to_string(),
        attempts: 1,
    }
}

fn sample_execution() -> ExecutionResult {
    ExecutionResult {
        groups: vec![
            GroupResult {
                name: "nogroup".to_string(),
                endpoints: vec![endpoint_result("root", "/", HttpMethod::GET, ValidationState::Valid, "")],
            },
            GroupResult {
                name: "jobs".to_string(),
                endpoints: vec![
                    endpoint_result("create_job", "/jobs", HttpMethod::POST, ValidationState::Valid, ""),
                    endpoint_result(
                        "describe_job",
                        "/jobs/j-1",
                        HttpMethod::GET,
                        ValidationState::Missing,
                        "Input: /jobs/j-1; Error: Response Code 404; Details: ",
                    ),
                ],
            },
            GroupResult {
                name: "services".to_string(),
                endpoints: vec![endpoint_result(
                    "create_service",
                    "/services",
                    HttpMethod::POST,
                    ValidationState::NotSupported,
                    "skipped",
                )],
            },
        ],
        start_time: Local.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        end_time: Local.with_ymd_and_hms(2024, 3, 1, 12, 5, 30).unwrap(),
    }
}

#[test]
fn test_report_shape() {
    let backend = BackendTarget {
        base_url: "https://backend.example".to_string(),
        url: "https://backend.example/1.0".to_string(),
        version: Some("1.0.0".to_string()),
    };

    let report = Report::build(&sample_execution(), &backend, "openapi.json");
    let value: Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

    assert_eq!(value["result"]["nogroup"]["group_summary"], "Valid");
    assert_eq!(value["result"]["jobs"]["group_summary"], "Invalid");
    assert_eq!(value["result"]["services"]["group_summary"], "NotSupported");
    assert_eq!(
        value["result"]["jobs"]["endpoints"]["create_job"],
        json!({"state": "Valid", "message": "", "url": "/jobs", "type": "POST"})
    );
    assert_eq!(value["result"]["jobs"]["endpoints"]["describe_job"]["state"], "Missing");
    assert_eq!(
        value["stats"],
        json!({
            "backend": {
                "url": "https://backend.example/1.0",
                "baseurl": "https://backend.example",
                "version": "1.0.0"
            },
            "execution": {"start": "2024-03-01 12:00:00", "end": "2024-03-01 12:05:30"},
            "spec": {"apifile": "openapi.json"}
        })
    );
}

#[test]
fn test_report_keeps_plan_order_and_four_space_indent() {
    let backend = BackendTarget::new("https://backend.example", None);
    let json = Report::build(&sample_execution(), &backend, "").to_json().unwrap();

    let nogroup = json.find("\"nogroup\"").unwrap();
    let jobs = json.find("\"jobs\"").unwrap();
    let services = json.find("\"services\"").unwrap();
    assert!(nogroup < jobs && jobs < services);
    assert!(json.find("\"create_job\"").unwrap() < json.find("\"describe_job\"").unwrap());

    assert!(json.starts_with("{\n    \"result\": {\n        \"nogroup\""));
    assert!(json.contains("\"version\": \"\""));
}

#[tokio::test]
async fn test_report_written_to_file() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("report.json");
    let backend = BackendTarget::new("https://backend.example", None);
    let report = Report::build(&sample_execution(), &backend, "openapi.json");

    report.write(Some(&output)).await.unwrap();

    let written: Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(written["stats"]["spec"]["apifile"], "openapi.json");
    assert!(TIMESTAMP_FORMAT.contains("%H"));
}

#[tokio::test]
async fn test_full_run_produces_report_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            mocks::capabilities_body(&[("/jobs", &["GET"][..]), ("/credentials/basic", &["GET"][..])]),
            "application/json",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/credentials/basic"))
        .and(basic_auth("alice", "s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobs"))
        .and(header("Authorization", "Bearer basic//tok"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let api = dir.path().join("openapi.yaml");
    fs::write(&api, mocks::API_DESCRIPTION).unwrap();
    let output = dir.path().join("report.json");
    let config = dir.path().join("backend.toml");
    fs::write(
        &config,
        format!(
            r#"
url = "{}"
openapi = "{}"
username = "alice"
password = "s3cret"
output = "{}"

[endpoints.capabilities]
url = "/"

[endpoints.list_jobs]
url = "/jobs"
group = "jobs"

[endpoints.basic]
url = "/credentials/basic"
group = "auth"

[endpoints.create_service]
url = "/services"
type = "POST"
group = "services"
"#,
            server.uri(),
            api.display(),
            output.display()
        ),
    )
    .unwrap();

    let app = Application::from_config_files(&[config])
        .await
        .unwrap()
        .with_executor(SerialExecutor::new(RetryPolicy {
            max_attempts: 2,
            delay: Duration::from_millis(10),
        }));
    let report = app.run_and_report().await.unwrap();

    assert_eq!(report.result.keys().collect::<Vec<_>>(), vec!["nogroup", "jobs", "auth", "services"]);

    let written: Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(written["result"]["nogroup"]["endpoints"]["capabilities"]["state"], "Valid");
    assert_eq!(written["result"]["jobs"]["endpoints"]["list_jobs"]["state"], "Valid");
    assert_eq!(written["result"]["auth"]["endpoints"]["basic"]["state"], "Valid");
    assert_eq!(written["result"]["services"]["group_summary"], "NotSupported");
    assert_eq!(written["stats"]["backend"]["baseurl"], server.uri());
    assert_eq!(written["stats"]["spec"]["apifile"], api.display().to_string());
}
