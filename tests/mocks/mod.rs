//! Shared test doubles for integration tests

#![allow(dead_code)]

use apiconform::api_description::{parse_description, OpenApiDocument};
use apiconform::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use tokio::time::Instant;

/// Transport answering from a script and recording every request it sees
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    fallback: HttpResponse,
    requests: Mutex<Vec<(Instant, HttpRequest)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: response(200, "{}"),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer once the script is exhausted
    pub fn with_fallback(mut self, fallback: HttpResponse) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn push(&self, answer: Result<HttpResponse, TransportError>) {
        self.script.lock().unwrap().push_back(answer);
    }

    pub fn push_response(&self, response: HttpResponse) {
        self.push(Ok(response));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().iter().map(|(_, r)| r.clone()).collect()
    }

    pub fn request_times(&self) -> Vec<Instant> {
        self.requests.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push((Instant::now(), request.clone()));
        match self.script.lock().unwrap().pop_front() {
            Some(answer) => answer,
            None => Ok(self.fallback.clone()),
        }
    }
}

pub fn response(status: u16, body: &str) -> HttpResponse {
    HttpResponse {
        status_code: status,
        headers: HashMap::from([("content-type".to_string(), "application/json".to_string())]),
        body: body.as_bytes().to_vec(),
        ..Default::default()
    }
}

/// Small OpenAPI 3.0 description covering the paths used across the tests
pub const API_DESCRIPTION: &str = r#"
openapi: 3.0.2
info:
  title: conformance fixture
  version: 1.0.0
paths:
  /:
    get:
      responses:
        '200':
          description: capabilities
          content:
            application/json:
              schema:
                type: object
                required: [endpoints]
                properties:
                  endpoints:
                    type: array
  /collections:
    get:
      parameters:
        - name: limit
          in: query
          schema:
            type: integer
            minimum: 1
      responses:
        '200':
          description: collections
          content:
            application/json:
              schema:
                type: object
                required: [collections]
                properties:
                  collections:
                    type: array
                    items:
                      $ref: '#/components/schemas/collection'
  /jobs:
    get:
      responses:
        '200':
          description: jobs
    post:
      requestBody:
        required: true
        content:
          application/json:
            schema:
              type: object
              required: [process]
      responses:
        '201':
          description: created
  /jobs/{job_id}:
    parameters:
      - name: job_id
        in: path
        required: true
        schema:
          type: string
    get:
      responses:
        '200':
          description: job
          content:
            application/json:
              schema:
                type: object
                required: [id]
                properties:
                  id:
                    type: string
                  title:
                    type: string
                    nullable: true
  /services:
    post:
      responses:
        '201':
          description: created
  /credentials/basic:
    get:
      responses:
        '200':
          description: token
components:
  schemas:
    collection:
      type: object
      required: [id]
      properties:
        id:
          type: string
"#;

pub fn api_document() -> OpenApiDocument {
    parse_description(Path::new("openapi.yaml"), API_DESCRIPTION).unwrap()
}

/// Capability document body listing `(path, methods)` pairs
pub fn capabilities_body(entries: &[(&str, &[&str])]) -> String {
    let endpoints: Vec<serde_json::Value> = entries
        .iter()
        .map(|(path, methods)| serde_json::json!({"path": path, "methods": methods}))
        .collect();
    serde_json::json!({ "endpoints": endpoints }).to_string()
}
