use std::collections::BTreeMap;

use jsonschema::Draft;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::schema;
use super::{ApiDescriptionError, RouteMatch, SchemaValidator};
use crate::endpoint::HttpMethod;
use crate::transport::{HttpRequest, HttpResponse};

/// Either an inline object or a local `$ref` to one
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RefOr<T> {
    Ref {
        #[serde(rename = "$ref")]
        reference: String,
    },
    Item(T),
}

#[derive(Debug, Clone, Deserialize)]
struct OpenApiSpec {
    openapi: String,
    #[serde(default)]
    paths: BTreeMap<String, PathItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathItem {
    #[serde(default)]
    pub parameters: Vec<RefOr<Parameter>>,
    pub get: Option<Operation>,
    pub post: Option<Operation>,
    pub put: Option<Operation>,
    pub patch: Option<Operation>,
    pub delete: Option<Operation>,
}

impl PathItem {
    pub fn operation(&self, method: HttpMethod) -> Option<&Operation> {
        match method {
            HttpMethod::GET => self.get.as_ref(),
            HttpMethod::POST => self.post.as_ref(),
            HttpMethod::PUT => self.put.as_ref(),
            HttpMethod::PATCH => self.patch.as_ref(),
            HttpMethod::DELETE => self.delete.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Operation {
    #[serde(default)]
    pub parameters: Vec<RefOr<Parameter>>,
    #[serde(rename = "requestBody")]
    pub request_body: Option<RefOr<RequestBody>>,
    #[serde(default)]
    pub responses: BTreeMap<String, RefOr<Response>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: String,
    #[serde(default)]
    pub required: bool,
    pub schema: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestBody {
    #[serde(default)]
    pub content: BTreeMap<String, MediaType>,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub content: BTreeMap<String, MediaType>,
    #[serde(default)]
    pub headers: BTreeMap<String, RefOr<Header>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Header {
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaType {
    pub schema: Option<Value>,
}

#[derive(Debug, Clone)]
struct CompiledRoute {
    template: String,
    pattern: Regex,
    param_names: Vec<String>,
}

/// OpenAPI 3.x description with a precompiled route table
#[derive(Debug, Clone)]
pub struct OpenApiDocument {
    version: String,
    raw: Value,
    paths: BTreeMap<String, PathItem>,
    routes: Vec<CompiledRoute>,
}

impl OpenApiDocument {
    pub fn from_value(raw: Value) -> Result<Self, ApiDescriptionError> {
        let spec: OpenApiSpec =
            serde_json::from_value(raw.clone()).map_err(|e| ApiDescriptionError::Parse(e.to_string()))?;

        if !spec.openapi.starts_with('3') {
            return Err(ApiDescriptionError::Parse(format!(
                "unsupported OpenAPI version {}",
                spec.openapi
            )));
        }

        let mut routes = Vec::with_capacity(spec.paths.len());
        for template in spec.paths.keys() {
            let (pattern, param_names) = compile_template(template)
                .map_err(|e| ApiDescriptionError::Parse(format!("path {}: {}", template, e)))?;
            routes.push(CompiledRoute {
                template: template.clone(),
                pattern,
                param_names,
            });
        }
        // Literal paths win over templated ones
        routes.sort_by_key(|route| route.param_names.len());

        Ok(Self {
            version: spec.openapi,
            raw,
            paths: spec.paths,
            routes,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn path_count(&self) -> usize {
        self.paths.len()
    }

    fn draft(&self) -> Draft {
        if self.version.starts_with("3.0") {
            Draft::Draft4
        } else {
            Draft::Draft202012
        }
    }

    fn maps_nullable(&self) -> bool {
        self.version.starts_with("3.0")
    }

    fn resolve<T: DeserializeOwned + Clone>(&self, item: &RefOr<T>) -> Result<T, String> {
        match item {
            RefOr::Item(value) => Ok(value.clone()),
            RefOr::Ref { reference } => {
                let pointer = reference
                    .strip_prefix('#')
                    .ok_or_else(|| format!("unsupported non-local reference {}", reference))?;
                let target = self
                    .raw
                    .pointer(pointer)
                    .ok_or_else(|| format!("unresolvable reference {}", reference))?;
                serde_json::from_value(target.clone()).map_err(|e| format!("reference {}: {}", reference, e))
            }
        }
    }

    fn operation(&self, route: &RouteMatch) -> Result<(&PathItem, &Operation), String> {
        let item = self
            .paths
            .get(&route.template)
            .ok_or_else(|| format!("unknown path {}", route.template))?;
        let operation = item
            .operation(route.method)
            .ok_or_else(|| format!("no {} operation for {}", route.method, route.template))?;
        Ok((item, operation))
    }

    /// Path-level parameters overridden by operation-level ones of the same name and location
    fn parameters(&self, item: &PathItem, operation: &Operation) -> Result<Vec<Parameter>, String> {
        let mut merged: Vec<Parameter> = Vec::new();
        for entry in item.parameters.iter().chain(operation.parameters.iter()) {
            let parameter = self.resolve(entry)?;
            merged.retain(|existing| !(existing.name == parameter.name && existing.location == parameter.location));
            merged.push(parameter);
        }
        Ok(merged)
    }

    fn check_schema(&self, schema: &Value, instance: &Value) -> Result<(), String> {
        let prepared = schema::prepare(schema, &self.raw, self.maps_nullable());
        let validator = schema::compile(&prepared, self.draft())?;
        schema::check(&validator, instance)
    }

    fn check_parameter(&self, parameter: &Parameter, value: Option<&str>) -> Result<(), String> {
        let Some(value) = value else {
            if parameter.required {
                return Err(format!(
                    "parameter \"{}\" in {} is required",
                    parameter.name, parameter.location
                ));
            }
            return Ok(());
        };

        let Some(parameter_schema) = &parameter.schema else {
            return Ok(());
        };
        let prepared = schema::prepare(parameter_schema, &self.raw, self.maps_nullable());
        let instance = schema::coerce_parameter(value, &prepared);
        let validator = schema::compile(&prepared, self.draft())?;
        schema::check(&validator, &instance).map_err(|e| {
            format!(
                "parameter \"{}\" in {} has an error: {}",
                parameter.name, parameter.location, e
            )
        })
    }
}

impl SchemaValidator for OpenApiDocument {
    fn find_route(&self, method: HttpMethod, path: &str) -> Result<RouteMatch, String> {
        let mut path_found = false;

        for route in &self.routes {
            let Some(captures) = route.pattern.captures(path) else {
                continue;
            };
            path_found = true;

            let has_operation = self
                .paths
                .get(&route.template)
                .and_then(|item| item.operation(method))
                .is_some();
            if !has_operation {
                continue;
            }

            let path_params = route
                .param_names
                .iter()
                .enumerate()
                .filter_map(|(index, name)| {
                    captures
                        .get(index + 1)
                        .map(|value| (name.clone(), value.as_str().to_string()))
                })
                .collect();

            return Ok(RouteMatch {
                template: route.template.clone(),
                method,
                path_params,
            });
        }

        if path_found {
            Err(format!("method not allowed: {} {}", method, path))
        } else {
            Err(format!("no matching operation was found: {} {}", method, path))
        }
    }

    fn validate_request(&self, route: &RouteMatch, request: &HttpRequest) -> Result<(), String> {
        let (item, operation) = self.operation(route)?;

        let query: Vec<(String, String)> = request
            .query()
            .map(|query| {
                url::form_urlencoded::parse(query.as_bytes())
                    .map(|(name, value)| (name.into_owned(), value.into_owned()))
                    .collect()
            })
            .unwrap_or_default();

        for parameter in self.parameters(item, operation)? {
            let value = match parameter.location.as_str() {
                "path" => route.path_params.get(&parameter.name).map(String::as_str),
                "query" => query
                    .iter()
                    .find(|(name, _)| name == &parameter.name)
                    .map(|(_, value)| value.as_str()),
                "header" => request.header(&parameter.name),
                _ => continue,
            };
            self.check_parameter(&parameter, value)?;
        }

        let Some(body_entry) = &operation.request_body else {
            return Ok(());
        };
        let request_body = self.resolve(body_entry)?;

        let Some(body) = request.body.as_deref().filter(|body| !body.is_empty()) else {
            if request_body.required {
                return Err("request body has an error: value is required but missing".to_string());
            }
            return Ok(());
        };

        if request_body.content.is_empty() {
            return Ok(());
        }

        let content_type = request.header("Content-Type").unwrap_or_default();
        let media = find_media_type(&request_body.content, content_type).ok_or_else(|| {
            format!(
                "request body has an error: header Content-Type has unexpected value: \"{}\"",
                content_type
            )
        })?;

        match (&media.schema, is_json(content_type)) {
            (Some(body_schema), true) => {
                let instance: Value = serde_json::from_slice(body)
                    .map_err(|e| format!("request body has an error: failed to decode request body: {}", e))?;
                self.check_schema(body_schema, &instance)
                    .map_err(|e| format!("request body has an error: doesn't match the schema: {}", e))
            }
            _ => Ok(()),
        }
    }

    fn validate_response(
        &self,
        route: &RouteMatch,
        _request: &HttpRequest,
        response: &HttpResponse,
    ) -> Result<(), String> {
        let (_, operation) = self.operation(route)?;

        let Some(entry) = lookup_response(&operation.responses, response.status_code) else {
            log::debug!(
                "Status {} is not described for {} {}",
                response.status_code,
                route.method,
                route.template
            );
            return Ok(());
        };
        let declared = self.resolve(entry)?;

        for (name, header_entry) in &declared.headers {
            let header = self.resolve(header_entry)?;
            if header.required && response.header(name).is_none() {
                return Err(format!("response header \"{}\" is required but missing", name));
            }
        }

        if declared.content.is_empty() {
            return Ok(());
        }

        let content_type = response.header("Content-Type").unwrap_or_default();
        let media = find_media_type(&declared.content, content_type).ok_or_else(|| {
            format!("response header Content-Type has unexpected value: \"{}\"", content_type)
        })?;

        match (&media.schema, is_json(content_type)) {
            (Some(body_schema), true) => {
                let instance: Value = serde_json::from_slice(&response.body)
                    .map_err(|e| format!("response body doesn't match the schema: failed to decode: {}", e))?;
                self.check_schema(body_schema, &instance)
                    .map_err(|e| format!("response body doesn't match the schema: {}", e))
            }
            _ => Ok(()),
        }
    }

    fn request_content_types(&self, route: &RouteMatch) -> Vec<String> {
        let Ok((_, operation)) = self.operation(route) else {
            return Vec::new();
        };
        match operation.request_body.as_ref().map(|entry| self.resolve(entry)) {
            Some(Ok(body)) => body.content.keys().cloned().collect(),
            Some(Err(e)) => {
                log::warn!("Cannot resolve request body of {}: {}", route.template, e);
                Vec::new()
            }
            None => Vec::new(),
        }
    }
}

/// Anchored regex for a path template plus its parameter names in order
fn compile_template(template: &str) -> Result<(Regex, Vec<String>), regex::Error> {
    let placeholder = Regex::new(r"\{([^{}]*)\}")?;

    let mut pattern = String::from("^");
    let mut names = Vec::new();
    let mut last = 0;
    for captures in placeholder.captures_iter(template) {
        let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        pattern.push_str(&regex::escape(&template[last..whole.start()]));
        pattern.push_str("([^/]+)");
        names.push(name.as_str().to_string());
        last = whole.end();
    }
    pattern.push_str(&regex::escape(&template[last..]));
    pattern.push('$');

    Ok((Regex::new(&pattern)?, names))
}

/// Exact status, then `NXX` range, then `default`
fn lookup_response(responses: &BTreeMap<String, RefOr<Response>>, status: u16) -> Option<&RefOr<Response>> {
    let exact = status.to_string();
    let range = format!("{}XX", status / 100);
    responses
        .get(&exact)
        .or_else(|| {
            responses
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(&range))
                .map(|(_, response)| response)
        })
        .or_else(|| responses.get("default"))
}

fn mime_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn is_json(content_type: &str) -> bool {
    let essence = mime_essence(content_type);
    essence == "application/json" || essence.ends_with("+json")
}

/// Declared media type matching `content_type`, honouring `*/*` and `type/*`
fn find_media_type<'a>(content: &'a BTreeMap<String, MediaType>, content_type: &str) -> Option<&'a MediaType> {
    let essence = mime_essence(content_type);
    let main_type = essence.split('/').next().unwrap_or_default();

    content
        .iter()
        .find(|(declared, _)| mime_essence(declared) == essence)
        .or_else(|| {
            content.iter().find(|(declared, _)| {
                let declared = mime_essence(declared);
                declared == format!("{}/*", main_type) && !main_type.is_empty()
            })
        })
        .or_else(|| content.iter().find(|(declared, _)| mime_essence(declared) == "*/*"))
        .map(|(_, media)| media)
}
