//! Request routing and handlers.
//!
//! | Method | Path                                          | Operation         |
//! |--------|-----------------------------------------------|-------------------|
//! | POST   | `/workflow-definitions`                       | CREATE_DEFINITION |
//! | GET    | `/workflow-definitions`                       | LIST_DEFINITIONS  |
//! | GET    | `/workflow-definitions/{id}`                  | GET_DEFINITION    |
//! | POST   | `/workflow-instances`                         | START_INSTANCE    |
//! | GET    | `/workflow-instances[?definitionId=..]`       | LIST_INSTANCES    |
//! | GET    | `/workflow-instances/{id}`                    | GET_INSTANCE      |
//! | POST   | `/workflow-instances/{id}/actions/{actionId}` | EXECUTE_ACTION    |
//! | POST   | `/_admin/export`                              | EXPORT            |
//! | POST   | `/_admin/import`                              | IMPORT            |
//! | GET    | `/health`                                     | HEALTH            |

use crate::dto::{ApiError, DefinitionDto, InstanceDto, StartInstanceRequest};
use crate::error::ServerError;
use crate::metrics::Metrics;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE, LOCATION};
use hyper::{Response, StatusCode};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::borrow::Cow;
use std::sync::Arc;
use workflowd_core::{DefinitionSpec, WorkflowEngine};
use workflowd_storage::Snapshot;

pub use hyper::Method;

const JSON: &str = "application/json";
const TEXT: &str = "text/plain; charset=utf-8";

/// Everything but RFC 3986 unreserved characters is escaped in a path segment.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// A request as seen by the handler, decoupled from the transport.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub body: Bytes,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            body: Bytes::new(),
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_json(self, value: &serde_json::Value) -> Self {
        self.with_body(value.to_string())
    }

    fn query_param(&self, name: &str) -> Option<String> {
        let query = self.query.as_deref()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }
}

/// A handler response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub location: Option<String>,
    pub body: Bytes,
}

impl ApiResponse {
    fn json<T: Serialize>(status: StatusCode, value: &T) -> Result<Self, ServerError> {
        Ok(Self {
            status,
            content_type: JSON,
            location: None,
            body: Bytes::from(serde_json::to_vec(value)?),
        })
    }

    fn text(status: StatusCode, body: &'static str) -> Self {
        Self {
            status,
            content_type: TEXT,
            location: None,
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    fn with_location(mut self, location: String) -> Self {
        self.location = Some(location);
        self
    }

    pub(crate) fn from_error(err: &ServerError) -> Self {
        let body = ApiError::new(err.error_code(), err.to_string());
        Self {
            status: err.status_code(),
            content_type: JSON,
            location: None,
            // ApiError is two strings; serializing it cannot fail.
            body: Bytes::from(serde_json::to_vec(&body).unwrap_or_default()),
        }
    }

    /// Parses the body as JSON.
    pub fn json_body(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Converts into a hyper response.
    pub fn into_hyper(self) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(self.body));
        *response.status_mut() = self.status;
        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(self.content_type));
        if let Some(location) = self.location {
            if let Ok(value) = HeaderValue::from_str(&location) {
                headers.insert(LOCATION, value);
            }
        }
        response
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    CreateDefinition,
    ListDefinitions,
    GetDefinition,
    StartInstance,
    ListInstances,
    GetInstance,
    ExecuteAction,
    Export,
    Import,
    Health,
}

impl Operation {
    fn as_str(self) -> &'static str {
        match self {
            Operation::CreateDefinition => "CREATE_DEFINITION",
            Operation::ListDefinitions => "LIST_DEFINITIONS",
            Operation::GetDefinition => "GET_DEFINITION",
            Operation::StartInstance => "START_INSTANCE",
            Operation::ListInstances => "LIST_INSTANCES",
            Operation::GetInstance => "GET_INSTANCE",
            Operation::ExecuteAction => "EXECUTE_ACTION",
            Operation::Export => "EXPORT",
            Operation::Import => "IMPORT",
            Operation::Health => "HEALTH",
        }
    }
}

/// Ids inside a route are percent-decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Route<'a> {
    Definitions,
    Definition(Cow<'a, str>),
    Instances,
    Instance(Cow<'a, str>),
    InstanceAction(Cow<'a, str>, Cow<'a, str>),
    Export,
    Import,
    Health,
}

impl<'a> Route<'a> {
    fn parse(path: &'a str) -> Result<Self, ServerError> {
        let trimmed = path.trim_start_matches('/').trim_end_matches('/');
        let segments: Vec<&'a str> = trimmed.split('/').collect();

        let route = match segments.as_slice() {
            ["workflow-definitions"] => Route::Definitions,
            ["workflow-definitions", id] if !id.is_empty() => {
                Route::Definition(decode_segment(*id)?)
            }
            ["workflow-instances"] => Route::Instances,
            ["workflow-instances", id] if !id.is_empty() => {
                Route::Instance(decode_segment(*id)?)
            }
            ["workflow-instances", id, "actions", action]
                if !id.is_empty() && !action.is_empty() =>
            {
                Route::InstanceAction(decode_segment(*id)?, decode_segment(*action)?)
            }
            ["_admin", "export"] => Route::Export,
            ["_admin", "import"] => Route::Import,
            ["health"] => Route::Health,
            _ => return Err(ServerError::RouteNotFound(path.to_string())),
        };
        Ok(route)
    }

    fn operation(&self, method: &Method) -> Option<Operation> {
        let get = *method == Method::GET;
        let post = *method == Method::POST;

        let op = match self {
            Route::Definitions if post => Operation::CreateDefinition,
            Route::Definitions if get => Operation::ListDefinitions,
            Route::Definition(_) if get => Operation::GetDefinition,
            Route::Instances if post => Operation::StartInstance,
            Route::Instances if get => Operation::ListInstances,
            Route::Instance(_) if get => Operation::GetInstance,
            Route::InstanceAction(..) if post => Operation::ExecuteAction,
            Route::Export if post => Operation::Export,
            Route::Import if post => Operation::Import,
            Route::Health if get => Operation::Health,
            _ => return None,
        };
        Some(op)
    }
}

fn decode_segment(segment: &str) -> Result<Cow<'_, str>, ServerError> {
    percent_decode_str(segment).decode_utf8().map_err(|_| {
        ServerError::InvalidRequest(format!("path segment '{}' is not valid UTF-8", segment))
    })
}

fn encode_segment(id: &str) -> String {
    utf8_percent_encode(id, SEGMENT).to_string()
}

fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, ServerError> {
    Ok(serde_json::from_slice(body)?)
}

/// API request handler.
pub struct ApiHandler {
    engine: Arc<WorkflowEngine>,
    /// Metrics for request tracking.
    metrics: Option<Arc<Metrics>>,
}

impl ApiHandler {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        Self {
            engine,
            metrics: None,
        }
    }

    /// Sets the metrics instance.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self.update_gauge_metrics();
        self
    }

    pub fn engine(&self) -> &Arc<WorkflowEngine> {
        &self.engine
    }

    pub fn metrics(&self) -> Option<&Arc<Metrics>> {
        self.metrics.as_ref()
    }

    /// Updates gauge metrics from current engine state.
    pub fn update_gauge_metrics(&self) {
        if let Some(ref metrics) = self.metrics {
            metrics
                .definitions_total
                .set(self.engine.definition_count() as f64);
            metrics
                .instances_total
                .set(self.engine.instance_count() as f64);
        }
    }

    /// Handles a request and returns a response.
    pub fn handle(&self, request: &ApiRequest) -> ApiResponse {
        let resolved = Route::parse(&request.path).and_then(|route| {
            match route.operation(&request.method) {
                Some(op) => Ok((route, op)),
                None => Err(ServerError::MethodNotAllowed {
                    method: request.method.to_string(),
                    path: request.path.clone(),
                }),
            }
        });

        let op_name = match &resolved {
            Ok((_, op)) => op.as_str(),
            Err(_) => "UNKNOWN",
        };

        let timer = self.metrics.as_ref().map(|m| {
            m.request_duration
                .with_label_values(&[op_name])
                .start_timer()
        });

        let result = resolved.and_then(|(route, op)| self.dispatch(route, op, request));

        if let Some(ref metrics) = self.metrics {
            metrics.requests_total.with_label_values(&[op_name]).inc();
            if let Err(ref e) = result {
                metrics.errors_total.with_label_values(&[e.error_code()]).inc();
            }
        }
        drop(timer); // Observation happens on drop

        match result {
            Ok(response) => response,
            Err(e) => {
                if e.status_code().is_server_error() {
                    tracing::error!("{} {} failed: {}", request.method, request.path, e);
                } else {
                    tracing::debug!("{} {} rejected: {}", request.method, request.path, e);
                }
                ApiResponse::from_error(&e)
            }
        }
    }

    fn dispatch(
        &self,
        route: Route<'_>,
        op: Operation,
        request: &ApiRequest,
    ) -> Result<ApiResponse, ServerError> {
        match (op, &route) {
            (Operation::CreateDefinition, _) => self.handle_create_definition(&request.body),
            (Operation::ListDefinitions, _) => self.handle_list_definitions(),
            (Operation::GetDefinition, Route::Definition(id)) => self.handle_get_definition(id),
            (Operation::StartInstance, _) => self.handle_start_instance(&request.body),
            (Operation::ListInstances, _) => {
                self.handle_list_instances(request.query_param("definitionId"))
            }
            (Operation::GetInstance, Route::Instance(id)) => self.handle_get_instance(id),
            (Operation::ExecuteAction, Route::InstanceAction(id, action)) => {
                self.handle_execute_action(id, action)
            }
            (Operation::Export, _) => self.handle_export(),
            (Operation::Import, _) => self.handle_import(&request.body),
            (Operation::Health, _) => Ok(ApiResponse::text(StatusCode::OK, "OK")),
            _ => Err(ServerError::RouteNotFound(request.path.clone())),
        }
    }

    fn handle_create_definition(&self, body: &[u8]) -> Result<ApiResponse, ServerError> {
        let spec: DefinitionSpec = parse_json(body)?;
        let definition = self.engine.create_definition(spec)?;
        self.update_gauge_metrics();

        tracing::info!("Created definition {}", definition.id());

        Ok(
            ApiResponse::json(StatusCode::CREATED, &DefinitionDto::from(definition.as_ref()))?
                .with_location(format!(
                    "/workflow-definitions/{}",
                    encode_segment(definition.id())
                )),
        )
    }

    fn handle_list_definitions(&self) -> Result<ApiResponse, ServerError> {
        let definitions: Vec<DefinitionDto> = self
            .engine
            .list_definitions()
            .iter()
            .map(|d| DefinitionDto::from(d.as_ref()))
            .collect();
        ApiResponse::json(StatusCode::OK, &definitions)
    }

    fn handle_get_definition(&self, id: &str) -> Result<ApiResponse, ServerError> {
        let definition = self.engine.get_definition(id)?;
        ApiResponse::json(StatusCode::OK, &DefinitionDto::from(definition.as_ref()))
    }

    fn handle_start_instance(&self, body: &[u8]) -> Result<ApiResponse, ServerError> {
        let req: StartInstanceRequest = parse_json(body)?;
        let instance = self
            .engine
            .start_instance(&req.definition_id, req.id.as_deref())?;
        self.update_gauge_metrics();

        let location = format!("/workflow-instances/{}", encode_segment(instance.id()));
        let dto = InstanceDto::from(self.engine.view(instance));
        Ok(ApiResponse::json(StatusCode::CREATED, &dto)?.with_location(location))
    }

    fn handle_list_instances(
        &self,
        definition_id: Option<String>,
    ) -> Result<ApiResponse, ServerError> {
        let instances = match definition_id {
            Some(def) => self.engine.list_instances_of(&def),
            None => self.engine.list_instances(),
        };
        let dtos: Vec<InstanceDto> = instances
            .into_iter()
            .map(|i| InstanceDto::from(self.engine.view(i)))
            .collect();
        ApiResponse::json(StatusCode::OK, &dtos)
    }

    fn handle_get_instance(&self, id: &str) -> Result<ApiResponse, ServerError> {
        let view = self.engine.describe_instance(id)?;
        ApiResponse::json(StatusCode::OK, &InstanceDto::from(view))
    }

    fn handle_execute_action(
        &self,
        instance_id: &str,
        action_id: &str,
    ) -> Result<ApiResponse, ServerError> {
        let outcome = self.engine.execute_action(instance_id, action_id)?;
        if let Some(ref metrics) = self.metrics {
            metrics.transitions_total.inc();
        }

        let dto = InstanceDto::from(self.engine.view(outcome.instance));
        ApiResponse::json(StatusCode::OK, &dto)
    }

    fn handle_export(&self) -> Result<ApiResponse, ServerError> {
        let snapshot = Snapshot::capture(&self.engine);
        Ok(ApiResponse {
            status: StatusCode::OK,
            content_type: JSON,
            location: None,
            body: Bytes::from(snapshot.to_json_pretty()?),
        })
    }

    fn handle_import(&self, body: &[u8]) -> Result<ApiResponse, ServerError> {
        let text = std::str::from_utf8(body)
            .map_err(|_| ServerError::InvalidRequest("body is not valid UTF-8".to_string()))?;
        let report = Snapshot::from_json(text)?.restore_into(&self.engine)?;
        self.update_gauge_metrics();
        ApiResponse::json(StatusCode::OK, &report)
    }
}
