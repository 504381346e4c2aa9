//! In-process CRM fake for tests. Responses are scripted per exact method and path and every
//! request is recorded.

use std::collections::VecDeque;

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::transport::{CrmRequest, CrmTransport, HttpMethod, TransportError};

#[derive(Default)]
pub struct ScriptedTransport {
    state: Mutex<ScriptedState>,
}

#[derive(Default)]
struct ScriptedState {
    routes: Vec<ScriptedRoute>,
    requests: Vec<CrmRequest>,
}

struct ScriptedRoute {
    method: HttpMethod,
    path: String,
    responses: VecDeque<Result<Value, TransportError>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues one response for `method path`. Repeated calls for the same route are served in
    /// order; an exhausted or unknown route answers HTTP 404.
    pub fn on(
        mut self,
        method: HttpMethod,
        path: impl Into<String>,
        response: Result<Value, TransportError>,
    ) -> Self {
        let path = path.into();
        let state = self.state.get_mut();
        match state.routes.iter_mut().find(|route| route.method == method && route.path == path) {
            Some(route) => route.responses.push_back(response),
            None => state.routes.push(ScriptedRoute {
                method,
                path,
                responses: VecDeque::from([response]),
            }),
        }
        self
    }

    pub async fn request_count(&self) -> usize {
        self.state.lock().await.requests.len()
    }

    /// First recorded request for `method path`, if any.
    pub async fn request_to(&self, method: HttpMethod, path: &str) -> Option<CrmRequest> {
        self.state
            .lock()
            .await
            .requests
            .iter()
            .find(|request| request.method == method && request.path == path)
            .cloned()
    }
}

#[async_trait]
impl CrmTransport for ScriptedTransport {
    async fn send(
        &self,
        _credential: &SecretString,
        request: CrmRequest,
    ) -> Result<Value, TransportError> {
        let mut state = self.state.lock().await;
        let response = state
            .routes
            .iter_mut()
            .find(|route| route.method == request.method && route.path == request.path)
            .and_then(|route| route.responses.pop_front());
        let missing = format!("no scripted response for {} {}", request.method, request.path);
        state.requests.push(request);
        response.unwrap_or(Err(TransportError::Status { status: 404, message: missing }))
    }
}
