use std::time::Duration;

use async_trait::async_trait;
use callbridge_core::transport::{CrmRequest, CrmTransport, HttpMethod, TransportError};
use reqwest::{Client, Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::debug;

/// amoCRM transport over a shared reqwest client. The client timeout bounds every call.
#[derive(Clone)]
pub struct ReqwestCrmTransport {
    client: Client,
    base_url: String,
}

impl ReqwestCrmTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }
}

#[async_trait]
impl CrmTransport for ReqwestCrmTransport {
    async fn send(
        &self,
        credential: &SecretString,
        request: CrmRequest,
    ) -> Result<Value, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);
        let method = match request.method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Patch => Method::PATCH,
        };

        let mut builder = self.client.request(method, &url).bearer_auth(credential.expose_secret());
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response =
            builder.send().await.map_err(|error| TransportError::Network(error.to_string()))?;
        let status = response.status();
        let body =
            response.bytes().await.map_err(|error| TransportError::Network(error.to_string()))?;

        debug!(
            event_name = "crm.transport.response",
            method = request.method.as_str(),
            path = %request.path,
            status = status.as_u16(),
            "crm responded"
        );
        decode_response(status, &body)
    }
}

fn decode_response(status: StatusCode, body: &[u8]) -> Result<Value, TransportError> {
    if status == StatusCode::UNAUTHORIZED {
        return Err(TransportError::Unauthorized);
    }
    if !status.is_success() {
        return Err(TransportError::Status {
            status: status.as_u16(),
            message: error_message(status, body),
        });
    }
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(|error| TransportError::Decode(error.to_string()))
}

/// amoCRM problem documents carry `detail` and `title`; anything else falls back to the
/// status reason.
fn error_message(status: StatusCode, body: &[u8]) -> String {
    let problem: Option<Value> = serde_json::from_slice(body).ok();
    problem
        .as_ref()
        .and_then(|problem| {
            ["detail", "title"].iter().find_map(|key| {
                problem.get(*key).and_then(Value::as_str).filter(|text| !text.trim().is_empty())
            })
        })
        .map(str::to_string)
        .unwrap_or_else(|| match status.canonical_reason() {
            Some(reason) => reason.to_string(),
            None => status.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        http::{HeaderMap, StatusCode},
        routing::{get, post},
        Json, Router,
    };
    use callbridge_core::transport::{CrmRequest, CrmTransport, TransportError};
    use secrecy::SecretString;
    use serde_json::{json, Value};

    use super::{decode_response, ReqwestCrmTransport};

    #[test]
    fn problem_detail_wins_over_title_and_reason() {
        let error = decode_response(
            StatusCode::BAD_REQUEST,
            br#"{"title":"Bad Request","detail":"pipeline_id is invalid"}"#,
        )
        .expect_err("400 should fail");
        assert_eq!(
            error,
            TransportError::Status { status: 400, message: "pipeline_id is invalid".to_string() }
        );

        let error = decode_response(StatusCode::BAD_REQUEST, br#"{"title":"Bad Request"}"#)
            .expect_err("400 should fail");
        assert_eq!(
            error,
            TransportError::Status { status: 400, message: "Bad Request".to_string() }
        );

        let error =
            decode_response(StatusCode::BAD_GATEWAY, b"<html>").expect_err("502 should fail");
        assert_eq!(
            error,
            TransportError::Status { status: 502, message: "Bad Gateway".to_string() }
        );
    }

    #[test]
    fn unauthorized_and_empty_bodies_are_classified() {
        assert_eq!(
            decode_response(StatusCode::UNAUTHORIZED, b"{}"),
            Err(TransportError::Unauthorized)
        );
        assert_eq!(decode_response(StatusCode::NO_CONTENT, b""), Ok(Value::Null));
        assert!(matches!(
            decode_response(StatusCode::OK, b"not json"),
            Err(TransportError::Decode(_))
        ));
    }

    async fn serve(router: Router) -> String {
        let listener =
            tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("listener should bind");
        let address = listener.local_addr().expect("local address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{address}")
    }

    #[tokio::test]
    async fn sends_bearer_credential_and_json_body() {
        let router = Router::new()
            .route(
                "/api/v4/contacts",
                get(|headers: HeaderMap| async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    Json(json!({"auth": auth}))
                }),
            )
            .route(
                "/api/v4/leads",
                post(|Json(body): Json<Value>| async move { Json(json!({"echo": body})) }),
            )
            .route("/api/v4/leads/1/notes", post(|| async { StatusCode::NO_CONTENT }))
            .route("/api/v4/companies", get(|| async { StatusCode::UNAUTHORIZED }));
        let base_url = serve(router).await;
        let transport = ReqwestCrmTransport::new(&format!("{base_url}/"), Duration::from_secs(5))
            .expect("client should build");
        let credential = SecretString::from("secret-token");

        let echoed = transport
            .send(&credential, CrmRequest::get("/api/v4/contacts?query=7999"))
            .await
            .expect("get should succeed");
        assert_eq!(echoed, json!({"auth": "Bearer secret-token"}));

        let echoed = transport
            .send(&credential, CrmRequest::post("/api/v4/leads", json!([{"name": "x"}])))
            .await
            .expect("post should succeed");
        assert_eq!(echoed, json!({"echo": [{"name": "x"}]}));

        let empty = transport
            .send(&credential, CrmRequest::post("/api/v4/leads/1/notes", json!([])))
            .await
            .expect("204 should succeed");
        assert_eq!(empty, Value::Null);

        let rejected = transport
            .send(&credential, CrmRequest::get("/api/v4/companies?query=Acme"))
            .await
            .expect_err("401 should fail");
        assert_eq!(rejected, TransportError::Unauthorized);
    }
}
