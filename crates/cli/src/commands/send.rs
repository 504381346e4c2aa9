use std::fs;
use std::path::Path;
use std::time::Duration;

use callbridge_core::config::{AppConfig, LoadOptions};
use serde_json::{json, Value};

use super::CommandResult;

const COMMAND: &str = "send";

/// Posts the payload in `file` to `url`, or to the configured local server's `/webhook`.
pub fn run(file: &Path, url: Option<&str>) -> CommandResult {
    let raw = match fs::read_to_string(file) {
        Ok(raw) => raw,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "payload_unreadable",
                format!("could not read `{}`: {error}", file.display()),
                2,
            );
        }
    };
    let payload: Value = match serde_json::from_str(&raw) {
        Ok(payload) => payload,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "payload_invalid",
                format!("`{}` is not valid JSON: {error}", file.display()),
                2,
            );
        }
    };

    let url = match url {
        Some(url) => url.to_string(),
        None => match AppConfig::load(LoadOptions::default()) {
            Ok(config) => default_webhook_url(&config),
            Err(error) => {
                return CommandResult::failure(
                    COMMAND,
                    "config_validation",
                    format!("config validation failed: {error}"),
                    2,
                );
            }
        },
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                1,
            );
        }
    };

    match runtime.block_on(post_payload(&url, &payload)) {
        Ok((status, body)) => outcome(&url, status, body),
        Err(error) => CommandResult::failure_with_details(
            COMMAND,
            "server_unreachable",
            format!("could not reach {url}: {error}"),
            4,
            Some(json!({ "url": url })),
        ),
    }
}

fn default_webhook_url(config: &AppConfig) -> String {
    let host = match config.server.bind_address.as_str() {
        "0.0.0.0" | "::" | "" => "127.0.0.1",
        other => other,
    };
    format!("http://{host}:{}/webhook", config.server.port)
}

async fn post_payload(url: &str, payload: &Value) -> Result<(u16, Value), reqwest::Error> {
    let client = reqwest::Client::builder().timeout(Duration::from_secs(30)).build()?;
    let response = client.post(url).json(payload).send().await?;
    let status = response.status().as_u16();
    let text = response.text().await?;
    let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
    Ok((status, body))
}

fn outcome(url: &str, status: u16, body: Value) -> CommandResult {
    let details = Some(json!({ "url": url, "http_status": status, "response": body }));
    if (200..300).contains(&status) {
        let message = format!("webhook accepted (HTTP {status})");
        CommandResult::success_with_details(COMMAND, message, details)
    } else {
        let reason = body.get("error").and_then(Value::as_str).unwrap_or("no error message");
        CommandResult::failure_with_details(
            COMMAND,
            "webhook_rejected",
            format!("webhook rejected (HTTP {status}): {reason}"),
            3,
            details,
        )
    }
}

#[cfg(test)]
mod tests {
    use callbridge_core::config::AppConfig;
    use serde_json::{json, Value};

    use super::{default_webhook_url, outcome};

    #[test]
    fn default_url_targets_loopback_for_wildcard_binds() {
        let mut config = AppConfig::default();
        assert_eq!(default_webhook_url(&config), "http://127.0.0.1:3000/webhook");

        config.server.bind_address = "10.0.0.5".to_string();
        config.server.port = 8080;
        assert_eq!(default_webhook_url(&config), "http://10.0.0.5:8080/webhook");
    }

    #[test]
    fn rejected_webhook_reports_server_error_message() {
        let result = outcome("http://x/webhook", 400, json!({"error": "phone required"}));
        let payload: Value = serde_json::from_str(&result.output).expect("json output");

        assert_eq!(result.exit_code, 3);
        assert_eq!(payload["error_class"], "webhook_rejected");
        assert!(payload["message"].as_str().unwrap_or_default().contains("phone required"));
        assert_eq!(payload["details"]["http_status"], 400);
    }

    #[test]
    fn accepted_webhook_echoes_entity_ids() {
        let result =
            outcome("http://x/webhook", 200, json!({"success": true, "contactId": 1, "leadId": 2}));
        let payload: Value = serde_json::from_str(&result.output).expect("json output");

        assert_eq!(result.exit_code, 0);
        assert_eq!(payload["details"]["response"]["leadId"], 2);
    }
}
