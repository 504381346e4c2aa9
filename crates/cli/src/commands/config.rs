use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use callbridge_core::config::{AppConfig, FieldConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

struct ConfigSources {
    path: Option<PathBuf>,
    doc: Option<Value>,
}

impl ConfigSources {
    fn detect() -> Self {
        let path = detect_config_path();
        let doc = load_config_file_doc(path.as_deref());
        Self { path, doc }
    }

    /// First set env key wins, then the config file, then the built-in default.
    fn source(&self, key_path: &str, env_keys: &[&str]) -> String {
        if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
            return format!("env ({env_key})");
        }

        if let Some(doc) = &self.doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .path
                    .as_ref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }

    fn line(&self, key_path: &str, value: &str, env_keys: &[&str]) -> String {
        format!("- {key_path} = {value} (source: {})", self.source(key_path, env_keys))
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };
    let sources = ConfigSources::detect();

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(sources.line(
        "amo.base_url",
        &config.amo.base_url,
        &["CALLBRIDGE_AMO_BASE_URL", "AMO_DOMAIN"],
    ));
    let token = config
        .amo
        .access_token
        .as_ref()
        .map(|token| redact_token(token.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());
    lines.push(sources.line(
        "amo.access_token",
        &token,
        &["CALLBRIDGE_AMO_ACCESS_TOKEN", "AMO_ACCESS_TOKEN"],
    ));
    lines.push(sources.line(
        "amo.timeout_secs",
        &config.amo.timeout_secs.to_string(),
        &["CALLBRIDGE_AMO_TIMEOUT_SECS"],
    ));

    let fields = [
        ("phone", &config.fields.phone, ["CALLBRIDGE_PHONE_FIELD_ID", "AMO_PHONE_FIELD_ID"]),
        ("email", &config.fields.email, ["CALLBRIDGE_EMAIL_FIELD_ID", "AMO_EMAIL_FIELD_ID"]),
        (
            "position",
            &config.fields.position,
            ["CALLBRIDGE_POSITION_FIELD_ID", "AMO_POSITION_FIELD_ID"],
        ),
    ];
    for (name, field, env_keys) in fields {
        let field_id = render_field_id(field);
        lines.push(sources.line(&format!("fields.{name}.field_id"), &field_id, &env_keys));
        lines.push(sources.line(&format!("fields.{name}.code"), &field.code, &[]));
        lines.push(sources.line(
            &format!("fields.{name}.default_enum"),
            field.default_enum.as_deref().unwrap_or("<unset>"),
            &[],
        ));
    }

    lines.push(sources.line(
        "lead.pipeline_id",
        &config.lead.pipeline_id.to_string(),
        &["CALLBRIDGE_LEAD_PIPELINE_ID"],
    ));
    lines.push(sources.line(
        "lead.status_id",
        &config.lead.status_id.to_string(),
        &["CALLBRIDGE_LEAD_STATUS_ID"],
    ));

    lines.push(sources.line(
        "server.bind_address",
        &config.server.bind_address,
        &["CALLBRIDGE_SERVER_BIND_ADDRESS"],
    ));
    lines.push(sources.line(
        "server.port",
        &config.server.port.to_string(),
        &["CALLBRIDGE_SERVER_PORT", "INTERNAL_PORT", "PORT"],
    ));

    lines.push(sources.line(
        "logging.level",
        &config.logging.level,
        &["CALLBRIDGE_LOGGING_LEVEL", "CALLBRIDGE_LOG_LEVEL"],
    ));
    lines.push(sources.line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        &["CALLBRIDGE_LOGGING_FORMAT", "CALLBRIDGE_LOG_FORMAT"],
    ));

    lines.join("\n")
}

fn render_field_id(field: &FieldConfig) -> String {
    match field.field_id {
        Some(id) => id.to_string(),
        None => format!("<discover by code {}>", field.code),
    }
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("callbridge.toml"), PathBuf::from("config/callbridge.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

/// Keeps the last four characters of long tokens so operators can tell tokens apart.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    let chars: Vec<char> = trimmed.chars().collect();
    if chars.len() <= 12 {
        return "<redacted>".to_string();
    }

    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("***{tail}")
}
