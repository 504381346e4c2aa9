use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub amo: AmoConfig,
    pub fields: FieldMappingConfig,
    pub lead: LeadConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct AmoConfig {
    pub base_url: String,
    pub access_token: Option<SecretString>,
    pub timeout_secs: u64,
}

/// Custom-field identifiers and enum tables for the contact fields the pipeline writes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldMappingConfig {
    pub phone: FieldConfig,
    pub email: FieldConfig,
    pub position: FieldConfig,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldConfig {
    /// `None` means the id is discovered from the CRM by `code`.
    pub field_id: Option<i64>,
    pub code: String,
    pub enums: BTreeMap<String, i64>,
    pub default_enum: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeadConfig {
    pub pipeline_id: i64,
    pub status_id: i64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub amo_base_url: Option<String>,
    pub amo_access_token: Option<String>,
    pub log_level: Option<String>,
    pub server_port: Option<u16>,
    pub phone_field_id: Option<i64>,
    pub email_field_id: Option<i64>,
    pub position_field_id: Option<i64>,
    pub lead_pipeline_id: Option<i64>,
    pub lead_status_id: Option<i64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for FieldMappingConfig {
    fn default() -> Self {
        Self {
            phone: FieldConfig {
                field_id: None,
                code: "PHONE".to_string(),
                enums: enum_table(&[
                    ("WORK", 1_322_665),
                    ("MOB", 1_322_669),
                    ("HOME", 1_322_673),
                    ("OTHER", 1_322_675),
                ]),
                default_enum: Some("WORK".to_string()),
            },
            email: FieldConfig {
                field_id: None,
                code: "EMAIL".to_string(),
                enums: enum_table(&[
                    ("WORK", 1_322_677),
                    ("PRIV", 1_322_679),
                    ("OTHER", 1_322_681),
                ]),
                default_enum: Some("WORK".to_string()),
            },
            position: FieldConfig {
                field_id: None,
                code: "POSITION".to_string(),
                enums: BTreeMap::new(),
                default_enum: None,
            },
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            amo: AmoConfig {
                base_url: "https://example.amocrm.ru".to_string(),
                access_token: None,
                timeout_secs: 30,
            },
            fields: FieldMappingConfig::default(),
            lead: LeadConfig { pipeline_id: 10_582_926, status_id: 83_463_326 },
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 3000,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn enum_table(entries: &[(&str, i64)]) -> BTreeMap<String, i64> {
    entries.iter().map(|(key, id)| ((*key).to_string(), *id)).collect()
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("callbridge.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn has_access_token(&self) -> bool {
        self.amo
            .access_token
            .as_ref()
            .map(|token| !token.expose_secret().trim().is_empty())
            .unwrap_or(false)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(amo) = patch.amo {
            if let Some(base_url) = amo.base_url {
                self.amo.base_url = base_url;
            }
            if let Some(access_token_value) = amo.access_token {
                self.amo.access_token = Some(secret_value(access_token_value));
            }
            if let Some(timeout_secs) = amo.timeout_secs {
                self.amo.timeout_secs = timeout_secs;
            }
        }

        if let Some(fields) = patch.fields {
            if let Some(phone) = fields.phone {
                phone.apply_to(&mut self.fields.phone);
            }
            if let Some(email) = fields.email {
                email.apply_to(&mut self.fields.email);
            }
            if let Some(position) = fields.position {
                position.apply_to(&mut self.fields.position);
            }
        }

        if let Some(lead) = patch.lead {
            if let Some(pipeline_id) = lead.pipeline_id {
                self.lead.pipeline_id = pipeline_id;
            }
            if let Some(status_id) = lead.status_id {
                self.lead.status_id = status_id;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env_any(&["CALLBRIDGE_AMO_BASE_URL", "AMO_DOMAIN"]) {
            self.amo.base_url = value;
        }
        if let Some(value) = read_env_any(&["CALLBRIDGE_AMO_ACCESS_TOKEN", "AMO_ACCESS_TOKEN"]) {
            self.amo.access_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("CALLBRIDGE_AMO_TIMEOUT_SECS") {
            self.amo.timeout_secs = parse_u64("CALLBRIDGE_AMO_TIMEOUT_SECS", &value)?;
        }

        for (keys, target) in [
            (["CALLBRIDGE_PHONE_FIELD_ID", "AMO_PHONE_FIELD_ID"], &mut self.fields.phone),
            (["CALLBRIDGE_EMAIL_FIELD_ID", "AMO_EMAIL_FIELD_ID"], &mut self.fields.email),
            (["CALLBRIDGE_POSITION_FIELD_ID", "AMO_POSITION_FIELD_ID"], &mut self.fields.position),
        ] {
            if let Some((key, value)) = read_env_any_keyed(&keys) {
                target.field_id = Some(parse_i64(key, &value)?);
            }
        }

        if let Some(value) = read_env("CALLBRIDGE_LEAD_PIPELINE_ID") {
            self.lead.pipeline_id = parse_i64("CALLBRIDGE_LEAD_PIPELINE_ID", &value)?;
        }
        if let Some(value) = read_env("CALLBRIDGE_LEAD_STATUS_ID") {
            self.lead.status_id = parse_i64("CALLBRIDGE_LEAD_STATUS_ID", &value)?;
        }

        if let Some(value) = read_env("CALLBRIDGE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some((key, value)) =
            read_env_any_keyed(&["CALLBRIDGE_SERVER_PORT", "INTERNAL_PORT", "PORT"])
        {
            self.server.port = parse_u16(key, &value)?;
        }
        if let Some(value) = read_env("CALLBRIDGE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("CALLBRIDGE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env_any(&["CALLBRIDGE_LOGGING_LEVEL", "CALLBRIDGE_LOG_LEVEL"]) {
            self.logging.level = value;
        }
        if let Some(value) = read_env_any(&["CALLBRIDGE_LOGGING_FORMAT", "CALLBRIDGE_LOG_FORMAT"])
        {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(base_url) = overrides.amo_base_url {
            self.amo.base_url = base_url;
        }
        if let Some(access_token) = overrides.amo_access_token {
            self.amo.access_token = Some(secret_value(access_token));
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(field_id) = overrides.phone_field_id {
            self.fields.phone.field_id = Some(field_id);
        }
        if let Some(field_id) = overrides.email_field_id {
            self.fields.email.field_id = Some(field_id);
        }
        if let Some(field_id) = overrides.position_field_id {
            self.fields.position.field_id = Some(field_id);
        }
        if let Some(pipeline_id) = overrides.lead_pipeline_id {
            self.lead.pipeline_id = pipeline_id;
        }
        if let Some(status_id) = overrides.lead_status_id {
            self.lead.status_id = status_id;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_amo(&self.amo)?;
        validate_fields(&self.fields)?;
        validate_lead(&self.lead)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("callbridge.toml"), PathBuf::from("config/callbridge.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_amo(amo: &AmoConfig) -> Result<(), ConfigError> {
    let base_url = amo.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "amo.base_url must start with http:// or https:// (e.g. https://yourteam.amocrm.ru)"
                .to_string(),
        ));
    }

    if amo.timeout_secs == 0 || amo.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "amo.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_fields(fields: &FieldMappingConfig) -> Result<(), ConfigError> {
    for (name, field) in
        [("phone", &fields.phone), ("email", &fields.email), ("position", &fields.position)]
    {
        if field.code.trim().is_empty() {
            return Err(ConfigError::Validation(format!("fields.{name}.code must not be empty")));
        }
        if matches!(field.field_id, Some(id) if id <= 0) {
            return Err(ConfigError::Validation(format!(
                "fields.{name}.field_id must be a positive amoCRM field id"
            )));
        }
        if let Some(default_enum) = &field.default_enum {
            if !field.enums.is_empty() && !field.enums.contains_key(default_enum) {
                return Err(ConfigError::Validation(format!(
                    "fields.{name}.default_enum `{default_enum}` is not present in \
                     fields.{name}.enums"
                )));
            }
        }
    }

    Ok(())
}

fn validate_lead(lead: &LeadConfig) -> Result<(), ConfigError> {
    if lead.pipeline_id <= 0 {
        return Err(ConfigError::Validation(
            "lead.pipeline_id must be a positive amoCRM pipeline id".to_string(),
        ));
    }
    if lead.status_id <= 0 {
        return Err(ConfigError::Validation(
            "lead.status_id must be a positive amoCRM status id".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn read_env_any(keys: &[&str]) -> Option<String> {
    read_env_any_keyed(keys).map(|(_, value)| value)
}

fn read_env_any_keyed<'a>(keys: &[&'a str]) -> Option<(&'a str, String)> {
    keys.iter().find_map(|key| read_env(key).map(|value| (*key, value)))
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_i64(key: &str, value: &str) -> Result<i64, ConfigError> {
    value.trim().parse::<i64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    amo: Option<AmoPatch>,
    fields: Option<FieldsPatch>,
    lead: Option<LeadPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct AmoPatch {
    base_url: Option<String>,
    access_token: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct FieldsPatch {
    phone: Option<FieldPatch>,
    email: Option<FieldPatch>,
    position: Option<FieldPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct FieldPatch {
    field_id: Option<i64>,
    code: Option<String>,
    enums: Option<BTreeMap<String, i64>>,
    default_enum: Option<String>,
}

impl FieldPatch {
    fn apply_to(self, field: &mut FieldConfig) {
        if let Some(field_id) = self.field_id {
            field.field_id = Some(field_id);
        }
        if let Some(code) = self.code {
            field.code = code;
        }
        if let Some(enums) = self.enums {
            field.enums = enums;
        }
        if let Some(default_enum) = self.default_enum {
            field.default_enum = Some(default_enum);
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct LeadPatch {
    pipeline_id: Option<i64>,
    status_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const TOUCHED_VARS: &[&str] = &[
        "CALLBRIDGE_AMO_BASE_URL",
        "AMO_DOMAIN",
        "CALLBRIDGE_AMO_ACCESS_TOKEN",
        "AMO_ACCESS_TOKEN",
        "CALLBRIDGE_PHONE_FIELD_ID",
        "AMO_PHONE_FIELD_ID",
        "CALLBRIDGE_SERVER_PORT",
        "INTERNAL_PORT",
        "PORT",
        "CALLBRIDGE_LOG_LEVEL",
        "CALLBRIDGE_LOG_FORMAT",
        "TEST_AMO_TOKEN",
    ];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_load_without_access_token() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(TOUCHED_VARS);

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(!config.has_access_token(), "no token should be configured by default")?;
        ensure(config.fields.phone.field_id.is_none(), "phone field id should be discovered")?;
        ensure(config.fields.phone.code == "PHONE", "phone discovery code should default")?;
        ensure(config.lead.pipeline_id == 10_582_926, "default pipeline id should be set")?;
        ensure(config.server.port == 3000, "default port should be 3000")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(TOUCHED_VARS);

        env::set_var("TEST_AMO_TOKEN", "token-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("callbridge.toml");
            fs::write(
                &path,
                r#"
[amo]
base_url = "https://acme.amocrm.ru"
access_token = "${TEST_AMO_TOKEN}"

[fields.phone]
field_id = 501
enums = { WORK = 11, MOB = 12 }
default_enum = "MOB"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.amo.access_token.as_ref().map(|t| t.expose_secret().to_string())
                    == Some("token-from-env".to_string()),
                "access token should be interpolated from environment",
            )?;
            ensure(config.amo.base_url == "https://acme.amocrm.ru", "base url from file")?;
            ensure(config.fields.phone.field_id == Some(501), "phone field id from file")?;
            ensure(
                config.fields.phone.default_enum.as_deref() == Some("MOB"),
                "phone default enum from file",
            )?;
            ensure(config.fields.email.code == "EMAIL", "untouched fields keep defaults")
        })();

        clear_vars(TOUCHED_VARS);
        result
    }

    #[test]
    fn legacy_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(TOUCHED_VARS);

        env::set_var("AMO_DOMAIN", "https://legacy.amocrm.ru");
        env::set_var("AMO_ACCESS_TOKEN", "legacy-token");
        env::set_var("AMO_PHONE_FIELD_ID", "777");
        env::set_var("PORT", "8088");
        env::set_var("CALLBRIDGE_LOG_LEVEL", "warn");
        env::set_var("CALLBRIDGE_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.amo.base_url == "https://legacy.amocrm.ru", "AMO_DOMAIN alias")?;
            ensure(config.has_access_token(), "AMO_ACCESS_TOKEN alias")?;
            ensure(config.fields.phone.field_id == Some(777), "AMO_PHONE_FIELD_ID alias")?;
            ensure(config.server.port == 8088, "PORT alias")?;
            ensure(config.logging.level == "warn", "log level alias")?;
            ensure(matches!(config.logging.format, LogFormat::Json), "log format alias")
        })();

        clear_vars(TOUCHED_VARS);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(TOUCHED_VARS);

        env::set_var("CALLBRIDGE_AMO_BASE_URL", "https://from-env.amocrm.ru");
        env::set_var("CALLBRIDGE_AMO_ACCESS_TOKEN", "env-token");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("callbridge.toml");
            fs::write(
                &path,
                r#"
[amo]
base_url = "https://from-file.amocrm.ru"
access_token = "file-token"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    amo_base_url: Some("https://from-override.amocrm.ru".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.amo.base_url == "https://from-override.amocrm.ru",
                "override base url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.amo.access_token.as_ref().map(|t| t.expose_secret().to_string())
                    == Some("env-token".to_string()),
                "env token should win over file and defaults",
            )
        })();

        clear_vars(TOUCHED_VARS);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(TOUCHED_VARS);

        env::set_var("CALLBRIDGE_AMO_BASE_URL", "acme.amocrm.ru");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("amo.base_url")
            );
            ensure(has_message, "validation failure should mention amo.base_url")
        })();

        clear_vars(TOUCHED_VARS);
        result
    }

    #[test]
    fn invalid_numeric_env_override_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(TOUCHED_VARS);

        env::set_var("CALLBRIDGE_PHONE_FIELD_ID", "not-a-number");

        let result = match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::InvalidEnvOverride { key, .. }) => {
                ensure(key == "CALLBRIDGE_PHONE_FIELD_ID", "error should name the env key")
            }
            Err(other) => Err(format!("unexpected error: {other}")),
            Ok(_) => Err("expected invalid env override".to_string()),
        };

        clear_vars(TOUCHED_VARS);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(TOUCHED_VARS);

        env::set_var("CALLBRIDGE_AMO_ACCESS_TOKEN", "super-secret-token-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("super-secret-token-value"),
                "debug output should not contain the access token",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )
        })();

        clear_vars(TOUCHED_VARS);
        result
    }
}
