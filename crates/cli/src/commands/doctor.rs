use callbridge_core::config::{AppConfig, FieldConfig, LoadOptions};
use serde::Serialize;

use super::{escape_json, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report(AppConfig::load(LoadOptions::default()));
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\
                 \"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report<E: std::fmt::Display>(loaded: Result<AppConfig, E>) -> DoctorReport {
    let mut checks = Vec::new();

    match loaded {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_access_token(&config));
            checks.push(check_field_mapping(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["access_token_readiness", "field_mapping_readiness"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_access_token(config: &AppConfig) -> DoctorCheck {
    if config.has_access_token() {
        DoctorCheck {
            name: "access_token_readiness",
            status: CheckStatus::Pass,
            details: format!("access token configured for {}", config.amo.base_url),
        }
    } else {
        DoctorCheck {
            name: "access_token_readiness",
            status: CheckStatus::Fail,
            details: "no access token; set CALLBRIDGE_AMO_ACCESS_TOKEN (or AMO_ACCESS_TOKEN)"
                .to_string(),
        }
    }
}

/// Fields without a configured id are resolved by code on the first webhook, so a missing
/// id is reported but does not fail the check.
fn check_field_mapping(config: &AppConfig) -> DoctorCheck {
    let describe = |name: &str, field: &FieldConfig| match field.field_id {
        Some(id) => format!("{name}=#{id}"),
        None => format!("{name}=discover({})", field.code),
    };
    let fields = [
        describe("phone", &config.fields.phone),
        describe("email", &config.fields.email),
        describe("position", &config.fields.position),
    ];

    DoctorCheck {
        name: "field_mapping_readiness",
        status: CheckStatus::Pass,
        details: format!(
            "{}; lead placement pipeline #{} status #{}",
            fields.join(", "),
            config.lead.pipeline_id,
            config.lead.status_id
        ),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use callbridge_core::config::AppConfig;

    use super::{build_report, render_human, CheckStatus};

    #[test]
    fn missing_token_fails_the_report() {
        let report = build_report::<String>(Ok(AppConfig::default()));

        assert_eq!(report.overall_status, CheckStatus::Fail);
        assert_eq!(report.checks[1].name, "access_token_readiness");
        assert_eq!(report.checks[1].status, CheckStatus::Fail);
        assert_eq!(report.checks[2].status, CheckStatus::Pass);
        assert!(report.checks[2].details.contains("phone=discover(PHONE)"));
    }

    #[test]
    fn configured_token_and_ids_pass() {
        let mut config = AppConfig::default();
        config.amo.access_token = Some("token".to_string().into());
        config.fields.phone.field_id = Some(11);

        let report = build_report::<String>(Ok(config));

        assert_eq!(report.overall_status, CheckStatus::Pass);
        assert!(report.checks[2].details.contains("phone=#11"));
        assert!(render_human(&report).starts_with("doctor: all readiness checks passed"));
    }

    #[test]
    fn config_failure_skips_dependent_checks() {
        let report = build_report::<&str>(Err("amo.base_url must start with http://"));

        assert_eq!(report.overall_status, CheckStatus::Fail);
        assert_eq!(report.checks.len(), 3);
        assert!(report.checks[1..].iter().all(|check| check.status == CheckStatus::Skipped));
    }
}
