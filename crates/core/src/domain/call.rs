use rust_decimal::Decimal;
use serde::Serialize;

/// Flat, typed view of one call-center webhook. Built once by
/// [`crate::normalize::normalize`] and only read afterwards.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NormalizedCallRecord {
    /// Phone as received (trimmed). Use [`Self::phone_digits`] for matching.
    pub phone: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub position: Option<String>,
    pub budget: Option<Decimal>,
    pub source: Option<String>,
    pub priority: Option<String>,
    pub region: Option<String>,
    pub tags: Vec<String>,
    pub record_url: Option<String>,
    pub agreements: Option<String>,
    pub agreements_time: Option<String>,
    pub call_duration_ms: Option<u64>,
    pub call_started_at: Option<String>,
    pub contact_rate: Option<String>,
    pub cval_rate: Option<String>,
    pub client_facts: Option<String>,
    pub transcript: Vec<TranscriptTurn>,
}

impl NormalizedCallRecord {
    pub fn phone_digits(&self) -> String {
        digits_only(&self.phone)
    }

    /// First present of `contact_rate` and `cval_rate`.
    pub fn interest(&self) -> Option<&str> {
        self.contact_rate.as_deref().or(self.cval_rate.as_deref())
    }

    /// Name used for the CRM contact: the caller's name, else the phone.
    pub fn contact_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.phone)
    }

    /// `"{company or name or phone} / {phone}"`.
    pub fn lead_name(&self) -> String {
        let title = self.company.as_deref().or(self.name.as_deref()).unwrap_or(&self.phone);
        format!("{title} / {}", self.phone)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    Client,
    Assistant,
}

impl TurnRole {
    /// Transcript roles other than `user` are attributed to the assistant.
    pub fn from_wire(raw: &str) -> Self {
        if raw == "user" {
            Self::Client
        } else {
            Self::Assistant
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TranscriptTurn {
    pub role: TurnRole,
    pub content: String,
}

pub fn digits_only(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

#[cfg(test)]
mod tests {
    use super::{digits_only, NormalizedCallRecord, TurnRole};

    fn record(phone: &str) -> NormalizedCallRecord {
        NormalizedCallRecord { phone: phone.to_owned(), ..NormalizedCallRecord::default() }
    }

    #[test]
    fn digits_only_strips_formatting() {
        assert_eq!(digits_only("+7 (999) 123-45-67"), "79991234567");
        assert_eq!(digits_only("no digits"), "");
    }

    #[test]
    fn lead_name_prefers_company_then_name_then_phone() {
        let mut data = record("+79991234567");
        assert_eq!(data.lead_name(), "+79991234567 / +79991234567");

        data.name = Some("Ivan".to_owned());
        assert_eq!(data.lead_name(), "Ivan / +79991234567");

        data.company = Some("Acme".to_owned());
        assert_eq!(data.lead_name(), "Acme / +79991234567");
    }

    #[test]
    fn interest_takes_contact_rate_before_cval_rate() {
        let mut data = record("1");
        data.cval_rate = Some("40".to_owned());
        assert_eq!(data.interest(), Some("40"));

        data.contact_rate = Some("75".to_owned());
        assert_eq!(data.interest(), Some("75"));

        data.contact_rate = Some("0".to_owned());
        assert_eq!(data.interest(), Some("0"));
    }

    #[test]
    fn only_user_role_maps_to_client() {
        assert_eq!(TurnRole::from_wire("user"), TurnRole::Client);
        assert_eq!(TurnRole::from_wire("assistant"), TurnRole::Assistant);
        assert_eq!(TurnRole::from_wire("system"), TurnRole::Assistant);
    }
}
