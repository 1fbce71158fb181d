use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Key under which browsers wrap the violation body.
pub const ENVELOPE_KEY: &str = "csp-report";

/// A `report-uri` style CSP violation report as sent by browsers.
///
/// Every field is optional on the wire; the accessors below turn missing and
/// empty values into the same thing so callers don't have to care. Only the
/// directive and blocked-uri must have the right type; any other field with
/// an unexpected type is read as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CspReport {
    #[serde(default, deserialize_with = "lenient_string")]
    pub document_uri: Option<String>,
    #[serde(default)]
    pub violated_directive: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub effective_directive: Option<String>,
    #[serde(default)]
    pub blocked_uri: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub referrer: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub source_file: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub line_number: Option<u64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub column_number: Option<u64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub original_policy: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub disposition: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub status_code: Option<u16>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub script_sample: Option<String>,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

/// Accepts integers, integral floats (`12.0`) and numeric strings (`"200"`).
fn lenient_number<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<u64>,
{
    let raw = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    Ok(raw.and_then(|n| T::try_from(n).ok()))
}

impl CspReport {
    pub fn directive(&self) -> &str {
        self.violated_directive.as_deref().unwrap_or_default()
    }

    pub fn blocked(&self) -> &str {
        self.blocked_uri.as_deref().unwrap_or_default()
    }

    pub fn document(&self) -> Option<&str> {
        non_empty(&self.document_uri)
    }

    pub fn referrer(&self) -> Option<&str> {
        non_empty(&self.referrer)
    }

    pub fn source(&self) -> Option<&str> {
        non_empty(&self.source_file)
    }

    /// Line number, treating `0` as absent (Firefox sends 0 when unknown).
    pub fn line(&self) -> Option<u64> {
        self.line_number.filter(|n| *n > 0)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
