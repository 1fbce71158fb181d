use crate::report::CspReport;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_TOPIC_URL: &str = "https://ntfy.neteng.pro/csp-alerts";

const TITLE_HEADER: &str = "X-Title";
const PRIORITY_HEADER: &str = "X-Priority";
const PLACEHOLDER: &str = "N/A";

/// ntfy message priority, 1 (min) to 5 (max).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Min = 1,
    Low = 2,
    Default = 3,
    High = 4,
    Max = 5,
}

impl Priority {
    pub fn as_header(self) -> &'static str {
        match self {
            Priority::Min => "1",
            Priority::Low => "2",
            Priority::Default => "3",
            Priority::High => "4",
            Priority::Max => "5",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_header())
    }
}

/// Base directive family used for titles and priority.
///
/// `"script-src 'self' https:"` -> `"script-src"`, and CSP3 sub-directives
/// such as `script-src-elem` fold into their parent.
pub fn directive_key(directive: &str) -> String {
    let first = directive
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_lowercase();
    for suffix in ["-elem", "-attr"] {
        if let Some(base) = first.strip_suffix(suffix) {
            if base.ends_with("-src") {
                return base.to_string();
            }
        }
    }
    first
}

pub fn priority_for(directive_key: &str) -> Priority {
    match directive_key {
        "script-src" | "form-action" | "frame-ancestors" | "base-uri" => Priority::Max,
        "style-src" | "connect-src" => Priority::Default,
        _ => Priority::Low,
    }
}

/// Everything needed to publish one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub title: String,
    pub priority: Priority,
    pub message: String,
}

pub fn build_alert(directive: &str, blocked_uri: &str, report: &CspReport) -> Alert {
    let key = directive_key(directive);
    let line = report
        .line()
        .map(|n| n.to_string())
        .unwrap_or_else(|| PLACEHOLDER.to_string());
    let message = [
        "🚨 CSP Violation Detected".to_string(),
        format!("Directive: {}", directive),
        format!("Blocked URI: {}", blocked_uri),
        format!("Referrer: {}", report.referrer().unwrap_or(PLACEHOLDER)),
        format!("Source: {}", report.source().unwrap_or(PLACEHOLDER)),
        format!("Line: {}", line),
    ]
    .join("\n");

    Alert {
        title: format!(
            "CSP Violation: {} -> {}",
            key,
            urlencoding::encode(blocked_uri)
        ),
        priority: priority_for(&key),
        message,
    }
}

#[async_trait]
pub trait NtfyApi: Send + Sync {
    async fn publish(&self, alert: &Alert) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct NtfyClient {
    client: Client,
    topic_url: String,
}

impl NtfyClient {
    pub fn new(topic_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build ntfy HTTP client")?;
        Ok(Self {
            client,
            topic_url: topic_url.into(),
        })
    }

    pub fn topic_url(&self) -> &str {
        &self.topic_url
    }
}

#[async_trait]
impl NtfyApi for NtfyClient {
    async fn publish(&self, alert: &Alert) -> Result<()> {
        let resp = self
            .client
            .post(&self.topic_url)
            .header(header::CONTENT_TYPE, "text/plain")
            .header(TITLE_HEADER, &alert.title)
            .header(PRIORITY_HEADER, alert.priority.as_header())
            .body(alert.message.clone())
            .send()
            .await
            .with_context(|| format!("ntfy request to {} failed", self.topic_url))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("ntfy returned {}: {}", status, body));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_key_takes_first_token_lowercased() {
        assert_eq!(directive_key("script-src"), "script-src");
        assert_eq!(directive_key("Script-Src 'self' https:"), "script-src");
        assert_eq!(directive_key("script-src-elem"), "script-src");
        assert_eq!(directive_key("style-src-attr 'none'"), "style-src");
        assert_eq!(directive_key("frame-ancestors"), "frame-ancestors");
        assert_eq!(directive_key(""), "");
    }

    #[test]
    fn priority_tiers() {
        for d in ["script-src", "form-action", "frame-ancestors", "base-uri"] {
            assert_eq!(priority_for(d), Priority::Max, "{d}");
        }
        assert_eq!(priority_for("style-src"), Priority::Default);
        assert_eq!(priority_for("connect-src"), Priority::Default);
        assert_eq!(priority_for("worker-src"), Priority::Low);
        assert_eq!(priority_for(""), Priority::Low);
        assert_eq!(Priority::Max.as_header(), "5");
        assert_eq!(Priority::Low.to_string(), "2");
    }

    #[test]
    fn script_src_elem_is_max_priority() {
        let alert = build_alert("script-src-elem", "https://x", &CspReport::default());
        assert_eq!(alert.priority, Priority::Max);
    }

    #[test]
    fn alert_message_uses_placeholders() {
        let report = CspReport {
            source_file: Some("https://example.com/app.js".to_string()),
            line_number: Some(7),
            ..Default::default()
        };
        let alert = build_alert("script-src 'self'", "https://evil.example/a b.js", &report);
        assert_eq!(
            alert.message,
            "🚨 CSP Violation Detected\n\
             Directive: script-src 'self'\n\
             Blocked URI: https://evil.example/a b.js\n\
             Referrer: N/A\n\
             Source: https://example.com/app.js\n\
             Line: 7"
        );
        assert_eq!(
            alert.title,
            "CSP Violation: script-src -> https%3A%2F%2Fevil.example%2Fa%20b.js"
        );
        assert_eq!(alert.priority, Priority::Max);
    }

    #[test]
    fn absent_context_renders_placeholders() {
        let report = CspReport {
            referrer: Some("https://search.example/".to_string()),
            source_file: Some("".to_string()),
            line_number: Some(0),
            ..Default::default()
        };
        let alert = build_alert("style-src", "https://fonts.example/a.css", &report);
        let lines: Vec<&str> = alert.message.lines().collect();
        assert_eq!(
            lines[3..],
            [
                "Referrer: https://search.example/",
                "Source: N/A",
                "Line: N/A"
            ]
        );

        let bare = build_alert("style-src", "https://x", &CspReport::default());
        assert!(bare.message.ends_with("Referrer: N/A\nSource: N/A\nLine: N/A"));
    }

    #[test]
    fn title_is_ascii_for_header_use() {
        let alert = build_alert("connect-src", "wss://ünicode.example/ß", &CspReport::default());
        assert!(alert.title.is_ascii());
        assert_eq!(alert.priority, Priority::Default);
    }
}
