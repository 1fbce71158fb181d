//! Noise filter for incoming violation reports.
//!
//! Most CSP reports are caused by images, browser extensions or injected
//! `eval` shims and say nothing about the site itself. Everything matching one
//! of the rules below is dropped before the dispatcher sees it.

use crate::report::{CspReport, ENVELOPE_KEY};
use serde_json::Value;
use std::fmt;
use tracing::info;

const LOW_VALUE_DIRECTIVE_PREFIXES: &[&str] = &["img-src", "media-src"];
const SENTINEL_BLOCKED_URIS: &[&str] = &["eval", "about", "about:blank", "about:srcdoc"];
const EXTENSION_SCHEMES: &[&str] = &["chrome-extension://", "moz-extension://"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    MissingEnvelope,
    MalformedReport,
    LowValueDirective,
    EmptyBlockedUri,
    SentinelBlockedUri,
    BrowserExtension,
    MissingContext,
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            IgnoreReason::MissingEnvelope => "missing csp-report envelope",
            IgnoreReason::MalformedReport => "malformed report",
            IgnoreReason::LowValueDirective => "low-value directive",
            IgnoreReason::EmptyBlockedUri => "empty blocked-uri",
            IgnoreReason::SentinelBlockedUri => "non-actionable blocked-uri",
            IgnoreReason::BrowserExtension => "browser extension",
            IgnoreReason::MissingContext => "missing source-file or document-uri",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Ignore {
        reason: IgnoreReason,
        directive: String,
        blocked_uri: String,
    },
    Signal(CspReport),
}

impl Verdict {
    pub fn is_signal(&self) -> bool {
        matches!(self, Verdict::Signal(_))
    }

    fn ignore(reason: IgnoreReason, report: Option<&CspReport>) -> Self {
        Verdict::Ignore {
            reason,
            directive: report.map(|r| r.directive().to_string()).unwrap_or_default(),
            blocked_uri: report.map(|r| r.blocked().to_string()).unwrap_or_default(),
        }
    }
}

/// Decide whether a parsed request body is worth alerting on.
pub fn classify(payload: Option<&Value>) -> Verdict {
    let Some(inner) = payload
        .and_then(|p| p.as_object())
        .and_then(|o| o.get(ENVELOPE_KEY))
    else {
        return Verdict::ignore(IgnoreReason::MissingEnvelope, None);
    };
    if !inner.is_object() {
        return Verdict::ignore(IgnoreReason::MalformedReport, None);
    }
    let report: CspReport = match serde_json::from_value(inner.clone()) {
        Ok(r) => r,
        Err(_) => return Verdict::ignore(IgnoreReason::MalformedReport, None),
    };

    match ignore_reason(&report) {
        Some(reason) => Verdict::ignore(reason, Some(&report)),
        None => Verdict::Signal(report),
    }
}

fn ignore_reason(report: &CspReport) -> Option<IgnoreReason> {
    // Directive names and URI schemes are case-insensitive.
    let directive = report.directive().trim_start().to_ascii_lowercase();
    let blocked = report.blocked().trim().to_ascii_lowercase();

    if LOW_VALUE_DIRECTIVE_PREFIXES
        .iter()
        .any(|p| directive.starts_with(p))
    {
        return Some(IgnoreReason::LowValueDirective);
    }
    if blocked.is_empty() {
        return Some(IgnoreReason::EmptyBlockedUri);
    }
    if SENTINEL_BLOCKED_URIS.contains(&blocked.as_str()) {
        return Some(IgnoreReason::SentinelBlockedUri);
    }
    if is_extension_uri(&blocked) {
        return Some(IgnoreReason::BrowserExtension);
    }
    if report.source().is_none() || report.document().is_none() {
        return Some(IgnoreReason::MissingContext);
    }
    None
}

pub fn is_extension_uri(uri: &str) -> bool {
    let uri = uri.trim_start().to_ascii_lowercase();
    EXTENSION_SCHEMES.iter().any(|s| uri.starts_with(s))
}

/// Emit the diagnostic record for a decision.
pub fn log_verdict(verdict: &Verdict) {
    match verdict {
        Verdict::Ignore {
            reason,
            directive,
            blocked_uri,
        } => info!(
            directive = %directive,
            blocked_uri = %blocked_uri,
            "Ignored CSP report: {}",
            reason
        ),
        Verdict::Signal(report) => info!(
            directive = %report.directive(),
            blocked_uri = %report.blocked(),
            referrer = ?report.referrer(),
            source = ?report.source(),
            line = ?report.line(),
            "CSP violation accepted"
        ),
    }
}
