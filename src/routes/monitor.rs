//! Monitoring endpoint: `GET /?mode=<mode>`.
//!
//! Resolves the mode, runs the probe through the governor and renders the
//! outcome as a plain-text report:
//! - 200: probe exited 0
//! - 500: probe exited non-zero, could not be started, or an internal failure
//! - 503: no probe slot available
//! - 504: probe exceeded its time budget

use std::fmt::Write as _;
use std::time::Duration;

use axum::{
    extract::{Extension, Query, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
};

use crate::config::{CONTENT_TYPE_TEXT, REPORT_HEADER_PREFIX};
use crate::error::AppError;
use crate::middleware::RequestId;
use crate::probe::{ProbeMode, ProbeResult};
use crate::state::AppState;

/// Run a health check for the requested mode.
///
/// Query parameters are collected as raw pairs so that malformed or repeated
/// parameters never reject the request; the first `mode` wins.
pub async fn run(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let raw_mode = params
        .iter()
        .find(|(key, _)| key == "mode")
        .map(|(_, value)| value.as_str());
    let mode = ProbeMode::resolve(raw_mode);
    tracing::Span::current().record("mode", mode.as_str());
    tracing::info!(%mode, "Executing health check");

    let result = state.probe.run(mode).await.map_err(|e| {
        tracing::warn!(request_id = %request_id.0, %mode, error = %e, "Health check not run");
        AppError::from(e)
    })?;

    let (status, body) = if result.timed_out {
        (
            StatusCode::GATEWAY_TIMEOUT,
            render_timeout(state.config.probe.timeout(), &result),
        )
    } else if result.succeeded() {
        (StatusCode::OK, render_report(mode, &result))
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, render_report(mode, &result))
    };

    Ok((status, [(CONTENT_TYPE, CONTENT_TYPE_TEXT)], body).into_response())
}

/// Full report for a probe that ran to completion.
///
/// The header names the resolved mode, never the raw query value, so an
/// unknown or hostile `mode` is reported as `all`.
pub fn render_report(mode: ProbeMode, result: &ProbeResult) -> String {
    let exit_code = result
        .exit_code
        .map(|code| code.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    format!(
        "{prefix}{mode}\n\nExit Code: {exit_code}\n\nSTDOUT:\n{stdout}{stdout_note}\n\nSTDERR:\n{stderr}{stderr_note}\n",
        prefix = REPORT_HEADER_PREFIX,
        stdout = result.stdout,
        stdout_note = truncation_note(result.stdout_truncated, result.stdout.len()),
        stderr = result.stderr,
        stderr_note = truncation_note(result.stderr_truncated, result.stderr.len()),
    )
}

/// Timeout message followed by whatever the probe printed before it was killed.
pub fn render_timeout(timeout: Duration, result: &ProbeResult) -> String {
    let mut body = format!("Health check timed out after {}", describe_duration(timeout));

    if !result.stdout.is_empty() || !result.stderr.is_empty() {
        let _ = write!(
            body,
            "\n\nPartial STDOUT:\n{}{}\n\nPartial STDERR:\n{}{}\n",
            result.stdout,
            truncation_note(result.stdout_truncated, result.stdout.len()),
            result.stderr,
            truncation_note(result.stderr_truncated, result.stderr.len()),
        );
    }

    body
}

fn truncation_note(truncated: bool, kept: usize) -> String {
    if truncated {
        format!("\n[output truncated after {} bytes]", kept)
    } else {
        String::new()
    }
}

fn describe_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    match secs {
        0 => format!("{} milliseconds", duration.as_millis()),
        60 => "1 minute".to_string(),
        s if s % 60 == 0 => format!("{} minutes", s / 60),
        1 => "1 second".to_string(),
        s => format!("{} seconds", s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(exit_code: Option<i32>, stdout: &str, stderr: &str) -> ProbeResult {
        ProbeResult {
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            stdout_truncated: false,
            stderr_truncated: false,
            timed_out: exit_code.is_none(),
            duration_ms: 12,
        }
    }

    #[test]
    fn test_render_report_layout() {
        let body = render_report(ProbeMode::Heap, &result(Some(0), "OK\n", ""));
        assert_eq!(
            body,
            "Elasticsearch Monitoring - Mode: heap\n\nExit Code: 0\n\nSTDOUT:\nOK\n\n\nSTDERR:\n\n"
        );
    }

    #[test]
    fn test_render_report_keeps_output_verbatim() {
        let stdout = "line one\n  indented\t<tag> & $VAR\n";
        let body = render_report(ProbeMode::Cluster, &result(Some(2), stdout, "disk full"));
        assert!(body.contains(stdout));
        assert!(body.contains("Exit Code: 2"));
        assert!(body.contains("STDERR:\ndisk full\n"));
    }

    #[test]
    fn test_render_report_marks_truncation() {
        let mut res = result(Some(0), "abcd", "");
        res.stdout_truncated = true;
        let body = render_report(ProbeMode::All, &res);
        assert!(body.contains("abcd\n[output truncated after 4 bytes]"));
    }

    #[test]
    fn test_render_timeout_without_output() {
        let body = render_timeout(Duration::from_secs(240), &result(None, "", ""));
        assert_eq!(body, "Health check timed out after 4 minutes");
    }

    #[test]
    fn test_render_timeout_with_partial_output() {
        let body = render_timeout(Duration::from_secs(5), &result(None, "checking cluster\n", ""));
        assert!(body.starts_with("Health check timed out after 5 seconds"));
        assert!(body.contains("Partial STDOUT:\nchecking cluster\n"));
    }

    #[test]
    fn test_describe_duration() {
        assert_eq!(describe_duration(Duration::from_millis(300)), "300 milliseconds");
        assert_eq!(describe_duration(Duration::from_secs(1)), "1 second");
        assert_eq!(describe_duration(Duration::from_secs(90)), "90 seconds");
        assert_eq!(describe_duration(Duration::from_secs(60)), "1 minute");
        assert_eq!(describe_duration(Duration::from_secs(240)), "4 minutes");
    }
}
