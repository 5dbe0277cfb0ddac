// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Best-effort HTML + JSON artifact rendering for an approval request
//! (§4.8.1). Artifact failures are never fatal to the approval itself —
//! callers log and continue without an artifact path.

use std::path::{Path, PathBuf};

use handlebars::Handlebars;
use thiserror::Error;

use crate::domain::approval::ApprovalRequest;
use crate::domain::path_sanitizer::{PathSanitizer, PathSanitizerError};

const SYSTEM_PATHS: &[&str] = &[
    "/", "/etc", "/usr", "/bin", "/sbin", "/sys", "/proc", "/dev", "/boot", "/root",
];
const MAX_ARTIFACT_FILES: usize = 500;
const MAX_ARTIFACT_BYTES: u64 = 1_000_000;

const HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html><head><title>Approval request {{request_id}}</title></head>
<body>
<h1>{{tool_name}}</h1>
<pre>{{message}}</pre>
<p>Required scopes: {{required_scopes}}</p>
</body></html>
"#;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact directory is a rejected system path: {0}")]
    SystemPath(String),
    #[error("resolved artifact path escapes the configured root")]
    EscapesRoot(#[from] PathSanitizerError),
    #[error("failed to render template: {0}")]
    Template(#[from] handlebars::RenderError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct ArtifactWriter {
    root: PathBuf,
    sanitizer: PathSanitizer,
    handlebars: Handlebars<'static>,
}

impl ArtifactWriter {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, ArtifactError> {
        let root = root.into();
        validate_root(&root)?;
        let mut handlebars = Handlebars::new();
        handlebars.register_template_string("approval_html", HTML_TEMPLATE)?;
        Ok(Self {
            root,
            sanitizer: PathSanitizer::new(),
            handlebars,
        })
    }

    /// Renders both artifacts for one request, pruning the oldest files
    /// first if the directory is over its file-count cap. Returns the
    /// JSON artifact path (the one the approval message links to) or an
    /// error the caller should log and otherwise ignore.
    pub fn render(&self, request: &ApprovalRequest) -> Result<PathBuf, ArtifactError> {
        std::fs::create_dir_all(&self.root)?;
        self.prune_if_over_cap()?;

        let json_path = self.resolve(&format!("{}.json", request.request_id))?;
        let html_path = self.resolve(&format!("{}.html", request.request_id))?;

        let json_body = serde_json::to_vec_pretty(request).unwrap_or_default();
        if (json_body.len() as u64) > MAX_ARTIFACT_BYTES {
            return Err(ArtifactError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "artifact exceeds the per-file size bound",
            )));
        }
        std::fs::write(&json_path, json_body)?;

        let html_body = self.handlebars.render(
            "approval_html",
            &serde_json::json!({
                "request_id": request.request_id,
                "tool_name": request.tool_name,
                "message": request.message,
                "required_scopes": request.required_scopes.join(", "),
            }),
        )?;
        std::fs::write(&html_path, html_body)?;

        Ok(json_path)
    }

    fn resolve(&self, filename: &str) -> Result<PathBuf, ArtifactError> {
        self.sanitizer.validate(filename)?;
        let candidate = self.root.join(filename);
        if !candidate.starts_with(&self.root) {
            return Err(ArtifactError::EscapesRoot(PathSanitizerError::OutsideBoundary(
                candidate.display().to_string(),
            )));
        }
        Ok(candidate)
    }

    fn prune_if_over_cap(&self) -> std::io::Result<()> {
        let mut entries: Vec<_> = std::fs::read_dir(&self.root)?
            .filter_map(|e| e.ok())
            .collect();
        if entries.len() <= MAX_ARTIFACT_FILES {
            return Ok(());
        }
        entries.sort_by_key(|e| {
            e.metadata()
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
        });
        for entry in entries.iter().take(entries.len() - MAX_ARTIFACT_FILES) {
            let _ = std::fs::remove_file(entry.path());
        }
        Ok(())
    }
}

fn validate_root(root: &Path) -> Result<(), ArtifactError> {
    let normalized = root.to_string_lossy().trim_end_matches('/').to_string();
    let normalized = if normalized.is_empty() { "/".to_string() } else { normalized };

    if normalized == "/var/tmp" || normalized == "/var/log" || normalized.starts_with("/var/tmp/") || normalized.starts_with("/var/log/") {
        return Ok(());
    }
    for sys in SYSTEM_PATHS {
        if &normalized == sys || normalized.starts_with(&format!("{sys}/")) {
            return Err(ArtifactError::SystemPath(normalized));
        }
    }
    if normalized == "/var" || normalized.starts_with("/var/") {
        return Err(ArtifactError::SystemPath(normalized));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_request(id: &str) -> ApprovalRequest {
        ApprovalRequest {
            request_id: id.to_string(),
            tool_name: "write_file".to_string(),
            message: "approve write_file?".to_string(),
            required_scopes: vec!["resource:path:/tmp/x".to_string()],
            artifact_path: None,
            timeout_seconds: 300,
            session_id: "session-1".to_string(),
            arguments: serde_json::json!({ "path": "/tmp/x" }),
            context_key: Some("/tmp/x".to_string()),
        }
    }

    #[test]
    fn rejects_system_paths() {
        assert!(matches!(validate_root(Path::new("/etc")), Err(ArtifactError::SystemPath(_))));
        assert!(matches!(validate_root(Path::new("/")), Err(ArtifactError::SystemPath(_))));
        assert!(matches!(validate_root(Path::new("/var/backups")), Err(ArtifactError::SystemPath(_))));
    }

    #[test]
    fn allows_var_tmp_and_var_log() {
        assert!(validate_root(Path::new("/var/tmp")).is_ok());
        assert!(validate_root(Path::new("/var/log")).is_ok());
    }

    #[test]
    fn renders_both_artifacts_within_root() {
        let dir = tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path()).unwrap();
        let request = sample_request("req-abc123");
        let json_path = writer.render(&request).unwrap();
        assert!(json_path.starts_with(dir.path()));
        assert!(json_path.exists());
        assert!(dir.path().join("req-abc123.html").exists());
    }
}
