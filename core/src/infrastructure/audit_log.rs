// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Append-only JSONL audit log: one writer per process, size-based
//! rotation (rename, never truncate), age-based retention swept once per
//! day, and recursive string truncation so a single oversized field
//! can't blow out the log.
//!
//! Per §9's audit-writer discipline, writes here never suspend inside the
//! lease-critical section between `consume` and forward — callers hand
//! off a fully-built `AuditRecord` and this module owns serialization and
//! I/O behind a single mutex so line writes stay atomic even under
//! concurrent callers.

use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde_json::Value;

use crate::domain::audit::{AuditEventTag, AuditRecord};

const MAX_CONTENT_LENGTH: usize = 1000;

pub struct AuditLog {
    path: PathBuf,
    rotate_bytes: u64,
    retention_days: i64,
    state: Mutex<WriterState>,
}

struct WriterState {
    file: std::fs::File,
    last_retention_sweep: chrono::NaiveDate,
}

impl AuditLog {
    pub fn open(path: &Path, rotate_bytes: u64, retention_days: i64) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            rotate_bytes,
            retention_days,
            state: Mutex::new(WriterState {
                file,
                // Forces a retention sweep on the very first write.
                last_retention_sweep: chrono::NaiveDate::from_ymd_opt(1970, 1, 1).unwrap(),
            }),
        })
    }

    /// Writes one record. Failures are reported via `tracing` and
    /// swallowed — per §4.1/§7, audit I/O failures must never block a
    /// governance decision that has already been made.
    pub fn log(&self, mut record: AuditRecord) {
        for value in record.fields.values_mut() {
            truncate_strings(value);
        }

        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(err) => {
                tracing::error!(error = %err, "failed to serialize audit record");
                return;
            }
        };

        let mut state = self.state.lock();
        self.maybe_sweep_retention(&mut state);
        if let Err(err) = self.maybe_rotate(&mut state) {
            tracing::error!(error = %err, "audit log rotation failed");
        }
        if let Err(err) = writeln!(state.file, "{line}") {
            tracing::error!(error = %err, "audit log write failed");
        }
    }

    pub fn log_event(
        &self,
        event: AuditEventTag,
        session_id: Option<&str>,
        request_id: Option<&str>,
        fields: serde_json::Map<String, Value>,
    ) {
        self.log(AuditRecord::new(event, session_id, request_id, fields));
    }

    fn maybe_rotate(&self, state: &mut WriterState) -> std::io::Result<()> {
        let size = state.file.metadata()?.len();
        if size < self.rotate_bytes {
            return Ok(());
        }

        let timestamp = chrono::Utc::now().format("%Y%m%d%H%M%S");
        let mut counter = 0u32;
        let mut rotated_path;
        loop {
            rotated_path = if counter == 0 {
                self.path.with_extension(format!(
                    "{}.{}",
                    extension_or_empty(&self.path),
                    timestamp
                ))
            } else {
                self.path.with_extension(format!(
                    "{}.{}.{}",
                    extension_or_empty(&self.path),
                    timestamp,
                    counter
                ))
            };
            if !rotated_path.exists() {
                break;
            }
            counter += 1;
        }

        std::fs::rename(&self.path, &rotated_path)?;
        state.file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        Ok(())
    }

    fn maybe_sweep_retention(&self, state: &mut WriterState) {
        let today = chrono::Utc::now().date_naive();
        if state.last_retention_sweep == today {
            return;
        }
        state.last_retention_sweep = today;

        let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) else {
            return;
        };
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        let cutoff = chrono::Utc::now() - chrono::Duration::days(self.retention_days);
        for entry in entries.flatten() {
            let path = entry.path();
            if path == self.path {
                continue;
            }
            let Some(stem) = self.path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
                continue;
            };
            if !name.starts_with(stem) {
                continue;
            }
            if let Ok(meta) = entry.metadata() {
                if let Ok(modified) = meta.modified() {
                    let modified: chrono::DateTime<chrono::Utc> = modified.into();
                    if modified < cutoff {
                        let _ = std::fs::remove_file(&path);
                    }
                }
            }
        }
    }
}

fn extension_or_empty(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("jsonl")
        .to_string()
}

/// Recursively truncates string values exceeding `MAX_CONTENT_LENGTH`,
/// annotating the marker with the original length so the record stays
/// useful for an operator reconstructing what happened.
fn truncate_strings(value: &mut Value) {
    match value {
        Value::String(s) => {
            if s.chars().count() > MAX_CONTENT_LENGTH {
                let total = s.chars().count();
                let truncated: String = s.chars().take(MAX_CONTENT_LENGTH).collect();
                *s = format!("{truncated}... [truncated, {total} total chars]");
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                truncate_strings(item);
            }
        }
        Value::Object(map) => {
            for v in map.values_mut() {
                truncate_strings(v);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_one_json_line_per_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let log = AuditLog::open(&path, 10_000_000, 30).unwrap();

        log.log_event(AuditEventTag::ToolInvoked, Some("s1"), Some("r1"), serde_json::Map::new());
        log.log_event(AuditEventTag::BypassExecuted, Some("s1"), Some("r2"), serde_json::Map::new());

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "tool_invoked");
        assert_eq!(first["session_id"], "s1");
    }

    #[test]
    fn rotates_when_size_threshold_exceeded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let log = AuditLog::open(&path, 200, 30).unwrap();

        for _ in 0..20 {
            log.log_event(AuditEventTag::ToolInvoked, Some("s1"), None, serde_json::Map::new());
        }

        let rotated_exists = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.path() != path);
        assert!(rotated_exists, "expected at least one rotated sibling file");
    }

    #[test]
    fn truncates_long_strings_recursively() {
        let mut fields = serde_json::Map::new();
        let long = "x".repeat(1500);
        fields.insert("content".to_string(), Value::String(long.clone()));
        fields.insert(
            "nested".to_string(),
            serde_json::json!({ "inner": long }),
        );

        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let log = AuditLog::open(&path, 10_000_000, 30).unwrap();
        log.log_event(AuditEventTag::ToolInvoked, None, None, fields);

        let contents = std::fs::read_to_string(&path).unwrap();
        let record: Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        let content = record["content"].as_str().unwrap();
        assert!(content.contains("truncated, 1500 total chars"));
        let nested = record["nested"]["inner"].as_str().unwrap();
        assert!(nested.contains("truncated, 1500 total chars"));
    }
}
