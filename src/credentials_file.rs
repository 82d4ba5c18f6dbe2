// AWS shared credentials file writer

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fs;
use std::path::Path;

/// Role credentials to store under one profile
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub region: String,
    pub expiration: DateTime<Utc>,
}

impl ProfileCredentials {
    fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("aws_access_key_id", self.access_key_id.clone()),
            ("aws_secret_access_key", self.secret_access_key.clone()),
            ("aws_session_token", self.session_token.clone()),
            ("output", "json".to_string()),
            ("region", self.region.clone()),
            (
                "aws_expiration",
                self.expiration.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
        ]
    }
}

/// Write `credentials` into the `[profile]` section of the file at `path`,
/// keeping every other section, key and comment
pub fn write_profile(path: &Path, profile: &str, credentials: &ProfileCredentials) -> Result<()> {
    let existing = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()));
        }
    };

    let updated = upsert_section(&existing, profile, &credentials.entries());

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, updated).with_context(|| format!("Failed to write {}", path.display()))?;

    tracing::debug!("Updated profile [{}] in {}", profile, path.display());
    Ok(())
}

fn section_name(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .map(str::trim)
}

fn entry_key(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') || trimmed.starts_with(';') {
        return None;
    }
    trimmed.split_once('=').map(|(key, _)| key.trim())
}

/// Set `entries` in section `section` of INI text `content`
fn upsert_section(content: &str, section: &str, entries: &[(&str, String)]) -> String {
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();

    let start = lines
        .iter()
        .position(|line| section_name(line) == Some(section));

    let Some(start) = start else {
        while lines.last().is_some_and(|l| l.trim().is_empty()) {
            lines.pop();
        }
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.push(format!("[{}]", section));
        for (key, value) in entries {
            lines.push(format!("{} = {}", key, value));
        }
        return lines.join("\n") + "\n";
    };

    let end = lines[start + 1..]
        .iter()
        .position(|line| section_name(line).is_some())
        .map(|offset| start + 1 + offset)
        .unwrap_or(lines.len());

    let mut missing = Vec::new();
    for (key, value) in entries {
        let found = lines[start + 1..end]
            .iter()
            .position(|line| entry_key(line) == Some(*key));
        match found {
            Some(offset) => lines[start + 1 + offset] = format!("{} = {}", key, value),
            None => missing.push(format!("{} = {}", key, value)),
        }
    }

    // Append new keys after the last non-blank line of the section
    let mut insert_at = end;
    while insert_at > start + 1 && lines[insert_at - 1].trim().is_empty() {
        insert_at -= 1;
    }
    for (i, line) in missing.into_iter().enumerate() {
        lines.insert(insert_at + i, line);
    }

    lines.join("\n") + "\n"
}
