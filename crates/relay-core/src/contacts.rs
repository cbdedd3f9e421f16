use anyhow::Context;
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub phone: String,
    pub name: String,
}

/// Strips spacing and punctuation and forces a leading `+`.
/// Returns `None` unless the rest is ASCII digits.
pub fn normalise_phone(raw: &str) -> Option<String> {
    let digits: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();
    let rest = digits.strip_prefix('+').unwrap_or(&digits);
    if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(format!("+{rest}"))
}

fn split_fields(line: &str) -> Vec<String> {
    line.split(',')
        .map(|f| f.trim().trim_matches('"').trim().to_string())
        .collect()
}

/// Parses comma-separated contacts.
///
/// A first row containing a `phone` column is treated as a header and the
/// `phone`/`name` columns are read by position; otherwise column one is the
/// phone and column two the name. Invalid rows are skipped, repeated numbers
/// keep their first occurrence. Errors when nothing valid remains.
pub fn parse_contacts(data: &str) -> anyhow::Result<Vec<Contact>> {
    let data = data.strip_prefix('\u{feff}').unwrap_or(data);
    let mut lines = data.lines().peekable();

    let header = lines
        .peek()
        .map(|first| {
            split_fields(first)
                .iter()
                .map(|f| f.to_lowercase())
                .collect::<Vec<_>>()
        })
        .filter(|cols| cols.iter().any(|c| c == "phone"));

    let (phone_idx, name_idx) = match &header {
        Some(cols) => {
            lines.next();
            (
                cols.iter().position(|c| c == "phone").unwrap_or(0),
                cols.iter().position(|c| c == "name"),
            )
        }
        None => (0, Some(1)),
    };

    let mut seen = HashSet::new();
    let mut contacts = Vec::new();
    let mut skipped = 0usize;
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_fields(line);
        let raw_phone = fields.get(phone_idx).map(String::as_str).unwrap_or("");
        let Some(phone) = normalise_phone(raw_phone) else {
            warn!(raw = %raw_phone, "skipping invalid phone number");
            skipped += 1;
            continue;
        };
        if !seen.insert(phone.clone()) {
            continue;
        }
        let name = name_idx
            .and_then(|idx| fields.get(idx))
            .cloned()
            .unwrap_or_default();
        contacts.push(Contact { phone, name });
    }

    if skipped > 0 {
        info!(skipped, "invalid contact rows skipped");
    }
    if contacts.is_empty() {
        anyhow::bail!("no valid contacts found");
    }
    Ok(contacts)
}

pub async fn read_contacts(path: &Path) -> anyhow::Result<Vec<Contact>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("read contacts {}", path.display()))?;
    let contacts = parse_contacts(&raw)?;
    info!(count = contacts.len(), path = %path.display(), "contacts loaded");
    Ok(contacts)
}
