// Output interpretation for the remote CLI
// The CLI's stdout is the only contract we have; parse it defensively

use super::types::RemoteFileEntry;

/// True when CLI output signals a failure. The match is substring-based and
/// case-insensitive because the CLI does not use exit codes consistently.
pub fn output_indicates_failure(output: &str) -> bool {
    let lower = output.to_lowercase();
    lower.contains("error") || lower.contains("failed")
}

/// True when a create-folder invocation failed only because the folder is
/// already there, which callers treat as success.
pub fn output_indicates_already_exists(output: &str) -> bool {
    output.to_lowercase().contains("already exists")
}

/// Extract every `<digits>%` occurrence from a chunk of CLI output, clamped
/// to 100. The CLI's own reporting drives monotonicity; we only forward.
pub fn percents_in(text: &str) -> Vec<u8> {
    let mut percents = Vec::new();
    let mut digits = String::new();

    for ch in text.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
        } else {
            if ch == '%' && !digits.is_empty() {
                let value: u64 = digits.parse().unwrap_or(100);
                percents.push(value.min(100) as u8);
            }
            digits.clear();
        }
    }

    percents
}

/// Parse a directory listing. JSON output (array or single object) is tried
/// first; anything unparseable falls back to line-based parsing where
/// `name <digits> bytes` is a file and a trailing `/` marks a folder.
/// Lines matching neither shape are ignored.
pub fn parse_listing(output: &str, base_path: &str) -> Vec<RemoteFileEntry> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(output.trim()) {
        let objects = match value {
            serde_json::Value::Array(items) => items,
            obj @ serde_json::Value::Object(_) => vec![obj],
            _ => Vec::new(),
        };
        let entries: Vec<RemoteFileEntry> = objects
            .iter()
            .filter_map(|obj| entry_from_json(obj, base_path))
            .collect();
        if !entries.is_empty() {
            return entries;
        }
    }

    output
        .lines()
        .filter_map(|line| entry_from_line(line, base_path))
        .collect()
}

fn entry_from_json(value: &serde_json::Value, base_path: &str) -> Option<RemoteFileEntry> {
    let name = value.get("name")?.as_str()?.to_string();
    if name.is_empty() {
        return None;
    }

    let is_folder = value
        .get("isFolder")
        .and_then(|v| v.as_bool())
        .or_else(|| value.get("type").and_then(|v| v.as_str()).map(|t| t == "folder"))
        .unwrap_or(false);

    let size_bytes = value.get("size").and_then(|v| v.as_u64()).unwrap_or(0);

    let path = value
        .get("path")
        .and_then(|v| v.as_str())
        .map(|p| p.to_string())
        .unwrap_or_else(|| join_remote(base_path, &name));

    Some(RemoteFileEntry {
        name,
        path,
        size_bytes,
        is_folder,
    })
}

fn entry_from_line(line: &str, base_path: &str) -> Option<RemoteFileEntry> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(name) = trimmed.strip_suffix('/') {
        if name.is_empty() {
            return None;
        }
        return Some(RemoteFileEntry {
            name: name.to_string(),
            path: join_remote(base_path, name),
            size_bytes: 0,
            is_folder: true,
        });
    }

    // `name <digits> bytes`; the name itself may contain spaces
    let tokens: Vec<&str> = trimmed.split_whitespace().collect();
    if tokens.len() < 3 || *tokens.last().unwrap() != "bytes" {
        return None;
    }
    let size_bytes: u64 = tokens[tokens.len() - 2].parse().ok()?;
    let name = tokens[..tokens.len() - 2].join(" ");

    Some(RemoteFileEntry {
        name: name.clone(),
        path: join_remote(base_path, &name),
        size_bytes,
        is_folder: false,
    })
}

/// Join a remote base path and a child name with a single forward slash.
pub fn join_remote(base: &str, name: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.is_empty() {
        format!("/{}", name)
    } else {
        format!("{}/{}", base, name)
    }
}

/// Parent directory of a remote path, or "/" at the root.
pub fn remote_parent(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some(("", _)) | None => "/".to_string(),
        Some((parent, _)) => parent.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_remote() {
        assert_eq!(join_remote("/Backups/X", "a.txt"), "/Backups/X/a.txt");
        assert_eq!(join_remote("/", "a.txt"), "/a.txt");
        assert_eq!(join_remote("", "a.txt"), "/a.txt");
    }

    #[test]
    fn test_remote_parent() {
        assert_eq!(remote_parent("/Backups/X/a.txt"), "/Backups/X");
        assert_eq!(remote_parent("/a.txt"), "/");
        assert_eq!(remote_parent("a.txt"), "/");
    }
}
