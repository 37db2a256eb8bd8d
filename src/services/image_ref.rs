use std::sync::LazyLock;

use regex::Regex;

static FILE_PATH_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/file/d/([^/?#]+)").expect("file path pattern is valid"));
static QUERY_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]id=([^&#]+)").expect("id query pattern is valid"));
static BARE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{10,}$").expect("bare id pattern is valid"));

pub fn drive_file_id(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if let Some(found) = FILE_PATH_ID.captures(raw).and_then(|c| c.get(1)) {
        return Some(found.as_str().to_string());
    }
    if is_drive_host(raw)
        && let Some(found) = QUERY_ID.captures(raw).and_then(|c| c.get(1))
    {
        return Some(found.as_str().to_string());
    }
    BARE_ID.is_match(raw).then(|| raw.to_string())
}

pub fn direct_url(raw: &str) -> Option<String> {
    candidate_urls(raw).into_iter().next()
}

pub fn candidate_urls(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }

    if let Some(id) = drive_file_id(raw) {
        return vec![
            format!("https://lh3.googleusercontent.com/d/{id}=w1200"),
            format!("https://lh3.googleusercontent.com/u/0/d/{id}=w1200"),
            format!("https://lh3.googleusercontent.com/d/{id}"),
            format!("https://drive.google.com/uc?export=view&id={id}"),
            format!("https://drive.google.com/thumbnail?authuser=0&sz=w1200&id={id}"),
        ];
    }

    if raw.starts_with("http://") || raw.starts_with("https://") {
        return vec![raw.to_string()];
    }
    Vec::new()
}

fn is_drive_host(raw: &str) -> bool {
    raw.contains("drive.google.com") || raw.contains("docs.google.com")
}
