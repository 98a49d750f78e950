//! Utility functions for filename derivation and collision resolution

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Maximum length of a podcast folder name
pub const MAX_FOLDERNAME_LENGTH: usize = 150;

/// Maximum length of an episode filename, extension excluded
pub const MAX_FILENAME_LENGTH: usize = 200;

/// Suffix of in-progress download files
pub const PARTIAL_SUFFIX: &str = ".partial";

static ILLEGAL_CHARS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"[/\\:*?"<>|\x00-\x1f\x7f]"#).ok());

/// Make a string safe to use as a file or folder name
///
/// Filesystem-illegal characters and control characters are removed, leading and
/// trailing dots and whitespace are stripped, and the result is truncated to
/// `max_len` bytes on a character boundary.
///
/// # Examples
///
/// ```
/// use podcast_dl::utils::sanitize_filename;
///
/// assert_eq!(sanitize_filename("  ..Episode 1: Pilot?. ", 150), "Episode 1 Pilot");
/// ```
pub fn sanitize_filename(name: &str, max_len: usize) -> String {
    let cleaned = match ILLEGAL_CHARS.as_ref() {
        Some(re) => re.replace_all(name, "").into_owned(),
        None => name
            .chars()
            .filter(|c| !c.is_control() && !r#"/\:*?"<>|"#.contains(*c))
            .collect(),
    };

    let trimmed = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    let truncated = truncate_on_char_boundary(trimmed, max_len);
    truncated
        .trim_end_matches(|c: char| c == '.' || c.is_whitespace())
        .to_string()
}

fn truncate_on_char_boundary(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Split a filename into stem and extension (extension keeps its leading dot)
///
/// Names whose only dot is the first character have no extension.
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx < name.len() - 1 => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    }
}

/// Pick a name that does not collide with `existing`
///
/// Candidates are `stem + ext`, then `stem (2) + ext`, `stem (3) + ext`, and so on.
/// The first candidate that equals `current` (the name already assigned to the
/// caller) or is absent from `existing` wins, so calling this again with an
/// unchanged desired name returns the name assigned last time.
///
/// # Examples
///
/// ```
/// use podcast_dl::utils::resolve_unique_name;
/// use std::collections::HashSet;
///
/// let taken: HashSet<String> = ["Show".to_string(), "Show (2)".to_string()].into();
/// assert_eq!(resolve_unique_name("Show", "", &taken, None), "Show (3)");
/// assert_eq!(resolve_unique_name("Show", "", &taken, Some("Show (2)")), "Show (2)");
/// assert_eq!(resolve_unique_name("Other", "", &taken, None), "Other");
/// ```
pub fn resolve_unique_name(
    stem: &str,
    ext: &str,
    existing: &HashSet<String>,
    current: Option<&str>,
) -> String {
    let mut candidate = format!("{stem}{ext}");
    let mut counter = 2u64;
    loop {
        if current == Some(candidate.as_str()) || !existing.contains(&candidate) {
            return candidate;
        }
        candidate = format!("{stem} ({counter}){ext}");
        counter += 1;
    }
}

/// Last path segment of a URL, percent-decoded
///
/// Returns None when the URL does not parse or ends in a slash.
pub fn filename_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    if last.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(last)
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| last.to_string());
    Some(decoded)
}

/// File extension (with leading dot) for a media MIME type
pub fn extension_from_mimetype(mime: &str) -> Option<&'static str> {
    let base = mime.split(';').next().unwrap_or(mime).trim();
    let ext = match base.to_ascii_lowercase().as_str() {
        "audio/mpeg" | "audio/mp3" | "audio/x-mpeg" => ".mp3",
        "audio/mp4" | "audio/x-m4a" | "audio/m4a" => ".m4a",
        "audio/aac" | "audio/x-aac" => ".aac",
        "audio/ogg" | "application/ogg" => ".ogg",
        "audio/opus" => ".opus",
        "audio/flac" | "audio/x-flac" => ".flac",
        "audio/x-wav" | "audio/wav" => ".wav",
        "video/mp4" => ".mp4",
        "video/x-m4v" => ".m4v",
        "video/webm" => ".webm",
        "video/quicktime" => ".mov",
        "application/pdf" => ".pdf",
        _ => return None,
    };
    Some(ext)
}

/// Hex MD5 digest of a URL, used for legacy filenames and as a last-resort folder name
pub fn url_digest(url: &str) -> String {
    format!("{:x}", md5::compute(url.as_bytes()))
}
