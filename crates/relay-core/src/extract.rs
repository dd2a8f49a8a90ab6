//! Pull an 11-character video id out of free-form chat text.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").unwrap());
static EMBEDDED_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").unwrap());
static BARE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?-u:\b)([A-Za-z0-9_-]{11})(?-u:\b)").unwrap());

const HOSTS: [&str; 4] = ["youtube.com", "m.youtube.com", "youtu.be", "music.youtube.com"];

/// Returns the video id named by `text`, either through a YouTube link
/// (watch, youtu.be, shorts, live, embed, legacy `/v/`) or as a bare id.
pub fn extract_video_id(text: &str) -> Option<String> {
    let input = text.trim();
    let candidate = EMBEDDED_URL
        .find(input)
        .map(|m| m.as_str())
        .unwrap_or(input);

    if let Ok(url) = Url::parse(candidate)
        && let Some(id) = from_url(&url)
    {
        return Some(id);
    }

    BARE_ID
        .captures(candidate)
        .map(|caps| caps[1].to_string())
}

fn from_url(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    let host = host.strip_prefix("www.").unwrap_or(host);
    if !HOSTS.contains(&host) {
        return None;
    }

    if let Some((_, v)) = url.query_pairs().find(|(k, _)| k == "v")
        && ID.is_match(&v)
    {
        return Some(v.into_owned());
    }

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    let keyed = match segments.as_slice() {
        ["shorts" | "live" | "embed" | "v", id, ..] => Some(*id),
        _ => None,
    };
    let short = (host == "youtu.be").then(|| segments.first().copied()).flatten();

    for id in [keyed, short].into_iter().flatten() {
        if ID.is_match(id) {
            return Some(id.to_string());
        }
    }

    // Trailing junk glued onto the id, e.g. `/shorts/<id>extra`.
    let last = segments.last()?;
    let head = last.get(..11)?;
    ID.is_match(head).then(|| head.to_string())
}
