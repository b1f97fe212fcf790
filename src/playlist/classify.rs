//! Content classification: rewrite as a playlist, or pass through untouched.

use url::Url;

/// Decided once per upstream response, never revisited mid-stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentClass {
    Playlist,
    Passthrough,
}

impl ContentClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentClass::Playlist => "playlist",
            ContentClass::Passthrough => "passthrough",
        }
    }
}

const PLAYLIST_MIME_TYPES: [&str; 7] = [
    "application/vnd.apple.mpegurl",
    "application/x-mpegurl",
    "application/mpegurl",
    "audio/mpegurl",
    "audio/x-mpegurl",
    "video/mpegurl",
    "video/x-mpegurl",
];

/// Content types that say nothing about the payload. Only these defer to the
/// URL extension.
const GENERIC_MIME_TYPES: [&str; 6] = [
    "",
    "text/plain",
    "application/octet-stream",
    "binary/octet-stream",
    "application/binary",
    "application/unknown",
];

const PLAYLIST_EXTENSIONS: [&str; 2] = ["m3u8", "m3u"];

/// Classify a response by content type first, then by the target's file
/// extension. Anything uncertain passes through.
pub fn classify(content_type: Option<&str>, target: &Url) -> ContentClass {
    let essence = content_type.map(mime_essence).unwrap_or_default();

    if is_playlist_type(&essence) {
        return ContentClass::Playlist;
    }
    if GENERIC_MIME_TYPES.contains(&essence.as_str()) && has_playlist_extension(target) {
        return ContentClass::Playlist;
    }
    ContentClass::Passthrough
}

/// Whether a MIME essence (see [`mime_essence`]) names an HLS playlist.
pub fn is_playlist_type(essence: &str) -> bool {
    PLAYLIST_MIME_TYPES.contains(&essence)
}

/// `type/subtype` lower-cased, parameters dropped.
pub fn mime_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// The `charset` parameter of a content type, lower-cased and unquoted.
pub fn charset(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_ascii_lowercase())
    })
}

fn has_playlist_extension(target: &Url) -> bool {
    target
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|last| last.rsplit_once('.'))
        .map(|(_, ext)| {
            PLAYLIST_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}
