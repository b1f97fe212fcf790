//! HLS playlist rewriting.
//!
//! Every sub-resource reference in a playlist is resolved against the
//! playlist's own URL and replaced with a proxy URL, so a player keeps
//! fetching through the proxy. Nothing else in the document changes: line
//! count, line endings, directive text and whitespace around references are
//! preserved byte for byte.
//!
//! The body is decoded with its declared charset (UTF-8 when none is
//! given) and written back in the same encoding, so bytes outside the
//! rewritten references come out unchanged.
//!
//! Any doubt about the input aborts the whole rewrite with a
//! [`RewriteError`]; callers then serve the original bytes.

use std::borrow::Cow;
use std::ops::Range;

use encoding_rs::{Encoding, UTF_8};
use url::Url;

use crate::routing::{AddressingMode, ProxyUrlEncoder};

const BOM: &str = "\u{feff}";
const HEADER_TAG: &str = "#EXTM3U";
const DIRECTIVE_PREFIX: &str = "#EXT";
const URI_ATTRIBUTE: &str = "URI";

/// Tags whose value is positional (`duration,title`, `length@offset`),
/// not an attribute list.
const POSITIONAL_TAGS: [&str; 2] = ["#EXTINF", "#EXT-X-BYTERANGE"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RewriteError {
    #[error("charset '{0}' is not supported for rewriting")]
    UnsupportedCharset(String),
    #[error("playlist body is not valid {0}")]
    Malformed(&'static str),
    #[error("rewritten playlist cannot be encoded as {0}")]
    Unencodable(&'static str),
    #[error("body does not start with #EXTM3U")]
    MissingHeader,
    #[error("line {line}: unterminated URI attribute")]
    MalformedDirective { line: usize },
    #[error("line {line}: cannot resolve reference '{reference}'")]
    UnresolvableReference { line: usize, reference: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Line<'a> {
    content: &'a str,
    /// `"\n"`, `"\r\n"`, `"\r"` or `""` for a final unterminated line.
    ending: &'a str,
}

/// A playlist split into lines, kept only for the duration of one rewrite.
#[derive(Debug)]
pub struct PlaylistDocument<'a> {
    bom: bool,
    lines: Vec<Line<'a>>,
    base_url: &'a Url,
}

impl<'a> PlaylistDocument<'a> {
    /// Split `text` into lines. Fails unless the first line is `#EXTM3U`.
    pub fn parse(text: &'a str, base_url: &'a Url) -> Result<Self, RewriteError> {
        let (bom, body) = match text.strip_prefix(BOM) {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let lines = split_lines(body);
        let header_ok = lines
            .first()
            .is_some_and(|line| line.content.trim().starts_with(HEADER_TAG));
        if !header_ok {
            return Err(RewriteError::MissingHeader);
        }
        Ok(Self {
            bom,
            lines,
            base_url,
        })
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn base_url(&self) -> &Url {
        self.base_url
    }

    /// Rebuild the document with every http(s) reference replaced by
    /// `map(absolute_reference)`.
    pub fn rewrite_with<F>(&self, mut map: F) -> Result<String, RewriteError>
    where
        F: FnMut(&Url) -> String,
    {
        let size: usize = self
            .lines
            .iter()
            .map(|l| l.content.len() + l.ending.len())
            .sum();
        let mut out = String::with_capacity(size + size / 2);
        if self.bom {
            out.push_str(BOM);
        }
        for (index, line) in self.lines.iter().enumerate() {
            self.rewrite_line(index + 1, line.content, &mut map, &mut out)?;
            out.push_str(line.ending);
        }
        Ok(out)
    }

    fn rewrite_line<F>(
        &self,
        number: usize,
        content: &str,
        map: &mut F,
        out: &mut String,
    ) -> Result<(), RewriteError>
    where
        F: FnMut(&Url) -> String,
    {
        let trimmed = content.trim();

        if trimmed.is_empty() {
            out.push_str(content);
            return Ok(());
        }

        if trimmed.starts_with('#') {
            if !trimmed.starts_with(DIRECTIVE_PREFIX) {
                // Comment.
                out.push_str(content);
                return Ok(());
            }
            let spans = uri_attribute_spans(content)
                .ok_or(RewriteError::MalformedDirective { line: number })?;
            let mut cursor = 0;
            for span in spans {
                out.push_str(&content[cursor..span.start]);
                out.push_str(&self.rewrite_reference(number, &content[span.clone()], map)?);
                cursor = span.end;
            }
            out.push_str(&content[cursor..]);
            return Ok(());
        }

        let start = content.len() - content.trim_start().len();
        let end = start + trimmed.len();
        out.push_str(&content[..start]);
        out.push_str(&self.rewrite_reference(number, trimmed, map)?);
        out.push_str(&content[end..]);
        Ok(())
    }

    fn rewrite_reference<F>(
        &self,
        number: usize,
        reference: &str,
        map: &mut F,
    ) -> Result<String, RewriteError>
    where
        F: FnMut(&Url) -> String,
    {
        let absolute =
            self.base_url
                .join(reference)
                .map_err(|_| RewriteError::UnresolvableReference {
                    line: number,
                    reference: reference.to_string(),
                })?;
        // skd://, data: and friends are not fetched over HTTP.
        if matches!(absolute.scheme(), "http" | "https") {
            Ok(map(&absolute))
        } else {
            Ok(reference.to_string())
        }
    }
}

fn split_lines(text: &str) -> Vec<Line<'_>> {
    let bytes = text.as_bytes();
    let mut lines = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        let end = match bytes[i] {
            b'\n' => i + 1,
            b'\r' if bytes.get(i + 1) == Some(&b'\n') => i + 2,
            b'\r' => i + 1,
            _ => {
                i += 1;
                continue;
            }
        };
        lines.push(Line {
            content: &text[start..i],
            ending: &text[i..end],
        });
        i = end;
        start = end;
    }
    if start < bytes.len() {
        lines.push(Line {
            content: &text[start..],
            ending: "",
        });
    }
    lines
}

/// Byte ranges of every non-empty quoted `URI="..."` value in a directive.
///
/// `None` when a `URI` value is missing its closing quote.
fn uri_attribute_spans(line: &str) -> Option<Vec<Range<usize>>> {
    let Some(colon) = line.find(':') else {
        return Some(Vec::new());
    };
    let tag = line[..colon].trim();
    if POSITIONAL_TAGS.iter().any(|t| tag.eq_ignore_ascii_case(t)) {
        return Some(Vec::new());
    }

    let bytes = line.as_bytes();
    let mut spans = Vec::new();
    let mut i = colon + 1;
    while i < bytes.len() {
        let key_start = i;
        while i < bytes.len() && bytes[i] != b'=' && bytes[i] != b',' {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }
        if bytes[i] == b',' {
            i += 1;
            continue;
        }
        let key = line[key_start..i].trim();
        let is_uri = key.eq_ignore_ascii_case(URI_ATTRIBUTE);
        i += 1;

        if bytes.get(i) == Some(&b'"') {
            let value_start = i + 1;
            let Some(offset) = line[value_start..].find('"') else {
                return if is_uri { None } else { Some(spans) };
            };
            let value_end = value_start + offset;
            if is_uri && !line[value_start..value_end].trim().is_empty() {
                spans.push(value_start..value_end);
            }
            i = value_end + 1;
        }

        while i < bytes.len() && bytes[i] != b',' {
            i += 1;
        }
        i += 1;
    }
    Some(spans)
}

/// Encoding named by `charset`, UTF-8 when the response declares none.
fn text_encoding(charset: Option<&str>) -> Result<&'static Encoding, RewriteError> {
    let Some(label) = charset else {
        return Ok(UTF_8);
    };
    match Encoding::for_label(label.as_bytes()) {
        // UTF-16 and the replacement encoding cannot be written back as themselves.
        Some(encoding) if encoding.output_encoding() == encoding => Ok(encoding),
        _ => Err(RewriteError::UnsupportedCharset(label.to_string())),
    }
}

fn decode_text<'b>(
    body: &'b [u8],
    encoding: &'static Encoding,
) -> Result<Cow<'b, str>, RewriteError> {
    encoding
        .decode_without_bom_handling_and_without_replacement(body)
        .ok_or(RewriteError::Malformed(encoding.name()))
}

fn encode_text(text: String, encoding: &'static Encoding) -> Result<Vec<u8>, RewriteError> {
    if encoding == UTF_8 {
        return Ok(text.into_bytes());
    }
    let (bytes, _, had_errors) = encoding.encode(&text);
    if had_errors {
        return Err(RewriteError::Unencodable(encoding.name()));
    }
    Ok(bytes.into_owned())
}

/// Rewrites playlist bodies into proxy URLs under one addressing mode.
#[derive(Debug, Clone, Copy)]
pub struct PlaylistRewriter<'a> {
    encoder: &'a ProxyUrlEncoder,
    mode: AddressingMode,
}

impl<'a> PlaylistRewriter<'a> {
    pub fn new(encoder: &'a ProxyUrlEncoder, mode: AddressingMode) -> Self {
        Self { encoder, mode }
    }

    /// Decode, parse and rewrite `body`, resolving references against
    /// `base_url` (the URL the playlist was actually served from). The
    /// result is encoded like the input.
    pub fn rewrite(
        &self,
        body: &[u8],
        charset: Option<&str>,
        base_url: &Url,
    ) -> Result<Vec<u8>, RewriteError> {
        let encoding = text_encoding(charset)?;
        let text = decode_text(body, encoding)?;
        let document = PlaylistDocument::parse(&text, base_url)?;
        let rewritten =
            document.rewrite_with(|absolute| self.encoder.encode(self.mode, absolute))?;
        encode_text(rewritten, encoding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyRouteConfig;
    use crate::routing::{resolve, ProxyRouter, RouteMatch};
    use crate::security::TargetPolicy;
    use axum::http::Uri;

    const MASTER: &str = "#EXTM3U\r\n\
#EXT-X-VERSION:6\r\n\
# generated by packager\r\n\
#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"aud\",NAME=\"English\",uri=\"audio/en.m3u8\"\r\n\
\r\n\
#EXT-X-STREAM-INF:BANDWIDTH=1280000,CODECS=\"avc1.4d401f,mp4a.40.2\",AUDIO=\"aud\"\r\n\
\x20 low/index.m3u8  \r\n\
#EXT-X-I-FRAME-STREAM-INF:BANDWIDTH=86000,URI=\"https://cdn.example.net/iframes.m3u8?sig=a%2Bb\"\r\n\
#EXT-X-STREAM-INF:BANDWIDTH=2560000\r\n\
/abs/high.m3u8\r\n";

    fn base() -> Url {
        Url::parse("https://example.com/vod/master.m3u8").unwrap()
    }

    fn encoder() -> ProxyUrlEncoder {
        ProxyUrlEncoder::from_config(&ProxyRouteConfig::default())
    }

    fn rewrite(body: &str, mode: AddressingMode) -> Result<String, RewriteError> {
        let encoder = encoder();
        PlaylistRewriter::new(&encoder, mode)
            .rewrite(body.as_bytes(), None, &base())
            .map(|bytes| String::from_utf8(bytes).unwrap())
    }

    /// Run a proxy URL back through routing and resolution.
    fn target_of(proxy_url: &str) -> String {
        let router = ProxyRouter::from_config(&ProxyRouteConfig::default());
        let uri: Uri = proxy_url.parse().unwrap();
        match router.match_uri(&uri) {
            RouteMatch::Proxy(target) => resolve(&target, &TargetPolicy::strict())
                .unwrap()
                .url()
                .to_string(),
            other => panic!("{proxy_url} routed to {other:?}"),
        }
    }

    fn quoted_uri(line: &str) -> &str {
        let start = line.to_ascii_uppercase().find("URI=\"").unwrap() + 5;
        let end = start + line[start..].find('"').unwrap();
        &line[start..end]
    }

    #[test]
    fn media_playlist_segment_goes_through_query_route() {
        let out = rewrite("#EXTM3U\n#EXTINF:10,\nsegment1.ts\n", AddressingMode::Query).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "#EXTM3U");
        assert_eq!(lines[1], "#EXTINF:10,");
        assert!(lines[2].starts_with("/proxy?url="));
        assert_eq!(target_of(lines[2]), "https://example.com/vod/segment1.ts");
    }

    #[test]
    fn line_structure_is_preserved() {
        for mode in [AddressingMode::Query, AddressingMode::Path, AddressingMode::Base64Path] {
            let out = rewrite(MASTER, mode).unwrap();
            assert_eq!(out.lines().count(), MASTER.lines().count());
            assert_eq!(out.matches("\r\n").count(), MASTER.matches("\r\n").count());

            let before: Vec<&str> = MASTER.lines().collect();
            let after: Vec<&str> = out.lines().collect();
            // Directives without URIs, comments and blank lines are untouched.
            for idx in [0, 1, 2, 4, 5, 8] {
                assert_eq!(before[idx], after[idx], "line {idx} in {mode} mode");
            }
            // Whitespace around a bare reference survives.
            assert!(after[6].starts_with("  /proxy"));
            assert!(after[6].ends_with("  "));
        }
    }

    #[test]
    fn references_resolve_back_to_their_targets() {
        for mode in [AddressingMode::Query, AddressingMode::Path, AddressingMode::Base64Path] {
            let out = rewrite(MASTER, mode).unwrap();
            let lines: Vec<&str> = out.lines().collect();

            assert_eq!(
                target_of(quoted_uri(lines[3])),
                "https://example.com/vod/audio/en.m3u8"
            );
            assert_eq!(
                target_of(lines[6].trim()),
                "https://example.com/vod/low/index.m3u8"
            );
            assert_eq!(
                target_of(quoted_uri(lines[7])),
                "https://cdn.example.net/iframes.m3u8?sig=a%2Bb"
            );
            assert_eq!(target_of(lines[9]), "https://example.com/abs/high.m3u8");
        }
    }

    #[test]
    fn directive_text_outside_uri_is_untouched() {
        let out = rewrite(
            "#EXTM3U\n#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\",IV=0x1f\n#EXT-X-MAP:URI=\"init.mp4\",BYTERANGE=\"720@0\"\n",
            AddressingMode::Path,
        )
        .unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines[1],
            "#EXT-X-KEY:METHOD=AES-128,URI=\"/proxy/https://example.com/vod/key.bin\",IV=0x1f"
        );
        assert_eq!(
            lines[2],
            "#EXT-X-MAP:URI=\"/proxy/https://example.com/vod/init.mp4\",BYTERANGE=\"720@0\""
        );
    }

    #[test]
    fn non_http_references_and_titles_are_left_alone() {
        let body = "#EXTM3U\n#EXT-X-KEY:METHOD=SAMPLE-AES,URI=\"skd://key-id\",KEYFORMAT=\"com.apple.streamingkeydelivery\"\n#EXTINF:9.5,URI=\"not-an-attribute\"\ndata:text/plain,hello\n";
        let out = rewrite(body, AddressingMode::Query).unwrap();
        assert_eq!(out, body);
    }

    #[test]
    fn byte_order_mark_is_kept() {
        let body = "\u{feff}#EXTM3U\nseg.ts";
        let out = rewrite(body, AddressingMode::Base64Path).unwrap();
        assert!(out.starts_with("\u{feff}#EXTM3U\n/proxy/base64/"));
        assert!(!out.ends_with('\n'));
    }

    #[test]
    fn fails_closed_on_uncertain_input() {
        assert_eq!(
            rewrite("not a playlist\nseg.ts\n", AddressingMode::Query),
            Err(RewriteError::MissingHeader)
        );
        assert_eq!(rewrite("", AddressingMode::Query), Err(RewriteError::MissingHeader));
        assert_eq!(
            rewrite("#EXTM3U\n#EXT-X-MAP:URI=\"init.mp4\n", AddressingMode::Query),
            Err(RewriteError::MalformedDirective { line: 2 })
        );
        assert!(matches!(
            rewrite("#EXTM3U\nhttp://[broken/seg.ts\n", AddressingMode::Query),
            Err(RewriteError::UnresolvableReference { line: 2, .. })
        ));
    }

    #[test]
    fn charset_handling() {
        let encoder = encoder();
        let rewriter = PlaylistRewriter::new(&encoder, AddressingMode::Query);
        let ascii = b"#EXTM3U\nseg.ts\n";
        assert!(rewriter.rewrite(ascii, Some("iso-8859-1"), &base()).is_ok());
        assert!(rewriter.rewrite(ascii, Some("utf-8"), &base()).is_ok());

        // Latin-1 title survives byte for byte while the segment is rewritten.
        let latin1 = b"#EXTM3U\n#EXTINF:10,Caf\xe9\nseg.ts\n";
        for label in ["iso-8859-1", "windows-1252", "Latin1"] {
            let out = rewriter.rewrite(latin1, Some(label), &base()).unwrap();
            assert!(out.starts_with(b"#EXTM3U\n#EXTINF:10,Caf\xe9\n/proxy?url="), "{label}");
            let last = std::str::from_utf8(&out[out.len() - 40..]).unwrap();
            assert!(last.contains("seg.ts"));
        }

        assert_eq!(
            rewriter.rewrite(latin1, None, &base()),
            Err(RewriteError::Malformed("UTF-8"))
        );
        assert_eq!(
            rewriter.rewrite(latin1, Some("x-unknown-charset"), &base()),
            Err(RewriteError::UnsupportedCharset("x-unknown-charset".into()))
        );
        assert_eq!(
            rewriter.rewrite(ascii, Some("utf-16le"), &base()),
            Err(RewriteError::UnsupportedCharset("utf-16le".into()))
        );
    }

    #[test]
    fn shift_jis_round_trips_outside_references() {
        let encoder = encoder();
        let rewriter = PlaylistRewriter::new(&encoder, AddressingMode::Path);
        let (title, _, _) = encoding_rs::SHIFT_JIS.encode("#EXTINF:6,\u{65e5}\u{672c}\n");
        let mut body = b"#EXTM3U\n".to_vec();
        body.extend_from_slice(&title);
        body.extend_from_slice(b"part1.ts\n");

        let out = rewriter.rewrite(&body, Some("shift_jis"), &base()).unwrap();
        assert!(out.starts_with(&body[..8 + title.len()]));
        assert!(out.ends_with(b"/proxy/https://example.com/vod/part1.ts\n"));
    }

    #[test]
    fn document_counts_lines_with_mixed_endings() {
        let base = base();
        let doc = PlaylistDocument::parse("#EXTM3U\r\na.ts\rb.ts\nc.ts", &base).unwrap();
        assert_eq!(doc.line_count(), 4);
        assert_eq!(doc.base_url(), &base);
        let out = doc.rewrite_with(|u| format!("<{u}>")).unwrap();
        assert_eq!(
            out,
            "#EXTM3U\r\n<https://example.com/vod/a.ts>\r<https://example.com/vod/b.ts>\n<https://example.com/vod/c.ts>"
        );
    }
}
