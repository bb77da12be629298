//! Content-type sniffing over the leading bytes of a file.
//!
//! Follows the browser content-sniffing algorithm: a fixed table of magic
//! numbers is tried in order, then the data is classified as text or binary.

/// Number of leading bytes considered by [`detect`].
pub const SNIFF_LEN: usize = 512;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const OCTET_STREAM: &str = "application/octet-stream";

enum Signature {
    /// Case-insensitive HTML tag, followed by a space or `>`.
    Html(&'static [u8]),
    /// `data & mask == pattern` over the pattern length.
    Masked {
        mask: &'static [u8],
        pattern: &'static [u8],
        skip_ws: bool,
        content_type: &'static str,
    },
    Exact(&'static [u8], &'static str),
    Mp4,
}

const fn masked(
    mask: &'static [u8],
    pattern: &'static [u8],
    skip_ws: bool,
    content_type: &'static str,
) -> Signature {
    Signature::Masked {
        mask,
        pattern,
        skip_ws,
        content_type,
    }
}

const SIGNATURES: &[Signature] = &[
    Signature::Html(b"<!DOCTYPE HTML"),
    Signature::Html(b"<HTML"),
    Signature::Html(b"<HEAD"),
    Signature::Html(b"<SCRIPT"),
    Signature::Html(b"<IFRAME"),
    Signature::Html(b"<H1"),
    Signature::Html(b"<DIV"),
    Signature::Html(b"<FONT"),
    Signature::Html(b"<TABLE"),
    Signature::Html(b"<A"),
    Signature::Html(b"<STYLE"),
    Signature::Html(b"<TITLE"),
    Signature::Html(b"<B"),
    Signature::Html(b"<BODY"),
    Signature::Html(b"<BR"),
    Signature::Html(b"<P"),
    Signature::Html(b"<!--"),
    masked(b"\xFF\xFF\xFF\xFF\xFF", b"<?xml", true, "text/xml; charset=utf-8"),
    Signature::Exact(b"%PDF-", "application/pdf"),
    Signature::Exact(b"%!PS-Adobe-", "application/postscript"),
    masked(b"\xFF\xFF\x00\x00", b"\xFE\xFF\x00\x00", false, "text/plain; charset=utf-16be"),
    masked(b"\xFF\xFF\x00\x00", b"\xFF\xFE\x00\x00", false, "text/plain; charset=utf-16le"),
    masked(b"\xFF\xFF\xFF\x00", b"\xEF\xBB\xBF\x00", false, TEXT_PLAIN),
    Signature::Exact(b"\x00\x00\x01\x00", "image/x-icon"),
    Signature::Exact(b"\x00\x00\x02\x00", "image/x-icon"),
    Signature::Exact(b"BM", "image/bmp"),
    Signature::Exact(b"GIF87a", "image/gif"),
    Signature::Exact(b"GIF89a", "image/gif"),
    masked(
        b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF\xFF\xFF",
        b"RIFF\x00\x00\x00\x00WEBPVP",
        false,
        "image/webp",
    ),
    Signature::Exact(b"\x89PNG\x0D\x0A\x1A\x0A", "image/png"),
    Signature::Exact(b"\xFF\xD8\xFF", "image/jpeg"),
    masked(
        b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF",
        b"FORM\x00\x00\x00\x00AIFF",
        false,
        "audio/aiff",
    ),
    masked(b"\xFF\xFF\xFF", b"ID3", false, "audio/mpeg"),
    masked(b"\xFF\xFF\xFF\xFF\xFF", b"OggS\x00", false, "application/ogg"),
    masked(
        b"\xFF\xFF\xFF\xFF\xFF\xFF\xFF\xFF",
        b"MThd\x00\x00\x00\x06",
        false,
        "audio/midi",
    ),
    masked(
        b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF",
        b"RIFF\x00\x00\x00\x00AVI ",
        false,
        "video/avi",
    ),
    masked(
        b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF",
        b"RIFF\x00\x00\x00\x00WAVE",
        false,
        "audio/wave",
    ),
    Signature::Mp4,
    Signature::Exact(b"\x1A\x45\xDF\xA3", "video/webm"),
    masked(
        b"\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\xFF\xFF",
        b"\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00LP",
        false,
        "application/vnd.ms-fontobject",
    ),
    Signature::Exact(b"\x00\x01\x00\x00", "font/ttf"),
    Signature::Exact(b"OTTO", "font/otf"),
    Signature::Exact(b"ttcf", "font/collection"),
    Signature::Exact(b"wOFF", "font/woff"),
    Signature::Exact(b"wOF2", "font/woff2"),
    Signature::Exact(b"\x1F\x8B\x08", "application/x-gzip"),
    Signature::Exact(b"PK\x03\x04", "application/zip"),
    Signature::Exact(b"Rar!\x1A\x07\x00", "application/x-rar-compressed"),
    Signature::Exact(b"Rar!\x1A\x07\x01\x00", "application/x-rar-compressed"),
    Signature::Exact(b"\x00\x61\x73\x6D", "application/wasm"),
];

fn is_ws(b: u8) -> bool {
    matches!(b, b'\t' | b'\n' | b'\x0C' | b'\r' | b' ')
}

fn is_tt(b: u8) -> bool {
    b == b' ' || b == b'>'
}

fn trim_ws(data: &[u8]) -> &[u8] {
    let start = data.iter().position(|b| !is_ws(*b)).unwrap_or(data.len());
    &data[start..]
}

impl Signature {
    fn matches(&self, data: &[u8]) -> Option<&'static str> {
        match self {
            Signature::Html(tag) => {
                let data = trim_ws(data);
                if data.len() < tag.len() + 1 {
                    return None;
                }
                let head = &data[..tag.len()];
                // `tag` is stored upper-case; lower-case letters in the data
                // are folded before comparing.
                let same = head
                    .iter()
                    .zip(tag.iter())
                    .all(|(d, t)| d.to_ascii_uppercase() == *t);
                (same && is_tt(data[tag.len()])).then_some("text/html; charset=utf-8")
            }
            Signature::Masked {
                mask,
                pattern,
                skip_ws,
                content_type,
            } => {
                let data = if *skip_ws { trim_ws(data) } else { data };
                if data.len() < pattern.len() {
                    return None;
                }
                let same = data
                    .iter()
                    .zip(mask.iter())
                    .zip(pattern.iter())
                    .all(|((d, m), p)| d & m == *p);
                same.then_some(*content_type)
            }
            Signature::Exact(prefix, content_type) => {
                data.starts_with(prefix).then_some(*content_type)
            }
            Signature::Mp4 => is_mp4(data).then_some("video/mp4"),
        }
    }
}

/// ISO base media file with an `mp4` major or compatible brand.
fn is_mp4(data: &[u8]) -> bool {
    if data.len() < 12 {
        return false;
    }
    let box_size = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if data.len() < box_size || box_size % 4 != 0 || &data[4..8] != b"ftyp" {
        return false;
    }
    (8..box_size)
        .step_by(4)
        .filter(|&st| st != 12)
        .any(|st| data.get(st..st + 3) == Some(b"mp4".as_slice()))
}

/// Bytes that never appear in text.
fn is_binary(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}

/// Classify `data` and return its MIME type.
///
/// Only the first [`SNIFF_LEN`] bytes are considered. Empty input is text.
pub fn detect(data: &[u8]) -> &'static str {
    let data = &data[..data.len().min(SNIFF_LEN)];
    SIGNATURES
        .iter()
        .find_map(|sig| sig.matches(data))
        .unwrap_or_else(|| {
            if data.iter().any(|b| is_binary(*b)) {
                OCTET_STREAM
            } else {
                TEXT_PLAIN
            }
        })
}
