//! Upload decoders.
//!
//! Three wire formats feed revision construction: a simple upload (the raw
//! body is the payload), a `multipart/related` upload (a JSON resource part
//! followed by a media part), and an XML-API upload (raw body plus an
//! optional caller-declared digest header). This is a synchronous parser
//! over the already-collected body bytes.

use std::collections::HashMap;

use bytes::Bytes;
use gcstack_storage_model::{StorageError, StorageRequest, StorageResult};

/// Custom-metadata key recording which decoder produced a revision.
pub const UPLOAD_MARKER_KEY: &str = "x_gcstack_upload";

/// Custom-metadata key recording a caller-declared MD5 digest.
pub const CALLER_MD5_KEY: &str = "x_gcstack_md5";

/// The decoder path an insert went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    /// Raw-body upload; metadata comes solely from headers.
    Simple,
    /// `multipart/related` upload with a resource part and a media part.
    Multipart,
    /// XML-API upload; the caller may declare the digest.
    Xml,
}

impl UploadKind {
    /// The provenance tag stored under [`UPLOAD_MARKER_KEY`].
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Multipart => "multipart",
            Self::Xml => "xml",
        }
    }
}

/// A decoded `multipart/related` upload body.
#[derive(Debug)]
pub struct MultipartUpload {
    /// The JSON resource-description part.
    pub resource: serde_json::Value,
    /// The media payload, end marker stripped.
    pub media: Bytes,
    /// A content type found in the media part's own headers; overrides the
    /// resource JSON's value.
    pub media_content_type: Option<String>,
}

/// Parse a `multipart/related` upload body.
///
/// The boundary comes from the content-type header; the body must contain
/// exactly two parts (resource JSON, then media), each preceded by its own
/// header block, and the media part must end with the boundary terminator.
pub fn parse_multipart_related(request: &StorageRequest) -> StorageResult<MultipartUpload> {
    let content_type = request.header("content-type").ok_or_else(|| {
        StorageError::bad_request("missing content-type header in multipart upload")
    })?;
    if !content_type.starts_with("multipart/related") {
        return Err(StorageError::bad_request(format!(
            "invalid content-type header in multipart upload: {content_type}"
        )));
    }
    let boundary = content_type
        .split_once("boundary=")
        .map(|(_, b)| b.trim_matches('"'))
        .filter(|b| !b.is_empty())
        .ok_or_else(|| {
            StorageError::bad_request("missing boundary in content-type header in multipart upload")
        })?;

    let marker = format!("--{boundary}\r\n");
    let parts = split_on_marker(&request.body, marker.as_bytes());
    // parts[0] is the preamble (empty in practice), parts[1] the resource
    // part, parts[2] the media part.
    if parts.len() < 3 {
        return Err(StorageError::bad_request(format!(
            "malformed multipart body, expected a resource part and a media part \
             delimited by --{boundary}"
        )));
    }
    let (_, resource_body) = parse_part(parts[1])?;
    let (media_headers, media_body) = parse_part(parts[2])?;

    let end_marker = format!("\r\n--{boundary}--\r\n");
    let end = find_bytes(media_body, end_marker.as_bytes()).ok_or_else(|| {
        StorageError::bad_request(format!("missing end marker (--{boundary}--) in media body"))
    })?;
    let media = Bytes::copy_from_slice(&media_body[..end]);

    let resource: serde_json::Value = serde_json::from_slice(resource_body)
        .map_err(|e| StorageError::bad_request(format!("malformed resource part: {e}")))?;

    Ok(MultipartUpload {
        resource,
        media,
        media_content_type: media_headers.get("content-type").cloned(),
    })
}

/// Extract a caller-declared MD5 digest from an XML-API upload request.
///
/// The `x-goog-hash` header is a comma-separated list of `algorithm=value`
/// pairs; only the `md5` entry matters here.
#[must_use]
pub fn extract_xml_md5(request: &StorageRequest) -> Option<String> {
    let header = request.header("x-goog-hash")?;
    header
        .split(',')
        .map(str::trim)
        .find_map(|pair| pair.strip_prefix("md5="))
        .map(str::to_owned)
}

/// Split `body` into the segments between occurrences of `marker`.
fn split_on_marker<'a>(body: &'a [u8], marker: &[u8]) -> Vec<&'a [u8]> {
    let mut parts = Vec::new();
    let mut remaining = body;
    while let Some(pos) = find_bytes(remaining, marker) {
        parts.push(&remaining[..pos]);
        remaining = &remaining[pos + marker.len()..];
    }
    parts.push(remaining);
    parts
}

/// Split one multipart part into its header block and payload.
///
/// The header block is a sequence of `Name: value` lines terminated by a
/// blank line; header names are lowercased.
fn parse_part(part: &[u8]) -> StorageResult<(HashMap<String, String>, &[u8])> {
    let mut headers = HashMap::new();
    let mut index = 0;
    loop {
        let pos = find_bytes(&part[index..], b"\r\n").ok_or_else(|| {
            StorageError::bad_request("malformed multipart part, missing header terminator")
        })?;
        if pos == 0 {
            // Blank line: the payload starts after it.
            index += 2;
            break;
        }
        let line = std::str::from_utf8(&part[index..index + pos]).map_err(|_| {
            StorageError::bad_request("malformed multipart part, non-UTF-8 header line")
        })?;
        let (name, value) = line.split_once(": ").ok_or_else(|| {
            StorageError::bad_request(format!("malformed multipart header line: {line}"))
        })?;
        headers.insert(name.to_ascii_lowercase(), value.to_owned());
        index += pos + 2;
    }
    Ok((headers, &part[index..]))
}

/// Find the first occurrence of `needle` in `haystack`.
fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
