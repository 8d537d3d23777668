// CLASSIFICATION: COMMUNITY
// Filename: routes.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-17

//! Request routing onto [`Lake`] operations.
//!
//! Targets follow the Data Lake REST layout: `/` is the account,
//! `/{filesystem}` a filesystem and `/{filesystem}/{path}` a path inside it.
//! Everything here is transport-neutral; the worker pool in the parent
//! module feeds raw request parts in and writes the [`Reply`] out.

use std::collections::{BTreeMap, HashMap};

use datapond_lake::path::validate_filesystem_name;
use datapond_lake::{Lake, NodeKind, PathStatus};
use log::debug;
use percent_encoding::percent_decode_str;
use serde::Serialize;
use tiny_http::Method;
use url::Url;

use super::reply::{http_date, Reply, API_VERSION, CLIENT_REQUEST_ID, REQUEST_ID, VERSION};

type Routed = Result<Reply, Reply>;

/// Parsed request target plus the parts handlers look at.
struct Incoming<'a> {
    method: &'a Method,
    segments: Vec<String>,
    query: HashMap<String, String>,
    headers: &'a [(String, String)],
    body: &'a [u8],
}

impl<'a> Incoming<'a> {
    fn parse(
        method: &'a Method,
        target: &str,
        headers: &'a [(String, String)],
        body: &'a [u8],
    ) -> Result<Self, Reply> {
        let invalid_uri = || {
            Reply::error(
                400,
                "InvalidUri",
                "The requested URI does not represent any resource on the server.",
            )
        };
        let base = Url::parse("http://datapond.local/").map_err(|_| invalid_uri())?;
        let url = base.join(target).map_err(|_| invalid_uri())?;
        let mut segments = Vec::new();
        for raw in url.path_segments().into_iter().flatten() {
            let decoded = percent_decode_str(raw)
                .decode_utf8()
                .map_err(|_| invalid_uri())?;
            segments.push(decoded.into_owned());
        }
        if segments.len() == 1 && segments[0].is_empty() {
            segments.clear();
        }
        let query = url.query_pairs().into_owned().collect();
        Ok(Self {
            method,
            segments,
            query,
            headers,
            body,
        })
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool, Reply> {
        match self.query(key) {
            None => Ok(default),
            Some(v) if v.eq_ignore_ascii_case("true") => Ok(true),
            Some(v) if v.eq_ignore_ascii_case("false") => Ok(false),
            Some(_) => Err(Reply::invalid_query(key)),
        }
    }

    fn position(&self) -> Result<u64, Reply> {
        self.query("position")
            .ok_or_else(|| Reply::missing_query("position"))?
            .parse()
            .map_err(|_| Reply::invalid_query("position"))
    }
}

/// Serve one request: route it and attach the per-request headers.
pub fn handle(
    lake: &Lake,
    method: &Method,
    target: &str,
    headers: &[(String, String)],
    body: &[u8],
) -> Reply {
    let client_id = headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(CLIENT_REQUEST_ID))
        .map(|(_, v)| v.clone());
    let reply = Incoming::parse(method, target, headers, body)
        .and_then(|req| route(lake, &req))
        .unwrap_or_else(|reply| reply);
    let reply = reply
        .with_header(REQUEST_ID, request_id())
        .with_header(VERSION, API_VERSION);
    match client_id {
        Some(id) => reply.with_header(CLIENT_REQUEST_ID, id),
        None => reply,
    }
}

fn route(lake: &Lake, req: &Incoming<'_>) -> Routed {
    let Some((filesystem, rest)) = req.segments.split_first() else {
        return account(lake, req);
    };
    validate_filesystem_name(filesystem)?;
    let path = rest.join("/");
    if path.trim_matches('/').is_empty() {
        filesystem_route(lake, filesystem, req)
    } else {
        path_route(lake, filesystem, &path, req)
    }
}

// ── account ────────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FilesystemItem {
    name: String,
    last_modified: String,
    etag: String,
}

#[derive(Serialize)]
struct FilesystemList {
    filesystems: Vec<FilesystemItem>,
}

fn account(lake: &Lake, req: &Incoming<'_>) -> Routed {
    let listing = req.query("comp") == Some("list") || req.query("resource") == Some("account");
    if !listing {
        return Err(Reply::forbidden());
    }
    if *req.method != Method::Get {
        return Err(Reply::method_not_allowed());
    }
    let filesystems = lake
        .list_filesystems()
        .iter()
        .map(|fs| {
            let props = fs.properties();
            FilesystemItem {
                name: fs.name().to_string(),
                last_modified: http_date(&props.last_modified),
                etag: props.etag(),
            }
        })
        .collect();
    Ok(Reply::json(200, &FilesystemList { filesystems }))
}

// ── filesystem ─────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PathItem {
    name: String,
    is_directory: String,
    content_length: String,
    last_modified: String,
    etag: String,
}

impl From<PathStatus> for PathItem {
    fn from(status: PathStatus) -> Self {
        Self {
            name: status.name,
            is_directory: (status.kind == NodeKind::Directory).to_string(),
            content_length: status.content_length.to_string(),
            last_modified: http_date(&status.last_modified),
            etag: status.etag,
        }
    }
}

#[derive(Serialize)]
struct PathList {
    paths: Vec<PathItem>,
}

fn filesystem_route(lake: &Lake, name: &str, req: &Incoming<'_>) -> Routed {
    if let Some(resource) = req.query("resource") {
        if resource != "filesystem" {
            return Err(Reply::invalid_query("resource"));
        }
        return match req.method {
            Method::Get => list_paths(lake, name, req),
            Method::Put => create_filesystem(lake, name),
            Method::Delete => delete_filesystem(lake, name),
            _ => Err(Reply::method_not_allowed()),
        };
    }
    match req.query("restype") {
        None => return Err(Reply::missing_query("restype")),
        Some("container") => {}
        Some(_) => return Err(Reply::invalid_query("restype")),
    }
    let metadata = req
        .query("comp")
        .map(|c| c.eq_ignore_ascii_case("metadata"))
        .unwrap_or(false);
    match req.method {
        Method::Put if metadata => {
            let props = parse_properties(req.header("x-ms-properties").unwrap_or(""))?;
            let props = lake.set_filesystem_properties(name, props)?;
            Ok(Reply::empty(200).stamped(&props.etag(), &props.last_modified))
        }
        Method::Put => create_filesystem(lake, name),
        Method::Get | Method::Head => {
            let props = lake.filesystem_properties(name)?;
            Ok(Reply::empty(200)
                .stamped(&props.etag(), &props.last_modified)
                .with_header("x-ms-properties", render_properties(&props.metadata))
                .with_header("x-ms-namespace-enabled", "true"))
        }
        Method::Delete => delete_filesystem(lake, name),
        _ => Err(Reply::method_not_allowed()),
    }
}

fn create_filesystem(lake: &Lake, name: &str) -> Routed {
    let props = lake.create_filesystem(name)?;
    Ok(Reply::empty(201).stamped(&props.etag(), &props.last_modified))
}

fn delete_filesystem(lake: &Lake, name: &str) -> Routed {
    lake.delete_filesystem(name)?;
    Ok(Reply::empty(202))
}

fn list_paths(lake: &Lake, name: &str, req: &Incoming<'_>) -> Routed {
    let recursive = req.flag("recursive", true)?;
    let directory = req.query("directory").unwrap_or("");
    let paths = lake
        .list_paths(name, directory, recursive)?
        .into_iter()
        .map(PathItem::from)
        .collect();
    Ok(Reply::json(200, &PathList { paths }))
}

/// `x-ms-properties`: comma separated `name=value` pairs. Values are
/// base64 on the wire and stored as sent.
fn parse_properties(raw: &str) -> Result<BTreeMap<String, String>, Reply> {
    let mut props = BTreeMap::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                props.insert(key.trim().to_string(), value.trim().to_string());
            }
            _ => return Err(Reply::invalid_header("x-ms-properties")),
        }
    }
    Ok(props)
}

fn render_properties(props: &BTreeMap<String, String>) -> String {
    props
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

// ── paths ──────────────────────────────────────────────────────────────────

fn path_route(lake: &Lake, fs: &str, path: &str, req: &Incoming<'_>) -> Routed {
    match req.method {
        Method::Put => {
            let kind = match req.query("resource") {
                None => return Err(Reply::missing_query("resource")),
                Some("directory") => NodeKind::Directory,
                Some("file") => NodeKind::File,
                Some(_) => return Err(Reply::invalid_query("resource")),
            };
            let fail_if_exists = req.header("If-None-Match") == Some("*");
            let status = lake.create_path(fs, path, kind, fail_if_exists)?;
            Ok(Reply::empty(201).stamped(&status.etag, &status.last_modified))
        }
        Method::Delete => {
            let recursive = req.flag("recursive", false)?;
            lake.delete_path(fs, path, recursive)?;
            Ok(Reply::empty(200))
        }
        Method::Get => read(lake, fs, path, req),
        Method::Head => {
            let status = lake.path_properties(fs, path)?;
            Ok(Reply::empty(200)
                .stamped(&status.etag, &status.last_modified)
                .with_header("x-ms-resource-type", status.kind.to_string())
                .with_header("Content-Length", status.content_length.to_string()))
        }
        Method::Patch => match req.query("action") {
            None => Err(Reply::missing_query("action")),
            Some("append") => {
                let position = req.position()?;
                lake.append(fs, path, position, req.body)?;
                Ok(Reply::empty(202))
            }
            Some("flush") => {
                let position = req.position()?;
                let status = lake.flush(fs, path, position)?;
                Ok(Reply::empty(200).stamped(&status.etag, &status.last_modified))
            }
            Some(_) => Err(Reply::invalid_query("action")),
        },
        _ => Err(Reply::method_not_allowed()),
    }
}

fn read(lake: &Lake, fs: &str, path: &str, req: &Incoming<'_>) -> Routed {
    let (name, raw) = match req.header("x-ms-range") {
        Some(raw) => ("x-ms-range", raw),
        None => match req.header("Range") {
            Some(raw) => ("Range", raw),
            None => return Ok(Reply::bytes(200, lake.read_all(fs, path)?)),
        },
    };
    let (start, end) = parse_range(raw).ok_or_else(|| Reply::invalid_header(name))?;
    let committed = lake.path_properties(fs, path)?.content_length;
    // open ranges past the end still go through the engine so the caller
    // sees the same 416 a closed range would produce
    let len = match end {
        Some(end) => (end - start).saturating_add(1),
        None => committed.saturating_sub(start).max(1),
    };
    let data = lake.read(fs, path, start, len)?;
    debug!("ranged read {}/{} {}+{}", fs, path, start, len);
    Ok(Reply::bytes(206, data).with_header(
        "Content-Range",
        format!("bytes {}-{}/{}", start, start + len - 1, committed),
    ))
}

/// `bytes=a-b` (inclusive) or `bytes=a-`.
fn parse_range(raw: &str) -> Option<(u64, Option<u64>)> {
    let (first, last) = raw.trim().strip_prefix("bytes=")?.split_once('-')?;
    let start: u64 = first.trim().parse().ok()?;
    let last = last.trim();
    if last.is_empty() {
        return Some((start, None));
    }
    let end: u64 = last.parse().ok()?;
    (end >= start).then_some((start, Some(end)))
}

/// Random version 4 UUID.
fn request_id() -> String {
    let mut v: u128 = rand::random();
    v = (v & !(0xF << 76)) | (0x4 << 76);
    v = (v & !(0x3 << 62)) | (0x2 << 62);
    format!(
        "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
        v >> 96,
        (v >> 80) & 0xFFFF,
        (v >> 64) & 0xFFFF,
        (v >> 48) & 0xFFFF,
        v & 0xFFFF_FFFF_FFFF
    )
}
