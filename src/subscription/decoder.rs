//! Proxy URI decoding.
//!
//! [`decode`] turns one `vmess://`, `trojan://`, `ss://` or `ssr://` line into
//! a [`ProxyNode`]. Anything it cannot make sense of yields `None`; callers
//! drop the line without surfacing an error, since third-party feeds are
//! routinely noisy.

use std::borrow::Cow;

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine as _,
};
use reqwest::Url;
use serde_json::{Map, Value};

use super::node::{
    GrpcOpts, ProxyNode, ShadowsocksNode, ShadowsocksRNode, TrojanNode, VmessNode, WsOpts,
};

const DEFAULT_VMESS_NAME: &str = "VMess节点";
const DEFAULT_TROJAN_NAME: &str = "Trojan节点";
const DEFAULT_SS_NAME: &str = "SS节点";
const DEFAULT_TLS_PORT: u16 = 443;

const LENIENT: GeneralPurposeConfig = GeneralPurposeConfig::new()
    .with_decode_padding_mode(DecodePaddingMode::Indifferent)
    .with_decode_allow_trailing_bits(true);

/// Standard alphabet, padding optional.
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);
/// URL-safe alphabet, padding optional. Some SS/SSR providers emit this.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);

/// Normalize `=` padding to a multiple of four.
///
/// Existing padding is stripped first, so inputs missing none, some or all
/// of their padding all normalize to the same string.
pub fn pad_base64(input: &str) -> Cow<'_, str> {
    let bare = input.trim_end_matches('=');
    let rem = bare.len() % 4;
    if rem == 0 && bare.len() == input.len() {
        return Cow::Borrowed(input);
    }
    let mut padded = String::with_capacity(bare.len() + 3);
    padded.push_str(bare);
    if rem != 0 {
        padded.extend(std::iter::repeat('=').take(4 - rem));
    }
    Cow::Owned(padded)
}

/// Decode base64 after padding normalization, standard alphabet first and
/// URL-safe as a fallback.
///
/// ASCII whitespace anywhere in the payload is ignored, so MIME-style bodies
/// wrapped at 76 columns with `\n` or `\r\n` decode as one blob.
pub fn decode_base64(input: &str) -> Option<Vec<u8>> {
    let compact: Cow<'_, str> = if input.bytes().any(|b| b.is_ascii_whitespace()) {
        Cow::Owned(input.chars().filter(|c| !c.is_ascii_whitespace()).collect())
    } else {
        Cow::Borrowed(input)
    };
    let padded = pad_base64(&compact);
    STANDARD_LENIENT
        .decode(padded.as_bytes())
        .or_else(|_| URL_SAFE_LENIENT.decode(padded.as_bytes()))
        .ok()
}

fn decode_base64_text(input: &str) -> Option<String> {
    decode_base64(input).and_then(|bytes| String::from_utf8(bytes).ok())
}

/// Decode a single proxy URI. Dispatches on the scheme prefix only.
pub fn decode(uri: &str) -> Option<ProxyNode> {
    if let Some(rest) = uri.strip_prefix("vmess://") {
        decode_vmess(rest)
    } else if uri.starts_with("trojan://") {
        decode_trojan(uri)
    } else if let Some(rest) = uri.strip_prefix("ss://") {
        decode_ss(rest)
    } else if let Some(rest) = uri.strip_prefix("ssr://") {
        decode_ssr(rest)
    } else {
        None
    }
}

// ── vmess ───────────────────────────────────────────────────────

fn decode_vmess(payload: &str) -> Option<ProxyNode> {
    let bytes = decode_base64(payload)?;
    let data: Map<String, Value> = serde_json::from_slice(&bytes).ok()?;

    let server = json_str(&data, "add").unwrap_or_default().to_string();
    let port = u16::try_from(json_int(&data, "port").unwrap_or(i64::from(DEFAULT_TLS_PORT))).ok()?;
    if server.is_empty() {
        return None;
    }

    let mut node = VmessNode {
        name: json_str(&data, "ps").unwrap_or(DEFAULT_VMESS_NAME).to_string(),
        server,
        port,
        uuid: json_str(&data, "id").unwrap_or_default().to_string(),
        alter_id: json_int(&data, "aid")
            .and_then(|a| u32::try_from(a).ok())
            .unwrap_or(0),
        cipher: json_str(&data, "scy").unwrap_or("auto").to_string(),
        udp: true,
        tls: None,
        servername: None,
        network: None,
        ws_opts: None,
        grpc_opts: None,
    };

    if json_str(&data, "tls") == Some("tls") {
        node.tls = Some(true);
        node.servername = json_str(&data, "sni")
            .filter(|s| !s.is_empty())
            .map(str::to_string);
    }

    let path = json_str(&data, "path");
    match json_str(&data, "net") {
        Some("ws") => {
            node.network = Some("ws".into());
            node.ws_opts = WsOpts::from_parts(path, json_str(&data, "host"));
        }
        Some("grpc") => {
            node.network = Some("grpc".into());
            node.grpc_opts = path.filter(|p| !p.is_empty()).map(|p| GrpcOpts {
                service_name: p.to_string(),
            });
        }
        _ => {}
    }

    Some(ProxyNode::Vmess(node))
}

/// String field; non-string values count as absent.
fn json_str<'a>(data: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    data.get(key).and_then(Value::as_str)
}

/// Integer field; accepts JSON numbers (fractions truncated) and numeric
/// strings, since share-link generators disagree on which to emit.
fn json_int(data: &Map<String, Value>, key: &str) -> Option<i64> {
    match data.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ── trojan ──────────────────────────────────────────────────────

fn decode_trojan(uri: &str) -> Option<ProxyNode> {
    let url = Url::parse(uri).ok()?;

    let server = url
        .host_str()
        .unwrap_or_default()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string();
    if server.is_empty() {
        return None;
    }

    let password = urlencoding::decode(url.username())
        .map(Cow::into_owned)
        .unwrap_or_else(|_| url.username().to_string());
    let name = url
        .fragment()
        .filter(|f| !f.is_empty())
        .map(decode_fragment)
        .unwrap_or_else(|| DEFAULT_TROJAN_NAME.to_string());

    let query = |key: &str| -> Option<String> {
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    };

    let mut node = TrojanNode {
        name,
        server,
        port: url.port().unwrap_or(DEFAULT_TLS_PORT),
        password,
        udp: true,
        sni: query("sni").filter(|s| !s.is_empty()),
        skip_cert_verify: (query("allowInsecure").as_deref() == Some("1")).then_some(true),
        network: None,
        ws_opts: None,
    };

    if query("type").as_deref() == Some("ws") {
        node.network = Some("ws".into());
        node.ws_opts = WsOpts::from_parts(query("path").as_deref(), query("host").as_deref());
    }

    Some(ProxyNode::Trojan(node))
}

/// Percent-decode a display name, treating `+` as a space. Undecodable
/// input is returned as-is.
fn decode_fragment(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw.to_string(),
    }
}

// ── shadowsocks ─────────────────────────────────────────────────

fn decode_ss(rest: &str) -> Option<ProxyNode> {
    let (body, name) = match rest.rsplit_once('#') {
        Some((body, fragment)) if !fragment.is_empty() => (body, decode_fragment(fragment)),
        Some((body, _)) => (body, DEFAULT_SS_NAME.to_string()),
        None => (rest, DEFAULT_SS_NAME.to_string()),
    };

    let (method, password, server, port) = if let Some((user_info, server_info)) =
        body.split_once('@')
    {
        // method:password is base64, server:port is plain
        let credentials = decode_base64_text(user_info)?;
        let (method, password) = credentials.split_once(':')?;
        let (server, port_part) = server_info.split_once(':')?;
        let port_str = port_part
            .split('?')
            .next()
            .and_then(|p| p.split('/').next())
            .unwrap_or_default();
        (
            method.to_string(),
            password.to_string(),
            server.to_string(),
            port_str.parse::<u16>().ok()?,
        )
    } else {
        // the whole method:password@server:port blob is base64
        let decoded = decode_base64_text(body)?;
        let (credentials, server_info) = decoded.rsplit_once('@')?;
        let (method, password) = credentials.split_once(':')?;
        let (server, port_str) = server_info.split_once(':')?;
        (
            method.to_string(),
            password.to_string(),
            server.to_string(),
            port_str.trim().parse::<u16>().ok()?,
        )
    };

    if server.is_empty() || method.is_empty() {
        return None;
    }

    Some(ProxyNode::Shadowsocks(ShadowsocksNode {
        name,
        server,
        port,
        cipher: method,
        password,
        udp: true,
    }))
}

// ── shadowsocksr ────────────────────────────────────────────────

fn decode_ssr(rest: &str) -> Option<ProxyNode> {
    let decoded = decode_base64_text(rest)?;
    let main = decoded.split("/?").next().unwrap_or_default();
    let parts: Vec<&str> = main.split(':').collect();
    if parts.len() < 6 {
        return None;
    }

    let server = parts[0].to_string();
    let port = parts[1].parse::<u16>().ok()?;
    if server.is_empty() {
        return None;
    }
    let password = decode_base64_text(parts[5]).unwrap_or_default();

    Some(ProxyNode::ShadowsocksR(ShadowsocksRNode {
        name: format!("SSR-{server}:{port}"),
        server,
        port,
        cipher: parts[3].to_string(),
        password,
        protocol: parts[2].to_string(),
        obfs: parts[4].to_string(),
        udp: true,
    }))
}
