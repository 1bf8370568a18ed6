//! # Tunnel Wire Protocol
//!
//! The two framed messages carried over the tunnel channel between the
//! server and an agent: [`TunnelRequest`] (server → agent) and
//! [`TunnelResponse`] (agent → server). Both are serialized as JSON text
//! frames; the body is base64-encoded so arbitrary bytes can ride inside
//! a JSON string.
//!
//! Header values are transported in a single-value, flattened shape:
//! multiple values for the same header name are joined into one string.
//! `;` is the separator for ordinary headers; `Set-Cookie` is the one
//! exception (see [`flatten_headers`] / [`unflatten_headers`]), since
//! joining cookies with `;` would silently corrupt them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Flattened header map: header name → single joined value.
pub type Headers = BTreeMap<String, String>;

/// Separator used to join multi-valued headers other than `Set-Cookie`.
pub const HEADER_JOIN_SEPARATOR: &str = ";";

/// Separator used to join `Set-Cookie` values, which can't be combined
/// with `;` without corrupting the cookie's own attribute list.
const SET_COOKIE_JOIN_SEPARATOR: &str = "\n";

const SET_COOKIE: &str = "set-cookie";

/// A request forwarded from the public server to an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelRequest {
    /// Correlation ID, unique within the sending agent handle's lifetime.
    pub id: String,
    pub method: String,
    /// Request-URI including the query string.
    pub path: String,
    pub headers: Headers,
    #[serde(with = "body_b64")]
    pub body: Vec<u8>,
}

/// A response relayed back from an agent, echoing the request's `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelResponse {
    pub id: String,
    pub status: u16,
    pub headers: Headers,
    #[serde(with = "body_b64")]
    pub body: Vec<u8>,
}

impl TunnelResponse {
    /// Builds a synthetic `502` response used when an agent fails to
    /// reach its local origin.
    pub fn bad_gateway(id: impl Into<String>, message: impl AsRef<str>) -> Self {
        let mut headers = Headers::new();
        headers.insert("content-type".to_string(), "text/plain".to_string());
        Self {
            id: id.into(),
            status: 502,
            headers,
            body: message.as_ref().as_bytes().to_vec(),
        }
    }
}

/// Joins multiple values for one header name into the flattened wire form.
///
/// `Set-Cookie` is joined with `\n` (its values can't be combined any
/// other way); every other header uses [`HEADER_JOIN_SEPARATOR`].
pub fn join_header_values<'a>(name: &str, values: impl Iterator<Item = &'a str>) -> String {
    let sep = if name.eq_ignore_ascii_case(SET_COOKIE) {
        SET_COOKIE_JOIN_SEPARATOR
    } else {
        HEADER_JOIN_SEPARATOR
    };
    values.collect::<Vec<_>>().join(sep)
}

/// Splits a flattened header value back into its original multi-values.
///
/// Mirrors [`join_header_values`]: `Set-Cookie` is split on `\n`, every
/// other header is returned as a single value (never re-split on `;`,
/// since `;` is itself meaningful inside e.g. cache-control directives).
pub fn split_header_value<'a>(name: &str, value: &'a str) -> Vec<&'a str> {
    if name.eq_ignore_ascii_case(SET_COOKIE) {
        value.split(SET_COOKIE_JOIN_SEPARATOR).collect()
    } else {
        vec![value]
    }
}

mod body_b64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Vec<u8>, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}
