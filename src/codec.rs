//! Wire protocol envelopes.
//!
//! Outbound shapes are asymmetric between variants (the handshake nests a
//! `ts`/`v`/`h`/`s` object two levels deep, OK frames nest a `s`/`d` body
//! under `r`, data frames carry `p`/`d`/`t` directly) so they're built by
//! hand with `serde_json::json!` rather than derived, mirroring the
//! original's `Message.Format() -> O` (`O = map[string]interface{}`)
//! approach in `examples/original_source/pkg/data/message.go`.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::query::{LimitOrder, QueryDescriptor};

/// An outbound envelope, ready to be serialized and written to the socket.
#[derive(Debug, Clone)]
pub enum Envelope {
    /// Sent once, on `connecting -> live`.
    Handshake { timestamp_ms: i64, host: String },
    /// Sent in response to an idle/keep-alive frame.
    Idle,
    /// Request acknowledgement.
    Ok { request_id: i64, no_index: bool },
    /// A listener push.
    Data { ref_: String, query_id: i64, value: Value },
}

impl Envelope {
    pub fn to_json(&self) -> Value {
        match self {
            Envelope::Handshake { timestamp_ms, host } => json!({
                "t": "c",
                "d": {
                    "t": "h",
                    "d": {
                        "ts": timestamp_ms,
                        "v": "5",
                        "h": host,
                        "s": "",
                    }
                }
            }),
            Envelope::Idle => json!({
                "t": "c",
                "d": { "t": "o", "d": null }
            }),
            Envelope::Ok { request_id, no_index } => {
                let mut body = serde_json::Map::new();
                if *no_index {
                    body.insert("w".to_string(), json!(["no_index"]));
                }
                json!({
                    "t": "d",
                    "d": {
                        "r": request_id,
                        "b": { "s": "ok", "d": Value::Object(body) }
                    }
                })
            }
            Envelope::Data { ref_, query_id, value } => json!({
                "t": "d",
                "d": {
                    "a": "d",
                    "b": { "p": ref_, "d": value, "t": query_id }
                }
            }),
        }
    }
}

/// The decoded form of an inbound request, independent of its wire
/// representation (`p`/`m`/`l`/`q`/`n`).
#[derive(Debug, Clone)]
pub struct Request {
    pub request_id: i64,
    pub action: Action,
    pub ref_: String,
    pub data: Value,
    pub query: QueryDescriptor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Set,
    Update,
    Listen,
    Unlisten,
}

/// Mirrors the internal wire schema in
/// `examples/original_source/pkg/data/query.go` (`type r struct`):
/// `{t, d:{a, r, b:{p, d, t, q:{sp,sn,ep,en,i,l,vf}}}}`.
#[derive(Debug, Deserialize)]
struct WireEnvelope {
    t: String,
    d: Option<WireBody>,
}

#[derive(Debug, Deserialize)]
struct WireBody {
    a: String,
    #[serde(default)]
    r: i64,
    b: Option<WirePayload>,
}

#[derive(Debug, Deserialize)]
struct WirePayload {
    #[serde(default)]
    p: String,
    #[serde(default)]
    d: Value,
    #[serde(default)]
    t: i64,
    q: Option<WireQuery>,
}

#[derive(Debug, Deserialize)]
struct WireQuery {
    sp: Option<Value>,
    #[serde(default)]
    sn: Option<String>,
    ep: Option<Value>,
    #[serde(default)]
    en: Option<String>,
    #[serde(default)]
    i: String,
    #[serde(default)]
    l: u32,
    #[serde(default)]
    vf: String,
}

/// Decodes a single concatenated request payload (after any multi-frame
/// buffering has already happened) into a [`Request`].
///
/// Mirrors the validation in the original's `Request.UnmarshalJSON`:
/// reject a missing `d`, missing `d.b`, or an unrecognized action.
pub fn decode(bytes: &[u8]) -> crate::error::Result<Request> {
    let envelope: WireEnvelope = serde_json::from_slice(bytes)
        .map_err(|e| crate::error::Error::Decode(format!("invalid JSON: {e}")))?;

    if envelope.t != "d" {
        return Err(crate::error::Error::Decode(format!("invalid envelope type: {}", envelope.t)));
    }
    let body = envelope.d.ok_or_else(|| crate::error::Error::Decode("missing d".to_string()))?;
    let payload =
        body.b.ok_or_else(|| crate::error::Error::Decode("missing d.b".to_string()))?;

    let action = match body.a.as_str() {
        "p" => Action::Set,
        "m" => Action::Update,
        "l" | "q" => Action::Listen,
        "n" => Action::Unlisten,
        other => return Err(crate::error::Error::Decode(format!("invalid action: {other}"))),
    };

    let mut query = QueryDescriptor { id: payload.t, ..Default::default() };
    if let Some(q) = payload.q {
        query.start_at = q.sp;
        query.start_key = q.sn;
        query.end_at = q.ep;
        query.end_key = q.en;
        query.order_by = q.i;
        query.limit = q.l;
        query.limit_order = LimitOrder::from_wire(&q.vf);
    }

    Ok(Request { request_id: body.r, action, ref_: payload.p, data: payload.d, query })
}
