//! Signaling wire codec.
//!
//! The relay speaks JSON envelopes discriminated by a `what` field. Session
//! descriptions travel as a JSON string nested under `data`; ICE candidates
//! arrive nested under `data` and leave as top-level `candidate`/`id`/`label`
//! fields. Outgoing envelopes are serialized from structs whose fields are
//! declared in lexicographic order, so the output is byte-stable.

use super::candidate::Candidate;
use crate::errors::LinkError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Session description kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

impl SdpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SdpType::Offer => "offer",
            SdpType::Answer => "answer",
        }
    }
}

/// Session description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// ICE candidate with its media line binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: Candidate,
    pub sdp_mid: String,
    pub sdp_mline_index: u16,
}

impl IceCandidate {
    /// The candidate line as peer engines expect it, `candidate:` prefix included.
    pub fn candidate_line(&self) -> String {
        format!("candidate:{}", self.candidate)
    }
}

/// A decoded signaling message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingMessage {
    SessionDescription(SessionDescription),
    IceCandidate(IceCandidate),
    /// The remote finished gathering candidates.
    IceDone,
    Hangup,
}

impl SignalingMessage {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            SignalingMessage::SessionDescription(desc) => desc.kind.as_str(),
            SignalingMessage::IceCandidate(_) => "candidate",
            SignalingMessage::IceDone => "ice-done",
            SignalingMessage::Hangup => "hangup",
        }
    }
}

/// Options sent with the initial call request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallOptions {
    pub force_hw_vcodec: bool,
    pub trickle_ice: bool,
    pub vformat: u32,
}

impl From<&crate::config::SignalingConfig> for CallOptions {
    fn from(config: &crate::config::SignalingConfig) -> Self {
        Self {
            force_hw_vcodec: config.force_hw_vcodec,
            trickle_ice: config.trickle_ice,
            vformat: config.vformat,
        }
    }
}

#[derive(Serialize)]
struct CallEnvelope<'a> {
    options: &'a CallOptions,
    what: &'static str,
}

#[derive(Serialize)]
struct DescriptionEnvelope {
    data: String,
    what: &'static str,
}

#[derive(Serialize)]
struct DescriptionPayload<'a> {
    sdp: &'a str,
    #[serde(rename = "type")]
    kind: SdpType,
}

#[derive(Serialize)]
struct CandidateEnvelope<'a> {
    candidate: String,
    id: &'a str,
    label: u16,
    what: &'static str,
}

#[derive(Serialize)]
struct BareEnvelope {
    what: &'static str,
}

/// Encode the negotiation-intent message sent right after connecting.
pub fn call_request(options: &CallOptions) -> Result<String, LinkError> {
    Ok(serde_json::to_string(&CallEnvelope {
        options,
        what: "call",
    })?)
}

/// Encode a signaling message for the relay.
///
/// Session descriptions are always framed as `what: "answer"`; this client
/// only ever answers, and the relay keys on `what` alone. The nested `type`
/// still carries the description's real kind.
pub fn encode(msg: &SignalingMessage) -> Result<String, LinkError> {
    let text = match msg {
        SignalingMessage::SessionDescription(desc) => {
            let data = serde_json::to_string(&DescriptionPayload {
                sdp: &desc.sdp,
                kind: desc.kind,
            })?;
            serde_json::to_string(&DescriptionEnvelope {
                data,
                what: "answer",
            })?
        }
        SignalingMessage::IceCandidate(ice) => serde_json::to_string(&CandidateEnvelope {
            candidate: ice.candidate_line(),
            id: &ice.sdp_mid,
            label: ice.sdp_mline_index,
            what: "candidate",
        })?,
        SignalingMessage::IceDone => serde_json::to_string(&BareEnvelope {
            what: "iceCandidate",
        })?,
        SignalingMessage::Hangup => serde_json::to_string(&BareEnvelope { what: "hangup" })?,
    };
    Ok(text)
}

/// Decode one relay envelope.
pub fn decode(raw: &str) -> Result<SignalingMessage, LinkError> {
    let envelope = match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => map,
        _ => {
            return Err(LinkError::MalformedPayload(
                "Signaling envelope is not a JSON object".to_string(),
            ))
        }
    };

    let what = envelope
        .get("what")
        .and_then(Value::as_str)
        .ok_or_else(|| LinkError::MalformedPayload("Envelope has no 'what' field".to_string()))?;

    match what {
        "offer" | "answer" => decode_description(payload(&envelope)?),
        "iceCandidate" | "candidate" => decode_candidate(&envelope),
        "hangup" => Ok(SignalingMessage::Hangup),
        other => Err(LinkError::UnknownMessageType(other.to_string())),
    }
}

/// The envelope's `data` payload; empty when absent or `""`.
fn payload(envelope: &Map<String, Value>) -> Result<Map<String, Value>, LinkError> {
    match envelope.get("data") {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::String(text)) if text.is_empty() => Ok(Map::new()),
        Some(Value::String(text)) => match serde_json::from_str::<Value>(text)? {
            Value::Object(map) => Ok(map),
            _ => Err(LinkError::MalformedPayload(
                "Envelope data is not a JSON object".to_string(),
            )),
        },
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(_) => Err(LinkError::MalformedPayload(
            "Envelope data has unexpected type".to_string(),
        )),
    }
}

fn decode_description(payload: Map<String, Value>) -> Result<SignalingMessage, LinkError> {
    if payload.is_empty() {
        return Err(LinkError::MalformedPayload(
            "Session description payload is empty".to_string(),
        ));
    }
    let desc: SessionDescription = serde_json::from_value(Value::Object(payload))?;
    Ok(SignalingMessage::SessionDescription(desc))
}

fn decode_candidate(envelope: &Map<String, Value>) -> Result<SignalingMessage, LinkError> {
    let nested = payload(envelope)?;
    // Relay candidates are nested under `data`; our own are top-level.
    let fields = if nested.contains_key("candidate") {
        &nested
    } else {
        envelope
    };

    let line = match fields.get("candidate") {
        None | Some(Value::Null) => return Ok(SignalingMessage::IceDone),
        Some(Value::String(line)) if line.is_empty() => return Ok(SignalingMessage::IceDone),
        Some(Value::String(line)) => line,
        Some(_) => {
            return Err(LinkError::MalformedPayload(
                "Candidate field is not a string".to_string(),
            ))
        }
    };

    let (_, sdp) = line.split_once(':').ok_or_else(|| {
        LinkError::MalformedPayload(format!("Candidate line has no prefix: {}", line))
    })?;
    let candidate = Candidate::from_sdp(sdp)?;

    let sdp_mid = match fields.get("sdpMid").or_else(|| fields.get("id")) {
        Some(Value::String(mid)) => mid.clone(),
        Some(Value::Number(mid)) => mid.to_string(),
        _ => "0".to_string(),
    };
    let sdp_mline_index = fields
        .get("sdpMLineIndex")
        .or_else(|| fields.get("label"))
        .and_then(Value::as_u64)
        .map(u16::try_from)
        .transpose()
        .map_err(|_| LinkError::MalformedPayload("sdpMLineIndex out of range".to_string()))?
        .unwrap_or(0);

    Ok(SignalingMessage::IceCandidate(IceCandidate {
        candidate,
        sdp_mid,
        sdp_mline_index,
    }))
}
