//! SDP-form ICE candidates.
//!
//! Parses and renders the attribute value of an `a=candidate:` line
//! (RFC 8839 §5.1), without the `candidate:` prefix:
//!
//! ```text
//! 842163049 1 udp 1677729535 203.0.113.7 46154 typ srflx raddr 10.0.0.4 rport 46154 generation 0
//! ```

use crate::errors::LinkError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Candidate type as carried after the `typ` keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandidateType {
    Host,
    Srflx,
    Prflx,
    Relay,
}

impl CandidateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateType::Host => "host",
            CandidateType::Srflx => "srflx",
            CandidateType::Prflx => "prflx",
            CandidateType::Relay => "relay",
        }
    }
}

impl FromStr for CandidateType {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "host" => Ok(CandidateType::Host),
            "srflx" => Ok(CandidateType::Srflx),
            "prflx" => Ok(CandidateType::Prflx),
            "relay" => Ok(CandidateType::Relay),
            other => Err(LinkError::MalformedPayload(format!(
                "Unknown candidate type: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for CandidateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed ICE candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub foundation: String,
    pub component: u16,
    /// Transport as written on the wire (`udp`, `UDP`, `tcp`)
    pub protocol: String,
    pub priority: u32,
    pub address: String,
    pub port: u16,
    pub kind: CandidateType,
    pub related_address: Option<String>,
    pub related_port: Option<u16>,
    pub tcp_type: Option<String>,
    /// Trailing `key value` pairs such as `generation 0` or `ufrag abcd`
    pub extensions: Vec<(String, String)>,
}

impl Candidate {
    /// Parse the SDP form (no `candidate:` prefix).
    pub fn from_sdp(sdp: &str) -> Result<Self, LinkError> {
        let bits: Vec<&str> = sdp.split_whitespace().collect();
        if bits.len() < 8 {
            return Err(malformed(sdp, "expected at least 8 fields"));
        }
        if bits[6] != "typ" {
            return Err(malformed(sdp, "missing typ keyword"));
        }

        let mut candidate = Candidate {
            foundation: bits[0].to_string(),
            component: bits[1].parse().map_err(|_| malformed(sdp, "bad component"))?,
            protocol: bits[2].to_string(),
            priority: bits[3].parse().map_err(|_| malformed(sdp, "bad priority"))?,
            address: bits[4].to_string(),
            port: bits[5].parse().map_err(|_| malformed(sdp, "bad port"))?,
            kind: bits[7].parse()?,
            related_address: None,
            related_port: None,
            tcp_type: None,
            extensions: Vec::new(),
        };

        for pair in bits[8..].chunks(2) {
            let [key, value] = pair else {
                log::debug!("Ignoring unpaired candidate attribute {:?}", pair);
                continue;
            };
            match *key {
                "raddr" => candidate.related_address = Some(value.to_string()),
                "rport" => {
                    candidate.related_port =
                        Some(value.parse().map_err(|_| malformed(sdp, "bad rport"))?)
                }
                "tcptype" => candidate.tcp_type = Some(value.to_string()),
                _ => candidate.extensions.push((key.to_string(), value.to_string())),
            }
        }

        Ok(candidate)
    }

    /// Render the SDP form (no `candidate:` prefix).
    pub fn to_sdp(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} typ {}",
            self.foundation, self.component, self.protocol, self.priority, self.address, self.port, self.kind
        )?;
        if let Some(raddr) = &self.related_address {
            write!(f, " raddr {}", raddr)?;
        }
        if let Some(rport) = self.related_port {
            write!(f, " rport {}", rport)?;
        }
        if let Some(tcp_type) = &self.tcp_type {
            write!(f, " tcptype {}", tcp_type)?;
        }
        for (key, value) in &self.extensions {
            write!(f, " {} {}", key, value)?;
        }
        Ok(())
    }
}

impl FromStr for Candidate {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Candidate::from_sdp(s)
    }
}

fn malformed(sdp: &str, reason: &str) -> LinkError {
    LinkError::MalformedPayload(format!("Invalid ICE candidate '{}': {}", sdp, reason))
}
