//! Property-Based Tests for the signaling codec and control encoding
//!
//! Run with: cargo test --test codec_props

use proptest::prelude::*;
use spinny_link::config::ControlConfig;
use spinny_link::control::{actuation_delay, decode_steps, encode_steps};
use spinny_link::signaling::{decode, encode, Candidate, CandidateType, IceCandidate, SessionDescription, SignalingMessage};

fn candidate_type() -> impl Strategy<Value = CandidateType> {
    prop_oneof![
        Just(CandidateType::Host),
        Just(CandidateType::Srflx),
        Just(CandidateType::Prflx),
        Just(CandidateType::Relay),
    ]
}

prop_compose! {
    fn candidate()(
        foundation in "[a-zA-Z0-9+/]{1,32}",
        component in 1u16..3,
        protocol in prop_oneof![Just("udp"), Just("UDP"), Just("tcp")],
        priority in any::<u32>(),
        address in "(([0-9]{1,3}\\.){3}[0-9]{1,3})|([a-f0-9-]{8,36}\\.local)",
        port in any::<u16>(),
        kind in candidate_type(),
        related in proptest::option::of(("10\\.0\\.[0-9]{1,3}\\.[0-9]{1,3}", any::<u16>())),
        generation in proptest::option::of(0u32..8),
    ) -> Candidate {
        Candidate {
            foundation,
            component,
            protocol: protocol.to_string(),
            priority,
            address,
            port,
            kind,
            related_address: related.as_ref().map(|(addr, _)| addr.clone()),
            related_port: related.map(|(_, port)| port),
            tcp_type: if protocol == "tcp" { Some("passive".to_string()) } else { None },
            extensions: generation
                .map(|g| vec![("generation".to_string(), g.to_string())])
                .unwrap_or_default(),
        }
    }
}

proptest! {
    // ═══════════════════════════════════════════════════════════════════════════
    // CONTROL ENCODING
    // ═══════════════════════════════════════════════════════════════════════════

    /// INVARIANT: Every step count is exactly two big-endian bytes
    #[test]
    fn steps_encode_to_two_big_endian_bytes(steps in any::<i16>()) {
        let bytes = encode_steps(steps);
        prop_assert_eq!(bytes.len(), 2);
        prop_assert_eq!(decode_steps(&bytes), Some(steps));
        prop_assert_eq!((bytes[0] as i8) < 0, steps < 0);
    }

    /// INVARIANT: Payloads of any other length are rejected
    #[test]
    fn wrong_length_payloads_rejected(data in proptest::collection::vec(any::<u8>(), 0..8)) {
        prop_assume!(data.len() != 2);
        prop_assert_eq!(decode_steps(&data), None);
    }

    /// INVARIANT: Actuation delay depends only on |steps| and grows with it
    #[test]
    fn actuation_delay_symmetric_and_monotonic(a in -2000i16..2000, b in -2000i16..2000) {
        let timing = ControlConfig::default();
        prop_assert_eq!(actuation_delay(&timing, a), actuation_delay(&timing, -a));
        if a.unsigned_abs() <= b.unsigned_abs() {
            prop_assert!(actuation_delay(&timing, a) <= actuation_delay(&timing, b));
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SIGNALING CODEC
    // ═══════════════════════════════════════════════════════════════════════════

    /// INVARIANT: Decoding arbitrary text never panics
    #[test]
    fn decode_never_panics(raw in ".{0,256}") {
        let _ = decode(&raw);
    }

    /// INVARIANT: Decoding arbitrary `what` values either succeeds or reports the type
    #[test]
    fn unknown_types_are_reported(what in "[a-z]{1,12}") {
        let raw = serde_json::json!({ "what": what }).to_string();
        match decode(&raw) {
            Ok(_) => prop_assert!(["hangup", "candidate"].contains(&what.as_str())),
            Err(e) => prop_assert!(e.is_fatal()),
        }
    }

    /// INVARIANT: Candidates survive SDP rendering and parsing
    #[test]
    fn candidate_sdp_round_trip(c in candidate()) {
        let sdp = c.to_sdp();
        prop_assert_eq!(Candidate::from_sdp(&sdp).unwrap(), c);
    }

    /// INVARIANT: Encoded candidates decode to the same candidate and binding
    #[test]
    fn candidate_envelope_round_trip(c in candidate(), mid in "[a-z0-9]{1,8}", index in 0u16..16) {
        let msg = SignalingMessage::IceCandidate(IceCandidate {
            candidate: c,
            sdp_mid: mid,
            sdp_mline_index: index,
        });
        let raw = encode(&msg).unwrap();
        prop_assert_eq!(decode(&raw).unwrap(), msg);
    }

    /// INVARIANT: Descriptions always leave framed as answers, sdp intact
    #[test]
    fn descriptions_framed_as_answer(sdp in "[ -~\r\n]{0,200}", offer in any::<bool>()) {
        let desc = if offer { SessionDescription::offer(sdp) } else { SessionDescription::answer(sdp) };
        let raw = encode(&SignalingMessage::SessionDescription(desc.clone())).unwrap();
        let envelope: serde_json::Value = serde_json::from_str(&raw).unwrap();
        prop_assert_eq!(envelope["what"].as_str(), Some("answer"));
        prop_assert_eq!(decode(&raw).unwrap(), SignalingMessage::SessionDescription(desc));
    }
}
