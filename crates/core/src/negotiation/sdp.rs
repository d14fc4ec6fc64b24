//! SDP pre-parse and anonymization (spec §4.5).
//!
//! The SDP parser/rewriter *internals* are an out-of-scope external
//! collaborator (spec §1); this module only does the lightweight,
//! line-oriented work the negotiation state machine needs directly:
//! counting media lines, spotting the transport-wide-cc extension, and
//! stripping ICE/DTLS material before an SDP is stored or logged.
//!
//! Line-oriented `Vec<&str>` handling here mirrors the teacher's
//! `protocol::sdp::generate_sdp`, which builds SDP the same line-at-a-time
//! way in the opposite direction.

const TRANSPORT_WIDE_CC_URI: &str =
    "http://www.ietf.org/id/draft-holmer-rmcat-transport-wide-cc-extensions-01";

/// Counts of negotiated media lines (spec §4.5: "more than one line of any
/// kind is accepted but only the first is negotiated").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaCounts {
    pub audio: u32,
    pub video: u32,
    pub data: u32,
}

impl MediaCounts {
    pub fn has_audio(&self) -> bool {
        self.audio > 0
    }
    pub fn has_video(&self) -> bool {
        self.video > 0
    }
    pub fn has_data(&self) -> bool {
        self.data > 0
    }
}

/// Pre-parse an SDP body into the counts the negotiation state machine
/// checks before handing anything to the ICE agent.
pub fn count_media_lines(sdp: &str) -> MediaCounts {
    let mut counts = MediaCounts::default();
    for line in sdp.lines() {
        if let Some(rest) = line.strip_prefix("m=") {
            if rest.starts_with("audio") {
                counts.audio += 1;
            } else if rest.starts_with("video") {
                counts.video += 1;
            } else if rest.starts_with("application") {
                counts.data += 1;
            }
        }
    }
    if counts.audio > 1 {
        tracing::warn!(count = counts.audio, "multiple audio m-lines, negotiating only the first");
    }
    if counts.video > 1 {
        tracing::warn!(count = counts.video, "multiple video m-lines, negotiating only the first");
    }
    if counts.data > 1 {
        tracing::warn!(count = counts.data, "multiple data m-lines, negotiating only the first");
    }
    counts
}

/// Returns the transport-wide-cc RTP header extension id, if the SDP
/// advertises it (spec §4.5: "record transport-wide-CC extension id if
/// present").
pub fn transport_wide_cc_ext_id(sdp: &str) -> Option<u8> {
    for line in sdp.lines() {
        if let Some(rest) = line.strip_prefix("a=extmap:") {
            let mut parts = rest.split_whitespace();
            let id_part = parts.next()?;
            let uri = parts.next()?;
            if uri == TRANSPORT_WIDE_CC_URI {
                // id may carry a direction suffix, e.g. "3/sendonly".
                let id_str = id_part.split('/').next()?;
                return id_str.parse().ok();
            }
        }
    }
    None
}

/// Detect a `SIM` ssrc-group line and report its ssrcs as the simulcast
/// descriptor a fresh offer's module payload carries (spec §4.5: "a
/// simulcast SSRC descriptor `{ssrc-0, ssrc-1, ssrc-2?}`"). Returns `None`
/// when no simulcast group is advertised.
pub fn detect_simulcast(sdp: &str) -> Option<serde_json::Value> {
    for line in sdp.lines() {
        let Some(rest) = line.strip_prefix("a=ssrc-group:SIM ") else {
            continue;
        };
        let mut ssrcs = rest.split_whitespace();
        let (Some(ssrc0), Some(ssrc1)) = (
            ssrcs.next().and_then(|s| s.parse::<u32>().ok()),
            ssrcs.next().and_then(|s| s.parse::<u32>().ok()),
        ) else {
            continue;
        };
        let ssrc2: Option<u32> = ssrcs.next().and_then(|s| s.parse().ok());
        let mut descriptor = serde_json::json!({
            "ssrc-0": ssrc0,
            "ssrc-1": ssrc1,
        });
        if let Some(ssrc2) = ssrc2 {
            descriptor["ssrc-2"] = serde_json::json!(ssrc2);
        }
        return Some(descriptor);
    }
    None
}

/// Strip ICE/DTLS material from an SDP before storing or forwarding it
/// (spec §4.5: "anonymize the incoming SDP (strip candidates, credentials,
/// fingerprints)"). Non-matching lines pass through unchanged.
pub fn anonymize(sdp: &str) -> String {
    let mut out = Vec::with_capacity(sdp.lines().count());
    for line in sdp.lines() {
        if line.starts_with("a=candidate")
            || line.starts_with("a=ice-ufrag")
            || line.starts_with("a=ice-pwd")
            || line.starts_with("a=ice-options")
            || line.starts_with("a=fingerprint")
            || line.starts_with("a=end-of-candidates")
        {
            continue;
        }
        out.push(line);
    }
    let mut rendered = out.join("\r\n");
    rendered.push_str("\r\n");
    rendered
}
