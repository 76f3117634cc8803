use serde::{Deserialize, Serialize};

/// Outbound wire envelope carried to the relay. The absence of a `type`
/// field marks it as an offer; the relay routes on `roomId`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SignalingMessage {
    pub name: String,
    pub room_id: String,
    pub sdp: String,
}

/// Inbound wire envelope. Only `type == "answer"` is meaningful for this
/// side of the exchange; everything else is dropped by the dispatcher.
#[derive(Deserialize, Debug)]
pub struct InboundEnvelope {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub sdp: Option<String>,
}
