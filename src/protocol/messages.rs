use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ProtocolError;

/// Tag key carried by every control message
pub const TYPE_KEY: &str = "MESSAGE_TYPE";

/// Older backend builds tag their replies with `type` instead
const LEGACY_TYPE_KEY: &str = "type";

const KNOWN_SERVER_TYPES: [&str; 4] = ["ACK", "START_ACK", "STOP_ACK", "ERROR"];

/// Metadata sent ahead of each binary frame payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct FrameHeader {
    pub recording_id: String,
    /// Sequence number, string-encoded on the wire
    #[serde(
        serialize_with = "serialize_as_string",
        deserialize_with = "deserialize_frame_no"
    )]
    pub frame_no: u64,
    pub frame_duration_in_ms: u64,
    /// Byte count of the binary message that follows
    pub bytes_len: usize,
}

/// Control messages sent by the client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "MESSAGE_TYPE", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    Start {
        recording_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        audio_stream_file_name: Option<String>,
    },
    Frame(FrameHeader),
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    Stop { recording_id: String },
}

impl ClientMessage {
    pub fn to_text(&self) -> String {
        // Plain structs of strings and integers cannot fail to serialize
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Frame acknowledgement; `missing_frames` drives retransmission
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AckMessage {
    #[serde(default)]
    pub recording_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_frame_no")]
    pub frame_no: Option<u64>,
    #[serde(default)]
    pub next_expected_frame_no: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_frame_list")]
    pub missing_frames: Vec<u64>,
}

/// Messages received from the backend
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "MESSAGE_TYPE", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    Ack(AckMessage),
    StartAck {
        #[serde(rename = "RECORDING_ID", default)]
        recording_id: Option<String>,
    },
    StopAck {
        #[serde(rename = "RECORDING_ID", default)]
        recording_id: Option<String>,
    },
    Error {
        #[serde(default)]
        reason: String,
    },
}

impl ServerMessage {
    /// Parse an inbound text message into a known variant
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let mut value: serde_json::Value = serde_json::from_str(text)?;
        let object = value.as_object_mut().ok_or(ProtocolError::MissingType)?;

        if !object.contains_key(TYPE_KEY) {
            if let Some(tag) = object.remove(LEGACY_TYPE_KEY) {
                object.insert(TYPE_KEY.to_string(), tag);
            }
        }

        let kind = object
            .get(TYPE_KEY)
            .and_then(|tag| tag.as_str())
            .ok_or(ProtocolError::MissingType)?
            .to_string();

        if !KNOWN_SERVER_TYPES.contains(&kind.as_str()) {
            return Err(ProtocolError::UnknownType(kind));
        }

        Ok(serde_json::from_value(value)?)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FrameNoRepr {
    Number(u64),
    Text(String),
}

impl FrameNoRepr {
    fn into_u64<E: serde::de::Error>(self) -> Result<u64, E> {
        match self {
            FrameNoRepr::Number(n) => Ok(n),
            FrameNoRepr::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid frame number: {s}"))),
        }
    }
}

fn serialize_as_string<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_string())
}

fn deserialize_frame_no<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    FrameNoRepr::deserialize(deserializer)?.into_u64()
}

fn deserialize_optional_frame_no<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<u64>, D::Error> {
    Option::<FrameNoRepr>::deserialize(deserializer)?
        .map(FrameNoRepr::into_u64)
        .transpose()
}

fn deserialize_frame_list<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<u64>, D::Error> {
    Option::<Vec<FrameNoRepr>>::deserialize(deserializer)?
        .unwrap_or_default()
        .into_iter()
        .map(FrameNoRepr::into_u64)
        .collect()
}
