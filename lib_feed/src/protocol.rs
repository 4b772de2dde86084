//! # Wire Protocol
//!
//! Every frame is a UTF-8 JSON object with a mandatory `type` field.
//!
//! Outbound: `getDatasets`, `selectDataset`.
//! Inbound: `init`, `datasetSelected`, `status`, `data`; anything else is
//! decoded as [`InboundMessage::Unknown`] so the receive loop can discard it.

use serde::Serialize;
use serde_json::Value;

use crate::catalog::{Catalog, DatasetDescriptor};
use crate::error::{FeedError, FeedResult};

/// Frames sent to the emulator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutboundMessage {
    /// Asks the server for its catalog. First frame on every connection.
    GetDatasets,
    /// Asks the server to start streaming one dataset.
    #[serde(rename_all = "camelCase")]
    SelectDataset { file_path: String, dataset_index: usize },
}

impl OutboundMessage {
    pub fn select(descriptor: &DatasetDescriptor) -> Self {
        OutboundMessage::SelectDataset {
            file_path: descriptor.path.clone(),
            dataset_index: descriptor.index,
        }
    }

    /// Serializes the message into a text frame.
    pub fn to_frame(&self) -> FeedResult<String> {
        serde_json::to_string(self).map_err(|e| FeedError::Protocol(e.to_string()))
    }
}

/// Frames received from the emulator.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Full catalog; replaces whatever the session had.
    Init { catalog: Catalog },
    /// Server confirmation of a selection.
    DatasetSelected { name: Option<String>, path: Option<String> },
    /// Free-form status text.
    Status { message: String },
    /// One live feed payload (the whole frame).
    Data { payload: Value },
    /// A well-formed frame with a `type` this client does not handle.
    Unknown { kind: String, payload: Value },
}

impl InboundMessage {
    /// Decodes one text frame.
    ///
    /// # Errors
    /// [`FeedError::Protocol`] when the frame is not JSON, has no string
    /// `type`, or a known type is missing its required fields.
    pub fn decode(text: &str) -> FeedResult<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| FeedError::Protocol(format!("frame is not valid JSON: {}", e)))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> FeedResult<Self> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| FeedError::Protocol("frame has no string 'type' field".to_string()))?
            .to_string();

        match kind.as_str() {
            "init" => {
                let datasets = value.get("availableDatasets").ok_or_else(|| {
                    FeedError::Protocol("init frame has no 'availableDatasets'".to_string())
                })?;
                Ok(InboundMessage::Init { catalog: Catalog::from_value(datasets)? })
            }
            "datasetSelected" => Ok(InboundMessage::DatasetSelected {
                name: string_field(&value, "name"),
                path: string_field(&value, "path"),
            }),
            "status" => {
                let message = string_field(&value, "message").ok_or_else(|| {
                    FeedError::Protocol("status frame has no string 'message'".to_string())
                })?;
                Ok(InboundMessage::Status { message })
            }
            "data" => Ok(InboundMessage::Data { payload: value }),
            _ => Ok(InboundMessage::Unknown { kind: kind.clone(), payload: value }),
        }
    }

    /// The `type` discriminator this message was decoded from.
    pub fn kind(&self) -> &str {
        match self {
            InboundMessage::Init { .. } => "init",
            InboundMessage::DatasetSelected { .. } => "datasetSelected",
            InboundMessage::Status { .. } => "status",
            InboundMessage::Data { .. } => "data",
            InboundMessage::Unknown { kind, .. } => kind.as_str(),
        }
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outbound_frames_match_wire_shape() {
        assert_eq!(
            OutboundMessage::GetDatasets.to_frame().unwrap(),
            r#"{"type":"getDatasets"}"#
        );

        let descriptor = DatasetDescriptor {
            category: "EEG".to_string(),
            name: "a.csv".to_string(),
            path: "/d/a.csv".to_string(),
            index: 1,
        };
        assert_eq!(
            OutboundMessage::select(&descriptor).to_frame().unwrap(),
            r#"{"type":"selectDataset","filePath":"/d/a.csv","datasetIndex":1}"#
        );
    }

    #[test]
    fn test_decode_init() {
        let msg = InboundMessage::decode(
            r#"{"type":"init","availableDatasets":{"EEG":[{"filename":"a.csv","path":"/d/a.csv"}]}}"#,
        )
        .unwrap();
        match msg {
            InboundMessage::Init { catalog } => assert_eq!(catalog.len(), 1),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_decode_dataset_selected_with_optional_fields() {
        assert_eq!(
            InboundMessage::decode(r#"{"type":"datasetSelected","path":"/d/a.csv"}"#).unwrap(),
            InboundMessage::DatasetSelected { name: None, path: Some("/d/a.csv".to_string()) }
        );
    }

    #[test]
    fn test_decode_data_keeps_whole_frame() {
        let frame = json!({"type": "data", "values": [1, 2, 3]});
        let msg = InboundMessage::from_value(frame.clone()).unwrap();
        assert_eq!(msg, InboundMessage::Data { payload: frame });
        assert_eq!(msg.kind(), "data");
    }

    #[test]
    fn test_unknown_type_is_not_an_error() {
        let msg = InboundMessage::decode(r#"{"type":"heartbeat"}"#).unwrap();
        assert_eq!(msg.kind(), "heartbeat");
    }

    #[test]
    fn test_malformed_frames_are_protocol_errors() {
        for frame in [
            "not json",
            r#"{"message":"no type"}"#,
            r#"{"type":7}"#,
            r#"{"type":"status"}"#,
            r#"{"type":"init"}"#,
            r#"{"type":"init","availableDatasets":[]}"#,
        ] {
            assert!(
                matches!(InboundMessage::decode(frame), Err(FeedError::Protocol(_))),
                "frame should be rejected: {}",
                frame
            );
        }
    }
}
