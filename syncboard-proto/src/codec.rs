//! JSON encoding and decoding of `{type, payload}` envelopes.
//!
//! Decoding happens in two steps: the raw envelope is parsed first so an
//! unknown or misdirected `type` can be reported as such, then the payload is
//! parsed into the typed event.

use serde::Deserialize;

use crate::event::{ClientCommand, EventType, ServerEvent};

/// An inbound frame could not be turned into an event.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The frame is not a JSON object with a string `type`.
    #[error("malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),
    /// The `type` is not part of the protocol.
    #[error("unknown event type: {0}")]
    UnknownType(String),
    /// The `type` is valid but travels in the other direction.
    #[error("unexpected {0} event in this direction")]
    UnexpectedDirection(EventType),
    /// The payload does not match the shape of its `type`.
    #[error("invalid {event_type} payload: {source}")]
    Payload {
        /// Declared type of the frame.
        event_type: EventType,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
    /// Serializing an outbound value failed.
    #[error("serialization error: {0}")]
    Serialization(#[source] serde_json::Error),
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    payload: serde_json::Value,
}

fn classify(text: &str, inbound: bool) -> Result<(EventType, serde_json::Value), ProtocolError> {
    let raw: RawEnvelope = serde_json::from_str(text).map_err(ProtocolError::Malformed)?;
    let event_type =
        EventType::parse(&raw.event_type).ok_or(ProtocolError::UnknownType(raw.event_type))?;
    if event_type.is_inbound() != inbound {
        return Err(ProtocolError::UnexpectedDirection(event_type));
    }
    Ok((event_type, raw.payload))
}

fn rebuild(event_type: EventType, payload: serde_json::Value) -> serde_json::Value {
    serde_json::json!({ "type": event_type.as_str(), "payload": payload })
}

/// Decodes a server-to-client frame.
///
/// # Errors
///
/// Returns a [`ProtocolError`] describing why the frame was rejected. The
/// caller is expected to log and drop the frame.
pub fn decode_event(text: &str) -> Result<ServerEvent, ProtocolError> {
    let (event_type, payload) = classify(text, true)?;
    serde_json::from_value(rebuild(event_type, payload))
        .map_err(|source| ProtocolError::Payload { event_type, source })
}

/// Decodes a client-to-server frame.
///
/// # Errors
///
/// Returns a [`ProtocolError`] describing why the frame was rejected.
pub fn decode_command(text: &str) -> Result<ClientCommand, ProtocolError> {
    let (event_type, payload) = classify(text, false)?;
    serde_json::from_value(rebuild(event_type, payload))
        .map_err(|source| ProtocolError::Payload { event_type, source })
}

/// Encodes a client command as a text frame.
///
/// # Errors
///
/// Returns [`ProtocolError::Serialization`] if the command cannot be
/// serialized.
pub fn encode_command(command: &ClientCommand) -> Result<String, ProtocolError> {
    serde_json::to_string(command).map_err(ProtocolError::Serialization)
}

/// Encodes a server event as a text frame.
///
/// # Errors
///
/// Returns [`ProtocolError::Serialization`] if the event cannot be serialized.
pub fn encode_event(event: &ServerEvent) -> Result<String, ProtocolError> {
    serde_json::to_string(event).map_err(ProtocolError::Serialization)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Board;

    #[test]
    fn decodes_board_sync() {
        let text = r#"{"type":"board.sync","payload":{"board":{"id":"b1","name":"B","columns":[]}}}"#;
        let event = decode_event(text).unwrap();
        assert!(matches!(event, ServerEvent::BoardSync { ref board } if board.id.as_str() == "b1"));
    }

    #[test]
    fn decodes_snapshot_with_nested_columns_lacking_board_id() {
        let text = r##"{"type":"board.sync","payload":{"board":{
            "id":"b1","name":"B","team_id":"team-1","description":null,
            "columns":[
                {"id":"A","name":"Todo","position":0,"color":"#fff","tasks":[
                    {"id":"t1","column_id":"A","title":"one","position":0,"priority":"low"},
                    {"id":"t2","column_id":"A","title":"two","position":1,"priority":"urgent"}
                ]},
                {"id":"B","name":"Done","position":1,"color":"#0f0","tasks":[]}
            ]}}}"##;
        let ServerEvent::BoardSync { mut board } = decode_event(text).unwrap() else {
            panic!("expected board.sync");
        };
        assert_eq!(board.columns.len(), 2);
        assert_eq!(board.columns[0].tasks.len(), 2);

        board.normalize();
        assert!(board.columns.iter().all(|c| c.board_id.as_str() == "b1"));
        assert!(board.is_dense());
    }

    #[test]
    fn not_json_is_malformed() {
        assert!(matches!(
            decode_event("not json"),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn missing_type_is_malformed() {
        assert!(matches!(
            decode_event(r#"{"payload":{}}"#),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn unknown_type_is_reported_by_name() {
        match decode_event(r#"{"type":"board.exploded","payload":{}}"#) {
            Err(ProtocolError::UnknownType(t)) => assert_eq!(t, "board.exploded"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn outbound_type_rejected_inbound() {
        assert!(matches!(
            decode_event(r#"{"type":"task.move","payload":{}}"#),
            Err(ProtocolError::UnexpectedDirection(EventType::TaskMove))
        ));
        assert!(matches!(
            decode_command(r#"{"type":"task.moved","payload":{}}"#),
            Err(ProtocolError::UnexpectedDirection(EventType::TaskMoved))
        ));
    }

    #[test]
    fn bad_payload_names_the_type() {
        let err = decode_event(r#"{"type":"task.deleted","payload":{"task_id":7}}"#).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Payload {
                event_type: EventType::TaskDeleted,
                ..
            }
        ));
        assert!(err.to_string().contains("task.deleted"));
    }

    #[test]
    fn command_encodes_and_hub_decodes() {
        let cmd = ClientCommand::ColumnMove {
            column_id: "c1".into(),
            position: 2,
        };
        let text = encode_command(&cmd).unwrap();
        assert_eq!(decode_command(&text).unwrap(), cmd);
    }

    #[test]
    fn non_finite_cursor_is_rejected_by_receiver() {
        let cmd = ClientCommand::PresenceCursor {
            x: f64::NAN,
            y: 0.0,
        };
        // serde_json writes NaN as null, which the receiver rejects.
        let text = encode_command(&cmd).unwrap();
        assert!(decode_command(&text).is_err());
    }

    #[test]
    fn encoded_event_decodes() {
        let event = ServerEvent::BoardSync {
            board: Board::new("b1", "Board"),
        };
        let text = encode_event(&event).unwrap();
        assert_eq!(decode_event(&text).unwrap(), event);
    }
}
