use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::state::PixelOp;

/// Why an inbound frame produced an `error` reply. The connection stays
/// open in every case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("Failed to parse message!")]
    Parse,
    #[error("Data missing type!")]
    MissingType,
    #[error("Unknown command!")]
    Unknown,
}

/// Every message a client can send, closed over the protocol.
///
/// Payload fields deserialize leniently: a missing or wrongly-typed field
/// becomes `None` and the handler drops the message silently, mirroring
/// the tolerant behavior clients already rely on.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Ping,
    GetMap,
    GetOrders,
    Brand {
        #[serde(default, deserialize_with = "lenient_string")]
        brand: Option<String>,
    },
    PlacePixel {
        #[serde(default, deserialize_with = "lenient_i64")]
        x: Option<i64>,
        #[serde(default, deserialize_with = "lenient_i64")]
        y: Option<i64>,
        #[serde(default, deserialize_with = "lenient_i64")]
        color: Option<i64>,
    },
}

/// Every frame the server sends. Borrows its payload so broadcast
/// serialization never clones the order list.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame<'a> {
    Pong,
    Map {
        data: &'a str,
        reason: Option<&'a str>,
    },
    Orders {
        data: &'a [PixelOp],
        reason: Option<&'a str>,
    },
    Error {
        data: &'a str,
    },
}

impl ServerFrame<'_> {
    pub fn to_json(&self) -> String {
        // Serialization of these frames cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Parses one inbound text frame. Type matching is case-insensitive.
pub fn parse_frame(text: &str) -> Result<ClientMessage, FrameError> {
    let mut value: Value = serde_json::from_str(text).map_err(|_| FrameError::Parse)?;
    let tag = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(FrameError::MissingType)?
        .to_ascii_lowercase();
    value["type"] = Value::String(tag);
    serde_json::from_value(value).map_err(|_| FrameError::Unknown)
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(value.as_str().map(str::to_string))
}

fn lenient_i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(value.as_i64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_commands() {
        assert_eq!(parse_frame(r#"{"type":"ping"}"#), Ok(ClientMessage::Ping));
        assert_eq!(parse_frame(r#"{"type":"getmap"}"#), Ok(ClientMessage::GetMap));
        assert_eq!(
            parse_frame(r#"{"type":"getorders"}"#),
            Ok(ClientMessage::GetOrders)
        );
    }

    #[test]
    fn type_is_case_insensitive() {
        assert_eq!(parse_frame(r#"{"type":"PING"}"#), Ok(ClientMessage::Ping));
        assert_eq!(
            parse_frame(r#"{"type":"PlacePixel","x":1,"y":2,"color":3}"#),
            Ok(ClientMessage::PlacePixel {
                x: Some(1),
                y: Some(2),
                color: Some(3),
            })
        );
    }

    #[test]
    fn malformed_frames_map_to_the_right_error() {
        assert_eq!(parse_frame("not json"), Err(FrameError::Parse));
        assert_eq!(parse_frame(r#"{"data":1}"#), Err(FrameError::MissingType));
        assert_eq!(parse_frame("5"), Err(FrameError::MissingType));
        assert_eq!(
            parse_frame(r#"{"type":"teleport"}"#),
            Err(FrameError::Unknown)
        );
    }

    #[test]
    fn placepixel_fields_degrade_to_none() {
        assert_eq!(
            parse_frame(r#"{"type":"placepixel","x":"five","y":5}"#),
            Ok(ClientMessage::PlacePixel {
                x: None,
                y: Some(5),
                color: None,
            })
        );
    }

    #[test]
    fn brand_field_degrades_to_none() {
        assert_eq!(
            parse_frame(r#"{"type":"brand","brand":12}"#),
            Ok(ClientMessage::Brand { brand: None })
        );
        assert_eq!(
            parse_frame(r#"{"type":"brand","brand":"osu"}"#),
            Ok(ClientMessage::Brand {
                brand: Some("osu".to_string())
            })
        );
    }

    #[test]
    fn server_frames_serialize_with_type_tags() {
        assert_eq!(ServerFrame::Pong.to_json(), r#"{"type":"pong"}"#);
        assert_eq!(
            ServerFrame::Map {
                data: "123.png",
                reason: Some("new art"),
            }
            .to_json(),
            r#"{"type":"map","data":"123.png","reason":"new art"}"#
        );
        let ops = [PixelOp { x: 1, y: 2, color: 3 }];
        assert_eq!(
            ServerFrame::Orders {
                data: &ops,
                reason: None,
            }
            .to_json(),
            r#"{"type":"orders","data":[{"x":1,"y":2,"color":3}],"reason":null}"#
        );
        assert_eq!(
            ServerFrame::Error {
                data: "Unknown command!",
            }
            .to_json(),
            r#"{"type":"error","data":"Unknown command!"}"#
        );
    }
}
