//! Envelope <-> frame conversion.
//!
//! The first frame part is the command tag; the number of remaining parts
//! selects the shape. `REGISTER` and `LIST` each have two shapes, one per
//! direction, told apart by arity alone.

use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use prost::Message;
use thiserror::Error;

use crate::{
    envelope::{Command, Envelope, UserProfile},
    frame::Frame,
};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("empty frame")]
    Empty,
    #[error("unknown command {tag:?}")]
    UnknownCommand { tag: String },
    #[error("{command} does not take {fields} field(s)")]
    MalformedEnvelope { command: Command, fields: usize },
    #[error("{field} is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },
    #[error("invalid user profile: {0}")]
    InvalidProfile(#[from] prost::DecodeError),
    #[error("name list is not valid base64: {0}")]
    InvalidNameEncoding(#[from] base64::DecodeError),
    #[error("name list is not a JSON array of strings: {0}")]
    InvalidNameList(#[from] serde_json::Error),
}

pub fn encode(envelope: &Envelope) -> Frame {
    let tag = Bytes::from_static(envelope.command().as_bytes());
    let fields = match envelope {
        Envelope::Register { name, profile } => {
            vec![Bytes::from(name.clone()), Bytes::from(profile.encode_to_vec())]
        }
        Envelope::RegisterAck { text } | Envelope::Err { text } => vec![Bytes::from(text.clone())],
        Envelope::List => Vec::new(),
        Envelope::ListReply { names } => vec![encode_names(names)],
        Envelope::Send {
            destination,
            payload,
        } => vec![Bytes::from(destination.clone()), payload.clone()],
        Envelope::Msg { payload } => vec![payload.clone()],
    };

    std::iter::once(tag).chain(fields).collect()
}

pub fn decode(frame: &Frame) -> Result<Envelope, DecodeError> {
    let (tag, fields) = frame.parts().split_first().ok_or(DecodeError::Empty)?;
    let command = Command::from_bytes(tag).ok_or_else(|| DecodeError::UnknownCommand {
        tag: String::from_utf8_lossy(tag).into_owned(),
    })?;

    let envelope = match (command, fields) {
        (Command::Register, [name, profile]) => Envelope::Register {
            name: utf8(name, "name")?,
            profile: UserProfile::decode(profile.clone())?,
        },
        (Command::Register, [text]) => Envelope::RegisterAck {
            text: utf8(text, "text")?,
        },
        (Command::List, []) => Envelope::List,
        (Command::List, [names]) => Envelope::ListReply {
            names: decode_names(names)?,
        },
        (Command::Send, [destination, payload]) => Envelope::Send {
            destination: utf8(destination, "destination")?,
            payload: payload.clone(),
        },
        (Command::Msg, [payload]) => Envelope::Msg {
            payload: payload.clone(),
        },
        (Command::Err, [text]) => Envelope::Err {
            text: utf8(text, "text")?,
        },
        (command, fields) => {
            return Err(DecodeError::MalformedEnvelope {
                command,
                fields: fields.len(),
            });
        }
    };

    Ok(envelope)
}

fn utf8(part: &Bytes, field: &'static str) -> Result<String, DecodeError> {
    std::str::from_utf8(part)
        .map(str::to_owned)
        .map_err(|_| DecodeError::InvalidUtf8 { field })
}

fn encode_names(names: &[String]) -> Bytes {
    let json = serde_json::Value::from(names.to_vec()).to_string();
    Bytes::from(STANDARD.encode(json))
}

fn decode_names(part: &Bytes) -> Result<Vec<String>, DecodeError> {
    let json = STANDARD.decode(part)?;
    Ok(serde_json::from_slice(&json)?)
}
