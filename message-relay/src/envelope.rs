use std::fmt;

use bytes::Bytes;

/// Profile attached to a registration, carried as an embedded protobuf
/// message independent of the outer frame layout.
#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct UserProfile {
    #[prost(string, tag = "1")]
    pub name: String,
}

impl UserProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// One application-level message, in either direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    Register { name: String, profile: UserProfile },
    RegisterAck { text: String },
    List,
    ListReply { names: Vec<String> },
    Send { destination: String, payload: Bytes },
    Msg { payload: Bytes },
    Err { text: String },
}

impl Envelope {
    pub fn register(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::Register {
            profile: UserProfile::new(name.clone()),
            name,
        }
    }

    pub fn send(destination: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self::Send {
            destination: destination.into(),
            payload: payload.into(),
        }
    }

    pub fn msg(payload: impl Into<Bytes>) -> Self {
        Self::Msg {
            payload: payload.into(),
        }
    }

    pub fn err(text: impl Into<String>) -> Self {
        Self::Err { text: text.into() }
    }

    pub fn command(&self) -> Command {
        match self {
            Self::Register { .. } | Self::RegisterAck { .. } => Command::Register,
            Self::List | Self::ListReply { .. } => Command::List,
            Self::Send { .. } => Command::Send,
            Self::Msg { .. } => Command::Msg,
            Self::Err { .. } => Command::Err,
        }
    }
}

/// Command tag in the first part of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Register,
    List,
    Send,
    Msg,
    Err,
}

impl Command {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Self::Register => b"REGISTER",
            Self::List => b"LIST",
            Self::Send => b"SEND",
            Self::Msg => b"MSG",
            Self::Err => b"ERR",
        }
    }

    pub fn from_bytes(tag: &[u8]) -> Option<Self> {
        match tag {
            b"REGISTER" => Some(Self::Register),
            b"LIST" => Some(Self::List),
            b"SEND" => Some(Self::Send),
            b"MSG" => Some(Self::Msg),
            b"ERR" => Some(Self::Err),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Register => "REGISTER",
            Self::List => "LIST",
            Self::Send => "SEND",
            Self::Msg => "MSG",
            Self::Err => "ERR",
        })
    }
}
