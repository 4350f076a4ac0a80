//! Session protocol.
//!
//! Whether a connection is registered is read off the registry, not tracked
//! separately. Each inbound frame produces at most one outbound envelope,
//! addressed either back to the sender or, for a relayed message, to the
//! destination.

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::{
    codec::{self, DecodeError},
    envelope::Envelope,
    frame::Frame,
    registry::{NamePolicy, Registration, Registry, RegistryError},
    transport::ConnectionId,
};

pub const REGISTER_FIRST: &str = "You need to register first.";
pub const MALFORMED_REQUEST: &str = "Malformed request.";
pub const INVALID_NAME: &str = "Invalid name.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub to: ConnectionId,
    pub envelope: Envelope,
}

impl Outbound {
    fn new(to: ConnectionId, envelope: Envelope) -> Self {
        Self { to, envelope }
    }
}

#[derive(Debug, Default)]
pub struct Dispatcher {
    registry: Registry,
}

impl Dispatcher {
    pub fn new(policy: NamePolicy) -> Self {
        Self {
            registry: Registry::new(policy),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Decodes and handles one raw frame from `from`.
    pub fn handle_frame(&mut self, from: ConnectionId, frame: &Frame) -> Option<Outbound> {
        match codec::decode(frame) {
            Ok(envelope) => self.handle(from, envelope),
            Err(err) => Some(self.malformed(from, &err)),
        }
    }

    pub fn handle(&mut self, from: ConnectionId, envelope: Envelope) -> Option<Outbound> {
        let reply = match envelope {
            Envelope::Register { name, profile } => {
                if profile.name != name {
                    debug!(
                        %from,
                        name,
                        profile = profile.name,
                        "profile name differs from claimed name"
                    );
                }
                self.register(from, name)
            }
            Envelope::List => self.list(from),
            Envelope::Send {
                destination,
                payload,
            } => return Some(self.relay(from, destination, payload)),
            other => {
                warn!(%from, command = %other.command(), "client sent a server-only envelope");
                Envelope::err(MALFORMED_REQUEST)
            }
        };

        Some(Outbound::new(from, reply))
    }

    /// Called when the transport could not deliver `Msg` to `to`.
    ///
    /// The stale binding is dropped and the sender learns that the
    /// recipient is gone. Failed replies to the sender itself are not
    /// answered.
    pub fn delivery_failed(&mut self, from: ConnectionId, to: ConnectionId) -> Option<Outbound> {
        let name = self.registry.unregister(to);
        if from == to {
            return None;
        }

        let text = match name {
            Some(name) => format!("{name} not registered."),
            None => "Recipient not registered.".to_string(),
        };
        Some(Outbound::new(from, Envelope::err(text)))
    }

    /// Unregister hook for transport-level disconnects.
    pub fn disconnect(&mut self, id: ConnectionId) -> Option<String> {
        let name = self.registry.unregister(id);
        if let Some(name) = &name {
            info!(%id, name, "released name of disconnected client");
        }
        name
    }

    fn register(&mut self, from: ConnectionId, name: String) -> Envelope {
        match self.registry.register(from, &name) {
            Ok(registration) => {
                match registration {
                    Registration::Created | Registration::Unchanged => {}
                    Registration::Renamed { previous } => {
                        info!(%from, previous, "released previous name");
                    }
                    Registration::Evicted { previous_owner, .. } => {
                        warn!(
                            %from,
                            %previous_owner,
                            name,
                            "name taken over from another connection"
                        );
                    }
                }
                info!(%from, name, "registering");
                Envelope::RegisterAck {
                    text: format!("Welcome {name}!"),
                }
            }
            Err(RegistryError::NameConflict { name }) => {
                info!(%from, name, "rejected registration of a name in use");
                Envelope::err(format!("{name} is already registered."))
            }
            Err(err) => {
                debug!(%from, error = %err, "rejected registration");
                Envelope::err(INVALID_NAME)
            }
        }
    }

    fn list(&self, from: ConnectionId) -> Envelope {
        match self.registry.reverse_lookup(from) {
            Ok(name) => {
                info!(%from, name, "list request");
                Envelope::ListReply {
                    names: self.registry.snapshot(),
                }
            }
            Err(_) => Envelope::err(REGISTER_FIRST),
        }
    }

    fn relay(&self, from: ConnectionId, destination: String, payload: Bytes) -> Outbound {
        match self.registry.lookup(&destination) {
            Ok(to) => {
                info!(%from, %to, destination, "sending message");
                Outbound::new(to, Envelope::Msg { payload })
            }
            Err(_) => Outbound::new(from, Envelope::err(format!("{destination} not registered."))),
        }
    }

    fn malformed(&self, from: ConnectionId, err: &DecodeError) -> Outbound {
        warn!(%from, error = %err, "dropping malformed frame");
        Outbound::new(from, Envelope::err(MALFORMED_REQUEST))
    }
}
