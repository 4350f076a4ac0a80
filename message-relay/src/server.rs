use std::{future::Future, net::SocketAddr};

use anyhow::Result;
use tokio::{net::TcpListener, select};
use tracing::{debug, info, warn};

use crate::{
    codec,
    dispatch::{Dispatcher, Outbound},
    registry::NamePolicy,
    transport::{ConnectionId, RouterEndpoint, TransportError, TransportEvent},
};

/// The relay: one task owns the transport and the dispatcher, so frames are
/// handled strictly one at a time against one registry.
pub struct Server {
    endpoint: RouterEndpoint,
    dispatcher: Dispatcher,
}

impl Server {
    pub fn new(listener: TcpListener, policy: NamePolicy) -> Self {
        Self {
            endpoint: RouterEndpoint::new(listener),
            dispatcher: Dispatcher::new(policy),
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.endpoint.local_addr()
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server {
            mut endpoint,
            mut dispatcher,
        } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("relay shutting down");
                    break;
                }
                event = endpoint.receive() => {
                    handle_event(event, &mut endpoint, &mut dispatcher);
                }
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

fn handle_event(event: TransportEvent, endpoint: &mut RouterEndpoint, dispatcher: &mut Dispatcher) {
    match event {
        TransportEvent::Frame { from, frame } => {
            debug!(%from, parts = frame.len(), "received frame");
            if let Some(outbound) = dispatcher.handle_frame(from, &frame) {
                deliver(outbound, from, endpoint, dispatcher);
            }
        }
        TransportEvent::Closed { id } => {
            dispatcher.disconnect(id);
        }
    }
}

fn deliver(
    outbound: Outbound,
    from: ConnectionId,
    endpoint: &mut RouterEndpoint,
    dispatcher: &mut Dispatcher,
) {
    let Outbound { to, envelope } = outbound;
    let Err(TransportError::UnknownIdentity(id)) = endpoint.send(to, codec::encode(&envelope))
    else {
        return;
    };

    warn!(%from, %id, "recipient connection is gone");
    if let Some(Outbound { to, envelope }) = dispatcher.delivery_failed(from, id) {
        if let Err(err) = endpoint.send(to, codec::encode(&envelope)) {
            debug!(error = %err, "could not report failed delivery");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::{SinkExt, StreamExt};
    use tokio::time::timeout;

    use super::*;
    use crate::{
        envelope::Envelope,
        transport::{self, FrameReader, FrameWriter},
    };

    struct Relay {
        endpoint: RouterEndpoint,
        dispatcher: Dispatcher,
    }

    impl Relay {
        async fn bind() -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
            Self {
                endpoint: RouterEndpoint::new(listener),
                dispatcher: Dispatcher::default(),
            }
        }

        async fn connect(&self) -> (FrameReader, FrameWriter) {
            let addr = self.endpoint.local_addr().expect("addr");
            transport::connect("127.0.0.1", addr.port())
                .await
                .expect("connect")
        }

        /// Handles the next transport event and returns the connection it came from.
        async fn step(&mut self) -> ConnectionId {
            let event = timeout(Duration::from_secs(1), self.endpoint.receive())
                .await
                .expect("event in time");
            let TransportEvent::Frame { from, .. } = &event else {
                panic!("expected a frame, got {event:?}");
            };
            let from = *from;
            handle_event(event, &mut self.endpoint, &mut self.dispatcher);
            from
        }
    }

    async fn recv(reader: &mut FrameReader) -> Envelope {
        let frame = timeout(Duration::from_secs(1), reader.next())
            .await
            .expect("frame in time")
            .expect("stream open")
            .expect("frame decodes");
        codec::decode(&frame).expect("envelope decodes")
    }

    #[tokio::test]
    async fn undeliverable_message_is_reported_to_the_sender() {
        let mut relay = Relay::bind().await;
        let (_alice_reader, mut alice_writer) = relay.connect().await;
        let (mut bob_reader, mut bob_writer) = relay.connect().await;

        alice_writer
            .send(codec::encode(&Envelope::register("Alice")))
            .await
            .expect("send");
        let alice = relay.step().await;
        bob_writer
            .send(codec::encode(&Envelope::register("Bob")))
            .await
            .expect("send");
        relay.step().await;
        assert!(matches!(recv(&mut bob_reader).await, Envelope::RegisterAck { .. }));

        // Alice's writer is gone but her reader has not reported Closed yet.
        assert!(relay.endpoint.drop_writer(alice));
        bob_writer
            .send(codec::encode(&Envelope::send("Alice", "hi")))
            .await
            .expect("send");
        relay.step().await;

        assert_eq!(
            recv(&mut bob_reader).await,
            Envelope::err("Alice not registered.")
        );
        assert_eq!(relay.dispatcher.registry().snapshot(), vec!["Bob"]);
    }
}
