//! Hello exchange and channel maintenance
//!
//! Broadcast hellos advertise presence. A node that hears one from a
//! stranger answers with a unicast, ack-required hello carrying its
//! deposit; the two sides open the channel on receipt and the exchange
//! stops once both have it. Unicast hellos between existing neighbors carry
//! the sender's available balance toward the receiver, which must match
//! the receiver's record of it.

use payroute_core::{Destination, Hello, Message, PeerIdentity, Runtime};
use payroute_ledger::{LedgerError, UpdateOutcome};
use tracing::{debug, trace, warn};

use crate::event::NodeEvent;
use crate::node::PaymentNode;

impl<I: PeerIdentity> PaymentNode<I> {
    /// One broadcast plus a balance refresh to every neighbor
    pub(crate) fn send_hellos<R: Runtime<I>>(&mut self, rt: &mut R) {
        let lifetime = self.config().routing.hello_lifetime();
        let seq = self.discovery.seq_no();
        rt.send(
            Destination::Broadcast,
            Message::Hello(Hello {
                dst: None,
                dst_seq: seq,
                origin: self.address().clone(),
                lifetime,
                available_deposit: self.ledger.config().default_deposit,
                ack_required: false,
            }),
        );

        for neighbor in self.ledger.neighbors() {
            let Ok(available) = self.ledger.my_available(&neighbor) else {
                continue;
            };
            rt.send(
                Destination::Unicast(neighbor.clone()),
                Message::Hello(Hello {
                    dst: Some(neighbor),
                    dst_seq: seq,
                    origin: self.address().clone(),
                    lifetime,
                    available_deposit: available,
                    ack_required: false,
                }),
            );
        }
    }

    pub(crate) fn on_hello<R: Runtime<I>>(&mut self, sender: I, hello: Hello<I>, rt: &mut R) {
        let now = rt.now();
        let lifetime = self.config().routing.hello_lifetime();

        match &hello.dst {
            None => {
                if !self.ledger.is_neighbor(&sender) {
                    debug!(node = %self.address(), peer = %sender, "Requesting channel");
                    self.send_open_request(sender, rt);
                }
            }
            Some(dst) if dst == self.address() => {
                let result = self.ledger.update(
                    &sender,
                    hello.available_deposit,
                    lifetime,
                    hello.ack_required,
                    now,
                );
                match result {
                    Ok(UpdateOutcome::Opened) => {
                        // complete the mutual open
                        self.send_open_request(sender, rt);
                    }
                    Ok(UpdateOutcome::Refreshed) => {
                        trace!(peer = %sender, "Channel refreshed");
                    }
                    Err(LedgerError::BalanceDisagreement {
                        recorded, claimed, ..
                    }) => {
                        warn!(node = %self.address(), peer = %sender, recorded, claimed, "Balance disagreement");
                        self.events.push(NodeEvent::BalanceDisagreement {
                            peer: sender,
                            recorded,
                            claimed,
                        });
                    }
                    Err(e) => {
                        trace!(peer = %sender, error = %e, "Hello ignored");
                    }
                }
            }
            Some(_) => {}
        }
    }

    fn send_open_request<R: Runtime<I>>(&self, peer: I, rt: &mut R) {
        let available = self
            .ledger
            .my_available(&peer)
            .unwrap_or(self.ledger.config().default_deposit);
        rt.send(
            Destination::Unicast(peer.clone()),
            Message::Hello(Hello {
                dst: Some(peer),
                dst_seq: self.discovery.seq_no(),
                origin: self.address().clone(),
                lifetime: self.config().routing.hello_lifetime(),
                available_deposit: available,
                ack_required: true,
            }),
        );
    }
}
