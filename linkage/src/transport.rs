//! Ordered, per-peer message channels between the parties of a session.
//!
//! The protocol itself never touches sockets: it only talks to a [`Transport`]. [`Channel`] is a
//! transport backed by unbounded in-process queues, either connected directly to the other parties
//! ([`memory_network`]) or to background tasks that forward frames over the network.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{Error, Msg, PartyId};

/// The unit transmitted between two parties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    /// A protocol message.
    Data(Msg),
    /// The sender aborted the session and will not send any more messages.
    Abort,
    /// The sender finished the session and will not send any more messages.
    Close,
}

/// Message passing between all parties of a session.
///
/// Messages between any pair of parties are delivered in order. Sending never waits for the
/// receiving party, so that all parties can first send and then receive within a round.
#[async_trait]
pub trait Transport: Send {
    /// The id of the local party.
    fn local_pid(&self) -> PartyId;

    /// The number of parties connected by the transport, including the local party.
    fn party_count(&self) -> usize;

    /// Sends a message to the party `to`.
    ///
    /// Fails with [`Error::PeerAborted`] if the party aborted the session before the message could
    /// be delivered and with [`Error::ConnectionClosed`] if the connection is gone otherwise.
    async fn send(&mut self, to: PartyId, msg: Msg) -> Result<(), Error>;

    /// Waits for the next message from the party `from`.
    ///
    /// Fails with [`Error::PeerAborted`] if the party aborted the session and with
    /// [`Error::ConnectionClosed`] if the connection is gone.
    async fn recv(&mut self, from: PartyId) -> Result<Msg, Error>;

    /// Notifies all parties that the session is aborted and releases the connections.
    async fn abort(&mut self);

    /// Notifies all parties that the session is finished, waits until every party did the same
    /// and releases the connections.
    async fn close(&mut self) -> Result<(), Error>;
}

/// Both directions of the queue pair connecting the local party with a single peer.
#[derive(Debug)]
pub struct Link {
    tx: UnboundedSender<Frame>,
    rx: UnboundedReceiver<Frame>,
}

impl Link {
    /// Creates a link from the outgoing and the incoming queue of a peer.
    pub fn new(tx: UnboundedSender<Frame>, rx: UnboundedReceiver<Frame>) -> Self {
        Self { tx, rx }
    }
}

/// A [`Transport`] sending and receiving [`Frame`]s through in-process queues.
#[derive(Debug)]
pub struct Channel {
    pid: PartyId,
    party_count: usize,
    links: BTreeMap<PartyId, Link>,
    flush: Vec<JoinHandle<()>>,
    background: Vec<JoinHandle<()>>,
}

impl Channel {
    /// Creates a channel for the party `pid` from one link per peer.
    pub fn new(pid: PartyId, party_count: usize, links: BTreeMap<PartyId, Link>) -> Self {
        Self {
            pid,
            party_count,
            links,
            flush: vec![],
            background: vec![],
        }
    }

    /// Attaches the tasks forwarding the links to the network.
    ///
    /// The `flush` tasks are awaited once the links are released, so that they can deliver all
    /// queued frames. The `background` tasks are cancelled at that point.
    pub fn with_tasks(
        mut self,
        flush: Vec<JoinHandle<()>>,
        background: Vec<JoinHandle<()>>,
    ) -> Self {
        self.flush = flush;
        self.background = background;
        self
    }

    fn link(&mut self, peer: PartyId) -> Result<&mut Link, Error> {
        self.links.get_mut(&peer).ok_or(Error::UnknownPeer)
    }

    async fn release(&mut self) {
        self.links.clear();
        for task in self.flush.drain(..) {
            if let Err(e) = task.await {
                warn!(pid = self.pid, "connection task failed: {e}");
            }
        }
        for task in self.background.drain(..) {
            task.abort();
        }
    }
}

#[async_trait]
impl Transport for Channel {
    fn local_pid(&self) -> PartyId {
        self.pid
    }

    fn party_count(&self) -> usize {
        self.party_count
    }

    async fn send(&mut self, to: PartyId, msg: Msg) -> Result<(), Error> {
        let link = self.link(to)?;
        if link.tx.send(Frame::Data(msg)).is_ok() {
            return Ok(());
        }
        // a peer that aborted drops its end right after sending the abort frame
        while let Ok(frame) = link.rx.try_recv() {
            if frame == Frame::Abort {
                return Err(Error::PeerAborted);
            }
        }
        Err(Error::ConnectionClosed)
    }

    async fn recv(&mut self, from: PartyId) -> Result<Msg, Error> {
        match self.link(from)?.rx.recv().await {
            Some(Frame::Data(msg)) => Ok(msg),
            Some(Frame::Abort) => Err(Error::PeerAborted),
            Some(Frame::Close) | None => Err(Error::ConnectionClosed),
        }
    }

    async fn abort(&mut self) {
        for link in self.links.values() {
            let _ = link.tx.send(Frame::Abort);
        }
        debug!(pid = self.pid, "aborted session");
        self.release().await;
    }

    async fn close(&mut self) -> Result<(), Error> {
        for link in self.links.values() {
            let _ = link.tx.send(Frame::Close);
        }
        let mut result = Ok(());
        for (peer, link) in self.links.iter_mut() {
            loop {
                match link.rx.recv().await {
                    Some(Frame::Close) => break,
                    Some(Frame::Data(_)) => {
                        warn!(pid = self.pid, peer, "discarding unread message on close");
                    }
                    Some(Frame::Abort) => {
                        result = result.and(Err(Error::PeerAborted));
                        break;
                    }
                    None => {
                        result = result.and(Err(Error::ConnectionClosed));
                        break;
                    }
                }
            }
        }
        self.release().await;
        result
    }
}

/// Connects `party_count` parties with in-process queues, returning the channels in pid order.
pub fn memory_network(party_count: usize) -> Vec<Channel> {
    let mut links: Vec<BTreeMap<PartyId, Link>> = (0..party_count).map(|_| BTreeMap::new()).collect();
    for a in 0..party_count {
        for b in (a + 1)..party_count {
            let (a_to_b, from_a) = unbounded_channel();
            let (b_to_a, from_b) = unbounded_channel();
            links[a].insert(b, Link::new(a_to_b, from_b));
            links[b].insert(a, Link::new(b_to_a, from_a));
        }
    }
    links
        .into_iter()
        .enumerate()
        .map(|(pid, links)| Channel::new(pid, party_count, links))
        .collect()
}

/// Sends the same message to every other party.
pub(crate) async fn broadcast<T: Transport + ?Sized>(io: &mut T, msg: &Msg) -> Result<(), Error> {
    for peer in peers(io.local_pid(), io.party_count()) {
        io.send(peer, msg.clone()).await?;
    }
    Ok(())
}

/// Receives one message from every other party, in pid order.
pub(crate) async fn gather<T: Transport + ?Sized>(io: &mut T) -> Result<Vec<(PartyId, Msg)>, Error> {
    let mut msgs = Vec::with_capacity(io.party_count().saturating_sub(1));
    for peer in peers(io.local_pid(), io.party_count()) {
        msgs.push((peer, io.recv(peer).await?));
    }
    Ok(msgs)
}

/// All parties except `pid`, in ascending order.
pub(crate) fn peers(pid: PartyId, party_count: usize) -> impl Iterator<Item = PartyId> {
    (0..party_count).filter(move |p| *p != pid)
}
