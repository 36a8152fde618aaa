//! Ordered delivery of outbound packets per connection.
//!
//! Every packet sent while a chat message is being rendered gets a sequence
//! number and waits until the packets before it were released. Rendering
//! runs in parallel, delivery does not: a connection receives its packets in
//! the order the host sent them.

use crate::context::MessageId;
use chatr_network::{ConnectionId, PacketSink, RawPacket};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub player: u128,
    pub protocol: i32,
}

enum Slot {
    Pending,
    Ready(RawPacket),
    Discarded,
}

struct ConnectionQueue {
    sink: Box<dyn PacketSink>,
    /// Sequence number of the first slot.
    next_release: u64,
    slots: VecDeque<Slot>,
}

impl ConnectionQueue {
    fn next_seq(&self) -> u64 {
        self.next_release + self.slots.len() as u64
    }

    fn release(&mut self) {
        while let Some(Slot::Ready(_) | Slot::Discarded) = self.slots.front() {
            if let Some(Slot::Ready(packet)) = self.slots.pop_front() {
                self.sink.send_packet(packet);
            }
            self.next_release += 1;
        }
    }
}

struct Repeat {
    next: u32,
    last: Instant,
}

struct Connection {
    id: ConnectionId,
    info: ConnectionInfo,
    queue: Mutex<ConnectionQueue>,
    repeats: Mutex<FxHashMap<MessageId, Repeat>>,
}

impl Connection {
    fn lock(&self) -> MutexGuard<'_, ConnectionQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A reserved place in a connection's outbound order.
///
/// Exactly one packet (or nothing, if discarded) is released in its place.
/// A ticket dropped without being used sends its fallback packet, so a lost
/// render job can't stall the connection.
pub struct Ticket {
    connection: Weak<Connection>,
    seq: u64,
    fallback: Option<RawPacket>,
}

impl Ticket {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn dispatch(mut self, packet: RawPacket) {
        self.fallback = None;
        self.complete(Slot::Ready(packet));
    }

    /// Releases the place without sending anything.
    pub fn discard(mut self) {
        self.fallback = None;
        self.complete(Slot::Discarded);
    }

    fn complete(&self, slot: Slot) {
        let Some(connection) = self.connection.upgrade() else {
            debug!("Connection closed before packet {} was released", self.seq);
            return;
        };
        let mut queue = connection.lock();
        let Some(index) = self.seq.checked_sub(queue.next_release) else {
            return;
        };
        if let Some(pending) = queue.slots.get_mut(index as usize) {
            *pending = slot;
        }
        queue.release();
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if let Some(packet) = self.fallback.take() {
            if let Some(connection) = self.connection.upgrade() {
                debug!(
                    "Render job for connection {} was lost, sending packet {} unchanged",
                    connection.id, self.seq
                );
            }
            self.complete(Slot::Ready(packet));
        }
    }
}

#[derive(Default)]
pub struct Dispatcher {
    connections: RwLock<FxHashMap<ConnectionId, Arc<Connection>>>,
}

impl Dispatcher {
    pub fn new() -> Dispatcher {
        Default::default()
    }

    fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    pub fn open(&self, id: ConnectionId, info: ConnectionInfo, sink: Box<dyn PacketSink>) {
        let connection = Arc::new(Connection {
            id,
            info,
            queue: Mutex::new(ConnectionQueue {
                sink,
                next_release: 0,
                slots: VecDeque::new(),
            }),
            repeats: Default::default(),
        });
        self.connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, connection);
    }

    /// Forgets the connection. Packets still waiting for it are dropped.
    pub fn close(&self, id: ConnectionId) -> bool {
        self.connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    pub fn info(&self, id: ConnectionId) -> Option<ConnectionInfo> {
        self.get(id).map(|connection| connection.info)
    }

    pub fn len(&self) -> usize {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Numbers repeats of a message on `connection`.
    ///
    /// Each copy of a broadcast reaches a connection once and keeps its id.
    /// The same message sent to the connection again is another event and
    /// gets the id of its occurrence.
    pub fn occurrence(&self, connection: ConnectionId, message: MessageId) -> MessageId {
        let Some(conn) = self.get(connection) else {
            return message;
        };
        let now = Instant::now();
        let mut repeats = conn.repeats.lock().unwrap_or_else(PoisonError::into_inner);
        let repeat = repeats.entry(message).or_insert(Repeat { next: 0, last: now });
        let n = repeat.next;
        repeat.next += 1;
        repeat.last = now;
        message.occurrence(n)
    }

    /// Forgets repeat counts of messages last seen more than `older_than` ago.
    pub fn forget_repeats(&self, older_than: Duration) {
        let Some(deadline) = Instant::now().checked_sub(older_than) else {
            return;
        };
        let connections: Vec<Arc<Connection>> = self
            .connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for conn in connections {
            conn.repeats
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|_, repeat| repeat.last >= deadline);
        }
    }

    /// Reserves the next place in the order of `connection`. `fallback` is
    /// sent in its place if the ticket is dropped unused.
    pub fn reserve(&self, connection: ConnectionId, fallback: RawPacket) -> Option<Ticket> {
        let conn = self.get(connection)?;
        let mut queue = conn.lock();
        let seq = queue.next_seq();
        queue.slots.push_back(Slot::Pending);
        drop(queue);
        Some(Ticket {
            connection: Arc::downgrade(&conn),
            seq,
            fallback: Some(fallback),
        })
    }

    /// Queues a packet that needs no rendering.
    ///
    /// If nothing is waiting on the connection the packet is handed back and
    /// the caller sends it itself. Otherwise it is queued behind the packets
    /// being rendered and `None` is returned.
    pub fn forward(&self, connection: ConnectionId, packet: RawPacket) -> Option<RawPacket> {
        let Some(conn) = self.get(connection) else {
            return Some(packet);
        };
        let mut queue = conn.lock();
        if queue.slots.is_empty() {
            return Some(packet);
        }
        queue.slots.push_back(Slot::Ready(packet));
        None
    }
}
