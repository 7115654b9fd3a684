//! Out-of-order request/reply correlation. The server may answer `READ`s
//! out of the order they were sent (especially under the read-ahead
//! pipeline), so every request is tagged with an id and its eventual
//! reply is looked up by that id rather than assumed to be the next one
//! on the wire.
//!
//! This is the single-threaded analogue of a future/waker pair: instead of
//! an `Arc<Mutex<..>>` cell a task awaits, each outstanding request just
//! sits in a map until its answer arrives, since the cooperative scheduler
//! polls this engine's `step` directly rather than waking a task.

use rustc_hash::FxHashMap;

use crate::packet::Packet;

/// What a pending request becomes once its reply is known.
pub enum Reply {
    Status { code: u32, message: String },
    Handle(Vec<u8>),
    Data(Vec<u8>),
    Name(Vec<(String, crate::packet::FileAttrs)>),
    Attrs(crate::packet::FileAttrs),
}

/// The open request-id -> (what it was for) map, plus a monotonic id
/// generator.
#[derive(Default)]
pub struct PendingRequests {
    next_id: u32,
    outstanding: FxHashMap<u32, RequestKind>,
    ready: FxHashMap<u32, Reply>,
}

/// What kind of request a given id names, so a reply packet (which only
/// carries type + id) can be validated against what was actually asked.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RequestKind {
    Open,
    Close,
    Read,
    Write,
    Stat,
    Setstat,
    Remove,
    Mkdir,
    Rmdir,
    Realpath,
    Rename,
    Opendir,
    Readdir,
}

impl PendingRequests {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next request id and records what it's for.
    pub fn begin(&mut self, kind: RequestKind) -> u32 {
        self.next_id = self.next_id.wrapping_add(1);
        let id = self.next_id;
        self.outstanding.insert(id, kind);
        id
    }

    #[must_use]
    pub fn kind_of(&self, id: u32) -> Option<RequestKind> {
        self.outstanding.get(&id).copied()
    }

    /// Records a packet's decoded reply against its request id, moving it
    /// from outstanding to ready.
    pub fn complete(&mut self, id: u32, reply: Reply) {
        self.outstanding.remove(&id);
        self.ready.insert(id, reply);
    }

    /// Takes the reply for `id` if it has arrived.
    pub fn take(&mut self, id: u32) -> Option<Reply> {
        self.ready.remove(&id)
    }

    #[must_use]
    pub fn is_outstanding(&self, id: u32) -> bool {
        self.outstanding.contains_key(&id)
    }

    #[must_use]
    pub fn outstanding_count(&self) -> usize {
        self.outstanding.len()
    }
}

/// Decodes a reply [`Packet`] into the [`Reply`] variant implied by its
/// type tag.
#[must_use]
pub fn decode_reply(packet: &Packet) -> Option<Reply> {
    use crate::packet::{FileAttrs, PacketType, Reader};
    let mut r = Reader::new(&packet.payload);
    match packet.ty {
        PacketType::Status => Some(Reply::Status { code: r.u32()?, message: r.utf8_string().unwrap_or_default() }),
        PacketType::Handle => Some(Reply::Handle(r.string()?)),
        PacketType::Data => Some(Reply::Data(r.string()?)),
        PacketType::Attrs => Some(Reply::Attrs(FileAttrs::parse(&mut r)?)),
        PacketType::Name => {
            let count = r.u32()?;
            let mut names = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let filename = r.utf8_string()?;
                let _longname = r.utf8_string()?;
                let attrs = FileAttrs::parse(&mut r)?;
                names.push((filename, attrs));
            }
            Some(Reply::Name(names))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_and_tracked_as_outstanding() {
        let mut pending = PendingRequests::new();
        let a = pending.begin(RequestKind::Open);
        let b = pending.begin(RequestKind::Read);
        assert_ne!(a, b);
        assert!(pending.is_outstanding(a));
        assert!(pending.is_outstanding(b));
    }

    #[test]
    fn completing_out_of_order_still_resolves_the_right_id() {
        let mut pending = PendingRequests::new();
        let a = pending.begin(RequestKind::Read);
        let b = pending.begin(RequestKind::Read);
        pending.complete(b, Reply::Data(vec![2]));
        pending.complete(a, Reply::Data(vec![1]));
        assert!(matches!(pending.take(a), Some(Reply::Data(d)) if d == vec![1]));
        assert!(matches!(pending.take(b), Some(Reply::Data(d)) if d == vec![2]));
    }

    #[test]
    fn taking_a_reply_twice_yields_none_the_second_time() {
        let mut pending = PendingRequests::new();
        let id = pending.begin(RequestKind::Close);
        pending.complete(id, Reply::Status { code: 0, message: String::new() });
        assert!(pending.take(id).is_some());
        assert!(pending.take(id).is_none());
    }
}
