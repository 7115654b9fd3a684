//! Wire framing for the SFTP protocol (versions 3-6): a 4-byte big-endian
//! length, a 1-byte packet type, and (for every type but `INIT`/`VERSION`)
//! a 4-byte request id that correlates replies to the request that caused
//! them, since the server is free to answer out of order.

use std::time::SystemTime;

/// SFTP packet type tags (draft-ietf-secsh-filexfer, the values stable
/// across versions 3-6).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum PacketType {
    Init = 1,
    Version = 2,
    Open = 3,
    Close = 4,
    Read = 5,
    Write = 6,
    Lstat = 7,
    Fstat = 8,
    Setstat = 9,
    Fsetstat = 10,
    Opendir = 11,
    Readdir = 12,
    Remove = 13,
    Mkdir = 14,
    Rmdir = 15,
    Realpath = 16,
    Stat = 17,
    Rename = 18,
    Readlink = 19,
    Symlink = 20,
    Status = 101,
    Handle = 102,
    Data = 103,
    Name = 104,
    Attrs = 105,
    Extended = 200,
    ExtendedReply = 201,
}

impl PacketType {
    #[must_use]
    pub fn from_u8(byte: u8) -> Option<Self> {
        use PacketType::*;
        Some(match byte {
            1 => Init,
            2 => Version,
            3 => Open,
            4 => Close,
            5 => Read,
            6 => Write,
            7 => Lstat,
            8 => Fstat,
            9 => Setstat,
            10 => Fsetstat,
            11 => Opendir,
            12 => Readdir,
            13 => Remove,
            14 => Mkdir,
            15 => Rmdir,
            16 => Realpath,
            17 => Stat,
            18 => Rename,
            19 => Readlink,
            20 => Symlink,
            101 => Status,
            102 => Handle,
            103 => Data,
            104 => Name,
            105 => Attrs,
            200 => Extended,
            201 => ExtendedReply,
            _ => return None,
        })
    }

    /// `INIT`/`VERSION` carry no request id; every other packet type does.
    #[must_use]
    pub fn has_request_id(self) -> bool {
        !matches!(self, PacketType::Init | PacketType::Version)
    }
}

/// A decoded SFTP packet: its type, request id (if any), and the
/// type-specific payload that follows.
#[derive(Clone, Debug)]
pub struct Packet {
    pub ty: PacketType,
    pub request_id: Option<u32>,
    pub payload: Vec<u8>,
}

/// Appends the 4-byte length-prefixed frame for `ty`/`request_id`/`body` to
/// `out`, ready to write to the subprocess's stdin.
pub fn encode(out: &mut Vec<u8>, ty: PacketType, request_id: Option<u32>, body: &[u8]) {
    let id_len = if request_id.is_some() { 4 } else { 0 };
    let len = 1 + id_len + body.len();
    out.extend_from_slice(&(len as u32).to_be_bytes());
    out.push(ty as u8);
    if let Some(id) = request_id {
        out.extend_from_slice(&id.to_be_bytes());
    }
    out.extend_from_slice(body);
}

/// Attempts to decode one complete frame from the front of `buf`. Returns
/// `Some((packet, consumed_bytes))`, or `None` if fewer than a full frame
/// is currently buffered.
#[must_use]
pub fn try_decode(buf: &[u8]) -> Option<(Packet, usize)> {
    if buf.len() < 4 {
        return None;
    }
    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if buf.len() < 4 + len || len == 0 {
        return None;
    }
    let body = &buf[4..4 + len];
    let ty = PacketType::from_u8(body[0])?;
    let (request_id, rest) = if ty.has_request_id() {
        if body.len() < 5 {
            return None;
        }
        (Some(u32::from_be_bytes([body[1], body[2], body[3], body[4]])), &body[5..])
    } else {
        (None, &body[1..])
    };
    Some((Packet { ty, request_id, payload: rest.to_vec() }, 4 + len))
}

/// Cursor over a packet's payload, reading the wire primitives SFTP uses.
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn u8(&mut self) -> Option<u8> {
        let b = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    pub fn u32(&mut self) -> Option<u32> {
        let slice = self.data.get(self.pos..self.pos + 4)?;
        self.pos += 4;
        Some(u32::from_be_bytes(slice.try_into().ok()?))
    }

    pub fn u64(&mut self) -> Option<u64> {
        let slice = self.data.get(self.pos..self.pos + 8)?;
        self.pos += 8;
        Some(u64::from_be_bytes(slice.try_into().ok()?))
    }

    pub fn string(&mut self) -> Option<Vec<u8>> {
        let len = self.u32()? as usize;
        let slice = self.data.get(self.pos..self.pos + len)?;
        self.pos += len;
        Some(slice.to_vec())
    }

    pub fn utf8_string(&mut self) -> Option<String> {
        Some(String::from_utf8_lossy(&self.string()?).into_owned())
    }

    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }
}

/// Appends wire primitives to a packet body under construction.
pub struct Writer<'a>(pub &'a mut Vec<u8>);

impl Writer<'_> {
    pub fn u8(&mut self, v: u8) {
        self.0.push(v);
    }

    pub fn u32(&mut self, v: u32) {
        self.0.extend_from_slice(&v.to_be_bytes());
    }

    pub fn u64(&mut self, v: u64) {
        self.0.extend_from_slice(&v.to_be_bytes());
    }

    pub fn string(&mut self, bytes: &[u8]) {
        self.u32(bytes.len() as u32);
        self.0.extend_from_slice(bytes);
    }
}

/// `SSH_FILEXFER_ATTR_*` flags, v3-6 compatible subset this engine parses
/// and emits; unknown flag bits are preserved verbatim but not interpreted,
/// per the "ignore what you don't understand" guidance for v6 clients.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct AttrFlags(pub u32);

impl AttrFlags {
    pub const SIZE: u32 = 0x0000_0001;
    pub const UIDGID: u32 = 0x0000_0002;
    pub const PERMISSIONS: u32 = 0x0000_0004;
    pub const ACMODTIME: u32 = 0x0000_0008;

    #[must_use]
    pub fn has(self, bit: u32) -> bool {
        self.0 & bit != 0
    }
}

/// The subset of `SSH_FIXP_ATTRS` fields this engine cares about: size,
/// unix permissions, and modification time. Present across v3-6 even
/// though v4+ reformats the on-wire layout (this engine speaks v3's
/// simpler layout and negotiates it via `version`, falling back to
/// ignoring the server's higher version rather than parsing v4+ attrs).
#[derive(Clone, Copy, Debug, Default)]
pub struct FileAttrs {
    pub size: Option<u64>,
    pub permissions: Option<u32>,
    pub mtime: Option<SystemTime>,
}

impl FileAttrs {
    #[must_use]
    pub fn parse(reader: &mut Reader<'_>) -> Option<Self> {
        let flags = AttrFlags(reader.u32()?);
        let mut attrs = FileAttrs::default();
        if flags.has(AttrFlags::SIZE) {
            attrs.size = Some(reader.u64()?);
        }
        if flags.has(AttrFlags::UIDGID) {
            reader.u32()?;
            reader.u32()?;
        }
        if flags.has(AttrFlags::PERMISSIONS) {
            attrs.permissions = Some(reader.u32()?);
        }
        if flags.has(AttrFlags::ACMODTIME) {
            reader.u32()?;
            let mtime = reader.u32()?;
            attrs.mtime = Some(SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(u64::from(mtime)));
        }
        Some(attrs)
    }

    pub fn write(&self, writer: &mut Writer<'_>) {
        let mut flags = 0u32;
        if self.size.is_some() {
            flags |= AttrFlags::SIZE;
        }
        if self.permissions.is_some() {
            flags |= AttrFlags::PERMISSIONS;
        }
        if self.mtime.is_some() {
            flags |= AttrFlags::ACMODTIME;
        }
        writer.u32(flags);
        if let Some(size) = self.size {
            writer.u64(size);
        }
        if let Some(perm) = self.permissions {
            writer.u32(perm);
        }
        if let Some(mtime) = self.mtime {
            let secs = mtime.duration_since(SystemTime::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0) as u32;
            writer.u32(secs);
            writer.u32(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_status_packet() {
        let mut body = Vec::new();
        let mut w = Writer(&mut body);
        w.u32(0);
        w.string(b"ok");
        let mut buf = Vec::new();
        encode(&mut buf, PacketType::Status, Some(42), &body);

        let (packet, consumed) = try_decode(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(packet.ty, PacketType::Status);
        assert_eq!(packet.request_id, Some(42));
        let mut r = Reader::new(&packet.payload);
        assert_eq!(r.u32().unwrap(), 0);
        assert_eq!(r.utf8_string().unwrap(), "ok");
    }

    #[test]
    fn init_and_version_carry_no_request_id() {
        let mut buf = Vec::new();
        encode(&mut buf, PacketType::Init, None, &3u32.to_be_bytes());
        let (packet, _) = try_decode(&buf).unwrap();
        assert_eq!(packet.request_id, None);
    }

    #[test]
    fn incomplete_frame_is_not_decoded() {
        let mut buf = Vec::new();
        encode(&mut buf, PacketType::Status, Some(1), &[1, 2, 3]);
        assert!(try_decode(&buf[..buf.len() - 1]).is_none());
    }

    #[test]
    fn attrs_round_trip_size_and_permissions() {
        let attrs = FileAttrs { size: Some(4096), permissions: Some(0o644), mtime: None };
        let mut body = Vec::new();
        attrs.write(&mut Writer(&mut body));
        let mut r = Reader::new(&body);
        let parsed = FileAttrs::parse(&mut r).unwrap();
        assert_eq!(parsed.size, Some(4096));
        assert_eq!(parsed.permissions, Some(0o644));
    }
}
