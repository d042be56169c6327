use core::str;
use std::borrow::Cow;
use std::collections::HashMap;

use anyhow::Context;
use thiserror::Error;

/// Longest label the wire format can represent: the length byte must leave
/// the top two bits clear so it can be told apart from a compression pointer.
pub const MAX_LABEL_LENGTH: usize = 0x3f;
/// Largest byte offset a 14-bit compression pointer can target.
pub const MAX_POINTER_OFFSET: usize = 0x3fff;

/// Wire-level failures that make a packet undecodable (or unencodable).
///
/// These are deliberately recoverable: a malformed datagram must never take
/// down the process, only fail the exchange it belongs to.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("unexpected end of packet at byte {pos}")]
    UnexpectedEof { pos: usize },
    #[error("compression pointer at byte {pos} targets offset {target}, which does not precede the name")]
    InvalidPointer { pos: usize, target: usize },
    #[error("label is too long ({len} bytes): {label}")]
    OversizedLabel { label: String, len: usize },
    #[error("character-string is too long ({0} bytes)")]
    OversizedCharacterString(usize),
}

pub trait FromBuf: Sized {
    fn from_buf(buf: &mut ByteBuf) -> anyhow::Result<Self>;
}

pub trait EncodeToBuf {
    /// Encodes `self`, threading the message-scoped name compression cache
    /// through the whole call tree. `None` disables compression.
    fn encode_to_buf_with_cache<'cache, 'r: 'cache>(
        &'r self,
        buf: &mut ByteBuf,
        label_cache: Option<&mut HashMap<&'cache str, usize>>,
    ) -> anyhow::Result<usize>;

    fn encode_to_buf(&self, buf: &mut ByteBuf) -> anyhow::Result<usize> {
        self.encode_to_buf_with_cache(buf, None)
    }
}

/// A cursor over a DNS message. Reads advance `pos`; writes append at the
/// tail, except for the explicit patch-in-place setters.
pub struct ByteBuf<'a> {
    buf: Cow<'a, [u8]>,
    pos: usize,
}

impl<'a> AsRef<[u8]> for ByteBuf<'a> {
    fn as_ref(&self) -> &[u8] {
        &self.buf
    }
}

impl<'a> ByteBuf<'a> {
    pub fn new(src: &impl AsRef<[u8]>) -> ByteBuf<'_> {
        ByteBuf {
            buf: Cow::Borrowed(src.as_ref()),
            pos: 0,
        }
    }

    pub fn new_from_vec(src: Vec<u8>) -> ByteBuf<'static> {
        ByteBuf {
            buf: Cow::Owned(src),
            pos: 0,
        }
    }

    pub fn new_empty(capacity: Option<usize>) -> ByteBuf<'static> {
        ByteBuf {
            buf: Cow::Owned(Vec::with_capacity(capacity.unwrap_or(512))),
            pos: 0,
        }
    }

    pub fn into_inner(self) -> Cow<'a, [u8]> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn read_u8(&mut self) -> anyhow::Result<u8> {
        let byte = *self
            .buf
            .get(self.pos)
            .ok_or(WireError::UnexpectedEof { pos: self.pos })?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn write_u8(&mut self, data: u8) {
        self.buf.to_mut().push(data);
    }

    pub fn read_u16(&mut self) -> anyhow::Result<u16> {
        self.read_bytes(2)
            .and_then(|bytes| TryInto::<[u8; 2]>::try_into(bytes).context("bug: should be exactly two bytes"))
            .map(u16::from_be_bytes)
    }

    pub fn write_u16(&mut self, data: u16) {
        self.buf.to_mut().extend_from_slice(&data.to_be_bytes());
    }

    /// Patches a big-endian u16 at an already-written position.
    pub fn set_u16(&mut self, pos: usize, data: u16) -> anyhow::Result<()> {
        let dst = self
            .buf
            .to_mut()
            .get_mut(pos..pos + 2)
            .ok_or(WireError::UnexpectedEof { pos })?;
        dst.copy_from_slice(&data.to_be_bytes());
        Ok(())
    }

    pub fn read_u32(&mut self) -> anyhow::Result<u32> {
        self.read_bytes(4)
            .and_then(|bytes| TryInto::<[u8; 4]>::try_into(bytes).context("bug: should be exactly four bytes"))
            .map(u32::from_be_bytes)
    }

    pub fn write_u32(&mut self, data: u32) {
        self.buf.to_mut().extend_from_slice(&data.to_be_bytes());
    }

    pub fn read_bytes(&mut self, n: usize) -> anyhow::Result<&[u8]> {
        let bytes = self
            .buf
            .get(self.pos..self.pos + n)
            .ok_or(WireError::UnexpectedEof { pos: self.pos })?;
        self.pos += n;
        Ok(bytes)
    }

    pub fn peek_bytes(&self, pos: usize, n: usize) -> anyhow::Result<&[u8]> {
        self.buf
            .get(pos..pos + n)
            .ok_or(WireError::UnexpectedEof { pos }.into())
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buf.to_mut().extend_from_slice(data);
    }

    /// Reads a domain name in DNS name notation, following at most one chain
    /// of compression pointers.
    ///
    /// Pointer targets must strictly precede the name being decoded, which
    /// rules out self-references and forward references and bounds the walk
    /// on adversarial input.
    pub fn read_name(&mut self) -> anyhow::Result<Cow<'static, str>> {
        let name_start = self.pos;
        // Every followed pointer must target an offset below this bound
        let mut pointer_limit = name_start;
        let mut jumped = false;
        let mut pos = self.pos;
        let mut labels = Vec::new();
        loop {
            let length = *self.buf.get(pos).ok_or(WireError::UnexpectedEof { pos })?;
            if length as usize & 0xc0 == 0xc0 {
                let second_byte = *self
                    .buf
                    .get(pos + 1)
                    .ok_or(WireError::UnexpectedEof { pos: pos + 1 })?;
                let target = ((length as usize & !0xc0) << 8) | second_byte as usize;
                if target >= pointer_limit {
                    return Err(WireError::InvalidPointer { pos, target }.into());
                }
                pointer_limit = target;
                if !jumped {
                    // The pointer is the final component of the name on the wire
                    self.pos = pos + 2;
                    jumped = true;
                }
                pos = target;
            } else if length == 0 {
                pos += 1;
                if !jumped {
                    self.pos = pos;
                }
                break;
            } else {
                pos += 1;
                let label = self
                    .buf
                    .get(pos..pos + length as usize)
                    .ok_or(WireError::UnexpectedEof { pos })?;
                let label = str::from_utf8(label)
                    .with_context(|| format!("malformed packet: label at byte {} is not ASCII", pos))?;
                labels.push(label.to_owned());
                pos += length as usize;
                if !jumped {
                    self.pos = pos;
                }
            }
        }

        Ok(labels.join(".").into())
    }

    /// Writes a domain name in DNS name notation.
    ///
    /// A name without a dot is the root and encodes as a lone null byte.
    /// When a cache is supplied, each label's suffix is looked up first: a
    /// hit emits a 2-byte back-pointer and ends the name, a miss records the
    /// suffix at the current offset and writes the label out. Passing `None`
    /// disables compression entirely.
    pub fn write_name<'cache, 'key: 'cache>(
        &mut self,
        name: &'key str,
        mut label_cache: Option<&mut HashMap<&'cache str, usize>>,
    ) -> anyhow::Result<usize> {
        let mut written = 0;

        if name.contains('.') {
            let mut suffix_start = 0;
            for label in name.split('.') {
                if label.len() > MAX_LABEL_LENGTH {
                    return Err(WireError::OversizedLabel {
                        label: label.to_owned(),
                        len: label.len(),
                    }
                    .into());
                }
                anyhow::ensure!(!label.is_empty(), "empty label in name '{}'", name);

                let suffix = &name[suffix_start..];
                suffix_start += label.len() + 1;

                if let Some(&offset) = label_cache.as_deref().and_then(|cache| cache.get(suffix)) {
                    self.write_u16(0xc000 | offset as u16);
                    return Ok(written + 2);
                }

                if let Some(cache) = label_cache.as_deref_mut() {
                    // Offsets beyond 14 bits can't be pointed at later
                    if self.len() <= MAX_POINTER_OFFSET {
                        cache.insert(suffix, self.len());
                    }
                }
                self.write_u8(label.len() as u8);
                self.write_bytes(label.as_bytes());
                written += 1 + label.len();
            }
        }

        self.write_u8(0);
        Ok(written + 1)
    }

    /// Reads a `[1-byte length][bytes]` character-string.
    pub fn read_character_string(&mut self) -> anyhow::Result<Cow<'static, str>> {
        let length = self.read_u8().context("character-string length is missing")?;
        let bytes = self
            .read_bytes(length as usize)
            .context("character-string body is missing")?;
        let text = str::from_utf8(bytes).context("character-string is not ASCII")?;
        Ok(text.to_owned().into())
    }

    /// Writes a `[1-byte length][bytes]` character-string.
    pub fn write_character_string(&mut self, text: &str) -> anyhow::Result<usize> {
        if text.len() > u8::MAX as usize {
            return Err(WireError::OversizedCharacterString(text.len()).into());
        }
        self.write_u8(text.len() as u8);
        self.write_bytes(text.as_bytes());
        Ok(1 + text.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn be_u16_packing() {
        let mut buf = ByteBuf::new_empty(None);
        buf.write_u16(1);
        buf.write_u16(2);
        assert_eq!(buf.as_ref(), &[0, 1, 0, 2]);
    }

    #[test]
    fn be_u32_packing() {
        let mut buf = ByteBuf::new_empty(None);
        buf.write_u32(1);
        buf.write_u32(2);
        assert_eq!(buf.as_ref(), &[0, 0, 0, 1, 0, 0, 0, 2]);
    }

    #[test]
    fn ascii_is_a_byte_passthrough() {
        let mut buf = ByteBuf::new_empty(None);
        buf.write_bytes("01".as_bytes());
        assert_eq!(buf.as_ref(), &[48, 49]);
        let mut buf = ByteBuf::new(&[48u8, 49]);
        let bytes = buf.read_bytes(2).expect("shouldn't have failed");
        assert_eq!(bytes, "01".as_bytes());
    }

    #[test]
    fn read_root_name() {
        let mut buf = ByteBuf::new(&[0x0]);
        let name = buf.read_name().expect("shouldn't have failed");
        assert_eq!(name, "");
    }

    #[test]
    fn read_valid_name() {
        let raw = &[0x6, 0x67, 0x6f, 0x6f, 0x67, 0x6c, 0x65, 0x3, 0x63, 0x6f, 0x6d, 0x0];
        let mut buf = ByteBuf::new(raw);
        let name = buf.read_name().expect("shouldn't have failed");
        assert_eq!(name, "google.com");
        assert_eq!(buf.pos(), raw.len());
    }

    #[test]
    fn read_name_past_buffer_end() {
        let mut buf = ByteBuf::new(&[0x6, 0x67, 0x6f]);
        let err = buf.read_name().unwrap_err();
        assert_eq!(
            err.downcast::<WireError>().unwrap(),
            WireError::UnexpectedEof { pos: 1 }
        );
    }

    #[test]
    fn read_name_without_terminator() {
        let mut buf = ByteBuf::new(&[0x2, 0x67, 0x6f]);
        let err = buf.read_name().unwrap_err();
        assert_eq!(
            err.downcast::<WireError>().unwrap(),
            WireError::UnexpectedEof { pos: 3 }
        );
    }

    #[test]
    fn read_name_rejects_self_referencing_pointer() {
        // Pointer at offset 0 targeting offset 0
        let mut buf = ByteBuf::new(&[0xc0, 0x0]);
        let err = buf.read_name().unwrap_err();
        assert_eq!(
            err.downcast::<WireError>().unwrap(),
            WireError::InvalidPointer { pos: 0, target: 0 }
        );
    }

    #[test]
    fn read_name_rejects_forward_pointer() {
        let raw = &[0xc0, 0x3, 0x0, 0x2, 0x67, 0x6f, 0x0];
        let mut buf = ByteBuf::new(raw);
        let err = buf.read_name().unwrap_err();
        assert_eq!(
            err.downcast::<WireError>().unwrap(),
            WireError::InvalidPointer { pos: 0, target: 3 }
        );
    }

    #[test]
    fn write_root_name() {
        let mut buf = ByteBuf::new_empty(None);
        let written = buf.write_name("", None).expect("shouldn't have failed");
        assert_eq!(written, 1);
        assert_eq!(buf.as_ref(), &[0x0]);
    }

    #[test]
    fn write_dotless_name_as_root() {
        // A name with no dot carries zero labels
        let mut buf = ByteBuf::new_empty(None);
        buf.write_name("localhost", None).expect("shouldn't have failed");
        assert_eq!(buf.as_ref(), &[0x0]);
    }

    #[test]
    fn write_name_plain() {
        let mut buf = ByteBuf::new_empty(None);
        let written = buf.write_name("google.com", None).expect("shouldn't have failed");
        assert_eq!(written, 12);
        assert_eq!(
            buf.as_ref(),
            &[0x6, 0x67, 0x6f, 0x6f, 0x67, 0x6c, 0x65, 0x3, 0x63, 0x6f, 0x6d, 0x0]
        );
    }

    #[test]
    fn write_name_with_cache() {
        let mut buf = ByteBuf::new_empty(None);
        let mut cache = HashMap::new();

        buf.write_name("www.google.com", Some(&mut cache))
            .expect("shouldn't have failed");
        // Every suffix was recorded at the offset of its first label
        assert_eq!(cache.get("www.google.com"), Some(&0));
        assert_eq!(cache.get("google.com"), Some(&4));
        assert_eq!(cache.get("com"), Some(&11));

        // The shared suffix becomes a pointer to offset 4
        let written = buf
            .write_name("wap.google.com", Some(&mut cache))
            .expect("shouldn't have failed");
        assert_eq!(written, 3 + 1 + 2);
        assert_eq!(&buf.as_ref()[16..], &[0x3, 0x77, 0x61, 0x70, 0xc0, 0x4]);
    }

    #[test]
    fn write_name_with_oversized_label() {
        let name = "a".repeat(64) + ".com";
        let mut buf = ByteBuf::new_empty(None);
        let err = buf.write_name(&name, None).unwrap_err();
        assert!(matches!(
            err.downcast::<WireError>().unwrap(),
            WireError::OversizedLabel { len: 64, .. }
        ));
    }

    #[test]
    fn name_roundtrip_with_compression() {
        let mut buf = ByteBuf::new_empty(None);
        let mut cache = HashMap::new();
        buf.write_name("www.example.com", Some(&mut cache))
            .expect("shouldn't have failed");
        buf.write_name("mail.example.com", Some(&mut cache))
            .expect("shouldn't have failed");

        assert_eq!(buf.read_name().expect("shouldn't have failed"), "www.example.com");
        assert_eq!(buf.read_name().expect("shouldn't have failed"), "mail.example.com");
    }

    #[test]
    fn character_string_roundtrip() {
        let mut buf = ByteBuf::new_empty(None);
        let written = buf.write_character_string("sip+E2U").expect("shouldn't have failed");
        assert_eq!(written, 8);
        assert_eq!(
            buf.read_character_string().expect("shouldn't have failed"),
            "sip+E2U"
        );
    }

    #[test]
    fn character_string_too_long() {
        let mut buf = ByteBuf::new_empty(None);
        let err = buf.write_character_string(&"x".repeat(256)).unwrap_err();
        assert_eq!(
            err.downcast::<WireError>().unwrap(),
            WireError::OversizedCharacterString(256)
        );
    }
}
