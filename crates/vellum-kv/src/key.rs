//! Order-preserving tuple key codec.
//!
//! Keys are tuples of typed elements. Each element is encoded as a type
//! tag, an escaped payload (`0x00` → `0x00 0xFF`), and a `0x00`
//! terminator. Because the escape keeps payload bytes in their original
//! order and the terminator sorts below every escaped byte, byte-level
//! lexicographic comparison of encoded keys matches element-wise tuple
//! comparison, and the encoding of a tuple prefix is a byte prefix of
//! every tuple that extends it.

const BYTES_TAG: u8 = 0x01;
const STR_TAG: u8 = 0x02;
const TERM: u8 = 0x00;
const ESCAPED_NUL: u8 = 0xFF;

/// One element of a tuple key. `Bytes` sorts before `Str` at the same
/// tuple position.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyPart {
    Bytes(Vec<u8>),
    Str(String),
}

impl KeyPart {
    pub fn str(s: impl Into<String>) -> Self {
        KeyPart::Str(s.into())
    }

    pub fn bytes(b: impl Into<Vec<u8>>) -> Self {
        KeyPart::Bytes(b.into())
    }

    fn tag(&self) -> u8 {
        match self {
            KeyPart::Bytes(_) => BYTES_TAG,
            KeyPart::Str(_) => STR_TAG,
        }
    }

    fn payload(&self) -> &[u8] {
        match self {
            KeyPart::Bytes(b) => b,
            KeyPart::Str(s) => s.as_bytes(),
        }
    }

    fn write(&self, buf: &mut Vec<u8>) {
        buf.push(self.tag());
        write_escaped(buf, self.payload());
        buf.push(TERM);
    }
}

fn write_escaped(buf: &mut Vec<u8>, raw: &[u8]) {
    for &b in raw {
        buf.push(b);
        if b == TERM {
            buf.push(ESCAPED_NUL);
        }
    }
}

/// Encode a tuple. The result is also the scan prefix covering every
/// tuple that extends `parts`.
pub fn encode_tuple(parts: &[KeyPart]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(parts.iter().map(|p| p.payload().len() + 2).sum());
    for part in parts {
        part.write(&mut buf);
    }
    buf
}

/// Decode an encoded tuple back into its elements.
///
/// Returns `None` on a truncated element, an unknown tag, or invalid
/// UTF-8 in a `Str` element.
pub fn decode_tuple(bytes: &[u8]) -> Option<Vec<KeyPart>> {
    let mut parts = Vec::new();
    let mut rest = bytes;
    while !rest.is_empty() {
        let tag = rest[0];
        let (payload, remaining) = read_escaped(&rest[1..])?;
        let part = match tag {
            BYTES_TAG => KeyPart::Bytes(payload),
            STR_TAG => KeyPart::Str(String::from_utf8(payload).ok()?),
            _ => return None,
        };
        parts.push(part);
        rest = remaining;
    }
    Some(parts)
}

/// Read an escaped payload up to its unescaped terminator.
fn read_escaped(bytes: &[u8]) -> Option<(Vec<u8>, &[u8])> {
    let mut payload = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == TERM {
            if bytes.get(i + 1) == Some(&ESCAPED_NUL) {
                payload.push(TERM);
                i += 2;
                continue;
            }
            return Some((payload, &bytes[i + 1..]));
        }
        payload.push(b);
        i += 1;
    }
    None
}

/// Smallest byte string strictly greater than every key starting with
/// `prefix`. `None` when no such bound exists (the all-`0xFF` prefix).
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while end.last() == Some(&0xFF) {
        end.pop();
    }
    let last = end.last_mut()?;
    *last += 1;
    Some(end)
}

/// Byte range `[start, end)` covering every tuple that extends `parts`
/// with a `Bytes` element (and nothing else at that position).
pub fn bytes_element_range(parts: &[KeyPart]) -> (Vec<u8>, Vec<u8>) {
    let prefix = encode_tuple(parts);
    let mut start = prefix.clone();
    start.push(BYTES_TAG);
    let mut end = prefix;
    end.push(BYTES_TAG + 1);
    (start, end)
}

/// Scan bound sitting just **before** the first tuple extending `parts`
/// whose next `Bytes` element is ≥ `value`.
pub fn bytes_bound_before(parts: &[KeyPart], value: &[u8]) -> Vec<u8> {
    let mut buf = encode_tuple(parts);
    buf.push(BYTES_TAG);
    write_escaped(&mut buf, value);
    buf
}

/// Scan bound sitting just **after** every tuple extending `parts` whose
/// next `Bytes` element equals `value`, and before any greater element.
pub fn bytes_bound_after(parts: &[KeyPart], value: &[u8]) -> Vec<u8> {
    let mut buf = bytes_bound_before(parts, value);
    buf.push(TERM);
    buf.push(ESCAPED_NUL);
    buf
}
