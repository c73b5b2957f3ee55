use crate::errors::DeserializeError;

pub fn read_bytes<'a>(buf: &mut &'a [u8], len: usize) -> Result<&'a [u8], DeserializeError> {
    if buf.len() < len {
        return Err(DeserializeError::UnexpectedEOF);
    }
    let (head, rest) = buf.split_at(len);
    *buf = rest;
    Ok(head)
}

pub fn read_u32(buf: &mut &[u8]) -> Result<u32, DeserializeError> {
    let raw = read_bytes(buf, 4)?;
    Ok(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

pub fn utf8(bytes: &[u8], what: &'static str) -> Result<String, DeserializeError> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|_| DeserializeError::InvalidUtf8(what))
}
