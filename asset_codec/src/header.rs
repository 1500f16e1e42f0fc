use crate::CodecError;

pub const HEADER_SIZE: usize = 0x80;

pub fn remove_header(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    if data.len() < HEADER_SIZE {
        return Err(CodecError::ShortHeader {
            len: data.len(),
            expected: HEADER_SIZE,
        });
    }
    Ok(data[HEADER_SIZE..].to_vec())
}

pub fn add_header(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE + data.len());
    out.resize(HEADER_SIZE, 0);
    out.extend_from_slice(data);
    out
}
