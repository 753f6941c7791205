use std::io::{ErrorKind, Read};

use crate::DxlError;

/// Bytes discarded while looking for a header before giving up
pub(crate) const MAX_SYNC_BYTES: usize = 64;

pub(crate) fn read_byte<R: Read>(reader: &mut R) -> Result<u8, DxlError> {
    let mut byte = [0u8; 1];
    read_exact(reader, &mut byte)?;
    Ok(byte[0])
}

/// `read_exact` with timeouts and end-of-stream mapped to [`DxlError::Timeout`]
pub(crate) fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), DxlError> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e)
            if matches!(
                e.kind(),
                ErrorKind::TimedOut | ErrorKind::UnexpectedEof | ErrorKind::WouldBlock
            ) =>
        {
            Err(DxlError::Timeout)
        }
        Err(e) => Err(DxlError::Io(e)),
    }
}

/// Consume bytes until `header` has just been read
pub(crate) fn sync_to<R: Read>(reader: &mut R, header: &[u8]) -> Result<(), DxlError> {
    let mut window: Vec<u8> = Vec::with_capacity(header.len());
    for _ in 0..MAX_SYNC_BYTES {
        if window.len() == header.len() {
            window.remove(0);
        }
        window.push(read_byte(reader)?);
        if window == header {
            return Ok(());
        }
    }
    Err(DxlError::NoHeader(MAX_SYNC_BYTES))
}
