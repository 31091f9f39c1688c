//! Native-messaging framing: a 4-byte native-endian length prefix followed by
//! a UTF-8 JSON payload.

use std::io::{self, Read, Write};

/// Largest frame accepted in either direction. The browser refuses host
/// messages above 1 MiB, so the host holds itself and its peer to the same cap.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Reads one frame. Returns `Ok(None)` on a clean end of stream (no bytes of
/// a new header were read).
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut header = [0u8; 4];
    let mut filled = 0;
    while filled < header.len() {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream ended inside a frame header",
                ))
            }
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }

    let len = u32::from_ne_bytes(header) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds maximum of {}", len, MAX_FRAME_BYTES),
        ));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(Some(payload))
}

pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    if payload.len() > MAX_FRAME_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "frame of {} bytes exceeds maximum of {}",
                payload.len(),
                MAX_FRAME_BYTES
            ),
        ));
    }

    let len = payload.len() as u32;
    writer.write_all(&len.to_ne_bytes())?;
    writer.write_all(payload)?;
    writer.flush()
}
