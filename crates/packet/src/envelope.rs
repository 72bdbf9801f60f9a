//! Wire framing: `[u32 BE length][payload]`, matching the original
//! `comm/packet/packet.hpp` frame and `spec.md` §6.

use provider::RepertoryError;
use std::io::{Read, Write};

/// Maximum accepted frame payload size (32 MiB). A declared length above
/// this is a protocol error and is rejected before any allocation.
pub const MAX_FRAME_SIZE: u32 = 32 * 1024 * 1024;

/// Writes one frame (`length` prefix followed by `payload`) to `writer`.
///
/// # Errors
///
/// Returns [`RepertoryError::BufferOverflow`] if `payload` exceeds
/// [`MAX_FRAME_SIZE`], or [`RepertoryError::CommError`] on I/O failure.
pub fn write_frame(writer: &mut impl Write, payload: &[u8]) -> Result<(), RepertoryError> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        RepertoryError::BufferOverflow(Some("payload exceeds u32 length prefix".to_string()))
    })?;
    if len > MAX_FRAME_SIZE {
        return Err(RepertoryError::BufferOverflow(Some(format!(
            "frame of {len} bytes exceeds maximum of {MAX_FRAME_SIZE}"
        ))));
    }
    writer
        .write_all(&len.to_be_bytes())
        .map_err(|e| RepertoryError::CommError(Some(e.to_string())))?;
    writer
        .write_all(payload)
        .map_err(|e| RepertoryError::CommError(Some(e.to_string())))
}

/// Reads one frame from `reader`, validating the declared length against
/// [`MAX_FRAME_SIZE`] before allocating a buffer for the payload.
///
/// # Errors
///
/// Returns [`RepertoryError::BufferOverflow`] if the declared length
/// exceeds [`MAX_FRAME_SIZE`], or [`RepertoryError::CommError`] on I/O
/// failure (including a clean EOF before any bytes are read).
pub fn read_frame(reader: &mut impl Read) -> Result<Vec<u8>, RepertoryError> {
    let mut len_bytes = [0_u8; 4];
    reader
        .read_exact(&mut len_bytes)
        .map_err(|e| RepertoryError::CommError(Some(e.to_string())))?;
    let len = u32::from_be_bytes(len_bytes);
    if len > MAX_FRAME_SIZE {
        return Err(RepertoryError::BufferOverflow(Some(format!(
            "declared frame length {len} exceeds maximum of {MAX_FRAME_SIZE}"
        ))));
    }

    let mut payload = vec![0_u8; len as usize];
    reader
        .read_exact(&mut payload)
        .map_err(|e| RepertoryError::CommError(Some(e.to_string())))?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn oversized_frame_is_rejected_without_allocating() {
        let mut cursor = std::io::Cursor::new((MAX_FRAME_SIZE + 1).to_be_bytes().to_vec());
        let err = read_frame(&mut cursor).unwrap_err();
        assert_eq!(err.name(), "buffer_overflow");
    }

    proptest! {
        #[test]
        fn round_trips_any_payload_up_to_64kb(payload in proptest::collection::vec(any::<u8>(), 0..65536)) {
            let mut buf = Vec::new();
            write_frame(&mut buf, &payload).unwrap();
            let mut cursor = std::io::Cursor::new(buf);
            let decoded = read_frame(&mut cursor).unwrap();
            prop_assert_eq!(decoded, payload);
        }
    }
}
