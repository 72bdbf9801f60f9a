//! Blocking TCP client with connection pooling, reconnect, and liveness
//! probing, matching the original `comm/packet/packet_client.hpp`.

use crate::crypto::Token;
use crate::envelope;
use crate::message::{Request, Response};
use crate::negotiation::{self, NONCE_LEN};
use provider::RepertoryError;
use socket2::SockRef;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Mutex;
use sync::Throttle;

struct PooledSocket {
    stream: TcpStream,
    nonce: [u8; NONCE_LEN],
}

/// Connection pool to one `host:port`, used by the peer remote mount to
/// call into its peer's packet server.
pub struct PacketClient {
    host: String,
    port: u16,
    client_id: String,
    token: Option<Token>,
    max_connect_retries: u32,
    idle: Mutex<Vec<PooledSocket>>,
    admission: Throttle,
}

impl PacketClient {
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        port: u16,
        client_id: impl Into<String>,
        pool_size: usize,
        max_connect_retries: u32,
        token: Option<Vec<u8>>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            client_id: client_id.into(),
            token: token.map(Token::new),
            max_connect_retries,
            idle: Mutex::new(Vec::new()),
            admission: Throttle::new(pool_size.max(1)),
        }
    }

    fn connect(&self) -> Result<PooledSocket, RepertoryError> {
        let mut stream = TcpStream::connect((self.host.as_str(), self.port))
            .map_err(|e| RepertoryError::CommError(Some(e.to_string())))?;
        stream
            .set_nodelay(true)
            .map_err(|e| RepertoryError::CommError(Some(e.to_string())))?;
        let nonce = negotiation::client_handshake(&mut stream, &self.client_id)?;
        Ok(PooledSocket { stream, nonce })
    }

    /// Returns `true` if the socket appears to still be open, using a
    /// non-blocking zero-byte peek (the original's `MSG_PEEK` probe).
    fn is_alive(socket: &TcpStream) -> bool {
        let sock_ref = SockRef::from(socket);
        let mut buf = [0_u8; 1];
        match sock_ref.peek(&mut buf) {
            Ok(0) => false,
            Ok(_) => true,
            Err(e) => e.kind() == std::io::ErrorKind::WouldBlock,
        }
    }

    fn checkout(&self) -> Result<PooledSocket, RepertoryError> {
        loop {
            let candidate = self.idle.lock().unwrap().pop();
            match candidate {
                Some(socket) if Self::is_alive(&socket.stream) => return Ok(socket),
                Some(_dead) => continue,
                None => return self.connect(),
            }
        }
    }

    fn checkin(&self, socket: PooledSocket) {
        self.idle.lock().unwrap().push(socket);
    }

    /// Sends `method` with `args`, blocking for the one reply frame.
    /// Returns the response body and its `service_flags`.
    ///
    /// `thread_id` requests worker affinity on the server: requests
    /// sharing a `thread_id` are served in order by the same worker.
    ///
    /// # Errors
    ///
    /// Returns [`RepertoryError::CommError`] after exhausting
    /// `max_connect_retries` reconnect attempts, or on a nonce mismatch
    /// in the reply.
    pub fn send(
        &self,
        method: &str,
        thread_id: u64,
        service_flags: u32,
        args: Vec<u8>,
    ) -> Result<(Vec<u8>, u32), RepertoryError> {
        self.admission.acquire();
        let result = self.send_with_retries(method, thread_id, service_flags, args);
        self.admission.release();
        result
    }

    fn send_with_retries(
        &self,
        method: &str,
        thread_id: u64,
        service_flags: u32,
        args: Vec<u8>,
    ) -> Result<(Vec<u8>, u32), RepertoryError> {
        let mut last_error = RepertoryError::CommError(Some("no attempts made".to_string()));
        for _ in 0..=self.max_connect_retries {
            let mut socket = match self.checkout() {
                Ok(socket) => socket,
                Err(error) => {
                    last_error = error;
                    continue;
                }
            };

            match self.try_send(&mut socket, method, thread_id, service_flags, &args) {
                Ok(result) => {
                    self.checkin(socket);
                    return Ok(result);
                }
                Err(error) => {
                    // socket is discarded, not returned to the pool
                    last_error = error;
                }
            }
        }
        Err(last_error)
    }

    fn try_send(
        &self,
        socket: &mut PooledSocket,
        method: &str,
        thread_id: u64,
        service_flags: u32,
        args: &[u8],
    ) -> Result<(Vec<u8>, u32), RepertoryError> {
        let request = Request {
            nonce: socket.nonce,
            service_flags,
            method: method.to_string(),
            thread_id,
            args: args.to_vec(),
        };
        let mut payload = request.encode();
        if let Some(token) = &self.token {
            token.apply(&mut payload);
        }
        envelope::write_frame(&mut socket.stream, &payload)?;

        let mut reply = envelope::read_frame(&mut socket.stream)?;
        if let Some(token) = &self.token {
            token.apply(&mut reply);
        }
        let response = Response::decode(&reply)?;
        // The server rotates the connection's nonce on every reply and
        // carries the new value here rather than echoing the request's;
        // the client simply adopts it for the next send on this socket.
        socket.nonce = response.nonce;
        if response.status != 0 {
            return Err(RepertoryError::Error(Some(format!(
                "remote call to '{method}' failed with status {}",
                response.status
            ))));
        }
        Ok((response.result, response.service_flags))
    }
}
