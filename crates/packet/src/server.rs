//! Blocking TCP server: one acceptor thread, dispatch through a
//! [`ClientPool`], matching the original `comm/packet/packet_server.hpp`.
//!
//! State machine per connection: `Accepted → NonceSent → Registered →
//! Serving ↔ Serving → Closed`, matching `spec.md` §4.5. A protocol
//! violation or handshake timeout transitions directly to `Closed`.

use crate::crypto::Token;
use crate::envelope;
use crate::message::{Request, Response};
use crate::multiplex::ClientPool;
use crate::negotiation::{self, NONCE_LEN};
use provider::RepertoryError;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// `(client_id, thread_id, method, args) -> (status, result)`.
pub type Handler = Arc<dyn Fn(&str, u64, &str, Vec<u8>) -> (u32, Vec<u8>) + Send + Sync>;
/// Invoked once per connection teardown so the file manager can reap
/// remote open handles for that `client_id`.
pub type ClosedCallback = Arc<dyn Fn(&str) + Send + Sync>;

struct Connection {
    client_id: String,
    stream: Mutex<TcpStream>,
    nonce: Mutex<[u8; NONCE_LEN]>,
}

/// Accepts connections on one `TcpListener` and dispatches frames to a
/// per-client worker pool.
pub struct PacketServer {
    listener: TcpListener,
    pool: ClientPool,
    handler: Handler,
    closed: ClosedCallback,
    token: Option<Token>,
    stop: Arc<AtomicBool>,
}

impl PacketServer {
    /// Binds `addr` and prepares (but does not yet run) the accept loop.
    ///
    /// # Errors
    ///
    /// Returns [`RepertoryError::CommError`] if binding fails.
    pub fn bind(
        addr: &str,
        pool_size: usize,
        handler: Handler,
        closed: ClosedCallback,
    ) -> Result<Self, RepertoryError> {
        let listener =
            TcpListener::bind(addr).map_err(|e| RepertoryError::CommError(Some(e.to_string())))?;
        Ok(Self {
            listener,
            pool: ClientPool::new(pool_size),
            handler,
            closed,
            token: None,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Configures a shared encryption token for payloads on accepted
    /// connections.
    #[must_use]
    pub fn with_token(mut self, token: Vec<u8>) -> Self {
        self.token = Some(Token::new(token));
        self
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.listener
            .local_addr()
            .expect("bound listener always has a local address")
    }

    /// Runs the accept loop on the calling thread until [`Self::shutdown`]
    /// is called. Each accepted connection is served on its own thread.
    pub fn serve(&self) {
        loop {
            if self.stop.load(Ordering::SeqCst) {
                return;
            }
            let Ok((stream, _)) = self.listener.accept() else {
                continue;
            };
            if self.stop.load(Ordering::SeqCst) {
                return;
            }
            self.accept_connection(stream);
        }
    }

    fn accept_connection(&self, mut stream: TcpStream) {
        let _ = stream.set_nodelay(true);
        let Ok((client_id, nonce)) = negotiation::server_handshake(&mut stream) else {
            return;
        };

        self.pool.register(&client_id);
        let read_stream = match stream.try_clone() {
            Ok(s) => s,
            Err(_) => return,
        };
        let connection = Arc::new(Connection {
            client_id,
            stream: Mutex::new(stream),
            nonce: Mutex::new(nonce),
        });

        self.serve_connection(read_stream, connection);
    }

    fn serve_connection(&self, mut read_stream: TcpStream, connection: Arc<Connection>) {
        loop {
            if self.stop.load(Ordering::SeqCst) {
                break;
            }
            let mut frame = match envelope::read_frame(&mut read_stream) {
                Ok(frame) => frame,
                Err(_) => break,
            };
            if let Some(token) = &self.token {
                token.apply(&mut frame);
            }
            let Ok(request) = Request::decode(&frame) else {
                break;
            };

            let expected = *connection.nonce.lock().unwrap();
            if request.nonce != expected {
                break;
            }

            let connection = Arc::clone(&connection);
            let handler = Arc::clone(&self.handler);
            let token = self.token.clone();
            let thread_id = request.thread_id;
            self.pool
                .dispatch(&connection.client_id, thread_id, move || {
                    Self::handle_one(&connection, &handler, token.as_ref(), request);
                });
        }

        self.pool.unregister(&connection.client_id);
        (self.closed)(&connection.client_id);
    }

    fn handle_one(
        connection: &Connection,
        handler: &Handler,
        token: Option<&Token>,
        request: Request,
    ) {
        let (status, result) = handler(
            &connection.client_id,
            request.thread_id,
            &request.method,
            request.args,
        );
        let new_nonce = {
            let mut nonce = connection.nonce.lock().unwrap();
            *nonce = negotiation::rotate_nonce(&nonce);
            *nonce
        };
        let response = Response {
            nonce: new_nonce,
            service_flags: request.service_flags,
            status,
            result,
        };
        let mut payload = response.encode();
        if let Some(token) = token {
            token.apply(&mut payload);
        }
        let mut stream = connection.stream.lock().unwrap();
        let _ = envelope::write_frame(&mut stream, &payload);
    }

    /// Signals the accept loop and all per-client pools to stop, then
    /// unblocks a pending `accept()` with a local connect.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Ok(addr) = self.listener.local_addr() {
            let _ = TcpStream::connect(addr);
        }
    }
}
