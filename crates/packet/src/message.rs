//! Request/response payload layout carried inside an [`crate::envelope`]
//! frame, per `spec.md` §6: a nonce prefix authenticating the frame,
//! followed by the method call itself.

use crate::negotiation::NONCE_LEN;
use provider::RepertoryError;

/// A request payload: `nonce:256 bytes | service_flags:u32 | method:len-
/// prefixed UTF-8 | thread_id:u64 | args`.
#[derive(Clone, Debug)]
pub struct Request {
    pub nonce: [u8; NONCE_LEN],
    pub service_flags: u32,
    pub method: String,
    pub thread_id: u64,
    pub args: Vec<u8>,
}

impl Request {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let method_bytes = self.method.as_bytes();
        let mut buf =
            Vec::with_capacity(NONCE_LEN + 4 + 4 + method_bytes.len() + 8 + self.args.len());
        buf.extend_from_slice(&self.nonce);
        buf.extend_from_slice(&self.service_flags.to_be_bytes());
        buf.extend_from_slice(&u32::try_from(method_bytes.len()).unwrap_or(0).to_be_bytes());
        buf.extend_from_slice(method_bytes);
        buf.extend_from_slice(&self.thread_id.to_be_bytes());
        buf.extend_from_slice(&self.args);
        buf
    }

    /// # Errors
    ///
    /// Returns [`RepertoryError::CommError`] when `bytes` is shorter than
    /// the fixed-width prefix it declares.
    pub fn decode(bytes: &[u8]) -> Result<Self, RepertoryError> {
        let mut cursor = Cursor::new(bytes);
        let nonce = cursor.take_array::<NONCE_LEN>()?;
        let service_flags = cursor.take_u32()?;
        let method_len = cursor.take_u32()? as usize;
        let method = cursor.take_utf8(method_len)?;
        let thread_id = cursor.take_u64()?;
        let args = cursor.take_rest();
        Ok(Self {
            nonce,
            service_flags,
            method,
            thread_id,
            args,
        })
    }
}

/// A response payload: `nonce:32 bytes | service_flags:u32 | status:u32 |
/// result`.
#[derive(Clone, Debug)]
pub struct Response {
    pub nonce: [u8; NONCE_LEN],
    pub service_flags: u32,
    pub status: u32,
    pub result: Vec<u8>,
}

impl Response {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(NONCE_LEN + 4 + 4 + self.result.len());
        buf.extend_from_slice(&self.nonce);
        buf.extend_from_slice(&self.service_flags.to_be_bytes());
        buf.extend_from_slice(&self.status.to_be_bytes());
        buf.extend_from_slice(&self.result);
        buf
    }

    /// # Errors
    ///
    /// Returns [`RepertoryError::CommError`] when `bytes` is shorter than
    /// the fixed-width prefix it declares.
    pub fn decode(bytes: &[u8]) -> Result<Self, RepertoryError> {
        let mut cursor = Cursor::new(bytes);
        let nonce = cursor.take_array::<NONCE_LEN>()?;
        let service_flags = cursor.take_u32()?;
        let status = cursor.take_u32()?;
        let result = cursor.take_rest();
        Ok(Self {
            nonce,
            service_flags,
            status,
            result,
        })
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], RepertoryError> {
        let end = self.pos.checked_add(len).ok_or_else(|| too_short())?;
        let slice = self.bytes.get(self.pos..end).ok_or_else(too_short)?;
        self.pos = end;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], RepertoryError> {
        let slice = self.take(N)?;
        slice.try_into().map_err(|_| too_short())
    }

    fn take_u32(&mut self) -> Result<u32, RepertoryError> {
        Ok(u32::from_be_bytes(self.take_array::<4>()?))
    }

    fn take_u64(&mut self) -> Result<u64, RepertoryError> {
        Ok(u64::from_be_bytes(self.take_array::<8>()?))
    }

    fn take_utf8(&mut self, len: usize) -> Result<String, RepertoryError> {
        let slice = self.take(len)?;
        String::from_utf8(slice.to_vec())
            .map_err(|e| RepertoryError::CommError(Some(e.to_string())))
    }

    fn take_rest(&mut self) -> Vec<u8> {
        let rest = &self.bytes[self.pos..];
        self.pos = self.bytes.len();
        rest.to_vec()
    }
}

fn too_short() -> RepertoryError {
    RepertoryError::CommError(Some("payload shorter than declared layout".to_string()))
}
