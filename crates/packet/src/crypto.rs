//! Optional shared-token symmetric encryption for packet payloads. Kept
//! intentionally simple per `SPEC_FULL.md` §4.5: wire-format
//! compatibility with any particular provider is out of scope, the
//! contract only requires *a* shared-token symmetric scheme.

use zeroize::Zeroize;

/// Derives a keystream from `token` and XORs `data` in place, using a
/// counter-mode-style expansion so the keystream never simply repeats
/// the token bytes.
fn apply_keystream(token: &[u8], data: &mut [u8]) {
    if token.is_empty() {
        return;
    }
    let mut counter: u64 = 0;
    let mut keystream_block = Vec::with_capacity(token.len() + 8);
    let mut produced = 0_usize;
    let mut block_offset = token.len();

    for byte in data.iter_mut() {
        if block_offset >= token.len() {
            keystream_block.clear();
            keystream_block.extend_from_slice(token);
            keystream_block.extend_from_slice(&counter.to_be_bytes());
            for (i, b) in keystream_block.iter_mut().enumerate() {
                *b ^= token[i % token.len()];
            }
            counter = counter.wrapping_add(1);
            block_offset = 0;
        }
        *byte ^= keystream_block[block_offset];
        block_offset += 1;
        produced += 1;
    }
    let _ = produced;
}

/// A configured shared encryption token. Encryption is symmetric: the
/// same [`Token`] encrypts and decrypts. Cloning copies the underlying
/// bytes; each clone zeroizes its own copy independently on drop.
#[derive(Clone)]
pub struct Token {
    bytes: Vec<u8>,
}

impl Token {
    #[must_use]
    pub fn new(token: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: token.into(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Encrypts/decrypts `payload` in place. XOR is its own inverse, so
    /// this single method serves both directions.
    pub fn apply(&self, payload: &mut [u8]) {
        apply_keystream(&self.bytes, payload);
    }
}

impl Drop for Token {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_apply_twice() {
        let token = Token::new(b"shared-secret".to_vec());
        let original = b"hello, peer remote mount".to_vec();
        let mut payload = original.clone();
        token.apply(&mut payload);
        assert_ne!(payload, original);
        token.apply(&mut payload);
        assert_eq!(payload, original);
    }

    #[test]
    fn empty_token_is_a_no_op() {
        let token = Token::new(Vec::new());
        let original = b"unencrypted".to_vec();
        let mut payload = original.clone();
        token.apply(&mut payload);
        assert_eq!(payload, original);
    }
}
