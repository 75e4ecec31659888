//! ASCII transfer-type translation.
//!
//! In ASCII mode the wire format uses CRLF line endings regardless of the
//! server's native convention: outbound data turns bare LF into CRLF, and
//! inbound data turns CRLF back into LF. The codec is chunk-safe: a CR
//! that lands on a read boundary is held until the next chunk so CRLF
//! pairs are never split or doubled.

/// Stateful newline translator for one direction of one transfer.
#[derive(Debug, Default)]
pub struct AsciiCodec {
    pending_cr: bool,
}

impl AsciiCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translates a chunk for sending: LF becomes CRLF, existing CRLF pairs
    /// pass through untouched.
    pub fn encode(&mut self, chunk: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(chunk.len() + chunk.len() / 8);
        for &byte in chunk {
            match byte {
                b'\n' => {
                    if !self.pending_cr {
                        out.push(b'\r');
                    }
                    out.push(b'\n');
                    self.pending_cr = false;
                }
                b'\r' => {
                    out.push(b'\r');
                    self.pending_cr = true;
                }
                other => {
                    out.push(other);
                    self.pending_cr = false;
                }
            }
        }
        out
    }

    /// Translates a received chunk: CRLF becomes LF, a lone CR passes
    /// through unchanged.
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(chunk.len());
        for &byte in chunk {
            if self.pending_cr {
                self.pending_cr = false;
                if byte == b'\n' {
                    out.push(b'\n');
                    continue;
                }
                out.push(b'\r');
            }
            if byte == b'\r' {
                self.pending_cr = true;
            } else {
                out.push(byte);
            }
        }
        out
    }

    /// Flushes any byte held across chunk boundaries; call once at EOF.
    pub fn finish(&mut self) -> Vec<u8> {
        if std::mem::take(&mut self.pending_cr) {
            vec![b'\r']
        } else {
            Vec::new()
        }
    }
}
