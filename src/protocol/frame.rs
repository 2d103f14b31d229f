use crate::error::{FlowdError, Result};

/// Size of the big-endian length prefix.
pub const LEN_PREFIX_BYTES: usize = 4;

/// Upper bound on a single read from a connection.
pub const READ_CHUNK_BYTES: usize = 1024;

/// Prefix a payload with its 4-byte big-endian length.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    let len = u32::try_from(payload.len())
        .map_err(|_| FlowdError::Protocol(format!("payload too large: {} bytes", payload.len())))?;
    let mut frame = Vec::with_capacity(LEN_PREFIX_BYTES + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Reassembles one length-prefixed request from partial reads.
///
/// Each connection gets a fresh assembler; feed it chunks as they arrive and
/// it yields the payload once the accumulated bytes match the declared
/// length. The length prefix itself may arrive split across chunks. The
/// assembler is single-use: discard it after completion.
#[derive(Debug)]
pub struct RequestAssembler {
    header: Vec<u8>,
    declared: Option<usize>,
    data: Vec<u8>,
    max_payload: usize,
}

impl RequestAssembler {
    pub fn new(max_payload: usize) -> Self {
        Self {
            header: Vec::with_capacity(LEN_PREFIX_BYTES),
            declared: None,
            data: Vec::new(),
            max_payload,
        }
    }

    /// Accumulate one chunk. Returns the complete payload once accumulated
    /// bytes equal the declared length.
    ///
    /// # Errors
    ///
    /// `FlowdError::Protocol` when the declared length exceeds the
    /// configured maximum, or when the peer sends bytes past the declared
    /// end of the request.
    pub fn feed(&mut self, mut chunk: &[u8]) -> Result<Option<Vec<u8>>> {
        if self.declared.is_none() {
            let need = LEN_PREFIX_BYTES - self.header.len();
            let take = need.min(chunk.len());
            self.header.extend_from_slice(&chunk[..take]);
            chunk = &chunk[take..];

            if self.header.len() < LEN_PREFIX_BYTES {
                return Ok(None);
            }

            let mut prefix = [0u8; LEN_PREFIX_BYTES];
            prefix.copy_from_slice(&self.header);
            let declared = u32::from_be_bytes(prefix) as usize;
            if declared > self.max_payload {
                return Err(FlowdError::Protocol(format!(
                    "declared request length {} exceeds limit {}",
                    declared, self.max_payload
                )));
            }
            self.declared = Some(declared);
            self.data.reserve(declared);
        }

        let declared = self.declared.expect("declared length set above");
        if self.data.len() + chunk.len() > declared {
            return Err(FlowdError::Protocol(format!(
                "request overran declared length {} by {} bytes",
                declared,
                self.data.len() + chunk.len() - declared
            )));
        }
        self.data.extend_from_slice(chunk);

        if self.data.len() == declared {
            Ok(Some(std::mem::take(&mut self.data)))
        } else {
            Ok(None)
        }
    }

    /// Declared payload length, once the prefix has been read.
    pub fn declared_len(&self) -> Option<usize> {
        self.declared
    }

    /// Bytes accumulated so far, excluding the prefix.
    pub fn buffered_len(&self) -> usize {
        self.data.len()
    }
}
