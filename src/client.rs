use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{FlowdError, Result};
use crate::protocol::{encode_frame, TaskRequest, TaskResponse};

/// Submit one task over the wire protocol and wait for its result.
///
/// Opens a connection, writes the length-prefixed request, reads the
/// response to EOF, and decodes it. One request per connection.
pub async fn submit(addr: SocketAddr, request: &TaskRequest) -> Result<TaskResponse> {
    let mut stream = TcpStream::connect(addr).await?;

    let frame = encode_frame(&request.to_bytes()?)?;
    stream.write_all(&frame).await?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await?;
    if response.is_empty() {
        return Err(FlowdError::Protocol(
            "connection closed with no response".to_string(),
        ));
    }
    TaskResponse::from_bytes(&response)
}
