//! Wire protocol for task submission.
//!
//! One request/response pair per connection:
//! - **Request**: a 4-byte big-endian length prefix followed by exactly that
//!   many bytes of a JSON-encoded [`TaskRequest`].
//! - **Response**: the JSON bytes of a [`TaskResponse`], written once, after
//!   which the connection is closed.
//!
//! There is no version field, no keep-alive, and no multiplexing of
//! multiple requests on one connection.

pub mod frame;
pub mod message;

pub use frame::{encode_frame, RequestAssembler, LEN_PREFIX_BYTES, READ_CHUNK_BYTES};
pub use message::{TaskRequest, TaskResponse};
