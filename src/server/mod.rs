//! Boundary types between the kernel and the transport: the pre-parsed
//! [`Request`], the finalized [`Response`] and the [`ResponseSink`] that
//! receives it at SEND_RESPONSE.

pub mod request;
pub mod response;
pub mod sink;

pub use request::{
    parse_cookies, parse_query_params, HeaderVec, Request, RequestMode, MAX_INLINE_HEADERS,
};
pub use response::{status_reason, Response};
pub use sink::{BufferSink, NullSink, ResponseSink, WriterSink};
