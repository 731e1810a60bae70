pub mod stream_buffer;

pub use stream_buffer::{StreamBuffer, StreamCursors};
