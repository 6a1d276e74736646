//! Reassembly of the agent backend's chunk stream
//!
//! Raw transport text lands in a [`ChunkBuffer`]. The [`ObjectExtractor`]
//! pulls complete JSON objects out of it, classifies them as control or
//! content units and passes plain text through, leaving at most one
//! unterminated object behind for the next chunk.

mod chunk_buffer;
mod control;
mod object_extractor;
mod sse;

#[cfg(test)]
mod test_realistic_chunks;
#[cfg(test)]
pub(crate) mod test_utils;

pub use chunk_buffer::ChunkBuffer;
pub use control::{ControlMessage, ExtractedUnit};
pub use object_extractor::ObjectExtractor;
pub use sse::SseDecoder;

pub(crate) use chunk_buffer::Utf8Carry;
