//! Execution-side building blocks: managed buffers supplied by the host, fixed-width value
//! accumulators, and the typed output vectors projection rows are written into.

pub mod accumulator;
pub mod buffer;
pub mod vectors;

pub use accumulator::Accumulator;
pub use buffer::{BufferProvider, HeapBufferProvider, ManagedBuffer};
pub use vectors::OutputVector;
