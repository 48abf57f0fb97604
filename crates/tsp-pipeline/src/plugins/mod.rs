//! Small reference plugins used by the test suite and example binaries:
//! a packet generator, a label-aware passthrough processor, and a counting
//! sink. None of these ship as product plugins; they exist to exercise the
//! ring without pulling in real capture/mux hardware.

mod counting_sink;
mod generator;
mod passthrough;

pub use counting_sink::CountingOutput;
pub use generator::GeneratorInput;
pub use passthrough::PassthroughProcessor;
