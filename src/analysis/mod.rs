mod accumulator;
mod histogram;
mod series;

pub use accumulator::*;
pub use histogram::*;
pub use series::*;
