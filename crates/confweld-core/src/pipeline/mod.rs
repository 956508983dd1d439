//! CI pipeline topology and the weld solver.

mod adder;
mod container;
mod instruction;
mod partition;

pub use adder::{Adder, WeldResult};
pub use container::Container;
pub use instruction::{replay, Instruction};
pub use partition::{partition, Partition};
