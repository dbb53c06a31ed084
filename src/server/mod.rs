pub mod listener;
pub mod stack;

pub use stack::Stack;
