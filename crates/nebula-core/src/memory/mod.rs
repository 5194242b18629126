pub mod buffer;
pub mod in_memory;
pub mod scratchpad;
pub mod search;
pub mod store;
pub mod versioned;
