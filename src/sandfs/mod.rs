pub mod content;
pub mod fs;
pub mod kernel;
pub mod lifecycle;
pub mod paths;
pub mod tree;

// vim:ts=2 sw=2
