pub mod container;
pub mod diagnostics;
pub mod flags;
pub mod path;
pub mod resolver;
