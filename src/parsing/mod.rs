//! N-Quads parsing.
//!
//! `nquads` turns one line into a [`Statement`](crate::core::Statement);
//! `reader` yields the lines of a plain or gzip-compressed source file.

pub mod nquads;
pub mod reader;

pub use nquads::{parse_quad_line, peek_graph, QuadParseError};
pub use reader::LineSource;
