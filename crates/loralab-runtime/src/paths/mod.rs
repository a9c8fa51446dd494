//! Compute service path resolution.
//!
//! - `layout` - Source checkout and installed resource roots
//! - `interpreter` - Python interpreter search policy (development only)
//! - `resolver` - [`PathResolver`], the `ExecutableResolver` implementation

mod interpreter;
mod layout;
mod resolver;

pub use interpreter::{InterpreterSearch, PYTHON_ENV};
pub use layout::{
    BACKEND_DIR, ENTRY_POINT, PACKAGED_BINARY_STEM, RESOURCE_DIR_ENV, SOURCE_ROOT_ENV,
    ServiceLayout,
};
pub use resolver::{PathResolver, packaged_binary_path};
