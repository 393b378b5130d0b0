//! This file is the root of the `rcsfs` Rust crate.
//!
//! Its responsibilities are strictly limited to:
//! 1.  Declaring all the top-level modules of the library (`record`,
//!     `convert`, `parquet_io`, etc.) so the Rust compiler knows they exist.
//! 2.  Defining the `#[pymodule]` which acts as the main entry point when the
//!     compiled library is imported into Python (behind the `python`
//!     feature).

//==================================================================================
// 0. Constants
//==================================================================================
/// The crate version, automatically set from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//==================================================================================
// 1. Module Declarations
//==================================================================================
pub mod buffer;
pub mod config;
pub mod convert;
pub mod error;
pub mod parquet_io;
pub mod record;
pub mod schema;

#[cfg(feature = "python")]
mod ffi;

pub use config::{CompressionCodec, ConvertConfig, ParseErrorPolicy};
pub use convert::{
    convert_csf_text_to_parquet, convert_csf_text_to_parquet_parallel, CancelToken,
    ConversionReport, RecordIssue,
};
pub use error::RcsfsError;
pub use parquet_io::{inspect, CsfRowReader, ParquetInfo};

//==================================================================================
// 2. Python Module Definition
//==================================================================================
#[cfg(feature = "python")]
use pyo3::prelude::*;

/// The `rcsfs` Python module, containing all exposed Rust functions.
#[cfg(feature = "python")]
#[pymodule]
fn rcsfs(py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(ffi::python::convert_py, m)?)?;
    m.add_function(wrap_pyfunction!(ffi::python::read_py, m)?)?;
    m.add_function(wrap_pyfunction!(ffi::python::info_py, m)?)?;
    m.add_function(wrap_pyfunction!(ffi::python::enable_verbose_logging_py, m)?)?;

    // --- Expose the custom error type ---
    m.add(
        "RcsfsError",
        py.get_type::<pyo3::exceptions::PyValueError>(),
    )?;

    // --- Expose version string as a module attribute ---
    m.add("__version__", VERSION)?;

    Ok(())
}
