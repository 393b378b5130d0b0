//! Foreign-function bindings. Only the Python surface exists today; it is
//! compiled in by the `python` feature.

pub mod python;
