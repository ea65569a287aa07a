//! Outer surfaces: CSV input of initiation requests and CSV lifecycle reports.

pub mod csv;
