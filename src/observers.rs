//! Observer implementations for exporting counter state.
//!
//! This module provides the export surfaces for
//! [`Observable`](crate::counter::Observable) counters:
//!
//! - [`table`] - Pretty-print counters as tables using the `tabled` crate
//! - [`json`] - Serialize counter snapshots to JSON format
//!
//! # Unified Error Handling
//!
//! All observers use a unified [`ObserverError`] type, allowing you to switch
//! between observers without changing error handling code.
//!
//! # Feature Flags
//!
//! Each observer is gated behind a feature flag to minimize dependencies:
//!
//! - `table` - Enables the [`table`] module
//! - `json` - Enables the [`json`] module
//! - `full` - Enables all observer modules
//!
//! # Example
//!
//! ```rust,ignore
//! use soglie::counter::Observable;
//! use soglie::counter::threshold::ThresholdCounter;
//! use soglie::observers::Result;
//!
//! fn export_metrics(counters: &[&dyn Observable]) -> Result<()> {
//!     #[cfg(feature = "table")]
//!     {
//!         use soglie::observers::table::TableObserver;
//!         let observer = TableObserver::new();
//!         println!("{}", observer.render(counters.iter().copied()));
//!     }
//!
//!     #[cfg(feature = "json")]
//!     {
//!         use soglie::observers::json::JsonObserver;
//!         let json = JsonObserver::new().to_json(counters.iter().copied())?;
//!         println!("{}", json);
//!     }
//!
//!     Ok(())
//! }
//! ```

mod error;

pub use error::{ObserverError, Result};

#[cfg(feature = "table")]
pub mod table;

#[cfg(feature = "json")]
pub mod json;
