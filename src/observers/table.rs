//! Table observer for pretty-printing counters.
//!
//! This module provides [`TableObserver`], which renders a collection of
//! [`Observable`] counters as a formatted ASCII table using the `tabled`
//! crate.
//!
//! # Feature Flag
//!
//! This module requires the `table` feature:
//!
//! ```toml
//! [dependencies]
//! soglie = { version = "0.1", features = ["table"] }
//! ```
//!
//! # Examples
//!
//! ## Standard format (vertical list)
//!
//! ```rust,ignore
//! use soglie::counter::Observable;
//! use soglie::counter::threshold::ThresholdCounter;
//! use soglie::observers::table::{TableObserver, TableStyle};
//!
//! let inflight = ThresholdCounter::new().with_name("inflight");
//! let queued = ThresholdCounter::new().with_name("queued");
//! inflight.initialize(10, 20);
//! queued.initialize(100, 500);
//!
//! inflight.add(15);
//! queued.add(42);
//!
//! let counters: Vec<&dyn Observable> = vec![&inflight, &queued];
//!
//! let observer = TableObserver::new().with_style(TableStyle::Rounded);
//! println!("{}", observer.render(counters.into_iter()));
//! // ╭──────────┬─────┬──────────╮
//! // │ Name     │ Sum │ Position │
//! // ├──────────┼─────┼──────────┤
//! // │ inflight │ 15  │ Between  │
//! // │ queued   │ 42  │ Below    │
//! // ╰──────────┴─────┴──────────╯
//! ```
//!
//! ## Compact format (multiple columns)
//!
//! ```rust,ignore
//! use soglie::observers::table::TableObserver;
//!
//! let observer = TableObserver::new().compact(true).columns(3);
//! println!("{}", observer.render(counters.into_iter()));
//! // ╭──────────────┬────────────┬──────────────╮
//! // │ inflight: 15 │ queued: 42 │ workers: 8   │
//! // ╰──────────────┴────────────┴──────────────╯
//! ```

use crate::counter::Observable;
use tabled::{builder::Builder, settings::Style, Table, Tabled};

/// Available table styles for rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TableStyle {
    /// ASCII table with simple characters: +, -, |
    Ascii,
    /// Modern rounded corners (default)
    #[default]
    Rounded,
    /// Sharp corners with box-drawing characters
    Sharp,
    /// Modern style with clean lines
    Modern,
    /// GitHub-flavored Markdown table
    Markdown,
    /// No borders, just spacing
    Blank,
}

/// Configuration for the table observer.
#[derive(Debug, Clone)]
pub struct TableConfig {
    /// The style to use for rendering.
    pub style: TableStyle,
    /// Whether to show the header row (only in non-compact mode).
    pub show_header: bool,
    /// Custom title for the table (optional).
    pub title: Option<String>,
    /// Whether to use compact format (name: value cells in a grid).
    pub compact: bool,
    /// Number of columns in compact mode (default: 1).
    pub columns: usize,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            style: TableStyle::default(),
            show_header: true,
            title: None,
            compact: false,
            columns: 1,
        }
    }
}

/// Internal row representation for tabled (standard mode).
#[derive(Tabled)]
struct CounterRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Sum")]
    sum: String,
    #[tabled(rename = "Position")]
    position: String,
}

/// An observer that renders counters as a formatted ASCII table.
///
/// Supports two rendering modes:
///
/// 1. **Standard mode**: Name, Sum and Position columns, one counter per row
/// 2. **Compact mode**: Multi-column grid with "name: sum" cells
#[derive(Debug, Clone, Default)]
pub struct TableObserver {
    config: TableConfig,
}

impl TableObserver {
    /// Creates a new table observer with default settings.
    ///
    /// Default style is [`TableStyle::Rounded`] in standard (non-compact)
    /// mode.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new table observer with the specified configuration.
    pub fn with_config(config: TableConfig) -> Self {
        Self { config }
    }

    /// Sets the table style.
    pub fn with_style(mut self, style: TableStyle) -> Self {
        self.config.style = style;
        self
    }

    /// Sets whether to show the header row.
    ///
    /// Only applies in standard (non-compact) mode.
    pub fn with_header(mut self, show: bool) -> Self {
        self.config.show_header = show;
        self
    }

    /// Sets an optional title for the table.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.config.title = Some(title.into());
        self
    }

    /// Enables or disables compact mode.
    ///
    /// In compact mode, counters are displayed as "name: sum" cells
    /// arranged in a grid with the specified number of columns.
    pub fn compact(mut self, enabled: bool) -> Self {
        self.config.compact = enabled;
        self
    }

    /// Sets the number of columns in compact mode.
    ///
    /// Default is 1. Values less than 1 are treated as 1.
    pub fn columns(mut self, count: usize) -> Self {
        self.config.columns = count.max(1);
        self
    }

    fn apply_style(&self, table: &mut Table) {
        match self.config.style {
            TableStyle::Ascii => {
                table.with(Style::ascii());
            }
            TableStyle::Rounded => {
                table.with(Style::rounded());
            }
            TableStyle::Sharp => {
                table.with(Style::sharp());
            }
            TableStyle::Modern => {
                table.with(Style::modern());
            }
            TableStyle::Markdown => {
                table.with(Style::markdown());
            }
            TableStyle::Blank => {
                table.with(Style::blank());
            }
        }
    }

    fn display_name(name: &str) -> String {
        if name.is_empty() {
            "(unnamed)".to_string()
        } else {
            name.to_string()
        }
    }

    /// Renders counters in compact mode (grid layout).
    fn render_compact<'a>(&self, counters: impl Iterator<Item = &'a dyn Observable>) -> String {
        let cells: Vec<String> = counters
            .map(|c| format!("{}: {}", Self::display_name(c.name()), c.value()))
            .collect();

        if cells.is_empty() {
            return String::new();
        }

        let cols = self.config.columns;
        let mut builder = Builder::default();
        for chunk in cells.chunks(cols) {
            let mut row: Vec<String> = chunk.to_vec();
            while row.len() < cols {
                row.push(String::new());
            }
            builder.push_record(row);
        }

        let mut table = builder.build();
        self.apply_style(&mut table);

        if let Some(ref title) = self.config.title {
            format!("{}\n{}", title, table)
        } else {
            table.to_string()
        }
    }

    /// Renders counters in standard mode (three-column table).
    fn render_standard<'a>(&self, counters: impl Iterator<Item = &'a dyn Observable>) -> String {
        let rows: Vec<CounterRow> = counters
            .map(|c| CounterRow {
                name: Self::display_name(c.name()),
                sum: c.value().to_string(),
                position: c.position().to_string(),
            })
            .collect();

        let mut table = Table::new(&rows);
        self.apply_style(&mut table);

        if !self.config.show_header {
            table.with(tabled::settings::Remove::row(
                tabled::settings::object::Rows::first(),
            ));
        }

        if let Some(ref title) = self.config.title {
            format!("{}\n{}", title, table)
        } else {
            table.to_string()
        }
    }

    /// Renders the counters as a formatted table string.
    ///
    /// # Arguments
    ///
    /// * `counters` - An iterator over references to [`Observable`] trait
    ///   objects
    pub fn render<'a>(&self, counters: impl Iterator<Item = &'a dyn Observable>) -> String {
        if self.config.compact {
            self.render_compact(counters)
        } else {
            self.render_standard(counters)
        }
    }
}
