//! Markup contract with the calendar page.
//!
//! Everything the engines query or write lives here. The page's own markup is
//! undocumented and changes without notice, so every lookup built on these
//! constants must tolerate them matching nothing.
//!
//! # Usage
//!
//! ```ignore
//! use colorkit_core::selectors::{attr, role};
//!
//! let grids = dom.query_all(root, role::GRID);
//! dom.set_attribute(cell, attr::PAINTED, "1");
//! ```

/// ARIA roles the calendar renders.
pub mod role {
    /// Time grid and month grid (`[role="grid"]`).
    pub const GRID: &str = "[role=\"grid\"]";

    /// Grid rows (`[role="row"]`).
    pub const ROW: &str = "[role=\"row\"]";

    /// Day cells and day columns (`[role="gridcell"]`).
    pub const GRIDCELL: &str = "[role=\"gridcell\"]";

    /// Column headers in week and custom-days views.
    pub const COLUMN_HEADER: &str = "[role=\"columnheader\"]";

    /// Open modals (`[role="dialog"]`).
    pub const DIALOG: &str = "[role=\"dialog\"]";

    /// Main calendar landmark; its presence means the app has rendered.
    pub const MAIN: &str = "[role=\"main\"]";

    /// Clickable surface nested inside a chip.
    pub const BUTTON: &str = "[role=\"button\"]";
}

/// Attributes owned by the page.
pub mod page_attr {
    /// View state on the body (`DAY`, `WEEK`, `MONTH`, `CUSTOM_DAYS`, ...).
    pub const VIEW_KEY: &str = "data-viewkey";

    /// Bit-packed date key on day containers.
    pub const DATE_KEY: &str = "data-datekey";

    /// Start date of the visible range.
    pub const START_DATE_KEY: &str = "data-start-date-key";

    /// `YYYYMMDD` or `YYYY-MM-DD` on cells and mini-calendar days.
    pub const DATE: &str = "data-date";

    /// Chip identifier; task chips carry a `tasks_` or `tasks.` prefix.
    pub const EVENT_ID: &str = "data-eventid";

    /// Plain task id, used by some chip variants.
    pub const TASK_ID: &str = "data-taskid";

    /// `datetime` on embedded `<time>` elements.
    pub const DATETIME: &str = "datetime";
}

/// Prefixes that mark a chip as a task. Both are six characters long.
pub const TASK_ID_PREFIXES: [&str; 2] = ["tasks_", "tasks."];

/// Class names on the page.
pub mod class {
    /// Event column of the single-day view.
    pub const DAY_VIEW_COLUMN: &str = "day-view-column";

    /// Container of the sidebar mini calendar.
    pub const MINI_CALENDAR: &str = "mini-calendar";

    /// Paintable square inside a month gridcell.
    pub const MONTH_DAY_SQUARE: &str = "month-day-square";

    /// Nested time grid inside a day container.
    pub const TIME_GRID: &str = "time-grid";

    /// Host element for the color row in a task editor.
    pub const TASK_COLOR_HOST: &str = "task-color-host";
}

/// Attributes and ids written by ColorKit. Cleanup only ever touches these.
pub mod attr {
    /// Marker on month squares painted by the month painter.
    pub const PAINTED: &str = "data-ck-painted";

    /// Column index stamped on week-view day columns.
    pub const COLUMN_INDEX: &str = "data-column-index";

    /// Marker on elements carrying an inline day-coloring background.
    pub const DAY_PAINTED: &str = "data-ck-day";

    /// Time range recorded on a rendered time block (`HH:MM-HH:MM`).
    pub const BLOCK_RANGE: &str = "data-ck-range";

    /// Color last painted onto a task chip by the task engine.
    pub const TASK_PAINTED: &str = "data-ck-task-color";

    /// Task id on an injected color control.
    pub const CONTROL_TASK: &str = "data-ck-task";

    /// Color carried by a swatch button.
    pub const SWATCH_COLOR: &str = "data-ck-color";

    /// Action of a control button (`apply` or `clear`).
    pub const ACTION: &str = "data-ck-action";
}

/// Ids and classes of elements ColorKit creates.
pub mod owned {
    /// Stylesheet injected by the day coloring engine.
    pub const DAY_STYLE_ID: &str = "colorkit-day-coloring";

    /// Absolutely positioned time block overlay.
    pub const TIME_BLOCK_CLASS: &str = "colorkit-time-block";

    /// Injected task color controls.
    pub const TASK_CONTROLS_CLASS: &str = "colorkit-task-controls";

    /// One swatch inside the task controls.
    pub const SWATCH_CLASS: &str = "colorkit-swatch";
}
