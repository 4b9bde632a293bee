//! Human-readable descriptions for click positions and window switches.
//!
//! Both classifiers are ordered rule tables evaluated top to bottom; the first rule whose
//! title pattern matches produces the description.

use crate::bridge::ScreenSize;
use crate::models::{Point, WindowInfo};

/// Height of the taskbar strip at the bottom of the screen.
const TASKBAR_HEIGHT: i32 = 60;
const START_BUTTON_WIDTH: i32 = 80;
const TASKBAR_ICONS_END: i32 = 200;
const TITLEBAR_HEIGHT: i32 = 50;

// Fixed spreadsheet grid; an estimate, not a real cell lookup.
const SHEET_TOOLBAR_HEIGHT: i32 = 120;
const SHEET_ROW_HEADER_WIDTH: i32 = 80;
const SHEET_COLUMN_HEADER_END: i32 = 150;
const SHEET_COLUMN_WIDTH: i32 = 64;
const SHEET_ROW_HEIGHT: i32 = 20;

/// Matches a window title exactly against `exact` or by substring against `contains`.
#[derive(Debug, Clone, Copy)]
pub struct TitlePattern {
    pub exact: &'static [&'static str],
    pub contains: &'static [&'static str],
}

impl TitlePattern {
    pub fn matches(&self, title: &str) -> bool {
        self.exact.iter().any(|candidate| title == *candidate)
            || self.contains.iter().any(|needle| title.contains(*needle))
    }
}

pub const RUN_DIALOG: TitlePattern = TitlePattern {
    exact: &["Run"],
    contains: &["运行"],
};

pub const FILE_MANAGER: TitlePattern = TitlePattern {
    exact: &["Files"],
    contains: &["File Explorer", "资源管理器", "文件夹"],
};

pub const SPREADSHEET: TitlePattern = TitlePattern {
    exact: &[],
    contains: &[".xlsx", ".xls"],
};

pub const DOCUMENT: TitlePattern = TitlePattern {
    exact: &[],
    contains: &[".txt", ".doc"],
};

pub const BROWSER: TitlePattern = TitlePattern {
    exact: &[],
    contains: &["Chrome", "Edge", "Firefox"],
};

pub const CLAUDE_DESKTOP: TitlePattern = TitlePattern {
    exact: &[],
    contains: &["Claude"],
};

pub struct ClickRule {
    pub pattern: TitlePattern,
    pub describe: fn(Point, &WindowInfo) -> String,
}

pub struct WindowRule {
    pub pattern: TitlePattern,
    pub describe: fn(&WindowInfo) -> String,
}

pub const CLICK_RULES: &[ClickRule] = &[
    ClickRule {
        pattern: RUN_DIALOG,
        describe: describe_run_dialog_click,
    },
    ClickRule {
        pattern: FILE_MANAGER,
        describe: describe_file_manager_click,
    },
    ClickRule {
        pattern: SPREADSHEET,
        describe: describe_spreadsheet_click,
    },
    ClickRule {
        pattern: DOCUMENT,
        describe: describe_document_click,
    },
];

pub const WINDOW_RULES: &[WindowRule] = &[
    WindowRule {
        pattern: FILE_MANAGER,
        describe: describe_file_manager_window,
    },
    WindowRule {
        pattern: SPREADSHEET,
        describe: describe_spreadsheet_window,
    },
    WindowRule {
        pattern: DOCUMENT,
        describe: describe_document_window,
    },
    WindowRule {
        pattern: RUN_DIALOG,
        describe: describe_run_dialog_window,
    },
    WindowRule {
        pattern: BROWSER,
        describe: describe_browser_window,
    },
    WindowRule {
        pattern: CLAUDE_DESKTOP,
        describe: describe_claude_window,
    },
];

/// Leading segment of titles shaped like `name.ext - Application`.
fn file_name(title: &str) -> &str {
    title.split(" - ").next().unwrap_or(title)
}

pub fn describe_click(position: Point, screen: ScreenSize, window: Option<&WindowInfo>) -> String {
    if position.y > screen.height - TASKBAR_HEIGHT {
        return if position.x < START_BUTTON_WIDTH {
            "clicked the start button".to_string()
        } else if position.x < TASKBAR_ICONS_END {
            "clicked a taskbar icon".to_string()
        } else {
            "clicked the taskbar".to_string()
        };
    }

    if position.y < TITLEBAR_HEIGHT {
        return "clicked a window titlebar".to_string();
    }

    match window {
        Some(window) if !window.title.is_empty() => CLICK_RULES
            .iter()
            .find(|rule| rule.pattern.matches(&window.title))
            .map(|rule| (rule.describe)(position, window))
            .unwrap_or_else(|| {
                format!(
                    "clicked in {} at ({}, {})",
                    window.title, position.x, position.y
                )
            }),
        _ => format!("clicked at ({}, {})", position.x, position.y),
    }
}

pub fn describe_window(window: &WindowInfo) -> String {
    WINDOW_RULES
        .iter()
        .find(|rule| rule.pattern.matches(&window.title))
        .map(|rule| (rule.describe)(window))
        .unwrap_or_else(|| format!("switched to window: {}", window.title))
}

fn describe_run_dialog_click(_: Point, _: &WindowInfo) -> String {
    "operated in the run dialog".to_string()
}

fn describe_file_manager_click(_: Point, _: &WindowInfo) -> String {
    "clicked in the file manager".to_string()
}

fn describe_document_click(position: Point, window: &WindowInfo) -> String {
    format!(
        "clicked in document {} at ({}, {})",
        file_name(&window.title),
        position.x,
        position.y
    )
}

fn describe_spreadsheet_click(position: Point, window: &WindowInfo) -> String {
    let relative_x = position.x - window.rect.left;
    let relative_y = position.y - window.rect.top;

    if relative_y < SHEET_TOOLBAR_HEIGHT {
        "clicked the spreadsheet toolbar or menu area".to_string()
    } else if relative_x < SHEET_ROW_HEADER_WIDTH {
        "clicked the spreadsheet row header area".to_string()
    } else if relative_y < SHEET_COLUMN_HEADER_END {
        "clicked the spreadsheet column header area".to_string()
    } else {
        format!(
            "clicked spreadsheet cell {} (estimated)",
            estimate_cell(relative_x, relative_y)
        )
    }
}

fn describe_file_manager_window(_: &WindowInfo) -> String {
    "opened the file manager".to_string()
}

fn describe_spreadsheet_window(window: &WindowInfo) -> String {
    format!("opened spreadsheet: {}", file_name(&window.title))
}

fn describe_document_window(window: &WindowInfo) -> String {
    format!("opened document: {}", file_name(&window.title))
}

fn describe_run_dialog_window(_: &WindowInfo) -> String {
    "opened the run dialog".to_string()
}

fn describe_browser_window(_: &WindowInfo) -> String {
    "switched to the browser".to_string()
}

fn describe_claude_window(_: &WindowInfo) -> String {
    "switched to Claude Desktop".to_string()
}

/// Projects a window-relative offset onto the fixed grid, e.g. `B3`.
pub fn estimate_cell(relative_x: i32, relative_y: i32) -> String {
    let column = (relative_x - SHEET_ROW_HEADER_WIDTH).max(0) / SHEET_COLUMN_WIDTH;
    let row = (relative_y - SHEET_COLUMN_HEADER_END).max(0) / SHEET_ROW_HEIGHT;
    let letter = char::from(b'A' + (column % 26) as u8);
    format!("{letter}{}", row + 1)
}
