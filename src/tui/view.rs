use crate::browser::{Browser, Entry};
use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
};
use time::format_description::FormatItem;
use time::macros::format_description;
use time::UtcOffset;

const HEADER: &str = "Which playbook result would you like to view?";
const CANCEL_HINT: &str = "Press Ctrl+C to quit.";

/// Lines above the first entry: header and a blank line.
pub const HEADER_LINES: usize = 2;
/// Lines below the last entry: a blank line and the hint.
pub const FOOTER_LINES: usize = 2;

/// Short local stamp, e.g. `Mar  1 10:05:00`.
const STAMP_FORMAT: &[FormatItem<'static>] = format_description!(
    "[month repr:short] [day padding:space] [hour]:[minute]:[second]"
);

/// Everything the list rendering needs besides the browser state.
#[derive(Debug, Clone)]
pub struct RenderStyle {
    pub marker: &'static str,
    pub marker_style: Style,
    pub target_style: Style,
    pub offset: UtcOffset,
}

impl RenderStyle {
    pub fn with_offset(offset: UtcOffset) -> Self {
        Self {
            offset,
            ..Self::default()
        }
    }
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            marker: ">",
            marker_style: Style::default()
                .fg(Color::Rgb(0xa8, 0x32, 0xa4))
                .add_modifier(Modifier::BOLD),
            target_style: Style::default()
                .fg(Color::Rgb(0x00, 0xa2, 0xff))
                .add_modifier(Modifier::BOLD),
            offset: UtcOffset::UTC,
        }
    }
}

fn entry_line(entry: &Entry, selected: bool, style: &RenderStyle) -> Line<'static> {
    let local = entry.start_time().to_offset(style.offset);
    let stamp = local
        .format(STAMP_FORMAT)
        .unwrap_or_else(|_| local.to_string());
    let marker = if selected {
        Span::styled(style.marker, style.marker_style)
    } else {
        Span::raw(" ".repeat(style.marker.chars().count()))
    };
    Line::from(vec![
        marker,
        Span::raw(" "),
        Span::styled(entry.target().to_string(), style.target_style),
        Span::raw(" "),
        Span::raw(stamp),
    ])
}

/// Render the whole list. Pure: same state and style, same text.
pub fn render(browser: &Browser, style: &RenderStyle) -> Text<'static> {
    let mut lines = Vec::with_capacity(browser.entries().len() + HEADER_LINES + FOOTER_LINES);
    lines.push(Line::from(HEADER));
    lines.push(Line::from(""));
    for (i, entry) in browser.entries().iter().enumerate() {
        lines.push(entry_line(entry, i == browser.cursor(), style));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(CANCEL_HINT));
    Text::from(lines)
}

/// First line to show so the cursor row stays inside a viewport of `height` rows.
pub fn scroll_offset(browser: &Browser, height: usize) -> usize {
    let total = browser.entries().len() + HEADER_LINES + FOOTER_LINES;
    if height == 0 || total <= height {
        return 0;
    }
    let cursor_line = HEADER_LINES + browser.cursor();
    // Keep the hint visible once the cursor reaches the bottom.
    let wanted_bottom = (cursor_line + 1 + FOOTER_LINES).min(total);
    wanted_bottom.saturating_sub(height).min(cursor_line)
}
