use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

fn key_line(key: &'static str, pad: usize, what: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(key, Style::default().fg(Color::Magenta)),
        Span::raw(" ".repeat(pad)),
        Span::raw(what),
    ])
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let p = Paragraph::new(vec![
        Line::from("Keybinds:"),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("q", Style::default().fg(Color::Magenta)),
            Span::raw(" / "),
            Span::styled("Ctrl-C", Style::default().fg(Color::Magenta)),
            Span::raw("  Quit"),
        ]),
        key_line("o", 11, "Select files (type paths, Enter to confirm, Esc to cancel)"),
        key_line("paste", 7, "Drop or paste file paths to select them"),
        key_line("1/2/3", 7, "Toggle ERC20 / ERC721 / ERC1155"),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("a", Style::default().fg(Color::Magenta)),
            Span::raw(" / "),
            Span::styled("Enter", Style::default().fg(Color::Magenta)),
            Span::raw("   Analyze selected files"),
        ]),
        key_line("y", 11, "Copy results to clipboard"),
        key_line("s", 11, "Export results to a text file"),
        key_line("tab", 9, "Switch tabs"),
        key_line("?", 11, "Show this help"),
        Line::from(""),
        Line::from("Notes:"),
        Line::from("  Only the first selected file is uploaded."),
        Line::from("  Results from the last successful analysis are kept between sessions."),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}
