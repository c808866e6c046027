//! TUI rendering and input handling for Cashier.
//!
//! Draws the table surface (header, activity log, footer), the busy
//! indicators of in-flight calls, and any "OK" dialogs on top, oldest first.

mod effects;
mod input;
mod theme;

pub use effects::apply_modal_effect;
pub use input::{Action, InputPump, action_for, apply_action, handle_events};
pub use theme::{Glyphs, Palette, glyphs, palette, spinner_frame, styles};

use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Clear, Padding, Paragraph, Wrap},
};
use unicode_width::UnicodeWidthStr;

use cashier_engine::{
    ActivityKind, App, DialogSession, DialogTone, DialogView, Environment, Payment,
};

const DIALOG_MIN_WIDTH: u16 = 36;
const DIALOG_MAX_WIDTH: u16 = 64;
const DIALOG_CHROME_HEIGHT: u16 = 6; // frame and button rows, plus one spare for word wrap
const OK_BUTTON: &str = "[ OK ]";

pub fn draw(frame: &mut Frame, app: &App) {
    let options = app.ui_options();
    let palette = palette(options);
    let glyphs = glyphs(options);

    let bg_block = Block::default().style(Style::default().bg(palette.bg_dark));
    frame.render_widget(bg_block, frame.area());

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(1),    // Activity
            Constraint::Length(1), // Status
            Constraint::Length(1), // Key hints
        ])
        .split(frame.area());

    draw_header(frame, app, chunks[0], &palette, &glyphs);
    draw_activity(frame, app, chunks[1], &palette, &glyphs);
    draw_status_bar(frame, app, chunks[2], &palette);
    draw_key_hints(frame, app, chunks[3], &palette);

    draw_busy_indicators(frame, app, chunks[1], &palette);

    let viewport = frame.area();
    for session in app.dialogs() {
        if let Some(view) = app.dialog_view(session) {
            draw_dialog(frame, session, view, viewport, &palette);
        }
    }
}

fn draw_header(frame: &mut Frame, app: &App, area: Rect, palette: &Palette, glyphs: &Glyphs) {
    let environment = app.environment();
    let (location_glyph, location_text, location_color) = match app.real_money_allowed() {
        Some(true) => (glyphs.allowed, "real money allowed", palette.success),
        Some(false) => (glyphs.blocked, "real money blocked", palette.error),
        None => (glyphs.unknown, "location unchecked", palette.text_muted),
    };

    let title = Line::from(vec![
        Span::styled("Cashier", styles::title(palette)),
        Span::raw("  "),
        Span::styled(
            format!(" {} ", environment.as_str().to_uppercase()),
            styles::environment_badge(palette, environment == Environment::Production),
        ),
        Span::raw("  "),
        Span::styled(
            app.table_name().to_string(),
            Style::default().fg(palette.text_primary),
        ),
    ]);

    let detail = Line::from(vec![
        Span::styled(
            format!("{location_glyph} {location_text}"),
            Style::default().fg(location_color),
        ),
        Span::styled("  |  ", Style::default().fg(palette.bg_border)),
        Span::styled(
            payment_summary(app.last_payment()),
            Style::default().fg(palette.text_secondary),
        ),
    ]);

    let header = Paragraph::new(vec![title, detail]).block(
        Block::default()
            .borders(Borders::BOTTOM)
            .border_style(Style::default().fg(palette.bg_border)),
    );
    frame.render_widget(header, area);
}

fn payment_summary(payment: Option<&Payment>) -> String {
    match payment {
        Some(payment) => match payment.payer_id() {
            Some(payer) => format!("payment {} {} (payer {payer})", payment.id, payment.state),
            None => format!("payment {} {}", payment.id, payment.state),
        },
        None => "no payment yet".to_string(),
    }
}

fn draw_activity(frame: &mut Frame, app: &App, area: Rect, palette: &Palette, glyphs: &Glyphs) {
    let visible = usize::from(area.height);
    let entries = app.activity();
    let skip = entries.len().saturating_sub(visible);

    let lines: Vec<Line> = entries
        .iter()
        .skip(skip)
        .map(|entry| {
            let (glyph, color) = match entry.kind {
                ActivityKind::Info => (glyphs.info, palette.text_muted),
                ActivityKind::Success => (glyphs.success, palette.success),
                ActivityKind::Failure => (glyphs.failure, palette.error),
            };
            Line::from(vec![
                Span::styled(format!("{glyph} "), Style::default().fg(color)),
                Span::styled(
                    entry.text.clone(),
                    Style::default().fg(palette.text_primary),
                ),
            ])
        })
        .collect();

    let body = if lines.is_empty() {
        Paragraph::new(Line::from(Span::styled(
            "Press p to execute the payment, g to look it up, l to check your location.",
            Style::default().fg(palette.text_muted),
        )))
    } else {
        Paragraph::new(lines)
    };
    frame.render_widget(body, area);
}

fn draw_status_bar(frame: &mut Frame, app: &App, area: Rect, palette: &Palette) {
    let (text, style) = match app.status_message() {
        Some(message) => (message.to_string(), Style::default().fg(palette.warning)),
        None => {
            let pending = app.orchestrator().in_flight();
            if pending > 0 {
                let spinner = spinner_frame(app.tick_count(), app.ui_options());
                (
                    format!("{spinner} {pending} call(s) in flight"),
                    Style::default().fg(palette.primary),
                )
            } else {
                ("Ready".to_string(), Style::default().fg(palette.success))
            }
        }
    };

    let status = Paragraph::new(Line::from(vec![Span::raw(" "), Span::styled(text, style)]));
    frame.render_widget(status, area);
}

fn draw_key_hints(frame: &mut Frame, app: &App, area: Rect, palette: &Palette) {
    let hints: &[(&str, &str)] = if app.has_dialog() {
        &[("Enter", "OK"), ("Ctrl-C", "quit")]
    } else {
        &[
            ("p", "pay"),
            ("g", "lookup"),
            ("l", "location"),
            ("n", "next table"),
            ("c", "cancel"),
            ("q", "quit"),
        ]
    };

    let mut spans = vec![Span::raw(" ")];
    for (index, (key, label)) in hints.iter().enumerate() {
        if index > 0 {
            spans.push(Span::styled("  ", styles::key_hint(palette)));
        }
        spans.push(Span::styled(*key, styles::key_highlight(palette)));
        spans.push(Span::styled(format!(" {label}"), styles::key_hint(palette)));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// One small box per visible indicator, stacked upward from the bottom of `area`.
fn draw_busy_indicators(frame: &mut Frame, app: &App, area: Rect, palette: &Palette) {
    let spinner = spinner_frame(app.tick_count(), app.ui_options());
    let mut bottom = area.y.saturating_add(area.height);

    for (_, label) in app.scene().visible_indicators() {
        let text = format!("{spinner} {label}...");
        let width = (text.width() as u16 + 4).min(area.width);
        if bottom < area.y + 3 {
            break;
        }
        let rect = Rect {
            x: area.x + area.width.saturating_sub(width) / 2,
            y: bottom - 3,
            width,
            height: 3,
        };
        bottom -= 3;

        frame.render_widget(Clear, rect);
        let indicator = Paragraph::new(Line::from(Span::styled(
            text,
            Style::default().fg(palette.primary),
        )))
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(palette.bg_border))
                .style(Style::default().bg(palette.bg_panel)),
        );
        frame.render_widget(indicator, rect);
    }
}

fn draw_dialog(
    frame: &mut Frame,
    session: &DialogSession,
    view: &DialogView,
    viewport: Rect,
    palette: &Palette,
) {
    let base = dialog_rect(view, viewport);
    let rect = match session.effect() {
        Some(effect) => apply_modal_effect(effect, base, viewport),
        None => base,
    };

    let accent = match view.tone {
        DialogTone::Notice => palette.accent,
        DialogTone::Error => palette.error,
    };

    let mut block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(accent))
        .padding(Padding::horizontal(1))
        .style(Style::default().bg(palette.bg_popup));
    if let Some(title) = &view.title {
        block = block.title(Span::styled(
            format!(" {title} "),
            Style::default().fg(accent).add_modifier(Modifier::BOLD),
        ));
    }

    let mut lines = vec![Line::default()];
    lines.extend(view.message.lines().map(|line| {
        Line::from(Span::styled(
            line.to_string(),
            Style::default().fg(palette.text_primary),
        ))
    }));
    lines.push(Line::default());
    lines.push(
        Line::from(Span::styled(OK_BUTTON, styles::button(palette))).alignment(Alignment::Center),
    );

    frame.render_widget(Clear, rect);
    frame.render_widget(
        Paragraph::new(lines)
            .block(block)
            .wrap(Wrap { trim: true }),
        rect,
    );
}

/// Resting position of a dialog: centered, sized to its message.
fn dialog_rect(view: &DialogView, viewport: Rect) -> Rect {
    let widest = view
        .message
        .lines()
        .map(UnicodeWidthStr::width)
        .chain(view.title.as_deref().map(|t| t.width() + 2))
        .max()
        .unwrap_or(0) as u16;

    let width = widest
        .saturating_add(4)
        .clamp(DIALOG_MIN_WIDTH, DIALOG_MAX_WIDTH)
        .min(viewport.width);
    let inner_width = width.saturating_sub(4).max(1);
    let height = wrapped_line_count(&view.message, inner_width)
        .saturating_add(DIALOG_CHROME_HEIGHT)
        .min(viewport.height);

    Rect {
        x: viewport.x + viewport.width.saturating_sub(width) / 2,
        y: viewport.y + viewport.height.saturating_sub(height) / 2,
        width,
        height,
    }
}

fn wrapped_line_count(text: &str, width: u16) -> u16 {
    let width = usize::from(width.max(1));
    let lines: usize = text
        .lines()
        .map(|line| line.width().div_ceil(width).max(1))
        .sum();
    (lines.max(1)).min(usize::from(u16::MAX)) as u16
}
