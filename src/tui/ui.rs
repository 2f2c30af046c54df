//! UI rendering for the debugger.

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph, List, ListItem, Wrap},
    style::{Color, Style, Modifier},
};
use crate::cpu::registers::{FLOATING_REGISTER_COUNT, GENERAL_REGISTER_COUNT, INDEX_REGISTER_COUNT};
use crate::word::{to_binary_string, PackedFloat, Word};
use super::app::DebuggerApp;

/// Main draw function.
pub fn draw(frame: &mut Frame, app: &DebuggerApp) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(55),
            Constraint::Percentage(45),
        ])
        .split(frame.area());

    // Left side: code, registers and status
    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(8),
            Constraint::Length(16),
            Constraint::Length(3),
        ])
        .split(chunks[0]);

    draw_disassembly(frame, left_chunks[0], app);
    draw_registers(frame, left_chunks[1], app);
    draw_status(frame, left_chunks[2], app);

    // Right side: memory, printer and help
    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(10),
            Constraint::Length(6),
            Constraint::Length(5),
        ])
        .split(chunks[1]);

    draw_memory(frame, right_chunks[0], app);
    draw_printer(frame, right_chunks[1], app);
    draw_help(frame, right_chunks[2]);
}

/// Draw disassembly view.
fn draw_disassembly(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let disasm = app.get_disassembly((area.height as usize).saturating_sub(2));

    let items: Vec<ListItem> = disasm
        .iter()
        .map(|(addr, instr, is_current)| {
            let prefix = if *is_current { "▶ " } else { "  " };
            let bp = if app.breakpoints.contains(addr) { "●" } else { " " };
            let text = format!("{}{:04}: {}", prefix, addr, instr);

            let style = if *is_current {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if app.breakpoints.contains(addr) {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            };

            ListItem::new(format!("{} {}", bp, text)).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(Block::default()
            .title(" Disassembly ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)));

    frame.render_widget(list, area);
}

fn word_line(name: String, value: Word) -> Line<'static> {
    Line::from(vec![
        Span::raw(format!("{:<4}", name)),
        Span::styled(to_binary_string(value), Style::default().fg(Color::White)),
        Span::raw(format!(" = {}", value)),
    ])
}

/// Draw register state.
fn draw_registers(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let ctx = &app.machine.ctx;
    let regs = &ctx.registers;
    let mut content = Vec::new();

    for i in 0..GENERAL_REGISTER_COUNT {
        content.push(word_line(format!("R{}", i), regs.gpr(i)));
    }
    for i in 1..INDEX_REGISTER_COUNT {
        content.push(word_line(format!("X{}", i), regs.ixr(i)));
    }
    for i in 0..FLOATING_REGISTER_COUNT {
        let value = regs.fr(i);
        content.push(Line::from(vec![
            Span::raw(format!("FR{} ", i)),
            Span::styled(to_binary_string(value), Style::default().fg(Color::White)),
            Span::raw(format!(" ~ {}", PackedFloat::from_word(value).to_f64())),
        ]));
    }
    content.push(Line::from(vec![
        Span::raw("PC: "),
        Span::styled(format!("{:04}", regs.pc.get()), Style::default().fg(Color::Yellow)),
        Span::raw(format!("   MAR: {:04}   MBR: {}", regs.mar.get(), to_binary_string(regs.mbr))),
    ]));
    content.push(word_line("IR".into(), regs.ir));
    content.push(Line::from(format!(
        "CC: {}   MSR: {}   MFR: {}",
        ctx.cc.to_nibble_string(),
        ctx.status.to_nibble_string(),
        ctx.mfr.to_nibble_string()
    )));

    let stats = ctx.memory.cache_stats();
    let phase = app.machine.phase();
    content.push(Line::from(vec![
        Span::raw("Phase: "),
        Span::styled(format!("{} ({})", phase.number(), phase.name()), Style::default().fg(Color::Cyan)),
        Span::raw(format!(
            "   Cycles: {}   Cache: {}/{} ({:.0}% miss)",
            app.machine.cycles(),
            stats.hits,
            stats.misses,
            stats.miss_rate() * 100.0
        )),
        Span::raw("   "),
        Span::styled(
            if ctx.status.supervisor() { "SUPERVISOR" } else { "user" },
            if ctx.status.supervisor() {
                Style::default().fg(Color::Red)
            } else {
                Style::default().fg(Color::Green)
            },
        ),
    ]));

    let paragraph = Paragraph::new(content)
        .block(Block::default()
            .title(" Registers ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green)));

    frame.render_widget(paragraph, area);
}

/// Draw memory view.
fn draw_memory(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let visible_rows = (area.height as usize).saturating_sub(2);
    let pc = app.machine.ctx.registers.pc.index();

    let items: Vec<ListItem> = app
        .machine
        .ctx
        .memory
        .dump(app.mem_scroll, visible_rows)
        .into_iter()
        .map(|(addr, value)| {
            let text = format!("{:04}: {} = {}", addr, to_binary_string(value), value);

            let style = if addr == pc {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if value != 0 {
                Style::default().fg(Color::White)
            } else {
                Style::default().fg(Color::DarkGray)
            };

            ListItem::new(text).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(Block::default()
            .title(" Memory ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta)));

    frame.render_widget(list, area);
}

/// Draw printer output.
fn draw_printer(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let printer = Paragraph::new(app.printer.clone())
        .wrap(Wrap { trim: false })
        .block(Block::default()
            .title(" Printer ")
            .borders(Borders::ALL));

    frame.render_widget(printer, area);
}

/// Draw status bar, or the input prompt in input mode.
fn draw_status(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let (title, text, color) = match &app.input {
        Some(line) => (" Keyboard input (Enter to send, Esc to cancel) ", format!("> {}", line), Color::Yellow),
        None => (" Status ", app.status.clone(), Color::White),
    };

    let status = Paragraph::new(text)
        .style(Style::default().fg(color))
        .block(Block::default()
            .title(title)
            .borders(Borders::ALL));

    frame.render_widget(status, area);
}

/// Draw help panel.
fn draw_help(frame: &mut Frame, area: Rect) {
    let help = Paragraph::new(vec![
        Line::from("s: Phase  n: Instruction  r: Run  p: Pause"),
        Line::from("b: Breakpoint  i: Input  x: Reset  q: Quit"),
        Line::from("↑↓: Scroll memory"),
    ])
    .style(Style::default().fg(Color::DarkGray))
    .block(Block::default()
        .title(" Help ")
        .borders(Borders::ALL));

    frame.render_widget(help, area);
}
