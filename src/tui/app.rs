//! Debugger application state and logic.

use std::collections::HashSet;
use crate::asm::disasm::disassemble_word;
use crate::config::MachineConfig;
use crate::cpu::control::{Machine, Phase, StepOutcome};
use crate::cpu::devices::{KEYBOARD, PRINTER};
use crate::cpu::fault::MachineError;
use crate::word::Word;

/// Phases run per UI tick while running.
const PHASES_PER_TICK: usize = 500;

/// Debugger application state.
pub struct DebuggerApp {
    /// The machine being debugged.
    pub machine: Machine,
    /// Original program, reloaded on reset.
    pub program: Vec<Word>,
    pub origin: usize,
    /// Breakpoints (by address), checked at instruction fetch.
    pub breakpoints: HashSet<u16>,
    /// Is the debugger running continuously?
    pub running: bool,
    /// Should we quit?
    pub should_quit: bool,
    /// Status message to display.
    pub status: String,
    /// Memory view scroll offset.
    pub mem_scroll: usize,
    /// Keyboard line being typed, when in input mode.
    pub input: Option<String>,
    /// Everything written to the printer.
    pub printer: String,
}

impl DebuggerApp {
    /// Create a debugger with a loaded program.
    pub fn new(program: Vec<Word>, config: MachineConfig) -> Result<Self, MachineError> {
        let origin = config.origin;
        let mut machine = Machine::new(config)?;
        machine.set_interactive(true);
        machine.load_program(&program, origin)?;

        Ok(Self {
            machine,
            program,
            origin,
            breakpoints: HashSet::new(),
            running: false,
            should_quit: false,
            status: "Ready. 's' phase, 'n' instruction, 'r' run, 'q' quit.".into(),
            mem_scroll: origin,
            input: None,
            printer: String::new(),
        })
    }

    fn collect_printer(&mut self) {
        for word in self.machine.take_output(PRINTER) {
            self.printer.push(char::from((word & 0xFF) as u8));
        }
    }

    /// Record the outcome of a step; returns false when execution must stop.
    fn report(&mut self, result: Result<StepOutcome, MachineError>) -> bool {
        self.collect_printer();
        let pc = self.machine.ctx.registers.pc;
        match result {
            Ok(StepOutcome::Continue) => true,
            Ok(StepOutcome::Fault(fault)) => {
                self.status = format!("Fault {} (code {}), handler at {}", fault, fault.code(), pc);
                true
            }
            Ok(StepOutcome::Halted) => {
                self.status = format!("Halted after {} instructions", self.machine.cycles());
                false
            }
            Ok(StepOutcome::Waiting(device)) => {
                self.status = format!("Waiting for input on device {}. Press 'i' to type.", device);
                false
            }
            Ok(StepOutcome::Stopped) => {
                self.status = format!("PC={} outside memory", pc);
                false
            }
            Ok(StepOutcome::Fatal(e)) | Err(e) => {
                self.status = format!("Fatal: {}", e);
                false
            }
        }
    }

    /// Advance one phase.
    pub fn step_phase(&mut self) {
        let phase = self.machine.phase();
        let result = self.machine.single_step();
        let continued = matches!(result, Ok(StepOutcome::Continue));
        self.report(result);
        if continued {
            self.status = format!("{} phase done, next {}", phase.name(), self.machine.phase().name());
        }
    }

    /// Advance to the next instruction boundary.
    pub fn step_instruction(&mut self) {
        let pc = self.machine.ctx.registers.pc;
        let word = self.machine.ctx.memory.dump(pc.index(), 1).first().map(|(_, w)| *w).unwrap_or(0);
        let result = self.machine.step_instruction();
        let continued = matches!(result, Ok(StepOutcome::Continue));
        self.report(result);
        if continued {
            self.status = format!("{}: {}", pc, disassemble_word(word));
        }
    }

    /// Start continuous execution.
    pub fn run(&mut self) {
        self.running = true;
        self.status = "Running...".into();
    }

    pub fn pause(&mut self) {
        self.running = false;
        self.status = format!("Paused in {} phase", self.machine.phase().name());
    }

    /// Run one batch of phases.
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }

        for i in 0..PHASES_PER_TICK {
            if self.machine.phase() == Phase::InstructionFetch && i > 0 {
                let pc = self.machine.ctx.registers.pc.get();
                if self.breakpoints.contains(&pc) {
                    self.running = false;
                    self.status = format!("Breakpoint at PC={}", pc);
                    return;
                }
            }

            let result = self.machine.single_step();
            if !self.report(result) {
                self.running = false;
                return;
            }
        }
    }

    /// Toggle a breakpoint at the current PC.
    pub fn toggle_breakpoint(&mut self) {
        let pc = self.machine.ctx.registers.pc.get();
        if self.breakpoints.remove(&pc) {
            self.status = format!("Removed breakpoint at PC={}", pc);
        } else {
            self.breakpoints.insert(pc);
            self.status = format!("Set breakpoint at PC={}", pc);
        }
    }

    /// Push the typed line to the keyboard buffer, one word per character.
    pub fn submit_input(&mut self) {
        if let Some(line) = self.input.take() {
            for c in line.chars() {
                self.machine.push_input(KEYBOARD, c as Word);
            }
            self.status = format!("Queued {} characters on the keyboard", line.chars().count());
        }
    }

    /// Reset the machine and reload the program.
    pub fn reset(&mut self) {
        self.machine.reset();
        self.running = false;
        self.printer.clear();
        self.status = match self.machine.load_program(&self.program, self.origin) {
            Ok(()) => "Reset. Ready.".into(),
            Err(e) => format!("Reload failed: {}", e),
        };
    }

    /// Disassembly around the current PC: (address, text, is_current).
    pub fn get_disassembly(&self, lines: usize) -> Vec<(u16, String, bool)> {
        let pc = self.machine.ctx.registers.pc.index();
        let start = pc.saturating_sub(lines / 2);

        self.machine
            .ctx
            .memory
            .dump(start, lines)
            .into_iter()
            .map(|(addr, word)| (addr as u16, disassemble_word(word), addr == pc))
            .collect()
    }
}

/// Run the debugger with a program.
pub fn run_debugger(program: Vec<Word>, config: MachineConfig) -> std::io::Result<()> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;
    use std::time::Duration;

    let mut app = DebuggerApp::new(program, config)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    loop {
        terminal.draw(|frame| {
            super::ui::draw(frame, &app);
        })?;

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if let Some(line) = app.input.as_mut() {
                        match key.code {
                            KeyCode::Enter => app.submit_input(),
                            KeyCode::Esc => app.input = None,
                            KeyCode::Backspace => {
                                line.pop();
                            }
                            KeyCode::Char(c) => line.push(c),
                            _ => {}
                        }
                        continue;
                    }

                    match key.code {
                        KeyCode::Char('q') => app.should_quit = true,
                        KeyCode::Char('s') => {
                            app.running = false;
                            app.step_phase();
                        }
                        KeyCode::Char('n') => {
                            app.running = false;
                            app.step_instruction();
                        }
                        KeyCode::Char('r') => app.run(),
                        KeyCode::Char('p') => app.pause(),
                        KeyCode::Char('b') => app.toggle_breakpoint(),
                        KeyCode::Char('x') => app.reset(),
                        KeyCode::Char('i') => app.input = Some(String::new()),
                        KeyCode::Up => app.mem_scroll = app.mem_scroll.saturating_sub(1),
                        KeyCode::Down => {
                            if app.mem_scroll + 1 < app.machine.ctx.memory.word_count() {
                                app.mem_scroll += 1;
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        if app.running {
            app.tick();
        }

        if app.should_quit {
            break;
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::{encode, Instruction, IoOperand};

    fn app(program: &[Instruction]) -> DebuggerApp {
        let words = program.iter().map(encode).collect();
        DebuggerApp::new(words, MachineConfig::default()).unwrap()
    }

    #[test]
    fn test_breakpoint_stops_run() {
        let mut app = app(&[
            Instruction::Air { r: 0, immediate: 1 },
            Instruction::Air { r: 0, immediate: 1 },
            Instruction::Hlt,
        ]);
        app.machine.ctx.registers.jump(6);
        app.breakpoints.insert(7);
        app.run();
        app.tick();
        assert!(!app.running);
        assert_eq!(app.machine.ctx.registers.gpr(0), 1);
        assert!(app.status.contains("Breakpoint"));
    }

    #[test]
    fn test_echo_through_keyboard_and_printer() {
        let mut app = app(&[
            Instruction::In(IoOperand { r: 1, device: KEYBOARD }),
            Instruction::Out(IoOperand { r: 1, device: PRINTER }),
            Instruction::Hlt,
        ]);
        app.run();
        app.tick();
        assert!(app.status.contains("Waiting"));

        app.input = Some("A".into());
        app.submit_input();
        app.run();
        app.tick();
        assert_eq!(app.printer, "A");
        assert!(app.status.starts_with("Halted"));
    }

    #[test]
    fn test_reset_reloads_program() {
        let mut app = app(&[Instruction::Air { r: 0, immediate: 3 }, Instruction::Hlt]);
        app.step_instruction();
        assert_eq!(app.machine.ctx.registers.gpr(0), 3);
        app.reset();
        assert_eq!(app.machine.ctx.registers.gpr(0), 0);
        assert_eq!(app.machine.ctx.registers.pc.get(), 6);
        assert!(app.get_disassembly(4).iter().any(|(_, text, current)| *current && text == "AIR 0,3"));
    }
}
