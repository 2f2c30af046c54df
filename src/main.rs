//! CSCI ISS - CLI Entry Point
//!
//! Commands:
//! - `csci-iss run <program>` - Run a program file until it halts
//! - `csci-iss debug <program>` - Interactive terminal debugger
//! - `csci-iss disasm <program>` - Disassemble a program file

use std::io::BufRead;
use std::path::PathBuf;
use std::process::exit;
use clap::{Parser, Subcommand};
use log::info;
use csci_iss::cpu::devices::{CARD_READER, KEYBOARD, PRINTER};
use csci_iss::{disassemble, load_program_file, Machine, MachineConfig, RunOutcome, Word};

#[derive(Parser)]
#[command(name = "csci-iss")]
#[command(version = "0.1.0")]
#[command(about = "An instruction-set simulator for a 16-bit teaching machine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct MachineArgs {
    /// JSON machine configuration
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Words of main memory (overrides the configuration)
    #[arg(short, long)]
    word_count: Option<usize>,
    /// Load address (overrides the configuration)
    #[arg(short, long)]
    origin: Option<usize>,
}

impl MachineArgs {
    fn resolve(&self) -> MachineConfig {
        let mut config = match &self.config {
            Some(path) => MachineConfig::load(path).unwrap_or_else(|e| fail(e)),
            None => MachineConfig::default(),
        };
        if let Some(n) = self.word_count {
            config.word_count = n;
        }
        if let Some(origin) = self.origin {
            config.origin = origin;
        }
        config.validate().unwrap_or_else(|e| fail(e));
        config
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program until it halts
    Run {
        /// Path to the program file
        program: PathBuf,
        #[command(flatten)]
        machine: MachineArgs,
        /// Report double faults instead of failing
        #[arg(short, long)]
        interactive: bool,
        /// Dump registers after every instruction (needs RUST_LOG=debug)
        #[arg(short, long)]
        debug: bool,
        /// Stop after this many phases
        #[arg(long)]
        max_phases: Option<u64>,
        /// Program file whose words are queued on the card reader
        #[arg(long)]
        cards: Option<PathBuf>,
    },
    /// Interactive terminal debugger
    Debug {
        /// Path to the program file
        program: PathBuf,
        #[command(flatten)]
        machine: MachineArgs,
    },
    /// Disassemble a program file
    Disasm {
        /// Path to the program file
        program: PathBuf,
        /// Address of the first word
        #[arg(short, long, default_value = "6")]
        origin: usize,
    },
}

fn fail(e: impl std::fmt::Display) -> ! {
    eprintln!("error: {}", e);
    exit(1);
}

fn load_words(path: &PathBuf) -> Vec<Word> {
    let program = load_program_file(path).unwrap_or_else(|e| fail(e));
    if program.is_empty() {
        fail(format!("{}: no words to load", path.display()));
    }
    info!("read {} words from {}", program.len(), path.display());
    program.words
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { program, machine, interactive, debug, max_phases, cards } => {
            let mut config = machine.resolve();
            config.interactive |= interactive;
            config.debugging |= debug;
            run_program(&program, config, max_phases, cards);
        }
        Commands::Debug { program, machine } => {
            debug_program(&program, machine.resolve());
        }
        Commands::Disasm { program, origin } => {
            let words = load_words(&program);
            println!("{}", disassemble(&words, origin));
        }
    }
}

fn run_program(path: &PathBuf, config: MachineConfig, max_phases: Option<u64>, cards: Option<PathBuf>) {
    let words = load_words(path);
    let origin = config.origin;

    let mut machine = Machine::new(config).unwrap_or_else(|e| fail(e));
    machine.load_program(&words, origin).unwrap_or_else(|e| fail(e));
    if let Some(cards) = cards {
        for word in load_words(&cards) {
            machine.push_input(CARD_READER, word);
        }
    }

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    let mut printer = String::new();

    let outcome = loop {
        let result = match max_phases {
            Some(n) => machine.run_phases(n),
            None => machine.run(),
        };
        for word in machine.take_output(PRINTER) {
            printer.push(char::from((word & 0xFF) as u8));
        }

        match result {
            Ok(RunOutcome::Waiting(device)) if device != CARD_READER => {
                let Some(Ok(line)) = lines.next() else {
                    break RunOutcome::Waiting(device);
                };
                for c in line.chars() {
                    machine.push_input(KEYBOARD, c as Word);
                }
                machine.push_input(KEYBOARD, '\n' as Word);
            }
            Ok(outcome) => break outcome,
            Err(e) => {
                print!("{}", printer);
                eprintln!("{}", machine.dump_registers());
                fail(e);
            }
        }
    };

    if !printer.is_empty() {
        println!("{}", printer);
    }
    println!("Result: {:?}", outcome);
    println!("Instructions: {}", machine.cycles());
    println!("{}", machine.dump_registers());

    match outcome {
        RunOutcome::Fatal(e) => fail(e),
        RunOutcome::PhaseLimit => {
            eprintln!("warning: phase limit reached; use --max-phases to raise it");
        }
        RunOutcome::Waiting(device) => {
            eprintln!("warning: program still waiting for input on device {}", device);
        }
        _ => {}
    }
}

#[cfg(feature = "tui")]
fn debug_program(path: &PathBuf, config: MachineConfig) {
    let words = load_words(path);
    if let Err(e) = csci_iss::run_debugger(words, config) {
        fail(format!("debugger: {}", e));
    }
}

#[cfg(not(feature = "tui"))]
fn debug_program(_path: &PathBuf, _config: MachineConfig) {
    fail("built without the `tui` feature");
}
