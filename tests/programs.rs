//! Whole-program runs through the public API.

use csci_iss::cpu::decode::{encode, IoOperand, MemOperand, RegOperand};
use csci_iss::cpu::devices::{KEYBOARD, PRINTER};
use csci_iss::word::to_binary_string;
use csci_iss::{
    load_program_file, save_program_file, Instruction, Machine, MachineConfig, MachineError,
    MachineFault, Phase, RunOutcome, Word,
};

const ORIGIN: usize = 6;

fn mem(r: u8, ix: u8, address: u8, indirect: bool) -> MemOperand {
    MemOperand::new(r, ix, address, indirect)
}

fn assemble(program: &[Instruction]) -> Vec<Word> {
    program.iter().map(encode).collect()
}

fn machine(program: &[Instruction]) -> Machine {
    let mut m = Machine::default();
    m.load_program(&assemble(program), ORIGIN).unwrap();
    m
}

#[test]
fn test_load_address_and_add_immediate() {
    let mut m = machine(&[
        Instruction::Lda(mem(0, 0, 5, false)),
        Instruction::Air { r: 0, immediate: 10 },
        Instruction::Hlt,
    ]);
    assert_eq!(m.run().unwrap(), RunOutcome::Halted);
    assert_eq!(m.ctx.registers.gpr(0), 15);
    assert_eq!(m.ctx.registers.pc.get(), 9);
    assert_eq!(m.cycles(), 3);
    assert!(!m.is_running());
}

#[test]
fn test_multiply_spills_into_pair() {
    let mut m = machine(&[
        Instruction::Ldr(mem(0, 0, 30, false)),
        Instruction::Ldr(mem(2, 0, 31, false)),
        Instruction::Mlt(RegOperand { rx: 0, ry: 2 }),
        Instruction::Hlt,
    ]);
    m.ctx.memory.write(30, 300);
    m.ctx.memory.write(31, 300);
    assert_eq!(m.run().unwrap(), RunOutcome::Halted);
    // 90000 = 0x0001_5F90
    assert_eq!(m.ctx.registers.gpr(0), 0x0001);
    assert_eq!(m.ctx.registers.gpr(1), 0x5F90);
}

#[test]
fn test_countdown_loop_prints_and_hits_cache() {
    let mut m = machine(&[
        Instruction::Air { r: 0, immediate: 5 },
        Instruction::Out(IoOperand { r: 0, device: PRINTER }),
        Instruction::Sob(mem(0, 0, 7, false)),
        Instruction::Hlt,
    ]);
    assert_eq!(m.run().unwrap(), RunOutcome::Halted);
    assert_eq!(m.take_output(PRINTER), vec![5, 4, 3, 2, 1]);
    assert_eq!(m.ctx.registers.gpr(0), 0);

    let stats = m.ctx.memory.cache_stats();
    assert!(stats.hits > stats.misses);
}

#[test]
fn test_subroutine_call_and_return() {
    let mut m = machine(&[Instruction::Jsr(mem(0, 0, 20, false)), Instruction::Hlt]);
    let sub = assemble(&[Instruction::Air { r: 1, immediate: 7 }, Instruction::Rfs { immediate: 9 }]);
    m.ctx.memory.load_program(20, &sub).unwrap();

    assert_eq!(m.run().unwrap(), RunOutcome::Halted);
    assert_eq!(m.ctx.registers.gpr(0), 9);
    assert_eq!(m.ctx.registers.gpr(1), 7);
    assert_eq!(m.ctx.registers.gpr(3), 7);
    assert_eq!(m.ctx.registers.pc.get(), 8);
}

#[test]
fn test_illegal_opcode_enters_fault_handler() {
    let mut m = Machine::default();
    m.ctx.memory.write(1, 200);
    m.ctx.memory.write(200, encode(&Instruction::Hlt));
    m.ctx.registers.set_gpr(0, 1234);
    m.load_program(&[0o77 << 10], ORIGIN).unwrap();

    assert_eq!(m.run().unwrap(), RunOutcome::Halted);
    assert_eq!(m.ctx.registers.gpr(0), MachineFault::IllegalOperationCode.code() as Word);
    assert_eq!(m.ctx.memory.read(4), 7);
    assert_eq!(m.ctx.memory.read(5), 1234);
    assert_eq!(m.ctx.registers.pc.get(), 201);
    assert_eq!(m.phase(), Phase::InstructionFetch);
    assert!(m.ctx.status.supervisor());
}

#[test]
fn test_user_store_to_reserved_faults_and_handler_returns() {
    let mut m = machine(&[
        Instruction::Air { r: 0, immediate: 9 },
        Instruction::Str(mem(0, 0, 3, false)),
        Instruction::Hlt,
    ]);
    m.ctx.memory.write(1, 200);
    m.ctx.memory.write(3, 77);
    let handler = assemble(&[Instruction::Jma(mem(0, 0, 4, true))]);
    m.ctx.memory.load_program(200, &handler).unwrap();

    assert_eq!(m.run().unwrap(), RunOutcome::Halted);
    assert_eq!(m.ctx.memory.read(3), 77);
    assert_eq!(m.ctx.memory.read(5), 9);
    assert_eq!(m.ctx.registers.gpr(0), MachineFault::IllegalMemoryAddressToReservedLocations.code() as Word);
    assert_eq!(m.ctx.registers.pc.get(), 9);
    assert!(!m.ctx.status.supervisor());
    assert!(!m.ctx.status.executing_fault_handler());
    assert_eq!(m.ctx.mfr.current(), None);
}

#[test]
fn test_access_beyond_memory_faults() {
    let mut m = machine(&[Instruction::Ldr(mem(0, 1, 31, false)), Instruction::Hlt]);
    m.ctx.registers.set_ixr(1, 2040);
    m.ctx.memory.write(1, 300);
    m.ctx.memory.write(300, encode(&Instruction::Hlt));

    assert_eq!(m.run().unwrap(), RunOutcome::Halted);
    assert_eq!(m.ctx.registers.gpr(0), MachineFault::IllegalMemoryAddressBeyondLimit.code() as Word);
    assert!(m.ctx.mfr.is_set(MachineFault::IllegalMemoryAddressBeyondLimit));
}

#[test]
fn test_trap_runs_handler_and_returns() {
    let mut m = machine(&[Instruction::Trap { code: 3 }, Instruction::Hlt]);
    m.ctx.memory.write(0, 40);
    m.ctx.memory.write(43, 100);
    let handler = assemble(&[
        Instruction::Air { r: 1, immediate: 5 },
        Instruction::Jma(mem(0, 0, 2, true)),
    ]);
    m.ctx.memory.load_program(100, &handler).unwrap();

    assert_eq!(m.run().unwrap(), RunOutcome::Halted);
    assert_eq!(m.ctx.registers.gpr(1), 5);
    assert_eq!(m.ctx.memory.read(2), 7);
    assert_eq!(m.ctx.registers.pc.get(), 8);
    assert!(!m.ctx.status.supervisor());
}

#[test]
fn test_trap_with_unreadable_table_stays_in_user_mode() {
    let mut m = machine(&[
        Instruction::Trap { code: 3 },
        Instruction::Air { r: 1, immediate: 1 },
        Instruction::Hlt,
    ]);
    // entry for code 3 would be read at 2049
    m.ctx.memory.write(0, 2046);
    m.ctx.memory.write(1, 300);
    m.ctx.memory.write(2, 0xBEEF);
    let handler = assemble(&[Instruction::Jma(mem(0, 0, 4, true))]);
    m.ctx.memory.load_program(300, &handler).unwrap();

    assert_eq!(m.run().unwrap(), RunOutcome::Halted);
    assert_eq!(m.ctx.registers.gpr(0), MachineFault::IllegalMemoryAddressBeyondLimit.code() as Word);
    assert_eq!(m.ctx.registers.gpr(1), 1);
    assert_eq!(m.ctx.memory.read(2), 0xBEEF);
    assert!(!m.ctx.status.supervisor());
    assert!(!m.ctx.status.supervisor_fault());
}

#[test]
fn test_trap_code_out_of_table_faults() {
    let mut m = machine(&[Instruction::Trap { code: 16 }]);
    m.ctx.memory.write(1, 300);
    m.ctx.memory.write(300, encode(&Instruction::Hlt));

    assert_eq!(m.run().unwrap(), RunOutcome::Halted);
    assert_eq!(m.ctx.registers.gpr(0), MachineFault::IllegalTrapCode.code() as Word);
}

#[test]
fn test_keyboard_echo_waits_for_input() {
    let mut m = machine(&[
        Instruction::In(IoOperand { r: 1, device: KEYBOARD }),
        Instruction::Out(IoOperand { r: 1, device: PRINTER }),
        Instruction::Hlt,
    ]);
    assert_eq!(m.run().unwrap(), RunOutcome::Waiting(KEYBOARD));
    assert!(m.is_waiting());
    assert_eq!(m.ctx.registers.pc.get(), 6);

    m.push_input(KEYBOARD, 'A' as Word);
    assert_eq!(m.resume().unwrap(), RunOutcome::Halted);
    assert_eq!(m.take_output(PRINTER), vec!['A' as Word]);
}

#[test]
fn test_double_fault_stops_batch_run() {
    let mut m = Machine::default();
    m.ctx.memory.write(1, 200);
    m.ctx.memory.write(200, 0o77 << 10);
    m.load_program(&[0o77 << 10], ORIGIN).unwrap();

    match m.run() {
        Err(MachineError::DoubleFault { first, second, .. }) => {
            assert_eq!(first, Some(MachineFault::IllegalOperationCode));
            assert_eq!(second, MachineFault::IllegalOperationCode);
        }
        other => panic!("expected double fault, got {:?}", other),
    }
}

#[test]
fn test_small_memory_from_config() {
    let config = MachineConfig::from_json(r#"{ "word_count": 64 }"#).unwrap();
    let mut m = Machine::new(config).unwrap();
    m.ctx.memory.write(1, 20);
    m.ctx.memory.write(20, encode(&Instruction::Hlt));
    m.load_program(&assemble(&[Instruction::Ldr(mem(0, 1, 10, false))]), ORIGIN).unwrap();
    m.ctx.registers.set_ixr(1, 60);

    assert_eq!(m.run().unwrap(), RunOutcome::Halted);
    assert_eq!(m.ctx.registers.gpr(0), MachineFault::IllegalMemoryAddressBeyondLimit.code() as Word);
}

#[test]
fn test_program_file_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("add.txt");
    let text = format!(
        "; adds two immediates\n{}\n\n{} ; second\n{}\n",
        to_binary_string(encode(&Instruction::Air { r: 2, immediate: 20 })),
        to_binary_string(encode(&Instruction::Air { r: 2, immediate: 22 })),
        to_binary_string(encode(&Instruction::Hlt)),
    );
    std::fs::write(&path, text).unwrap();

    let program = load_program_file(&path).unwrap();
    assert_eq!(program.lines, vec![2, 4, 5]);

    let mut m = Machine::default();
    m.load_program(&program.words, ORIGIN).unwrap();
    assert_eq!(m.run().unwrap(), RunOutcome::Halted);
    assert_eq!(m.ctx.registers.gpr(2), 42);

    let copy = dir.path().join("copy.txt");
    save_program_file(&copy, &program.words, ORIGIN).unwrap();
    assert_eq!(load_program_file(&copy).unwrap().words, program.words);
}
