use crate::gb::AddressSpace;
use crate::gb::cpu::registers::Flags;
use crate::gb::cpu::{Cpu, ImeState, InterruptFlags, StepOutcome};

/// A flat 64 KiB address space, standing in for the motherboard's bus decode
/// so these tests exercise the CPU in isolation.
struct FlatBus {
    mem: Box<[u8; 0x10000]>,
}

impl FlatBus {
    fn new() -> Self {
        Self { mem: Box::new([0; 0x10000]) }
    }

    fn load(&mut self, address: u16, bytes: &[u8]) {
        for (i, &b) in bytes.iter().enumerate() {
            self.mem[address as usize + i] = b;
        }
    }
}

impl AddressSpace for FlatBus {
    fn read(&self, address: u16) -> u8 {
        self.mem[address as usize]
    }

    fn write(&mut self, address: u16, value: u8) {
        self.mem[address as usize] = value;
    }
}

fn run_one(cpu: &mut Cpu, bus: &mut FlatBus) -> StepOutcome {
    cpu.step(bus)
}

#[test]
fn nop_advances_pc_by_one_and_takes_four_cycles() {
    let mut cpu = Cpu::new(false);
    let mut bus = FlatBus::new();
    bus.load(0, &[0x00]);
    assert_eq!(run_one(&mut cpu, &mut bus), StepOutcome::Executed(4));
    assert_eq!(cpu.pc, 1);
}

#[test]
fn ld_b_d8_loads_the_immediate() {
    let mut cpu = Cpu::new(false);
    let mut bus = FlatBus::new();
    bus.load(0, &[0x06, 0x42]);
    run_one(&mut cpu, &mut bus);
    assert_eq!(cpu.r.b, 0x42);
    assert_eq!(cpu.pc, 2);
}

#[test]
fn ld_r_r_copies_between_registers() {
    let mut cpu = Cpu::new(false);
    let mut bus = FlatBus::new();
    cpu.r.c = 0x99;
    bus.load(0, &[0x41]); // LD B, C
    run_one(&mut cpu, &mut bus);
    assert_eq!(cpu.r.b, 0x99);
}

#[test]
fn add_sets_zero_and_carry_flags() {
    let mut cpu = Cpu::new(false);
    let mut bus = FlatBus::new();
    cpu.r.a = 0xFF;
    cpu.r.b = 0x01;
    bus.load(0, &[0x80]); // ADD A, B
    run_one(&mut cpu, &mut bus);
    assert_eq!(cpu.r.a, 0x00);
    assert!(cpu.r.f.contains(Flags::ZERO));
    assert!(cpu.r.f.contains(Flags::CARRY));
    assert!(cpu.r.f.contains(Flags::HALF_CARRY));
}

#[test]
fn sub_sets_subtract_flag_and_detects_borrow() {
    let mut cpu = Cpu::new(false);
    let mut bus = FlatBus::new();
    cpu.r.a = 0x00;
    cpu.r.b = 0x01;
    bus.load(0, &[0x90]); // SUB B
    run_one(&mut cpu, &mut bus);
    assert_eq!(cpu.r.a, 0xFF);
    assert!(cpu.r.f.contains(Flags::SUBTRACT));
    assert!(cpu.r.f.contains(Flags::CARRY));
}

#[test]
fn cp_leaves_a_unchanged() {
    let mut cpu = Cpu::new(false);
    let mut bus = FlatBus::new();
    cpu.r.a = 0x10;
    cpu.r.b = 0x10;
    bus.load(0, &[0xB8]); // CP B
    run_one(&mut cpu, &mut bus);
    assert_eq!(cpu.r.a, 0x10);
    assert!(cpu.r.f.contains(Flags::ZERO));
}

#[test]
fn inc_hli_reads_and_writes_through_memory() {
    let mut cpu = Cpu::new(false);
    let mut bus = FlatBus::new();
    cpu.r.set_hl(0xC000);
    bus.load(0xC000, &[0x41]);
    bus.load(0, &[0x34]); // INC (HL)
    run_one(&mut cpu, &mut bus);
    assert_eq!(bus.read(0xC000), 0x42);
}

#[test]
fn jr_nz_branches_when_zero_flag_clear() {
    let mut cpu = Cpu::new(false);
    let mut bus = FlatBus::new();
    bus.load(0, &[0x20, 0x05]); // JR NZ, +5
    run_one(&mut cpu, &mut bus);
    assert_eq!(cpu.pc, 7);
}

#[test]
fn jr_nz_falls_through_when_zero_flag_set() {
    let mut cpu = Cpu::new(false);
    let mut bus = FlatBus::new();
    cpu.r.f.insert(Flags::ZERO);
    bus.load(0, &[0x20, 0x05]);
    run_one(&mut cpu, &mut bus);
    assert_eq!(cpu.pc, 2);
}

#[test]
fn call_and_ret_round_trip_through_the_stack() {
    let mut cpu = Cpu::new(false);
    let mut bus = FlatBus::new();
    cpu.sp = 0xFFFE;
    bus.load(0, &[0xCD, 0x00, 0x01]); // CALL 0x0100
    bus.load(0x0100, &[0xC9]); // RET
    run_one(&mut cpu, &mut bus); // CALL
    assert_eq!(cpu.pc, 0x0100);
    assert_eq!(cpu.sp, 0xFFFC);
    run_one(&mut cpu, &mut bus); // RET
    assert_eq!(cpu.pc, 0x0003);
    assert_eq!(cpu.sp, 0xFFFE);
}

#[test]
fn push_pop_round_trips_a_register_pair() {
    let mut cpu = Cpu::new(false);
    let mut bus = FlatBus::new();
    cpu.sp = 0xFFFE;
    cpu.r.set_bc(0xBEEF);
    bus.load(0, &[0xC5, 0xD1]); // PUSH BC; POP DE
    run_one(&mut cpu, &mut bus);
    run_one(&mut cpu, &mut bus);
    assert_eq!(cpu.r.de(), 0xBEEF);
}

#[test]
fn ei_takes_effect_only_after_the_following_instruction() {
    let mut cpu = Cpu::new(false);
    let mut bus = FlatBus::new();
    bus.write(0xFFFF, InterruptFlags::VBLANK.bits());
    bus.load(0, &[0xFB, 0x00, 0x00]); // EI, NOP, NOP
    run_one(&mut cpu, &mut bus); // EI: ime becomes Pending
    assert_eq!(cpu.ime, ImeState::Pending);
    bus.write(0xFF0F, InterruptFlags::VBLANK.bits());
    run_one(&mut cpu, &mut bus); // NOP: ime flips to Enabled at the end of this step
    assert_eq!(cpu.ime, ImeState::Enabled);
    assert_eq!(cpu.pc, 2, "the pending interrupt must not fire during the delay slot");
    run_one(&mut cpu, &mut bus); // interrupt now dispatches instead of the second NOP
    assert_eq!(cpu.pc, 0x0040);
}

#[test]
fn halt_reports_halted_until_an_enabled_interrupt_is_pending() {
    let mut cpu = Cpu::new(false);
    let mut bus = FlatBus::new();
    bus.load(0, &[0x76]); // HALT
    run_one(&mut cpu, &mut bus);
    assert!(cpu.is_halted);
    assert_eq!(run_one(&mut cpu, &mut bus), StepOutcome::Halted);

    bus.write(0xFFFF, InterruptFlags::TIMER.bits());
    bus.write(0xFF0F, InterruptFlags::TIMER.bits());
    assert_ne!(run_one(&mut cpu, &mut bus), StepOutcome::Halted);
    assert!(!cpu.is_halted);
}

#[test]
fn service_interrupt_dispatches_highest_priority_first() {
    let mut cpu = Cpu::new(false);
    let mut bus = FlatBus::new();
    cpu.sp = 0xFFFE;
    cpu.ime = ImeState::Enabled;
    bus.write(0xFFFF, InterruptFlags::all().bits());
    bus.write(0xFF0F, (InterruptFlags::TIMER | InterruptFlags::VBLANK).bits());
    run_one(&mut cpu, &mut bus);
    assert_eq!(cpu.pc, 0x0040, "VBlank has higher priority than Timer");
    assert_eq!(bus.read(0xFF0F) & InterruptFlags::VBLANK.bits(), 0);
    assert_ne!(bus.read(0xFF0F) & InterruptFlags::TIMER.bits(), 0);
    assert_eq!(cpu.ime, ImeState::Disabled);
}
