//! Fetch/execute for the LR35902 instruction set.
//!
//! Most opcode groups on this CPU are regular bit fields rather than 256
//! independent cases, so operands are decoded from the opcode byte itself
//! (`reg_read`/`reg_write` for the 3-bit r8 field, `word_*` for the 2-bit
//! r16 field) instead of spelling out every combination by hand.

use crate::gb::AddressSpace;
use crate::gb::cpu::Cpu;
use crate::gb::cpu::registers::Flags;
use crate::utils::{half_carry_add_u8, half_carry_sub_u8};

const CB_PREFIX: u8 = 0xCB;

/// Executes one instruction starting at `cpu.pc - 1 == opcode`'s address and
/// returns the number of clock cycles it consumed (4 clock cycles per
/// machine cycle).
pub fn execute<T: AddressSpace>(cpu: &mut Cpu, bus: &mut T, opcode: u8) -> u16 {
    if opcode == CB_PREFIX {
        let opcode = cpu.fetch_byte(bus);
        return execute_prefixed(cpu, bus, opcode);
    }

    match opcode {
        0x00 => 4,
        0x10 => {
            cpu.fetch_byte(bus); // STOP's second byte is conventionally 0x00 and is discarded
            4
        }
        0x76 => {
            cpu.is_halted = true;
            4
        }
        0xF3 => {
            cpu.ime = crate::gb::cpu::ImeState::Disabled;
            4
        }
        0xFB => {
            cpu.ime = crate::gb::cpu::ImeState::Pending;
            4
        }

        // LD r16, d16
        0x01 | 0x11 | 0x21 | 0x31 => {
            let value = cpu.fetch_word(bus);
            word_write(cpu, (opcode >> 4) & 0x3, value);
            12
        }
        // LD (r16), A / LD A, (r16) for BC and DE
        0x02 => {
            bus.write(cpu.r.bc(), cpu.r.a);
            8
        }
        0x12 => {
            bus.write(cpu.r.de(), cpu.r.a);
            8
        }
        0x0A => {
            cpu.r.a = bus.read(cpu.r.bc());
            8
        }
        0x1A => {
            cpu.r.a = bus.read(cpu.r.de());
            8
        }
        // LD (HL+/-), A and LD A, (HL+/-)
        0x22 => {
            bus.write(cpu.r.hl(), cpu.r.a);
            cpu.r.set_hl(cpu.r.hl().wrapping_add(1));
            8
        }
        0x32 => {
            bus.write(cpu.r.hl(), cpu.r.a);
            cpu.r.set_hl(cpu.r.hl().wrapping_sub(1));
            8
        }
        0x2A => {
            cpu.r.a = bus.read(cpu.r.hl());
            cpu.r.set_hl(cpu.r.hl().wrapping_add(1));
            8
        }
        0x3A => {
            cpu.r.a = bus.read(cpu.r.hl());
            cpu.r.set_hl(cpu.r.hl().wrapping_sub(1));
            8
        }
        // LD (a16), SP
        0x08 => {
            let address = cpu.fetch_word(bus);
            let [lo, hi] = cpu.sp.to_le_bytes();
            bus.write(address, lo);
            bus.write(address.wrapping_add(1), hi);
            20
        }
        // INC/DEC r16
        0x03 | 0x13 | 0x23 | 0x33 => {
            let idx = (opcode >> 4) & 0x3;
            let value = word_read(cpu, idx).wrapping_add(1);
            word_write(cpu, idx, value);
            8
        }
        0x0B | 0x1B | 0x2B | 0x3B => {
            let idx = (opcode >> 4) & 0x3;
            let value = word_read(cpu, idx).wrapping_sub(1);
            word_write(cpu, idx, value);
            8
        }
        // ADD HL, r16
        0x09 | 0x19 | 0x29 | 0x39 => {
            let value = word_read(cpu, (opcode >> 4) & 0x3);
            add_hl(cpu, value);
            8
        }
        // ADD SP, r8
        0xE8 => {
            let offset = cpu.fetch_byte(bus) as i8;
            cpu.sp = add_sp_offset(cpu, offset);
            16
        }
        // LD HL, SP+r8
        0xF8 => {
            let offset = cpu.fetch_byte(bus) as i8;
            let value = add_sp_offset(cpu, offset);
            cpu.r.set_hl(value);
            12
        }
        0xF9 => {
            cpu.sp = cpu.r.hl();
            8
        }

        // INC/DEC r8 (bit field: (opcode>>3)&7 selects the register, 6 == (HL))
        _ if opcode & 0xC7 == 0x04 => {
            let idx = (opcode >> 3) & 0x7;
            let value = reg_read(cpu, bus, idx);
            let result = value.wrapping_add(1);
            reg_write(cpu, bus, idx, result);
            cpu.r.f.set(Flags::ZERO, result == 0);
            cpu.r.f.remove(Flags::SUBTRACT);
            cpu.r.f.set(Flags::HALF_CARRY, half_carry_add_u8(value, 1));
            if idx == 6 { 12 } else { 4 }
        }
        _ if opcode & 0xC7 == 0x05 => {
            let idx = (opcode >> 3) & 0x7;
            let value = reg_read(cpu, bus, idx);
            let result = value.wrapping_sub(1);
            reg_write(cpu, bus, idx, result);
            cpu.r.f.set(Flags::ZERO, result == 0);
            cpu.r.f.insert(Flags::SUBTRACT);
            cpu.r.f.set(Flags::HALF_CARRY, half_carry_sub_u8(value, 1));
            if idx == 6 { 12 } else { 4 }
        }
        // LD r8, d8
        _ if opcode & 0xC7 == 0x06 => {
            let idx = (opcode >> 3) & 0x7;
            let value = cpu.fetch_byte(bus);
            reg_write(cpu, bus, idx, value);
            if idx == 6 { 12 } else { 8 }
        }

        0x07 => {
            let carry = cpu.r.a & 0x80 != 0;
            cpu.r.a = cpu.r.a.rotate_left(1);
            cpu.r.f = Flags::empty();
            cpu.r.f.set(Flags::CARRY, carry);
            4
        }
        0x0F => {
            let carry = cpu.r.a & 0x01 != 0;
            cpu.r.a = cpu.r.a.rotate_right(1);
            cpu.r.f = Flags::empty();
            cpu.r.f.set(Flags::CARRY, carry);
            4
        }
        0x17 => {
            let a = cpu.r.a;
            cpu.r.a = rotate_left_through_carry(cpu, a);
            cpu.r.f.remove(Flags::ZERO);
            4
        }
        0x1F => {
            let a = cpu.r.a;
            cpu.r.a = rotate_right_through_carry(cpu, a);
            cpu.r.f.remove(Flags::ZERO);
            4
        }
        0x27 => {
            daa(cpu);
            4
        }
        0x2F => {
            cpu.r.a = !cpu.r.a;
            cpu.r.f.insert(Flags::SUBTRACT | Flags::HALF_CARRY);
            4
        }
        0x37 => {
            cpu.r.f.remove(Flags::SUBTRACT | Flags::HALF_CARRY);
            cpu.r.f.insert(Flags::CARRY);
            4
        }
        0x3F => {
            let carry = cpu.r.f.contains(Flags::CARRY);
            cpu.r.f.remove(Flags::SUBTRACT | Flags::HALF_CARRY);
            cpu.r.f.set(Flags::CARRY, !carry);
            4
        }

        // JR
        0x18 => {
            let offset = cpu.fetch_byte(bus) as i8;
            cpu.pc = cpu.pc.wrapping_add_signed(offset as i16);
            12
        }
        0x20 | 0x28 | 0x30 | 0x38 => {
            let offset = cpu.fetch_byte(bus) as i8;
            if condition(cpu, (opcode >> 3) & 0x3) {
                cpu.pc = cpu.pc.wrapping_add_signed(offset as i16);
                12
            } else {
                8
            }
        }

        // LD (a16), A / LD A, (a16)
        0xEA => {
            let address = cpu.fetch_word(bus);
            bus.write(address, cpu.r.a);
            16
        }
        0xFA => {
            let address = cpu.fetch_word(bus);
            cpu.r.a = bus.read(address);
            16
        }
        // LDH (a8), A / LDH A, (a8)
        0xE0 => {
            let offset = cpu.fetch_byte(bus);
            bus.write(0xFF00 | u16::from(offset), cpu.r.a);
            12
        }
        0xF0 => {
            let offset = cpu.fetch_byte(bus);
            cpu.r.a = bus.read(0xFF00 | u16::from(offset));
            12
        }
        // LD (C), A / LD A, (C)
        0xE2 => {
            bus.write(0xFF00 | u16::from(cpu.r.c), cpu.r.a);
            8
        }
        0xF2 => {
            cpu.r.a = bus.read(0xFF00 | u16::from(cpu.r.c));
            8
        }

        // LD r8, r8' (bit field: dst = bits 5-3, src = bits 2-0)
        _ if (0x40..=0x7F).contains(&opcode) => {
            let dst = (opcode >> 3) & 0x7;
            let src = opcode & 0x7;
            let value = reg_read(cpu, bus, src);
            reg_write(cpu, bus, dst, value);
            if dst == 6 || src == 6 { 8 } else { 4 }
        }

        // ALU A, r8 (bit field: op = bits 5-3 in ADD,ADC,SUB,SBC,AND,XOR,OR,CP order)
        _ if (0x80..=0xBF).contains(&opcode) => {
            let op = (opcode >> 3) & 0x7;
            let idx = opcode & 0x7;
            let value = reg_read(cpu, bus, idx);
            apply_alu(cpu, op, value);
            if idx == 6 { 8 } else { 4 }
        }
        // ALU A, d8
        0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE => {
            let op = (opcode >> 3) & 0x7;
            let value = cpu.fetch_byte(bus);
            apply_alu(cpu, op, value);
            8
        }

        // PUSH/POP (bit field: bits 5-4 select BC, DE, HL, AF)
        0xC5 | 0xD5 | 0xE5 | 0xF5 => {
            let value = match (opcode >> 4) & 0x3 {
                0 => cpu.r.bc(),
                1 => cpu.r.de(),
                2 => cpu.r.hl(),
                _ => cpu.r.af(),
            };
            cpu.push(bus, value);
            16
        }
        0xC1 | 0xD1 | 0xE1 | 0xF1 => {
            let value = cpu.pop(bus);
            match (opcode >> 4) & 0x3 {
                0 => cpu.r.set_bc(value),
                1 => cpu.r.set_de(value),
                2 => cpu.r.set_hl(value),
                _ => cpu.r.set_af(value),
            }
            12
        }

        // JP
        0xC3 => {
            cpu.pc = cpu.fetch_word(bus);
            16
        }
        0xE9 => {
            cpu.pc = cpu.r.hl();
            4
        }
        0xC2 | 0xCA | 0xD2 | 0xDA => {
            let target = cpu.fetch_word(bus);
            if condition(cpu, (opcode >> 3) & 0x3) {
                cpu.pc = target;
                16
            } else {
                12
            }
        }

        // CALL
        0xCD => {
            let target = cpu.fetch_word(bus);
            cpu.push(bus, cpu.pc);
            cpu.pc = target;
            24
        }
        0xC4 | 0xCC | 0xD4 | 0xDC => {
            let target = cpu.fetch_word(bus);
            if condition(cpu, (opcode >> 3) & 0x3) {
                cpu.push(bus, cpu.pc);
                cpu.pc = target;
                24
            } else {
                12
            }
        }

        // RET / RETI
        0xC9 => {
            cpu.pc = cpu.pop(bus);
            16
        }
        0xD9 => {
            cpu.pc = cpu.pop(bus);
            cpu.ime = crate::gb::cpu::ImeState::Enabled;
            16
        }
        0xC0 | 0xC8 | 0xD0 | 0xD8 => {
            if condition(cpu, (opcode >> 3) & 0x3) {
                cpu.pc = cpu.pop(bus);
                20
            } else {
                8
            }
        }

        // RST
        _ if opcode & 0xC7 == 0xC7 => {
            cpu.push(bus, cpu.pc);
            cpu.pc = u16::from(opcode & 0x38);
            16
        }

        // Undocumented/illegal opcodes lock up real hardware; we treat them as a stalled NOP.
        _ => 4,
    }
}

fn execute_prefixed<T: AddressSpace>(cpu: &mut Cpu, bus: &mut T, opcode: u8) -> u16 {
    let idx = opcode & 0x7;
    let group = opcode >> 6;
    let bit = (opcode >> 3) & 0x7;
    let base_cycles = if idx == 6 { 16 } else { 8 };

    match group {
        0b00 => {
            let value = reg_read(cpu, bus, idx);
            let result = match bit {
                0 => rotate_left_circular(cpu, value),
                1 => rotate_right_circular(cpu, value),
                2 => rotate_left_through_carry(cpu, value),
                3 => rotate_right_through_carry(cpu, value),
                4 => shift_left_arithmetic(cpu, value),
                5 => shift_right_arithmetic(cpu, value),
                6 => swap_nibbles(cpu, value),
                _ => shift_right_logical(cpu, value),
            };
            reg_write(cpu, bus, idx, result);
            base_cycles
        }
        0b01 => {
            let value = reg_read(cpu, bus, idx);
            cpu.r.f.set(Flags::ZERO, value & (1 << bit) == 0);
            cpu.r.f.remove(Flags::SUBTRACT);
            cpu.r.f.insert(Flags::HALF_CARRY);
            if idx == 6 { 12 } else { 8 }
        }
        0b10 => {
            let value = reg_read(cpu, bus, idx);
            reg_write(cpu, bus, idx, value & !(1 << bit));
            base_cycles
        }
        _ => {
            let value = reg_read(cpu, bus, idx);
            reg_write(cpu, bus, idx, value | (1 << bit));
            base_cycles
        }
    }
}

/// Maps the 3-bit r8 field to B, C, D, E, H, L, (HL), A.
fn reg_read<T: AddressSpace>(cpu: &mut Cpu, bus: &mut T, idx: u8) -> u8 {
    match idx {
        0 => cpu.r.b,
        1 => cpu.r.c,
        2 => cpu.r.d,
        3 => cpu.r.e,
        4 => cpu.r.h,
        5 => cpu.r.l,
        6 => bus.read(cpu.r.hl()),
        _ => cpu.r.a,
    }
}

fn reg_write<T: AddressSpace>(cpu: &mut Cpu, bus: &mut T, idx: u8, value: u8) {
    match idx {
        0 => cpu.r.b = value,
        1 => cpu.r.c = value,
        2 => cpu.r.d = value,
        3 => cpu.r.e = value,
        4 => cpu.r.h = value,
        5 => cpu.r.l = value,
        6 => bus.write(cpu.r.hl(), value),
        _ => cpu.r.a = value,
    }
}

/// Maps the 2-bit r16 field to BC, DE, HL, SP.
fn word_read(cpu: &Cpu, idx: u8) -> u16 {
    match idx {
        0 => cpu.r.bc(),
        1 => cpu.r.de(),
        2 => cpu.r.hl(),
        _ => cpu.sp,
    }
}

fn word_write(cpu: &mut Cpu, idx: u8, value: u16) {
    match idx {
        0 => cpu.r.set_bc(value),
        1 => cpu.r.set_de(value),
        2 => cpu.r.set_hl(value),
        _ => cpu.sp = value,
    }
}

/// Maps the 2-bit condition field to NZ, Z, NC, C.
fn condition(cpu: &Cpu, idx: u8) -> bool {
    match idx {
        0 => !cpu.r.f.contains(Flags::ZERO),
        1 => cpu.r.f.contains(Flags::ZERO),
        2 => !cpu.r.f.contains(Flags::CARRY),
        _ => cpu.r.f.contains(Flags::CARRY),
    }
}

fn apply_alu(cpu: &mut Cpu, op: u8, value: u8) {
    let carry = cpu.r.f.contains(Flags::CARRY);
    match op {
        0 => add_a(cpu, value, false),
        1 => add_a(cpu, value, carry),
        2 => sub_a(cpu, value, false, true),
        3 => sub_a(cpu, value, carry, true),
        4 => {
            cpu.r.a &= value;
            cpu.r.f.set_all(cpu.r.a == 0, false, true, false);
        }
        5 => {
            cpu.r.a ^= value;
            cpu.r.f.set_all(cpu.r.a == 0, false, false, false);
        }
        6 => {
            cpu.r.a |= value;
            cpu.r.f.set_all(cpu.r.a == 0, false, false, false);
        }
        _ => sub_a(cpu, value, false, false),
    }
}

fn add_a(cpu: &mut Cpu, value: u8, carry_in: bool) {
    let carry_in = u8::from(carry_in);
    let (partial, carry1) = cpu.r.a.overflowing_add(value);
    let (result, carry2) = partial.overflowing_add(carry_in);
    let half_carry = (cpu.r.a & 0xF) + (value & 0xF) + carry_in > 0xF;
    cpu.r.f.set_all(result == 0, false, half_carry, carry1 || carry2);
    cpu.r.a = result;
}

/// Shared SUB/SBC/CP implementation; `commit` is false for CP (flags only).
fn sub_a(cpu: &mut Cpu, value: u8, carry_in: bool, commit: bool) {
    let carry_in = u8::from(carry_in);
    let (partial, borrow1) = cpu.r.a.overflowing_sub(value);
    let (result, borrow2) = partial.overflowing_sub(carry_in);
    let half_carry = (cpu.r.a & 0xF) < (value & 0xF) + carry_in;
    cpu.r.f.set_all(result == 0, true, half_carry, borrow1 || borrow2);
    if commit {
        cpu.r.a = result;
    }
}

fn add_hl(cpu: &mut Cpu, value: u16) {
    let hl = cpu.r.hl();
    let (result, carry) = hl.overflowing_add(value);
    let half_carry = (hl & 0x0FFF) + (value & 0x0FFF) > 0x0FFF;
    cpu.r.f.remove(Flags::SUBTRACT);
    cpu.r.f.set(Flags::HALF_CARRY, half_carry);
    cpu.r.f.set(Flags::CARRY, carry);
    cpu.r.set_hl(result);
}

fn add_sp_offset(cpu: &mut Cpu, offset: i8) -> u16 {
    let sp = cpu.sp;
    let value = i32::from(sp) + i32::from(offset);
    let half_carry = (sp & 0xF) + ((offset as u16) & 0xF) > 0xF;
    let carry = (sp & 0xFF) + ((offset as u16) & 0xFF) > 0xFF;
    cpu.r.f.set_all(false, false, half_carry, carry);
    value as u16
}

fn rotate_left_circular(cpu: &mut Cpu, value: u8) -> u8 {
    let carry = value & 0x80 != 0;
    let result = value.rotate_left(1);
    cpu.r.f.set_all(result == 0, false, false, carry);
    result
}

fn rotate_right_circular(cpu: &mut Cpu, value: u8) -> u8 {
    let carry = value & 0x01 != 0;
    let result = value.rotate_right(1);
    cpu.r.f.set_all(result == 0, false, false, carry);
    result
}

fn rotate_left_through_carry(cpu: &mut Cpu, value: u8) -> u8 {
    let carry_in = u8::from(cpu.r.f.contains(Flags::CARRY));
    let carry_out = value & 0x80 != 0;
    let result = (value << 1) | carry_in;
    cpu.r.f.set_all(result == 0, false, false, carry_out);
    result
}

fn rotate_right_through_carry(cpu: &mut Cpu, value: u8) -> u8 {
    let carry_in = u8::from(cpu.r.f.contains(Flags::CARRY));
    let carry_out = value & 0x01 != 0;
    let result = (value >> 1) | (carry_in << 7);
    cpu.r.f.set_all(result == 0, false, false, carry_out);
    result
}

fn shift_left_arithmetic(cpu: &mut Cpu, value: u8) -> u8 {
    let carry = value & 0x80 != 0;
    let result = value << 1;
    cpu.r.f.set_all(result == 0, false, false, carry);
    result
}

fn shift_right_arithmetic(cpu: &mut Cpu, value: u8) -> u8 {
    let carry = value & 0x01 != 0;
    let result = (value >> 1) | (value & 0x80);
    cpu.r.f.set_all(result == 0, false, false, carry);
    result
}

fn shift_right_logical(cpu: &mut Cpu, value: u8) -> u8 {
    let carry = value & 0x01 != 0;
    let result = value >> 1;
    cpu.r.f.set_all(result == 0, false, false, carry);
    result
}

fn swap_nibbles(cpu: &mut Cpu, value: u8) -> u8 {
    let result = value.rotate_left(4);
    cpu.r.f.set_all(result == 0, false, false, false);
    result
}

fn daa(cpu: &mut Cpu) {
    let mut adjust = 0u8;
    let mut carry = cpu.r.f.contains(Flags::CARRY);
    if cpu.r.f.contains(Flags::SUBTRACT) {
        if cpu.r.f.contains(Flags::HALF_CARRY) {
            adjust |= 0x06;
        }
        if carry {
            adjust |= 0x60;
        }
        cpu.r.a = cpu.r.a.wrapping_sub(adjust);
    } else {
        if cpu.r.f.contains(Flags::HALF_CARRY) || cpu.r.a & 0x0F > 0x09 {
            adjust |= 0x06;
        }
        if carry || cpu.r.a > 0x99 {
            adjust |= 0x60;
            carry = true;
        }
        cpu.r.a = cpu.r.a.wrapping_add(adjust);
    }
    cpu.r.f.set(Flags::ZERO, cpu.r.a == 0);
    cpu.r.f.remove(Flags::HALF_CARRY);
    cpu.r.f.set(Flags::CARRY, carry);
}
