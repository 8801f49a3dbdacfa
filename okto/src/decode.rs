//! Instruction decoder.
//!
//! Decoding is split away from execution so that every instruction
//! family is enumerable and testable without touching machine state.
//! The decoder is pure; it sees nothing but the 16-bit word.
use crate::constants::Address;

/// One decoded Chip-8 instruction.
///
/// Operands follow the conventional opcode notation: `x` and `y` are
/// register indices, `kk` an 8-bit immediate, `n` a 4-bit immediate,
/// `nnn` a 12-bit address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instr {
    /// 00E0 (CLS) Clear the display.
    Clear,
    /// 00EE (RET) Return from a subroutine.
    Return,
    /// 1nnn (JP addr) Jump to address.
    Jump(Address),
    /// 2nnn (CALL addr) Call subroutine.
    Call(Address),
    /// 3xkk (SE Vx, byte) Skip next instruction if Vx == kk.
    SkipEqImm { x: u8, kk: u8 },
    /// 4xkk (SNE Vx, byte) Skip next instruction if Vx != kk.
    SkipNeImm { x: u8, kk: u8 },
    /// 5xy0 (SE Vx, Vy) Skip next instruction if Vx == Vy.
    SkipEqReg { x: u8, y: u8 },
    /// 6xkk (LD Vx, byte) Set Vx to kk.
    LoadImm { x: u8, kk: u8 },
    /// 7xkk (ADD Vx, byte) Add kk to Vx. Wraps; carry flag untouched.
    AddImm { x: u8, kk: u8 },
    /// 8xy0 (LD Vx, Vy)
    Move { x: u8, y: u8 },
    /// 8xy1 (OR Vx, Vy)
    Or { x: u8, y: u8 },
    /// 8xy2 (AND Vx, Vy)
    And { x: u8, y: u8 },
    /// 8xy3 (XOR Vx, Vy)
    Xor { x: u8, y: u8 },
    /// 8xy4 (ADD Vx, Vy) VF is set to the carry.
    Add { x: u8, y: u8 },
    /// 8xy5 (SUB Vx, Vy) VF is cleared on borrow.
    Sub { x: u8, y: u8 },
    /// 8xy6 (SHR Vx) VF receives the shifted out bit.
    ShiftRight { x: u8 },
    /// 8xy7 (SUBN Vx, Vy) Vx = Vy - Vx; VF is cleared on borrow.
    SubNeg { x: u8, y: u8 },
    /// 8xyE (SHL Vx) VF receives the shifted out bit.
    ShiftLeft { x: u8 },
    /// 9xy0 (SNE Vx, Vy) Skip next instruction if Vx != Vy.
    SkipNeReg { x: u8, y: u8 },
    /// Annn (LD I, addr) Set address register I.
    LoadAddress(Address),
    /// Bnnn (JP V0, addr) Jump to nnn + V0.
    JumpOffset(Address),
    /// Cxkk (RND Vx, byte) Vx = random byte AND kk.
    Random { x: u8, kk: u8 },
    /// Dxyn (DRW Vx, Vy, nibble) Draw an n-byte sprite at (Vx, Vy).
    Draw { x: u8, y: u8, n: u8 },
    /// Ex9E (SKP Vx) Skip next instruction if key Vx is pressed.
    SkipKeyPressed { x: u8 },
    /// ExA1 (SKNP Vx) Skip next instruction if key Vx is not pressed.
    SkipKeyReleased { x: u8 },
    /// Fx07 (LD Vx, DT) Read the delay timer into Vx.
    ReadDelay { x: u8 },
    /// Fx0A (LD Vx, K) Stall until a key is pressed, store it in Vx.
    WaitKey { x: u8 },
    /// Fx15 (LD DT, Vx) Set the delay timer to Vx.
    SetDelay { x: u8 },
    /// Fx18 (LD ST, Vx) Set the sound timer to Vx.
    SetSound { x: u8 },
    /// Fx1E (ADD I, Vx) Add Vx to I.
    AddAddress { x: u8 },
    /// Fx29 (LD F, Vx) Point I at the font sprite for digit Vx.
    FontSprite { x: u8 },
    /// Fx33 (LD B, Vx) Store the BCD digits of Vx at I, I+1, I+2.
    StoreBcd { x: u8 },
    /// Fx55 (LD [I], Vx) Store registers V0..=Vx starting at I.
    StoreRegs { x: u8 },
    /// Fx65 (LD Vx, [I]) Load registers V0..=Vx starting at I.
    LoadRegs { x: u8 },
    /// Anything that matches no documented pattern, including 0nnn
    /// (SYS) and data words embedded in the instruction stream.
    Unknown(u16),
}

/// Decode a raw big-endian instruction word.
pub fn decode(word: u16) -> Instr {
    use Instr::*;

    let x = op_x(word);
    let y = op_y(word);
    let n = op_n(word);
    let kk = op_kk(word);
    let nnn = op_nnn(word);

    // The leading nibble selects the instruction family.
    match word >> 12 {
        0x0 => match word {
            0x00E0 => Clear,
            0x00EE => Return,
            _ => Unknown(word),
        },
        0x1 => Jump(nnn),
        0x2 => Call(nnn),
        0x3 => SkipEqImm { x, kk },
        0x4 => SkipNeImm { x, kk },
        0x5 if n == 0 => SkipEqReg { x, y },
        0x6 => LoadImm { x, kk },
        0x7 => AddImm { x, kk },
        0x8 => match n {
            0x0 => Move { x, y },
            0x1 => Or { x, y },
            0x2 => And { x, y },
            0x3 => Xor { x, y },
            0x4 => Add { x, y },
            0x5 => Sub { x, y },
            0x6 => ShiftRight { x },
            0x7 => SubNeg { x, y },
            0xE => ShiftLeft { x },
            _ => Unknown(word),
        },
        0x9 if n == 0 => SkipNeReg { x, y },
        0xA => LoadAddress(nnn),
        0xB => JumpOffset(nnn),
        0xC => Random { x, kk },
        0xD => Draw { x, y, n },
        0xE => match kk {
            0x9E => SkipKeyPressed { x },
            0xA1 => SkipKeyReleased { x },
            _ => Unknown(word),
        },
        0xF => match kk {
            0x07 => ReadDelay { x },
            0x0A => WaitKey { x },
            0x15 => SetDelay { x },
            0x18 => SetSound { x },
            0x1E => AddAddress { x },
            0x29 => FontSprite { x },
            0x33 => StoreBcd { x },
            0x55 => StoreRegs { x },
            0x65 => LoadRegs { x },
            _ => Unknown(word),
        },
        _ => Unknown(word),
    }
}

/// Extract operand VX from the instruction word.
#[inline(always)]
fn op_x(word: u16) -> u8 {
    ((word & 0x0F00) >> 8) as u8
}

/// Extract operand VY from the instruction word.
#[inline(always)]
fn op_y(word: u16) -> u8 {
    ((word & 0x00F0) >> 4) as u8
}

/// Extract operand N from the instruction word.
#[inline(always)]
fn op_n(word: u16) -> u8 {
    (word & 0x000F) as u8
}

/// Extract operand KK from the instruction word.
#[inline(always)]
fn op_kk(word: u16) -> u8 {
    (word & 0x00FF) as u8
}

/// Extract operand NNN from the instruction word.
#[inline(always)]
fn op_nnn(word: u16) -> Address {
    word & 0x0FFF
}
