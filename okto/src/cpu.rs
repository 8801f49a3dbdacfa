//! CPU and memory state.
use crate::{
    constants::*,
    error::{OktoError, OktoResult},
};

/// Core state for the interpreter.
///
/// This is a passive data holder; beyond bounds checking, all
/// behaviour lives in the engine that drives it.
pub struct OktoCpu {
    // ------------------------------------------------------------------------
    // Registers
    /// Program counter pointing to the current position in the program.
    pub(crate) pc: usize,
    /// Stack pointer, counting the number of return addresses held.
    pub(crate) sp: usize,
    /// General purpose registers for temporary values.
    ///
    /// Register 16 (VF) is used for either the carry flag or borrow switch
    /// depending on opcode, and for the draw collision flag.
    pub(crate) registers: [u8; REGISTER_COUNT],
    /// Pointer register used for temporarily storing an address. Since
    /// addresses are 12 bits, only the lowest (rightmost) bits are used.
    pub(crate) address: Address,
    /// (DT) Delay timer that counts down to 0.
    pub(crate) delay_timer: u8,
    /// (ST) Sound timer that counts down to 0. While it has a non-zero
    /// value, the host may emit a tone.
    pub(crate) sound_timer: u8,
    /// Keypad input state. Pressed is a 1 bit, released is a 0 bit.
    pub(crate) key_state: u16,

    // ------------------------------------------------------------------------
    // Memory
    /// Main memory storage space.
    pub(crate) ram: Box<[u8; MEM_SIZE]>,
    /// Stack of return pointers used for jumping when a routine call finishes.
    pub(crate) stack: Box<[Address; STACK_SIZE]>,
    /// Screen buffer that is drawn to.
    pub(crate) display: Box<[bool; DISPLAY_BUFFER_SIZE]>,
    /// Set when the display buffer changed since it was last handed out.
    pub(crate) display_dirty: bool,

    // ------------------------------------------------------------------------
    // Control
    /// Interrupt for the engine loop.
    pub(crate) trap: bool,
}

impl Default for OktoCpu {
    fn default() -> Self {
        let mut cpu = Self {
            pc: MEM_START,
            sp: 0,
            registers: [0; REGISTER_COUNT],
            address: 0,
            delay_timer: 0,
            sound_timer: 0,
            key_state: 0,

            ram: Box::new([0; MEM_SIZE]),
            stack: Box::new([0; STACK_SIZE]),
            display: Box::new([false; DISPLAY_BUFFER_SIZE]),
            display_dirty: false,

            trap: false,
        };
        cpu.load_font();
        cpu
    }
}

impl OktoCpu {
    pub fn new() -> Self {
        Default::default()
    }

    /// Erase the contents of the memory buffers `ram`, `stack` and `display`.
    pub(crate) fn clear_memory(&mut self) {
        self.ram.fill(0);
        self.stack.fill(0);
        self.display.fill(false);
    }

    /// Copy the builtin font sprites into low memory.
    pub(crate) fn load_font(&mut self) {
        let start = FONT_START as usize;
        self.ram[start..start + FONT_DATA.len()].copy_from_slice(&FONT_DATA);
    }

    /// Load a program into memory at the conventional start address and
    /// reset the machine state for a fresh run.
    ///
    /// The size is validated before anything is touched, so a rejected
    /// ROM leaves memory exactly as it was.
    pub fn load_rom(&mut self, rom: &[u8]) -> OktoResult<()> {
        if rom.len() > MAX_ROM_SIZE {
            return Err(OktoError::RomTooLarge(rom.len()));
        }

        // Start with clean memory to avoid leaking the previous program.
        self.clear_memory();
        self.load_font();

        self.ram[MEM_START..MEM_START + rom.len()].copy_from_slice(rom);

        self.registers.fill(0);
        self.address = 0;
        self.delay_timer = 0;
        self.sound_timer = 0;
        self.sp = 0;
        self.pc = MEM_START;
        self.display_dirty = false;
        self.trap = false;

        Ok(())
    }

    // ------------------------------------------------------------------------
    // Memory access

    /// Read one byte, failing on an address beyond the memory space.
    #[inline]
    pub fn read_byte(&self, addr: Address) -> OktoResult<u8> {
        self.ram
            .get(addr as usize)
            .copied()
            .ok_or(OktoError::MemoryOutOfRange(addr))
    }

    /// Write one byte, failing on an address beyond the memory space.
    #[inline]
    pub fn write_byte(&mut self, addr: Address, value: u8) -> OktoResult<()> {
        match self.ram.get_mut(addr as usize) {
            Some(cell) => {
                *cell = value;
                Ok(())
            }
            None => Err(OktoError::MemoryOutOfRange(addr)),
        }
    }

    /// Read a big-endian 16-bit word, as instructions are stored.
    #[inline]
    pub fn read_word(&self, addr: Address) -> OktoResult<u16> {
        let hi = self.read_byte(addr)?;
        let lo = self.read_byte(addr + 1)?;
        Ok((hi as u16) << 8 | lo as u16)
    }

    // ------------------------------------------------------------------------
    // Call stack

    /// Push a return address. Nesting deeper than the stack capacity is fatal.
    #[inline]
    pub(crate) fn push_return(&mut self, addr: Address) -> OktoResult<()> {
        if self.sp >= STACK_SIZE {
            return Err(OktoError::StackOverflow);
        }
        self.stack[self.sp] = addr;
        self.sp += 1;
        Ok(())
    }

    /// Pop a return address. Returning with an empty stack is fatal.
    #[inline]
    pub(crate) fn pop_return(&mut self) -> OktoResult<Address> {
        if self.sp == 0 {
            return Err(OktoError::StackUnderflow);
        }
        self.sp -= 1;
        Ok(self.stack[self.sp])
    }

    // ------------------------------------------------------------------------
    // Display

    pub fn clear_display(&mut self) {
        self.display.fill(false);
        self.display_dirty = true;
    }

    // ------------------------------------------------------------------------
    // Keypad

    /// Set one key up or down. The index must already be validated.
    pub(crate) fn set_key_state(&mut self, key_id: u8, state: bool) {
        if key_id < KEY_COUNT {
            if state {
                self.key_state |= 1 << key_id;
            } else {
                self.key_state &= !(1 << key_id);
            }
        }
    }

    pub fn key_state(&self, key_id: u8) -> bool {
        if key_id < KEY_COUNT {
            self.key_state & (1 << key_id) > 0
        } else {
            false
        }
    }

    /// Check whether any key is pressed down.
    #[inline(always)]
    pub fn any_key(&self) -> bool {
        self.key_state > 0
    }

    /// Retrieve the value of the first key that is pressed down.
    #[inline]
    pub fn first_key(&self) -> Option<u8> {
        if self.any_key() {
            for k in 0..KEY_COUNT {
                if self.key_state(k) {
                    return Some(k);
                }
            }
        }
        None
    }

    /// Clear the keypad input state, setting all keys to up.
    #[inline(always)]
    pub fn clear_keys(&mut self) {
        self.key_state = 0;
    }

    // ------------------------------------------------------------------------
    // Timers

    /// Count down the delay timer.
    #[inline]
    pub fn tick_delay(&mut self) {
        // The checked_sub implementation uses `unlikely!()` which degrades performance.
        let (val, underflow) = self.delay_timer.overflowing_sub(1);
        if !underflow {
            self.delay_timer = val;
        }
    }

    #[inline]
    pub fn tick_sound(&mut self) {
        // The checked_sub implementation uses `unlikely!()` which degrades performance.
        let (val, underflow) = self.sound_timer.overflowing_sub(1);
        if !underflow {
            self.sound_timer = val;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_key_state() {
        let mut cpu = OktoCpu::default();

        cpu.set_key_state(0, true);
        assert_eq!(cpu.key_state, 0b00000000_00000001);
        assert!(cpu.key_state(0));
        assert!(!cpu.key_state(1));
        assert!(!cpu.key_state(7));

        cpu.set_key_state(7, true);
        assert_eq!(cpu.key_state, 0b00000000_10000001);
        assert!(cpu.key_state(0));
        assert!(!cpu.key_state(1));
        assert!(cpu.key_state(7));

        cpu.set_key_state(0, false);
        assert_eq!(cpu.key_state, 0b00000000_10000000);
        assert!(!cpu.key_state(0));
        assert!(!cpu.key_state(1));
        assert!(cpu.key_state(7));

        cpu.set_key_state(15, true);
        assert_eq!(cpu.key_state, 0b10000000_10000000);
        assert!(!cpu.key_state(0));
        assert!(!cpu.key_state(1));
        assert!(cpu.key_state(7));
        assert!(cpu.key_state(15));
    }

    #[test]
    fn test_memory_bounds() {
        let mut cpu = OktoCpu::default();

        assert!(cpu.write_byte(0x0FFF, 0xAB).is_ok());
        assert_eq!(cpu.read_byte(0x0FFF).unwrap(), 0xAB);

        // Access at or beyond the end of memory fails, never wraps.
        assert!(matches!(
            cpu.read_byte(0x1000),
            Err(OktoError::MemoryOutOfRange(0x1000))
        ));
        assert!(matches!(
            cpu.write_byte(0x1000, 0),
            Err(OktoError::MemoryOutOfRange(0x1000))
        ));
        assert!(matches!(
            cpu.read_word(0x0FFF),
            Err(OktoError::MemoryOutOfRange(0x1000))
        ));
    }

    #[test]
    fn test_read_word_big_endian() {
        let mut cpu = OktoCpu::default();
        cpu.write_byte(0x200, 0x1A).unwrap();
        cpu.write_byte(0x201, 0xBC).unwrap();
        assert_eq!(cpu.read_word(0x200).unwrap(), 0x1ABC);
    }

    #[test]
    fn test_load_rom_too_large() {
        let mut cpu = OktoCpu::default();
        cpu.write_byte(0x200, 0x77).unwrap();

        let oversized = vec![0u8; MAX_ROM_SIZE + 1];
        assert!(matches!(
            cpu.load_rom(&oversized),
            Err(OktoError::RomTooLarge(_))
        ));

        // A rejected ROM must not partially load.
        assert_eq!(cpu.read_byte(0x200).unwrap(), 0x77);
    }

    #[test]
    fn test_load_rom_resets_machine() {
        let mut cpu = OktoCpu::default();
        cpu.registers[3] = 9;
        cpu.pc = 0x400;
        cpu.sp = 2;

        cpu.load_rom(&[0xAA, 0xBB]).unwrap();

        assert_eq!(cpu.pc, MEM_START);
        assert_eq!(cpu.sp, 0);
        assert_eq!(cpu.registers[3], 0);
        assert_eq!(cpu.read_byte(0x200).unwrap(), 0xAA);
        assert_eq!(cpu.read_byte(0x201).unwrap(), 0xBB);
        // Font glyph for 0 survives the reset.
        assert_eq!(cpu.read_byte(FONT_START).unwrap(), 0xF0);
    }

    #[test]
    fn test_stack_limits() {
        let mut cpu = OktoCpu::default();

        assert!(matches!(cpu.pop_return(), Err(OktoError::StackUnderflow)));

        for depth in 0..STACK_SIZE {
            assert_eq!(cpu.sp, depth);
            cpu.push_return(0x200 + depth as Address).unwrap();
        }
        assert!(matches!(
            cpu.push_return(0x300),
            Err(OktoError::StackOverflow)
        ));

        for depth in (0..STACK_SIZE).rev() {
            assert_eq!(cpu.pop_return().unwrap(), 0x200 + depth as Address);
        }
    }

    #[test]
    fn test_timer_floor() {
        let mut cpu = OktoCpu::default();
        cpu.delay_timer = 2;

        cpu.tick_delay();
        assert_eq!(cpu.delay_timer, 1);
        cpu.tick_delay();
        assert_eq!(cpu.delay_timer, 0);
        // Never wraps below zero.
        cpu.tick_delay();
        assert_eq!(cpu.delay_timer, 0);

        cpu.tick_sound();
        assert_eq!(cpu.sound_timer, 0);
    }
}
