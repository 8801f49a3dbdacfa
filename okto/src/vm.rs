//! Virtual machine.
use std::{
    fmt::{self, Write},
    time::Duration,
};

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    clock::{Throttle, TickClock},
    constants::*,
    cpu::OktoCpu,
    decode::{decode, Instr},
    devices::{KeyCode, LogMonitor, Monitor},
    error::{OktoError, OktoResult},
    DisplayBuffer,
};

pub struct OktoVm {
    cpu: OktoCpu,
    clock: Throttle,
    timer: TickClock,
    rng: StdRng,
    state: RunState,
    monitor: Box<dyn Monitor>,
    conf: OktoConf,
}

/// Lifecycle of the machine.
///
/// `Halted` is terminal; no instruction executes after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    /// Stalled on `Fx0A` until any key transitions to pressed.
    WaitingForKey,
    Halted,
}

/// Outcome of a single interpreter step.
///
/// The caller can use this to schedule rendering, audio polling and
/// input handling without being blocked on the interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum Flow {
    Ok,
    /// Program counter has jumped to a new address.
    ///
    /// This is returned when the interpreter encounters:
    ///
    /// - 1nnn (`JP addr`)
    /// - Bnnn (`JP V0, addr`)
    /// - 2nnn (`CALL addr`)
    /// - 00EE (`RET`)
    Jump,
    /// The display buffer changed and is worth presenting.
    Draw,
    /// The sound timer was set; the host may want to poll it.
    Sound,
    /// Wait for a keypress.
    ///
    /// This is triggered by the opcode `Fx0A` (`LD Vx, K`), which stops
    /// execution until a key is pressed, and loads the key value into `Vx`.
    /// The machine yields back to the host each cycle instead of blocking.
    KeyWait,
    /// The machine reached its terminal state.
    Halt,
}

/// VM Configuration Parameters.
#[derive(Default, Clone)]
pub struct OktoConf {
    pub clock_frequency: Option<Hz>,
    /// Fixed seed for the random number source, for deterministic runs.
    pub rng_seed: Option<u64>,
}

/// CPU clock frequency, in hertz (per second)
#[derive(Debug, Default, Clone, Copy)]
pub struct Hz(pub u64);

impl From<Hz> for Duration {
    fn from(freq: Hz) -> Self {
        if freq.0 == 0 {
            Duration::from_nanos(0)
        } else {
            Duration::from_nanos(NANOS_IN_SECOND / freq.0)
        }
    }
}

impl OktoVm {
    pub fn new(conf: OktoConf) -> Self {
        let rng = match conf.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        OktoVm {
            cpu: OktoCpu::new(),
            clock: Throttle::new(conf.clock_frequency.unwrap_or_default().into()),
            timer: TickClock::new(TIMER_TICK_TIME),
            rng,
            state: RunState::Running,
            monitor: Box::new(LogMonitor),
            conf,
        }
    }

    /// Replace the default monitor with a host-supplied one.
    pub fn with_monitor(mut self, monitor: Box<dyn Monitor>) -> Self {
        self.monitor = monitor;
        self
    }

    /// Configuration that was used to instantiate the VM.
    pub fn config(&self) -> &OktoConf {
        &self.conf
    }

    /// Load a program into memory and prepare for a fresh run.
    pub fn load_rom(&mut self, rom: &[u8]) -> OktoResult<()> {
        self.cpu.load_rom(rom)?;
        self.reset();
        Ok(())
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn display_buffer(&self) -> &DisplayBuffer {
        &self.cpu.display
    }

    /// The current frame, plus whether it changed since the last snapshot.
    ///
    /// The changed flag is cleared on read. Called between cycles, the
    /// buffer is always a complete frame, never a partial sprite write.
    pub fn snapshot(&mut self) -> (&DisplayBuffer, bool) {
        let changed = self.cpu.display_dirty;
        self.cpu.display_dirty = false;
        (&self.cpu.display, changed)
    }

    /// Current sound timer value. The host emits a tone while it is nonzero.
    pub fn sound_timer(&self) -> u8 {
        self.cpu.sound_timer
    }

    pub fn delay_timer(&self) -> u8 {
        self.cpu.delay_timer
    }

    /// Request a stop at the next cycle boundary.
    pub fn interrupt(&mut self) {
        self.cpu.trap = true;
    }
}

/// Interpreter
impl OktoVm {
    /// Sets the keypad key input state.
    ///
    /// If the VM is waiting for keypad input, a press will
    /// let it resume on the next step.
    pub fn set_key(&mut self, key: KeyCode, pressed: bool) {
        self.cpu.set_key_state(key.as_u8(), pressed);
    }

    /// Sets key state from a raw index, validating it at the boundary.
    ///
    /// An invalid index is rejected without touching CPU state.
    pub fn set_key_index(&mut self, key_id: u8, pressed: bool) -> OktoResult<()> {
        let key = KeyCode::try_from(key_id)?;
        self.set_key(key, pressed);
        Ok(())
    }

    /// Clear the keypad input state, setting all keys to up.
    pub fn clear_keys(&mut self) {
        self.cpu.clear_keys()
    }

    /// Clear internal clock state in preparation for a fresh startup.
    fn reset(&mut self) {
        self.clock.reset();
        self.timer.reset();
        self.transition(RunState::Running);
    }

    fn transition(&mut self, state: RunState) {
        if self.state != state {
            self.state = state;
            self.monitor.state_changed(state);
        }
    }

    /// Run until the machine halts.
    ///
    /// Fatal faults transition the machine to `Halted` and surface
    /// as errors; reaching the end of memory is a clean halt.
    pub fn execute(&mut self) -> OktoResult<Flow> {
        loop {
            if let Flow::Halt = self.step()? {
                return Ok(Flow::Halt);
            }
        }
    }

    /// Run for at most `step_count` cycles.
    pub fn run_steps(&mut self, step_count: usize) -> OktoResult<Flow> {
        let mut flow = Flow::Ok;
        for _ in 0..step_count {
            flow = self.step()?;
            if flow == Flow::Halt {
                break;
            }
        }
        Ok(flow)
    }

    /// Execute one fetch-decode-execute cycle.
    pub fn step(&mut self) -> OktoResult<Flow> {
        if self.state == RunState::Halted {
            return Ok(Flow::Halt);
        }

        if self.cpu.trap {
            // Host requested a stop at this cycle boundary.
            self.transition(RunState::Halted);
            return Ok(Flow::Halt);
        }

        #[cfg(feature = "throttle")]
        self.clock.wait();

        // Count down timers, catching up on every 60 Hz interval that
        // elapsed while the host held control.
        for _ in 0..self.timer.tick() {
            self.cpu.tick_delay();
            self.cpu.tick_sound();
        }

        // The program counter walking off the end of memory ends the
        // run; programs without a final infinite loop terminate here.
        if self.cpu.pc + 1 >= MEM_SIZE {
            self.transition(RunState::Halted);
            return Ok(Flow::Halt);
        }

        // Each instruction is two bytes, stored big-endian.
        let word = self.cpu.read_word(self.cpu.pc as Address)?;
        let instr = decode(word);

        op_trace(self.cpu.pc, &instr);

        self.cpu.pc += 2;

        match self.exec(instr, word) {
            Ok(flow) => Ok(flow),
            Err(err) => {
                // Stack and memory faults are fatal.
                self.transition(RunState::Halted);
                Err(err)
            }
        }
    }

    /// Execute one decoded instruction.
    ///
    /// The program counter has already advanced past the instruction;
    /// skips add another 2, jumps replace it outright.
    fn exec(&mut self, instr: Instr, word: u16) -> OktoResult<Flow> {
        use Instr::*;

        let mut control_flow = Flow::Ok;

        match instr {
            // 00E0 (CLS)
            //
            // Clear display
            Clear => {
                self.cpu.clear_display();
                control_flow = Flow::Draw;
            }
            // 00EE (RET)
            //
            // Return from a subroutine.
            // Pop the program counter from the top of the stack.
            Return => {
                self.cpu.pc = self.cpu.pop_return()? as usize;
                control_flow = Flow::Jump;
            }
            // 1NNN (JP addr)
            //
            // Jump to address.
            Jump(nnn) => {
                self.cpu.pc = nnn as usize;
                control_flow = Flow::Jump;
            }
            // 2NNN (CALL addr)
            //
            // Call subroutine at NNN. The already-advanced program
            // counter is pushed, so RET resumes after the call.
            Call(nnn) => {
                self.cpu.push_return(self.cpu.pc as Address)?;
                self.cpu.pc = nnn as usize;
                control_flow = Flow::Jump;
            }
            // 3XNN (SE Vx, byte)
            //
            // Skip the next instruction if register VX equals value NN.
            SkipEqImm { x, kk } => {
                if self.cpu.registers[x as usize] == kk {
                    self.cpu.pc += 2;
                }
            }
            // 4XNN (SNE Vx, byte)
            //
            // Skip the next instruction if register VX does not equal value NN.
            SkipNeImm { x, kk } => {
                if self.cpu.registers[x as usize] != kk {
                    self.cpu.pc += 2;
                }
            }
            // 5XY0 (SE Vx, Vy)
            //
            // Skip the next instruction if register VX equals register VY.
            SkipEqReg { x, y } => {
                if self.cpu.registers[x as usize] == self.cpu.registers[y as usize] {
                    self.cpu.pc += 2;
                }
            }
            // 6XNN (LD Vx, byte)
            //
            // Set register VX to value NN.
            LoadImm { x, kk } => {
                self.cpu.registers[x as usize] = kk;
            }
            // 7XNN (ADD Vx, byte)
            //
            // Add value NN to register VX. Wraps; the carry flag is not set.
            AddImm { x, kk } => {
                let vx = self.cpu.registers[x as usize];
                self.cpu.registers[x as usize] = vx.wrapping_add(kk);
            }
            Move { x, y } | Or { x, y } | And { x, y } | Xor { x, y } | Add { x, y }
            | Sub { x, y } | SubNeg { x, y } => self.exec_math(instr, x, y),
            // 8XY6 (SHR Vx)
            //
            // Shift VX right by 1.
            // VF receives the shifted out least-significant bit.
            // VY is unused.
            ShiftRight { x } => {
                let vx = self.cpu.registers[x as usize];
                self.cpu.registers[x as usize] = vx >> 1;
                self.cpu.registers[0xF] = vx & 1;
            }
            // 8XYE (SHL Vx)
            //
            // Shift VX left by 1.
            // VF receives the shifted out most-significant bit.
            // VY is unused.
            ShiftLeft { x } => {
                let vx = self.cpu.registers[x as usize];
                self.cpu.registers[x as usize] = vx << 1;
                self.cpu.registers[0xF] = (vx >> 7) & 1;
            }
            // 9XY0 (SNE Vx, Vy)
            //
            // Skip the next instruction if register VX does not equal register VY.
            SkipNeReg { x, y } => {
                if self.cpu.registers[x as usize] != self.cpu.registers[y as usize] {
                    self.cpu.pc += 2;
                }
            }
            // ANNN (LD I, addr)
            //
            // Set address register I to value NNN.
            LoadAddress(nnn) => {
                self.cpu.address = nnn;
            }
            // BNNN (JP V0, addr)
            //
            // Jump to address NNN plus register V0.
            JumpOffset(nnn) => {
                self.cpu.pc = nnn as usize + self.cpu.registers[0] as usize;
                control_flow = Flow::Jump;
            }
            // CXNN (RND Vx, byte)
            //
            // Set register VX to the result of bitwise AND between a
            // random number and NN.
            Random { x, kk } => {
                self.cpu.registers[x as usize] = kk & self.rng.gen::<u8>();
            }
            // DXYN (DRW Vx, Vy, nibble)
            Draw { x, y, n } => {
                self.exec_draw(x, y, n)?;
                control_flow = Flow::Draw;
            }
            // EX9E (SKP Vx)
            //
            // Skip the next instruction if the key with the value of VX is pressed.
            SkipKeyPressed { x } => {
                if self.cpu.key_state(self.cpu.registers[x as usize] & 0xF) {
                    self.cpu.pc += 2;
                }
            }
            // EXA1 (SKNP Vx)
            //
            // Skip the next instruction if the key with the value of VX is not pressed.
            SkipKeyReleased { x } => {
                if !self.cpu.key_state(self.cpu.registers[x as usize] & 0xF) {
                    self.cpu.pc += 2;
                }
            }
            // FX07 (LD Vx, DT)
            //
            // Set Vx = delay timer value.
            ReadDelay { x } => {
                self.cpu.registers[x as usize] = self.cpu.delay_timer;
            }
            // FX0A (LD Vx, K)
            //
            // Wait for a key press, store the value of the key in Vx.
            //
            // Instead of blocking the process, the program counter is
            // rewound to stall the machine, and control is yielded back
            // to the host so it can keep pumping input.
            WaitKey { x } => {
                if let Some(k) = self.cpu.first_key() {
                    self.cpu.registers[x as usize] = k;
                    self.transition(RunState::Running);
                } else {
                    self.cpu.pc -= 2;
                    self.transition(RunState::WaitingForKey);
                    control_flow = Flow::KeyWait;
                }
            }
            // FX15 (LD DT, Vx)
            //
            // Set delay timer = Vx.
            SetDelay { x } => {
                self.cpu.delay_timer = self.cpu.registers[x as usize];
            }
            // FX18 (LD ST, Vx)
            //
            // Set sound timer = Vx.
            SetSound { x } => {
                self.cpu.sound_timer = self.cpu.registers[x as usize];
                control_flow = Flow::Sound;
            }
            // FX1E (ADD I, Vx)
            //
            // Add Vx to I, keeping I a valid 12-bit address.
            AddAddress { x } => {
                let vx = self.cpu.registers[x as usize] as Address;
                self.cpu.address = self.cpu.address.wrapping_add(vx) & 0xFFF;
            }
            // FX29 (LD F, Vx)
            //
            // Set I = location of the builtin sprite for digit Vx.
            FontSprite { x } => {
                let digit = self.cpu.registers[x as usize] & 0xF;
                self.cpu.address = FONT_START + digit as Address * FONT_HEIGHT as Address;
            }
            // FX33 (LD B, Vx)
            //
            // Store the binary-coded decimal representation of Vx
            // in the memory locations I, I+1, and I+2.
            #[rustfmt::skip]
            StoreBcd { x } => {
                let addr = self.cpu.address;
                let vx = self.cpu.registers[x as usize];
                self.cpu.write_byte(addr + 2, vx       % 10)?;
                self.cpu.write_byte(addr + 1, vx / 10  % 10)?;
                self.cpu.write_byte(addr,     vx / 100 % 10)?;
            }
            // FX55 (LD [I], Vx)
            //
            // Store registers V0 through Vx in memory starting at location I.
            StoreRegs { x } => {
                let addr = self.cpu.address;
                self.check_range(addr, x as usize + 1)?;
                for v in 0..=x as usize {
                    self.cpu.write_byte(addr + v as Address, self.cpu.registers[v])?;
                }
            }
            // FX65 (LD Vx, [I])
            //
            // Read registers V0 through Vx from memory starting at location I.
            LoadRegs { x } => {
                let addr = self.cpu.address;
                self.check_range(addr, x as usize + 1)?;
                for v in 0..=x as usize {
                    self.cpu.registers[v] = self.cpu.read_byte(addr + v as Address)?;
                }
            }
            // Unrecognized instruction word.
            //
            // Reported and skipped; the permissive behaviour lets ROMs
            // that embed data words keep running.
            Unknown(_) => {
                self.monitor.unknown_opcode((self.cpu.pc - 2) as Address, word);
            }
        }

        Ok(control_flow)
    }

    /// Execute an arithmetic instruction from the 8XY_ family.
    fn exec_math(&mut self, instr: Instr, x: u8, y: u8) {
        let vx = self.cpu.registers[x as usize];
        let vy = self.cpu.registers[y as usize];

        match instr {
            // 8XY0 (LD Vx, Vy)
            //
            // Store the value of register VY in register VX.
            Instr::Move { .. } => {
                self.cpu.registers[x as usize] = vy;
            }
            // 8XY1 (OR Vx, Vy)
            //
            // Performs bitwise OR on VX and VY, and stores the result in VX.
            Instr::Or { .. } => {
                self.cpu.registers[x as usize] = vx | vy;
            }
            // 8XY2 (AND Vx, Vy)
            //
            // Performs bitwise AND on VX and VY, and stores the result in VX.
            Instr::And { .. } => {
                self.cpu.registers[x as usize] = vx & vy;
            }
            // 8XY3 (XOR Vx, Vy)
            //
            // Performs bitwise XOR on VX and VY, and stores the result in VX.
            Instr::Xor { .. } => {
                self.cpu.registers[x as usize] = vx ^ vy;
            }
            // 8XY4 (ADD Vx, Vy)
            //
            // Adds VY to VX. The result wraps.
            // VF is set to 1 on carry, else 0.
            Instr::Add { .. } => {
                let (result, carry) = vx.overflowing_add(vy);
                self.cpu.registers[x as usize] = result;
                self.cpu.registers[0xF] = carry as u8;
            }
            // 8XY5 (SUB Vx, Vy)
            //
            // Subtracts VY from VX. The result wraps.
            // VF is set to 0 when there is a borrow, 1 when there isn't.
            Instr::Sub { .. } => {
                let (result, borrow) = vx.overflowing_sub(vy);
                self.cpu.registers[x as usize] = result;
                self.cpu.registers[0xF] = !borrow as u8;
            }
            // 8XY7 (SUBN Vx, Vy)
            //
            // Subtracts VX from VY, storing the result in VX.
            // VF is set to 0 when there is a borrow, 1 when there isn't.
            Instr::SubNeg { .. } => {
                let (result, borrow) = vy.overflowing_sub(vx);
                self.cpu.registers[x as usize] = result;
                self.cpu.registers[0xF] = !borrow as u8;
            }
            // Only dispatched for the variants above.
            _ => unreachable!("not a math instruction: {instr:?}"),
        }
    }

    /// DXYN (DRW Vx, Vy, nibble)
    ///
    /// Draw sprite to the display buffer, at coordinate as per registers
    /// VX and VY. The sprite is encoded as 8 pixels wide, N pixels high,
    /// stored in bits located in memory pointed to by address register I.
    ///
    /// If the sprite is drawn outside of the display area, it is wrapped
    /// around to the other side.
    ///
    /// If the drawing operation erases existing pixels in the display
    /// buffer, register VF is set to 1, and set to 0 if no display bits
    /// are unset. This is used for collision detection.
    fn exec_draw(&mut self, x: u8, y: u8, n: u8) -> OktoResult<()> {
        let addr = self.cpu.address;

        // Validate the whole sprite up front so a fault cannot leave
        // a partially composited frame behind.
        self.check_range(addr, n as usize)?;

        let (px, py) = (
            self.cpu.registers[x as usize] as usize,
            self.cpu.registers[y as usize] as usize,
        );
        let mut is_erased = false;
        let mut any_set = false;

        // Iteration from pointer in address register I to number of rows
        // specified by opcode value N.
        for r in 0..n as usize {
            let row = self.cpu.ram[addr as usize + r];

            // Each row is 8 bits representing the 8 pixels of the sprite.
            for c in 0..8 {
                let d = ((px + c) & DISPLAY_WIDTH_MASK)
                    + ((py + r) & DISPLAY_HEIGHT_MASK) * DISPLAY_WIDTH;

                let old_px = self.cpu.display[d];
                let new_px = (row >> (7 - c) & 1) != 0;

                // XOR erases a pixel when both the old and new values are both 1.
                is_erased |= old_px && new_px;
                any_set |= new_px;

                // Write to display buffer
                self.cpu.display[d] = old_px ^ new_px;
            }
        }

        // If a pixel was erased, then a collision occurred.
        self.cpu.registers[0xF] = is_erased as u8;
        // A sprite of all-zero rows flips nothing and leaves the frame as is.
        if any_set {
            self.cpu.display_dirty = true;
        }

        Ok(())
    }

    /// Ensure `len` bytes starting at `addr` fall inside memory.
    #[inline]
    fn check_range(&self, addr: Address, len: usize) -> OktoResult<()> {
        let end = addr as usize + len;
        if end > MEM_SIZE {
            Err(OktoError::MemoryOutOfRange(end as Address - 1))
        } else {
            Ok(())
        }
    }
}

/// Troubleshooting
#[allow(dead_code)]
#[doc(hidden)]
impl OktoVm {
    /// Read-only view of the general purpose registers.
    pub fn registers(&self) -> &[u8; REGISTER_COUNT] {
        &self.cpu.registers
    }

    /// Current program counter.
    pub fn pc(&self) -> usize {
        self.cpu.pc
    }

    /// Current value of the address register I.
    pub fn address_register(&self) -> Address {
        self.cpu.address
    }

    /// Current call stack depth.
    pub fn stack_depth(&self) -> usize {
        self.cpu.sp
    }

    /// Returns the contents of program memory as a human readable string.
    pub fn dump_ram(&self, count: usize) -> Result<String, fmt::Error> {
        let iter = self
            .cpu
            .ram
            .iter()
            .enumerate()
            .skip(MEM_START)
            .take(count)
            .step_by(2);
        let mut buf = String::new();

        for (i, op) in iter {
            writeln!(buf, "{:04X}: {:02X}{:02X}", i, op, self.cpu.ram[i + 1])?;
        }

        Ok(buf)
    }

    pub fn dump_display(&self) -> Result<String, fmt::Error> {
        let mut buf = String::new();

        for y in 0..DISPLAY_HEIGHT {
            for x in 0..DISPLAY_WIDTH {
                if self.cpu.display[x + y * DISPLAY_WIDTH] {
                    write!(buf, "#")?;
                } else {
                    write!(buf, ".")?;
                }
            }
            writeln!(buf)?;
        }

        Ok(buf)
    }
}

#[cfg(feature = "op_trace")]
#[inline]
fn op_trace(pc: usize, instr: &Instr) {
    log::trace!("{:04X}: {:?}", pc, instr);
}

#[cfg(not(feature = "op_trace"))]
#[inline]
fn op_trace(_: usize, _: &Instr) {}

#[cfg(test)]
mod test {
    use super::*;

    fn load_vm(rom: &[u8]) -> OktoVm {
        let mut vm = OktoVm::new(OktoConf::default());
        vm.load_rom(rom).unwrap();
        vm
    }

    #[test]
    fn test_clock_hz() {
        let interval: Duration = Hz(60).into();
        assert_eq!(interval.as_millis(), 16);
    }

    /// Fx0A (LD Vx, K)
    ///
    /// Wait for a keypress, then store the key value in Vx.
    /// The VM must stall while waiting, and signal the state to the host.
    #[test]
    #[rustfmt::skip]
    fn test_key_wait() {
        let mut vm = load_vm(&[
            0xF1, 0x0A, // LD v1, K
            0x62, 0x42, // LD v2, 0x42  ; sentinel
        ]);

        // machine must stall
        assert_eq!(vm.cpu.pc, MEM_START);
        for _ in 0..5 {
            assert_eq!(vm.step().unwrap(), Flow::KeyWait);
            assert_eq!(vm.cpu.pc, MEM_START);
            assert_eq!(vm.state(), RunState::WaitingForKey);
        }

        // machine has yielded, waiting for any key to be pressed.
        vm.set_key(KeyCode::Key5, true);

        // machine will now advance
        vm.step().unwrap();
        assert_eq!(vm.cpu.pc, MEM_START + 2);
        assert_eq!(vm.state(), RunState::Running);
        assert!(vm.cpu.key_state(0x05));
        assert_eq!(vm.cpu.registers[1], 0x05);

        // Ensure the machine is continuing
        vm.step().unwrap();
        assert_eq!(vm.cpu.pc, MEM_START + 4);
        assert_eq!(vm.cpu.registers[2], 0x42); // sentinel
    }

    #[test]
    fn test_seeded_rng_is_deterministic() {
        let conf = OktoConf {
            rng_seed: Some(0xC0FFEE),
            ..Default::default()
        };

        let run = |conf: &OktoConf| {
            let mut vm = OktoVm::new(conf.clone());
            // RND v0, 0xFF four times over
            vm.load_rom(&[0xC0, 0xFF, 0xC1, 0xFF, 0xC2, 0xFF, 0xC3, 0xFF])
                .unwrap();
            vm.run_steps(4).unwrap();
            vm.cpu.registers[0..4].to_vec()
        };

        assert_eq!(run(&conf), run(&conf));
    }

    #[test]
    fn test_draw_collision() {
        // Draw two sprite rows next to each other.
        // The zero bits of the second draw must not erase
        // the pixels of the first draw.
        //
        // draw sprite 1: ____####, vf == 0
        // draw sprite 2: ####____, vf == 0
        let mut vm = load_vm(&[
            0xA2, 0x0C, // LD I, 0x20C   ; sprite data below
            0x60, 0x04, // LD v0, 4      ; x := 4
            0x61, 0x00, // LD v1, 0      ; y := 0
            0xD0, 0x11, // DRW v0, v1, 1
            0x60, 0x00, // LD v0, 0      ; x := 0
            0xD0, 0x11, // DRW v0, v1, 1
            0xF0, 0x00, // sprite data: 0b11110000, 0b00000000
        ]);

        vm.run_steps(6).unwrap();

        assert!(vm.display_buffer()[0]); // second draw
        assert!(vm.display_buffer()[4]); // first draw
        assert_eq!(vm.cpu.registers[0xF], 0);
    }

    #[test]
    fn test_snapshot_clears_changed_flag() {
        let mut vm = load_vm(&[
            0xA2, 0x06, // LD I, 0x206
            0x60, 0x00, // LD v0, 0
            0xD0, 0x01, // DRW v0, v0, 1
            0x80,       // sprite row
        ]);

        let (_, changed) = vm.snapshot();
        assert!(!changed);

        vm.run_steps(3).unwrap();

        let (frame, changed) = vm.snapshot();
        assert!(changed);
        assert!(frame[0]);

        let (_, changed) = vm.snapshot();
        assert!(!changed);
    }

    #[test]
    fn test_blank_sprite_does_not_mark_frame_changed() {
        // Sprite rows of all zero bits flip no pixels, so the frame
        // must not be reported as changed.
        let mut vm = load_vm(&[
            0xA3, 0x00, // LD I, 0x300  ; empty memory
            0x60, 0x00, // LD v0, 0
            0xD0, 0x02, // DRW v0, v0, 2
            0xD0, 0x00, // DRW v0, v0, 0
        ]);

        vm.run_steps(4).unwrap();

        let (frame, changed) = vm.snapshot();
        assert!(!changed);
        assert_eq!(frame.iter().filter(|px| **px).count(), 0);
    }

    #[test]
    fn test_interrupt_halts() {
        let mut vm = load_vm(&[
            0x12, 0x00, // JP 0x200  ; spin forever
        ]);

        assert_eq!(vm.run_steps(10).unwrap(), Flow::Jump);
        vm.interrupt();
        assert_eq!(vm.step().unwrap(), Flow::Halt);
        assert_eq!(vm.state(), RunState::Halted);

        // Halted is terminal.
        assert_eq!(vm.step().unwrap(), Flow::Halt);
    }

    #[test]
    fn test_unknown_opcode_is_reported_and_skipped() {
        use std::{cell::Cell, rc::Rc};

        struct CountingMonitor(Rc<Cell<usize>>);

        impl Monitor for CountingMonitor {
            fn unknown_opcode(&mut self, _pc: Address, _word: u16) {
                self.0.set(self.0.get() + 1);
            }
        }

        let count = Rc::new(Cell::new(0));
        let mut vm = OktoVm::new(OktoConf::default())
            .with_monitor(Box::new(CountingMonitor(Rc::clone(&count))));
        vm.load_rom(&[
            0x01, 0x23, // SYS 0x123  ; data word
            0x6A, 0x05, // LD vA, 5
        ])
        .unwrap();

        assert_eq!(vm.step().unwrap(), Flow::Ok);
        assert_eq!(count.get(), 1);

        // Execution continued past the data word.
        vm.step().unwrap();
        assert_eq!(vm.cpu.registers[0xA], 0x05);
        assert_eq!(vm.cpu.pc, MEM_START + 4);
    }

    #[test]
    fn test_invalid_key_index_rejected() {
        let mut vm = load_vm(&[0x12, 0x00]);
        assert!(matches!(
            vm.set_key_index(16, true),
            Err(OktoError::InvalidKeyIndex(16))
        ));
        assert!(!vm.cpu.any_key());

        vm.set_key_index(0xA, true).unwrap();
        assert!(vm.cpu.key_state(0xA));
    }

    #[test]
    fn test_register_windows_need_valid_address() {
        let mut vm = load_vm(&[
            0xAF, 0xFE, // LD I, 0xFFE
            0xF5, 0x55, // LD [I], v5  ; 6 bytes, runs past the end
        ]);

        let err = vm.run_steps(2).unwrap_err();
        assert!(matches!(err, OktoError::MemoryOutOfRange(_)));
        assert_eq!(vm.state(), RunState::Halted);
    }
}
