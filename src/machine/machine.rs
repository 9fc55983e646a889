use rand::{SeedableRng, rngs::StdRng};

use super::{
    DISPLAY_X, DISPLAY_Y, Display, FONT, FONT_END_ADDRESS, FONT_START_ADDRESS, MachineError,
    MachineState, Opcode,
};
use crate::u4;

// The constants are fixed by the CHIP-8 memory map
pub const PROGRAM_START_ADDRESS: usize = 0x200;
pub const MEMORY_SIZE: usize = 4096;
pub const MAX_PROGRAM_SIZE: usize = MEMORY_SIZE - PROGRAM_START_ADDRESS;
/// Call depth of the COSMAC VIP interpreter. Deeper nesting is allowed but logged.
pub const HARDWARE_STACK_DEPTH: usize = 16;

/// CHIP-8 virtual machine state.
#[derive(Clone)]
pub struct Machine {
    /// 4KB memory array
    pub(crate) memory: [u8; MEMORY_SIZE],
    /// Display buffer: 64x32 monochrome pixels
    pub(crate) display: Display<bool>,

    /// Program counter: address of the next instruction to fetch
    pub(crate) pc: u16,
    /// Index register: base address for sprite and indirect memory instructions
    pub(crate) i: u16,
    /// General-purpose registers V0-VF (VF doubles as the flag register)
    pub(crate) v: [u8; 16],
    /// Return addresses pushed by 2nnn
    pub(crate) stack: Vec<u16>,

    /// Delay timer: decrements at 60Hz until it reaches 0
    pub(crate) delay_timer: u8,
    /// Sound timer: decrements at 60Hz, beeps while non-zero
    pub(crate) sound_timer: u8,

    pub(crate) state: MachineState,
    /// Keypad state: 16 keys mapped as booleans (true = pressed)
    pub(crate) keypad: [bool; 16],

    /// Source of Cxnn random bytes
    pub(crate) rng: StdRng,
}

impl Machine {
    /// Creates a machine with the font installed and an empty program, seeding the
    /// random source from the OS.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    /// Like [`Machine::new`] but with a reproducible random source.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        let mut machine = Machine {
            memory: [0; MEMORY_SIZE],
            display: [[false; DISPLAY_X]; DISPLAY_Y],
            pc: PROGRAM_START_ADDRESS as u16,
            i: 0,
            v: [0; 16],
            stack: Vec::new(),
            delay_timer: 0,
            sound_timer: 0,
            state: MachineState::Running,
            keypad: [false; 16],
            rng,
        };
        machine.memory[FONT_START_ADDRESS..FONT_END_ADDRESS].copy_from_slice(&FONT);
        machine
    }

    /// Installs a program image and resets all execution state.
    ///
    /// Memory is zeroed, the font table is written at 0x50 and the image is copied to 0x200.
    /// The keypad is left alone since it mirrors host input. On error the machine is unchanged.
    pub fn load(&mut self, image: &[u8]) -> Result<(), MachineError> {
        if image.len() > MAX_PROGRAM_SIZE {
            return Err(MachineError::ImageTooLarge {
                size: image.len(),
                max_size: MAX_PROGRAM_SIZE,
            });
        }

        self.memory = [0; MEMORY_SIZE];
        self.memory[FONT_START_ADDRESS..FONT_END_ADDRESS].copy_from_slice(&FONT);

        let image_end = PROGRAM_START_ADDRESS + image.len();
        self.memory[PROGRAM_START_ADDRESS..image_end].copy_from_slice(image);

        self.pc = PROGRAM_START_ADDRESS as u16;
        self.i = 0;
        self.v = [0; 16];
        self.stack.clear();
        self.delay_timer = 0;
        self.sound_timer = 0;
        self.display = [[false; DISPLAY_X]; DISPLAY_Y];
        self.state = MachineState::Running;

        log::debug!("Loaded {} byte program image", image.len());
        Ok(())
    }

    /// Runs one fetch-decode-execute cycle.
    ///
    /// While a key wait is pending this only polls the keypad and never fetches.
    pub fn step(&mut self) -> Result<(), MachineError> {
        if let MachineState::AwaitingKey { target } = self.state {
            self.poll_key_wait(target);
            return Ok(());
        }

        let address = self.pc;
        let raw = self.fetch()?;
        self.pc = self.pc.wrapping_add(2);

        let opcode = Opcode::decode(raw);
        log::trace!("{address:#05X}: {raw:04X} {opcode}");
        self.execute(opcode)
    }

    /// Decrements the delay and sound timers, floored at zero. Should be called at 60Hz.
    pub fn tick_timers(&mut self) {
        self.delay_timer = self.delay_timer.saturating_sub(1);
        self.sound_timer = self.sound_timer.saturating_sub(1);
    }

    /// Returns true if the sound timer is greater than zero, indicating a beep should be played.
    pub fn should_beep(&self) -> bool {
        self.sound_timer > 0
    }

    /// Set the state of a key on the keypad.
    pub fn set_key(&mut self, key: u4, pressed: bool) {
        self.keypad[key] = pressed;
    }

    pub fn keypad(&self) -> &[bool; 16] {
        &self.keypad
    }

    pub fn keypad_mut(&mut self) -> &mut [bool; 16] {
        &mut self.keypad
    }

    pub fn display(&self) -> &Display<bool> {
        &self.display
    }

    /// Get the state of a pixel on the display (true = on, false = off).
    pub fn pixel(&self, x: usize, y: usize) -> bool {
        self.display[y][x]
    }

    pub fn delay_timer(&self) -> u8 {
        self.delay_timer
    }

    pub fn sound_timer(&self) -> u8 {
        self.sound_timer
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn index(&self) -> u16 {
        self.i
    }

    pub fn registers(&self) -> &[u8; 16] {
        &self.v
    }

    pub fn stack(&self) -> &[u16] {
        &self.stack
    }

    pub fn memory(&self) -> &[u8; MEMORY_SIZE] {
        &self.memory
    }

    pub fn state(&self) -> MachineState {
        self.state
    }

    pub fn is_awaiting_key(&self) -> bool {
        matches!(self.state, MachineState::AwaitingKey { .. })
    }

    /// Fetches the big-endian word at PC. Both bytes must lie inside memory.
    fn fetch(&self) -> Result<u16, MachineError> {
        let pc = usize::from(self.pc);
        if pc + 1 >= MEMORY_SIZE {
            return Err(MachineError::AddressOutOfRange { address: self.pc });
        }

        Ok(u16::from_be_bytes([self.memory[pc], self.memory[pc + 1]]))
    }

    fn poll_key_wait(&mut self, target: u4) {
        if let Some(key) = self.keypad.iter().position(|&pressed| pressed) {
            self.v[target] = key as u8;
            self.state = MachineState::Running;
        }
    }

    /// Bounds checked access to an index-relative memory cell.
    pub(crate) fn mem_get(&mut self, addr: u16) -> Result<&mut u8, MachineError> {
        self.memory
            .get_mut(usize::from(addr))
            .ok_or(MachineError::AddressOutOfRange { address: addr })
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_installs_font_and_image() {
        let mut machine = Machine::with_seed(1);
        machine.load(&[0x12, 0x34, 0x56]).unwrap();

        assert_eq!(machine.pc(), 0x200);
        assert_eq!(&machine.memory()[0x50..0xA0], &FONT[..]);
        assert_eq!(&machine.memory()[0x200..0x203], &[0x12, 0x34, 0x56]);
        assert!(machine.memory()[..0x50].iter().all(|&b| b == 0));
        assert!(machine.memory()[0x203..].iter().all(|&b| b == 0));
    }

    #[test]
    fn load_resets_execution_state() {
        let mut machine = Machine::with_seed(1);
        machine.pc = 0x345;
        machine.i = 0x111;
        machine.v[3] = 9;
        machine.stack.push(0x202);
        machine.delay_timer = 4;
        machine.sound_timer = 5;
        machine.display[1][2] = true;
        machine.memory[0x900] = 0xAA;
        machine.state = MachineState::AwaitingKey { target: u4::new(2) };

        machine.load(&[]).unwrap();

        assert_eq!(machine.pc(), 0x200);
        assert_eq!(machine.index(), 0);
        assert_eq!(machine.registers(), &[0; 16]);
        assert!(machine.stack().is_empty());
        assert_eq!(machine.delay_timer(), 0);
        assert_eq!(machine.sound_timer(), 0);
        assert!(!machine.pixel(2, 1));
        assert_eq!(machine.memory()[0x900], 0);
        assert_eq!(machine.state(), MachineState::Running);
    }

    #[test]
    fn load_accepts_largest_image_and_rejects_larger() {
        let mut machine = Machine::with_seed(1);
        assert!(machine.load(&vec![0xEE; MAX_PROGRAM_SIZE]).is_ok());
        assert_eq!(machine.memory()[MEMORY_SIZE - 1], 0xEE);

        machine.v[0] = 7;
        let err = machine.load(&vec![0; MAX_PROGRAM_SIZE + 1]).unwrap_err();
        assert_eq!(
            err,
            MachineError::ImageTooLarge {
                size: MAX_PROGRAM_SIZE + 1,
                max_size: MAX_PROGRAM_SIZE
            }
        );
        // Rejected load leaves the machine untouched
        assert_eq!(machine.v[0], 7);
        assert_eq!(machine.memory()[MEMORY_SIZE - 1], 0xEE);
    }

    #[test]
    fn fetch_boundary_at_end_of_memory() {
        let mut machine = Machine::with_seed(1);
        machine.memory[4094] = 0x60;
        machine.memory[4095] = 0x2A;

        machine.pc = 4094;
        assert!(machine.step().is_ok());
        assert_eq!(machine.v[0], 0x2A);

        machine.pc = 4095;
        assert_eq!(
            machine.step(),
            Err(MachineError::AddressOutOfRange { address: 4095 })
        );

        machine.pc = 0xFFFF;
        assert_eq!(
            machine.step(),
            Err(MachineError::AddressOutOfRange { address: 0xFFFF })
        );
    }

    #[test]
    fn timers_floor_at_zero() {
        let mut machine = Machine::with_seed(1);
        machine.delay_timer = 2;
        machine.sound_timer = 1;
        assert!(machine.should_beep());

        machine.tick_timers();
        assert_eq!((machine.delay_timer(), machine.sound_timer()), (1, 0));
        assert!(!machine.should_beep());

        machine.tick_timers();
        machine.tick_timers();
        assert_eq!((machine.delay_timer(), machine.sound_timer()), (0, 0));
    }

    #[test]
    fn key_wait_polls_in_ascending_order() {
        let mut machine = Machine::with_seed(1);
        machine.state = MachineState::AwaitingKey { target: u4::new(5) };
        machine.set_key(u4::new(0xC), true);
        machine.set_key(u4::new(0x4), true);
        let pc = machine.pc();

        machine.step().unwrap();

        assert_eq!(machine.v[5], 0x4);
        assert_eq!(machine.pc(), pc);
        assert!(!machine.is_awaiting_key());
    }

    #[test]
    fn keypad_mut_writes_through() {
        let mut machine = Machine::with_seed(1);
        machine.keypad_mut()[0xA] = true;
        assert!(machine.keypad()[0xA]);
        machine.set_key(u4::new(0xA), false);
        assert!(!machine.keypad()[0xA]);
    }
}
