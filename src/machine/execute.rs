use rand::Rng;

use super::{
    AluOp, DISPLAY_X, DISPLAY_Y, FONT_GLYPH_SIZE, FONT_START_ADDRESS, HARDWARE_STACK_DEPTH,
    Machine, MachineError, MachineState, Opcode,
};
use crate::u4;

impl Machine {
    /// Applies a decoded instruction. PC already points past it.
    pub(crate) fn execute(&mut self, opcode: Opcode) -> Result<(), MachineError> {
        match opcode {
            Opcode::ClearDisplay => {
                self.display = [[false; DISPLAY_X]; DISPLAY_Y];
            }
            Opcode::Return => {
                self.pc = self.stack.pop().ok_or(MachineError::StackUnderflow)?;
            }
            Opcode::Jump { nnn } => {
                self.pc = nnn;
            }
            Opcode::Call { nnn } => {
                self.stack.push(self.pc);
                if self.stack.len() > HARDWARE_STACK_DEPTH {
                    log::warn!(
                        "Call depth {} exceeds the {HARDWARE_STACK_DEPTH} level hardware stack",
                        self.stack.len()
                    );
                }
                self.pc = nnn;
            }
            Opcode::JumpWithOffset { nnn } => {
                self.pc = nnn.wrapping_add(self.v[0].into());
            }
            Opcode::SkipRegEqualImm { x, nn } => {
                self.skip_if(self.v[x] == nn);
            }
            Opcode::SkipRegNotEqualImm { x, nn } => {
                self.skip_if(self.v[x] != nn);
            }
            Opcode::SkipRegEqualReg { x, y } => {
                self.skip_if(self.v[x] == self.v[y]);
            }
            Opcode::SkipRegNotEqualReg { x, y } => {
                self.skip_if(self.v[x] != self.v[y]);
            }
            Opcode::SetRegImm { x, nn } => {
                self.v[x] = nn;
            }
            Opcode::AddRegImm { x, nn } => {
                self.v[x] = self.v[x].wrapping_add(nn);
            }
            Opcode::Alu { x, y, op } => {
                self.execute_alu(x, y, op);
            }
            Opcode::SetIndexImm { nnn } => {
                self.i = nnn;
            }
            Opcode::AddIndexReg { x } => {
                self.i = self.i.wrapping_add(self.v[x].into());
            }
            Opcode::Random { x, nn } => {
                let rand_byte: u8 = self.rng.random();
                self.v[x] = rand_byte & nn;
            }
            Opcode::Draw { x, y, n } => {
                self.execute_draw(x, y, n)?;
            }
            Opcode::SkipIfPressed { x } => {
                self.skip_if(self.keypad[u4::masked(self.v[x])]);
            }
            Opcode::SkipIfNotPressed { x } => {
                self.skip_if(!self.keypad[u4::masked(self.v[x])]);
            }
            Opcode::WaitForKey { x } => {
                self.state = MachineState::AwaitingKey { target: x };
            }
            Opcode::ReadDelayTimer { x } => {
                self.v[x] = self.delay_timer;
            }
            Opcode::SetDelayTimer { x } => {
                self.delay_timer = self.v[x];
            }
            Opcode::SetSoundTimer { x } => {
                self.sound_timer = self.v[x];
            }
            Opcode::FontChar { x } => {
                let digit = usize::from(self.v[x] & 0x0F);
                self.i = (FONT_START_ADDRESS + FONT_GLYPH_SIZE * digit) as u16;
            }
            Opcode::Bcd { x } => {
                let value = self.v[x];
                *self.mem_get(self.i)? = value / 100;
                *self.mem_get(self.i.wrapping_add(1))? = (value / 10) % 10;
                *self.mem_get(self.i.wrapping_add(2))? = value % 10;
            }
            Opcode::StoreRegs { x } => {
                for (offset, reg_index) in (0..=usize::from(x)).enumerate() {
                    *self.mem_get(self.i.wrapping_add(offset as u16))? = self.v[reg_index];
                }
            }
            Opcode::LoadRegs { x } => {
                for (offset, reg_index) in (0..=usize::from(x)).enumerate() {
                    self.v[reg_index] = *self.mem_get(self.i.wrapping_add(offset as u16))?;
                }
            }
            Opcode::Unknown(raw) => {
                log::trace!("Ignoring unknown opcode {raw:#06X}");
            }
        };

        Ok(())
    }

    fn skip_if(&mut self, condition: bool) {
        if condition {
            self.pc = self.pc.wrapping_add(2);
        }
    }

    /// VF is written after the result so a flag wins when x is F.
    fn execute_alu(&mut self, x: u4, y: u4, op: AluOp) {
        match op {
            AluOp::Set => self.v[x] = self.v[y],
            AluOp::Or => self.v[x] |= self.v[y],
            AluOp::And => self.v[x] &= self.v[y],
            AluOp::Xor => self.v[x] ^= self.v[y],
            AluOp::Add => {
                let (res, overflow) = self.v[x].overflowing_add(self.v[y]);
                self.v[x] = res;
                self.v[0xF] = u8::from(overflow);
            }
            AluOp::Sub => {
                let (res, borrow) = self.v[x].overflowing_sub(self.v[y]);
                self.v[x] = res;
                self.v[0xF] = u8::from(!borrow);
            }
            AluOp::SubReverse => {
                let (res, borrow) = self.v[y].overflowing_sub(self.v[x]);
                self.v[x] = res;
                self.v[0xF] = u8::from(!borrow);
            }
            AluOp::ShiftRight => {
                let lsb = self.v[y] & 1;
                self.v[x] = self.v[y] >> 1;
                self.v[0xF] = lsb;
            }
            AluOp::ShiftLeft => {
                let msb = self.v[y] >> 7;
                self.v[x] = self.v[y] << 1;
                self.v[0xF] = msb;
            }
        }
    }

    /// XORs an 8-pixel wide, n-row sprite onto the display, wrapping at both edges.
    fn execute_draw(&mut self, x: u4, y: u4, n: u4) -> Result<(), MachineError> {
        let x_pos = usize::from(self.v[x]) % DISPLAY_X;
        let y_pos = usize::from(self.v[y]) % DISPLAY_Y;
        self.v[0xF] = 0;

        for row in 0..usize::from(n) {
            let sprite_byte = *self.mem_get(self.i.wrapping_add(row as u16))?;
            let py = (y_pos + row) % DISPLAY_Y;

            for col in 0..8 {
                if sprite_byte & (0x80 >> col) == 0 {
                    continue;
                }

                let pixel = &mut self.display[py][(x_pos + col) % DISPLAY_X];
                *pixel ^= true;
                if !*pixel {
                    self.v[0xF] = 1;
                }
            }
        }

        Ok(())
    }
}
