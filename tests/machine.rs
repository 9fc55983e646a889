use chip8_machine::{
    DISPLAY_X, DISPLAY_Y, FONT, Machine, MachineError, MachineState, PROGRAM_START_ADDRESS, u4,
};

/// Flattens instruction words into a big-endian program image.
fn assemble(words: &[u16]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_be_bytes()).collect()
}

fn boot(words: &[u16]) -> Machine {
    let mut machine = Machine::with_seed(42);
    machine.load(&assemble(words)).unwrap();
    machine
}

fn run(machine: &mut Machine, steps: usize) {
    for _ in 0..steps {
        machine.step().unwrap();
    }
}

fn lit_pixels(machine: &Machine) -> Vec<(usize, usize)> {
    let mut lit = Vec::new();
    for y in 0..DISPLAY_Y {
        for x in 0..DISPLAY_X {
            if machine.pixel(x, y) {
                lit.push((x, y));
            }
        }
    }
    lit
}

#[test]
fn load_places_font_and_program_counter() {
    let machine = boot(&[0x00E0]);
    assert_eq!(machine.pc(), PROGRAM_START_ADDRESS as u16);
    assert_eq!(&machine.memory()[0x50..0xA0], &FONT[..]);
    assert_eq!(machine.memory()[0x50..0x55], [0xF0, 0x90, 0x90, 0x90, 0xF0]);
    assert_eq!(machine.memory()[0x9B..0xA0], [0xF0, 0x80, 0xF0, 0x80, 0x80]);
}

#[test]
fn oversized_image_is_rejected() {
    let mut machine = Machine::with_seed(42);
    let result = machine.load(&vec![0; 4096 - 0x200 + 1]);
    assert!(matches!(
        result,
        Err(MachineError::ImageTooLarge { size: 3585, max_size: 3584 })
    ));
}

#[test]
fn clear_display_turns_every_pixel_off() {
    // Draw the "8" glyph, then clear
    let mut machine = boot(&[0x6008, 0xF029, 0xD005, 0x00E0]);
    run(&mut machine, 3);
    assert!(!lit_pixels(&machine).is_empty());

    run(&mut machine, 1);
    assert!(lit_pixels(&machine).is_empty());
}

#[test]
fn delay_timer_round_trips_through_registers() {
    for (x, y, nn) in [(0x0, 0x1, 0x00), (0x3, 0xA, 0x7F), (0xE, 0x2, 0xFF)] {
        let mut machine = boot(&[0x6000 | x << 8 | nn, 0xF015 | x << 8, 0xF007 | y << 8]);
        run(&mut machine, 3);
        assert_eq!(machine.registers()[y as usize], nn as u8);
        assert_eq!(machine.delay_timer(), nn as u8);
    }
}

#[test]
fn drawing_a_sprite_twice_erases_it_and_flags_collision() {
    // LD V0, 12 / LD V1, 7 / LD VA, 3 / LD F, VA / DRW V0, V1, 5 (twice)
    let mut machine = boot(&[0x600C, 0x6107, 0x6A03, 0xFA29, 0xD015, 0xD015]);
    run(&mut machine, 5);
    let first = lit_pixels(&machine);
    assert!(!first.is_empty());
    assert_eq!(machine.registers()[0xF], 0);

    run(&mut machine, 1);
    assert!(lit_pixels(&machine).is_empty());
    assert_eq!(machine.registers()[0xF], 1);
}

#[test]
fn horizontal_wraparound() {
    // LD I, 0x208 / LD V0, 60 / LD V1, 0 / DRW V0, V1, 1 / sprite row 0xFF
    let mut machine = boot(&[0xA208, 0x603C, 0x6100, 0xD011, 0xFF00]);
    run(&mut machine, 4);

    let mut lit = lit_pixels(&machine);
    lit.sort();
    let expected: Vec<(usize, usize)> =
        [0, 1, 2, 3, 60, 61, 62, 63].iter().map(|&x| (x, 0)).collect();
    assert_eq!(lit, expected);
}

#[test]
fn vertical_wraparound() {
    // LD I, 0x208 / LD V0, 0 / LD V1, 30 / DRW V0, V1, 4 / four rows of 0x80
    let mut machine = boot(&[0xA208, 0x6000, 0x611E, 0xD014, 0x8080, 0x8080]);
    run(&mut machine, 4);

    let rows: Vec<usize> = lit_pixels(&machine).iter().map(|&(_, y)| y).collect();
    assert_eq!(rows, vec![0, 1, 30, 31]);
    assert!(lit_pixels(&machine).iter().all(|&(x, _)| x == 0));
}

#[test]
fn add_registers_reports_carry() {
    let mut machine = boot(&[0x61FA, 0x620A, 0x8124, 0x630A, 0x640A, 0x8344]);
    run(&mut machine, 3);
    assert_eq!(machine.registers()[1], 4);
    assert_eq!(machine.registers()[0xF], 1);

    run(&mut machine, 3);
    assert_eq!(machine.registers()[3], 20);
    assert_eq!(machine.registers()[0xF], 0);
}

#[test]
fn subtract_registers_reports_no_borrow() {
    let mut machine = boot(&[0x6105, 0x620A, 0x8125, 0x630A, 0x6405, 0x8345]);
    run(&mut machine, 3);
    assert_eq!(machine.registers()[1], 251);
    assert_eq!(machine.registers()[0xF], 0);

    run(&mut machine, 3);
    assert_eq!(machine.registers()[3], 5);
    assert_eq!(machine.registers()[0xF], 1);
}

#[test]
fn key_wait_spins_until_a_key_is_pressed() {
    // LD V3, K / LD V4, 0x11
    let mut machine = boot(&[0xF30A, 0x6411]);
    run(&mut machine, 1);
    assert_eq!(machine.state(), MachineState::AwaitingKey { target: u4::new(3) });

    let pc = machine.pc();
    let registers = *machine.registers();
    for _ in 0..10 {
        assert_eq!(machine.step(), Ok(()));
        assert_eq!(machine.pc(), pc);
        assert_eq!(machine.registers(), &registers);
    }

    machine.set_key(u4::new(7), true);
    run(&mut machine, 1);
    assert_eq!(machine.registers()[3], 7);
    assert_eq!(machine.pc(), pc);
    assert_eq!(machine.state(), MachineState::Running);

    run(&mut machine, 1);
    assert_eq!(machine.registers()[4], 0x11);
    assert_eq!(machine.pc(), pc + 2);
}

#[test]
fn call_and_return_resume_after_the_call() {
    // 0x200: CALL 0x206 / 0x202: LD V0, 1 / 0x204: JP 0x204 / 0x206: RET
    let mut machine = boot(&[0x2206, 0x6001, 0x1204, 0x00EE]);
    run(&mut machine, 1);
    assert_eq!(machine.pc(), 0x206);
    assert_eq!(machine.stack(), &[0x202]);

    run(&mut machine, 1);
    assert_eq!(machine.pc(), 0x202);
    assert!(machine.stack().is_empty());

    run(&mut machine, 1);
    assert_eq!(machine.registers()[0], 1);
}

#[test]
fn return_without_call_underflows() {
    let mut machine = boot(&[0x00EE]);
    assert_eq!(machine.step(), Err(MachineError::StackUnderflow));
}

#[test]
fn fetch_fails_only_past_the_last_word() {
    // 0x200: JP 0xFFC / 0xFFC: JP 0xFFE / 0xFFE: LD V5, 0x5A
    let mut image = vec![0u8; 4096 - 0x200];
    image[..2].copy_from_slice(&assemble(&[0x1FFC]));
    let len = image.len();
    image[len - 4..].copy_from_slice(&assemble(&[0x1FFE, 0x655A]));

    let mut machine = Machine::with_seed(42);
    machine.load(&image).unwrap();

    run(&mut machine, 2);
    assert_eq!(machine.pc(), 4094);
    run(&mut machine, 1);
    assert_eq!(machine.registers()[5], 0x5A);
    assert_eq!(
        machine.step(),
        Err(MachineError::AddressOutOfRange { address: 0x1000 })
    );
}

#[test]
fn self_modifying_code_is_fetched_fresh() {
    // 0x200: LD I, 0x20A / LD V0, 0x62 / LD V1, 0x99 / LD [I], V1 / 0x208: JP 0x20A
    // 0x20A: placeholder overwritten with LD V2, 0x99
    let mut machine = boot(&[0xA20A, 0x6062, 0x6199, 0xF155, 0x120A, 0x0000]);
    run(&mut machine, 5);
    assert_eq!(machine.memory()[0x20A..0x20C], [0x62, 0x99]);

    machine.step().unwrap();
    assert_eq!(machine.registers()[2], 0x99);
    assert_eq!(machine.pc(), 0x20C);
}

#[test]
fn unknown_opcodes_only_advance_the_program_counter() {
    let mut machine = boot(&[0x0123, 0x5121, 0x8008, 0xE0FF, 0xF0FF]);
    run(&mut machine, 5);
    assert_eq!(machine.pc(), 0x20A);
    assert_eq!(machine.registers(), &[0; 16]);
}

#[test]
fn timers_are_only_changed_by_ticks_and_loads() {
    // LD V0, 3 / LD DT, V0 / LD ST, V0 / JP 0x206
    let mut machine = boot(&[0x6003, 0xF015, 0xF018, 0x1206]);
    run(&mut machine, 3);
    assert!(machine.should_beep());

    run(&mut machine, 50);
    assert_eq!((machine.delay_timer(), machine.sound_timer()), (3, 3));

    for _ in 0..5 {
        machine.tick_timers();
    }
    assert_eq!((machine.delay_timer(), machine.sound_timer()), (0, 0));
    assert!(!machine.should_beep());
}
