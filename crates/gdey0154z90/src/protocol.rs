//! Command-level protocol helpers for the SSD1681 controller on the
//! GDEY0154Z90 (1.54" 200x200 black/white/red) panel.

/// Panel width in pixels.
pub const WIDTH: usize = 200;
/// Panel height in pixels.
pub const HEIGHT: usize = 200;
/// Number of bytes in one RAM row.
pub const LINE_BYTES: usize = WIDTH.div_ceil(8);
/// Size of one color plane in bytes.
pub const BUFFER_SIZE: usize = LINE_BYTES * HEIGHT;

pub const DRIVER_OUTPUT_CTRL: u8 = 0x01;
pub const DEEP_SLEEP: u8 = 0x10;
pub const DATA_ENTRY_MODE: u8 = 0x11;
pub const SW_RESET: u8 = 0x12;
pub const TEMP_SENSOR_CTRL: u8 = 0x18;
pub const MASTER_ACTIVATE: u8 = 0x20;
pub const DISPLAY_UPDATE_CTRL2: u8 = 0x22;
pub const WRITE_BW_RAM: u8 = 0x24;
pub const WRITE_RED_RAM: u8 = 0x26;
pub const BORDER_WAVEFORM_CTRL: u8 = 0x3C;
pub const SET_RAM_X_WINDOW: u8 = 0x44;
pub const SET_RAM_Y_WINDOW: u8 = 0x45;
pub const SET_RAM_X_COUNTER: u8 = 0x4E;
pub const SET_RAM_Y_COUNTER: u8 = 0x4F;

/// X increment, then Y increment.
pub const DATA_ENTRY_INCREMENT_XY: u8 = 0x03;
/// Border follows the white LUT.
pub const BORDER_WHITE: u8 = 0x05;
/// Use the internal temperature sensor.
pub const INTERNAL_TEMP_SENSOR: u8 = 0x80;
/// Enable clock and analog, load temperature, full refresh, disable analog and clock.
pub const UPDATE_FULL: u8 = 0xF7;
/// Disable analog, then clock.
pub const UPDATE_POWER_OFF: u8 = 0x83;
/// Deep sleep mode 1, RAM retained.
pub const DEEP_SLEEP_MODE_1: u8 = 0x01;

/// One step of the controller bring-up.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InitStep {
    /// Send a bare command byte.
    Cmd(u8),
    /// Send a command with a static payload.
    CmdData(u8, &'static [u8]),
    /// Block until the controller releases BUSY.
    WaitUntilIdle,
}

const DRIVER_OUTPUT: [u8; 3] = driver_output_payload();
const RAM_X_WINDOW: [u8; 2] = ram_x_window();
const RAM_Y_WINDOW: [u8; 4] = ram_y_window();

/// Bring-up sequence run after a hardware reset.
pub const INIT_SEQUENCE: &[InitStep] = &[
    InitStep::Cmd(SW_RESET),
    InitStep::WaitUntilIdle,
    InitStep::CmdData(DRIVER_OUTPUT_CTRL, &DRIVER_OUTPUT),
    InitStep::CmdData(DATA_ENTRY_MODE, &[DATA_ENTRY_INCREMENT_XY]),
    InitStep::CmdData(SET_RAM_X_WINDOW, &RAM_X_WINDOW),
    InitStep::CmdData(SET_RAM_Y_WINDOW, &RAM_Y_WINDOW),
    InitStep::CmdData(BORDER_WAVEFORM_CTRL, &[BORDER_WHITE]),
    InitStep::CmdData(TEMP_SENSOR_CTRL, &[INTERNAL_TEMP_SENSOR]),
    InitStep::WaitUntilIdle,
];

/// `DRIVER_OUTPUT_CTRL` payload: 9-bit gate count minus one, then scan flags.
pub const fn driver_output_payload() -> [u8; 3] {
    let gates = (HEIGHT - 1) as u16;
    [(gates & 0xFF) as u8, ((gates >> 8) & 0x01) as u8, 0x00]
}

/// RAM X window in byte units.
pub const fn ram_x_window() -> [u8; 2] {
    [0x00, (LINE_BYTES - 1) as u8]
}

/// RAM Y window in gate units (little-endian start, end).
pub const fn ram_y_window() -> [u8; 4] {
    let end = (HEIGHT - 1) as u16;
    [0x00, 0x00, (end & 0xFF) as u8, (end >> 8) as u8]
}

/// Counter payloads that point the RAM cursor at the origin.
pub const RAM_X_ORIGIN: [u8; 1] = [0x00];
pub const RAM_Y_ORIGIN: [u8; 2] = [0x00, 0x00];

/// Which controller RAM a plane is written to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Plane {
    /// Black/white RAM: bit set means white.
    BlackWhite,
    /// Red RAM: bit set means red.
    Red,
}

impl Plane {
    pub const fn write_command(self) -> u8 {
        match self {
            Self::BlackWhite => WRITE_BW_RAM,
            Self::Red => WRITE_RED_RAM,
        }
    }

    /// Byte that leaves this plane without ink.
    pub const fn blank_byte(self) -> u8 {
        match self {
            Self::BlackWhite => 0xFF,
            Self::Red => 0x00,
        }
    }

    /// Converts an "ink bit set" byte into the controller's polarity.
    #[inline]
    pub const fn encode_ink(self, ink: u8) -> u8 {
        match self {
            Self::BlackWhite => !ink,
            Self::Red => ink,
        }
    }
}
