#![cfg_attr(not(test), no_std)]

//! GDEY0154Z90 (1.54" 200x200 black/white/red e-paper, SSD1681) driver primitives.

mod framebuffer;
pub mod protocol;

#[cfg(feature = "embedded-graphics")]
mod graphics;

pub use framebuffer::{FrameBuffer, Rotation};
pub use protocol::Plane;

use embedded_hal::{
    delay::DelayNs,
    digital::{InputPin, OutputPin},
    spi::SpiDevice,
};
use log::debug;

use protocol::{BUFFER_SIZE, InitStep};

/// Bytes converted per SPI write when streaming a plane.
const STREAM_CHUNK: usize = 64;

/// Driver configuration.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Config {
    /// Expected SPI clock in Hz (documented for board glue).
    pub spi_hz: u32,
    /// Upper bound for a single BUSY wait; a tri-color full refresh takes ~15 s.
    pub busy_timeout_ms: u32,
    /// Low and high time of the RST pulse.
    pub reset_pulse_ms: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            spi_hz: 4_000_000,
            busy_timeout_ms: 30_000,
            reset_pulse_ms: 10,
        }
    }
}

/// How set bits in a source plane are interpreted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PixelEncoding {
    /// A set bit is ink (the [`FrameBuffer`] convention).
    InkSet,
    /// A cleared bit is ink (1bpp bitmaps drawn dark on a light background).
    InkClear,
}

/// Driver errors.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Error<SpiErr, PinErr> {
    /// SPI transaction failed.
    Spi(SpiErr),
    /// DC, RST or BUSY pin operation failed.
    Pin(PinErr),
    /// BUSY stayed asserted longer than [`Config::busy_timeout_ms`].
    BusyTimeout,
}

pub type DriverResult<SpiErr, PinErr> = Result<(), Error<SpiErr, PinErr>>;

/// GDEY0154Z90 driver.
#[derive(Debug)]
pub struct Gdey0154z90<SPI, DC, RST, BUSY> {
    spi: SPI,
    dc: DC,
    rst: RST,
    busy: BUSY,
    config: Config,
    asleep: bool,
}

impl<SPI, DC, RST, BUSY, PinErr> Gdey0154z90<SPI, DC, RST, BUSY>
where
    SPI: SpiDevice<u8>,
    DC: OutputPin<Error = PinErr>,
    RST: OutputPin<Error = PinErr>,
    BUSY: InputPin<Error = PinErr>,
{
    /// Creates a new driver instance. The controller is not touched.
    pub fn new(spi: SPI, dc: DC, rst: RST, busy: BUSY, config: Config) -> Self {
        Self {
            spi,
            dc,
            rst,
            busy,
            config,
            asleep: true,
        }
    }

    /// Returns current configuration.
    pub fn config(&self) -> Config {
        self.config
    }

    /// Returns `true` after [`Self::hibernate`] until the next [`Self::init`].
    pub fn is_asleep(&self) -> bool {
        self.asleep
    }

    /// Releases owned bus and pins.
    pub fn release(self) -> (SPI, DC, RST, BUSY) {
        (self.spi, self.dc, self.rst, self.busy)
    }

    /// Reads the BUSY line (high while the controller works).
    pub fn is_busy(&mut self) -> Result<bool, Error<SPI::Error, PinErr>> {
        self.busy.is_high().map_err(Error::Pin)
    }

    /// Polls BUSY every millisecond until released or the timeout expires.
    pub fn wait_until_idle(&mut self, delay: &mut impl DelayNs) -> DriverResult<SPI::Error, PinErr> {
        let mut waited_ms = 0u32;
        while self.is_busy()? {
            if waited_ms >= self.config.busy_timeout_ms {
                return Err(Error::BusyTimeout);
            }
            delay.delay_ms(1);
            waited_ms += 1;
        }

        Ok(())
    }

    /// Pulses RST, which also wakes the controller from deep sleep.
    pub fn hard_reset(&mut self, delay: &mut impl DelayNs) -> DriverResult<SPI::Error, PinErr> {
        self.rst.set_low().map_err(Error::Pin)?;
        delay.delay_ms(self.config.reset_pulse_ms);
        self.rst.set_high().map_err(Error::Pin)?;
        delay.delay_ms(self.config.reset_pulse_ms);
        Ok(())
    }

    /// Resets the controller and runs [`protocol::INIT_SEQUENCE`].
    pub fn init(&mut self, delay: &mut impl DelayNs) -> DriverResult<SPI::Error, PinErr> {
        debug!("gdey0154z90: init");
        self.hard_reset(delay)?;

        for step in protocol::INIT_SEQUENCE {
            match *step {
                InitStep::Cmd(cmd) => self.command(cmd)?,
                InitStep::CmdData(cmd, data) => self.command_with_data(cmd, data)?,
                InitStep::WaitUntilIdle => self.wait_until_idle(delay)?,
            }
        }

        self.asleep = false;
        Ok(())
    }

    /// Streams one full plane into controller RAM.
    pub fn write_plane(
        &mut self,
        plane: Plane,
        bytes: &[u8; BUFFER_SIZE],
        encoding: PixelEncoding,
    ) -> DriverResult<SPI::Error, PinErr> {
        self.reset_ram_cursor()?;
        self.command(plane.write_command())?;

        let mut scratch = [0u8; STREAM_CHUNK];
        for chunk in bytes.chunks(STREAM_CHUNK) {
            for (dst, src) in scratch.iter_mut().zip(chunk) {
                let ink = match encoding {
                    PixelEncoding::InkSet => *src,
                    PixelEncoding::InkClear => !*src,
                };
                *dst = plane.encode_ink(ink);
            }
            self.data(&scratch[..chunk.len()])?;
        }

        Ok(())
    }

    /// Fills one plane with no ink.
    pub fn blank_plane(&mut self, plane: Plane) -> DriverResult<SPI::Error, PinErr> {
        self.reset_ram_cursor()?;
        self.command(plane.write_command())?;

        let scratch = [plane.blank_byte(); STREAM_CHUNK];
        let mut remaining = BUFFER_SIZE;
        while remaining > 0 {
            let len = remaining.min(STREAM_CHUNK);
            self.data(&scratch[..len])?;
            remaining -= len;
        }

        Ok(())
    }

    /// Writes both planes from ink buffers.
    pub fn write_frames(
        &mut self,
        black: &FrameBuffer,
        red: &FrameBuffer,
    ) -> DriverResult<SPI::Error, PinErr> {
        self.write_plane(Plane::BlackWhite, black.bytes(), PixelEncoding::InkSet)?;
        self.write_plane(Plane::Red, red.bytes(), PixelEncoding::InkSet)
    }

    /// Runs a full refresh from RAM and waits for it to finish.
    pub fn refresh(&mut self, delay: &mut impl DelayNs) -> DriverResult<SPI::Error, PinErr> {
        debug!("gdey0154z90: full refresh");
        self.command_with_data(protocol::DISPLAY_UPDATE_CTRL2, &[protocol::UPDATE_FULL])?;
        self.command(protocol::MASTER_ACTIVATE)?;
        self.wait_until_idle(delay)
    }

    /// Blank white frame on both planes, then a full refresh.
    pub fn clear_screen(&mut self, delay: &mut impl DelayNs) -> DriverResult<SPI::Error, PinErr> {
        self.blank_plane(Plane::BlackWhite)?;
        self.blank_plane(Plane::Red)?;
        self.refresh(delay)
    }

    /// Switches off the analog supply and clock; RAM and the image are retained.
    pub fn power_off(&mut self, delay: &mut impl DelayNs) -> DriverResult<SPI::Error, PinErr> {
        self.command_with_data(protocol::DISPLAY_UPDATE_CTRL2, &[protocol::UPDATE_POWER_OFF])?;
        self.command(protocol::MASTER_ACTIVATE)?;
        self.wait_until_idle(delay)
    }

    /// Powers off and enters deep sleep; [`Self::init`] is required afterwards.
    pub fn hibernate(&mut self, delay: &mut impl DelayNs) -> DriverResult<SPI::Error, PinErr> {
        debug!("gdey0154z90: hibernate");
        self.power_off(delay)?;
        self.command_with_data(protocol::DEEP_SLEEP, &[protocol::DEEP_SLEEP_MODE_1])?;
        self.asleep = true;
        Ok(())
    }

    fn reset_ram_cursor(&mut self) -> DriverResult<SPI::Error, PinErr> {
        self.command_with_data(protocol::SET_RAM_X_COUNTER, &protocol::RAM_X_ORIGIN)?;
        self.command_with_data(protocol::SET_RAM_Y_COUNTER, &protocol::RAM_Y_ORIGIN)
    }

    fn command(&mut self, cmd: u8) -> DriverResult<SPI::Error, PinErr> {
        self.dc.set_low().map_err(Error::Pin)?;
        self.spi.write(&[cmd]).map_err(Error::Spi)
    }

    fn data(&mut self, data: &[u8]) -> DriverResult<SPI::Error, PinErr> {
        self.dc.set_high().map_err(Error::Pin)?;
        self.spi.write(data).map_err(Error::Spi)
    }

    fn command_with_data(&mut self, cmd: u8, data: &[u8]) -> DriverResult<SPI::Error, PinErr> {
        self.command(cmd)?;
        self.data(data)
    }
}
