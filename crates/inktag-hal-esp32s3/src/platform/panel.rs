use embedded_hal::{
    delay::DelayNs,
    digital::{InputPin, OutputPin},
    spi::SpiDevice,
};
use gdey0154z90::{
    Error, FrameBuffer, Gdey0154z90, PixelEncoding, Plane, protocol::BUFFER_SIZE,
};
use inktag_core::panel::EpaperPanel;

/// Board-level adapter binding the GDEY0154Z90 driver to a delay source.
#[derive(Debug)]
pub struct EpaperDisplay<SPI, DC, RST, BUSY, D> {
    driver: Gdey0154z90<SPI, DC, RST, BUSY>,
    delay: D,
}

impl<SPI, DC, RST, BUSY, D> EpaperDisplay<SPI, DC, RST, BUSY, D> {
    pub fn new(driver: Gdey0154z90<SPI, DC, RST, BUSY>, delay: D) -> Self {
        Self { driver, delay }
    }
}

impl<SPI, DC, RST, BUSY, D, PinErr> EpaperPanel for EpaperDisplay<SPI, DC, RST, BUSY, D>
where
    SPI: SpiDevice<u8>,
    DC: OutputPin<Error = PinErr>,
    RST: OutputPin<Error = PinErr>,
    BUSY: InputPin<Error = PinErr>,
    D: DelayNs,
    PinErr: core::fmt::Debug,
{
    type Error = Error<SPI::Error, PinErr>;

    fn is_asleep(&self) -> bool {
        self.driver.is_asleep()
    }

    fn init(&mut self) -> Result<(), Self::Error> {
        self.driver.init(&mut self.delay)
    }

    fn write_frames(&mut self, black: &FrameBuffer, red: &FrameBuffer) -> Result<(), Self::Error> {
        self.driver.write_frames(black, red)
    }

    fn write_bitmap_planes(
        &mut self,
        black: &[u8; BUFFER_SIZE],
        red: &[u8; BUFFER_SIZE],
    ) -> Result<(), Self::Error> {
        self.driver
            .write_plane(Plane::BlackWhite, black, PixelEncoding::InkClear)?;
        self.driver
            .write_plane(Plane::Red, red, PixelEncoding::InkClear)
    }

    fn clear(&mut self) -> Result<(), Self::Error> {
        self.driver.clear_screen(&mut self.delay)
    }

    fn refresh(&mut self) -> Result<(), Self::Error> {
        self.driver.refresh(&mut self.delay)
    }

    fn power_off(&mut self) -> Result<(), Self::Error> {
        self.driver.power_off(&mut self.delay)
    }

    fn hibernate(&mut self) -> Result<(), Self::Error> {
        self.driver.hibernate(&mut self.delay)
    }
}
