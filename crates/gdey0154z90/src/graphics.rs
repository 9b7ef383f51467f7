use core::convert::Infallible;

use embedded_graphics_core::{
    Pixel,
    draw_target::DrawTarget,
    geometry::{Dimensions, OriginDimensions, Size},
    pixelcolor::BinaryColor,
    primitives::{PointsIter, Rectangle},
};

use crate::{FrameBuffer, protocol};

/// `BinaryColor::On` is ink; the plane decides whether ink is black or red.
impl DrawTarget for FrameBuffer {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        pixels
            .into_iter()
            .filter_map(|Pixel(point, color)| {
                let x = usize::try_from(point.x).ok()?;
                let y = usize::try_from(point.y).ok()?;
                Some((x, y, color.is_on()))
            })
            .for_each(|(x, y, ink)| {
                self.set_pixel(x, y, ink);
            });
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        let area = area.intersection(&self.bounding_box());
        let ink = color.is_on();
        for point in area.points() {
            // Inside the bounding box, so never negative.
            self.set_pixel(point.x as usize, point.y as usize, ink);
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        FrameBuffer::clear(self, color.is_on());
        Ok(())
    }
}

impl OriginDimensions for FrameBuffer {
    fn size(&self) -> Size {
        const SIZE: Size = Size::new(protocol::WIDTH as u32, protocol::HEIGHT as u32);
        SIZE
    }
}
