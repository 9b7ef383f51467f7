use embedded_graphics::{
    Drawable,
    geometry::Point,
    mono_font::{MonoTextStyle, ascii::FONT_10X20},
    pixelcolor::BinaryColor,
    text::{Alignment, Baseline, Text, TextStyleBuilder},
};
use gdey0154z90::{
    FrameBuffer, Rotation,
    protocol::{HEIGHT, WIDTH},
};
use log::{info, warn};

use super::{EpaperPanel, PanelCommand, TagStyle};
use crate::{
    bitmap::{BitmapDecoder, BitmapError, Geometry},
    image_store::ImageStore,
    job::PanelJob,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WorkerConfig {
    /// Text of the name tag.
    pub tag_text: &'static str,
    /// Orientation used for rendered text.
    pub rotation: Rotation,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tag_text: "inktag",
            rotation: Rotation::Deg90,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JobOutcome {
    Done,
    PanelFailed,
    /// The bitmap pair was refused before anything reached the panel.
    BitmapRejected(BitmapError),
}

/// Owns the panel and the frame buffers for the lifetime of the firmware;
/// only the job context calls into it.
pub struct PanelWorker<P, S> {
    panel: P,
    images: S,
    decoder: BitmapDecoder,
    config: WorkerConfig,
    black: FrameBuffer,
    red: FrameBuffer,
}

impl<P, S> PanelWorker<P, S>
where
    P: EpaperPanel,
    S: ImageStore,
{
    pub fn new(panel: P, images: S, config: WorkerConfig) -> Self {
        let mut black = FrameBuffer::new();
        let mut red = FrameBuffer::new();
        black.set_rotation(config.rotation);
        red.set_rotation(config.rotation);

        Self {
            panel,
            images,
            decoder: BitmapDecoder::new(Geometry::new(WIDTH as u16, HEIGHT as u16)),
            config,
            black,
            red,
        }
    }

    pub fn panel(&self) -> &P {
        &self.panel
    }

    pub fn panel_mut(&mut self) -> &mut P {
        &mut self.panel
    }

    /// Executes `job` and releases its signal, whatever the outcome.
    pub fn run(&mut self, job: PanelJob) -> JobOutcome {
        info!("panel: start {:?}", job.command);
        let outcome = self.execute(&job.command);
        match outcome {
            JobOutcome::Done => info!("panel: done {:?}", job.command),
            JobOutcome::PanelFailed => warn!("panel: {:?} failed", job.command),
            JobOutcome::BitmapRejected(err) => {
                warn!("panel: {:?} rejected: {:?}", job.command, err)
            }
        }

        job.signal.signal_complete();
        outcome
    }

    fn execute(&mut self, command: &PanelCommand) -> JobOutcome {
        let result = match command {
            PanelCommand::Initialize => self.initialize(),
            PanelCommand::Wipe => self.wipe(),
            PanelCommand::PrintTag(style) => self.print_tag(*style),
            PanelCommand::ShowImage(name) => return self.show_image(name.as_str()),
            PanelCommand::PowerOff => self.panel.power_off(),
            PanelCommand::Hibernate => self.panel.hibernate(),
        };

        match result {
            Ok(()) => JobOutcome::Done,
            Err(err) => {
                warn!("panel: driver error {:?}", err);
                JobOutcome::PanelFailed
            }
        }
    }

    fn initialize(&mut self) -> Result<(), P::Error> {
        self.panel.init()?;
        self.panel.clear()?;
        self.panel.power_off()
    }

    fn wake(&mut self) -> Result<(), P::Error> {
        if self.panel.is_asleep() {
            self.panel.init()?;
        }
        Ok(())
    }

    fn wipe(&mut self) -> Result<(), P::Error> {
        self.wake()?;
        self.panel.clear()?;
        self.panel.power_off()
    }

    fn print_tag(&mut self, style: TagStyle) -> Result<(), P::Error> {
        self.black.clear(false);
        self.red.clear(false);
        match style {
            TagStyle::Blank => {}
            TagStyle::Black => draw_centered(&mut self.black, self.config.tag_text),
            TagStyle::Red => draw_centered(&mut self.red, self.config.tag_text),
        }

        self.wake()?;
        self.panel.write_frames(&self.black, &self.red)?;
        self.panel.refresh()?;
        self.panel.power_off()
    }

    fn show_image(&mut self, name: &str) -> JobOutcome {
        if let Err(err) = self.decoder.decode_pair(
            &mut self.images,
            name,
            self.black.bytes_mut(),
            self.red.bytes_mut(),
        ) {
            return JobOutcome::BitmapRejected(err);
        }

        let result = self.wake().and_then(|()| {
            self.panel
                .write_bitmap_planes(self.black.bytes(), self.red.bytes())?;
            self.panel.refresh()?;
            self.panel.power_off()
        });

        match result {
            Ok(()) => JobOutcome::Done,
            Err(err) => {
                warn!("panel: driver error {:?}", err);
                JobOutcome::PanelFailed
            }
        }
    }
}

fn draw_centered(frame: &mut FrameBuffer, text: &str) {
    let character = MonoTextStyle::new(&FONT_10X20, BinaryColor::On);
    let layout = TextStyleBuilder::new()
        .alignment(Alignment::Center)
        .baseline(Baseline::Middle)
        .build();
    let center = Point::new(WIDTH as i32 / 2, HEIGHT as i32 / 2);

    let _ = Text::with_text_style(text, center, character, layout).draw(frame);
}
