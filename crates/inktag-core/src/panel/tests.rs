use std::{boxed::Box, thread, vec, vec::Vec};

use gdey0154z90::protocol::BUFFER_SIZE;

use super::*;
use crate::{
    bitmap::{BitmapError, PlaneKind},
    image_store::{
        PartitionImageStore,
        testing::{MemStorage, pack},
    },
    job::PanelJob,
    signal::CompletionSignal,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Op {
    Init,
    Frames,
    Bitmap,
    Clear,
    Refresh,
    PowerOff,
    Hibernate,
}

#[derive(Default)]
struct MockPanel {
    asleep: bool,
    fail_refresh: bool,
    ops: Vec<Op>,
    black: Vec<u8>,
    red: Vec<u8>,
}

impl EpaperPanel for MockPanel {
    type Error = &'static str;

    fn is_asleep(&self) -> bool {
        self.asleep
    }

    fn init(&mut self) -> Result<(), Self::Error> {
        self.asleep = false;
        self.ops.push(Op::Init);
        Ok(())
    }

    fn write_frames(&mut self, black: &FrameBuffer, red: &FrameBuffer) -> Result<(), Self::Error> {
        self.ops.push(Op::Frames);
        self.black = black.bytes().to_vec();
        self.red = red.bytes().to_vec();
        Ok(())
    }

    fn write_bitmap_planes(
        &mut self,
        black: &[u8; BUFFER_SIZE],
        red: &[u8; BUFFER_SIZE],
    ) -> Result<(), Self::Error> {
        self.ops.push(Op::Bitmap);
        self.black = black.to_vec();
        self.red = red.to_vec();
        Ok(())
    }

    fn clear(&mut self) -> Result<(), Self::Error> {
        self.ops.push(Op::Clear);
        Ok(())
    }

    fn refresh(&mut self) -> Result<(), Self::Error> {
        self.ops.push(Op::Refresh);
        if self.fail_refresh {
            return Err("busy timeout");
        }
        Ok(())
    }

    fn power_off(&mut self) -> Result<(), Self::Error> {
        self.ops.push(Op::PowerOff);
        Ok(())
    }

    fn hibernate(&mut self) -> Result<(), Self::Error> {
        self.asleep = true;
        self.ops.push(Op::Hibernate);
        Ok(())
    }
}

type Worker = PanelWorker<MockPanel, PartitionImageStore<MemStorage>>;

fn worker(files: &[(&str, &[u8])]) -> Worker {
    let store = PartitionImageStore::new(MemStorage(pack(files)));
    PanelWorker::new(MockPanel::default(), store, WorkerConfig::default())
}

fn signal() -> &'static CompletionSignal {
    Box::leak(Box::new(CompletionSignal::new()))
}

fn job(command: PanelCommand, signal: &'static CompletionSignal) -> PanelJob {
    PanelJob { command, signal }
}

/// Panel-sized 1bpp bitmap: white everywhere except the top-left pixel,
/// which is ink.
fn panel_bmp(width: u32) -> Vec<u8> {
    let height = 200u32;
    let stride = width.div_ceil(8).div_ceil(4) as usize * 4;
    let data_offset = 62u32;

    let mut out = Vec::new();
    out.extend_from_slice(b"BM");
    out.extend_from_slice(&(data_offset + stride as u32 * height).to_le_bytes());
    out.extend_from_slice(&[0; 4]);
    out.extend_from_slice(&data_offset.to_le_bytes());
    out.extend_from_slice(&40u32.to_le_bytes());
    out.extend_from_slice(&width.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&(stride as u32 * height).to_le_bytes());
    out.extend_from_slice(&[0; 16]);
    out.extend_from_slice(&[0, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0]);

    for stored in 0..height {
        let mut row = vec![0xFF; stride];
        if stored == height - 1 {
            row[0] = 0xFE;
        }
        out.extend_from_slice(&row);
    }
    out
}

#[test]
fn initialize_clears_and_powers_off() {
    let mut worker = worker(&[]);
    let done = signal();
    done.set_waiting();

    assert_eq!(worker.run(job(PanelCommand::Initialize, done)), JobOutcome::Done);
    assert_eq!(worker.panel().ops, [Op::Init, Op::Clear, Op::PowerOff]);
    assert!(done.completed());
}

#[test]
fn each_tag_style_draws_into_its_own_plane() {
    let mut worker = worker(&[]);

    worker.run(job(PanelCommand::PrintTag(TagStyle::Black), signal()));
    assert!(worker.panel().black.iter().any(|b| *b != 0));
    assert!(worker.panel().red.iter().all(|b| *b == 0));

    worker.run(job(PanelCommand::PrintTag(TagStyle::Red), signal()));
    assert!(worker.panel().black.iter().all(|b| *b == 0));
    assert!(worker.panel().red.iter().any(|b| *b != 0));

    worker.run(job(PanelCommand::PrintTag(TagStyle::Blank), signal()));
    assert!(worker.panel().black.iter().all(|b| *b == 0));
    assert!(worker.panel().red.iter().all(|b| *b == 0));

    assert_eq!(
        &worker.panel().ops[..3],
        [Op::Frames, Op::Refresh, Op::PowerOff]
    );
}

#[test]
fn hibernated_panel_is_woken_before_drawing() {
    let mut worker = worker(&[]);
    worker.run(job(PanelCommand::Hibernate, signal()));
    worker.panel_mut().ops.clear();

    worker.run(job(PanelCommand::Wipe, signal()));
    assert_eq!(worker.panel().ops, [Op::Init, Op::Clear, Op::PowerOff]);
}

#[test]
fn show_image_writes_decoded_planes() {
    let bmp = panel_bmp(200);
    let mut worker = worker(&[("logo.b.bmp", bmp.as_slice()), ("logo.r.bmp", bmp.as_slice())]);
    let name = ImageName::try_from("logo").unwrap();

    let outcome = worker.run(job(PanelCommand::ShowImage(name), signal()));

    assert_eq!(outcome, JobOutcome::Done);
    assert_eq!(worker.panel().ops, [Op::Bitmap, Op::Refresh, Op::PowerOff]);
    assert_eq!(worker.panel().black[0], 0x7F);
    assert_eq!(worker.panel().black[1], 0xFF);
    assert_eq!(worker.panel().red.len(), BUFFER_SIZE);
}

#[test]
fn rejected_bitmap_never_touches_the_panel() {
    let wide = panel_bmp(208);
    let good = panel_bmp(200);
    let mut worker = worker(&[
        ("wide.b.bmp", wide.as_slice()),
        ("wide.r.bmp", wide.as_slice()),
        ("half.b.bmp", good.as_slice()),
    ]);

    let done = signal();
    let outcome = worker.run(job(
        PanelCommand::ShowImage(ImageName::try_from("wide").unwrap()),
        done,
    ));
    assert_eq!(
        outcome,
        JobOutcome::BitmapRejected(BitmapError::SizeMismatch {
            width: 208,
            height: 200
        })
    );
    assert!(done.completed());

    let outcome = worker.run(job(
        PanelCommand::ShowImage(ImageName::try_from("half").unwrap()),
        signal(),
    ));
    assert_eq!(
        outcome,
        JobOutcome::BitmapRejected(BitmapError::Missing(PlaneKind::Red))
    );
    assert!(worker.panel().ops.is_empty());
}

#[test]
fn driver_failure_still_releases_the_signal() {
    let mut worker = worker(&[]);
    worker.panel_mut().fail_refresh = true;
    let done = signal();
    done.set_waiting();

    let outcome = worker.run(job(PanelCommand::PrintTag(TagStyle::Red), done));

    assert_eq!(outcome, JobOutcome::PanelFailed);
    assert!(done.completed());
}

#[test]
fn job_on_another_thread_completes_the_signal() {
    let done = signal();
    done.set_waiting();

    let handle = thread::spawn(move || {
        let mut worker = worker(&[]);
        worker.run(job(PanelCommand::Initialize, done))
    });

    while done.pending() {
        thread::yield_now();
    }
    assert_eq!(handle.join().unwrap(), JobOutcome::Done);
}
