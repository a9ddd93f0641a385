use anyhow::{anyhow, Result};
use kamera::Camera as KCamera;
use log::warn;
use slint::SharedPixelBuffer;
use std::time::Duration;

use super::desktop::{CaptureFlag, FrameSink};

/// Pulls BGRA frames from a local capture device and pushes them to `sink`
/// as RGBA until `running` is cleared.
pub fn capture_loop(index: usize, running: CaptureFlag, sink: FrameSink) -> Result<()> {
    let camera = match KCamera::new_device(index) {
        None => return Err(anyhow!("camera #{index} does not exist")),
        Some(v) => v,
    };
    camera.start();
    let mut rgba_buffer = vec![];
    loop {
        if let Ok(running) = running.lock() {
            if !*running {
                break;
            }
        }

        let frame = match camera.wait_for_frame() {
            Some(f) => f,
            None => {
                warn!("camera #{index}: no frame");
                std::thread::sleep(Duration::from_millis(10));
                continue;
            }
        };

        let (width, height) = frame.size_u32();
        if rgba_buffer.len() as u32 != width * height * 4 {
            rgba_buffer = vec![0; (width * height * 4) as usize];
        }
        let frame_data = frame.data();
        for (idx, bgra) in frame_data.data_u8().chunks(4).enumerate() {
            rgba_buffer[idx * 4] = bgra[2];
            rgba_buffer[idx * 4 + 1] = bgra[1];
            rgba_buffer[idx * 4 + 2] = bgra[0];
            rgba_buffer[idx * 4 + 3] = bgra[3];
        }

        if !sink.present(SharedPixelBuffer::clone_from_slice(&rgba_buffer, width, height)) {
            break;
        }
    }
    camera.stop();
    Ok(())
}
