//! Where frames come from.
//!
//! Acquisition itself (camera driver, ISP, auto-exposure probing) lives in
//! an external pipeline; this process consumes the packed BGR24 stream it
//! produces, usually over a fifo.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use tracing::warn;

use gate_frame::BgrFrame;

pub trait FrameSource {
    /// Block for the next frame. `None` means the stream ended cleanly.
    fn grab(&mut self) -> std::io::Result<Option<BgrFrame>>;
}

/// Headerless packed BGR24 stream of a fixed geometry.
pub struct RawSource<R> {
    reader: R,
    width: u32,
    height: u32,
    fno: u64,
}

impl RawSource<BufReader<File>> {
    pub fn open(path: &Path, width: u32, height: u32) -> std::io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self::from_reader(BufReader::new(file), width, height))
    }
}

impl<R: Read> RawSource<R> {
    pub fn from_reader(reader: R, width: u32, height: u32) -> Self {
        Self {
            reader,
            width,
            height,
            fno: 0,
        }
    }
}

impl<R: Read> FrameSource for RawSource<R> {
    fn grab(&mut self) -> std::io::Result<Option<BgrFrame>> {
        let frame_len = self.width as usize * self.height as usize * 3;
        let mut buf = vec![0u8; frame_len];
        let mut filled = 0;
        while filled < frame_len {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => {
                    if filled != 0 {
                        warn!("stream ended mid-frame ({filled}/{frame_len} bytes)");
                    }
                    return Ok(None);
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        let frame = BgrFrame::from_vec(self.fno, self.width, self.height, buf)
            .expect("buffer sized for geometry");
        self.fno += 1;
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_consecutive_frames_then_eof() {
        // Two 2x2 frames plus a truncated third.
        let mut data = vec![7u8; 2 * 2 * 3 * 2];
        data.extend_from_slice(&[1, 2, 3]);
        let mut src = RawSource::from_reader(Cursor::new(data), 2, 2);

        let f0 = src.grab().unwrap().unwrap();
        assert_eq!(f0.fno, 0);
        assert_eq!(f0.bgr(1, 1), [7, 7, 7]);
        let f1 = src.grab().unwrap().unwrap();
        assert_eq!(f1.fno, 1);
        assert!(src.grab().unwrap().is_none(), "truncated tail ends stream");
    }

    #[test]
    fn empty_stream_is_clean_eof() {
        let mut src = RawSource::from_reader(Cursor::new(Vec::new()), 4, 4);
        assert!(src.grab().unwrap().is_none());
    }
}
