//! Video output path: a writer thread drains the frame queue into child
//! process sinks.
//!
//! Encoding is delegated: every sink is an ffmpeg (or ffplay, for the
//! preview) child fed raw BGR24 frames on stdin. The detection pipeline
//! never blocks on any of this; it pushes into the bounded queue and the
//! queue drops frames under back-pressure.

use std::io::Write;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use frame_queue::FrameQueue;
use gate_frame::BgrFrame;
use gate_types::BaseKind;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no free recording index below 1000 in {dir}")]
    NoFreeIndex { dir: String },
    #[error("sink already finished")]
    AlreadyFinished,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Lowest free `<prefix><A|B><NNN>.mkv` under `dir`.
pub fn next_output_path(dir: &Path, prefix: &str, base: BaseKind) -> Result<PathBuf> {
    for index in 0..1000 {
        let path = dir.join(format!("{}{}{:03}.mkv", prefix, base.letter(), index));
        if !path.exists() {
            return Ok(path);
        }
    }
    Err(Error::NoFreeIndex {
        dir: dir.display().to_string(),
    })
}

/// Where one sink sends its frames.
#[derive(Debug, Clone)]
pub enum SinkKind {
    /// Matroska recording on disk.
    File(PathBuf),
    /// H.264-over-RTP restream toward the preview receiver.
    Rtp { host: Ipv4Addr, port: u16 },
    /// Local ffplay preview window.
    Screen,
}

impl SinkKind {
    fn describe(&self) -> String {
        match self {
            SinkKind::File(path) => format!("file {}", path.display()),
            SinkKind::Rtp { host, port } => format!("rtp://{host}:{port}"),
            SinkKind::Screen => "screen".to_string(),
        }
    }

    fn is_file(&self) -> bool {
        matches!(self, SinkKind::File(_))
    }
}

/// A running encoder child consuming raw BGR24 on stdin.
pub struct FfmpegSink {
    describe: String,
    child: Child,
    stdin: Option<ChildStdin>,
}

impl FfmpegSink {
    pub fn launch(kind: &SinkKind, width: u32, height: u32, fps: u32) -> Result<Self> {
        let size = format!("{width}x{height}");
        let rate = fps.to_string();
        let raw_input = [
            "-hide_banner",
            "-loglevel",
            "warning",
            "-f",
            "rawvideo",
            "-pixel_format",
            "bgr24",
            "-video_size",
            &size,
            "-framerate",
            &rate,
            "-i",
            "-",
        ];

        let mut command = match kind {
            SinkKind::File(path) => {
                let mut c = Command::new("ffmpeg");
                c.args(["-nostdin", "-y"])
                    .args(raw_input)
                    .args(["-c:v", "libx264", "-preset", "veryfast"])
                    .arg(path);
                c
            }
            SinkKind::Rtp { host, port } => {
                let mut c = Command::new("ffmpeg");
                c.args(["-nostdin", "-y"])
                    .args(raw_input)
                    .args([
                        "-c:v",
                        "libx264",
                        "-preset",
                        "ultrafast",
                        "-tune",
                        "zerolatency",
                        "-f",
                        "rtp",
                    ])
                    .arg(format!("rtp://{host}:{port}"));
                c
            }
            SinkKind::Screen => {
                let mut c = Command::new("ffplay");
                c.args([
                    "-hide_banner",
                    "-loglevel",
                    "warning",
                    "-f",
                    "rawvideo",
                    "-pixel_format",
                    "bgr24",
                    "-video_size",
                    &size,
                    "-framerate",
                    &rate,
                    "-",
                ]);
                c
            }
        };

        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        let stdin = child.stdin.take();
        info!("started video sink: {}", kind.describe());
        Ok(Self {
            describe: kind.describe(),
            child,
            stdin,
        })
    }

    pub fn write_frame(&mut self, frame: &BgrFrame) -> Result<()> {
        let stdin = self.stdin.as_mut().ok_or(Error::AlreadyFinished)?;
        stdin.write_all(frame.data())?;
        Ok(())
    }

    /// Close stdin and reap the child.
    pub fn finish(mut self) {
        drop(self.stdin.take());
        match self.child.wait() {
            Ok(status) if status.success() => info!("video sink finished: {}", self.describe),
            Ok(status) => warn!("video sink {} exited with {}", self.describe, status),
            Err(e) => warn!("could not reap video sink {}: {}", self.describe, e),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub sinks: Vec<SinkKind>,
    /// Stop (cancel the queue) once a file recording has run this long.
    pub file_duration_limit: Option<Duration>,
}

/// Handle on the writer thread.
pub struct VideoWriter {
    handle: std::thread::JoinHandle<()>,
}

impl VideoWriter {
    pub fn join(self) {
        if self.handle.join().is_err() {
            warn!("video writer thread panicked");
        }
    }
}

/// Launch the writer thread. It owns the sinks, drains `queue` until
/// cancellation, drops a sink whose child dies, and enforces the file
/// recording duration limit.
pub fn launch(queue: Arc<FrameQueue<BgrFrame>>, cfg: WriterConfig) -> std::io::Result<VideoWriter> {
    let handle = std::thread::Builder::new()
        .name("video-output".to_string())
        .spawn(move || {
            let has_file = cfg.sinks.iter().any(|s| s.is_file());
            let mut sinks: Vec<FfmpegSink> = cfg
                .sinks
                .iter()
                .filter_map(
                    |kind| match FfmpegSink::launch(kind, cfg.width, cfg.height, cfg.fps) {
                        Ok(sink) => Some(sink),
                        Err(e) => {
                            warn!("cannot start video sink {}: {}", kind.describe(), e);
                            None
                        }
                    },
                )
                .collect();

            let started = Instant::now();
            while let Ok(frame) = queue.pop() {
                let mut keep = Vec::with_capacity(sinks.len());
                for mut sink in sinks {
                    match sink.write_frame(&frame) {
                        Ok(()) => keep.push(sink),
                        Err(e) => {
                            warn!("dropping video sink {}: {}", sink.describe, e);
                            sink.finish();
                        }
                    }
                }
                sinks = keep;

                if has_file {
                    if let Some(limit) = cfg.file_duration_limit {
                        if started.elapsed() >= limit {
                            info!("recording duration limit reached");
                            queue.cancel();
                        }
                    }
                }
            }

            for sink in sinks {
                sink.finish();
            }
        })?;
    Ok(VideoWriter { handle })
}
