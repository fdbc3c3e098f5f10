//! gatecam: camera timing-base sensor for slope-gliding races.
//!
//! One synchronous pipeline per frame: segment foreground, reduce to
//! ROIs, track, evaluate the mid-line crossing, fire the trigger sinks.
//! A single ancillary thread drains annotated frames into the video
//! sinks; everything else is this thread.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{info, warn};

use frame_queue::FrameQueue;
use gate_config_data::{CameraConfig, SystemConfig, CAMERA_CONFIG_FILE, SYSTEM_CONFIG_FILE};
use gate_feature_detector::FrameSegmenter;
use gate_frame::{draw, BgrFrame};
use gate_movie_writer::{SinkKind, VideoWriter, WriterConfig};
use gate_tracker::{CrossingMonitor, Tracker};
use gate_triggerbox::{parse_remote, RemoteCommand, RemoteReceiver, TriggerSink, UartTrigger, UdpTrigger};
use gate_types::{CrossingConfig, DetectorConfig, TrackerConfig};

mod frame_source;
mod overlay;

use frame_source::{FrameSource, RawSource};

const UART_DEVICES: &[&str] = &["/dev/ttyUSB0", "/dev/ttyTHS1"];
const PAUSED_POLL: Duration = Duration::from_millis(10);
const FILE_DURATION_LIMIT: Duration = Duration::from_secs(90);

#[derive(Parser, Debug)]
#[command(name = "gatecam", about = "camera timing base for F3F/F3B courses")]
struct Cli {
    /// Packed BGR24 frame stream (file, or fifo fed by the camera pipeline)
    #[arg(long)]
    input: PathBuf,
    /// Directory holding system.config and camera.config
    #[arg(long, default_value = "/etc/gatecam")]
    config_dir: PathBuf,
    #[arg(long, default_value_t = 1280)]
    width: u32,
    #[arg(long, default_value_t = 720)]
    height: u32,
    /// Frame rate declared to the video sinks
    #[arg(long, default_value_t = 30)]
    fps: u32,
    /// Directory for recordings
    #[arg(long, default_value = "/var/lib/gatecam/videos")]
    video_dir: PathBuf,
    /// Recording file name prefix
    #[arg(long, default_value = "base")]
    video_prefix: String,
    #[arg(long, default_value = "/var/run/gatecam.pid")]
    pid_file: PathBuf,
    /// Start detecting immediately instead of waiting for a resume command
    #[arg(long)]
    run_on_start: bool,
}

fn main() -> eyre::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    if let Err(e) = std::fs::write(&cli.pid_file, std::process::id().to_string()) {
        warn!("cannot write pid file {}: {}", cli.pid_file.display(), e);
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::SeqCst);
        })?;
    }

    let result = run(&cli, &shutdown);
    if std::fs::remove_file(&cli.pid_file).is_err() {
        // Either never written or already gone.
    }
    result
}

struct Sensor {
    system: SystemConfig,
    segmenter: FrameSegmenter,
    tracker: Tracker,
    monitor: CrossingMonitor,
    uart: UartTrigger,
    udp: UdpTrigger,
    remote_rx: Option<RemoteReceiver>,
    queue: Arc<FrameQueue<BgrFrame>>,
    writer: Option<VideoWriter>,
    font: rusttype::Font<'static>,
    fps: f64,
}

fn run(cli: &Cli, shutdown: &AtomicBool) -> eyre::Result<()> {
    let system = SystemConfig::load(&cli.config_dir.join(SYSTEM_CONFIG_FILE))?;
    info!("system config: {:?}", system);
    if system.hw_switch {
        warn!("base.hwswitch is set but this build has no switch backend");
    }
    match CameraConfig::load(&cli.config_dir.join(CAMERA_CONFIG_FILE)) {
        // The camera pipeline is external; its config is parsed here so a
        // bad file is diagnosed at startup, then handed over via logs.
        Ok(camera) => info!("camera config for the acquisition pipeline: {:?}", camera),
        Err(e) => warn!("camera config not loaded: {}", e),
    }

    let mut source = RawSource::open(&cli.input, cli.width, cli.height)?;

    let uart = UartTrigger::open(system.base, UART_DEVICES);
    let udp = UdpTrigger::open(system.base, system.udp_remote_host, system.udp_remote_port);
    let remote_rx = if system.remote_control {
        match RemoteReceiver::bind(system.udp_remote_port) {
            Ok(rx) => Some(rx),
            Err(e) => {
                warn!("remote control UDP port unavailable: {}", e);
                None
            }
        }
    } else {
        None
    };

    let mut sensor = Sensor {
        segmenter: FrameSegmenter::new(cli.width, cli.height, DetectorConfig::default()),
        tracker: Tracker::new(TrackerConfig::default()),
        monitor: CrossingMonitor::new(
            cli.height,
            CrossingConfig::default(),
            TrackerConfig::default().max_triggers,
        ),
        system,
        uart,
        udp,
        remote_rx,
        queue: Arc::new(FrameQueue::new()),
        writer: None,
        font: draw::default_font(),
        fps: 0.0,
    };

    let mut paused = true;
    if cli.run_on_start {
        paused = false;
        sensor.resume(cli);
    } else {
        info!("waiting for a resume command");
    }

    let mut t_last = Instant::now();
    loop {
        if shutdown.load(Ordering::SeqCst) {
            info!("shutdown requested");
            break;
        }

        match sensor.poll_remote() {
            Some(RemoteCommand::Pause) if !paused => {
                paused = true;
                sensor.pause();
            }
            Some(RemoteCommand::Resume) if paused => {
                paused = false;
                sensor.resume(cli);
                t_last = Instant::now();
            }
            _ => {}
        }

        if paused {
            std::thread::sleep(PAUSED_POLL);
            continue;
        }

        let Some(frame) = source.grab()? else {
            info!("end of frame stream");
            break;
        };

        let rois = sensor.segmenter.process_frame(&frame)?;
        sensor.tracker.update(&rois);
        let crossing = sensor.monitor.evaluate(&mut sensor.tracker);
        if let Some(crossing) = crossing {
            sensor.uart.trigger(crossing.new_crossing);
            sensor.udp.trigger(crossing.new_crossing);
        }

        if sensor.system.any_video_output() {
            let out = if sensor.system.video_output_result {
                overlay::compose(
                    &frame,
                    &sensor.tracker,
                    crossing.is_some(),
                    sensor.monitor.mid_y(),
                    sensor.fps,
                    &sensor.font,
                )
            } else {
                frame
            };
            // Back-pressure: the queue drops the frame when full.
            sensor.queue.push(out);
        }

        let dt = t_last.elapsed();
        sensor.fps = 1.0 / dt.as_secs_f64().max(1e-9);
        t_last = Instant::now();
    }

    if !paused {
        sensor.pause();
    }
    info!("finished");
    Ok(())
}

impl Sensor {
    /// Dispatch an inbound remote byte, when remote control is enabled.
    fn poll_remote(&mut self) -> Option<RemoteCommand> {
        if !self.system.remote_control {
            return None;
        }
        let byte = self
            .uart
            .poll_remote()
            .or_else(|| self.remote_rx.as_mut().and_then(|rx| rx.poll()))?;
        parse_remote(byte, self.system.base)
    }

    /// Re-read the system config and relaunch the video writer.
    fn resume(&mut self, cli: &Cli) {
        match SystemConfig::load(&cli.config_dir.join(SYSTEM_CONFIG_FILE)) {
            Ok(system) => self.system = system,
            Err(e) => warn!("keeping previous system config: {}", e),
        }
        info!("detection started");

        if !self.system.any_video_output() {
            return;
        }
        let mut sinks = Vec::new();
        if self.system.video_output_file {
            match gate_movie_writer::next_output_path(
                &cli.video_dir,
                &cli.video_prefix,
                self.system.base,
            ) {
                Ok(path) => sinks.push(SinkKind::File(path)),
                Err(e) => warn!("no recording file: {}", e),
            }
        }
        if self.system.video_output_rtp {
            if let Some(host) = self.system.rtp_remote_host {
                sinks.push(SinkKind::Rtp {
                    host,
                    port: self.system.rtp_remote_port,
                });
            } else {
                warn!("video.output.rtp set without base.rtp.remote.host");
            }
        }
        if self.system.video_output_screen {
            sinks.push(SinkKind::Screen);
        }

        self.queue.reset();
        match gate_movie_writer::launch(
            self.queue.clone(),
            WriterConfig {
                width: cli.width,
                height: cli.height,
                fps: cli.fps,
                sinks,
                file_duration_limit: Some(FILE_DURATION_LIMIT),
            },
        ) {
            Ok(writer) => self.writer = Some(writer),
            Err(e) => warn!("cannot start video writer: {}", e),
        }
    }

    /// Cancel the output queue and join the writer before anything is
    /// reconfigured.
    fn pause(&mut self) {
        info!("detection stopped");
        if let Some(writer) = self.writer.take() {
            self.queue.cancel();
            writer.join();
        }
    }
}
