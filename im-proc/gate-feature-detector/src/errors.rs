#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("frame size changed: expected {expected_width}x{expected_height}, got {width}x{height}")]
    FrameSizeChanged {
        expected_width: u32,
        expected_height: u32,
        width: u32,
        height: u32,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
