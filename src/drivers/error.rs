use thiserror::Error;

use crate::types::LinkKind;

/// Failure on one of the device links.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("timed out waiting for a reply")]
    Timeout,
    #[error("link closed by peer")]
    Closed,
    #[error("malformed reply: {0}")]
    Malformed(String),
    #[error("checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    Checksum { expected: u8, actual: u8 },
    #[error("unexpected reply command {actual:#04x} (wanted {expected:#04x})")]
    UnexpectedReply { expected: u8, actual: u8 },
}

impl LinkError {
    /// Folds socket/serial timeouts into [`LinkError::Timeout`].
    pub fn from_io(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => LinkError::Timeout,
            std::io::ErrorKind::UnexpectedEof => LinkError::Closed,
            _ => LinkError::Io(err),
        }
    }
}

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("{link} communication failure: {source}")]
    CommunicationFailure {
        link: LinkKind,
        #[source]
        source: LinkError,
    },
    #[error("failed to write export: {0}")]
    Export(#[from] std::io::Error),
    #[error("failed to render plot: {0}")]
    Plot(String),
    #[error("malformed csv at line {line}: {message}")]
    Csv { line: usize, message: String },
    #[error("acquisition task failed: {0}")]
    Task(String),
    #[error("bad configuration: {0}")]
    Config(String),
}

impl BenchError {
    pub fn instrument(source: LinkError) -> Self {
        BenchError::CommunicationFailure {
            link: LinkKind::Instrument,
            source,
        }
    }

    pub fn board(source: LinkError) -> Self {
        BenchError::CommunicationFailure {
            link: LinkKind::Board,
            source,
        }
    }
}

impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for BenchError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        BenchError::Plot(format!("{value:?}"))
    }
}

impl From<image::ImageError> for BenchError {
    fn from(value: image::ImageError) -> Self {
        BenchError::Plot(value.to_string())
    }
}

impl From<serde_json::Error> for BenchError {
    fn from(value: serde_json::Error) -> Self {
        BenchError::Config(value.to_string())
    }
}
