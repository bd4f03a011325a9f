use std::fmt;
use std::io;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    InvalidArgs(String),
    Topology(String),
    Affinity { cpu: usize, source: io::Error },
    Thread(String),
    Calibration { cpu: usize, msg: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::InvalidArgs(msg) => write!(f, "invalid arguments: {}", msg),
            Error::Topology(msg) => write!(f, "cpu topology error: {}", msg),
            Error::Affinity { cpu, source } => {
                write!(f, "failed to bind thread to cpu {}: {}", cpu, source)
            }
            Error::Thread(msg) => write!(f, "worker thread error: {}", msg),
            Error::Calibration { cpu, msg } => {
                write!(f, "calibration failed on cpu {}: {}", cpu, msg)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Affinity { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}
