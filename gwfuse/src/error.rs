use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    Gateway(gateway::Error),
    Http(reqwest::Error),
    Io(std::io::Error),
    CliInput(String),
    Mountpoint(String),
    Config(String),
    Request(reqwest::StatusCode, String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Gateway(err) => write!(f, "Gateway error: {}", err),
            Error::Http(err) => write!(f, "HTTP error: {}", err),
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::CliInput(msg) => write!(f, "CLI input error: {}", msg),
            Error::Mountpoint(msg) => write!(f, "Invalid mount point: {}", msg),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Request(status, url) => write!(f, "Request to {} failed with {}", url, status),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Gateway(err) => Some(err),
            Error::Http(err) => Some(err),
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl std::convert::From<gateway::Error> for Error {
    fn from(error: gateway::Error) -> Error {
        Error::Gateway(error)
    }
}

impl std::convert::From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Error {
        Error::Http(error)
    }
}

impl std::convert::From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Error {
        Error::Io(error)
    }
}
