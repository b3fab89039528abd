pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// The authorization hook rejected the calling process.
    Canceled,
    NotFound(String),
    IsDirectory(String),
    NotADirectory(String),
    /// The fetch collaborator reported a general fault (`-1`).
    Fault,
    /// The fetch collaborator reported an access rejection (`-2`).
    AccessDenied,
    /// Any other negative fetch code; the original value is kept for diagnostics.
    Io(i64),
    /// The collaborator could not produce the namespace at startup.
    Backend(String),
    Mount(std::io::Error),
}

impl Error {
    /// Negative errno delivered to the kernel caller.
    pub fn errno(&self) -> i32 {
        match self {
            Error::Canceled => libc::ECANCELED,
            Error::NotFound(_) => libc::ENOENT,
            Error::IsDirectory(_) => libc::EISDIR,
            Error::NotADirectory(_) => libc::ENOTDIR,
            Error::Fault => libc::EFAULT,
            Error::AccessDenied => libc::EACCES,
            Error::Io(_) => libc::EIO,
            Error::Backend(_) => libc::EIO,
            Error::Mount(_) => libc::EIO,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            Error::Canceled => write!(f, "Open rejected for calling process"),
            Error::NotFound(ref path) => write!(f, "No such file or directory: {path}"),
            Error::IsDirectory(ref path) => write!(f, "Is a directory: {path}"),
            Error::NotADirectory(ref path) => write!(f, "Not a directory: {path}"),
            Error::Fault => write!(f, "Fetch collaborator reported a fault"),
            Error::AccessDenied => write!(f, "Access denied by remote storage"),
            Error::Io(code) => write!(f, "Remote read failed with code {code}"),
            Error::Backend(ref msg) => write!(f, "Backend failure: {msg}"),
            Error::Mount(ref err) => write!(f, "Mount failed: {err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            Error::Mount(ref err) => Some(err),
            _ => None,
        }
    }
}

impl std::convert::From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Error {
        Error::Mount(error)
    }
}
