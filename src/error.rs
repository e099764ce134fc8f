/// Failure categories, ordered by where in the pipeline they arise.
///
/// The kind determines the process exit code and lets callers react
/// per category, e.g. treat insufficient data as a soft stop while a
/// missing artifact aborts the whole call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input, configuration, or file I/O.
    Input,
    /// Fewer observations than the minimum training threshold.
    InsufficientData,
    /// A fitted artifact was absent at inference time.
    MissingArtifact,
    /// A collaborator (market feed) returned empty or unusable data.
    Upstream,
    /// Numeric or model failure at runtime.
    Runtime,
}

impl ErrorKind {
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::Input => 2,
            ErrorKind::InsufficientData => 3,
            ErrorKind::MissingArtifact | ErrorKind::Upstream | ErrorKind::Runtime => 4,
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    kind: ErrorKind,
    message: String,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn exit_code(&self) -> u8 {
        self.kind.exit_code()
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("kind", &self.kind)
            .field("exit_code", &self.exit_code())
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
