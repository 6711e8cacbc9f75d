use tokio::task::JoinError;

/// [Result] alias for return types of the crate API
pub type Result<T> = std::result::Result<T, Error>;

/// Error enum type
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The endpoint is unreachable, unsupported or never reached a ready telemetry state.
    ConnectionError(String),
    /// The vehicle never became armable, or did not arm in time.
    ArmError(String),
    /// The vehicle rejected the mission, or never acknowledged it.
    UploadError(String),
    /// No position report was received within the expected interval.
    TelemetryTimeout,
    /// A bounded wait expired. The String names what was being waited for.
    Timeout(String),
    /// The operation was cancelled through a [CancelToken](crate::CancelToken).
    Cancelled,
    /// The vehicle object is currently disconnected.
    Disconnected,
    /// A mission violates its invariants (empty, non dense sequence numbers).
    InvalidMission(String),
    /// Error with the async runtime.
    SystemError(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::ConnectionError(reason) => write!(f, "connection error: {}", reason),
            Error::ArmError(reason) => write!(f, "arming error: {}", reason),
            Error::UploadError(reason) => write!(f, "mission upload error: {}", reason),
            Error::TelemetryTimeout => f.write_str("no telemetry received in time"),
            Error::Timeout(what) => write!(f, "timed out waiting for {}", what),
            Error::Cancelled => f.write_str("operation cancelled"),
            Error::Disconnected => f.write_str("vehicle disconnected"),
            Error::InvalidMission(reason) => write!(f, "invalid mission: {}", reason),
            Error::SystemError(reason) => write!(f, "system error: {}", reason),
        }
    }
}

impl std::error::Error for Error {}

impl From<JoinError> for Error {
    fn from(error: JoinError) -> Self {
        Self::SystemError(format!("{}", error))
    }
}

impl From<flume::RecvError> for Error {
    fn from(_: flume::RecvError) -> Self {
        self::Error::Disconnected
    }
}

impl<T> From<flume::SendError<T>> for Error {
    fn from(_: flume::SendError<T>) -> Self {
        self::Error::Disconnected
    }
}
