//! Graphics error types.

/// Errors that can occur in the GL backend.
///
/// Creation operations return these instead of a bare failure flag; the
/// diagnostic has already been logged at the failure site by the time the
/// error reaches the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphicsError {
    /// The backend or its context could not be created.
    #[error("initialization failed: {0}")]
    InitializationFailed(String),
    /// Programmer misuse detected before any driver call was made.
    #[error("validation error: {0}")]
    Validation(String),
    /// The driver rejected a resource creation request.
    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),
    /// A requested feature is not supported by the detected driver.
    #[error("feature not supported: {0}")]
    FeatureNotSupported(String),
    /// No shader source variant matches the context's shading language.
    #[error("no suitable shader variant for the {0} stage")]
    NoShaderVariant(String),
    /// A shader stage failed to compile. Carries the driver log.
    #[error("shader compilation failed: {0}")]
    ShaderCompilation(String),
    /// A program failed to link. Carries the driver log.
    #[error("program link failed: {0}")]
    ProgramLink(String),
    /// The context could not be made current.
    #[error("context could not be made current")]
    ContextNotCurrent,
    /// The GPU device (context) was lost.
    #[error("GPU device lost")]
    DeviceLost,
    /// A cache payload could not be used.
    #[error("cache error: {0}")]
    Cache(String),
    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result of a frame operation.
///
/// `Error` is recoverable: the caller should retry on the next frame.
/// `DeviceLost` means the backend and every resource created from it must be
/// torn down and rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameOpResult {
    /// The operation completed.
    Success,
    /// The operation failed; retry next frame.
    Error,
    /// The driver connection is gone.
    DeviceLost,
}

impl FrameOpResult {
    /// Whether the operation succeeded.
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphicsError::DeviceLost;
        assert_eq!(err.to_string(), "GPU device lost");

        let err = GraphicsError::Validation("cannot be both cube and 3D".to_string());
        assert_eq!(err.to_string(), "validation error: cannot be both cube and 3D");

        let err = GraphicsError::NoShaderVariant("vertex".to_string());
        assert_eq!(
            err.to_string(),
            "no suitable shader variant for the vertex stage"
        );
    }

    #[test]
    fn test_frame_op_result() {
        assert!(FrameOpResult::Success.is_success());
        assert!(!FrameOpResult::Error.is_success());
        assert!(!FrameOpResult::DeviceLost.is_success());
    }
}
