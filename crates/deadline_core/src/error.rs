use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Every constraint a task input violated, not just the first one.
    Validation(Vec<String>),
    NotFound(String),
    Format(String),
    Io(String),
    InvalidData(String),
    /// Raised by delivery channels; `dispatch` records it instead of returning it.
    Delivery(String),
}

impl AppError {
    pub fn validation<I, M>(violations: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        Self::Validation(violations.into_iter().map(Into::into).collect())
    }

    pub fn not_found<M: Into<String>>(message: M) -> Self {
        Self::NotFound(message.into())
    }

    pub fn format<M: Into<String>>(message: M) -> Self {
        Self::Format(message.into())
    }

    pub fn io<M: Into<String>>(message: M) -> Self {
        Self::Io(message.into())
    }

    pub fn invalid_data<M: Into<String>>(message: M) -> Self {
        Self::InvalidData(message.into())
    }

    pub fn delivery<M: Into<String>>(message: M) -> Self {
        Self::Delivery(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::Format(_) => "format_error",
            Self::Io(_) => "io_error",
            Self::InvalidData(_) => "invalid_data",
            Self::Delivery(_) => "delivery_failure",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Validation(violations) => violations.join("; "),
            Self::NotFound(message)
            | Self::Format(message)
            | Self::Io(message)
            | Self::InvalidData(message)
            | Self::Delivery(message) => message.clone(),
        }
    }

    pub fn violations(&self) -> &[String] {
        match self {
            Self::Validation(violations) => violations,
            _ => &[],
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.code(), self.message())
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::AppError;

    #[test]
    fn validation_message_joins_all_violations() {
        let err = AppError::validation(["title is required", "priority must be low, medium or high"]);

        assert_eq!(err.code(), "validation_error");
        assert_eq!(err.violations().len(), 2);
        assert_eq!(
            err.to_string(),
            "validation_error - title is required; priority must be low, medium or high"
        );
    }

    #[test]
    fn non_validation_errors_have_no_violations() {
        let err = AppError::not_found("task 7 not found");
        assert_eq!(err.code(), "not_found");
        assert!(err.violations().is_empty());
    }
}
