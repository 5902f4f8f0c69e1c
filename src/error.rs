use thiserror::Error;

#[derive(Error, Debug)]
pub enum VolumeError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{message}")]
    RuntimeInvocation { message: String, code: Option<i32> },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl VolumeError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArguments(msg.into())
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Process exit code for this error. A container that exited with its own
    /// non-zero code passes that code through.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::RuntimeInvocation {
                code: Some(code), ..
            } if *code != 0 => *code,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, VolumeError>;
