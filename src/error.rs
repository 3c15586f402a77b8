use thiserror::Error;

use crate::host::LayerId;

/// Failure reported by a [`HostDriver`](crate::host::HostDriver) call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HostError {
    #[error("no open document")]
    NoDocument,

    #[error("layer {0} does not exist")]
    UnknownLayer(LayerId),

    #[error("layer {0} has no layer below it to merge into")]
    NothingToMerge(LayerId),

    #[error("layer {0} is not a text layer")]
    NotATextLayer(LayerId),

    #[error("font '{0}' is not available")]
    FontUnavailable(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("no history group is open")]
    NoOpenGroup,

    #[error("host command failed: {0}")]
    Command(String),
}

pub type HostResult<T> = std::result::Result<T, HostError>;

/// The three failure sites of the size-mark operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SizeMarkError {
    #[error("no document")]
    NoDocument,

    #[error("no selection")]
    NoSelection,

    #[error("{step} failed: {source}")]
    Host {
        step: &'static str,
        #[source]
        source: HostError,
    },
}

impl SizeMarkError {
    /// Text shown to the user in the host's alert dialog.
    pub fn alert_message(&self) -> String {
        match self {
            SizeMarkError::NoDocument => {
                "Size Marks Script: no document\nUse File \u{2192} New... to create one".to_string()
            }
            SizeMarkError::NoSelection => {
                "Size Marks Script: no selection\nUse Rectangular Marquee Tool (M) to create one"
                    .to_string()
            }
            SizeMarkError::Host { step, source } => {
                format!("Size Marks Script: {}\n{}", step, source)
            }
        }
    }
}

/// Attach the name of the failing step to a driver error.
pub(crate) trait StepContext<T> {
    fn step(self, step: &'static str) -> Result<T, SizeMarkError>;
}

impl<T> StepContext<T> for HostResult<T> {
    fn step(self, step: &'static str) -> Result<T, SizeMarkError> {
        self.map_err(|source| SizeMarkError::Host { step, source })
    }
}
