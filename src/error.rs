use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A read ran past the end of the buffer (truncated or corrupt file).
    #[error("unexpected end of data at offset {offset}")]
    OutOfData { offset: usize },

    /// Unrecognized type tag for a slot or bone timeline. Fatal to the whole
    /// parse; no partial skeleton is usable.
    #[error("invalid timeline type {value} for {kind} '{name}'")]
    InvalidTimelineType {
        kind: TimelineTargetKind,
        name: String,
        value: u8,
    },

    /// Unrecognized or unimplemented attachment type tag. The reserved Path
    /// tag (4) has no decode branch in the 2.1 binary format.
    #[error("unsupported attachment type {value} for attachment '{name}'")]
    UnsupportedAttachmentType { name: String, value: u8 },

    /// The skeleton file could not be read.
    #[error("unable to read skeleton file: {path}")]
    FileUnreadable { path: String },

    /// Structurally invalid data that is not a plain truncation: bad UTF-8,
    /// an out-of-range index, a missing FFD target attachment.
    #[error("malformed skeleton data: {message}")]
    Malformed { message: String },
}

/// Which kind of entity a timeline section was keyed to when an invalid
/// type tag was encountered.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TimelineTargetKind {
    Slot,
    Bone,
}

impl std::fmt::Display for TimelineTargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Slot => f.write_str("slot"),
            Self::Bone => f.write_str("bone"),
        }
    }
}
