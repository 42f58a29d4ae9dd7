//! Kernel error taxonomy
//!
//! Errors cross the syscall boundary as negative `i64` codes; inside the
//! kernel they are carried as this enum and propagated with `?`.

use core::fmt;

/// Everything a core operation can fail with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernelError {
    /// Identifier names no live environment, or the caller has no
    /// authority over it
    BadHandle,
    /// Malformed address, size, flag set, or status value
    InvalidArgument,
    /// Address space or mapping allocation failed
    OutOfMemory,
    /// Environment table is fully occupied
    OutOfProcesses,
    /// IPC target is not blocked waiting to receive
    NotReceiving,
    /// Unknown syscall number
    NoSuchCall,
    /// Boot image fails structural validation
    InvalidImage,
}

impl KernelError {
    /// Wire code returned to user environments
    pub const fn code(self) -> i64 {
        match self {
            KernelError::BadHandle => -2,
            KernelError::InvalidArgument => -3,
            KernelError::OutOfMemory => -4,
            KernelError::OutOfProcesses => -5,
            KernelError::NotReceiving => -7,
            KernelError::NoSuchCall => -8,
            KernelError::InvalidImage => -9,
        }
    }

    /// Decode a wire code, for the user-side library
    pub fn from_code(code: i64) -> Option<KernelError> {
        match code {
            -2 => Some(KernelError::BadHandle),
            -3 => Some(KernelError::InvalidArgument),
            -4 => Some(KernelError::OutOfMemory),
            -5 => Some(KernelError::OutOfProcesses),
            -7 => Some(KernelError::NotReceiving),
            -8 => Some(KernelError::NoSuchCall),
            -9 => Some(KernelError::InvalidImage),
            _ => None,
        }
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            KernelError::BadHandle => "bad environment handle",
            KernelError::InvalidArgument => "invalid argument",
            KernelError::OutOfMemory => "out of memory",
            KernelError::OutOfProcesses => "no free environment",
            KernelError::NotReceiving => "target not receiving",
            KernelError::NoSuchCall => "no such syscall",
            KernelError::InvalidImage => "invalid executable image",
        };
        f.write_str(msg)
    }
}
