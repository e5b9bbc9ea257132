//! Domain primitive types used across the convcheck workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Filesystem kind an image is mounted as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FsKind {
    /// FAT12/16/32, the conversion source.
    Vfat,
    /// ext4, the conversion target.
    Ext4,
}

impl FsKind {
    /// Returns the kernel filesystem type name, also used to name mount points.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vfat => "vfat",
            Self::Ext4 => "ext4",
        }
    }
}

impl fmt::Display for FsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a mount may be written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Access {
    /// Mounted read-only.
    ReadOnly,
    /// Mounted read-write.
    ReadWrite,
}

impl Access {
    /// Returns `true` for [`Access::ReadOnly`].
    #[must_use]
    pub const fn is_readonly(self) -> bool {
        matches!(self, Self::ReadOnly)
    }
}
