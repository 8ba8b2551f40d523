//! Access flags
//!
//! Each access site emitted by the compiler carries an [`AccessFlags`] bitset
//! describing what the site wants from its storage location. The bits split
//! into a read group (`READ_MASK`) and a write group (`WRITE_MASK`); a single
//! request belongs to exactly one of read, write or unset. [`classify`] is the
//! one place that validates a bitset and turns it into an [`Intent`] the
//! resolver can match on exhaustively.

use crate::vm::resolver::AccessError;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AccessFlags(u8);

impl AccessFlags {
    /// Plain read.
    pub const DEFAULT: AccessFlags = AccessFlags(0);
    /// Autovivify to an object before reading.
    pub const ENSURE_OBJECT: AccessFlags = AccessFlags(1);
    /// Autovivify to an array before reading.
    pub const ENSURE_ARRAY: AccessFlags = AccessFlags(2);
    /// Promote to an alias cell and return it.
    pub const ENSURE_ALIAS: AccessFlags = AccessFlags(4);
    /// Suppress undefined notices.
    pub const CHECK_ONLY: AccessFlags = AccessFlags(8);
    pub const WRITE_VALUE: AccessFlags = AccessFlags(16);
    /// Reference assignment; the operand must be an alias cell.
    pub const WRITE_ALIAS: AccessFlags = AccessFlags(32);
    pub const UNSET: AccessFlags = AccessFlags(64);
    /// Existence check (`isset`).
    pub const ISSET: AccessFlags = AccessFlags(128);

    pub const READ_MASK: AccessFlags = AccessFlags(1 | 2 | 4 | 8 | 128);
    pub const WRITE_MASK: AccessFlags = AccessFlags(16 | 32 | 64);

    /// Every bit of the byte is a defined flag.
    pub fn from_bits(bits: u8) -> AccessFlags {
        AccessFlags(bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: AccessFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: AccessFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub fn ensure_object(self) -> bool {
        self.contains(Self::ENSURE_OBJECT)
    }

    pub fn ensure_array(self) -> bool {
        self.contains(Self::ENSURE_ARRAY)
    }

    pub fn ensure_alias(self) -> bool {
        self.contains(Self::ENSURE_ALIAS)
    }

    pub fn quiet(self) -> bool {
        self.contains(Self::CHECK_ONLY)
    }

    pub fn isset(self) -> bool {
        self.contains(Self::ISSET)
    }

    pub fn write_alias(self) -> bool {
        self.contains(Self::WRITE_ALIAS)
    }

    pub fn unset(self) -> bool {
        self.contains(Self::UNSET)
    }
}

impl BitOr for AccessFlags {
    type Output = AccessFlags;

    fn bitor(self, rhs: AccessFlags) -> AccessFlags {
        AccessFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for AccessFlags {
    fn bitor_assign(&mut self, rhs: AccessFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for AccessFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(AccessFlags, &str); 8] = [
            (AccessFlags::ENSURE_OBJECT, "EnsureObject"),
            (AccessFlags::ENSURE_ARRAY, "EnsureArray"),
            (AccessFlags::ENSURE_ALIAS, "EnsureAlias"),
            (AccessFlags::CHECK_ONLY, "CheckOnly"),
            (AccessFlags::WRITE_VALUE, "WriteValue"),
            (AccessFlags::WRITE_ALIAS, "WriteAlias"),
            (AccessFlags::UNSET, "Unset"),
            (AccessFlags::ISSET, "Isset"),
        ];
        let set: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if set.is_empty() {
            write!(f, "AccessFlags(Default)")
        } else {
            write!(f, "AccessFlags({})", set.join(" | "))
        }
    }
}

/// Coarse classification of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
    Unset,
}

/// The structure a read asks to be created. Ordered by precedence when a
/// caller sets several Ensure bits at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ensure {
    Alias,
    Object,
    Array,
}

/// A validated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Read {
        ensure: Option<Ensure>,
        quiet: bool,
        isset: bool,
    },
    WriteValue,
    WriteAlias,
    Unset,
}

impl Intent {
    pub fn kind(self) -> AccessKind {
        match self {
            Intent::Read { .. } => AccessKind::Read,
            Intent::WriteValue | Intent::WriteAlias => AccessKind::Write,
            Intent::Unset => AccessKind::Unset,
        }
    }
}

/// Validate a bitset: read and write bits never mix, and at most one write
/// bit is set.
pub fn classify(flags: AccessFlags) -> Result<AccessKind, AccessError> {
    intent(flags).map(Intent::kind)
}

pub(crate) fn intent(flags: AccessFlags) -> Result<Intent, AccessError> {
    let write_bits = flags.0 & AccessFlags::WRITE_MASK.0;
    if write_bits == 0 {
        // EnsureAlias > EnsureObject > EnsureArray
        let ensure = if flags.ensure_alias() {
            Some(Ensure::Alias)
        } else if flags.ensure_object() {
            Some(Ensure::Object)
        } else if flags.ensure_array() {
            Some(Ensure::Array)
        } else {
            None
        };
        return Ok(Intent::Read {
            ensure,
            quiet: flags.quiet(),
            isset: flags.isset(),
        });
    }

    if flags.intersects(AccessFlags::READ_MASK) {
        return Err(AccessError::MixedAccess(flags));
    }
    if write_bits.count_ones() > 1 {
        return Err(AccessError::ConflictingWrites(flags));
    }

    Ok(if flags.unset() {
        Intent::Unset
    } else if flags.write_alias() {
        Intent::WriteAlias
    } else {
        Intent::WriteValue
    })
}
