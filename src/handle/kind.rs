//! Simulation-entity kinds and the selector mask used by iteration.

use bitflags::bitflags;

/// What a hierarchy node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum ObjectKind {
    /// A design unit instance.
    Module,
    /// A named scope that is not an instance (generate block, package).
    Scope,
    /// A continuously driven value.
    Net,
    /// A procedurally assigned value.
    Register,
    /// A constant; readable but never writable.
    Parameter,
    /// Anything a backend cannot classify.
    Unknown,
}

impl ObjectKind {
    /// Whether handles of this kind carry a value.
    pub fn is_signal(self) -> bool {
        matches!(self, ObjectKind::Net | ObjectKind::Register | ObjectKind::Parameter)
    }

    /// Whether the host may write values of this kind.
    pub fn is_writable(self) -> bool {
        matches!(self, ObjectKind::Net | ObjectKind::Register)
    }

    /// The single-bit mask selecting this kind.
    pub fn mask(self) -> KindMask {
        match self {
            ObjectKind::Module => KindMask::MODULE,
            ObjectKind::Scope => KindMask::SCOPE,
            ObjectKind::Net => KindMask::NET,
            ObjectKind::Register => KindMask::REGISTER,
            ObjectKind::Parameter => KindMask::PARAMETER,
            ObjectKind::Unknown => KindMask::UNKNOWN,
        }
    }

    /// Default type string used when a backend has no native one.
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Module => "module",
            ObjectKind::Scope => "scope",
            ObjectKind::Net => "net",
            ObjectKind::Register => "reg",
            ObjectKind::Parameter => "parameter",
            ObjectKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

bitflags! {
    /// Selector passed to `iterate_handle`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct KindMask: u32 {
        const MODULE = 1 << 0;
        const SCOPE = 1 << 1;
        const NET = 1 << 2;
        const REGISTER = 1 << 3;
        const PARAMETER = 1 << 4;
        const UNKNOWN = 1 << 5;

        const SCOPES = Self::MODULE.bits() | Self::SCOPE.bits();
        const SIGNALS = Self::NET.bits() | Self::REGISTER.bits() | Self::PARAMETER.bits();
    }
}

impl KindMask {
    /// Whether `kind` is selected.
    pub fn selects(self, kind: ObjectKind) -> bool {
        self.contains(kind.mask())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_kinds() {
        assert!(ObjectKind::Net.is_signal());
        assert!(ObjectKind::Parameter.is_signal());
        assert!(!ObjectKind::Module.is_signal());
        assert!(!ObjectKind::Parameter.is_writable());
    }

    #[test]
    fn test_mask_selection() {
        assert!(KindMask::SIGNALS.selects(ObjectKind::Register));
        assert!(!KindMask::SIGNALS.selects(ObjectKind::Scope));
        assert!(KindMask::all().selects(ObjectKind::Unknown));
        assert!(!KindMask::empty().selects(ObjectKind::Net));
    }
}
