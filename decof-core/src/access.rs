//! The userlevel ladder (spec §3/§4.6).
//!
//! Variants are declared most-privileged first; `PartialOrd`/`Ord` follow
//! declaration order, so `a <= b` reads as "`a` is at least as privileged
//! as `b`".

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i8)]
pub enum Userlevel {
    Internal = 0,
    Service = 1,
    Maintenance = 2,
    Normal = 3,
    Readonly = 4,
    Forbidden = 5,
}

impl Userlevel {
    /// The wire numeric code used by `param-ref 'ul`/`exec 'change-ul` and
    /// the SCGI layer. This is a historical, fixed numbering distinct from
    /// the privilege-ladder declaration order above (which only governs
    /// `PartialOrd`/`Ord` for access checks): `Internal` is 0 and a fresh
    /// context's default level, `Normal`, is 1 (spec §8 scenario 3), with
    /// the remaining assignable levels following.
    pub fn from_assignable_i64(v: i64) -> Option<Self> {
        match v {
            0 => Some(Userlevel::Internal),
            1 => Some(Userlevel::Normal),
            2 => Some(Userlevel::Service),
            3 => Some(Userlevel::Maintenance),
            4 => Some(Userlevel::Readonly),
            _ => None,
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            Userlevel::Internal => 0,
            Userlevel::Normal => 1,
            Userlevel::Service => 2,
            Userlevel::Maintenance => 3,
            Userlevel::Readonly => 4,
            Userlevel::Forbidden => 5,
        }
    }

    /// A `Readonly` client reads as if it were `Normal`; every other level
    /// reads as itself. Used only on the read path.
    pub fn effective_for_read(self) -> Self {
        if self == Userlevel::Readonly {
            Userlevel::Normal
        } else {
            self
        }
    }

    /// `Forbidden` is a sentinel, not a real position on the ladder: an
    /// object whose read-level is `Forbidden` denies everyone, including
    /// `Internal` — plain ordinal comparison alone would get this
    /// backwards, since `Forbidden` sorts last and so compares `>=` every
    /// other level.
    pub fn can_read(self, object_read_level: Userlevel) -> bool {
        object_read_level != Userlevel::Forbidden && self.effective_for_read() <= object_read_level
    }

    /// `Readonly` clients can never write, independent of the object's
    /// write level; `Forbidden` denies everyone for the same reason as
    /// [`Userlevel::can_read`].
    pub fn can_write(self, object_write_level: Userlevel) -> bool {
        object_write_level != Userlevel::Forbidden
            && self != Userlevel::Readonly
            && self <= object_write_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn more_privileged_levels_compare_lower() {
        assert!(Userlevel::Internal < Userlevel::Normal);
        assert!(Userlevel::Normal < Userlevel::Forbidden);
    }

    #[test]
    fn readonly_reads_as_normal() {
        assert_eq!(Userlevel::Readonly.effective_for_read(), Userlevel::Normal);
        assert!(Userlevel::Readonly.can_read(Userlevel::Normal));
    }

    #[test]
    fn readonly_can_never_write() {
        assert!(!Userlevel::Readonly.can_write(Userlevel::Readonly));
        assert!(!Userlevel::Readonly.can_write(Userlevel::Internal));
    }

    #[test]
    fn forbidden_object_level_rejects_everyone() {
        assert!(!Userlevel::Internal.can_read(Userlevel::Forbidden));
        assert!(!Userlevel::Internal.can_write(Userlevel::Forbidden));
    }

    #[test]
    fn forbidden_is_not_client_assignable() {
        assert_eq!(Userlevel::from_assignable_i64(5), None);
        assert_eq!(Userlevel::from_assignable_i64(0), Some(Userlevel::Internal));
    }

    #[test]
    fn wire_code_default_level_is_one() {
        assert_eq!(Userlevel::Normal.as_i64(), 1);
        assert_eq!(Userlevel::Internal.as_i64(), 0);
        assert_eq!(Userlevel::from_assignable_i64(1), Some(Userlevel::Normal));
    }
}
