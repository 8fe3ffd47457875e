//! CQL consistency levels (`spec.md` §6).

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Consistency {
    Any,
    One,
    Two,
    Three,
    Quorum,
    All,
    LocalQuorum,
    EachQuorum,
    Serial,
    LocalSerial,
    LocalOne,
}

impl Consistency {
    pub const fn code(self) -> u16 {
        match self {
            Consistency::Any => 0x0000,
            Consistency::One => 0x0001,
            Consistency::Two => 0x0002,
            Consistency::Three => 0x0003,
            Consistency::Quorum => 0x0004,
            Consistency::All => 0x0005,
            Consistency::LocalQuorum => 0x0006,
            Consistency::EachQuorum => 0x0007,
            Consistency::Serial => 0x0008,
            Consistency::LocalSerial => 0x0009,
            Consistency::LocalOne => 0x000A,
        }
    }

    pub const fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            0x0000 => Consistency::Any,
            0x0001 => Consistency::One,
            0x0002 => Consistency::Two,
            0x0003 => Consistency::Three,
            0x0004 => Consistency::Quorum,
            0x0005 => Consistency::All,
            0x0006 => Consistency::LocalQuorum,
            0x0007 => Consistency::EachQuorum,
            0x0008 => Consistency::Serial,
            0x0009 => Consistency::LocalSerial,
            0x000A => Consistency::LocalOne,
            _ => return None,
        })
    }

    /// Default consistency: `localOne`, or `localQuorum` when the cluster
    /// reports the managed-service flag (`spec.md` §6).
    pub fn default_for(managed_service: bool) -> Self {
        if managed_service {
            Consistency::LocalQuorum
        } else {
            Consistency::LocalOne
        }
    }
}

impl Default for Consistency {
    fn default() -> Self {
        Consistency::LocalOne
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_roundtrip() {
        let all = [
            Consistency::Any, Consistency::One, Consistency::Two, Consistency::Three,
            Consistency::Quorum, Consistency::All, Consistency::LocalQuorum,
            Consistency::EachQuorum, Consistency::Serial, Consistency::LocalSerial,
            Consistency::LocalOne,
        ];
        for c in all {
            assert_eq!(Consistency::from_code(c.code()), Some(c));
        }
    }
}
