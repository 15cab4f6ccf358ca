//! Privileges and operations, per SPEC_FULL.md §3 and the Open Question
//! resolution recorded in DESIGN.md ("Privilege representation"): abbreviation
//! and bitfield are both fixed conversions on the same enum, and the store
//! layer only ever round-trips the abbreviation form.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the three row-level privileges a table controller can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Privilege {
    Insert,
    Update,
    Delete,
}

impl Privilege {
    pub const ALL: [Privilege; 3] = [Privilege::Insert, Privilege::Update, Privilege::Delete];

    /// Single-letter abbreviation used in `system_acl.privileges` (a `text[]`).
    pub fn as_abbrev(&self) -> char {
        match self {
            Privilege::Insert => 'a',
            Privilege::Update => 'w',
            Privilege::Delete => 'd',
        }
    }

    /// Disjoint bitfield value, used for in-memory set operations.
    pub fn as_bit(&self) -> u8 {
        match self {
            Privilege::Insert => 0b001,
            Privilege::Update => 0b010,
            Privilege::Delete => 0b100,
        }
    }

    pub fn from_abbrev(c: char) -> Option<Self> {
        match c {
            'a' => Some(Privilege::Insert),
            'w' => Some(Privilege::Update),
            'd' => Some(Privilege::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_abbrev())
    }
}

/// A set of privileges, represented as abbreviation strings at the storage
/// boundary and as a bitfield everywhere else.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivilegeSet(pub u8);

impl PrivilegeSet {
    pub fn empty() -> Self {
        PrivilegeSet(0)
    }

    pub fn all() -> Self {
        let mut set = PrivilegeSet::empty();
        for p in Privilege::ALL {
            set.insert(p);
        }
        set
    }

    pub fn insert(&mut self, p: Privilege) {
        self.0 |= p.as_bit();
    }

    pub fn remove(&mut self, p: Privilege) {
        self.0 &= !p.as_bit();
    }

    pub fn contains(&self, p: Privilege) -> bool {
        self.0 & p.as_bit() != 0
    }

    pub fn union(self, other: PrivilegeSet) -> PrivilegeSet {
        PrivilegeSet(self.0 | other.0)
    }

    /// Decode from the `text[]` abbreviation form stored in `system_acl`.
    pub fn from_abbrevs<I: IntoIterator<Item = char>>(chars: I) -> Self {
        let mut set = PrivilegeSet::empty();
        for c in chars {
            if let Some(p) = Privilege::from_abbrev(c) {
                set.insert(p);
            }
        }
        set
    }

    /// Encode to the `text[]` abbreviation form stored in `system_acl`.
    pub fn to_abbrevs(self) -> Vec<String> {
        Privilege::ALL
            .iter()
            .filter(|p| self.contains(**p))
            .map(|p| p.as_abbrev().to_string())
            .collect()
    }
}

/// The kind of statement a payload was classified as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
    Grant,
    Revoke,
    Create,
}

impl Operation {
    /// The row-level privilege this operation requires, if any.
    pub fn required_privilege(&self) -> Option<Privilege> {
        match self {
            Operation::Insert => Some(Privilege::Insert),
            Operation::Update => Some(Privilege::Update),
            Operation::Delete => Some(Privilege::Delete),
            Operation::Select | Operation::Grant | Operation::Revoke | Operation::Create => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abbreviation_and_bit_round_trip() {
        for p in Privilege::ALL {
            let abbrev = p.as_abbrev();
            assert_eq!(Privilege::from_abbrev(abbrev), Some(p));
        }
    }

    #[test]
    fn privilege_set_union_and_removal() {
        let mut set = PrivilegeSet::empty();
        set.insert(Privilege::Insert);
        set.insert(Privilege::Update);
        assert!(set.contains(Privilege::Insert));
        assert!(!set.contains(Privilege::Delete));

        set.remove(Privilege::Insert);
        assert!(!set.contains(Privilege::Insert));
        assert!(set.contains(Privilege::Update));
    }

    #[test]
    fn privilege_set_abbrev_round_trip() {
        let set = PrivilegeSet::from_abbrevs(['a', 'w', 'd']);
        assert_eq!(set, PrivilegeSet::all());
        let mut abbrevs = set.to_abbrevs();
        abbrevs.sort();
        assert_eq!(abbrevs, vec!["a", "d", "w"]);
    }

    #[test]
    fn required_privilege_maps_only_mutations() {
        assert_eq!(Operation::Insert.required_privilege(), Some(Privilege::Insert));
        assert_eq!(Operation::Select.required_privilege(), None);
        assert_eq!(Operation::Create.required_privilege(), None);
    }
}
