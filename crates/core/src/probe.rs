//! Status probes
//!
//! A probe is one kind of store query used to classify a path. Callers pick
//! a [`ProbeSet`] to bound how many requests a status resolution may issue.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// A single probe kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Probe {
    /// HEAD of the exact key
    Head,
    /// HEAD of the key plus `/`
    DirMarker,
    /// LIST under the key plus `/`
    List,
}

impl Probe {
    const fn bit(self) -> u8 {
        match self {
            Probe::Head => 0b001,
            Probe::DirMarker => 0b010,
            Probe::List => 0b100,
        }
    }
}

/// An immutable set of probes
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ProbeSet(u8);

impl ProbeSet {
    /// No store queries at all
    pub const NONE: ProbeSet = ProbeSet(0);

    /// Look for files and directories
    pub const ALL: ProbeSet = ProbeSet(0b111);

    /// Only the HEAD of the exact key
    pub const HEAD_ONLY: ProbeSet = ProbeSet(0b001);

    /// Only the LIST
    pub const LIST_ONLY: ProbeSet = ProbeSet(0b100);

    /// Look for files
    pub const FILE: ProbeSet = Self::HEAD_ONLY;

    /// Look for directories; the marker HEAD runs before the costlier LIST
    pub const DIRECTORIES: ProbeSet = ProbeSet(0b110);

    pub const fn contains(self, probe: Probe) -> bool {
        self.0 & probe.bit() != 0
    }

    pub const fn is_superset(self, other: ProbeSet) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: ProbeSet) -> ProbeSet {
        ProbeSet(self.0 | other.0)
    }

    pub const fn with(self, probe: Probe) -> ProbeSet {
        ProbeSet(self.0 | probe.bit())
    }

    pub const fn without(self, probe: Probe) -> ProbeSet {
        ProbeSet(self.0 & !probe.bit())
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Probe> {
        [Probe::Head, Probe::DirMarker, Probe::List]
            .into_iter()
            .filter(move |p| self.contains(*p))
    }
}

impl From<Probe> for ProbeSet {
    fn from(probe: Probe) -> Self {
        ProbeSet(probe.bit())
    }
}

impl BitOr for ProbeSet {
    type Output = ProbeSet;

    fn bitor(self, rhs: ProbeSet) -> ProbeSet {
        self.union(rhs)
    }
}

impl BitOr<Probe> for ProbeSet {
    type Output = ProbeSet;

    fn bitor(self, rhs: Probe) -> ProbeSet {
        self.with(rhs)
    }
}

impl BitOrAssign for ProbeSet {
    fn bitor_assign(&mut self, rhs: ProbeSet) {
        *self = self.union(rhs);
    }
}

impl FromIterator<Probe> for ProbeSet {
    fn from_iter<I: IntoIterator<Item = Probe>>(iter: I) -> Self {
        iter.into_iter().fold(ProbeSet::NONE, ProbeSet::with)
    }
}

impl fmt::Debug for ProbeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
