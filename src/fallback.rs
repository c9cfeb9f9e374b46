use std::fmt;

use serde::Serialize;

use crate::family::ModelFamily;

/// Priority-ordered, duplicate-free list of families to attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CandidateList {
    families: Vec<ModelFamily>,
}

impl CandidateList {
    pub fn families(&self) -> &[ModelFamily] {
        &self.families
    }

    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ModelFamily> + '_ {
        self.families.iter().copied()
    }

    fn push_unique(&mut self, family: ModelFamily) {
        if !self.families.contains(&family) {
            self.families.push(family);
        }
    }
}

impl fmt::Display for CandidateList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels = self
            .families
            .iter()
            .map(ModelFamily::as_str)
            .collect::<Vec<_>>()
            .join(", ");

        write!(f, "[{labels}]")
    }
}

/// Build the attempt order: the primary guess first (when there is one), then
/// every vocabulary entry not already present, in vocabulary order.
pub fn plan(primary: Option<ModelFamily>, vocabulary: &[ModelFamily]) -> CandidateList {
    let mut candidates = CandidateList {
        families: Vec::with_capacity(vocabulary.len() + 1),
    };

    if let Some(family) = primary {
        candidates.push_unique(family);
    }

    for family in vocabulary {
        candidates.push_unique(*family);
    }

    candidates
}
