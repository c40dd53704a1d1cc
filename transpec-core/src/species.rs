//! Species registry.
//!
//! Species names are interned into dense indices at load time so that the
//! hot opacity-synthesis path works with fixed-size arrays instead of
//! string-keyed maps. The registry also carries the per-species molecular
//! mass and static polarizability used by the mean-molecular-weight and
//! Rayleigh scattering calculations.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Dense index of a species in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpeciesId(pub usize);

/// Static per-species data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeciesInfo {
    pub name: String,
    /// Molecular mass
    /// unit: AMU
    pub mass: f64,
    /// Static polarizability, zero for species that do not Rayleigh-scatter
    /// appreciably (e.g. free electrons)
    /// unit: m^3
    pub polarizability: f64,
}

/// Registry mapping species names to dense indices and static data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeciesRegistry {
    info: Vec<SpeciesInfo>,
    by_name: HashMap<String, SpeciesId>,
}

impl SpeciesRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a species, returning its id. Re-registering an existing name
    /// returns the existing id without updating the stored data.
    pub fn register(&mut self, name: &str, mass: f64, polarizability: f64) -> SpeciesId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = SpeciesId(self.info.len());
        self.info.push(SpeciesInfo {
            name: name.to_string(),
            mass,
            polarizability,
        });
        self.by_name.insert(name.to_string(), id);
        id
    }

    pub fn get(&self, name: &str) -> Option<SpeciesId> {
        self.by_name.get(name).copied()
    }

    pub fn info(&self, id: SpeciesId) -> &SpeciesInfo {
        &self.info[id.0]
    }

    pub fn name(&self, id: SpeciesId) -> &str {
        &self.info[id.0].name
    }

    pub fn len(&self) -> usize {
        self.info.len()
    }

    pub fn is_empty(&self) -> bool {
        self.info.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SpeciesId, &SpeciesInfo)> {
        self.info.iter().enumerate().map(|(i, s)| (SpeciesId(i), s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent() {
        let mut registry = SpeciesRegistry::new();
        let h2o = registry.register("H2O", 18.0, 1.45e-30);
        let co2 = registry.register("CO2", 44.0, 2.91e-30);
        assert_ne!(h2o, co2);
        assert_eq!(registry.register("H2O", 18.0, 1.45e-30), h2o);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("CO2"), Some(co2));
        assert_eq!(registry.get("CH4"), None);
        assert_eq!(registry.name(h2o), "H2O");
    }
}
