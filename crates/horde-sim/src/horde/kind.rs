//! Horde kinds and the registry they are looked up in.
//!
//! A [`HordeKind`] describes one kind of sub-population: which entity classes
//! it spawns and how many per unit of density, what population bucket it
//! draws from, which characteristics it contributes and which other kinds it
//! may share a horde with. Kinds are registered once at startup:
//!
//! ```
//! use horde_sim::horde::kind::{HordeKindRegistry, UniformHordeKind};
//! use horde_world::entity::EntityClassId;
//!
//! let registry = HordeKindRegistry::builder()
//!     .register(UniformHordeKind::new("wandering", vec![EntityClassId(1), EntityClassId(2)]))?
//!     .register(UniformHordeKind::new("screamer", vec![EntityClassId(9)]))?
//!     .build();
//! assert_eq!(registry.len(), 2);
//! assert!(registry.get("wandering").is_some());
//! # Ok::<(), horde_sim::SimError>(())
//! ```

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use horde_world::entity::EntityClassId;
use horde_world::live::PopulationCategory;
use horde_world::random::WorldRandom;
use serde::Serialize;
use tracing::debug;

use super::characteristics::HordeCharacteristics;
use super::group::SpawnConditions;
use crate::ai::command::CommandGenerator;
use crate::SimError;

/// Registered name of a horde kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct HordeKindId(pub &'static str);

impl Borrow<str> for HordeKindId {
    fn borrow(&self) -> &str {
        self.0
    }
}

impl fmt::Display for HordeKindId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

// ---------------------------------------------------------------------------
// EntityGenerator
// ---------------------------------------------------------------------------

/// Chooses entity classes for one spawn batch.
pub trait EntityGenerator: Send + fmt::Debug {
    /// Entities to create for a cluster of the given density.
    fn determine_entity_count(&self, density: f32) -> usize;

    /// Class of the next entity in the batch.
    fn next_class(&mut self, random: &mut WorldRandom) -> EntityClassId;
}

// ---------------------------------------------------------------------------
// HordeKind
// ---------------------------------------------------------------------------

/// One kind of horde population.
pub trait HordeKind: Send + Sync + fmt::Debug {
    fn id(&self) -> HordeKindId;

    /// Population bucket spawns are checked against.
    fn category(&self) -> PopulationCategory {
        PopulationCategory::Enemy
    }

    /// Build the generator for a spawn facing `conditions`.
    fn create_entity_generator(
        &self,
        conditions: &SpawnConditions<'_>,
        random: &mut WorldRandom,
    ) -> Box<dyn EntityGenerator>;

    fn create_characteristics(&self) -> HordeCharacteristics {
        HordeCharacteristics::default()
    }

    /// `true` if clusters of this kind may share a horde with `other`.
    fn can_merge_with(&self, other: &dyn HordeKind) -> bool {
        self.id() == other.id()
    }

    /// Optional command generator run by each live entity before the group
    /// objective.
    fn entity_command_generator(&self) -> Option<Box<dyn CommandGenerator>> {
        None
    }
}

// ---------------------------------------------------------------------------
// HordeKindRegistry
// ---------------------------------------------------------------------------

/// Immutable set of kinds, shared by the tracker and populators.
#[derive(Debug, Clone, Default)]
pub struct HordeKindRegistry {
    kinds: BTreeMap<HordeKindId, Arc<dyn HordeKind>>,
}

impl HordeKindRegistry {
    pub fn builder() -> HordeKindRegistryBuilder {
        HordeKindRegistryBuilder::default()
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn HordeKind>> {
        self.kinds.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = HordeKindId> + '_ {
        self.kinds.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn HordeKind>> {
        self.kinds.values()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

/// Collects kinds, rejecting duplicate names.
#[derive(Debug, Default)]
pub struct HordeKindRegistryBuilder {
    kinds: BTreeMap<HordeKindId, Arc<dyn HordeKind>>,
}

impl HordeKindRegistryBuilder {
    pub fn register(self, kind: impl HordeKind + 'static) -> Result<Self, SimError> {
        self.register_arc(Arc::new(kind))
    }

    pub fn register_arc(mut self, kind: Arc<dyn HordeKind>) -> Result<Self, SimError> {
        let id = kind.id();
        if self.kinds.contains_key(&id) {
            return Err(SimError::DuplicateKind { kind: id.0 });
        }
        self.kinds.insert(id, kind);
        Ok(self)
    }

    pub fn build(self) -> HordeKindRegistry {
        HordeKindRegistry { kinds: self.kinds }
    }
}

// ---------------------------------------------------------------------------
// UniformHordeKind
// ---------------------------------------------------------------------------

/// One spawnable class and the conditions it is eligible under.
///
/// ```
/// use horde_sim::horde::kind::ClassEntry;
/// use horde_world::entity::EntityClassId;
///
/// let brute = ClassEntry::new(EntityClassId(4)).from_gamestage(50).in_biomes(&["snow"]);
/// assert!(brute.is_eligible(80, "snow"));
/// assert!(!brute.is_eligible(80, "desert"));
/// assert!(!brute.is_eligible(20, "snow"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ClassEntry {
    pub class: EntityClassId,
    /// Lowest gamestage the class appears at.
    pub min_gamestage: u32,
    /// Gamestage from which the class no longer appears.
    pub max_gamestage: Option<u32>,
    /// Biomes the class appears in; empty means everywhere.
    pub biomes: Vec<&'static str>,
}

impl ClassEntry {
    pub fn new(class: EntityClassId) -> Self {
        Self {
            class,
            min_gamestage: 0,
            max_gamestage: None,
            biomes: Vec::new(),
        }
    }

    pub fn from_gamestage(mut self, gamestage: u32) -> Self {
        self.min_gamestage = gamestage;
        self
    }

    pub fn until_gamestage(mut self, gamestage: u32) -> Self {
        self.max_gamestage = Some(gamestage);
        self
    }

    pub fn in_biomes(mut self, biomes: &[&'static str]) -> Self {
        self.biomes = biomes.to_vec();
        self
    }

    pub fn is_eligible(&self, gamestage: u32, biome: &str) -> bool {
        gamestage >= self.min_gamestage
            && self.max_gamestage.map_or(true, |max| gamestage < max)
            && (self.biomes.is_empty() || self.biomes.iter().any(|b| *b == biome))
    }
}

/// A kind that picks uniformly among the classes eligible for the facing
/// group and spawns a fixed number of entities per unit of density.
#[derive(Debug, Clone)]
pub struct UniformHordeKind {
    id: HordeKindId,
    entries: Vec<ClassEntry>,
    entities_per_density: f32,
    category: PopulationCategory,
    characteristics: HordeCharacteristics,
    merges_with: Vec<HordeKindId>,
}

impl UniformHordeKind {
    /// Entities spawned per unit of density unless overridden.
    pub const DEFAULT_ENTITIES_PER_DENSITY: f32 = 4.0;

    /// A kind whose `classes` are eligible under any conditions.
    pub fn new(id: &'static str, classes: Vec<EntityClassId>) -> Self {
        Self {
            id: HordeKindId(id),
            entries: classes.into_iter().map(ClassEntry::new).collect(),
            entities_per_density: Self::DEFAULT_ENTITIES_PER_DENSITY,
            category: PopulationCategory::Enemy,
            characteristics: HordeCharacteristics::new()
                .with_walk_speed(1.0, 1.5)
                .with_sensitivity(1.0),
            merges_with: Vec::new(),
        }
    }

    /// Add a class gated by gamestage or biome.
    pub fn with_entry(mut self, entry: ClassEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn with_entities_per_density(mut self, entities: f32) -> Self {
        self.entities_per_density = entities;
        self
    }

    pub fn with_category(mut self, category: PopulationCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_characteristics(mut self, characteristics: HordeCharacteristics) -> Self {
        self.characteristics = characteristics;
        self
    }

    /// Also allow merging with clusters of `other`.
    pub fn merging_with(mut self, other: &'static str) -> Self {
        self.merges_with.push(HordeKindId(other));
        self
    }

    /// Classes eligible at `gamestage` in `biome`. Falls back to every
    /// class when nothing qualifies.
    pub fn eligible_classes(&self, gamestage: u32, biome: &str) -> Vec<EntityClassId> {
        let eligible: Vec<EntityClassId> = self
            .entries
            .iter()
            .filter(|e| e.is_eligible(gamestage, biome))
            .map(|e| e.class)
            .collect();
        if eligible.is_empty() {
            debug!(kind = %self.id, gamestage, biome, "no eligible classes, using all");
            return self.entries.iter().map(|e| e.class).collect();
        }
        eligible
    }
}

#[derive(Debug, Clone)]
struct UniformGenerator {
    classes: Vec<EntityClassId>,
    entities_per_density: f32,
}

impl EntityGenerator for UniformGenerator {
    fn determine_entity_count(&self, density: f32) -> usize {
        if density <= 0.0 || self.classes.is_empty() {
            return 0;
        }
        ((density * self.entities_per_density).ceil() as usize).max(1)
    }

    fn next_class(&mut self, random: &mut WorldRandom) -> EntityClassId {
        random
            .choose(&self.classes)
            .copied()
            .unwrap_or(EntityClassId(0))
    }
}

impl HordeKind for UniformHordeKind {
    fn id(&self) -> HordeKindId {
        self.id
    }

    fn category(&self) -> PopulationCategory {
        self.category
    }

    fn create_entity_generator(
        &self,
        conditions: &SpawnConditions<'_>,
        _random: &mut WorldRandom,
    ) -> Box<dyn EntityGenerator> {
        Box::new(UniformGenerator {
            classes: self.eligible_classes(conditions.gamestage, conditions.biome),
            entities_per_density: self.entities_per_density,
        })
    }

    fn create_characteristics(&self) -> HordeCharacteristics {
        self.characteristics.clone()
    }

    fn can_merge_with(&self, other: &dyn HordeKind) -> bool {
        other.id() == self.id || self.merges_with.contains(&other.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;
    use crate::horde::group::PlayerHordeGroup;
    use glam::Vec3;
    use horde_world::player::{PlayerId, PlayerSnapshot};

    fn group(gamestage: u32) -> PlayerHordeGroup {
        PlayerHordeGroup::new(vec![PlayerSnapshot::new(PlayerId(1), Vec3::ZERO, gamestage)]).unwrap()
    }

    fn batch(kind: &UniformHordeKind, group: &PlayerHordeGroup, config: &TrackerConfig) -> Vec<EntityClassId> {
        let mut random = WorldRandom::from_seed(11);
        let mut generator = kind.create_entity_generator(&group.conditions(config), &mut random);
        let count = generator.determine_entity_count(2.0);
        (0..count).map(|_| generator.next_class(&mut random)).collect()
    }

    #[test]
    fn duplicate_kind_is_rejected() {
        let result = HordeKindRegistry::builder()
            .register(UniformHordeKind::new("a", vec![EntityClassId(1)]))
            .and_then(|b| b.register(UniformHordeKind::new("a", vec![EntityClassId(2)])));
        assert!(matches!(result, Err(SimError::DuplicateKind { kind: "a" })));
    }

    #[test]
    fn lookup_by_name() {
        let registry = HordeKindRegistry::builder()
            .register(UniformHordeKind::new("a", vec![EntityClassId(1)]))
            .unwrap()
            .build();
        assert_eq!(registry.get("a").unwrap().id(), HordeKindId("a"));
        assert!(registry.get("b").is_none());
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec![HordeKindId("a")]);
    }

    #[test]
    fn uniform_generator_counts_and_picks() {
        let kind = UniformHordeKind::new("a", vec![EntityClassId(3), EntityClassId(4)]).with_entities_per_density(5.0);
        let mut random = WorldRandom::from_seed(1);
        let config = TrackerConfig::default();
        let group = group(10);
        let mut generator = kind.create_entity_generator(&group.conditions(&config), &mut random);
        assert_eq!(generator.determine_entity_count(1.0), 5);
        assert_eq!(generator.determine_entity_count(0.1), 1);
        assert_eq!(generator.determine_entity_count(0.0), 0);
        for _ in 0..16 {
            let class = generator.next_class(&mut random);
            assert!(class == EntityClassId(3) || class == EntityClassId(4));
        }
    }

    #[test]
    fn merge_compatibility_is_opt_in_across_kinds() {
        let a = UniformHordeKind::new("a", vec![EntityClassId(1)]).merging_with("b");
        let b = UniformHordeKind::new("b", vec![EntityClassId(2)]);
        assert!(a.can_merge_with(&a));
        assert!(a.can_merge_with(&b));
        assert!(!b.can_merge_with(&a));
    }

    #[test]
    fn higher_gamestage_unlocks_a_different_batch() {
        let kind = UniformHordeKind::new("tiered", Vec::new())
            .with_entry(ClassEntry::new(EntityClassId(1)).until_gamestage(100))
            .with_entry(ClassEntry::new(EntityClassId(2)).from_gamestage(100));
        let config = TrackerConfig::default();

        let early = batch(&kind, &group(10), &config);
        let late = batch(&kind, &group(150), &config);
        assert_eq!(early.len(), 8);
        assert_eq!(late.len(), 8);
        assert!(early.iter().all(|&c| c == EntityClassId(1)));
        assert!(late.iter().all(|&c| c == EntityClassId(2)));
    }

    #[test]
    fn biome_gates_classes_and_falls_back_to_all() {
        let kind = UniformHordeKind::new("snowy", vec![EntityClassId(1)])
            .with_entry(ClassEntry::new(EntityClassId(9)).in_biomes(&["snow"]));
        assert_eq!(kind.eligible_classes(0, "snow"), vec![EntityClassId(1), EntityClassId(9)]);
        assert_eq!(kind.eligible_classes(0, "desert"), vec![EntityClassId(1)]);

        let gated = UniformHordeKind::new("late", Vec::new()).with_entry(ClassEntry::new(EntityClassId(3)).from_gamestage(500));
        assert_eq!(gated.eligible_classes(1, "desert"), vec![EntityClassId(3)]);
    }
}
