use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::hierarchy::catalog::{Level, Tier, DIVISION_TOP_LEVEL, MAX_LEVEL};
use crate::hierarchy::error::{HierarchyError, HierarchyResult};
use crate::models::{Entity, EntityDivision, EntityId, NodeRef};
use crate::store::HierarchyStore;

/// One (level, id) step of an ancestor chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLink {
    pub level: Level,
    pub id: i64,
}

impl ChainLink {
    pub fn tier(&self) -> Tier {
        self.level.tier()
    }
}

/// Ordered ancestor chain from a leaf node up to its root, strictly increasing in level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AncestorChain {
    links: Vec<ChainLink>,
}

impl AncestorChain {
    pub fn links(&self) -> &[ChainLink] {
        &self.links
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn leaf(&self) -> Option<ChainLink> {
        self.links.first().copied()
    }

    pub fn top(&self) -> Option<ChainLink> {
        self.links.last().copied()
    }

    pub fn id_at(&self, level: Level) -> Option<i64> {
        self.links.iter().find(|l| l.level == level).map(|l| l.id)
    }

    /// First entity-tier node of the chain: the leaf itself or the division's owning entity
    pub fn local_entity(&self) -> Option<ChainLink> {
        self.links.iter().find(|l| l.tier() == Tier::Entity).copied()
    }

    pub fn to_assignment(&self) -> LevelAssignment {
        let mut slots = [None; MAX_LEVEL as usize];
        for link in &self.links {
            slots[link.level.slot_index()] = Some(link.id);
        }
        LevelAssignment { slots }
    }
}

/// The seven sparse Level_1..Level_7 slots recording a subject's place in the hierarchy.
///
/// Slots at and above the subject's level hold the ancestor id at that level;
/// every slot below the subject's level is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LevelAssignment {
    slots: [Option<i64>; MAX_LEVEL as usize],
}

impl LevelAssignment {
    pub fn from_slots(slots: [Option<i64>; MAX_LEVEL as usize]) -> Self {
        Self { slots }
    }

    pub fn slots(&self) -> &[Option<i64>; MAX_LEVEL as usize] {
        &self.slots
    }

    pub fn slot(&self, level: Level) -> Option<i64> {
        self.slots[level.slot_index()]
    }

    /// Effective level: the lowest populated slot
    pub fn level(&self) -> Option<Level> {
        Level::all().find(|l| self.slot(*l).is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// True when the subject sits at or below `id` at `level`
    pub fn is_under(&self, level: Level, id: i64) -> bool {
        self.slot(level) == Some(id)
    }

    pub fn contains_id(&self, id: i64) -> bool {
        self.slots.iter().any(|s| *s == Some(id))
    }
}

/// Walks parent pointers from a leaf up to the hierarchy root
#[derive(Clone)]
pub struct AncestorChainResolver {
    store: Arc<dyn HierarchyStore>,
}

impl AncestorChainResolver {
    pub fn new(store: Arc<dyn HierarchyStore>) -> Self {
        Self { store }
    }

    /// Resolve(leafId, leafLevel): the leaf must exist at exactly the stated level
    pub async fn resolve(&self, leaf_id: i64, leaf_level: Level) -> HierarchyResult<AncestorChain> {
        match leaf_level.tier() {
            Tier::Division => {
                let leaf = self.load_division_leaf(leaf_id).await?;
                if leaf.level != leaf_level {
                    return Err(HierarchyError::InvalidLevel(leaf_level.into()));
                }
                self.resolve_from_division(leaf).await
            }
            Tier::Entity => {
                let leaf = self.load_entity_leaf(leaf_id).await?;
                if leaf.level != leaf_level {
                    return Err(HierarchyError::InvalidLevel(leaf_level.into()));
                }
                self.resolve_from_entity(leaf).await
            }
        }
    }

    /// Resolve a chain starting at a node whose level is read from storage
    pub async fn resolve_node(&self, node: NodeRef) -> HierarchyResult<AncestorChain> {
        match node {
            NodeRef::Division(id) => {
                let leaf = self.load_division_leaf(id).await?;
                self.resolve_from_division(leaf).await
            }
            NodeRef::Entity(id) => {
                let leaf = self.load_entity_leaf(id).await?;
                self.resolve_from_entity(leaf).await
            }
        }
    }

    pub async fn resolve_from_division(&self, leaf: EntityDivision) -> HierarchyResult<AncestorChain> {
        let mut links = Vec::with_capacity(MAX_LEVEL as usize);
        let owning_entity = self.walk_divisions(leaf, &mut links).await?;
        let from_id = links.last().map(|l| l.id).unwrap_or_default();
        let entity = self.load_ancestor_entity(owning_entity, from_id).await?;
        self.walk_entities(entity, &mut links).await?;
        Ok(AncestorChain { links })
    }

    pub async fn resolve_from_entity(&self, leaf: Entity) -> HierarchyResult<AncestorChain> {
        let mut links = Vec::with_capacity(MAX_LEVEL as usize);
        self.walk_entities(leaf, &mut links).await?;
        Ok(AncestorChain { links })
    }

    /// Follow parent-division pointers until the subtree top or the tier boundary,
    /// then hand back the owning entity id
    async fn walk_divisions(
        &self,
        leaf: EntityDivision,
        links: &mut Vec<ChainLink>,
    ) -> HierarchyResult<EntityId> {
        let mut current = leaf;
        loop {
            tracing::debug!(
                "chain hop: division {} at level {} (entity {})",
                current.id,
                current.level,
                current.entity_id
            );
            links.push(ChainLink {
                level: current.level,
                id: current.id,
            });

            // Level 4 crosses into the entity tier through the owning entity, never a division pointer
            if current.level.get() == DIVISION_TOP_LEVEL {
                return Ok(current.entity_id);
            }

            let Some(parent_id) = current.parent_division_id else {
                return Ok(current.entity_id);
            };

            let parent = self
                .store
                .division(parent_id)
                .await?
                .filter(EntityDivision::is_active)
                .ok_or_else(|| dangling(Tier::Division, current.id, parent_id))?;

            if parent.level <= current.level {
                return Err(inconsistent(
                    current.id,
                    format!(
                        "parent division {} has level {} which is not above {}",
                        parent.id, parent.level, current.level
                    ),
                ));
            }
            if parent.entity_id != current.entity_id {
                return Err(inconsistent(
                    current.id,
                    format!(
                        "parent division {} belongs to entity {} instead of {}",
                        parent.id, parent.entity_id, current.entity_id
                    ),
                ));
            }
            current = parent;
        }
    }

    /// Follow parent-entity pointers until a root (no parent) is reached
    async fn walk_entities(&self, start: Entity, links: &mut Vec<ChainLink>) -> HierarchyResult<()> {
        if let Some(below) = links.last() {
            if start.level <= below.level {
                return Err(inconsistent(
                    start.id,
                    format!("entity level {} is not above division level {}", start.level, below.level),
                ));
            }
        }

        let mut current = start;
        loop {
            tracing::debug!("chain hop: entity {} at level {}", current.id, current.level);
            links.push(ChainLink {
                level: current.level,
                id: current.id,
            });

            let Some(parent_id) = current.parent_id else {
                return Ok(());
            };

            let parent = self.load_ancestor_entity(parent_id, current.id).await?;
            if parent.level <= current.level {
                return Err(inconsistent(
                    current.id,
                    format!(
                        "parent entity {} has level {} which is not above {}",
                        parent.id, parent.level, current.level
                    ),
                ));
            }
            current = parent;
        }
    }

    async fn load_division_leaf(&self, id: i64) -> HierarchyResult<EntityDivision> {
        self.store
            .division(id)
            .await?
            .filter(EntityDivision::is_active)
            .ok_or(HierarchyError::NodeNotFound {
                tier: Tier::Division,
                id,
            })
    }

    async fn load_entity_leaf(&self, id: i64) -> HierarchyResult<Entity> {
        self.store
            .entity(id)
            .await?
            .filter(Entity::is_active)
            .ok_or(HierarchyError::NodeNotFound {
                tier: Tier::Entity,
                id,
            })
    }

    async fn load_ancestor_entity(&self, id: EntityId, from_id: i64) -> HierarchyResult<Entity> {
        self.store
            .entity(id)
            .await?
            .filter(Entity::is_active)
            .ok_or_else(|| dangling(Tier::Entity, from_id, id))
    }
}

fn dangling(tier: Tier, from_id: i64, missing_id: i64) -> HierarchyError {
    tracing::error!(
        "hierarchy consistency violation: {:?} node {} referenced from {} is missing",
        tier,
        missing_id,
        from_id
    );
    HierarchyError::DanglingAncestor {
        tier,
        from_id,
        missing_id,
    }
}

fn inconsistent(node_id: i64, reason: String) -> HierarchyError {
    tracing::error!("hierarchy consistency violation at node {}: {}", node_id, reason);
    HierarchyError::InconsistentHierarchy { node_id, reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    fn level(n: i64) -> Level {
        Level::new(n).unwrap()
    }

    #[tokio::test]
    async fn full_chain_from_lowest_division() {
        let fx = Fixture::standard().await;
        let chain = fx.resolver().resolve(fx.section, level(1)).await.unwrap();

        assert_eq!(chain.len(), 7);
        let levels: Vec<u8> = chain.links().iter().map(|l| l.level.get()).collect();
        assert_eq!(levels, vec![1, 2, 3, 4, 5, 6, 7]);
        let ids: Vec<i64> = chain.links().iter().map(|l| l.id).collect();
        assert_eq!(
            ids,
            vec![fx.section, fx.semester, fx.degree, fx.department, fx.college, fx.university, fx.platform]
        );
        assert_eq!(chain.top().map(|l| l.id), Some(fx.platform));
    }

    #[tokio::test]
    async fn chain_length_matches_leaf_level() {
        let fx = Fixture::standard().await;
        let resolver = fx.resolver();
        for (id, lvl) in [
            (fx.semester, 2),
            (fx.degree, 3),
            (fx.department, 4),
            (fx.college, 5),
            (fx.university, 6),
            (fx.platform, 7),
        ] {
            let chain = resolver.resolve(id, level(lvl)).await.unwrap();
            assert_eq!(chain.len() as i64, 7 - lvl + 1, "leaf level {}", lvl);
            assert!(chain.links().windows(2).all(|w| w[0].level < w[1].level));
        }
    }

    #[tokio::test]
    async fn tier_tops_yield_single_element_within_tier() {
        let fx = Fixture::standard().await;
        let chain = fx.resolver().resolve(fx.platform, level(7)).await.unwrap();
        assert_eq!(chain.links(), &[ChainLink { level: level(7), id: fx.platform }]);
    }

    #[tokio::test]
    async fn level_four_crosses_via_owning_entity() {
        let fx = Fixture::standard().await;
        // Corrupt the department with a division parent pointer; it must be ignored
        fx.store.force_division_parent(fx.department, Some(fx.degree)).await;

        let chain = fx.resolver().resolve(fx.department, level(4)).await.unwrap();
        assert_eq!(chain.id_at(level(5)), Some(fx.college));
        assert_eq!(chain.len(), 4);
    }

    #[tokio::test]
    async fn subtree_root_division_continues_through_entity_tier() {
        let fx = Fixture::standard().await;
        let chain = fx.resolver().resolve(fx.orphan_grade, level(3)).await.unwrap();
        let levels: Vec<u8> = chain.links().iter().map(|l| l.level.get()).collect();
        assert_eq!(levels, vec![3, 5, 6, 7]);
        assert_eq!(chain.leaf().map(|l| l.id), Some(fx.orphan_grade));
        assert_eq!(chain.local_entity().map(|l| l.id), Some(fx.college));
    }

    #[tokio::test]
    async fn missing_parent_is_dangling_ancestor() {
        let fx = Fixture::standard().await;
        fx.store.force_division_parent(fx.semester, Some(9_999)).await;

        let err = fx.resolver().resolve(fx.section, level(1)).await.unwrap_err();
        assert!(matches!(
            err,
            HierarchyError::DanglingAncestor { tier: Tier::Division, from_id, missing_id: 9_999 }
                if from_id == fx.semester
        ));
        assert!(err.is_integrity_fault());
    }

    #[tokio::test]
    async fn stated_level_must_match_node() {
        let fx = Fixture::standard().await;
        let err = fx.resolver().resolve(fx.degree, level(2)).await.unwrap_err();
        assert!(matches!(err, HierarchyError::InvalidLevel(2)));
    }

    #[tokio::test]
    async fn unknown_leaf_is_not_found() {
        let fx = Fixture::standard().await;
        let err = fx.resolver().resolve(123_456, level(6)).await.unwrap_err();
        assert!(matches!(err, HierarchyError::NodeNotFound { tier: Tier::Entity, id: 123_456 }));
    }

    #[tokio::test]
    async fn assignment_mirrors_chain() {
        let fx = Fixture::standard().await;
        let chain = fx.resolver().resolve(fx.degree, level(3)).await.unwrap();
        let assignment = chain.to_assignment();

        assert_eq!(assignment.level(), Some(level(3)));
        assert_eq!(assignment.slot(level(1)), None);
        assert_eq!(assignment.slot(level(2)), None);
        assert_eq!(assignment.slot(level(3)), Some(fx.degree));
        assert_eq!(assignment.slot(level(7)), Some(fx.platform));
        assert!(assignment.is_under(level(5), fx.college));
    }
}
