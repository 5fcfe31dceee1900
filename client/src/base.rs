use shared::{BaseNetId, PlayerIndex, TowerId, Vec3};

/// Id space reserved for each owner so concurrent placements never collide.
pub const BASE_ID_STRIDE: BaseNetId = 100_000;

/// A placed tower base. Carries at most one tower, whose id equals the base's
/// net id.
#[derive(Debug, Clone, PartialEq)]
pub struct TowerBase {
    pub net_id: BaseNetId,
    pub owner_index: PlayerIndex,
    pub position: Vec3,
    pub tower: Option<TowerId>,
}

impl TowerBase {
    pub fn new(net_id: BaseNetId, owner_index: PlayerIndex, position: Vec3) -> Self {
        Self {
            net_id,
            owner_index,
            position,
            tower: None,
        }
    }

    pub fn has_tower(&self) -> bool {
        self.tower.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct BaseIdAllocator {
    owner_index: PlayerIndex,
    next: BaseNetId,
}

impl BaseIdAllocator {
    pub fn new(owner_index: PlayerIndex) -> Self {
        Self {
            owner_index,
            next: 1,
        }
    }

    pub fn allocate(&mut self) -> BaseNetId {
        let id = self.owner_index * BASE_ID_STRIDE + self.next;
        self.next += 1;
        id
    }

    /// Owner a net id was allocated for.
    pub fn owner_of(net_id: BaseNetId) -> PlayerIndex {
        net_id / BASE_ID_STRIDE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_partitioned_by_owner() {
        let mut host = BaseIdAllocator::new(0);
        let mut guest = BaseIdAllocator::new(2);
        assert_eq!(host.allocate(), 1);
        assert_eq!(host.allocate(), 2);
        assert_eq!(guest.allocate(), 200_001);
        assert_eq!(BaseIdAllocator::owner_of(200_001), 2);
        assert_eq!(BaseIdAllocator::owner_of(2), 0);
    }
}
