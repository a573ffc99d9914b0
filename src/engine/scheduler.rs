//! Stage planning.
//!
//! This module groups an ordered run of systems into **stages**:
//! * systems within the same stage do **not** conflict on data access,
//! * stages keep the order of the run they were built from.
//!
//! Stages are metadata. The dispatcher executes systems one at a time, but
//! exposes its compiled chain as stages so callers can see which systems a
//! parallel executor could overlap.

use crate::engine::systems::SystemInfo;


/// A group of consecutive systems with pairwise compatible access.
///
/// ## Invariants
/// * All systems within a `Stage` are pairwise [compatible](SystemInfo::compatible)
/// * Systems are listed in execution order

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Stage {
    /// Indices of the systems in the stage.
    pub systems: Vec<usize>,
}

impl Stage {
    /// Number of systems in the stage.
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    /// Returns `true` if the stage has no systems.
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }
}

/// Partitions an ordered run of systems into stages.
///
/// ## Algorithm
/// Systems are visited in run order and assigned greedily:
/// * a system joins the last stage if it is compatible with every system
///   already in it,
/// * otherwise it opens a new stage.
///
/// Joining an earlier stage would reorder the run, so only the last stage is
/// considered.
///
/// ## Complexity
/// * O(n²) in the worst case (one large stage)

pub fn make_stages<'a, I>(systems: I) -> Vec<Stage>
where
    I: IntoIterator<Item = (usize, &'a SystemInfo)>,
{
    let mut stages: Vec<Stage> = Vec::new();
    let mut infos: Vec<&SystemInfo> = Vec::new();

    for (index, info) in systems {
        let fits = !infos.is_empty() && infos.iter().all(|other| info.compatible(other));
        if fits {
            if let Some(stage) = stages.last_mut() {
                stage.systems.push(index);
            }
        } else {
            infos.clear();
            stages.push(Stage { systems: vec![index] });
        }
        infos.push(info);
    }
    stages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::registry::Types;
    use crate::engine::storage::TypeOps;

    struct Health;
    struct Mana;

    #[test]
    fn conflicting_systems_split_stages_in_order() {
        let mut types = Types::new();
        let health = types.add_component(TypeOps::of::<Health>()).unwrap();
        let mana = types.add_component(TypeOps::of::<Mana>()).unwrap();

        let mut read_health = SystemInfo::new();
        read_health.read(&types, health);
        let mut write_mana = SystemInfo::new();
        write_mana.write(&types, mana);
        let mut write_health = SystemInfo::new();
        write_health.write(&types, health);
        let raw = SystemInfo::world();

        let infos = [read_health.clone(), write_mana, write_health, read_health, raw];
        let stages = make_stages(infos.iter().enumerate());

        let systems: Vec<Vec<usize>> = stages.into_iter().map(|s| s.systems).collect();
        assert_eq!(systems, vec![vec![0, 1], vec![2], vec![3], vec![4]]);
    }
}
