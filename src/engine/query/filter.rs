//! # Query filter
//!
//! Evaluates resolved [`QueryTerm`]s against a [`World`] and yields one
//! [`QueryMatch`] per matching tuple of entities.
//!
//! ## Targets
//!
//! Component terms are folded into one *target state* per target: the columns
//! the target's archetype must have, and those it must not have. Matching
//! archetypes are discovered incrementally through
//! [`ArchetypeGraph::collect`](crate::engine::archetype::ArchetypeGraph::collect)
//! and kept sorted, so membership is a binary search.
//!
//! ## Links
//!
//! Each relation term becomes a *link* between two targets. Iteration is a
//! backtracking search over a plan built when the view starts:
//!
//! 1. pinned targets are checked first,
//! 2. links whose two targets are already bound become containment checks,
//! 3. links with one bound target walk that entity's edge list,
//! 4. links with no bound target walk the whole relation,
//! 5. targets untouched by any link scan their archetypes.
//!
//! Symmetric relations yield both orientations of an edge (an edge from an
//! entity to itself once). Tree relations visit their depth layers deepest
//! first for [`Traversal::Up`] and shallowest first otherwise. Orientation is
//! never flipped for trees: `from` is always the child.
//!
//! ## Pins
//!
//! A pin fixes a target to an entity before iteration starts. Pins store
//! entities, never rows, so they stay valid across structural changes. A dead
//! or non-matching pinned entity yields no matches.

use crate::engine::query::term::{QueryTerm, Traversal};
use crate::engine::table::SparseRelationTable;
use crate::engine::types::{ArchetypeId, DataTypeId, Entity, Signature};
use crate::engine::world::World;


#[derive(Clone, Debug, Default)]
struct TargetState {
    with: Signature,
    without: Signature,
    seen: usize,
    archetypes: Vec<ArchetypeId>,
}

/// Relation constraint between two targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Link {
    /// Relation type.
    pub data_type: DataTypeId,
    /// Target bound to the edges' `from` entity.
    pub from_target: usize,
    /// Target bound to the edges' `to` entity.
    pub to_target: usize,
    /// Visiting order.
    pub traversal: Traversal,
    symmetric: bool,
}

/// Edge matched by a link.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RelationMatch {
    /// Entity bound to the link's `from` target.
    pub from: Entity,
    /// Entity bound to the link's `to` target.
    pub to: Entity,
    /// Depth layer holding the edge.
    pub depth: usize,
    /// Row of the edge in its layer.
    pub row: usize,
}

/// One result of a filter.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryMatch {
    /// Entity bound to each target.
    pub entities: Vec<Entity>,
    /// Archetype and dense row of each target's entity.
    pub locations: Vec<(ArchetypeId, usize)>,
    /// Edge matched by each link.
    pub relations: Vec<RelationMatch>,
}

/// Compiled form of a list of resolved terms.
#[derive(Clone, Debug)]
pub struct QueryFilter {
    targets: Vec<TargetState>,
    links: Vec<Link>,
    epoch: u64,
}

fn target_index(target: i32) -> usize {
    match usize::try_from(target) {
        Ok(index) => index,
        Err(_) => {
            log::error!("query term with unresolved target {}", target);
            panic!("query terms must be resolved before building a filter");
        }
    }
}

impl QueryFilter {
    /// Builds a filter from resolved terms.
    ///
    /// # Panics
    /// If a term still has an unset target, or names a type of the wrong
    /// kind.
    pub fn new(world: &World, terms: &[QueryTerm]) -> Self {
        let types = world.types();
        let count = terms
            .iter()
            .map(|term| match *term {
                QueryTerm::Entity { target } | QueryTerm::Component { target, .. } => target_index(target),
                QueryTerm::Relation { from_target, to_target, .. } => {
                    target_index(from_target).max(target_index(to_target))
                }
            })
            .max()
            .map_or(1, |max| max + 1);

        let mut targets = vec![TargetState::default(); count];
        let mut links = Vec::new();
        for term in terms {
            match *term {
                QueryTerm::Entity { .. } => {}
                QueryTerm::Component { data_type, target, without, optional } => {
                    if !types.is_component(data_type) {
                        log::error!("query component term on {:?}, which is not a component", data_type);
                        panic!("type {:?} is not a component", data_type);
                    }
                    let state = &mut targets[target_index(target)];
                    if without {
                        state.without.set(data_type.index());
                    } else if !optional {
                        state.with.set(data_type.index());
                    }
                }
                QueryTerm::Relation { data_type, from_target, to_target, traversal } => {
                    if !types.is_relation(data_type) {
                        log::error!("query relation term on {:?}, which is not a relation", data_type);
                        panic!("type {:?} is not a relation", data_type);
                    }
                    links.push(Link {
                        data_type,
                        from_target: target_index(from_target),
                        to_target: target_index(to_target),
                        traversal,
                        symmetric: types.is_symmetric_relation(data_type),
                    });
                }
            }
        }

        let mut filter = Self { targets, links, epoch: world.epoch() };
        filter.update(world);
        filter
    }

    /// Discovers archetypes created since the last update.
    pub fn update(&mut self, world: &World) {
        if self.epoch != world.epoch() {
            for state in &mut self.targets {
                state.seen = 0;
                state.archetypes.clear();
            }
            self.epoch = world.epoch();
        }
        let mut found = Vec::new();
        for state in &mut self.targets {
            found.clear();
            world.archetypes().collect(&state.with, &mut state.seen, &mut found);
            let without = &state.without;
            state.archetypes.extend(
                found
                    .iter()
                    .copied()
                    .filter(|&archetype| !world.archetypes().signature(archetype).intersects(without)),
            );
        }
    }

    /// Number of targets.
    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Links, in term order.
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Index of the link built from the given relation term.
    pub fn link_index(&self, data_type: DataTypeId, from_target: usize, to_target: usize) -> Option<usize> {
        self.links
            .iter()
            .position(|l| l.data_type == data_type && l.from_target == from_target && l.to_target == to_target)
    }

    /// Archetypes currently known to match `target`, in discovery order.
    pub fn archetypes(&self, target: usize) -> &[ArchetypeId] {
        &self.targets[target].archetypes
    }

    fn matches_archetype(&self, target: usize, archetype: ArchetypeId) -> bool {
        self.targets[target].archetypes.binary_search(&archetype).is_ok()
    }

    /// Starts iterating over the matches in `world`.
    pub fn view<'w>(&'w self, world: &'w World) -> FilterView<'w> {
        FilterView {
            filter: self,
            world,
            pins: vec![None; self.targets.len()],
            steps: Vec::new(),
            states: Vec::new(),
            current: QueryMatch {
                entities: vec![Entity::NULL; self.targets.len()],
                locations: vec![(ArchetypeId::EMPTY, 0); self.targets.len()],
                relations: vec![RelationMatch::default(); self.links.len()],
            },
            started: false,
            done: false,
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Step {
    Pin(usize),
    Scan(usize),
    Check(usize),
    Walk { link: usize, from_bound: bool },
    Full(usize),
}

#[derive(Clone, Copy, Debug)]
enum StepState {
    Once { done: bool },
    Scan { archetype: usize, row: usize },
    Walk { layer: usize, phase: u8, row: Option<usize>, listing: bool },
    Full { layer: usize, row: usize, mirrored: bool },
}

impl StepState {
    fn fresh(step: Step) -> Self {
        match step {
            Step::Pin(_) | Step::Check(_) => StepState::Once { done: false },
            Step::Scan(_) => StepState::Scan { archetype: 0, row: 0 },
            Step::Walk { .. } => StepState::Walk { layer: 0, phase: 0, row: None, listing: false },
            Step::Full(_) => StepState::Full { layer: 0, row: 0, mirrored: false },
        }
    }
}

fn layer_at(traversal: Traversal, position: usize, count: usize) -> usize {
    match traversal {
        Traversal::Up => count - 1 - position,
        Traversal::Down | Traversal::Random => position,
    }
}

/// Iterator over the matches of a [`QueryFilter`].
pub struct FilterView<'w> {
    filter: &'w QueryFilter,
    world: &'w World,
    pins: Vec<Option<Entity>>,
    steps: Vec<Step>,
    states: Vec<StepState>,
    current: QueryMatch,
    started: bool,
    done: bool,
}

impl<'w> FilterView<'w> {
    /// Fixes `target` to `entity`.
    ///
    /// # Panics
    /// If the target does not exist, is already pinned, or iteration has
    /// started.
    pub fn pin(mut self, target: usize, entity: Entity) -> Self {
        assert!(!self.started, "targets must be pinned before iterating");
        let Some(pin) = self.pins.get_mut(target) else {
            log::error!("pinned target {} of a query with {} targets", target, self.filter.targets.len());
            panic!("query has no target {}", target);
        };
        if pin.is_some() {
            log::error!("target {} pinned twice", target);
            panic!("query target {} is already pinned", target);
        }
        *pin = Some(entity);
        self
    }

    /// World being iterated.
    pub fn world(&self) -> &'w World {
        self.world
    }

    /// The match produced by the last successful [`FilterView::advance`].
    pub fn current(&self) -> &QueryMatch {
        &self.current
    }

    fn plan(&mut self) {
        let filter = self.filter;
        let targets = filter.targets.len();
        let links = &filter.links;
        let mut bound = vec![false; targets];
        let mut linked = vec![false; links.len()];

        for (target, pin) in self.pins.iter().enumerate() {
            if pin.is_some() {
                self.steps.push(Step::Pin(target));
                bound[target] = true;
            }
        }

        loop {
            let pending = || links.iter().enumerate().filter(|(i, _)| !linked[*i]);
            let both = pending().find(|(_, l)| bound[l.from_target] && bound[l.to_target]);
            let one = pending().find(|(_, l)| bound[l.from_target] || bound[l.to_target]);
            let none = pending().next();

            let step = if let Some((i, _)) = both {
                Step::Check(i)
            } else if let Some((i, l)) = one {
                Step::Walk { link: i, from_bound: bound[l.from_target] }
            } else if let Some((i, _)) = none {
                Step::Full(i)
            } else if let Some(target) = bound.iter().position(|b| !b) {
                Step::Scan(target)
            } else {
                break;
            };

            match step {
                Step::Check(i) | Step::Walk { link: i, .. } | Step::Full(i) => {
                    linked[i] = true;
                    bound[links[i].from_target] = true;
                    bound[links[i].to_target] = true;
                }
                Step::Scan(target) | Step::Pin(target) => bound[target] = true,
            }
            self.steps.push(step);
        }

        self.states = self.steps.iter().map(|s| StepState::fresh(*s)).collect();
        log::trace!("query plan: {:?}", self.steps);
    }

    /// Moves to the next match. Returns `false` once exhausted.
    pub fn advance(&mut self) -> bool {
        if self.done {
            return false;
        }
        let mut level = if self.started {
            self.steps.len() - 1
        } else {
            self.started = true;
            self.plan();
            0
        };

        loop {
            if self.step(level) {
                if level + 1 == self.steps.len() {
                    return true;
                }
                level += 1;
                self.states[level] = StepState::fresh(self.steps[level]);
            } else if level == 0 {
                self.done = true;
                return false;
            } else {
                level -= 1;
            }
        }
    }

    fn bind(&mut self, target: usize, entity: Entity) -> bool {
        let Some((archetype, row)) = self.world.location(entity) else {
            return false;
        };
        if !self.filter.matches_archetype(target, archetype) {
            return false;
        }
        self.current.entities[target] = entity;
        self.current.locations[target] = (archetype, row);
        true
    }

    fn layers(&self, link: usize) -> &'w [SparseRelationTable] {
        self.world.tables().relation_layers(self.filter.links[link].data_type)
    }

    fn step(&mut self, level: usize) -> bool {
        match self.steps[level] {
            Step::Pin(target) => {
                let StepState::Once { done } = &mut self.states[level] else {
                    return false;
                };
                if *done {
                    return false;
                }
                *done = true;
                match self.pins[target] {
                    Some(entity) => self.bind(target, entity),
                    None => false,
                }
            }
            Step::Check(link) => {
                let StepState::Once { done } = &mut self.states[level] else {
                    return false;
                };
                if *done {
                    return false;
                }
                *done = true;
                self.check(link)
            }
            Step::Scan(target) => self.scan(level, target),
            Step::Walk { link, from_bound } => self.walk(level, link, from_bound),
            Step::Full(link) => self.full(level, link),
        }
    }

    fn check(&mut self, link: usize) -> bool {
        let l = self.filter.links[link];
        let from = self.current.entities[l.from_target];
        let to = self.current.entities[l.to_target];
        match self.world.find_edge(l.data_type, from, to) {
            Some((depth, row)) => {
                self.current.relations[link] = RelationMatch { from, to, depth, row };
                true
            }
            None => false,
        }
    }

    fn scan(&mut self, level: usize, target: usize) -> bool {
        let filter = self.filter;
        let archetypes = &filter.targets[target].archetypes;
        loop {
            let StepState::Scan { archetype, row } = &mut self.states[level] else {
                return false;
            };
            let Some(&id) = archetypes.get(*archetype) else {
                return false;
            };
            let table = match self.world.tables().dense(id) {
                Some(table) if *row < table.len() => table,
                _ => {
                    *archetype += 1;
                    *row = 0;
                    continue;
                }
            };
            let current = *row;
            *row += 1;
            self.current.entities[target] = table.entity(current);
            self.current.locations[target] = (id, current);
            return true;
        }
    }

    /// Binds the link's free side after an edge was found. `from` and `to`
    /// are already oriented as the link's targets.
    fn accept_edge(&mut self, link: usize, from: Entity, to: Entity, depth: usize, row: usize, bind_from: bool, bind_to: bool) -> bool {
        let l = self.filter.links[link];
        if l.from_target == l.to_target && from != to {
            return false;
        }
        if bind_from && !self.bind(l.from_target, from) {
            return false;
        }
        if bind_to && l.from_target != l.to_target && !self.bind(l.to_target, to) {
            return false;
        }
        self.current.relations[link] = RelationMatch { from, to, depth, row };
        true
    }

    fn walk(&mut self, level: usize, link: usize, from_bound: bool) -> bool {
        let l = self.filter.links[link];
        let layers = self.layers(link);
        let bound = if from_bound {
            self.current.entities[l.from_target]
        } else {
            self.current.entities[l.to_target]
        };

        loop {
            let StepState::Walk { layer, phase, row, listing } = &mut self.states[level] else {
                return false;
            };
            if *layer >= layers.len() {
                return false;
            }
            let depth = layer_at(l.traversal, *layer, layers.len());
            let table = &layers[depth];
            // Phase 0 walks the list on the bound side, phase 1 (symmetric
            // relations only) the opposite list.
            let along_from = from_bound == (*phase == 0);

            if !*listing {
                *listing = true;
                *row = if along_from { table.first_from(bound) } else { table.first_to(bound) };
            }

            let Some(current) = *row else {
                if l.symmetric && *phase == 0 {
                    *phase = 1;
                } else {
                    *phase = 0;
                    *layer += 1;
                }
                *listing = false;
                continue;
            };
            *row = if along_from { table.next_from(current) } else { table.next_to(current) };
            let mirrored = *phase == 1;

            let (stored_from, stored_to) = (table.from_entity(current), table.to_entity(current));
            if mirrored && stored_from == stored_to {
                continue;
            }
            let other = if along_from { stored_to } else { stored_from };
            let (from, to) = if from_bound { (bound, other) } else { (other, bound) };
            if self.accept_edge(link, from, to, depth, current, !from_bound, from_bound) {
                return true;
            }
        }
    }

    fn full(&mut self, level: usize, link: usize) -> bool {
        let l = self.filter.links[link];
        let layers = self.layers(link);

        loop {
            let StepState::Full { layer, row, mirrored } = &mut self.states[level] else {
                return false;
            };
            if *layer >= layers.len() {
                return false;
            }
            let depth = layer_at(l.traversal, *layer, layers.len());
            let table = &layers[depth];
            if *row >= table.len() {
                *layer += 1;
                *row = 0;
                *mirrored = false;
                continue;
            }

            let current = *row;
            let (stored_from, stored_to) = (table.from_entity(current), table.to_entity(current));
            let (from, to) = if *mirrored { (stored_to, stored_from) } else { (stored_from, stored_to) };
            if l.symmetric && !*mirrored && stored_from != stored_to {
                *mirrored = true;
            } else {
                *mirrored = false;
                *row += 1;
            }

            if self.accept_edge(link, from, to, depth, current, true, true) {
                return true;
            }
        }
    }
}

impl<'w> Iterator for FilterView<'w> {
    type Item = QueryMatch;

    fn next(&mut self) -> Option<QueryMatch> {
        if self.advance() {
            Some(self.current.clone())
        } else {
            None
        }
    }
}
