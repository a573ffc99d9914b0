//! # Dispatcher
//!
//! Orders systems through tags and runs them.
//!
//! ## Building
//! Systems and tags are nodes of a constraint graph. Every builder method takes
//! the handle of the node it configures:
//!
//! * `*_set_before_tag` / `*_set_after_tag` order a node against every node
//!   carrying a tag,
//! * `tag_inherit_tag` copies the constraints and conditions of a parent tag
//!   into a child tag,
//! * `*_add_condition` gates a node behind a predicate system,
//! * `tag_repeat_while` turns a tag into a repeating group, nested inside the
//!   group of the last repeating tag it inherited from.
//!
//! ## Compiling
//! [`Dispatcher::compile_chain`] resolves inheritance, copies tag settings into
//! the systems carrying them and sorts the graph depth first. A finished
//! system is queued at the front of its group, so unconstrained systems run in
//! reverse registration order. Each group is moved to the front of its parent
//! when it receives a system.
//!
//! ## Calling
//! [`Dispatcher::call_systems`] walks the groups. A condition runs at most once
//! per call and its result is cached; the predicate of a repeating group runs
//! before every iteration and is never cached. The command buffer is committed
//! at the end of every group iteration, which includes the end of the chain.

use std::collections::HashMap;

use crate::engine::commands::{CommandBuffer, Commands};
use crate::engine::config::DispatcherConfig;
use crate::engine::error::DispatcherError;
use crate::engine::scheduler::{make_stages, Stage};
use crate::engine::systems::{Condition, System, SystemInfo};
use crate::engine::world::World;


/// Handle of a dispatcher tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagId(pub usize);

/// Handle of a dispatcher system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SystemId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct GroupId(usize);

const MAIN_GROUP: GroupId = GroupId(0);

fn push_unique<T: PartialEq + Copy>(list: &mut Vec<T>, value: T) {
    if !list.contains(&value) {
        list.push(value);
    }
}

#[derive(Clone, Debug, Default)]
struct Settings {
    before_tags: Vec<TagId>,
    after_tags: Vec<TagId>,
    before_systems: Vec<SystemId>,
    after_systems: Vec<SystemId>,
    conditions: Vec<usize>,
}

impl Settings {
    fn copy_from(&mut self, other: &Settings) {
        for &tag in &other.before_tags {
            push_unique(&mut self.before_tags, tag);
        }
        for &tag in &other.after_tags {
            push_unique(&mut self.after_tags, tag);
        }
        for &system in &other.before_systems {
            push_unique(&mut self.before_systems, system);
        }
        for &system in &other.after_systems {
            push_unique(&mut self.after_systems, system);
        }
        for &condition in &other.conditions {
            push_unique(&mut self.conditions, condition);
        }
        self.conditions.sort_unstable();
    }
}

struct TagNode {
    name: String,
    settings: Settings,
    inherits: Vec<TagId>,
    group: Option<GroupId>,
    cursor: GroupId,
}

struct SystemNode {
    name: String,
    settings: Settings,
    tags: Vec<TagId>,
    group_tag: Option<TagId>,
    conditions: Vec<usize>,
    info: SystemInfo,
    system: Box<dyn System>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Step {
    System(SystemId),
    Group(GroupId),
}

struct Group {
    tag: Option<TagId>,
    parent: Option<GroupId>,
    conditions: Vec<usize>,
    steps: Vec<Step>,
}

impl Group {
    fn move_to_front(&mut self, step: Step) {
        if let Some(position) = self.steps.iter().position(|s| *s == step) {
            self.steps[..=position].rotate_right(1);
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Node {
    System(SystemId),
    Tag(TagId),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    White,
    Gray,
    Black,
}

/// Per-call condition cache.
struct CallState {
    ran: Vec<bool>,
    passed: Vec<bool>,
}

/// Tag-driven system dispatcher.
pub struct Dispatcher {
    config: DispatcherConfig,
    tags: Vec<TagNode>,
    tag_names: HashMap<String, TagId>,
    systems: Vec<SystemNode>,
    conditions: Vec<Condition>,
    groups: Vec<Group>,
    compiled: bool,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DispatcherConfig::default())
    }
}

impl Dispatcher {
    /// Creates an empty dispatcher.
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            config,
            tags: Vec::new(),
            tag_names: HashMap::new(),
            systems: Vec::new(),
            conditions: Vec::new(),
            groups: vec![Group { tag: None, parent: None, conditions: Vec::new(), steps: Vec::new() }],
            compiled: false,
        }
    }

    /// Settings of the dispatcher.
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    // ── Tags ────────────────────────────────────────────────────────────────

    /// Returns the tag named `name`, creating it if needed.
    pub fn add_tag(&mut self, name: &str) -> TagId {
        if let Some(&id) = self.tag_names.get(name) {
            return id;
        }
        let id = TagId(self.tags.len());
        self.tags.push(TagNode {
            name: name.to_string(),
            settings: Settings::default(),
            inherits: Vec::new(),
            group: None,
            cursor: MAIN_GROUP,
        });
        self.tag_names.insert(name.to_string(), id);
        self.compiled = false;
        id
    }

    /// Tag named `name`, if it exists.
    pub fn tag(&self, name: &str) -> Option<TagId> {
        self.tag_names.get(name).copied()
    }

    /// Name of a tag.
    pub fn tag_name(&self, tag: TagId) -> &str {
        &self.tags[tag.0].name
    }

    /// Makes `tag` inherit the constraints and conditions of `parent`. A
    /// repeating group created for `tag` afterwards nests inside the group of
    /// `parent`.
    pub fn tag_inherit_tag(&mut self, tag: TagId, parent: TagId) {
        let parent_group = self.tags[parent.0].group;
        if self.tags[tag.0].inherits.contains(&parent) {
            log::info!("tag `{}` already inherits from `{}`", self.tags[tag.0].name, self.tags[parent.0].name);
            return;
        }
        let node = &mut self.tags[tag.0];
        node.inherits.push(parent);
        node.cursor = parent_group.unwrap_or(MAIN_GROUP);
        self.compiled = false;
    }

    /// Makes `tag` run before every node carrying `other`.
    pub fn tag_set_before_tag(&mut self, tag: TagId, other: TagId) {
        push_unique(&mut self.tags[tag.0].settings.before_tags, other);
        push_unique(&mut self.tags[other.0].settings.after_tags, tag);
        self.compiled = false;
    }

    /// Makes `tag` run after every node carrying `other`.
    pub fn tag_set_after_tag(&mut self, tag: TagId, other: TagId) {
        push_unique(&mut self.tags[tag.0].settings.after_tags, other);
        push_unique(&mut self.tags[other.0].settings.before_tags, tag);
        self.compiled = false;
    }

    /// Gates every system carrying `tag` behind `condition`.
    pub fn tag_add_condition(&mut self, tag: TagId, condition: Condition) {
        let index = self.push_condition(condition);
        self.tags[tag.0].settings.conditions.push(index);
        self.compiled = false;
    }

    /// Makes the systems grouped under `tag` repeat while `condition` holds.
    pub fn tag_repeat_while(&mut self, tag: TagId, condition: Condition) {
        let index = self.push_condition(condition);
        let group = match self.tags[tag.0].group {
            Some(group) => group,
            None => {
                let group = GroupId(self.groups.len());
                let parent = self.tags[tag.0].cursor;
                self.groups.push(Group { tag: Some(tag), parent: Some(parent), conditions: Vec::new(), steps: Vec::new() });
                self.tags[tag.0].group = Some(group);
                group
            }
        };
        self.groups[group.0].conditions.push(index);
        self.compiled = false;
    }

    fn push_condition(&mut self, condition: Condition) -> usize {
        self.conditions.push(condition);
        self.conditions.len() - 1
    }

    // ── Systems ─────────────────────────────────────────────────────────────

    /// Adds a system.
    pub fn add_system(&mut self, system: impl System + 'static) -> SystemId {
        self.add_boxed_system(Box::new(system))
    }

    /// Adds a boxed system.
    pub fn add_boxed_system(&mut self, system: Box<dyn System>) -> SystemId {
        let id = SystemId(self.systems.len());
        self.systems.push(SystemNode {
            name: system.name().to_string(),
            settings: Settings::default(),
            tags: Vec::new(),
            group_tag: None,
            conditions: Vec::new(),
            info: system.info(),
            system,
        });
        self.compiled = false;
        id
    }

    /// Name of a system.
    pub fn system_name(&self, system: SystemId) -> &str {
        &self.systems[system.0].name
    }

    /// Number of systems.
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    /// Returns `true` if no system was added.
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// Tags a system. A system tagged with a repeating tag runs inside its
    /// group.
    pub fn system_add_tag(&mut self, system: SystemId, tag: TagId) {
        push_unique(&mut self.systems[system.0].tags, tag);
        self.compiled = false;
    }

    /// Makes a system run inside the repeating group of `tag`, without
    /// carrying the tag's constraints.
    pub fn system_set_group(&mut self, system: SystemId, tag: TagId) {
        let node = &self.systems[system.0];
        if let Some(previous) = node.group_tag {
            log::warn!("system `{}` moved out of the group of `{}`", node.name, self.tags[previous.0].name);
        }
        self.systems[system.0].group_tag = Some(tag);
        self.compiled = false;
    }

    /// Makes a system run before every node carrying `tag`.
    pub fn system_set_before_tag(&mut self, system: SystemId, tag: TagId) {
        push_unique(&mut self.systems[system.0].settings.before_tags, tag);
        push_unique(&mut self.tags[tag.0].settings.after_systems, system);
        self.compiled = false;
    }

    /// Makes a system run after every node carrying `tag`.
    pub fn system_set_after_tag(&mut self, system: SystemId, tag: TagId) {
        push_unique(&mut self.systems[system.0].settings.after_tags, tag);
        push_unique(&mut self.tags[tag.0].settings.before_systems, system);
        self.compiled = false;
    }

    /// Gates a system behind `condition`.
    pub fn system_add_condition(&mut self, system: SystemId, condition: Condition) {
        let index = self.push_condition(condition);
        self.systems[system.0].settings.conditions.push(index);
        self.compiled = false;
    }

    // ── Compilation ─────────────────────────────────────────────────────────

    fn resolve_tag(
        &self,
        tag: TagId,
        marks: &mut [Mark],
        resolved: &mut [Settings],
    ) -> Result<(), DispatcherError> {
        match marks[tag.0] {
            Mark::Black => return Ok(()),
            Mark::Gray => {
                return Err(DispatcherError::InheritanceCycle { tag: self.tags[tag.0].name.clone() });
            }
            Mark::White => {}
        }
        marks[tag.0] = Mark::Gray;
        let mut settings = self.tags[tag.0].settings.clone();
        for &parent in &self.tags[tag.0].inherits {
            self.resolve_tag(parent, marks, resolved)?;
            settings.copy_from(&resolved[parent.0]);
        }
        resolved[tag.0] = settings;
        marks[tag.0] = Mark::Black;
        Ok(())
    }

    fn is_ancestor(&self, ancestor: GroupId, mut group: GroupId) -> bool {
        loop {
            if group == ancestor {
                return true;
            }
            match self.groups[group.0].parent {
                Some(parent) => group = parent,
                None => return false,
            }
        }
    }

    fn system_group(&self, system: SystemId) -> Result<GroupId, DispatcherError> {
        let node = &self.systems[system.0];
        let mut chosen: Option<(GroupId, TagId)> = None;
        for tag in node.group_tag.iter().chain(node.tags.iter()) {
            let Some(group) = self.tags[tag.0].group else {
                continue;
            };
            chosen = match chosen {
                None => Some((group, *tag)),
                Some((current, _)) if self.is_ancestor(current, group) => Some((group, *tag)),
                Some((current, other)) if self.is_ancestor(group, current) => Some((current, other)),
                Some((_, other)) => {
                    return Err(DispatcherError::ConflictingGroups {
                        system: node.name.clone(),
                        first: self.tags[other.0].name.clone(),
                        second: self.tags[tag.0].name.clone(),
                    });
                }
            };
        }
        Ok(chosen.map_or(MAIN_GROUP, |(group, _)| group))
    }

    fn settings_of<'a>(node: Node, systems: &'a [Settings], tags: &'a [Settings]) -> &'a Settings {
        match node {
            Node::System(id) => &systems[id.0],
            Node::Tag(id) => &tags[id.0],
        }
    }

    /// Nodes `node` must run before, in visiting order.
    fn successors(&self, node: Node, systems: &[Settings], tags: &[Settings]) -> Vec<Node> {
        let settings = Self::settings_of(node, systems, tags);
        let mut out = Vec::new();
        for &tag in &settings.before_tags {
            for (index, system) in self.systems.iter().enumerate() {
                if system.tags.contains(&tag) {
                    out.push(Node::System(SystemId(index)));
                }
            }
            out.push(Node::Tag(tag));
        }
        out.extend(settings.before_systems.iter().map(|&s| Node::System(s)));
        out
    }

    fn node_name(&self, node: Node) -> &str {
        match node {
            Node::System(id) => &self.systems[id.0].name,
            Node::Tag(id) => &self.tags[id.0].name,
        }
    }

    fn visit(
        &mut self,
        node: Node,
        marks: &mut HashMap<Node, Mark>,
        systems: &[Settings],
        tags: &[Settings],
        groups: &[GroupId],
    ) -> Result<(), DispatcherError> {
        match marks.get(&node).copied().unwrap_or(Mark::White) {
            Mark::Black => return Ok(()),
            Mark::Gray => return Err(DispatcherError::Cycle { node: self.node_name(node).to_string() }),
            Mark::White => {}
        }
        marks.insert(node, Mark::Gray);
        for next in self.successors(node, systems, tags) {
            self.visit(next, marks, systems, tags, groups)?;
        }
        marks.insert(node, Mark::Black);

        if let Node::System(id) = node {
            let group = groups[id.0];
            self.groups[group.0].steps.insert(0, Step::System(id));
            if let Some(parent) = self.groups[group.0].parent {
                self.groups[parent.0].move_to_front(Step::Group(group));
            }
        }
        Ok(())
    }

    fn reachable(&self, from: Node, systems: &[Settings], tags: &[Settings]) -> Vec<bool> {
        let mut seen = vec![false; self.systems.len()];
        let mut visited: HashMap<Node, ()> = HashMap::new();
        let mut stack = vec![from];
        while let Some(node) = stack.pop() {
            for next in self.successors(node, systems, tags) {
                if visited.insert(next, ()).is_none() {
                    if let Node::System(id) = next {
                        seen[id.0] = true;
                    }
                    stack.push(next);
                }
            }
        }
        seen
    }

    fn check_access(&self, systems: &[Settings], tags: &[Settings]) -> Result<(), DispatcherError> {
        for node in &self.systems {
            if !node.info.valid() {
                log::error!("system `{}` declares an invalid access set: {:?}", node.name, node.info);
                return Err(DispatcherError::InvalidSystem { system: node.name.clone() });
            }
        }

        let reach: Vec<Vec<bool>> = (0..self.systems.len())
            .map(|i| self.reachable(Node::System(SystemId(i)), systems, tags))
            .collect();
        for a in 0..self.systems.len() {
            for b in a + 1..self.systems.len() {
                let (first, second) = (&self.systems[a], &self.systems[b]);
                if first.info.compatible(&second.info) || reach[a][b] || reach[b][a] {
                    continue;
                }
                if self.config.strict_access {
                    log::error!("systems `{}` and `{}` conflict and are not ordered", first.name, second.name);
                    return Err(DispatcherError::UnorderedConflict {
                        first: first.name.clone(),
                        second: second.name.clone(),
                    });
                }
                if first.info.uses_world || second.info.uses_world {
                    log::debug!("systems `{}` and `{}` use the world and are not ordered", first.name, second.name);
                } else {
                    log::warn!("systems `{}` and `{}` conflict on data access and are not ordered", first.name, second.name);
                }
            }
        }
        Ok(())
    }

    /// Compiles the call chain. Must run before [`Dispatcher::call_systems`]
    /// and again after the dispatcher is modified.
    pub fn compile_chain(&mut self) -> Result<(), DispatcherError> {
        // Inheritance.
        let mut marks = vec![Mark::White; self.tags.len()];
        let mut tag_settings = vec![Settings::default(); self.tags.len()];
        for tag in 0..self.tags.len() {
            self.resolve_tag(TagId(tag), &mut marks, &mut tag_settings)?;
        }

        // Tag settings flow into the systems carrying them.
        let system_settings: Vec<Settings> = self
            .systems
            .iter()
            .map(|system| {
                let mut settings = system.settings.clone();
                for tag in &system.tags {
                    settings.copy_from(&tag_settings[tag.0]);
                }
                settings
            })
            .collect();

        let groups = (0..self.systems.len())
            .map(|i| self.system_group(SystemId(i)))
            .collect::<Result<Vec<_>, _>>()?;

        self.check_access(&system_settings, &tag_settings)?;

        // Child groups start in their parents, most recent first.
        for group in &mut self.groups {
            group.steps.clear();
        }
        for index in 1..self.groups.len() {
            if let Some(parent) = self.groups[index].parent {
                self.groups[parent.0].steps.insert(0, Step::Group(GroupId(index)));
            }
        }

        let mut marks = HashMap::new();
        let nodes: Vec<Node> = (0..self.systems.len())
            .map(|i| Node::System(SystemId(i)))
            .chain((0..self.tags.len()).map(|i| Node::Tag(TagId(i))))
            .collect();
        for node in nodes {
            if let Err(error) = self.visit(node, &mut marks, &system_settings, &tag_settings, &groups) {
                log::error!("{}", error);
                return Err(error);
            }
        }

        for (system, settings) in self.systems.iter_mut().zip(system_settings) {
            system.conditions = settings.conditions;
        }
        for group in &self.groups {
            if let Some(tag) = group.tag {
                log::debug!("group `{}`: {:?}", self.tags[tag.0].name, group.steps);
            }
        }
        self.compiled = true;
        log::info!("compiled call chain of {} systems in {} groups", self.systems.len(), self.groups.len());
        Ok(())
    }

    /// Returns `true` if the chain is compiled and up to date.
    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    fn flatten(&self, group: GroupId, out: &mut Vec<SystemId>) {
        for step in &self.groups[group.0].steps {
            match *step {
                Step::System(id) => out.push(id),
                Step::Group(child) => self.flatten(child, out),
            }
        }
    }

    /// Compiled systems, each once, in the order of their first run.
    pub fn chain(&self) -> Vec<SystemId> {
        let mut out = Vec::new();
        self.flatten(MAIN_GROUP, &mut out);
        out
    }

    fn collect_stages(&self, group: GroupId, out: &mut Vec<Stage>) {
        let mut run: Vec<usize> = Vec::new();
        let flush = |run: &mut Vec<usize>, out: &mut Vec<Stage>| {
            out.extend(make_stages(run.iter().map(|&i| (i, &self.systems[i].info))));
            run.clear();
        };
        for step in &self.groups[group.0].steps {
            match *step {
                Step::System(id) => run.push(id.0),
                Step::Group(child) => {
                    flush(&mut run, out);
                    self.collect_stages(child, out);
                }
            }
        }
        flush(&mut run, out);
    }

    /// Compiled chain split into stages of compatible systems. Group
    /// boundaries always end a stage.
    pub fn stages(&self) -> Vec<Stage> {
        let mut out = Vec::new();
        self.collect_stages(MAIN_GROUP, &mut out);
        out
    }

    // ── Execution ───────────────────────────────────────────────────────────

    /// Runs the compiled chain once.
    ///
    /// # Panics
    /// If the chain is not compiled.
    pub fn call_systems(&mut self, world: &mut World, buffer: &mut CommandBuffer) {
        if !self.compiled {
            log::error!("call_systems before compile_chain");
            panic!("the dispatcher chain must be compiled before calling systems");
        }
        let mut state = CallState {
            ran: vec![false; self.conditions.len()],
            passed: vec![false; self.conditions.len()],
        };
        let Self { groups, systems, conditions, .. } = self;
        call_group(groups, systems, conditions, &mut state, world, buffer, MAIN_GROUP);
    }
}

fn run_condition(
    conditions: &mut [Condition],
    index: usize,
    world: &mut World,
    buffer: &mut CommandBuffer,
) -> bool {
    let mut commands = Commands::new(buffer);
    conditions[index].run(world, &mut commands)
}

fn call_group(
    groups: &[Group],
    systems: &mut [SystemNode],
    conditions: &mut [Condition],
    state: &mut CallState,
    world: &mut World,
    buffer: &mut CommandBuffer,
    group: GroupId,
) {
    let current = &groups[group.0];
    loop {
        let mut proceed = true;
        for &index in &current.conditions {
            state.ran[index] = true;
            state.passed[index] = run_condition(conditions, index, world, buffer);
            if !state.passed[index] {
                proceed = false;
                break;
            }
        }
        if !proceed {
            break;
        }

        for step in &current.steps {
            match *step {
                Step::System(id) => call_system(systems, conditions, state, world, buffer, id),
                Step::Group(child) => call_group(groups, systems, conditions, state, world, buffer, child),
            }
        }
        buffer.commit(world);

        if current.parent.is_none() {
            break;
        }
    }
}

fn call_system(
    systems: &mut [SystemNode],
    conditions: &mut [Condition],
    state: &mut CallState,
    world: &mut World,
    buffer: &mut CommandBuffer,
    id: SystemId,
) {
    let node = &mut systems[id.0];
    for &index in &node.conditions {
        if !state.ran[index] {
            state.ran[index] = true;
            state.passed[index] = run_condition(conditions, index, world, buffer);
        }
        if !state.passed[index] {
            log::trace!("skipped system `{}`", node.name);
            return;
        }
    }
    log::trace!("running system `{}`", node.name);
    let mut commands = Commands::new(buffer);
    node.system.run(world, &mut commands);
}
