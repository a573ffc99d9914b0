//! # Application builder
//!
//! [`App`] bundles a [`World`], a command buffer and two dispatchers: one run
//! once by [`App::start`] and one run by every [`App::update`].
//!
//! ```ignore
//! let mut app = App::new();
//! app.component::<Position>().component::<Velocity>();
//! app.tag("physics").repeat_while(|world| substeps_left(world));
//! app.system("integrate")
//!     .tagged("physics")
//!     .call_with::<(&mut Position, &Velocity)>(|mut view, _| {
//!         while let Some((position, velocity)) = view.next() {
//!             position.0 += velocity.0;
//!         }
//!     });
//! app.start()?;
//! app.update()?;
//! ```
//!
//! Schema methods panic on registration conflicts: declaring the schema twice
//! is a bug in the calling code.

use std::sync::{Arc, Mutex, PoisonError};

use crate::engine::commands::{CommandBuffer, Commands};
use crate::engine::config::{DispatcherConfig, WorldConfig};
use crate::engine::dispatcher::{Dispatcher, TagId};
use crate::engine::error::{ECSResult, RegistryError};
use crate::engine::observers::{Observer, ObserverEvent, ObserverId};
use crate::engine::query::{Query, QueryData, QueryFilter, QueryTerm, QueryView, UNSET_TARGET};
use crate::engine::systems::{Condition, FnSystem, System};
use crate::engine::types::{ColumnId, DataTypeId, Entity};
use crate::engine::world::World;


type ResourceInit = Box<dyn Fn(&mut World) + Send>;

fn registered(result: Result<DataTypeId, RegistryError>) -> DataTypeId {
    match result {
        Ok(id) => id,
        Err(error) => {
            log::error!("{}", error);
            panic!("{}", error);
        }
    }
}

fn condition<F>(name: String, mut f: F) -> Condition
where
    F: FnMut(&mut World) -> bool + Send + 'static,
{
    Box::new(FnSystem::world(name, move |world, _commands| f(world)))
}

/// World, command buffer and dispatchers of an application.
pub struct App {
    world: World,
    buffer: CommandBuffer,
    startup: Dispatcher,
    main: Dispatcher,
    resources: Vec<ResourceInit>,
    started: bool,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    /// Creates an application with default settings.
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default(), DispatcherConfig::default())
    }

    /// Creates an application.
    pub fn with_config(world: WorldConfig, dispatcher: DispatcherConfig) -> Self {
        let world = World::with_config(world);
        let buffer = CommandBuffer::new(&world);
        Self {
            world,
            buffer,
            startup: Dispatcher::new(dispatcher.clone()),
            main: Dispatcher::new(dispatcher),
            resources: Vec::new(),
            started: false,
        }
    }

    // ── Schema ──────────────────────────────────────────────────────────────

    /// Registers a component.
    pub fn component<T: Send + Sync + 'static>(&mut self) -> &mut Self {
        registered(self.world.register_component::<T>());
        self
    }

    /// Registers a directed relation.
    pub fn relation<T: Send + Sync + 'static>(&mut self) -> &mut Self {
        registered(self.world.register_relation::<T>());
        self
    }

    /// Registers a symmetric relation.
    pub fn symmetric_relation<T: Send + Sync + 'static>(&mut self) -> &mut Self {
        registered(self.world.register_symmetric_relation::<T>());
        self
    }

    /// Registers a tree relation.
    pub fn tree_relation<T: Send + Sync + 'static>(&mut self) -> &mut Self {
        registered(self.world.register_tree_relation::<T>());
        self
    }

    /// Inserts a resource. The value is inserted again by [`App::start`] after
    /// a [`App::reset`].
    pub fn resource<T: Clone + Send + Sync + 'static>(&mut self, value: T) -> &mut Self {
        self.world.insert_resource(value.clone());
        self.resources.push(Box::new(move |world: &mut World| {
            if !world.has_resource::<T>() {
                world.insert_resource(value.clone());
            }
        }));
        self
    }

    // ── Behavior ────────────────────────────────────────────────────────────

    /// Configures a tag of the update dispatcher.
    pub fn tag(&mut self, name: &str) -> TagBuilder<'_> {
        let tag = self.main.add_tag(name);
        TagBuilder { dispatcher: &mut self.main, tag }
    }

    /// Configures a tag of the startup dispatcher.
    pub fn startup_tag(&mut self, name: &str) -> TagBuilder<'_> {
        let tag = self.startup.add_tag(name);
        TagBuilder { dispatcher: &mut self.startup, tag }
    }

    /// Declares a system run by every [`App::update`].
    pub fn system(&mut self, name: &str) -> SystemBuilder<'_> {
        SystemBuilder::new(self, name, false)
    }

    /// Declares a system run once by [`App::start`].
    pub fn startup_system(&mut self, name: &str) -> SystemBuilder<'_> {
        SystemBuilder::new(self, name, true)
    }

    /// Declares an observer.
    pub fn observer(&mut self, name: &str) -> ObserverBuilder<'_> {
        ObserverBuilder { app: self, name: name.to_string(), hooks: Vec::new() }
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    /// Compiles both dispatchers and runs the startup systems.
    pub fn start(&mut self) -> ECSResult<()> {
        for init in &self.resources {
            init(&mut self.world);
        }
        self.startup.compile_chain()?;
        self.main.compile_chain()?;
        self.startup.call_systems(&mut self.world, &mut self.buffer);
        self.started = true;
        log::info!("app started with {} startup and {} update systems", self.startup.len(), self.main.len());
        Ok(())
    }

    /// Runs the update systems once, starting the app first if needed.
    pub fn update(&mut self) -> ECSResult<()> {
        if !self.started {
            self.start()?;
        }
        if !self.main.is_compiled() {
            self.main.compile_chain()?;
        }
        self.main.call_systems(&mut self.world, &mut self.buffer);
        Ok(())
    }

    /// Returns `true` once [`App::start`] has run.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// The world.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// The mutable world.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Pending commands, committed by the next dispatcher call.
    pub fn commands(&mut self) -> Commands<'_> {
        Commands::new(&mut self.buffer)
    }

    /// Applies pending commands now.
    pub fn commit(&mut self) {
        self.buffer.commit(&mut self.world);
    }

    /// Clears the world and pending commands. Types, observers and systems are
    /// kept; the next update starts the app again.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.world.reset();
        self.started = false;
    }
}

/// Builder returned by [`App::tag`].
pub struct TagBuilder<'a> {
    dispatcher: &'a mut Dispatcher,
    tag: TagId,
}

impl<'a> TagBuilder<'a> {
    /// Runs the tag before `other`.
    pub fn before(self, other: &str) -> Self {
        let other = self.dispatcher.add_tag(other);
        self.dispatcher.tag_set_before_tag(self.tag, other);
        self
    }

    /// Runs the tag after `other`.
    pub fn after(self, other: &str) -> Self {
        let other = self.dispatcher.add_tag(other);
        self.dispatcher.tag_set_after_tag(self.tag, other);
        self
    }

    /// Inherits the settings of `parent`.
    pub fn inherit(self, parent: &str) -> Self {
        let parent = self.dispatcher.add_tag(parent);
        self.dispatcher.tag_inherit_tag(self.tag, parent);
        self
    }

    /// Gates the tagged systems behind a predicate.
    pub fn only_if<F>(self, f: F) -> Self
    where
        F: FnMut(&mut World) -> bool + Send + 'static,
    {
        let name = format!("{}::only_if", self.dispatcher.tag_name(self.tag));
        self.dispatcher.tag_add_condition(self.tag, condition(name, f));
        self
    }

    /// Repeats the tag's group while a predicate holds.
    pub fn repeat_while<F>(self, f: F) -> Self
    where
        F: FnMut(&mut World) -> bool + Send + 'static,
    {
        let name = format!("{}::repeat_while", self.dispatcher.tag_name(self.tag));
        self.dispatcher.tag_repeat_while(self.tag, condition(name, f));
        self
    }

    /// Handle of the tag.
    pub fn id(&self) -> TagId {
        self.tag
    }
}

/// Builder returned by [`App::system`] and [`App::startup_system`].
pub struct SystemBuilder<'a> {
    app: &'a mut App,
    startup: bool,
    name: String,
    tags: Vec<String>,
    before: Vec<String>,
    after: Vec<String>,
    group: Option<String>,
    conditions: Vec<Condition>,
    terms: Vec<QueryTerm>,
}

impl<'a> SystemBuilder<'a> {
    fn new(app: &'a mut App, name: &str, startup: bool) -> Self {
        Self {
            app,
            startup,
            name: name.to_string(),
            tags: Vec::new(),
            before: Vec::new(),
            after: Vec::new(),
            group: None,
            conditions: Vec::new(),
            terms: Vec::new(),
        }
    }

    fn type_id<T: 'static>(&self) -> DataTypeId {
        match self.app.world.types().id_of::<T>() {
            Some(id) => id,
            None => {
                log::error!("system `{}` filters on unregistered `{}`", self.name, std::any::type_name::<T>());
                panic!("type `{}` is not registered", std::any::type_name::<T>());
            }
        }
    }

    /// Tags the system.
    pub fn tagged(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }

    /// Runs the system before every system tagged `tag`.
    pub fn before(mut self, tag: &str) -> Self {
        self.before.push(tag.to_string());
        self
    }

    /// Runs the system after every system tagged `tag`.
    pub fn after(mut self, tag: &str) -> Self {
        self.after.push(tag.to_string());
        self
    }

    /// Runs the system inside the repeating group of `tag`.
    pub fn in_group(mut self, tag: &str) -> Self {
        self.group = Some(tag.to_string());
        self
    }

    /// Gates the system behind a predicate.
    pub fn only_if<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut World) -> bool + Send + 'static,
    {
        let name = format!("{}::only_if#{}", self.name, self.conditions.len());
        self.conditions.push(condition(name, f));
        self
    }

    /// Requires the component on the first target.
    pub fn with<T: 'static>(mut self) -> Self {
        let id = self.type_id::<T>();
        self.terms.push(QueryTerm::with_component(id, UNSET_TARGET));
        self
    }

    /// Forbids the component on the first target.
    pub fn without<T: 'static>(mut self) -> Self {
        let id = self.type_id::<T>();
        self.terms.push(QueryTerm::without_component(id, UNSET_TARGET));
        self
    }

    /// Requires a relation from the current target to the next one.
    pub fn related<R: 'static>(mut self) -> Self {
        let id = self.type_id::<R>();
        self.terms.push(QueryTerm::relation(id, UNSET_TARGET, UNSET_TARGET));
        self
    }

    /// Adds an explicit query term.
    pub fn term(mut self, term: QueryTerm) -> Self {
        self.terms.push(term);
        self
    }

    /// Finishes the system with a closure receiving the whole world.
    ///
    /// When the builder carries terms, the closure runs only on updates where
    /// at least one entity matches them.
    pub fn call<F>(self, mut f: F)
    where
        F: FnMut(&mut World, &mut Commands<'_>) + Send + 'static,
    {
        if self.terms.is_empty() {
            let system = FnSystem::world(self.name.clone(), f);
            self.finish(Box::new(system));
            return;
        }

        let terms = QueryTerm::resolve(self.app.world.types(), &self.terms, &mut []);
        let mut filter = QueryFilter::new(&self.app.world, &terms);
        let name = self.name.clone();
        let system = FnSystem::world(self.name.clone(), move |world: &mut World, commands: &mut Commands<'_>| {
            filter.update(world);
            if filter.view(world).next().is_none() {
                log::trace!("system `{}` has no matching entity", name);
                return;
            }
            f(world, commands);
        });
        self.finish(Box::new(system));
    }

    /// Finishes the system with a closure receiving a view of the query `D`
    /// merged with the terms added to the builder.
    pub fn call_with<D: QueryData + 'static>(
        self,
        mut f: impl for<'w> FnMut(QueryView<'w, D>, &mut Commands<'_>) + Send + 'static,
    ) {
        let mut query = Query::<D>::with_terms(&self.app.world, &self.terms);
        let info = query.info().clone().with_commands();
        let system = FnSystem::new(self.name.clone(), info, move |world: &mut World, commands: &mut Commands<'_>| {
            f(query.view(world), commands);
        });
        self.finish(Box::new(system));
    }

    fn finish(self, system: Box<dyn System>) {
        let Self { app, startup, tags, before, after, group, conditions, .. } = self;
        let dispatcher = if startup { &mut app.startup } else { &mut app.main };
        let id = dispatcher.add_boxed_system(system);
        for tag in tags {
            let tag = dispatcher.add_tag(&tag);
            dispatcher.system_add_tag(id, tag);
        }
        for tag in before {
            let tag = dispatcher.add_tag(&tag);
            dispatcher.system_set_before_tag(id, tag);
        }
        for tag in after {
            let tag = dispatcher.add_tag(&tag);
            dispatcher.system_set_after_tag(id, tag);
        }
        if let Some(tag) = group {
            let tag = dispatcher.add_tag(&tag);
            dispatcher.system_set_group(id, tag);
        }
        for condition in conditions {
            dispatcher.system_add_condition(id, condition);
        }
    }
}

/// Builder returned by [`App::observer`].
pub struct ObserverBuilder<'a> {
    app: &'a mut App,
    name: String,
    hooks: Vec<(ObserverEvent, ColumnId)>,
}

impl<'a> ObserverBuilder<'a> {
    fn column<T: 'static>(&self, relation: bool) -> ColumnId {
        let types = self.app.world.types();
        let id = match types.id_of::<T>() {
            Some(id) if types.is_relation(id) == relation && !types.is_resource(id) => id,
            _ => {
                log::error!("observer `{}` hooked to `{}`, which is not a registered {}", self.name, std::any::type_name::<T>(), if relation { "relation" } else { "component" });
                panic!("observer `{}` hooked to an invalid type", self.name);
            }
        };
        ColumnId::make(id)
    }

    /// Fires when `T` is added or overwritten.
    pub fn on_add<T: 'static>(mut self) -> Self {
        let column = self.column::<T>(false);
        self.hooks.push((ObserverEvent::Add, column));
        self
    }

    /// Fires when `T` is removed.
    pub fn on_remove<T: 'static>(mut self) -> Self {
        let column = self.column::<T>(false);
        self.hooks.push((ObserverEvent::Remove, column));
        self
    }

    /// Fires when an entity with `T` is destroyed. The observed handle is
    /// already dead.
    pub fn on_destroy<T: 'static>(mut self) -> Self {
        let column = self.column::<T>(false);
        self.hooks.push((ObserverEvent::Destroy, column));
        self
    }

    /// Fires when an edge of `R` is inserted. The observed entity is the
    /// edge's `from` entity.
    pub fn on_relate<R: 'static>(mut self) -> Self {
        let column = self.column::<R>(true);
        self.hooks.push((ObserverEvent::Relate, column));
        self
    }

    /// Fires when an edge of `R` is removed.
    pub fn on_unrelate<R: 'static>(mut self) -> Self {
        let column = self.column::<R>(true);
        self.hooks.push((ObserverEvent::Unrelate, column));
        self
    }

    /// Finishes the observer with a closure receiving the world and the
    /// observed entity.
    pub fn call<F>(self, f: F) -> Vec<ObserverId>
    where
        F: FnMut(&mut World, Entity, &mut Commands<'_>) + Send + 'static,
    {
        let shared = Arc::new(Mutex::new(f));
        let Self { app, name, hooks } = self;
        if hooks.is_empty() {
            log::warn!("observer `{}` has no events and never runs", name);
        }
        hooks
            .into_iter()
            .map(|(event, column)| {
                let shared = Arc::clone(&shared);
                let observer = Observer::new(name.clone(), move |world: &mut World, entity: Entity, commands: &mut Commands<'_>| {
                    let mut f = shared.lock().unwrap_or_else(PoisonError::into_inner);
                    (*f)(world, entity, commands);
                });
                app.world.observers_mut().hook(event, column, observer)
            })
            .collect()
    }

    /// Finishes the observer with a closure receiving a view of the query `D`
    /// with its first target pinned to the observed entity.
    pub fn call_with<D: QueryData + 'static>(
        self,
        mut f: impl for<'w> FnMut(QueryView<'w, D>, &mut Commands<'_>) + Send + 'static,
    ) -> Vec<ObserverId> {
        let mut query = Query::<D>::new(&self.app.world);
        self.call(move |world, entity, commands| {
            f(query.view(world).pin(0, entity), commands);
        })
    }
}
