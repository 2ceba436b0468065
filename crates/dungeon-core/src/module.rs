//! The hooks a dungeon manager drives.
//!
//! A module sees every classified log ([`DungeonModule::process_log`]),
//! every line from the `dungeon` pseudo-user
//! ([`DungeonModule::process_dungeon`]) and every instance reset
//! ([`DungeonModule::reset`]). The manager calls all hooks under its sync
//! lock, so a module never runs concurrently with itself or its siblings.

use dungeon_types::FilteredLog;
use serde_json::Value;
use tracing::{debug, warn};

use crate::dungeon::InitData;
use crate::persist::PersistentState;

/// A pluggable handler fed by a dungeon manager.
pub trait DungeonModule: Send {
    /// Key under which this module's state is persisted.
    fn name(&self) -> &str {
        std::any::type_name_of_val(self)
    }

    /// Called once when the manager initializes.
    ///
    /// `saved` is `None` when nothing was saved or the instance changed
    /// since.
    fn initialize(&mut self, saved: Option<&Value>, init: &InitData) {
        let _ = (saved, init);
    }

    /// State to persist under [`DungeonModule::name`], if any.
    fn state(&self) -> Option<Value> {
        None
    }

    /// Called after every successful poll.
    fn process_log(&mut self, log: &FilteredLog);

    /// Called for each message from the `dungeon` pseudo-user.
    ///
    /// Returned text is split into lines, each sent as a chat reply.
    fn process_dungeon(&mut self, text: &str, log: &FilteredLog) -> Option<String>;

    /// Called when a new dungeon instance replaces the old one.
    fn reset(&mut self, init: &InitData);
}

/// The modules of one manager, invoked in registration order.
#[derive(Default)]
pub struct ModuleSet {
    modules: Vec<Box<dyn DungeonModule>>,
}

impl std::fmt::Debug for ModuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl ModuleSet {
    /// Wrap `modules`.
    pub fn new(modules: Vec<Box<dyn DungeonModule>>) -> Self {
        Self { modules }
    }

    /// Number of modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether there are no modules.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Module names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(|m| m.name())
    }

    /// Initialize every module from its saved state.
    pub fn initialize(&mut self, state: &PersistentState, init: &InitData) {
        for module in &mut self.modules {
            let saved = state.get(module.name());
            debug!(module = module.name(), restored = saved.is_some(), "initializing module");
            module.initialize(saved, init);
        }
    }

    /// Feed a classified log to every module.
    pub fn process_log(&mut self, log: &FilteredLog) {
        for module in &mut self.modules {
            module.process_log(log);
        }
    }

    /// Feed a dungeon line to every module and collect the reply lines.
    pub fn process_dungeon(&mut self, text: &str, log: &FilteredLog) -> Vec<String> {
        let mut replies = Vec::new();
        for module in &mut self.modules {
            if let Some(reply) = module.process_dungeon(text, log) {
                replies.extend(reply.lines().map(ToOwned::to_owned));
            }
        }
        replies
    }

    /// Reset every module.
    pub fn reset(&mut self, init: &InitData) {
        for module in &mut self.modules {
            debug!(module = module.name(), "resetting module");
            module.reset(init);
        }
    }

    /// Write every module's state into `state`.
    pub fn collect_state(&self, state: &mut PersistentState) {
        for module in &self.modules {
            let name = module.name();
            if PersistentState::is_reserved(name) {
                warn!(module = name, "module name collides with a reserved key, not saved");
                continue;
            }
            if let Some(value) = module.state() {
                state.insert(name, value);
            }
        }
    }
}
