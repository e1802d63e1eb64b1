use crate::app::settings::{Locals, Settings};
use crate::view::ViewEngine;
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type Engines = HashMap<String, Arc<dyn ViewEngine>>;

/// Application wide state handed to every request and response.
pub struct AppState {
    settings: Settings,
    locals: Locals,
    engines: ArcSwap<Engines>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        Self { settings, locals: Locals::new(), engines: ArcSwap::from_pointee(HashMap::new()) }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn locals(&self) -> &Locals {
        &self.locals
    }

    /// The view engine registered for `ext` (without the leading dot)
    pub fn engine(&self, ext: &str) -> Option<Arc<dyn ViewEngine>> {
        self.engines.load().get(ext).cloned()
    }

    pub(crate) fn register_engine(&self, ext: &str, engine: impl ViewEngine + 'static) {
        let ext = ext.trim_start_matches('.').to_owned();
        let engine: Arc<dyn ViewEngine> = Arc::new(engine);
        self.engines.rcu(|current| {
            let mut next = Engines::clone(current);
            next.insert(ext.clone(), Arc::clone(&engine));
            next
        });
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let engines: Vec<String> = self.engines.load().keys().cloned().collect();
        f.debug_struct("AppState")
            .field("settings", &self.settings)
            .field("locals", &self.locals)
            .field("engines", &engines)
            .finish()
    }
}
