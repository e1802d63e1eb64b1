//! View rendering collaborator.
//!
//! The engine does not template anything itself: it resolves a view name to a file path using
//! the `views` and `view engine` settings and hands the path plus the merged locals to the
//! [`ViewEngine`] registered for the file extension.

use crate::app::AppState;
use crate::app::settings::keys;
use crate::error::{BoxError, ViewError};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Renders a view file to a string.
#[cfg_attr(test, mockall::automock)]
pub trait ViewEngine: Send + Sync {
    fn render(&self, path: &Path, locals: &Map<String, Value>) -> Result<String, BoxError>;
}

/// Resolves `name` to `(extension, path)`.
pub(crate) fn resolve(state: &AppState, name: &str) -> Result<(String, PathBuf), ViewError> {
    let settings = state.settings();
    let (ext, file_name) = match Path::new(name).extension().and_then(|ext| ext.to_str()) {
        Some(ext) => (ext.to_owned(), name.to_owned()),
        None => {
            let ext = settings
                .get_str(keys::VIEW_ENGINE)
                .map(|ext| ext.trim_start_matches('.').to_owned())
                .filter(|ext| !ext.is_empty())
                .ok_or_else(|| ViewError::NoDefaultEngine { name: name.to_owned() })?;
            let file_name = format!("{name}.{ext}");
            (ext, file_name)
        }
    };

    let views = settings.get_str(keys::VIEWS).unwrap_or_default();
    Ok((ext, Path::new(&views).join(file_name)))
}

/// Renders `name` with `locals`, which callers have already merged.
pub(crate) fn render(state: &AppState, name: &str, locals: &Map<String, Value>) -> Result<String, ViewError> {
    let (ext, path) = resolve(state, name)?;
    let engine = state.engine(&ext).ok_or(ViewError::EngineNotFound { ext })?;
    engine.render(&path, locals).map_err(|source| ViewError::Render { path, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_with_default_engine() {
        let state = AppState::default();
        state.settings().set(keys::VIEW_ENGINE, "hbs");
        state.settings().set(keys::VIEWS, "templates");

        let (ext, path) = resolve(&state, "users/index").unwrap();
        assert_eq!(ext, "hbs");
        assert_eq!(path, Path::new("templates").join("users/index.hbs"));
    }

    #[test]
    fn test_resolve_with_explicit_extension() {
        let state = AppState::default();
        let (ext, path) = resolve(&state, "email.txt").unwrap();
        assert_eq!(ext, "txt");
        assert_eq!(path, Path::new("views").join("email.txt"));
    }

    #[test]
    fn test_resolve_without_engine() {
        let state = AppState::default();
        assert!(matches!(resolve(&state, "index"), Err(ViewError::NoDefaultEngine { .. })));
    }

    #[test]
    fn test_render_delegates_to_engine() {
        let mut engine = MockViewEngine::new();
        engine
            .expect_render()
            .withf(|path, locals| path.ends_with("index.tpl") && locals.get("title") == Some(&json!("Home")))
            .times(1)
            .returning(|_, _| Ok("<h1>Home</h1>".to_owned()));

        let state = AppState::default();
        state.register_engine("tpl", engine);

        let mut locals = Map::new();
        locals.insert("title".to_owned(), json!("Home"));
        assert_eq!(render(&state, "index.tpl", &locals).unwrap(), "<h1>Home</h1>");
    }

    #[test]
    fn test_render_unknown_engine() {
        let state = AppState::default();
        assert!(matches!(
            render(&state, "index.pug", &Map::new()),
            Err(ViewError::EngineNotFound { ref ext }) if ext == "pug"
        ));
    }

    #[test]
    fn test_render_failure_keeps_source() {
        let mut engine = MockViewEngine::new();
        engine.expect_render().returning(|_, _| Err("unclosed tag".into()));

        let state = AppState::default();
        state.register_engine("tpl", engine);

        let error = render(&state, "broken.tpl", &Map::new()).unwrap_err();
        assert!(matches!(error, ViewError::Render { ref source, .. } if source.to_string() == "unclosed tag"));
    }
}
