//! An async middleware and routing engine.
//!
//! Requests walk an ordered stack of layers: middleware matched by path prefix, routes matched by
//! the whole path and HTTP method, and mounted routers which repeat the process on the rest of
//! the path. Handlers return a [`Flow`] to continue, skip the route, leave the router or stop, and
//! an error to switch the chain into error handling mode, where only [`ErrorHandler`]s run.
//!
//! The entry point is [`Application`], which owns the settings, the root router and the terminal
//! handler answering requests nothing else handled.

mod app;
mod error;
mod handler;
mod layer;
mod params;
mod request;
mod response;
mod route;
mod router;
mod view;

pub mod filter;
pub mod path;

pub use app::AppState;
pub use app::Application;
pub use app::ENV_VAR;
pub use app::Locals;
pub use app::Settings;
pub use app::keys;
pub use error::BoxError;
pub use error::ConfigError;
pub use error::HttpError;
pub use error::PanicError;
pub use error::ResponseError;
pub use error::ViewError;
pub use handler::ErrorHandler;
pub use handler::FnErrorHandler;
pub use handler::FnHandler;
pub use handler::Flow;
pub use handler::Handler;
pub use handler::HandlerResult;
pub use handler::IntoHandlers;
pub use handler::RequestHandler;
pub use handler::done;
pub use handler::error_handler_fn;
pub use handler::handler_fn;
pub use handler::next;
pub use handler::next_route;
pub use handler::next_router;
pub use params::Params;
pub use request::Request;
pub use response::Response;
pub use route::Route;
pub use router::Mountable;
pub use router::Router;
pub use router::RouterId;
pub use router::RouterOptions;
pub use tokio_util::sync::CancellationToken;
pub use view::ViewEngine;
