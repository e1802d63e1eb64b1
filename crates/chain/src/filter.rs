//! Method filters for route handlers.
//!
//! Every handler registered on a [`Route`](crate::Route) carries a [`MethodFilter`]: either one
//! specific HTTP method, or every method (`all`). Pure middleware carries no filter at all.
//!
//! # Examples
//!
//! ```
//! use http::Method;
//! use micro_chain::filter::{MethodFilter, get_method};
//!
//! assert!(get_method().admits(&Method::GET));
//! assert!(!get_method().admits(&Method::POST));
//! assert!(MethodFilter::All.admits(&Method::DELETE));
//! ```

use http::Method;
use std::fmt;

/// A filter that matches HTTP methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodFilter {
    Only(Method),
    All,
}

impl MethodFilter {
    /// Check if the request method passes this filter.
    #[inline]
    pub fn admits(&self, method: &Method) -> bool {
        match self {
            MethodFilter::Only(expected) => expected == method,
            MethodFilter::All => true,
        }
    }

    /// The method this filter is restricted to, `None` for `all`.
    pub fn method(&self) -> Option<&Method> {
        match self {
            MethodFilter::Only(method) => Some(method),
            MethodFilter::All => None,
        }
    }
}

impl From<Method> for MethodFilter {
    fn from(method: Method) -> Self {
        MethodFilter::Only(method)
    }
}

impl fmt::Display for MethodFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodFilter::Only(method) => f.write_str(method.as_str()),
            MethodFilter::All => f.write_str("*"),
        }
    }
}

macro_rules! method_filter {
    ($method:ident, $upper_case_method:ident) => {
        #[doc = concat!("Creates a filter that matches HTTP ", stringify!($upper_case_method), " requests.")]
        #[inline]
        pub fn $method() -> MethodFilter {
            MethodFilter::Only(Method::$upper_case_method)
        }
    };
}

method_filter!(get_method, GET);
method_filter!(post_method, POST);
method_filter!(put_method, PUT);
method_filter!(delete_method, DELETE);
method_filter!(head_method, HEAD);
method_filter!(options_method, OPTIONS);
method_filter!(patch_method, PATCH);
