//! Advisory rules checked while variable sets are resolved.
pub mod validator;

pub use validator::Validator;

mod rules {
    pub mod aspect_model;
    pub mod fallback;
    pub mod group_filters;
    pub mod scope;
}
