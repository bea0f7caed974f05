pub mod env;
pub mod provider;
pub mod theme;
