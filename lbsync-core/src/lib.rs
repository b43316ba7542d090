pub mod config;
pub mod document;
pub mod helpers;
pub mod kubernetes;
pub mod provider;
pub mod reconciler;
pub mod selector;
pub mod tagging;

#[cfg(test)]
mod testing;

pub const FIELD_MANAGER: &str = "lbsync";
