//! Generate layered libvips bindings from the library's operation registry.
//!
//! registry → catalog/normalize → template_data → lower (contract check)
//! → render → generate.
pub mod catalog;
pub mod cli;
pub mod error;
pub mod generate;
pub mod helpers;
pub mod ir;
pub mod lower;
pub mod naming;
pub mod normalize;
pub mod path_de;
pub mod registry;
pub mod render;
pub mod template_data;
pub mod templates;
