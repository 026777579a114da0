// Declarators
//
// Each declarator is a pure function from a `Context` and typed props to a
// declaration. Declarations render into a `Template` through the
// `Declaration` trait; nothing here performs I/O.

pub mod buildspec;
pub mod image_ci;
pub mod mysql;
pub mod network;
pub mod tier;

pub use image_ci::{declare_image_ci, ImageCiDeclaration, ImageCiProps};
pub use mysql::{declare_mysql, MysqlDeclaration, MysqlProps};
