//! Catalog domain records and commands.
//!
//! Plain data plus the pure rules that go with it (slug maintenance, command
//! shape checks, search matching). Storage and orchestration live in
//! `diecast-infra`.

pub mod kind;
pub mod named;
pub mod product;

pub use kind::NamedKind;
pub use named::{CreateNamed, NamedEntity, NamedSummary, UpdateNamed};
pub use product::{
    CreateProduct, Product, ProductCategoryLink, ProductView, UpdateProduct,
};
