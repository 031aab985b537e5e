//! Entity-graph migration planner: diff two declared schema states into an
//! ordered DDL operation plan.
//!
//! A caller builds entities through a [`Manager`], which registers them (and
//! any child entities, e.g. a `Table`'s `Column`s) into a [`Registry`] — a
//! directed acyclic graph keyed by a stable [`entity::EntityRef`]. SQL
//! fragments passed to entity constructors can embed references to other
//! entities (`syntax::TaggedText`), so dependency edges are discovered from
//! the SQL itself rather than declared by hand.
//!
//! Given two registries — an old, previously persisted state and a newly
//! built one — [`planner::plan`] produces an ordered sequence of
//! `CREATE`/`ALTER`/`DROP` [`planner::Operation`]s that turns the old state
//! into the new one, propagating forced recreation through dependents and
//! chain-dropping stale old-side dependents along the way.
//!
//! This crate stops at the symbolic operation list: rendering an
//! [`planner::Operation`] into dialect-specific DDL, executing it against a
//! live connection, and persisting a registry for later comparison are all
//! left to a caller-supplied layer.
//!
//! # Example
//!
//! ```
//! use migraph::manager::Manager;
//! use migraph::planner;
//! use migraph::syntax::Syntax;
//!
//! let old = Manager::create_root(Syntax::default());
//! old.schema("public").unwrap();
//!
//! let new = Manager::create_root(Syntax::default());
//! let public = new.schema("public").unwrap();
//! new.with_schema(&public)
//!     .table("user", [("id".to_string(), "bigint primary key".to_string())], [])
//!     .unwrap();
//!
//! let ops = planner::plan(&old.registry(), &new.registry()).unwrap();
//! assert_eq!(ops.len(), 2); // CREATE Table:user, CREATE Column:id
//! ```

pub mod comparator;
pub mod entity;
pub mod error;
pub mod manager;
pub mod planner;
pub mod registry;
pub mod syntax;

pub use comparator::MutationKind;
pub use entity::{Entity, EntityKind, EntityRef};
pub use error::{Error, Result};
pub use manager::Manager;
pub use planner::{OpKind, Operation};
pub use registry::Registry;
pub use syntax::{Syntax, TaggedText, DEFAULT_META_CLOSE, DEFAULT_META_OPEN};
