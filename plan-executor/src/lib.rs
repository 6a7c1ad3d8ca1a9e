//! Query plan execution runtime for federated GraphQL gateways.
//!
//! A gateway hands this crate a pre-compiled query plan — a tree of
//! fetches against subgraph services, sequenced and fanned out by the
//! planner — together with the client operation and the composed
//! schemas. [`QueryPlan::execute`] interprets the tree against a set of
//! injected subgraph services, merges their responses into a single
//! result, hydrates subgraph error paths against the client response
//! shape, and returns the final `{data, errors}` envelope.
//!
//! The crate deliberately stops at the service boundary: planning,
//! composition, transport, parsing and validation of the client request
//! all happen outside and are consumed through the types in
//! [`services`], [`spec`] and [`introspection`].

#![warn(unreachable_pub)]

pub mod context;
pub mod error;
pub mod graphql;
pub mod introspection;
pub mod json_ext;
pub mod proto;
pub mod query_planner;
pub mod services;
pub mod spec;

pub use crate::context::Context;
pub use crate::error::FetchError;
pub use crate::introspection::DisabledIntrospection;
pub use crate::introspection::IntrospectionHandler;
pub use crate::query_planner::ExecutionOptions;
pub use crate::query_planner::QueryPlan;
pub use crate::spec::Query;
pub use crate::spec::Schema;
