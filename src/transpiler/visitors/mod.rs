//! Per-clause visitors. Each renders one clause of a SELECT layer against a
//! shared [`VisitContext`], so all clauses agree on table aliases and the
//! navigation joins they trigger.

pub mod context;
pub mod group_by;
pub mod join;
pub mod methods;
pub mod order_by;
pub mod predicate;
pub mod select;
pub mod update_set;

pub use context::{Fragment, RowRef, VisitContext};
pub use group_by::visit_group_by;
pub use join::visit_join;
pub use order_by::visit_order_by;
pub use predicate::{visit_predicate, visit_value};
pub use select::{Projection, visit_select};
pub use update_set::visit_assignments;
