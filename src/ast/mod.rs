pub mod builders;
pub mod expr;
pub mod log;
pub mod operators;
pub mod values;

pub use self::expr::{Binding, Expr, Lambda, SourceId};
pub use self::log::{EntityValue, Operand, Operator, OperatorLog};
pub use self::operators::{AggregateFunc, BinaryOp, OpKind, UnaryOp};
pub use self::values::Value;
