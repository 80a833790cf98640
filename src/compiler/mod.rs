pub mod core;
pub mod rpn;
pub mod token;

pub use self::core::Compiler;
pub use rpn::convert_to_rpn;
pub use token::{format_rpn, Operator, RpnToken};
