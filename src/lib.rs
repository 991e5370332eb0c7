//! A compact expression and predicate language for message routing.
//!
//! Text such as `Hello ${header.name}` or `${header.count} > 3 ? many : few`
//! is compiled once by a [`SimpleLanguage`] into an immutable [`Expression`]
//! or [`Predicate`], then evaluated against any number of [`Exchange`]s.

pub mod ast;
pub mod config;
pub mod context;
pub mod convert;
pub mod errors;
pub mod functions;
pub mod grammar;
pub mod ognl;
pub mod tokenizer;

mod comparison;
mod engine;
mod expression;
mod parser;

pub use config::SimpleOptions;
pub use context::{BodyGuard, DefaultExchange, Exchange};
pub use convert::{DefaultTypeConverter, TargetType, TypeConverter};
pub use engine::SimpleLanguage;
pub use errors::{Result, SimpleError};
pub use expression::{matches_value, Expression, Predicate};
pub use functions::{Function, Registry};
pub use ognl::{JsonPropertyAccessor, PropertyAccessor};
pub use parser::Mode;
