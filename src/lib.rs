//! Parse, load and write `.env` files while keeping their order.
//!
//! [`parse_str`] and [`EnvLoader::read`] return an [`EnvMap`], an
//! insertion-ordered map that also exposes entry positions. [`marshal`] and
//! [`write`] turn a map back into dotenv text.
//!
//! Values may reference other variables as `$NAME` or `${NAME}`. A reference
//! resolves to a key defined earlier in the same file, then to the ambient
//! environment, then to the empty string.
//!
//! Convenience loaders that mutate the process environment (`load`,
//! `overload`) are `unsafe`, because callers must guarantee no concurrent
//! process-environment access.

mod env;
mod error;
mod loader;
mod map;
mod model;
mod parser;
mod serializer;

pub use env::{Environment, EnvironmentMut, ProcessEnv, TargetEnv};
pub use error::{Error, ParseError, ParseErrorKind};
pub use loader::{EnvLoader, command, exec, load, overload, read, read_no_expand, write};
pub use map::{EnvMap, Iter, Pair};
pub use model::{LoadReport, SubstitutionMode};
pub use parser::{
    parse_bytes, parse_line, parse_reader, parse_reader_with_env, parse_str, parse_str_with_env,
    unmarshal,
};
pub use serializer::marshal;
