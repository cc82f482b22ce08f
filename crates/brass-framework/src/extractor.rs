//! Extractor system for the Brass framework.
//!
//! This module provides the [`FromContext`] trait, which defines how types
//! can be extracted from a [`Context`] for use as handler parameters.
//!
//! | Extractor | Yields | Fails when |
//! |-----------|--------|------------|
//! | `Arc<Context>` | the whole context | never |
//! | [`Event`] | a clone of the event | never |
//! | [`UserId`] | the sender | never |
//! | [`Text`] | raw text or callback data | never |
//! | [`CommandArgs`] | text after the command name | event is not a command |
//! | [`Params`] | all captured path parameters | never |
//! | [`Param<T>`] | the first captured parameter, parsed | no parameter, or parse error |
//! | `Option<T>` | `T` if it extracts | never |

use std::str::FromStr;
use std::sync::Arc;

use brass_core::{Event, UserId};

use crate::context::Context;
use crate::error::{ExtractError, ExtractResult};
use crate::path::Params;

/// A type that can be extracted from a [`Context`].
///
/// Extraction failures are handler errors: the handler is not called and
/// the dispatcher reports the event as failed.
///
/// ```rust,ignore
/// struct Semester(u32);
///
/// impl FromContext for Semester {
///     fn from_context(ctx: &Arc<Context>) -> ExtractResult<Self> {
///         ctx.param("semester_id")
///             .and_then(|s| s.parse().ok())
///             .map(Semester)
///             .ok_or(ExtractError::MissingParam("semester_id".into()))
///     }
/// }
/// ```
pub trait FromContext: Sized {
    /// Attempts to extract this type from the given context.
    fn from_context(ctx: &Arc<Context>) -> ExtractResult<Self>;
}

impl FromContext for Arc<Context> {
    fn from_context(ctx: &Arc<Context>) -> ExtractResult<Self> {
        Ok(Arc::clone(ctx))
    }
}

impl FromContext for Event {
    fn from_context(ctx: &Arc<Context>) -> ExtractResult<Self> {
        Ok(ctx.event().clone())
    }
}

impl FromContext for UserId {
    fn from_context(ctx: &Arc<Context>) -> ExtractResult<Self> {
        Ok(ctx.user_id())
    }
}

impl FromContext for Params {
    fn from_context(ctx: &Arc<Context>) -> ExtractResult<Self> {
        Ok(ctx.params().clone())
    }
}

/// Allows handlers to take parameters that may not be available.
impl<T: FromContext> FromContext for Option<T> {
    fn from_context(ctx: &Arc<Context>) -> ExtractResult<Self> {
        Ok(T::from_context(ctx).ok())
    }
}

/// The raw text of a message or command, or the data of a callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Text(pub String);

impl FromContext for Text {
    fn from_context(ctx: &Arc<Context>) -> ExtractResult<Self> {
        Ok(Text(ctx.text().to_string()))
    }
}

/// Everything after the command name, trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandArgs(pub String);

impl CommandArgs {
    /// Splits the arguments on whitespace.
    pub fn split(&self) -> impl Iterator<Item = &str> {
        self.0.split_whitespace()
    }
}

impl FromContext for CommandArgs {
    fn from_context(ctx: &Arc<Context>) -> ExtractResult<Self> {
        ctx.event()
            .command_args()
            .map(|args| CommandArgs(args.to_string()))
            .ok_or(ExtractError::KindMismatch {
                expected: "command",
                got: ctx.event().kind.name(),
            })
    }
}

/// The first path parameter captured by a callback tree pattern, parsed.
///
/// Meant for single-parameter patterns such as
/// `/grades/semester/:semester_id`; use [`Params`] when there are several.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param<T>(pub T);

impl<T> FromContext for Param<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    fn from_context(ctx: &Arc<Context>) -> ExtractResult<Self> {
        let Some((name, raw)) = ctx.params().iter().next() else {
            return Err(ExtractError::MissingParam(ctx.route().to_string()));
        };
        raw.parse()
            .map(Param)
            .map_err(|e| ExtractError::custom(format!("parameter '{name}' = '{raw}': {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brass_core::MemoryStore;

    use crate::router::Namespace;

    fn ctx(event: Event, params: Params) -> Arc<Context> {
        Arc::new(Context::new(
            event,
            Namespace::CallbackTree,
            "/grades/semester/:semester_id",
            params,
            Arc::new(MemoryStore::new()),
        ))
    }

    #[test]
    fn test_command_args() {
        let c = ctx(Event::command(1, "/group IU7-53"), Params::new());
        let args = CommandArgs::from_context(&c).unwrap();
        assert_eq!(args.0, "IU7-53");

        let c = ctx(Event::message(1, "hi"), Params::new());
        let err = CommandArgs::from_context(&c).unwrap_err();
        assert!(matches!(
            err,
            ExtractError::KindMismatch {
                expected: "command",
                got: "message"
            }
        ));
    }

    #[test]
    fn test_param_parses_first_capture() {
        let mut params = Params::new();
        params.push("semester_id", "42");
        let c = ctx(Event::callback(1, "/grades/semester/42"), params);

        let Param(id) = Param::<u32>::from_context(&c).unwrap();
        assert_eq!(id, 42);
    }

    #[test]
    fn test_param_errors() {
        let c = ctx(Event::callback(1, "/x"), Params::new());
        assert!(matches!(
            Param::<u32>::from_context(&c),
            Err(ExtractError::MissingParam(_))
        ));

        let mut params = Params::new();
        params.push("semester_id", "autumn");
        let c = ctx(Event::callback(1, "/grades/semester/autumn"), params);
        assert!(matches!(
            Param::<u32>::from_context(&c),
            Err(ExtractError::Custom(_))
        ));
    }

    #[test]
    fn test_option_never_fails() {
        let c = ctx(Event::message(1, "hi"), Params::new());
        assert_eq!(Option::<CommandArgs>::from_context(&c).unwrap(), None);
        assert_eq!(Text::from_context(&c).unwrap(), Text("hi".into()));
        assert_eq!(UserId::from_context(&c).unwrap(), UserId(1));
    }
}
