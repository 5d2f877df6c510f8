//! Type-erased failure values recorded by policies.
//!
//! Operations, handlers, filters and substitutes all raise [`Failure`]. It is
//! cheap to clone (the error lives behind an `Arc`) so the same failure can sit
//! in `errors`, `unprocessed_error` and a pipeline outcome at once.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// The error object a [`Failure`] wraps.
pub type DynError = dyn StdError + Send + Sync + 'static;

/// A raised failure: any `std::error::Error`, shared.
///
/// Like `anyhow::Error`, this type does not implement `std::error::Error`
/// itself so that every error type converts into it with `?`.
#[derive(Clone)]
pub struct Failure {
    inner: Arc<DynError>,
}

impl Failure {
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(error),
        }
    }

    /// Failure carrying only a message.
    pub fn msg(message: impl fmt::Display) -> Self {
        Self::new(Message(message.to_string()))
    }

    pub fn from_boxed(error: Box<DynError>) -> Self {
        Self {
            inner: Arc::from(error),
        }
    }

    pub fn from_anyhow(error: anyhow::Error) -> Self {
        Self::from_boxed(error.into())
    }

    pub fn as_error(&self) -> &DynError {
        &*self.inner
    }

    pub fn is<E: StdError + 'static>(&self) -> bool {
        self.inner.is::<E>()
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }

    /// Iterates this failure and then its `source()` chain.
    pub fn chain(&self) -> Chain<'_> {
        Chain {
            next: Some(self.as_error()),
        }
    }

    /// True when both values share the same underlying error allocation.
    pub fn same_as(&self, other: &Failure) -> bool {
        Arc::as_ptr(&self.inner) as *const () == Arc::as_ptr(&other.inner) as *const ()
    }
}

impl<E> From<E> for Failure
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::new(error)
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.inner, f)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.inner, f)
    }
}

/// Iterator over a failure and its sources.
pub struct Chain<'a> {
    next: Option<&'a (dyn StdError + 'static)>,
}

impl<'a> Iterator for Chain<'a> {
    type Item = &'a (dyn StdError + 'static);

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.source();
        Some(current)
    }
}

#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for Message {}

/// Composite failure: several underlying causes raised together
/// (e.g. by joined tasks), kept in the order they were collected.
#[derive(Debug, Clone)]
pub struct AggregateError {
    causes: Vec<Failure>,
}

impl AggregateError {
    pub fn new(causes: impl IntoIterator<Item = Failure>) -> Self {
        Self {
            causes: causes.into_iter().collect(),
        }
    }

    pub fn causes(&self) -> &[Failure] {
        &self.causes
    }

    /// Leaf causes, depth-first, nested aggregates expanded in place.
    pub fn flatten(&self) -> Vec<Failure> {
        let mut leaves = Vec::with_capacity(self.causes.len());
        self.flatten_into(&mut leaves);
        leaves
    }

    fn flatten_into(&self, leaves: &mut Vec<Failure>) {
        for cause in &self.causes {
            match cause.downcast_ref::<AggregateError>() {
                Some(nested) => nested.flatten_into(leaves),
                None => leaves.push(cause.clone()),
            }
        }
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error(s) occurred", self.causes.len())?;
        for (i, cause) in self.causes.iter().enumerate() {
            if i == 0 {
                write!(f, ": {}", cause)?;
            } else {
                write!(f, "; {}", cause)?;
            }
        }
        Ok(())
    }
}

impl StdError for AggregateError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.causes.first().map(|c| c.as_error() as &(dyn StdError + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Outer(std::io::Error);

    impl fmt::Display for Outer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "outer")
        }
    }

    impl StdError for Outer {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn question_mark_converts_std_errors() {
        fn parse(s: &str) -> Result<i32, Failure> {
            Ok(s.parse::<i32>()?)
        }
        let err = parse("nope").unwrap_err();
        assert!(err.is::<std::num::ParseIntError>());
    }

    #[test]
    fn chain_walks_sources() {
        let f = Failure::new(Outer(std::io::Error::other("disk")));
        let msgs: Vec<String> = f.chain().map(|e| e.to_string()).collect();
        assert_eq!(msgs, vec!["outer".to_string(), "disk".to_string()]);
    }

    #[test]
    fn clones_share_the_error() {
        let f = Failure::msg("boom");
        let g = f.clone();
        assert!(f.same_as(&g));
        assert!(!f.same_as(&Failure::msg("boom")));
    }

    #[test]
    fn from_anyhow_keeps_message() {
        let f = Failure::from_anyhow(anyhow::anyhow!("context lost"));
        assert_eq!(f.to_string(), "context lost");
    }

    #[test]
    fn flatten_expands_nested_aggregates_in_order() {
        let inner = AggregateError::new([Failure::msg("b"), Failure::msg("c")]);
        let outer = AggregateError::new([
            Failure::msg("a"),
            Failure::new(inner),
            Failure::msg("d"),
        ]);
        let leaves: Vec<String> = outer.flatten().iter().map(|f| f.to_string()).collect();
        assert_eq!(leaves, vec!["a", "b", "c", "d"]);
        assert_eq!(outer.to_string(), "3 error(s) occurred: a; 2 error(s) occurred: b; c; d");
    }
}
