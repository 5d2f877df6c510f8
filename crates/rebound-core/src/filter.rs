//! Which failures a policy takes responsibility for.
//!
//! The net predicate is `(include is empty || any include) && !any exclude`.
//! Predicates may themselves fail; that failure is handed back to the
//! catch-block protocol, which records it instead of aborting the caller.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use crate::failure::Failure;

type Predicate = Arc<dyn Fn(&Failure) -> Result<bool, Failure> + Send + Sync>;

#[derive(Clone, Default)]
pub struct ErrorFilter {
    include: Vec<Predicate>,
    exclude: Vec<Predicate>,
}

impl ErrorFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no include or exclude rule is configured (matches everything).
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    /// Accept failures of type `E`.
    pub fn include<E>(self) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.try_include_fn(|f| Ok(f.is::<E>()))
    }

    /// Accept failures of type `E` for which `pred` holds.
    pub fn include_where<E, P>(self, pred: P) -> Self
    where
        E: StdError + Send + Sync + 'static,
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.try_include_fn(move |f| Ok(f.downcast_ref::<E>().is_some_and(&pred)))
    }

    /// Accept failures carrying an `E` anywhere in their source chain.
    pub fn include_source<E>(self) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.try_include_fn(|f| Ok(f.chain().any(|e| e.is::<E>())))
    }

    pub fn include_fn<P>(self, pred: P) -> Self
    where
        P: Fn(&Failure) -> bool + Send + Sync + 'static,
    {
        self.try_include_fn(move |f| Ok(pred(f)))
    }

    pub fn try_include_fn<P>(mut self, pred: P) -> Self
    where
        P: Fn(&Failure) -> Result<bool, Failure> + Send + Sync + 'static,
    {
        self.include.push(Arc::new(pred));
        self
    }

    /// Reject failures of type `E`.
    pub fn exclude<E>(self) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.try_exclude_fn(|f| Ok(f.is::<E>()))
    }

    pub fn exclude_where<E, P>(self, pred: P) -> Self
    where
        E: StdError + Send + Sync + 'static,
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.try_exclude_fn(move |f| Ok(f.downcast_ref::<E>().is_some_and(&pred)))
    }

    pub fn exclude_source<E>(self) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.try_exclude_fn(|f| Ok(f.chain().any(|e| e.is::<E>())))
    }

    pub fn exclude_fn<P>(self, pred: P) -> Self
    where
        P: Fn(&Failure) -> bool + Send + Sync + 'static,
    {
        self.try_exclude_fn(move |f| Ok(pred(f)))
    }

    pub fn try_exclude_fn<P>(mut self, pred: P) -> Self
    where
        P: Fn(&Failure) -> Result<bool, Failure> + Send + Sync + 'static,
    {
        self.exclude.push(Arc::new(pred));
        self
    }

    /// Evaluate the net predicate. Rules are checked in registration order and
    /// the first raising rule short-circuits.
    pub fn matches(&self, failure: &Failure) -> Result<bool, Failure> {
        let included = if self.include.is_empty() {
            true
        } else {
            any(&self.include, failure)?
        };
        if !included {
            return Ok(false);
        }
        Ok(!any(&self.exclude, failure)?)
    }
}

fn any(preds: &[Predicate], failure: &Failure) -> Result<bool, Failure> {
    for pred in preds {
        if pred(failure)? {
            return Ok(true);
        }
    }
    Ok(false)
}

impl fmt::Debug for ErrorFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorFilter")
            .field("include", &self.include.len())
            .field("exclude", &self.exclude.len())
            .finish()
    }
}
