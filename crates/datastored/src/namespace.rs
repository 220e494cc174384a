//! Namespace qualification for datastore object names.
//!
//! Object names are either bare (`port0`) or qualified with a namespace
//! prefix (`tenant1:port0`). Bare names are qualified against the current
//! namespace, which starts out empty and is changed by the `namespace`
//! command. Object-management commands use [`NamespaceResolver::search_target_of`]
//! to decide whether a query names one object, every object in a namespace,
//! or the objects of the default namespace.

use std::sync::{PoisonError, RwLock};

use thiserror::Error;

/// Separator between a namespace and an object name.
pub const NAMESPACE_DELIMITER: &str = ":";

/// Longest namespace the resolver stores, in bytes.
pub const NAMESPACE_MAX_LEN: usize = 128;

/// Errors raised by namespace resolution.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum NamespaceError {
    /// A required argument was empty.
    #[error("invalid argument: {argument} must not be empty")]
    InvalidArgument {
        /// Name of the rejected argument.
        argument: &'static str,
    },
}

/// Classification of a query target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchTarget {
    /// The input was exactly the delimiter: objects of the default namespace.
    DefaultNamespace(String),
    /// The input was `<namespace>:`; carries the namespace.
    NamespaceOnly(String),
    /// A single fully qualified object name.
    FullName(String),
}

impl SearchTarget {
    /// The string the query should match against.
    #[must_use]
    pub fn target(&self) -> &str {
        match self {
            Self::DefaultNamespace(target)
            | Self::NamespaceOnly(target)
            | Self::FullName(target) => target,
        }
    }
}

/// Holds the current namespace and qualifies names against it.
#[derive(Debug, Default)]
pub struct NamespaceResolver {
    current: RwLock<String>,
}

impl NamespaceResolver {
    /// Builds a resolver whose current namespace is empty.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            current: RwLock::new(String::new()),
        }
    }

    /// Returns a copy of the current namespace, possibly empty.
    #[must_use]
    pub fn current_namespace(&self) -> String {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the current namespace, truncating it to
    /// [`NAMESPACE_MAX_LEN`] bytes.
    ///
    /// # Errors
    ///
    /// Returns [`NamespaceError::InvalidArgument`] when `namespace` is empty.
    pub fn set_current_namespace(&self, namespace: &str) -> Result<(), NamespaceError> {
        if namespace.is_empty() {
            return Err(NamespaceError::InvalidArgument {
                argument: "namespace",
            });
        }
        let stored = truncate_to_boundary(namespace, NAMESPACE_MAX_LEN);
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        stored.clone_into(&mut *current);
        Ok(())
    }

    /// Resets the current namespace to the default (empty) namespace.
    pub fn clear_current_namespace(&self) {
        self.current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Returns the namespace `name` belongs to.
    ///
    /// Qualified names yield the text before the first delimiter, which is
    /// empty for the default namespace. Bare names yield the current
    /// namespace.
    ///
    /// # Errors
    ///
    /// Returns [`NamespaceError::InvalidArgument`] when `name` is empty.
    pub fn namespace_of(&self, name: &str) -> Result<String, NamespaceError> {
        if name.is_empty() {
            return Err(NamespaceError::InvalidArgument { argument: "name" });
        }
        Ok(name.split_once(NAMESPACE_DELIMITER).map_or_else(
            || self.current_namespace(),
            |(namespace, _)| namespace.to_owned(),
        ))
    }

    /// Qualifies `name` against the current namespace.
    ///
    /// Names that already contain the delimiter are returned unchanged.
    #[must_use]
    pub fn full_name_of(&self, name: &str) -> String {
        if name.contains(NAMESPACE_DELIMITER) {
            return name.to_owned();
        }
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        let mut full =
            String::with_capacity(current.len() + NAMESPACE_DELIMITER.len() + name.len());
        full.push_str(&current);
        full.push_str(NAMESPACE_DELIMITER);
        full.push_str(name);
        full
    }

    /// Classifies a query target.
    ///
    /// | input            | result                                  |
    /// |------------------|-----------------------------------------|
    /// | `:`              | `DefaultNamespace(":")`                 |
    /// | `ns:`            | `NamespaceOnly("ns")`                   |
    /// | `:name`          | `FullName(":name")`                     |
    /// | `ns:name`        | `FullName("ns:name")`                   |
    /// | `name`           | `FullName(<current>:name)`              |
    ///
    /// # Errors
    ///
    /// Returns [`NamespaceError::InvalidArgument`] when `fullname` is empty.
    pub fn search_target_of(&self, fullname: &str) -> Result<SearchTarget, NamespaceError> {
        if fullname.is_empty() {
            return Err(NamespaceError::InvalidArgument {
                argument: "fullname",
            });
        }
        let Some((namespace, name)) = fullname.split_once(NAMESPACE_DELIMITER) else {
            return Ok(SearchTarget::FullName(self.full_name_of(fullname)));
        };
        let target = if fullname == NAMESPACE_DELIMITER {
            SearchTarget::DefaultNamespace(fullname.to_owned())
        } else if !namespace.is_empty() && name.is_empty() {
            SearchTarget::NamespaceOnly(namespace.to_owned())
        } else {
            SearchTarget::FullName(fullname.to_owned())
        };
        Ok(target)
    }
}

fn truncate_to_boundary(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let end = (0..=max)
        .rev()
        .find(|index| value.is_char_boundary(*index))
        .unwrap_or_default();
    value.get(..end).unwrap_or_default()
}
