use std::{error, fmt};

/// Error enumerates over all possible errors that this package
/// shall return.
#[derive(Debug, PartialEq)]
pub enum Error<K> {
    /// Key argument is absent.
    NilKey,
    /// Key failed shape or type validation.
    InvalidKey,
    /// Operation is part of the surface but has no implementation,
    /// the component names the operation.
    NotImplemented(&'static str),
    /// Fatal case, root node is colored red.
    RedRoot,
    /// Fatal case, a red node has a red parent.
    ConsecutiveReds,
    /// Fatal case, black count differs between two root-to-leaf paths.
    /// The String component can be used for debugging.
    UnbalancedBlacks(String),
    /// Fatal case, a child does not point back to its parent.
    BrokenParent(String),
    /// Fatal case, index entries are not in sort-order.
    SortError(K, K),
}

impl<K> fmt::Display for Error<K>
where
    K: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::NilKey => write!(f, "key is nil"),
            Error::InvalidKey => write!(f, "key is not valid"),
            Error::NotImplemented(op) => write!(f, "{} is not implemented", op),
            Error::RedRoot => write!(f, "root is red"),
            Error::ConsecutiveReds => write!(f, "consecutive red links"),
            Error::UnbalancedBlacks(msg) => write!(f, "unbalanced blacks, {}", msg),
            Error::BrokenParent(msg) => write!(f, "broken parent link, {}", msg),
            Error::SortError(a, b) => write!(f, "sort error {:?} {:?}", a, b),
        }
    }
}

impl<K> error::Error for Error<K> where K: fmt::Debug {}
