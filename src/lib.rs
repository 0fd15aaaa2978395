mod cmp;
mod depth;
mod error;
mod rbtree;

pub use crate::cmp::{Comparator, NaturalOrder};
pub use crate::depth::Depth;
pub use crate::error::Error;
pub use crate::rbtree::{Color, Direction, Node, NodeId, RbTree, Stats};
