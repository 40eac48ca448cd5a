//! Fixed-capacity node arena backing the AST.
//!
//! Nodes are stored per family in append-only vectors and referenced through
//! typed [`NodeId`] handles, so nothing ever moves or is freed individually.
//! Every placement is charged against one byte budget using the node's size
//! and alignment, which gives the arena the same capacity behaviour as a bump
//! allocator over a single pre-sized buffer.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::Index;

use tracing::trace;

use crate::error::{CompileError, CompileResult};
use crate::parser::{Expr, IfPred, Scope, Stmt};

/// Default budget: 4 MiB.
pub const DEFAULT_CAPACITY: usize = 4 * 1024 * 1024;

/// Stable handle to a node of type `T` living in an [`Arena`].
pub struct NodeId<T> {
  index: u32,
  _marker: PhantomData<fn() -> T>,
}

impl<T> NodeId<T> {
  /// `None` once a family outgrows the 32-bit handle space.
  fn new(index: usize) -> Option<Self> {
    let index = u32::try_from(index).ok()?;
    Some(Self {
      index,
      _marker: PhantomData,
    })
  }

  pub fn index(self) -> usize {
    self.index as usize
  }
}

// Manual impls so handles stay `Copy` regardless of `T`.
impl<T> Clone for NodeId<T> {
  fn clone(&self) -> Self {
    *self
  }
}

impl<T> Copy for NodeId<T> {}

impl<T> PartialEq for NodeId<T> {
  fn eq(&self, other: &Self) -> bool {
    self.index == other.index
  }
}

impl<T> Eq for NodeId<T> {}

impl<T> Hash for NodeId<T> {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.index.hash(state);
  }
}

impl<T> fmt::Debug for NodeId<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "NodeId({})", self.index)
  }
}

/// A node family that has its own storage inside the arena.
pub trait ArenaNode: Sized {
  fn slots(arena: &Arena) -> &Vec<Self>;
  fn slots_mut(arena: &mut Arena) -> &mut Vec<Self>;
}

macro_rules! arena_node {
  ($ty:ty, $field:ident) => {
    impl ArenaNode for $ty {
      fn slots(arena: &Arena) -> &Vec<Self> {
        &arena.$field
      }

      fn slots_mut(arena: &mut Arena) -> &mut Vec<Self> {
        &mut arena.$field
      }
    }
  };
}

arena_node!(Expr, exprs);
arena_node!(Stmt, stmts);
arena_node!(Scope, scopes);
arena_node!(IfPred, preds);

/// Owns every AST node of one compilation.
pub struct Arena {
  capacity: usize,
  offset: usize,
  exprs: Vec<Expr>,
  stmts: Vec<Stmt>,
  scopes: Vec<Scope>,
  preds: Vec<IfPred>,
}

impl Arena {
  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      capacity,
      offset: 0,
      exprs: Vec::new(),
      stmts: Vec::new(),
      scopes: Vec::new(),
      preds: Vec::new(),
    }
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Bytes consumed so far, including alignment padding.
  pub fn used(&self) -> usize {
    self.offset
  }

  /// Total number of nodes placed.
  pub fn len(&self) -> usize {
    self.exprs.len() + self.stmts.len() + self.scopes.len() + self.preds.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Reserve `size` bytes at the next offset that is a multiple of `align`.
  ///
  /// The returned address is relative to the start of the arena's budget.
  /// On failure the offset is left untouched.
  pub fn allocate(&mut self, size: usize, align: usize) -> CompileResult<usize> {
    if align == 0 || !align.is_power_of_two() {
      return Err(CompileError::InvalidAlignment { align });
    }

    let out_of_capacity = || CompileError::ArenaOutOfCapacity {
      requested: size,
      used: self.offset,
      capacity: self.capacity,
    };

    let address = self
      .offset
      .checked_add(align - 1)
      .map(|end| end & !(align - 1))
      .ok_or_else(out_of_capacity)?;
    let end = address
      .checked_add(size)
      .filter(|end| *end <= self.capacity)
      .ok_or_else(out_of_capacity)?;

    self.offset = end;
    trace!(address, size, align, "arena allocation");
    Ok(address)
  }

  /// Move `value` into the arena and return its handle.
  pub fn emplace<T: ArenaNode>(&mut self, value: T) -> CompileResult<NodeId<T>> {
    let id = NodeId::new(T::slots(self).len()).ok_or(CompileError::ArenaOutOfCapacity {
      requested: size_of::<T>(),
      used: self.offset,
      capacity: self.capacity,
    })?;
    self.allocate(size_of::<T>(), align_of::<T>())?;
    T::slots_mut(self).push(value);
    Ok(id)
  }

  pub fn get<T: ArenaNode>(&self, id: NodeId<T>) -> &T {
    &T::slots(self)[id.index()]
  }
}

impl Default for Arena {
  fn default() -> Self {
    Self::with_capacity(DEFAULT_CAPACITY)
  }
}

impl<T: ArenaNode> Index<NodeId<T>> for Arena {
  type Output = T;

  fn index(&self, id: NodeId<T>) -> &T {
    self.get(id)
  }
}

impl fmt::Debug for Arena {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Arena")
      .field("capacity", &self.capacity)
      .field("used", &self.offset)
      .field("nodes", &self.len())
      .finish()
  }
}
