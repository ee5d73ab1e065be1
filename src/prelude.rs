//! Convenient re-exports of commonly used types.
//!
//! The prelude can be imported with:
//! ```
//! use archetype_ecs::prelude::*;
//! ```

pub use crate::command::CommandBuffer;
pub use crate::component::{Bundle, Component};
pub use crate::entity::EntityId;
pub use crate::error::{EcsError, Result};
pub use crate::executor::Executor;
pub use crate::query::{Entity, Query, QueryFilter, QueryMut, With, Without};
pub use crate::registry::ComponentId;
pub use crate::schedule::Schedule;
pub use crate::system::{Phase, System, SystemAccess, SystemId};
pub use crate::world::{World, WorldConfig};
