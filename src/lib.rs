// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Archetype ECS - High-performance Entity Component System
//!
//! Production-ready ECS with parallel scheduler.

pub mod archetype;
mod archetype_manager;
pub mod command;
pub mod component;
pub mod entity;
pub mod error;
pub mod event;
pub mod event_bus;
pub mod query;
pub mod registry;
pub mod rng;
pub mod validation;
pub mod world;

pub mod executor;
pub mod prelude;
pub mod schedule;
pub mod system;

// Re-exports for convenience
pub use archetype::Archetype;
pub use command::CommandBuffer;
pub use component::{Bundle, Component};
pub use entity::EntityId;
pub use error::{EcsError, Result};
pub use query::{Entity, Fetch, FetchMut, Query, QueryCacheStats, QueryDescriptor, QueryFilter, QueryMut, With, Without};
pub use registry::{ComponentId, ComponentRegistry};
pub use world::{MemoryStats, World, WorldConfig};

pub use executor::{Executor, SystemProfiler};
pub use schedule::{Schedule, Stage};
pub use system::{BoxedSystem, System, SystemAccess, SystemId};
