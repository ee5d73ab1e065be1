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

//! Error types

use std::fmt;

use crate::entity::EntityId;
use crate::registry::ComponentId;
use crate::system::SystemId;

/// ECS error type
#[derive(Debug, Clone)]
pub enum EcsError {
    /// Null/out-of-domain argument: duplicate name on spawn, probability
    /// outside [0,1], duplicate rent of a system id, etc.
    InvalidArgument(String),

    /// Index out of `[0, count)` for a chunk array or slot.
    OutOfRange { index: usize, len: usize },

    /// Copying between columns of different component types, or reading a
    /// component from an archetype that does not hold it.
    TypeMismatch(String),

    /// Singleton not present, or entity-by-name lookup missed.
    NotFound(String),

    /// Component type referenced before being registered.
    UnregisteredType(&'static str),

    /// Operation attempted on a recycled or despawned entity.
    NotAlive(EntityId),

    /// `requires`/`conflicts_with`/custom-predicate validation failure.
    Validation {
        component: &'static str,
        entity: EntityId,
        reason: String,
    },

    /// System ordering graph contains a cycle within a phase.
    CycleDetected { phase: &'static str },

    /// A command referenced an unknown or unresolved placeholder entity.
    UnresolvedPlaceholder(i64),

    /// Should-never-happen internal violation (e.g. double-rent of a
    /// command buffer for the same system id).
    Invariant(String),

    /// Batch size too large (DoS guard).
    BatchTooLarge,
}

impl EcsError {
    pub fn type_mismatch(expected: &'static str, found: &'static str) -> Self {
        EcsError::TypeMismatch(format!("expected `{expected}`, found `{found}`"))
    }

    pub fn unregistered_component(id: ComponentId) -> Self {
        EcsError::UnregisteredType(Box::leak(format!("component #{}", id.0).into_boxed_str()))
    }

    pub fn invariant_double_rent(system: SystemId) -> Self {
        EcsError::Invariant(format!(
            "command buffer for system {:?} rented twice in the same cycle",
            system
        ))
    }
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            EcsError::OutOfRange { index, len } => {
                write!(f, "index {index} out of range for length {len}")
            }
            EcsError::TypeMismatch(msg) => write!(f, "type mismatch: {msg}"),
            EcsError::NotFound(what) => write!(f, "not found: {what}"),
            EcsError::UnregisteredType(ty) => write!(f, "unregistered component type: {ty}"),
            EcsError::NotAlive(e) => write!(f, "entity {e:?} is not alive"),
            EcsError::Validation {
                component,
                entity,
                reason,
            } => write!(f, "validation failed for `{component}` on {entity:?}: {reason}"),
            EcsError::CycleDetected { phase } => {
                write!(f, "system ordering cycle detected in phase {phase}")
            }
            EcsError::UnresolvedPlaceholder(id) => {
                write!(f, "unresolved command-buffer placeholder {id}")
            }
            EcsError::Invariant(msg) => write!(f, "internal invariant violated: {msg}"),
            EcsError::BatchTooLarge => write!(f, "batch size too large (max 10,000,000)"),
        }
    }
}

impl std::error::Error for EcsError {}

/// Result type alias
pub type Result<T> = std::result::Result<T, EcsError>;
