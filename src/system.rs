//! System trait, access metadata, and scheduling declarations.

use crate::error::Result;
use crate::registry::ComponentId;
use crate::World;

/// System ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SystemId(pub u32);

/// Fixed, ordered set of scheduling phases a system can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    EarlyUpdate,
    FixedUpdate,
    Update,
    LateUpdate,
    Render,
    PostRender,
}

impl Phase {
    pub const ORDER: [Phase; 6] = [
        Phase::EarlyUpdate,
        Phase::FixedUpdate,
        Phase::Update,
        Phase::LateUpdate,
        Phase::Render,
        Phase::PostRender,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Phase::EarlyUpdate => "EarlyUpdate",
            Phase::FixedUpdate => "FixedUpdate",
            Phase::Update => "Update",
            Phase::LateUpdate => "LateUpdate",
            Phase::Render => "Render",
            Phase::PostRender => "PostRender",
        }
    }
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Update
    }
}

/// System access metadata, used by the scheduler's conflict analysis.
#[derive(Debug, Clone, Default)]
pub struct SystemAccess {
    pub reads: Vec<ComponentId>,
    pub writes: Vec<ComponentId>,
}

impl SystemAccess {
    /// Create empty access
    pub fn empty() -> Self {
        Self::default()
    }

    /// Check if conflicts with another access: `(A.writes ∩ B.writes) ∪
    /// (A.reads ∩ B.writes) ∪ (A.writes ∩ B.reads)` is non-empty.
    pub fn conflicts_with(&self, other: &SystemAccess) -> bool {
        self.writes.iter().any(|w| other.writes.contains(w))
            || self.writes.iter().any(|w| other.reads.contains(w))
            || self.reads.iter().any(|r| other.writes.contains(r))
    }
}

/// Ordering declarations for a system within its phase.
#[derive(Debug, Clone, Default)]
pub struct SystemOrdering {
    pub order: i32,
    pub runs_before: Vec<&'static str>,
    pub runs_after: Vec<&'static str>,
}

/// System trait: runs on every tick of its phase, with a three-step hook
/// sequence (`on_before_update` -> `update` -> `on_after_update`), plus
/// enable/disable transition hooks fired exactly once per toggle.
pub trait System: Send + Sync + 'static {
    /// Get system access metadata
    fn access(&self) -> SystemAccess;

    /// Get system name. Used both for display and as the stable identifier
    /// `runs_before`/`runs_after` reference.
    fn name(&self) -> &'static str;

    /// Scheduling phase this system executes in.
    fn phase(&self) -> Phase {
        Phase::Update
    }

    /// Ordering declaration, consulted within the topological sort.
    fn ordering(&self) -> SystemOrdering {
        SystemOrdering::default()
    }

    fn on_before_update(&mut self, _world: &World, _dt: f32) -> Result<()> {
        Ok(())
    }

    /// Run system
    fn update(&mut self, world: &World, dt: f32) -> Result<()>;

    fn on_after_update(&mut self, _world: &World, _dt: f32) -> Result<()> {
        Ok(())
    }

    /// Fired exactly once when the system transitions from disabled to
    /// enabled.
    fn on_enabled(&mut self, _world: &World) {}

    /// Fired exactly once when the system transitions from enabled to
    /// disabled.
    fn on_disabled(&mut self, _world: &World) {}

    /// Downcast support backing `Schedule::get_system`/`enable_system`/
    /// `disable_system`. Implementors should always return `self`.
    fn as_any(&self) -> &dyn std::any::Any;

    /// Mutable counterpart of [`as_any`](System::as_any).
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}

/// Boxed system
pub type BoxedSystem = Box<dyn System>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_access_conflicts() {
        let mut access1 = SystemAccess::empty();
        access1.writes.push(ComponentId(1));

        let mut access2 = SystemAccess::empty();
        access2.writes.push(ComponentId(1));

        assert!(access1.conflicts_with(&access2));
    }

    #[test]
    fn test_system_access_no_conflicts() {
        let mut access1 = SystemAccess::empty();
        access1.reads.push(ComponentId(1));

        let mut access2 = SystemAccess::empty();
        access2.reads.push(ComponentId(1));

        assert!(!access1.conflicts_with(&access2));
    }

    #[test]
    fn read_write_conflicts_either_direction() {
        let mut reader = SystemAccess::empty();
        reader.reads.push(ComponentId(5));

        let mut writer = SystemAccess::empty();
        writer.writes.push(ComponentId(5));

        assert!(reader.conflicts_with(&writer));
        assert!(writer.conflicts_with(&reader));
    }
}
