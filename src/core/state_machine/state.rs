//=========================================================================
// State Trait
//=========================================================================
//
// Behaviour of a single state and the identity it is registered under.
//
// A state is registered under the identity of its own type, so each
// machine holds at most one instance per state type. Hooks receive the
// machine's shared context by mutable reference for the duration of the
// call; the context itself stays owned by the machine.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

//=== Internal Dependencies ===============================================

use super::Transitions;

//=== Public API ==========================================================

/// Result returned by every state hook.
pub type HookResult = anyhow::Result<()>;

/// Upcast helper so registered states can be handed back as their
/// concrete type.
///
/// Automatically implemented for all `'static` types.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

// Blanket implementation
impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

//=== State Trait =========================================================

/// A unit of behaviour inside a [`super::StateMachine`].
///
/// Every hook has an empty default, so a state only overrides what it
/// needs.
///
/// Hooks never reach the machine itself. Transitions are requested only
/// from [`check_transitions`](State::check_transitions) through its
/// [`Transitions`] handle; other hooks record their decision in the
/// context and let the next check act on it. Code outside the states
/// calls [`super::StateMachine::change_state`] directly.
///
/// ```rust
/// use aetheric_runtime::prelude::*;
///
/// struct Player { stamina: f32 }
///
/// struct Resting;
/// struct Running;
///
/// impl State<Player> for Resting {
///     fn update(&mut self, player: &mut Player, dt: f32) -> HookResult {
///         player.stamina += dt;
///         Ok(())
///     }
///
///     fn check_transitions(
///         &mut self,
///         player: &mut Player,
///         transitions: &mut Transitions<'_, Player>,
///     ) -> HookResult {
///         if player.stamina >= 1.0 {
///             transitions.change_state::<Running>()?;
///         }
///         Ok(())
///     }
/// }
///
/// impl State<Player> for Running {}
///
/// let mut machine = StateMachine::new(Player { stamina: 0.5 }, Resting).unwrap();
/// machine.add_state(Running);
///
/// machine.update(0.5).unwrap(); // Resting.update → stamina 1.0
/// machine.update(0.5).unwrap(); // Resting.check_transitions → Running
/// assert!(machine.is_in::<Running>());
/// ```
pub trait State<C: 'static>: AsAny {
    /// Called when the machine makes this state current.
    fn enter(&mut self, _context: &mut C) -> HookResult {
        Ok(())
    }

    /// Called when the machine leaves this state.
    fn exit(&mut self, _context: &mut C) -> HookResult {
        Ok(())
    }

    /// Called once per tick while this state is current, unless the
    /// transition check of the same tick left another state current.
    ///
    /// Cannot transition; set a flag in the context for the next
    /// [`check_transitions`](State::check_transitions) instead.
    fn update(&mut self, _context: &mut C, _delta_time: f32) -> HookResult {
        Ok(())
    }

    /// Called at the start of every tick while this state is current.
    ///
    /// Request transitions through `transitions`; they are applied in
    /// request order as soon as this hook returns.
    fn check_transitions(
        &mut self,
        _context: &mut C,
        _transitions: &mut Transitions<'_, C>,
    ) -> HookResult {
        Ok(())
    }
}

//=== StateId =============================================================

/// Registration key of a state: the identity of its type.
///
/// Equality and hashing use only the type identity; the name is kept for
/// diagnostics.
#[derive(Clone, Copy)]
pub struct StateId {
    type_id: TypeId,
    name: &'static str,
}

impl StateId {
    /// Returns the id of state type `S`.
    pub fn of<S: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<S>(),
            name: type_name::<S>(),
        }
    }

    /// Returns the fully qualified type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the type name without its module path.
    pub fn short_name(&self) -> &'static str {
        self.name.rsplit("::").next().unwrap_or(self.name)
    }
}

impl PartialEq for StateId {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for StateId {}

impl Hash for StateId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateId({})", self.short_name())
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

//=========================================================================
// Tests
//=========================================================================
