//=========================================================================
// State Machine
//=========================================================================
//
// Generic finite state machine sharing one context across its states.
//
// Architecture:
//   StateMachine<C>
//     ├─ context: C
//     ├─ states: HashMap<StateId, Box<dyn State<C>>>
//     ├─ current: StateId
//     └─ detached: active state removed from the registry (if any)
//
// Tick:
//   update(dt) → check_transitions() → apply requested transitions
//              → update(dt) only if the tick ends in the state it began in
//
// Transition:
//   exit(old) → current = new → enter(new)
//
//=========================================================================

//=== External Dependencies ===============================================

use std::collections::HashMap;

use log::{debug, error, info};

//=== Internal Dependencies ===============================================

use super::{AsAny, State, StateHook, StateId, StateMachineError};

type StateMap<C> = HashMap<StateId, Box<dyn State<C>>>;

//=== Transitions =========================================================

/// Transition requests collected while a state checks its transitions.
///
/// Handed to [`State::check_transitions`]. Each accepted request is
/// applied, in order, right after the hook returns.
pub struct Transitions<'a, C: 'static> {
    registry: &'a StateMap<C>,
    active: StateId,
    active_registered: bool,
    requested: Vec<StateId>,
}

impl<'a, C: 'static> Transitions<'a, C> {
    /// Requests a transition to state `S`.
    ///
    /// Fails with [`StateMachineError::NotRegistered`] if `S` was never
    /// added to the machine; the request is then dropped.
    pub fn change_state<S: State<C>>(&mut self) -> Result<(), StateMachineError> {
        let id = StateId::of::<S>();

        if !self.is_registered_id(id) {
            error!("State {} is not registered in the state machine", id);
            return Err(StateMachineError::NotRegistered { state: id.name() });
        }

        self.requested.push(id);
        Ok(())
    }

    /// Returns true if state `S` can be transitioned to.
    pub fn is_registered<S: State<C>>(&self) -> bool {
        self.is_registered_id(StateId::of::<S>())
    }

    /// Returns the state whose hook is running.
    pub fn active(&self) -> StateId {
        self.active
    }

    /// Returns the transitions requested so far, in order.
    pub fn requested(&self) -> &[StateId] {
        &self.requested
    }

    // The active state is lent out of the registry while its hook runs.
    fn is_registered_id(&self, id: StateId) -> bool {
        self.registry.contains_key(&id) || (self.active_registered && id == self.active)
    }
}

//=== StateMachine ========================================================

/// Finite state machine keyed by state type.
///
/// Owns the shared context and one instance per registered state type.
/// Use a handle type such as `Rc<RefCell<T>>` for `C` when the context
/// must outlive the machine or be shared with other systems.
///
/// States are moved into the machine on registration, so a state can
/// never be wired to a second machine.
pub struct StateMachine<C: 'static> {
    context: C,
    states: StateMap<C>,
    current: StateId,
    detached: Option<Box<dyn State<C>>>,
    epoch: u64,
}

impl<C: 'static> StateMachine<C> {
    //--- Construction -----------------------------------------------------

    /// Creates a machine, registers `initial` and enters it.
    ///
    /// Fails only if the initial state's enter hook fails.
    pub fn new<S: State<C>>(context: C, initial: S) -> Result<Self, StateMachineError> {
        let id = StateId::of::<S>();

        let mut states: StateMap<C> = HashMap::new();
        states.insert(id, Box::new(initial));

        let mut machine = Self {
            context,
            states,
            current: id,
            detached: None,
            epoch: 0,
        };

        info!("State machine created with initial state {}", id);
        machine.enter_current()?;
        Ok(machine)
    }

    //--- Registration -----------------------------------------------------

    /// Registers `state` under its type.
    ///
    /// Returns false and drops `state` if that type is already
    /// registered; the first registration wins.
    pub fn add_state<S: State<C>>(&mut self, state: S) -> bool {
        let id = StateId::of::<S>();

        if self.states.contains_key(&id) {
            debug!("State {} already registered, ignoring", id);
            return false;
        }

        debug!("Registering state {}", id);
        self.states.insert(id, Box::new(state));
        true
    }

    /// Unregisters state `S`.
    ///
    /// Removing the current state does not leave it: it stays current,
    /// keeps ticking, and is exited on the next successful transition.
    /// Returns false if `S` was not registered.
    pub fn remove_state<S: State<C>>(&mut self) -> bool {
        let id = StateId::of::<S>();

        let Some(state) = self.states.remove(&id) else {
            return false;
        };

        if id == self.current && self.detached.is_none() {
            debug!("State {} removed while current, keeping it until the next transition", id);
            self.detached = Some(state);
        } else {
            debug!("State {} removed", id);
        }

        true
    }

    //--- Transitions ------------------------------------------------------

    /// Transitions to state `S`.
    ///
    /// Runs the current state's exit hook, then the new state's enter
    /// hook. If `S` is not registered nothing changes and
    /// [`StateMachineError::NotRegistered`] is returned.
    pub fn change_state<S: State<C>>(&mut self) -> Result<(), StateMachineError> {
        self.transition_to(StateId::of::<S>())
    }

    //--- Update Loop ------------------------------------------------------

    /// Advances the current state by one tick.
    ///
    /// Runs the current state's transition check first. If the check left
    /// a different state current, the update hook is skipped for this
    /// tick; the new state gets its first update on the next tick. A check
    /// that ends on the state it started in (a self-transition or a round
    /// trip) still updates it.
    ///
    /// A [`StateMachineError::NotRegistered`] returned from the check is
    /// logged and ignored: requests accepted before it still apply.
    pub fn update(&mut self, delta_time: f32) -> Result<(), StateMachineError> {
        let tick_epoch = self.epoch;
        let active_id = self.current;

        //--- Step 1: Lend out the active state ---------------------------
        let (mut active, registered) = match self.detached.take() {
            Some(state) => (state, false),
            None => match self.states.remove(&active_id) {
                Some(state) => (state, true),
                None => return Ok(()),
            },
        };

        //--- Step 2: Check transitions -----------------------------------
        let mut transitions = Transitions {
            registry: &self.states,
            active: active_id,
            active_registered: registered,
            requested: Vec::new(),
        };
        let checked = active.check_transitions(&mut self.context, &mut transitions);
        let requested = transitions.requested;

        if registered {
            self.states.insert(active_id, active);
        } else {
            self.detached = Some(active);
        }

        if let Err(source) = checked {
            if !is_not_registered(&source) {
                return Err(StateMachineError::HookFault {
                    hook: StateHook::CheckTransitions,
                    state: active_id.name(),
                    source,
                });
            }
            debug!("Ignoring unregistered transition request from {}", active_id);
        }

        //--- Step 3: Apply requested transitions -------------------------
        for id in requested {
            self.transition_to(id)?;
        }

        //--- Step 4: Update if still in the same state -------------------
        // A detached state is dropped by any transition, even one back to
        // its own type.
        let same_state = self.current == active_id && (registered || self.epoch == tick_epoch);
        if !same_state {
            return Ok(());
        }

        let Self {
            states,
            detached,
            context,
            current,
            ..
        } = self;

        if let Some(state) = active_state(states, detached, *current) {
            state
                .update(context, delta_time)
                .map_err(|source| StateMachineError::HookFault {
                    hook: StateHook::Update,
                    state: current.name(),
                    source,
                })?;
        }

        Ok(())
    }

    //--- Query API --------------------------------------------------------

    /// Returns the registered instance of state `S`.
    pub fn get_state<S: State<C>>(&self) -> Option<&S> {
        self.states
            .get(&StateId::of::<S>())
            .and_then(|state| AsAny::as_any(&**state).downcast_ref::<S>())
    }

    /// Returns the registered instance of state `S` mutably.
    pub fn get_state_mut<S: State<C>>(&mut self) -> Option<&mut S> {
        self.states
            .get_mut(&StateId::of::<S>())
            .and_then(|state| AsAny::as_any_mut(&mut **state).downcast_mut::<S>())
    }

    /// Returns the id of the current state.
    pub fn current_state(&self) -> StateId {
        self.current
    }

    /// Returns true if state `S` is current.
    pub fn is_in<S: State<C>>(&self) -> bool {
        self.current == StateId::of::<S>()
    }

    /// Returns true if state `S` is registered.
    pub fn contains<S: State<C>>(&self) -> bool {
        self.states.contains_key(&StateId::of::<S>())
    }

    /// Returns the ids of all registered states, in no particular order.
    pub fn state_ids(&self) -> impl Iterator<Item = StateId> + '_ {
        self.states.keys().copied()
    }

    /// Returns the number of registered states.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Returns true if no state is registered.
    ///
    /// Only possible after the current state was removed.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Returns how many transitions have completed since construction.
    pub fn transition_count(&self) -> u64 {
        self.epoch
    }

    //--- Context ----------------------------------------------------------

    /// Returns the shared context.
    pub fn context(&self) -> &C {
        &self.context
    }

    /// Returns the shared context mutably.
    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    /// Consumes the machine and returns the context. No exit hook runs.
    pub fn into_context(self) -> C {
        self.context
    }

    //--- Internal Helpers -------------------------------------------------

    fn transition_to(&mut self, id: StateId) -> Result<(), StateMachineError> {
        if !self.states.contains_key(&id) {
            error!("State {} is not registered in the state machine", id);
            return Err(StateMachineError::NotRegistered { state: id.name() });
        }

        let previous = self.current;

        {
            let Self {
                states,
                detached,
                context,
                ..
            } = self;

            if let Some(state) = active_state(states, detached, previous) {
                state
                    .exit(context)
                    .map_err(|source| StateMachineError::HookFault {
                        hook: StateHook::Exit,
                        state: previous.name(),
                        source,
                    })?;
            }
        }

        if self.detached.take().is_some() {
            debug!("Dropping detached state {}", previous);
        }

        self.current = id;
        self.epoch += 1;
        debug!("State transition {} -> {}", previous, id);

        self.enter_current()
    }

    fn enter_current(&mut self) -> Result<(), StateMachineError> {
        let Self {
            states,
            detached,
            context,
            current,
            ..
        } = self;

        match active_state(states, detached, *current) {
            Some(state) => state
                .enter(context)
                .map_err(|source| StateMachineError::HookFault {
                    hook: StateHook::Enter,
                    state: current.name(),
                    source,
                }),
            None => Ok(()),
        }
    }
}

//=== Helpers =============================================================

// NotRegistered is a diagnostic; it never aborts a tick.
fn is_not_registered(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<StateMachineError>()
        .is_some_and(StateMachineError::is_not_registered)
}

// A detached state is always the current one.
fn active_state<'a, C: 'static>(
    states: &'a mut StateMap<C>,
    detached: &'a mut Option<Box<dyn State<C>>>,
    current: StateId,
) -> Option<&'a mut Box<dyn State<C>>> {
    match detached {
        Some(state) => Some(state),
        None => states.get_mut(&current),
    }
}

//=========================================================================
// Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    //--- Fixtures ---------------------------------------------------------

    #[derive(Default)]
    struct Ctx {
        log: Vec<String>,
        next: Option<&'static str>,
        fail_exit: bool,
    }

    macro_rules! recording_state {
        ($name:ident) => {
            struct $name;

            impl State<Ctx> for $name {
                fn enter(&mut self, ctx: &mut Ctx) -> HookResult {
                    ctx.log.push(format!("{}.enter", stringify!($name)));
                    Ok(())
                }

                fn exit(&mut self, ctx: &mut Ctx) -> HookResult {
                    ctx.log.push(format!("{}.exit", stringify!($name)));
                    if ctx.fail_exit {
                        return Err(anyhow!("exit refused"));
                    }
                    Ok(())
                }

                fn update(&mut self, ctx: &mut Ctx, dt: f32) -> HookResult {
                    ctx.log.push(format!("{}.update({})", stringify!($name), dt));
                    Ok(())
                }

                fn check_transitions(
                    &mut self,
                    ctx: &mut Ctx,
                    transitions: &mut Transitions<'_, Ctx>,
                ) -> HookResult {
                    match ctx.next.take() {
                        Some("A") => transitions.change_state::<A>()?,
                        Some("B") => transitions.change_state::<B>()?,
                        Some("C") => transitions.change_state::<C>()?,
                        Some("B,A") => {
                            transitions.change_state::<B>()?;
                            transitions.change_state::<A>()?;
                        }
                        Some("B,C") => {
                            transitions.change_state::<B>()?;
                            transitions.change_state::<C>()?;
                        }
                        _ => {}
                    }
                    Ok(())
                }
            }
        };
    }

    use crate::core::state_machine::HookResult;

    recording_state!(A);
    recording_state!(B);
    recording_state!(C);

    struct Counter {
        value: u32,
    }

    impl State<Ctx> for Counter {}

    struct Unused;

    impl State<Ctx> for Unused {}

    fn machine() -> StateMachine<Ctx> {
        let mut machine = StateMachine::new(Ctx::default(), A).unwrap();
        machine.add_state(B);
        machine.context_mut().log.clear();
        machine
    }

    //--- Construction Tests -----------------------------------------------

    #[test]
    fn construction_enters_initial_state_once() {
        let machine = StateMachine::new(Ctx::default(), A).unwrap();

        assert!(machine.is_in::<A>());
        assert_eq!(machine.current_state(), StateId::of::<A>());
        assert_eq!(machine.context().log, vec!["A.enter"]);
        assert_eq!(machine.len(), 1);
        assert_eq!(machine.transition_count(), 0);
    }

    #[test]
    fn failing_initial_enter_fails_construction() {
        struct Broken;

        impl State<Ctx> for Broken {
            fn enter(&mut self, _ctx: &mut Ctx) -> HookResult {
                Err(anyhow!("cannot start"))
            }
        }

        let err = StateMachine::new(Ctx::default(), Broken).err().unwrap();
        assert!(matches!(
            err,
            StateMachineError::HookFault { hook: StateHook::Enter, .. }
        ));
    }

    //--- Registration Tests -----------------------------------------------

    #[test]
    fn first_registration_wins() {
        let mut machine = StateMachine::new(Ctx::default(), A).unwrap();

        assert!(machine.add_state(Counter { value: 1 }));
        assert!(!machine.add_state(Counter { value: 2 }));

        assert_eq!(machine.get_state::<Counter>().unwrap().value, 1);
        assert_eq!(machine.len(), 2);
    }

    #[test]
    fn get_state_returns_none_when_absent() {
        let machine = machine();
        assert!(machine.get_state::<B>().is_some());
        assert!(machine.get_state::<Unused>().is_none());
    }

    #[test]
    fn get_state_mut_allows_editing_registered_state() {
        let mut machine = StateMachine::new(Ctx::default(), A).unwrap();
        machine.add_state(Counter { value: 1 });

        machine.get_state_mut::<Counter>().unwrap().value = 9;

        assert_eq!(machine.get_state::<Counter>().unwrap().value, 9);
    }

    #[test]
    fn remove_state_unregisters() {
        let mut machine = machine();

        assert!(machine.remove_state::<B>());
        assert!(!machine.remove_state::<B>());
        assert!(!machine.contains::<B>());

        let err = machine.change_state::<B>().unwrap_err();
        assert!(err.is_not_registered());
    }

    #[test]
    fn removing_current_state_keeps_it_current_until_transition() {
        let mut machine = machine();

        assert!(machine.remove_state::<A>());
        assert!(machine.is_in::<A>());
        assert!(machine.get_state::<A>().is_none());

        machine.update(1.0).unwrap();
        machine.change_state::<B>().unwrap();

        assert_eq!(
            machine.context().log,
            vec!["A.update(1)", "A.exit", "B.enter"]
        );

        // The detached instance is gone for good
        assert!(machine.change_state::<A>().unwrap_err().is_not_registered());
    }

    //--- Transition Tests -------------------------------------------------

    #[test]
    fn change_state_exits_before_entering() {
        let mut machine = machine();

        machine.change_state::<B>().unwrap();

        assert!(machine.is_in::<B>());
        assert_eq!(machine.context().log, vec!["A.exit", "B.enter"]);
        assert_eq!(machine.transition_count(), 1);
    }

    #[test]
    fn change_to_unregistered_state_is_reported_and_ignored() {
        let mut machine = machine();

        let err = machine.change_state::<C>().unwrap_err();

        assert!(matches!(err, StateMachineError::NotRegistered { .. }));
        assert!(machine.is_in::<A>());
        assert!(machine.context().log.is_empty());
    }

    #[test]
    fn failing_exit_leaves_current_state_in_place() {
        let mut machine = machine();
        machine.context_mut().fail_exit = true;

        let err = machine.change_state::<B>().unwrap_err();

        assert!(matches!(
            err,
            StateMachineError::HookFault { hook: StateHook::Exit, .. }
        ));
        assert!(machine.is_in::<A>());
        assert_eq!(machine.context().log, vec!["A.exit"]);
    }

    //--- Tick Tests -------------------------------------------------------

    #[test]
    fn update_without_transition_updates_current_state() {
        let mut machine = machine();

        machine.update(0.25).unwrap();

        assert_eq!(machine.context().log, vec!["A.update(0.25)"]);
    }

    #[test]
    fn transition_from_check_skips_update_until_next_tick() {
        let mut machine = machine();
        machine.context_mut().next = Some("B");

        machine.update(1.0).unwrap();
        assert_eq!(machine.context().log, vec!["A.exit", "B.enter"]);

        machine.update(2.0).unwrap();
        assert_eq!(
            machine.context().log,
            vec!["A.exit", "B.enter", "B.update(2)"]
        );
    }

    #[test]
    fn self_transition_from_check_still_updates() {
        let mut machine = machine();
        machine.context_mut().next = Some("A");

        machine.update(1.0).unwrap();

        assert!(machine.is_in::<A>());
        assert_eq!(
            machine.context().log,
            vec!["A.exit", "A.enter", "A.update(1)"]
        );
        assert_eq!(machine.transition_count(), 1);
    }

    #[test]
    fn round_trip_from_check_still_updates() {
        let mut machine = machine();
        machine.context_mut().next = Some("B,A");

        machine.update(1.0).unwrap();

        assert!(machine.is_in::<A>());
        assert_eq!(
            machine.context().log,
            vec!["A.exit", "B.enter", "B.exit", "A.enter", "A.update(1)"]
        );
    }

    #[test]
    fn multiple_requests_apply_in_order() {
        let mut machine = machine();
        machine.add_state(C);
        machine.context_mut().next = Some("B,C");

        machine.update(1.0).unwrap();

        assert!(machine.is_in::<C>());
        assert_eq!(
            machine.context().log,
            vec!["A.exit", "B.enter", "B.exit", "C.enter"]
        );
        assert_eq!(machine.transition_count(), 2);
    }

    #[test]
    fn unregistered_request_from_check_is_ignored() {
        let mut machine = machine();
        machine.context_mut().next = Some("C");

        machine.update(1.0).unwrap();

        assert!(machine.is_in::<A>());
        assert_eq!(machine.context().log, vec!["A.update(1)"]);
        // The lent-out state went back into the registry
        assert!(machine.contains::<A>());
    }

    #[test]
    fn requests_before_unregistered_one_still_apply() {
        let mut machine = machine();
        machine.context_mut().next = Some("B,C");

        machine.update(1.0).unwrap();

        assert!(machine.is_in::<B>());
        assert_eq!(machine.context().log, vec!["A.exit", "B.enter"]);
    }

    #[test]
    fn failing_check_reports_hook_fault() {
        struct Jammed;

        impl State<Ctx> for Jammed {
            fn check_transitions(
                &mut self,
                _ctx: &mut Ctx,
                _transitions: &mut Transitions<'_, Ctx>,
            ) -> HookResult {
                Err(anyhow!("sensor offline"))
            }
        }

        let mut machine = StateMachine::new(Ctx::default(), Jammed).unwrap();

        let err = machine.update(1.0).unwrap_err();

        assert!(matches!(
            err,
            StateMachineError::HookFault { hook: StateHook::CheckTransitions, .. }
        ));
        assert!(machine.contains::<Jammed>());
    }

    #[test]
    fn decision_made_in_update_applies_on_next_check() {
        struct Sprinter;

        impl State<Ctx> for Sprinter {
            fn update(&mut self, ctx: &mut Ctx, _dt: f32) -> HookResult {
                ctx.log.push("Sprinter.update".to_string());
                ctx.next = Some("B");
                Ok(())
            }

            fn check_transitions(
                &mut self,
                ctx: &mut Ctx,
                transitions: &mut Transitions<'_, Ctx>,
            ) -> HookResult {
                if ctx.next.take().is_some() {
                    transitions.change_state::<B>()?;
                }
                Ok(())
            }
        }

        let mut machine = StateMachine::new(Ctx::default(), Sprinter).unwrap();
        machine.add_state(B);

        machine.update(1.0).unwrap();
        assert!(machine.is_in::<Sprinter>());

        machine.update(1.0).unwrap();
        assert!(machine.is_in::<B>());
        assert_eq!(machine.context().log, vec!["Sprinter.update", "B.enter"]);
    }

    #[test]
    fn transitions_reports_registration() {
        struct Probe;

        impl State<Ctx> for Probe {
            fn check_transitions(
                &mut self,
                ctx: &mut Ctx,
                transitions: &mut Transitions<'_, Ctx>,
            ) -> HookResult {
                ctx.log.push(format!(
                    "self={} b={} unused={} active={}",
                    transitions.is_registered::<Probe>(),
                    transitions.is_registered::<B>(),
                    transitions.is_registered::<Unused>(),
                    transitions.active(),
                ));
                assert!(transitions.requested().is_empty());
                Ok(())
            }
        }

        let mut machine = StateMachine::new(Ctx::default(), Probe).unwrap();
        machine.add_state(B);

        machine.update(1.0).unwrap();

        assert_eq!(
            machine.context().log,
            vec!["self=true b=true unused=false active=Probe"]
        );
    }

    //--- Context Tests ----------------------------------------------------

    #[test]
    fn into_context_returns_shared_context() {
        let mut machine = machine();
        machine.change_state::<B>().unwrap();

        let ctx = machine.into_context();

        assert_eq!(ctx.log, vec!["A.exit", "B.enter"]);
    }

    #[test]
    fn state_ids_lists_registered_states() {
        let machine = machine();
        let mut names: Vec<_> = machine.state_ids().map(|id| id.short_name()).collect();
        names.sort();
        assert_eq!(names, vec!["A", "B"]);
    }
}
