//! Step sequencing, gating, and orchestration.
//!
//! Sequencing itself is a pure function, [`transition`], over [`StepState`]
//! and [`StepEvent`] - callable and testable without any I/O. The
//! [`CheckoutStateMachine`] wraps it with the server effects (via
//! [`CheckoutStepExecutor`]) and snapshot persistence (via
//! [`SnapshotStore`]), committing state only after the step's server call
//! succeeds.
//!
//! One `advance` at a time is enforced by `&mut self`; a caller must await
//! the in-flight result before issuing another action. Dropping an in-flight
//! `advance` future discards the result without mutating shared state: the
//! session is only touched after the awaited call returns inside the method.

use std::collections::BTreeSet;

use pomelo_core::{AddressId, CheckoutStep, PaymentMethodId, ShippingMethodId};
use tracing::{debug, instrument, warn};

use crate::api::pipeline::IdentityProvider;
use crate::api::transport::Transport;
use crate::error::{CheckoutError, Result};
use crate::executor::{CheckoutStepExecutor, PlacedOrder};
use crate::persist::{Clock, SnapshotBackend, SnapshotStore};
use crate::session::{
    AddressSelection, CheckoutSession, PaymentMethod, ShippingMethod, SourceList,
};
use crate::totals::{self, Totals};

// =============================================================================
// Pure transition function
// =============================================================================

/// Step sequencing state: where the user is, what has succeeded, and how far
/// the session has ever been unlocked.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StepState {
    pub current: CheckoutStep,
    /// Steps whose server-side effect has succeeded at least once.
    pub completed: BTreeSet<CheckoutStep>,
    /// Monotonically non-decreasing for the lifetime of the session.
    pub furthest: CheckoutStep,
}

/// An event applied to [`StepState`] by [`transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEvent {
    /// The current step's server-side effect succeeded.
    StepSucceeded,
    /// The user asked to jump to a previously reached step.
    NavigateTo(CheckoutStep),
    /// Unconditional linear decrement; no server call, no validation.
    Back,
}

/// Outcome of a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The machine moved to a new state.
    Moved(StepState),
    /// `Back` from the first step: return to the originating list.
    ExitToSourceList,
    /// The final step succeeded; the session is over.
    Finished,
}

/// Apply an event to a step state.
///
/// # Errors
///
/// Returns [`CheckoutError::StepLocked`] for forward navigation past
/// `furthest`; the input state is untouched.
pub fn transition(state: &StepState, event: StepEvent) -> Result<Transition> {
    match event {
        StepEvent::StepSucceeded => {
            let mut next_state = state.clone();
            next_state.completed.insert(state.current);
            match state.current.next() {
                Some(next) => {
                    next_state.current = next;
                    next_state.furthest = next_state.furthest.max(next);
                    Ok(Transition::Moved(next_state))
                }
                None => Ok(Transition::Finished),
            }
        }
        StepEvent::NavigateTo(step) => {
            if step > state.furthest {
                return Err(CheckoutError::StepLocked {
                    requested: step,
                    furthest: state.furthest,
                });
            }
            let mut next_state = state.clone();
            next_state.current = step;
            Ok(Transition::Moved(next_state))
        }
        StepEvent::Back => match state.current.prev() {
            Some(prev) => {
                let mut next_state = state.clone();
                next_state.current = prev;
                Ok(Transition::Moved(next_state))
            }
            None => Ok(Transition::ExitToSourceList),
        },
    }
}

// =============================================================================
// State machine
// =============================================================================

/// How a session came to life on construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionInit {
    /// No usable snapshot; the session starts at billing.
    Fresh,
    /// Restored from a persisted snapshot.
    Resumed { at: CheckoutStep },
}

/// Result of a successful [`CheckoutStateMachine::advance`].
#[derive(Debug, Clone)]
pub enum AdvanceOutcome {
    /// Moved on to the given step.
    Continued(CheckoutStep),
    /// Payment executed; the session is finished and cleared.
    OrderPlaced(PlacedOrder),
}

/// Result of [`CheckoutStateMachine::back`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackOutcome {
    MovedTo(CheckoutStep),
    /// Already at the first step; route back to the source list.
    ExitToSourceList,
}

/// How an address step reaches the server: a staged selection attaches a
/// new/customer address, a committed id re-points the relationship at the
/// checkout address from the previous attach.
enum AddressAction {
    Attach(AddressSelection),
    Reattach(AddressId),
}

/// Owns one [`CheckoutSession`] and drives it through the step sequence.
pub struct CheckoutStateMachine<I, T, B, C> {
    executor: CheckoutStepExecutor<I, T>,
    store: SnapshotStore<B, C>,
    session: CheckoutSession,
    billing_selection: Option<AddressSelection>,
    shipping_selection: Option<AddressSelection>,
    finished: bool,
}

impl<I, T, B, C> CheckoutStateMachine<I, T, B, C>
where
    I: IdentityProvider,
    T: Transport,
    B: SnapshotBackend,
    C: Clock,
{
    /// Build a machine for a source list, restoring a persisted session if a
    /// fresh snapshot exists, otherwise starting at billing.
    pub async fn hydrate(
        executor: CheckoutStepExecutor<I, T>,
        store: SnapshotStore<B, C>,
        source_list: &SourceList,
    ) -> (Self, SessionInit) {
        let (session, init) = match store.load(&source_list.id).await {
            Some(snapshot) if snapshot.source_list_id == source_list.id => {
                let session = CheckoutSession::resume(source_list, snapshot);
                let at = session.state.current;
                debug!(list = %source_list.id, step = %at, "resumed checkout session");
                (session, SessionInit::Resumed { at })
            }
            Some(_) => {
                warn!(list = %source_list.id, "snapshot belongs to a different list, starting fresh");
                (CheckoutSession::fresh(source_list), SessionInit::Fresh)
            }
            None => (CheckoutSession::fresh(source_list), SessionInit::Fresh),
        };
        (
            Self {
                executor,
                store,
                session,
                billing_selection: None,
                shipping_selection: None,
                finished: false,
            },
            init,
        )
    }

    /// The session being driven.
    #[must_use]
    pub fn session(&self) -> &CheckoutSession {
        &self.session
    }

    /// Totals for the current selections, computed locally.
    #[must_use]
    pub fn totals(&self) -> Totals {
        let method = self.selected_shipping_method();
        totals::compute(
            &self.session.line_items,
            method,
            self.session.server_total.as_deref(),
        )
    }

    fn selected_shipping_method(&self) -> Option<&ShippingMethod> {
        let id = self.session.selected_shipping_method_id.as_ref()?;
        self.session
            .cached_shipping_methods
            .iter()
            .find(|method| &method.id == id)
    }

    // =========================================================================
    // Selections
    // =========================================================================

    /// Stage the billing-address choice for the next `advance`.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::SessionFinished`] after order placement or
    /// abandonment; the cleared snapshot must not be re-persisted.
    pub fn select_billing_address(&mut self, selection: AddressSelection) -> Result<()> {
        self.ensure_active()?;
        self.billing_selection = Some(selection);
        self.schedule_save();
        Ok(())
    }

    /// Stage the shipping-address choice for the next `advance`.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::SessionFinished`] once the session is over.
    pub fn select_shipping_address(&mut self, selection: AddressSelection) -> Result<()> {
        self.ensure_active()?;
        self.shipping_selection = Some(selection);
        self.session.ship_to_same_as_billing = false;
        self.schedule_save();
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`CheckoutError::SessionFinished`] once the session is over.
    pub fn set_ship_to_same_as_billing(&mut self, same: bool) -> Result<()> {
        self.ensure_active()?;
        self.session.ship_to_same_as_billing = same;
        self.schedule_save();
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`CheckoutError::SessionFinished`] once the session is over.
    pub fn select_shipping_method(&mut self, method_id: ShippingMethodId) -> Result<()> {
        self.ensure_active()?;
        self.session.selected_shipping_method_id = Some(method_id);
        self.schedule_save();
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`CheckoutError::SessionFinished`] once the session is over.
    pub fn select_payment_method(&mut self, method_id: PaymentMethodId) -> Result<()> {
        self.ensure_active()?;
        self.session.selected_payment_method_id = Some(method_id);
        self.schedule_save();
        Ok(())
    }

    // =========================================================================
    // Method candidates
    // =========================================================================

    /// Shipping methods for the current address, from the advisory cache or
    /// fetched fresh when the cache is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the fetch fails.
    pub async fn shipping_methods(&mut self) -> Result<&[ShippingMethod]> {
        if self.session.cached_shipping_methods.is_empty() {
            let checkout_id = self.require_checkout_id()?;
            let methods = self.executor.shipping_methods(&checkout_id).await?;
            self.session.cached_shipping_methods = methods;
            self.schedule_save();
        }
        Ok(&self.session.cached_shipping_methods)
    }

    /// Payment methods for the checkout, from the advisory cache or fetched
    /// fresh when the cache is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the fetch fails.
    pub async fn payment_methods(&mut self) -> Result<&[PaymentMethod]> {
        if self.session.cached_payment_methods.is_empty() {
            let checkout_id = self.require_checkout_id()?;
            let methods = self.executor.payment_methods(&checkout_id).await?;
            self.session.cached_payment_methods = methods;
            self.schedule_save();
        }
        Ok(&self.session.cached_payment_methods)
    }

    // =========================================================================
    // Step actions
    // =========================================================================

    /// Validate the current step's precondition, perform its server effect,
    /// and on success commit the new state and schedule a snapshot save.
    /// On failure nothing changes and the error carries the server's message.
    ///
    /// # Errors
    ///
    /// Validation errors for unmet preconditions; executor errors otherwise.
    #[instrument(skip(self), fields(list = %self.session.source_list_id))]
    pub async fn advance(&mut self) -> Result<AdvanceOutcome> {
        self.ensure_active()?;
        match self.session.state.current {
            CheckoutStep::Billing => self.advance_billing().await,
            CheckoutStep::Shipping => self.advance_shipping().await,
            CheckoutStep::ShippingMethod => self.advance_shipping_method().await,
            CheckoutStep::Payment => self.advance_payment().await,
            CheckoutStep::Review => self.advance_review().await,
        }
    }

    async fn advance_billing(&mut self) -> Result<AdvanceOutcome> {
        // Validate before ensure_checkout so a missing selection never
        // reaches the network.
        let action = match (
            self.billing_selection.clone(),
            self.session.billing_address_id.clone(),
        ) {
            (Some(selection), _) => AddressAction::Attach(selection),
            // Step re-run without a new choice: the previous attach already
            // created a checkout address, so re-point the relationship at it
            // instead of replaying a customer-address id it never was.
            (None, Some(id)) => AddressAction::Reattach(id),
            (None, None) => {
                return Err(CheckoutError::Validation(
                    "select a billing address first".to_string(),
                ));
            }
        };

        let checkout_id = self.ensure_checkout().await?;
        let attachment = match action {
            AddressAction::Attach(selection) => {
                self.executor
                    .attach_billing_address(&checkout_id, &selection)
                    .await?
            }
            AddressAction::Reattach(id) => {
                self.executor
                    .reattach_billing_address(&checkout_id, &id)
                    .await?
            }
        };
        self.session.billing_address_id = Some(attachment.address_id);
        self.session.server_total = attachment.summary.total;
        self.billing_selection = None;
        self.commit_step_success()
    }

    async fn advance_shipping(&mut self) -> Result<AdvanceOutcome> {
        let checkout_id = self.require_checkout_id()?;
        let attachment = if self.session.ship_to_same_as_billing {
            let billing_id = self.session.billing_address_id.clone().ok_or_else(|| {
                CheckoutError::Validation("complete the billing step first".to_string())
            })?;
            self.executor
                .reuse_billing_for_shipping(&checkout_id, &billing_id)
                .await?
        } else {
            let action = match (
                self.shipping_selection.clone(),
                self.session.shipping_address_id.clone(),
            ) {
                (Some(selection), _) => AddressAction::Attach(selection),
                (None, Some(id)) => AddressAction::Reattach(id),
                (None, None) => {
                    return Err(CheckoutError::Validation(
                        "select a shipping address or ship to the billing address".to_string(),
                    ));
                }
            };
            match action {
                AddressAction::Attach(selection) => {
                    let attachment = self
                        .executor
                        .attach_shipping_address(&checkout_id, &selection)
                        .await?;
                    self.session.shipping_address_id = Some(attachment.address_id.clone());
                    attachment
                }
                AddressAction::Reattach(id) => {
                    self.executor
                        .reattach_shipping_address(&checkout_id, &id)
                        .await?
                }
            }
        };
        self.session.server_total = attachment.summary.total;
        self.shipping_selection = None;

        // The address determines which methods are available; drop the cache
        // and try to warm it. The lookup is advisory - a failure here must
        // not roll back the completed step.
        self.session.cached_shipping_methods.clear();
        self.session.selected_shipping_method_id = None;
        match self.executor.shipping_methods(&checkout_id).await {
            Ok(methods) => self.session.cached_shipping_methods = methods,
            Err(err) => warn!(%err, "shipping-method lookup failed, will retry on render"),
        }
        self.commit_step_success()
    }

    async fn advance_shipping_method(&mut self) -> Result<AdvanceOutcome> {
        let method_id = self
            .session
            .selected_shipping_method_id
            .clone()
            .ok_or_else(|| {
                CheckoutError::Validation("select a shipping method first".to_string())
            })?;
        let checkout_id = self.require_checkout_id()?;
        let summary = self
            .executor
            .select_shipping_method(&checkout_id, &method_id)
            .await?;
        self.session.server_total = summary.total;

        // Shipping choice can change which payment methods apply.
        self.session.cached_payment_methods.clear();
        self.session.selected_payment_method_id = None;
        match self.executor.payment_methods(&checkout_id).await {
            Ok(methods) => self.session.cached_payment_methods = methods,
            Err(err) => warn!(%err, "payment-method lookup failed, will retry on render"),
        }
        self.commit_step_success()
    }

    async fn advance_payment(&mut self) -> Result<AdvanceOutcome> {
        let method_id = self
            .session
            .selected_payment_method_id
            .clone()
            .ok_or_else(|| {
                CheckoutError::Validation("select a payment method first".to_string())
            })?;
        let checkout_id = self.require_checkout_id()?;
        let summary = self
            .executor
            .select_payment_method(&checkout_id, &method_id)
            .await?;
        self.session.server_total = summary.total;
        self.commit_step_success()
    }

    async fn advance_review(&mut self) -> Result<AdvanceOutcome> {
        let method_id = self
            .session
            .selected_payment_method_id
            .clone()
            .ok_or_else(|| {
                CheckoutError::Validation("a payment method must be set before review".to_string())
            })?;
        let checkout_id = self.require_checkout_id()?;
        let order = self
            .executor
            .execute_payment(&checkout_id, &method_id)
            .await?;

        // Terminal: the session is destroyed, not step-reset.
        self.finished = true;
        self.store.clear(&self.session.source_list_id).await;
        debug!(order = %order.order_id, "order placed, session cleared");
        Ok(AdvanceOutcome::OrderPlaced(order))
    }

    /// Jump to a previously unlocked step.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::StepLocked`] when the step is beyond
    /// `furthest_step_reached`; state is unchanged.
    pub fn navigate_to(&mut self, step: CheckoutStep) -> Result<CheckoutStep> {
        self.ensure_active()?;
        match transition(&self.session.state, StepEvent::NavigateTo(step))? {
            Transition::Moved(state) => {
                self.session.state = state;
                self.schedule_save();
                Ok(step)
            }
            Transition::ExitToSourceList | Transition::Finished => unreachable!(
                "navigation can only move between steps"
            ),
        }
    }

    /// Step back one step; always permitted, never a server call.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::SessionFinished`] after order placement.
    pub fn back(&mut self) -> Result<BackOutcome> {
        self.ensure_active()?;
        match transition(&self.session.state, StepEvent::Back)? {
            Transition::Moved(state) => {
                let step = state.current;
                self.session.state = state;
                self.schedule_save();
                Ok(BackOutcome::MovedTo(step))
            }
            Transition::ExitToSourceList => Ok(BackOutcome::ExitToSourceList),
            Transition::Finished => unreachable!("back never finishes the flow"),
        }
    }

    /// Explicitly abandon the session: clear persistence and finish.
    pub async fn abandon(&mut self) {
        self.finished = true;
        self.store.clear(&self.session.source_list_id).await;
        debug!(list = %self.session.source_list_id, "checkout session abandoned");
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn ensure_active(&self) -> Result<()> {
        if self.finished {
            Err(CheckoutError::SessionFinished)
        } else {
            Ok(())
        }
    }

    async fn ensure_checkout(&mut self) -> Result<pomelo_core::CheckoutId> {
        if let Some(id) = &self.session.checkout_id {
            return Ok(id.clone());
        }
        let summary = self
            .executor
            .create_checkout(&self.session.source_list_id)
            .await?;
        self.session.checkout_id = Some(summary.id.clone());
        self.session.server_total = summary.total;
        self.schedule_save();
        Ok(summary.id)
    }

    fn require_checkout_id(&self) -> Result<pomelo_core::CheckoutId> {
        self.session.checkout_id.clone().ok_or_else(|| {
            CheckoutError::Validation("complete the billing step first".to_string())
        })
    }

    fn commit_step_success(&mut self) -> Result<AdvanceOutcome> {
        match transition(&self.session.state, StepEvent::StepSucceeded)? {
            Transition::Moved(state) => {
                let step = state.current;
                self.session.state = state;
                self.schedule_save();
                Ok(AdvanceOutcome::Continued(step))
            }
            Transition::Finished | Transition::ExitToSourceList => unreachable!(
                "review success is handled by advance_review"
            ),
        }
    }

    fn schedule_save(&self) {
        // Fire-and-forget; the store debounces and swallows failures.
        self.store.save(self.session.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(current: CheckoutStep, furthest: CheckoutStep) -> StepState {
        StepState {
            current,
            completed: BTreeSet::new(),
            furthest,
        }
    }

    #[test]
    fn test_step_success_advances_and_raises_furthest() {
        let start = StepState::default();
        let Ok(Transition::Moved(next)) = transition(&start, StepEvent::StepSucceeded) else {
            panic!("expected move");
        };
        assert_eq!(next.current, CheckoutStep::Shipping);
        assert_eq!(next.furthest, CheckoutStep::Shipping);
        assert!(next.completed.contains(&CheckoutStep::Billing));
    }

    #[test]
    fn test_furthest_never_regresses_on_navigation() {
        let start = state(CheckoutStep::Payment, CheckoutStep::Payment);
        let Ok(Transition::Moved(back_at_billing)) =
            transition(&start, StepEvent::NavigateTo(CheckoutStep::Billing))
        else {
            panic!("expected move");
        };
        assert_eq!(back_at_billing.current, CheckoutStep::Billing);
        assert_eq!(back_at_billing.furthest, CheckoutStep::Payment);

        // Re-completing an earlier step keeps the high-water mark.
        let Ok(Transition::Moved(after_redo)) =
            transition(&back_at_billing, StepEvent::StepSucceeded)
        else {
            panic!("expected move");
        };
        assert_eq!(after_redo.current, CheckoutStep::Shipping);
        assert_eq!(after_redo.furthest, CheckoutStep::Payment);
    }

    #[test]
    fn test_navigation_past_furthest_is_rejected() {
        let start = state(CheckoutStep::Shipping, CheckoutStep::Shipping);
        let err = transition(&start, StepEvent::NavigateTo(CheckoutStep::Payment))
            .expect_err("should be locked");
        assert!(matches!(
            err,
            CheckoutError::StepLocked {
                requested: CheckoutStep::Payment,
                furthest: CheckoutStep::Shipping,
            }
        ));
    }

    #[test]
    fn test_back_from_first_step_exits() {
        let start = StepState::default();
        assert_eq!(
            transition(&start, StepEvent::Back).expect("back is unconditional"),
            Transition::ExitToSourceList
        );
    }

    #[test]
    fn test_review_success_finishes() {
        let start = state(CheckoutStep::Review, CheckoutStep::Review);
        assert_eq!(
            transition(&start, StepEvent::StepSucceeded).expect("success"),
            Transition::Finished
        );
    }

    #[test]
    fn test_monotonicity_over_event_sequences() {
        // Drive a mixed event sequence and assert `furthest` never decreases.
        let events = [
            StepEvent::StepSucceeded,
            StepEvent::StepSucceeded,
            StepEvent::NavigateTo(CheckoutStep::Billing),
            StepEvent::Back,
            StepEvent::StepSucceeded,
            StepEvent::NavigateTo(CheckoutStep::ShippingMethod),
            StepEvent::StepSucceeded,
            StepEvent::StepSucceeded,
        ];
        let mut state = StepState::default();
        let mut high_water = state.furthest;
        for event in events {
            match transition(&state, event) {
                Ok(Transition::Moved(next)) => {
                    assert!(next.furthest >= high_water);
                    high_water = next.furthest;
                    state = next;
                }
                Ok(Transition::ExitToSourceList | Transition::Finished) | Err(_) => {}
            }
        }
    }
}
