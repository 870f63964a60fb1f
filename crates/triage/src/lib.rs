//! Triage scoring and escalation for carepod.
//!
//! `scorer` is a pure function over extracted features and risk factors;
//! `escalation` is the one-way ratchet that drives handoff to a human
//! provider.

pub mod escalation;
pub mod scorer;

pub use escalation::{
    EscalationAdvice, EscalationMachine, HandoffCase, HandoffChannel, RetryPolicy, Transition,
};
pub use scorer::{red_flag_fired, score};
