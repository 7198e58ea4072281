//! Effective-UID windows and the final drop to the invoking user.
//!
//! CRITICAL: setresgid MUST be called BEFORE setresuid.

mod guard;
mod transition;

pub use guard::{assert_user_phase, enter_user_phase, RootGuard};
pub use transition::transition_to_real_user;
